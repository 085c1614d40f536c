//! Occupy Achievement Token Contract
//!
//! A minimal ownership registry for achievement tokens. One token is minted
//! for every successful throne occupation; each carries metadata derived
//! from the depositor's running deposit count.
//!
//! ## Storage Strategy
//! - `instance()`: Admin, Minter, TierImages, NextTokenId.
//! - `persistent()`: per-token Owner and Metadata, per-address Balance.
//!
//! ## Invariant
//! Token ids are assigned sequentially from 1 and are never reused.
//! `balance_of(a)` equals the number of ids whose owner is `a`.
#![no_std]
#![allow(unexpected_cfgs)]

use occupy_shared::{Tier, TokenDocument, TokenMetadata, TIER_COUNT};
use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, Address, Env, String, Vec,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const PERSISTENT_BUMP_LEDGERS: u32 = 518_400;

/// Display name carried by every token document.
pub const TOKEN_NAME: &str = "Throne Seal";

const FIRST_TOKEN_ID: u64 = 1;

// ---------------------------------------------------------------------------
// Error Types
// ---------------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized     = 2,
    NotAuthorized      = 3,
    UnknownToken       = 4,
    NotOwner           = 5,
    InvalidConfig      = 6,
    Overflow           = 7,
}

// ---------------------------------------------------------------------------
// Storage Types
// ---------------------------------------------------------------------------

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    // --- instance() ---
    Admin,
    Minter,
    /// One image reference per tier, indexed by `Tier::index`.
    TierImages,
    NextTokenId,
    // --- persistent() ---
    Owner(u64),
    Metadata(u64),
    Balance(Address),
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[contractevent]
pub struct Minted {
    #[topic]
    pub to: Address,
    pub token_id: u64,
    pub tier: Tier,
}

#[contractevent]
pub struct Transferred {
    #[topic]
    pub from: Address,
    #[topic]
    pub to: Address,
    pub token_id: u64,
}

#[contractevent]
pub struct MinterChanged {
    pub minter: Address,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct AchievementToken;

#[contractimpl]
impl AchievementToken {
    /// Initialize the issuer. `minter` is the only address allowed to mint
    /// (the throne contract). `tier_images` must hold one entry per tier.
    pub fn init(
        env: Env,
        admin: Address,
        minter: Address,
        tier_images: Vec<String>,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Admin) {
            return Err(Error::AlreadyInitialized);
        }
        if tier_images.len() != TIER_COUNT {
            return Err(Error::InvalidConfig);
        }

        admin.require_auth();

        env.storage().instance().set(&DataKey::Admin, &admin);
        env.storage().instance().set(&DataKey::Minter, &minter);
        env.storage().instance().set(&DataKey::TierImages, &tier_images);
        env.storage()
            .instance()
            .set(&DataKey::NextTokenId, &FIRST_TOKEN_ID);

        Ok(())
    }

    /// Replace the minter. Admin only.
    pub fn set_minter(env: Env, admin: Address, minter: Address) -> Result<(), Error> {
        require_admin(&env, &admin)?;
        env.storage().instance().set(&DataKey::Minter, &minter);
        MinterChanged { minter }.publish(&env);
        Ok(())
    }

    /// Mint the next token id to `to`. Minter only.
    pub fn mint(
        env: Env,
        minter: Address,
        to: Address,
        metadata: TokenMetadata,
    ) -> Result<u64, Error> {
        require_minter(&env, &minter)?;

        let token_id = next_token_id(&env)?;
        let following = token_id.checked_add(1).ok_or(Error::Overflow)?;
        env.storage()
            .instance()
            .set(&DataKey::NextTokenId, &following);

        let balance = get_balance(&env, &to)
            .checked_add(1)
            .ok_or(Error::Overflow)?;
        set_balance(&env, &to, balance);

        let tier = metadata.tier;
        set_persistent(&env, DataKey::Owner(token_id), &to);
        set_persistent(&env, DataKey::Metadata(token_id), &metadata);

        Minted { to, token_id, tier }.publish(&env);

        Ok(token_id)
    }

    /// Move `token_id` from `from` to `to`. `from` must own it and sign.
    pub fn transfer(env: Env, from: Address, to: Address, token_id: u64) -> Result<(), Error> {
        require_initialized(&env)?;
        from.require_auth();

        let owner = get_owner(&env, token_id)?;
        if owner != from {
            return Err(Error::NotOwner);
        }

        if from != to {
            let from_balance = get_balance(&env, &from)
                .checked_sub(1)
                .ok_or(Error::Overflow)?;
            let to_balance = get_balance(&env, &to)
                .checked_add(1)
                .ok_or(Error::Overflow)?;
            set_balance(&env, &from, from_balance);
            set_balance(&env, &to, to_balance);
            set_persistent(&env, DataKey::Owner(token_id), &to);
        }

        Transferred { from, to, token_id }.publish(&env);

        Ok(())
    }

    /// Build the display document for `token_id`: name, tier image and the
    /// attributes recorded at mint time.
    pub fn token_uri(env: Env, token_id: u64) -> Result<TokenDocument, Error> {
        let owner = get_owner(&env, token_id)?;
        let metadata: TokenMetadata = env
            .storage()
            .persistent()
            .get(&DataKey::Metadata(token_id))
            .ok_or(Error::UnknownToken)?;

        let images: Vec<String> = env
            .storage()
            .instance()
            .get(&DataKey::TierImages)
            .ok_or(Error::NotInitialized)?;
        let image = images
            .get(metadata.tier.index())
            .ok_or(Error::InvalidConfig)?;

        Ok(TokenDocument {
            token_id,
            name: String::from_str(&env, TOKEN_NAME),
            image,
            owner,
            tier: metadata.tier,
            round_id: metadata.round_id,
            deposit_number: metadata.deposit_number,
            minted_at: metadata.minted_at,
        })
    }

    pub fn owner_of(env: Env, token_id: u64) -> Result<Address, Error> {
        get_owner(&env, token_id)
    }

    /// Number of tokens currently owned by `owner`.
    pub fn balance_of(env: Env, owner: Address) -> u32 {
        get_balance(&env, &owner)
    }

    /// Number of tokens minted so far.
    pub fn total_minted(env: Env) -> u64 {
        let next: u64 = env
            .storage()
            .instance()
            .get(&DataKey::NextTokenId)
            .unwrap_or(FIRST_TOKEN_ID);
        next - FIRST_TOKEN_ID
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn require_initialized(env: &Env) -> Result<(), Error> {
    if !env.storage().instance().has(&DataKey::Admin) {
        return Err(Error::NotInitialized);
    }
    Ok(())
}

fn require_admin(env: &Env, caller: &Address) -> Result<(), Error> {
    let admin: Address = env
        .storage()
        .instance()
        .get(&DataKey::Admin)
        .ok_or(Error::NotInitialized)?;
    caller.require_auth();
    if caller != &admin {
        return Err(Error::NotAuthorized);
    }
    Ok(())
}

fn require_minter(env: &Env, caller: &Address) -> Result<(), Error> {
    let minter: Address = env
        .storage()
        .instance()
        .get(&DataKey::Minter)
        .ok_or(Error::NotInitialized)?;
    caller.require_auth();
    if caller != &minter {
        return Err(Error::NotAuthorized);
    }
    Ok(())
}

fn next_token_id(env: &Env) -> Result<u64, Error> {
    env.storage()
        .instance()
        .get(&DataKey::NextTokenId)
        .ok_or(Error::NotInitialized)
}

fn get_owner(env: &Env, token_id: u64) -> Result<Address, Error> {
    env.storage()
        .persistent()
        .get(&DataKey::Owner(token_id))
        .ok_or(Error::UnknownToken)
}

fn get_balance(env: &Env, owner: &Address) -> u32 {
    env.storage()
        .persistent()
        .get(&DataKey::Balance(owner.clone()))
        .unwrap_or(0)
}

fn set_balance(env: &Env, owner: &Address, balance: u32) {
    let key = DataKey::Balance(owner.clone());
    if balance == 0 {
        env.storage().persistent().remove(&key);
    } else {
        set_persistent(env, key, &balance);
    }
}

/// Write a persistent entry and extend its TTL in one step.
fn set_persistent<V>(env: &Env, key: DataKey, value: &V)
where
    V: soroban_sdk::IntoVal<Env, soroban_sdk::Val>,
{
    env.storage().persistent().set(&key, value);
    env.storage()
        .persistent()
        .extend_ttl(&key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
