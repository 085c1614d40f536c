//! Shared types and helpers for the Occupy contracts.
//!
//! Holds the fee arithmetic used at settlement, the achievement tier model,
//! and the cross-contract interface the throne contract uses to reach the
//! achievement token issuer.
#![no_std]
#![allow(unexpected_cfgs)]

use soroban_sdk::{contractclient, contracttype, Address, Env, String};

/// Common error codes for the shared helpers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Error {
    InvalidAmount = 1,
    Overflow = 2,
}

/// Constant for basis points divisor.
pub const BASIS_POINTS_DIVISOR: u32 = 10_000;

/// Deposits needed to reach the Knight tier.
pub const KNIGHT_THRESHOLD: u32 = 5;

/// Deposits needed to unlock the Veteran rank (and the Veteran tier).
pub const VETERAN_THRESHOLD: u32 = 11;

/// Contract error code the issuer returns for an id it never minted.
pub const ISSUER_UNKNOWN_TOKEN: u32 = 4;

/// Number of achievement tiers; the issuer stores one image per tier.
pub const TIER_COUNT: u32 = 3;

/// Helper to calculate fee based on amount and basis points.
pub fn calculate_fee(amount: i128, fee_bps: u32) -> Result<i128, Error> {
    if amount < 0 {
        return Err(Error::InvalidAmount);
    }
    if fee_bps > BASIS_POINTS_DIVISOR {
        return Err(Error::InvalidAmount);
    }
    amount
        .checked_mul(fee_bps as i128)
        .and_then(|v| v.checked_div(BASIS_POINTS_DIVISOR as i128))
        .ok_or(Error::Overflow)
}

/// Split a pot into `(winner_share, fee)`. The two parts always sum to `pool`.
pub fn split_pool(pool: i128, fee_bps: u32) -> Result<(i128, i128), Error> {
    let fee = calculate_fee(pool, fee_bps)?;
    let share = pool.checked_sub(fee).ok_or(Error::Overflow)?;
    Ok((share, fee))
}

// ---------------------------------------------------------------------------
// Achievement model
// ---------------------------------------------------------------------------

/// Display tier of an achievement token, derived from the depositor's
/// running deposit count at mint time.
#[contracttype]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Tier {
    Squire = 0,
    Knight = 1,
    Veteran = 2,
}

impl Tier {
    /// Tier for the `deposit_number`-th deposit of a player (1-based).
    pub fn for_deposit(deposit_number: u32) -> Tier {
        if deposit_number >= VETERAN_THRESHOLD {
            Tier::Veteran
        } else if deposit_number >= KNIGHT_THRESHOLD {
            Tier::Knight
        } else {
            Tier::Squire
        }
    }

    pub fn index(self) -> u32 {
        self as u32
    }
}

/// Metadata recorded with every minted token.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenMetadata {
    pub round_id: u64,
    /// The owner's deposit count including the deposit that minted this token.
    pub deposit_number: u32,
    pub tier: Tier,
    pub minted_at: u64,
}

/// Self-contained descriptor returned by `token_uri`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TokenDocument {
    pub token_id: u64,
    pub name: String,
    pub image: String,
    pub owner: Address,
    pub tier: Tier,
    pub round_id: u64,
    pub deposit_number: u32,
    pub minted_at: u64,
}

/// Capability set the throne contract needs from the achievement issuer.
#[contractclient(name = "AchievementTokenClient")]
pub trait AchievementTokenInterface {
    fn mint(env: Env, minter: Address, to: Address, metadata: TokenMetadata) -> u64;
    fn token_uri(env: Env, token_id: u64) -> TokenDocument;
    fn owner_of(env: Env, token_id: u64) -> Address;
    fn balance_of(env: Env, owner: Address) -> u32;
}
