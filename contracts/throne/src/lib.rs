//! Occupy Throne Contract
//!
//! A "king of the hill" round game. Players pay a fixed entry fee to seize
//! the throne; every seizure grows the prize pool and restarts the round
//! timer. Whoever holds the throne when the timer runs out wins the pool,
//! minus the house fee, through a pull-payment escrow.
//!
//! ## Round Lifecycle
//! 1. `occupy` on a round with `deadline == 0` starts it.
//! 2. Each further `occupy` slides the deadline to `now + BASE_DURATION_SECS`.
//! 3. Once `now >= deadline` the round has ended. It is settled either by an
//!    explicit `settle_round` or implicitly by the next `occupy`.
//! 4. Settlement credits the winner's escrow and opens the next round id.
//!
//! Expiry is evaluated lazily against the ledger timestamp; nothing runs
//! between invocations.
//!
//! ## Storage Strategy
//! - `instance()`: Owner, Token, Achievements. Fixed contract config.
//! - `persistent()`: Round, TotalEscrowed, AccruedFees, and per-address
//!   Escrow and Stats entries, each bumped on write.
//!
//! ## Invariant
//! `prize_pool + total_escrowed + accrued_fees == token.balance(contract)`,
//! assuming all token inflows go through `occupy`.
#![no_std]
#![allow(unexpected_cfgs)]

use occupy_shared::{
    split_pool, AchievementTokenClient, Tier, TokenDocument, TokenMetadata, ISSUER_UNKNOWN_TOKEN,
};
use soroban_sdk::{
    contract, contracterror, contractevent, contractimpl, contracttype, token::TokenClient,
    Address, Env,
};

pub use occupy_shared::VETERAN_THRESHOLD;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Persistent storage TTL in ledgers (~30 days at 5 s/ledger).
pub const PERSISTENT_BUMP_LEDGERS: u32 = 518_400;

/// Entry fee: 0.01 of a 7-decimal asset.
pub const ENTRY_FEE: i128 = 100_000;

/// Length of the window each occupation opens.
pub const BASE_DURATION_SECS: u64 = 600;

/// House fee taken from the pot at settlement (1000 bps = 10%).
pub const FEE_BPS: u32 = 1_000;

/// An occupation arriving with less than this much time left on the
/// previous deadline triggers a sudden-death notification.
pub const SUDDEN_DEATH_WINDOW_SECS: u64 = 60;

pub const FIRST_ROUND_ID: u64 = 1;

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
    InvalidPayment     = 4,
    RoundNotEnded      = 5,
    NoWinner           = 6,
    NoFunds            = 7,
    UnknownToken       = 8,
    TransferFailed     = 9,
    Overflow           = 10,
    IssuerFailed       = 11,
}

// ---------------------------------------------------------------------------
// Storage Types
// ---------------------------------------------------------------------------

#[contracttype]
#[derive(Clone)]
pub enum DataKey {
    // --- instance() ---
    Owner,
    Token,
    Achievements,
    // --- persistent() ---
    Round,
    /// Sum of every outstanding escrow balance.
    TotalEscrowed,
    /// Settlement fees not yet collected by the owner.
    AccruedFees,
    Escrow(Address),
    Stats(Address),
}

/// The live round. Exactly one exists after `init`.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoundState {
    pub round_id: u64,
    pub prize_pool: i128,
    /// 0 while the round has not started.
    pub deadline: u64,
    pub last_depositor: Option<Address>,
}

impl RoundState {
    fn fresh(round_id: u64) -> Self {
        RoundState {
            round_id,
            prize_pool: 0,
            deadline: 0,
            last_depositor: None,
        }
    }

    fn has_ended(&self, now: u64) -> bool {
        self.deadline != 0 && now >= self.deadline
    }
}

/// Per-player counters. Created on first deposit and kept across rounds.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PlayerStats {
    /// Most recently minted achievement token; 0 if none.
    pub latest_token_id: u64,
    pub deposit_count: u32,
    pub win_count: u32,
    pub last_occupied_at: u64,
    pub is_veteran: bool,
    /// Present in the public stats read with no assigned meaning yet.
    /// Always false.
    pub unresolved_flag: bool,
}

impl PlayerStats {
    fn empty() -> Self {
        PlayerStats {
            latest_token_id: 0,
            deposit_count: 0,
            win_count: 0,
            last_occupied_at: 0,
            is_veteran: false,
            unresolved_flag: false,
        }
    }
}

/// Snapshot of the value the contract is holding, by purpose.
#[contracttype]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LedgerState {
    pub prize_pool: i128,
    pub total_escrowed: i128,
    pub accrued_fees: i128,
}

#[contracttype]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum RoundStatus {
    NotStarted = 0,
    Active     = 1,
    /// Deadline passed; waiting for settlement.
    Ended      = 2,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[contractevent]
pub struct Initialized {
    pub owner: Address,
    pub token: Address,
    pub achievements: Address,
}

#[contractevent]
pub struct Occupied {
    #[topic]
    pub depositor: Address,
    pub prize_pool: i128,
    pub deadline: u64,
    pub round_id: u64,
}

#[contractevent]
pub struct SuddenDeathTriggered {
    pub new_deadline: u64,
}

#[contractevent]
pub struct WinnerArchived {
    #[topic]
    pub winner: Address,
    pub amount: i128,
    pub round_id: u64,
}

#[contractevent]
pub struct Withdrawal {
    #[topic]
    pub who: Address,
    pub amount: i128,
}

#[contractevent]
pub struct FeesCollected {
    #[topic]
    pub to: Address,
    pub amount: i128,
}

// ---------------------------------------------------------------------------
// Contract
// ---------------------------------------------------------------------------

#[contract]
pub struct Throne;

#[contractimpl]
impl Throne {
    // -----------------------------------------------------------------------
    // init
    // -----------------------------------------------------------------------

    /// Initialize the game. May only be called once.
    ///
    /// `token` is the SEP-41 asset entry fees are paid in. `achievements` is
    /// the achievement issuer; its minter must be set to this contract.
    pub fn init(
        env: Env,
        owner: Address,
        token: Address,
        achievements: Address,
    ) -> Result<(), Error> {
        if env.storage().instance().has(&DataKey::Owner) {
            return Err(Error::AlreadyInitialized);
        }

        owner.require_auth();

        env.storage().instance().set(&DataKey::Owner, &owner);
        env.storage().instance().set(&DataKey::Token, &token);
        env.storage()
            .instance()
            .set(&DataKey::Achievements, &achievements);

        set_round(&env, &RoundState::fresh(FIRST_ROUND_ID));
        set_persistent_i128(&env, DataKey::TotalEscrowed, 0);
        set_persistent_i128(&env, DataKey::AccruedFees, 0);

        Initialized {
            owner,
            token,
            achievements,
        }
        .publish(&env);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // occupy
    // -----------------------------------------------------------------------

    /// Seize the throne for exactly `ENTRY_FEE`.
    ///
    /// If the current round has already ended it is settled first, and this
    /// occupation opens the next round. The fee moves into the pot, the
    /// deadline slides to `now + BASE_DURATION_SECS`, and one achievement
    /// token is minted to `caller`.
    pub fn occupy(env: Env, caller: Address, amount: i128) -> Result<(), Error> {
        require_initialized(&env)?;
        caller.require_auth();

        if amount != ENTRY_FEE {
            return Err(Error::InvalidPayment);
        }

        let now = env.ledger().timestamp();
        let mut round = get_round(&env);
        if round.has_ended(now) && round.last_depositor.is_some() {
            let (next, _) = finalize_round(&env, round)?;
            round = next;
        }

        transfer_tokens(
            &env,
            &caller,
            &env.current_contract_address(),
            amount,
        )?;

        let previous_deadline = round.deadline;
        let new_deadline = now
            .checked_add(BASE_DURATION_SECS)
            .ok_or(Error::Overflow)?;

        round.prize_pool = round
            .prize_pool
            .checked_add(amount)
            .ok_or(Error::Overflow)?;
        round.last_depositor = Some(caller.clone());
        round.deadline = new_deadline;
        set_round(&env, &round);

        if is_sudden_death(previous_deadline, now) {
            SuddenDeathTriggered { new_deadline }.publish(&env);
        }

        let mut stats = get_stats(&env, &caller);
        let deposit_number = stats
            .deposit_count
            .checked_add(1)
            .ok_or(Error::Overflow)?;
        let metadata = TokenMetadata {
            round_id: round.round_id,
            deposit_number,
            tier: Tier::for_deposit(deposit_number),
            minted_at: now,
        };
        let token_id =
            achievements_client(&env).mint(&env.current_contract_address(), &caller, &metadata);

        stats.latest_token_id = token_id;
        stats.deposit_count = deposit_number;
        stats.last_occupied_at = now;
        stats.is_veteran = deposit_number >= VETERAN_THRESHOLD;
        set_stats(&env, &caller, &stats);

        Occupied {
            depositor: caller,
            prize_pool: round.prize_pool,
            deadline: round.deadline,
            round_id: round.round_id,
        }
        .publish(&env);

        Ok(())
    }

    // -----------------------------------------------------------------------
    // settle_round
    // -----------------------------------------------------------------------

    /// Settle an ended round. Anyone may call this.
    ///
    /// When the caller is the winner, their winnings are withdrawn in the
    /// same invocation.
    pub fn settle_round(env: Env, caller: Address) -> Result<(), Error> {
        require_initialized(&env)?;
        caller.require_auth();

        let now = env.ledger().timestamp();
        let round = get_round(&env);
        if round.last_depositor.is_none() {
            return Err(Error::NoWinner);
        }
        if !round.has_ended(now) {
            return Err(Error::RoundNotEnded);
        }

        let (_, winner) = finalize_round(&env, round)?;

        if caller == winner {
            pay_out_escrow(&env, &caller)?;
        }

        Ok(())
    }

    // -----------------------------------------------------------------------
    // withdraw
    // -----------------------------------------------------------------------

    /// Withdraw the caller's whole escrow balance.
    pub fn withdraw(env: Env, caller: Address) -> Result<(), Error> {
        require_initialized(&env)?;
        caller.require_auth();

        pay_out_escrow(&env, &caller)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // collect_fees
    // -----------------------------------------------------------------------

    /// Send every accrued settlement fee to `to`. Owner only.
    pub fn collect_fees(env: Env, owner: Address, to: Address) -> Result<i128, Error> {
        require_owner(&env, &owner)?;

        let amount = get_persistent_i128(&env, DataKey::AccruedFees);
        if amount <= 0 {
            return Err(Error::NoFunds);
        }

        set_persistent_i128(&env, DataKey::AccruedFees, 0);
        transfer_tokens(&env, &env.current_contract_address(), &to, amount)?;

        FeesCollected { to, amount }.publish(&env);

        Ok(amount)
    }

    // -----------------------------------------------------------------------
    // Read accessors
    // -----------------------------------------------------------------------

    pub fn prize_pool(env: Env) -> i128 {
        get_round(&env).prize_pool
    }

    pub fn deadline(env: Env) -> u64 {
        get_round(&env).deadline
    }

    pub fn last_depositor(env: Env) -> Option<Address> {
        get_round(&env).last_depositor
    }

    pub fn game_round(env: Env) -> u64 {
        get_round(&env).round_id
    }

    pub fn owner(env: Env) -> Result<Address, Error> {
        env.storage()
            .instance()
            .get(&DataKey::Owner)
            .ok_or(Error::NotInitialized)
    }

    pub fn pending_withdrawals(env: Env, who: Address) -> i128 {
        get_escrow(&env, &who)
    }

    /// Stats for `who`; an all-zero record if they never played.
    pub fn user_stats(env: Env, who: Address) -> PlayerStats {
        get_stats(&env, &who)
    }

    /// Metadata document of an achievement token.
    ///
    /// Only the issuer's unknown-id error maps to `UnknownToken`; any other
    /// issuer failure is reported as `IssuerFailed`.
    pub fn token_uri(env: Env, token_id: u64) -> Result<TokenDocument, Error> {
        require_initialized(&env)?;
        match achievements_client(&env).try_token_uri(&token_id) {
            Ok(Ok(document)) => Ok(document),
            Err(Ok(err)) if err == soroban_sdk::Error::from_contract_error(ISSUER_UNKNOWN_TOKEN) => {
                Err(Error::UnknownToken)
            }
            _ => Err(Error::IssuerFailed),
        }
    }

    /// Number of achievement tokens `who` currently owns.
    pub fn balance_of(env: Env, who: Address) -> u32 {
        if require_initialized(&env).is_err() {
            return 0;
        }
        achievements_client(&env).balance_of(&who)
    }

    pub fn round_state(env: Env) -> RoundState {
        get_round(&env)
    }

    /// Lifecycle phase of the live round at the current ledger timestamp.
    pub fn round_status(env: Env) -> RoundStatus {
        let round = get_round(&env);
        if round.deadline == 0 {
            RoundStatus::NotStarted
        } else if round.has_ended(env.ledger().timestamp()) {
            RoundStatus::Ended
        } else {
            RoundStatus::Active
        }
    }

    pub fn ledger_state(env: Env) -> LedgerState {
        LedgerState {
            prize_pool: get_round(&env).prize_pool,
            total_escrowed: get_persistent_i128(&env, DataKey::TotalEscrowed),
            accrued_fees: get_persistent_i128(&env, DataKey::AccruedFees),
        }
    }
}

// ---------------------------------------------------------------------------
// Settlement and escrow
// ---------------------------------------------------------------------------

/// Archive the winner of an ended round and open the next one.
///
/// Credits the winner's escrow with the pot minus the fee, bumps their win
/// count and stores a fresh round. No value leaves the contract here.
fn finalize_round(env: &Env, round: RoundState) -> Result<(RoundState, Address), Error> {
    let winner = round.last_depositor.clone().ok_or(Error::NoWinner)?;
    let (winner_share, fee) =
        split_pool(round.prize_pool, FEE_BPS).map_err(|_| Error::Overflow)?;

    let balance = get_escrow(env, &winner)
        .checked_add(winner_share)
        .ok_or(Error::Overflow)?;
    set_persistent_i128(env, DataKey::Escrow(winner.clone()), balance);

    let total_escrowed = get_persistent_i128(env, DataKey::TotalEscrowed)
        .checked_add(winner_share)
        .ok_or(Error::Overflow)?;
    set_persistent_i128(env, DataKey::TotalEscrowed, total_escrowed);

    let accrued_fees = get_persistent_i128(env, DataKey::AccruedFees)
        .checked_add(fee)
        .ok_or(Error::Overflow)?;
    set_persistent_i128(env, DataKey::AccruedFees, accrued_fees);

    let mut stats = get_stats(env, &winner);
    stats.win_count = stats.win_count.checked_add(1).ok_or(Error::Overflow)?;
    set_stats(env, &winner, &stats);

    WinnerArchived {
        winner: winner.clone(),
        amount: winner_share,
        round_id: round.round_id,
    }
    .publish(env);

    let next_id = round.round_id.checked_add(1).ok_or(Error::Overflow)?;
    let next = RoundState::fresh(next_id);
    set_round(env, &next);

    Ok((next, winner))
}

/// Pay `who` their full escrow balance.
///
/// The entry is removed before the token transfer. A failed transfer
/// returns `TransferFailed` and the host rolls the removal back.
fn pay_out_escrow(env: &Env, who: &Address) -> Result<i128, Error> {
    let amount = get_escrow(env, who);
    if amount <= 0 {
        return Err(Error::NoFunds);
    }

    env.storage()
        .persistent()
        .remove(&DataKey::Escrow(who.clone()));
    let total_escrowed = get_persistent_i128(env, DataKey::TotalEscrowed)
        .checked_sub(amount)
        .ok_or(Error::Overflow)?;
    set_persistent_i128(env, DataKey::TotalEscrowed, total_escrowed);

    transfer_tokens(env, &env.current_contract_address(), who, amount)?;

    Withdrawal {
        who: who.clone(),
        amount,
    }
    .publish(env);

    Ok(amount)
}

fn is_sudden_death(previous_deadline: u64, now: u64) -> bool {
    previous_deadline != 0
        && now < previous_deadline
        && previous_deadline - now < SUDDEN_DEATH_WINDOW_SECS
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn require_initialized(env: &Env) -> Result<(), Error> {
    if !env.storage().instance().has(&DataKey::Owner) {
        return Err(Error::NotInitialized);
    }
    Ok(())
}

/// Verify that `caller` is the stored owner and has signed the invocation.
fn require_owner(env: &Env, caller: &Address) -> Result<(), Error> {
    let owner: Address = env
        .storage()
        .instance()
        .get(&DataKey::Owner)
        .ok_or(Error::NotInitialized)?;
    caller.require_auth();
    if caller != &owner {
        return Err(Error::NotAuthorized);
    }
    Ok(())
}

fn transfer_tokens(env: &Env, from: &Address, to: &Address, amount: i128) -> Result<(), Error> {
    let token: Address = env
        .storage()
        .instance()
        .get(&DataKey::Token)
        .ok_or(Error::NotInitialized)?;
    match TokenClient::new(env, &token).try_transfer(from, to, &amount) {
        Ok(Ok(())) => Ok(()),
        _ => Err(Error::TransferFailed),
    }
}

fn achievements_client(env: &Env) -> AchievementTokenClient<'_> {
    let achievements: Address = env
        .storage()
        .instance()
        .get(&DataKey::Achievements)
        .expect("Throne: achievements not set");
    AchievementTokenClient::new(env, &achievements)
}

fn get_round(env: &Env) -> RoundState {
    env.storage()
        .persistent()
        .get(&DataKey::Round)
        .unwrap_or(RoundState::fresh(FIRST_ROUND_ID))
}

fn set_round(env: &Env, round: &RoundState) {
    env.storage().persistent().set(&DataKey::Round, round);
    env.storage().persistent().extend_ttl(
        &DataKey::Round,
        PERSISTENT_BUMP_LEDGERS,
        PERSISTENT_BUMP_LEDGERS,
    );
}

fn get_stats(env: &Env, who: &Address) -> PlayerStats {
    env.storage()
        .persistent()
        .get(&DataKey::Stats(who.clone()))
        .unwrap_or(PlayerStats::empty())
}

fn set_stats(env: &Env, who: &Address, stats: &PlayerStats) {
    let key = DataKey::Stats(who.clone());
    env.storage().persistent().set(&key, stats);
    env.storage()
        .persistent()
        .extend_ttl(&key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}

fn get_escrow(env: &Env, who: &Address) -> i128 {
    get_persistent_i128(env, DataKey::Escrow(who.clone()))
}

fn get_persistent_i128(env: &Env, key: DataKey) -> i128 {
    env.storage().persistent().get(&key).unwrap_or(0)
}

/// Write an i128 to persistent storage and extend its TTL in one step.
fn set_persistent_i128(env: &Env, key: DataKey, value: i128) {
    env.storage().persistent().set(&key, &value);
    env.storage()
        .persistent()
        .extend_ttl(&key, PERSISTENT_BUMP_LEDGERS, PERSISTENT_BUMP_LEDGERS);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
