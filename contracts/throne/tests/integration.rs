use occupy_achievement_token::{AchievementToken, AchievementTokenClient};
use occupy_throne::{Error, Throne, ThroneClient, BASE_DURATION_SECS, ENTRY_FEE};
use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype,
    testutils::{Address as _, Ledger},
    vec, Address, Env, MuxedAddress, String,
};

// -------------------------------------------------------------------
// Gated token: a SEP-41 style `transfer` that refuses blocked recipients.
// -------------------------------------------------------------------

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum GateError {
    Blocked = 1,
    InsufficientBalance = 2,
}

#[contracttype]
#[derive(Clone)]
pub enum GateKey {
    Balance(Address),
    Blocked(Address),
}

#[contract]
pub struct GatedToken;

#[contractimpl]
impl GatedToken {
    pub fn mint(env: Env, to: Address, amount: i128) {
        let balance = Self::balance(env.clone(), to.clone());
        env.storage()
            .persistent()
            .set(&GateKey::Balance(to), &(balance + amount));
    }

    pub fn set_blocked(env: Env, who: Address, blocked: bool) {
        env.storage()
            .persistent()
            .set(&GateKey::Blocked(who), &blocked);
    }

    pub fn balance(env: Env, id: Address) -> i128 {
        env.storage()
            .persistent()
            .get(&GateKey::Balance(id))
            .unwrap_or(0)
    }

    pub fn transfer(
        env: Env,
        from: Address,
        to: MuxedAddress,
        amount: i128,
    ) -> Result<(), GateError> {
        from.require_auth();
        let to = to.address();

        let blocked: bool = env
            .storage()
            .persistent()
            .get(&GateKey::Blocked(to.clone()))
            .unwrap_or(false);
        if blocked {
            return Err(GateError::Blocked);
        }

        let from_balance = Self::balance(env.clone(), from.clone());
        if from_balance < amount {
            return Err(GateError::InsufficientBalance);
        }
        let to_balance = Self::balance(env.clone(), to.clone());
        env.storage()
            .persistent()
            .set(&GateKey::Balance(from), &(from_balance - amount));
        env.storage()
            .persistent()
            .set(&GateKey::Balance(to), &(to_balance + amount));
        Ok(())
    }
}

// -------------------------------------------------------------------
// Helpers
// -------------------------------------------------------------------

const T0: u64 = 1_700_000_000;

struct World<'a> {
    throne: ThroneClient<'a>,
    nft: AchievementTokenClient<'a>,
    token: GatedTokenClient<'a>,
    throne_id: Address,
    owner: Address,
}

fn world(env: &Env) -> World<'_> {
    let owner = Address::generate(env);

    let token_id = env.register(GatedToken, ());
    let token = GatedTokenClient::new(env, &token_id);

    let throne_id = env.register(Throne, ());
    let throne = ThroneClient::new(env, &throne_id);

    let nft_id = env.register(AchievementToken, ());
    let nft = AchievementTokenClient::new(env, &nft_id);

    env.mock_all_auths();
    let images = vec![
        env,
        String::from_str(env, "ipfs://throne/squire.svg"),
        String::from_str(env, "ipfs://throne/knight.svg"),
        String::from_str(env, "ipfs://throne/veteran.svg"),
    ];
    nft.init(&owner, &throne_id, &images);
    throne.init(&owner, &token_id, &nft_id);
    env.ledger().set_timestamp(T0);

    World {
        throne,
        nft,
        token,
        throne_id,
        owner,
    }
}

fn funded(env: &Env, w: &World) -> Address {
    let p = Address::generate(env);
    w.token.mint(&p, &1_000_000i128);
    p
}

fn assert_ledger_balanced(w: &World) {
    let ledger = w.throne.ledger_state();
    assert_eq!(
        ledger.prize_pool + ledger.total_escrowed + ledger.accrued_fees,
        w.token.balance(&w.throne_id)
    );
}

// -------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------

#[test]
fn test_failed_auto_withdraw_rolls_back_settlement() {
    let env = Env::default();
    let w = world(&env);
    let a = funded(&env, &w);

    w.throne.occupy(&a, &ENTRY_FEE);
    env.ledger().set_timestamp(T0 + BASE_DURATION_SECS + 1);
    w.token.set_blocked(&a, &true);

    let result = w.throne.try_settle_round(&a);
    assert_eq!(result, Err(Ok(Error::TransferFailed)));

    // Nothing from the settlement survived.
    assert_eq!(w.throne.game_round(), 1);
    assert_eq!(w.throne.prize_pool(), ENTRY_FEE);
    assert_eq!(w.throne.last_depositor(), Some(a.clone()));
    assert_eq!(w.throne.pending_withdrawals(&a), 0);
    assert_eq!(w.throne.user_stats(&a).win_count, 0);
    assert_ledger_balanced(&w);
}

#[test]
fn test_failed_withdraw_keeps_escrow() {
    let env = Env::default();
    let w = world(&env);
    let a = funded(&env, &w);
    let keeper = Address::generate(&env);

    w.throne.occupy(&a, &ENTRY_FEE);
    env.ledger().set_timestamp(T0 + BASE_DURATION_SECS);
    w.throne.settle_round(&keeper);
    assert_eq!(w.throne.pending_withdrawals(&a), 90_000);

    w.token.set_blocked(&a, &true);
    assert_eq!(w.throne.try_withdraw(&a), Err(Ok(Error::TransferFailed)));
    assert_eq!(w.throne.pending_withdrawals(&a), 90_000);
    assert_ledger_balanced(&w);

    w.token.set_blocked(&a, &false);
    w.throne.withdraw(&a);
    assert_eq!(w.throne.pending_withdrawals(&a), 0);
    assert_eq!(w.token.balance(&a), 1_000_000 - ENTRY_FEE + 90_000);
    assert_ledger_balanced(&w);
}

#[test]
fn test_many_rounds_keep_ledger_balanced() {
    let env = Env::default();
    let w = world(&env);
    let players = [funded(&env, &w), funded(&env, &w), funded(&env, &w)];

    let mut now = T0;
    let mut last_round = w.throne.game_round();
    let mut last_token = 0u64;

    for round in 0..4usize {
        for turn in 0..(round + 2) {
            let who = &players[(round + turn) % players.len()];
            now += 30;
            env.ledger().set_timestamp(now);
            w.throne.occupy(who, &ENTRY_FEE);

            let token_id = w.throne.user_stats(who).latest_token_id;
            assert!(token_id > last_token);
            last_token = token_id;
            assert_ledger_balanced(&w);
        }

        // Every other round is closed by the next occupation instead.
        now += BASE_DURATION_SECS;
        env.ledger().set_timestamp(now);
        if round % 2 == 0 {
            w.throne.settle_round(&w.owner);
        }

        let current = w.throne.game_round();
        assert!(current >= last_round);
        last_round = current;
        assert_ledger_balanced(&w);
    }

    for p in players.iter() {
        if w.throne.pending_withdrawals(p) > 0 {
            w.throne.withdraw(p);
        }
    }
    w.throne.collect_fees(&w.owner, &w.owner);

    // Only the unsettled last round's pot remains in the contract.
    let ledger = w.throne.ledger_state();
    assert_eq!(ledger.total_escrowed, 0);
    assert_eq!(ledger.accrued_fees, 0);
    assert_eq!(w.token.balance(&w.throne_id), ledger.prize_pool);
    assert_eq!(w.nft.total_minted(), last_token);
}
