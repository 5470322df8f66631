//! Integration tests for reward distribution.
//!
//! Funding pulls reward tokens from the owner through an allowance, claims
//! pay out pro rata to vault balances. Every scenario runs through the
//! executor so token transfers and the yield vault's bookkeeping commit or
//! revert together.

use shm_contracts::chain::{Call, Chain, Transaction};
use shm_contracts::genesis::{Deployment, GenesisConfig};
use shm_protocol::error::ErrorKind;
use shm_protocol::units::unit;
use shm_protocol::{Address, Amount, LedgerEvent, Receipt};

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn shm(n: u128) -> Amount {
    n * unit(18).unwrap()
}

fn owner() -> Address {
    Address::from_label("owner")
}

fn user1() -> Address {
    Address::from_label("user1")
}

fn user2() -> Address {
    Address::from_label("user2")
}

fn setup() -> (Chain, Deployment) {
    let genesis = GenesisConfig::development().build().expect("dev genesis");
    (genesis.chain, genesis.deployment)
}

fn ok(receipt: Receipt) -> Receipt {
    assert!(receipt.status.is_success(), "{} reverted: {:?}", receipt.method, receipt.status);
    receipt
}

fn deposit(chain: &mut Chain, d: &Deployment, who: Address, amount: Amount) {
    ok(chain.execute(
        Transaction::new(
            who,
            Call::Deposit {
                contract: d.deposit_vault,
                vault_id: 1,
            },
        )
        .with_value(amount),
    ));
}

fn approve(chain: &mut Chain, d: &Deployment, amount: Amount) {
    ok(chain.execute(Transaction::new(
        owner(),
        Call::Approve {
            contract: d.token,
            spender: d.yield_vault,
            amount,
        },
    )));
}

fn fund(chain: &mut Chain, d: &Deployment, amount: Amount) -> Receipt {
    chain.execute(Transaction::new(
        owner(),
        Call::FundRewards {
            contract: d.yield_vault,
            vault_id: 1,
            amount,
        },
    ))
}

fn claim(chain: &mut Chain, d: &Deployment, who: Address) -> Receipt {
    chain.execute(Transaction::new(
        who,
        Call::ClaimYield {
            contract: d.yield_vault,
            vault_id: 1,
        },
    ))
}

fn tokens(chain: &Chain, d: &Deployment, who: &Address) -> Amount {
    chain.token_balance(&d.token, who).unwrap()
}

/// The yield vault always holds what it still owes.
fn assert_covered(chain: &Chain, d: &Deployment) {
    let pool = chain.reward_pool(&d.yield_vault, 1).unwrap();
    let owed = pool.map(|p| p.remaining()).unwrap_or(0);
    assert!(tokens(chain, d, &d.yield_vault) >= owed);
}

// ---------------------------------------------------------------------------
// Distribution
// ---------------------------------------------------------------------------

#[test]
fn rewards_split_pro_rata() {
    let (mut chain, d) = setup();
    deposit(&mut chain, &d, user1(), shm(3));
    deposit(&mut chain, &d, user2(), shm(7));
    approve(&mut chain, &d, shm(100));

    let funded = ok(fund(&mut chain, &d, shm(100)));
    let names: Vec<_> = funded.events.iter().map(|r| r.event.name()).collect();
    assert_eq!(names, vec!["Transfer", "RewardsFunded"]);

    assert_eq!(chain.pending_yield(&d.yield_vault, 1, &user1()), Ok(shm(30)));
    ok(claim(&mut chain, &d, user1()));
    ok(claim(&mut chain, &d, user2()));

    assert_eq!(tokens(&chain, &d, &user1()), shm(30));
    assert_eq!(tokens(&chain, &d, &user2()), shm(70));
    assert_eq!(tokens(&chain, &d, &d.yield_vault), 0);
    assert_covered(&chain, &d);
}

#[test]
fn claim_event_carries_round_and_amount() {
    let (mut chain, d) = setup();
    deposit(&mut chain, &d, user1(), shm(1));
    approve(&mut chain, &d, shm(10));
    ok(fund(&mut chain, &d, shm(10)));

    let receipt = ok(claim(&mut chain, &d, user1()));
    let claimed = receipt
        .events
        .iter()
        .find_map(|r| match r.event {
            LedgerEvent::YieldClaimed { amount, round, .. } => Some((amount, round)),
            _ => None,
        })
        .expect("YieldClaimed");
    assert_eq!(claimed, (shm(10), 1));
}

#[test]
fn second_claim_in_a_round_is_rejected() {
    let (mut chain, d) = setup();
    deposit(&mut chain, &d, user1(), shm(3));
    deposit(&mut chain, &d, user2(), shm(7));
    approve(&mut chain, &d, shm(100));
    ok(fund(&mut chain, &d, shm(100)));

    ok(claim(&mut chain, &d, user1()));
    let again = claim(&mut chain, &d, user1());
    assert_eq!(again.revert_kind(), Some(ErrorKind::NothingToClaim));
    assert_eq!(tokens(&chain, &d, &user1()), shm(30));
    assert_eq!(chain.pending_yield(&d.yield_vault, 1, &user1()), Ok(0));
}

#[test]
fn unclaimed_rewards_carry_into_the_next_round() {
    let (mut chain, d) = setup();
    deposit(&mut chain, &d, user1(), shm(3));
    deposit(&mut chain, &d, user2(), shm(7));
    approve(&mut chain, &d, shm(150));

    ok(fund(&mut chain, &d, shm(100)));
    ok(claim(&mut chain, &d, user2()));

    // 30 left unclaimed by user1 joins the next 50.
    let second = ok(fund(&mut chain, &d, shm(50)));
    assert!(second.events.iter().any(|r| matches!(
        r.event,
        LedgerEvent::RewardsFunded { round: 2, .. }
    )));

    let pool = chain.reward_pool(&d.yield_vault, 1).unwrap().unwrap();
    assert_eq!(pool.total_funded, shm(80));
    assert_eq!(pool.round, 2);

    ok(claim(&mut chain, &d, user1()));
    ok(claim(&mut chain, &d, user2()));
    assert_eq!(tokens(&chain, &d, &user1()), shm(24));
    assert_eq!(tokens(&chain, &d, &user2()), shm(70) + shm(56));
    assert_covered(&chain, &d);
}

#[test]
fn late_depositors_cannot_overdraw_the_pool() {
    let (mut chain, d) = setup();
    deposit(&mut chain, &d, user1(), shm(1));
    approve(&mut chain, &d, shm(10));
    ok(fund(&mut chain, &d, shm(10)));

    // user2 deposits after the snapshot; their share is capped at what is left.
    deposit(&mut chain, &d, user2(), shm(5));
    ok(claim(&mut chain, &d, user2()));
    assert_eq!(tokens(&chain, &d, &user2()), shm(10));

    let starved = claim(&mut chain, &d, user1());
    assert_eq!(starved.revert_kind(), Some(ErrorKind::NothingToClaim));
    assert_covered(&chain, &d);
}

// ---------------------------------------------------------------------------
// Funding failures
// ---------------------------------------------------------------------------

#[test]
fn funding_without_allowance_reverts_cleanly() {
    let (mut chain, d) = setup();
    deposit(&mut chain, &d, user1(), shm(1));
    let before = tokens(&chain, &d, &owner());

    let receipt = fund(&mut chain, &d, shm(10));
    assert_eq!(receipt.revert_kind(), Some(ErrorKind::TransferFailed));
    assert_eq!(tokens(&chain, &d, &owner()), before);
    assert_eq!(chain.reward_pool(&d.yield_vault, 1), Ok(None));
}

#[test]
fn funding_an_empty_vault_reverts() {
    let (mut chain, d) = setup();
    approve(&mut chain, &d, shm(10));
    let receipt = fund(&mut chain, &d, shm(10));
    assert_eq!(receipt.revert_kind(), Some(ErrorKind::InvalidInput));
    assert_eq!(chain.allowance(&d.token, &owner(), &d.yield_vault), Ok(shm(10)));
}

#[test]
fn claiming_before_any_funding_reverts() {
    let (mut chain, d) = setup();
    deposit(&mut chain, &d, user1(), shm(1));
    let receipt = claim(&mut chain, &d, user1());
    assert_eq!(receipt.revert_kind(), Some(ErrorKind::NothingToClaim));
}

#[test]
fn funding_consumes_the_allowance() {
    let (mut chain, d) = setup();
    deposit(&mut chain, &d, user1(), shm(1));
    approve(&mut chain, &d, shm(25));
    ok(fund(&mut chain, &d, shm(10)));
    assert_eq!(chain.allowance(&d.token, &owner(), &d.yield_vault), Ok(shm(15)));
}

#[test]
fn only_the_token_owner_mints() {
    let (mut chain, d) = setup();
    let receipt = chain.execute(Transaction::new(
        user1(),
        Call::Mint {
            contract: d.token,
            to: user1(),
            amount: shm(1),
        },
    ));
    assert_eq!(receipt.revert_kind(), Some(ErrorKind::Unauthorized));
}
