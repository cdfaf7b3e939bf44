//! Integration test: lock tiers and reward epochs.
//!
//! Covers the standard/large hold periods, the epoch window, forfeited
//! emission while nothing is staked, and reinitialization after an epoch
//! has finished.

use tea_integration_tests::{descriptor, Harness, ADMIN, BASE_TIME, TEA};
use tea_staking::attestation::AttestationDomain;
use tea_staking::budget::DEFAULT_TOTAL_ALLOCATION;
use tea_staking::lock::{LockTier, EPOCH_DURATION};
use tea_staking::StakingError;
use tea_types::{days, tokens};

const ALICE: [u8; 32] = [0xA1; 32];
const BOB: [u8; 32] = [0xB0; 32];

#[test]
fn standard_and_large_stakes_after_15_days() {
    let mut h = Harness::new();
    let small = h.stake_primary(&ALICE, tokens(50_000), BASE_TIME);
    let large = h.stake_primary(&BOB, tokens(1_000_001), BASE_TIME);
    assert_eq!(h.ledger.position(small).expect("small").tier, LockTier::Standard);
    assert_eq!(h.ledger.position(large).expect("large").tier, LockTier::Large);

    let now = BASE_TIME + days(15);
    let request = h.exit_request(AttestationDomain::Unstake, &ALICE, vec![small], vec![0], now);
    h.ledger.unstake(&request, now).expect("standard stake unlocks after 7 days");

    let request = h.exit_request(AttestationDomain::Unstake, &BOB, vec![large], vec![0], now);
    let err = h.ledger.unstake(&request, now).unwrap_err();
    assert!(matches!(
        err,
        StakingError::LockedPeriodNotPassed { id, unlocks_at }
            if id == large && unlocks_at == BASE_TIME + days(395)
    ));

    // One year plus the protect window later the large stake unlocks,
    // even though the epoch has ended by then.
    let later = BASE_TIME + days(395);
    let request = h.exit_request(AttestationDomain::Unstake, &BOB, vec![large], vec![0], later);
    h.ledger.unstake(&request, later).expect("large stake unlocks");
}

#[test]
fn threshold_is_inclusive() {
    let mut h = Harness::new();
    let id = h.stake_primary(&ALICE, tokens(1_000_000), BASE_TIME);
    assert_eq!(h.ledger.position(id).expect("position").tier, LockTier::Large);
}

#[test]
fn emission_while_nothing_is_staked_is_forfeited() {
    let mut h = Harness::new();
    h.stake_primary(&ALICE, tokens(100), BASE_TIME + days(10));

    let emitted = h
        .ledger
        .update_reward_per_share(BASE_TIME + days(20))
        .expect("refresh");
    let ten_days = u128::from(days(10)) * DEFAULT_TOTAL_ALLOCATION / u128::from(EPOCH_DURATION);
    assert_eq!(emitted, ten_days);
    assert_eq!(h.ledger.reward_state().distributed, ten_days);
}

#[test]
fn reinitialization_carries_accrual_forward() {
    let mut h = Harness::new();
    let id = h.stake_primary(&ALICE, tokens(100), BASE_TIME);

    // A running epoch cannot be restarted.
    let err = h
        .ledger
        .initialize_staking(
            &ADMIN,
            DEFAULT_TOTAL_ALLOCATION,
            BASE_TIME + days(100),
            BASE_TIME + days(100),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        StakingError::StakingAlreadyInitialized { ends_at } if ends_at == BASE_TIME + EPOCH_DURATION
    ));

    // =========================================================
    // The epoch ends: emission is capped and staking closes
    // =========================================================
    let after = BASE_TIME + EPOCH_DURATION + 1;
    h.ledger.update_reward_per_share(after).expect("refresh");
    assert_eq!(h.ledger.reward_state().distributed, DEFAULT_TOTAL_ALLOCATION);
    assert!(!h.ledger.is_staking_active(after));

    h.fund(&BOB, &TEA, tokens(1));
    let err = h
        .ledger
        .stake(&BOB, &[TEA], &[tokens(1)], &[descriptor(&TEA, &BOB)], None, after)
        .unwrap_err();
    assert!(matches!(err, StakingError::StakingNotActive));

    let before = h.ledger.get_pending_rewards(id, after).expect("pending");
    assert!(before > 0);

    // A restart may not reach back into the finished window.
    for start in [BASE_TIME - days(1_000), BASE_TIME + EPOCH_DURATION - 1] {
        let err = h
            .ledger
            .initialize_staking(&ADMIN, tokens(1_000), start, after)
            .unwrap_err();
        assert!(matches!(
            err,
            StakingError::StakingAlreadyInitialized { ends_at } if ends_at == BASE_TIME + EPOCH_DURATION
        ));
    }
    assert_eq!(h.ledger.reward_state().start_time, Some(BASE_TIME));

    // =========================================================
    // Restart: nothing earned so far is lost
    // =========================================================
    h.ledger
        .initialize_staking(&ADMIN, tokens(1_000), after, after)
        .expect("reinitialize");
    assert!(h.ledger.is_staking_active(after));
    assert_eq!(h.ledger.reward_state().distributed, 0);
    assert_eq!(
        h.ledger.get_pending_rewards(id, after).expect("carried"),
        before
    );

    let later = after + days(30);
    let grown = h.ledger.get_pending_rewards(id, later).expect("grown");
    assert!(grown > before);

    // The accrued total is claimable in one go.
    let request = h.exit_request(AttestationDomain::Claim, &ALICE, vec![id], vec![grown], later);
    assert_eq!(h.ledger.claim(&request, later).expect("claim"), grown);
}
