//! Integration test crate for the staking ledger.
//!
//! The library only holds shared fixtures; the scenarios under `tests/`
//! drive a [`StakingLedger`] over the in-memory services end to end.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p tea-integration-tests
//! ```

use tea_crypto::ed25519::KeyPair;
use tea_staking::attestation::{AttestationDomain, ExitPayload, ExitRequest};
use tea_staking::budget::DEFAULT_TOTAL_ALLOCATION;
use tea_staking::eligibility::DelegationDescriptor;
use tea_staking::intake::SignedPermit;
use tea_staking::services::TokenBank;
use tea_staking::stub::{MemoryBank, StubVesting};
use tea_staking::{LedgerParams, StakingLedger};
use tea_types::{tokens, Address, Amount, PositionId, Timestamp, TokenId};

/// Base timestamp for test scenarios.
pub const BASE_TIME: Timestamp = 1_700_000_000;

pub const LEDGER: Address = [0x4C; 32];
pub const ADMIN: Address = [0x0A; 32];
pub const TREASURY: Address = [0x7E; 32];
pub const CUSTODY: Address = [0xC0; 32];
/// Relayer trusted to forward meta-transactions.
pub const FORWARDER: Address = [0xF0; 32];
pub const TEA: TokenId = [0x01; 32];
pub const PRESALE: TokenId = [0x02; 32];

/// Primary tokens minted to the ledger for reward payouts.
pub const REWARD_POOL: Amount = tokens(10_000_000);

pub type Ledger = StakingLedger<MemoryBank, StubVesting>;

/// A ledger with one operator, a trusted forwarder, the primary token and
/// one auxiliary token, staking initialized at [`BASE_TIME`] and a funded
/// reward pool.
pub struct Harness {
    pub ledger: Ledger,
    pub operator: KeyPair,
}

impl Harness {
    pub fn new() -> Self {
        let operator = KeyPair::generate();
        let mut bank = MemoryBank::new();
        bank.register_token(TEA, 18);
        bank.register_token(PRESALE, 18);
        bank.mint(&TEA, &LEDGER, REWARD_POOL);

        let params = LedgerParams::new(
            LEDGER,
            vec![ADMIN],
            TREASURY,
            vec![operator.address()],
            CUSTODY,
            TEA,
            vec![PRESALE],
        )
        .with_trusted_forwarder(FORWARDER);
        let mut ledger =
            StakingLedger::new(params, bank, StubVesting::new()).expect("ledger construction");
        ledger
            .initialize_staking(&ADMIN, DEFAULT_TOTAL_ALLOCATION, BASE_TIME, BASE_TIME)
            .expect("initialize staking");
        ledger.drain_events();
        Self { ledger, operator }
    }

    /// Mint `amount` of `token` to `user` and grant the ledger an unlimited allowance.
    pub fn fund(&mut self, user: &Address, token: &TokenId, amount: Amount) {
        let bank = self.ledger.bank_mut();
        bank.mint(token, user, amount);
        bank.approve_service(token, user, u128::MAX);
        bank.approve(token, user, &LEDGER, u128::MAX, Timestamp::MAX);
    }

    /// Fund `user` and stake `amount` of the primary token in one element.
    pub fn stake_primary(&mut self, user: &Address, amount: Amount, now: Timestamp) -> PositionId {
        self.fund(user, &TEA, amount);
        let ids = self
            .ledger
            .stake(user, &[TEA], &[amount], &[descriptor(&TEA, user)], None, now)
            .expect("stake");
        ids[0]
    }

    /// Stake with a signed permit instead of a standing allowance.
    pub fn stake_with_permit(
        &mut self,
        user: &Address,
        token: &TokenId,
        amount: Amount,
        permit: &SignedPermit,
        now: Timestamp,
    ) -> tea_staking::Result<Vec<PositionId>> {
        self.ledger
            .stake(user, &[*token], &[amount], &[descriptor(token, user)], Some(permit), now)
    }

    /// Operator-signed exit request at the user's current nonce.
    pub fn exit_request(
        &self,
        domain: AttestationDomain,
        user: &Address,
        ids: Vec<PositionId>,
        rewards: Vec<Amount>,
        deadline: Timestamp,
    ) -> ExitRequest {
        ExitPayload {
            user: *user,
            ids,
            rewards_with_loyalty: rewards,
            nonce: self
                .ledger
                .operator_user_nonce(&self.operator.address(), user),
            deadline,
        }
        .sign(domain, &LEDGER, &self.operator.signing_key)
    }

    pub fn balance(&self, token: &TokenId, holder: &Address) -> Amount {
        self.ledger.bank().balance_of(token, holder)
    }

    /// Sum of Active principal, recomputed from the position records.
    pub fn active_principal(&self) -> Amount {
        self.ledger
            .positions()
            .filter(|p| p.is_active())
            .map(|p| p.principal)
            .sum()
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Descriptor routing `token` from `user` into the ledger.
pub fn descriptor(token: &TokenId, user: &Address) -> DelegationDescriptor {
    DelegationDescriptor::new(*token, *user, LEDGER)
}
