//! The staking ledger.
//!
//! [`StakingLedger`] owns every piece of staking state and is the only
//! thing that mutates it. Each public operation either commits completely
//! or returns an error with no state change: inputs are validated first,
//! external effects run against a staged copy of the bank, and the staged
//! bank and internal state are written back together last.
//!
//! ## Lifecycle
//!
//! ```text
//! stake ──► Active ──unstake──► Unstaked ──withdraw──► Withdrawn
//!             │  ▲                 (cooldown)
//!             └──┘ claim
//! ```

use std::collections::{HashMap, HashSet};

use tea_types::events::LedgerEvent;
use tea_types::{address, Address, Amount, Hash, PositionId, Timestamp, TokenId};

use crate::admin::Roles;
use crate::attestation::{AttestationDomain, AttestationVerifier, ExitPayload, ExitRequest};
use crate::budget::RewardBudget;
use crate::eligibility::{DelegationDescriptor, EligibilityGate};
use crate::forwarder::{ForwardOutcome, ForwardedCall, SignedForwardRequest, TrustedForwarder};
use crate::intake::{self, SignedPermit};
use crate::lock::{LockConfig, EPOCH_DURATION};
use crate::position::{Position, PositionStatus, PositionTable, UserIndex};
use crate::services::{DelegatedTransfer, TokenBank, TransferError, VestingOracle};
use crate::tokens::AcceptedTokenSet;
use crate::{Result, StakingError};

/// Construction parameters.
#[derive(Clone, Debug)]
pub struct LedgerParams {
    /// The ledger's own identity: custody holder and attestation domain.
    pub ledger_address: Address,
    pub admins: Vec<Address>,
    /// Recipient of emergency sweeps.
    pub treasury: Address,
    /// Keys allowed to attest exits.
    pub operators: Vec<Address>,
    /// Where auxiliary principal is forwarded on withdrawal.
    pub vesting_custody: Address,
    pub primary_token: TokenId,
    pub auxiliary_tokens: Vec<TokenId>,
    /// Relayer allowed to submit stake and withdraw on users' behalf.
    pub trusted_forwarder: Option<Address>,
    pub lock: LockConfig,
    pub epoch_duration: u64,
}

impl LedgerParams {
    /// Parameters with the default lock policy and epoch length.
    pub fn new(
        ledger_address: Address,
        admins: Vec<Address>,
        treasury: Address,
        operators: Vec<Address>,
        vesting_custody: Address,
        primary_token: TokenId,
        auxiliary_tokens: Vec<TokenId>,
    ) -> Self {
        Self {
            ledger_address,
            admins,
            treasury,
            operators,
            vesting_custody,
            primary_token,
            auxiliary_tokens,
            trusted_forwarder: None,
            lock: LockConfig::default(),
            epoch_duration: EPOCH_DURATION,
        }
    }

    pub fn with_trusted_forwarder(mut self, forwarder: Address) -> Self {
        self.trusted_forwarder = Some(forwarder);
        self
    }
}

/// Staking ledger over a token bank `B` and a vesting oracle `V`.
pub struct StakingLedger<B, V> {
    address: Address,
    tokens: AcceptedTokenSet,
    roles: Roles,
    verifier: AttestationVerifier,
    forwarder: TrustedForwarder,
    lock: LockConfig,
    budget: RewardBudget,
    positions: PositionTable,
    users: UserIndex,
    /// Live (Active or Unstaked) principal per (user, token).
    user_token_staked: HashMap<(Address, TokenId), Amount>,
    /// Principal of Active positions.
    total_staked: Amount,
    vesting_custody: Address,
    bank: B,
    vesting: V,
    events: Vec<LedgerEvent>,
}

impl<B, V> StakingLedger<B, V>
where
    B: TokenBank + DelegatedTransfer + Clone,
    V: VestingOracle,
{
    /// Validate `params` and build an empty ledger.
    ///
    /// # Errors
    ///
    /// - [`StakingError::NoZeroAddress`] for a zero ledger, treasury, admin,
    ///   operator, forwarder, vesting custody or token identity
    /// - [`StakingError::OnlyValidToken`] if a token is listed twice
    /// - [`StakingError::WrongDecimalNumber`] if decimals differ
    pub fn new(params: LedgerParams, bank: B, vesting: V) -> Result<Self> {
        if address::is_zero(&params.ledger_address) || address::is_zero(&params.vesting_custody) {
            return Err(StakingError::NoZeroAddress);
        }
        let roles = Roles::new(params.admins, params.treasury)?;
        let verifier = AttestationVerifier::new(params.ledger_address, params.operators)?;
        let forwarder = TrustedForwarder::new(params.ledger_address, params.trusted_forwarder)?;
        let tokens = AcceptedTokenSet::new(params.primary_token, params.auxiliary_tokens, &bank)?;

        tracing::info!(
            ledger = %address::short(&params.ledger_address),
            primary = %address::short(tokens.primary()),
            auxiliary = tokens.auxiliary().len(),
            forwarding = forwarder.forwarder().is_some(),
            "staking ledger created"
        );

        Ok(Self {
            address: params.ledger_address,
            tokens,
            roles,
            verifier,
            forwarder,
            lock: params.lock,
            budget: RewardBudget::new(params.epoch_duration),
            positions: PositionTable::new(),
            users: UserIndex::new(),
            user_token_staked: HashMap::new(),
            total_staked: 0,
            vesting_custody: params.vesting_custody,
            bank,
            vesting,
            events: Vec::new(),
        })
    }

    // -- Staking -------------------------------------------------------------

    /// Create one Active position per element.
    ///
    /// With `permit`, the signed permit(s) are applied before any pull;
    /// without it, the caller must already have granted the ledger a
    /// standing allowance.
    pub fn stake(
        &mut self,
        caller: &Address,
        tokens: &[TokenId],
        amounts: &[Amount],
        descriptors: &[DelegationDescriptor],
        permit: Option<&SignedPermit>,
        now: Timestamp,
    ) -> Result<Vec<PositionId>> {
        if tokens.is_empty() {
            return Err(StakingError::InvalidArrayLengths {
                expected: 1,
                actual: 0,
            });
        }
        for len in [amounts.len(), descriptors.len()] {
            if len != tokens.len() {
                return Err(StakingError::InvalidArrayLengths {
                    expected: tokens.len(),
                    actual: len,
                });
            }
        }

        let mut budget = self.budget.clone();
        budget.refresh(self.total_staked, now)?;

        // Validate every element against staged totals.
        let gate = EligibilityGate::new(&self.tokens, &self.vesting, &self.address);
        let mut staged: HashMap<TokenId, Amount> = HashMap::new();
        let mut new_total = self.total_staked;
        for ((token, amount), descriptor) in tokens.iter().zip(amounts).zip(descriptors) {
            let batch = staged.get(token).copied().unwrap_or(0);
            let already = self
                .user_token_staked(caller, token)
                .checked_add(batch)
                .ok_or(StakingError::Overflow)?;
            gate.check(caller, token, *amount, descriptor, already)?;
            if !budget.is_active(now) {
                return Err(StakingError::StakingNotActive);
            }
            staged.insert(
                *token,
                batch.checked_add(*amount).ok_or(StakingError::Overflow)?,
            );
            new_total = new_total
                .checked_add(*amount)
                .ok_or(StakingError::Overflow)?;
        }

        // Permits and pulls land on a staged bank; a failure anywhere
        // discards it, so permit nonces and allowances stay unspent.
        let mut bank = self.bank.clone();
        if let Some(signed) = permit {
            intake::authorize(&mut bank, caller, &self.address, signed, now)?;
        }
        for (i, (token, amount)) in tokens.iter().zip(amounts).enumerate() {
            if let Err(e) = intake::pull(&mut bank, token, caller, &self.address, *amount, now) {
                tracing::warn!(
                    user = %address::short(caller),
                    element = i,
                    error = %e,
                    "stake rolled back"
                );
                return Err(e);
            }
        }

        let acc = budget.lifetime_accumulator()?;
        let mut ids = Vec::with_capacity(tokens.len());
        for (token, amount) in tokens.iter().zip(amounts) {
            let tier = self.lock.tier_for(*amount);
            let id = self
                .positions
                .insert(*caller, *token, *amount, tier, acc, now);
            self.users.add(*caller, id);
            let live = self.user_token_staked.entry((*caller, *token)).or_insert(0);
            *live = live.saturating_add(*amount);

            tracing::info!(
                user = %address::short(caller),
                id,
                token = %address::short(token),
                amount = %amount,
                tier = ?tier,
                "staked"
            );
            self.events.push(LedgerEvent::Staked {
                user: *caller,
                id,
                token: *token,
                amount: *amount,
            });
            ids.push(id);
        }
        self.bank = bank;
        self.total_staked = new_total;
        self.budget = budget;
        Ok(ids)
    }

    /// Move the attested positions from Active to Unstaked, settling the
    /// attested reward for later withdrawal.
    pub fn unstake(&mut self, request: &ExitRequest, now: Timestamp) -> Result<()> {
        let mut budget = self.budget.clone();
        budget.refresh(self.total_staked, now)?;
        self.validate_exit(AttestationDomain::Unstake, request, &budget, now)?;

        let payload = &request.payload;
        let mut released: Amount = 0;
        for id in &payload.ids {
            let principal = self.positions.get(*id).map(|p| p.principal).unwrap_or(0);
            released = released
                .checked_add(principal)
                .ok_or(StakingError::Overflow)?;
        }
        let new_total = self
            .total_staked
            .checked_sub(released)
            .ok_or(StakingError::Overflow)?;

        self.verifier.consume(request)?;
        for (id, reward) in payload.ids.iter().zip(&payload.rewards_with_loyalty) {
            let Some(position) = self.positions.get_mut(*id) else {
                continue;
            };
            position.mark_unstaked(*reward, now);
            let principal = position.principal;

            tracing::info!(
                user = %address::short(&payload.user),
                id,
                principal = %principal,
                reward = %reward,
                "unstaked"
            );
            self.events.push(LedgerEvent::Unstaked {
                user: payload.user,
                id: *id,
                amount: principal,
            });
        }
        self.total_staked = new_total;
        self.budget = budget;
        Ok(())
    }

    /// Pay the attested rewards of Active positions without unstaking them.
    ///
    /// Returns the total paid in the primary token.
    pub fn claim(&mut self, request: &ExitRequest, now: Timestamp) -> Result<Amount> {
        let mut budget = self.budget.clone();
        budget.refresh(self.total_staked, now)?;
        self.validate_exit(AttestationDomain::Claim, request, &budget, now)?;

        let payload = &request.payload;
        let total = payload
            .rewards_with_loyalty
            .iter()
            .try_fold(0u128, |acc, r| acc.checked_add(*r))
            .ok_or(StakingError::Overflow)?;
        let primary = *self.tokens.primary();
        self.ensure_balance(&primary, total)?;
        let acc = budget.lifetime_accumulator()?;

        if total > 0 {
            self.bank
                .transfer(&primary, &self.address, &payload.user, total)?;
        }
        self.verifier.consume(request)?;
        for (id, reward) in payload.ids.iter().zip(&payload.rewards_with_loyalty) {
            let Some(position) = self.positions.get_mut(*id) else {
                continue;
            };
            position.reward_debt = acc;
            position.claimed_reward = position.claimed_reward.saturating_add(*reward);

            tracing::info!(
                user = %address::short(&payload.user),
                id,
                reward = %reward,
                "reward claimed"
            );
            self.events.push(LedgerEvent::RewardClaimed {
                user: payload.user,
                id: *id,
                amount: *reward,
            });
        }
        self.budget = budget;
        Ok(total)
    }

    /// Checks shared by unstake and claim. Read-only.
    fn validate_exit(
        &self,
        domain: AttestationDomain,
        request: &ExitRequest,
        budget: &RewardBudget,
        now: Timestamp,
    ) -> Result<()> {
        let payload = &request.payload;
        if payload.ids.is_empty() || payload.ids.len() != payload.rewards_with_loyalty.len() {
            return Err(StakingError::InvalidArrayLengths {
                expected: payload.ids.len(),
                actual: payload.rewards_with_loyalty.len(),
            });
        }

        self.verifier.verify(domain, request, now)?;

        let mut seen = HashSet::with_capacity(payload.ids.len());
        for (id, reward) in payload.ids.iter().zip(&payload.rewards_with_loyalty) {
            if !seen.insert(*id) {
                return Err(StakingError::InvalidId(*id));
            }
            let position = self
                .positions
                .get(*id)
                .filter(|p| p.owner == payload.user)
                .ok_or(StakingError::InvalidId(*id))?;
            if !position.is_active() {
                return Err(StakingError::NothingToUnstake(*id));
            }
            if domain == AttestationDomain::Unstake {
                self.lock
                    .check_hold(*id, position.tier, position.staked_at, now)?;
            }
            let bound = budget.reward_bound(position.principal, position.reward_debt)?;
            if *reward > bound {
                return Err(StakingError::InvalidCalculationReward {
                    id: *id,
                    attested: *reward,
                    bound,
                });
            }
        }
        Ok(())
    }

    /// Release principal plus settled reward of Unstaked positions whose
    /// cooldown has elapsed.
    ///
    /// The owner always receives `principal + accrued_reward` in the primary
    /// token. Auxiliary principal is forwarded to the vesting custody address.
    /// Returns the total paid to the caller.
    pub fn withdraw(&mut self, caller: &Address, ids: &[PositionId], now: Timestamp) -> Result<Amount> {
        if ids.is_empty() {
            return Err(StakingError::InvalidArrayLengths {
                expected: 1,
                actual: 0,
            });
        }

        let mut budget = self.budget.clone();
        budget.refresh(self.total_staked, now)?;

        let mut seen = HashSet::with_capacity(ids.len());
        let mut payout: Amount = 0;
        let mut forwards: HashMap<TokenId, Amount> = HashMap::new();
        for id in ids {
            if !seen.insert(*id) {
                return Err(StakingError::InvalidId(*id));
            }
            let position = self
                .positions
                .get(*id)
                .filter(|p| p.owner == *caller)
                .ok_or(StakingError::InvalidId(*id))?;
            let (PositionStatus::Unstaked, Some(unstaked_at)) =
                (position.status, position.unstaked_at)
            else {
                return Err(StakingError::NeedToUnstakeFirst(*id));
            };
            self.lock.check_cooldown(*id, unstaked_at, now)?;

            payout = payout
                .checked_add(position.principal)
                .and_then(|p| p.checked_add(position.accrued_reward))
                .ok_or(StakingError::Overflow)?;
            if self.tokens.is_auxiliary(&position.token) {
                let f = forwards.entry(position.token).or_insert(0);
                *f = f
                    .checked_add(position.principal)
                    .ok_or(StakingError::Overflow)?;
            }
        }

        let primary = *self.tokens.primary();
        self.ensure_balance(&primary, payout)?;
        for (token, amount) in &forwards {
            self.ensure_balance(token, *amount)?;
        }

        for (token, amount) in &forwards {
            self.bank
                .transfer(token, &self.address, &self.vesting_custody, *amount)?;
        }
        self.bank.transfer(&primary, &self.address, caller, payout)?;

        for id in ids {
            let Some(position) = self.positions.get_mut(*id) else {
                continue;
            };
            position.mark_withdrawn(now);
            let (token, principal, paid) = (
                position.token,
                position.principal,
                position.principal.saturating_add(position.accrued_reward),
            );
            self.users.remove(caller, *id);
            if let Some(live) = self.user_token_staked.get_mut(&(*caller, token)) {
                *live = live.saturating_sub(principal);
            }

            tracing::info!(
                user = %address::short(caller),
                id,
                amount = %paid,
                "withdrawn"
            );
            self.events.push(LedgerEvent::Withdrawal {
                user: *caller,
                id: *id,
                amount: paid,
            });
        }
        self.budget = budget;
        Ok(payout)
    }

    // -- Meta-transactions -----------------------------------------------------

    /// Run a user-signed `stake` or `withdraw` relayed by the trusted forwarder.
    ///
    /// The call executes with the request's `from` as its sender. The
    /// forwarder nonce is consumed only when the call succeeds.
    pub fn execute_forwarded(
        &mut self,
        relayer: &Address,
        signed: &SignedForwardRequest,
        now: Timestamp,
    ) -> Result<ForwardOutcome> {
        let sender = self.forwarder.verify(relayer, signed, now)?;
        let outcome = match &signed.request.call {
            ForwardedCall::Stake {
                tokens,
                amounts,
                descriptors,
                permit,
            } => ForwardOutcome::Staked(self.stake(
                &sender,
                tokens,
                amounts,
                descriptors,
                permit.as_ref(),
                now,
            )?),
            ForwardedCall::Withdraw { ids } => {
                ForwardOutcome::Withdrawn(self.withdraw(&sender, ids, now)?)
            }
        };
        let nonce = self.forwarder.consume(&sender)?;

        tracing::info!(
            relayer = %address::short(relayer),
            from = %address::short(&sender),
            call = signed.request.call.name(),
            nonce,
            "forwarded call executed"
        );
        Ok(outcome)
    }

    fn ensure_balance(&self, token: &TokenId, needed: Amount) -> Result<()> {
        let available = self.bank.balance_of(token, &self.address);
        if available < needed {
            return Err(TransferError::InsufficientBalance { needed, available }.into());
        }
        Ok(())
    }

    // -- Reward budget and admin ----------------------------------------------

    /// Permissionless accrual refresh. Returns the amount emitted.
    pub fn update_reward_per_share(&mut self, now: Timestamp) -> Result<Amount> {
        let mut budget = self.budget.clone();
        let emitted = budget.refresh(self.total_staked, now)?;
        self.budget = budget;
        Ok(emitted)
    }

    /// Start (or restart, once the previous window has elapsed) a reward epoch.
    pub fn initialize_staking(
        &mut self,
        caller: &Address,
        total_allocation: Amount,
        start_time: Timestamp,
        now: Timestamp,
    ) -> Result<()> {
        self.roles.require_admin(caller)?;

        let mut budget = self.budget.clone();
        budget.refresh(self.total_staked, now)?;
        budget.initialize(total_allocation, start_time, now)?;
        self.budget = budget;

        tracing::info!(
            total_allocation = %total_allocation,
            start_time,
            "staking initialized"
        );
        self.events.push(LedgerEvent::StakingInitialized {
            total_allocation,
            start_time,
        });
        Ok(())
    }

    /// Sweep the ledger's whole primary-token balance to the treasury.
    ///
    /// Position bookkeeping is left untouched.
    pub fn emergency_withdraw(&mut self, caller: &Address) -> Result<Amount> {
        self.roles.require_admin(caller)?;

        let primary = *self.tokens.primary();
        let treasury = *self.roles.treasury();
        let amount = self.bank.balance_of(&primary, &self.address);
        if amount > 0 {
            self.bank
                .transfer(&primary, &self.address, &treasury, amount)?;
        }

        tracing::warn!(
            to = %address::short(&treasury),
            amount = %amount,
            "emergency withdrawal"
        );
        self.events.push(LedgerEvent::EmergencyWithdrawal {
            to: treasury,
            amount,
        });
        Ok(amount)
    }

    // -- Queries ---------------------------------------------------------------

    /// Principal of the user's Active positions.
    pub fn get_total_user_staked_tokens(&self, user: &Address) -> Amount {
        self.users
            .ids(user)
            .iter()
            .filter_map(|id| self.positions.get(*id))
            .filter(|p| p.is_active())
            .fold(0u128, |acc, p| acc.saturating_add(p.principal))
    }

    /// Live position ids of `user` in creation order.
    pub fn get_user_ids(&self, user: &Address) -> Vec<PositionId> {
        self.users.ids(user).to_vec()
    }

    pub fn check_token_validity(&self, token: &TokenId) -> bool {
        self.tokens.contains(token)
    }

    /// Principal of all Active positions.
    pub fn total_staked_tokens(&self) -> Amount {
        self.total_staked
    }

    /// Reward of position `id` as of `now`.
    ///
    /// Active positions report their base accrual against a projection of
    /// the accumulator; Unstaked positions their settled reward; Withdrawn
    /// positions zero.
    pub fn get_pending_rewards(&self, id: PositionId, now: Timestamp) -> Result<Amount> {
        let position = self.positions.get(id).ok_or(StakingError::InvalidId(id))?;
        match position.status {
            PositionStatus::Active => self
                .budget
                .projected(self.total_staked, now)?
                .pending_base(position.principal, position.reward_debt),
            PositionStatus::Unstaked => Ok(position.accrued_reward),
            PositionStatus::Withdrawn => Ok(0),
        }
    }

    /// Full record of position `id`, including Withdrawn ones.
    pub fn position(&self, id: PositionId) -> Option<&Position> {
        self.positions.get(id)
    }

    pub fn positions(&self) -> impl Iterator<Item = &Position> {
        self.positions.iter()
    }

    pub fn operator_user_nonce(&self, operator: &Address, user: &Address) -> u64 {
        self.verifier.nonce(operator, user)
    }

    pub fn is_operator(&self, who: &Address) -> bool {
        self.verifier.is_operator(who)
    }

    /// Next forwarder nonce expected from `from`.
    pub fn forwarder_nonce(&self, from: &Address) -> u64 {
        self.forwarder.nonce(from)
    }

    pub fn is_trusted_forwarder(&self, who: &Address) -> bool {
        self.forwarder.is_trusted(who)
    }

    pub fn trusted_forwarder(&self) -> Option<&Address> {
        self.forwarder.forwarder()
    }

    pub fn reward_state(&self) -> &RewardBudget {
        &self.budget
    }

    pub fn is_staking_active(&self, now: Timestamp) -> bool {
        self.budget.is_active(now)
    }

    /// Live principal `user` holds in `token` (Active and Unstaked).
    pub fn user_token_staked(&self, user: &Address, token: &TokenId) -> Amount {
        self.user_token_staked
            .get(&(*user, *token))
            .copied()
            .unwrap_or(0)
    }

    /// Digest an operator must sign for `payload` under `domain`.
    pub fn attestation_digest(&self, domain: AttestationDomain, payload: &ExitPayload) -> Hash {
        self.verifier.digest(domain, payload)
    }

    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn primary_token(&self) -> &TokenId {
        self.tokens.primary()
    }

    pub fn auxiliary_tokens(&self) -> &[TokenId] {
        self.tokens.auxiliary()
    }

    pub fn vesting_custody(&self) -> &Address {
        &self.vesting_custody
    }

    pub fn treasury(&self) -> &Address {
        self.roles.treasury()
    }

    pub fn lock_config(&self) -> &LockConfig {
        &self.lock
    }

    /// Take the events emitted since the last call.
    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn bank(&self) -> &B {
        &self.bank
    }

    pub fn bank_mut(&mut self) -> &mut B {
        &mut self.bank
    }

    pub fn vesting(&self) -> &V {
        &self.vesting
    }

    pub fn vesting_mut(&mut self) -> &mut V {
        &mut self.vesting
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::DEFAULT_TOTAL_ALLOCATION;
    use crate::stub::{MemoryBank, StubVesting};
    use tea_crypto::ed25519::KeyPair;
    use tea_types::{days, tokens};

    const LEDGER: Address = [0x4C; 32];
    const ADMIN: Address = [0x0A; 32];
    const TREASURY: Address = [0x7E; 32];
    const CUSTODY: Address = [0xC0; 32];
    const TEA: TokenId = [0x01; 32];
    const PRESALE: TokenId = [0x02; 32];
    const ALICE: Address = [0xA1; 32];
    const BOB: Address = [0xB0; 32];
    const START: Timestamp = 1_700_000_000;

    type Ledger = StakingLedger<MemoryBank, StubVesting>;

    fn setup() -> (Ledger, KeyPair) {
        setup_with(DEFAULT_TOTAL_ALLOCATION)
    }

    fn setup_with(allocation: Amount) -> (Ledger, KeyPair) {
        let operator = KeyPair::generate();
        let mut bank = MemoryBank::new();
        bank.register_token(TEA, 18);
        bank.register_token(PRESALE, 18);
        for user in [ALICE, BOB] {
            bank.mint(&TEA, &user, tokens(2_000_000));
            bank.mint(&PRESALE, &user, tokens(10_000));
            for token in [TEA, PRESALE] {
                bank.approve_service(&token, &user, u128::MAX);
                bank.approve(&token, &user, &LEDGER, u128::MAX, u64::MAX);
            }
        }
        // Reward pool.
        bank.mint(&TEA, &LEDGER, allocation);

        let params = LedgerParams::new(
            LEDGER,
            vec![ADMIN],
            TREASURY,
            vec![operator.address()],
            CUSTODY,
            TEA,
            vec![PRESALE],
        );
        let mut ledger = Ledger::new(params, bank, StubVesting::new()).expect("ledger");
        ledger
            .initialize_staking(&ADMIN, allocation, START, START)
            .expect("initialize");
        ledger.drain_events();
        (ledger, operator)
    }

    fn stake_one(ledger: &mut Ledger, user: Address, token: TokenId, amount: Amount, now: Timestamp) -> PositionId {
        let ids = ledger
            .stake(
                &user,
                &[token],
                &[amount],
                &[DelegationDescriptor::new(token, user, LEDGER)],
                None,
                now,
            )
            .expect("stake");
        ids[0]
    }

    fn exit(
        ledger: &Ledger,
        operator: &KeyPair,
        domain: AttestationDomain,
        user: Address,
        ids: Vec<PositionId>,
        rewards: Vec<Amount>,
    ) -> ExitRequest {
        let nonce = ledger.operator_user_nonce(&operator.address(), &user);
        ExitPayload {
            user,
            ids,
            rewards_with_loyalty: rewards,
            nonce,
            deadline: u64::MAX,
        }
        .sign(domain, &LEDGER, &operator.signing_key)
    }

    fn active_sum(ledger: &Ledger) -> Amount {
        ledger
            .positions()
            .filter(|p| p.is_active())
            .map(|p| p.principal)
            .sum()
    }

    #[test]
    fn test_stake_creates_positions_and_events() {
        let (mut ledger, _) = setup();
        let ids = ledger
            .stake(
                &ALICE,
                &[TEA, TEA],
                &[tokens(10), tokens(20)],
                &[
                    DelegationDescriptor::new(TEA, ALICE, LEDGER),
                    DelegationDescriptor::new(TEA, ALICE, LEDGER),
                ],
                None,
                START + 10,
            )
            .expect("stake");
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(ledger.total_staked_tokens(), tokens(30));
        assert_eq!(ledger.get_total_user_staked_tokens(&ALICE), tokens(30));
        assert_eq!(ledger.get_user_ids(&ALICE), vec![1, 2]);
        assert_eq!(ledger.user_token_staked(&ALICE, &TEA), tokens(30));
        let events = ledger.drain_events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name(), "Staked");
    }

    #[test]
    fn test_stake_outside_window() {
        let (mut ledger, _) = setup();
        let err = ledger
            .stake(
                &ALICE,
                &[TEA],
                &[tokens(1)],
                &[DelegationDescriptor::new(TEA, ALICE, LEDGER)],
                None,
                START + EPOCH_DURATION + 1,
            )
            .unwrap_err();
        assert!(matches!(err, StakingError::StakingNotActive));
    }

    #[test]
    fn test_stake_is_all_or_nothing() {
        let (mut ledger, _) = setup();
        ledger.vesting_mut().set_entitlement(ALICE, PRESALE, tokens(100));
        let before = ledger.bank().balance_of(&TEA, &ALICE);
        ledger
            .stake(
                &ALICE,
                &[TEA, PRESALE],
                &[tokens(5), tokens(100)],
                &[
                    DelegationDescriptor::new(TEA, ALICE, LEDGER),
                    DelegationDescriptor::new(PRESALE, ALICE, LEDGER),
                ],
                None,
                START + 1,
            )
            .expect("stake within entitlement");

        // Entitlement is used up, so the whole second batch is refused.
        let err = ledger
            .stake(
                &ALICE,
                &[TEA, PRESALE],
                &[tokens(5), tokens(1)],
                &[
                    DelegationDescriptor::new(TEA, ALICE, LEDGER),
                    DelegationDescriptor::new(PRESALE, ALICE, LEDGER),
                ],
                None,
                START + 2,
            )
            .unwrap_err();
        assert!(matches!(err, StakingError::NotEnoughLockedTokens { .. }));
        assert_eq!(ledger.get_user_ids(&ALICE).len(), 2);
        assert_eq!(ledger.bank().balance_of(&TEA, &ALICE), before - tokens(5));
    }

    #[test]
    fn test_failed_pull_leaves_no_trace() {
        let (mut ledger, _) = setup();
        ledger.vesting_mut().set_entitlement(ALICE, PRESALE, tokens(1_000_000));
        let before = ledger.bank().balance_of(&TEA, &ALICE);
        let err = ledger
            .stake(
                &ALICE,
                &[TEA, PRESALE],
                &[tokens(5), tokens(20_000)],
                &[
                    DelegationDescriptor::new(TEA, ALICE, LEDGER),
                    DelegationDescriptor::new(PRESALE, ALICE, LEDGER),
                ],
                None,
                START + 1,
            )
            .unwrap_err();
        assert!(matches!(
            err,
            StakingError::Transfer(TransferError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.bank().balance_of(&TEA, &ALICE), before);
        assert_eq!(ledger.total_staked_tokens(), 0);
        assert!(ledger.get_user_ids(&ALICE).is_empty());
        assert!(ledger.position(1).is_none());
    }

    #[test]
    fn test_refresh_large_allocation_after_long_gap() {
        let allocation = tokens(1_000_000_000);
        let (mut ledger, _) = setup_with(allocation);
        let id = stake_one(&mut ledger, ALICE, TEA, tokens(100), START);

        let now = START + days(200);
        let emitted = ledger.update_reward_per_share(now).expect("refresh");
        assert_eq!(emitted, allocation * 200 / 365);
        assert_eq!(ledger.reward_state().distributed, emitted);
        assert_eq!(ledger.reward_state().last_accrual_time, now);

        let pending = ledger.get_pending_rewards(id, now).expect("pending");
        assert!(pending <= emitted && emitted - pending < tokens(1));
    }

    #[test]
    fn test_failed_refresh_commits_nothing() {
        let (mut ledger, _) = setup_with(u128::MAX / 2);
        stake_one(&mut ledger, ALICE, TEA, 1, START);
        let before = ledger.reward_state().clone();

        let err = ledger
            .update_reward_per_share(START + days(100))
            .unwrap_err();
        assert!(matches!(err, StakingError::Overflow));
        assert_eq!(ledger.reward_state(), &before);
        assert_eq!(ledger.reward_state().last_accrual_time, START);
    }

    #[test]
    fn test_stake_array_length_mismatch() {
        let (mut ledger, _) = setup();
        let err = ledger
            .stake(&ALICE, &[TEA], &[], &[], None, START)
            .unwrap_err();
        assert!(matches!(
            err,
            StakingError::InvalidArrayLengths {
                expected: 1,
                actual: 0
            }
        ));
    }

    #[test]
    fn test_tier_scenario_after_15_days() {
        let (mut ledger, operator) = setup();
        let small = stake_one(&mut ledger, ALICE, TEA, tokens(50_000), START);
        let large = stake_one(&mut ledger, BOB, TEA, tokens(1_000_001), START);
        let now = START + days(15);

        let req = exit(&ledger, &operator, AttestationDomain::Unstake, ALICE, vec![small], vec![0]);
        ledger.unstake(&req, now).expect("tier-1 unstake");

        let req = exit(&ledger, &operator, AttestationDomain::Unstake, BOB, vec![large], vec![0]);
        let err = ledger.unstake(&req, now).unwrap_err();
        assert!(matches!(err, StakingError::LockedPeriodNotPassed { .. }));
        // Rejected request leaves the nonce untouched.
        assert_eq!(ledger.operator_user_nonce(&operator.address(), &BOB), 0);
    }

    #[test]
    fn test_unstake_updates_totals() {
        let (mut ledger, operator) = setup();
        let a = stake_one(&mut ledger, ALICE, TEA, tokens(100), START);
        stake_one(&mut ledger, BOB, TEA, tokens(300), START);
        assert_eq!(active_sum(&ledger), ledger.total_staked_tokens());

        let req = exit(&ledger, &operator, AttestationDomain::Unstake, ALICE, vec![a], vec![0]);
        ledger.unstake(&req, START + days(8)).expect("unstake");
        assert_eq!(ledger.total_staked_tokens(), tokens(300));
        assert_eq!(active_sum(&ledger), ledger.total_staked_tokens());
        assert_eq!(ledger.get_total_user_staked_tokens(&ALICE), 0);
        // Still listed until withdrawn.
        assert_eq!(ledger.get_user_ids(&ALICE), vec![a]);
    }

    #[test]
    fn test_unstake_rejects_foreign_duplicate_and_inactive_ids() {
        let (mut ledger, operator) = setup();
        let a = stake_one(&mut ledger, ALICE, TEA, tokens(100), START);
        let b = stake_one(&mut ledger, BOB, TEA, tokens(100), START);
        let now = START + days(8);

        let req = exit(&ledger, &operator, AttestationDomain::Unstake, ALICE, vec![b], vec![0]);
        assert!(matches!(ledger.unstake(&req, now), Err(StakingError::InvalidId(id)) if id == b));

        let req = exit(&ledger, &operator, AttestationDomain::Unstake, ALICE, vec![a, a], vec![0, 0]);
        assert!(matches!(ledger.unstake(&req, now), Err(StakingError::InvalidId(id)) if id == a));

        let req = exit(&ledger, &operator, AttestationDomain::Unstake, ALICE, vec![99], vec![0]);
        assert!(matches!(ledger.unstake(&req, now), Err(StakingError::InvalidId(99))));

        let req = exit(&ledger, &operator, AttestationDomain::Unstake, ALICE, vec![a], vec![0]);
        ledger.unstake(&req, now).expect("unstake");
        let req = exit(&ledger, &operator, AttestationDomain::Unstake, ALICE, vec![a], vec![0]);
        assert!(matches!(
            ledger.unstake(&req, now),
            Err(StakingError::NothingToUnstake(id)) if id == a
        ));

        let req = exit(&ledger, &operator, AttestationDomain::Unstake, ALICE, vec![a], vec![]);
        assert!(matches!(
            ledger.unstake(&req, now),
            Err(StakingError::InvalidArrayLengths { .. })
        ));
    }

    #[test]
    fn test_reward_above_bound_rejected() {
        let (mut ledger, operator) = setup();
        let a = stake_one(&mut ledger, ALICE, TEA, tokens(50_000), START);
        let now = START + days(73);
        let bound = ledger
            .get_pending_rewards(a, now)
            .expect("pending")
            .saturating_mul(2);

        let req = exit(&ledger, &operator, AttestationDomain::Unstake, ALICE, vec![a], vec![bound + 1]);
        assert!(matches!(
            ledger.unstake(&req, now),
            Err(StakingError::InvalidCalculationReward { .. })
        ));

        let req = exit(&ledger, &operator, AttestationDomain::Unstake, ALICE, vec![a], vec![bound]);
        ledger.unstake(&req, now).expect("unstake at bound");
        assert_eq!(ledger.get_pending_rewards(a, now).expect("settled"), bound);
    }

    #[test]
    fn test_withdraw_requires_unstake_and_cooldown() {
        let (mut ledger, operator) = setup();
        let a = stake_one(&mut ledger, ALICE, TEA, tokens(100), START);
        let now = START + days(8);

        assert!(matches!(
            ledger.withdraw(&ALICE, &[a], now),
            Err(StakingError::NeedToUnstakeFirst(id)) if id == a
        ));

        let req = exit(&ledger, &operator, AttestationDomain::Unstake, ALICE, vec![a], vec![tokens(1)]);
        ledger.unstake(&req, now).expect("unstake");
        assert!(matches!(
            ledger.withdraw(&ALICE, &[a], now + days(13)),
            Err(StakingError::ClaimCooldownNotPassed { .. })
        ));
        assert!(matches!(
            ledger.withdraw(&BOB, &[a], now + days(14)),
            Err(StakingError::InvalidId(_))
        ));

        let before = ledger.bank().balance_of(&TEA, &ALICE);
        let paid = ledger.withdraw(&ALICE, &[a], now + days(14)).expect("withdraw");
        assert_eq!(paid, tokens(101));
        assert_eq!(ledger.bank().balance_of(&TEA, &ALICE), before + tokens(101));
        assert!(ledger.get_user_ids(&ALICE).is_empty());
        assert_eq!(
            ledger.position(a).map(|p| p.status),
            Some(PositionStatus::Withdrawn)
        );
        assert!(matches!(
            ledger.withdraw(&ALICE, &[a], now + days(15)),
            Err(StakingError::NeedToUnstakeFirst(_))
        ));
    }

    #[test]
    fn test_auxiliary_withdraw_pays_primary_and_forwards_principal() {
        let (mut ledger, operator) = setup();
        ledger.vesting_mut().set_entitlement(ALICE, PRESALE, tokens(5_000));
        let a = stake_one(&mut ledger, ALICE, PRESALE, tokens(5_000), START);
        assert_eq!(ledger.user_token_staked(&ALICE, &PRESALE), tokens(5_000));

        let req = exit(&ledger, &operator, AttestationDomain::Unstake, ALICE, vec![a], vec![0]);
        ledger.unstake(&req, START + days(7)).expect("unstake");
        let tea_before = ledger.bank().balance_of(&TEA, &ALICE);
        ledger
            .withdraw(&ALICE, &[a], START + days(21))
            .expect("withdraw");

        assert_eq!(ledger.bank().balance_of(&TEA, &ALICE), tea_before + tokens(5_000));
        assert_eq!(ledger.bank().balance_of(&PRESALE, &CUSTODY), tokens(5_000));
        assert_eq!(ledger.bank().balance_of(&PRESALE, &LEDGER), 0);
        assert_eq!(ledger.user_token_staked(&ALICE, &PRESALE), 0);
    }

    #[test]
    fn test_claim_pays_and_resets_debt() {
        let (mut ledger, operator) = setup();
        let a = stake_one(&mut ledger, ALICE, TEA, tokens(50_000), START);
        let now = START + days(30);
        let pending = ledger.get_pending_rewards(a, now).expect("pending");
        assert!(pending > 0);

        let before = ledger.bank().balance_of(&TEA, &ALICE);
        let req = exit(&ledger, &operator, AttestationDomain::Claim, ALICE, vec![a], vec![pending]);
        // An unstake signature cannot be used as a claim and vice versa.
        assert!(ledger.unstake(&req, now).is_err());
        let paid = ledger.claim(&req, now).expect("claim");
        assert_eq!(paid, pending);
        assert_eq!(ledger.bank().balance_of(&TEA, &ALICE), before + pending);
        assert_eq!(ledger.get_pending_rewards(a, now).expect("pending"), 0);
        let position = ledger.position(a).expect("position");
        assert!(position.is_active());
        assert_eq!(position.claimed_reward, pending);
        assert_eq!(ledger.operator_user_nonce(&operator.address(), &ALICE), 1);

        // Replay.
        assert!(matches!(
            ledger.claim(&req, now),
            Err(StakingError::MismatchingNonces { .. })
        ));
    }

    #[test]
    fn test_claim_without_reward_pool_fails_cleanly() {
        let (mut ledger, operator) = setup();
        let a = stake_one(&mut ledger, ALICE, TEA, tokens(50_000), START);
        ledger.emergency_withdraw(&ADMIN).expect("sweep");
        let now = START + days(30);
        let pending = ledger.get_pending_rewards(a, now).expect("pending");
        let req = exit(&ledger, &operator, AttestationDomain::Claim, ALICE, vec![a], vec![pending]);
        assert!(matches!(
            ledger.claim(&req, now),
            Err(StakingError::Transfer(TransferError::InsufficientBalance { .. }))
        ));
        assert_eq!(ledger.operator_user_nonce(&operator.address(), &ALICE), 0);
    }

    #[test]
    fn test_admin_gating() {
        let (mut ledger, _) = setup();
        assert!(matches!(
            ledger.initialize_staking(&ALICE, 1, START, START + EPOCH_DURATION + 1),
            Err(StakingError::Unauthorized)
        ));
        assert!(matches!(
            ledger.emergency_withdraw(&ALICE),
            Err(StakingError::Unauthorized)
        ));
        assert!(matches!(
            ledger.initialize_staking(&ADMIN, 1, START + 5, START + 5),
            Err(StakingError::StakingAlreadyInitialized { .. })
        ));
    }

    #[test]
    fn test_emergency_withdraw_sweeps_primary_only() {
        let (mut ledger, _) = setup();
        stake_one(&mut ledger, ALICE, TEA, tokens(100), START);
        let swept = ledger.emergency_withdraw(&ADMIN).expect("sweep");
        assert_eq!(swept, DEFAULT_TOTAL_ALLOCATION + tokens(100));
        assert_eq!(ledger.bank().balance_of(&TEA, &TREASURY), swept);
        assert_eq!(ledger.bank().balance_of(&TEA, &LEDGER), 0);
        assert_eq!(ledger.total_staked_tokens(), tokens(100));
    }

    #[test]
    fn test_construction_failures() {
        let mut bank = MemoryBank::new();
        bank.register_token(TEA, 18);
        bank.register_token(PRESALE, 6);
        let op = [0x0B; 32];

        let dup = LedgerParams::new(LEDGER, vec![ADMIN], TREASURY, vec![op], CUSTODY, TEA, vec![TEA]);
        assert!(matches!(
            Ledger::new(dup, bank.clone(), StubVesting::new()).map(|_| ()),
            Err(StakingError::OnlyValidToken)
        ));

        let zero = LedgerParams::new(LEDGER, vec![ADMIN], TREASURY, vec![op], [0u8; 32], TEA, vec![]);
        assert!(matches!(
            Ledger::new(zero, bank.clone(), StubVesting::new()).map(|_| ()),
            Err(StakingError::NoZeroAddress)
        ));

        let decimals = LedgerParams::new(LEDGER, vec![ADMIN], TREASURY, vec![op], CUSTODY, TEA, vec![PRESALE]);
        assert!(matches!(
            Ledger::new(decimals, bank, StubVesting::new()).map(|_| ()),
            Err(StakingError::WrongDecimalNumber { .. })
        ));
    }

    #[test]
    fn test_queries() {
        let (mut ledger, _) = setup();
        assert!(ledger.check_token_validity(&TEA));
        assert!(ledger.check_token_validity(&PRESALE));
        assert!(!ledger.check_token_validity(&[0x09; 32]));
        assert_eq!(ledger.primary_token(), &TEA);
        assert_eq!(ledger.auxiliary_tokens(), &[PRESALE]);
        assert_eq!(ledger.vesting_custody(), &CUSTODY);
        assert!(matches!(
            ledger.get_pending_rewards(1, START),
            Err(StakingError::InvalidId(1))
        ));
        ledger.update_reward_per_share(START + days(1)).expect("refresh");
        assert_eq!(ledger.reward_state().last_accrual_time, START + days(1));
    }
}
