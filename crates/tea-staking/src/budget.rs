//! Reward budget and reward-per-share accumulator.
//!
//! An epoch distributes `total_allocation` linearly over `epoch_duration`
//! seconds, starting at `start_time`. Each refresh credits the emission
//! since the last refresh to the accumulator, scaled by [`ACC_PRECISION`]
//! and divided by the total Active principal. Emission stops at the epoch
//! end and never exceeds the allocation.
//!
//! ## Formula
//!
//! ```text
//! emitted      = min(elapsed * total_allocation / epoch_duration,
//!                    total_allocation - distributed)
//! acc         += emitted * ACC_PRECISION / total_staked
//! base_pending = principal * (lifetime_acc - reward_debt) / ACC_PRECISION
//! bound        = base_pending * LOYALTY_MULTIPLIER_BPS / BPS_DENOMINATOR
//! ```
//!
//! Reinitialization folds the finished epoch's accumulator into
//! `lifetime_base`, so the lifetime accumulator never decreases.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DisplayFromStr};
use tea_types::{tokens, Amount, Timestamp};

use crate::lock::EPOCH_DURATION;
use crate::{mul_div, Result, StakingError};

/// Fixed-point scale of the accumulator.
pub const ACC_PRECISION: u128 = 1_000_000_000_000;

/// Maximum loyalty multiplier an operator may attest, in basis points.
pub const LOYALTY_MULTIPLIER_BPS: u128 = 20_000;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u128 = 10_000;

/// Default allocation per epoch: 7,500,000 tokens.
pub const DEFAULT_TOTAL_ALLOCATION: Amount = tokens(7_500_000);

/// Global reward pool state.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardBudget {
    #[serde_as(as = "DisplayFromStr")]
    pub total_allocation: Amount,
    /// `None` until the first initialization.
    pub start_time: Option<Timestamp>,
    pub epoch_duration: u64,
    /// Accumulator of the current epoch.
    #[serde_as(as = "DisplayFromStr")]
    pub acc_reward_per_share: u128,
    /// Accumulator carried over from finished epochs.
    #[serde_as(as = "DisplayFromStr")]
    pub lifetime_base: u128,
    /// Emitted so far in the current epoch.
    #[serde_as(as = "DisplayFromStr")]
    pub distributed: Amount,
    pub last_accrual_time: Timestamp,
}

impl Default for RewardBudget {
    fn default() -> Self {
        Self::new(EPOCH_DURATION)
    }
}

impl RewardBudget {
    /// An uninitialized budget. Staking is inactive until [`initialize`](Self::initialize).
    pub fn new(epoch_duration: u64) -> Self {
        Self {
            total_allocation: 0,
            start_time: None,
            epoch_duration,
            acc_reward_per_share: 0,
            lifetime_base: 0,
            distributed: 0,
            last_accrual_time: 0,
        }
    }

    /// End of the current staking window, if initialized.
    pub fn end_time(&self) -> Option<Timestamp> {
        self.start_time
            .map(|start| start.saturating_add(self.epoch_duration))
    }

    /// Whether `now` lies inside `[start_time, start_time + epoch_duration]`.
    pub fn is_active(&self, now: Timestamp) -> bool {
        match (self.start_time, self.end_time()) {
            (Some(start), Some(end)) => now >= start && now <= end,
            _ => false,
        }
    }

    /// Start a new epoch.
    ///
    /// A restart may only move the window forward: the new start may not
    /// precede the end of the previous window.
    ///
    /// The caller must [`refresh`](Self::refresh) first so the finished
    /// epoch's emission is credited before it is folded away.
    ///
    /// # Errors
    ///
    /// - [`StakingError::StakingAlreadyInitialized`] if the current window
    ///   has not elapsed at `now`, or `start_time` falls before its end
    /// - [`StakingError::Overflow`] if the lifetime accumulator overflows
    pub fn initialize(
        &mut self,
        total_allocation: Amount,
        start_time: Timestamp,
        now: Timestamp,
    ) -> Result<()> {
        if let Some(ends_at) = self.end_time() {
            if now <= ends_at || start_time < ends_at {
                return Err(StakingError::StakingAlreadyInitialized { ends_at });
            }
        }

        self.lifetime_base = self.lifetime_accumulator()?;
        self.acc_reward_per_share = 0;
        self.distributed = 0;
        self.total_allocation = total_allocation;
        self.start_time = Some(start_time);
        self.last_accrual_time = start_time;
        Ok(())
    }

    /// Credit emission since the last refresh. Returns the amount emitted.
    ///
    /// Time advances even when nothing is staked; that emission is forfeited.
    /// On error the budget is left exactly as it was.
    pub fn refresh(&mut self, total_staked: Amount, now: Timestamp) -> Result<Amount> {
        let Some(end) = self.end_time() else {
            return Ok(0);
        };
        let to = now.min(end);
        if to <= self.last_accrual_time {
            return Ok(0);
        }
        let elapsed = to - self.last_accrual_time;

        if total_staked == 0 || self.epoch_duration == 0 {
            self.last_accrual_time = to;
            return Ok(0);
        }

        let remaining = self.total_allocation.saturating_sub(self.distributed);
        let emitted = mul_div(
            u128::from(elapsed),
            self.total_allocation,
            u128::from(self.epoch_duration),
        )?
        .min(remaining);
        if emitted == 0 {
            self.last_accrual_time = to;
            return Ok(0);
        }

        let per_share = mul_div(emitted, ACC_PRECISION, total_staked)?;
        let acc = self
            .acc_reward_per_share
            .checked_add(per_share)
            .ok_or(StakingError::Overflow)?;
        let distributed = self
            .distributed
            .checked_add(emitted)
            .ok_or(StakingError::Overflow)?;
        // Lifetime view must stay representable for pending queries.
        self.lifetime_base
            .checked_add(acc)
            .ok_or(StakingError::Overflow)?;

        self.acc_reward_per_share = acc;
        self.distributed = distributed;
        self.last_accrual_time = to;

        tracing::debug!(
            emitted = %emitted,
            acc = %self.acc_reward_per_share,
            at = to,
            "reward accumulator refreshed"
        );
        Ok(emitted)
    }

    /// Read-only view of the budget as if refreshed at `now`.
    pub fn projected(&self, total_staked: Amount, now: Timestamp) -> Result<Self> {
        let mut view = self.clone();
        view.refresh(total_staked, now)?;
        Ok(view)
    }

    /// Accumulator across all epochs. Never decreases.
    pub fn lifetime_accumulator(&self) -> Result<u128> {
        self.lifetime_base
            .checked_add(self.acc_reward_per_share)
            .ok_or(StakingError::Overflow)
    }

    /// Base reward earned by `principal` since the accumulator stood at `reward_debt`.
    pub fn pending_base(&self, principal: Amount, reward_debt: u128) -> Result<Amount> {
        let delta = self.lifetime_accumulator()?.saturating_sub(reward_debt);
        mul_div(principal, delta, ACC_PRECISION)
    }

    /// Largest reward an operator may attest for such a position.
    pub fn reward_bound(&self, principal: Amount, reward_debt: u128) -> Result<Amount> {
        mul_div(
            self.pending_base(principal, reward_debt)?,
            LOYALTY_MULTIPLIER_BPS,
            BPS_DENOMINATOR,
        )
    }
}
