//! Tiered lock policy.
//!
//! A position's tier is decided once, from its principal, when it is
//! created. Large ("VIP") positions hold for a year plus a protect window;
//! standard positions hold for a short minimum. The post-unstake cooldown
//! before withdrawal is the same for both tiers.

use serde::{Deserialize, Serialize};
use tea_types::{days, tokens, Amount, PositionId, Timestamp};

use crate::{Result, StakingError};

/// Large-stake threshold (inclusive): 1,000,000 tokens.
pub const LARGE_STAKE_THRESHOLD: Amount = tokens(1_000_000);

/// Minimum hold for standard positions.
pub const STANDARD_HOLD: u64 = days(7);

/// Hold for large positions, before the protect window.
pub const LARGE_HOLD: u64 = days(365);

/// Extra protect window for large positions.
pub const LARGE_PROTECT_WINDOW: u64 = days(30);

/// Cooldown between unstake and withdrawal.
pub const WITHDRAW_COOLDOWN: u64 = days(14);

/// Length of one reward epoch (and of the staking window).
pub const EPOCH_DURATION: u64 = days(365);

/// Lock tier of a position.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockTier {
    Standard,
    Large,
}

/// Lock parameters. Durations in seconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockConfig {
    /// Principal at or above which a position is [`LockTier::Large`].
    pub large_threshold: Amount,
    pub standard_hold: u64,
    pub large_hold: u64,
    pub large_protect: u64,
    pub cooldown: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            large_threshold: LARGE_STAKE_THRESHOLD,
            standard_hold: STANDARD_HOLD,
            large_hold: LARGE_HOLD,
            large_protect: LARGE_PROTECT_WINDOW,
            cooldown: WITHDRAW_COOLDOWN,
        }
    }
}

impl LockConfig {
    /// Tier for a fresh position of size `principal`.
    pub fn tier_for(&self, principal: Amount) -> LockTier {
        if principal >= self.large_threshold {
            LockTier::Large
        } else {
            LockTier::Standard
        }
    }

    /// Total time a position of `tier` must be held before unstaking.
    pub fn min_hold(&self, tier: LockTier) -> u64 {
        match tier {
            LockTier::Standard => self.standard_hold,
            LockTier::Large => self.large_hold.saturating_add(self.large_protect),
        }
    }

    /// Earliest unstake time for a position staked at `staked_at`.
    pub fn unlocks_at(&self, tier: LockTier, staked_at: Timestamp) -> Timestamp {
        staked_at.saturating_add(self.min_hold(tier))
    }

    /// Check that the hold period of position `id` has elapsed at `now`.
    pub fn check_hold(
        &self,
        id: PositionId,
        tier: LockTier,
        staked_at: Timestamp,
        now: Timestamp,
    ) -> Result<()> {
        let unlocks_at = self.unlocks_at(tier, staked_at);
        if now < unlocks_at {
            return Err(StakingError::LockedPeriodNotPassed { id, unlocks_at });
        }
        Ok(())
    }

    /// Earliest withdrawal time for a position unstaked at `unstaked_at`.
    pub fn withdraw_available_at(&self, unstaked_at: Timestamp) -> Timestamp {
        unstaked_at.saturating_add(self.cooldown)
    }

    /// Check that the withdrawal cooldown of position `id` has elapsed.
    pub fn check_cooldown(&self, id: PositionId, unstaked_at: Timestamp, now: Timestamp) -> Result<()> {
        let available_at = self.withdraw_available_at(unstaked_at);
        if now < available_at {
            return Err(StakingError::ClaimCooldownNotPassed { id, available_at });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_threshold_inclusive() {
        let cfg = LockConfig::default();
        assert_eq!(cfg.tier_for(tokens(50_000)), LockTier::Standard);
        assert_eq!(cfg.tier_for(LARGE_STAKE_THRESHOLD - 1), LockTier::Standard);
        assert_eq!(cfg.tier_for(LARGE_STAKE_THRESHOLD), LockTier::Large);
        assert_eq!(cfg.tier_for(tokens(1_000_001)), LockTier::Large);
    }

    #[test]
    fn test_hold_after_15_days() {
        let cfg = LockConfig::default();
        let now = days(15);
        assert!(cfg.check_hold(1, LockTier::Standard, 0, now).is_ok());
        let err = cfg.check_hold(2, LockTier::Large, 0, now).unwrap_err();
        assert!(matches!(
            err,
            StakingError::LockedPeriodNotPassed { id: 2, unlocks_at } if unlocks_at == days(395)
        ));
    }

    #[test]
    fn test_large_hold_boundary() {
        let cfg = LockConfig::default();
        assert!(cfg.check_hold(1, LockTier::Large, 100, 100 + days(395) - 1).is_err());
        assert!(cfg.check_hold(1, LockTier::Large, 100, 100 + days(395)).is_ok());
    }

    #[test]
    fn test_cooldown() {
        let cfg = LockConfig::default();
        let err = cfg.check_cooldown(4, 1_000, 1_000 + days(14) - 1).unwrap_err();
        assert!(matches!(err, StakingError::ClaimCooldownNotPassed { id: 4, .. }));
        assert!(cfg.check_cooldown(4, 1_000, 1_000 + days(14)).is_ok());
    }

    #[test]
    fn test_saturating_unlock() {
        let cfg = LockConfig::default();
        assert_eq!(cfg.unlocks_at(LockTier::Large, u64::MAX), u64::MAX);
    }
}
