//! # tea-staking
//!
//! Staking ledger for the primary reward-bearing token and a whitelist of
//! auxiliary (presale) tokens. Principal and reward leave the ledger only
//! through exit requests attested by a trusted operator key.
//!
//! ## Modules
//!
//! - [`tokens`]: Accepted token set, validated at construction
//! - [`eligibility`]: Deposit eligibility gate (token, amount, vesting entitlement, descriptor)
//! - [`intake`]: Allowance intake (standing allowance or signed permits)
//! - [`position`]: Position records, id arena and per-user index
//! - [`lock`]: Tiered lock policy and withdrawal cooldown
//! - [`budget`]: Reward budget, epoch window and reward-per-share accumulator
//! - [`attestation`]: Operator attestation digests, signer recovery and nonces
//! - [`admin`]: Role membership for admin-gated entry points
//! - [`forwarder`]: Trusted-forwarder meta-transactions for stake and withdraw
//! - [`services`]: Traits for the external token, transfer and vesting services
//! - [`ledger`]: The [`ledger::StakingLedger`] tying it all together
//! - [`stub`]: In-memory services for development and tests

pub mod admin;
pub mod attestation;
pub mod budget;
pub mod eligibility;
pub mod forwarder;
pub mod intake;
pub mod ledger;
pub mod lock;
pub mod position;
pub mod services;
pub mod stub;
pub mod tokens;

pub use ledger::{LedgerParams, StakingLedger};

use services::{TransferError, VestingError};

/// Error categories. Every failure aborts the call; none are retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Bad construction arguments.
    Configuration,
    /// Wrong role, operator, or credential.
    Authorization,
    /// Inputs not acceptable for a deposit right now.
    Eligibility,
    /// Position in the wrong state or a timer has not elapsed.
    Lifecycle,
    /// Attested reward exceeds the recomputed bound.
    AccountingBound,
    /// Failure reported by an external service.
    External,
}

/// Error types for staking operations.
#[derive(Debug, thiserror::Error)]
pub enum StakingError {
    /// A configured role, operator, vesting address or token is zero.
    #[error("zero address not allowed")]
    NoZeroAddress,

    /// Token not accepted, or duplicated in the accepted set.
    #[error("token is not valid for staking")]
    OnlyValidToken,

    /// Auxiliary token decimals differ from the primary token.
    #[error("decimals mismatch: primary {primary}, token {token}")]
    WrongDecimalNumber {
        /// Primary token decimals.
        primary: u8,
        /// Offending token decimals.
        token: u8,
    },

    /// Stake amount is zero.
    #[error("amount must be non-zero")]
    NoZeroAmount,

    /// Vesting entitlement does not cover the requested stake.
    #[error("not enough locked tokens: entitled {entitled}, required {required}")]
    NotEnoughLockedTokens {
        /// Entitlement reported by the vesting oracle.
        entitled: u128,
        /// Previously staked plus requested.
        required: u128,
    },

    /// Delegation descriptor does not match token, sender or ledger.
    #[error("delegation descriptor addresses mismatch")]
    AddressesMismatch,

    /// Outside the staking window, or staking never initialized.
    #[error("staking is not active")]
    StakingNotActive,

    /// An epoch is still running.
    #[error("staking already initialized: current window ends at {ends_at}")]
    StakingAlreadyInitialized {
        /// End of the running window.
        ends_at: u64,
    },

    /// Caller lacks the required role.
    #[error("caller is not authorized")]
    Unauthorized,

    /// Parallel input arrays are empty or differ in length.
    #[error("invalid array lengths: expected {expected}, got {actual}")]
    InvalidArrayLengths {
        /// Length of the leading array (ids, tokens).
        expected: usize,
        /// Length of the first array that disagrees.
        actual: usize,
    },

    /// Id unknown, not owned by the user, or repeated in one request.
    #[error("invalid position id {0}")]
    InvalidId(u64),

    /// Position is not Active.
    #[error("nothing to unstake for position {0}")]
    NothingToUnstake(u64),

    /// Minimum hold (and protect window for large stakes) not elapsed.
    #[error("locked period not passed for position {id}: unlocks at {unlocks_at}")]
    LockedPeriodNotPassed {
        /// Position id.
        id: u64,
        /// Earliest unstake time.
        unlocks_at: u64,
    },

    /// Attested reward above the recomputed bound.
    #[error("invalid reward for position {id}: attested {attested}, bound {bound}")]
    InvalidCalculationReward {
        /// Position id.
        id: u64,
        /// Reward in the attestation.
        attested: u128,
        /// Recomputed upper bound.
        bound: u128,
    },

    /// Position must be Unstaked before withdrawal.
    #[error("position {0} must be unstaked first")]
    NeedToUnstakeFirst(u64),

    /// Post-unstake cooldown not elapsed.
    #[error("claim cooldown not passed for position {id}: available at {available_at}")]
    ClaimCooldownNotPassed {
        /// Position id.
        id: u64,
        /// Earliest withdrawal time.
        available_at: u64,
    },

    /// Operator not in the configured operator set.
    #[error("INVALID_OPERATOR")]
    InvalidOperator,

    /// Attestation deadline passed.
    #[error("SIGNATURE_EXPIRED")]
    SignatureExpired,

    /// Attestation nonce differs from the stored nonce.
    #[error("MISMATCHING_NONCES: expected {expected}, got {actual}")]
    MismatchingNonces {
        /// Stored nonce.
        expected: u64,
        /// Nonce in the request.
        actual: u64,
    },

    /// Recovered signer differs from the operator or the forwarded sender.
    #[error("INVALID_SIGNATURE")]
    InvalidSignature,

    /// Relayer is not the ledger's trusted forwarder.
    #[error("relayer is not the trusted forwarder")]
    UntrustedForwarder,

    /// The ledger did not end up holding exactly the requested amount.
    #[error("intake shortfall: expected {expected}, received {received}")]
    IntakeShortfall {
        /// Requested amount.
        expected: u128,
        /// Balance delta observed.
        received: u128,
    },

    /// Arithmetic overflow in accounting.
    #[error("arithmetic overflow")]
    Overflow,

    /// Transfer service failure, propagated unmodified.
    #[error("transfer failed: {0}")]
    Transfer(#[from] TransferError),

    /// Vesting oracle failure.
    #[error("vesting oracle failed: {0}")]
    Vesting(#[from] VestingError),
}

impl StakingError {
    /// The category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NoZeroAddress | Self::WrongDecimalNumber { .. } => ErrorCategory::Configuration,
            Self::Unauthorized
            | Self::InvalidOperator
            | Self::SignatureExpired
            | Self::MismatchingNonces { .. }
            | Self::InvalidSignature
            | Self::UntrustedForwarder
            | Self::AddressesMismatch => ErrorCategory::Authorization,
            Self::OnlyValidToken
            | Self::NoZeroAmount
            | Self::NotEnoughLockedTokens { .. }
            | Self::StakingNotActive
            | Self::InvalidArrayLengths { .. }
            | Self::InvalidId(_) => ErrorCategory::Eligibility,
            Self::StakingAlreadyInitialized { .. }
            | Self::NothingToUnstake(_)
            | Self::LockedPeriodNotPassed { .. }
            | Self::NeedToUnstakeFirst(_)
            | Self::ClaimCooldownNotPassed { .. } => ErrorCategory::Lifecycle,
            Self::InvalidCalculationReward { .. } | Self::Overflow => {
                ErrorCategory::AccountingBound
            }
            Self::IntakeShortfall { .. } | Self::Transfer(_) | Self::Vesting(_) => {
                ErrorCategory::External
            }
        }
    }

    /// Stable SCREAMING_SNAKE name for wire surfaces.
    pub fn code_name(&self) -> &'static str {
        match self {
            Self::NoZeroAddress => "NO_ZERO_ADDRESS",
            Self::OnlyValidToken => "ONLY_VALID_TOKEN",
            Self::WrongDecimalNumber { .. } => "WRONG_DECIMAL_NUMBER",
            Self::NoZeroAmount => "NO_ZERO_AMOUNT",
            Self::NotEnoughLockedTokens { .. } => "NOT_ENOUGH_LOCKED_TOKENS",
            Self::AddressesMismatch => "ADDRESSES_MISMATCH",
            Self::StakingNotActive => "STAKING_NOT_ACTIVE",
            Self::StakingAlreadyInitialized { .. } => "STAKING_ALREADY_INITIALIZED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InvalidArrayLengths { .. } => "INVALID_ARRAY_LENGTHS",
            Self::InvalidId(_) => "INVALID_ID",
            Self::NothingToUnstake(_) => "NOTHING_TO_UNSTAKE",
            Self::LockedPeriodNotPassed { .. } => "LOCKED_PERIOD_NOT_PASSED",
            Self::InvalidCalculationReward { .. } => "INVALID_CALCULATION_REWARD",
            Self::NeedToUnstakeFirst(_) => "NEED_TO_UNSTAKE_FIRST",
            Self::ClaimCooldownNotPassed { .. } => "CLAIM_COOLDOWN_NOT_PASSED",
            Self::InvalidOperator => "INVALID_OPERATOR",
            Self::SignatureExpired => "SIGNATURE_EXPIRED",
            Self::MismatchingNonces { .. } => "MISMATCHING_NONCES",
            Self::InvalidSignature => "INVALID_SIGNATURE",
            Self::UntrustedForwarder => "UNTRUSTED_FORWARDER",
            Self::IntakeShortfall { .. } => "INTAKE_SHORTFALL",
            Self::Overflow => "OVERFLOW",
            Self::Transfer(_) => "TRANSFER_FAILED",
            Self::Vesting(_) => "VESTING_FAILED",
        }
    }
}

/// Convenience result type for staking operations.
pub type Result<T> = std::result::Result<T, StakingError>;

/// `floor(a * b / c)` with a 256-bit intermediate product.
///
/// Fails with `Overflow` only when the quotient itself does not fit in a
/// `u128`. A zero divisor yields zero.
pub(crate) fn mul_div(a: u128, b: u128, c: u128) -> Result<u128> {
    if c == 0 {
        return Ok(0);
    }
    if let Some(p) = a.checked_mul(b) {
        return Ok(p / c);
    }

    let (hi, lo) = mul_wide(a, b);
    if hi >= c {
        return Err(StakingError::Overflow);
    }
    // Restoring long division of (hi, lo) by c, one bit at a time.
    let mut rem = hi;
    let mut quotient: u128 = 0;
    for bit in (0..128).rev() {
        let carry = rem >> 127;
        rem = (rem << 1) | ((lo >> bit) & 1);
        quotient <<= 1;
        if carry == 1 || rem >= c {
            rem = rem.wrapping_sub(c);
            quotient |= 1;
        }
    }
    Ok(quotient)
}

/// Full product of two `u128` as `(high, low)` halves.
fn mul_wide(a: u128, b: u128) -> (u128, u128) {
    const MASK: u128 = u64::MAX as u128;
    let (a1, a0) = (a >> 64, a & MASK);
    let (b1, b0) = (b >> 64, b & MASK);

    let p00 = a0 * b0;
    let p01 = a0 * b1;
    let p10 = a1 * b0;
    let p11 = a1 * b1;

    let mid = (p00 >> 64) + (p01 & MASK) + (p10 & MASK);
    let lo = (p00 & MASK) | ((mid & MASK) << 64);
    let hi = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
    (hi, lo)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            StakingError::NoZeroAddress.category(),
            ErrorCategory::Configuration
        );
        assert_eq!(
            StakingError::SignatureExpired.category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            StakingError::StakingNotActive.category(),
            ErrorCategory::Eligibility
        );
        assert_eq!(
            StakingError::NeedToUnstakeFirst(1).category(),
            ErrorCategory::Lifecycle
        );
        assert_eq!(
            StakingError::InvalidCalculationReward {
                id: 1,
                attested: 2,
                bound: 1
            }
            .category(),
            ErrorCategory::AccountingBound
        );
    }

    #[test]
    fn test_attestation_messages_match_wire_names() {
        assert_eq!(StakingError::InvalidOperator.to_string(), "INVALID_OPERATOR");
        assert_eq!(StakingError::InvalidSignature.code_name(), "INVALID_SIGNATURE");
    }

    #[test]
    fn test_mul_div() {
        assert_eq!(mul_div(10, 3, 4).expect("mul_div"), 7);
        assert_eq!(mul_div(10, 3, 0).expect("zero divisor"), 0);
        assert!(matches!(
            mul_div(u128::MAX, 2, 1),
            Err(StakingError::Overflow)
        ));
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // 1e27 * 1e12 does not fit in u128, the quotient does.
        let emitted: u128 = 1_000_000_000 * 10u128.pow(18);
        let precision: u128 = 1_000_000_000_000;
        assert_eq!(
            mul_div(emitted, precision, 10u128.pow(20)).expect("wide"),
            10u128.pow(19)
        );
        assert_eq!(mul_div(u128::MAX, u128::MAX, u128::MAX).expect("max"), u128::MAX);
        assert_eq!(mul_div(u128::MAX, 3, 6).expect("half"), u128::MAX / 2);
        assert_eq!(
            mul_div(u128::MAX, 10, 7).unwrap_err().code_name(),
            "OVERFLOW"
        );
    }
}
