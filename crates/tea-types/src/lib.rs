//! # tea-types
//!
//! Shared domain types used across the Tea staking workspace.

pub mod address;
pub mod events;

/// A 32-byte ledger identity (user, operator, admin, treasury, ledger itself).
///
/// Operator identities are Ed25519 verifying keys.
pub type Address = [u8; 32];

/// A 32-byte asset identity.
pub type TokenId = [u8; 32];

/// Token amount in base units.
pub type Amount = u128;

/// Position identifier. Monotonic, 1-based, never reused.
pub type PositionId = u64;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// 32-byte digest.
pub type Hash = [u8; 32];

/// The all-zero identity, never valid for a configured role or token.
pub const ZERO_ADDRESS: Address = [0u8; 32];

/// Decimal precision shared by every accepted token.
pub const TOKEN_DECIMALS: u8 = 18;

/// One whole token in base units.
pub const ONE_TOKEN: Amount = 1_000_000_000_000_000_000;

/// Seconds per day.
pub const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Build a whole-token amount. Saturates instead of overflowing.
pub const fn tokens(whole: u128) -> Amount {
    whole.saturating_mul(ONE_TOKEN)
}

/// Convert a day count to seconds.
pub const fn days(n: u64) -> u64 {
    n * SECONDS_PER_DAY
}
