//! Hex parsing and formatting for 32-byte identities.

use crate::{Address, ZERO_ADDRESS};

/// Errors from parsing identities.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    /// Not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// Wrong decoded length.
    #[error("expected 32 bytes, got {0}")]
    InvalidLength(usize),
}

/// Parse a 32-byte identity from hex, with or without a `0x` prefix.
pub fn parse(s: &str) -> Result<Address, AddressError> {
    let raw = hex::decode(s.trim().trim_start_matches("0x"))
        .map_err(|e| AddressError::InvalidHex(e.to_string()))?;
    let len = raw.len();
    raw.try_into().map_err(|_| AddressError::InvalidLength(len))
}

/// Format an identity as `0x`-prefixed hex.
pub fn to_hex(addr: &Address) -> String {
    format!("0x{}", hex::encode(addr))
}

/// Short form used in log lines (`0xaabbccdd…`).
pub fn short(addr: &Address) -> String {
    format!("0x{}…", hex::encode(&addr[..4]))
}

/// Whether the identity is the all-zero address.
pub fn is_zero(addr: &Address) -> bool {
    addr == &ZERO_ADDRESS
}
