//! Domain-separated BLAKE3 hashing for the staking ledger.
//!
//! Every digest that ends up under a signature is derived with BLAKE3's
//! key-derivation mode and a registered context string, so an attestation
//! can never be reinterpreted as a permit (or the other way round).
//!
//! ## Modes
//!
//! - [`hash`]: Pure hashing: type hashes, identifiers
//! - [`derive_key`]: Context-bound digests over canonically encoded fields
//!
//! ## Canonical encoding
//!
//! Signed payloads are built with [`FieldEncoder`]: fixed-width big-endian
//! integers, raw 32-byte identities, and `BE32(len)`-prefixed lists.

/// Registered BLAKE3 context strings.
/// Using an unregistered context string for a signed digest is a protocol violation.
pub mod contexts {
    pub const EXIT_ATTESTATION: &str = "TeaStaking v1 exit-attestation";
    pub const PERMIT_SINGLE: &str = "TeaStaking v1 permit-single";
    pub const TOKEN_PERMIT: &str = "TeaStaking v1 token-permit";
    pub const DELEGATION_DESCRIPTOR: &str = "TeaStaking v1 delegation-descriptor";
    pub const FORWARD_REQUEST: &str = "TeaStaking v1 forward-request";
    pub const FORWARDED_CALL: &str = "TeaStaking v1 forwarded-call";

    /// All registered context strings. Used for validation.
    pub const ALL_CONTEXTS: &[&str] = &[
        EXIT_ATTESTATION,
        PERMIT_SINGLE,
        TOKEN_PERMIT,
        DELEGATION_DESCRIPTOR,
        FORWARD_REQUEST,
        FORWARDED_CALL,
    ];
}

/// Compute BLAKE3 hash of the input data.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// Derive a 32-byte digest using BLAKE3's built-in key derivation mode.
///
/// # Arguments
///
/// * `context` - A registered context string (must start with "TeaStaking v1 ")
/// * `material` - The canonically encoded input
pub fn derive_key(context: &str, material: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(material);
    let hash = hasher.finalize();
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Verify that a context string is registered.
pub fn is_registered_context(context: &str) -> bool {
    contexts::ALL_CONTEXTS.contains(&context)
}

/// Builder for the canonical byte encoding of signed payloads.
#[derive(Debug, Default, Clone)]
pub struct FieldEncoder {
    buf: Vec<u8>,
}

impl FieldEncoder {
    /// Create an empty encoder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a raw 32-byte value (identity, hash).
    pub fn bytes32(mut self, value: &[u8; 32]) -> Self {
        self.buf.extend_from_slice(value);
        self
    }

    /// Append a big-endian `u64`.
    pub fn u64(mut self, value: u64) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Append a big-endian `u128`.
    pub fn u128(mut self, value: u128) -> Self {
        self.buf.extend_from_slice(&value.to_be_bytes());
        self
    }

    /// Append a length-prefixed list of 32-byte values.
    pub fn bytes32_list(mut self, values: &[[u8; 32]]) -> Self {
        self.buf
            .extend_from_slice(&(values.len() as u32).to_be_bytes());
        for v in values {
            self.buf.extend_from_slice(v);
        }
        self
    }

    /// Append a length-prefixed list of `u64`.
    pub fn u64_list(mut self, values: &[u64]) -> Self {
        self.buf
            .extend_from_slice(&(values.len() as u32).to_be_bytes());
        for v in values {
            self.buf.extend_from_slice(&v.to_be_bytes());
        }
        self
    }

    /// Append a length-prefixed list of `u128`.
    pub fn u128_list(mut self, values: &[u128]) -> Self {
        self.buf
            .extend_from_slice(&(values.len() as u32).to_be_bytes());
        for v in values {
            self.buf.extend_from_slice(&v.to_be_bytes());
        }
        self
    }

    /// Finish and return the encoded bytes.
    pub fn finish(self) -> Vec<u8> {
        self.buf
    }

    /// Finish and derive a digest under `context`.
    pub fn digest(self, context: &str) -> [u8; 32] {
        derive_key(context, &self.buf)
    }
}
