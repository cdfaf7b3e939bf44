//! External collaborators of the ledger.
//!
//! The ledger never moves tokens itself. It talks to three services:
//!
//! - [`TokenBank`]: balances, decimals and transfers out of ledger custody
//! - [`DelegatedTransfer`]: pulls from depositors under a standing allowance
//!   or a single-use signed permit
//! - [`VestingOracle`]: read-only entitlement of a user for an auxiliary token
//!
//! The permit payloads live here because both the signer (depositor wallet)
//! and the service must agree on their digests.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as, DisplayFromStr};
use tea_crypto::blake3::{contexts, FieldEncoder};
use tea_crypto::ed25519::{SignerProof, SigningKey};
use tea_types::{Address, Amount, Hash, Timestamp, TokenId};

/// Failures reported by the token bank or the delegated-transfer service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferError {
    /// The token is not known to the bank.
    #[error("unknown token")]
    UnknownToken,

    /// Holder balance too low.
    #[error("insufficient balance: needed {needed}, available {available}")]
    InsufficientBalance {
        /// Amount requested.
        needed: Amount,
        /// Amount held.
        available: Amount,
    },

    /// Allowance too low or expired.
    #[error("insufficient allowance: needed {needed}, available {available}")]
    InsufficientAllowance {
        /// Amount requested.
        needed: Amount,
        /// Allowance remaining.
        available: Amount,
    },

    /// Permit signature, nonce or deadline rejected.
    #[error("invalid permit: {0}")]
    InvalidPermit(String),
}

/// Failures reported by the vesting oracle.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VestingError {
    /// The oracle does not track this token.
    #[error("token not tracked by vesting oracle")]
    UnknownToken,

    /// The oracle could not answer.
    #[error("vesting oracle unavailable: {0}")]
    Unavailable(String),
}

/// Token balances and custody transfers.
pub trait TokenBank {
    /// Decimal precision of `token`.
    fn decimals(&self, token: &TokenId) -> Result<u8, TransferError>;

    /// Balance of `holder` in `token`.
    fn balance_of(&self, token: &TokenId, holder: &Address) -> Amount;

    /// Move `amount` of `token` held by `from` (the ledger) to `to`.
    fn transfer(
        &mut self,
        token: &TokenId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError>;
}

/// Delegated pulls from depositors.
pub trait DelegatedTransfer {
    /// Apply a signed token-level permit that authorizes the transfer
    /// service itself to move the owner's tokens.
    fn permit_service(
        &mut self,
        permit: &TokenPermit,
        proof: &SignerProof,
        now: Timestamp,
    ) -> Result<(), TransferError>;

    /// Apply a single-use signed permit granting `permit.spender` an allowance.
    fn permit(
        &mut self,
        owner: &Address,
        permit: &PermitSingle,
        proof: &SignerProof,
        now: Timestamp,
    ) -> Result<(), TransferError>;

    /// Pull `amount` of `token` from `from` to `spender` under the allowance
    /// `from` granted to `spender`.
    fn transfer_from(
        &mut self,
        token: &TokenId,
        from: &Address,
        spender: &Address,
        amount: Amount,
        now: Timestamp,
    ) -> Result<(), TransferError>;
}

/// Read-only vesting entitlement query.
pub trait VestingOracle {
    /// How much of `token` the `user` is entitled to lock into the ledger.
    fn entitlement(&self, user: &Address, token: &TokenId) -> Result<Amount, VestingError>;
}

/// Single-use permission for `spender` to pull up to `amount` of `token`.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermitSingle {
    #[serde_as(as = "Hex")]
    pub token: TokenId,
    #[serde_as(as = "DisplayFromStr")]
    pub amount: Amount,
    /// When the granted allowance stops being usable.
    pub expiration: Timestamp,
    /// Owner's permit nonce at signing time.
    pub nonce: u64,
    #[serde_as(as = "Hex")]
    pub spender: Address,
    /// Last moment the signature itself may be submitted.
    pub sig_deadline: Timestamp,
}

impl PermitSingle {
    /// Digest the owner signs.
    pub fn digest(&self, owner: &Address) -> Hash {
        FieldEncoder::new()
            .bytes32(owner)
            .bytes32(&self.token)
            .u128(self.amount)
            .u64(self.expiration)
            .u64(self.nonce)
            .bytes32(&self.spender)
            .u64(self.sig_deadline)
            .digest(contexts::PERMIT_SINGLE)
    }

    /// Sign this permit as `owner_key`.
    pub fn sign(&self, owner_key: &SigningKey) -> SignerProof {
        let owner = owner_key.verifying_key().to_bytes();
        owner_key.sign_with_proof(&self.digest(&owner))
    }
}

/// Token-level permission letting the transfer service move `value` of the
/// owner's `token`.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPermit {
    #[serde_as(as = "Hex")]
    pub token: TokenId,
    #[serde_as(as = "Hex")]
    pub owner: Address,
    #[serde_as(as = "DisplayFromStr")]
    pub value: Amount,
    pub nonce: u64,
    pub deadline: Timestamp,
}

impl TokenPermit {
    /// Digest the owner signs.
    pub fn digest(&self) -> Hash {
        FieldEncoder::new()
            .bytes32(&self.token)
            .bytes32(&self.owner)
            .u128(self.value)
            .u64(self.nonce)
            .u64(self.deadline)
            .digest(contexts::TOKEN_PERMIT)
    }

    /// Sign this permit as `owner_key`.
    pub fn sign(&self, owner_key: &SigningKey) -> SignerProof {
        owner_key.sign_with_proof(&self.digest())
    }
}
