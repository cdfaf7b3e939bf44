//! Deposit eligibility.
//!
//! A deposit element is eligible when its token is accepted, its amount is
//! non-zero, its delegation descriptor names the same token, the caller as
//! sender and the ledger as recipient, and (for auxiliary tokens) the
//! caller's vesting entitlement covers what they already have staked of that
//! token plus the new amount.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as};
use tea_crypto::blake3::{contexts, FieldEncoder};
use tea_types::{Address, Amount, Hash, TokenId};

use crate::services::VestingOracle;
use crate::tokens::AcceptedTokenSet;
use crate::{Result, StakingError};

/// Caller-declared routing of one deposit element.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationDescriptor {
    #[serde_as(as = "Hex")]
    pub token: TokenId,
    #[serde_as(as = "Hex")]
    pub from: Address,
    #[serde_as(as = "Hex")]
    pub to: Address,
}

impl DelegationDescriptor {
    pub fn new(token: TokenId, from: Address, to: Address) -> Self {
        Self { token, from, to }
    }

    /// Stable identifier for logs and receipts.
    pub fn digest(&self) -> Hash {
        FieldEncoder::new()
            .bytes32(&self.token)
            .bytes32(&self.from)
            .bytes32(&self.to)
            .digest(contexts::DELEGATION_DESCRIPTOR)
    }
}

/// Stateless checks for one deposit element.
pub struct EligibilityGate<'a, V> {
    tokens: &'a AcceptedTokenSet,
    vesting: &'a V,
    ledger: &'a Address,
}

impl<'a, V: VestingOracle> EligibilityGate<'a, V> {
    pub fn new(tokens: &'a AcceptedTokenSet, vesting: &'a V, ledger: &'a Address) -> Self {
        Self {
            tokens,
            vesting,
            ledger,
        }
    }

    /// Validate one element.
    ///
    /// `already_staked` is what `caller` has live in `token` including any
    /// earlier elements of the same batch.
    pub fn check(
        &self,
        caller: &Address,
        token: &TokenId,
        amount: Amount,
        descriptor: &DelegationDescriptor,
        already_staked: Amount,
    ) -> Result<()> {
        if !self.tokens.contains(token) {
            return Err(StakingError::OnlyValidToken);
        }
        if amount == 0 {
            return Err(StakingError::NoZeroAmount);
        }
        if descriptor.token != *token || descriptor.from != *caller || descriptor.to != *self.ledger {
            return Err(StakingError::AddressesMismatch);
        }
        if self.tokens.is_auxiliary(token) {
            let required = already_staked
                .checked_add(amount)
                .ok_or(StakingError::Overflow)?;
            let entitled = self.vesting.entitlement(caller, token)?;
            if entitled < required {
                return Err(StakingError::NotEnoughLockedTokens { entitled, required });
            }
        }
        Ok(())
    }
}
