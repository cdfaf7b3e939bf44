//! Allowance intake.
//!
//! Funds reach the ledger through the delegated-transfer service, either
//! under a standing allowance the depositor granted earlier, or under a
//! single-use signed permit submitted with the stake. The signed path may
//! carry a second, token-level permit that first authorizes the service
//! itself to move the depositor's tokens. Both paths end the same way: the
//! ledger's balance grows by exactly the requested amount.

use serde::{Deserialize, Serialize};
use tea_crypto::ed25519::SignerProof;
use tea_types::{Address, Amount, Timestamp, TokenId};

use crate::services::{DelegatedTransfer, PermitSingle, TokenBank, TokenPermit};
use crate::{Result, StakingError};

/// A token-level permit with its owner's signature.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTokenPermit {
    pub permit: TokenPermit,
    pub proof: SignerProof,
}

/// A single-use transfer permit, optionally preceded by a token-level permit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedPermit {
    pub permit: PermitSingle,
    pub proof: SignerProof,
    #[serde(default)]
    pub service_permit: Option<SignedTokenPermit>,
}

/// Apply `signed` on behalf of `owner` so the ledger may pull from them.
///
/// The permit must name the ledger as spender; a token-level permit must
/// belong to `owner`. Service errors propagate unchanged.
pub fn authorize<B: DelegatedTransfer>(
    bank: &mut B,
    owner: &Address,
    ledger: &Address,
    signed: &SignedPermit,
    now: Timestamp,
) -> Result<()> {
    if signed.permit.spender != *ledger {
        return Err(StakingError::AddressesMismatch);
    }
    if let Some(service) = &signed.service_permit {
        if service.permit.owner != *owner {
            return Err(StakingError::AddressesMismatch);
        }
        bank.permit_service(&service.permit, &service.proof, now)?;
    }
    bank.permit(owner, &signed.permit, &signed.proof, now)?;
    Ok(())
}

/// Pull exactly `amount` of `token` from `from` into `ledger` custody.
///
/// The ledger's balance is measured around the transfer. If it grew by
/// anything other than `amount`, whatever did arrive is sent back and the
/// pull fails with `IntakeShortfall`.
pub fn pull<B: TokenBank + DelegatedTransfer>(
    bank: &mut B,
    token: &TokenId,
    from: &Address,
    ledger: &Address,
    amount: Amount,
    now: Timestamp,
) -> Result<()> {
    let before = bank.balance_of(token, ledger);
    bank.transfer_from(token, from, ledger, amount, now)?;
    let received = bank.balance_of(token, ledger).saturating_sub(before);

    if received != amount {
        if received > 0 {
            bank.transfer(token, ledger, from, received)?;
        }
        return Err(StakingError::IntakeShortfall {
            expected: amount,
            received,
        });
    }
    Ok(())
}
