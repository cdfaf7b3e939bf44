//! In-memory services for development and tests.
//!
//! [`MemoryBank`] plays both the token bank and the delegated-transfer
//! service. A pull from an owner needs two grants, mirroring the usual
//! two-layer allowance model: the owner must have approved the transfer
//! service for the token, and must have granted the spender an allowance
//! through the service (directly, or with a signed single-use permit).
//!
//! [`StubVesting`] answers entitlement queries from a fixed table.

use std::collections::HashMap;

use tea_crypto::ed25519::SignerProof;
use tea_types::{address, Address, Amount, Timestamp, TokenId};

use crate::services::{
    DelegatedTransfer, PermitSingle, TokenBank, TokenPermit, TransferError, VestingError,
    VestingOracle,
};

/// Allowance granted to a spender through the transfer service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Allowance {
    pub amount: Amount,
    pub expiration: Timestamp,
}

/// In-memory token balances and delegated transfers.
#[derive(Clone, Debug, Default)]
pub struct MemoryBank {
    decimals: HashMap<TokenId, u8>,
    balances: HashMap<(TokenId, Address), Amount>,
    /// (token, owner) → amount the transfer service may move.
    service_approvals: HashMap<(TokenId, Address), Amount>,
    /// (token, owner, spender) → allowance.
    allowances: HashMap<(TokenId, Address, Address), Allowance>,
    permit_nonces: HashMap<Address, u64>,
    token_permit_nonces: HashMap<(TokenId, Address), u64>,
    /// Burned on every delegated pull, to simulate fee-on-transfer tokens.
    transfer_fees: HashMap<TokenId, Amount>,
}

impl MemoryBank {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_token(&mut self, token: TokenId, decimals: u8) {
        self.decimals.insert(token, decimals);
    }

    /// Credit `amount` out of thin air (development only).
    pub fn mint(&mut self, token: &TokenId, to: &Address, amount: Amount) {
        tracing::debug!(to = %address::short(to), amount = %amount, "memory bank: mint");
        let balance = self.balances.entry((*token, *to)).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// Owner approves the transfer service for `token`. `u128::MAX` never decreases.
    pub fn approve_service(&mut self, token: &TokenId, owner: &Address, amount: Amount) {
        self.service_approvals.insert((*token, *owner), amount);
    }

    /// Owner grants `spender` a standing allowance through the service.
    pub fn approve(
        &mut self,
        token: &TokenId,
        owner: &Address,
        spender: &Address,
        amount: Amount,
        expiration: Timestamp,
    ) {
        self.allowances
            .insert((*token, *owner, *spender), Allowance { amount, expiration });
    }

    pub fn allowance(&self, token: &TokenId, owner: &Address, spender: &Address) -> Option<Allowance> {
        self.allowances.get(&(*token, *owner, *spender)).copied()
    }

    pub fn permit_nonce(&self, owner: &Address) -> u64 {
        self.permit_nonces.get(owner).copied().unwrap_or(0)
    }

    pub fn token_permit_nonce(&self, token: &TokenId, owner: &Address) -> u64 {
        self.token_permit_nonces
            .get(&(*token, *owner))
            .copied()
            .unwrap_or(0)
    }

    pub fn set_transfer_fee(&mut self, token: &TokenId, fee: Amount) {
        self.transfer_fees.insert(*token, fee);
    }

    fn require_token(&self, token: &TokenId) -> Result<(), TransferError> {
        if self.decimals.contains_key(token) {
            Ok(())
        } else {
            Err(TransferError::UnknownToken)
        }
    }

    fn debit(&mut self, token: &TokenId, from: &Address, amount: Amount) -> Result<(), TransferError> {
        let available = self.balance_of(token, from);
        if available < amount {
            return Err(TransferError::InsufficientBalance {
                needed: amount,
                available,
            });
        }
        self.balances.insert((*token, *from), available - amount);
        Ok(())
    }

    fn credit(&mut self, token: &TokenId, to: &Address, amount: Amount) {
        let balance = self.balances.entry((*token, *to)).or_insert(0);
        *balance = balance.saturating_add(amount);
    }
}

fn check_signer(proof: &SignerProof, digest: &[u8; 32], owner: &Address) -> Result<(), TransferError> {
    let signer = proof
        .recover(digest)
        .map_err(|e| TransferError::InvalidPermit(e.to_string()))?;
    if signer != *owner {
        return Err(TransferError::InvalidPermit("signer is not the owner".into()));
    }
    Ok(())
}

impl TokenBank for MemoryBank {
    fn decimals(&self, token: &TokenId) -> Result<u8, TransferError> {
        self.decimals
            .get(token)
            .copied()
            .ok_or(TransferError::UnknownToken)
    }

    fn balance_of(&self, token: &TokenId, holder: &Address) -> Amount {
        self.balances.get(&(*token, *holder)).copied().unwrap_or(0)
    }

    fn transfer(
        &mut self,
        token: &TokenId,
        from: &Address,
        to: &Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        self.require_token(token)?;
        self.debit(token, from, amount)?;
        self.credit(token, to, amount);
        Ok(())
    }
}

impl DelegatedTransfer for MemoryBank {
    fn permit_service(
        &mut self,
        permit: &TokenPermit,
        proof: &SignerProof,
        now: Timestamp,
    ) -> Result<(), TransferError> {
        self.require_token(&permit.token)?;
        if now > permit.deadline {
            return Err(TransferError::InvalidPermit("token permit expired".into()));
        }
        let expected = self.token_permit_nonce(&permit.token, &permit.owner);
        if permit.nonce != expected {
            return Err(TransferError::InvalidPermit(format!(
                "token permit nonce {} (expected {expected})",
                permit.nonce
            )));
        }
        check_signer(proof, &permit.digest(), &permit.owner)?;

        self.token_permit_nonces
            .insert((permit.token, permit.owner), expected.saturating_add(1));
        self.service_approvals
            .insert((permit.token, permit.owner), permit.value);
        Ok(())
    }

    fn permit(
        &mut self,
        owner: &Address,
        permit: &PermitSingle,
        proof: &SignerProof,
        now: Timestamp,
    ) -> Result<(), TransferError> {
        self.require_token(&permit.token)?;
        if now > permit.sig_deadline {
            return Err(TransferError::InvalidPermit("permit signature expired".into()));
        }
        let expected = self.permit_nonce(owner);
        if permit.nonce != expected {
            return Err(TransferError::InvalidPermit(format!(
                "permit nonce {} (expected {expected})",
                permit.nonce
            )));
        }
        check_signer(proof, &permit.digest(owner), owner)?;

        self.permit_nonces.insert(*owner, expected.saturating_add(1));
        self.approve(
            &permit.token,
            owner,
            &permit.spender,
            permit.amount,
            permit.expiration,
        );
        Ok(())
    }

    fn transfer_from(
        &mut self,
        token: &TokenId,
        from: &Address,
        spender: &Address,
        amount: Amount,
        now: Timestamp,
    ) -> Result<(), TransferError> {
        self.require_token(token)?;

        let allowance = self
            .allowance(token, from, spender)
            .filter(|a| now <= a.expiration)
            .map(|a| a.amount)
            .unwrap_or(0);
        if allowance < amount {
            return Err(TransferError::InsufficientAllowance {
                needed: amount,
                available: allowance,
            });
        }
        let approved = self
            .service_approvals
            .get(&(*token, *from))
            .copied()
            .unwrap_or(0);
        if approved < amount {
            return Err(TransferError::InsufficientAllowance {
                needed: amount,
                available: approved,
            });
        }

        self.debit(token, from, amount)?;
        let fee = self.transfer_fees.get(token).copied().unwrap_or(0).min(amount);
        self.credit(token, spender, amount - fee);

        if let Some(a) = self.allowances.get_mut(&(*token, *from, *spender)) {
            if a.amount != Amount::MAX {
                a.amount -= amount;
            }
        }
        if approved != Amount::MAX {
            self.service_approvals
                .insert((*token, *from), approved - amount);
        }
        Ok(())
    }
}

/// Fixed vesting entitlements.
#[derive(Clone, Debug, Default)]
pub struct StubVesting {
    entitlements: HashMap<(Address, TokenId), Amount>,
}

impl StubVesting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_entitlement(&mut self, user: Address, token: TokenId, amount: Amount) {
        tracing::debug!(user = %address::short(&user), amount = %amount, "stub vesting: entitlement set");
        self.entitlements.insert((user, token), amount);
    }
}

impl VestingOracle for StubVesting {
    fn entitlement(&self, user: &Address, token: &TokenId) -> Result<Amount, VestingError> {
        Ok(self.entitlements.get(&(*user, *token)).copied().unwrap_or(0))
    }
}
