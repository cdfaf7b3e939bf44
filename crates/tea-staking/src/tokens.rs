//! Accepted token set.
//!
//! Fixed at construction: one primary (reward-bearing) token plus the
//! auxiliary tokens that may be staked against a vesting entitlement.

use std::collections::HashSet;

use tea_types::{address, TokenId};

use crate::services::TokenBank;
use crate::{Result, StakingError};

/// The tokens the ledger accepts, validated once and never mutated.
#[derive(Clone, Debug)]
pub struct AcceptedTokenSet {
    primary: TokenId,
    auxiliary: Vec<TokenId>,
    decimals: u8,
}

impl AcceptedTokenSet {
    /// Validate and build the set.
    ///
    /// Fails with `NoZeroAddress` for a zero token, `OnlyValidToken` if the
    /// primary token appears among the auxiliaries or an auxiliary repeats,
    /// and `WrongDecimalNumber` if any auxiliary's decimals differ from the
    /// primary token's.
    pub fn new<B: TokenBank>(primary: TokenId, auxiliary: Vec<TokenId>, bank: &B) -> Result<Self> {
        if address::is_zero(&primary) {
            return Err(StakingError::NoZeroAddress);
        }
        let decimals = bank.decimals(&primary)?;

        let mut seen = HashSet::with_capacity(auxiliary.len());
        for token in &auxiliary {
            if address::is_zero(token) {
                return Err(StakingError::NoZeroAddress);
            }
            if *token == primary || !seen.insert(*token) {
                return Err(StakingError::OnlyValidToken);
            }
            let token_decimals = bank.decimals(token)?;
            if token_decimals != decimals {
                return Err(StakingError::WrongDecimalNumber {
                    primary: decimals,
                    token: token_decimals,
                });
            }
        }

        Ok(Self {
            primary,
            auxiliary,
            decimals,
        })
    }

    /// Whether `token` may be staked.
    pub fn contains(&self, token: &TokenId) -> bool {
        self.is_primary(token) || self.is_auxiliary(token)
    }

    pub fn is_primary(&self, token: &TokenId) -> bool {
        *token == self.primary
    }

    pub fn is_auxiliary(&self, token: &TokenId) -> bool {
        self.auxiliary.contains(token)
    }

    pub fn primary(&self) -> &TokenId {
        &self.primary
    }

    pub fn auxiliary(&self) -> &[TokenId] {
        &self.auxiliary
    }

    /// Shared decimal precision.
    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// Primary first, then auxiliaries in construction order.
    pub fn all(&self) -> impl Iterator<Item = &TokenId> {
        std::iter::once(&self.primary).chain(self.auxiliary.iter())
    }
}
