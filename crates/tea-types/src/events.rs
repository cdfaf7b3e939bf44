//! Ledger events for off-chain indexers.
//!
//! Amounts serialize as decimal strings so 18-decimal values survive JSON
//! consumers that only have `f64` numbers.

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as, DisplayFromStr};

use crate::{Address, Amount, PositionId, Timestamp, TokenId};

/// Events emitted by the staking ledger.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// A new position was created.
    Staked {
        #[serde_as(as = "Hex")]
        user: Address,
        id: PositionId,
        #[serde_as(as = "Hex")]
        token: TokenId,
        #[serde_as(as = "DisplayFromStr")]
        amount: Amount,
    },
    /// A position left the Active state; `amount` is its principal.
    Unstaked {
        #[serde_as(as = "Hex")]
        user: Address,
        id: PositionId,
        #[serde_as(as = "DisplayFromStr")]
        amount: Amount,
    },
    /// Attested reward harvested from an Active position.
    RewardClaimed {
        #[serde_as(as = "Hex")]
        user: Address,
        id: PositionId,
        #[serde_as(as = "DisplayFromStr")]
        amount: Amount,
    },
    /// Principal plus settled reward released to the owner.
    Withdrawal {
        #[serde_as(as = "Hex")]
        user: Address,
        id: PositionId,
        #[serde_as(as = "DisplayFromStr")]
        amount: Amount,
    },
    /// A reward epoch was (re)initialized.
    StakingInitialized {
        #[serde_as(as = "DisplayFromStr")]
        total_allocation: Amount,
        start_time: Timestamp,
    },
    /// The primary-token balance was swept to the treasury.
    EmergencyWithdrawal {
        #[serde_as(as = "Hex")]
        to: Address,
        #[serde_as(as = "DisplayFromStr")]
        amount: Amount,
    },
}

impl LedgerEvent {
    /// The event name as used on the event bus.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Staked { .. } => "Staked",
            Self::Unstaked { .. } => "Unstaked",
            Self::RewardClaimed { .. } => "RewardClaimed",
            Self::Withdrawal { .. } => "Withdrawal",
            Self::StakingInitialized { .. } => "StakingInitialized",
            Self::EmergencyWithdrawal { .. } => "EmergencyWithdrawal",
        }
    }
}
