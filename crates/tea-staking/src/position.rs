//! Position records and indexes.
//!
//! Positions live in an arena keyed by id: ids are allocated from 1 upward,
//! never reused, and a position's slot is `id - 1`. Withdrawn positions stay
//! in the arena as terminal records. The [`UserIndex`] only lists live
//! (Active or Unstaked) ids.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_with::{hex::Hex, serde_as, DisplayFromStr};
use tea_types::{Address, Amount, PositionId, Timestamp, TokenId};

use crate::lock::LockTier;

/// Lifecycle state. Transitions only Active → Unstaked → Withdrawn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Active,
    Unstaked,
    Withdrawn,
}

/// One deposit.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    #[serde_as(as = "Hex")]
    pub owner: Address,
    #[serde_as(as = "Hex")]
    pub token: TokenId,
    /// Deposited amount. Never changes after creation.
    #[serde_as(as = "DisplayFromStr")]
    pub principal: Amount,
    pub staked_at: Timestamp,
    pub tier: LockTier,
    pub status: PositionStatus,
    /// Lifetime reward-per-share value at stake time or at the last claim.
    #[serde_as(as = "DisplayFromStr")]
    pub reward_debt: u128,
    /// Reward attested at unstake, paid at withdrawal.
    #[serde_as(as = "DisplayFromStr")]
    pub accrued_reward: Amount,
    /// Sum of rewards paid out by claims while Active.
    #[serde_as(as = "DisplayFromStr")]
    pub claimed_reward: Amount,
    pub unstaked_at: Option<Timestamp>,
    pub withdrawn_at: Option<Timestamp>,
}

impl Position {
    pub fn is_active(&self) -> bool {
        self.status == PositionStatus::Active
    }

    /// Move Active → Unstaked, settling `reward`.
    ///
    /// Returns `false` (and changes nothing) if the position is not Active.
    pub fn mark_unstaked(&mut self, reward: Amount, now: Timestamp) -> bool {
        if self.status != PositionStatus::Active {
            return false;
        }
        self.status = PositionStatus::Unstaked;
        self.accrued_reward = reward;
        self.unstaked_at = Some(now);
        true
    }

    /// Move Unstaked → Withdrawn.
    ///
    /// Returns `false` (and changes nothing) if the position is not Unstaked.
    pub fn mark_withdrawn(&mut self, now: Timestamp) -> bool {
        if self.status != PositionStatus::Unstaked {
            return false;
        }
        self.status = PositionStatus::Withdrawn;
        self.withdrawn_at = Some(now);
        true
    }
}

/// Arena of every position ever created.
#[derive(Clone, Debug, Default)]
pub struct PositionTable {
    slots: Vec<Position>,
}

impl PositionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The id the next inserted position will receive.
    pub fn next_id(&self) -> PositionId {
        self.slots.len() as PositionId + 1
    }

    /// Store a new Active position and return its id.
    pub fn insert(
        &mut self,
        owner: Address,
        token: TokenId,
        principal: Amount,
        tier: LockTier,
        reward_debt: u128,
        now: Timestamp,
    ) -> PositionId {
        let id = self.next_id();
        self.slots.push(Position {
            id,
            owner,
            token,
            principal,
            staked_at: now,
            tier,
            status: PositionStatus::Active,
            reward_debt,
            accrued_reward: 0,
            claimed_reward: 0,
            unstaked_at: None,
            withdrawn_at: None,
        });
        id
    }

    fn slot(id: PositionId) -> Option<usize> {
        id.checked_sub(1).and_then(|i| usize::try_from(i).ok())
    }

    pub fn get(&self, id: PositionId) -> Option<&Position> {
        Self::slot(id).and_then(|i| self.slots.get(i))
    }

    pub fn get_mut(&mut self, id: PositionId) -> Option<&mut Position> {
        Self::slot(id).and_then(|i| self.slots.get_mut(i))
    }

    /// Number of positions ever created.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Position> {
        self.slots.iter()
    }
}

/// Live position ids per owner, in creation order.
#[derive(Clone, Debug, Default)]
pub struct UserIndex {
    by_user: HashMap<Address, Vec<PositionId>>,
}

impl UserIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, user: Address, id: PositionId) {
        self.by_user.entry(user).or_default().push(id);
    }

    /// Remove `id` from `user`'s list. Returns whether it was present.
    pub fn remove(&mut self, user: &Address, id: PositionId) -> bool {
        let Some(ids) = self.by_user.get_mut(user) else {
            return false;
        };
        let Some(pos) = ids.iter().position(|x| *x == id) else {
            return false;
        };
        ids.remove(pos);
        if ids.is_empty() {
            self.by_user.remove(user);
        }
        true
    }

    pub fn ids(&self, user: &Address) -> &[PositionId] {
        self.by_user.get(user).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, user: &Address, id: PositionId) -> bool {
        self.ids(user).contains(&id)
    }
}
