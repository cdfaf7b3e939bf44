//! Role membership for admin-gated entry points.
//!
//! Roles are fixed at construction; there is no grant, revoke or transfer.

use std::collections::HashSet;

use tea_types::{address, Address};

use crate::{Result, StakingError};

/// Admin set and treasury address.
#[derive(Clone, Debug)]
pub struct Roles {
    admins: HashSet<Address>,
    treasury: Address,
}

impl Roles {
    /// Build the role table. Requires at least one admin and no zero identities.
    pub fn new(admins: impl IntoIterator<Item = Address>, treasury: Address) -> Result<Self> {
        if address::is_zero(&treasury) {
            return Err(StakingError::NoZeroAddress);
        }
        let mut set = HashSet::new();
        for admin in admins {
            if address::is_zero(&admin) {
                return Err(StakingError::NoZeroAddress);
            }
            set.insert(admin);
        }
        if set.is_empty() {
            return Err(StakingError::NoZeroAddress);
        }
        Ok(Self {
            admins: set,
            treasury,
        })
    }

    pub fn is_admin(&self, who: &Address) -> bool {
        self.admins.contains(who)
    }

    /// Fail with `Unauthorized` unless `caller` is an admin.
    pub fn require_admin(&self, caller: &Address) -> Result<()> {
        if !self.is_admin(caller) {
            tracing::warn!(caller = %address::short(caller), "admin call rejected");
            return Err(StakingError::Unauthorized);
        }
        Ok(())
    }

    /// Recipient of emergency sweeps.
    pub fn treasury(&self) -> &Address {
        &self.treasury
    }
}
