// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models mirroring the backend's JSON shapes.

pub mod chore;
pub mod family;
pub mod ledger;
pub mod reward;
pub mod session;
pub mod sync;
pub mod user;

pub use chore::{Chore, ChoreStatus};
pub use family::Family;
pub use ledger::{ActivityLog, Transaction, TransactionKind};
pub use reward::{RedemptionStatus, Reward, RewardRedemption};
pub use session::{DeviceSession, UserRole};
pub use sync::ChangeSet;
pub use user::User;

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

/// Entity collections known to the backend and the local cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Chores,
    Rewards,
    Redemptions,
    Transactions,
    ActivityLog,
    Family,
}

impl Collection {
    pub const ALL: [Collection; 7] = [
        Collection::Users,
        Collection::Chores,
        Collection::Rewards,
        Collection::Redemptions,
        Collection::Transactions,
        Collection::ActivityLog,
        Collection::Family,
    ];

    /// Key used for the `path` query parameter, the cache and sync change sets.
    pub fn as_str(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Chores => "chores",
            Collection::Rewards => "rewards",
            Collection::Redemptions => "redemptions",
            Collection::Transactions => "transactions",
            Collection::ActivityLog => "activityLog",
            Collection::Family => "family",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == key)
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A record that lives in one [`Collection`] and is keyed by a string id.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn id(&self) -> &str;
}

macro_rules! impl_entity {
    ($ty:ty, $collection:expr) => {
        impl Entity for $ty {
            const COLLECTION: Collection = $collection;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

impl_entity!(User, Collection::Users);
impl_entity!(Chore, Collection::Chores);
impl_entity!(Reward, Collection::Rewards);
impl_entity!(RewardRedemption, Collection::Redemptions);
impl_entity!(Transaction, Collection::Transactions);
impl_entity!(ActivityLog, Collection::ActivityLog);
impl_entity!(Family, Collection::Family);
