//! Negative-existence pre-filter for users.
//!
//! A `false` answer is authoritative and lets callers skip the store
//! entirely; `true` only means "maybe" and must be confirmed downstream.

mod bloom;

pub use bloom::BloomFilter;

use crate::db::StoreGateway;
use crate::error::Result;

/// A key in one of the filtered namespaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Member<'a> {
    UserId(i64),
    UserName(&'a str),
}

/// One probabilistic set per identifier namespace
pub struct ExistenceFilter {
    ids: BloomFilter,
    names: BloomFilter,
}

impl ExistenceFilter {
    /// Empty filter sized for `capacity` members per namespace
    pub fn new(capacity: usize, false_positive_rate: f64) -> Self {
        Self {
            ids: BloomFilter::new(capacity, false_positive_rate),
            names: BloomFilter::new(capacity, false_positive_rate),
        }
    }

    /// Build the filter from a full scan of the store's users
    ///
    /// A failed scan is returned as an error: starting with a partially
    /// filled filter would turn existing users into definite absences.
    pub async fn bootstrap(
        store: &dyn StoreGateway,
        capacity: usize,
        false_positive_rate: f64,
    ) -> Result<Self> {
        let filter = Self::new(capacity, false_positive_rate);

        let identities = store.scan_user_identities().await?;
        for (id, name) in &identities {
            filter.insert(Member::UserId(*id));
            filter.insert(Member::UserName(name));
        }

        tracing::info!(users = identities.len(), "Existence filter built");
        Ok(filter)
    }

    pub fn might_exist(&self, member: Member<'_>) -> bool {
        match member {
            Member::UserId(id) => self.ids.contains(&id),
            Member::UserName(name) => self.names.contains(name),
        }
    }

    pub fn insert(&self, member: Member<'_>) {
        match member {
            Member::UserId(id) => self.ids.insert(&id),
            Member::UserName(name) => self.names.insert(name),
        }
    }

    /// Record a newly created user in both namespaces
    pub fn insert_user(&self, id: i64, name: &str) {
        self.insert(Member::UserId(id));
        self.insert(Member::UserName(name));
    }
}
