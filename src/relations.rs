//! Read-only access to the follow relation store.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rustc_hash::FxHashSet;

use crate::error::Result;

/// Set addressed in the relation store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKey {
    /// Users that `0` follows
    Following(i64),
    /// Users following `0`
    Followers(i64),
}

impl fmt::Display for RelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKey::Following(id) => write!(f, "follow:{}", id),
            RelationKey::Followers(id) => write!(f, "follower:{}", id),
        }
    }
}

#[async_trait]
pub trait RelationStore: Send + Sync {
    async fn is_member(&self, set: RelationKey, member: i64) -> Result<bool>;

    async fn count(&self, set: RelationKey) -> Result<i64>;
}

/// Relation sets kept as Redis hashes keyed by member id
#[derive(Clone)]
pub struct RedisRelationStore {
    conn: ConnectionManager,
}

impl RedisRelationStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl RelationStore for RedisRelationStore {
    async fn is_member(&self, set: RelationKey, member: i64) -> Result<bool> {
        let mut conn = self.conn.clone();
        let exists: bool = conn.hexists(set.to_string(), member).await?;
        Ok(exists)
    }

    async fn count(&self, set: RelationKey) -> Result<i64> {
        let mut conn = self.conn.clone();
        let len: i64 = conn.hlen(set.to_string()).await?;
        Ok(len)
    }
}

/// In-process relation store for tests and local development
#[derive(Default)]
pub struct MemoryRelationStore {
    sets: RwLock<HashMap<RelationKey, FxHashSet<i64>>>,
}

impl MemoryRelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `follower` follows `followee`
    pub fn follow(&self, follower: i64, followee: i64) {
        let mut sets = self.sets.write();
        sets.entry(RelationKey::Following(follower))
            .or_default()
            .insert(followee);
        sets.entry(RelationKey::Followers(followee))
            .or_default()
            .insert(follower);
    }
}

#[async_trait]
impl RelationStore for MemoryRelationStore {
    async fn is_member(&self, set: RelationKey, member: i64) -> Result<bool> {
        Ok(self
            .sets
            .read()
            .get(&set)
            .is_some_and(|members| members.contains(&member)))
    }

    async fn count(&self, set: RelationKey) -> Result<i64> {
        Ok(self
            .sets
            .read()
            .get(&set)
            .map_or(0, |members| members.len() as i64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relation_keys() {
        assert_eq!(RelationKey::Following(3).to_string(), "follow:3");
        assert_eq!(RelationKey::Followers(3).to_string(), "follower:3");
    }

    #[tokio::test]
    async fn test_memory_relations_track_both_directions() {
        let relations = MemoryRelationStore::new();
        relations.follow(1, 2);
        relations.follow(3, 2);

        assert!(relations.is_member(RelationKey::Following(1), 2).await.unwrap());
        assert!(!relations.is_member(RelationKey::Following(2), 1).await.unwrap());
        assert_eq!(relations.count(RelationKey::Followers(2)).await.unwrap(), 2);
        assert_eq!(relations.count(RelationKey::Following(2)).await.unwrap(), 0);
    }
}
