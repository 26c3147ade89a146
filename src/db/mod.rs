pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Credential, FieldValue, NewUser, NewVideo, UserField, Video};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Accessor over the relational store
///
/// No caching happens behind this trait; every call reaches the store.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    /// Round trip to the store, for health checks
    async fn ping(&self) -> Result<()>;

    /// Every user id and name, for bootstrapping the existence filter
    async fn scan_user_identities(&self) -> Result<Vec<(i64, String)>>;

    async fn find_credential(&self, name: &str) -> Result<Option<Credential>>;

    /// Insert a user, returning the store-assigned id
    ///
    /// Fails with `UserAlreadyExists` when the name is taken.
    async fn insert_user(&self, user: NewUser) -> Result<i64>;

    /// Point query of one column of a user row
    async fn user_field(&self, id: i64, field: UserField) -> Result<Option<FieldValue>>;

    async fn find_video(&self, id: i64) -> Result<Option<Video>>;

    async fn insert_video(&self, video: NewVideo) -> Result<Video>;

    /// Overwrite the mutable columns of an existing video
    async fn update_video(&self, video: &Video) -> Result<()>;

    /// Ids of up to `limit` videos created at or before `cutoff`, newest first
    async fn video_ids_before(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<i64>>;

    async fn is_favorite(&self, user_id: i64, video_id: i64) -> Result<bool>;

    /// Add (`on`) or remove a favorite and adjust the dependent counters
    ///
    /// Returns `false` when the relation was already in the requested state.
    async fn set_favorite(&self, user_id: i64, video_id: i64, on: bool) -> Result<bool>;
}
