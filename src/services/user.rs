use std::fmt;
use std::sync::Arc;

use crate::cache::record::cache_key;
use crate::cache::{CacheTier, RecordCache, Scheduler};
use crate::config::CacheSettings;
use crate::db::StoreGateway;
use crate::error::{AppError, Result};
use crate::filter::{ExistenceFilter, Member};
use crate::models::user::validate_registration;
use crate::models::{Credential, FieldValue, NewUser, UserField, UserInfo};
use crate::relations::{RelationKey, RelationStore};
use crate::security::{credential_digest, generate_salt, verify_credential};

use super::best_effort;

const FIELD_NAMESPACE: &str = "user";
const LOGIN_NAMESPACE: &str = "login";

/// Cache key of one field of one user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldKey {
    pub id: i64,
    pub field: UserField,
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.id, self.field)
    }
}

/// Cache key under which `field` of user `id` is stored
pub fn field_cache_key(id: i64, field: UserField) -> String {
    cache_key(FIELD_NAMESPACE, &FieldKey { id, field })
}

/// Registration, login and profile reads
pub struct UserService {
    store: Arc<dyn StoreGateway>,
    filter: Arc<ExistenceFilter>,
    fields: RecordCache<FieldKey, FieldValue>,
    logins: RecordCache<String, Credential>,
    relations: Arc<dyn RelationStore>,
    pepper: String,
}

impl UserService {
    pub fn new(
        store: Arc<dyn StoreGateway>,
        filter: Arc<ExistenceFilter>,
        tier: Arc<dyn CacheTier>,
        relations: Arc<dyn RelationStore>,
        settings: &CacheSettings,
        scheduler: Scheduler,
        pepper: String,
    ) -> Self {
        Self {
            store,
            filter,
            fields: RecordCache::new(
                FIELD_NAMESPACE,
                Arc::clone(&tier),
                settings.record_ttl,
                settings.coalesce_window,
                scheduler.clone(),
            ),
            logins: RecordCache::new(
                LOGIN_NAMESPACE,
                tier,
                settings.record_ttl,
                settings.coalesce_window,
                scheduler,
            ),
            relations,
            pepper,
        }
    }

    /// Create a user and return its id
    pub async fn register(&self, name: &str, password: &str) -> Result<i64> {
        validate_registration(name, password)
            .map_err(|msg| AppError::InvalidInput(msg.to_string()))?;

        // A definite absence skips the duplicate lookup; the unique
        // constraint still catches racing registrations
        if self.filter.might_exist(Member::UserName(name))
            && self.store.find_credential(name).await?.is_some()
        {
            return Err(AppError::UserAlreadyExists);
        }

        let salt = generate_salt();
        let digest = credential_digest(name, password, &salt, &self.pepper);
        let id = self
            .store
            .insert_user(NewUser {
                name: name.to_string(),
                digest,
                salt,
            })
            .await?;

        self.filter.insert_user(id, name);
        tracing::info!(user_id = id, "User registered");
        Ok(id)
    }

    /// Check a name and password, returning the user id
    pub async fn login(&self, name: &str, password: &str) -> Result<i64> {
        if !self.filter.might_exist(Member::UserName(name)) {
            return Err(AppError::InvalidCredentials);
        }

        let store = Arc::clone(&self.store);
        let owned = name.to_string();
        let credential = self
            .logins
            .get_or_load(name.to_string(), move || async move {
                store
                    .find_credential(&owned)
                    .await?
                    .ok_or(AppError::InvalidCredentials)
            })
            .await?;

        if verify_credential(
            name,
            password,
            &credential.salt,
            &self.pepper,
            &credential.digest,
        ) {
            Ok(credential.id)
        } else {
            tracing::debug!(user_id = credential.id, "Password mismatch");
            Err(AppError::InvalidCredentials)
        }
    }

    /// Profile of `id` as seen by `viewer` (0 for anonymous)
    pub async fn user_info(&self, id: i64, viewer: i64) -> Result<UserInfo> {
        if !self.filter.might_exist(Member::UserId(id)) {
            return Err(AppError::UserNotFound);
        }

        let (name, total_favorited, favorite_count) = futures::try_join!(
            self.name(id),
            self.total_favorited(id),
            self.favorite_count(id),
        )?;

        let follow_count = best_effort(
            self.relations.count(RelationKey::Following(id)).await,
            "follow count",
        );
        let follower_count = best_effort(
            self.relations.count(RelationKey::Followers(id)).await,
            "follower count",
        );
        let is_follow = viewer != 0
            && best_effort(
                self.relations
                    .is_member(RelationKey::Following(viewer), id)
                    .await,
                "follow flag",
            );

        Ok(UserInfo {
            id,
            name,
            follow_count,
            follower_count,
            is_follow,
            total_favorited,
            favorite_count,
        })
    }

    pub async fn name(&self, id: i64) -> Result<String> {
        match self.field(id, UserField::Name).await? {
            FieldValue::Text(name) => Ok(name),
            FieldValue::Count(_) => Err(AppError::FieldShape(UserField::Name)),
        }
    }

    pub async fn total_favorited(&self, id: i64) -> Result<i64> {
        self.count(id, UserField::TotalFavorited).await
    }

    pub async fn favorite_count(&self, id: i64) -> Result<i64> {
        self.count(id, UserField::FavoriteCount).await
    }

    async fn count(&self, id: i64, field: UserField) -> Result<i64> {
        match self.field(id, field).await? {
            FieldValue::Count(n) => Ok(n),
            FieldValue::Text(_) => Err(AppError::FieldShape(field)),
        }
    }

    async fn field(&self, id: i64, field: UserField) -> Result<FieldValue> {
        let key = FieldKey { id, field };

        if let Some(value) = self.fields.get(&key).await {
            if field.accepts(&value) {
                return Ok(value);
            }
            tracing::warn!(user_id = id, field = %field, "Cached field has wrong shape, reloading");
            self.fields.delete(&key).await;
        }

        let store = Arc::clone(&self.store);
        self.fields
            .load(key, move || async move {
                store
                    .user_field(id, field)
                    .await?
                    .ok_or(AppError::UserNotFound)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryTier;
    use crate::db::MemoryStore;
    use crate::relations::MemoryRelationStore;
    use crate::services::testing;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        tier: Arc<MemoryTier>,
        relations: Arc<MemoryRelationStore>,
        users: UserService,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let tier = Arc::new(MemoryTier::new(256));
        let relations = Arc::new(MemoryRelationStore::new());
        let settings = testing::settings();
        let filter = Arc::new(
            ExistenceFilter::bootstrap(store.as_ref(), settings.filter_capacity, 0.01)
                .await
                .unwrap(),
        );
        let users = UserService::new(
            store.clone(),
            filter,
            tier.clone(),
            relations.clone(),
            &settings,
            Scheduler::new(),
            "test-pepper".to_string(),
        );
        Fixture {
            store,
            tier,
            relations,
            users,
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let f = fixture().await;

        let id = f.users.register("alice", "secret").await.unwrap();

        assert_eq!(f.users.login("alice", "secret").await.unwrap(), id);
        assert!(matches!(
            f.users.login("alice", "wrong").await,
            Err(AppError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_bad_input() {
        let f = fixture().await;
        f.users.register("alice", "secret").await.unwrap();

        assert!(matches!(
            f.users.register("alice", "other").await,
            Err(AppError::UserAlreadyExists)
        ));
        assert!(matches!(
            f.users.register("", "secret").await,
            Err(AppError::InvalidInput(_))
        ));
        assert!(matches!(
            f.users.register(&"x".repeat(33), "secret").await,
            Err(AppError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_name_never_reaches_store() {
        let f = fixture().await;
        let before = f.store.queries();

        assert!(matches!(
            f.users.login("ghost", "secret").await,
            Err(AppError::InvalidCredentials)
        ));
        assert!(matches!(
            f.users.user_info(404, 0).await,
            Err(AppError::UserNotFound)
        ));
        assert_eq!(f.store.queries(), before);
    }

    #[tokio::test]
    async fn test_user_info_uses_field_cache() {
        let f = fixture().await;
        let id = f.users.register("bob", "pw").await.unwrap();

        let info = f.users.user_info(id, 0).await.unwrap();
        assert_eq!(info.name, "bob");
        assert_eq!(info.favorite_count, 0);

        // Let the coalescing window close so only the cache can serve
        tokio::time::sleep(Duration::from_millis(60)).await;
        let before = f.store.queries();
        let again = f.users.user_info(id, 0).await.unwrap();

        assert_eq!(again, info);
        assert_eq!(f.store.queries(), before);
        assert!(f.tier.get(&field_cache_key(id, UserField::Name)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_user_info_relation_counts_and_follow_flag() {
        let f = fixture().await;
        let author = f.users.register("author", "pw").await.unwrap();
        let fan = f.users.register("fan", "pw").await.unwrap();
        f.relations.follow(fan, author);

        let seen_by_fan = f.users.user_info(author, fan).await.unwrap();
        assert_eq!(seen_by_fan.follower_count, 1);
        assert_eq!(seen_by_fan.follow_count, 0);
        assert!(seen_by_fan.is_follow);

        let anonymous = f.users.user_info(author, 0).await.unwrap();
        assert!(!anonymous.is_follow);
    }

    #[tokio::test]
    async fn test_mismatched_cached_field_is_reloaded() {
        let f = fixture().await;
        let id = f.users.register("carol", "pw").await.unwrap();

        let bad = serde_json::to_vec(&FieldValue::Count(7)).unwrap();
        f.tier
            .set(&field_cache_key(id, UserField::Name), bad, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(f.users.name(id).await.unwrap(), "carol");
    }

    #[test]
    fn test_field_cache_keys() {
        assert_eq!(field_cache_key(5, UserField::Name), "user:5:Name");
        assert_eq!(
            field_cache_key(5, UserField::TotalFavorited),
            "user:5:TotalFavorited"
        );
    }
}
