use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use sqlx::{postgres::PgPoolOptions, PgPool, Postgres};
use std::time::Duration;

use super::StoreGateway;
use crate::error::{AppError, Result};
use crate::models::{Credential, FieldValue, NewUser, NewVideo, UserField, Video};

const VIDEO_COLUMNS: &str =
    "id, author_id, favorite_count, comment_count, title, play_url, cover_url, created_at";

/// PostgreSQL-backed [`StoreGateway`]
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a connection pool and wrap it
    pub async fn connect(database_url: &str) -> std::result::Result<Self, sqlx::Error> {
        tracing::info!("Creating database connection pool...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        tracing::info!("Database connection pool created successfully");

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StoreGateway for PgStore {
    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn scan_user_identities(&self) -> Result<Vec<(i64, String)>> {
        // A cursor failure part way through aborts the whole scan
        let rows: Vec<(i64, String)> = sqlx::query_as("SELECT id, name FROM users")
            .fetch(&self.pool)
            .try_collect()
            .await?;
        Ok(rows)
    }

    async fn find_credential(&self, name: &str) -> Result<Option<Credential>> {
        let credential = sqlx::query_as::<_, Credential>(
            "SELECT id, name, digest, salt FROM users WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(credential)
    }

    async fn insert_user(&self, user: NewUser) -> Result<i64> {
        sqlx::query_scalar::<_, i64>(
            "INSERT INTO users (name, digest, salt) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(&user.name)
        .bind(&user.digest)
        .bind(&user.salt)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::UserAlreadyExists
            }
            other => AppError::from(other),
        })
    }

    async fn user_field(&self, id: i64, field: UserField) -> Result<Option<FieldValue>> {
        // The column name comes from a closed enum, never from input
        let sql = format!("SELECT {} FROM users WHERE id = $1", field.column());
        let value = match field {
            UserField::Name => sqlx::query_scalar::<_, String>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
                .map(FieldValue::Text),
            UserField::TotalFavorited | UserField::FavoriteCount => {
                sqlx::query_scalar::<_, i64>(&sql)
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await?
                    .map(FieldValue::Count)
            }
        };
        Ok(value)
    }

    async fn find_video(&self, id: i64) -> Result<Option<Video>> {
        let sql = format!("SELECT {} FROM videos WHERE id = $1", VIDEO_COLUMNS);
        let video = sqlx::query_as::<_, Video>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(video)
    }

    async fn insert_video(&self, video: NewVideo) -> Result<Video> {
        let sql = format!(
            "INSERT INTO videos (author_id, title, play_url, cover_url) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            VIDEO_COLUMNS
        );
        let stored = sqlx::query_as::<_, Video>(&sql)
            .bind(video.author_id)
            .bind(&video.title)
            .bind(&video.play_url)
            .bind(&video.cover_url)
            .fetch_one(&self.pool)
            .await?;
        Ok(stored)
    }

    async fn update_video(&self, video: &Video) -> Result<()> {
        let result = sqlx::query(
            "UPDATE videos SET favorite_count = $2, comment_count = $3, title = $4, \
             play_url = $5, cover_url = $6 WHERE id = $1",
        )
        .bind(video.id)
        .bind(video.favorite_count)
        .bind(video.comment_count)
        .bind(&video.title)
        .bind(&video.play_url)
        .bind(&video.cover_url)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::VideoNotFound);
        }
        Ok(())
    }

    async fn video_ids_before(&self, cutoff: DateTime<Utc>, limit: i64) -> Result<Vec<i64>> {
        let ids = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM videos WHERE created_at <= $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2",
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn is_favorite(&self, user_id: i64, video_id: i64) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM favorites WHERE user_id = $1 AND video_id = $2)",
        )
        .bind(user_id)
        .bind(video_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn set_favorite(&self, user_id: i64, video_id: i64, on: bool) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let toggled = if on {
            sqlx::query::<Postgres>(
                "INSERT INTO favorites (user_id, video_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
        } else {
            sqlx::query::<Postgres>("DELETE FROM favorites WHERE user_id = $1 AND video_id = $2")
        }
        .bind(user_id)
        .bind(video_id)
        .execute(&mut *tx)
        .await?
        .rows_affected()
            == 1;

        if !toggled {
            return Ok(false);
        }

        let delta: i64 = if on { 1 } else { -1 };

        // Dropping `tx` on the early return rolls the favorite row back
        let author_id = sqlx::query_scalar::<_, i64>(
            "UPDATE videos SET favorite_count = favorite_count + $2 WHERE id = $1 \
             RETURNING author_id",
        )
        .bind(video_id)
        .bind(delta)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::VideoNotFound)?;

        sqlx::query("UPDATE users SET favorite_count = favorite_count + $2 WHERE id = $1")
            .bind(user_id)
            .bind(delta)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE users SET total_favorited = total_favorited + $2 WHERE id = $1")
            .bind(author_id)
            .bind(delta)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }
}
