use std::fmt;

use serde::{Deserialize, Serialize};

use crate::constants::{MAX_PASSWORD_LEN, MAX_USERNAME_LEN};

/// Single-column user attributes that are cached one key per field
///
/// Follow and follower counts are not here: they live in the relation store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserField {
    Name,
    TotalFavorited,
    FavoriteCount,
}

impl UserField {
    /// Column holding this field in the `users` table
    pub fn column(self) -> &'static str {
        match self {
            UserField::Name => "name",
            UserField::TotalFavorited => "total_favorited",
            UserField::FavoriteCount => "favorite_count",
        }
    }

    /// Whether `value` has the shape this field stores
    pub fn accepts(self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (UserField::Name, FieldValue::Text(_))
                | (UserField::TotalFavorited, FieldValue::Count(_))
                | (UserField::FavoriteCount, FieldValue::Count(_))
        )
    }
}

impl fmt::Display for UserField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UserField::Name => "Name",
            UserField::TotalFavorited => "TotalFavorited",
            UserField::FavoriteCount => "FavoriteCount",
        };
        f.write_str(name)
    }
}

/// Value of one [`UserField`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Text(String),
    Count(i64),
}

/// Stored login credential, looked up by username
///
/// `digest` is the hex HMAC-SHA256 of name + password + salt; the plaintext
/// password never reaches the store or any cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Credential {
    pub id: i64,
    pub name: String,
    pub digest: String,
    pub salt: String,
}

/// User row to insert on registration
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub digest: String,
    pub salt: String,
}

/// Public profile of a user as seen by a viewer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub name: String,
    pub follow_count: i64,
    pub follower_count: i64,
    pub is_follow: bool,
    pub total_favorited: i64,
    pub favorite_count: i64,
}

impl UserInfo {
    /// Placeholder used when an author cannot be resolved
    pub fn unknown(id: i64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }
}

/// Validate registration input, returning the message to report on failure
pub fn validate_registration(name: &str, password: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err(crate::constants::ERR_EMPTY_USERNAME);
    }
    if name.len() > MAX_USERNAME_LEN {
        return Err(crate::constants::ERR_USERNAME_TOO_LONG);
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(crate::constants::ERR_PASSWORD_TOO_LONG);
    }
    Ok(())
}
