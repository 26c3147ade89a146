/// TTL of per-record caches (video record, user fields, login) in seconds
pub const DEFAULT_RECORD_TTL_SECS: u64 = 60;

/// TTL of a cached feed window (list of video ids) in seconds
pub const DEFAULT_FEED_TTL_SECS: u64 = 10;

/// Width of a feed time bucket in milliseconds
/// Requests whose cutoff falls in the same bucket share one cached id list
pub const DEFAULT_FEED_BUCKET_MILLIS: i64 = 10_000;

/// Maximum number of videos returned by one feed page
pub const DEFAULT_FEED_PAGE_SIZE: i64 = 10;

/// Delay before the second delete of a double delete (milliseconds)
/// Should exceed the typical replication lag of the store
pub const DEFAULT_INVALIDATION_DELAY_MS: u64 = 200;

/// How long a completed load stays joinable in the in-flight registry (milliseconds)
pub const DEFAULT_COALESCE_WINDOW_MS: u64 = 200;

/// Entries held by the in-process cache tier
pub const DEFAULT_LOCAL_CACHE_CAPACITY: usize = 1000;

/// Expected number of users per existence filter namespace
pub const DEFAULT_FILTER_CAPACITY: usize = 10_000_000;

/// Target false positive rate of the existence filters
pub const DEFAULT_FILTER_FALSE_POSITIVE_RATE: f64 = 0.01;

/// Register and login attempts allowed per client within one window
pub const DEFAULT_LOGIN_ATTEMPT_LIMIT: u64 = 10;

/// Quiet period after which a client's attempt counter expires (seconds)
pub const DEFAULT_LOGIN_ATTEMPT_WINDOW_SECS: u64 = 60;

/// Maximum username length in bytes
pub const MAX_USERNAME_LEN: usize = 32;

/// Maximum password length in bytes
pub const MAX_PASSWORD_LEN: usize = 32;

/// Length of the random credential salt in bytes (hex encoded when stored)
pub const SALT_LEN: usize = 4;

// =============================================================================
// Error Messages
// =============================================================================

/// Error message for an empty username
pub const ERR_EMPTY_USERNAME: &str = "Username must not be empty";

/// Error message for an over-long username
pub const ERR_USERNAME_TOO_LONG: &str = "Username must be at most 32 bytes";

/// Error message for an over-long password
pub const ERR_PASSWORD_TOO_LONG: &str = "Password must be at most 32 bytes";
