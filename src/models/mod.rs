pub mod feed;
pub mod user;
pub mod video;

pub use feed::{FeedEntry, FeedPage};
pub use user::{Credential, FieldValue, NewUser, UserField, UserInfo};
pub use video::{NewVideo, Video, VideoChanges};
