pub mod feed;
pub mod health;
pub mod user;
pub mod video;

pub use feed::get_feed;
pub use health::health_check;
pub use user::{get_user, login_user, register_user};
pub use video::{get_video, publish_video, set_favorite, update_video};
