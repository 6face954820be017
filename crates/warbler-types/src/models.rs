use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type UserId = i64;
pub type MessageId = i64;

pub const DEFAULT_IMAGE_URL: &str = "/static/images/default-pic.png";
pub const DEFAULT_HEADER_IMAGE_URL: &str = "/static/images/warbler-hero.jpg";

/// Longest message body accepted, in characters.
pub const MAX_MESSAGE_LEN: usize = 140;

/// A registered account as seen by everything above the storage layer.
/// The password hash never leaves `warbler-db`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: Option<String>,
    pub location: Option<String>,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<User #{}: {}, {}>", self.id, self.username, self.email)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: UserId,
    pub author_username: String,
    pub author_image_url: String,
}

/// Counters shown on a profile page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub messages: u64,
    pub following: u64,
    pub followers: u64,
    pub likes: u64,
}
