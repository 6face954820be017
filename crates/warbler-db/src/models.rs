//! Database row types. These map directly to SQLite rows.
//! Distinct from warbler-types models so the password hash stays in this crate.

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;
use warbler_types::models::{Message, MessageId, User, UserId};

pub struct UserRow {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: Option<String>,
    pub location: Option<String>,
    pub password: String,
}

impl UserRow {
    pub fn into_user(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            image_url: self.image_url,
            header_image_url: self.header_image_url,
            bio: self.bio,
            location: self.location,
        }
    }
}

pub struct MessageRow {
    pub id: MessageId,
    pub text: String,
    pub timestamp: String,
    pub user_id: UserId,
    pub author_username: String,
    pub author_image_url: String,
}

impl MessageRow {
    pub fn into_message(self) -> Message {
        let timestamp = parse_timestamp(&self.timestamp).unwrap_or_else(|| {
            warn!("Corrupt timestamp '{}' on message {}", self.timestamp, self.id);
            DateTime::default()
        });

        Message {
            id: self.id,
            text: self.text,
            timestamp,
            user_id: self.user_id,
            author_username: self.author_username,
            author_image_url: self.author_image_url,
        }
    }
}

/// A message that has not been written yet. `id` is assigned by SQLite
/// unless the caller picks one.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub id: Option<MessageId>,
    pub text: String,
    pub user_id: UserId,
}

impl NewMessage {
    pub fn new(user_id: UserId, text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
            user_id,
        }
    }

    pub fn with_id(mut self, id: MessageId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Accepts RFC 3339 and SQLite's own "YYYY-MM-DD HH:MM:SS" (naive UTC).
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc()))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_timestamp_shapes() {
        assert!(parse_timestamp("2024-03-01T10:20:30.123Z").is_some());
        assert!(parse_timestamp("2024-03-01 10:20:30").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
