use rusqlite::{Connection, Row};
use warbler_types::models::{Message, MessageId, User, UserId, UserStats};

use crate::models::{MessageRow, NewMessage, UserRow};
use crate::{Database, DbError, Result};

const USER_SELECT: &str =
    "SELECT u.id, u.username, u.email, u.image_url, u.header_image_url, u.bio, u.location, u.password
     FROM users u";

const MESSAGE_SELECT: &str = "SELECT m.id, m.text, m.timestamp, m.user_id, u.username, u.image_url
     FROM messages m
     JOIN users u ON u.id = m.user_id";

/// Outcome of a write that first checks who owns the message, all inside
/// one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checked<T> {
    Missing,
    Refused,
    Done(T),
}

impl Database {
    // -- Users --

    pub fn get_user(&self, id: UserId) -> Result<Option<User>> {
        self.with_conn(|conn| Ok(query_user_by_id(conn, id)?.map(UserRow::into_user)))
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self.get_user_row_by_username(username)?.map(UserRow::into_user))
    }

    pub(crate) fn get_user_row_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    /// All users, or those whose username contains `q`, ordered by username.
    pub fn search_users(&self, q: Option<&str>) -> Result<Vec<User>> {
        let q = q.map(str::trim).unwrap_or_default();

        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{USER_SELECT}
                 WHERE instr(lower(u.username), lower(?1)) > 0
                 ORDER BY u.username"
            ))?;

            let rows = stmt
                .query_map([q], map_user_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows.into_iter().map(UserRow::into_user).collect())
        })
    }

    pub fn count_users(&self) -> Result<u64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
        })
    }

    /// Delete an account. Its messages, follow edges and likes go with it.
    pub fn delete_user(&self, id: UserId) -> Result<bool> {
        self.with_conn_mut(|conn| Ok(conn.execute("DELETE FROM users WHERE id = ?1", [id])? > 0))
    }

    pub fn user_stats(&self, id: UserId) -> Result<UserStats> {
        self.with_conn(|conn| {
            let stats = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM messages WHERE user_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE user_following_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE user_being_followed_id = ?1),
                    (SELECT COUNT(*) FROM likes WHERE user_id = ?1)",
                [id],
                |row| {
                    Ok(UserStats {
                        messages: row.get(0)?,
                        following: row.get(1)?,
                        followers: row.get(2)?,
                        likes: row.get(3)?,
                    })
                },
            )?;
            Ok(stats)
        })
    }

    // -- Follows --

    /// Add a follow edge. Returns false if the edge already existed.
    pub fn follow(&self, follower: UserId, followed: UserId) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO follows (user_being_followed_id, user_following_id) VALUES (?1, ?2)",
                [followed, follower],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Remove a follow edge. Returns false if there was none.
    pub fn unfollow(&self, follower: UserId, followed: UserId) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM follows WHERE user_being_followed_id = ?1 AND user_following_id = ?2",
                [followed, follower],
            )?;
            Ok(removed > 0)
        })
    }

    /// Accounts following `id`.
    pub fn followers(&self, id: UserId) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            query_users(
                conn,
                "JOIN follows f ON f.user_following_id = u.id
                 WHERE f.user_being_followed_id = ?1",
                id,
            )
        })
    }

    /// Accounts `id` follows.
    pub fn following(&self, id: UserId) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            query_users(
                conn,
                "JOIN follows f ON f.user_being_followed_id = u.id
                 WHERE f.user_following_id = ?1",
                id,
            )
        })
    }

    // -- Messages --

    pub fn insert_message(&self, message: &NewMessage) -> Result<Message> {
        let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

        let row = self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (id, text, timestamp, user_id) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![message.id, message.text, timestamp, message.user_id],
            )?;
            let id = conn.last_insert_rowid();
            query_message(conn, id)?.ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
        })?;

        Ok(row.into_message())
    }

    pub fn get_message(&self, id: MessageId) -> Result<Option<Message>> {
        self.with_conn(|conn| Ok(query_message(conn, id)?.map(MessageRow::into_message)))
    }

    pub fn delete_message(&self, id: MessageId) -> Result<bool> {
        self.with_conn_mut(|conn| {
            Ok(conn.execute("DELETE FROM messages WHERE id = ?1", [id])? > 0)
        })
    }

    /// Delete the message if `allow(author)` agrees. The author lookup and
    /// the delete share a transaction.
    pub fn delete_message_if(
        &self,
        id: MessageId,
        allow: impl FnOnce(UserId) -> bool,
    ) -> Result<Checked<()>> {
        self.with_conn_mut(|conn| {
            let Some(author) = message_author(conn, id)? else {
                return Ok(Checked::Missing);
            };
            if !allow(author) {
                return Ok(Checked::Refused);
            }

            conn.execute(
                "DELETE FROM messages WHERE id = ?1 AND user_id = ?2",
                [id, author],
            )?;
            Ok(Checked::Done(()))
        })
    }

    /// Newest first.
    pub fn messages_by_user(&self, user_id: UserId, limit: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            query_messages(conn, "WHERE m.user_id = ?1", rusqlite::params![user_id, limit])
        })
    }

    /// The user's own messages plus those of everyone they follow, newest first.
    pub fn home_feed(&self, user_id: UserId, limit: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                "WHERE m.user_id = ?1
                    OR m.user_id IN (SELECT user_being_followed_id FROM follows WHERE user_following_id = ?1)",
                rusqlite::params![user_id, limit],
            )
        })
    }

    // -- Likes --

    /// Returns false if the like already existed.
    pub fn add_like(&self, user_id: UserId, message_id: MessageId) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO likes (user_id, message_id) VALUES (?1, ?2)",
                [user_id, message_id],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Toggle a like: removes if it exists, inserts if not.
    /// Returns true if the message is liked afterwards.
    pub fn toggle_like(&self, user_id: UserId, message_id: MessageId) -> Result<bool> {
        self.with_conn_mut(|conn| flip_like(conn, user_id, message_id))
    }

    /// [`Database::toggle_like`] gated on `allow(author)`, checked in the
    /// same transaction as the toggle.
    pub fn toggle_like_if(
        &self,
        user_id: UserId,
        message_id: MessageId,
        allow: impl FnOnce(UserId) -> bool,
    ) -> Result<Checked<bool>> {
        self.with_conn_mut(|conn| {
            let Some(author) = message_author(conn, message_id)? else {
                return Ok(Checked::Missing);
            };
            if !allow(author) {
                return Ok(Checked::Refused);
            }

            Ok(Checked::Done(flip_like(conn, user_id, message_id)?))
        })
    }

    pub fn liked_message_ids(&self, user_id: UserId) -> Result<Vec<MessageId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT message_id FROM likes WHERE user_id = ?1")?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
    }

    /// Messages `user_id` has liked, newest first.
    pub fn liked_messages(&self, user_id: UserId, limit: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            query_messages(
                conn,
                "JOIN likes l ON l.message_id = m.id
                 WHERE l.user_id = ?1",
                rusqlite::params![user_id, limit],
            )
        })
    }
}

fn flip_like(conn: &Connection, user_id: UserId, message_id: MessageId) -> Result<bool> {
    let removed = conn.execute(
        "DELETE FROM likes WHERE user_id = ?1 AND message_id = ?2",
        [user_id, message_id],
    )?;

    if removed > 0 {
        return Ok(false);
    }

    conn.execute(
        "INSERT INTO likes (user_id, message_id) VALUES (?1, ?2)",
        [user_id, message_id],
    )?;
    Ok(true)
}

fn message_author(conn: &Connection, id: MessageId) -> Result<Option<UserId>> {
    conn.query_row("SELECT user_id FROM messages WHERE id = ?1", [id], |r| r.get(0))
        .optional()
}

fn map_user_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        image_url: row.get(3)?,
        header_image_url: row.get(4)?,
        bio: row.get(5)?,
        location: row.get(6)?,
        password: row.get(7)?,
    })
}

fn map_message_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        text: row.get(1)?,
        timestamp: row.get(2)?,
        user_id: row.get(3)?,
        author_username: row.get(4)?,
        author_image_url: row.get(5)?,
    })
}

pub(crate) fn query_user_by_id(conn: &Connection, id: UserId) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("{USER_SELECT} WHERE u.id = ?1"))?;
    stmt.query_row([id], map_user_row).optional()
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("{USER_SELECT} WHERE u.username = ?1"))?;
    stmt.query_row([username], map_user_row).optional()
}

/// `filter` may join other tables but must bind the user id as ?1.
fn query_users(conn: &Connection, filter: &str, id: UserId) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!("{USER_SELECT} {filter} ORDER BY u.username"))?;

    let rows = stmt
        .query_map([id], map_user_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows.into_iter().map(UserRow::into_user).collect())
}

fn query_message(conn: &Connection, id: MessageId) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(&format!("{MESSAGE_SELECT} WHERE m.id = ?1"))?;
    stmt.query_row([id], map_message_row).optional()
}

/// `filter` binds ?1; the limit is bound as ?2.
fn query_messages(
    conn: &Connection,
    filter: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(&format!(
        "{MESSAGE_SELECT} {filter} ORDER BY m.timestamp DESC, m.id DESC LIMIT ?2"
    ))?;

    let rows = stmt
        .query_map(params, map_message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows.into_iter().map(MessageRow::into_message).collect())
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::seeded;
    use warbler_types::models::MAX_MESSAGE_LEN;

    #[test]
    fn message_gets_owner_and_timestamp() {
        let (db, _, u1, _) = seeded();
        db.insert_message(&NewMessage::new(u1.id, "This is the message").with_id(999))
            .unwrap();

        let message = db.get_message(999).unwrap().unwrap();
        assert_eq!(message.text, "This is the message");
        assert_eq!(message.user_id, u1.id);
        assert_eq!(message.author_username, "user1");
        assert!(message.timestamp.timestamp() > 0);
    }

    #[test]
    fn message_requires_existing_owner() {
        let (db, _, _, _) = seeded();
        let err = db.insert_message(&NewMessage::new(4242, "orphan")).unwrap_err();
        assert!(err.is_integrity());
    }

    #[test]
    fn message_length_is_bounded() {
        let (db, _, u1, _) = seeded();
        let longest = "a".repeat(MAX_MESSAGE_LEN);
        let too_long = "a".repeat(MAX_MESSAGE_LEN + 1);

        assert!(db.insert_message(&NewMessage::new(u1.id, longest)).is_ok());
        assert!(db.insert_message(&NewMessage::new(u1.id, too_long)).unwrap_err().is_integrity());
    }

    #[test]
    fn liking_a_message_records_one_edge() {
        let (db, _, u1, _) = seeded();
        db.insert_message(&NewMessage::new(u1.id, "This is the message").with_id(999))
            .unwrap();

        assert!(db.add_like(u1.id, 999).unwrap());
        assert!(!db.add_like(u1.id, 999).unwrap());

        assert_eq!(db.liked_message_ids(u1.id).unwrap(), vec![999]);
    }

    #[test]
    fn toggle_like_flips() {
        let (db, _, u1, u2) = seeded();
        let msg = db.insert_message(&NewMessage::new(u2.id, "likable")).unwrap();

        assert!(db.toggle_like(u1.id, msg.id).unwrap());
        assert_eq!(db.liked_messages(u1.id, 100).unwrap().len(), 1);
        assert!(!db.toggle_like(u1.id, msg.id).unwrap());
        assert!(db.liked_messages(u1.id, 100).unwrap().is_empty());
    }

    #[test]
    fn follow_twice_keeps_one_edge() {
        let (db, _, u1, u2) = seeded();

        assert!(db.follow(u1.id, u2.id).unwrap());
        assert!(!db.follow(u1.id, u2.id).unwrap());
        assert_eq!(db.user_stats(u2.id).unwrap().followers, 1);

        assert!(db.unfollow(u1.id, u2.id).unwrap());
        assert!(!db.unfollow(u1.id, u2.id).unwrap());
        assert_eq!(db.user_stats(u2.id).unwrap().followers, 0);
    }

    #[test]
    fn self_follow_is_allowed() {
        let (db, _, u1, _) = seeded();

        assert!(db.follow(u1.id, u1.id).unwrap());
        assert!(db.is_following(u1.id, u1.id).unwrap());
        assert!(db.is_followed_by(u1.id, u1.id).unwrap());
        assert_eq!(db.user_stats(u1.id).unwrap().followers, 1);
    }

    #[test]
    fn deleted_message_id_is_not_reused() {
        let (db, _, u1, u2) = seeded();

        let first = db.insert_message(&NewMessage::new(u1.id, "soon gone")).unwrap();
        assert!(db.delete_message(first.id).unwrap());
        let second = db.insert_message(&NewMessage::new(u2.id, "someone else's")).unwrap();

        assert_ne!(first.id, second.id);
    }

    #[test]
    fn delete_message_if_checks_author_in_place() {
        let (db, _, u1, u2) = seeded();
        let msg = db.insert_message(&NewMessage::new(u1.id, "mine")).unwrap();

        let refused = db.delete_message_if(msg.id, |author| author == u2.id).unwrap();
        assert_eq!(refused, Checked::Refused);
        assert!(db.get_message(msg.id).unwrap().is_some());

        let done = db.delete_message_if(msg.id, |author| author == u1.id).unwrap();
        assert_eq!(done, Checked::Done(()));
        assert!(db.get_message(msg.id).unwrap().is_none());

        let again = db.delete_message_if(msg.id, |_| true).unwrap();
        assert_eq!(again, Checked::Missing);
    }

    #[test]
    fn toggle_like_if_refuses_and_flips() {
        let (db, _, u1, u2) = seeded();
        let msg = db.insert_message(&NewMessage::new(u1.id, "mine")).unwrap();

        let own = db.toggle_like_if(u1.id, msg.id, |author| author != u1.id).unwrap();
        assert_eq!(own, Checked::Refused);
        assert!(db.liked_message_ids(u1.id).unwrap().is_empty());

        let liked = db.toggle_like_if(u2.id, msg.id, |author| author != u2.id).unwrap();
        assert_eq!(liked, Checked::Done(true));
        let unliked = db.toggle_like_if(u2.id, msg.id, |author| author != u2.id).unwrap();
        assert_eq!(unliked, Checked::Done(false));

        assert_eq!(db.toggle_like_if(u2.id, 4242, |_| true).unwrap(), Checked::Missing);
    }

    #[test]
    fn follow_requires_existing_accounts() {
        let (db, _, u1, _) = seeded();
        assert!(db.follow(u1.id, 9999).unwrap_err().is_integrity());
    }

    #[test]
    fn stats_count_every_relationship() {
        let (db, _, u1, u2) = seeded();
        db.insert_message(&NewMessage::new(u1.id, "message 1 text")).unwrap();
        db.insert_message(&NewMessage::new(u1.id, "message 2 text")).unwrap();
        db.insert_message(&NewMessage::new(u2.id, "message likable text").with_id(7887))
            .unwrap();
        db.add_like(u1.id, 7887).unwrap();
        db.follow(u2.id, u1.id).unwrap();

        assert_eq!(
            db.user_stats(u1.id).unwrap(),
            UserStats { messages: 2, following: 0, followers: 1, likes: 1 }
        );
        assert_eq!(
            db.user_stats(u2.id).unwrap(),
            UserStats { messages: 1, following: 1, followers: 0, likes: 0 }
        );
    }

    #[test]
    fn deleting_user_cascades() {
        let (db, _, u1, u2) = seeded();
        let own = db.insert_message(&NewMessage::new(u1.id, "mine")).unwrap();
        let theirs = db.insert_message(&NewMessage::new(u2.id, "theirs")).unwrap();
        db.add_like(u1.id, theirs.id).unwrap();
        db.add_like(u2.id, own.id).unwrap();
        db.follow(u1.id, u2.id).unwrap();
        db.follow(u2.id, u1.id).unwrap();

        assert!(db.delete_user(u1.id).unwrap());

        assert!(db.get_user(u1.id).unwrap().is_none());
        assert!(db.get_message(own.id).unwrap().is_none());
        assert_eq!(db.user_stats(u2.id).unwrap(), UserStats { messages: 1, ..Default::default() });
        assert!(db.get_message(theirs.id).unwrap().is_some());
    }

    #[test]
    fn deleting_message_removes_its_likes() {
        let (db, _, u1, u2) = seeded();
        let msg = db.insert_message(&NewMessage::new(u2.id, "short lived")).unwrap();
        db.add_like(u1.id, msg.id).unwrap();

        assert!(db.delete_message(msg.id).unwrap());
        assert!(!db.delete_message(msg.id).unwrap());
        assert!(db.liked_message_ids(u1.id).unwrap().is_empty());
    }

    #[test]
    fn home_feed_includes_followed_and_own() {
        let (db, creds, u1, u2) = seeded();
        let stranger = crate::NewUser::signup(&creds, Some("user3"), Some("user3@gmail.com"), Some("password"), None)
            .unwrap();
        let stranger = db.commit_user(&stranger).unwrap();

        db.insert_message(&NewMessage::new(u1.id, "own")).unwrap();
        db.insert_message(&NewMessage::new(u2.id, "followed")).unwrap();
        db.insert_message(&NewMessage::new(stranger.id, "stranger")).unwrap();
        db.follow(u1.id, u2.id).unwrap();

        let texts: Vec<String> = db
            .home_feed(u1.id, 100)
            .unwrap()
            .into_iter()
            .map(|m| m.text)
            .collect();
        assert_eq!(texts, vec!["followed".to_string(), "own".to_string()]);
    }

    #[test]
    fn search_matches_username_substring() {
        let (db, creds, _, _) = seeded();
        let other = crate::NewUser::signup(&creds, Some("somebody"), Some("sb@gmail.com"), Some("password"), None)
            .unwrap();
        db.commit_user(&other).unwrap();

        let all = db.search_users(None).unwrap();
        assert_eq!(all.len(), 3);

        let names: Vec<String> = db
            .search_users(Some("user"))
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["user1".to_string(), "user2".to_string()]);
    }
}
