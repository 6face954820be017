use thiserror::Error;
use tracing::debug;
use warbler_crypto::Credentials;
use warbler_types::models::{DEFAULT_HEADER_IMAGE_URL, DEFAULT_IMAGE_URL, User, UserId};

use crate::queries::query_user_by_id;
use crate::{Database, DbError, Result};

#[derive(Debug, Error)]
pub enum SignupError {
    #[error("{0}")]
    Validation(&'static str),

    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// An account staged for insertion. Nothing touches the database until it
/// is handed to [`Database::commit_user`], so uniqueness and NOT NULL
/// constraints are only checked there.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Option<UserId>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub image_url: String,
    password_hash: String,
}

impl NewUser {
    /// Validate the password and hash it. Fails before any storage access if
    /// the password is missing or empty.
    pub fn signup(
        credentials: &Credentials,
        username: Option<&str>,
        email: Option<&str>,
        password: Option<&str>,
        image_url: Option<&str>,
    ) -> std::result::Result<Self, SignupError> {
        let password = match password {
            Some(p) if !p.is_empty() => p,
            _ => return Err(SignupError::Validation("Password must be non-empty.")),
        };

        let password_hash = credentials
            .hash(password)
            .map_err(|e| SignupError::Hash(e.to_string()))?;

        Ok(Self {
            id: None,
            username: username.map(str::to_owned),
            email: email.map(str::to_owned),
            image_url: non_blank(image_url).unwrap_or(DEFAULT_IMAGE_URL).to_owned(),
            password_hash,
        })
    }

    pub fn with_id(mut self, id: UserId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn password_hash(&self) -> &str {
        &self.password_hash
    }
}

/// Editable profile fields. Blank image URLs fall back to the defaults.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub username: String,
    pub email: String,
    pub image_url: Option<String>,
    pub header_image_url: Option<String>,
    pub bio: Option<String>,
    pub location: Option<String>,
}

impl Database {
    /// Persist a staged account in its own transaction.
    ///
    /// A duplicate username or email, or a missing one, fails with
    /// [`DbError::Integrity`] and leaves no row behind.
    pub fn commit_user(&self, user: &NewUser) -> Result<User> {
        let row = self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, image_url, password) VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![user.id, user.username, user.email, user.image_url, user.password_hash],
            )?;
            let id = conn.last_insert_rowid();
            query_user_by_id(conn, id)?.ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
        })?;

        debug!("Committed user #{}", row.id);
        Ok(row.into_user())
    }

    /// Look up `username` and check `password` against its stored hash.
    ///
    /// Unknown usernames and wrong passwords both come back as `Ok(None)`.
    pub fn authenticate(
        &self,
        credentials: &Credentials,
        username: &str,
        password: &str,
    ) -> Result<Option<User>> {
        let Some(row) = self.get_user_row_by_username(username)? else {
            return Ok(None);
        };

        if credentials.verify(password, &row.password) {
            Ok(Some(row.into_user()))
        } else {
            Ok(None)
        }
    }

    pub fn update_profile(&self, id: UserId, update: &ProfileUpdate) -> Result<Option<User>> {
        let image_url = non_blank(update.image_url.as_deref()).unwrap_or(DEFAULT_IMAGE_URL);
        let header_image_url =
            non_blank(update.header_image_url.as_deref()).unwrap_or(DEFAULT_HEADER_IMAGE_URL);

        let changed = self.with_conn_mut(|conn| {
            let n = conn.execute(
                "UPDATE users
                 SET username = ?2, email = ?3, image_url = ?4, header_image_url = ?5, bio = ?6, location = ?7
                 WHERE id = ?1",
                rusqlite::params![
                    id,
                    update.username,
                    update.email,
                    image_url,
                    header_image_url,
                    non_blank(update.bio.as_deref()),
                    non_blank(update.location.as_deref()),
                ],
            )?;
            Ok(n > 0)
        })?;

        if changed { self.get_user(id) } else { Ok(None) }
    }

    /// Returns true if `follower` has a follow edge to `followed`.
    pub fn is_following(&self, follower: UserId, followed: UserId) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM follows WHERE user_following_id = ?1 AND user_being_followed_id = ?2
                 )",
                [follower, followed],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Returns true if `other` follows `user`.
    pub fn is_followed_by(&self, user: UserId, other: UserId) -> Result<bool> {
        self.is_following(other, user)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{credentials, seeded};

    const PIC: &str = "https://images.unsplash.com/photo-1507003211169-0a1dd7228f2d";

    #[test]
    fn basic_user_has_no_messages_or_followers() {
        let (db, creds, _, _) = seeded();
        let staged = NewUser::signup(&creds, Some("testuser"), Some("test@test.com"), Some("HASHED_PASSWORD"), None)
            .unwrap();
        let user = db.commit_user(&staged).unwrap();

        assert!(db.messages_by_user(user.id, 100).unwrap().is_empty());
        assert!(db.followers(user.id).unwrap().is_empty());
        assert_eq!(user.image_url, DEFAULT_IMAGE_URL);
        assert_eq!(user.header_image_url, DEFAULT_HEADER_IMAGE_URL);
    }

    #[test]
    fn display_embeds_id_username_email() {
        let (_, _, u1, _) = seeded();
        assert_eq!(u1.to_string(), "<User #1111: user1, user1@gmail.com>");
    }

    #[test]
    fn password_is_never_stored_in_plaintext() {
        let (db, _, u1, _) = seeded();
        let row = db.get_user_row_by_username(&u1.username).unwrap().unwrap();

        assert_ne!(row.password, "password");
        assert!(row.password.starts_with("$argon2id$"));
    }

    #[test]
    fn valid_signup_commits() {
        let (db, creds, _, _) = seeded();
        let staged = NewUser::signup(&creds, Some("validUser"), Some("valid@gmail.com"), Some("password1"), Some(PIC))
            .unwrap()
            .with_id(5555);
        db.commit_user(&staged).unwrap();

        let valid = db.get_user(5555).unwrap().unwrap();
        assert_eq!(valid.to_string(), "<User #5555: validUser, valid@gmail.com>");
        assert_eq!(valid.image_url, PIC);
    }

    #[test]
    fn duplicate_signup_fails_at_commit() {
        let (db, creds, _, _) = seeded();
        let before = db.count_users().unwrap();

        // Staging succeeds; the collision is only detected on commit.
        let staged = NewUser::signup(&creds, Some("user1"), Some("user1@gmail.com"), Some("password"), None)
            .unwrap();
        let err = db.commit_user(&staged).unwrap_err();

        assert!(err.is_integrity(), "{err:?}");
        assert_eq!(db.count_users().unwrap(), before);
    }

    #[test]
    fn duplicate_email_alone_fails_at_commit() {
        let (db, creds, _, _) = seeded();
        let staged = NewUser::signup(&creds, Some("fresh"), Some("user2@gmail.com"), Some("password"), None)
            .unwrap();

        assert!(db.commit_user(&staged).unwrap_err().is_integrity());
    }

    #[test]
    fn missing_username_fails_at_commit() {
        let (db, creds, _, _) = seeded();
        let staged = NewUser::signup(&creds, None, Some("validemail@gmail.com"), Some("password1"), Some(PIC))
            .unwrap();

        assert!(db.commit_user(&staged).unwrap_err().is_integrity());
    }

    #[test]
    fn missing_email_fails_at_commit() {
        let (db, creds, _, _) = seeded();
        let staged = NewUser::signup(&creds, Some("validUserName"), None, Some("password1"), Some(PIC))
            .unwrap();

        assert!(db.commit_user(&staged).unwrap_err().is_integrity());
    }

    #[test]
    fn empty_or_absent_password_fails_at_signup() {
        let creds = credentials();

        let absent = NewUser::signup(&creds, Some("validUserName"), Some("validemail@gmail.com"), None, Some(PIC));
        assert!(matches!(absent, Err(SignupError::Validation(_))));

        let empty = NewUser::signup(&creds, Some("validUserName"), Some("validemail@gmail.com"), Some(""), Some(PIC));
        assert!(matches!(empty, Err(SignupError::Validation(_))));
    }

    #[test]
    fn authenticate_with_correct_password() {
        let (db, creds, u1, _) = seeded();
        let found = db.authenticate(&creds, &u1.username, "password").unwrap().unwrap();

        assert_eq!(found.id, 1111);
    }

    #[test]
    fn authenticate_unknown_username() {
        let (db, creds, _, _) = seeded();
        assert!(db.authenticate(&creds, "badusername", "password").unwrap().is_none());
    }

    #[test]
    fn authenticate_wrong_password() {
        let (db, creds, u1, _) = seeded();
        assert!(db.authenticate(&creds, &u1.username, "badpassword").unwrap().is_none());
    }

    #[test]
    fn follow_is_directed() {
        let (db, _, u1, u2) = seeded();
        assert!(db.follow(u1.id, u2.id).unwrap());

        assert!(db.is_following(u1.id, u2.id).unwrap());
        assert!(!db.is_following(u2.id, u1.id).unwrap());

        assert!(db.is_followed_by(u2.id, u1.id).unwrap());
        assert!(!db.is_followed_by(u1.id, u2.id).unwrap());

        assert_eq!(db.following(u2.id).unwrap().len(), 0);
        assert_eq!(db.followers(u2.id).unwrap().len(), 1);
        assert_eq!(db.followers(u1.id).unwrap().len(), 0);
        assert_eq!(db.following(u1.id).unwrap().len(), 1);

        assert_eq!(db.followers(u2.id).unwrap()[0].id, u1.id);
        assert_eq!(db.following(u1.id).unwrap()[0].id, u2.id);
    }

    #[test]
    fn update_profile_applies_defaults_and_blanks() {
        let (db, _, u1, _) = seeded();
        let update = ProfileUpdate {
            username: "renamed".into(),
            email: "renamed@gmail.com".into(),
            image_url: Some("  ".into()),
            header_image_url: None,
            bio: Some("Hello there".into()),
            location: Some(String::new()),
        };
        let user = db.update_profile(u1.id, &update).unwrap().unwrap();

        assert_eq!(user.username, "renamed");
        assert_eq!(user.image_url, DEFAULT_IMAGE_URL);
        assert_eq!(user.bio.as_deref(), Some("Hello there"));
        assert_eq!(user.location, None);
    }

    #[test]
    fn update_profile_rejects_taken_username() {
        let (db, _, u1, u2) = seeded();
        let update = ProfileUpdate {
            username: u2.username.clone(),
            email: u1.email.clone(),
            image_url: None,
            header_image_url: None,
            bio: None,
            location: None,
        };

        assert!(db.update_profile(u1.id, &update).unwrap_err().is_integrity());
        assert_eq!(db.get_user(u1.id).unwrap().unwrap().username, "user1");
    }

    #[test]
    fn update_profile_rejects_blank_username_or_email() {
        let (db, _, u1, _) = seeded();

        for (username, email) in [("", "user1@gmail.com"), ("user1", "   ")] {
            let update = ProfileUpdate {
                username: username.into(),
                email: email.into(),
                image_url: None,
                header_image_url: None,
                bio: None,
                location: None,
            };
            assert!(db.update_profile(u1.id, &update).unwrap_err().is_integrity());
        }

        let user = db.get_user(u1.id).unwrap().unwrap();
        assert_eq!(user.username, "user1");
        assert_eq!(user.email, "user1@gmail.com");
    }

    #[test]
    fn update_profile_of_missing_user() {
        let (db, _, _, _) = seeded();
        let update = ProfileUpdate {
            username: "ghost".into(),
            email: "ghost@gmail.com".into(),
            image_url: None,
            header_image_url: None,
            bio: None,
            location: None,
        };

        assert!(db.update_profile(9999, &update).unwrap().is_none());
    }
}
