pub mod accounts;
pub mod error;
pub mod migrations;
pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

pub use accounts::{NewUser, ProfileUpdate, SignupError};
pub use error::{DbError, Result};
pub use models::NewMessage;
pub use queries::Checked;

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let db = Self::init(conn)?;

        info!("Database opened at {}", path.display());
        Ok(db)
    }

    /// Private database that disappears with the handle.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        // Cascading deletes depend on this.
        conn.pragma_update(None, "foreign_keys", "ON")?;

        migrations::run(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Read access. Statements run in autocommit mode.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|_| DbError::LockPoisoned)?;
        f(&conn)
    }

    /// Write access. The closure runs inside one transaction that commits
    /// only if it returns `Ok`; any error rolls every statement back.
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| DbError::LockPoisoned)?;
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use warbler_crypto::Credentials;
    use warbler_types::models::User;

    use crate::{Database, NewUser};

    pub fn credentials() -> Credentials {
        Credentials::with_params(1024, 1, 1).unwrap()
    }

    /// Fresh database holding user1 (#1111) and user2 (#2222), both with
    /// password "password".
    pub fn seeded() -> (Database, Credentials, User, User) {
        let db = Database::open_in_memory().unwrap();
        let creds = credentials();

        let u1 = NewUser::signup(&creds, Some("user1"), Some("user1@gmail.com"), Some("password"), None)
            .unwrap()
            .with_id(1111);
        let u2 = NewUser::signup(&creds, Some("user2"), Some("user2@gmail.com"), Some("password"), None)
            .unwrap()
            .with_id(2222);

        let u1 = db.commit_user(&u1).unwrap();
        let u2 = db.commit_user(&u2).unwrap();
        (db, creds, u1, u2)
    }
}
