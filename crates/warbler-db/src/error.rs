use rusqlite::ErrorCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// A UNIQUE, NOT NULL, CHECK or foreign key constraint rejected the write.
    /// Nothing from the failed unit of work was kept.
    #[error("integrity violation: {0}")]
    Integrity(String),

    #[error("database lock poisoned")]
    LockPoisoned,

    #[error(transparent)]
    Sqlite(rusqlite::Error),
}

impl DbError {
    pub fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(e: rusqlite::Error) -> Self {
        match &e {
            rusqlite::Error::SqliteFailure(err, msg) if err.code == ErrorCode::ConstraintViolation => {
                Self::Integrity(msg.clone().unwrap_or_else(|| err.to_string()))
            }
            _ => Self::Sqlite(e),
        }
    }
}
