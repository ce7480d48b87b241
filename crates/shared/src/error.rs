//! Error taxonomy for the authentication core

use thiserror::Error;

/// Postgres SQLSTATE for `unique_violation`.
const PG_UNIQUE_VIOLATION: &str = "23505";
/// Postgres SQLSTATE for `foreign_key_violation`.
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";

#[derive(Debug, Error)]
pub enum AuthError {
    /// Signature, shape or expiry failure while decoding a token.
    #[error("Invalid token")]
    InvalidToken,

    #[error("Conflict: {0}")]
    Conflict(String),

    /// OTP, invite, reset or record lookup miss. Expired and unknown are not distinguished.
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    /// Entropy source or startup storage failure. The process should not serve traffic.
    #[error("Fatal: {0}")]
    Fatal(String),

    /// Runtime store failure that is neither a conflict nor a miss.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl AuthError {
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AuthError::NotFound,
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                Some(PG_UNIQUE_VIOLATION) => AuthError::Conflict(
                    db_err
                        .constraint()
                        .map(|c| format!("{c} already exists"))
                        .unwrap_or_else(|| "Resource already exists".to_string()),
                ),
                // Referenced user or organization does not exist
                Some(PG_FOREIGN_KEY_VIOLATION) => AuthError::NotFound,
                _ => AuthError::Storage(db_err.to_string()),
            },
            other => AuthError::Storage(other.to_string()),
        }
    }
}

/// Result alias for store and core operations
pub type AuthResult<T> = Result<T, AuthError>;
