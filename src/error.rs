//! Error handling for the data layer.
//!
//! Every fallible operation returns an [`AdminResult`]. Prefer adding a
//! variant over squeezing a new failure into [`AdminError::Storage`], and
//! document which operations produce it.

use sqlx::error::{DatabaseError, ErrorKind};
use thiserror::Error;

/// The error enum for every operation on the membership records.
#[derive(Debug, Error)]
pub enum AdminError {
    /// The key did not resolve to an existing record.
    ///
    /// Produced by `update`, `delete`, `withdraw` and the `with_*` getters,
    /// and by `enroll` when the member or course is missing.
    #[error("not found: {0}")]
    NotFound(String),
    /// A uniqueness or field rule was broken.
    ///
    /// Boundary validation failures land here too, naming the field.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    /// A delete was blocked by records that still reference the key.
    #[error("referential integrity violation: {0}")]
    ReferentialIntegrityViolation(String),
    /// The store was unreachable or busy for every attempt.
    #[error("storage unavailable after {attempts} attempt(s)")]
    TransientStorageFailure {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },
    /// A storage error that retrying will not fix.
    #[error("storage error")]
    Storage(#[source] sqlx::Error),
    /// The embedded schema migrations could not be applied.
    #[error("failed to apply schema migrations")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// The return type for all data layer operations.
pub type AdminResult<T> = Result<T, AdminError>;

impl AdminError {
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        AdminError::NotFound(what.to_string())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, AdminError::TransientStorageFailure { .. })
    }
}

// SQLite primary result codes, see https://www.sqlite.org/rescode.html
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

fn is_busy_or_locked(error: &dyn DatabaseError) -> bool {
    error
        .code()
        .and_then(|code| code.parse::<i32>().ok())
        .map(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED))
        .unwrap_or(false)
}

impl From<sqlx::Error> for AdminError {
    fn from(error: sqlx::Error) -> Self {
        if matches!(error, sqlx::Error::RowNotFound) {
            return AdminError::NotFound("row not found".to_owned());
        }

        if matches!(
            error,
            sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed
        ) {
            return AdminError::TransientStorageFailure {
                attempts: 1,
                source: error,
            };
        }

        let Some(db_error) = error.as_database_error() else {
            return AdminError::Storage(error);
        };

        if is_busy_or_locked(db_error) {
            return AdminError::TransientStorageFailure {
                attempts: 1,
                source: error,
            };
        }

        match db_error.kind() {
            ErrorKind::UniqueViolation
            | ErrorKind::NotNullViolation
            | ErrorKind::CheckViolation => {
                AdminError::ConstraintViolation(db_error.message().to_owned())
            }
            ErrorKind::ForeignKeyViolation => {
                AdminError::ReferentialIntegrityViolation(db_error.message().to_owned())
            }
            _ => AdminError::Storage(error),
        }
    }
}
