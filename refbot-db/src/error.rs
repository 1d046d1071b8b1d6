//! Error types for refbot-db

use thiserror::Error;

use crate::models::ValidationError;

/// Result alias for data-access operations
pub type Result<T> = std::result::Result<T, DbError>;

/// Data-access error.
///
/// Validation failures are raised before any statement reaches the database.
/// Storage failures are passed through unchanged after the surrounding scope
/// has been rolled back.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("expected at most one {table} row, found several")]
    MultipleRows { table: String },
}

impl DbError {
    /// True when the error was raised before touching storage.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// True when the database rejected a write on a unique constraint.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Sqlx(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_convert() {
        let err: DbError = ValidationError::UnboundedDelete {
            table: "users".into(),
        }
        .into();
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "validation failed: refusing to delete from users without a filter (set delete_all to confirm)"
        );
    }

    #[test]
    fn storage_errors_are_not_validation() {
        let err: DbError = sqlx::Error::RowNotFound.into();
        assert!(!err.is_validation());
        assert!(!err.is_unique_violation());
        assert!(err.to_string().starts_with("database error:"));
    }
}
