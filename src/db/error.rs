use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database not configured")]
    NotConfigured,

    #[error("Not found")]
    NotFound,

    #[error("Validation error: {0}")]
    Validation(String),

    #[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl DbError {
    /// Whether this error reports that a column being added already exists.
    pub fn is_duplicate_column(&self) -> bool {
        match self {
            #[cfg(any(feature = "database-sqlite", feature = "database-postgres"))]
            DbError::Sqlx(sqlx::Error::Database(e)) => {
                let message = e.message().to_ascii_lowercase();
                message.contains("duplicate column") || message.contains("already exists")
            }
            _ => false,
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_sqlx_errors_are_not_duplicate_column() {
        for error in [
            DbError::NotConfigured,
            DbError::NotFound,
            DbError::Validation("limit must be positive, got 0".into()),
        ] {
            assert!(!error.is_duplicate_column(), "{error}");
        }
    }
}
