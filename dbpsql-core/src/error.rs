/// Structured error types for dbpsql-core.
///
/// Every query helper classifies driver outcomes into [`DbError`]. Callers
/// branch on [`DbError::kind`] instead of comparing error values, and the
/// binary crate wraps these in `anyhow` for reporting.
use thiserror::Error;

/// Discriminant of a [`DbError`], cheap to copy and match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    AlreadyExists,
    NotUpdated,
    Internal,
    InvalidParams,
    AccessDenied,
    NotAuthorized,
    /// The pool could not be established within the retry budget.
    Connection,
}

/// Main error type for dbpsql-core operations
#[derive(Error, Debug)]
pub enum DbError {
    /// The query matched no rows, or a delete touched nothing
    #[error("data not found")]
    NotFound,

    /// An existence check found a matching row
    #[error("data already exists")]
    AlreadyExists,

    /// An update returning ids produced none
    #[error("no record to update")]
    NotUpdated,

    /// Driver failure or a write that silently changed nothing
    #[error("internal error: {reason}")]
    Internal {
        reason: String,
        #[source]
        source: Option<sqlx::Error>,
    },

    /// Template placeholders could not be satisfied by the given parameters
    #[error("invalid parameters: {reason}")]
    InvalidParams { reason: String },

    #[error("access denied")]
    AccessDenied,

    #[error("not authorized")]
    NotAuthorized,

    /// Connection retries exhausted
    #[error("failed to connect to database after {attempts} attempts: {source}")]
    Connection {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },

    /// Loading or applying migrations failed
    #[error("migration failed: {source}")]
    Migration {
        #[from]
        source: sqlx::migrate::MigrateError,
    },
}

/// Result type alias for dbpsql-core operations
pub type Result<T> = std::result::Result<T, DbError>;

impl DbError {
    /// Create an internal error without a driver source
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
            source: None,
        }
    }

    /// Create an invalid parameters error
    pub fn invalid_params(reason: impl Into<String>) -> Self {
        Self::InvalidParams {
            reason: reason.into(),
        }
    }

    /// Classify a driver error.
    ///
    /// `RowNotFound` becomes [`DbError::NotFound`]; anything else is wrapped
    /// as [`DbError::Internal`] with `context` as the reason.
    pub fn from_sqlx(context: impl Into<String>, source: sqlx::Error) -> Self {
        match source {
            sqlx::Error::RowNotFound => Self::NotFound,
            source => Self::Internal {
                reason: context.into(),
                source: Some(source),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound => ErrorKind::NotFound,
            Self::AlreadyExists => ErrorKind::AlreadyExists,
            Self::NotUpdated => ErrorKind::NotUpdated,
            Self::Internal { .. } | Self::Migration { .. } => ErrorKind::Internal,
            Self::InvalidParams { .. } => ErrorKind::InvalidParams,
            Self::AccessDenied => ErrorKind::AccessDenied,
            Self::NotAuthorized => ErrorKind::NotAuthorized,
            Self::Connection { .. } => ErrorKind::Connection,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        assert_eq!(DbError::NotFound.to_string(), "data not found");
        assert_eq!(DbError::AlreadyExists.to_string(), "data already exists");

        let err = DbError::internal("record was not inserted");
        assert_eq!(err.to_string(), "internal error: record was not inserted");

        let err = DbError::invalid_params("missing parameter 'id'");
        assert!(err.to_string().contains("missing parameter 'id'"));
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err = DbError::from_sqlx("select one", sqlx::Error::RowNotFound);
        assert!(matches!(err, DbError::NotFound));
        assert!(err.is_not_found());
    }

    #[test]
    fn test_other_driver_errors_map_to_internal() {
        let err = DbError::from_sqlx("select many", sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(err.to_string().contains("select many"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_kind_discriminants() {
        let cases = [
            (DbError::NotFound, ErrorKind::NotFound),
            (DbError::AlreadyExists, ErrorKind::AlreadyExists),
            (DbError::NotUpdated, ErrorKind::NotUpdated),
            (DbError::internal("x"), ErrorKind::Internal),
            (DbError::invalid_params("x"), ErrorKind::InvalidParams),
            (DbError::AccessDenied, ErrorKind::AccessDenied),
            (DbError::NotAuthorized, ErrorKind::NotAuthorized),
            (
                DbError::Connection {
                    attempts: 3,
                    source: sqlx::Error::PoolClosed,
                },
                ErrorKind::Connection,
            ),
        ];

        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }

    #[test]
    fn test_connection_error_reports_attempts() {
        let err = DbError::Connection {
            attempts: 50,
            source: sqlx::Error::PoolTimedOut,
        };
        assert!(err.to_string().contains("after 50 attempts"));
    }
}
