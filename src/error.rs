use sqlx::Error as SqlxError;
use sqlx::error::DatabaseError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum FleetDbError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

impl FleetDbError {
    /// The backend error behind a failed statement, if any.
    pub fn database_error(&self) -> Option<&dyn DatabaseError> {
        match self {
            FleetDbError::DatabaseError(e) => e.as_database_error(),
            _ => None,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        self.database_error()
            .is_some_and(|e| e.is_unique_violation())
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        self.database_error()
            .is_some_and(|e| e.is_foreign_key_violation())
    }

    /// `ALTER TABLE ... ADD COLUMN` on a column that already exists.
    pub fn is_duplicate_column(&self) -> bool {
        self.database_error().is_some_and(|e| {
            e.code().as_deref() == Some("42701") || e.message().contains("duplicate column")
        })
    }

    pub fn is_undefined_table(&self) -> bool {
        self.database_error().is_some_and(|e| {
            e.code().as_deref() == Some("42P01") || e.message().contains("no such table")
        })
    }
}
