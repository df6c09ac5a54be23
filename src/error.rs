use thiserror::Error;

/// Result alias used by every ledger, query and pipeline operation
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Frame read failed: {0}")]
    ReadFailed(String),

    #[error("Inference failure: {0}")]
    InferenceFailure(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl Error {
    /// Wrap a sqlx error with context, keeping constraint violations distinguishable
    /// from storage failures.
    pub fn database(context: &str, err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err)
                if db_err.is_unique_violation()
                    || db_err.is_foreign_key_violation()
                    || db_err.is_check_violation() =>
            {
                Error::ConstraintViolation(format!("{}: {}", context, db_err))
            }
            sqlx::Error::RowNotFound => Error::NotFound(context.to_string()),
            _ => Error::PersistenceFailure(format!("{}: {}", context, err)),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::database("Database error", err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Io(format!("Image error: {}", err))
    }
}
