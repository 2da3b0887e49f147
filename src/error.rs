use rusqlite;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("authentication required")]
    Unauthorized,

    #[error("database error: {message}")]
    Database { message: String },

    #[error("record not found")]
    NotFound,

    #[error("record conflict: {message}")]
    Conflict { message: String },

    #[error("validation failed: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        details: Option<JsonValue>,
    },

    #[error("not implemented: {feature}")]
    NotImplemented { feature: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn unauthorized() -> Self {
        warn!(target: "app::session", "no authenticated session");
        AppError::Unauthorized
    }

    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            source: None,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, details = %details, "validation error with details");
        AppError::Validation {
            message,
            source: None,
            details: Some(details),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::conflict", %message, "conflict error");
        AppError::Conflict { message }
    }

    pub fn not_found() -> Self {
        warn!(target: "app::database", "resource not found");
        AppError::NotFound
    }

    pub fn database(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::database", %message, "database error");
        AppError::Database { message }
    }

    /// Wraps a persistence failure with the name of the operation that failed.
    pub fn persistence(operation: &str, error: AppError) -> Self {
        match error {
            AppError::Database { message } => {
                AppError::database(format!("{operation} failed: {message}"))
            }
            other => other,
        }
    }

    pub fn not_implemented(feature: impl Into<String>) -> Self {
        let feature = feature.into();
        warn!(target: "app::schedule", %feature, "feature not implemented");
        AppError::NotImplemented { feature }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, AppError::Unauthorized)
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        use rusqlite::Error::{QueryReturnedNoRows, SqliteFailure};
        use rusqlite::ErrorCode;

        match &error {
            QueryReturnedNoRows => AppError::not_found(),
            SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
                AppError::conflict("unique or check constraint violated")
            }
            _ => {
                error!(target: "app::database", error = ?error, "sqlite error");
                AppError::database(error.to_string())
            }
        }
    }
}
