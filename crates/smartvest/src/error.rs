//! Error types for smartvest.
//!
//! This module defines all error types used throughout the smartvest crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for smartvest operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// The persisted record slot holds something other than a record list.
    #[error("stored records in slot '{slot}' are unreadable: {source}")]
    CorruptSlot {
        /// Name of the key-value slot.
        slot: String,
        /// The underlying parse error.
        #[source]
        source: serde_json::Error,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Registration Errors ===
    /// A required registration field was left blank.
    #[error("missing required field: {field}")]
    MissingField {
        /// Name of the field.
        field: &'static str,
    },

    /// A registration field holds a value that cannot be used.
    #[error("invalid value for {field}: {message}")]
    InvalidField {
        /// Name of the field.
        field: &'static str,
        /// Why the value was rejected.
        message: String,
    },

    /// The uploaded photo exceeds the configured size cap.
    #[error("photo {path} is too large ({size} bytes, max {limit} bytes)")]
    PhotoTooLarge {
        /// Path of the rejected photo.
        path: PathBuf,
        /// Actual size in bytes.
        size: u64,
        /// Configured limit in bytes.
        limit: u64,
    },

    /// Hashing or verifying a password failed.
    #[error("credential hashing failed: {0}")]
    Credential(#[from] bcrypt::BcryptError),

    // === External Service Errors ===
    /// The address verification service failed.
    #[error("address verification failed: {0}")]
    AddressService(#[from] reqwest::Error),

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for smartvest operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a missing-field error.
    #[must_use]
    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    /// Create an invalid-field error.
    #[must_use]
    pub fn invalid_field(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field,
            message: message.into(),
        }
    }

    /// Check if this error is an oversized photo rejection.
    #[must_use]
    pub fn is_photo_too_large(&self) -> bool {
        matches!(self, Self::PhotoTooLarge { .. })
    }

    /// Check if this error came from user-supplied registration input.
    #[must_use]
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::MissingField { .. } | Self::InvalidField { .. } | Self::PhotoTooLarge { .. }
        )
    }
}
