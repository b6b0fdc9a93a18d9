//! Error types for plantlog.
//!
//! This module defines all error types used throughout the plantlog crate,
//! providing detailed context for debugging and user-facing messages that the
//! HTTP layer passes through verbatim.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for plantlog operations.
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

    /// A referenced record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record that was looked up.
        entity: &'static str,
        /// The identifier that was not found.
        id: String,
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

    // === Auth Errors ===
    /// Sign-in failed because the email or password did not match.
    #[error("Invalid login credentials")]
    InvalidCredentials,

    /// A sign-up used an email that is already registered.
    #[error("User already registered")]
    EmailTaken,

    /// The request carried no session, or the session is unknown or expired.
    #[error("Unauthorized")]
    Unauthorized,

    /// The caller's role does not permit the operation.
    #[error("forbidden: {action} requires the {required} role")]
    Forbidden {
        /// What the caller tried to do.
        action: &'static str,
        /// The role that would have been allowed.
        required: &'static str,
    },

    // === Input Errors ===
    /// Request input failed validation.
    #[error("{message}")]
    Validation {
        /// Description of the invalid input.
        message: String,
    },

    /// A base64 payload could not be decoded.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

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

    /// Writing an object to blob storage failed.
    #[error("failed to upload {bucket}/{name}: {source}")]
    BlobUpload {
        /// Destination bucket.
        bucket: String,
        /// Object name inside the bucket.
        name: String,
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

/// A specialized Result type for plantlog operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a not-found error for the given entity.
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a forbidden error naming the role the action needs.
    #[must_use]
    pub fn forbidden(action: &'static str, required: &'static str) -> Self {
        Self::Forbidden { action, required }
    }

    /// Check if this error means the caller is not signed in.
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Check if this error is a role/permission issue.
    #[must_use]
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }
}
