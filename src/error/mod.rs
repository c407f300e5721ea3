//! Error types and handling for `tasksync`.
//!
//! Errors are grouped by how far they are allowed to travel:
//!
//! - Configuration errors abort an invocation before any pass starts.
//! - Transport and data errors are recovered per record inside a pass.
//! - Integrity errors are repaired in place by the identity store.
//! - Store errors (lock, corrupt file, failed save) abort the invocation.
//!
//! # Design
//!
//! - Uses `thiserror` for derive-based error types
//! - Supports `anyhow` integration through `Other`
//! - Provides recovery hints for user-facing errors
//! - Provides structured JSON output for scripted callers

mod context;
mod structured;

pub use context::{OptionExt, ResultExt};
pub use structured::{ErrorCode, StructuredError};

use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for `tasksync` operations.
#[derive(Error, Debug)]
pub enum SyncError {
    // === Configuration Errors ===
    /// Configuration file or value error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A setting the selected tool requires is not set.
    #[error("Missing required setting '{key}'")]
    MissingSetting { key: String },

    /// A setting has a value that cannot be used.
    #[error("Invalid value for '{key}': {reason}")]
    InvalidSetting { key: String, reason: String },

    /// The target container a policy writes into cannot be resolved.
    #[error("Target container unavailable: {name}")]
    ContainerUnavailable { name: String },

    // === Transport Errors ===
    /// A call against a remote service failed.
    #[error("Transport error during {operation}: {reason}")]
    Transport { operation: String, reason: String },

    /// The remote service reports the object does not exist.
    #[error("{kind} not found: {id}")]
    RemoteNotFound { kind: &'static str, id: String },

    /// The client does not implement the requested capability.
    #[error("Operation not supported by this client: {operation}")]
    Unsupported { operation: String },

    // === Data Errors ===
    /// A record carries a value that cannot be interpreted.
    #[error("Malformed record {record_id}: {field}: {reason}")]
    Data {
        record_id: String,
        field: String,
        reason: String,
    },

    /// Priority label outside p1-p4.
    #[error("Priority must be p1-p4, got: {value}")]
    InvalidPriority { value: String },

    // === Integrity Errors ===
    /// A mapping violates the one-to-one invariant.
    #[error("Mapping integrity violation: {detail}")]
    Integrity { detail: String },

    // === Store Errors ===
    /// Another pass holds the store lock.
    #[error("Mapping store is locked by another pass: {path}")]
    StoreLocked { path: PathBuf },

    /// The mapping store file exists but cannot be parsed.
    #[error("Mapping store at '{path}' is unreadable: {reason}")]
    StoreCorrupt { path: PathBuf, reason: String },

    // === I/O Errors ===
    /// File system I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    // === Wrapped errors ===
    /// Error with additional context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Wrapped anyhow error.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse error classes used for propagation decisions and exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Transport,
    Data,
    Integrity,
    Store,
    Internal,
}

impl SyncError {
    /// Classify this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_)
            | Self::MissingSetting { .. }
            | Self::InvalidSetting { .. }
            | Self::ContainerUnavailable { .. }
            | Self::Yaml(_) => ErrorCategory::Configuration,
            Self::Transport { .. } | Self::RemoteNotFound { .. } | Self::Unsupported { .. } => {
                ErrorCategory::Transport
            }
            Self::Data { .. } | Self::InvalidPriority { .. } => ErrorCategory::Data,
            Self::Integrity { .. } => ErrorCategory::Integrity,
            Self::StoreLocked { .. } | Self::StoreCorrupt { .. } | Self::Io(_) | Self::Json(_) => {
                ErrorCategory::Store
            }
            Self::WithContext { source, .. } => source
                .downcast_ref::<Self>()
                .map_or(ErrorCategory::Internal, Self::category),
            Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Can a pass carry on after this error, counting it against one record?
    #[must_use]
    pub fn is_pass_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transport | ErrorCategory::Data | ErrorCategory::Integrity
        )
    }

    /// Does the error mean the remote object is already gone?
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::RemoteNotFound { .. })
    }

    /// Human-friendly suggestion for fixing this error.
    #[must_use]
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::MissingSetting { .. } => Some("Set it in tasksync.yaml or via TASKSYNC_<KEY>"),
            Self::StoreLocked { .. } => {
                Some("Wait for the running pass to finish, or remove the stale .lock file")
            }
            Self::StoreCorrupt { .. } => {
                Some("Move the mapping file aside; the next pass starts from an empty store")
            }
            Self::InvalidPriority { .. } => Some("Use a priority between p1 (highest) and p4"),
            Self::ContainerUnavailable { .. } => {
                Some("Create the list in the target service or change the configured name")
            }
            _ => None,
        }
    }

    /// Get the exit code for this error.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        StructuredError::from_error(self).code.exit_code()
    }

    /// Create a transport error for a named remote operation.
    #[must_use]
    pub fn transport(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transport {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a data error for one field of one record.
    #[must_use]
    pub fn data(
        record_id: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Data {
            record_id: record_id.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid-setting error.
    #[must_use]
    pub fn invalid_setting(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Result type using `SyncError`.
pub type Result<T> = std::result::Result<T, SyncError>;
