//! Structured error output for scripted callers.
//!
//! Provides machine-parseable error information with:
//! - Error codes for categorization
//! - Hints for self-correction
//! - Retryability flags
//! - Context for debugging

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Machine-readable error codes.
///
/// These codes are stable and can be used for programmatic error handling.
/// Format: `SCREAMING_SNAKE_CASE` for easy parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // === Config Errors (exit code 2) ===
    /// Configuration error
    ConfigError,
    /// Required setting missing
    MissingSetting,
    /// Setting has an unusable value
    InvalidSetting,
    /// Config parse error
    ConfigParseError,
    /// Target container cannot be resolved
    ContainerUnavailable,

    // === Transport Errors (exit code 3) ===
    /// Remote call failed
    TransportError,
    /// Remote object missing
    RemoteNotFound,
    /// Capability not implemented by the client
    Unsupported,

    // === Store Errors (exit code 4) ===
    /// Mapping store locked by another pass
    StoreLocked,
    /// Mapping store unreadable
    StoreCorrupt,
    /// File I/O error
    IoError,
    /// JSON serialization error
    JsonError,

    // === Record Errors (exit code 5) ===
    /// Record carries an unusable value
    DataError,
    /// Priority label out of range
    InvalidPriority,
    /// Mapping uniqueness violated
    IntegrityError,

    // === Internal Errors (exit code 1) ===
    /// Unexpected internal error
    InternalError,
}

impl ErrorCode {
    /// Get the string representation for JSON output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ConfigError => "CONFIG_ERROR",
            Self::MissingSetting => "MISSING_SETTING",
            Self::InvalidSetting => "INVALID_SETTING",
            Self::ConfigParseError => "CONFIG_PARSE_ERROR",
            Self::ContainerUnavailable => "CONTAINER_UNAVAILABLE",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::RemoteNotFound => "REMOTE_NOT_FOUND",
            Self::Unsupported => "UNSUPPORTED",
            Self::StoreLocked => "STORE_LOCKED",
            Self::StoreCorrupt => "STORE_CORRUPT",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::DataError => "DATA_ERROR",
            Self::InvalidPriority => "INVALID_PRIORITY",
            Self::IntegrityError => "INTEGRITY_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Whether this error is potentially retryable without changing input.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreLocked | Self::TransportError)
    }

    /// Get the exit code for this error category.
    ///
    /// - 1: Internal/unknown errors
    /// - 2: Configuration errors
    /// - 3: Transport errors that stopped a pass
    /// - 4: Mapping store errors
    /// - 5: Record data and integrity errors
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigError
            | Self::MissingSetting
            | Self::InvalidSetting
            | Self::ConfigParseError
            | Self::ContainerUnavailable => 2,
            Self::TransportError | Self::RemoteNotFound | Self::Unsupported => 3,
            Self::StoreLocked | Self::StoreCorrupt | Self::IoError | Self::JsonError => 4,
            Self::DataError | Self::InvalidPriority | Self::IntegrityError => 5,
            Self::InternalError => 1,
        }
    }
}

/// Structured error for machine-parseable output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructuredError {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Optional hint for fixing the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Whether the operation can be retried
    pub retryable: bool,
    /// Additional context data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

impl StructuredError {
    /// Create a new structured error from a `SyncError`.
    #[must_use]
    pub fn from_error(err: &SyncError) -> Self {
        let (code, context) = Self::extract_code_and_context(err);

        Self {
            code,
            message: err.to_string(),
            hint: err.suggestion().map(str::to_string),
            retryable: code.is_retryable(),
            context,
        }
    }

    /// Serialize to JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "code": self.code.as_str(),
                "message": self.message,
                "hint": self.hint,
                "retryable": self.retryable,
                "context": self.context,
            }
        })
    }

    /// Format for human-readable output.
    #[must_use]
    pub fn to_human(&self, color: bool) -> String {
        let mut output = String::new();

        if color {
            output.push_str("\x1b[31mError:\x1b[0m ");
        } else {
            output.push_str("Error: ");
        }

        output.push_str(&self.message);

        if let Some(hint) = &self.hint {
            output.push('\n');
            if color {
                output.push_str("\x1b[33mHint:\x1b[0m ");
            } else {
                output.push_str("Hint: ");
            }
            output.push_str(hint);
        }

        output
    }

    fn extract_code_and_context(err: &SyncError) -> (ErrorCode, Option<Value>) {
        match err {
            SyncError::Config(_) => (ErrorCode::ConfigError, None),
            SyncError::MissingSetting { key } => {
                (ErrorCode::MissingSetting, Some(json!({"key": key})))
            }
            SyncError::InvalidSetting { key, reason } => (
                ErrorCode::InvalidSetting,
                Some(json!({"key": key, "reason": reason})),
            ),
            SyncError::Yaml(_) => (ErrorCode::ConfigParseError, None),
            SyncError::ContainerUnavailable { name } => {
                (ErrorCode::ContainerUnavailable, Some(json!({"name": name})))
            }
            SyncError::Transport { operation, .. } => (
                ErrorCode::TransportError,
                Some(json!({"operation": operation})),
            ),
            SyncError::RemoteNotFound { kind, id } => (
                ErrorCode::RemoteNotFound,
                Some(json!({"kind": kind, "id": id})),
            ),
            SyncError::Unsupported { operation } => (
                ErrorCode::Unsupported,
                Some(json!({"operation": operation})),
            ),
            SyncError::StoreLocked { path } => (
                ErrorCode::StoreLocked,
                Some(json!({"path": path.display().to_string()})),
            ),
            SyncError::StoreCorrupt { path, .. } => (
                ErrorCode::StoreCorrupt,
                Some(json!({"path": path.display().to_string()})),
            ),
            SyncError::Io(_) => (ErrorCode::IoError, None),
            SyncError::Json(_) => (ErrorCode::JsonError, None),
            SyncError::Data {
                record_id, field, ..
            } => (
                ErrorCode::DataError,
                Some(json!({"record_id": record_id, "field": field})),
            ),
            SyncError::InvalidPriority { value } => {
                (ErrorCode::InvalidPriority, Some(json!({"value": value})))
            }
            SyncError::Integrity { .. } => (ErrorCode::IntegrityError, None),
            SyncError::WithContext { source, .. } => source
                .downcast_ref::<SyncError>()
                .map_or((ErrorCode::InternalError, None), Self::extract_code_and_context),
            SyncError::Other(_) => (ErrorCode::InternalError, None),
        }
    }
}
