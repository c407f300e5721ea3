//! Context helpers for attaching a human-readable prefix to errors.

use super::{Result, SyncError};

/// Extension trait adding context to fallible results.
pub trait ResultExt<T> {
    /// Wrap the error with a lazily built context message.
    ///
    /// # Errors
    ///
    /// Returns the original error wrapped in [`SyncError::WithContext`].
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: Into<String>,
        F: FnOnce() -> C,
    {
        self.map_err(|source| SyncError::WithContext {
            context: f().into(),
            source: Box::new(source),
        })
    }
}

/// Extension trait turning a missing value into a configuration error.
pub trait OptionExt<T> {
    /// Return the value or a [`SyncError::MissingSetting`] for `key`.
    ///
    /// # Errors
    ///
    /// Returns `MissingSetting` when the option is `None`.
    fn ok_or_setting(self, key: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_setting(self, key: &str) -> Result<T> {
        self.ok_or_else(|| SyncError::MissingSetting {
            key: key.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_context_prefixes_message() {
        let res: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::other("disk full"));
        let err = res.with_context(|| "saving store").unwrap_err();
        assert_eq!(err.to_string(), "saving store: disk full");
    }

    #[test]
    fn ok_or_setting_names_key() {
        let err = None::<String>.ok_or_setting("source.path").unwrap_err();
        assert!(matches!(err, SyncError::MissingSetting { key } if key == "source.path"));
    }
}
