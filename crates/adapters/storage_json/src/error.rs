//! JSON storage adapter error types.

use std::path::PathBuf;

use smartish_domain::error::SmartishError;

/// Errors specific to the JSON state file.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Reading or writing the file failed.
    #[error("state file I/O failed for {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The snapshot could not be serialized.
    #[error("unable to serialize snapshot")]
    Serialize(#[source] serde_json::Error),
}

impl StorageError {
    /// Convert into a [`SmartishError::Storage`] for propagation across port
    /// boundaries.
    pub fn into_domain(self) -> SmartishError {
        SmartishError::Storage(Box::new(self))
    }
}

impl From<StorageError> for SmartishError {
    fn from(err: StorageError) -> Self {
        err.into_domain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_name_the_file_in_io_errors() {
        let err = StorageError::Io {
            path: PathBuf::from("/var/lib/smartish/state.json"),
            source: std::io::Error::other("disk full"),
        };
        assert_eq!(
            err.to_string(),
            "state file I/O failed for /var/lib/smartish/state.json"
        );
    }

    #[test]
    fn should_convert_to_storage_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{{bad").unwrap_err();
        let err: SmartishError = StorageError::Serialize(json_err).into();
        assert!(matches!(err, SmartishError::Storage(_)));
    }
}
