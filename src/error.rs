//! Typed errors for the profile index.
//!
//! Callers that only report errors can let these coerce into `anyhow::Error`;
//! callers that need to react to a specific failure (a missing profile, a
//! rename conflict) can match on the variant instead of parsing strings.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by [`crate::index::Index`]
#[derive(Error, Debug)]
pub enum IndexError {
    /// The base path exists but is not a directory
    #[error("index directory '{}' is not a valid directory", .0.display())]
    NotADirectory(PathBuf),

    /// The base directory is missing the owner write permission bit
    #[error("index directory '{}' is not writable", .0.display())]
    NotWritable(PathBuf),

    #[error("profile '{0}' does not exist")]
    ProfileNotFound(String),

    #[error("profile '{0}' already exists")]
    ProfileExists(String),

    /// Reading, writing or creating a file or directory failed
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The index file exists but is not a valid profile mapping
    #[error("failed to parse index file {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize index: {0}")]
    Serialize(#[source] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;

impl IndexError {
    /// Build an I/O error tagged with the path it happened on
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// True for errors caused by a bad base directory (fatal at open time)
    pub fn is_config(&self) -> bool {
        matches!(self, Self::NotADirectory(_) | Self::NotWritable(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IndexError::ProfileNotFound("prod".to_string());
        assert_eq!(err.to_string(), "profile 'prod' does not exist");

        let err = IndexError::ProfileExists("prod".to_string());
        assert_eq!(err.to_string(), "profile 'prod' already exists");
    }

    #[test]
    fn test_io_error_construction() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = IndexError::io("/path/to/file", io_err);
        assert!(err.to_string().contains("/path/to/file"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_is_config() {
        assert!(IndexError::NotADirectory(PathBuf::from("/tmp/x")).is_config());
        assert!(IndexError::NotWritable(PathBuf::from("/tmp/x")).is_config());
        assert!(!IndexError::ProfileNotFound("x".to_string()).is_config());
    }

    #[test]
    fn test_anyhow_downcast() {
        let err: anyhow::Error = IndexError::ProfileExists("dev".to_string()).into();
        assert!(matches!(
            err.downcast_ref::<IndexError>(),
            Some(IndexError::ProfileExists(name)) if name == "dev"
        ));
    }
}
