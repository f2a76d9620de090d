//! Error types for grafana-backup

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for grafana-backup operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for grafana-backup
#[derive(Error, Debug)]
pub enum Error {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read directory '{path}': {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Failed to serialize data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Payload '{path}' has no '{field}' field")]
    MissingField { path: PathBuf, field: String },

    // -------------------------------------------------------------------------
    // Platform API Errors
    // -------------------------------------------------------------------------
    #[error("{method} {url} returned {status}: {message}")]
    Api {
        method: String,
        url: String,
        status: u16,
        message: String,
    },

    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{kind} '{key}' not found")]
    NotFound { kind: String, key: String },

    // -------------------------------------------------------------------------
    // Backup Errors
    // -------------------------------------------------------------------------
    #[error("Backup failed: {0}")]
    BackupFailed(String),

    #[error("Restore failed: {0}")]
    RestoreFailed(String),

    #[error("Archive error: {0}")]
    Archive(String),

    // -------------------------------------------------------------------------
    // Collaborator Errors
    // -------------------------------------------------------------------------
    #[error("Object storage error: {0}")]
    Storage(String),

    #[error("Notification error: {0}")]
    Notify(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Check if this is a "not found" type error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
            || matches!(self, Error::Api { status: 404, .. })
    }

    /// Check if this error came from talking to a remote endpoint
    #[must_use]
    pub fn is_transport(&self) -> bool {
        #[cfg(feature = "http")]
        if matches!(self, Error::Http(_)) {
            return true;
        }
        matches!(self, Error::Api { .. } | Error::Storage(_) | Error::Notify(_))
    }

    /// Check if this is a local filesystem error
    #[must_use]
    pub fn is_local_io(&self) -> bool {
        matches!(
            self,
            Error::FileRead { .. }
                | Error::FileWrite { .. }
                | Error::DirectoryCreate { .. }
                | Error::DirectoryRead { .. }
        )
    }
}

// =============================================================================
// Filesystem Helper Functions
// =============================================================================
// These reduce repetitive map_err patterns across the backup module.

/// Create a directory (and parents) with proper error handling
pub fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::DirectoryCreate {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Write content to a file with proper error handling
pub fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    std::fs::write(path, contents).map_err(|e| Error::FileWrite {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read a file to a string with proper error handling
pub fn read_to_string(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read directory entries with proper error handling
pub fn read_dir(path: &Path) -> Result<std::fs::ReadDir> {
    std::fs::read_dir(path).map_err(|e| Error::DirectoryRead {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let not_found = Error::NotFound {
            kind: "dashboard".into(),
            key: "d1".into(),
        };
        assert!(not_found.is_not_found());
        assert!(!not_found.is_transport());

        let api = Error::Api {
            method: "GET".into(),
            url: "http://grafana/api/folders".into(),
            status: 500,
            message: "boom".into(),
        };
        assert!(api.is_transport());
        assert!(!api.is_not_found());

        let io = Error::FileWrite {
            path: PathBuf::from("/nope"),
            source: std::io::Error::other("denied"),
        };
        assert!(io.is_local_io());
    }

    #[test]
    fn test_missing_field_message() {
        let err = Error::MissingField {
            path: PathBuf::from("7/data.json"),
            field: "uid".into(),
        };
        assert_eq!(err.to_string(), "Payload '7/data.json' has no 'uid' field");
    }
}
