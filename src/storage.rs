//! Payload files of the on-disk tree
//!
//! Every platform payload is stored as indented JSON so that trees diff cleanly
//! between runs. Writes go through a temporary file in the destination directory
//! and are renamed into place, so a reader never sees a half-written payload.

use crate::error::{Error, Result};
use serde::{Serialize, de::DeserializeOwned};
use std::io::Write;
use std::path::Path;

/// Reads and writes JSON payload files
#[derive(Debug, Clone, Default)]
pub struct JsonStorage;

impl JsonStorage {
    pub fn new() -> Self {
        Self
    }

    /// Render a payload the way it is stored on disk
    pub fn serialize<T: Serialize + ?Sized>(&self, data: &T) -> Result<String> {
        serde_json::to_string_pretty(data).map_err(Error::from)
    }

    pub fn deserialize<T: DeserializeOwned>(&self, content: &str) -> Result<T> {
        serde_json::from_str(content).map_err(Error::from)
    }

    /// Load a payload file
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileRead`] if the file is missing and [`Error::Serialize`]
    /// if it does not hold the expected JSON shape.
    pub fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let content = crate::error::read_to_string(path)?;
        self.deserialize(&content)
    }

    /// Store a payload, creating parent directories and replacing any previous file
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be serialized or the file cannot be written.
    pub fn write<T: Serialize + ?Sized>(&self, path: &Path, data: &T) -> Result<()> {
        let content = self.serialize(data)?;
        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        crate::error::create_dir(parent)?;

        let mut temp = tempfile::Builder::new()
            .prefix(".payload-")
            .suffix(".tmp")
            .tempfile_in(parent)
            .map_err(|e| Error::FileWrite {
                path: parent.to_path_buf(),
                source: e,
            })?;
        temp.write_all(content.as_bytes())
            .map_err(|e| Error::FileWrite {
                path: temp.path().to_path_buf(),
                source: e,
            })?;
        temp.persist(path).map_err(|e| Error::FileWrite {
            path: path.to_path_buf(),
            source: e.error,
        })?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
