//! Run manifest (`items.txt`)
//!
//! One line per serialized resource: the display name as a JSON string, a colon,
//! a space, then the path of the file or directory written.

use crate::error::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// One serialized resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub name: String,
    pub path: PathBuf,
}

impl ManifestEntry {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = serde_json::to_string(&self.name).map_err(|_| fmt::Error)?;
        write!(f, "{name}: {}", self.path.display())
    }
}

/// Ordered record of everything written during one backup run
///
/// Entries are appended in traversal order and never reordered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.entries.push(ManifestEntry::new(name, path));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManifestEntry> {
        self.entries.iter()
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Render as `items.txt` content
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in &self.entries {
            out.push_str(&entry.to_string());
            out.push('\n');
        }
        out
    }

    /// Write the manifest file, replacing any previous one
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            crate::error::create_dir(parent)?;
        }
        crate::error::write_file(path, self.render())
    }

    /// Read a manifest file back
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a line is malformed.
    pub fn read(path: &Path) -> Result<Self> {
        let content = crate::error::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse `items.txt` content
    ///
    /// # Errors
    ///
    /// Returns an error naming the first malformed line.
    pub fn parse(content: &str) -> Result<Self> {
        let mut manifest = Manifest::new();
        for (number, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (name, path) = parse_line(line).ok_or_else(|| {
                Error::BackupFailed(format!("malformed manifest line {}: {line}", number + 1))
            })?;
            manifest.push(name, path);
        }
        Ok(manifest)
    }
}

impl<'a> IntoIterator for &'a Manifest {
    type Item = &'a ManifestEntry;
    type IntoIter = std::slice::Iter<'a, ManifestEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Split `"name": path`, decoding the JSON-quoted name
fn parse_line(line: &str) -> Option<(String, String)> {
    let mut stream = serde_json::Deserializer::from_str(line).into_iter::<String>();
    let name = stream.next()?.ok()?;
    let path = line.get(stream.byte_offset()..)?.strip_prefix(": ")?;
    Some((name, path.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
