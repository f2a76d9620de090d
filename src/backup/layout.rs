//! On-disk tree layout
//!
//! ```text
//! <base>/<folder-id>/data.json
//! <base>/<folder-id>/access.json
//! <base>/<folder-id>/dashboards/<dashboard-uid>.json
//! <base>/datasources/<datasource-id>.json
//! <base>/items.txt
//! <base>/<YYYYMMDDHHmm>.tgz
//! ```

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Folder body file inside a folder directory
pub const FOLDER_FILE: &str = "data.json";

/// Folder permission list file inside a folder directory
pub const ACCESS_FILE: &str = "access.json";

/// Per-folder dashboard directory
pub const DASHBOARDS_DIR: &str = "dashboards";

/// Top-level datasource directory
pub const DATASOURCES_DIR: &str = "datasources";

/// Manifest file name
pub const MANIFEST_FILE: &str = "items.txt";

/// Archive file extension (without the dot)
pub const ARCHIVE_EXTENSION: &str = "tgz";

const JSON_EXTENSION: &str = "json";

/// Path scheme for one backup tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeLayout {
    base: PathBuf,
}

impl TreeLayout {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Directory of a folder, keyed by its instance-local id
    pub fn folder_dir(&self, key: &str) -> PathBuf {
        self.base.join(sanitize_filename(key))
    }

    pub fn folder_file(&self, key: &str) -> PathBuf {
        self.folder_dir(key).join(FOLDER_FILE)
    }

    pub fn access_file(&self, key: &str) -> PathBuf {
        self.folder_dir(key).join(ACCESS_FILE)
    }

    pub fn dashboards_dir(&self, folder_key: &str) -> PathBuf {
        self.folder_dir(folder_key).join(DASHBOARDS_DIR)
    }

    pub fn dashboard_file(&self, folder_key: &str, uid: &str) -> PathBuf {
        self.dashboards_dir(folder_key)
            .join(format!("{}.{JSON_EXTENSION}", sanitize_filename(uid)))
    }

    pub fn datasources_dir(&self) -> PathBuf {
        self.base.join(DATASOURCES_DIR)
    }

    pub fn datasource_file(&self, key: &str) -> PathBuf {
        self.datasources_dir()
            .join(format!("{}.{JSON_EXTENSION}", sanitize_filename(key)))
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.base.join(MANIFEST_FILE)
    }

    /// Folder directories present in the tree, sorted
    ///
    /// A folder directory is any direct child holding a `data.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the base directory cannot be read.
    pub fn folder_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in crate::error::read_dir(&self.base)? {
            let entry = entry.map_err(|e| Error::DirectoryRead {
                path: self.base.clone(),
                source: e,
            })?;
            let path = entry.path();
            if path.is_dir() && path.join(FOLDER_FILE).is_file() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Directories holding `dashboards/` but no `data.json`, sorted
    ///
    /// These appear when a folder failed to back up while its dashboards did not.
    ///
    /// # Errors
    ///
    /// Returns an error if the base directory cannot be read.
    pub fn orphaned_dashboard_dirs(&self) -> Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in crate::error::read_dir(&self.base)? {
            let entry = entry.map_err(|e| Error::DirectoryRead {
                path: self.base.clone(),
                source: e,
            })?;
            let path = entry.path();
            if path.join(DASHBOARDS_DIR).is_dir() && !path.join(FOLDER_FILE).is_file() {
                dirs.push(path);
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Datasource payload files, sorted
    ///
    /// # Errors
    ///
    /// Returns an error if the datasource directory exists but cannot be read.
    pub fn datasource_files(&self) -> Result<Vec<PathBuf>> {
        json_files(&self.datasources_dir())
    }
}

/// Dashboard payload files of one folder directory, sorted
///
/// # Errors
///
/// Returns an error if the dashboard directory exists but cannot be read.
pub fn dashboard_files(folder_dir: &Path) -> Result<Vec<PathBuf>> {
    json_files(&folder_dir.join(DASHBOARDS_DIR))
}

fn json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in crate::error::read_dir(dir)? {
        let entry = entry.map_err(|e| Error::DirectoryRead {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == JSON_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Folder directory owning a dashboard file (`<dir>/dashboards/<uid>.json`)
pub fn owning_folder_dir(dashboard_file: &Path) -> Option<PathBuf> {
    dashboard_file
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
}

/// Whether a path's file name ends in the archive extension
///
/// Matches on the whole name, so a file called exactly `.tgz` counts too.
pub fn is_archive(path: &Path) -> bool {
    path.file_name().is_some_and(|name| {
        name.to_string_lossy()
            .strip_suffix(ARCHIVE_EXTENSION)
            .is_some_and(|stem| stem.ends_with('.'))
    })
}

/// Make a platform-provided value safe to use as a single path component
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    match cleaned.trim() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_paths() {
        let layout = TreeLayout::new("/tmp/backup");
        assert_eq!(layout.folder_file("7"), PathBuf::from("/tmp/backup/7/data.json"));
        assert_eq!(layout.access_file("7"), PathBuf::from("/tmp/backup/7/access.json"));
        assert_eq!(
            layout.dashboard_file("7", "d1"),
            PathBuf::from("/tmp/backup/7/dashboards/d1.json")
        );
        assert_eq!(
            layout.datasource_file("9"),
            PathBuf::from("/tmp/backup/datasources/9.json")
        );
        assert_eq!(layout.manifest_file(), PathBuf::from("/tmp/backup/items.txt"));
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("d1"), "d1");
        assert_eq!(sanitize_filename("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize_filename(".."), "_");
        assert_eq!(sanitize_filename(""), "_");
        assert_eq!(sanitize_filename("a\nb"), "a_b");
    }

    #[test]
    fn test_owning_folder_dir() {
        let file = Path::new("/b/7/dashboards/d1.json");
        assert_eq!(owning_folder_dir(file), Some(PathBuf::from("/b/7")));
    }

    #[test]
    fn test_is_archive() {
        assert!(is_archive(Path::new("202401011200.tgz")));
        assert!(!is_archive(Path::new("items.txt")));
        assert!(!is_archive(Path::new("tgz")));
        assert!(!is_archive(Path::new("backup.tgz.json")));
        assert!(!is_archive(Path::new("notatgz")));
    }

    #[test]
    fn test_bare_extension_name_is_archive() {
        assert!(is_archive(Path::new(".tgz")));
        assert!(is_archive(Path::new("/b/.tgz")));
        assert!(is_archive(Path::new("/b/.archive-x1y2.tgz")));
    }

    #[test]
    fn test_orphaned_dashboard_dirs() {
        let dir = tempdir().unwrap();
        let layout = TreeLayout::new(dir.path());
        std::fs::create_dir_all(layout.dashboards_dir("7")).unwrap();
        std::fs::write(layout.folder_file("7"), "{}").unwrap();
        std::fs::create_dir_all(layout.dashboards_dir("8")).unwrap();
        std::fs::create_dir_all(layout.datasources_dir()).unwrap();

        assert_eq!(
            layout.orphaned_dashboard_dirs().unwrap(),
            vec![dir.path().join("8")]
        );
        assert_eq!(layout.folder_dirs().unwrap(), vec![dir.path().join("7")]);
    }

    #[test]
    fn test_folder_dirs_skips_non_folders() {
        let dir = tempdir().unwrap();
        let layout = TreeLayout::new(dir.path());
        std::fs::create_dir_all(dir.path().join("7")).unwrap();
        std::fs::write(layout.folder_file("7"), "{}").unwrap();
        std::fs::create_dir_all(dir.path().join("3")).unwrap();
        std::fs::write(layout.folder_file("3"), "{}").unwrap();
        std::fs::create_dir_all(layout.datasources_dir()).unwrap();
        std::fs::write(layout.manifest_file(), "").unwrap();

        let dirs = layout.folder_dirs().unwrap();
        assert_eq!(dirs, vec![dir.path().join("3"), dir.path().join("7")]);
    }

    #[test]
    fn test_dashboard_files_missing_dir_is_empty() {
        let dir = tempdir().unwrap();
        assert!(dashboard_files(dir.path()).unwrap().is_empty());
    }
}
