//! Backup/restore types

use super::manifest::Manifest;
use crate::config::BackupSettings;
use crate::error::Error;
use crate::gateway::DEFAULT_SEARCH_LIMIT;
use std::fmt;
use std::path::PathBuf;

/// Kind of platform resource handled by a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Folder,
    Permissions,
    Dashboard,
    Datasource,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::Folder => "folder",
            ResourceKind::Permissions => "permissions",
            ResourceKind::Dashboard => "dashboard",
            ResourceKind::Datasource => "datasource",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key recorded when a whole stage could not be enumerated
pub const STAGE_FAILURE_KEY: &str = "*";

/// Options for a backup run
#[derive(Debug, Clone)]
pub struct BackupOptions {
    /// Log and skip failing items instead of aborting the run
    pub continue_on_error: bool,

    /// Dashboard search page size
    pub page_size: u32,
}

impl Default for BackupOptions {
    fn default() -> Self {
        Self {
            continue_on_error: true,
            page_size: DEFAULT_SEARCH_LIMIT,
        }
    }
}

impl BackupOptions {
    /// Create new backup options with default values
    ///
    /// # Example
    /// ```rust
    /// use grafana_backup::BackupOptions;
    ///
    /// let options = BackupOptions::new().fail_fast().page_size(500);
    /// assert!(!options.continue_on_error);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the run on the first failing item
    #[must_use]
    pub fn fail_fast(mut self) -> Self {
        self.continue_on_error = false;
        self
    }

    #[must_use]
    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Set the dashboard search page size (zero is treated as one)
    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }
}

impl From<&BackupSettings> for BackupOptions {
    fn from(settings: &BackupSettings) -> Self {
        Self {
            continue_on_error: settings.continue_on_error,
            page_size: settings.page_size,
        }
    }
}

/// A resource that could not be backed up
#[derive(Debug)]
pub struct ItemFailure {
    pub kind: ResourceKind,

    /// uid or id of the resource, `*` when the stage listing itself failed
    ///
    /// A dashboard search hit without a uid is keyed by its title.
    pub key: String,

    pub error: Error,
}

impl fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}': {}", self.kind, self.key, self.error)
    }
}

/// Outcome of a backup run
#[derive(Debug)]
pub struct BackupReport {
    pub manifest: Manifest,
    pub manifest_path: PathBuf,
    pub failures: Vec<ItemFailure>,
}

impl BackupReport {
    /// Every item was written
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// One-line summary suitable for a notification
    pub fn summary(&self) -> String {
        if self.failures.is_empty() {
            format!("{} items backed up", self.manifest.len())
        } else {
            format!(
                "{} items backed up, {} failed",
                self.manifest.len(),
                self.failures.len()
            )
        }
    }
}

/// Options for restore
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    /// Probe existence and report the planned action without mutating anything
    pub dry_run: bool,
}

impl RestoreOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// Branch taken (or planned, in dry-run mode) for a restored resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreAction {
    Created,
    Updated,
}

impl fmt::Display for RestoreAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestoreAction::Created => f.write_str("created"),
            RestoreAction::Updated => f.write_str("updated"),
        }
    }
}

/// A restored resource and the branch that produced it
///
/// In dry-run mode `body` is the payload that would have been sent.
#[derive(Debug, Clone, PartialEq)]
pub struct Restored<T> {
    pub action: RestoreAction,
    pub body: T,
    pub dry_run: bool,
}

/// Outcome of restoring a whole tree
#[derive(Debug, Default)]
pub struct TreeRestoreReport {
    pub folders: Vec<(String, RestoreAction)>,
    pub dashboards: Vec<(String, RestoreAction)>,
    pub datasources: Vec<(String, RestoreAction)>,
}

impl TreeRestoreReport {
    pub fn total(&self) -> usize {
        self.folders.len() + self.dashboards.len() + self.datasources.len()
    }

    pub fn count(&self, action: RestoreAction) -> usize {
        self.folders
            .iter()
            .chain(&self.dashboards)
            .chain(&self.datasources)
            .filter(|(_, a)| *a == action)
            .count()
    }
}
