//! Backup and restore of a platform instance
//!
//! - [`BackupManager`] walks folders, dashboards and datasources into a tree
//! - [`archive`] packs the tree into a timestamped `.tgz`
//! - [`RestoreManager`] replays a tree with create-or-update semantics

pub mod archive;
pub mod layout;
mod manifest;
mod operations;
mod restore;
mod types;

pub use archive::{
    ArchiveInfo, calculate_file_hash, create_archive, create_archive_at, extract_archive,
    list_archive,
};
pub use layout::TreeLayout;
pub use manifest::{Manifest, ManifestEntry};
pub use operations::BackupManager;
pub use restore::RestoreManager;

pub use types::{
    BackupOptions, BackupReport, ItemFailure, ResourceKind, RestoreAction, RestoreOptions,
    Restored, STAGE_FAILURE_KEY, TreeRestoreReport,
};
