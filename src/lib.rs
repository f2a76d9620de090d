//! # grafana-backup
//!
//! Snapshot the configuration of a Grafana instance into a file tree, pack the tree
//! into a timestamped archive, and replay a tree onto a live instance with
//! idempotent create-or-update semantics.
//!
//! ## Features
//!
//! - **Backup**: folders with their permission lists, dashboards filed in folders, datasources
//! - **Manifest**: `items.txt` listing every resource written during the run
//! - **Archive**: `YYYYMMDDHHmm.tgz` of the tree, never including earlier archives
//! - **Restore**: existence probe by uid, then update with overwrite or create
//! - **Remote sync**: upload/list/fetch archives through an [`ObjectStore`](remote::ObjectStore)
//! - **Notifications**: colored webhook message on success or failure
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use grafana_backup::backup::create_archive;
//! use grafana_backup::gateway::HttpGateway;
//! use grafana_backup::{BackupManager, BackupOptions, Config};
//!
//! # fn example() -> grafana_backup::Result<()> {
//! let config = Config::builder("https://grafana.example.com", "glsa_token")
//!     .base_dir("/var/backups/grafana")
//!     .build();
//! config.validate()?;
//!
//! let gateway = HttpGateway::new(&config.grafana)?;
//! let report = BackupManager::new(&gateway)
//!     .run(&config.backup.base_dir, &BackupOptions::from(&config.backup))?;
//! for failure in &report.failures {
//!     eprintln!("skipped {failure}");
//! }
//!
//! let archive = create_archive(&config.backup.base_dir)?;
//! println!("{} ({} files)", archive.path.display(), archive.file_count);
//! # Ok(())
//! # }
//! ```
//!
//! ## Restore
//!
//! ```rust,no_run
//! use grafana_backup::gateway::HttpGateway;
//! use grafana_backup::{Config, RestoreManager, RestoreOptions};
//! use std::path::Path;
//!
//! # fn example() -> grafana_backup::Result<()> {
//! let config = Config::builder("https://grafana.example.com", "glsa_token").build();
//! let gateway = HttpGateway::new(&config.grafana)?;
//! let restore = RestoreManager::new(&gateway).with_options(RestoreOptions::new().dry_run(true));
//!
//! let folder = restore.restore_folder(Path::new("backup/7"))?;
//! println!("folder would be {}", folder.action);
//!
//! let dashboard = restore.restore_dashboard(Path::new("backup/7/dashboards/d1.json"))?;
//! println!("dashboard would be {}", dashboard.action);
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing Without a Platform
//!
//! [`MemoryGateway`](gateway::MemoryGateway) models the platform in memory and
//! records every call, so both orchestrators can be exercised offline.

// Core modules
mod error;
pub mod storage;
mod sync;
#[cfg(all(test, any(feature = "http", feature = "s3")))]
mod test_server;

// Grouped modules
pub mod backup;
pub mod catalog;
pub mod config;
pub mod gateway;
pub mod notify;
pub mod remote;

// Re-exports from core
pub use error::{Error, Result};
pub use storage::JsonStorage;

// Re-exports from config
pub use config::{Config, ConfigBuilder, DefaultEnvSource, EnvSource};

// Backup re-exports
pub use backup::{
    ArchiveInfo, BackupManager, BackupOptions, BackupReport, ItemFailure, Manifest, ManifestEntry,
    ResourceKind, RestoreAction, RestoreManager, RestoreOptions, Restored, TreeRestoreReport,
};
