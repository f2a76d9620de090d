//! Runtime configuration
//!
//! This module contains the settings consumed by the binary and the orchestrators:
//! - `Config` - all sections plus the debug toggle, loadable from env or TOML
//! - `GrafanaConfig` - platform URL, token, TLS verification, timeout
//! - `NotifierConfig` / `StorageConfig` - optional collaborators
//! - `BackupSettings` - destination directory and error policy

mod types;

pub use types::{
    BackupSettings, Config, ConfigBuilder, DEFAULT_BASE_DIR, DEFAULT_NOTIFY_USERNAME,
    DEFAULT_STORAGE_REGION, DefaultEnvSource, EnvSource, GrafanaConfig, NotifierConfig,
    StorageConfig,
};
