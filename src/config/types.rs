//! Configuration types for grafana-backup

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Sender identity used for notifications unless overridden
pub const DEFAULT_NOTIFY_USERNAME: &str = "grafana-backup";

/// Default destination directory for the backup tree
pub const DEFAULT_BASE_DIR: &str = "backup";

// =============================================================================
// Environment Source
// =============================================================================

/// Source of environment variables
///
/// Abstracted so tests can feed a map instead of touching the process environment.
pub trait EnvSource {
    /// Look up a variable, `None` when unset
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads the real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEnvSource;

impl EnvSource for DefaultEnvSource {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Connection settings for the platform API
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrafanaConfig {
    /// Base URL, e.g. `https://grafana.example.com`
    pub url: String,

    /// Service account or API token sent as a bearer token
    pub token: String,

    /// Verify the server's TLS certificate
    pub verify_tls: bool,

    /// Per-request timeout in seconds (transport default when unset)
    pub timeout_secs: Option<u64>,
}

impl Default for GrafanaConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            verify_tls: true,
            timeout_secs: None,
        }
    }
}

impl GrafanaConfig {
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            token: token.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl std::fmt::Debug for GrafanaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrafanaConfig")
            .field("url", &self.url)
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .field("verify_tls", &self.verify_tls)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Webhook notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Incoming webhook URL
    pub endpoint: Option<String>,

    /// Channel the message is addressed to
    pub channel: Option<String>,

    /// Sender identity shown in the channel
    pub username: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            channel: None,
            username: DEFAULT_NOTIFY_USERNAME.to_string(),
        }
    }
}

impl NotifierConfig {
    /// Both endpoint and channel are set and non-empty
    pub fn is_configured(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        set(&self.endpoint) && set(&self.channel)
    }
}

/// Default signing region for object storage
pub const DEFAULT_STORAGE_REGION: &str = "us-east-1";

/// Object storage settings
///
/// `endpoint` selects the backend: an `http://` or `https://` URL names an
/// S3-compatible service, a `file://` URL or plain path names a local directory
/// whose subdirectories are buckets, and no endpoint means AWS S3 in `region`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub endpoint: Option<String>,

    /// Bucket archives are uploaded to
    pub bucket: Option<String>,

    /// Key prefix used when listing
    pub prefix: String,

    pub region: String,

    pub access_key: Option<String>,

    pub secret_key: Option<String>,

    /// Address buckets as `<endpoint>/<bucket>` instead of `<bucket>.<endpoint>`
    pub path_style: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: None,
            prefix: String::new(),
            region: DEFAULT_STORAGE_REGION.into(),
            access_key: None,
            secret_key: None,
            path_style: true,
        }
    }
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_key", &self.secret_key.as_ref().map(|_| "***"))
            .field("path_style", &self.path_style)
            .finish()
    }
}

impl StorageConfig {
    /// A bucket is named; the endpoint may be left to the AWS default
    pub fn is_configured(&self) -> bool {
        self.bucket.as_deref().is_some_and(|b| !b.trim().is_empty())
    }
}

/// Settings for a backup run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupSettings {
    /// Directory the tree, manifest and archive are written to
    pub base_dir: PathBuf,

    /// Log and skip failing items instead of aborting the run
    pub continue_on_error: bool,

    /// Dashboard search page size
    pub page_size: u32,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            continue_on_error: true,
            page_size: crate::gateway::DEFAULT_SEARCH_LIMIT,
        }
    }
}

// =============================================================================
// Config
// =============================================================================

/// Complete runtime configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub grafana: GrafanaConfig,
    pub notifier: NotifierConfig,
    pub storage: StorageConfig,
    pub backup: BackupSettings,

    /// Verbose logging
    pub debug: bool,
}

impl Config {
    /// Create a new builder for Config
    ///
    /// # Example
    /// ```rust
    /// use grafana_backup::Config;
    ///
    /// let config = Config::builder("http://grafana:3000", "token")
    ///     .base_dir("/var/backups/grafana")
    ///     .notifier("https://hooks.example.com/T000/B000", "#ops")
    ///     .build();
    /// assert!(config.notifier.is_configured());
    /// ```
    pub fn builder(url: impl Into<String>, token: impl Into<String>) -> ConfigBuilder {
        ConfigBuilder::new(url, token)
    }

    /// Load configuration from environment variables
    ///
    /// Recognized variables: `GRAFANA_URL`, `GRAFANA_TOKEN`, `GRAFANA_VERIFY_TLS`,
    /// `GRAFANA_TIMEOUT`, `DEBUG_MODE`, `NOTIFY_WEBHOOK_URL`, `NOTIFY_CHANNEL`,
    /// `NOTIFY_USERNAME`, `STORAGE_ENDPOINT` (or `AWS_ENDPOINT_URL`), `STORAGE_BUCKET`,
    /// `STORAGE_PREFIX`, `STORAGE_REGION` (or `AWS_REGION`), `AWS_ACCESS_KEY_ID`,
    /// `AWS_SECRET_ACCESS_KEY`, `STORAGE_PATH_STYLE`, `BACKUP_DIR`,
    /// `BACKUP_CONTINUE_ON_ERROR`, `BACKUP_PAGE_SIZE`.
    ///
    /// # Errors
    ///
    /// Returns an error if a boolean or numeric variable cannot be parsed.
    pub fn from_env(source: &dyn EnvSource) -> Result<Self> {
        let mut config = Config::default();
        config.apply_env(source)?;
        Ok(config)
    }

    /// Override fields with any environment variables that are set
    ///
    /// # Errors
    ///
    /// Returns an error if a boolean or numeric variable cannot be parsed.
    pub fn apply_env(&mut self, source: &dyn EnvSource) -> Result<()> {
        let get = |name: &str| source.var(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("GRAFANA_URL") {
            self.grafana.url = url;
        }
        if let Some(token) = get("GRAFANA_TOKEN") {
            self.grafana.token = token;
        }
        if let Some(verify) = get("GRAFANA_VERIFY_TLS") {
            self.grafana.verify_tls = parse_bool("GRAFANA_VERIFY_TLS", &verify)?;
        }
        if let Some(timeout) = get("GRAFANA_TIMEOUT") {
            self.grafana.timeout_secs = Some(parse_number("GRAFANA_TIMEOUT", &timeout)?);
        }
        if let Some(debug) = source.var("DEBUG_MODE") {
            // Any non-empty value other than an explicit "off" enables debug output
            self.debug = !debug.trim().is_empty() && parse_bool("DEBUG_MODE", &debug).unwrap_or(true);
        }

        if let Some(endpoint) = get("NOTIFY_WEBHOOK_URL") {
            self.notifier.endpoint = Some(endpoint);
        }
        if let Some(channel) = get("NOTIFY_CHANNEL") {
            self.notifier.channel = Some(channel);
        }
        if let Some(username) = get("NOTIFY_USERNAME") {
            self.notifier.username = username;
        }

        if let Some(endpoint) = get("STORAGE_ENDPOINT").or_else(|| get("AWS_ENDPOINT_URL")) {
            self.storage.endpoint = Some(endpoint);
        }
        if let Some(bucket) = get("STORAGE_BUCKET") {
            self.storage.bucket = Some(bucket);
        }
        if let Some(prefix) = get("STORAGE_PREFIX") {
            self.storage.prefix = prefix;
        }
        if let Some(region) = get("STORAGE_REGION").or_else(|| get("AWS_REGION")) {
            self.storage.region = region;
        }
        if let Some(key) = get("AWS_ACCESS_KEY_ID") {
            self.storage.access_key = Some(key);
        }
        if let Some(secret) = get("AWS_SECRET_ACCESS_KEY") {
            self.storage.secret_key = Some(secret);
        }
        if let Some(flag) = get("STORAGE_PATH_STYLE") {
            self.storage.path_style = parse_bool("STORAGE_PATH_STYLE", &flag)?;
        }

        if let Some(dir) = get("BACKUP_DIR") {
            self.backup.base_dir = PathBuf::from(dir);
        }
        if let Some(flag) = get("BACKUP_CONTINUE_ON_ERROR") {
            self.backup.continue_on_error = parse_bool("BACKUP_CONTINUE_ON_ERROR", &flag)?;
        }
        if let Some(size) = get("BACKUP_PAGE_SIZE") {
            self.backup.page_size = parse_number("BACKUP_PAGE_SIZE", &size)?;
        }

        Ok(())
    }

    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    #[cfg(feature = "toml")]
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = crate::error::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config file '{}': {e}", path.display())))
    }

    /// Check the settings needed to talk to the platform
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> Result<()> {
        let url = self.grafana.url.trim();
        if url.is_empty() {
            return Err(Error::Config("platform URL is not set".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "platform URL '{url}' must start with http:// or https://"
            )));
        }
        if self.backup.page_size == 0 {
            return Err(Error::Config("page size must be greater than zero".into()));
        }
        Ok(())
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{name}: expected a boolean, got '{other}'"))),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{name}: expected a number, got '{value}'")))
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for creating Config with a fluent API
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with the required platform URL and token
    pub fn new(url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            config: Config {
                grafana: GrafanaConfig::new(url, token),
                ..Default::default()
            },
        }
    }

    /// Enable or disable TLS certificate verification
    #[must_use]
    pub fn verify_tls(mut self, verify: bool) -> Self {
        self.config.grafana.verify_tls = verify;
        self
    }

    /// Set a per-request timeout
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.grafana.timeout_secs = Some(timeout.as_secs());
        self
    }

    /// Enable verbose logging
    #[must_use]
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Send run outcomes to a webhook channel
    #[must_use]
    pub fn notifier(mut self, endpoint: impl Into<String>, channel: impl Into<String>) -> Self {
        self.config.notifier.endpoint = Some(endpoint.into());
        self.config.notifier.channel = Some(channel.into());
        self
    }

    /// Override the notification sender identity
    #[must_use]
    pub fn notify_username(mut self, username: impl Into<String>) -> Self {
        self.config.notifier.username = username.into();
        self
    }

    /// Upload archives to `bucket` at `endpoint` (URL or local directory)
    #[must_use]
    pub fn storage(mut self, endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        self.config.storage.endpoint = Some(endpoint.into());
        self.config.storage.bucket = Some(bucket.into());
        self
    }

    /// Sign object storage requests with a static key pair in `region`
    #[must_use]
    pub fn storage_credentials(
        mut self,
        region: impl Into<String>,
        access_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.config.storage.region = region.into();
        self.config.storage.access_key = Some(access_key.into());
        self.config.storage.secret_key = Some(secret_key.into());
        self
    }

    /// Set the destination directory for the tree
    #[must_use]
    pub fn base_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.backup.base_dir = path.into();
        self
    }

    /// Choose between per-item isolation (`true`) and fail-fast (`false`)
    #[must_use]
    pub fn continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.config.backup.continue_on_error = continue_on_error;
        self
    }

    /// Set the dashboard search page size
    #[must_use]
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.config.backup.page_size = page_size;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

// =============================================================================
// Tests
// =============================================================================
