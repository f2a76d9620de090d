//! Remote sync of archives to object storage
//!
//! [`ObjectStore`] is the narrow capability the binary needs: upload an archive,
//! list what a bucket holds, and download one object for restore.
//!
//! - [`S3ObjectStore`] talks to AWS S3 or any S3-compatible service (MinIO, R2, ...)
//! - [`FsObjectStore`] works over a directory whose subdirectories are buckets
//!
//! [`open_store`] picks one from the storage settings.

use crate::config::StorageConfig;
use crate::error::{Error, Result};
use log::{debug, info};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

/// One page of a bucket listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectListing {
    /// More keys matched than were returned
    pub truncated: bool,
    pub keys: Vec<String>,
}

/// Object storage capability
pub trait ObjectStore {
    /// Upload a local file under its file name, returning the object key
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or the bucket rejects it.
    fn upload(&self, local: &Path, bucket: &str) -> Result<String>;

    /// Download an object
    ///
    /// # Errors
    ///
    /// Returns an error if the object does not exist or cannot be read.
    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// List keys starting with `prefix`, sorted, at most `max_items` of them
    ///
    /// # Errors
    ///
    /// Returns an error if the bucket cannot be read.
    fn list(&self, bucket: &str, prefix: &str, max_items: usize) -> Result<ObjectListing>;
}

/// Directory-backed object store
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        let dir = self.root.join(checked_relative(bucket)?);
        if !dir.is_dir() {
            return Err(Error::Storage(format!(
                "bucket '{bucket}' does not exist under {}",
                self.root.display()
            )));
        }
        Ok(dir)
    }
}

/// Reject keys that are empty, absolute or climb out of their bucket
fn checked_relative(key: &str) -> Result<PathBuf> {
    let path = Path::new(key);
    let valid = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(path.to_path_buf())
    } else {
        Err(Error::Storage(format!("invalid object key '{key}'")))
    }
}

impl ObjectStore for FsObjectStore {
    fn upload(&self, local: &Path, bucket: &str) -> Result<String> {
        let dir = self.bucket_dir(bucket)?;
        let key = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Storage(format!("'{}' has no file name", local.display())))?;

        let mut source = std::fs::File::open(local).map_err(|e| Error::FileRead {
            path: local.to_path_buf(),
            source: e,
        })?;
        let mut temp = tempfile::NamedTempFile::new_in(&dir).map_err(|e| Error::FileWrite {
            path: dir.clone(),
            source: e,
        })?;
        std::io::copy(&mut source, &mut temp).map_err(|e| Error::FileWrite {
            path: temp.path().to_path_buf(),
            source: e,
        })?;

        let dest = dir.join(&key);
        temp.persist(&dest).map_err(|e| Error::FileWrite {
            path: dest.clone(),
            source: e.error,
        })?;

        info!("☁️ Uploaded {} to {bucket}/{key}", local.display());
        Ok(key)
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.bucket_dir(bucket)?.join(checked_relative(key)?);
        if !path.is_file() {
            return Err(Error::NotFound {
                kind: "object".into(),
                key: format!("{bucket}/{key}"),
            });
        }
        std::fs::read(&path).map_err(|e| Error::FileRead { path, source: e })
    }

    fn list(&self, bucket: &str, prefix: &str, max_items: usize) -> Result<ObjectListing> {
        let dir = self.bucket_dir(bucket)?;
        let mut keys = Vec::new();

        for entry in WalkDir::new(&dir).min_depth(1) {
            let entry = entry.map_err(|e| Error::DirectoryRead {
                path: e.path().map_or_else(|| dir.clone(), Path::to_path_buf),
                source: e.into(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&dir) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if key.starts_with(prefix) {
                keys.push(key);
            }
        }

        keys.sort();
        let truncated = keys.len() > max_items;
        keys.truncate(max_items);
        debug!("Listed {} keys in {bucket} (truncated: {truncated})", keys.len());
        Ok(ObjectListing { truncated, keys })
    }
}

// =============================================================================
// S3
// =============================================================================

/// S3-compatible object store
///
/// # Example
///
/// ```rust,no_run
/// use grafana_backup::config::StorageConfig;
/// use grafana_backup::remote::{ObjectStore, S3ObjectStore};
///
/// let config = StorageConfig {
///     endpoint: Some("http://minio:9000".into()),
///     access_key: Some("minio".into()),
///     secret_key: Some("minio123".into()),
///     ..Default::default()
/// };
/// let store = S3ObjectStore::from_config(&config).unwrap();
/// let listing = store.list("grafana", "2024", 20).unwrap();
/// ```
#[cfg(feature = "s3")]
#[derive(Clone)]
pub struct S3ObjectStore {
    region: s3::Region,
    credentials: s3::creds::Credentials,
    path_style: bool,
}

#[cfg(feature = "s3")]
impl std::fmt::Debug for S3ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3ObjectStore")
            .field("endpoint", &self.region.endpoint())
            .field("path_style", &self.path_style)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "s3")]
impl S3ObjectStore {
    /// Build a client from the storage section
    ///
    /// A custom endpoint is used as given; without one the AWS endpoint for
    /// `region` is used. Missing keys fall back to the AWS environment and profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the region is unknown or no credentials can be found.
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        let region = match config.endpoint.as_deref().map(str::trim) {
            Some(endpoint) if !endpoint.is_empty() => s3::Region::Custom {
                region: config.region.clone(),
                endpoint: endpoint.trim_end_matches('/').to_string(),
            },
            _ => config
                .region
                .parse()
                .map_err(|e| Error::Config(format!("Invalid region '{}': {e}", config.region)))?,
        };
        let credentials = s3::creds::Credentials::new(
            config.access_key.as_deref(),
            config.secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| Error::Config(format!("Object storage credentials: {e}")))?;

        Ok(Self {
            region,
            credentials,
            path_style: config.path_style,
        })
    }

    fn bucket(&self, name: &str) -> Result<Box<s3::Bucket>> {
        if name.trim().is_empty() {
            return Err(Error::Storage("bucket name is empty".into()));
        }
        let bucket = s3::Bucket::new(name, self.region.clone(), self.credentials.clone())
            .map_err(|e| Error::Storage(format!("bucket '{name}': {e}")))?;
        Ok(if self.path_style {
            bucket.with_path_style()
        } else {
            bucket
        })
    }
}

/// Map a non-2xx reply to an error naming the operation
#[cfg(feature = "s3")]
fn expect_success(operation: &str, bucket: &str, key: &str, status: u16) -> Result<()> {
    match status {
        200..=299 => Ok(()),
        404 => Err(Error::NotFound {
            kind: "object".into(),
            key: format!("{bucket}/{key}"),
        }),
        status => Err(Error::Storage(format!(
            "{operation} {bucket}/{key} failed with status {status}"
        ))),
    }
}

#[cfg(feature = "s3")]
impl ObjectStore for S3ObjectStore {
    fn upload(&self, local: &Path, bucket: &str) -> Result<String> {
        let key = local
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Storage(format!("'{}' has no file name", local.display())))?;
        let content = std::fs::read(local).map_err(|e| Error::FileRead {
            path: local.to_path_buf(),
            source: e,
        })?;

        let response = self
            .bucket(bucket)?
            .put_object(&key, &content)
            .map_err(|e| Error::Storage(format!("upload {bucket}/{key}: {e}")))?;
        expect_success("upload", bucket, &key, response.status_code())?;

        info!("☁️ Uploaded {} to s3://{bucket}/{key}", local.display());
        Ok(key)
    }

    fn get(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let response = self
            .bucket(bucket)?
            .get_object(key)
            .map_err(|e| Error::Storage(format!("download {bucket}/{key}: {e}")))?;
        expect_success("download", bucket, key, response.status_code())?;
        Ok(response.bytes().to_vec())
    }

    fn list(&self, bucket: &str, prefix: &str, max_items: usize) -> Result<ObjectListing> {
        let pages = self
            .bucket(bucket)?
            .list(prefix.to_string(), None)
            .map_err(|e| Error::Storage(format!("list {bucket}/{prefix}: {e}")))?;

        let mut keys: Vec<String> = pages
            .into_iter()
            .flat_map(|page| page.contents)
            .map(|object| object.key)
            .collect();
        keys.sort();
        let truncated = keys.len() > max_items;
        keys.truncate(max_items);
        debug!("Listed {} keys in s3://{bucket} (truncated: {truncated})", keys.len());
        Ok(ObjectListing { truncated, keys })
    }
}

// =============================================================================
// Backend selection
// =============================================================================

/// Open the object store named by the storage settings
///
/// `http://` and `https://` endpoints (and no endpoint at all) select
/// [`S3ObjectStore`]; a `file://` URL or a plain path selects [`FsObjectStore`].
///
/// # Errors
///
/// Returns [`Error::Config`] if the S3 client cannot be built or the crate was
/// built without the `s3` feature and an S3 backend is requested.
pub fn open_store(config: &StorageConfig) -> Result<Box<dyn ObjectStore>> {
    let endpoint = config.endpoint.as_deref().map(str::trim).unwrap_or_default();
    let is_url = endpoint.starts_with("http://") || endpoint.starts_with("https://");

    if !endpoint.is_empty() && !is_url {
        let root = endpoint.strip_prefix("file://").unwrap_or(endpoint);
        debug!("Using directory object store at {root}");
        return Ok(Box::new(FsObjectStore::new(root)));
    }

    #[cfg(feature = "s3")]
    {
        debug!("Using S3 object store in region {}", config.region);
        Ok(Box::new(S3ObjectStore::from_config(config)?))
    }
    #[cfg(not(feature = "s3"))]
    {
        Err(Error::Config(
            "S3 object storage requires the `s3` feature".into(),
        ))
    }
}

/// Download `bucket/key` into `dest_dir`, named after the key's last segment
///
/// # Errors
///
/// Returns an error if the object cannot be fetched or written.
pub fn fetch_object(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    dest_dir: &Path,
) -> Result<PathBuf> {
    let name = key
        .rsplit('/')
        .find(|segment| !segment.is_empty())
        .ok_or_else(|| Error::Storage(format!("invalid object key '{key}'")))?;
    let bytes = store.get(bucket, key)?;

    crate::error::create_dir(dest_dir)?;
    let dest = dest_dir.join(checked_relative(name)?);
    crate::error::write_file(&dest, &bytes)?;
    info!("⬇️ Fetched {bucket}/{key} to {}", dest.display());
    Ok(dest)
}

// =============================================================================
// Tests
// =============================================================================
