//! Archive handling for backup trees
//!
//! - **Creation**: [`create_archive`] - gzip-compressed tar of every file under the base
//!   directory, named after the capture time (`YYYYMMDDHHmm.tgz`)
//! - **Inspection**: [`list_archive`] - member paths of an archive
//! - **Extraction**: [`extract_archive`] - unpack a downloaded archive for restore
//! - **Hashing**: [`calculate_file_hash`] - SHA-256 checksum of the produced file
//!
//! Members are stored relative to the base directory. Files ending in `.tgz` are never
//! bundled, so earlier archives in the same directory stay out of the new one.

use super::layout::{ARCHIVE_EXTENSION, is_archive};
use crate::error::{Error, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use walkdir::WalkDir;

const ARCHIVE_NAME_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year][month][day][hour][minute]");

/// Result of archiving a tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub path: PathBuf,
    pub file_count: usize,
    pub size_bytes: u64,
    pub sha256: String,
}

/// File name of an archive captured at `captured`
///
/// # Errors
///
/// Returns an error if the timestamp cannot be formatted.
pub fn archive_name(captured: OffsetDateTime) -> Result<String> {
    let stamp = captured
        .format(ARCHIVE_NAME_FORMAT)
        .map_err(|e| Error::Archive(format!("cannot format capture time: {e}")))?;
    Ok(format!("{stamp}.{ARCHIVE_EXTENSION}"))
}

/// Archive `base` into `<base>/<now UTC>.tgz`
///
/// # Errors
///
/// See [`create_archive_at`].
pub fn create_archive(base: &Path) -> Result<ArchiveInfo> {
    create_archive_at(base, OffsetDateTime::now_utc())
}

/// Archive `base` into `<base>/<captured>.tgz`
///
/// The archive is streamed into a temporary file next to its destination and
/// renamed into place once complete; on failure the temporary file is removed and
/// the tree is left untouched.
///
/// # Errors
///
/// Returns an error if the tree cannot be walked or read, or the archive cannot be
/// written.
pub fn create_archive_at(base: &Path, captured: OffsetDateTime) -> Result<ArchiveInfo> {
    let path = base.join(archive_name(captured)?);
    info!("🗜️ Archiving {} into {}", base.display(), path.display());

    let members = collect_members(base)?;

    let temp = tempfile::Builder::new()
        .prefix(".archive-")
        .suffix(&format!(".{ARCHIVE_EXTENSION}"))
        .tempfile_in(base)
        .map_err(|e| Error::FileWrite {
            path: base.to_path_buf(),
            source: e,
        })?;

    {
        let encoder = GzEncoder::new(temp.as_file(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for relative in &members {
            let source = base.join(relative);
            builder
                .append_path_with_name(&source, relative)
                .map_err(|e| Error::FileRead {
                    path: source.clone(),
                    source: e,
                })?;
            debug!("➕ {}", relative.display());
        }
        let encoder = builder
            .into_inner()
            .map_err(|e| Error::Archive(format!("cannot finish tar stream: {e}")))?;
        encoder
            .finish()
            .map_err(|e| Error::Archive(format!("cannot finish gzip stream: {e}")))?;
    }

    temp.as_file().sync_all().map_err(|e| Error::FileWrite {
        path: temp.path().to_path_buf(),
        source: e,
    })?;
    temp.persist(&path).map_err(|e| Error::FileWrite {
        path: path.clone(),
        source: e.error,
    })?;

    let (sha256, size_bytes) = calculate_file_hash(&path)?;
    info!(
        "✅ Archive created: {} ({} files, {} bytes)",
        path.display(),
        members.len(),
        size_bytes
    );
    Ok(ArchiveInfo {
        path,
        file_count: members.len(),
        size_bytes,
        sha256,
    })
}

/// Regular files under `base`, relative and sorted, excluding archives
fn collect_members(base: &Path) -> Result<Vec<PathBuf>> {
    let mut members = Vec::new();
    for entry in WalkDir::new(base).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::DirectoryRead {
            path: e.path().map_or_else(|| base.to_path_buf(), Path::to_path_buf),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() || is_archive(entry.path()) {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(base)
            .map_err(|e| Error::Archive(e.to_string()))?;
        members.push(relative.to_path_buf());
    }
    Ok(members)
}

fn open_archive(path: &Path) -> Result<tar::Archive<GzDecoder<File>>> {
    let file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(tar::Archive::new(GzDecoder::new(file)))
}

/// Member paths of an archive, in stored order
///
/// # Errors
///
/// Returns an error if the file is not a readable gzip-compressed tar.
pub fn list_archive(path: &Path) -> Result<Vec<PathBuf>> {
    let mut archive = open_archive(path)?;
    let entries = archive
        .entries()
        .map_err(|e| Error::Archive(format!("{}: {e}", path.display())))?;

    let mut members = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::Archive(format!("{}: {e}", path.display())))?;
        let member = entry
            .path()
            .map_err(|e| Error::Archive(format!("{}: {e}", path.display())))?;
        members.push(member.into_owned());
    }
    Ok(members)
}

/// Unpack an archive into `dest`, creating it if needed
///
/// Members that would escape `dest` are skipped by the tar reader.
///
/// # Errors
///
/// Returns an error if the archive cannot be read or a member cannot be written.
pub fn extract_archive(path: &Path, dest: &Path) -> Result<()> {
    crate::error::create_dir(dest)?;
    let mut archive = open_archive(path)?;
    archive
        .unpack(dest)
        .map_err(|e| Error::Archive(format!("cannot extract {}: {e}", path.display())))?;
    info!("📂 Extracted {} into {}", path.display(), dest.display());
    Ok(())
}

/// Calculate SHA-256 hash of a file, returning the hex digest and the size
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn calculate_file_hash(path: &Path) -> Result<(String, u64)> {
    let mut file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut hasher = Sha256::new();
    let size = std::io::copy(&mut file, &mut hasher).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok((format!("{:x}", hasher.finalize()), size))
}

// =============================================================================
// Tests
// =============================================================================
