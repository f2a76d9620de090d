//! Backup creation

use super::layout::TreeLayout;
use super::manifest::Manifest;
use super::types::{
    BackupOptions, BackupReport, ItemFailure, ResourceKind, STAGE_FAILURE_KEY,
};
use crate::catalog::{DashboardSummary, Datasource, Folder};
use crate::error::{Error, Result};
use crate::gateway::ApiGateway;
use crate::storage::JsonStorage;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// State of one backup run: the manifest accumulator and collected failures
struct Run<'o> {
    layout: TreeLayout,
    options: &'o BackupOptions,
    manifest: Manifest,
    failures: Vec<ItemFailure>,
}

impl Run<'_> {
    /// Settle one item's outcome according to the error policy
    ///
    /// Returns `Ok(None)` for a failure that was recorded and skipped.
    fn settle<T>(&mut self, kind: ResourceKind, key: &str, outcome: Result<T>) -> Result<Option<T>> {
        match outcome {
            Ok(value) => Ok(Some(value)),
            Err(error) if self.options.continue_on_error => {
                warn!("⚠️ Skipping {kind} '{key}': {error}");
                self.failures.push(ItemFailure {
                    kind,
                    key: key.to_string(),
                    error,
                });
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }
}

/// Backup manager walking the platform and writing the tree
///
/// Holds the gateway it was constructed with; nothing is read from global state.
pub struct BackupManager<'a, G: ApiGateway + ?Sized> {
    gateway: &'a G,
    storage: JsonStorage,
}

impl<'a, G: ApiGateway + ?Sized> BackupManager<'a, G> {
    /// Create a new backup manager
    pub fn new(gateway: &'a G) -> Self {
        Self {
            gateway,
            storage: JsonStorage::new(),
        }
    }

    /// Back up folders, dashboards and datasources under `base`
    ///
    /// Stages run strictly in that order. The manifest is written once, after the
    /// last stage; a run aborted under fail-fast leaves no `items.txt` behind.
    ///
    /// # Errors
    ///
    /// Returns an error if `base` cannot be created, if the manifest cannot be
    /// written, or (when `continue_on_error` is off) on the first failing item.
    pub fn run(&self, base: &Path, options: &BackupOptions) -> Result<BackupReport> {
        info!("📦 Backing up {} into {}", self.gateway.endpoint(), base.display());
        crate::error::create_dir(base)?;

        let mut run = Run {
            layout: TreeLayout::new(base),
            options,
            manifest: Manifest::new(),
            failures: Vec::new(),
        };

        self.backup_folders(&mut run)?;
        self.backup_dashboards(&mut run)?;
        self.backup_datasources(&mut run)?;

        let manifest_path = run.layout.manifest_file();
        run.manifest.write(&manifest_path)?;

        let report = BackupReport {
            manifest: run.manifest,
            manifest_path,
            failures: run.failures,
        };
        info!("✅ Backup finished: {}", report.summary());
        Ok(report)
    }

    // -------------------------------------------------------------------------
    // Folders
    // -------------------------------------------------------------------------

    fn backup_folders(&self, run: &mut Run<'_>) -> Result<()> {
        let Some(folders) =
            run.settle(ResourceKind::Folder, STAGE_FAILURE_KEY, self.gateway.list_folders())?
        else {
            return Ok(());
        };
        info!("Backing up {} folders", folders.len());

        for folder in &folders {
            let key = folder_key(folder);
            let written = self.write_folder(&run.layout, &key, folder);
            let Some((dir, uid)) = run.settle(ResourceKind::Folder, &key, written)? else {
                continue;
            };
            let permissions = self.write_permissions(&run.layout, &key, &uid);
            if run.settle(ResourceKind::Permissions, &uid, permissions)?.is_some() {
                run.manifest.push(folder.display_name(), dir);
            }
        }
        Ok(())
    }

    fn write_folder(&self, layout: &TreeLayout, key: &str, folder: &Folder) -> Result<(PathBuf, String)> {
        let uid = folder
            .uid
            .clone()
            .filter(|uid| !uid.is_empty())
            .ok_or_else(|| {
                Error::BackupFailed(format!("folder '{}' has no uid", folder.display_name()))
            })?;

        let dir = layout.folder_dir(key);
        crate::error::create_dir(&dir)?;

        let body = self
            .gateway
            .get_folder(&uid)?
            .ok_or_else(|| Error::NotFound {
                kind: ResourceKind::Folder.to_string(),
                key: uid.clone(),
            })?;
        let path = layout.folder_file(key);
        self.storage.write(&path, &body)?;
        debug!("📄 Wrote folder {}", path.display());

        Ok((dir, uid))
    }

    fn write_permissions(&self, layout: &TreeLayout, key: &str, uid: &str) -> Result<()> {
        let permissions = self.gateway.get_folder_permissions(uid)?;
        let path = layout.access_file(key);
        self.storage.write(&path, &permissions)?;
        debug!("📄 Wrote {} permissions to {}", permissions.len(), path.display());
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Dashboards
    // -------------------------------------------------------------------------

    fn backup_dashboards(&self, run: &mut Run<'_>) -> Result<()> {
        // Read the folder ids again from the platform rather than trusting stage one
        let Some(folders) =
            run.settle(ResourceKind::Folder, STAGE_FAILURE_KEY, self.gateway.list_folders())?
        else {
            return Ok(());
        };
        let folder_ids: Vec<i64> = folders.iter().filter_map(|f| f.id).collect();
        if folder_ids.is_empty() {
            info!("No folders, skipping dashboard search");
            return Ok(());
        }

        let limit = run.options.page_size.max(1);
        let mut seen = HashSet::new();
        let mut page = 1;
        loop {
            let search = self.gateway.search_dashboards(&folder_ids, page, limit);
            let Some(hits) = run.settle(ResourceKind::Dashboard, STAGE_FAILURE_KEY, search)? else {
                break;
            };
            let returned = hits.len();
            let mut fresh = 0;

            for hit in hits {
                // Hits without a uid cannot be told apart, each one is reported
                if !hit.uid.is_empty() {
                    if !seen.insert(hit.uid.clone()) {
                        continue;
                    }
                    fresh += 1;
                }
                self.backup_dashboard(run, &hit)?;
            }

            // A short page is the last one; a page of only repeats means paging is ignored
            if returned < limit as usize || fresh == 0 {
                break;
            }
            page += 1;
        }
        info!("Backed up dashboards from {} search pages", page);
        Ok(())
    }

    fn backup_dashboard(&self, run: &mut Run<'_>, hit: &DashboardSummary) -> Result<()> {
        let Some(folder_id) = hit.filed_in() else {
            debug!("⏭️ Skipping unfiled dashboard '{}'", hit.title);
            return Ok(());
        };
        let key = if hit.uid.is_empty() {
            hit.title.clone()
        } else {
            hit.uid.clone()
        };
        let written = self.write_dashboard(&run.layout, folder_id, &hit.uid);
        if let Some(path) = run.settle(ResourceKind::Dashboard, &key, written)? {
            run.manifest.push(hit.title.clone(), path);
        }
        Ok(())
    }

    fn write_dashboard(&self, layout: &TreeLayout, folder_id: i64, uid: &str) -> Result<PathBuf> {
        if uid.is_empty() {
            return Err(Error::BackupFailed(format!(
                "dashboard in folder {folder_id} has no uid"
            )));
        }
        let folder_key = folder_id.to_string();
        crate::error::create_dir(&layout.dashboards_dir(&folder_key))?;

        let envelope = self
            .gateway
            .get_dashboard(uid)?
            .ok_or_else(|| Error::NotFound {
                kind: ResourceKind::Dashboard.to_string(),
                key: uid.to_string(),
            })?;
        let path = layout.dashboard_file(&folder_key, uid);
        self.storage.write(&path, &envelope)?;
        debug!("📄 Wrote dashboard {}", path.display());
        Ok(path)
    }

    // -------------------------------------------------------------------------
    // Datasources
    // -------------------------------------------------------------------------

    fn backup_datasources(&self, run: &mut Run<'_>) -> Result<()> {
        let Some(datasources) = run.settle(
            ResourceKind::Datasource,
            STAGE_FAILURE_KEY,
            self.gateway.list_datasources(),
        )?
        else {
            return Ok(());
        };
        info!("Backing up {} datasources", datasources.len());

        for datasource in &datasources {
            let key = datasource_key(datasource);
            let written = self.write_datasource(&run.layout, &key, datasource);
            if let Some(path) = run.settle(ResourceKind::Datasource, &key, written)? {
                run.manifest.push(datasource.display_name(), path);
            }
        }
        Ok(())
    }

    fn write_datasource(&self, layout: &TreeLayout, key: &str, datasource: &Datasource) -> Result<PathBuf> {
        if key.is_empty() {
            return Err(Error::BackupFailed(format!(
                "datasource '{}' has neither id nor uid",
                datasource.display_name()
            )));
        }
        let path = layout.datasource_file(key);
        self.storage.write(&path, datasource)?;
        debug!("📄 Wrote datasource {}", path.display());
        Ok(path)
    }
}

/// Local directory key of a folder: its numeric id, or its uid if the id is missing
fn folder_key(folder: &Folder) -> String {
    match folder.id {
        Some(id) => id.to_string(),
        None => folder.uid.clone().unwrap_or_default(),
    }
}

fn datasource_key(datasource: &Datasource) -> String {
    match datasource.id {
        Some(id) => id.to_string(),
        None => datasource.uid.clone().unwrap_or_default(),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DashboardEnvelope, Permission};
    use crate::gateway::MemoryGateway;
    use serde_json::Value;
    use tempfile::tempdir;

    fn platform() -> MemoryGateway {
        let gateway = MemoryGateway::new();
        gateway.insert_folder(Folder::new(7, "f1", "Ops"), vec![Permission::team(3, "Editor")]);
        gateway.insert_dashboard(Some("f1"), DashboardEnvelope::new("d1", "Latency"));
        gateway.insert_datasource(Datasource::new(9, "ds1", "loki"));
        gateway
    }

    #[test]
    fn test_run_writes_tree_and_manifest() {
        let dir = tempdir().unwrap();
        let gateway = platform();

        let report = BackupManager::new(&gateway)
            .run(dir.path(), &BackupOptions::default())
            .unwrap();

        assert!(report.is_complete());
        assert_eq!(report.manifest.len(), 3);
        assert!(dir.path().join("7/data.json").is_file());
        assert!(dir.path().join("7/access.json").is_file());
        assert!(dir.path().join("7/dashboards/d1.json").is_file());
        assert!(dir.path().join("datasources/9.json").is_file());

        let names: Vec<&str> = report.manifest.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Ops", "Latency", "loki"]);
    }

    #[test]
    fn test_folders_listed_before_search() {
        let dir = tempdir().unwrap();
        let gateway = platform();
        BackupManager::new(&gateway)
            .run(dir.path(), &BackupOptions::default())
            .unwrap();

        let calls = gateway.calls();
        let position = |call: &str| calls.iter().position(|c| c == call).unwrap();
        assert!(position("get_folder_permissions:f1") < position("search_dashboards:search_dashboards"));
        assert!(position("search_dashboards:search_dashboards") < position("list_datasources:list_datasources"));
        // folder ids are read from the platform twice
        assert_eq!(calls.iter().filter(|c| *c == "list_folders:list_folders").count(), 2);
    }

    #[test]
    fn test_dashboard_file_holds_envelope() {
        let dir = tempdir().unwrap();
        let gateway = platform();
        BackupManager::new(&gateway)
            .run(dir.path(), &BackupOptions::default())
            .unwrap();

        let value: Value = JsonStorage::new()
            .read(&dir.path().join("7/dashboards/d1.json"))
            .unwrap();
        assert_eq!(value["dashboard"]["uid"], "d1");
        assert_eq!(value["meta"]["folderUid"], "f1");
    }

    #[test]
    fn test_pagination_collects_every_page() {
        let dir = tempdir().unwrap();
        let gateway = MemoryGateway::new();
        gateway.insert_folder(Folder::new(1, "f", "F"), vec![]);
        for i in 0..5 {
            gateway.insert_dashboard(Some("f"), DashboardEnvelope::new(format!("d{i}"), format!("D{i}")));
        }

        let report = BackupManager::new(&gateway)
            .run(dir.path(), &BackupOptions::new().page_size(2))
            .unwrap();

        assert_eq!(report.manifest.len(), 6);
        let searches = gateway
            .calls()
            .iter()
            .filter(|c| c.starts_with("search_dashboards"))
            .count();
        assert_eq!(searches, 3);
    }

    #[test]
    fn test_no_folders_skips_search() {
        let dir = tempdir().unwrap();
        let gateway = MemoryGateway::new();
        gateway.insert_datasource(Datasource::new(9, "ds1", "loki"));

        let report = BackupManager::new(&gateway)
            .run(dir.path(), &BackupOptions::default())
            .unwrap();
        assert_eq!(report.manifest.len(), 1);
        assert!(!gateway.calls().iter().any(|c| c.starts_with("search_dashboards")));
    }

    #[test]
    fn test_failed_listing_recorded_as_stage_failure() {
        let dir = tempdir().unwrap();
        let gateway = platform();
        gateway.fail_on("list_datasources");

        let report = BackupManager::new(&gateway)
            .run(dir.path(), &BackupOptions::default())
            .unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind, ResourceKind::Datasource);
        assert_eq!(report.failures[0].key, STAGE_FAILURE_KEY);
        assert_eq!(report.manifest.len(), 2);
    }

    #[test]
    fn test_fail_fast_leaves_no_manifest() {
        let dir = tempdir().unwrap();
        let gateway = platform();
        gateway.fail_on("d1");

        let result = BackupManager::new(&gateway).run(dir.path(), &BackupOptions::new().fail_fast());
        assert!(result.is_err());
        assert!(!dir.path().join("items.txt").exists());
    }

    #[test]
    fn test_every_dashboard_without_uid_is_reported() {
        let dir = tempdir().unwrap();
        let gateway = platform();
        gateway.insert_dashboard(Some("f1"), DashboardEnvelope::new("", "Broken A"));
        gateway.insert_dashboard(Some("f1"), DashboardEnvelope::new("", "Broken B"));

        let report = BackupManager::new(&gateway)
            .run(dir.path(), &BackupOptions::default())
            .unwrap();

        let failed: Vec<&str> = report.failures.iter().map(|f| f.key.as_str()).collect();
        assert_eq!(failed, vec!["Broken A", "Broken B"]);
        assert!(report.failures.iter().all(|f| f.kind == ResourceKind::Dashboard));
        assert!(report.failures.iter().all(|f| matches!(f.error, Error::BackupFailed(_))));
        assert_eq!(report.manifest.len(), 3);
        assert_eq!(report.summary(), "3 items backed up, 2 failed");
    }

    #[test]
    fn test_uidless_hits_do_not_keep_paging_alive() {
        let dir = tempdir().unwrap();
        let gateway = MemoryGateway::new();
        gateway.insert_folder(Folder::new(1, "f", "F"), vec![]);
        gateway.insert_dashboard(Some("f"), DashboardEnvelope::new("", "A"));
        gateway.insert_dashboard(Some("f"), DashboardEnvelope::new("", "B"));

        let report = BackupManager::new(&gateway)
            .run(dir.path(), &BackupOptions::new().page_size(2))
            .unwrap();

        assert_eq!(report.failures.len(), 2);
        let searches = gateway
            .calls()
            .iter()
            .filter(|c| c.starts_with("search_dashboards"))
            .count();
        assert_eq!(searches, 1);
    }

    #[test]
    fn test_folder_key_falls_back_to_uid() {
        let mut folder = Folder::new(7, "f1", "Ops");
        assert_eq!(folder_key(&folder), "7");
        folder.id = None;
        assert_eq!(folder_key(&folder), "f1");
    }
}
