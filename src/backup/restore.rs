//! Restore logic
//!
//! Replays a serialized tree onto a live instance. Every resource is probed by
//! uid first: a hit takes the update branch (always with overwrite), a miss takes
//! the create branch. Running the same restore twice therefore never duplicates
//! anything. The first error ends the invocation.

use super::layout::{ACCESS_FILE, FOLDER_FILE, TreeLayout, dashboard_files, owning_folder_dir};
use super::types::{RestoreAction, RestoreOptions, Restored, TreeRestoreReport};
use crate::catalog::{
    DashboardEnvelope, Datasource, DatasourceRef, Document, Folder, Permission, uid_of,
};
use crate::error::{Error, Result};
use crate::gateway::ApiGateway;
use crate::storage::JsonStorage;
use log::{debug, info};
use serde_json::Value;
use std::path::Path;

/// Restore manager replaying payloads through a gateway
///
/// # Example
///
/// ```rust
/// use grafana_backup::{RestoreManager, RestoreOptions};
/// use grafana_backup::gateway::MemoryGateway;
///
/// let gateway = MemoryGateway::new();
/// let restore = RestoreManager::new(&gateway).with_options(RestoreOptions::new().dry_run(true));
/// assert!(restore.options().dry_run);
/// ```
pub struct RestoreManager<'a, G: ApiGateway + ?Sized> {
    gateway: &'a G,
    storage: JsonStorage,
    options: RestoreOptions,
}

impl<'a, G: ApiGateway + ?Sized> RestoreManager<'a, G> {
    pub fn new(gateway: &'a G) -> Self {
        Self {
            gateway,
            storage: JsonStorage::new(),
            options: RestoreOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: RestoreOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RestoreOptions {
        &self.options
    }

    fn mode(&self) -> &'static str {
        if self.options.dry_run { "[DRY RUN] " } else { "" }
    }

    // -------------------------------------------------------------------------
    // Folder
    // -------------------------------------------------------------------------

    /// Restore a folder directory (`data.json` then `access.json`)
    ///
    /// The permission list is pushed after the folder body on both branches.
    ///
    /// # Errors
    ///
    /// Returns an error if a payload cannot be read, has no uid, or the platform
    /// rejects a call.
    pub fn restore_folder(&self, folder_dir: &Path) -> Result<Restored<Folder>> {
        let data_path = folder_dir.join(FOLDER_FILE);
        let body: Document = self.storage.read(&data_path)?;
        let uid = required_uid(&body, &data_path)?;

        let access_path = folder_dir.join(ACCESS_FILE);
        let permissions: Vec<Permission> = self.storage.read(&access_path)?;

        let action = match self.gateway.get_folder(&uid)? {
            Some(_) => RestoreAction::Updated,
            None => RestoreAction::Created,
        };
        info!("{}Folder '{uid}': {action}", self.mode());

        if self.options.dry_run {
            return Ok(Restored {
                action,
                body: serde_json::from_value(Value::Object(body))?,
                dry_run: true,
            });
        }

        let applied = match action {
            RestoreAction::Updated => self.gateway.update_folder(&uid, &body)?,
            RestoreAction::Created => self.gateway.create_folder(&body)?,
        };

        let target = applied.uid.clone().unwrap_or(uid);
        self.gateway
            .update_folder_permissions(&target, &permissions)?;
        debug!("Pushed {} permissions to folder '{target}'", permissions.len());

        Ok(Restored {
            action,
            body: applied,
            dry_run: false,
        })
    }

    // -------------------------------------------------------------------------
    // Dashboard
    // -------------------------------------------------------------------------

    /// Restore a dashboard file into the folder two directory levels up
    ///
    /// # Errors
    ///
    /// See [`restore_dashboard_in`](Self::restore_dashboard_in).
    pub fn restore_dashboard(&self, dashboard_file: &Path) -> Result<Restored<DashboardEnvelope>> {
        let folder_dir = owning_folder_dir(dashboard_file).ok_or_else(|| {
            Error::RestoreFailed(format!(
                "cannot derive the folder of '{}'",
                dashboard_file.display()
            ))
        })?;
        self.restore_dashboard_in(dashboard_file, &folder_dir)
    }

    /// Restore a dashboard file into the folder serialized in `folder_dir`
    ///
    /// On the create branch the numeric dashboard id is cleared so the platform
    /// assigns a fresh one; the uid from the payload is kept on both branches.
    ///
    /// # Errors
    ///
    /// Returns an error if a payload cannot be read, has no uid, or the platform
    /// rejects a call.
    pub fn restore_dashboard_in(
        &self,
        dashboard_file: &Path,
        folder_dir: &Path,
    ) -> Result<Restored<DashboardEnvelope>> {
        let folder_path = folder_dir.join(FOLDER_FILE);
        let folder: Document = self.storage.read(&folder_path)?;
        let folder_uid = required_uid(&folder, &folder_path)?;

        let mut payload: DashboardEnvelope = self.storage.read(dashboard_file)?;
        let uid = payload
            .uid()
            .map(str::to_string)
            .ok_or_else(|| Error::MissingField {
                path: dashboard_file.to_path_buf(),
                field: "dashboard.uid".into(),
            })?;

        let action = match self.gateway.get_dashboard(&uid)? {
            Some(_) => RestoreAction::Updated,
            None => RestoreAction::Created,
        };
        info!(
            "{}Dashboard '{uid}' in folder '{folder_uid}': {action}",
            self.mode()
        );

        // meta is server-side state and never part of a save request
        payload.meta = None;
        if action == RestoreAction::Created {
            payload.dashboard.id = None;
        }
        payload.folder_uid = Some(folder_uid);

        if self.options.dry_run {
            return Ok(Restored {
                action,
                body: payload,
                dry_run: true,
            });
        }

        let ack = self.gateway.save_dashboard(&payload, true)?;
        if let Some(id) = ack.get("id").and_then(Value::as_i64) {
            payload.dashboard.id = Some(id);
        }
        if let Some(version) = ack.get("version").and_then(Value::as_i64) {
            payload.dashboard.version = Some(version);
        }
        payload.overwrite = Some(true);

        Ok(Restored {
            action,
            body: payload,
            dry_run: false,
        })
    }

    // -------------------------------------------------------------------------
    // Datasource
    // -------------------------------------------------------------------------

    /// Restore a datasource file, addressing the instance copy by uid
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be read, has no uid, or the platform
    /// rejects a call.
    pub fn restore_datasource(&self, datasource_file: &Path) -> Result<Restored<Datasource>> {
        let body: Document = self.storage.read(datasource_file)?;
        let uid = required_uid(&body, datasource_file)?;
        let reference = DatasourceRef::Uid(uid.clone());

        let action = match self.gateway.get_datasource(&reference)? {
            Some(_) => RestoreAction::Updated,
            None => RestoreAction::Created,
        };
        info!("{}Datasource '{uid}': {action}", self.mode());

        if self.options.dry_run {
            return Ok(Restored {
                action,
                body: serde_json::from_value(Value::Object(body))?,
                dry_run: true,
            });
        }

        let applied = match action {
            RestoreAction::Updated => self.gateway.update_datasource(&reference, &body)?,
            RestoreAction::Created => self.gateway.create_datasource(&body)?,
        };
        Ok(Restored {
            action,
            body: applied,
            dry_run: false,
        })
    }

    // -------------------------------------------------------------------------
    // Whole tree
    // -------------------------------------------------------------------------

    /// Restore every folder, then every dashboard, then every datasource under `base`
    ///
    /// # Errors
    ///
    /// Returns [`Error::RestoreFailed`] before touching the platform when a directory
    /// holds dashboards but no folder body. Otherwise returns the first error
    /// encountered; resources restored before it stay applied.
    pub fn restore_tree(&self, base: &Path) -> Result<TreeRestoreReport> {
        info!("{}Restoring tree {}", self.mode(), base.display());
        let layout = TreeLayout::new(base);
        let orphaned = layout.orphaned_dashboard_dirs()?;
        if !orphaned.is_empty() {
            let dirs: Vec<String> = orphaned.iter().map(|d| d.display().to_string()).collect();
            return Err(Error::RestoreFailed(format!(
                "dashboards without a folder {FOLDER_FILE} in {}",
                dirs.join(", ")
            )));
        }
        let folder_dirs = layout.folder_dirs()?;
        let mut report = TreeRestoreReport::default();

        for dir in &folder_dirs {
            let restored = self.restore_folder(dir)?;
            report
                .folders
                .push((restored.body.display_name().to_string(), restored.action));
        }

        for dir in &folder_dirs {
            for file in dashboard_files(dir)? {
                let restored = self.restore_dashboard_in(&file, dir)?;
                let name = restored
                    .body
                    .dashboard
                    .title
                    .clone()
                    .or_else(|| restored.body.uid().map(str::to_string))
                    .unwrap_or_default();
                report.dashboards.push((name, restored.action));
            }
        }

        for file in layout.datasource_files()? {
            let restored = self.restore_datasource(&file)?;
            report
                .datasources
                .push((restored.body.display_name().to_string(), restored.action));
        }

        info!(
            "{}Restore complete: {} created, {} updated",
            self.mode(),
            report.count(RestoreAction::Created),
            report.count(RestoreAction::Updated)
        );
        Ok(report)
    }
}

fn required_uid(body: &Document, path: &Path) -> Result<String> {
    uid_of(body)
        .map(str::to_string)
        .ok_or_else(|| Error::MissingField {
            path: path.to_path_buf(),
            field: "uid".into(),
        })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;
    use serde_json::json;
    use tempfile::tempdir;

    fn write(path: &Path, value: Value) {
        JsonStorage::new().write(path, &value).unwrap();
    }

    fn folder_tree(base: &Path) -> std::path::PathBuf {
        let dir = base.join("7");
        write(&dir.join(FOLDER_FILE), json!({"id": 7, "uid": "f1", "title": "Ops"}));
        write(
            &dir.join(ACCESS_FILE),
            json!([{"teamId": 3, "userId": 0, "role": "Editor", "permission": 2}]),
        );
        dir
    }

    #[test]
    fn test_folder_create_then_update() {
        let temp = tempdir().unwrap();
        let dir = folder_tree(temp.path());
        let gateway = MemoryGateway::new();
        let restore = RestoreManager::new(&gateway);

        let first = restore.restore_folder(&dir).unwrap();
        assert_eq!(first.action, RestoreAction::Created);

        let second = restore.restore_folder(&dir).unwrap();
        assert_eq!(second.action, RestoreAction::Updated);
        assert_eq!(gateway.list_folders().unwrap().len(), 1);

        let calls = gateway.calls();
        assert_eq!(
            calls.iter().filter(|c| c.starts_with("update_folder_permissions")).count(),
            2
        );
    }

    #[test]
    fn test_permissions_pushed_after_body() {
        let temp = tempdir().unwrap();
        let dir = folder_tree(temp.path());
        let gateway = MemoryGateway::new();
        RestoreManager::new(&gateway).restore_folder(&dir).unwrap();

        let calls = gateway.calls();
        let create = calls.iter().position(|c| c == "create_folder:f1").unwrap();
        let perms = calls
            .iter()
            .position(|c| c == "update_folder_permissions:f1")
            .unwrap();
        assert!(create < perms);
        assert_eq!(
            gateway.get_folder_permissions("f1").unwrap(),
            vec![Permission {
                team_id: Some(3),
                user_id: Some(0),
                role: Some("Editor".into()),
                permission: Some(2),
                ..Default::default()
            }]
        );
    }

    #[test]
    fn test_missing_uid_is_fatal() {
        let temp = tempdir().unwrap();
        let dir = temp.path().join("7");
        write(&dir.join(FOLDER_FILE), json!({"title": "Ops"}));
        write(&dir.join(ACCESS_FILE), json!([]));

        let gateway = MemoryGateway::new();
        let err = RestoreManager::new(&gateway).restore_folder(&dir).unwrap_err();
        assert!(matches!(err, Error::MissingField { ref field, .. } if field == "uid"));
        assert!(gateway.calls().is_empty());
    }

    #[test]
    fn test_dashboard_create_clears_id() {
        let temp = tempdir().unwrap();
        let dir = folder_tree(temp.path());
        let file = dir.join("dashboards/d1.json");
        write(
            &file,
            json!({
                "dashboard": {"id": 4242, "uid": "d1", "title": "Latency", "version": 5},
                "meta": {"folderId": 7, "folderUid": "f1"}
            }),
        );

        let gateway = MemoryGateway::new();
        let restore = RestoreManager::new(&gateway);
        restore.restore_folder(&dir).unwrap();

        let restored = restore.restore_dashboard(&file).unwrap();
        assert_eq!(restored.action, RestoreAction::Created);
        assert_ne!(restored.body.dashboard.id, Some(4242));
        assert_eq!(restored.body.folder_uid.as_deref(), Some("f1"));
        assert_eq!(gateway.dashboard_folder("d1").as_deref(), Some("f1"));
    }

    #[test]
    fn test_dashboard_update_branch() {
        let temp = tempdir().unwrap();
        let dir = folder_tree(temp.path());
        let file = dir.join("dashboards/d1.json");
        write(&file, json!({"dashboard": {"id": 1, "uid": "d1", "title": "Latency"}}));

        let gateway = MemoryGateway::new();
        let restore = RestoreManager::new(&gateway);
        restore.restore_folder(&dir).unwrap();
        restore.restore_dashboard(&file).unwrap();

        let again = restore.restore_dashboard(&file).unwrap();
        assert_eq!(again.action, RestoreAction::Updated);
        assert_eq!(again.body.dashboard.version, Some(2));
        assert_eq!(gateway.dashboard_count(), 1);
    }

    #[test]
    fn test_dry_run_does_not_mutate() {
        let temp = tempdir().unwrap();
        let dir = folder_tree(temp.path());
        let ds = temp.path().join("datasources/9.json");
        write(&ds, json!({"id": 9, "uid": "ds1", "name": "loki", "type": "loki"}));

        let gateway = MemoryGateway::new();
        let restore = RestoreManager::new(&gateway).with_options(RestoreOptions::new().dry_run(true));

        let folder = restore.restore_folder(&dir).unwrap();
        assert!(folder.dry_run);
        assert_eq!(folder.action, RestoreAction::Created);
        let datasource = restore.restore_datasource(&ds).unwrap();
        assert_eq!(datasource.body.name.as_deref(), Some("loki"));

        assert_eq!(gateway.calls(), vec!["get_folder:f1", "get_datasource:uid=ds1"]);
        assert!(gateway.list_folders().unwrap().is_empty());
    }

    #[test]
    fn test_datasource_create_then_update() {
        let temp = tempdir().unwrap();
        let ds = temp.path().join("9.json");
        write(&ds, json!({"id": 9, "uid": "ds1", "name": "loki", "type": "loki"}));

        let gateway = MemoryGateway::new();
        let restore = RestoreManager::new(&gateway);
        assert_eq!(restore.restore_datasource(&ds).unwrap().action, RestoreAction::Created);
        assert_eq!(restore.restore_datasource(&ds).unwrap().action, RestoreAction::Updated);
        assert_eq!(gateway.list_datasources().unwrap().len(), 1);
    }

    #[test]
    fn test_dashboard_without_folder_dir() {
        let gateway = MemoryGateway::new();
        let err = RestoreManager::new(&gateway)
            .restore_dashboard(Path::new("d1.json"))
            .unwrap_err();
        assert!(err.is_local_io() || matches!(err, Error::RestoreFailed(_)));
    }

    #[test]
    fn test_tree_with_dashboards_but_no_folder_body_is_rejected() {
        let temp = tempdir().unwrap();
        folder_tree(temp.path());
        write(
            &temp.path().join("8/dashboards/d2.json"),
            json!({"dashboard": {"uid": "d2", "title": "Orphan"}}),
        );

        let gateway = MemoryGateway::new();
        let err = RestoreManager::new(&gateway)
            .restore_tree(temp.path())
            .unwrap_err();

        assert!(matches!(err, Error::RestoreFailed(_)));
        assert!(err.to_string().contains(&temp.path().join("8").display().to_string()));
        assert!(gateway.calls().is_empty());
    }
}
