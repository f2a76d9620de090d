//! In-memory platform for testing
//!
//! Models the parts of the platform the orchestrators rely on: numeric id
//! assignment, uid generation, version counters, folder placement, overwrite
//! checks and search pagination. Every call is recorded so tests can assert
//! which branch a restore took, and any key can be made to fail on demand.

use super::ApiGateway;
use crate::catalog::{
    DashboardEnvelope, DashboardSummary, Datasource, DatasourceRef, Document, Folder, Permission,
    uid_of,
};
use crate::error::{Error, Result};
use crate::sync::MutexExt;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct StoredDashboard {
    folder_id: i64,
    envelope: DashboardEnvelope,
}

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    folders: Vec<Folder>,
    permissions: HashMap<String, Vec<Permission>>,
    dashboards: Vec<StoredDashboard>,
    datasources: Vec<Datasource>,
    calls: Vec<String>,
    failing: HashSet<String>,
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn reserve_id(&mut self, id: i64) {
        self.next_id = self.next_id.max(id);
    }

    fn record(&mut self, op: &str, key: &str) -> Result<()> {
        self.calls.push(format!("{op}:{key}"));
        if self.failing.contains(key) {
            return Err(api_error(op, key, 500, "injected failure"));
        }
        Ok(())
    }

    fn folder(&self, uid: &str) -> Option<&Folder> {
        self.folders.iter().find(|f| f.uid.as_deref() == Some(uid))
    }

    fn folder_uid_for(&self, folder_id: i64) -> Option<String> {
        self.folders
            .iter()
            .find(|f| f.id == Some(folder_id))
            .and_then(|f| f.uid.clone())
    }

    fn dashboard_index(&self, uid: &str) -> Option<usize> {
        self.dashboards
            .iter()
            .position(|d| d.envelope.uid() == Some(uid))
    }

    fn datasource_index(&self, reference: &DatasourceRef) -> Option<usize> {
        self.datasources.iter().position(|ds| match reference {
            DatasourceRef::Uid(uid) => ds.uid.as_deref() == Some(uid.as_str()),
            DatasourceRef::Id(id) => ds.id == Some(*id),
        })
    }
}

fn api_error(method: &str, key: &str, status: u16, message: &str) -> Error {
    Error::Api {
        method: method.to_string(),
        url: format!("memory://{key}"),
        status,
        message: message.to_string(),
    }
}

fn from_document<T: serde::de::DeserializeOwned>(body: &Document) -> Result<T> {
    serde_json::from_value(Value::Object(body.clone())).map_err(Error::from)
}

/// In-memory platform (not persisted)
#[derive(Debug, Default)]
pub struct MemoryGateway {
    state: Mutex<State>,
    include_root_in_search: bool,
}

impl MemoryGateway {
    /// Create an empty platform
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return root-level dashboards from every search, whatever the folder filter
    ///
    /// Older platform versions behave this way, which is why backup filters
    /// search hits on their folder reference itself.
    #[must_use]
    pub fn include_root_in_search(mut self, include: bool) -> Self {
        self.include_root_in_search = include;
        self
    }

    /// Seed a folder with a fixed id, bypassing id assignment
    pub fn insert_folder(&self, folder: Folder, permissions: Vec<Permission>) {
        let Ok(mut state) = self.state.lock_recovered() else {
            return;
        };
        if let Some(id) = folder.id {
            state.reserve_id(id);
        }
        if let Some(uid) = folder.uid.clone() {
            state.permissions.insert(uid, permissions);
        }
        state.folders.push(folder);
    }

    /// Seed a dashboard into a folder (or the root when `folder_uid` is `None`)
    pub fn insert_dashboard(&self, folder_uid: Option<&str>, mut envelope: DashboardEnvelope) {
        let Ok(mut state) = self.state.lock_recovered() else {
            return;
        };
        let folder_id = folder_uid
            .and_then(|uid| state.folder(uid))
            .and_then(|f| f.id)
            .unwrap_or(0);
        match envelope.dashboard.id {
            Some(id) => state.reserve_id(id),
            None => envelope.dashboard.id = Some(state.allocate_id()),
        }
        envelope.dashboard.version.get_or_insert(1);
        envelope.folder_uid = None;
        envelope.meta = None;
        state.dashboards.push(StoredDashboard {
            folder_id,
            envelope,
        });
    }

    /// Seed a datasource with a fixed id
    pub fn insert_datasource(&self, datasource: Datasource) {
        let Ok(mut state) = self.state.lock_recovered() else {
            return;
        };
        if let Some(id) = datasource.id {
            state.reserve_id(id);
        }
        state.datasources.push(datasource);
    }

    /// Make every call touching `key` (a uid, `id=N`, or a list operation name) fail
    pub fn fail_on(&self, key: impl Into<String>) {
        if let Ok(mut state) = self.state.lock_recovered() {
            state.failing.insert(key.into());
        }
    }

    /// Calls made so far, formatted as `operation:key`
    pub fn calls(&self) -> Vec<String> {
        self.state
            .lock_recovered()
            .map(|s| s.calls.clone())
            .unwrap_or_default()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        if let Ok(mut state) = self.state.lock_recovered() {
            state.calls.clear();
        }
    }

    /// Number of dashboards stored, root-level ones included
    pub fn dashboard_count(&self) -> usize {
        self.state
            .lock_recovered()
            .map(|s| s.dashboards.len())
            .unwrap_or_default()
    }

    /// Folder uid a dashboard currently lives in
    pub fn dashboard_folder(&self, uid: &str) -> Option<String> {
        let state = self.state.lock_recovered().ok()?;
        let index = state.dashboard_index(uid)?;
        state.folder_uid_for(state.dashboards[index].folder_id)
    }
}

impl ApiGateway for MemoryGateway {
    fn endpoint(&self) -> String {
        "memory://".to_string()
    }

    fn list_folders(&self) -> Result<Vec<Folder>> {
        let mut state = self.state.lock_recovered()?;
        state.record("list_folders", "list_folders")?;
        Ok(state.folders.clone())
    }

    fn get_folder(&self, uid: &str) -> Result<Option<Folder>> {
        let mut state = self.state.lock_recovered()?;
        state.record("get_folder", uid)?;
        Ok(state.folder(uid).cloned())
    }

    fn get_folder_permissions(&self, uid: &str) -> Result<Vec<Permission>> {
        let mut state = self.state.lock_recovered()?;
        state.record("get_folder_permissions", uid)?;
        if state.folder(uid).is_none() {
            return Err(api_error("get_folder_permissions", uid, 404, "folder not found"));
        }
        Ok(state.permissions.get(uid).cloned().unwrap_or_default())
    }

    fn update_folder_permissions(&self, uid: &str, permissions: &[Permission]) -> Result<()> {
        let mut state = self.state.lock_recovered()?;
        state.record("update_folder_permissions", uid)?;
        if state.folder(uid).is_none() {
            return Err(api_error("update_folder_permissions", uid, 404, "folder not found"));
        }
        state.permissions.insert(uid.to_string(), permissions.to_vec());
        Ok(())
    }

    fn create_folder(&self, body: &Document) -> Result<Folder> {
        let mut state = self.state.lock_recovered()?;
        let mut folder: Folder = from_document(body)?;
        let id = state.allocate_id();
        let uid = uid_of(body)
            .map(str::to_string)
            .unwrap_or_else(|| format!("folder-{id}"));
        state.record("create_folder", &uid)?;

        if state.folder(&uid).is_some() {
            return Err(api_error(
                "create_folder",
                &uid,
                409,
                "a folder with the same uid already exists",
            ));
        }

        folder.id = Some(id);
        folder.uid = Some(uid.clone());
        folder.extra.remove("overwrite");
        folder.extra.insert("version".into(), json!(1));
        state.permissions.entry(uid).or_default();
        state.folders.push(folder.clone());
        Ok(folder)
    }

    fn update_folder(&self, uid: &str, body: &Document) -> Result<Folder> {
        let mut state = self.state.lock_recovered()?;
        state.record("update_folder", uid)?;

        let Some(index) = state
            .folders
            .iter()
            .position(|f| f.uid.as_deref() == Some(uid))
        else {
            return Err(api_error("update_folder", uid, 404, "folder not found"));
        };

        let existing = &state.folders[index];
        let version = existing
            .extra
            .get("version")
            .and_then(Value::as_i64)
            .unwrap_or(0);

        let mut folder: Folder = from_document(body)?;
        folder.id = existing.id;
        folder.uid = Some(uid.to_string());
        folder.extra.remove("overwrite");
        folder.extra.insert("version".into(), json!(version + 1));
        state.folders[index] = folder.clone();
        Ok(folder)
    }

    fn delete_folder(&self, uid: &str) -> Result<()> {
        let mut state = self.state.lock_recovered()?;
        state.record("delete_folder", uid)?;

        let Some(folder) = state.folder(uid).cloned() else {
            return Err(api_error("delete_folder", uid, 404, "folder not found"));
        };
        let folder_id = folder.id.unwrap_or_default();
        state.folders.retain(|f| f.uid.as_deref() != Some(uid));
        state.permissions.remove(uid);
        state.dashboards.retain(|d| d.folder_id != folder_id);
        Ok(())
    }

    fn search_dashboards(
        &self,
        folder_ids: &[i64],
        page: u32,
        limit: u32,
    ) -> Result<Vec<DashboardSummary>> {
        let mut state = self.state.lock_recovered()?;
        state.record("search_dashboards", "search_dashboards")?;

        let mut hits: Vec<&StoredDashboard> = state
            .dashboards
            .iter()
            .filter(|d| {
                folder_ids.contains(&d.folder_id)
                    || (self.include_root_in_search && d.folder_id == 0)
            })
            .collect();
        hits.sort_by(|a, b| {
            a.envelope
                .dashboard
                .title
                .cmp(&b.envelope.dashboard.title)
                .then_with(|| a.envelope.uid().cmp(&b.envelope.uid()))
        });

        let skip = (page.max(1) as usize - 1) * limit as usize;
        let summaries = hits
            .into_iter()
            .skip(skip)
            .take(limit as usize)
            .map(|d| {
                let mut extra = Document::new();
                extra.insert("type".into(), json!("dash-db"));
                DashboardSummary {
                    id: d.envelope.dashboard.id,
                    uid: d.envelope.uid().unwrap_or_default().to_string(),
                    title: d.envelope.dashboard.title.clone().unwrap_or_default(),
                    folder_id: (d.folder_id != 0).then_some(d.folder_id),
                    folder_uid: state.folder_uid_for(d.folder_id),
                    extra,
                }
            })
            .collect();
        Ok(summaries)
    }

    fn get_dashboard(&self, uid: &str) -> Result<Option<DashboardEnvelope>> {
        let mut state = self.state.lock_recovered()?;
        state.record("get_dashboard", uid)?;

        let Some(index) = state.dashboard_index(uid) else {
            return Ok(None);
        };
        let stored = &state.dashboards[index];
        let mut envelope = stored.envelope.clone();
        let mut meta = Document::new();
        meta.insert("folderId".into(), json!(stored.folder_id));
        meta.insert(
            "folderUid".into(),
            json!(state.folder_uid_for(stored.folder_id).unwrap_or_default()),
        );
        envelope.meta = Some(meta);
        Ok(Some(envelope))
    }

    fn save_dashboard(&self, envelope: &DashboardEnvelope, overwrite: bool) -> Result<Document> {
        let mut state = self.state.lock_recovered()?;
        let uid = match envelope.uid() {
            Some(uid) => uid.to_string(),
            None => format!("dash-{}", state.next_id + 1),
        };
        state.record("save_dashboard", &uid)?;

        let folder_id = match envelope.folder_uid.as_deref().filter(|s| !s.is_empty()) {
            Some(folder_uid) => match state.folder(folder_uid).and_then(|f| f.id) {
                Some(id) => id,
                None => return Err(api_error("save_dashboard", &uid, 400, "folder not found")),
            },
            None => 0,
        };

        let mut stored = envelope.clone();
        stored.dashboard.uid = Some(uid.clone());
        stored.folder_uid = None;
        stored.overwrite = None;
        stored.meta = None;

        let (id, version) = match state.dashboard_index(&uid) {
            Some(index) => {
                if !overwrite {
                    return Err(api_error(
                        "save_dashboard",
                        &uid,
                        412,
                        "a dashboard with the same uid already exists",
                    ));
                }
                let current = &state.dashboards[index].envelope.dashboard;
                let id = current.id;
                let version = current.version.unwrap_or(0) + 1;
                stored.dashboard.id = id;
                stored.dashboard.version = Some(version);
                state.dashboards[index] = StoredDashboard {
                    folder_id,
                    envelope: stored,
                };
                (id, version)
            }
            None => {
                if let Some(id) = envelope.dashboard.id {
                    if !state.dashboards.iter().any(|d| d.envelope.dashboard.id == Some(id)) {
                        return Err(api_error("save_dashboard", &uid, 404, "dashboard not found"));
                    }
                }
                let id = state.allocate_id();
                stored.dashboard.id = Some(id);
                stored.dashboard.version = Some(1);
                state.dashboards.push(StoredDashboard {
                    folder_id,
                    envelope: stored,
                });
                (Some(id), 1)
            }
        };

        let mut ack = Document::new();
        ack.insert("id".into(), json!(id));
        ack.insert("uid".into(), json!(uid));
        ack.insert("status".into(), json!("success"));
        ack.insert("version".into(), json!(version));
        Ok(ack)
    }

    fn delete_dashboard(&self, uid: &str) -> Result<()> {
        let mut state = self.state.lock_recovered()?;
        state.record("delete_dashboard", uid)?;
        match state.dashboard_index(uid) {
            Some(index) => {
                state.dashboards.remove(index);
                Ok(())
            }
            None => Err(api_error("delete_dashboard", uid, 404, "dashboard not found")),
        }
    }

    fn list_datasources(&self) -> Result<Vec<Datasource>> {
        let mut state = self.state.lock_recovered()?;
        state.record("list_datasources", "list_datasources")?;
        Ok(state.datasources.clone())
    }

    fn get_datasource(&self, reference: &DatasourceRef) -> Result<Option<Datasource>> {
        let mut state = self.state.lock_recovered()?;
        state.record("get_datasource", &reference.to_string())?;
        Ok(state
            .datasource_index(reference)
            .map(|index| state.datasources[index].clone()))
    }

    fn create_datasource(&self, body: &Document) -> Result<Datasource> {
        let mut state = self.state.lock_recovered()?;
        let mut datasource: Datasource = from_document(body)?;
        let id = state.allocate_id();
        let uid = uid_of(body)
            .map(str::to_string)
            .unwrap_or_else(|| format!("ds-{id}"));
        state.record("create_datasource", &uid)?;

        let Some(name) = datasource.name.clone() else {
            return Err(api_error("create_datasource", &uid, 400, "name is required"));
        };
        let taken = state.datasources.iter().any(|ds| {
            ds.name.as_deref() == Some(name.as_str()) || ds.uid.as_deref() == Some(uid.as_str())
        });
        if taken {
            return Err(api_error(
                "create_datasource",
                &uid,
                409,
                "data source with the same name or uid already exists",
            ));
        }

        datasource.id = Some(id);
        datasource.uid = Some(uid);
        state.datasources.push(datasource.clone());
        Ok(datasource)
    }

    fn update_datasource(&self, reference: &DatasourceRef, body: &Document) -> Result<Datasource> {
        let mut state = self.state.lock_recovered()?;
        state.record("update_datasource", &reference.to_string())?;

        let Some(index) = state.datasource_index(reference) else {
            return Err(api_error(
                "update_datasource",
                &reference.to_string(),
                404,
                "data source not found",
            ));
        };

        let existing = &state.datasources[index];
        let mut datasource: Datasource = from_document(body)?;
        datasource.id = existing.id;
        datasource.uid = existing.uid.clone();
        state.datasources[index] = datasource.clone();
        Ok(datasource)
    }

    fn delete_datasource(&self, reference: &DatasourceRef) -> Result<()> {
        let mut state = self.state.lock_recovered()?;
        state.record("delete_datasource", &reference.to_string())?;
        match state.datasource_index(reference) {
            Some(index) => {
                state.datasources.remove(index);
                Ok(())
            }
            None => Err(api_error(
                "delete_datasource",
                &reference.to_string(),
                404,
                "data source not found",
            )),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
