//! Common test utilities for grafana-backup integration tests
//!
//! Provides a seeded in-memory platform and scratch directories.

#![allow(dead_code)]

use grafana_backup::catalog::{DashboardEnvelope, Datasource, Folder, Permission};
use grafana_backup::gateway::MemoryGateway;
use grafana_backup::{BackupManager, BackupOptions, BackupReport};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

// =============================================================================
// Platform Fixtures
// =============================================================================

/// Platform with one folder, one filed dashboard and one datasource
///
/// - folder `{uid: "f1", id: 7, title: "Ops"}` granting team 3 the Editor role
/// - dashboard `{uid: "d1", title: "Latency"}` in folder 7
/// - datasource `{id: 9, uid: "ds1", name: "loki"}`
pub fn scenario_platform() -> MemoryGateway {
    let gateway = MemoryGateway::new();
    seed_scenario(&gateway);
    gateway
}

pub fn seed_scenario(gateway: &MemoryGateway) {
    gateway.insert_folder(Folder::new(7, "f1", "Ops"), vec![Permission::team(3, "Editor")]);

    let mut dashboard = DashboardEnvelope::new("d1", "Latency");
    dashboard.dashboard.extra.insert(
        "panels".into(),
        json!([{"id": 1, "type": "timeseries", "title": "p99"}]),
    );
    gateway.insert_dashboard(Some("f1"), dashboard);

    let mut datasource = Datasource::new(9, "ds1", "loki");
    datasource.kind = Some("loki".into());
    datasource
        .extra
        .insert("url".into(), json!("http://loki:3100"));
    datasource
        .extra
        .insert("jsonData".into(), json!({"maxLines": 1000}));
    gateway.insert_datasource(datasource);
}

// =============================================================================
// Test Fixture
// =============================================================================

/// Scratch backup directory plus a seeded source platform
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub source: MemoryGateway,
}

impl TestFixture {
    /// Create a new fixture seeded with the scenario platform
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        Self {
            temp_dir,
            source: scenario_platform(),
        }
    }

    /// Create a fixture whose platform starts empty
    pub fn empty() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        Self {
            temp_dir,
            source: MemoryGateway::new(),
        }
    }

    /// Backup destination inside the scratch directory
    pub fn base(&self) -> PathBuf {
        self.temp_dir.path().join("backup")
    }

    /// Run a backup of the source platform with default options
    pub fn backup(&self) -> BackupReport {
        BackupManager::new(&self.source)
            .run(&self.base(), &BackupOptions::default())
            .expect("backup failed")
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Read a JSON file from the tree
pub fn read_json(path: &Path) -> Value {
    let content = std::fs::read_to_string(path).expect("Failed to read file");
    serde_json::from_str(&content).expect("Invalid JSON")
}

/// Every regular file under `dir`, relative and sorted
pub fn files_under(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .flatten()
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().strip_prefix(dir).unwrap().to_path_buf())
        .collect();
    files.sort();
    files
}

/// Calls recorded by a gateway that start with `op:`
pub fn calls_to(gateway: &MemoryGateway, op: &str) -> Vec<String> {
    let prefix = format!("{op}:");
    gateway
        .calls()
        .into_iter()
        .filter(|c| c.starts_with(&prefix))
        .collect()
}
