//! Resource catalog model
//!
//! In-memory representation of the platform objects that get backed up:
//! - `Folder` and its `Permission` list
//! - `DashboardSummary` (search hit) and `DashboardEnvelope` (full document)
//! - `Datasource`

mod types;

pub use types::{
    DashboardBody, DashboardEnvelope, DashboardSummary, Datasource, DatasourceRef, Document,
    Folder, Permission, PermissionSubject, uid_of,
};
