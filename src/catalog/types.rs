//! Folder, dashboard and datasource records
//!
//! Platform payloads evolve independently of this tool, so every record keeps the
//! fields it does not know about in a flattened [`Document`] and writes them back
//! unchanged. Only the identity fields the orchestrators depend on are typed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Ordered JSON object used for opaque payload passthrough
pub type Document = serde_json::Map<String, Value>;

/// Read a string `uid` from a raw payload
pub fn uid_of(doc: &Document) -> Option<&str> {
    doc.get("uid").and_then(Value::as_str).filter(|s| !s.is_empty())
}

// =============================================================================
// Folder
// =============================================================================

/// Folder as returned by the platform
///
/// `id` is only meaningful inside one instance and is used for local path naming;
/// `uid` is the identity that survives export and import.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Folder {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(flatten)]
    pub extra: Document,
}

impl Folder {
    pub fn new(id: i64, uid: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            uid: Some(uid.into()),
            title: Some(title.into()),
            extra: Document::new(),
        }
    }

    /// Title for display, falling back to the uid
    pub fn display_name(&self) -> &str {
        self.title
            .as_deref()
            .or(self.uid.as_deref())
            .unwrap_or_default()
    }
}

/// Who an access-control entry applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionSubject {
    Team(i64),
    User(i64),
    /// Built-in role such as "Viewer" or "Editor"
    Role(String),
    Unknown,
}

/// One entry of a folder's access-control list
///
/// The platform reports `0` for a subject kind that does not apply, so a positive
/// id is what selects the subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Numeric permission level (1 = view, 2 = edit, 4 = admin)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<i64>,

    #[serde(flatten)]
    pub extra: Document,
}

impl Permission {
    /// Grant `role` to a team
    pub fn team(team_id: i64, role: impl Into<String>) -> Self {
        Self {
            team_id: Some(team_id),
            role: Some(role.into()),
            ..Default::default()
        }
    }

    /// Grant `role` to a user
    pub fn user(user_id: i64, role: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id),
            role: Some(role.into()),
            ..Default::default()
        }
    }

    pub fn subject(&self) -> PermissionSubject {
        match (self.team_id, self.user_id, &self.role) {
            (Some(team), _, _) if team > 0 => PermissionSubject::Team(team),
            (_, Some(user), _) if user > 0 => PermissionSubject::User(user),
            (_, _, Some(role)) if !role.is_empty() => PermissionSubject::Role(role.clone()),
            _ => PermissionSubject::Unknown,
        }
    }
}

// =============================================================================
// Dashboard
// =============================================================================

/// Dashboard hit from the search endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    #[serde(default)]
    pub uid: String,

    #[serde(default)]
    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_uid: Option<String>,

    #[serde(flatten)]
    pub extra: Document,
}

impl DashboardSummary {
    /// Folder id the dashboard lives in, if it is not at the root
    pub fn filed_in(&self) -> Option<i64> {
        self.folder_id.filter(|id| *id != 0)
    }

    /// Whether the dashboard belongs to a folder (absent or zero means root)
    pub fn is_filed(&self) -> bool {
        self.filed_in().is_some()
    }
}

/// Inner dashboard model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardBody {
    /// Instance-local numeric id; always serialized so `None` goes out as `null`
    #[serde(default)]
    pub id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,

    #[serde(flatten)]
    pub extra: Document,
}

/// Dashboard as fetched by uid and as posted back for create/update
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardEnvelope {
    pub dashboard: DashboardBody,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Document>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_uid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,

    #[serde(flatten)]
    pub extra: Document,
}

impl DashboardEnvelope {
    pub fn new(uid: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            dashboard: DashboardBody {
                uid: Some(uid.into()),
                title: Some(title.into()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn uid(&self) -> Option<&str> {
        self.dashboard.uid.as_deref().filter(|s| !s.is_empty())
    }

    pub fn version(&self) -> Option<i64> {
        self.dashboard.version
    }
}

// =============================================================================
// Datasource
// =============================================================================

/// Datasource connection configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Datasource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(flatten)]
    pub extra: Document,
}

impl Datasource {
    pub fn new(id: i64, uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Some(id),
            uid: Some(uid.into()),
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.uid.as_deref())
            .unwrap_or_default()
    }
}

/// How a datasource is addressed in lookup, update and delete calls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatasourceRef {
    Uid(String),
    Id(i64),
}

impl DatasourceRef {
    /// URL path segments below `/api/datasources/`
    pub fn path_segments(&self) -> Vec<String> {
        match self {
            DatasourceRef::Uid(uid) => vec!["uid".to_string(), uid.clone()],
            DatasourceRef::Id(id) => vec![id.to_string()],
        }
    }
}

impl fmt::Display for DatasourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasourceRef::Uid(uid) => write!(f, "uid={uid}"),
            DatasourceRef::Id(id) => write!(f, "id={id}"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
