//! Platform API gateway
//!
//! The orchestrators talk to the dashboarding platform only through
//! [`ApiGateway`]. Two implementations ship with the crate:
//! - **Http**: blocking HTTP client against a live instance - requires `http` feature
//! - **Memory**: in-process platform model for tests and offline dry runs
//!
//! Single-resource lookups return `Ok(None)` when the platform reports the
//! resource as missing. That outcome drives create-vs-update decisions during
//! restore and is kept apart from transport failures, which are `Err`.

#[cfg(feature = "http")]
mod http;
mod memory;

#[cfg(feature = "http")]
pub use http::HttpGateway;
pub use memory::MemoryGateway;

use crate::catalog::{
    DashboardEnvelope, DashboardSummary, Datasource, DatasourceRef, Document, Folder, Permission,
};
use crate::error::Result;

/// Default number of search hits requested per page
pub const DEFAULT_SEARCH_LIMIT: u32 = 1000;

/// Authenticated request/response capability against the platform
pub trait ApiGateway {
    /// Human readable location of the platform, used in logs
    fn endpoint(&self) -> String;

    // -------------------------------------------------------------------------
    // Folders
    // -------------------------------------------------------------------------

    /// List all folders
    ///
    /// # Errors
    ///
    /// Returns an error if the platform cannot be reached or answers with a failure.
    fn list_folders(&self) -> Result<Vec<Folder>>;

    /// Fetch one folder by uid, `None` if it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error on any failure other than not-found.
    fn get_folder(&self, uid: &str) -> Result<Option<Folder>>;

    /// Fetch a folder's access-control list
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the request.
    fn get_folder_permissions(&self, uid: &str) -> Result<Vec<Permission>>;

    /// Replace a folder's access-control list
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the request.
    fn update_folder_permissions(&self, uid: &str, permissions: &[Permission]) -> Result<()>;

    /// Create a folder from a raw payload
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the payload.
    fn create_folder(&self, body: &Document) -> Result<Folder>;

    /// Update a folder from a raw payload, always with overwrite
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the payload.
    fn update_folder(&self, uid: &str, body: &Document) -> Result<Folder>;

    /// Delete a folder and everything inside it
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the request.
    fn delete_folder(&self, uid: &str) -> Result<()>;

    // -------------------------------------------------------------------------
    // Dashboards
    // -------------------------------------------------------------------------

    /// Search dashboards in the given folders (1-based `page`)
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the request.
    fn search_dashboards(
        &self,
        folder_ids: &[i64],
        page: u32,
        limit: u32,
    ) -> Result<Vec<DashboardSummary>>;

    /// Fetch one dashboard by uid, `None` if it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error on any failure other than not-found.
    fn get_dashboard(&self, uid: &str) -> Result<Option<DashboardEnvelope>>;

    /// Create or update a dashboard, returning the platform acknowledgement
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the payload.
    fn save_dashboard(&self, envelope: &DashboardEnvelope, overwrite: bool) -> Result<Document>;

    /// Delete a dashboard by uid
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the request.
    fn delete_dashboard(&self, uid: &str) -> Result<()>;

    // -------------------------------------------------------------------------
    // Datasources
    // -------------------------------------------------------------------------

    /// List all datasources with their full configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the request.
    fn list_datasources(&self) -> Result<Vec<Datasource>>;

    /// Fetch one datasource, `None` if it does not exist
    ///
    /// # Errors
    ///
    /// Returns an error on any failure other than not-found.
    fn get_datasource(&self, reference: &DatasourceRef) -> Result<Option<Datasource>>;

    /// Create a datasource from a raw payload
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the payload.
    fn create_datasource(&self, body: &Document) -> Result<Datasource>;

    /// Update a datasource from a raw payload
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the payload.
    fn update_datasource(&self, reference: &DatasourceRef, body: &Document) -> Result<Datasource>;

    /// Delete a datasource
    ///
    /// # Errors
    ///
    /// Returns an error if the platform rejects the request.
    fn delete_datasource(&self, reference: &DatasourceRef) -> Result<()>;
}
