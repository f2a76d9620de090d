//! Blocking HTTP gateway against a live platform instance

use super::ApiGateway;
use crate::catalog::{
    DashboardEnvelope, DashboardSummary, Datasource, DatasourceRef, Document, Folder, Permission,
};
use crate::config::GrafanaConfig;
use crate::error::{Error, Result};
use log::debug;
use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Platform client using bearer-token authentication
///
/// # Example
///
/// ```rust,no_run
/// use grafana_backup::config::GrafanaConfig;
/// use grafana_backup::gateway::{ApiGateway, HttpGateway};
///
/// let gateway = HttpGateway::new(&GrafanaConfig::new("http://grafana:3000", "token")).unwrap();
/// let folders = gateway.list_folders().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct HttpGateway {
    base: Url,
    client: Client,
}

impl HttpGateway {
    /// Build a client from connection settings
    ///
    /// # Errors
    ///
    /// Returns an error if the URL or token is malformed or the TLS backend fails to start.
    pub fn new(config: &GrafanaConfig) -> Result<Self> {
        let mut base = Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("Invalid platform URL '{}': {e}", config.url)))?;
        if base.cannot_be_a_base() {
            return Err(Error::Config(format!(
                "Platform URL '{}' cannot be used as a base",
                config.url
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| Error::Config(format!("Invalid API token: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let mut builder = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!config.verify_tls);
        if let Some(timeout) = config.timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            base,
            client: builder.build()?,
        })
    }

    /// Build `<base>/api/<segments...>` with each segment percent-encoded
    fn api_url<S: AsRef<str>>(&self, segments: &[S]) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("Invalid base URL '{}'", self.base)))?
            .pop_if_empty()
            .push("api")
            .extend(segments);
        Ok(url)
    }

    fn send(&self, method: &Method, url: &Url, body: Option<&Value>) -> Result<Response> {
        debug!("{method} {url}");
        let mut request = self.client.request(method.clone(), url.clone());
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send()?)
    }

    fn expect_success(method: &Method, url: &Url, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response.text().unwrap_or_default();
        Err(Error::Api {
            method: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
            message: message.trim().to_string(),
        })
    }

    /// Issue a request and decode the JSON reply, any non-2xx is an error
    fn call<T: DeserializeOwned>(&self, method: Method, url: Url, body: Option<&Value>) -> Result<T> {
        let response = self.send(&method, &url, body)?;
        let response = Self::expect_success(&method, &url, response)?;
        Ok(response.json()?)
    }

    /// GET a single resource, mapping 404 to `None`
    fn lookup<T: DeserializeOwned>(&self, url: Url) -> Result<Option<T>> {
        let response = self.send(&Method::GET, &url, None)?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!("{url} not found");
            return Ok(None);
        }
        let response = Self::expect_success(&Method::GET, &url, response)?;
        Ok(Some(response.json()?))
    }

    fn datasource_url(&self, reference: &DatasourceRef) -> Result<Url> {
        let mut segments = vec!["datasources".to_string()];
        segments.extend(reference.path_segments());
        self.api_url(&segments)
    }
}

/// Create/update datasource replies wrap the record in `datasource`
fn unwrap_datasource(reply: Value) -> Result<Datasource> {
    let record = match reply {
        Value::Object(mut map) if map.get("datasource").is_some_and(Value::is_object) => {
            map.remove("datasource").unwrap_or_default()
        }
        other => other,
    };
    serde_json::from_value(record).map_err(Error::from)
}

impl ApiGateway for HttpGateway {
    fn endpoint(&self) -> String {
        self.base.to_string()
    }

    fn list_folders(&self) -> Result<Vec<Folder>> {
        self.call(Method::GET, self.api_url(&["folders"])?, None)
    }

    fn get_folder(&self, uid: &str) -> Result<Option<Folder>> {
        self.lookup(self.api_url(&["folders", uid])?)
    }

    fn get_folder_permissions(&self, uid: &str) -> Result<Vec<Permission>> {
        self.call(
            Method::GET,
            self.api_url(&["folders", uid, "permissions"])?,
            None,
        )
    }

    fn update_folder_permissions(&self, uid: &str, permissions: &[Permission]) -> Result<()> {
        let body = json!({ "items": permissions });
        let _: Value = self.call(
            Method::POST,
            self.api_url(&["folders", uid, "permissions"])?,
            Some(&body),
        )?;
        Ok(())
    }

    fn create_folder(&self, body: &Document) -> Result<Folder> {
        let body = Value::Object(body.clone());
        self.call(Method::POST, self.api_url(&["folders"])?, Some(&body))
    }

    fn update_folder(&self, uid: &str, body: &Document) -> Result<Folder> {
        let mut body = body.clone();
        body.insert("overwrite".into(), Value::Bool(true));
        self.call(
            Method::PUT,
            self.api_url(&["folders", uid])?,
            Some(&Value::Object(body)),
        )
    }

    fn delete_folder(&self, uid: &str) -> Result<()> {
        let _: Value = self.call(Method::DELETE, self.api_url(&["folders", uid])?, None)?;
        Ok(())
    }

    fn search_dashboards(
        &self,
        folder_ids: &[i64],
        page: u32,
        limit: u32,
    ) -> Result<Vec<DashboardSummary>> {
        let mut url = self.api_url(&["search"])?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("type", "dash-db")
                .append_pair("limit", &limit.to_string())
                .append_pair("page", &page.to_string());
            for id in folder_ids {
                query.append_pair("folderIds", &id.to_string());
            }
        }
        self.call(Method::GET, url, None)
    }

    fn get_dashboard(&self, uid: &str) -> Result<Option<DashboardEnvelope>> {
        self.lookup(self.api_url(&["dashboards", "uid", uid])?)
    }

    fn save_dashboard(&self, envelope: &DashboardEnvelope, overwrite: bool) -> Result<Document> {
        let mut envelope = envelope.clone();
        envelope.overwrite = Some(overwrite);
        let body = serde_json::to_value(&envelope)?;
        self.call(Method::POST, self.api_url(&["dashboards", "db"])?, Some(&body))
    }

    fn delete_dashboard(&self, uid: &str) -> Result<()> {
        let _: Value = self.call(
            Method::DELETE,
            self.api_url(&["dashboards", "uid", uid])?,
            None,
        )?;
        Ok(())
    }

    fn list_datasources(&self) -> Result<Vec<Datasource>> {
        self.call(Method::GET, self.api_url(&["datasources"])?, None)
    }

    fn get_datasource(&self, reference: &DatasourceRef) -> Result<Option<Datasource>> {
        self.lookup(self.datasource_url(reference)?)
    }

    fn create_datasource(&self, body: &Document) -> Result<Datasource> {
        let body = Value::Object(body.clone());
        let reply: Value = self.call(Method::POST, self.api_url(&["datasources"])?, Some(&body))?;
        unwrap_datasource(reply)
    }

    fn update_datasource(&self, reference: &DatasourceRef, body: &Document) -> Result<Datasource> {
        let body = Value::Object(body.clone());
        let reply: Value = self.call(Method::PUT, self.datasource_url(reference)?, Some(&body))?;
        unwrap_datasource(reply)
    }

    fn delete_datasource(&self, reference: &DatasourceRef) -> Result<()> {
        let _: Value = self.call(Method::DELETE, self.datasource_url(reference)?, None)?;
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::{CannedResponse, TestServer};

    fn gateway(url: &str) -> HttpGateway {
        HttpGateway::new(&GrafanaConfig::new(url, "secret")).unwrap()
    }

    fn document(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_api_url_joins_below_base_path() {
        let gw = gateway("https://example.com/grafana");
        let url = gw.api_url(&["folders", "f1", "permissions"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://example.com/grafana/api/folders/f1/permissions"
        );

        let root = gateway("http://grafana:3000");
        assert_eq!(
            root.api_url(&["folders"]).unwrap().as_str(),
            "http://grafana:3000/api/folders"
        );
    }

    #[test]
    fn test_api_url_encodes_segments() {
        let gw = gateway("http://grafana:3000/");
        let url = gw.api_url(&["dashboards", "uid", "a b/c"]).unwrap();
        assert_eq!(url.as_str(), "http://grafana:3000/api/dashboards/uid/a%20b%2Fc");
    }

    #[test]
    fn test_datasource_url() {
        let gw = gateway("http://grafana:3000");
        assert_eq!(
            gw.datasource_url(&DatasourceRef::Uid("ds1".into()))
                .unwrap()
                .as_str(),
            "http://grafana:3000/api/datasources/uid/ds1"
        );
        assert_eq!(
            gw.datasource_url(&DatasourceRef::Id(9)).unwrap().as_str(),
            "http://grafana:3000/api/datasources/9"
        );
    }

    #[test]
    fn test_invalid_url_is_config_error() {
        let err = HttpGateway::new(&GrafanaConfig::new("not a url", "t")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_unwrap_datasource_reply() {
        let wrapped = json!({
            "datasource": {"id": 9, "uid": "ds1", "name": "loki"},
            "id": 9,
            "message": "Datasource added"
        });
        let ds = unwrap_datasource(wrapped).unwrap();
        assert_eq!(ds.uid.as_deref(), Some("ds1"));

        let bare = json!({"id": 3, "uid": "x", "name": "prom"});
        assert_eq!(unwrap_datasource(bare).unwrap().id, Some(3));
    }

    // =========================================================================
    // Round trips against a local server
    // =========================================================================

    #[test]
    fn test_lookup_maps_404_to_none() {
        let server = TestServer::start(vec![CannedResponse::json(
            404,
            &json!({"message": "folder not found"}),
        )]);

        let folder = gateway(server.url()).get_folder("f1").unwrap();
        assert!(folder.is_none());

        let requests = server.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "GET");
        assert_eq!(requests[0].target, "/api/folders/f1");
        assert_eq!(requests[0].header("authorization"), Some("Bearer secret"));
    }

    #[test]
    fn test_lookup_server_error_is_not_absence() {
        let server = TestServer::start(vec![CannedResponse::new(500, "database is locked")]);

        let err = gateway(server.url()).get_dashboard("d1").unwrap_err();
        match err {
            Error::Api {
                ref method,
                status,
                ref message,
                ..
            } => {
                assert_eq!(method, "GET");
                assert_eq!(status, 500);
                assert_eq!(message, "database is locked");
            }
            other => panic!("expected an API error, got {other:?}"),
        }
    }

    #[test]
    fn test_call_non_success_is_api_error() {
        let server = TestServer::start(vec![CannedResponse::json(
            412,
            &json!({"message": "version-mismatch"}),
        )]);

        let err = gateway(server.url()).list_folders().unwrap_err();
        assert!(matches!(err, Error::Api { status: 412, .. }));
        assert!(err.is_transport());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_search_sends_paging_and_folder_filters() {
        let server = TestServer::start(vec![CannedResponse::json(
            200,
            &json!([{"id": 1, "uid": "d1", "title": "Latency", "folderId": 7, "folderUid": "f1"}]),
        )]);

        let hits = gateway(server.url())
            .search_dashboards(&[7, 9], 2, 50)
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].folder_uid.as_deref(), Some("f1"));

        let requests = server.requests();
        assert_eq!(
            requests[0].target,
            "/api/search?type=dash-db&limit=50&page=2&folderIds=7&folderIds=9"
        );
    }

    #[test]
    fn test_update_folder_forces_overwrite() {
        let server = TestServer::start(vec![CannedResponse::json(
            200,
            &json!({"id": 7, "uid": "f1", "title": "Ops", "version": 4}),
        )]);

        let body = document(json!({"uid": "f1", "title": "Ops", "version": 3}));
        let folder = gateway(server.url()).update_folder("f1", &body).unwrap();
        assert_eq!(folder.id, Some(7));

        let request = &server.requests()[0];
        assert_eq!(request.method, "PUT");
        assert_eq!(request.target, "/api/folders/f1");
        let sent = request.json();
        assert_eq!(sent["overwrite"], true);
        assert_eq!(sent["title"], "Ops");
    }

    #[test]
    fn test_save_dashboard_carries_overwrite_flag() {
        let reply = json!({"id": 11, "uid": "d1", "status": "success", "version": 2});
        let server = TestServer::start(vec![
            CannedResponse::json(200, &reply),
            CannedResponse::json(200, &reply),
        ]);
        let gw = gateway(server.url());

        let mut envelope = DashboardEnvelope::new("d1", "Latency");
        envelope.folder_uid = Some("f1".into());
        gw.save_dashboard(&envelope, true).unwrap();
        gw.save_dashboard(&envelope, false).unwrap();

        let requests = server.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.method == "POST"));
        assert!(requests.iter().all(|r| r.target == "/api/dashboards/db"));

        let first = requests[0].json();
        assert_eq!(first["overwrite"], true);
        assert_eq!(first["folderUid"], "f1");
        assert_eq!(first["dashboard"]["uid"], "d1");
        assert_eq!(requests[1].json()["overwrite"], false);
    }

    #[test]
    fn test_permissions_are_posted_as_items() {
        let server = TestServer::start(vec![CannedResponse::json(
            200,
            &json!({"message": "Folder permissions updated"}),
        )]);

        gateway(server.url())
            .update_folder_permissions("f1", &[Permission::team(3, "Editor")])
            .unwrap();

        let request = &server.requests()[0];
        assert_eq!(request.target, "/api/folders/f1/permissions");
        let sent = request.json();
        assert_eq!(sent["items"][0]["teamId"], 3);
    }
}
