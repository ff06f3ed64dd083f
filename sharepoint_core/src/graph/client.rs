use std::sync::Arc;

use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use super::request::{self, is_text_mime, GraphRequest};
use super::types::{
    Collection, Drive, DriveItem, DriveItemContent, List, ListDriveItemsQuery, ListSitesQuery,
    SearchQuery, SearchResult, Site, SitePage,
};
use crate::auth::AuthSession;
use crate::config::Config;
use crate::error::ConnectorError;

const USER_AGENT: &str = concat!("sharepoint-mcp/", env!("CARGO_PKG_VERSION"));

/// Microsoft Graph client. Every call is authorized with a bearer token from
/// the shared [`AuthSession`].
pub struct GraphClient {
    http: reqwest::Client,
    base_url: Url,
    session: Arc<AuthSession>,
}

impl GraphClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        session: Arc<AuthSession>,
    ) -> Result<Self, ConnectorError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            ConnectorError::Other(format!("invalid Graph base URL {}: {}", base_url, e))
        })?;
        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    /// Best-effort sign-in ahead of a call. The outcome is logged, never
    /// returned; the authorized request reports the real failure.
    async fn ensure_authenticated(&self) {
        if self.session.is_authenticated().await {
            return;
        }
        debug!("No signed-in account yet, acquiring a token before calling Graph");
        match self.session.acquire_token().await {
            Ok(credential) => debug!(
                account = %credential.account.home_account_id,
                "Signed in ahead of Graph call"
            ),
            Err(e) => warn!("Sign-in ahead of Graph call failed: {}", e),
        }
    }

    async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ConnectorError> {
        self.ensure_authenticated().await;
        let token = self.session.get_access_token().await?;
        let resp = builder.bearer_auth(token).send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(graph_error(status, &body))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        req: &GraphRequest,
    ) -> Result<T, ConnectorError> {
        let url = req.url(&self.base_url)?;
        debug!("GET {}", req);
        let resp = self.send(self.http.get(url)).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn get_collection<T: DeserializeOwned>(
        &self,
        req: &GraphRequest,
    ) -> Result<Vec<T>, ConnectorError> {
        let page: Collection<T> = self.get_json(req).await?;
        if page.next_link.is_some() {
            debug!("{} has more results than the first page", req);
        }
        Ok(page.value)
    }

    pub async fn list_sites(&self, q: &ListSitesQuery) -> Result<Vec<Site>, ConnectorError> {
        self.get_collection(&request::list_sites(q)).await
    }

    pub async fn get_site(&self, site_id: &str) -> Result<Site, ConnectorError> {
        self.get_json(&request::site(site_id)).await
    }

    pub async fn get_subsites(&self, site_id: &str) -> Result<Vec<Site>, ConnectorError> {
        self.get_collection(&request::subsites(site_id)).await
    }

    pub async fn get_root_site(&self) -> Result<Site, ConnectorError> {
        self.get_json(&request::root_site()).await
    }

    pub async fn list_site_lists(&self, site_id: &str) -> Result<Vec<List>, ConnectorError> {
        self.get_collection(&request::site_lists(site_id)).await
    }

    pub async fn get_site_list(
        &self,
        site_id: &str,
        list_id: &str,
    ) -> Result<List, ConnectorError> {
        self.get_json(&request::site_list(site_id, list_id)).await
    }

    pub async fn list_site_drives(&self, site_id: &str) -> Result<Vec<Drive>, ConnectorError> {
        self.get_collection(&request::site_drives(site_id)).await
    }

    pub async fn get_site_default_drive(&self, site_id: &str) -> Result<Drive, ConnectorError> {
        self.get_json(&request::site_default_drive(site_id)).await
    }

    pub async fn get_site_drive(
        &self,
        site_id: &str,
        drive_id: &str,
    ) -> Result<Drive, ConnectorError> {
        self.get_json(&request::site_drive(site_id, drive_id)).await
    }

    pub async fn list_drive_items(
        &self,
        q: &ListDriveItemsQuery,
    ) -> Result<Vec<DriveItem>, ConnectorError> {
        self.get_collection(&request::drive_children(q)).await
    }

    pub async fn get_drive_item(
        &self,
        site_id: &str,
        drive_id: Option<&str>,
        item_id: &str,
    ) -> Result<DriveItem, ConnectorError> {
        self.get_json(&request::drive_item(site_id, drive_id, item_id)).await
    }

    /// Fetches metadata for the MIME type, then the bytes. Text types come
    /// back decoded, everything else base64 encoded.
    pub async fn get_drive_item_content(
        &self,
        site_id: &str,
        drive_id: Option<&str>,
        item_id: &str,
    ) -> Result<DriveItemContent, ConnectorError> {
        let item = self.get_drive_item(site_id, drive_id, item_id).await?;
        let mime_type = item.mime_type().map(|m| m.to_string());

        let req = request::drive_item_content(site_id, drive_id, item_id);
        let url = req.url(&self.base_url)?;
        debug!("GET {}", req);
        let bytes = self.send(self.http.get(url)).await?.bytes().await?;

        if is_text_mime(mime_type.as_deref()) {
            Ok(DriveItemContent {
                content: String::from_utf8_lossy(&bytes).into_owned(),
                is_base64: false,
                mime_type,
            })
        } else {
            Ok(DriveItemContent {
                content: base64::engine::general_purpose::STANDARD.encode(&bytes),
                is_base64: true,
                mime_type,
            })
        }
    }

    pub async fn search(&self, q: &SearchQuery) -> Result<Vec<SearchResult>, ConnectorError> {
        let req = request::search();
        let url = req.url(&self.base_url)?;
        let body = request::search_body(q);
        debug!("POST {} {}", req, body);
        let resp = self.send(self.http.post(url).json(&body)).await?;
        let v: Value = resp.json().await?;
        Ok(search_hits(&v))
    }

    pub async fn list_site_pages(
        &self,
        site_id: &str,
        top: Option<u32>,
    ) -> Result<Vec<SitePage>, ConnectorError> {
        self.get_collection(&request::site_pages(site_id, top)).await
    }

    pub async fn get_site_page(
        &self,
        site_id: &str,
        page_id: &str,
    ) -> Result<SitePage, ConnectorError> {
        self.get_json(&request::site_page(site_id, page_id)).await
    }
}

pub fn http_client(config: &Config) -> Result<reqwest::Client, ConnectorError> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| ConnectorError::Other(e.to_string()))
}

/// Graph errors carry `{"error": {"code", "message"}}`; anything else is
/// passed through as-is.
fn graph_error(status: reqwest::StatusCode, body: &str) -> ConnectorError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(|m| m.to_string())
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("request failed")
                    .to_string()
            } else {
                body.trim().to_string()
            }
        });
    ConnectorError::Graph {
        status: status.as_u16(),
        message,
    }
}

/// `value[0].hitsContainers[0].hits`, each flattened. Missing levels yield
/// no hits.
pub fn search_hits(response: &Value) -> Vec<SearchResult> {
    let hits = response
        .get("value")
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("hitsContainers"))
        .and_then(|v| v.get(0))
        .and_then(|v| v.get("hits"))
        .and_then(|v| v.as_array());
    let Some(hits) = hits else {
        return Vec::new();
    };

    let text = |v: &Value, key: &str| {
        v.get(key)
            .and_then(|s| s.as_str())
            .map(|s| s.to_string())
    };
    hits.iter()
        .map(|hit| {
            let resource = hit.get("resource").cloned().unwrap_or(Value::Null);
            SearchResult {
                id: text(hit, "hitId"),
                web_url: text(&resource, "webUrl"),
                name: text(&resource, "name"),
                title: text(&resource, "title").or_else(|| {
                    resource
                        .pointer("/fields/title")
                        .and_then(|t| t.as_str())
                        .map(|t| t.to_string())
                }),
                summary: text(hit, "summary"),
                hit_highlighted_summary: text(hit, "hitHighlightedSummary"),
                resource,
            }
        })
        .collect()
}
