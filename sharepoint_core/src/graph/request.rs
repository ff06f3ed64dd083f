//! Path and query construction for Graph calls.
//!
//! Builders return a [`GraphRequest`] holding the unencoded path and OData
//! parameters. `Display` renders them as written in Graph docs; [`GraphRequest::url`]
//! produces the percent-encoded wire URL.

use std::fmt;

use serde_json::{json, Value};
use url::Url;

use super::types::{EntityType, ListDriveItemsQuery, ListSitesQuery, SearchQuery};
use crate::error::ConnectorError;

pub const DEFAULT_SEARCH_SIZE: u32 = 25;
pub const DEFAULT_ENTITY_TYPES: [EntityType; 2] = [EntityType::ListItem, EntityType::DriveItem];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl GraphRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn opt_param<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.param(key, v),
            None => self,
        }
    }

    /// Joins the path onto `base` segment by segment and encodes the query.
    pub fn url(&self, base: &Url) -> Result<Url, ConnectorError> {
        let mut url = base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                ConnectorError::Other(format!("Graph base URL cannot carry a path: {}", base))
            })?;
            segments.pop_if_empty();
            segments.extend(self.path.split('/').filter(|s| !s.is_empty()));
        }
        if self.query.is_empty() {
            url.set_query(None);
        } else {
            let encoded = self
                .query
                .iter()
                .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            url.set_query(Some(&encoded));
        }
        Ok(url)
    }
}

impl fmt::Display for GraphRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        for (i, (k, v)) in self.query.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{}{}={}", sep, k, v)?;
        }
        Ok(())
    }
}

pub fn list_sites(q: &ListSitesQuery) -> GraphRequest {
    GraphRequest::new("/sites")
        .opt_param("$search", q.search.as_ref().map(|s| format!("\"{}\"", s)))
        .opt_param("$filter", q.filter.as_ref())
        .opt_param("$top", q.top)
        .opt_param("$orderby", q.order_by.as_ref())
}

pub fn site(site_id: &str) -> GraphRequest {
    GraphRequest::new(format!("/sites/{}", site_id))
}

pub fn subsites(site_id: &str) -> GraphRequest {
    GraphRequest::new(format!("/sites/{}/sites", site_id))
}

pub fn root_site() -> GraphRequest {
    GraphRequest::new("/sites/root")
}

pub fn site_lists(site_id: &str) -> GraphRequest {
    GraphRequest::new(format!("/sites/{}/lists", site_id))
}

pub fn site_list(site_id: &str, list_id: &str) -> GraphRequest {
    GraphRequest::new(format!("/sites/{}/lists/{}", site_id, list_id))
}

pub fn site_drives(site_id: &str) -> GraphRequest {
    GraphRequest::new(format!("/sites/{}/drives", site_id))
}

pub fn site_default_drive(site_id: &str) -> GraphRequest {
    GraphRequest::new(format!("/sites/{}/drive", site_id))
}

pub fn site_drive(site_id: &str, drive_id: &str) -> GraphRequest {
    GraphRequest::new(format!("/sites/{}/drives/{}", site_id, drive_id))
}

/// `/sites/{s}/drives/{d}` for an explicit drive, `/sites/{s}/drive` for the default one.
fn drive_base(site_id: &str, drive_id: Option<&str>) -> String {
    match drive_id {
        Some(d) => format!("/sites/{}/drives/{}", site_id, d),
        None => format!("/sites/{}/drive", site_id),
    }
}

/// Leading and trailing `/` on `path` are dropped, so `/Docs/`, `Docs/` and
/// `Docs` address the same folder and `/` addresses the drive root.
pub fn drive_children(q: &ListDriveItemsQuery) -> GraphRequest {
    let base = drive_base(&q.site_id, q.drive_id.as_deref());
    let folder = q
        .path
        .as_deref()
        .map(|p| p.trim_matches('/'))
        .filter(|p| !p.is_empty());
    let path = match folder {
        Some(p) => format!("{}/root:/{}:/children", base, p),
        None => format!("{}/root/children", base),
    };
    GraphRequest::new(path)
        .opt_param("$filter", q.filter.as_ref())
        .opt_param("$top", q.top)
        .opt_param("$orderby", q.order_by.as_ref())
}

pub fn drive_item(site_id: &str, drive_id: Option<&str>, item_id: &str) -> GraphRequest {
    GraphRequest::new(format!("{}/items/{}", drive_base(site_id, drive_id), item_id))
}

pub fn drive_item_content(site_id: &str, drive_id: Option<&str>, item_id: &str) -> GraphRequest {
    GraphRequest::new(format!(
        "{}/items/{}/content",
        drive_base(site_id, drive_id),
        item_id
    ))
}

pub fn site_pages(site_id: &str, top: Option<u32>) -> GraphRequest {
    GraphRequest::new(format!("/sites/{}/pages", site_id))
        .param("$expand", "canvasLayout")
        .opt_param("$top", top)
}

pub fn site_page(site_id: &str, page_id: &str) -> GraphRequest {
    GraphRequest::new(format!(
        "/sites/{}/pages/{}/microsoft.graph.sitePage",
        site_id, page_id
    ))
    .param("$expand", "canvasLayout")
}

pub fn search() -> GraphRequest {
    GraphRequest::new("/search/query")
}

/// Single-element batch body for `/search/query`.
pub fn search_body(q: &SearchQuery) -> Value {
    let entity_types: Vec<EntityType> = match &q.entity_types {
        Some(types) if !types.is_empty() => types.clone(),
        _ => DEFAULT_ENTITY_TYPES.to_vec(),
    };
    let size = q.top.map(|t| t.get()).unwrap_or(DEFAULT_SEARCH_SIZE);

    let mut request = json!({
        "entityTypes": entity_types,
        "query": { "queryString": q.query },
        "from": 0,
        "size": size,
    });
    if q.site_id.is_some() {
        request["sharePointOneDriveOptions"] = json!({
            "includeContent": "privateContent,sharedContent"
        });
    }
    json!({ "requests": [request] })
}

/// True for MIME types returned to callers as decoded text.
pub fn is_text_mime(mime: Option<&str>) -> bool {
    let Some(mime) = mime else {
        return false;
    };
    let essence = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    essence.starts_with("text/")
        || matches!(
            essence.as_str(),
            "application/json"
                | "application/xml"
                | "application/javascript"
                | "application/typescript"
        )
        || essence.contains("xml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    fn items(site: &str, drive: Option<&str>, path: Option<&str>) -> ListDriveItemsQuery {
        ListDriveItemsQuery {
            site_id: site.to_string(),
            drive_id: drive.map(str::to_string),
            path: path.map(str::to_string),
            ..Default::default()
        }
    }

    #[test]
    fn drive_children_addressing() {
        assert_eq!(
            drive_children(&items("S", None, Some("Docs/Q1"))).to_string(),
            "/sites/S/drive/root:/Docs/Q1:/children"
        );
        assert_eq!(
            drive_children(&items("S", Some("D"), Some("Docs/Q1"))).to_string(),
            "/sites/S/drives/D/root:/Docs/Q1:/children"
        );
        assert_eq!(
            drive_children(&items("S", Some("D"), None)).to_string(),
            "/sites/S/drives/D/root/children"
        );
        assert_eq!(
            drive_children(&items("S", None, None)).to_string(),
            "/sites/S/drive/root/children"
        );
        // an empty path addresses the root
        assert_eq!(
            drive_children(&items("S", None, Some(""))).to_string(),
            "/sites/S/drive/root/children"
        );
    }

    #[test]
    fn drive_children_trims_slashes() {
        for path in ["/Docs/Q1", "Docs/Q1/", "/Docs/Q1/"] {
            assert_eq!(
                drive_children(&items("S", None, Some(path))).to_string(),
                "/sites/S/drive/root:/Docs/Q1:/children"
            );
        }
        assert_eq!(
            drive_children(&items("S", None, Some("/"))).to_string(),
            "/sites/S/drive/root/children"
        );
    }

    #[test]
    fn drive_children_query_order() {
        let mut q = items("S", Some("D"), Some("Docs/Q1"));
        q.top = NonZeroU32::new(10);
        q.filter = Some("x eq 1".into());
        assert_eq!(
            drive_children(&q).to_string(),
            "/sites/S/drives/D/root:/Docs/Q1:/children?$filter=x eq 1&$top=10"
        );

        q.order_by = Some("name".into());
        q.filter = None;
        assert_eq!(
            drive_children(&q).to_string(),
            "/sites/S/drives/D/root:/Docs/Q1:/children?$top=10&$orderby=name"
        );
    }

    #[test]
    fn list_sites_quotes_search_term() {
        let q = ListSitesQuery {
            search: Some("marketing".into()),
            top: NonZeroU32::new(3),
            ..Default::default()
        };
        assert_eq!(list_sites(&q).to_string(), "/sites?$search=\"marketing\"&$top=3");
        assert_eq!(list_sites(&ListSitesQuery::default()).to_string(), "/sites");
    }

    #[test]
    fn wire_url_is_encoded() {
        let base = Url::parse("https://graph.microsoft.com/v1.0").unwrap();
        let mut q = items("contoso.sharepoint.com,1,2", None, Some("Shared Documents/Q1"));
        q.filter = Some("x eq 1".into());
        let url = drive_children(&q).url(&base).unwrap();
        assert_eq!(
            url.as_str(),
            "https://graph.microsoft.com/v1.0/sites/contoso.sharepoint.com,1,2/drive/root:/Shared%20Documents/Q1:/children?$filter=x%20eq%201"
        );

        let trailing = Url::parse("https://graph.microsoft.com/v1.0/").unwrap();
        assert_eq!(
            root_site().url(&trailing).unwrap().as_str(),
            "https://graph.microsoft.com/v1.0/sites/root"
        );
    }

    #[test]
    fn page_paths() {
        assert_eq!(
            site_pages("S", Some(5)).to_string(),
            "/sites/S/pages?$expand=canvasLayout&$top=5"
        );
        assert_eq!(
            site_page("S", "P").to_string(),
            "/sites/S/pages/P/microsoft.graph.sitePage?$expand=canvasLayout"
        );
    }

    #[test]
    fn item_paths_follow_drive_choice() {
        assert_eq!(drive_item("S", None, "I").to_string(), "/sites/S/drive/items/I");
        assert_eq!(
            drive_item_content("S", Some("D"), "I").to_string(),
            "/sites/S/drives/D/items/I/content"
        );
    }

    #[test]
    fn search_defaults() {
        let body = search_body(&SearchQuery {
            query: "budget".into(),
            ..Default::default()
        });
        let request = &body["requests"][0];
        assert_eq!(request["entityTypes"], json!(["listItem", "driveItem"]));
        assert_eq!(request["size"], 25);
        assert_eq!(request["from"], 0);
        assert_eq!(request["query"]["queryString"], "budget");
        assert!(request.get("sharePointOneDriveOptions").is_none());
        assert_eq!(body["requests"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn search_with_site_scope() {
        let body = search_body(&SearchQuery {
            query: "budget".into(),
            site_id: Some("S".into()),
            top: NonZeroU32::new(7),
            entity_types: Some(vec![EntityType::Site]),
        });
        let request = &body["requests"][0];
        assert_eq!(request["entityTypes"], json!(["site"]));
        assert_eq!(request["size"], 7);
        assert_eq!(
            request["sharePointOneDriveOptions"]["includeContent"],
            "privateContent,sharedContent"
        );
    }

    #[test]
    fn mime_classification() {
        for text in [
            "text/plain",
            "text/csv",
            "application/json",
            "application/xml",
            "application/javascript",
            "application/typescript",
            "application/rss+xml",
            "image/svg+xml",
            "text/html; charset=utf-8",
        ] {
            assert!(is_text_mime(Some(text)), "{} should be text", text);
        }
        for binary in ["application/octet-stream", "image/png", "application/pdf"] {
            assert!(!is_text_mime(Some(binary)), "{} should be binary", binary);
        }
        assert!(!is_text_mime(None));
    }
}
