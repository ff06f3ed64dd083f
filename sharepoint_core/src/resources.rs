//! Routing table for `sharepoint://` resource URIs.
//!
//! Each entry pairs an anchored regex with named captures with the route it
//! produces. Site IDs never contain `/`; the folder path in the files route
//! captures everything after `/files/`, so nested folders stay intact.
//!
//! ```rust,ignore
//! use sharepoint_core::resources::{ResourceRouter, ResourceRoute};
//!
//! let router = ResourceRouter::new();
//! let route = router.route("sharepoint://sites/ABC123/files/Documents%2FQ1")?;
//! assert_eq!(
//!     route,
//!     ResourceRoute::SiteFiles { site_id: "ABC123".into(), path: "Documents/Q1".into() }
//! );
//! ```

use regex::{Captures, Regex};

use crate::error::ConnectorError;

pub const SCHEME: &str = "sharepoint://";
pub const SEARCH_PAGE_SIZE: u32 = 20;

/// A parsed resource URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceRoute {
    AllSites,
    RootSite,
    SiteStructure { site_id: String },
    /// `path` is decoded; empty for the drive root.
    SiteFiles { site_id: String, path: String },
    Search { query: String },
}

impl ResourceRoute {
    /// Used in the error text when reading the resource fails.
    pub fn error_label(&self) -> &'static str {
        match self {
            ResourceRoute::AllSites => "accessing SharePoint sites",
            ResourceRoute::RootSite => "accessing root SharePoint site",
            ResourceRoute::SiteStructure { .. } => "accessing site structure",
            ResourceRoute::SiteFiles { .. } => "accessing folder contents",
            ResourceRoute::Search { .. } => "performing search",
        }
    }
}

type Build = fn(&Captures<'_>) -> Result<ResourceRoute, ConnectorError>;

/// One row of the routing table.
pub struct ResourcePattern {
    /// URI or URI template advertised to clients
    pub uri_template: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    /// Whether the URI is concrete (listed) or a template
    pub is_template: bool,
    pattern: Regex,
    build: Build,
}

impl std::fmt::Debug for ResourcePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourcePattern")
            .field("uri_template", &self.uri_template)
            .field("pattern", &self.pattern.as_str())
            .finish()
    }
}

pub struct ResourceRouter {
    patterns: Vec<ResourcePattern>,
}

impl Default for ResourceRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceRouter {
    pub fn new() -> Self {
        Self {
            patterns: build_default_patterns(),
        }
    }

    pub fn patterns(&self) -> &[ResourcePattern] {
        &self.patterns
    }

    /// Parses `uri` into a route, or fails with an invalid-format error.
    pub fn route(&self, uri: &str) -> Result<ResourceRoute, ConnectorError> {
        let uri = uri.trim();
        for p in &self.patterns {
            if let Some(caps) = p.pattern.captures(uri) {
                return (p.build)(&caps);
            }
        }
        Err(ConnectorError::InvalidResourceUri(uri.to_string()))
    }
}

fn capture(caps: &Captures<'_>, name: &str) -> Result<String, ConnectorError> {
    caps.name(name)
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ConnectorError::InvalidResourceUri(format!("missing {}", name)))
}

fn decode(raw: &str) -> Result<String, ConnectorError> {
    urlencoding::decode(raw)
        .map(|s| s.into_owned())
        .map_err(|e| ConnectorError::InvalidResourceUri(format!("{}: {}", raw, e)))
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("resource route pattern must compile")
}

fn build_default_patterns() -> Vec<ResourcePattern> {
    vec![
        ResourcePattern {
            uri_template: "sharepoint://sites/all",
            name: "All SharePoint Sites",
            description: "Complete list of all SharePoint sites you have access to, with their IDs, names, descriptions and URLs. Use the site IDs from this list with other tools and resources.",
            is_template: false,
            pattern: regex(r"^sharepoint://sites/all$"),
            build: |_| Ok(ResourceRoute::AllSites),
        },
        ResourcePattern {
            uri_template: "sharepoint://sites/root",
            name: "Root SharePoint Site",
            description: "Your organization's main SharePoint site (root site), typically the hub for company-wide content.",
            is_template: false,
            pattern: regex(r"^sharepoint://sites/root$"),
            build: |_| Ok(ResourceRoute::RootSite),
        },
        ResourcePattern {
            uri_template: "sharepoint://sites/{siteId}/structure",
            name: "Site Structure",
            description: "Document libraries and lists of a SharePoint site. Replace {siteId} with a site ID from sharepoint://sites/all.",
            is_template: true,
            pattern: regex(r"^sharepoint://sites/(?P<site_id>[^/]+)/structure$"),
            build: |caps| {
                Ok(ResourceRoute::SiteStructure {
                    site_id: capture(caps, "site_id")?,
                })
            },
        },
        ResourcePattern {
            uri_template: "sharepoint://sites/{siteId}/files/{path}",
            name: "Site Files",
            description: "Files and folders in a site's default document library. Use 'root' as {path} for the top level, e.g. sharepoint://sites/contoso.sharepoint.com,abc123/files/Documents/Projects",
            is_template: true,
            pattern: regex(r"^sharepoint://sites/(?P<site_id>[^/]+)/files/(?P<path>.+)$"),
            build: |caps| {
                let raw = capture(caps, "path")?;
                let path = if raw == "root" {
                    String::new()
                } else {
                    decode(&raw)?
                };
                Ok(ResourceRoute::SiteFiles {
                    site_id: capture(caps, "site_id")?,
                    path,
                })
            },
        },
        ResourcePattern {
            uri_template: "sharepoint://search/{query}",
            name: "SharePoint Search",
            description: "Search results across SharePoint content for {query} (URL-encoded), first 20 hits.",
            is_template: true,
            pattern: regex(r"^sharepoint://search/(?P<query>.+)$"),
            build: |caps| {
                Ok(ResourceRoute::Search {
                    query: decode(&capture(caps, "query")?)?,
                })
            },
        },
    ]
}
