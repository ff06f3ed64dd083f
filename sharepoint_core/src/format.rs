//! Caller-facing views of Graph entities: flat, with readable dates and
//! placeholder strings where Graph omitted a field.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::graph::types::{Drive, DriveItem, IdentitySet, List, SearchResult, Site, SitePage};

pub const UNKNOWN: &str = "Unknown";

/// RFC 3339 timestamps as `YYYY-MM-DD HH:MM:SS UTC`. Missing values become
/// `Unknown`; values that do not parse are passed through.
pub fn display_date(value: Option<&str>) -> String {
    match value {
        None => UNKNOWN.to_string(),
        Some(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(dt) => dt
                .with_timezone(&Utc)
                .format("%Y-%m-%d %H:%M:%S UTC")
                .to_string(),
            Err(_) => raw.to_string(),
        },
    }
}

fn first_non_empty<'a>(candidates: &[Option<&'a str>], fallback: &'a str) -> &'a str {
    candidates
        .iter()
        .flatten()
        .find(|s| !s.is_empty())
        .copied()
        .unwrap_or(fallback)
}

fn person(set: &Option<IdentitySet>) -> String {
    IdentitySet::display_name(set)
        .filter(|n| !n.is_empty())
        .unwrap_or(UNKNOWN)
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub web_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    pub created_date_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified_date_time: Option<String>,
}

impl SiteView {
    fn base(site: &Site, fallback_name: &str) -> Self {
        Self {
            id: site.id.clone(),
            name: first_non_empty(
                &[site.display_name.as_deref(), site.name.as_deref()],
                fallback_name,
            )
            .to_string(),
            description: site.description.clone().unwrap_or_default(),
            web_url: site.web_url.clone(),
            hostname: None,
            created_date_time: display_date(site.created_date_time.as_deref()),
            last_modified_date_time: None,
        }
    }

    fn hostname(site: &Site) -> Option<String> {
        Some(
            site.site_collection
                .as_ref()
                .and_then(|c| c.hostname.clone())
                .unwrap_or_default(),
        )
    }

    /// Site search results.
    pub fn listing(site: &Site) -> Self {
        Self {
            hostname: Self::hostname(site),
            last_modified_date_time: Some(display_date(site.last_modified_date_time.as_deref())),
            ..Self::base(site, "Unnamed Site")
        }
    }

    pub fn subsite(site: &Site) -> Self {
        Self::base(site, "Unnamed Site")
    }

    /// Sites exposed as resources; `fallback_name` differs for the root site.
    pub fn overview(site: &Site, fallback_name: &str) -> Self {
        Self {
            hostname: Self::hostname(site),
            ..Self::base(site, fallback_name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub web_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
    pub template: String,
    pub hidden: bool,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl ListView {
    fn base(list: &List) -> Self {
        let info = list.list.as_ref();
        Self {
            id: list.id.clone(),
            name: first_non_empty(
                &[list.display_name.as_deref(), list.name.as_deref()],
                "Unnamed List",
            )
            .to_string(),
            description: list.description.clone().unwrap_or_default(),
            web_url: list.web_url.clone().unwrap_or_default(),
            created_date_time: None,
            template: info
                .and_then(|i| i.template.clone())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            hidden: info.and_then(|i| i.hidden).unwrap_or(false),
            kind: None,
        }
    }

    pub fn listing(list: &List) -> Self {
        Self {
            created_date_time: Some(display_date(list.created_date_time.as_deref())),
            ..Self::base(list)
        }
    }

    pub fn structure(list: &List) -> Self {
        Self {
            kind: Some("list"),
            ..Self::base(list)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveView {
    pub id: String,
    pub name: String,
    pub description: String,
    pub web_url: String,
    pub drive_type: String,
    pub owner: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
}

impl DriveView {
    fn base(drive: &Drive) -> Self {
        Self {
            id: drive.id.clone(),
            name: first_non_empty(&[drive.name.as_deref()], "Unnamed Drive").to_string(),
            description: drive.description.clone().unwrap_or_default(),
            web_url: drive.web_url.clone().unwrap_or_default(),
            drive_type: drive
                .drive_type
                .clone()
                .unwrap_or_else(|| UNKNOWN.to_string()),
            owner: person(&drive.owner),
            created_date_time: None,
            kind: None,
        }
    }

    pub fn listing(drive: &Drive) -> Self {
        Self {
            created_date_time: Some(display_date(drive.created_date_time.as_deref())),
            ..Self::base(drive)
        }
    }

    pub fn structure(drive: &Drive) -> Self {
        Self {
            kind: Some("drive"),
            ..Self::base(drive)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveItemView {
    pub id: String,
    pub name: String,
    pub web_url: String,
    pub size: u64,
    pub is_folder: bool,
    pub is_file: bool,
    pub mime_type: Option<String>,
    pub child_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_date_time: Option<String>,
    pub last_modified_date_time: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,
    pub last_modified_by: String,
}

impl DriveItemView {
    /// Folder listing resource: no creation details.
    pub fn brief(item: &DriveItem) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            web_url: item.web_url.clone().unwrap_or_default(),
            size: item.size.unwrap_or(0),
            is_folder: item.folder.is_some(),
            is_file: item.file.is_some(),
            mime_type: item.mime_type().map(|m| m.to_string()),
            child_count: item
                .folder
                .as_ref()
                .and_then(|f| f.child_count)
                .filter(|c| *c > 0),
            created_date_time: None,
            last_modified_date_time: display_date(item.last_modified_date_time.as_deref()),
            created_by: None,
            last_modified_by: person(&item.last_modified_by),
        }
    }

    pub fn listing(item: &DriveItem) -> Self {
        Self {
            created_date_time: Some(display_date(item.created_date_time.as_deref())),
            created_by: Some(person(&item.created_by)),
            ..Self::brief(item)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHitView {
    pub id: String,
    pub name: String,
    pub web_url: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_highlighted_summary: Option<String>,
    pub resource_type: String,
}

impl SearchHitView {
    fn base(hit: &SearchResult) -> Self {
        Self {
            id: hit.id.clone().unwrap_or_default(),
            name: first_non_empty(&[hit.name.as_deref(), hit.title.as_deref()], "Unnamed")
                .to_string(),
            web_url: hit.web_url.clone().unwrap_or_default(),
            summary: hit.summary.clone().unwrap_or_default(),
            hit_highlighted_summary: None,
            resource_type: hit
                .resource
                .get("@odata.type")
                .and_then(|t| t.as_str())
                .unwrap_or(UNKNOWN)
                .to_string(),
        }
    }

    pub fn listing(hit: &SearchResult) -> Self {
        Self {
            hit_highlighted_summary: Some(hit.hit_highlighted_summary.clone().unwrap_or_default()),
            ..Self::base(hit)
        }
    }

    pub fn brief(hit: &SearchResult) -> Self {
        Self::base(hit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageView {
    pub id: String,
    pub name: String,
    pub title: String,
    pub description: String,
    pub web_url: String,
    pub page_layout: String,
    pub promotion_kind: String,
    pub created_by: String,
    pub last_modified_date_time: String,
    pub publishing_state: String,
    pub text_content: String,
}

impl PageView {
    pub fn listing(page: &SitePage) -> Self {
        let text_content = page
            .web_part_html()
            .map(html_to_text)
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        Self {
            id: page.id.clone(),
            name: page.name.clone().unwrap_or_default(),
            title: first_non_empty(&[page.title.as_deref()], "Untitled Page").to_string(),
            description: page.description.clone().unwrap_or_default(),
            web_url: page.web_url.clone().unwrap_or_default(),
            page_layout: page
                .page_layout
                .clone()
                .unwrap_or_else(|| UNKNOWN.to_string()),
            promotion_kind: page
                .promotion_kind
                .clone()
                .unwrap_or_else(|| UNKNOWN.to_string()),
            created_by: person(&page.created_by),
            last_modified_date_time: display_date(page.last_modified_date_time.as_deref()),
            publishing_state: page
                .publishing_state
                .as_ref()
                .and_then(|p| p.level.clone())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            text_content,
        }
    }
}

static BLOCK_END: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|h[1-6]|li|tr|blockquote)>").expect("valid regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").expect("valid regex"));

/// Web part HTML reduced to plain text, one line per block element.
pub fn html_to_text(html: &str) -> String {
    let with_breaks = BLOCK_END.replace_all(html, "\n");
    let stripped = TAG.replace_all(&with_breaks, "");
    let decoded = html_escape::decode_html_entities(&stripped);
    decoded
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
