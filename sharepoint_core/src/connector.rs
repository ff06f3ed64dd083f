use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use rmcp::model::*;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::error::ConnectorError;
use crate::format::{DriveItemView, DriveView, ListView, PageView, SearchHitView, SiteView};
use crate::graph::types::{
    DriveItemContent, DriveItemRef, ListDriveItemsQuery, ListSitePagesQuery, ListSitesQuery,
    NoParams, SearchQuery, SiteDriveRef, SiteListRef, SitePageRef, SiteRef,
};
use crate::graph::GraphClient;
use crate::prompts;
use crate::resources::{ResourceRoute, ResourceRouter, SEARCH_PAGE_SIZE};
use crate::utils::{error_result, error_text, json_text_result, resource_text, text_result};
use crate::Connector;

pub const SERVER_NAME: &str = "sharepoint-mcp";

const INSTRUCTIONS: &str = "Read-only access to SharePoint Online through Microsoft Graph. \
Start with listSharePointSites or the sharepoint://sites/all resource to find site IDs, \
then browse lists, document libraries and files, or use searchSharePoint.";

const REFRESHED: &str = "Authentication token successfully refreshed with updated permissions. \
You can now access SharePoint with the new scopes.";

const RESOURCE_READ_LABEL: &str = "reading SharePoint resource";

/// What a tool handler hands back to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Serialized as indented JSON
    Json(Value),
    /// Returned verbatim
    Text(String),
}

impl ToolOutput {
    fn json<T: serde::Serialize>(data: &T) -> Result<Self, ConnectorError> {
        Ok(ToolOutput::Json(serde_json::to_value(data)?))
    }
}

pub type ToolFuture<'a> = BoxFuture<'a, Result<ToolOutput, ConnectorError>>;
type Handler = for<'a> fn(&'a GraphClient, Value) -> ToolFuture<'a>;

/// One row of the tool table.
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Operation named in `Error <label>: ...` when the handler fails
    pub error_label: &'static str,
    schema: fn() -> JsonObject,
    handler: Handler,
}

impl ToolSpec {
    pub fn to_tool(&self) -> Tool {
        Tool {
            name: Cow::Borrowed(self.name),
            title: None,
            description: Some(Cow::Borrowed(self.description)),
            input_schema: Arc::new((self.schema)()),
            output_schema: None,
            annotations: None,
            icons: None,
        }
    }
}

fn input_schema<T: JsonSchema>() -> JsonObject {
    match serde_json::to_value(schemars::schema_for!(T)) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut map = JsonObject::new();
            map.insert("type".to_string(), Value::String("object".to_string()));
            map
        }
    }
}

fn parse<T: DeserializeOwned>(args: Value) -> Result<T, ConnectorError> {
    serde_json::from_value(args).map_err(|e| ConnectorError::InvalidParams(e.to_string()))
}

fn non_empty(field: &str, value: &str) -> Result<(), ConnectorError> {
    if value.trim().is_empty() {
        return Err(ConnectorError::InvalidParams(format!(
            "'{}' must not be empty",
            field
        )));
    }
    Ok(())
}

pub fn tool_table() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: "refreshAuthToken",
            description: "Refreshes the authentication token to get updated SharePoint permissions. Use this if you get permission errors after updating your Azure AD app registration.",
            error_label: "refreshing authentication token",
            schema: input_schema::<NoParams>,
            handler: refresh_auth_token,
        },
        ToolSpec {
            name: "listSharePointSites",
            description: "Lists all SharePoint sites accessible to the user. Use optional 'search' parameter to filter by name, or 'top' to limit results. This is your starting point for discovering what SharePoint content is available.",
            error_label: "listing SharePoint sites",
            schema: input_schema::<ListSitesQuery>,
            handler: list_sites,
        },
        ToolSpec {
            name: "getSharePointSite",
            description: "Gets details of a specific SharePoint site",
            error_label: "getting SharePoint site",
            schema: input_schema::<SiteRef>,
            handler: get_site,
        },
        ToolSpec {
            name: "getSharePointSubsites",
            description: "Gets subsites of a SharePoint site",
            error_label: "getting SharePoint subsites",
            schema: input_schema::<SiteRef>,
            handler: get_subsites,
        },
        ToolSpec {
            name: "getRootSharePointSite",
            description: "Gets the organization's root SharePoint site",
            error_label: "getting root SharePoint site",
            schema: input_schema::<NoParams>,
            handler: get_root_site,
        },
        ToolSpec {
            name: "listSiteLists",
            description: "Lists all lists in a SharePoint site",
            error_label: "listing site lists",
            schema: input_schema::<SiteRef>,
            handler: list_site_lists,
        },
        ToolSpec {
            name: "getSiteList",
            description: "Gets details of a specific list in a SharePoint site",
            error_label: "getting site list",
            schema: input_schema::<SiteListRef>,
            handler: get_site_list,
        },
        ToolSpec {
            name: "listSiteDrives",
            description: "Lists all drives (document libraries) in a SharePoint site",
            error_label: "listing site drives",
            schema: input_schema::<SiteRef>,
            handler: list_site_drives,
        },
        ToolSpec {
            name: "getSiteDefaultDrive",
            description: "Gets the default drive (document library) of a SharePoint site",
            error_label: "getting site default drive",
            schema: input_schema::<SiteRef>,
            handler: get_site_default_drive,
        },
        ToolSpec {
            name: "getSiteDrive",
            description: "Gets a specific drive (document library) of a SharePoint site by its ID",
            error_label: "getting site drive",
            schema: input_schema::<SiteDriveRef>,
            handler: get_site_drive,
        },
        ToolSpec {
            name: "listDriveItems",
            description: "Lists files and folders in a SharePoint drive or folder. Requires siteId. Use 'path' parameter to navigate to specific folders (e.g., 'Documents/Projects'). Returns file metadata including IDs needed for downloading content.",
            error_label: "listing drive items",
            schema: input_schema::<ListDriveItemsQuery>,
            handler: list_drive_items,
        },
        ToolSpec {
            name: "getDriveItem",
            description: "Gets details of a specific file or folder in a SharePoint drive",
            error_label: "getting drive item",
            schema: input_schema::<DriveItemRef>,
            handler: get_drive_item,
        },
        ToolSpec {
            name: "getDriveItemContent",
            description: "Downloads the actual content of a file from SharePoint. Returns text files as UTF-8 text, binary files as base64. Use this after finding the file with listDriveItems. Requires siteId and itemId.",
            error_label: "getting drive item content",
            schema: input_schema::<DriveItemRef>,
            handler: get_drive_item_content,
        },
        ToolSpec {
            name: "searchSharePoint",
            description: "Searches across all SharePoint content including files, documents, lists, and sites. Use natural language queries (e.g., 'budget 2024', 'project proposal'). Optional: limit to specific site with 'siteId', filter by content types with 'entityTypes'.",
            error_label: "searching SharePoint",
            schema: input_schema::<SearchQuery>,
            handler: search_sharepoint,
        },
        ToolSpec {
            name: "listSitePages",
            description: "Lists the modern pages of a SharePoint site with their text content extracted from the page layout.",
            error_label: "listing site pages",
            schema: input_schema::<ListSitePagesQuery>,
            handler: list_site_pages,
        },
        ToolSpec {
            name: "getSitePage",
            description: "Gets a specific SharePoint site page including its canvas layout and web parts",
            error_label: "getting site page",
            schema: input_schema::<SitePageRef>,
            handler: get_site_page,
        },
    ]
}

// --- Handlers ---

fn refresh_auth_token(graph: &GraphClient, args: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let _: NoParams = parse(args)?;
        graph.session().refresh().await?;
        info!("Access token refreshed on request");
        Ok(ToolOutput::Text(REFRESHED.to_string()))
    })
}

fn list_sites(graph: &GraphClient, args: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let q: ListSitesQuery = parse(args)?;
        let sites = graph.list_sites(&q).await?;
        ToolOutput::json(&sites.iter().map(SiteView::listing).collect::<Vec<_>>())
    })
}

fn get_site(graph: &GraphClient, args: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let r: SiteRef = parse(args)?;
        non_empty("siteId", &r.site_id)?;
        ToolOutput::json(&graph.get_site(&r.site_id).await?)
    })
}

fn get_subsites(graph: &GraphClient, args: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let r: SiteRef = parse(args)?;
        non_empty("siteId", &r.site_id)?;
        let sites = graph.get_subsites(&r.site_id).await?;
        ToolOutput::json(&sites.iter().map(SiteView::subsite).collect::<Vec<_>>())
    })
}

fn get_root_site(graph: &GraphClient, args: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let _: NoParams = parse(args)?;
        ToolOutput::json(&graph.get_root_site().await?)
    })
}

fn list_site_lists(graph: &GraphClient, args: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let r: SiteRef = parse(args)?;
        non_empty("siteId", &r.site_id)?;
        let lists = graph.list_site_lists(&r.site_id).await?;
        ToolOutput::json(&lists.iter().map(ListView::listing).collect::<Vec<_>>())
    })
}

fn get_site_list(graph: &GraphClient, args: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let r: SiteListRef = parse(args)?;
        non_empty("siteId", &r.site_id)?;
        non_empty("listId", &r.list_id)?;
        ToolOutput::json(&graph.get_site_list(&r.site_id, &r.list_id).await?)
    })
}

fn list_site_drives(graph: &GraphClient, args: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let r: SiteRef = parse(args)?;
        non_empty("siteId", &r.site_id)?;
        let drives = graph.list_site_drives(&r.site_id).await?;
        ToolOutput::json(&drives.iter().map(DriveView::listing).collect::<Vec<_>>())
    })
}

fn get_site_default_drive(graph: &GraphClient, args: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let r: SiteRef = parse(args)?;
        non_empty("siteId", &r.site_id)?;
        ToolOutput::json(&graph.get_site_default_drive(&r.site_id).await?)
    })
}

fn get_site_drive(graph: &GraphClient, args: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let r: SiteDriveRef = parse(args)?;
        non_empty("siteId", &r.site_id)?;
        non_empty("driveId", &r.drive_id)?;
        ToolOutput::json(&graph.get_site_drive(&r.site_id, &r.drive_id).await?)
    })
}

fn list_drive_items(graph: &GraphClient, args: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let q: ListDriveItemsQuery = parse(args)?;
        non_empty("siteId", &q.site_id)?;
        let items = graph.list_drive_items(&q).await?;
        ToolOutput::json(&items.iter().map(DriveItemView::listing).collect::<Vec<_>>())
    })
}

fn get_drive_item(graph: &GraphClient, args: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let r: DriveItemRef = parse(args)?;
        non_empty("siteId", &r.site_id)?;
        non_empty("itemId", &r.item_id)?;
        let item = graph
            .get_drive_item(&r.site_id, r.drive_id.as_deref(), &r.item_id)
            .await?;
        ToolOutput::json(&item)
    })
}

fn get_drive_item_content(graph: &GraphClient, args: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let r: DriveItemRef = parse(args)?;
        non_empty("siteId", &r.site_id)?;
        non_empty("itemId", &r.item_id)?;
        let content = graph
            .get_drive_item_content(&r.site_id, r.drive_id.as_deref(), &r.item_id)
            .await?;
        Ok(ToolOutput::Text(describe_content(&content)))
    })
}

fn search_sharepoint(graph: &GraphClient, args: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let q: SearchQuery = parse(args)?;
        non_empty("query", &q.query)?;
        let hits = graph.search(&q).await?;
        ToolOutput::json(&hits.iter().map(SearchHitView::listing).collect::<Vec<_>>())
    })
}

fn list_site_pages(graph: &GraphClient, args: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let q: ListSitePagesQuery = parse(args)?;
        non_empty("siteId", &q.site_id)?;
        let pages = graph
            .list_site_pages(&q.site_id, q.top.map(|t| t.get()))
            .await?;
        ToolOutput::json(&pages.iter().map(PageView::listing).collect::<Vec<_>>())
    })
}

fn get_site_page(graph: &GraphClient, args: Value) -> ToolFuture<'_> {
    Box::pin(async move {
        let r: SitePageRef = parse(args)?;
        non_empty("siteId", &r.site_id)?;
        non_empty("pageId", &r.page_id)?;
        ToolOutput::json(&graph.get_site_page(&r.site_id, &r.page_id).await?)
    })
}

/// Banner plus body for downloaded file content.
pub fn describe_content(content: &DriveItemContent) -> String {
    let mime = content.mime_type.as_deref().unwrap_or("unknown");
    if content.is_base64 {
        format!(
            "Binary file content (base64 encoded, {} bytes, MIME: {})\n\n{}",
            decoded_len(&content.content),
            mime,
            content.content
        )
    } else {
        format!("Text file content (MIME: {}):\n\n{}", mime, content.content)
    }
}

fn decoded_len(b64: &str) -> usize {
    let padding = b64.bytes().rev().take_while(|b| *b == b'=').count();
    (b64.len() / 4) * 3 - padding.min(2)
}

/// SharePoint over Microsoft Graph, exposed as MCP tools, resources and a
/// prompt.
pub struct SharePointConnector {
    graph: Arc<GraphClient>,
    tools: Vec<ToolSpec>,
    router: ResourceRouter,
}

impl SharePointConnector {
    pub fn new(graph: Arc<GraphClient>) -> Self {
        Self {
            graph,
            tools: tool_table(),
            router: ResourceRouter::new(),
        }
    }

    pub fn tools(&self) -> &[ToolSpec] {
        &self.tools
    }

    /// Runs the named tool. Handler failures come back as error envelopes;
    /// only an unknown tool name is an `Err`.
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<CallToolResult, ConnectorError> {
        let spec = self
            .tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| ConnectorError::ToolNotFound(name.to_string()))?;
        let args = Value::Object(arguments.unwrap_or_default());

        debug!(tool = spec.name, "Calling tool");
        let output = (spec.handler)(self.graph.as_ref(), args).await;
        let rendered = output.and_then(|out| match out {
            ToolOutput::Json(v) => json_text_result(&v),
            ToolOutput::Text(t) => Ok(text_result(t)),
        });

        match rendered {
            Ok(result) => Ok(result),
            Err(e) => {
                warn!(tool = spec.name, error = %e, "Tool call failed");
                Ok(error_result(spec.error_label, &e))
            }
        }
    }

    /// Reads `uri`. Every failure, including a URI that matches no route,
    /// becomes a `text/plain` error content rather than an `Err`.
    pub async fn read(&self, uri: &str) -> Vec<ResourceContents> {
        let route = match self.router.route(uri) {
            Ok(route) => route,
            Err(e) => {
                warn!(uri, error = %e, "Unroutable resource URI");
                return vec![resource_text(
                    uri,
                    error_text(RESOURCE_READ_LABEL, &e),
                    "text/plain",
                )];
            }
        };

        debug!(uri, ?route, "Reading resource");
        let result = self
            .read_route(&route)
            .await
            .and_then(|v| crate::utils::to_pretty_json(&v));
        match result {
            Ok(text) => vec![resource_text(uri, text, "application/json")],
            Err(e) => {
                warn!(uri, error = %e, "Resource read failed");
                vec![resource_text(
                    uri,
                    error_text(route.error_label(), &e),
                    "text/plain",
                )]
            }
        }
    }

    async fn read_route(&self, route: &ResourceRoute) -> Result<Value, ConnectorError> {
        let graph = &self.graph;
        match route {
            ResourceRoute::AllSites => {
                let sites = graph.list_sites(&ListSitesQuery::default()).await?;
                let views: Vec<SiteView> = sites
                    .iter()
                    .map(|s| SiteView::overview(s, "Unnamed Site"))
                    .collect();
                Ok(serde_json::to_value(views)?)
            }
            ResourceRoute::RootSite => {
                let site = graph.get_root_site().await?;
                Ok(serde_json::to_value(SiteView::overview(&site, "Root Site"))?)
            }
            ResourceRoute::SiteStructure { site_id } => {
                let (lists, drives) = tokio::try_join!(
                    graph.list_site_lists(site_id),
                    graph.list_site_drives(site_id)
                )?;
                Ok(json!({
                    "siteId": site_id,
                    "lists": lists.iter().map(ListView::structure).collect::<Vec<_>>(),
                    "drives": drives.iter().map(DriveView::structure).collect::<Vec<_>>(),
                }))
            }
            ResourceRoute::SiteFiles { site_id, path } => {
                let q = ListDriveItemsQuery {
                    site_id: site_id.clone(),
                    path: (!path.is_empty()).then(|| path.clone()),
                    ..Default::default()
                };
                let items = graph.list_drive_items(&q).await?;
                Ok(json!({
                    "siteId": site_id,
                    "path": if path.is_empty() { "/" } else { path.as_str() },
                    "items": items.iter().map(DriveItemView::brief).collect::<Vec<_>>(),
                }))
            }
            ResourceRoute::Search { query } => {
                let q = SearchQuery {
                    query: query.clone(),
                    top: std::num::NonZeroU32::new(SEARCH_PAGE_SIZE),
                    ..Default::default()
                };
                let hits = graph.search(&q).await?;
                Ok(json!({
                    "query": query,
                    "resultCount": hits.len(),
                    "results": hits.iter().map(SearchHitView::brief).collect::<Vec<_>>(),
                }))
            }
        }
    }

    fn resource_templates(&self) -> Value {
        let templates: Vec<Value> = self
            .router
            .patterns()
            .iter()
            .filter(|p| p.is_template)
            .map(|p| {
                json!({
                    "uriTemplate": p.uri_template,
                    "name": p.name,
                    "description": p.description,
                    "mimeType": "application/json",
                })
            })
            .collect();
        json!({ "resourceTemplates": templates })
    }
}

#[async_trait]
impl Connector for SharePointConnector {
    fn name(&self) -> &'static str {
        SERVER_NAME
    }

    fn description(&self) -> &'static str {
        "Read-only SharePoint Online access via Microsoft Graph"
    }

    async fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities::builder()
            .enable_tools()
            .enable_resources()
            .enable_prompts()
            .build()
    }

    async fn initialize(
        &self,
        request: InitializeRequestParam,
    ) -> Result<InitializeResult, ConnectorError> {
        info!(
            client = %request.client_info.name,
            version = %request.client_info.version,
            "Client connected"
        );
        Ok(InitializeResult {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: self.capabilities().await,
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                title: Some("SharePoint".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(INSTRUCTIONS.to_string()),
        })
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, ConnectorError> {
        let resources = self
            .router
            .patterns()
            .iter()
            .filter(|p| !p.is_template)
            .map(|p| Resource {
                raw: RawResource {
                    uri: p.uri_template.to_string(),
                    name: p.name.to_string(),
                    title: None,
                    description: Some(p.description.to_string()),
                    mime_type: Some("application/json".to_string()),
                    size: None,
                    icons: None,
                },
                annotations: None,
            })
            .collect();
        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
        })
    }

    async fn list_resource_templates(&self) -> Result<Value, ConnectorError> {
        Ok(self.resource_templates())
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
    ) -> Result<Vec<ResourceContents>, ConnectorError> {
        Ok(self.read(&request.uri).await)
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError> {
        Ok(ListToolsResult {
            tools: self.tools.iter().map(ToolSpec::to_tool).collect(),
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        self.dispatch(request.name.as_ref(), request.arguments).await
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListPromptsResult, ConnectorError> {
        Ok(ListPromptsResult {
            prompts: prompts::list(),
            next_cursor: None,
        })
    }

    async fn get_prompt(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<Value, ConnectorError> {
        let param = arguments
            .as_ref()
            .and_then(|a| a.get("param"))
            .and_then(|v| v.as_str());
        prompts::get(name, param)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_are_unique_and_complete() {
        let tools = tool_table();
        let mut names: Vec<&str> = tools.iter().map(|t| t.name).collect();
        assert_eq!(names.len(), 16);
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 16);
        for expected in [
            "refreshAuthToken",
            "listSharePointSites",
            "getDriveItemContent",
            "searchSharePoint",
            "listSitePages",
        ] {
            assert!(names.contains(&expected), "missing {}", expected);
        }
    }

    #[test]
    fn schemas_declare_required_fields() {
        let tools = tool_table();
        let content = tools
            .iter()
            .find(|t| t.name == "getDriveItemContent")
            .unwrap()
            .to_tool();
        let required = content.input_schema["required"].as_array().unwrap();
        assert!(required.contains(&json!("siteId")));
        assert!(required.contains(&json!("itemId")));
        assert!(!required.contains(&json!("driveId")));
    }

    #[test]
    fn text_content_banner() {
        let text = describe_content(&DriveItemContent {
            content: "hello".into(),
            is_base64: false,
            mime_type: Some("text/plain".into()),
        });
        assert_eq!(text, "Text file content (MIME: text/plain):\n\nhello");
    }

    #[test]
    fn binary_content_banner_counts_decoded_bytes() {
        // "hello" -> aGVsbG8=
        let text = describe_content(&DriveItemContent {
            content: "aGVsbG8=".into(),
            is_base64: true,
            mime_type: None,
        });
        assert_eq!(
            text,
            "Binary file content (base64 encoded, 5 bytes, MIME: unknown)\n\naGVsbG8="
        );
        assert_eq!(decoded_len(""), 0);
        assert_eq!(decoded_len("AAAA"), 3);
        assert_eq!(decoded_len("AA=="), 1);
    }

    #[test]
    fn invalid_params_are_reported() {
        let err = parse::<SiteRef>(json!({})).unwrap_err();
        assert!(matches!(err, ConnectorError::InvalidParams(_)));
        assert!(non_empty("siteId", "  ").is_err());
    }
}
