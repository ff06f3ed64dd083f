use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::logging::{LogLevel, SetLevelRequest};
use crate::{Connector, ConnectorError};
use rmcp::model::*;

/// MCP server wrapping a single connector.
pub struct McpServer {
    connector: Arc<dyn Connector>,
    log_level: Mutex<LogLevel>,
}

impl McpServer {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            log_level: Mutex::new(LogLevel::Info),
        }
    }

    pub async fn handle_initialize(
        &self,
        request: InitializeRequestParam,
    ) -> Result<InitializeResult, ConnectorError> {
        info!("MCP Server initializing");
        self.connector.initialize(request).await
    }

    pub async fn handle_list_resources(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, ConnectorError> {
        self.connector.list_resources(request).await
    }

    pub async fn handle_list_resource_templates(&self) -> Result<Value, ConnectorError> {
        self.connector.list_resource_templates().await
    }

    pub async fn handle_read_resource(
        &self,
        request: ReadResourceRequestParam,
    ) -> Result<ReadResourceResult, ConnectorError> {
        let contents = self.connector.read_resource(request).await?;
        Ok(ReadResourceResult { contents })
    }

    pub async fn handle_list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError> {
        self.connector.list_tools(request).await
    }

    pub async fn handle_call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        self.connector.call_tool(request).await
    }

    pub async fn handle_list_prompts(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListPromptsResult, ConnectorError> {
        self.connector.list_prompts(request).await
    }

    pub async fn handle_get_prompt(
        &self,
        name: &str,
        arguments: Option<Map<String, Value>>,
    ) -> Result<Value, ConnectorError> {
        self.connector.get_prompt(name, arguments).await
    }

    /// Records the client's requested level. The stderr filter is fixed at
    /// start-up (`RUST_LOG` / `debug`), so this is an acknowledgement only.
    pub async fn handle_set_level(&self, request: SetLevelRequest) -> Result<Value, ConnectorError> {
        let mut level = self.log_level.lock().await;
        *level = request.level;
        info!(level = ?request.level, "Client requested log level");
        Ok(json!({}))
    }

    pub async fn log_level(&self) -> LogLevel {
        *self.log_level.lock().await
    }
}

/// JSON-RPC handler for MCP protocol
pub struct JsonRpcHandler {
    server: McpServer,
}

impl JsonRpcHandler {
    pub fn new(server: McpServer) -> Self {
        Self { server }
    }

    /// Handles one JSON-RPC message. Notifications (no `id`) get no
    /// response.
    pub async fn handle_request(&self, request: Value) -> Option<Value> {
        let method = request
            .get("method")
            .and_then(|m| m.as_str())
            .unwrap_or("")
            .to_string();
        let params = request.get("params").cloned().unwrap_or(Value::Null);

        let Some(id) = request.get("id").cloned() else {
            debug!(method = %method, "Notification received");
            return None;
        };

        debug!(method = %method, "Handling request");

        let result = match method.as_str() {
            "initialize" => match serde_json::from_value::<InitializeRequestParam>(params) {
                Ok(req) => self
                    .server
                    .handle_initialize(req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
            },
            "ping" => Ok(json!({})),
            "resources/list" => {
                match serde_json::from_value::<Option<PaginatedRequestParam>>(params) {
                    Ok(req) => self
                        .server
                        .handle_list_resources(req)
                        .await
                        .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
                        .map_err(|e| e.to_jsonrpc_error()),
                    Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
                }
            }
            "resources/templates/list" => self
                .server
                .handle_list_resource_templates()
                .await
                .map_err(|e| e.to_jsonrpc_error()),
            "resources/read" => match serde_json::from_value::<ReadResourceRequestParam>(params) {
                Ok(req) => self
                    .server
                    .handle_read_resource(req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
            },
            "tools/list" => match serde_json::from_value::<Option<PaginatedRequestParam>>(params) {
                Ok(req) => self
                    .server
                    .handle_list_tools(req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
            },
            "tools/call" => match serde_json::from_value::<CallToolRequestParam>(params) {
                Ok(req) => self
                    .server
                    .handle_call_tool(req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
            },
            "prompts/list" => {
                match serde_json::from_value::<Option<PaginatedRequestParam>>(params) {
                    Ok(req) => self
                        .server
                        .handle_list_prompts(req)
                        .await
                        .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
                        .map_err(|e| e.to_jsonrpc_error()),
                    Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
                }
            }
            "prompts/get" => match params.get("name").and_then(|n| n.as_str()) {
                Some(name) => {
                    let arguments = params
                        .get("arguments")
                        .and_then(|a| a.as_object())
                        .cloned();
                    self.server
                        .handle_get_prompt(name, arguments)
                        .await
                        .map_err(|e| e.to_jsonrpc_error())
                }
                None => Err(
                    ConnectorError::InvalidParams("Missing 'name' parameter".to_string())
                        .to_jsonrpc_error(),
                ),
            },
            "logging/setLevel" => match serde_json::from_value::<SetLevelRequest>(params) {
                Ok(req) => self
                    .server
                    .handle_set_level(req)
                    .await
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(ConnectorError::SerdeJson(e).to_jsonrpc_error()),
            },
            _ => {
                warn!(method = %method, "Unknown method");
                Err(ConnectorError::MethodNotFound.to_jsonrpc_error())
            }
        };

        Some(match result {
            Ok(result) => json!({
                "jsonrpc": "2.0",
                "result": result,
                "id": id,
            }),
            Err(error) => json!({
                "jsonrpc": "2.0",
                "error": error,
                "id": id,
            }),
        })
    }
}
