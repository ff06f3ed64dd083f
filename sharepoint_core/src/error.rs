// src/error.rs
use serde_json::json;

use crate::auth::AuthError;
use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Invalid resource URI format: {0}")]
    InvalidResourceUri(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Prompt not found: {0}")]
    PromptNotFound(String),

    #[error("Method not found")]
    MethodNotFound,

    #[error("Graph API error ({status}): {message}")]
    Graph { status: u16, message: String },

    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<AuthError> for ConnectorError {
    fn from(err: AuthError) -> Self {
        ConnectorError::Authentication(err.to_string())
    }
}

impl ConnectorError {
    pub fn code_str(&self) -> &'static str {
        match self {
            ConnectorError::InvalidParams(_) => "invalid_params",
            ConnectorError::InvalidResourceUri(_) => "invalid_uri",
            ConnectorError::Authentication(_) => "auth_failed",
            ConnectorError::ToolNotFound(_) => "tool_not_found",
            ConnectorError::PromptNotFound(_) => "prompt_not_found",
            ConnectorError::MethodNotFound => "method_not_found",
            ConnectorError::Graph { status: 404, .. } => "not_found",
            ConnectorError::Graph { status: 401 | 403, .. } => "auth_failed",
            ConnectorError::Graph { .. } => "upstream_error",
            ConnectorError::HttpRequest(_) => "upstream_error",
            ConnectorError::Config(_) => "config_error",
            _ => "internal_error",
        }
    }

    pub fn to_jsonrpc_error(&self) -> serde_json::Value {
        let (code, message) = match self {
            ConnectorError::ToolNotFound(name) => (-32602, format!("Tool not found: {}", name)),
            ConnectorError::PromptNotFound(name) => {
                (-32602, format!("Prompt not found: {}", name))
            }
            ConnectorError::InvalidParams(msg) => (-32602, msg.to_string()),
            ConnectorError::InvalidResourceUri(msg) => (-32602, msg.to_string()),
            ConnectorError::MethodNotFound => (-32601, "Method not found".to_string()),
            ConnectorError::SerdeJson(e) => (-32602, format!("Invalid params: {}", e)),
            ConnectorError::Other(msg) => (-32603, msg.to_string()),
            err => (-32603, err.to_string()),
        };

        json!({
            "code": code,
            "message": message,
            "data": { "kind": self.code_str() },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_errors_map_to_stable_codes() {
        let not_found = ConnectorError::Graph {
            status: 404,
            message: "itemNotFound".into(),
        };
        assert_eq!(not_found.code_str(), "not_found");

        let forbidden = ConnectorError::Graph {
            status: 403,
            message: "accessDenied".into(),
        };
        assert_eq!(forbidden.code_str(), "auth_failed");

        let throttled = ConnectorError::Graph {
            status: 429,
            message: "tooManyRequests".into(),
        };
        assert_eq!(throttled.code_str(), "upstream_error");
    }

    #[test]
    fn jsonrpc_error_shape() {
        let err = ConnectorError::ToolNotFound("nope".into()).to_jsonrpc_error();
        assert_eq!(err["code"], -32602);
        assert_eq!(err["message"], "Tool not found: nope");
        assert_eq!(err["data"]["kind"], "tool_not_found");

        let err = ConnectorError::MethodNotFound.to_jsonrpc_error();
        assert_eq!(err["code"], -32601);
    }

    #[test]
    fn auth_errors_become_authentication_failures() {
        let err: ConnectorError = AuthError::AmbiguousAccount(2).into();
        assert_eq!(err.code_str(), "auth_failed");
        assert!(err.to_string().contains("Multiple accounts found"));
    }
}
