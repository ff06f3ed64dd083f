use rmcp::model::{CallToolResult, Content, RawContent, ResourceContents};
use serde::Serialize;

use crate::error::ConnectorError;

/// Pretty-printed (2-space) JSON, the text form of every successful response.
pub fn to_pretty_json<T: Serialize>(data: &T) -> Result<String, ConnectorError> {
    serde_json::to_string_pretty(data).map_err(ConnectorError::SerdeJson)
}

pub fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(text.into())],
        structured_content: None,
        is_error: Some(false),
        meta: None,
    }
}

pub fn json_text_result<T: Serialize>(data: &T) -> Result<CallToolResult, ConnectorError> {
    Ok(text_result(to_pretty_json(data)?))
}

/// `Error <operation>: <cause>` with the error flag set.
pub fn error_result(operation: &str, err: &ConnectorError) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(error_text(operation, err))],
        structured_content: None,
        is_error: Some(true),
        meta: None,
    }
}

pub fn error_text(operation: &str, err: &ConnectorError) -> String {
    format!("Error {}: {}", operation, err)
}

pub fn resource_text(uri: &str, text: String, mime: &str) -> ResourceContents {
    let mut contents = ResourceContents::text(text, uri.to_string());
    if let ResourceContents::TextResourceContents { mime_type, .. } = &mut contents {
        *mime_type = Some(mime.to_string());
    }
    contents
}

/// First text block of a tool result, if any.
pub fn first_text(result: &CallToolResult) -> Option<&str> {
    result.content.iter().find_map(|c| match &c.raw {
        RawContent::Text(t) => Some(t.text.as_str()),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_is_indented_two_spaces() {
        let result = json_text_result(&json!({"a": [1]})).unwrap();
        assert_eq!(first_text(&result), Some("{\n  \"a\": [\n    1\n  ]\n}"));
        assert_eq!(result.is_error, Some(false));
    }

    #[test]
    fn error_envelope() {
        let err = ConnectorError::Graph {
            status: 403,
            message: "Access denied".into(),
        };
        let result = error_result("listing SharePoint sites", &err);
        assert_eq!(result.is_error, Some(true));
        assert_eq!(
            first_text(&result),
            Some("Error listing SharePoint sites: Graph API error (403): Access denied")
        );
    }

    #[test]
    fn resource_text_sets_mime() {
        let contents = resource_text("sharepoint://sites/all", "[]".into(), "application/json");
        let v = serde_json::to_value(&contents).unwrap();
        assert_eq!(v["uri"], "sharepoint://sites/all");
        assert_eq!(v["mimeType"], "application/json");
        assert_eq!(v["text"], "[]");
    }
}
