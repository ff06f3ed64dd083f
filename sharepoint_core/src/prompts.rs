use rmcp::model::{Prompt, PromptArgument};
use serde_json::{json, Value};

use crate::error::ConnectorError;

pub const SITE_EXPLORATION: &str = "sharepoint-site-exploration-prompt";

const SITE_EXPLORATION_DESCRIPTION: &str =
    "A prompt to help explore SharePoint sites and their content.";

pub fn list() -> Vec<Prompt> {
    vec![Prompt {
        name: SITE_EXPLORATION.to_string(),
        title: None,
        description: Some(SITE_EXPLORATION_DESCRIPTION.to_string()),
        arguments: Some(vec![PromptArgument {
            name: "param".to_string(),
            title: None,
            description: Some("Optional site name or topic to focus on".to_string()),
            required: Some(false),
        }]),
        icons: None,
    }]
}

/// `prompts/get` payload for `name`, with `param` folded into the text.
pub fn get(name: &str, param: Option<&str>) -> Result<Value, ConnectorError> {
    if name != SITE_EXPLORATION {
        return Err(ConnectorError::PromptNotFound(name.to_string()));
    }

    let focus = match param.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => format!(" Focus on content related to \"{}\".", p),
        None => String::new(),
    };
    let text = format!(
        "Explore the SharePoint content I can access.{focus}\n\n\
         1. Read sharepoint://sites/all to see the available sites.\n\
         2. For a relevant site, read sharepoint://sites/{{siteId}}/structure to find its lists and document libraries.\n\
         3. Browse folders with sharepoint://sites/{{siteId}}/files/root or the listDriveItems tool.\n\
         4. Use searchSharePoint for anything you cannot find by browsing, and getDriveItemContent to read a file.\n\n\
         Summarize what each site contains and point out the most useful documents.",
        focus = focus
    );

    Ok(json!({
        "description": SITE_EXPLORATION_DESCRIPTION,
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": text }
        }]
    }))
}
