use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_TENANT: &str = "common";

/// Delegated Graph permissions requested at sign-in. `offline_access` yields the
/// refresh token used for silent renewal; `openid profile` yield the id token
/// the signed-in account is read from.
pub const DEFAULT_SCOPES: &[&str] = &[
    "User.Read",
    "Sites.Read.All",
    "Files.Read.All",
    "offline_access",
    "openid",
    "profile",
];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Application (client) ID of the Entra ID app registration.
    pub client_id: Option<String>,
    /// Tenant ID or domain; `common` when unset.
    pub tenant: String,
    pub authority_host: String,
    pub graph_base_url: String,
    pub scopes: Vec<String>,
    pub request_timeout_secs: u64,
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: None,
            tenant: DEFAULT_TENANT.to_string(),
            authority_host: DEFAULT_AUTHORITY_HOST.to_string(),
            graph_base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            scopes: DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect(),
            request_timeout_secs: 60,
            debug: false,
        }
    }
}

impl Config {
    /// `~/.config/sharepoint-mcp/config.toml` (Unix) or
    /// `%APPDATA%/sharepoint-mcp/config.toml` (Windows).
    pub fn default_path() -> PathBuf {
        let base = dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|p| p.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."));
        base.join("sharepoint-mcp").join("config.toml")
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads the config file (if any) and applies environment overrides.
    ///
    /// `SHAREPOINT_MCP_CONFIG` points at an explicit file, which must exist.
    /// Otherwise the default path is read when present.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = if let Ok(path) = std::env::var("SHAREPOINT_MCP_CONFIG") {
            Self::load_from_path(path)?
        } else {
            let path = Self::default_path();
            if path.exists() {
                Self::load_from_path(path)?
            } else {
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Environment overrides. `CLIENT_ID`, `AUTHORITY` and `DEBUG` keep the
    /// names existing deployments already set.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("CLIENT_ID") {
            self.client_id = Some(v);
        }
        if let Some(v) = non_empty("AUTHORITY") {
            self.tenant = v;
        }
        if let Some(v) = non_empty("SHAREPOINT_MCP_AUTHORITY_HOST") {
            self.authority_host = v;
        }
        if let Some(v) = non_empty("SHAREPOINT_MCP_GRAPH_URL") {
            self.graph_base_url = v;
        }
        if let Some(v) = non_empty("SHAREPOINT_MCP_SCOPES") {
            self.scopes = v.split_whitespace().map(|s| s.to_string()).collect();
        }
        if let Some(v) = non_empty("SHAREPOINT_MCP_TIMEOUT_SECS") {
            self.request_timeout_secs = v.parse().map_err(|_| ConfigError::Invalid {
                key: "SHAREPOINT_MCP_TIMEOUT_SECS",
                value: v.clone(),
            })?;
        }
        if let Some(v) = non_empty("DEBUG") {
            self.debug = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.client_id.as_deref() {
            Some(id) if !id.trim().is_empty() => {}
            _ => return Err(ConfigError::Missing("client_id (or CLIENT_ID)")),
        }
        if self.scopes.is_empty() {
            return Err(ConfigError::Missing("scopes"));
        }
        for (key, value) in [
            ("authority_host", &self.authority_host),
            ("graph_base_url", &self.graph_base_url),
        ] {
            url::Url::parse(value).map_err(|_| ConfigError::Invalid {
                key,
                value: value.clone(),
            })?;
        }
        Ok(())
    }

    /// `{authority_host}/{tenant}` without a trailing slash.
    pub fn authority(&self) -> String {
        let tenant = if self.tenant.trim().is_empty() {
            DEFAULT_TENANT
        } else {
            self.tenant.trim()
        };
        format!("{}/{}", self.authority_host.trim_end_matches('/'), tenant)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
