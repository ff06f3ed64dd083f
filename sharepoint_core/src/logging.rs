use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

/// `logging/setLevel` params
#[derive(Serialize, Deserialize, Debug)]
pub struct SetLevelRequest {
    pub level: LogLevel,
}

pub fn default_filter(debug: bool) -> &'static str {
    if debug {
        "sharepoint_mcp=debug,sharepoint_core=debug"
    } else {
        "sharepoint_mcp=info,sharepoint_core=info"
    }
}

/// Installs the global subscriber. Stdout carries the protocol, so all
/// output goes to stderr. `RUST_LOG` wins over `debug`.
pub fn init_tracing(debug: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(debug)));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn set_level_parses_mcp_names() {
        let req: SetLevelRequest = serde_json::from_value(json!({"level": "warning"})).unwrap();
        assert_eq!(req.level, LogLevel::Warning);
        assert!(serde_json::from_value::<SetLevelRequest>(json!({"level": "verbose"})).is_err());
    }

    #[test]
    fn debug_flag_widens_default_filter() {
        assert!(default_filter(true).contains("sharepoint_core=debug"));
        assert!(default_filter(false).contains("sharepoint_core=info"));
    }
}
