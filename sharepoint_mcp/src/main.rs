use std::sync::Arc;
use tracing::{error, info};

use sharepoint_core::{
    config::Config,
    graph::client::http_client,
    logging,
    mcp_server::{JsonRpcHandler, McpServer},
    transport::StdioTransport,
    AuthSession, EntraIdProvider, GraphClient, SharePointConnector,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            logging::init_tracing(false);
            error!("Configuration error: {}", e);
            error!(
                "Set CLIENT_ID (and optionally AUTHORITY) or create {}",
                Config::default_path().display()
            );
            return Err(e.into());
        }
    };

    logging::init_tracing(config.debug);

    info!("Starting SharePoint MCP Server");

    let http = http_client(&config)?;
    let provider = EntraIdProvider::from_config(&config, http.clone());
    let session = Arc::new(AuthSession::new(Arc::new(provider), config.scopes.clone()));
    let graph = GraphClient::new(http, &config.graph_base_url, session)?;

    let connector = SharePointConnector::new(Arc::new(graph));

    // Create MCP server
    let server = McpServer::new(Arc::new(connector));

    // Create JSON-RPC handler
    let handler = JsonRpcHandler::new(server);

    // Create and run stdio transport
    let transport = StdioTransport::new(handler);

    info!("MCP Server ready, listening on stdio");

    tokio::select! {
        res = transport.run() => {
            if let Err(e) = res {
                error!("Transport error: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}
