#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sharepoint_core::auth::{Account, AuthError, AuthSession, Credential, IdentityProvider};
use sharepoint_core::connector::SharePointConnector;
use sharepoint_core::graph::GraphClient;
use sharepoint_core::mcp_server::{JsonRpcHandler, McpServer};
use wiremock::MockServer;

pub const TOKEN: &str = "test-token";

/// Signs in interactively once, then renews silently. Hands out a fixed
/// token and counts interactive sign-ins. The first `failures` interactive
/// attempts are rejected.
#[derive(Default)]
pub struct StaticTokenProvider {
    pub interactive_calls: AtomicUsize,
    failures: usize,
    signed_in: Mutex<Option<Account>>,
}

impl StaticTokenProvider {
    pub fn failing(failures: usize) -> Self {
        Self {
            failures,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.interactive_calls.load(Ordering::SeqCst)
    }

    fn credential(account: Account) -> Credential {
        Credential {
            access_token: TOKEN.to_string(),
            expires_at: Utc::now() + Duration::hours(1),
            account,
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn accounts(&self) -> Result<Vec<Account>, AuthError> {
        Ok(self.signed_in.lock().unwrap().iter().cloned().collect())
    }

    async fn remove_account(&self, _account: &Account) -> Result<(), AuthError> {
        *self.signed_in.lock().unwrap() = None;
        Ok(())
    }

    async fn acquire_token_silent(
        &self,
        account: &Account,
        _scopes: &[String],
    ) -> Result<Credential, AuthError> {
        Ok(Self::credential(account.clone()))
    }

    async fn acquire_token_interactive(&self, _scopes: &[String]) -> Result<Credential, AuthError> {
        let attempt = self.interactive_calls.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            return Err(AuthError::Provider(format!("sign-in attempt {} rejected", attempt + 1)));
        }
        let account = Account {
            home_account_id: "user.tenant".into(),
            username: Some("user@contoso.com".into()),
            tenant_id: Some("tenant".into()),
        };
        *self.signed_in.lock().unwrap() = Some(account.clone());
        Ok(Self::credential(account))
    }
}

pub fn graph_base(server: &MockServer) -> String {
    format!("{}/v1.0", server.uri())
}

pub fn graph_client(server: &MockServer) -> (GraphClient, Arc<StaticTokenProvider>) {
    graph_client_with(server, StaticTokenProvider::default())
}

pub fn graph_client_with(
    server: &MockServer,
    provider: StaticTokenProvider,
) -> (GraphClient, Arc<StaticTokenProvider>) {
    let provider = Arc::new(provider);
    let session = Arc::new(AuthSession::new(
        provider.clone(),
        vec!["Sites.Read.All".to_string()],
    ));
    let client = GraphClient::new(reqwest::Client::new(), &graph_base(server), session)
        .expect("valid base url");
    (client, provider)
}

pub fn connector(server: &MockServer) -> SharePointConnector {
    let (client, _) = graph_client(server);
    SharePointConnector::new(Arc::new(client))
}

pub fn handler(server: &MockServer) -> JsonRpcHandler {
    JsonRpcHandler::new(McpServer::new(Arc::new(connector(server))))
}
