use std::sync::{Arc, Mutex};

use base64::Engine as _;
use serde_json::json;
use sharepoint_core::auth::entra::DeviceAuthStart;
use sharepoint_core::auth::{AuthError, AuthSession, EntraIdProvider, IdentityProvider};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TENANT_PATH: &str = "/contoso/oauth2/v2.0";

fn scopes() -> Vec<String> {
    vec!["Sites.Read.All".to_string(), "offline_access".to_string()]
}

fn id_token() -> String {
    let claims = json!({
        "oid": "oid-1",
        "tid": "tid-1",
        "preferred_username": "adele@contoso.com"
    });
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(serde_json::to_vec(&claims).unwrap());
    format!("eyJhbGciOiJub25lIn0.{}.sig", payload)
}

fn provider(server: &MockServer, seen_code: Arc<Mutex<Option<String>>>) -> EntraIdProvider {
    EntraIdProvider::new(
        reqwest::Client::new(),
        format!("{}/contoso", server.uri()),
        "client-123",
    )
    .with_device_code_handler(Arc::new(move |start: &DeviceAuthStart| {
        *seen_code.lock().unwrap() = Some(start.user_code.clone());
    }))
}

async fn mount_device_flow(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path(format!("{}/devicecode", TENANT_PATH)))
        .and(body_string_contains("client_id=client-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "dev-123",
            "user_code": "ABCD-EFGH",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 60,
            "interval": 0,
            "message": "To sign in, use a web browser to open the page https://microsoft.com/devicelogin and enter the code ABCD-EFGH to authenticate."
        })))
        .expect(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{}/token", TENANT_PATH)))
        .and(body_string_contains("device_code=dev-123"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "authorization_pending",
            "error_description": "AADSTS70016: pending"
        })))
        .up_to_n_times(1)
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("{}/token", TENANT_PATH)))
        .and(body_string_contains("device_code=dev-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "id_token": id_token(),
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn device_flow_polls_until_signed_in() {
    let server = MockServer::start().await;
    mount_device_flow(&server).await;

    let seen_code = Arc::new(Mutex::new(None));
    let provider = Arc::new(provider(&server, seen_code.clone()));
    let session = AuthSession::new(provider.clone(), scopes());

    let token = session.get_access_token().await.unwrap();
    assert_eq!(token, "at-1");
    assert_eq!(seen_code.lock().unwrap().as_deref(), Some("ABCD-EFGH"));

    let accounts = provider.accounts().await.unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].home_account_id, "oid-1.tid-1");
    assert_eq!(accounts[0].username.as_deref(), Some("adele@contoso.com"));

    // Cached now: no further calls to the token endpoint.
    assert_eq!(session.get_access_token().await.unwrap(), "at-1");
}

#[tokio::test]
async fn silent_renewal_redeems_refresh_token() {
    let server = MockServer::start().await;
    mount_device_flow(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/token", TENANT_PATH)))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at-2",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server, Arc::new(Mutex::new(None)));
    let first = provider.acquire_token_interactive(&scopes()).await.unwrap();
    let renewed = provider
        .acquire_token_silent(&first.account, &scopes())
        .await
        .unwrap();

    assert_eq!(renewed.access_token, "at-2");
    assert_eq!(renewed.account, first.account);
}

#[tokio::test]
async fn rejected_refresh_token_requires_interaction() {
    let server = MockServer::start().await;
    mount_device_flow(&server).await;
    Mock::given(method("POST"))
        .and(path(format!("{}/token", TENANT_PATH)))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "AADSTS700082: The refresh token has expired"
        })))
        .mount(&server)
        .await;

    let provider = provider(&server, Arc::new(Mutex::new(None)));
    let first = provider.acquire_token_interactive(&scopes()).await.unwrap();
    let err = provider
        .acquire_token_silent(&first.account, &scopes())
        .await
        .unwrap_err();

    match err {
        AuthError::InteractionRequired(reason) => assert!(reason.contains("invalid_grant")),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn declined_sign_in_is_terminal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(format!("{}/devicecode", TENANT_PATH)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "device_code": "dev-9",
            "user_code": "NOPE",
            "verification_uri": "https://microsoft.com/devicelogin",
            "expires_in": 60,
            "interval": 0
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("{}/token", TENANT_PATH)))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "authorization_declined"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(&server, Arc::new(Mutex::new(None)));
    let err = provider
        .acquire_token_interactive(&scopes())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Declined(_)));
    assert!(provider.accounts().await.unwrap().is_empty());
}

#[tokio::test]
async fn clear_forgets_signed_in_accounts() {
    let server = MockServer::start().await;
    mount_device_flow(&server).await;

    let provider = Arc::new(provider(&server, Arc::new(Mutex::new(None))));
    let session = AuthSession::new(provider.clone(), scopes());
    session.get_access_token().await.unwrap();
    assert!(session.is_authenticated().await);

    let report = session.clear().await;
    assert_eq!(report.removed, 1);
    assert_eq!(report.failed, 0);
    assert!(!session.is_authenticated().await);
}
