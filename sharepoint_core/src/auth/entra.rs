//! Microsoft Entra ID (v2 endpoint) sign-in: device authorization grant for
//! interactive sign-in, refresh-token grant for silent renewal.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{Account, AuthError, Credential, IdentityProvider};
use crate::config::Config;

const DEVICE_CODE_GRANT: &str = "urn:ietf:params:oauth:grant-type:device_code";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const MIN_POLL_INTERVAL_SECS: u64 = 1;
const SLOW_DOWN_STEP_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthStart {
    pub device_code: String,
    pub user_code: String,
    pub verification_uri: String,
    pub verification_uri_complete: Option<String>,
    pub expires_in: i64,
    pub interval: Option<i64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl OAuthErrorBody {
    fn describe(&self) -> String {
        match &self.error_description {
            Some(desc) => format!("{}: {}", self.error, desc),
            None => self.error.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct IdTokenClaims {
    oid: Option<String>,
    tid: Option<String>,
    sub: Option<String>,
    preferred_username: Option<String>,
}

#[derive(Debug, Clone)]
struct StoredAccount {
    account: Account,
    refresh_token: Option<String>,
}

/// Receives the device code so the user can be told where to sign in.
pub type DeviceCodeHandler = Arc<dyn Fn(&DeviceAuthStart) + Send + Sync>;

enum PollOutcome {
    Tokens(OAuthTokens),
    Pending,
    SlowDown,
}

/// Entra ID identity provider with an in-memory account store.
pub struct EntraIdProvider {
    http: reqwest::Client,
    authority: String,
    client_id: String,
    accounts: RwLock<Vec<StoredAccount>>,
    on_device_code: DeviceCodeHandler,
}

impl EntraIdProvider {
    /// `authority` is `{host}/{tenant}`, e.g. `https://login.microsoftonline.com/common`.
    pub fn new(
        http: reqwest::Client,
        authority: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            http,
            authority: authority.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
            accounts: RwLock::new(Vec::new()),
            on_device_code: Arc::new(log_device_code),
        }
    }

    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        Self::new(
            http,
            config.authority(),
            config.client_id.clone().unwrap_or_default(),
        )
    }

    pub fn with_device_code_handler(mut self, handler: DeviceCodeHandler) -> Self {
        self.on_device_code = handler;
        self
    }

    fn endpoint(&self, name: &str) -> String {
        format!("{}/oauth2/v2.0/{}", self.authority, name)
    }

    pub async fn start_device_authorization(
        &self,
        scopes: &[String],
    ) -> Result<DeviceAuthStart, AuthError> {
        let body = [
            ("client_id", self.client_id.clone()),
            ("scope", scopes.join(" ")),
        ];
        let resp = self
            .http
            .post(self.endpoint("devicecode"))
            .form(&body)
            .send()
            .await?;
        let status = resp.status();
        let v = resp.json::<serde_json::Value>().await?;
        if !status.is_success() {
            let err: OAuthErrorBody = serde_json::from_value(v).unwrap_or_default();
            return Err(AuthError::Provider(format!(
                "device authorize failed: {}",
                err.describe()
            )));
        }
        serde_json::from_value(v)
            .map_err(|e| AuthError::Provider(format!("malformed device code response: {}", e)))
    }

    async fn poll_device_code(&self, device_code: &str) -> Result<PollOutcome, AuthError> {
        let body = [
            ("grant_type", DEVICE_CODE_GRANT.to_string()),
            ("client_id", self.client_id.clone()),
            ("device_code", device_code.to_string()),
        ];
        let resp = self
            .http
            .post(self.endpoint("token"))
            .form(&body)
            .send()
            .await?;
        let status = resp.status();
        let v = resp.json::<serde_json::Value>().await?;
        if status.is_success() {
            return parse_tokens(v).map(PollOutcome::Tokens);
        }

        let err: OAuthErrorBody = serde_json::from_value(v).unwrap_or_default();
        match err.error.as_str() {
            "authorization_pending" => Ok(PollOutcome::Pending),
            "slow_down" => Ok(PollOutcome::SlowDown),
            "authorization_declined" => Err(AuthError::Declined(err.describe())),
            "expired_token" => Err(AuthError::Expired),
            _ => Err(AuthError::Provider(format!("poll failed: {}", err.describe()))),
        }
    }

    async fn redeem_refresh_token(
        &self,
        refresh_token: &str,
        scopes: &[String],
    ) -> Result<OAuthTokens, AuthError> {
        let body = [
            ("grant_type", "refresh_token".to_string()),
            ("client_id", self.client_id.clone()),
            ("refresh_token", refresh_token.to_string()),
            ("scope", scopes.join(" ")),
        ];
        let resp = self
            .http
            .post(self.endpoint("token"))
            .form(&body)
            .send()
            .await?;
        let status = resp.status();
        let v = resp.json::<serde_json::Value>().await?;
        if status.is_success() {
            return parse_tokens(v);
        }

        let err: OAuthErrorBody = serde_json::from_value(v).unwrap_or_default();
        match err.error.as_str() {
            "invalid_grant" | "interaction_required" | "consent_required" | "login_required" => {
                Err(AuthError::InteractionRequired(err.describe()))
            }
            _ => Err(AuthError::Provider(format!(
                "refresh failed: {}",
                err.describe()
            ))),
        }
    }

    /// Turns a token response into a credential and records the account.
    async fn remember(&self, tokens: OAuthTokens, fallback: Option<&Account>) -> Credential {
        let account = tokens
            .id_token
            .as_deref()
            .and_then(account_from_id_token)
            .or_else(|| fallback.cloned())
            .unwrap_or_else(|| Account {
                home_account_id: "default".to_string(),
                username: None,
                tenant_id: None,
            });

        let mut accounts = self.accounts.write().await;
        match accounts
            .iter_mut()
            .find(|s| s.account.home_account_id == account.home_account_id)
        {
            Some(existing) => {
                existing.account = account.clone();
                if tokens.refresh_token.is_some() {
                    existing.refresh_token = tokens.refresh_token.clone();
                }
            }
            None => accounts.push(StoredAccount {
                account: account.clone(),
                refresh_token: tokens.refresh_token.clone(),
            }),
        }

        let expires_in = tokens.expires_in.unwrap_or(3600).max(0);
        Credential {
            access_token: tokens.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(expires_in),
            account,
        }
    }
}

#[async_trait]
impl IdentityProvider for EntraIdProvider {
    async fn accounts(&self) -> Result<Vec<Account>, AuthError> {
        Ok(self
            .accounts
            .read()
            .await
            .iter()
            .map(|s| s.account.clone())
            .collect())
    }

    async fn remove_account(&self, account: &Account) -> Result<(), AuthError> {
        let mut accounts = self.accounts.write().await;
        let before = accounts.len();
        accounts.retain(|s| s.account.home_account_id != account.home_account_id);
        if accounts.len() == before {
            return Err(AuthError::AccountStore(format!(
                "account {} is not in the local store",
                account.home_account_id
            )));
        }
        Ok(())
    }

    async fn acquire_token_silent(
        &self,
        account: &Account,
        scopes: &[String],
    ) -> Result<Credential, AuthError> {
        let refresh_token = self
            .accounts
            .read()
            .await
            .iter()
            .find(|s| s.account.home_account_id == account.home_account_id)
            .and_then(|s| s.refresh_token.clone())
            .ok_or_else(|| {
                AuthError::InteractionRequired("no refresh token cached for account".into())
            })?;

        debug!(account = %account.home_account_id, "Redeeming refresh token");
        let tokens = self.redeem_refresh_token(&refresh_token, scopes).await?;
        Ok(self.remember(tokens, Some(account)).await)
    }

    async fn acquire_token_interactive(&self, scopes: &[String]) -> Result<Credential, AuthError> {
        let start = self.start_device_authorization(scopes).await?;
        (self.on_device_code)(&start);

        let deadline = Instant::now() + Duration::from_secs(start.expires_in.max(0) as u64);
        let mut interval = poll_interval(start.interval);

        loop {
            if Instant::now() >= deadline {
                return Err(AuthError::Expired);
            }
            tokio::time::sleep(Duration::from_secs(interval)).await;
            match self.poll_device_code(&start.device_code).await? {
                PollOutcome::Tokens(tokens) => {
                    let credential = self.remember(tokens, None).await;
                    info!(
                        account = credential.account.username.as_deref().unwrap_or("unknown"),
                        "Signed in to Microsoft Entra ID"
                    );
                    return Ok(credential);
                }
                PollOutcome::Pending => {}
                PollOutcome::SlowDown => interval += SLOW_DOWN_STEP_SECS,
            }
        }
    }
}

/// Seconds between token polls. Never less than one, whatever the server says.
fn poll_interval(advertised: Option<i64>) -> u64 {
    advertised
        .map(|i| i.max(0) as u64)
        .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
        .max(MIN_POLL_INTERVAL_SECS)
}

fn log_device_code(start: &DeviceAuthStart) {
    match &start.message {
        Some(message) => info!("{}", message),
        None => info!(
            "To sign in, open {} and enter the code {}",
            start.verification_uri, start.user_code
        ),
    }
}

fn parse_tokens(v: serde_json::Value) -> Result<OAuthTokens, AuthError> {
    let tokens: OAuthTokens = serde_json::from_value(v)
        .map_err(|e| AuthError::Provider(format!("malformed token response: {}", e)))?;
    if tokens.access_token.is_empty() {
        return Err(AuthError::Provider(
            "token response has an empty access_token".into(),
        ));
    }
    Ok(tokens)
}

/// Reads the account out of an id token payload. The signature is not
/// checked; the token came straight from the token endpoint over TLS.
fn account_from_id_token(id_token: &str) -> Option<Account> {
    let payload = id_token.split('.').nth(1)?;
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: IdTokenClaims = serde_json::from_slice(&bytes).ok()?;
    let home_account_id = match (&claims.oid, &claims.tid) {
        (Some(oid), Some(tid)) => format!("{}.{}", oid, tid),
        _ => claims.sub.clone()?,
    };
    Some(Account {
        home_account_id,
        username: claims.preferred_username,
        tenant_id: claims.tid,
    })
}
