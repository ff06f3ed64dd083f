//! Sign-in and token lifecycle.
//!
//! [`AuthSession`] is the single entry point used by outbound Graph calls. It
//! holds at most one [`Credential`] in a [`TokenCache`] and falls back to an
//! [`IdentityProvider`] when the cached token is missing or expired.

mod cache;
pub mod entra;
mod session;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use cache::TokenCache;
pub use entra::EntraIdProvider;
pub use session::{AccountState, AuthSession, ClearReport};

/// A signed-in identity known to the provider's local account store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// `{oid}.{tid}` when the id token carries both, otherwise the subject.
    pub home_account_id: String,
    pub username: Option<String>,
    pub tenant_id: Option<String>,
}

/// Bearer token plus expiry and the account it was issued to.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    pub account: Account,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("account", &self.account)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Multiple accounts found ({0}). Please select an account to use.")]
    AmbiguousAccount(usize),

    #[error("interaction required: {0}")]
    InteractionRequired(String),

    #[error("sign-in was declined: {0}")]
    Declined(String),

    #[error("device code expired before sign-in completed")]
    Expired,

    #[error("account store error: {0}")]
    AccountStore(String),

    #[error("identity provider error: {0}")]
    Provider(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

/// The identity provider seam: a local account store plus the two ways of
/// obtaining a token for the requested scopes.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Accounts currently held in the provider's local store.
    async fn accounts(&self) -> Result<Vec<Account>, AuthError>;

    async fn remove_account(&self, account: &Account) -> Result<(), AuthError>;

    /// Renews a token for `account` without user interaction. Returns
    /// [`AuthError::InteractionRequired`] when the user has to sign in again.
    async fn acquire_token_silent(
        &self,
        account: &Account,
        scopes: &[String],
    ) -> Result<Credential, AuthError>;

    /// Runs the user-facing sign-in flow.
    async fn acquire_token_interactive(&self, scopes: &[String]) -> Result<Credential, AuthError>;
}
