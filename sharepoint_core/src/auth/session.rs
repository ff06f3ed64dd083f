use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{Account, AuthError, Credential, IdentityProvider, TokenCache};
use crate::error::ConnectorError;

/// How many accounts the provider's local store holds at acquisition time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountState {
    NoAccount,
    OneAccount(Account),
    MultipleAccounts(usize),
}

impl AccountState {
    pub fn from_accounts(mut accounts: Vec<Account>) -> Self {
        match accounts.len() {
            0 => AccountState::NoAccount,
            1 => AccountState::OneAccount(accounts.remove(0)),
            n => AccountState::MultipleAccounts(n),
        }
    }
}

/// Outcome of [`AuthSession::clear`]. Per-account removal failures are
/// logged and counted; they do not fail the clear.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearReport {
    pub removed: usize,
    pub failed: usize,
}

/// Owns the token cache and drives the identity provider.
///
/// Built once at start-up and shared (`Arc`) by the Graph client.
pub struct AuthSession {
    provider: Arc<dyn IdentityProvider>,
    scopes: Vec<String>,
    cache: Mutex<TokenCache>,
    // Serializes acquisitions so concurrent cache misses start one sign-in.
    acquire_lock: Mutex<()>,
}

impl AuthSession {
    pub fn new(provider: Arc<dyn IdentityProvider>, scopes: Vec<String>) -> Self {
        Self {
            provider,
            scopes,
            cache: Mutex::new(TokenCache::new()),
            acquire_lock: Mutex::new(()),
        }
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Returns a bearer token that has not expired. A cache hit makes no
    /// network call.
    pub async fn get_access_token(&self) -> Result<String, ConnectorError> {
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let _guard = self.acquire_lock.lock().await;
        // Another caller may have filled the cache while we waited.
        if let Some(token) = self.cached_token().await {
            return Ok(token);
        }

        let credential = self.acquire_and_store().await.map_err(|e| {
            ConnectorError::Authentication(format!("Failed to acquire access token: {}", e))
        })?;
        Ok(credential.access_token)
    }

    /// Runs the acquirer and caches the result.
    pub async fn acquire_token(&self) -> Result<Credential, AuthError> {
        let _guard = self.acquire_lock.lock().await;
        self.acquire_and_store().await
    }

    /// Drops the cached credential and forgets every account, then signs in
    /// again. Used after the app's permission scopes change.
    pub async fn refresh(&self) -> Result<String, ConnectorError> {
        self.clear().await;
        self.get_access_token().await
    }

    pub async fn clear(&self) -> ClearReport {
        self.cache.lock().await.clear();

        let accounts = match self.provider.accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!("Could not list accounts while clearing auth cache: {}", e);
                return ClearReport::default();
            }
        };

        let mut report = ClearReport::default();
        for account in &accounts {
            match self.provider.remove_account(account).await {
                Ok(()) => report.removed += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        account = %account.home_account_id,
                        "Failed to remove account from token cache: {}", e
                    );
                }
            }
        }
        info!(
            removed = report.removed,
            failed = report.failed,
            "Cleared authentication cache"
        );
        report
    }

    /// True when the provider knows at least one account. Says nothing about
    /// whether the cached token is still valid.
    pub async fn is_authenticated(&self) -> bool {
        match self.provider.accounts().await {
            Ok(accounts) => !accounts.is_empty(),
            Err(e) => {
                debug!("Account lookup failed: {}", e);
                false
            }
        }
    }

    async fn cached_token(&self) -> Option<String> {
        self.cache
            .lock()
            .await
            .get_cached()
            .map(|c| c.access_token.clone())
    }

    async fn acquire_and_store(&self) -> Result<Credential, AuthError> {
        let accounts = self.provider.accounts().await?;
        let credential = match AccountState::from_accounts(accounts) {
            AccountState::NoAccount => {
                debug!("No cached account, starting interactive sign-in");
                self.provider.acquire_token_interactive(&self.scopes).await?
            }
            AccountState::OneAccount(account) => {
                match self
                    .provider
                    .acquire_token_silent(&account, &self.scopes)
                    .await
                {
                    Ok(credential) => credential,
                    Err(AuthError::InteractionRequired(reason)) => {
                        info!("Silent token renewal needs interaction ({}), signing in", reason);
                        self.provider.acquire_token_interactive(&self.scopes).await?
                    }
                    Err(e) => return Err(e),
                }
            }
            AccountState::MultipleAccounts(n) => return Err(AuthError::AmbiguousAccount(n)),
        };

        debug!(
            account = %credential.account.home_account_id,
            expires_at = %credential.expires_at,
            "Acquired access token"
        );
        self.cache.lock().await.store(credential.clone());
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Clone, Copy)]
    enum Silent {
        Succeed,
        NeedsInteraction,
        Fail,
    }

    struct ScriptedProvider {
        accounts: StdMutex<Vec<Account>>,
        silent: Silent,
        expires_in: Duration,
        fail_removal_of: Option<String>,
        silent_calls: AtomicUsize,
        interactive_calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(accounts: usize, silent: Silent) -> Self {
            Self {
                accounts: StdMutex::new((0..accounts).map(|i| account(&format!("a{}", i))).collect()),
                silent,
                expires_in: Duration::hours(1),
                fail_removal_of: None,
                silent_calls: AtomicUsize::new(0),
                interactive_calls: AtomicUsize::new(0),
            }
        }

        fn network_calls(&self) -> usize {
            self.silent_calls.load(Ordering::SeqCst) + self.interactive_calls.load(Ordering::SeqCst)
        }

        fn credential(&self, token: String, account: Account) -> Credential {
            Credential {
                access_token: token,
                expires_at: Utc::now() + self.expires_in,
                account,
            }
        }
    }

    fn account(id: &str) -> Account {
        Account {
            home_account_id: id.to_string(),
            username: Some(format!("{}@contoso.com", id)),
            tenant_id: Some("tid".into()),
        }
    }

    #[async_trait]
    impl IdentityProvider for ScriptedProvider {
        async fn accounts(&self) -> Result<Vec<Account>, AuthError> {
            Ok(self.accounts.lock().unwrap().clone())
        }

        async fn remove_account(&self, account: &Account) -> Result<(), AuthError> {
            if self.fail_removal_of.as_deref() == Some(account.home_account_id.as_str()) {
                return Err(AuthError::AccountStore("locked".into()));
            }
            self.accounts
                .lock()
                .unwrap()
                .retain(|a| a.home_account_id != account.home_account_id);
            Ok(())
        }

        async fn acquire_token_silent(
            &self,
            account: &Account,
            _scopes: &[String],
        ) -> Result<Credential, AuthError> {
            let n = self.silent_calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.silent {
                Silent::Succeed => Ok(self.credential(format!("silent-{}", n), account.clone())),
                Silent::NeedsInteraction => {
                    Err(AuthError::InteractionRequired("invalid_grant".into()))
                }
                Silent::Fail => Err(AuthError::Provider("temporarily_unavailable".into())),
            }
        }

        async fn acquire_token_interactive(
            &self,
            _scopes: &[String],
        ) -> Result<Credential, AuthError> {
            let n = self.interactive_calls.fetch_add(1, Ordering::SeqCst) + 1;
            let acct = account("interactive");
            let mut accounts = self.accounts.lock().unwrap();
            if !accounts.contains(&acct) {
                accounts.push(acct.clone());
            }
            Ok(self.credential(format!("interactive-{}", n), acct))
        }
    }

    fn session(provider: Arc<ScriptedProvider>) -> AuthSession {
        AuthSession::new(provider, vec!["Sites.Read.All".into()])
    }

    #[test]
    fn account_state_from_count() {
        assert_eq!(AccountState::from_accounts(vec![]), AccountState::NoAccount);
        assert_eq!(
            AccountState::from_accounts(vec![account("x")]),
            AccountState::OneAccount(account("x"))
        );
        assert_eq!(
            AccountState::from_accounts(vec![account("x"), account("y"), account("z")]),
            AccountState::MultipleAccounts(3)
        );
    }

    #[tokio::test]
    async fn no_account_goes_interactive() {
        let provider = Arc::new(ScriptedProvider::new(0, Silent::Succeed));
        let session = session(provider.clone());
        let token = session.get_access_token().await.unwrap();
        assert_eq!(token, "interactive-1");
        assert_eq!(provider.silent_calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.interactive_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn one_account_tries_silent_first() {
        let provider = Arc::new(ScriptedProvider::new(1, Silent::Succeed));
        let session = session(provider.clone());
        assert_eq!(session.get_access_token().await.unwrap(), "silent-1");
        assert_eq!(provider.interactive_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn interaction_required_falls_back_to_interactive() {
        let provider = Arc::new(ScriptedProvider::new(1, Silent::NeedsInteraction));
        let session = session(provider.clone());
        assert_eq!(session.get_access_token().await.unwrap(), "interactive-1");
        assert_eq!(provider.silent_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.interactive_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn other_silent_errors_propagate_without_retry() {
        let provider = Arc::new(ScriptedProvider::new(1, Silent::Fail));
        let session = session(provider.clone());
        let err = session.get_access_token().await.unwrap_err();
        match err {
            ConnectorError::Authentication(msg) => {
                assert!(msg.starts_with("Failed to acquire access token"));
                assert!(msg.contains("temporarily_unavailable"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(provider.silent_calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.interactive_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn multiple_accounts_fail_without_network() {
        let provider = Arc::new(ScriptedProvider::new(2, Silent::Succeed));
        let session = session(provider.clone());
        let err = session.acquire_token().await.unwrap_err();
        assert!(matches!(err, AuthError::AmbiguousAccount(2)));
        assert_eq!(provider.network_calls(), 0);
    }

    #[tokio::test]
    async fn cache_hit_skips_provider() {
        let provider = Arc::new(ScriptedProvider::new(1, Silent::Succeed));
        let session = session(provider.clone());
        let first = session.get_access_token().await.unwrap();
        let second = session.get_access_token().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.network_calls(), 1);
    }

    #[tokio::test]
    async fn expired_credential_is_reacquired() {
        let mut scripted = ScriptedProvider::new(1, Silent::Succeed);
        scripted.expires_in = Duration::zero();
        let provider = Arc::new(scripted);
        let session = session(provider.clone());
        assert_eq!(session.get_access_token().await.unwrap(), "silent-1");
        assert_eq!(session.get_access_token().await.unwrap(), "silent-2");
    }

    #[tokio::test]
    async fn clear_then_get_always_reacquires() {
        let provider = Arc::new(ScriptedProvider::new(0, Silent::Succeed));
        let session = session(provider.clone());
        assert_eq!(session.get_access_token().await.unwrap(), "interactive-1");
        assert!(session.is_authenticated().await);

        let report = session.clear().await;
        assert_eq!(report, ClearReport { removed: 1, failed: 0 });
        assert!(session.cache.lock().await.is_empty());
        assert!(!session.is_authenticated().await);

        assert_eq!(session.get_access_token().await.unwrap(), "interactive-2");
    }

    #[tokio::test]
    async fn refresh_forces_new_sign_in() {
        let provider = Arc::new(ScriptedProvider::new(1, Silent::Succeed));
        let session = session(provider.clone());
        assert_eq!(session.get_access_token().await.unwrap(), "silent-1");
        assert_eq!(session.refresh().await.unwrap(), "interactive-1");
    }

    #[tokio::test]
    async fn clear_continues_past_failed_removals() {
        let mut scripted = ScriptedProvider::new(3, Silent::Succeed);
        scripted.fail_removal_of = Some("a1".into());
        let provider = Arc::new(scripted);
        let session = session(provider.clone());

        let report = session.clear().await;
        assert_eq!(report, ClearReport { removed: 2, failed: 1 });
        let remaining = provider.accounts().await.unwrap();
        assert_eq!(remaining, vec![account("a1")]);
    }

    #[tokio::test]
    async fn concurrent_misses_acquire_once() {
        let provider = Arc::new(ScriptedProvider::new(1, Silent::Succeed));
        let session = Arc::new(session(provider.clone()));
        let (a, b) = tokio::join!(session.get_access_token(), session.get_access_token());
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(provider.silent_calls.load(Ordering::SeqCst), 1);
    }
}
