use chrono::{DateTime, Utc};

use super::Credential;

/// Single-slot credential cache.
///
/// A credential is fresh only while `now < expires_at`; a token expiring at
/// the current instant counts as expired. No leeway is applied.
#[derive(Debug, Default)]
pub struct TokenCache {
    slot: Option<Credential>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_cached(&self) -> Option<&Credential> {
        self.get_cached_at(Utc::now())
    }

    pub fn get_cached_at(&self, now: DateTime<Utc>) -> Option<&Credential> {
        self.slot.as_ref().filter(|c| now < c.expires_at)
    }

    /// Replaces whatever was held before.
    pub fn store(&mut self, credential: Credential) {
        self.slot = Some(credential);
    }

    pub fn clear(&mut self) {
        self.slot = None;
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none()
    }
}
