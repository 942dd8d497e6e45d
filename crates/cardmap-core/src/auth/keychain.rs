use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Duration;
use keyring::Entry;
use tracing::{debug, warn};

use super::store::{Clock, StoredToken, SystemClock, TokenKind, TokenStore};

const SERVICE_NAME: &str = "cardmap";

/// Token store backed by the OS keychain.
///
/// Each token is kept as a JSON envelope holding the value and its expiry,
/// since keychains have no notion of TTL.
pub struct KeyringTokenStore {
    service: String,
    clock: Arc<dyn Clock>,
}

impl Default for KeyringTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringTokenStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Use a separate keychain service, e.g. one per backend environment
    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    fn entry(&self, kind: TokenKind) -> Result<Entry> {
        Entry::new(&self.service, kind.name()).context("Failed to create keyring entry")
    }

    fn read(&self, kind: TokenKind) -> Result<Option<StoredToken>> {
        let entry = self.entry(kind)?;
        match entry.get_password() {
            Ok(envelope) => {
                let token = serde_json::from_str(&envelope)
                    .context("Failed to parse token from keychain")?;
                Ok(Some(token))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn write(&self, kind: TokenKind, token: &StoredToken) -> Result<()> {
        let envelope = serde_json::to_string(token)?;
        self.entry(kind)?
            .set_password(&envelope)
            .context("Failed to store token in keychain")
    }

    fn delete(&self, kind: TokenKind) -> Result<()> {
        match self.entry(kind)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete token from keychain"),
        }
    }
}

impl TokenStore for KeyringTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        match self.read(kind) {
            Ok(Some(token)) if token.is_expired_at(self.clock.now()) => {
                debug!(token = kind.name(), "Keychain token expired");
                self.clear(kind);
                None
            }
            Ok(token) => token.map(|t| t.value),
            Err(e) => {
                warn!(error = %e, token = kind.name(), "Keychain read failed");
                None
            }
        }
    }

    fn set(&self, kind: TokenKind, value: &str, ttl: Duration) {
        let token = StoredToken::new(value, ttl, self.clock.now());
        if let Err(e) = self.write(kind, &token) {
            warn!(error = %e, token = kind.name(), "Keychain write failed");
        }
    }

    fn clear(&self, kind: TokenKind) {
        if let Err(e) = self.delete(kind) {
            warn!(error = %e, token = kind.name(), "Keychain delete failed");
        }
    }
}
