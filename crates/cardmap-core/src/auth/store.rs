//! Token storage with expiry.
//!
//! Every backing implements [`TokenStore`]. Reads never fail: a missing,
//! expired, or unreadable token is simply absent, and storage errors are
//! logged and dropped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Token jar file name in the cache directory
const TOKEN_FILE: &str = "tokens.json";

/// Persisted lifetime when the user chose to stay signed in.
const REMEMBER_ME_DAYS: i64 = 7;

/// Persisted lifetime of the access token for a single-visit sign in.
const SINGLE_SESSION_DAYS: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    #[serde(rename = "accessToken")]
    Access,
    #[serde(rename = "refreshToken")]
    Refresh,
}

impl TokenKind {
    pub const ALL: [TokenKind; 2] = [TokenKind::Access, TokenKind::Refresh];

    /// Storage key, shared with the web client's cookie names
    pub fn name(self) -> &'static str {
        match self {
            TokenKind::Access => "accessToken",
            TokenKind::Refresh => "refreshToken",
        }
    }
}

/// How long each token is persisted, chosen at login time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetime {
    pub access: Duration,
    /// `None` means the refresh token is not kept at all.
    pub refresh: Option<Duration>,
}

impl TokenLifetime {
    pub fn for_remember_me(remember_me: bool) -> Self {
        if remember_me {
            Self {
                access: Duration::days(REMEMBER_ME_DAYS),
                refresh: Some(Duration::days(REMEMBER_ME_DAYS)),
            }
        } else {
            Self {
                access: Duration::days(SINGLE_SESSION_DAYS),
                refresh: None,
            }
        }
    }

    /// Store a freshly issued pair according to this lifetime.
    pub fn persist(&self, store: &dyn TokenStore, access_token: &str, refresh_token: &str) {
        store.set(TokenKind::Access, access_token, self.access);
        match self.refresh {
            Some(ttl) => store.set(TokenKind::Refresh, refresh_token, ttl),
            None => store.clear(TokenKind::Refresh),
        }
    }
}

pub trait TokenStore: Send + Sync {
    /// Returns the stored value, or `None` if absent or expired.
    fn get(&self, kind: TokenKind) -> Option<String>;

    /// Stores a value for `ttl`, overwriting any previous value.
    fn set(&self, kind: TokenKind, value: &str, ttl: Duration);

    /// Deletes a value regardless of its remaining lifetime.
    fn clear(&self, kind: TokenKind);

    fn clear_all(&self) {
        for kind in TokenKind::ALL {
            self.clear(kind);
        }
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *lock(&self.now)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn new(value: &str, ttl: Duration, now: DateTime<Utc>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: now + ttl,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory token store. Used by tests and by short-lived processes.
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<TokenKind, StoredToken>>,
    clock: Arc<dyn Clock>,
}

impl Default for MemoryTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        let now = self.clock.now();
        let mut entries = lock(&self.entries);
        let token = entries.get(&kind)?;
        if !token.is_expired_at(now) {
            return Some(token.value.clone());
        }
        debug!(token = kind.name(), "Stored token expired");
        entries.remove(&kind);
        None
    }

    fn set(&self, kind: TokenKind, value: &str, ttl: Duration) {
        let token = StoredToken::new(value, ttl, self.clock.now());
        lock(&self.entries).insert(kind, token);
    }

    fn clear(&self, kind: TokenKind) {
        lock(&self.entries).remove(&kind);
    }
}

/// Token jar persisted as JSON on disk, surviving process restarts.
pub struct FileTokenStore {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    // Serializes read-modify-write cycles on the jar file
    io: Mutex<()>,
}

type Jar = HashMap<TokenKind, StoredToken>;

impl FileTokenStore {
    pub fn new(cache_dir: &Path) -> Self {
        Self::with_clock(cache_dir, Arc::new(SystemClock))
    }

    pub fn with_clock(cache_dir: &Path, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: cache_dir.join(TOKEN_FILE),
            clock,
            io: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Jar> {
        if !self.path.exists() {
            return Ok(Jar::new());
        }
        let contents =
            std::fs::read_to_string(&self.path).context("Failed to read token jar")?;
        serde_json::from_str(&contents).context("Failed to parse token jar")
    }

    fn save(&self, jar: &Jar) -> Result<()> {
        if jar.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).context("Failed to remove token jar")?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(jar)?;
        std::fs::write(&self.path, contents).context("Failed to write token jar")?;
        Ok(())
    }

    fn update(&self, apply: impl FnOnce(&mut Jar)) {
        let _io = lock(&self.io);
        let mut jar = self.load().unwrap_or_else(|e| {
            warn!(error = %e, "Discarding unreadable token jar");
            Jar::new()
        });
        apply(&mut jar);
        if let Err(e) = self.save(&jar) {
            warn!(error = %e, path = %self.path.display(), "Failed to persist tokens");
        }
    }
}

impl TokenStore for FileTokenStore {
    fn get(&self, kind: TokenKind) -> Option<String> {
        let now = self.clock.now();
        let jar = {
            let _io = lock(&self.io);
            match self.load() {
                Ok(jar) => jar,
                Err(e) => {
                    warn!(error = %e, "Failed to load token jar");
                    return None;
                }
            }
        };

        let token = jar.get(&kind)?;
        if token.is_expired_at(now) {
            debug!(token = kind.name(), "Stored token expired");
            self.clear(kind);
            return None;
        }
        Some(token.value.clone())
    }

    fn set(&self, kind: TokenKind, value: &str, ttl: Duration) {
        let token = StoredToken::new(value, ttl, self.clock.now());
        self.update(|jar| {
            jar.insert(kind, token);
        });
    }

    fn clear(&self, kind: TokenKind) {
        self.update(|jar| {
            jar.remove(&kind);
        });
    }
}
