// ABOUTME: Client-side TTL cache for thread credentials.
// ABOUTME: Keyed by local thread id; invalidated wholesale on sign-out.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::model::Credential;

/// Default credential lifetime: well under the token's own expiry.
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(15 * 60);

struct CachedCredential {
    credential: Credential,
    fetched_at: Instant,
}

/// TTL cache for [`Credential`]s, keyed by local thread id.
///
/// Lives on the client side of the HTTP boundary; the server never holds a
/// credential past one request/response cycle.
pub struct CredentialCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CachedCredential>>,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CREDENTIAL_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a live credential for a thread, evicting it if expired.
    pub fn get(&self, thread_id: &str) -> Option<Credential> {
        let mut entries = self.entries.lock().ok()?;
        match entries.get(thread_id) {
            Some(cached) if cached.fetched_at.elapsed() < self.ttl => {
                Some(cached.credential.clone())
            }
            Some(_) => {
                entries.remove(thread_id);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, thread_id: &str, credential: Credential) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                thread_id.to_string(),
                CachedCredential {
                    credential,
                    fetched_at: Instant::now(),
                },
            );
        }
    }

    /// Drop everything; called on sign-out.
    pub fn invalidate_all(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}
