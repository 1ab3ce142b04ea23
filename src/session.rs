//! In-memory session store.
//!
//! Maps a bearer token (delivered to the browser as an `HttpOnly` cookie) to
//! the authenticated username. Only the SHA-256 of each token is kept
//! server-side; the plaintext token exists once, in the `Set-Cookie` header.
//! Entries expire after a TTL and expired entries are swept opportunistically
//! on every mutation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Token byte length before hex encoding (32 bytes = 64 hex chars).
const TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone)]
struct SessionEntry {
    username: String,
    expires_at: Instant,
}

/// Server-held session map, keyed by token hash.
#[derive(Debug)]
pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Create a session for an authenticated username.
    /// Returns the plaintext token (only revealed once).
    pub fn create(&self, username: &str) -> String {
        let token = generate_token();
        let now = Instant::now();

        let mut sessions = self.sessions.lock();
        sessions.retain(|_, entry| entry.expires_at > now);
        sessions.insert(
            hash_token(&token),
            SessionEntry {
                username: username.to_string(),
                expires_at: now + self.ttl,
            },
        );
        token
    }

    /// Resolve a token to its username. `None` when unknown or expired.
    pub fn resolve(&self, token: &str) -> Option<String> {
        let sessions = self.sessions.lock();
        let entry = sessions.get(&hash_token(token))?;
        (entry.expires_at > Instant::now()).then(|| entry.username.clone())
    }

    /// Destroy a session (logout, or a guard clearing a stale session).
    /// Returns whether a live entry was removed.
    pub fn revoke(&self, token: &str) -> bool {
        self.sessions.lock().remove(&hash_token(token)).is_some()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.sessions
            .lock()
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Generate a random session token (hex-encoded).
fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Hash a session token (SHA-256, single pass — tokens are already high-entropy).
fn hash_token(token: &str) -> String {
    let mut h = Sha256::new();
    h.update(token.as_bytes());
    hex::encode(h.finalize())
}

// ── Tests ───────────────────────────────────────────────────────────
