//! Per-user transcript store.
//!
//! A transcript is whatever JSON value the client last saved — typically a
//! list of ledger entries (`{label, amount, date, ...}`), but this layer
//! enforces no schema. Saves replace the file wholesale; there is no append
//! path and no merge between concurrent sessions (last write wins).
//!
//! Unlike credential records, transcript writes are plain `fs::write` with
//! no temp-file step. A crash mid-write can corrupt the snapshot; that gap
//! is inherited from the system this replaces and is visible to callers as
//! [`TranscriptError::Corrupt`].

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use crate::accounts::username_is_valid;

/// Transcript file name inside each user directory.
const TRANSCRIPT_FILE: &str = "transcript.json";

#[derive(Debug, Error)]
pub enum TranscriptError {
    #[error("invalid username")]
    InvalidUsername,
    #[error("transcript for '{0}' is corrupt")]
    Corrupt(String),
    #[error("transcript serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Transcript store rooted at the accounts directory. Lifecycle is
/// independent from the credential store even though both share a root.
#[derive(Debug, Clone)]
pub struct TranscriptStore {
    root: PathBuf,
}

impl TranscriptStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn transcript_path(&self, username: &str) -> PathBuf {
        self.root.join(username).join(TRANSCRIPT_FILE)
    }

    /// Replace the user's transcript wholesale with `entries`.
    pub fn save(&self, username: &str, entries: &Value) -> Result<(), TranscriptError> {
        if !username_is_valid(username) {
            return Err(TranscriptError::InvalidUsername);
        }
        let path = self.transcript_path(username);
        ensure_parent(&path)?;
        fs::write(&path, serde_json::to_vec(entries)?)?;
        Ok(())
    }

    /// Return the last-saved transcript.
    ///
    /// A user who never saved gets `None` — and, as a side effect, an empty
    /// list is written so the next load returns `Some([])`. Clients of the
    /// original service rely on that first-miss-then-empty sequence, so the
    /// mutating read is kept deliberately.
    pub fn load(&self, username: &str) -> Result<Option<Value>, TranscriptError> {
        if !username_is_valid(username) {
            return Err(TranscriptError::InvalidUsername);
        }
        let path = self.transcript_path(username);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                ensure_parent(&path)?;
                fs::write(&path, b"[]")?;
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(entries) => Ok(Some(entries)),
            Err(e) => {
                tracing::error!(username, error = %e, "transcript failed to parse");
                Err(TranscriptError::Corrupt(username.to_string()))
            }
        }
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) => fs::create_dir_all(dir),
        None => Ok(()),
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, TranscriptStore) {
        let tmp = TempDir::new().unwrap();
        let store = TranscriptStore::new(tmp.path());
        (tmp, store)
    }

    #[test]
    fn save_then_load_returns_exact_entries() {
        let (_tmp, store) = test_store();

        let single = json!([{"label": "coffee", "amount": 4.5, "date": "2026-08-27"}]);
        store.save("alice", &single).unwrap();
        assert_eq!(store.load("alice").unwrap().unwrap(), single);

        let empty = json!([]);
        store.save("alice", &empty).unwrap();
        assert_eq!(store.load("alice").unwrap().unwrap(), empty);
    }

    #[test]
    fn save_replaces_wholesale_not_appends() {
        let (_tmp, store) = test_store();

        store.save("alice", &json!([{"label": "a"}, {"label": "b"}])).unwrap();
        store.save("alice", &json!([{"label": "c"}])).unwrap();
        assert_eq!(store.load("alice").unwrap().unwrap(), json!([{"label": "c"}]));
    }

    #[test]
    fn hundred_entry_round_trip() {
        let (_tmp, store) = test_store();

        let entries: Value = (0..100)
            .map(|i| json!({"label": format!("item-{i}"), "amount": i}))
            .collect::<Vec<_>>()
            .into();
        store.save("alice", &entries).unwrap();
        assert_eq!(store.load("alice").unwrap().unwrap(), entries);
    }

    #[test]
    fn non_list_values_survive_round_trip() {
        let (_tmp, store) = test_store();

        let object = json!({"note": "not a list"});
        store.save("alice", &object).unwrap();
        assert_eq!(store.load("alice").unwrap().unwrap(), object);
    }

    #[test]
    fn first_load_misses_and_initializes_empty() {
        let (_tmp, store) = test_store();

        assert!(store.load("alice").unwrap().is_none());
        assert_eq!(store.load("alice").unwrap().unwrap(), json!([]));
    }

    #[test]
    fn stores_share_a_root_with_independent_lifecycles() {
        let tmp = TempDir::new().unwrap();
        let accounts = crate::accounts::AccountStore::new(tmp.path());
        let transcripts = TranscriptStore::new(tmp.path());

        transcripts.save("alice", &json!([1, 2, 3])).unwrap();
        assert!(accounts.load("alice").unwrap().is_none(), "transcript does not imply account");

        accounts.create("alice", "secret123").unwrap();
        assert_eq!(transcripts.load("alice").unwrap().unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn corrupt_transcript_is_reported() {
        let (tmp, store) = test_store();

        let dir = tmp.path().join("alice");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(TRANSCRIPT_FILE), b"[1, 2").unwrap();

        assert!(matches!(store.load("alice"), Err(TranscriptError::Corrupt(_))));
    }

    #[test]
    fn invalid_username_is_rejected() {
        let (_tmp, store) = test_store();
        assert!(matches!(store.save("../etc", &json!([])), Err(TranscriptError::InvalidUsername)));
        assert!(matches!(store.load("../etc"), Err(TranscriptError::InvalidUsername)));
    }
}
