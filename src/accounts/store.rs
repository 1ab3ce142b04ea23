//! File-backed credential store.
//!
//! One directory per username under the accounts root; the credential record
//! lives at `<root>/<username>/account.json` as UTF-8 JSON, mode 0600.
//!
//! Record publishes are atomic and durable: serialize to a uniquely-named
//! temp file in the target directory, fsync it, then `hard_link` it onto the
//! final path. The link fails with `AlreadyExists` if the username is taken,
//! which makes registration race-free without any check-then-write window —
//! a crash at any point leaves either the previous record or no record, never
//! a half-written file under the final name.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::password;

/// Credential file name inside each user directory.
const ACCOUNT_FILE: &str = "account.json";

/// A persisted credential record for one username.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub username: String,
    /// Opaque PHC digest — never plaintext, never logged.
    pub password_hash: String,
    /// Set once at registration, immutable.
    pub created: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("invalid username: use 3-32 characters (letters, digits, underscore)")]
    InvalidUsername,
    #[error("password must not be empty")]
    EmptyPassword,
    #[error("username is already taken")]
    UsernameTaken,
    #[error("account record for '{0}' is corrupt")]
    CorruptRecord(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
    #[error("record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Usernames are path components; the pattern check doubles as the traversal
/// guard, so it must run before any path is built from caller input.
pub fn username_is_valid(username: &str) -> bool {
    (3..=32).contains(&username.len())
        && username
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

/// Credential store rooted at an accounts directory.
#[derive(Debug, Clone)]
pub struct AccountStore {
    root: PathBuf,
}

impl AccountStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Path of the credential file for a (validated) username.
    pub fn account_path(&self, username: &str) -> PathBuf {
        self.root.join(username).join(ACCOUNT_FILE)
    }

    /// Register a new account: validate, hash, stamp, publish atomically.
    pub fn create(&self, username: &str, password: &str) -> Result<Account, AccountError> {
        let username = username.trim();
        if !username_is_valid(username) {
            return Err(AccountError::InvalidUsername);
        }
        if password.is_empty() {
            return Err(AccountError::EmptyPassword);
        }

        let account = Account {
            username: username.to_string(),
            password_hash: password::hash(password)
                .map_err(|e| AccountError::Hash(e.to_string()))?,
            created: Utc::now(),
        };

        let dir = self.root.join(username);
        fs::create_dir_all(&dir)?;

        let final_path = dir.join(ACCOUNT_FILE);
        let tmp_path = dir.join(format!(".{}.{}.tmp", ACCOUNT_FILE, uuid::Uuid::new_v4()));

        write_private_sync(&tmp_path, &serde_json::to_vec_pretty(&account)?)?;

        // Exclusive publish: fails if the record already exists.
        let linked = fs::hard_link(&tmp_path, &final_path);
        let _ = fs::remove_file(&tmp_path);
        match linked {
            Ok(()) => {
                sync_dir(&dir)?;
                tracing::info!(username, "account record created");
                Ok(account)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(AccountError::UsernameTaken),
            Err(e) => Err(e.into()),
        }
    }

    /// Load a record, or `None` if no account exists for the username.
    pub fn load(&self, username: &str) -> Result<Option<Account>, AccountError> {
        if !username_is_valid(username) {
            return Ok(None);
        }
        let bytes = match fs::read(self.account_path(username)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(account) => Ok(Some(account)),
            Err(e) => {
                tracing::error!(username, error = %e, "account record failed to parse");
                Err(AccountError::CorruptRecord(username.to_string()))
            }
        }
    }

    /// Check a password attempt. `false` for unknown usernames after burning
    /// a dummy hash, so the two failure causes take similar time.
    pub fn verify(&self, username: &str, password: &str) -> Result<bool, AccountError> {
        match self.load(username)? {
            Some(account) => Ok(password::verify(&account.password_hash, password)),
            None => {
                password::equalize(password);
                Ok(false)
            }
        }
    }
}

/// Write bytes to `path` with owner-only permissions and force them to disk.
fn write_private_sync(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut opts = OpenOptions::new();
    opts.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(0o600);
    }
    let mut file = opts.open(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Fsync a directory so a just-published entry survives a crash.
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    #[cfg(unix)]
    File::open(dir)?.sync_all()?;
    #[cfg(not(unix))]
    let _ = dir;
    Ok(())
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, AccountStore) {
        let tmp = TempDir::new().unwrap();
        let store = AccountStore::new(tmp.path());
        (tmp, store)
    }

    #[test]
    fn create_then_load_round_trips() {
        let (_tmp, store) = test_store();

        let created = store.create("alice", "secret123").unwrap();
        let loaded = store.load("alice").unwrap().unwrap();

        assert_eq!(loaded.username, "alice");
        assert_eq!(loaded.password_hash, created.password_hash);
        assert_eq!(loaded.created, created.created);
    }

    #[test]
    fn verify_accepts_original_and_rejects_others() {
        let (_tmp, store) = test_store();

        store.create("alice", "secret123").unwrap();
        assert!(store.verify("alice", "secret123").unwrap());
        assert!(!store.verify("alice", "wrongpass").unwrap());
        assert!(!store.verify("alice", "").unwrap());
    }

    #[test]
    fn verify_unknown_username_is_false() {
        let (_tmp, store) = test_store();
        assert!(!store.verify("ghost", "anything").unwrap());
    }

    #[test]
    fn duplicate_create_conflicts_and_preserves_record() {
        let (_tmp, store) = test_store();

        store.create("alice", "secret123").unwrap();
        let before = fs::read(store.account_path("alice")).unwrap();

        let result = store.create("alice", "otherpass");
        assert!(matches!(result, Err(AccountError::UsernameTaken)));

        let after = fs::read(store.account_path("alice")).unwrap();
        assert_eq!(before, after, "existing record must be untouched");
    }

    #[test]
    fn invalid_usernames_are_rejected_without_files() {
        let (tmp, store) = test_store();

        for bad in ["ab", "", "a".repeat(33).as_str(), "no spaces", "dash-ed", "../../etc"] {
            let result = store.create(bad, "secret123");
            assert!(
                matches!(result, Err(AccountError::InvalidUsername)),
                "{bad:?} should be invalid"
            );
        }
        let leftover: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert!(leftover.is_empty(), "no files may be created: {leftover:?}");
    }

    #[test]
    fn empty_password_is_rejected() {
        let (_tmp, store) = test_store();
        let result = store.create("alice", "");
        assert!(matches!(result, Err(AccountError::EmptyPassword)));
    }

    #[test]
    fn crashed_temp_file_never_shadows_the_record() {
        let (_tmp, store) = test_store();

        store.create("alice", "secret123").unwrap();
        let before = fs::read(store.account_path("alice")).unwrap();

        // Simulate a writer that died between temp write and publish.
        let dir = store.account_path("alice").parent().unwrap().to_path_buf();
        fs::write(dir.join(".account.json.deadbeef.tmp"), b"{\"user").unwrap();

        let loaded = store.load("alice").unwrap().unwrap();
        assert_eq!(loaded.username, "alice");
        assert_eq!(fs::read(store.account_path("alice")).unwrap(), before);
    }

    #[test]
    fn crash_before_publish_leaves_absence_intact() {
        let (tmp, store) = test_store();

        // Only the crash artifact exists — no record was ever published.
        let dir = tmp.path().join("bob");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(".account.json.deadbeef.tmp"), b"{\"user").unwrap();

        assert!(store.load("bob").unwrap().is_none());
        assert!(!store.verify("bob", "anything").unwrap());
    }

    #[test]
    fn corrupt_record_is_reported_not_swallowed() {
        let (_tmp, store) = test_store();

        store.create("alice", "secret123").unwrap();
        fs::write(store.account_path("alice"), b"not json at all").unwrap();

        let result = store.load("alice");
        assert!(matches!(result, Err(AccountError::CorruptRecord(_))));
    }

    #[cfg(unix)]
    #[test]
    fn credential_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (_tmp, store) = test_store();
        store.create("alice", "secret123").unwrap();

        let mode = fs::metadata(store.account_path("alice"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn username_pattern_boundaries() {
        assert!(username_is_valid("abc"));
        assert!(username_is_valid("a_1"));
        assert!(username_is_valid(&"a".repeat(32)));
        assert!(!username_is_valid("ab"));
        assert!(!username_is_valid(&"a".repeat(33)));
        assert!(!username_is_valid("café"));
        assert!(!username_is_valid("a/b_c"));
    }
}
