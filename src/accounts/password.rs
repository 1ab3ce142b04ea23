//! Password hashing contract.
//!
//! Wraps the RustCrypto `pbkdf2` crate: PBKDF2-SHA256 with a fresh random
//! salt per call, encoded as a PHC string. The digest is opaque to the rest
//! of the crate — callers only ever pass it back to [`verify`].

use pbkdf2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Pbkdf2,
};

/// Hash a password into a self-describing PHC string.
pub fn hash(password: &str) -> Result<String, pbkdf2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Pbkdf2.hash_password(password.as_bytes(), &salt)?.to_string())
}

/// Verify a password against a stored PHC digest.
///
/// Returns `false` for a malformed digest rather than erroring — a corrupt
/// hash must never let a login through.
pub fn verify(digest: &str, password: &str) -> bool {
    PasswordHash::new(digest)
        .map(|parsed| Pbkdf2.verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

/// Burn roughly one hash worth of CPU when the account doesn't exist, so a
/// failed login takes about as long either way. Best-effort: registration
/// already reveals existence through its conflict response.
pub fn equalize(password: &str) {
    let _ = hash(password);
}

// ── Tests ───────────────────────────────────────────────────────────
