//! Coffer — a file-backed account and transcript web service.
//!
//! Users register and log in with hashed-password credentials stored as one
//! JSON record per username; an authenticated session can then persist and
//! retrieve an arbitrary "transcript" of ledger entries. All state lives on
//! the filesystem under a single accounts root.

pub mod accounts;
pub mod config;
pub mod gateway;
pub mod session;
pub mod transcript;
