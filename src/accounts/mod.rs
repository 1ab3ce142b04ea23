//! Account subsystem: credential records and password hashing.

pub mod password;
pub mod store;

pub use store::{username_is_valid, Account, AccountError, AccountStore};
