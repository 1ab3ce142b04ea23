//! Configuration: TOML file + serde defaults + environment overrides.
//!
//! Discovery order for the accounts root: `COFFER_ACCOUNTS_DIR` env var,
//! then `[storage] accounts_dir` from the config file, then the platform
//! data directory (`ProjectDirs`), then `./accounts` as a last resort.
//! CLI flags override file values; `main` applies those on top.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub gateway: GatewayConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
    /// Sliding-window limit on credential attempts per client per minute
    /// (0 = unlimited).
    pub credential_rate_limit_per_minute: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8080,
            request_timeout_secs: 30,
            max_body_bytes: 65_536,
            credential_rate_limit_per_minute: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthConfig {
    /// Session lifetime in seconds.
    pub session_ttl_secs: u64,
    /// Whether new user registration is allowed.
    pub allow_registration: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 24 * 3600,
            allow_registration: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    /// Accounts root: one directory per username.
    pub accounts_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            accounts_dir: default_accounts_dir(),
        }
    }
}

impl Config {
    /// Load configuration. An explicit path must exist; the default path is
    /// optional and silently skipped when absent.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::read_from(path)?,
            None => match Self::default_path().filter(|p| p.exists()) {
                Some(path) => Self::read_from(&path)?,
                None => Self::default(),
            },
        };

        if let Ok(dir) = std::env::var("COFFER_ACCOUNTS_DIR") {
            if !dir.trim().is_empty() {
                config.storage.accounts_dir = PathBuf::from(dir);
            }
        }
        Ok(config)
    }

    fn read_from(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config at {}", path.display()))?;
        toml::from_str(&raw)
            .with_context(|| format!("failed to parse config at {}", path.display()))
    }

    /// Default config file location (`<config dir>/coffer.toml`).
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "coffer").map(|dirs| dirs.config_dir().join("coffer.toml"))
    }
}

fn default_accounts_dir() -> PathBuf {
    ProjectDirs::from("", "", "coffer")
        .map(|dirs| dirs.data_dir().join("accounts"))
        .unwrap_or_else(|| PathBuf::from("accounts"))
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.max_body_bytes, 65_536);
        assert_eq!(config.auth.session_ttl_secs, 86_400);
        assert!(config.auth.allow_registration);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [gateway]
            port = 9000

            [auth]
            allow_registration = false
            "#,
        )
        .unwrap();
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.host, "127.0.0.1");
        assert!(!config.auth.allow_registration);
        assert_eq!(config.auth.session_ttl_secs, 86_400);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result: Result<Config, _> = toml::from_str("[gateway]\nhosst = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn storage_section_overrides_accounts_dir() {
        let config: Config = toml::from_str("[storage]\naccounts_dir = \"/tmp/coffer-accounts\"\n").unwrap();
        assert_eq!(config.storage.accounts_dir, PathBuf::from("/tmp/coffer-accounts"));
    }
}
