//! Layered application configuration
//!
//! Configuration is resolved in three layers, lowest to highest precedence:
//!
//! 1. Hardcoded defaults (`constants.rs`)
//! 2. A profile-wide config file in the platform data directory
//!    (`classpulse.json`), optionally followed by a local file named with
//!    `--config`/`CLASSPULSE_CONFIG`
//! 3. CLI flags / environment variables (see `cli.rs`)
//!
//! Each layer only needs to specify the fields it wants to override; every
//! field in [`FileConfig`] is `Option<T>` so a partial file is valid.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::cli::CliConfig;
use super::constants::{
    CONFIG_FILE_NAME, DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_HOST, DEFAULT_PORT,
    DEFAULT_RATE_LIMIT_AUTH_RPM, DEFAULT_SESSION_TTL_HOURS,
};
use super::storage::AppStorage;

/// Server bind configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Authentication gate (disabled only for local development)
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub enabled: bool,
}

/// Session Authenticator (C2) configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session lifetime in hours. Fixed at creation; sessions never refresh
    /// their expiry on use.
    pub ttl_hours: u64,
}

/// Moka eviction policy selector.
///
/// Moka's cache always runs TinyLFU internally; `Lru` is accepted for
/// config-file compatibility but has identical behavior to `TinyLfu`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EvictionPolicy {
    TinyLfu,
    Lru,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::TinyLfu
    }
}

/// HTTP-facing ambient cache configuration (rate limiting, activity summaries)
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: u64,
    pub eviction_policy: EvictionPolicy,
}

/// Rate limiting configuration. Only the session-creation (auth) endpoint is
/// rate limited; the WebSocket upgrade itself is gated by session validity,
/// not request volume.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub enabled: bool,
    pub auth_rpm: u32,
}

/// Secret storage backend selector, threaded through from CLI/config/env into
/// [`crate::core::secret::SecretManager`]'s platform detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SecretsBackend {
    Keychain,
    CredentialManager,
    SecretService,
    Keyutils,
    File,
}

/// Secrets configuration
#[derive(Debug, Clone, Default)]
pub struct SecretsConfig {
    pub backend: Option<SecretsBackend>,
}

/// Fully resolved application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub session: SessionConfig,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub secrets: SecretsConfig,
    pub debug: bool,
}

/// Partial configuration as read from a JSON file on disk. Every field is
/// optional so a user can override a single setting without restating
/// everything else.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FileConfig {
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    no_auth: Option<bool>,
    #[serde(default)]
    debug: Option<bool>,
    #[serde(default)]
    session_ttl_hours: Option<u64>,
    #[serde(default)]
    cache_max_entries: Option<u64>,
    #[serde(default)]
    rate_limit_enabled: Option<bool>,
    #[serde(default)]
    rate_limit_auth_rpm: Option<u32>,
    #[serde(default)]
    secrets_backend: Option<SecretsBackend>,
}

impl FileConfig {
    /// Load a config file, treating a missing file as an empty (all-None) config.
    async fn load_from(path: &Path) -> Result<Self> {
        match tokio::fs::read_to_string(path).await {
            Ok(json) => serde_json::from_str(&json)
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read config file: {}", path.display()))
            }
        }
    }

    /// Merge `other` on top of `self`; fields set in `other` win.
    fn merge(self, other: Self) -> Self {
        Self {
            host: other.host.or(self.host),
            port: other.port.or(self.port),
            no_auth: other.no_auth.or(self.no_auth),
            debug: other.debug.or(self.debug),
            session_ttl_hours: other.session_ttl_hours.or(self.session_ttl_hours),
            cache_max_entries: other.cache_max_entries.or(self.cache_max_entries),
            rate_limit_enabled: other.rate_limit_enabled.or(self.rate_limit_enabled),
            rate_limit_auth_rpm: other.rate_limit_auth_rpm.or(self.rate_limit_auth_rpm),
            secrets_backend: other.secrets_backend.or(self.secrets_backend),
        }
    }
}

/// Path to the profile-wide config file in the platform data directory
fn get_profile_config_path() -> PathBuf {
    AppStorage::resolve_data_dir().join(CONFIG_FILE_NAME)
}

impl AppConfig {
    /// Resolve the final configuration from CLI args, the profile config
    /// file, an optional local config file, and hardcoded defaults.
    pub async fn load(cli: &CliConfig) -> Result<Self> {
        let profile_config = FileConfig::load_from(&get_profile_config_path()).await?;

        let local_config = match &cli.config {
            Some(path) => FileConfig::load_from(path).await?,
            None => FileConfig::default(),
        };

        let file_config = profile_config.merge(local_config);

        let host = cli
            .host
            .clone()
            .or(file_config.host)
            .unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = cli.port.or(file_config.port).unwrap_or(DEFAULT_PORT);

        let no_auth = cli.no_auth || file_config.no_auth.unwrap_or(false);
        let debug = cli.debug || file_config.debug.unwrap_or(false);

        let session_ttl_hours = cli
            .session_ttl_hours
            .or(file_config.session_ttl_hours)
            .unwrap_or(DEFAULT_SESSION_TTL_HOURS);

        let cache_max_entries = cli
            .cache_max_entries
            .or(file_config.cache_max_entries)
            .unwrap_or(DEFAULT_CACHE_MAX_ENTRIES);

        let rate_limit_enabled = cli
            .rate_limit_enabled
            .or(file_config.rate_limit_enabled)
            .unwrap_or(true);
        let rate_limit_auth_rpm = cli
            .rate_limit_auth_rpm
            .or(file_config.rate_limit_auth_rpm)
            .unwrap_or(DEFAULT_RATE_LIMIT_AUTH_RPM);

        let secrets_backend = cli.secrets_backend.or(file_config.secrets_backend);

        Ok(Self {
            server: ServerConfig { host, port },
            auth: AuthConfig { enabled: !no_auth },
            session: SessionConfig {
                ttl_hours: session_ttl_hours,
            },
            cache: CacheConfig {
                max_entries: cache_max_entries,
                eviction_policy: EvictionPolicy::TinyLfu,
            },
            rate_limit: RateLimitConfig {
                enabled: rate_limit_enabled,
                auth_rpm: rate_limit_auth_rpm,
            },
            secrets: SecretsConfig {
                backend: secrets_backend,
            },
            debug,
        })
    }

    /// Build a config with only hardcoded defaults, bypassing file/CLI
    /// resolution. Used by tests and `system prune`.
    pub fn defaults() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_HOST.to_string(),
                port: DEFAULT_PORT,
            },
            auth: AuthConfig { enabled: true },
            session: SessionConfig {
                ttl_hours: DEFAULT_SESSION_TTL_HOURS,
            },
            cache: CacheConfig {
                max_entries: DEFAULT_CACHE_MAX_ENTRIES,
                eviction_policy: EvictionPolicy::TinyLfu,
            },
            rate_limit: RateLimitConfig {
                enabled: true,
                auth_rpm: DEFAULT_RATE_LIMIT_AUTH_RPM,
            },
            secrets: SecretsConfig::default(),
            debug: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_config_merge_prefers_other() {
        let base = FileConfig {
            host: Some("base-host".into()),
            port: Some(1111),
            ..Default::default()
        };
        let overlay = FileConfig {
            port: Some(2222),
            ..Default::default()
        };
        let merged = base.merge(overlay);
        assert_eq!(merged.host, Some("base-host".to_string()));
        assert_eq!(merged.port, Some(2222));
    }

    #[tokio::test]
    async fn test_load_from_missing_file_is_empty() {
        let path = PathBuf::from("/nonexistent/classpulse-test-config.json");
        let config = FileConfig::load_from(&path).await.unwrap();
        assert!(config.host.is_none());
        assert!(config.port.is_none());
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::defaults();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert!(config.auth.enabled);
        assert_eq!(config.session.ttl_hours, DEFAULT_SESSION_TTL_HOURS);
    }

    #[test]
    fn test_secrets_backend_serde_roundtrip() {
        let json = serde_json::to_string(&SecretsBackend::Keychain).unwrap();
        assert_eq!(json, "\"keychain\"");
        let parsed: SecretsBackend = serde_json::from_str("\"file\"").unwrap();
        assert_eq!(parsed, SecretsBackend::File);
    }
}
