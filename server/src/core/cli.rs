use clap::{Parser, Subcommand};

use std::path::PathBuf;

use super::config::SecretsBackend;
use super::constants::{
    ENV_CACHE_MAX_ENTRIES, ENV_CONFIG, ENV_DEBUG, ENV_HOST, ENV_PORT, ENV_RATE_LIMIT_AUTH_RPM,
    ENV_RATE_LIMIT_ENABLED, ENV_SECRETS_BACKEND, ENV_SESSION_TTL_HOURS,
};

#[derive(Parser)]
#[command(name = "classpulse")]
#[command(version, about = "Realtime activity fan-out backend", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Server host address
    #[arg(long, short = 'H', global = true, env = ENV_HOST)]
    pub host: Option<String>,

    /// Server port
    #[arg(long, short = 'p', global = true, env = ENV_PORT)]
    pub port: Option<u16>,

    /// Disable authentication (for development)
    #[arg(long, global = true)]
    pub no_auth: bool,

    /// Enable debug logging
    #[arg(long, global = true, env = ENV_DEBUG)]
    pub debug: bool,

    /// Path to config file
    #[arg(long, short = 'c', global = true, env = ENV_CONFIG)]
    pub config: Option<PathBuf>,

    /// Session TTL in hours (fixed at creation; no sliding refresh)
    #[arg(long, global = true, env = ENV_SESSION_TTL_HOURS)]
    pub session_ttl_hours: Option<u64>,

    /// Maximum number of cache entries (HTTP-facing ambient cache)
    #[arg(long, global = true, env = ENV_CACHE_MAX_ENTRIES)]
    pub cache_max_entries: Option<u64>,

    /// Enable or disable rate limiting
    #[arg(long, global = true, env = ENV_RATE_LIMIT_ENABLED)]
    pub rate_limit_enabled: Option<bool>,

    /// Auth rate limit (session creations per minute per IP)
    #[arg(long, global = true, env = ENV_RATE_LIMIT_AUTH_RPM)]
    pub rate_limit_auth_rpm: Option<u32>,

    /// Secrets backend
    #[arg(long, global = true, env = ENV_SECRETS_BACKEND, value_parser = parse_secrets_backend)]
    pub secrets_backend: Option<SecretsBackend>,
}

/// Parse secrets backend from CLI/env string
fn parse_secrets_backend(s: &str) -> Result<SecretsBackend, String> {
    match s.to_lowercase().as_str() {
        "keychain" => Ok(SecretsBackend::Keychain),
        "credential-manager" => Ok(SecretsBackend::CredentialManager),
        "secret-service" => Ok(SecretsBackend::SecretService),
        "keyutils" => Ok(SecretsBackend::Keyutils),
        "file" => Ok(SecretsBackend::File),
        _ => Err(format!(
            "Invalid secrets backend '{}'. Valid: keychain, \
             credential-manager, secret-service, keyutils, file",
            s
        )),
    }
}

#[derive(Subcommand, Clone, Debug)]
pub enum Commands {
    /// Start the server (default command)
    Start,
    /// System maintenance commands
    System {
        #[command(subcommand)]
        command: SystemCommands,
    },
}

#[derive(Subcommand, Clone, Debug)]
pub enum SystemCommands {
    /// Delete local data directory (database, caches). Requires confirmation.
    Prune {
        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

/// Configuration derived from CLI arguments
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub no_auth: bool,
    pub debug: bool,
    pub config: Option<PathBuf>,
    pub session_ttl_hours: Option<u64>,
    pub cache_max_entries: Option<u64>,
    pub rate_limit_enabled: Option<bool>,
    pub rate_limit_auth_rpm: Option<u32>,
    pub secrets_backend: Option<SecretsBackend>,
}

/// Parse CLI arguments and return config with command
pub fn parse() -> (CliConfig, Option<Commands>) {
    let cli = Cli::parse();
    let config = CliConfig {
        host: cli.host,
        port: cli.port,
        no_auth: cli.no_auth,
        debug: cli.debug,
        config: cli.config,
        session_ttl_hours: cli.session_ttl_hours,
        cache_max_entries: cli.cache_max_entries,
        rate_limit_enabled: cli.rate_limit_enabled,
        rate_limit_auth_rpm: cli.rate_limit_auth_rpm,
        secrets_backend: cli.secrets_backend,
    };
    (config, cli.command)
}
