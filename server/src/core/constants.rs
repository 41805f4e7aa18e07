// =============================================================================
// Application Identity
// =============================================================================

/// Application name in title case (for display and platform directories)
pub const APP_NAME: &str = "ClassPulse";

/// Application name in lowercase (for paths and identifiers)
pub const APP_NAME_LOWER: &str = "classpulse";

/// Unix-style dotfile folder name
pub const APP_DOT_FOLDER: &str = ".classpulse";

// =============================================================================
// Configuration Files
// =============================================================================

/// Config file name
pub const CONFIG_FILE_NAME: &str = "classpulse.json";

/// Environment variable for config file path
pub const ENV_CONFIG: &str = "CLASSPULSE_CONFIG";

// =============================================================================
// Environment Variables - Debug
// =============================================================================

/// Environment variable for debug mode
pub const ENV_DEBUG: &str = "CLASSPULSE_DEBUG";

// =============================================================================
// Environment Variables - Server
// =============================================================================

/// Environment variable for server host
pub const ENV_HOST: &str = "CLASSPULSE_HOST";

/// Environment variable for server port
pub const ENV_PORT: &str = "CLASSPULSE_PORT";

/// Environment variable for log level/filter
pub const ENV_LOG: &str = "CLASSPULSE_LOG";

// =============================================================================
// Server Defaults
// =============================================================================

/// Default server host
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default server port
pub const DEFAULT_PORT: u16 = 5388;

/// Default body limit for general API requests (1 MB)
pub const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

/// Body limit for auth endpoints (64 KB)
pub const AUTH_BODY_LIMIT: usize = 64 * 1024;

// =============================================================================
// Environment Variables - Storage
// =============================================================================

/// Environment variable to override data directory
pub const ENV_DATA_DIR: &str = "CLASSPULSE_DATA_DIR";

// =============================================================================
// Environment Variables - Secrets
// =============================================================================

/// Environment variable to force specific secrets backend
///
/// Platform-specific values:
/// - macOS: `keychain` (default)
/// - Windows: `credential-manager`
/// - Linux: `secret-service`, `keyutils`
/// - All platforms: `file`, `env`
pub const ENV_SECRETS_BACKEND: &str = "CLASSPULSE_SECRETS_BACKEND";

/// Service name for keychain/credential manager entries
pub const SECRET_SERVICE_NAME: &str = "classpulse";

/// Secret vault key for the session-token signing key (HMAC tag appended to
/// opaque session ids to detect tampering in transit)
pub const SECRET_KEY_SESSION_SIGNING: &str = "session_signing_key";

// =============================================================================
// Session Authenticator (C2)
// =============================================================================

/// Default session TTL in hours (expires_at is fixed at creation time, no
/// sliding refresh)
pub const DEFAULT_SESSION_TTL_HOURS: u64 = 24;

/// Length (bytes) of the random session id before hex-encoding (128 bits)
pub const SESSION_ID_RANDOM_BYTES: usize = 16;

/// Authenticator cache sweep interval
pub const SESSION_SWEEP_INTERVAL_SECS: u64 = 60 * 60;

/// Environment variable overriding the session TTL, in hours
pub const ENV_SESSION_TTL_HOURS: &str = "CLASSPULSE_SESSION_TTL_HOURS";

// =============================================================================
// Hub / Connection (C3, C4)
// =============================================================================

/// Bounded outbound queue size per connection
pub const HUB_OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// Reader receive deadline
pub const CONNECTION_READ_DEADLINE_SECS: u64 = 60;

/// Writer write deadline per frame
pub const CONNECTION_WRITE_DEADLINE_SECS: u64 = 10;

/// Transport-level ping interval, independent of queue activity
pub const CONNECTION_PING_INTERVAL_SECS: u64 = 54;

/// Capacity of the hub's internal event-loop channels (register/unregister/
/// broadcast/stop). Generous since the loop drains them continuously; this
/// is not a spec-mandated bound, just an implementation buffer.
pub const HUB_EVENT_CHANNEL_CAPACITY: usize = 4096;

// =============================================================================
// SQLite Database
// =============================================================================

/// SQLite database filename
pub const SQLITE_DB_FILENAME: &str = "classpulse.db";

/// SQLite connection pool max connections
pub const SQLITE_MAX_CONNECTIONS: u32 = 5;

/// SQLite busy timeout in seconds
pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 30;

/// SQLite cache size (negative = KB, so -64000 = 64MB)
pub const SQLITE_CACHE_SIZE: &str = "-64000";

/// SQLite WAL auto-checkpoint threshold (pages, ~4MB at 1000)
pub const SQLITE_WAL_AUTOCHECKPOINT: &str = "1000";

/// WAL checkpoint interval in seconds (5 minutes)
pub const SQLITE_CHECKPOINT_INTERVAL_SECS: u64 = 300;

// =============================================================================
// Shutdown
// =============================================================================

/// Graceful shutdown timeout in seconds
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// Cache (ambient HTTP-facing rate limiting / ephemeral summaries)
// =============================================================================

/// Environment variable for cache max entries
pub const ENV_CACHE_MAX_ENTRIES: &str = "CLASSPULSE_CACHE_MAX_ENTRIES";

/// Default cache max entries
pub const DEFAULT_CACHE_MAX_ENTRIES: u64 = 50_000;

/// Cache key version (bump on schema changes to invalidate all cached data)
pub const CACHE_KEY_VERSION: &str = "v1";

/// Cache TTL for negative (not-found) results (30 sec - short)
pub const CACHE_TTL_NEGATIVE: u64 = 30;

// =============================================================================
// Rate Limiting
// =============================================================================

/// Environment variable for rate limit enabled
pub const ENV_RATE_LIMIT_ENABLED: &str = "CLASSPULSE_RATE_LIMIT_ENABLED";

/// Environment variable for auth rate limit (requests per minute)
pub const ENV_RATE_LIMIT_AUTH_RPM: &str = "CLASSPULSE_RATE_LIMIT_AUTH_RPM";

/// Default auth rate limit (requests per minute) — bounds session creation
pub const DEFAULT_RATE_LIMIT_AUTH_RPM: u32 = 30;

/// Rate limit window in seconds (fixed 1-minute window)
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

// =============================================================================
// Error Message Limits
// =============================================================================

/// Maximum length for an outbound error frame's `message` field
pub const ERROR_MESSAGE_MAX_LEN: usize = 2048;
