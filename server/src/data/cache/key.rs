//! Type-safe cache key builder with versioning

use crate::core::constants::CACHE_KEY_VERSION;

/// Type-safe cache key builder
///
/// All keys are prefixed with a version (e.g., "v1:") to allow
/// invalidating all cached data on schema changes.
pub struct CacheKey;

impl CacheKey {
    // =========================================================================
    // Rate Limiting
    // =========================================================================

    /// Cache key for rate limit counter
    ///
    /// Note: Rate limit keys are NOT versioned (counter semantics don't change)
    ///
    /// The identifier is used directly without escaping. Callers should ensure
    /// identifiers don't contain characters that could cause key collisions
    /// (e.g., bucket names shouldn't contain `:` and identifiers are typically
    /// IP addresses which are safe).
    pub fn rate_limit(bucket: &str, identifier: &str) -> String {
        format!("rl:{}:{}", bucket, identifier)
    }

    // =========================================================================
    // Activity result lookups (thin collaborator surface)
    // =========================================================================

    /// Cache key for a user's most recent activity summary
    pub fn activity_summary(user_id: i64, app: &str) -> String {
        format!("{}:activity:{}:{}", CACHE_KEY_VERSION, app, user_id)
    }
}
