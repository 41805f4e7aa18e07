//! Session repository
//!
//! Thin query layer over the `sessions` table. The Session Authenticator
//! (C2) owns all policy (TTL, cache-aside, HMAC tagging) — this module only
//! knows how to insert, point-lookup, update, and bulk-delete rows.

use sqlx::SqlitePool;

use super::error::SqliteError;

/// A session row as stored. Timestamps are Unix seconds (UTC).
#[derive(Debug, Clone)]
pub struct SessionRow {
    pub id: String,
    pub user_id: i64,
    pub username: String,
    pub device_fingerprint: Option<String>,
    pub created_at: i64,
    pub last_activity: i64,
    pub expires_at: i64,
    pub active: bool,
}

#[allow(clippy::too_many_arguments)]
pub async fn insert(
    pool: &SqlitePool,
    id: &str,
    user_id: i64,
    username: &str,
    device_fingerprint: Option<&str>,
    created_at: i64,
    expires_at: i64,
) -> Result<(), SqliteError> {
    sqlx::query(
        "INSERT INTO sessions (id, user_id, username, device_fingerprint, created_at, last_activity, expires_at, active)
         VALUES (?, ?, ?, ?, ?, ?, ?, 1)",
    )
    .bind(id)
    .bind(user_id)
    .bind(username)
    .bind(device_fingerprint)
    .bind(created_at)
    .bind(created_at)
    .bind(expires_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Point lookup by session id (the primary key).
pub async fn find_by_id(pool: &SqlitePool, id: &str) -> Result<Option<SessionRow>, SqliteError> {
    let row = sqlx::query_as::<_, (String, i64, String, Option<String>, i64, i64, i64, i64)>(
        "SELECT id, user_id, username, device_fingerprint, created_at, last_activity, expires_at, active
         FROM sessions WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(
        |(id, user_id, username, device_fingerprint, created_at, last_activity, expires_at, active)| {
            SessionRow {
                id,
                user_id,
                username,
                device_fingerprint,
                created_at,
                last_activity,
                expires_at,
                active: active != 0,
            }
        },
    ))
}

/// Update `last_activity` for a session (touch on access).
pub async fn touch(pool: &SqlitePool, id: &str, last_activity: i64) -> Result<(), SqliteError> {
    sqlx::query("UPDATE sessions SET last_activity = ? WHERE id = ?")
        .bind(last_activity)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Mark a session inactive. Invalidation never deletes the row — it's kept
/// for audit/debugging until the sweeper reaps it past expiry.
pub async fn deactivate(pool: &SqlitePool, id: &str) -> Result<(), SqliteError> {
    sqlx::query("UPDATE sessions SET active = 0 WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Bulk delete every session that has expired or was explicitly
/// invalidated, as of `now`. Returns the number of rows removed.
pub async fn delete_expired_or_inactive(pool: &SqlitePool, now: i64) -> Result<u64, SqliteError> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= ? OR active = 0")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(crate::data::sqlite::schema::SCHEMA)
            .execute(&pool)
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_insert_and_find() {
        let pool = test_pool().await;
        insert(&pool, "sess1", 42, "ada", None, 1000, 2000)
            .await
            .unwrap();
        let row = find_by_id(&pool, "sess1").await.unwrap().unwrap();
        assert_eq!(row.user_id, 42);
        assert_eq!(row.username, "ada");
        assert!(row.active);
    }

    #[tokio::test]
    async fn test_find_missing_returns_none() {
        let pool = test_pool().await;
        assert!(find_by_id(&pool, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_touch_updates_last_activity() {
        let pool = test_pool().await;
        insert(&pool, "sess1", 1, "a", None, 1000, 2000).await.unwrap();
        touch(&pool, "sess1", 1500).await.unwrap();
        let row = find_by_id(&pool, "sess1").await.unwrap().unwrap();
        assert_eq!(row.last_activity, 1500);
    }

    #[tokio::test]
    async fn test_deactivate() {
        let pool = test_pool().await;
        insert(&pool, "sess1", 1, "a", None, 1000, 2000).await.unwrap();
        deactivate(&pool, "sess1").await.unwrap();
        let row = find_by_id(&pool, "sess1").await.unwrap().unwrap();
        assert!(!row.active);
    }

    #[tokio::test]
    async fn test_delete_expired_or_inactive() {
        let pool = test_pool().await;
        insert(&pool, "expired", 1, "a", None, 1000, 1500).await.unwrap();
        insert(&pool, "inactive", 1, "a", None, 1000, 9999).await.unwrap();
        insert(&pool, "live", 1, "a", None, 1000, 9999).await.unwrap();
        deactivate(&pool, "inactive").await.unwrap();

        let deleted = delete_expired_or_inactive(&pool, 2000).await.unwrap();
        assert_eq!(deleted, 2);
        assert!(find_by_id(&pool, "live").await.unwrap().is_some());
        assert!(find_by_id(&pool, "expired").await.unwrap().is_none());
        assert!(find_by_id(&pool, "inactive").await.unwrap().is_none());
    }
}
