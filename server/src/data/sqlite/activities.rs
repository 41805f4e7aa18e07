//! Activity result repositories
//!
//! Thin query layer over the four per-activity result tables. Scoring and
//! validation logic belongs to the activity collaborators themselves (spec
//! Non-goals); this module only knows how to insert a completed result and
//! list the most recent ones for a user, mirroring `sessions.rs`'s style.

use serde::Serialize;
use sqlx::SqlitePool;

use super::error::SqliteError;

#[derive(Debug, Clone, Serialize)]
pub struct TypingResult {
    pub id: i64,
    pub user_id: i64,
    pub wpm: f64,
    pub accuracy: f64,
    pub completed_at: i64,
}

pub async fn insert_typing_result(
    pool: &SqlitePool,
    user_id: i64,
    wpm: f64,
    accuracy: f64,
    completed_at: i64,
) -> Result<i64, SqliteError> {
    let result = sqlx::query(
        "INSERT INTO typing_results (user_id, wpm, accuracy, completed_at) VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(wpm)
    .bind(accuracy)
    .bind(completed_at)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn list_typing_results(
    pool: &SqlitePool,
    user_id: i64,
    limit: u32,
) -> Result<Vec<TypingResult>, SqliteError> {
    let rows = sqlx::query_as::<_, (i64, i64, f64, f64, i64)>(
        "SELECT id, user_id, wpm, accuracy, completed_at FROM typing_results
         WHERE user_id = ? ORDER BY completed_at DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, user_id, wpm, accuracy, completed_at)| TypingResult {
            id,
            user_id,
            wpm,
            accuracy,
            completed_at,
        })
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct MathResult {
    pub id: i64,
    pub user_id: i64,
    pub problems_correct: i64,
    pub problems_total: i64,
    pub completed_at: i64,
}

pub async fn insert_math_result(
    pool: &SqlitePool,
    user_id: i64,
    problems_correct: i64,
    problems_total: i64,
    completed_at: i64,
) -> Result<i64, SqliteError> {
    let result = sqlx::query(
        "INSERT INTO math_results (user_id, problems_correct, problems_total, completed_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(problems_correct)
    .bind(problems_total)
    .bind(completed_at)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn list_math_results(
    pool: &SqlitePool,
    user_id: i64,
    limit: u32,
) -> Result<Vec<MathResult>, SqliteError> {
    let rows = sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
        "SELECT id, user_id, problems_correct, problems_total, completed_at FROM math_results
         WHERE user_id = ? ORDER BY completed_at DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(id, user_id, problems_correct, problems_total, completed_at)| MathResult {
                id,
                user_id,
                problems_correct,
                problems_total,
                completed_at,
            },
        )
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct PianoSession {
    pub id: i64,
    pub user_id: i64,
    pub piece_name: Option<String>,
    pub duration_secs: i64,
    pub completed_at: i64,
}

pub async fn insert_piano_session(
    pool: &SqlitePool,
    user_id: i64,
    piece_name: Option<&str>,
    duration_secs: i64,
    completed_at: i64,
) -> Result<i64, SqliteError> {
    let result = sqlx::query(
        "INSERT INTO piano_sessions (user_id, piece_name, duration_secs, completed_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(piece_name)
    .bind(duration_secs)
    .bind(completed_at)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn list_piano_sessions(
    pool: &SqlitePool,
    user_id: i64,
    limit: u32,
) -> Result<Vec<PianoSession>, SqliteError> {
    let rows = sqlx::query_as::<_, (i64, i64, Option<String>, i64, i64)>(
        "SELECT id, user_id, piece_name, duration_secs, completed_at FROM piano_sessions
         WHERE user_id = ? ORDER BY completed_at DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(id, user_id, piece_name, duration_secs, completed_at)| PianoSession {
                id,
                user_id,
                piece_name,
                duration_secs,
                completed_at,
            },
        )
        .collect())
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadingSession {
    pub id: i64,
    pub user_id: i64,
    pub pages_read: i64,
    pub duration_secs: i64,
    pub completed_at: i64,
}

pub async fn insert_reading_session(
    pool: &SqlitePool,
    user_id: i64,
    pages_read: i64,
    duration_secs: i64,
    completed_at: i64,
) -> Result<i64, SqliteError> {
    let result = sqlx::query(
        "INSERT INTO reading_sessions (user_id, pages_read, duration_secs, completed_at)
         VALUES (?, ?, ?, ?)",
    )
    .bind(user_id)
    .bind(pages_read)
    .bind(duration_secs)
    .bind(completed_at)
    .execute(pool)
    .await?;
    Ok(result.last_insert_rowid())
}

pub async fn list_reading_sessions(
    pool: &SqlitePool,
    user_id: i64,
    limit: u32,
) -> Result<Vec<ReadingSession>, SqliteError> {
    let rows = sqlx::query_as::<_, (i64, i64, i64, i64, i64)>(
        "SELECT id, user_id, pages_read, duration_secs, completed_at FROM reading_sessions
         WHERE user_id = ? ORDER BY completed_at DESC LIMIT ?",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(
            |(id, user_id, pages_read, duration_secs, completed_at)| ReadingSession {
                id,
                user_id,
                pages_read,
                duration_secs,
                completed_at,
            },
        )
        .collect())
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
    async fn test_insert_and_list_typing_results() {
        let pool = test_pool().await;
        insert_typing_result(&pool, 1, 55.0, 97.5, 1000)
            .await
            .unwrap();
        insert_typing_result(&pool, 1, 60.0, 98.0, 2000)
            .await
            .unwrap();
        insert_typing_result(&pool, 2, 40.0, 90.0, 1500)
            .await
            .unwrap();

        let results = list_typing_results(&pool, 1, 10).await.unwrap();
        assert_eq!(results.len(), 2);
        // Most recent first
        assert_eq!(results[0].wpm, 60.0);
        assert_eq!(results[1].wpm, 55.0);
    }

    #[tokio::test]
    async fn test_insert_and_list_math_results() {
        let pool = test_pool().await;
        insert_math_result(&pool, 1, 8, 10, 1000).await.unwrap();
        let results = list_math_results(&pool, 1, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].problems_correct, 8);
        assert_eq!(results[0].problems_total, 10);
    }

    #[tokio::test]
    async fn test_insert_and_list_piano_sessions() {
        let pool = test_pool().await;
        insert_piano_session(&pool, 1, Some("Fur Elise"), 300, 1000)
            .await
            .unwrap();
        let results = list_piano_sessions(&pool, 1, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].piece_name.as_deref(), Some("Fur Elise"));
    }

    #[tokio::test]
    async fn test_insert_and_list_reading_sessions() {
        let pool = test_pool().await;
        insert_reading_session(&pool, 1, 12, 600, 1000)
            .await
            .unwrap();
        let results = list_reading_sessions(&pool, 1, 10).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].pages_read, 12);
    }

    #[tokio::test]
    async fn test_list_respects_limit() {
        let pool = test_pool().await;
        for i in 0..5 {
            insert_math_result(&pool, 1, i, 10, 1000 + i).await.unwrap();
        }
        let results = list_math_results(&pool, 1, 2).await.unwrap();
        assert_eq!(results.len(), 2);
    }
}
