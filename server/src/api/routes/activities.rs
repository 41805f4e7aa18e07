//! Activity result CRUD routes
//!
//! Thin handlers: persist a completed result row, then hand off to the
//! Achievement Evaluator (C5) and the Hub (C4) to demonstrate the
//! produced-by-collaborator / consumed-by-core contract. Scoring,
//! grading, and activity-specific logic belongs to the activity
//! collaborators themselves and is out of scope here.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::api::types::ApiError;
use crate::core::achievement::AchievementEvaluator;
use crate::core::hub::HubHandle;
use crate::core::message::Message;
use crate::data::sqlite::{SqlitePool, activities};

#[derive(Clone)]
pub struct ActivitiesState {
    pub pool: SqlitePool,
    pub hub: HubHandle,
    pub achievements: Arc<AchievementEvaluator>,
}

fn feed_payload(app: &str, user_id: i64, extra: Value) -> BTreeMap<String, Value> {
    let mut payload = BTreeMap::new();
    payload.insert("app".to_string(), Value::String(app.to_string()));
    payload.insert("user_id".to_string(), Value::from(user_id));
    if let Value::Object(map) = extra {
        for (k, v) in map {
            payload.insert(k, v);
        }
    }
    payload
}

fn publish_feed_and_progress(hub: &HubHandle, app: &str, user_id: i64, extra: Value) {
    let feed_topic = "activity:feed".to_string();
    hub.broadcast(
        feed_topic.clone(),
        Message::new_activity_feed(feed_topic, feed_payload(app, user_id, extra.clone())),
    );

    let progress_topic = format!("user:{user_id}:progress");
    hub.broadcast(
        progress_topic.clone(),
        Message::new_progress_update(
            progress_topic,
            user_id,
            feed_payload(app, user_id, extra),
        ),
    );
}

// === Typing ===

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitTypingResult {
    pub user_id: i64,
    pub username: String,
    pub wpm: f64,
    pub accuracy: f64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitResultResponse {
    pub id: i64,
    pub unlocked: Vec<String>,
}

pub async fn submit_typing_result(
    State(state): State<ActivitiesState>,
    Json(req): Json<SubmitTypingResult>,
) -> Result<Json<SubmitResultResponse>, ApiError> {
    let now = Utc::now().timestamp();
    let id = activities::insert_typing_result(&state.pool, req.user_id, req.wpm, req.accuracy, now)
        .await
        .map_err(ApiError::from_sqlite)?;

    let mut unlocked = Vec::new();
    unlocked.extend(
        state
            .achievements
            .check_score_milestone(req.user_id, &req.username, req.wpm.round() as i64, "typing")
            .into_iter()
            .map(|u| u.milestone_key),
    );
    unlocked.extend(
        state
            .achievements
            .check_accuracy_milestone(req.user_id, &req.username, req.accuracy)
            .into_iter()
            .map(|u| u.milestone_key),
    );

    publish_feed_and_progress(
        &state.hub,
        "typing",
        req.user_id,
        serde_json::json!({"wpm": req.wpm, "accuracy": req.accuracy}),
    );

    Ok(Json(SubmitResultResponse { id, unlocked }))
}

pub async fn list_typing_results(
    State(state): State<ActivitiesState>,
    axum::extract::Path(user_id): axum::extract::Path<i64>,
) -> Result<Json<Vec<activities::TypingResult>>, ApiError> {
    let results = activities::list_typing_results(&state.pool, user_id, 50)
        .await
        .map_err(ApiError::from_sqlite)?;
    Ok(Json(results))
}

// === Math ===

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitMathResult {
    pub user_id: i64,
    pub username: String,
    pub problems_correct: i64,
    pub problems_total: i64,
}

pub async fn submit_math_result(
    State(state): State<ActivitiesState>,
    Json(req): Json<SubmitMathResult>,
) -> Result<Json<SubmitResultResponse>, ApiError> {
    if req.problems_total == 0 {
        return Err(ApiError::bad_request(
            "INVALID_TOTAL",
            "problems_total must be greater than zero",
        ));
    }

    let now = Utc::now().timestamp();
    let id = activities::insert_math_result(
        &state.pool,
        req.user_id,
        req.problems_correct,
        req.problems_total,
        now,
    )
    .await
    .map_err(ApiError::from_sqlite)?;

    let accuracy_pct = (req.problems_correct as f64 / req.problems_total as f64) * 100.0;
    let mut unlocked = Vec::new();
    unlocked.extend(
        state
            .achievements
            .check_score_milestone(req.user_id, &req.username, req.problems_correct, "math")
            .into_iter()
            .map(|u| u.milestone_key),
    );
    unlocked.extend(
        state
            .achievements
            .check_accuracy_milestone(req.user_id, &req.username, accuracy_pct)
            .into_iter()
            .map(|u| u.milestone_key),
    );

    publish_feed_and_progress(
        &state.hub,
        "math",
        req.user_id,
        serde_json::json!({
            "problems_correct": req.problems_correct,
            "problems_total": req.problems_total,
        }),
    );

    Ok(Json(SubmitResultResponse { id, unlocked }))
}

pub async fn list_math_results(
    State(state): State<ActivitiesState>,
    axum::extract::Path(user_id): axum::extract::Path<i64>,
) -> Result<Json<Vec<activities::MathResult>>, ApiError> {
    let results = activities::list_math_results(&state.pool, user_id, 50)
        .await
        .map_err(ApiError::from_sqlite)?;
    Ok(Json(results))
}

// === Piano ===

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitPianoSession {
    pub user_id: i64,
    pub username: String,
    pub piece_name: Option<String>,
    pub duration_secs: i64,
}

pub async fn submit_piano_session(
    State(state): State<ActivitiesState>,
    Json(req): Json<SubmitPianoSession>,
) -> Result<Json<SubmitResultResponse>, ApiError> {
    let now = Utc::now().timestamp();
    let id = activities::insert_piano_session(
        &state.pool,
        req.user_id,
        req.piece_name.as_deref(),
        req.duration_secs,
        now,
    )
    .await
    .map_err(ApiError::from_sqlite)?;

    let session_count = activities::list_piano_sessions(&state.pool, req.user_id, u32::MAX)
        .await
        .map_err(ApiError::from_sqlite)?
        .len() as i64;

    let unlocked: Vec<String> = state
        .achievements
        .check_consistency_milestone(req.user_id, &req.username, session_count)
        .into_iter()
        .map(|u| u.milestone_key)
        .collect();

    publish_feed_and_progress(
        &state.hub,
        "piano",
        req.user_id,
        serde_json::json!({
            "piece_name": req.piece_name,
            "duration_secs": req.duration_secs,
        }),
    );

    Ok(Json(SubmitResultResponse { id, unlocked }))
}

pub async fn list_piano_sessions(
    State(state): State<ActivitiesState>,
    axum::extract::Path(user_id): axum::extract::Path<i64>,
) -> Result<Json<Vec<activities::PianoSession>>, ApiError> {
    let results = activities::list_piano_sessions(&state.pool, user_id, 50)
        .await
        .map_err(ApiError::from_sqlite)?;
    Ok(Json(results))
}

// === Reading ===

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitReadingSession {
    pub user_id: i64,
    pub username: String,
    pub pages_read: i64,
    pub duration_secs: i64,
}

pub async fn submit_reading_session(
    State(state): State<ActivitiesState>,
    Json(req): Json<SubmitReadingSession>,
) -> Result<Json<SubmitResultResponse>, ApiError> {
    let now = Utc::now().timestamp();
    let id = activities::insert_reading_session(
        &state.pool,
        req.user_id,
        req.pages_read,
        req.duration_secs,
        now,
    )
    .await
    .map_err(ApiError::from_sqlite)?;

    let session_count = activities::list_reading_sessions(&state.pool, req.user_id, u32::MAX)
        .await
        .map_err(ApiError::from_sqlite)?
        .len() as i64;

    let unlocked: Vec<String> = state
        .achievements
        .check_consistency_milestone(req.user_id, &req.username, session_count)
        .into_iter()
        .map(|u| u.milestone_key)
        .collect();

    publish_feed_and_progress(
        &state.hub,
        "reading",
        req.user_id,
        serde_json::json!({
            "pages_read": req.pages_read,
            "duration_secs": req.duration_secs,
        }),
    );

    Ok(Json(SubmitResultResponse { id, unlocked }))
}

pub async fn list_reading_sessions(
    State(state): State<ActivitiesState>,
    axum::extract::Path(user_id): axum::extract::Path<i64>,
) -> Result<Json<Vec<activities::ReadingSession>>, ApiError> {
    let results = activities::list_reading_sessions(&state.pool, user_id, 50)
        .await
        .map_err(ApiError::from_sqlite)?;
    Ok(Json(results))
}
