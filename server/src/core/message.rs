//! Message envelope (C1)
//!
//! The only wire format the Realtime Fan-Out Core speaks. A [`Message`] is
//! immutable once constructed — every constructor stamps `timestamp = now()`
//! and there is no mutation API. `serialize`/`parse` round-trip through the
//! canonical JSON object.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Closed set of recognized frame kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MessageKind {
    Subscribe,
    Unsubscribe,
    Ping,
    Pong,
    LeaderboardUpdate,
    RankChange,
    ProgressUpdate,
    AchievementUnlocked,
    ActivityFeed,
    Error,
}

impl MessageKind {
    /// The wire-format `type` string for this kind.
    pub const fn as_wire_str(self) -> &'static str {
        match self {
            Self::Subscribe => "subscribe",
            Self::Unsubscribe => "unsubscribe",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::LeaderboardUpdate => "leaderboard.update",
            Self::RankChange => "rank.change",
            Self::ProgressUpdate => "progress.update",
            Self::AchievementUnlocked => "achievement.unlocked",
            Self::ActivityFeed => "activity.feed",
            Self::Error => "error",
        }
    }

    fn from_wire_str(s: &str) -> Option<Self> {
        Some(match s {
            "subscribe" => Self::Subscribe,
            "unsubscribe" => Self::Unsubscribe,
            "ping" => Self::Ping,
            "pong" => Self::Pong,
            "leaderboard.update" => Self::LeaderboardUpdate,
            "rank.change" => Self::RankChange,
            "progress.update" => Self::ProgressUpdate,
            "achievement.unlocked" => Self::AchievementUnlocked,
            "activity.feed" => Self::ActivityFeed,
            "error" => Self::Error,
            _ => return None,
        })
    }
}

/// Unordered key-value payload. `BTreeMap` gives us deterministic ordering
/// for tests without claiming the wire format cares about key order.
pub type Payload = BTreeMap<String, Value>;

/// Immutable message envelope (C1).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    /// Empty for control replies (ping/pong/error without a channel).
    pub topic: String,
    /// 0 means "unaddressed" — not a filter, not a recipient.
    pub user_id: i64,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown message type: {0}")]
    UnknownKind(String),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// On-wire shape. Every outbound constructor fills `timestamp`; inbound
/// control frames from real clients typically omit it, which is fine since
/// `parse` only reads it when present.
#[derive(Debug, Serialize, Deserialize)]
struct WireFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    channel: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    user_id: i64,
    #[serde(default)]
    timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Payload>,
}

fn is_zero(n: &i64) -> bool {
    *n == 0
}

impl Message {
    fn new(kind: MessageKind, topic: impl Into<String>, user_id: i64, payload: Payload) -> Self {
        Self {
            kind,
            topic: topic.into(),
            user_id,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn new_subscribe(channels: Vec<String>) -> Self {
        Self::new(MessageKind::Subscribe, "", 0, channels_payload(channels))
    }

    pub fn new_unsubscribe(channels: Vec<String>) -> Self {
        Self::new(MessageKind::Unsubscribe, "", 0, channels_payload(channels))
    }

    pub fn new_ping() -> Self {
        Self::new(MessageKind::Ping, "", 0, Payload::new())
    }

    pub fn new_pong() -> Self {
        Self::new(MessageKind::Pong, "", 0, Payload::new())
    }

    pub fn new_leaderboard_update(topic: impl Into<String>, payload: Payload) -> Self {
        Self::new(MessageKind::LeaderboardUpdate, topic, 0, payload)
    }

    pub fn new_rank_change(topic: impl Into<String>, user_id: i64, payload: Payload) -> Self {
        Self::new(MessageKind::RankChange, topic, user_id, payload)
    }

    pub fn new_progress_update(topic: impl Into<String>, user_id: i64, payload: Payload) -> Self {
        Self::new(MessageKind::ProgressUpdate, topic, user_id, payload)
    }

    pub fn new_achievement_unlocked(
        topic: impl Into<String>,
        user_id: i64,
        payload: Payload,
    ) -> Self {
        Self::new(MessageKind::AchievementUnlocked, topic, user_id, payload)
    }

    pub fn new_activity_feed(topic: impl Into<String>, payload: Payload) -> Self {
        Self::new(MessageKind::ActivityFeed, topic, 0, payload)
    }

    /// Build an outbound `error` frame. `code`/`message`/`details` map onto
    /// the `{code, message, details?}` payload shape.
    pub fn new_error(code: &str, message: &str, details: Option<Value>) -> Self {
        let mut payload = Payload::new();
        payload.insert("code".into(), Value::String(code.into()));
        payload.insert("message".into(), Value::String(message.into()));
        if let Some(details) = details {
            payload.insert("details".into(), details);
        }
        Self::new(MessageKind::Error, "", 0, payload)
    }

    /// Channels carried by a `subscribe`/`unsubscribe` frame's `data.channels`.
    pub fn channels(&self) -> Vec<String> {
        self.payload
            .get("channels")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Canonical JSON byte representation (byte-exact JSON object).
    pub fn serialize(&self) -> Vec<u8> {
        let frame = WireFrame {
            kind: self.kind.as_wire_str().to_string(),
            channel: self.topic.clone(),
            user_id: self.user_id,
            timestamp: Some(self.timestamp),
            data: if self.payload.is_empty() {
                None
            } else {
                Some(self.payload.clone())
            },
        };
        // A `WireFrame` built from a live `Message` always serializes; the
        // only failure modes (non-finite floats, non-string map keys) can't
        // arise from this struct's own fields.
        serde_json::to_vec(&frame).expect("message envelope is always serializable")
    }

    /// Parse an inbound control frame. Unknown `type` values are rejected
    /// (surfaced as a `ValidationError` at the call site; the connection
    /// itself stays open).
    pub fn parse(bytes: &[u8]) -> Result<Self, ParseError> {
        let frame: WireFrame = serde_json::from_slice(bytes)?;
        let kind = MessageKind::from_wire_str(&frame.kind)
            .ok_or_else(|| ParseError::UnknownKind(frame.kind.clone()))?;
        Ok(Self {
            kind,
            topic: frame.channel,
            user_id: frame.user_id,
            timestamp: frame.timestamp.unwrap_or_else(Utc::now),
            payload: frame.data.unwrap_or_default(),
        })
    }
}

fn channels_payload(channels: Vec<String>) -> Payload {
    let mut payload = Payload::new();
    payload.insert(
        "channels".into(),
        Value::Array(channels.into_iter().map(Value::String).collect()),
    );
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(m: Message) {
        let bytes = m.serialize();
        let parsed = Message::parse(&bytes).expect("parse should succeed");
        assert_eq!(parsed, m);
    }

    #[test]
    fn test_roundtrip_subscribe() {
        roundtrip(Message::new_subscribe(vec!["activity:feed".into()]));
    }

    #[test]
    fn test_roundtrip_ping_pong() {
        roundtrip(Message::new_ping());
        roundtrip(Message::new_pong());
    }

    #[test]
    fn test_roundtrip_activity_feed() {
        let mut payload = Payload::new();
        payload.insert("event".into(), Value::String("test".into()));
        roundtrip(Message::new_activity_feed("activity:feed", payload));
    }

    #[test]
    fn test_roundtrip_achievement_unlocked() {
        roundtrip(Message::new_achievement_unlocked(
            "user:1:achievements",
            1,
            Payload::new(),
        ));
    }

    #[test]
    fn test_roundtrip_error() {
        roundtrip(Message::new_error("BAD_FRAME", "could not parse", None));
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let bytes = br#"{"type":"teleport","channel":""}"#;
        let err = Message::parse(bytes).unwrap_err();
        assert!(matches!(err, ParseError::UnknownKind(k) if k == "teleport"));
    }

    #[test]
    fn test_channels_extraction() {
        let m = Message::new_subscribe(vec!["a".into(), "b".into()]);
        assert_eq!(m.channels(), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_wire_shape_has_type_field() {
        let m = Message::new_ping();
        let json: Value = serde_json::from_slice(&m.serialize()).unwrap();
        assert_eq!(json["type"], "ping");
    }

    #[test]
    fn test_serialize_omits_empty_channel_and_zero_user() {
        let m = Message::new_ping();
        let json: Value = serde_json::from_slice(&m.serialize()).unwrap();
        assert!(json.get("channel").is_none());
        assert!(json.get("user_id").is_none());
    }
}
