//! Hub (C4)
//!
//! A single-writer event loop owning every index (`connections`,
//! `by_topic`, `by_user`) plus a running statistics record. All mutation
//! happens inside the loop task; every other task — registering
//! connections, broadcasting, subscribing — only ever enqueues an event
//! onto one FIFO channel. That makes every index update sequentially
//! consistent without fine-grained locking: a broadcast consults three
//! indexes at once, and doing so under independent locks invites torn
//! views.
//!
//! `HubHandle` is the cheap, cloneable front door; `Hub` is the loop state,
//! never shared directly.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};

use super::constants::{HUB_EVENT_CHANNEL_CAPACITY, HUB_OUTBOUND_QUEUE_CAPACITY};
use super::message::Message;

pub type ConnectionId = u64;

/// Snapshot of hub-wide counters, exposed for diagnostics/tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HubStats {
    pub total_clients: u64,
    pub active_channels: u64,
    pub messages_broadcast: u64,
    pub evictions: u64,
}

enum HubEvent {
    Register {
        id: ConnectionId,
        user_id: i64,
        outbound: mpsc::Sender<Vec<u8>>,
    },
    Unregister {
        id: ConnectionId,
    },
    Subscribe {
        id: ConnectionId,
        topic: String,
    },
    Unsubscribe {
        id: ConnectionId,
        topic: String,
    },
    Broadcast {
        topic: String,
        message: Box<Message>,
    },
    Stop {
        ack: oneshot::Sender<()>,
    },
    Stats {
        reply: oneshot::Sender<HubStats>,
    },
}

/// Cheap, cloneable handle to a running hub. All public operations funnel
/// through the single command channel the loop drains in FIFO order.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<HubEvent>,
    next_id: Arc<AtomicU64>,
}

struct ConnectionEntry {
    user_id: i64,
    outbound: mpsc::Sender<Vec<u8>>,
    topics: HashSet<String>,
}

struct Hub {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    by_topic: HashMap<String, HashSet<ConnectionId>>,
    by_user: HashMap<i64, HashSet<ConnectionId>>,
    stats: HubStats,
}

impl Hub {
    fn new() -> Self {
        Self {
            connections: HashMap::new(),
            by_topic: HashMap::new(),
            by_user: HashMap::new(),
            stats: HubStats::default(),
        }
    }

    fn register(&mut self, id: ConnectionId, user_id: i64, outbound: mpsc::Sender<Vec<u8>>) {
        self.connections.insert(
            id,
            ConnectionEntry {
                user_id,
                outbound,
                topics: HashSet::new(),
            },
        );
        self.by_user.entry(user_id).or_default().insert(id);
        self.stats.total_clients += 1;
    }

    fn unregister(&mut self, id: ConnectionId) {
        let Some(entry) = self.connections.remove(&id) else {
            return;
        };
        for topic in &entry.topics {
            if let Some(subs) = self.by_topic.get_mut(topic) {
                subs.remove(&id);
                if subs.is_empty() {
                    self.by_topic.remove(topic);
                }
            }
        }
        if let Some(users) = self.by_user.get_mut(&entry.user_id) {
            users.remove(&id);
            if users.is_empty() {
                self.by_user.remove(&entry.user_id);
            }
        }
        self.stats.active_channels = self.by_topic.len() as u64;
        // Dropping `entry.outbound` here closes the writer's receiver.
    }

    fn subscribe(&mut self, id: ConnectionId, topic: String) {
        let Some(entry) = self.connections.get_mut(&id) else {
            return;
        };
        if !entry.topics.insert(topic.clone()) {
            return; // already subscribed: no-op
        }
        self.by_topic.entry(topic).or_default().insert(id);
        self.stats.active_channels = self.by_topic.len() as u64;
    }

    fn unsubscribe(&mut self, id: ConnectionId, topic: &str) {
        let Some(entry) = self.connections.get_mut(&id) else {
            return;
        };
        if !entry.topics.remove(topic) {
            return;
        }
        if let Some(subs) = self.by_topic.get_mut(topic) {
            subs.remove(&id);
            if subs.is_empty() {
                self.by_topic.remove(topic);
            }
        }
        self.stats.active_channels = self.by_topic.len() as u64;
    }

    fn broadcast(&mut self, topic: &str, message: &Message) {
        let Some(subscribers) = self.by_topic.get(topic) else {
            return; // unknown topic: drop, no retention
        };
        let bytes = message.serialize();
        let user_filter = message.user_id;
        let mut evicted = Vec::new();

        for &id in subscribers {
            let Some(entry) = self.connections.get(&id) else {
                continue;
            };
            if user_filter > 0 && entry.user_id != user_filter {
                continue;
            }
            match entry.outbound.try_send(bytes.clone()) {
                Ok(()) => {}
                Err(_) => evicted.push(id), // full or closed: slow-client eviction
            }
        }

        self.stats.messages_broadcast += 1;
        for id in evicted {
            self.stats.evictions += 1;
            self.unregister(id);
        }
    }

    fn stop(&mut self) {
        self.connections.clear();
        self.by_topic.clear();
        self.by_user.clear();
        self.stats.active_channels = 0;
    }
}

async fn run_loop(mut hub: Hub, mut rx: mpsc::Receiver<HubEvent>) {
    while let Some(event) = rx.recv().await {
        match event {
            HubEvent::Register {
                id,
                user_id,
                outbound,
            } => hub.register(id, user_id, outbound),
            HubEvent::Unregister { id } => hub.unregister(id),
            HubEvent::Subscribe { id, topic } => hub.subscribe(id, topic),
            HubEvent::Unsubscribe { id, topic } => hub.unsubscribe(id, &topic),
            HubEvent::Broadcast { topic, message } => hub.broadcast(&topic, &message),
            HubEvent::Stats { reply } => {
                let _ = reply.send(hub.stats);
            }
            HubEvent::Stop { ack } => {
                hub.stop();
                let _ = ack.send(());
                break;
            }
        }
    }
}

impl HubHandle {
    /// Spawn the hub's event loop and return the handle callers use.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel(HUB_EVENT_CHANNEL_CAPACITY);
        tokio::spawn(run_loop(Hub::new(), rx));
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a new connection, returning its id, a sender clone the
    /// connection can use to enqueue its own replies (e.g. `pong`), and the
    /// receiving end of its bounded outbound queue (the writer task drains
    /// this).
    pub fn register(&self, user_id: i64) -> (ConnectionId, mpsc::Sender<Vec<u8>>, mpsc::Receiver<Vec<u8>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (outbound_tx, outbound_rx) = mpsc::channel(HUB_OUTBOUND_QUEUE_CAPACITY);
        let reader_tx = outbound_tx.clone();
        let _ = self.tx.try_send(HubEvent::Register {
            id,
            user_id,
            outbound: outbound_tx,
        });
        (id, reader_tx, outbound_rx)
    }

    pub fn unregister(&self, id: ConnectionId) {
        let _ = self.tx.try_send(HubEvent::Unregister { id });
    }

    pub fn subscribe(&self, id: ConnectionId, topic: impl Into<String>) {
        let _ = self.tx.try_send(HubEvent::Subscribe {
            id,
            topic: topic.into(),
        });
    }

    pub fn unsubscribe(&self, id: ConnectionId, topic: impl Into<String>) {
        let _ = self.tx.try_send(HubEvent::Unsubscribe {
            id,
            topic: topic.into(),
        });
    }

    /// Fan a message out to every subscriber of `topic` (filtered to
    /// `message.user_id` when it's non-zero). Never blocks.
    pub fn broadcast(&self, topic: impl Into<String>, message: Message) {
        let _ = self.tx.try_send(HubEvent::Broadcast {
            topic: topic.into(),
            message: Box::new(message),
        });
    }

    pub async fn stats(&self) -> HubStats {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(HubEvent::Stats { reply }).await.is_err() {
            return HubStats::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Drain pending events, close every connection, and stop the loop.
    pub async fn stop(&self) {
        let (ack, rx) = oneshot::channel();
        if self.tx.send(HubEvent::Stop { ack }).await.is_ok() {
            let _ = rx.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn feed_message(event: &str) -> Message {
        let mut payload = BTreeMap::new();
        payload.insert("event".to_string(), Value::String(event.to_string()));
        Message::new_activity_feed("activity:feed", payload)
    }

    async fn recv_one(rx: &mut mpsc::Receiver<Vec<u8>>) -> Message {
        let bytes = tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("channel closed unexpectedly");
        Message::parse(&bytes).unwrap()
    }

    async fn settle(hub: &HubHandle) {
        // Round-trips through the loop so prior try_send'd events are
        // guaranteed processed before we assert on state.
        hub.stats().await;
    }

    #[tokio::test]
    async fn test_s1_basic_fan_out() {
        let hub = HubHandle::spawn();
        let (c1, _tx1, mut rx1) = hub.register(1);
        let (c2, _tx2, mut rx2) = hub.register(2);
        hub.subscribe(c1, "activity:feed");
        hub.subscribe(c2, "activity:feed");
        settle(&hub).await;

        hub.broadcast("activity:feed", feed_message("test"));

        let m1 = recv_one(&mut rx1).await;
        let m2 = recv_one(&mut rx2).await;
        assert_eq!(m1.kind, super::super::message::MessageKind::ActivityFeed);
        assert_eq!(m2.kind, super::super::message::MessageKind::ActivityFeed);
    }

    #[tokio::test]
    async fn test_s2_user_addressed() {
        let hub = HubHandle::spawn();
        let (c1, _tx1, mut rx1) = hub.register(1);
        let (c2, _tx2, mut rx2) = hub.register(2);
        hub.subscribe(c1, "user:1:achievements");
        hub.subscribe(c2, "user:1:achievements");
        settle(&hub).await;

        hub.broadcast(
            "user:1:achievements",
            Message::new_achievement_unlocked("user:1:achievements", 1, BTreeMap::new()),
        );

        let _ = recv_one(&mut rx1).await;
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_s3_slow_client_eviction() {
        let hub = HubHandle::spawn();
        let (c1, _tx1, _rx1) = hub.register(1); // never drained: queue fills up
        hub.subscribe(c1, "t");
        settle(&hub).await;

        for _ in 0..257 {
            hub.broadcast("t", feed_message("x"));
        }
        settle(&hub).await;

        let stats = hub.stats().await;
        assert!(stats.evictions >= 1);
    }

    #[tokio::test]
    async fn test_s4_subscribe_race() {
        let hub = HubHandle::spawn();
        let (c1, _tx1, mut rx1) = hub.register(1);

        hub.broadcast("t", feed_message("before"));
        hub.subscribe(c1, "t");
        hub.broadcast("t", feed_message("after"));
        settle(&hub).await;

        let m = recv_one(&mut rx1).await;
        assert_eq!(m.payload.get("event").unwrap(), "after");
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_subscribe_is_idempotent() {
        let hub = HubHandle::spawn();
        let (c1, _tx1, _rx1) = hub.register(1);
        hub.subscribe(c1, "t");
        hub.subscribe(c1, "t");
        settle(&hub).await;
        assert_eq!(hub.stats().await.active_channels, 1);
    }

    #[tokio::test]
    async fn test_broadcast_unknown_topic_is_noop() {
        let hub = HubHandle::spawn();
        hub.broadcast("nowhere", feed_message("x"));
        settle(&hub).await;
        assert_eq!(hub.stats().await.messages_broadcast, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_removes_empty_topic_entry() {
        let hub = HubHandle::spawn();
        let (c1, _tx1, _rx1) = hub.register(1);
        hub.subscribe(c1, "t");
        settle(&hub).await;
        assert_eq!(hub.stats().await.active_channels, 1);

        hub.unsubscribe(c1, "t");
        settle(&hub).await;
        assert_eq!(hub.stats().await.active_channels, 0);
    }

    #[tokio::test]
    async fn test_disconnect_after_subscribe_leaves_no_leak() {
        let hub = HubHandle::spawn();
        let (c1, _tx1, _rx1) = hub.register(1);
        hub.subscribe(c1, "t");
        hub.unregister(c1);
        settle(&hub).await;
        assert_eq!(hub.stats().await.active_channels, 0);
    }

    #[tokio::test]
    async fn test_stop_clears_everything() {
        let hub = HubHandle::spawn();
        let (c1, _tx1, _rx1) = hub.register(1);
        hub.subscribe(c1, "t");
        settle(&hub).await;

        hub.stop().await;
        // Loop has exited; further sends are silently dropped (try_send on
        // a channel whose receiver is gone, or a closed `send`).
        hub.broadcast("t", feed_message("x"));
    }
}
