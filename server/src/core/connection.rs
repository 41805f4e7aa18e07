//! Connection (C3)
//!
//! Every accepted WebSocket runs two cooperating tasks — a reader and a
//! writer — that communicate only through the connection's bounded
//! outbound queue. Whichever task observes a failure first tears the
//! other down and unregisters from the hub before the transport is
//! closed, so no further broadcast can target a dead client.

use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::constants::{
    CONNECTION_PING_INTERVAL_SECS, CONNECTION_READ_DEADLINE_SECS, CONNECTION_WRITE_DEADLINE_SECS,
};
use super::hub::HubHandle;
use super::message::Message;

/// Drive one upgraded WebSocket end to end: register with the hub, race
/// the reader and writer, and unregister on the way out.
pub async fn handle_connection(socket: WebSocket, hub: HubHandle, user_id: i64) {
    let (id, outbound_tx, outbound_rx) = hub.register(user_id);
    let (sink, stream) = socket.split();

    let reader = tokio::spawn(run_reader(stream, hub.clone(), id, outbound_tx));
    let writer = tokio::spawn(run_writer(sink, outbound_rx));

    tokio::select! {
        biased;
        _ = reader => {
            writer.abort();
        }
        _ = writer => {
            reader.abort();
        }
    }

    hub.unregister(id);
    tracing::debug!(connection_id = id, user_id, "connection closed");
}

async fn run_reader<S>(
    mut stream: S,
    hub: HubHandle,
    id: super::hub::ConnectionId,
    outbound_tx: mpsc::Sender<Vec<u8>>,
) where
    S: futures::Stream<Item = Result<WsMessage, axum::Error>> + Unpin + Send + 'static,
{
    let deadline = Duration::from_secs(CONNECTION_READ_DEADLINE_SECS);
    loop {
        let next = match tokio::time::timeout(deadline, stream.next()).await {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                tracing::debug!(connection_id = id, error = %e, "transport read error");
                return;
            }
            Ok(None) => {
                tracing::debug!(connection_id = id, "client closed connection");
                return;
            }
            Err(_) => {
                tracing::debug!(connection_id = id, "read deadline exceeded");
                return;
            }
        };

        match next {
            WsMessage::Text(text) => handle_inbound_frame(text.as_bytes(), &hub, id, &outbound_tx),
            WsMessage::Binary(bytes) => handle_inbound_frame(&bytes, &hub, id, &outbound_tx),
            WsMessage::Close(_) => {
                tracing::debug!(connection_id = id, "received close frame");
                return;
            }
            // Transport-level ping/pong are handled by the underlying
            // websocket implementation and never reach application code.
            WsMessage::Ping(_) | WsMessage::Pong(_) => {}
        }
    }
}

fn handle_inbound_frame(
    bytes: &[u8],
    hub: &HubHandle,
    id: super::hub::ConnectionId,
    outbound_tx: &mpsc::Sender<Vec<u8>>,
) {
    let message = match Message::parse(bytes) {
        Ok(m) => m,
        // Malformed or unrecognized frames get an `error` reply on the
        // outbound queue; the connection itself stays open.
        Err(e) => {
            tracing::trace!(connection_id = id, error = %e, "rejecting unrecognized frame");
            let (code, detail) = match &e {
                super::message::ParseError::Malformed(_) => ("MALFORMED_FRAME", e.to_string()),
                super::message::ParseError::UnknownKind(kind) => {
                    ("UNKNOWN_MESSAGE_TYPE", format!("unknown message type: {kind}"))
                }
                super::message::ParseError::MissingField(field) => {
                    ("MISSING_FIELD", format!("missing required field: {field}"))
                }
            };
            let _ = outbound_tx.try_send(Message::new_error(code, &detail, None).serialize());
            return;
        }
    };

    match message.kind {
        super::message::MessageKind::Subscribe => {
            for topic in message.channels() {
                hub.subscribe(id, topic);
            }
        }
        super::message::MessageKind::Unsubscribe => {
            for topic in message.channels() {
                hub.unsubscribe(id, topic);
            }
        }
        super::message::MessageKind::Ping => {
            let _ = outbound_tx.try_send(Message::new_pong().serialize());
        }
        _ => {
            // Every other kind is outbound-only; a client sending one is
            // ignored leniently just like an unknown type.
        }
    }
}

async fn run_writer<T>(mut sink: T, mut outbound_rx: mpsc::Receiver<Vec<u8>>)
where
    T: futures::Sink<WsMessage, Error = axum::Error> + Unpin + Send + 'static,
{
    let write_deadline = Duration::from_secs(CONNECTION_WRITE_DEADLINE_SECS);
    let mut ping_interval =
        tokio::time::interval(Duration::from_secs(CONNECTION_PING_INTERVAL_SECS));
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // First tick fires immediately; skip it so we don't ping right at connect.
    ping_interval.tick().await;

    loop {
        tokio::select! {
            biased;
            frame = outbound_rx.recv() => {
                match frame {
                    Some(bytes) => {
                        if write_frame(&mut sink, WsMessage::Text(bytes_to_utf8(bytes).into()), write_deadline)
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                    None => {
                        // Hub closed our queue (unregistered elsewhere, or
                        // the process is stopping). Best-effort close frame.
                        let _ = tokio::time::timeout(
                            write_deadline,
                            sink.send(WsMessage::Close(None)),
                        )
                        .await;
                        return;
                    }
                }
            }
            _ = ping_interval.tick() => {
                if write_frame(&mut sink, WsMessage::Ping(Vec::new().into()), write_deadline)
                    .await
                    .is_err()
                {
                    return;
                }
            }
        }
    }
}

async fn write_frame<T>(sink: &mut T, frame: WsMessage, deadline: Duration) -> Result<(), ()>
where
    T: futures::Sink<WsMessage, Error = axum::Error> + Unpin,
{
    match tokio::time::timeout(deadline, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "transport write error");
            Err(())
        }
        Err(_) => {
            tracing::debug!("write deadline exceeded");
            Err(())
        }
    }
}

fn bytes_to_utf8(bytes: Vec<u8>) -> String {
    // `Message::serialize` only ever produces valid UTF-8 JSON.
    String::from_utf8(bytes).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use super::*;
    use crate::core::message::MessageKind;

    /// Channel-backed stand-in for the reader half of a split websocket.
    struct MockStream {
        rx: mpsc::Receiver<Result<WsMessage, axum::Error>>,
    }

    impl futures::Stream for MockStream {
        type Item = Result<WsMessage, axum::Error>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.rx.poll_recv(cx)
        }
    }

    /// Channel-backed stand-in for the writer half of a split websocket.
    struct MockSink {
        tx: mpsc::UnboundedSender<WsMessage>,
    }

    impl futures::Sink<WsMessage> for MockSink {
        type Error = axum::Error;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: WsMessage) -> Result<(), Self::Error> {
            self.get_mut().tx.send(item).map_err(axum::Error::new)
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }
    }

    fn mock_stream() -> (mpsc::Sender<Result<WsMessage, axum::Error>>, MockStream) {
        let (tx, rx) = mpsc::channel(8);
        (tx, MockStream { rx })
    }

    fn mock_sink() -> (MockSink, tokio::sync::mpsc::UnboundedReceiver<WsMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (MockSink { tx }, rx)
    }

    #[tokio::test]
    async fn test_handle_inbound_frame_malformed_enqueues_error() {
        let hub = HubHandle::spawn();
        let (id, outbound_tx, mut outbound_rx) = hub.register(1);

        handle_inbound_frame(b"not json", &hub, id, &outbound_tx);

        let bytes = outbound_rx.try_recv().expect("expected an error frame");
        let msg = Message::parse(&bytes).unwrap();
        assert_eq!(msg.kind, MessageKind::Error);
        assert_eq!(msg.payload.get("code").unwrap(), "MALFORMED_FRAME");
    }

    #[tokio::test]
    async fn test_handle_inbound_frame_unknown_kind_enqueues_error() {
        let hub = HubHandle::spawn();
        let (id, outbound_tx, mut outbound_rx) = hub.register(1);

        handle_inbound_frame(br#"{"type":"teleport"}"#, &hub, id, &outbound_tx);

        let bytes = outbound_rx.try_recv().expect("expected an error frame");
        let msg = Message::parse(&bytes).unwrap();
        assert_eq!(msg.kind, MessageKind::Error);
        assert_eq!(msg.payload.get("code").unwrap(), "UNKNOWN_MESSAGE_TYPE");
    }

    #[tokio::test]
    async fn test_handle_inbound_frame_subscribe_does_not_enqueue_error() {
        let hub = HubHandle::spawn();
        let (id, outbound_tx, mut outbound_rx) = hub.register(1);

        let subscribe = Message::new_subscribe(vec!["activity:feed".into()]).serialize();
        handle_inbound_frame(&subscribe, &hub, id, &outbound_tx);

        assert!(outbound_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_run_reader_malformed_frame_surfaces_error_on_outbound_queue() {
        let hub = HubHandle::spawn();
        let (id, outbound_tx, mut outbound_rx) = hub.register(1);
        let (stream_tx, stream) = mock_stream();

        let reader = tokio::spawn(run_reader(stream, hub.clone(), id, outbound_tx));

        stream_tx
            .send(Ok(WsMessage::Text("garbage".into())))
            .await
            .unwrap();
        stream_tx.send(Ok(WsMessage::Close(None))).await.unwrap();
        reader.await.unwrap();

        let bytes = tokio::time::timeout(Duration::from_secs(1), outbound_rx.recv())
            .await
            .unwrap()
            .unwrap();
        let msg = Message::parse(&bytes).unwrap();
        assert_eq!(msg.kind, MessageKind::Error);
    }

    #[tokio::test]
    async fn test_run_reader_subscribe_reaches_hub() {
        let hub = HubHandle::spawn();
        let (id, outbound_tx, _outbound_rx) = hub.register(1);
        let (stream_tx, stream) = mock_stream();

        let reader = tokio::spawn(run_reader(stream, hub.clone(), id, outbound_tx));

        let subscribe = Message::new_subscribe(vec!["activity:feed".into()]).serialize();
        stream_tx
            .send(Ok(WsMessage::Text(bytes_to_utf8(subscribe).into())))
            .await
            .unwrap();
        stream_tx.send(Ok(WsMessage::Close(None))).await.unwrap();
        reader.await.unwrap();

        assert_eq!(hub.stats().await.active_channels, 1);
    }

    #[tokio::test]
    async fn test_run_writer_relays_queued_frames() {
        let (outbound_tx, outbound_rx) = mpsc::channel(8);
        let (sink, mut sink_rx) = mock_sink();

        let writer = tokio::spawn(run_writer(sink, outbound_rx));

        let payload = Message::new_ping().serialize();
        outbound_tx.send(payload.clone()).await.unwrap();
        drop(outbound_tx);

        let frame = tokio::time::timeout(Duration::from_secs(1), sink_rx.recv())
            .await
            .unwrap()
            .unwrap();
        match frame {
            WsMessage::Text(text) => assert_eq!(text.as_bytes(), payload.as_slice()),
            other => panic!("expected a text frame, got {other:?}"),
        }

        // Dropping the sender closes the queue; the writer sends a close
        // frame and returns.
        let closing = tokio::time::timeout(Duration::from_secs(1), sink_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(closing, WsMessage::Close(_)));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_write_frame_reports_sink_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx); // closed receiver makes every send fail
        let mut sink = MockSink { tx };

        let result = write_frame(
            &mut sink,
            WsMessage::Ping(Vec::new().into()),
            Duration::from_secs(1),
        )
        .await;
        assert!(result.is_err());
    }
}
