//! A single relay's connection state machine (spec §4.B).
//!
//! `Disconnected -> Connecting -> Connected -> (Reconnecting | Disconnected)`,
//! with `Connected -> Error -> Reconnecting` on any read/write/ping failure.
//! Reconnects back off exponentially (1s base, doubling, capped at the
//! configured max). Outbound frames go through a bounded, drop-oldest queue
//! so a slow or dead relay cannot make publishing to healthy relays block.

use crate::config::PoolConfig;
use crate::error::TransportError;
use futures_util::{SinkExt, StreamExt};
use nostr_wire::RelayMessage;
use parking_lot::{Mutex, RwLock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Where a single relay sits in its connection lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
    Reconnecting,
    /// `max_reconnect_attempts` was exhausted; the connection has stopped
    /// retrying for good (spec §4.B). Pool-owned relays default to
    /// unlimited attempts and never reach this state.
    Failed,
}

struct SendQueue {
    inner: Mutex<VecDeque<String>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

impl SendQueue {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::new()),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// Push a frame, dropping the oldest queued frame if already at capacity.
    fn push(&self, frame: String) {
        let mut guard = self.inner.lock();
        if guard.len() >= self.capacity {
            guard.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        guard.push_back(frame);
        drop(guard);
        self.notify.notify_one();
    }

    fn drain(&self) -> Vec<String> {
        self.inner.lock().drain(..).collect()
    }

    fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// A managed connection to one relay URL, reconnecting for as long as the
/// pool holds a handle to it.
pub struct RelayConnection {
    pub url: String,
    state: Arc<RwLock<ConnectionState>>,
    queue: Arc<SendQueue>,
}

impl RelayConnection {
    /// Spawn the background task driving this connection's lifecycle.
    /// Inbound relay messages are tagged with the relay url and forwarded
    /// to `inbound_tx` for the pool to de-dup and fan in.
    pub fn spawn(
        url: String,
        config: PoolConfig,
        inbound_tx: mpsc::UnboundedSender<(String, RelayMessage)>,
    ) -> Arc<Self> {
        let state = Arc::new(RwLock::new(ConnectionState::Disconnected));
        let queue = Arc::new(SendQueue::new(config.send_queue_capacity));
        let conn = Arc::new(Self {
            url,
            state,
            queue,
        });
        let task_conn = conn.clone();
        tokio::spawn(async move { task_conn.run(config, inbound_tx).await });
        conn
    }

    pub fn status(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Enqueue a JSON frame for transmission. Never blocks; drops the
    /// oldest queued frame if the connection cannot keep up.
    pub fn send(&self, json: String) {
        self.queue.push(json);
    }

    /// Number of outbound frames dropped so far due to a full queue.
    pub fn dropped_count(&self) -> u64 {
        self.queue.dropped_count()
    }

    async fn run(self: Arc<Self>, config: PoolConfig, inbound_tx: mpsc::UnboundedSender<(String, RelayMessage)>) {
        let mut attempt: u32 = 0;
        loop {
            *self.state.write() = ConnectionState::Connecting;
            let connect = tokio::time::timeout(config.connect_timeout, tokio_tungstenite::connect_async(&self.url));
            match connect.await {
                Ok(Ok((ws_stream, _response))) => {
                    attempt = 0;
                    *self.state.write() = ConnectionState::Connected;
                    info!(relay = %self.url, "connected");
                    self.serve(ws_stream, &config, &inbound_tx).await;
                }
                Ok(Err(e)) => {
                    warn!(relay = %self.url, error = %e, "connect failed");
                    *self.state.write() = ConnectionState::Error;
                }
                Err(_) => {
                    warn!(relay = %self.url, "connect timed out");
                    *self.state.write() = ConnectionState::Error;
                }
            }

            if let Some(max) = config.max_reconnect_attempts {
                if attempt >= max {
                    warn!(relay = %self.url, attempts = attempt, "giving up after max_reconnect_attempts");
                    *self.state.write() = ConnectionState::Failed;
                    return;
                }
            }

            *self.state.write() = ConnectionState::Reconnecting;
            let delay = backoff_delay(&config, attempt);
            attempt = attempt.saturating_add(1);
            tokio::time::sleep(delay).await;
        }
    }

    async fn serve(
        self: &Arc<Self>,
        ws_stream: WsStream,
        config: &PoolConfig,
        inbound_tx: &mpsc::UnboundedSender<(String, RelayMessage)>,
    ) {
        let (mut write, mut read) = ws_stream.split();
        let mut ping_interval = tokio::time::interval(config.ping_interval);
        ping_interval.tick().await; // first tick fires immediately
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                _ = ping_interval.tick() => {
                    if last_activity.elapsed() > config.pong_timeout {
                        warn!(relay = %self.url, "no activity within pong timeout");
                        *self.state.write() = ConnectionState::Error;
                        return;
                    }
                    if write.send(WsMessage::Ping(Vec::new())).await.is_err() {
                        *self.state.write() = ConnectionState::Error;
                        return;
                    }
                }
                _ = self.queue.notify.notified() => {
                    for frame in self.queue.drain() {
                        if write.send(WsMessage::Text(frame)).await.is_err() {
                            *self.state.write() = ConnectionState::Error;
                            return;
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(WsMessage::Text(text))) => {
                            last_activity = Instant::now();
                            match RelayMessage::from_json(&text) {
                                Ok(relay_msg) => {
                                    if let Some(relay_msg) = accept_relay_message(relay_msg, &self.url) {
                                        let _ = inbound_tx.send((self.url.clone(), relay_msg));
                                    }
                                }
                                Err(e) => debug!(relay = %self.url, error = %e, "dropping unparsable frame"),
                            }
                        }
                        Some(Ok(WsMessage::Pong(_))) => {
                            last_activity = Instant::now();
                        }
                        Some(Ok(WsMessage::Close(_))) | None => {
                            *self.state.write() = ConnectionState::Disconnected;
                            return;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(relay = %self.url, error = %e, "read error");
                            *self.state.write() = ConnectionState::Error;
                            return;
                        }
                    }
                }
            }
        }
    }
}

/// Id/signature check on inbound `EVENT` frames (spec §4.A, §7): a bad id
/// or bad signature is logged and the frame dropped, the connection stays
/// up. Every other relay message passes through untouched.
fn accept_relay_message(relay_msg: RelayMessage, relay_url: &str) -> Option<RelayMessage> {
    if let RelayMessage::Event { event, .. } = &relay_msg {
        if let Err(e) = nostr_wire::crypto::verify_event(event) {
            warn!(relay = %relay_url, event_id = %event.id, error = %e, "dropping event failing id/signature check");
            return None;
        }
    }
    Some(relay_msg)
}

fn backoff_delay(config: &PoolConfig, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.min(8)).unwrap_or(u32::MAX);
    (config.reconnect_base_delay.saturating_mul(factor)).min(config.reconnect_max_delay)
}

#[allow(dead_code)]
fn map_tungstenite(e: tokio_tungstenite::tungstenite::Error) -> TransportError {
    TransportError::WebSocket(e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let config = PoolConfig::default();
        assert_eq!(backoff_delay(&config, 0), Duration::from_secs(1));
        assert_eq!(backoff_delay(&config, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(&config, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(&config, 3), Duration::from_secs(8));
        assert_eq!(backoff_delay(&config, 4), Duration::from_secs(10));
        assert_eq!(backoff_delay(&config, 10), Duration::from_secs(10));
    }

    #[test]
    fn send_queue_drops_oldest_on_overflow() {
        let queue = SendQueue::new(2);
        queue.push("a".into());
        queue.push("b".into());
        queue.push("c".into());
        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.drain(), vec!["b".to_string(), "c".to_string()]);
    }

    fn signed_workout(kp: &nostr_wire::KeyPair) -> nostr_wire::Event {
        nostr_wire::EventBuilder::new(nostr_wire::Kind::WORKOUT_RECORD)
            .content("ran")
            .build(kp)
            .unwrap()
    }

    #[test]
    fn accepts_event_with_valid_signature() {
        let kp = nostr_wire::KeyPair::generate();
        let event = signed_workout(&kp);
        let msg = RelayMessage::Event { sub_id: "sub1".into(), event };
        assert!(accept_relay_message(msg, "wss://relay.example").is_some());
    }

    #[test]
    fn drops_event_with_tampered_content() {
        let kp = nostr_wire::KeyPair::generate();
        let mut event = signed_workout(&kp);
        event.content = "tampered".into();
        let msg = RelayMessage::Event { sub_id: "sub1".into(), event };
        assert!(accept_relay_message(msg, "wss://relay.example").is_none());
    }

    #[test]
    fn non_event_messages_pass_through_unchecked() {
        let msg = RelayMessage::Eose { sub_id: "sub1".into() };
        assert!(accept_relay_message(msg, "wss://relay.example").is_some());
    }
}
