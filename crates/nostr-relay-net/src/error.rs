//! Error types for the relay transport and pool layers.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors from a single relay connection (spec §4.B).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("invalid relay url: {0}")]
    InvalidUrl(String),

    #[error("wire codec error: {0}")]
    Wire(#[from] nostr_wire::Error),

    #[error("connection closed")]
    Closed,

    #[error("send queue full, dropping oldest frame")]
    QueueFull,

    #[error("ping timeout: no pong within {0:?}")]
    PingTimeout(std::time::Duration),
}

/// Errors from pool-level operations that span many relays (spec §4.C).
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no relays configured")]
    NoRelays,

    #[error("subscription deadline elapsed before {seen}/{required} relays reached EOSE")]
    SubscriptionTimeout { seen: usize, required: usize },

    #[error("publish deadline elapsed with no relay acknowledging the event")]
    PublishTimeout,

    #[error("event rejected by all relays")]
    PublishRejected,

    #[error("wire codec error: {0}")]
    Wire(#[from] nostr_wire::Error),
}
