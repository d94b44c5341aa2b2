//! Relay connection pool and subscription multiplexer.
//!
//! Wraps `tokio-tungstenite` WebSocket connections with the reconnect,
//! keepalive, and fan-out/fan-in behavior the fitness relay client needs on
//! top of the raw wire codec in `nostr-wire`.
//!
//! # Modules
//!
//! - [`config`]: Tuning knobs (`PoolConfig`)
//! - [`connection`]: Single-relay connection state machine
//! - [`pool`]: Multi-relay pool, subscriptions, and publish engine
//! - [`error`]: Error types

pub mod config;
pub mod connection;
pub mod error;
pub mod pool;

pub use config::PoolConfig;
pub use connection::ConnectionState;
pub use error::{PoolError, TransportError};
pub use pool::{PublishReport, RelayPool, SubscriptionHandle};
