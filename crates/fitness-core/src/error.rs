//! Error types for the fitness domain services.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("event is not signed by the team captain")]
    NotCaptain,

    #[error("local membership list is stale relative to the latest observed list")]
    StaleList,

    #[error("underlying key/value cache error: {0}")]
    Cache(String),

    #[error("wire codec error: {0}")]
    Wire(#[from] nostr_wire::Error),

    #[error("relay pool error: {0}")]
    Pool(#[from] nostr_relay_net::PoolError),
}
