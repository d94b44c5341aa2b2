//! Nostr wire codec, addressable-event model, and signing.
//!
//! This crate provides the core protocol types, canonical encoding, and
//! cryptographic primitives needed to build and verify events on the
//! fitness-competition relay network (NIP-01 subset).
//!
//! # Modules
//!
//! - [`types`]: Core wire types (`PublicKey`, `Event`, `Filter`, etc.)
//! - [`canonical`]: Deterministic serialization for event-id hashing
//! - [`crypto`]: BIP-340 Schnorr signing and verification
//! - [`builder`]: Event construction with d-tag and size-limit enforcement
//! - [`message`]: Client/relay wire messages (`REQ`, `EVENT`, `OK`, ...)
//! - [`error`]: Error types

pub mod builder;
pub mod canonical;
pub mod crypto;
pub mod error;
pub mod message;
pub mod types;

pub use builder::EventBuilder;
pub use crypto::KeyPair;
pub use error::{Error, Result};
pub use message::{ClientMessage, RejectReason, RelayMessage};
pub use types::*;
