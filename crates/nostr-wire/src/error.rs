//! Error types for the wire codec and event builder.

use thiserror::Error;

/// Result type alias using our [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Wire codec / event builder error taxonomy (spec §7: Protocol + Validation).
#[derive(Debug, Error)]
pub enum Error {
    /// A relay frame could not be parsed as JSON or did not match the
    /// expected array shape.
    #[error("malformed frame: {0}")]
    BadFrame(String),

    /// `event.sig` did not verify against `event.pubkey` over `event.id`.
    #[error("invalid signature")]
    BadSignature,

    /// Recomputing the canonical id disagreed with the transmitted `id`.
    #[error("id mismatch: computed {computed} != transmitted {transmitted}")]
    BadId { computed: String, transmitted: String },

    /// A relay/client message type we don't recognize.
    #[error("unsupported message type: {0}")]
    UnsupportedMessage(String),

    /// An addressable-kind event template is missing its `["d", ...]` tag.
    #[error("missing d tag for addressable kind {0}")]
    MissingDTag(u16),

    /// The requested kind is outside any range this builder knows how to
    /// construct (e.g. a negative or absurdly large kind).
    #[error("invalid kind: {0}")]
    InvalidKind(u32),

    /// Date range invalid for a competition definition (`end <= start`, etc).
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// A single tag array serialized to more than 1 KB.
    #[error("oversized tag ({0} bytes, max 1024)")]
    OversizedTag(usize),

    /// The whole event serialized to more than 256 KB.
    #[error("oversized event ({0} bytes, max 262144)")]
    OversizedEvent(usize),

    /// Signing failed at the secp256k1 layer.
    #[error("signing failed: {0}")]
    SignFailed(String),

    /// A hex or bech32 public key / id failed to parse.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
}
