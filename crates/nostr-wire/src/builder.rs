//! Event construction and signing (spec §4.D "Event Builder & Signer").

use crate::canonical::compute_id;
use crate::crypto::KeyPair;
use crate::error::{Error, Result};
use crate::types::{Event, Kind, Tag};
use std::time::{SystemTime, UNIX_EPOCH};

/// Maximum serialized size of a single tag array, in bytes.
pub const MAX_TAG_BYTES: usize = 1024;
/// Maximum serialized size of a complete event, in bytes.
pub const MAX_EVENT_BYTES: usize = 262_144;

/// Builds an unsigned event template, then signs it into a wire [`Event`].
///
/// Callers in `fitness-core` are responsible for supplying a `"d"` tag on
/// addressable kinds before calling [`EventBuilder::build`] — this layer
/// only enforces that the tag is present, not how it was generated.
pub struct EventBuilder {
    kind: Kind,
    tags: Vec<Tag>,
    content: String,
    created_at: Option<u64>,
}

impl EventBuilder {
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            tags: Vec::new(),
            content: String::new(),
            created_at: None,
        }
    }

    pub fn tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.tags.extend(tags);
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Override the timestamp (tests, backfills). Defaults to wall-clock
    /// now at [`EventBuilder::build`] time.
    pub fn created_at(mut self, ts: u64) -> Self {
        self.created_at = Some(ts);
        self
    }

    /// Validate size and d-tag invariants, compute the id, and sign.
    pub fn build(self, keypair: &KeyPair) -> Result<Event> {
        if self.kind.is_addressable() && !self.tags.iter().any(|t| t.key() == Some("d")) {
            return Err(Error::MissingDTag(self.kind.0));
        }

        for tag in &self.tags {
            let size = serde_json::to_vec(tag).map(|v| v.len()).unwrap_or(usize::MAX);
            if size > MAX_TAG_BYTES {
                return Err(Error::OversizedTag(size));
            }
        }

        let created_at = self.created_at.unwrap_or_else(now_unix);
        let pubkey = keypair.public_key();
        let id = compute_id(&pubkey, created_at, self.kind, &self.tags, &self.content);
        let sig = keypair.sign_id(&id.0);

        let event = Event {
            id,
            pubkey,
            created_at,
            kind: self.kind,
            tags: self.tags,
            content: self.content,
            sig,
        };

        let event_size = serde_json::to_vec(&event).map(|v| v.len()).unwrap_or(usize::MAX);
        if event_size > MAX_EVENT_BYTES {
            return Err(Error::OversizedEvent(event_size));
        }

        Ok(event)
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addressable_kind_without_d_tag_is_rejected() {
        let kp = KeyPair::generate();
        let err = EventBuilder::new(Kind::TEAM_DEFINITION)
            .content("{}")
            .build(&kp)
            .unwrap_err();
        assert!(matches!(err, Error::MissingDTag(33404)));
    }

    #[test]
    fn addressable_kind_with_d_tag_builds_and_signs() {
        let kp = KeyPair::generate();
        let event = EventBuilder::new(Kind::TEAM_DEFINITION)
            .tag(Tag::d("team-slug"))
            .content("{}")
            .build(&kp)
            .unwrap();
        assert_eq!(event.d_tag(), Some("team-slug"));
        crate::crypto::verify_event(&event).unwrap();
    }

    #[test]
    fn regular_kind_does_not_require_d_tag() {
        let kp = KeyPair::generate();
        let event = EventBuilder::new(Kind::WORKOUT_RECORD)
            .content("ran")
            .build(&kp)
            .unwrap();
        assert!(event.d_tag().is_none());
    }

    #[test]
    fn oversized_tag_is_rejected() {
        let kp = KeyPair::generate();
        let huge = "x".repeat(MAX_TAG_BYTES + 1);
        let err = EventBuilder::new(Kind::WORKOUT_RECORD)
            .tag(Tag::new(["huge".to_string(), huge]))
            .build(&kp)
            .unwrap_err();
        assert!(matches!(err, Error::OversizedTag(_)));
    }

    #[test]
    fn created_at_override_is_respected() {
        let kp = KeyPair::generate();
        let event = EventBuilder::new(Kind::WORKOUT_RECORD)
            .content("ran")
            .created_at(12345)
            .build(&kp)
            .unwrap();
        assert_eq!(event.created_at, 12345);
    }
}
