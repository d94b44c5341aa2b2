//! Core wire types: identities, events, tags, and filters (spec §3, §6).

use crate::error::{Error, Result};
use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte Schnorr public key (BIP-340 x-only), the canonical identity of
/// every author on the network.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// Parse a public key from either 64-char hex or a bech32 `npub1...`
    /// string (spec §9 Open Question: both forms must be accepted at input).
    pub fn parse(s: &str) -> Result<Self> {
        if s.starts_with("npub1") {
            let (hrp, data) = bech32::decode(s)
                .map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
            if hrp.as_str() != "npub" {
                return Err(Error::InvalidPublicKey(format!("unexpected hrp {hrp}")));
            }
            let bytes: [u8; 32] = data
                .try_into()
                .map_err(|_| Error::InvalidPublicKey("npub payload not 32 bytes".into()))?;
            return Ok(Self(bytes));
        }
        let bytes = hex::decode(s).map_err(|e| Error::InvalidPublicKey(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::InvalidPublicKey("hex pubkey not 32 bytes".into()))?;
        Ok(Self(arr))
    }

    /// Render as lowercase hex (the internal canonical form — spec §9:
    /// "store hex internally... equality comparisons use hex").
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Render as a bech32 `npub1...` string for display.
    pub fn to_npub(&self) -> String {
        let hrp = Hrp::parse("npub").expect("valid hrp");
        bech32::encode::<Bech32>(hrp, &self.0).expect("32 bytes encodes")
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        PublicKey::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// A 32-byte event id: `sha256(canonical_bytes(event_without_id_and_sig))`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(pub [u8; 32]);

impl EventId {
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::BadFrame(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::BadFrame("event id not 32 bytes".into()))?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventId({})", self.to_hex())
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Serialize for EventId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        EventId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A 64-byte BIP-340 Schnorr signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::BadFrame(e.to_string()))?;
        let arr: [u8; 64] = bytes
            .try_into()
            .map_err(|_| Error::BadFrame("signature not 64 bytes".into()))?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", &self.to_hex()[..16])
    }
}

impl Serialize for Signature {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        Signature::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Event kind, a bare integer per NIP-01. Helpers classify the ranges this
/// core cares about (spec §6 kinds table).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Kind(pub u16);

impl Kind {
    pub const WORKOUT_RECORD: Kind = Kind(1301);
    pub const MEMBERSHIP_LIST: Kind = Kind(30000);
    pub const LEAGUE_DEFINITION: Kind = Kind(30100);
    pub const EVENT_DEFINITION: Kind = Kind(30101);
    pub const TEAM_DEFINITION: Kind = Kind(33404);

    /// Parameterized-replaceable range (NIP-01 §"Kinds"): events here are
    /// addressable by `(pubkey, kind, d_tag)` and newer `created_at` wins.
    pub fn is_addressable(&self) -> bool {
        (30_000..40_000).contains(&self.0)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered tag array, e.g. `["d", "my-slug"]` or `["p", "<hex>"]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(pub Vec<String>);

impl Tag {
    pub fn new(values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self(values.into_iter().map(Into::into).collect())
    }

    /// The tag's key, i.e. `tag[0]`.
    pub fn key(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// The tag's first value, i.e. `tag[1]`.
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }

    pub fn d(value: impl Into<String>) -> Self {
        Tag::new(["d".to_string(), value.into()])
    }

    pub fn p(pubkey: &PublicKey) -> Self {
        Tag::new(["p".to_string(), pubkey.to_hex()])
    }
}

/// The addressable coordinate `(pubkey, kind, d_tag)` (spec §3).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Coordinate {
    pub pubkey: PublicKey,
    pub kind: Kind,
    pub d_tag: String,
}

impl Coordinate {
    pub fn new(pubkey: PublicKey, kind: Kind, d_tag: impl Into<String>) -> Self {
        Self {
            pubkey,
            kind,
            d_tag: d_tag.into(),
        }
    }
}

/// The atomic unit on the wire (spec §3 "Event").
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub pubkey: PublicKey,
    pub created_at: u64,
    pub kind: Kind,
    pub tags: Vec<Tag>,
    pub content: String,
    pub sig: Signature,
}

impl Event {
    /// First value of the first `"d"` tag, if this event carries one.
    pub fn d_tag(&self) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key() == Some("d"))
            .and_then(Tag::value)
    }

    /// The addressable coordinate this event would occupy, if its kind is
    /// in the addressable range and it carries a `d` tag.
    pub fn coordinate(&self) -> Option<Coordinate> {
        if !self.kind.is_addressable() {
            return None;
        }
        self.d_tag()
            .map(|d| Coordinate::new(self.pubkey, self.kind, d))
    }

    /// Value of the first tag with the given key, e.g. `tag_value("exercise")`.
    pub fn tag_value(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.key() == Some(key))
            .and_then(Tag::value)
    }

    /// All values of tags with the given key (e.g. every `"p"` tag).
    pub fn tag_values(&self, key: &str) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|t| t.key() == Some(key))
            .filter_map(Tag::value)
            .collect()
    }
}

/// A REQ filter (spec §6 "A `<filter>` recognizes...").
#[derive(Clone, Debug, Default)]
pub struct Filter {
    pub ids: Option<Vec<EventId>>,
    pub authors: Option<Vec<PublicKey>>,
    pub kinds: Option<Vec<Kind>>,
    pub since: Option<u64>,
    pub until: Option<u64>,
    pub limit: Option<u32>,
    /// Tag filters, e.g. `"#d"`, `"#team"`, `"#p"`, keyed without the `#`.
    /// NIP-01 only indexes single-letter tags, but this core also filters
    /// on the multi-letter `"#team"` tag (spec §4.H `query_for_team`), so
    /// the key is a full string rather than a single `char`.
    pub tags: std::collections::BTreeMap<String, Vec<String>>,
}

impl Serialize for Filter {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let len = [
            self.ids.is_some(),
            self.authors.is_some(),
            self.kinds.is_some(),
            self.since.is_some(),
            self.until.is_some(),
            self.limit.is_some(),
        ]
        .iter()
        .filter(|b| **b)
        .count()
            + self.tags.len();
        let mut m = s.serialize_map(Some(len))?;
        if let Some(ids) = &self.ids {
            m.serialize_entry("ids", ids)?;
        }
        if let Some(authors) = &self.authors {
            m.serialize_entry("authors", authors)?;
        }
        if let Some(kinds) = &self.kinds {
            m.serialize_entry("kinds", kinds)?;
        }
        if let Some(since) = &self.since {
            m.serialize_entry("since", since)?;
        }
        if let Some(until) = &self.until {
            m.serialize_entry("until", until)?;
        }
        if let Some(limit) = &self.limit {
            m.serialize_entry("limit", limit)?;
        }
        for (key, values) in &self.tags {
            m.serialize_entry(&format!("#{key}"), values)?;
        }
        m.end()
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            ids: Option<Vec<EventId>>,
            authors: Option<Vec<PublicKey>>,
            kinds: Option<Vec<Kind>>,
            since: Option<u64>,
            until: Option<u64>,
            limit: Option<u32>,
            #[serde(flatten)]
            rest: std::collections::BTreeMap<String, serde_json::Value>,
        }
        let raw = Raw::deserialize(d)?;
        let mut tags = std::collections::BTreeMap::new();
        for (key, value) in raw.rest {
            if let Some(tag_key) = key.strip_prefix('#') {
                let values: Vec<String> = serde_json::from_value(value)
                    .map_err(|e| serde::de::Error::custom(e.to_string()))?;
                tags.insert(tag_key.to_string(), values);
            }
        }
        Ok(Filter {
            ids: raw.ids,
            authors: raw.authors,
            kinds: raw.kinds,
            since: raw.since,
            until: raw.until,
            limit: raw.limit,
            tags,
        })
    }
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = Kind>) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn authors(mut self, authors: impl IntoIterator<Item = PublicKey>) -> Self {
        self.authors = Some(authors.into_iter().collect());
        self
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn tag(mut self, key: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags
            .insert(key.into(), values.into_iter().map(Into::into).collect());
        self
    }

    /// Does this event match the filter? Used client-side for defensive
    /// re-filtering of relay responses (relays are untrusted).
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&event.id) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.contains(&event.pubkey) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at >= until {
                return false;
            }
        }
        for (key, values) in &self.tags {
            let present = event.tags.iter().any(|t| {
                t.key() == Some(key.as_str())
                    && t.value().map(|v| values.iter().any(|x| x == v)).unwrap_or(false)
            });
            if !present {
                return false;
            }
        }
        true
    }
}

