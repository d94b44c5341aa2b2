//! Canonical serialization for event id hashing (spec §3, §6).
//!
//! NIP-01 defines the id as `sha256` of the UTF-8 bytes of
//! `[0, pubkey, created_at, kind, tags, content]` serialized with *no*
//! insignificant whitespace and with a specific escaping rule that differs
//! from `serde_json`'s default (which escapes every non-ASCII codepoint).
//! We therefore hand-build this string rather than going through
//! `serde_json::to_string`.

use crate::types::{Event, EventId, Kind, PublicKey, Tag};
use sha2::{Digest, Sha256};

/// Escape a string per the NIP-01 rule: backslash, double quote, and
/// control characters (`<0x20`) are escaped; everything else (including
/// multi-byte UTF-8) passes through verbatim.
fn escape_json_string(s: &str, out: &mut String) {
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

fn write_tags(tags: &[Tag], out: &mut String) {
    out.push('[');
    for (i, tag) in tags.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push('[');
        for (j, value) in tag.0.iter().enumerate() {
            if j > 0 {
                out.push(',');
            }
            escape_json_string(value, out);
        }
        out.push(']');
    }
    out.push(']');
}

/// Build the exact byte string that is hashed to produce an event id.
pub fn id_payload(pubkey: &PublicKey, created_at: u64, kind: Kind, tags: &[Tag], content: &str) -> String {
    let mut out = String::with_capacity(128 + content.len());
    out.push_str("[0,");
    escape_json_string(&pubkey.to_hex(), &mut out);
    out.push(',');
    out.push_str(&created_at.to_string());
    out.push(',');
    out.push_str(&kind.0.to_string());
    out.push(',');
    write_tags(tags, &mut out);
    out.push(',');
    escape_json_string(content, &mut out);
    out.push(']');
    out
}

/// Compute the id of an event's content (ignoring any existing `id`/`sig`).
pub fn compute_id(pubkey: &PublicKey, created_at: u64, kind: Kind, tags: &[Tag], content: &str) -> EventId {
    let payload = id_payload(pubkey, created_at, kind, tags, content);
    let digest = Sha256::digest(payload.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    EventId(bytes)
}

/// Recompute `event.id` from its other fields, for verification.
pub fn recompute_id(event: &Event) -> EventId {
    compute_id(&event.pubkey, event.created_at, event.kind, &event.tags, &event.content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escaping_handles_control_and_quote_chars() {
        let mut out = String::new();
        escape_json_string("line1\nline2\t\"quoted\"\\", &mut out);
        assert_eq!(out, "\"line1\\nline2\\t\\\"quoted\\\"\\\\\"");
    }

    #[test]
    fn escaping_passes_through_non_ascii() {
        let mut out = String::new();
        escape_json_string("héllo 🏃", &mut out);
        assert_eq!(out, "\"héllo 🏃\"");
    }

    #[test]
    fn id_payload_matches_nip01_array_shape() {
        let pubkey = PublicKey([0x11; 32]);
        let tags = vec![Tag::d("abc")];
        let payload = id_payload(&pubkey, 12345, Kind(1301), &tags, "hello");
        assert!(payload.starts_with("[0,\""));
        assert!(payload.contains(",12345,1301,[[\"d\",\"abc\"]],\"hello\"]"));
    }

    #[test]
    fn compute_id_is_deterministic() {
        let pubkey = PublicKey([0x22; 32]);
        let tags = vec![Tag::d("x")];
        let id1 = compute_id(&pubkey, 1, Kind(30000), &tags, "");
        let id2 = compute_id(&pubkey, 1, Kind(30000), &tags, "");
        assert_eq!(id1, id2);
    }

    #[test]
    fn compute_id_changes_with_content() {
        let pubkey = PublicKey([0x22; 32]);
        let tags = vec![Tag::d("x")];
        let id1 = compute_id(&pubkey, 1, Kind(30000), &tags, "a");
        let id2 = compute_id(&pubkey, 1, Kind(30000), &tags, "b");
        assert_ne!(id1, id2);
    }
}
