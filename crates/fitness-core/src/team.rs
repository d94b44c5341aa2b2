//! Team definitions, kind 33404 (spec §3 "Team definition").

use crate::error::{Error, Result};
use nostr_wire::{Event, EventBuilder, KeyPair, Kind, PublicKey, Tag};

/// A parsed team definition. The captain pubkey is the exclusive owner —
/// callers must check `event.pubkey == team.captain` before trusting any
/// event at this coordinate; [`Team::from_event`] does not enforce it
/// itself, since enforcement belongs to whichever layer already has the
/// addressable store's "latest event" in hand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Team {
    pub d_tag: String,
    pub name: String,
    pub about: String,
    pub captain: PublicKey,
    pub public: bool,
    pub activity: Option<String>,
    pub location: Option<String>,
    pub list_support: bool,
}

impl Team {
    pub fn from_event(event: &Event) -> Result<Self> {
        let d_tag = event
            .d_tag()
            .ok_or_else(|| Error::InvalidRange("team definition missing d tag".into()))?
            .to_string();
        let name = event
            .tag_value("name")
            .ok_or_else(|| Error::InvalidRange("team definition missing name tag".into()))?
            .to_string();
        let about = event.tag_value("about").unwrap_or("").to_string();
        let captain_hex = event
            .tag_value("captain")
            .ok_or_else(|| Error::InvalidRange("team definition missing captain tag".into()))?;
        let captain = PublicKey::parse(captain_hex)?;
        let public = event.tag_value("public") == Some("true");
        let activity = event.tag_value("activity").map(str::to_string);
        let location = event.tag_value("location").map(str::to_string);
        let list_support = event.tag_value("list_support") == Some("true");

        Ok(Team {
            d_tag,
            name,
            about,
            captain,
            public,
            activity,
            location,
            list_support,
        })
    }

    /// Non-authoritative display filter for teams the captain has renamed
    /// to signal deletion. Never gates writes or store updates — the spec
    /// treats this purely as a UI convention (§9 Open Question).
    pub fn is_soft_deleted(&self) -> bool {
        self.name == "Deleted"
    }

    pub fn member_list_d_tag(&self) -> String {
        format!("{}-members", self.d_tag)
    }
}

/// Build and sign a new (or updated) team definition event.
#[allow(clippy::too_many_arguments)]
pub fn create_team(
    name: &str,
    about: &str,
    public: bool,
    activity: Option<&str>,
    location: Option<&str>,
    list_support: bool,
    content: &str,
    keypair: &KeyPair,
) -> Result<Event> {
    let d_tag = generate_team_d_tag(name);
    let captain = keypair.public_key();

    let mut builder = EventBuilder::new(Kind::TEAM_DEFINITION)
        .tag(Tag::d(&d_tag))
        .tag(Tag::new(["name".to_string(), name.to_string()]))
        .tag(Tag::new(["about".to_string(), about.to_string()]))
        .tag(Tag::new(["captain".to_string(), captain.to_hex()]))
        .tag(Tag::new(["public".to_string(), public.to_string()]))
        .tag(Tag::new(["t".to_string(), "team".to_string()]))
        .tag(Tag::new(["t".to_string(), "fitness".to_string()]))
        .content(content);

    if let Some(activity) = activity {
        builder = builder.tag(Tag::new(["activity".to_string(), activity.to_string()]));
    }
    if let Some(location) = location {
        builder = builder.tag(Tag::new(["location".to_string(), location.to_string()]));
    }
    if list_support {
        builder = builder.tag(Tag::new(["list_support".to_string(), "true".to_string()]));
    }

    builder.build(keypair).map_err(Error::Wire)
}

/// `slugify(name).truncate(30) + "-" + base36(now_ms).last(4)` (spec §4.D).
pub fn generate_team_d_tag(name: &str) -> String {
    let slug = slugify(name);
    let truncated: String = slug.chars().take(30).collect();
    let now_ms = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis() as u64;
    let suffix = base36(now_ms);
    let suffix_tail: String = suffix.chars().rev().take(4).collect::<String>().chars().rev().collect();
    format!("{truncated}-{suffix_tail}")
}

fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_dash = false;
    for c in s.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_was_dash = false;
        } else if !last_was_dash && !out.is_empty() {
            out.push('-');
            last_was_dash = true;
        }
    }
    if out.ends_with('-') {
        out.pop();
    }
    out
}

const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn base36(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        digits.push(BASE36_ALPHABET[(n % 36) as usize]);
        n /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).expect("base36 alphabet is ascii")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_collapses_punctuation() {
        assert_eq!(slugify("Iron  Runners!!"), "iron-runners");
        assert_eq!(slugify("  Leading space"), "leading-space");
    }

    #[test]
    fn generated_d_tag_is_stable_shape() {
        let d_tag = generate_team_d_tag("Iron Runners");
        assert!(d_tag.starts_with("iron-runners-"));
        let suffix = d_tag.rsplit('-').next().unwrap();
        assert_eq!(suffix.len(), 4);
    }

    #[test]
    fn create_and_parse_round_trip() {
        let kp = KeyPair::generate();
        let event = create_team(
            "Iron Runners",
            "We run.",
            true,
            Some("running"),
            None,
            true,
            "{}",
            &kp,
        )
        .unwrap();

        let team = Team::from_event(&event).unwrap();
        assert_eq!(team.name, "Iron Runners");
        assert_eq!(team.captain, kp.public_key());
        assert!(team.public);
        assert!(team.list_support);
        assert_eq!(team.activity.as_deref(), Some("running"));
        assert!(team.location.is_none());
    }

    #[test]
    fn is_soft_deleted_checks_exact_name() {
        let kp = KeyPair::generate();
        let event = create_team("Deleted", "", false, None, None, false, "{}", &kp).unwrap();
        let team = Team::from_event(&event).unwrap();
        assert!(team.is_soft_deleted());
    }

    #[test]
    fn member_list_d_tag_appends_suffix() {
        let team = Team {
            d_tag: "iron-runners-ab12".into(),
            name: "Iron Runners".into(),
            about: String::new(),
            captain: KeyPair::generate().public_key(),
            public: true,
            activity: None,
            location: None,
            list_support: true,
        };
        assert_eq!(team.member_list_d_tag(), "iron-runners-ab12-members");
    }
}
