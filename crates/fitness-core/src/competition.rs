//! League (kind 30100) and event (kind 30101) definitions (spec §3, §4.H).

use crate::error::{Error, Result};
use crate::store::AddressableStore;
use nostr_wire::{Event, EventBuilder, KeyPair, Kind, PublicKey, Tag, Filter};
use nostr_relay_net::RelayPool;
use std::sync::Arc;
use std::time::Duration;

/// The metric a competition scores on. `FastestTime` and `AveragePace`
/// only make sense for single-day events, per spec §4.J.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GoalType {
    Distance,
    Speed,
    Duration,
    Consistency,
    FastestTime,
    AveragePace,
}

impl GoalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalType::Distance => "distance",
            GoalType::Speed => "speed",
            GoalType::Duration => "duration",
            GoalType::Consistency => "consistency",
            GoalType::FastestTime => "fastest_time",
            GoalType::AveragePace => "average_pace",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "distance" => Some(GoalType::Distance),
            "speed" => Some(GoalType::Speed),
            "duration" => Some(GoalType::Duration),
            "consistency" => Some(GoalType::Consistency),
            "fastest_time" => Some(GoalType::FastestTime),
            "average_pace" => Some(GoalType::AveragePace),
            _ => None,
        }
    }

    pub fn is_event_only(&self) -> bool {
        matches!(self, GoalType::FastestTime | GoalType::AveragePace)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScoringFrequency {
    Daily,
    Weekly,
    Total,
}

impl ScoringFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoringFrequency::Daily => "daily",
            ScoringFrequency::Weekly => "weekly",
            ScoringFrequency::Total => "total",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(ScoringFrequency::Daily),
            "weekly" => Some(ScoringFrequency::Weekly),
            "total" => Some(ScoringFrequency::Total),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompetitionStatus {
    Upcoming,
    Active,
    Completed,
    Cancelled,
}

impl CompetitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompetitionStatus::Upcoming => "upcoming",
            CompetitionStatus::Active => "active",
            CompetitionStatus::Completed => "completed",
            CompetitionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upcoming" => Some(CompetitionStatus::Upcoming),
            "active" => Some(CompetitionStatus::Active),
            "completed" => Some(CompetitionStatus::Completed),
            "cancelled" => Some(CompetitionStatus::Cancelled),
            _ => None,
        }
    }
}

/// A league definition (kind 30100): scored over a date range.
#[derive(Clone, Debug, PartialEq)]
pub struct League {
    pub d_tag: String,
    pub team_d_tag: String,
    pub captain: PublicKey,
    pub activity_type: String,
    pub goal_type: GoalType,
    pub start_date: u64,
    pub end_date: u64,
    pub duration_days: u32,
    pub scoring_frequency: ScoringFrequency,
    pub status: CompetitionStatus,
    pub max_participants: u32,
}

/// An event definition (kind 30101): scored over a single UTC day.
#[derive(Clone, Debug, PartialEq)]
pub struct EventDefinition {
    pub d_tag: String,
    pub team_d_tag: String,
    pub captain: PublicKey,
    pub activity_type: String,
    pub goal_type: GoalType,
    pub event_date: u64,
    pub status: CompetitionStatus,
    pub max_participants: u32,
    pub target_value: Option<f64>,
    pub target_unit: Option<String>,
}

const SECONDS_PER_DAY: u64 = 86_400;

impl League {
    pub fn from_event(event: &Event) -> Result<Self> {
        let d_tag = event
            .d_tag()
            .ok_or_else(|| Error::InvalidRange("league missing d tag".into()))?
            .to_string();
        let team_d_tag = required_tag(event, "team")?.to_string();
        let activity_type = required_tag(event, "activity_type")?.to_string();
        let goal_type = GoalType::parse(required_tag(event, "competition_type")?)
            .ok_or_else(|| Error::InvalidRange("unrecognized competition_type".into()))?;
        let start_date = parse_iso_date(required_tag(event, "start_date")?)?;
        let end_date = parse_iso_date(required_tag(event, "end_date")?)?;
        let duration_days: u32 = required_tag(event, "duration")?
            .parse()
            .map_err(|_| Error::InvalidRange("duration is not a valid integer".into()))?;
        let scoring_frequency = ScoringFrequency::parse(required_tag(event, "scoring_frequency")?)
            .ok_or_else(|| Error::InvalidRange("unrecognized scoring_frequency".into()))?;
        let status = CompetitionStatus::parse(required_tag(event, "status")?)
            .ok_or_else(|| Error::InvalidRange("unrecognized status".into()))?;
        let max_participants: u32 = required_tag(event, "max_participants")?
            .parse()
            .map_err(|_| Error::InvalidRange("max_participants is not a valid integer".into()))?;

        let league = League {
            d_tag,
            team_d_tag,
            captain: event.pubkey,
            activity_type,
            goal_type,
            start_date,
            end_date,
            duration_days,
            scoring_frequency,
            status,
            max_participants,
        };
        league.validate()?;
        Ok(league)
    }

    fn validate(&self) -> Result<()> {
        if self.end_date <= self.start_date {
            return Err(Error::InvalidRange("end_date must be after start_date".into()));
        }
        if self.max_participants == 0 {
            return Err(Error::InvalidRange("max_participants must be positive".into()));
        }
        if self.duration_days == 0 {
            return Err(Error::InvalidRange("duration must be positive".into()));
        }
        let implied = (self.end_date - self.start_date) as i64;
        let claimed = self.duration_days as i64 * SECONDS_PER_DAY as i64;
        if (implied - claimed).abs() > SECONDS_PER_DAY as i64 {
            return Err(Error::InvalidRange(
                "duration is inconsistent with start_date/end_date by more than one day".into(),
            ));
        }
        if self.goal_type.is_event_only() {
            return Err(Error::InvalidRange(format!(
                "goal type {:?} is event-only and cannot be used on a league",
                self.goal_type
            )));
        }
        Ok(())
    }

    pub fn is_currently_active(&self, now: u64) -> bool {
        self.start_date <= now && now <= self.end_date
    }

    fn tags(&self) -> Vec<Tag> {
        vec![
            Tag::d(&self.d_tag),
            Tag::new(["team".to_string(), self.team_d_tag.clone()]),
            Tag::new(["activity_type".to_string(), self.activity_type.clone()]),
            Tag::new(["competition_type".to_string(), self.goal_type.as_str().to_string()]),
            Tag::new(["start_date".to_string(), format_iso_date(self.start_date)]),
            Tag::new(["end_date".to_string(), format_iso_date(self.end_date)]),
            Tag::new(["duration".to_string(), self.duration_days.to_string()]),
            Tag::new(["scoring_frequency".to_string(), self.scoring_frequency.as_str().to_string()]),
            Tag::new(["status".to_string(), self.status.as_str().to_string()]),
            Tag::new(["max_participants".to_string(), self.max_participants.to_string()]),
        ]
    }
}

impl EventDefinition {
    pub fn from_event(event: &Event) -> Result<Self> {
        let d_tag = event
            .d_tag()
            .ok_or_else(|| Error::InvalidRange("event definition missing d tag".into()))?
            .to_string();
        let team_d_tag = required_tag(event, "team")?.to_string();
        let activity_type = required_tag(event, "activity_type")?.to_string();
        let goal_type = GoalType::parse(required_tag(event, "competition_type")?)
            .ok_or_else(|| Error::InvalidRange("unrecognized competition_type".into()))?;
        let event_date = parse_iso_date(required_tag(event, "event_date")?)?;
        let status = CompetitionStatus::parse(required_tag(event, "status")?)
            .ok_or_else(|| Error::InvalidRange("unrecognized status".into()))?;
        let max_participants: u32 = required_tag(event, "max_participants")?
            .parse()
            .map_err(|_| Error::InvalidRange("max_participants is not a valid integer".into()))?;
        let target_value = event.tag_value("target_value").and_then(|v| v.parse().ok());
        let target_unit = event.tag_value("target_unit").map(str::to_string);

        if max_participants == 0 {
            return Err(Error::InvalidRange("max_participants must be positive".into()));
        }

        Ok(EventDefinition {
            d_tag,
            team_d_tag,
            captain: event.pubkey,
            activity_type,
            goal_type,
            event_date,
            status,
            max_participants,
            target_value,
            target_unit,
        })
    }

    /// `[event_date, event_date + 24h)` per spec §4.H.
    pub fn is_currently_active(&self, now: u64) -> bool {
        self.event_date <= now && now < self.event_date + SECONDS_PER_DAY
    }

    fn tags(&self) -> Vec<Tag> {
        let mut tags = vec![
            Tag::d(&self.d_tag),
            Tag::new(["team".to_string(), self.team_d_tag.clone()]),
            Tag::new(["activity_type".to_string(), self.activity_type.clone()]),
            Tag::new(["competition_type".to_string(), self.goal_type.as_str().to_string()]),
            Tag::new(["event_date".to_string(), format_iso_date(self.event_date)]),
            Tag::new(["status".to_string(), self.status.as_str().to_string()]),
            Tag::new(["max_participants".to_string(), self.max_participants.to_string()]),
        ];
        if let Some(value) = self.target_value {
            tags.push(Tag::new(["target_value".to_string(), value.to_string()]));
        }
        if let Some(unit) = &self.target_unit {
            tags.push(Tag::new(["target_unit".to_string(), unit.clone()]));
        }
        tags
    }
}

fn required_tag<'a>(event: &'a Event, key: &str) -> Result<&'a str> {
    event
        .tag_value(key)
        .ok_or_else(|| Error::InvalidRange(format!("missing required tag \"{key}\"")))
}

/// Results of [`CompetitionDefinitionService::query_for_team`].
#[derive(Debug, Default, Clone)]
pub struct TeamCompetitions {
    pub leagues: Vec<League>,
    pub events: Vec<EventDefinition>,
}

pub struct CompetitionDefinitionService {
    pool: Arc<RelayPool>,
    store: Arc<AddressableStore>,
}

impl CompetitionDefinitionService {
    pub fn new(pool: Arc<RelayPool>, store: Arc<AddressableStore>) -> Self {
        Self { pool, store }
    }

    /// Build, validate, sign, and publish a league (kind 30100). `key` must
    /// sign for `league.captain` (spec §7: "you are not the captain" is
    /// caught before any signed replacement is published).
    pub async fn create_league(&self, league: League, key: &KeyPair) -> Result<nostr_relay_net::PublishReport> {
        if key.public_key() != league.captain {
            return Err(Error::NotCaptain);
        }
        league.validate()?;
        let event = EventBuilder::new(Kind::LEAGUE_DEFINITION)
            .tags(league.tags())
            .content(serde_json::to_string(&league_content(&league)).unwrap_or_default())
            .build(key)?;
        self.store.observe(event.clone());
        Ok(self.pool.publish(event).await?)
    }

    /// Build, validate, sign, and publish an event (kind 30101). Unlike a
    /// league, `event_date` must be strictly in the future at build time.
    pub async fn create_event(&self, event_def: EventDefinition, now: u64, key: &KeyPair) -> Result<nostr_relay_net::PublishReport> {
        if key.public_key() != event_def.captain {
            return Err(Error::NotCaptain);
        }
        if event_def.event_date <= now {
            return Err(Error::InvalidRange("event_date must be strictly in the future".into()));
        }
        if event_def.max_participants == 0 {
            return Err(Error::InvalidRange("max_participants must be positive".into()));
        }
        let event = EventBuilder::new(Kind::EVENT_DEFINITION)
            .tags(event_def.tags())
            .content(serde_json::to_string(&event_content(&event_def)).unwrap_or_default())
            .build(key)?;
        self.store.observe(event.clone());
        Ok(self.pool.publish(event).await?)
    }

    /// Subscribe with `kinds=[30100, 30101]`, `#team=[team_d_tag]`, wait for
    /// convergence, dedup via the addressable store.
    pub async fn query_for_team(&self, team_d_tag: &str, deadline: Duration) -> Result<TeamCompetitions> {
        let filter = Filter::new()
            .kinds([Kind::LEAGUE_DEFINITION, Kind::EVENT_DEFINITION])
            .tag("team", [team_d_tag.to_string()]);
        let handle = self.pool.subscribe(vec![filter])?;

        let drain = async {
            while let Some(event) = handle.next_event().await {
                self.store.observe(event);
            }
        };
        tokio::select! {
            _ = drain => {},
            _ = handle.wait_eose(deadline) => {},
        }
        handle.close();

        let mut out = TeamCompetitions::default();
        for event in self.store.snapshot() {
            if event.kind == Kind::LEAGUE_DEFINITION && event.tag_value("team") == Some(team_d_tag) {
                if let Ok(league) = League::from_event(&event) {
                    out.leagues.push(league);
                }
            } else if event.kind == Kind::EVENT_DEFINITION && event.tag_value("team") == Some(team_d_tag) {
                if let Ok(event_def) = EventDefinition::from_event(&event) {
                    out.events.push(event_def);
                }
            }
        }
        Ok(out)
    }

    /// Rebuild the league with an updated `status` and a fresh `created_at`,
    /// republish. The store's supersede rule (§4.F) converges readers.
    pub async fn update_league_status(
        &self,
        mut league: League,
        new_status: CompetitionStatus,
        key: &KeyPair,
    ) -> Result<nostr_relay_net::PublishReport> {
        league.status = new_status;
        self.create_league(league, key).await
    }

    /// Mirror of [`CompetitionDefinitionService::update_league_status`] for events.
    pub async fn update_event_status(
        &self,
        mut event_def: EventDefinition,
        new_status: CompetitionStatus,
        now: u64,
        key: &KeyPair,
    ) -> Result<nostr_relay_net::PublishReport> {
        if key.public_key() != event_def.captain {
            return Err(Error::NotCaptain);
        }
        event_def.status = new_status;
        let event = EventBuilder::new(Kind::EVENT_DEFINITION)
            .tags(event_def.tags())
            .content(serde_json::to_string(&event_content(&event_def)).unwrap_or_default())
            .created_at(now)
            .build(key)?;
        self.store.observe(event.clone());
        Ok(self.pool.publish(event).await?)
    }
}

fn league_content(league: &League) -> serde_json::Value {
    serde_json::json!({
        "d": league.d_tag,
        "team": league.team_d_tag,
        "activity_type": league.activity_type,
        "competition_type": league.goal_type.as_str(),
        "start_date": format_iso_date(league.start_date),
        "end_date": format_iso_date(league.end_date),
        "status": league.status.as_str(),
    })
}

fn event_content(event: &EventDefinition) -> serde_json::Value {
    serde_json::json!({
        "d": event.d_tag,
        "team": event.team_d_tag,
        "activity_type": event.activity_type,
        "competition_type": event.goal_type.as_str(),
        "event_date": format_iso_date(event.event_date),
        "status": event.status.as_str(),
    })
}

/// Days since the epoch for a proleptic-Gregorian civil date
/// (Howard Hinnant's `days_from_civil`), used to parse/format the spec's
/// plain `YYYY-MM-DD` tag values without pulling in a date/time crate the
/// teacher never needed.
fn days_from_civil(y: i64, m: i64, d: i64) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = (if y >= 0 { y } else { y - 399 }) / 400;
    let yoe = y - era * 400;
    let mp = (m + 9) % 12;
    let doy = (153 * mp + 2) / 5 + d - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn civil_from_days(z: i64) -> (i64, i64, i64) {
    let z = z + 719_468;
    let era = (if z >= 0 { z } else { z - 146_096 }) / 146_097;
    let doe = z - era * 146_097;
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    (if m <= 2 { y + 1 } else { y }, m, d)
}

pub fn parse_iso_date(s: &str) -> Result<u64> {
    let parts: Vec<&str> = s.split('-').collect();
    if parts.len() != 3 {
        return Err(Error::InvalidRange(format!("not an ISO date: {s}")));
    }
    let y: i64 = parts[0].parse().map_err(|_| Error::InvalidRange(format!("bad year in {s}")))?;
    let m: i64 = parts[1].parse().map_err(|_| Error::InvalidRange(format!("bad month in {s}")))?;
    let d: i64 = parts[2].parse().map_err(|_| Error::InvalidRange(format!("bad day in {s}")))?;
    if !(1..=12).contains(&m) || !(1..=31).contains(&d) {
        return Err(Error::InvalidRange(format!("out-of-range date: {s}")));
    }
    let days = days_from_civil(y, m, d);
    Ok((days * SECONDS_PER_DAY as i64) as u64)
}

pub fn format_iso_date(seconds: u64) -> String {
    let days = (seconds / SECONDS_PER_DAY) as i64;
    let (y, m, d) = civil_from_days(days);
    format!("{y:04}-{m:02}-{d:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_wire::KeyPair;

    fn sample_league() -> League {
        League {
            d_tag: "league-1".into(),
            team_d_tag: "iron-runners-ab12".into(),
            captain: KeyPair::generate().public_key(),
            activity_type: "Running".into(),
            goal_type: GoalType::Distance,
            start_date: parse_iso_date("2026-01-01").unwrap(),
            end_date: parse_iso_date("2026-01-08").unwrap(),
            duration_days: 7,
            scoring_frequency: ScoringFrequency::Total,
            status: CompetitionStatus::Upcoming,
            max_participants: 50,
        }
    }

    #[test]
    fn iso_date_round_trips() {
        assert_eq!(parse_iso_date("1970-01-01").unwrap(), 0);
        assert_eq!(format_iso_date(0), "1970-01-01");
        let d = parse_iso_date("2026-07-28").unwrap();
        assert_eq!(format_iso_date(d), "2026-07-28");
    }

    #[test]
    fn league_validation_rejects_inverted_range() {
        let mut league = sample_league();
        league.end_date = league.start_date - SECONDS_PER_DAY;
        assert!(league.validate().is_err());
    }

    #[test]
    fn league_validation_rejects_inconsistent_duration() {
        let mut league = sample_league();
        league.duration_days = 100;
        assert!(league.validate().is_err());
    }

    #[test]
    fn league_validation_rejects_event_only_goal_type() {
        let mut league = sample_league();
        league.goal_type = GoalType::FastestTime;
        assert!(league.validate().is_err());
    }

    #[test]
    fn league_validation_accepts_well_formed_input() {
        assert!(sample_league().validate().is_ok());
    }

    #[test]
    fn league_is_active_within_window() {
        let league = sample_league();
        assert!(!league.is_currently_active(league.start_date - 1));
        assert!(league.is_currently_active(league.start_date));
        assert!(league.is_currently_active(league.end_date));
        assert!(!league.is_currently_active(league.end_date + 1));
    }

    #[test]
    fn event_is_active_for_exactly_one_day() {
        let event = EventDefinition {
            d_tag: "event-1".into(),
            team_d_tag: "iron-runners-ab12".into(),
            captain: KeyPair::generate().public_key(),
            activity_type: "Running".into(),
            goal_type: GoalType::FastestTime,
            event_date: parse_iso_date("2026-03-01").unwrap(),
            status: CompetitionStatus::Upcoming,
            max_participants: 10,
            target_value: Some(10.0),
            target_unit: Some("km".into()),
        };
        assert!(!event.is_currently_active(event.event_date - 1));
        assert!(event.is_currently_active(event.event_date));
        assert!(event.is_currently_active(event.event_date + SECONDS_PER_DAY - 1));
        assert!(!event.is_currently_active(event.event_date + SECONDS_PER_DAY));
    }

    #[test]
    fn league_tag_round_trip_through_event() {
        let key = KeyPair::generate();
        let league = sample_league();
        let event = EventBuilder::new(Kind::LEAGUE_DEFINITION)
            .tags(league.tags())
            .content("{}")
            .build(&key)
            .unwrap();
        let rebuilt = League::from_event(&event).unwrap();
        assert_eq!(rebuilt.team_d_tag, league.team_d_tag);
        assert_eq!(rebuilt.start_date, league.start_date);
        assert_eq!(rebuilt.goal_type, league.goal_type);
    }

    #[tokio::test]
    async fn create_league_rejects_a_non_captain_signer() {
        let captain = KeyPair::generate();
        let impostor = KeyPair::generate();
        let mut league = sample_league();
        league.captain = captain.public_key();
        let service = CompetitionDefinitionService::new(
            Arc::new(RelayPool::new(Default::default())),
            Arc::new(AddressableStore::new()),
        );
        let err = service.create_league(league, &impostor).await.unwrap_err();
        assert!(matches!(err, Error::NotCaptain));
    }

    #[tokio::test]
    async fn create_event_rejects_a_non_captain_signer() {
        let captain = KeyPair::generate();
        let impostor = KeyPair::generate();
        let event_def = EventDefinition {
            d_tag: "event-1".into(),
            team_d_tag: "iron-runners-ab12".into(),
            captain: captain.public_key(),
            activity_type: "Running".into(),
            goal_type: GoalType::FastestTime,
            event_date: parse_iso_date("2099-03-01").unwrap(),
            status: CompetitionStatus::Upcoming,
            max_participants: 10,
            target_value: Some(5.0),
            target_unit: Some("km".into()),
        };
        let service = CompetitionDefinitionService::new(
            Arc::new(RelayPool::new(Default::default())),
            Arc::new(AddressableStore::new()),
        );
        let err = service.create_event(event_def, 0, &impostor).await.unwrap_err();
        assert!(matches!(err, Error::NotCaptain));
    }
}
