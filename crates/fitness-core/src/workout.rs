//! Workout query service, kind 1301 (spec §3 "Workout record", §4.I).

use crate::error::Result;
use nostr_wire::{Event, Filter, Kind, PublicKey};
use nostr_relay_net::RelayPool;
use std::sync::Arc;
use std::time::Duration;

/// A recognized activity, with unrecognized `exercise` values preserved
/// verbatim rather than rejected (spec §4.I: "unknown activities are
/// preserved verbatim").
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ActivityType {
    Running,
    Walking,
    Cycling,
    Swimming,
    StrengthTraining,
    Yoga,
    Hiking,
    Rowing,
    Unknown(String),
}

impl ActivityType {
    /// Maps an `exercise` tag value onto a known activity, case-insensitively,
    /// falling through to `Unknown` for anything not in the table.
    pub fn from_tag_value(raw: &str) -> Self {
        match raw.to_lowercase().as_str() {
            "running" | "run" => ActivityType::Running,
            "walking" | "walk" => ActivityType::Walking,
            "cycling" | "bike" | "biking" => ActivityType::Cycling,
            "swimming" | "swim" => ActivityType::Swimming,
            "strength training" | "strength_training" | "gym" | "weights" => {
                ActivityType::StrengthTraining
            }
            "yoga" => ActivityType::Yoga,
            "hiking" | "hike" => ActivityType::Hiking,
            "rowing" | "row" => ActivityType::Rowing,
            _ => ActivityType::Unknown(raw.to_string()),
        }
    }

    /// The raw `exercise` filter value. `"Any"` disables activity filtering
    /// entirely in [`fetch_workouts`].
    pub fn matches_filter(&self, filter: &str) -> bool {
        if filter.eq_ignore_ascii_case("any") {
            return true;
        }
        match self {
            ActivityType::Unknown(raw) => raw.eq_ignore_ascii_case(filter),
            other => other.as_canonical_str().eq_ignore_ascii_case(filter),
        }
    }

    fn as_canonical_str(&self) -> &str {
        match self {
            ActivityType::Running => "Running",
            ActivityType::Walking => "Walking",
            ActivityType::Cycling => "Cycling",
            ActivityType::Swimming => "Swimming",
            ActivityType::StrengthTraining => "Strength Training",
            ActivityType::Yoga => "Yoga",
            ActivityType::Hiking => "Hiking",
            ActivityType::Rowing => "Rowing",
            ActivityType::Unknown(raw) => raw,
        }
    }
}

/// A half-open time window over `created_at`, `[start, end)` (spec §8
/// "A workout record with `created_at == window.start` is included;
/// `== window.end` is excluded").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub start: u64,
    pub end: u64,
}

impl Window {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    fn contains(&self, created_at: u64) -> bool {
        created_at >= self.start && created_at < self.end
    }
}

/// A parsed, validated workout record.
#[derive(Clone, Debug, PartialEq)]
pub struct Workout {
    pub author: PublicKey,
    pub created_at: u64,
    pub activity: ActivityType,
    pub distance_km: f64,
    pub duration_s: u32,
    pub calories: Option<u32>,
}

impl Workout {
    pub fn distance_m(&self) -> f64 {
        self.distance_km * 1000.0
    }

    /// `None` when distance is zero, since pace is undefined at zero distance.
    pub fn pace_min_per_km(&self) -> Option<f64> {
        if self.distance_km <= 0.0 {
            return None;
        }
        Some((self.duration_s as f64 / 60.0) / self.distance_km)
    }
}

/// Parse one kind-1301 event into a [`Workout`], or `None` if it fails any
/// of the tag-level validation rules in spec §4.I. Malformed records are
/// dropped silently rather than surfaced as errors — a single bad workout
/// must not fail the whole query.
fn parse_workout(event: &Event) -> Option<Workout> {
    let exercise = event.tag_value("exercise")?;
    let distance_km: f64 = event.tag_value("distance")?.parse().ok()?;
    if !(distance_km >= 0.0 && distance_km <= 1000.0) {
        return None;
    }
    let duration_s = parse_hms(event.tag_value("duration")?)?;
    if duration_s == 0 || duration_s > 24 * 3600 {
        return None;
    }
    let calories = event
        .tag_value("calories")
        .and_then(|raw| raw.parse::<i64>().ok())
        .filter(|n| *n >= 0)
        .map(|n| n as u32);

    Some(Workout {
        author: event.pubkey,
        created_at: event.created_at,
        activity: ActivityType::from_tag_value(exercise),
        distance_km,
        duration_s,
        calories,
    })
}

/// Parse `HH:MM:SS` into whole seconds. Any other shape, or an
/// out-of-range component, is rejected.
fn parse_hms(s: &str) -> Option<u32> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let h: u32 = parts[0].parse().ok()?;
    let m: u32 = parts[1].parse().ok()?;
    let sec: u32 = parts[2].parse().ok()?;
    if m >= 60 || sec >= 60 {
        return None;
    }
    Some(h * 3600 + m * 60 + sec)
}

pub struct WorkoutQueryService {
    pool: Arc<RelayPool>,
}

impl WorkoutQueryService {
    pub fn new(pool: Arc<RelayPool>) -> Self {
        Self { pool }
    }

    /// Subscribe `kinds=[1301]`, `authors=<authors>`, `since/until` from
    /// `window`, `limit=1000` (spec §4.I), drain until EOSE convergence or
    /// `deadline`, parse and filter by `activity_filter` (`"Any"` disables
    /// the filter). `distance == 0` or `duration == 0` workouts are
    /// dropped pre-scoring (spec §8).
    pub async fn fetch_workouts(
        &self,
        authors: &[PublicKey],
        window: Window,
        activity_filter: &str,
        deadline: Duration,
    ) -> Result<Vec<Workout>> {
        if authors.is_empty() {
            return Ok(Vec::new());
        }
        let filter = Filter::new()
            .kinds([Kind::WORKOUT_RECORD])
            .authors(authors.iter().copied())
            .since(window.start)
            .until(window.end)
            .limit(1000);
        let handle = self.pool.subscribe(vec![filter])?;

        let mut workouts = Vec::new();
        let drain = async {
            while let Some(event) = handle.next_event().await {
                if window.contains(event.created_at) {
                    if let Some(workout) = parse_workout(&event) {
                        if workout.distance_km > 0.0 && workout.duration_s > 0 {
                            workouts.push(workout);
                        }
                    }
                }
            }
        };
        tokio::select! {
            _ = drain => {},
            _ = handle.wait_eose(deadline) => {},
        }
        handle.close();

        workouts.retain(|w| w.activity.matches_filter(activity_filter));
        Ok(workouts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_wire::{EventBuilder, KeyPair, Tag};

    fn workout_event(kp: &KeyPair, exercise: &str, distance: &str, duration: &str, created_at: u64) -> Event {
        EventBuilder::new(Kind::WORKOUT_RECORD)
            .tag(Tag::new(["exercise".to_string(), exercise.to_string()]))
            .tag(Tag::new(["distance".to_string(), distance.to_string()]))
            .tag(Tag::new(["duration".to_string(), duration.to_string()]))
            .content("{}")
            .created_at(created_at)
            .build(kp)
            .unwrap()
    }

    #[test]
    fn parses_well_formed_workout() {
        let kp = KeyPair::generate();
        let event = workout_event(&kp, "Running", "5.0", "00:25:00", 1000);
        let workout = parse_workout(&event).unwrap();
        assert_eq!(workout.distance_km, 5.0);
        assert_eq!(workout.duration_s, 1500);
        assert_eq!(workout.activity, ActivityType::Running);
    }

    #[test]
    fn rejects_negative_distance() {
        let kp = KeyPair::generate();
        let event = workout_event(&kp, "Running", "-1.0", "00:25:00", 1000);
        assert!(parse_workout(&event).is_none());
    }

    #[test]
    fn rejects_distance_over_1000km() {
        let kp = KeyPair::generate();
        let event = workout_event(&kp, "Running", "1000.1", "00:25:00", 1000);
        assert!(parse_workout(&event).is_none());
    }

    #[test]
    fn rejects_malformed_duration() {
        let kp = KeyPair::generate();
        let event = workout_event(&kp, "Running", "5.0", "not-a-time", 1000);
        assert!(parse_workout(&event).is_none());
    }

    #[test]
    fn rejects_duration_over_24h() {
        let kp = KeyPair::generate();
        let event = workout_event(&kp, "Running", "5.0", "25:00:00", 1000);
        assert!(parse_workout(&event).is_none());
    }

    #[test]
    fn unknown_activity_is_preserved_verbatim() {
        let kp = KeyPair::generate();
        let event = workout_event(&kp, "Parkour", "2.0", "00:10:00", 1000);
        let workout = parse_workout(&event).unwrap();
        assert_eq!(workout.activity, ActivityType::Unknown("Parkour".to_string()));
    }

    #[test]
    fn optional_calories_parses_when_present_and_non_negative() {
        let kp = KeyPair::generate();
        let event = EventBuilder::new(Kind::WORKOUT_RECORD)
            .tag(Tag::new(["exercise".to_string(), "Running".to_string()]))
            .tag(Tag::new(["distance".to_string(), "5.0".to_string()]))
            .tag(Tag::new(["duration".to_string(), "00:25:00".to_string()]))
            .tag(Tag::new(["calories".to_string(), "350".to_string()]))
            .content("{}")
            .build(&kp)
            .unwrap();
        let workout = parse_workout(&event).unwrap();
        assert_eq!(workout.calories, Some(350));
    }

    #[test]
    fn window_is_half_open() {
        let window = Window::new(100, 200);
        assert!(window.contains(100));
        assert!(!window.contains(200));
        assert!(window.contains(199));
    }

    #[test]
    fn activity_filter_any_matches_everything() {
        let running = ActivityType::Running;
        assert!(running.matches_filter("Any"));
        assert!(running.matches_filter("any"));
        assert!(running.matches_filter("Running"));
        assert!(!running.matches_filter("Cycling"));
    }

    #[test]
    fn pace_is_none_at_zero_distance() {
        let workout = Workout {
            author: KeyPair::generate().public_key(),
            created_at: 0,
            activity: ActivityType::Running,
            distance_km: 0.0,
            duration_s: 100,
            calories: None,
        };
        assert!(workout.pace_min_per_km().is_none());
    }
}
