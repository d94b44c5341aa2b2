//! Leaderboard engine (spec §4.J): scores a cohort's workouts against a
//! competition's goal type and produces a deterministically ranked table.

use crate::competition::GoalType;
use crate::workout::Workout;
use nostr_wire::PublicKey;
use std::cmp::Ordering;
use std::collections::HashMap;

/// A single cohort member's aggregated standing. `score` is unrounded and
/// drives ranking; `formatted_score` is the 2-decimal display string.
#[derive(Clone, Debug, PartialEq)]
pub struct LeaderboardEntry {
    pub pubkey: PublicKey,
    pub rank: u32,
    pub score: Option<f64>,
    pub formatted_score: String,
    pub workout_count: u32,
    pub total_distance_m: f64,
    pub total_duration_s: u64,
    pub last_activity: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Leaderboard {
    pub entries: Vec<LeaderboardEntry>,
    pub scoring_method: String,
}

/// Per-participant accumulation before scoring and ranking.
struct Aggregate {
    pubkey: PublicKey,
    workouts: Vec<Workout>,
}

impl Aggregate {
    fn workout_count(&self) -> u32 {
        self.workouts.len() as u32
    }

    fn total_distance_m(&self) -> f64 {
        self.workouts.iter().map(Workout::distance_m).sum()
    }

    fn total_duration_s(&self) -> u64 {
        self.workouts.iter().map(|w| w.duration_s as u64).sum()
    }

    fn last_activity(&self) -> Option<u64> {
        self.workouts.iter().map(|w| w.created_at).max()
    }

    fn valid_paces(&self) -> Vec<f64> {
        self.workouts
            .iter()
            .filter_map(|w| w.pace_min_per_km())
            .filter(|p| *p > 0.0 && *p < 30.0)
            .collect()
    }
}

/// `lower_is_better` goal types rank ascending score first (and lack a
/// qualifying score as "last" rather than "zero").
fn lower_is_better(goal: GoalType) -> bool {
    matches!(goal, GoalType::FastestTime | GoalType::AveragePace)
}

fn score_for(goal: GoalType, agg: &Aggregate, target_distance_km: Option<f64>) -> Option<f64> {
    match goal {
        GoalType::Distance => Some(agg.total_distance_m()),
        GoalType::Duration => Some(agg.total_duration_s() as f64),
        GoalType::Consistency => Some(agg.workout_count() as f64),
        GoalType::Speed => {
            let paces = agg.valid_paces();
            if paces.is_empty() {
                None
            } else {
                let mean = paces.iter().sum::<f64>() / paces.len() as f64;
                Some(1000.0 / mean)
            }
        }
        GoalType::FastestTime => {
            let target = target_distance_km?;
            let threshold = 0.95 * target;
            agg.workouts
                .iter()
                .filter(|w| w.distance_km >= threshold)
                .map(|w| w.duration_s as f64)
                .fold(None, |acc: Option<f64>, d| Some(acc.map_or(d, |a| a.min(d))))
        }
        GoalType::AveragePace => {
            let paces = agg.valid_paces();
            paces.into_iter().fold(None, |acc: Option<f64>, p| Some(acc.map_or(p, |a| a.min(p))))
        }
    }
}

fn format_score(goal: GoalType, score: Option<f64>) -> String {
    let Some(score) = score else { return "—".to_string() };
    match goal {
        GoalType::Distance => format!("{:.2} km", score / 1000.0),
        GoalType::Duration => format_hm(score as u64),
        GoalType::Consistency => format!("{} workouts", score as u64),
        GoalType::Speed => format!("{} /km", format_mmss(1000.0 / score)),
        GoalType::FastestTime => format_mmss_seconds(score as u64),
        GoalType::AveragePace => format!("{} /km", format_mmss(score)),
    }
}

fn format_hm(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    format!("{hours}h {minutes:02}m")
}

/// `4:32` style, minutes:seconds from a fractional minutes value (used for
/// pace, which is itself expressed in minutes per km).
fn format_mmss(minutes: f64) -> String {
    let total_seconds = (minutes * 60.0).round() as u64;
    let m = total_seconds / 60;
    let s = total_seconds % 60;
    format!("{m}:{s:02}")
}

/// `15:03` style, minutes:seconds from a whole-seconds duration.
fn format_mmss_seconds(total_seconds: u64) -> String {
    let m = total_seconds / 60;
    let s = total_seconds % 60;
    format!("{m}:{s:02}")
}

/// Tie-break key: `(workout_count desc, last_activity asc, pubkey asc)`.
/// `last_activity == None` (zero workouts) sorts after any `Some`.
fn tie_break(a: &Aggregate, b: &Aggregate) -> Ordering {
    b.workout_count()
        .cmp(&a.workout_count())
        .then_with(|| match (a.last_activity(), b.last_activity()) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.pubkey.to_hex().cmp(&b.pubkey.to_hex()))
}

/// Build a ranked leaderboard for `cohort` over `workouts` already filtered
/// to the relevant time window and activity (spec §4.J). `target_distance_km`
/// is required only for `fastest_time`; ignored otherwise.
pub fn build_leaderboard(cohort: &[PublicKey], goal: GoalType, workouts: &[Workout], target_distance_km: Option<f64>) -> Leaderboard {
    let scoring_method = describe_scoring(goal);

    if cohort.is_empty() {
        return Leaderboard {
            entries: Vec::new(),
            scoring_method,
        };
    }

    let mut by_author: HashMap<PublicKey, Vec<Workout>> = HashMap::new();
    for workout in workouts {
        by_author.entry(workout.author).or_default().push(workout.clone());
    }

    let mut aggregates: Vec<Aggregate> = cohort
        .iter()
        .map(|pubkey| Aggregate {
            pubkey: *pubkey,
            workouts: by_author.remove(pubkey).unwrap_or_default(),
        })
        .collect();

    // Stable order before sorting keeps permutation invariance: the input
    // order of `cohort`/`workouts` never leaks into the result.
    aggregates.sort_by(|a, b| a.pubkey.to_hex().cmp(&b.pubkey.to_hex()));

    let descending = !lower_is_better(goal);
    let mut scored: Vec<(Aggregate, Option<f64>)> = aggregates
        .into_iter()
        .map(|agg| {
            let score = score_for(goal, &agg, target_distance_km);
            (agg, score)
        })
        .collect();

    scored.sort_by(|(a, a_score), (b, b_score)| match (a_score, b_score) {
        (Some(x), Some(y)) => {
            let ord = if descending {
                y.partial_cmp(x).unwrap_or(Ordering::Equal)
            } else {
                x.partial_cmp(y).unwrap_or(Ordering::Equal)
            };
            ord.then_with(|| tie_break(a, b))
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => tie_break(a, b),
    });

    // Participants with zero valid workouts (no score at all, or a
    // literal zero from summing nothing) share one terminal bucket rank
    // rather than continuing dense sequential numbering (spec §8:
    // "rank = |cohort| bucket").
    let bucket_rank = scored.len() as u32;
    let mut entries = Vec::with_capacity(scored.len());
    let mut rank = 0u32;
    let mut previous: Option<(&Aggregate, Option<f64>)> = None;
    for (agg, score) in &scored {
        let in_bucket = score.is_none() || agg.workout_count() == 0;
        let assigned_rank = if in_bucket {
            bucket_rank
        } else {
            let is_tie = previous
                .as_ref()
                .map(|(prev_agg, prev_score)| {
                    prev_score.is_some()
                        && scores_equal(*prev_score, *score)
                        && tie_break(prev_agg, agg) == Ordering::Equal
                })
                .unwrap_or(false);
            if !is_tie {
                rank += 1;
            }
            rank
        };
        entries.push(LeaderboardEntry {
            pubkey: agg.pubkey,
            rank: assigned_rank,
            score: *score,
            formatted_score: format_score(goal, *score),
            workout_count: agg.workout_count(),
            total_distance_m: agg.total_distance_m(),
            total_duration_s: agg.total_duration_s(),
            last_activity: agg.last_activity(),
        });
        previous = Some((agg, *score));
    }

    Leaderboard { entries, scoring_method }
}

fn scores_equal(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        (None, None) => true,
        _ => false,
    }
}

fn describe_scoring(goal: GoalType) -> String {
    match goal {
        GoalType::Distance => "total distance covered, higher is better".to_string(),
        GoalType::Speed => "mean pace across workouts, faster is better".to_string(),
        GoalType::Duration => "total time spent, higher is better".to_string(),
        GoalType::Consistency => "number of workouts logged, higher is better".to_string(),
        GoalType::FastestTime => "fastest qualifying time, lower is better".to_string(),
        GoalType::AveragePace => "best pace achieved, lower is better".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nostr_wire::KeyPair;

    fn workout(author: PublicKey, distance_km: f64, duration_s: u32, created_at: u64) -> Workout {
        Workout {
            author,
            created_at,
            activity: crate::workout::ActivityType::Running,
            distance_km,
            duration_s,
            calories: None,
        }
    }

    #[test]
    fn s3_distance_league_ranks_by_total_meters() {
        let a = KeyPair::generate().public_key();
        let b = KeyPair::generate().public_key();
        let c = KeyPair::generate().public_key();
        let workouts = vec![
            workout(a, 5.0, 1500, 100),
            workout(b, 3.0, 900, 100),
            workout(b, 4.0, 1200, 200),
        ];
        let board = build_leaderboard(&[a, b, c], GoalType::Distance, &workouts, None);

        assert_eq!(board.entries[0].pubkey, b);
        assert_eq!(board.entries[0].formatted_score, "7.00 km");
        assert_eq!(board.entries[1].pubkey, a);
        assert_eq!(board.entries[2].pubkey, c);
        assert_eq!(board.entries[2].score, Some(0.0));
    }

    #[test]
    fn s4_fastest_time_disqualifies_below_threshold() {
        let a = KeyPair::generate().public_key();
        let b = KeyPair::generate().public_key();
        let c = KeyPair::generate().public_key();
        let workouts = vec![
            workout(a, 5.1, 1500, 100),
            workout(b, 4.7, 1320, 100),
            workout(c, 5.0, 1590, 100),
        ];
        let board = build_leaderboard(&[a, b, c], GoalType::FastestTime, &workouts, Some(5.0));

        assert_eq!(board.entries[0].pubkey, a);
        assert_eq!(board.entries[0].formatted_score, "25:00");
        assert_eq!(board.entries[1].pubkey, c);
        assert_eq!(board.entries[2].pubkey, b);
        assert!(board.entries[2].score.is_none());
        assert_eq!(board.entries[2].formatted_score, "—");
    }

    #[test]
    fn permutation_invariance_holds() {
        let a = KeyPair::generate().public_key();
        let b = KeyPair::generate().public_key();
        let cohort = [a, b];
        let forward = vec![workout(a, 5.0, 1500, 100), workout(b, 3.0, 900, 200)];
        let shuffled = vec![workout(b, 3.0, 900, 200), workout(a, 5.0, 1500, 100)];

        let board_a = build_leaderboard(&cohort, GoalType::Distance, &forward, None);
        let board_b = build_leaderboard(&cohort, GoalType::Distance, &shuffled, None);
        assert_eq!(board_a, board_b);
    }

    #[test]
    fn empty_cohort_yields_empty_leaderboard_with_method_description() {
        let board = build_leaderboard(&[], GoalType::Distance, &[], None);
        assert!(board.entries.is_empty());
        assert!(!board.scoring_method.is_empty());
    }

    #[test]
    fn zero_workout_participant_scores_zero_and_ranks_last() {
        let a = KeyPair::generate().public_key();
        let b = KeyPair::generate().public_key();
        let workouts = vec![workout(a, 5.0, 1500, 100)];
        let board = build_leaderboard(&[a, b], GoalType::Distance, &workouts, None);
        let b_entry = board.entries.iter().find(|e| e.pubkey == b).unwrap();
        assert_eq!(b_entry.score, Some(0.0));
        assert_eq!(b_entry.rank, board.entries.len() as u32);
    }

    #[test]
    fn equal_scores_still_resolve_to_distinct_ranks_via_pubkey_tiebreak() {
        // a and b tie on score, workout_count, and last_activity, so the
        // pubkey tie-break key still separates them — "true ties" only
        // merge a rank when every tie-break key (including pubkey) matches,
        // which never happens for two distinct cohort members.
        let a = KeyPair::generate().public_key();
        let b = KeyPair::generate().public_key();
        let c = KeyPair::generate().public_key();
        let workouts = vec![
            workout(a, 5.0, 1500, 100),
            workout(b, 5.0, 1500, 100),
            workout(c, 3.0, 900, 100),
        ];
        let board = build_leaderboard(&[a, b, c], GoalType::Distance, &workouts, None);
        let rank_a = board.entries.iter().find(|e| e.pubkey == a).unwrap().rank;
        let rank_b = board.entries.iter().find(|e| e.pubkey == b).unwrap().rank;
        let rank_c = board.entries.iter().find(|e| e.pubkey == c).unwrap().rank;
        assert_ne!(rank_a, rank_b);
        assert_eq!(rank_c, 3);
    }

    #[test]
    fn multiple_zero_workout_participants_share_the_bucket_rank() {
        let a = KeyPair::generate().public_key();
        let b = KeyPair::generate().public_key();
        let c = KeyPair::generate().public_key();
        let workouts = vec![workout(a, 5.0, 1500, 100)];
        let board = build_leaderboard(&[a, b, c], GoalType::Distance, &workouts, None);
        let rank_b = board.entries.iter().find(|e| e.pubkey == b).unwrap().rank;
        let rank_c = board.entries.iter().find(|e| e.pubkey == c).unwrap().rank;
        assert_eq!(rank_b, 3);
        assert_eq!(rank_c, 3);
    }

    #[test]
    fn consistency_goal_counts_workouts() {
        let a = KeyPair::generate().public_key();
        let workouts = vec![workout(a, 1.0, 300, 100), workout(a, 1.0, 300, 200), workout(a, 1.0, 300, 300)];
        let board = build_leaderboard(&[a], GoalType::Consistency, &workouts, None);
        assert_eq!(board.entries[0].formatted_score, "3 workouts");
    }

    #[test]
    fn duration_goal_formats_hours_and_minutes() {
        let a = KeyPair::generate().public_key();
        let workouts = vec![workout(a, 10.0, 5000, 100)];
        let board = build_leaderboard(&[a], GoalType::Duration, &workouts, None);
        assert_eq!(board.entries[0].formatted_score, "1h 23m");
    }
}
