//! Fitness-competition domain services built on top of `nostr-wire` and
//! `nostr-relay-net`: team/membership management, competition definitions,
//! workout queries, and leaderboard scoring.

pub mod competition;
pub mod error;
pub mod leaderboard;
pub mod membership;
pub mod store;
pub mod team;
pub mod workout;

pub use competition::{CompetitionDefinitionService, CompetitionStatus, EventDefinition, GoalType, League, ScoringFrequency, TeamCompetitions};
pub use error::{Error, Result};
pub use leaderboard::{build_leaderboard, Leaderboard, LeaderboardEntry};
pub use membership::{MembershipList, MembershipListService};
pub use store::{AddressableStore, KvCache, SledCache};
pub use team::{create_team, generate_team_d_tag, Team};
pub use workout::{ActivityType, Window, Workout, WorkoutQueryService};
