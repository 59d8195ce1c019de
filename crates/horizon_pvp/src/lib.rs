//! # Horizon PvP
//!
//! Competitive side of the Horizon runtime:
//!
//! * [`rating`] - ELO-style rating deltas
//! * [`deserter`] - deserter penalties for leaving active matches
//! * [`queue`] - the arena matchmaking queue actor
//! * [`matches`] - the match lifecycle actor with battleground, warplot and
//!   arena rules
//! * [`supervisor`] - directory and supervisor of running matches
//! * [`season`] - rating decay and end-of-season finalisation
//!
//! ```text
//!   ArenaQueue ──launch_arena──▶ MatchSupervisor ──spawn──▶ Match actors
//!        ▲                              │                        │
//!        └────── flag_deserter ─────────┴◀──── MatchEvent ───────┘
//! ```

pub mod config;
pub mod deserter;
pub mod error;
pub mod matches;
pub mod queue;
pub mod rating;
pub mod season;
pub mod supervisor;

#[cfg(test)]
mod tests;

pub use config::{MatchTimings, QueueConfig, RewardTier, SeasonConfig};
pub use deserter::{DeserterPolicy, DeserterTracker};
pub use error::{MatchError, QueueError};
pub use matches::{
    ActionOutcome, ArenaRules, BattlegroundRules, MatchAction, MatchEvent, MatchHandle,
    MatchPhase, MatchRules, MatchSnapshot, RulesView, Scoreboard, Victory, VictoryReason,
    WarplotRules,
};
pub use queue::{spawn_arena_queue, ArenaQueueHandle, ArenaTeam, MatchLauncher, QueueState, QueueStatus};
pub use rating::{expected_score, k_factor, win_delta, DEFAULT_RATING};
pub use season::{spawn_season_scheduler, SeasonPass, SeasonSchedulerHandle};
pub use supervisor::MatchSupervisor;
