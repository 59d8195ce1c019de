//! # Outbound Collaborators
//!
//! The runtime never stores accounts, ratings or lockouts itself and never
//! encodes packets. It calls out through the traits in this module:
//!
//! * [`Persistence`] - lockouts, completions, ratings, match results, rewards
//! * [`Broadcaster`] - typed outbound messages to a list of recipients; the
//!   protocol layer turns them into packets
//! * [`CreatureSpawner`] - world-side creature management for encounter adds
//! * [`Clock`] - calendar time for reset and season scheduling
//!
//! [`Collaborators`] bundles one implementation of each so actors can be
//! constructed with a single argument.

use crate::error::CollaboratorError;
use crate::ids::{BossId, CharacterId, CreatureGuid, DefinitionId, InstanceGuid, MatchId, TeamId};
use crate::templates::{Difficulty, MovementKind, TelegraphShape, TemplateStore};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Team side inside a PvP match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Red,
    Blue,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Red => Side::Blue,
            Side::Blue => Side::Red,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Red => write!(f, "red"),
            Side::Blue => write!(f, "blue"),
        }
    }
}

/// Rated PvP bracket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bracket {
    TwoVsTwo,
    ThreeVsThree,
    FiveVsFive,
    Battleground,
    Warplot,
}

impl Bracket {
    pub const ARENA: [Bracket; 3] = [Bracket::TwoVsTwo, Bracket::ThreeVsThree, Bracket::FiveVsFive];
    pub const ALL: [Bracket; 5] = [
        Bracket::TwoVsTwo,
        Bracket::ThreeVsThree,
        Bracket::FiveVsFive,
        Bracket::Battleground,
        Bracket::Warplot,
    ];

    /// Players per side.
    pub fn team_size(self) -> usize {
        match self {
            Bracket::TwoVsTwo => 2,
            Bracket::ThreeVsThree => 3,
            Bracket::FiveVsFive => 5,
            Bracket::Battleground => 10,
            Bracket::Warplot => 30,
        }
    }

    pub fn is_arena(self) -> bool {
        Bracket::ARENA.contains(&self)
    }
}

impl fmt::Display for Bracket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Bracket::TwoVsTwo => "2v2",
            Bracket::ThreeVsThree => "3v3",
            Bracket::FiveVsFive => "5v5",
            Bracket::Battleground => "battleground",
            Bracket::Warplot => "warplot",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetKind {
    Daily,
    Weekly,
}

impl fmt::Display for ResetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResetKind::Daily => write!(f, "daily"),
            ResetKind::Weekly => write!(f, "weekly"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockoutRecord {
    pub character: CharacterId,
    pub definition_id: DefinitionId,
    pub difficulty: Difficulty,
    pub boss_id: BossId,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRecord {
    pub instance: InstanceGuid,
    pub definition_id: DefinitionId,
    pub difficulty: Difficulty,
    pub character: CharacterId,
    pub completed_at: DateTime<Utc>,
    pub duration_secs: u64,
    pub deaths: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MythicRunRecord {
    pub instance: InstanceGuid,
    pub definition_id: DefinitionId,
    pub level: u8,
    pub affixes: Vec<String>,
    pub elapsed_secs: u64,
    pub deaths: u32,
    /// Keystone upgrade earned: 0 when over time, up to 3
    pub upgrade_tier: u8,
    pub members: Vec<CharacterId>,
}

/// Rating state owned by persistence; the runtime computes deltas only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingRecord {
    pub team_id: TeamId,
    pub bracket: Bracket,
    pub rating: u32,
    pub season_high: u32,
    pub games_played: u32,
    pub games_won: u32,
    pub win_streak: u32,
    pub loss_streak: u32,
    pub last_game_at: Option<DateTime<Utc>>,
    pub last_decay_at: Option<DateTime<Utc>>,
}

impl RatingRecord {
    pub fn new(team_id: TeamId, bracket: Bracket, rating: u32) -> Self {
        Self {
            team_id,
            bracket,
            rating,
            season_high: rating,
            games_played: 0,
            games_won: 0,
            win_streak: 0,
            loss_streak: 0,
            last_game_at: None,
            last_decay_at: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantRecord {
    pub character: CharacterId,
    pub side: Side,
    pub kills: u32,
    pub deaths: u32,
    pub damage: u64,
    pub objectives: u32,
    pub deserted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub match_id: MatchId,
    pub kind: String,
    /// `None` on a draw
    pub winner: Option<Side>,
    pub red_score: u32,
    pub blue_score: u32,
    pub duration_secs: u64,
    pub participants: Vec<ParticipantRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Currency {
    Prestige,
    Glory,
    WarCoins,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrencyReward {
    pub character: CharacterId,
    pub currency: Currency,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonResultRecord {
    pub season_id: u32,
    pub bracket: Bracket,
    pub team_id: TeamId,
    pub final_rating: u32,
    pub season_high: u32,
    pub reward: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpellEffectKind {
    Damage,
    Buff,
    Debuff,
}

/// Typed outbound message; the protocol collaborator owns the wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    BossEngaged {
        instance: InstanceGuid,
        boss: BossId,
        name: String,
        max_health: u64,
    },
    BossPhaseChanged {
        instance: InstanceGuid,
        boss: BossId,
        phase: String,
    },
    BossEnraged {
        instance: InstanceGuid,
        boss: BossId,
    },
    MomentOfOpportunity {
        instance: InstanceGuid,
        boss: BossId,
        duration_ms: u64,
    },
    BossDefeated {
        instance: InstanceGuid,
        boss: BossId,
    },
    BossWiped {
        instance: InstanceGuid,
        boss: BossId,
    },
    Telegraph {
        instance: InstanceGuid,
        boss: BossId,
        ability_id: u32,
        shape: TelegraphShape,
        radius: f32,
        duration_ms: u64,
        damage: u32,
    },
    SpellEffect {
        instance: InstanceGuid,
        boss: BossId,
        ability_id: u32,
        kind: SpellEffectKind,
        spell_id: u32,
        amount: u32,
        duration_ms: u64,
    },
    MovementForce {
        instance: InstanceGuid,
        boss: BossId,
        kind: MovementKind,
        magnitude: f32,
    },
    Coordination {
        instance: InstanceGuid,
        boss: BossId,
        mechanic: String,
    },
    Environmental {
        instance: InstanceGuid,
        hazard: String,
        duration_ms: u64,
    },
    InstanceCompleted {
        instance: InstanceGuid,
        definition_id: DefinitionId,
        difficulty: Difficulty,
    },
    InstanceReset {
        instance: InstanceGuid,
    },
    LockoutReset {
        kind: ResetKind,
    },
    QueuePopped {
        team: TeamId,
        match_id: MatchId,
    },
    QueueTimedOut {
        team: TeamId,
    },
    MatchPhase {
        match_id: MatchId,
        phase: String,
    },
    MatchScore {
        match_id: MatchId,
        red: u32,
        blue: u32,
    },
    MatchResult {
        match_id: MatchId,
        winner: Option<Side>,
    },
}

/// Storage of everything that outlives an actor.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn create_lockout(&self, lockout: LockoutRecord) -> Result<(), CollaboratorError>;

    async fn lockouts_for(
        &self,
        character: CharacterId,
    ) -> Result<Vec<LockoutRecord>, CollaboratorError>;

    /// Removes lockouts whose expiry is at or before `now`; returns how many.
    async fn expire_lockouts(&self, now: DateTime<Utc>) -> Result<usize, CollaboratorError>;

    async fn last_reset(&self, kind: ResetKind) -> Result<Option<NaiveDate>, CollaboratorError>;

    async fn store_last_reset(
        &self,
        kind: ResetKind,
        date: NaiveDate,
    ) -> Result<(), CollaboratorError>;

    async fn record_completion(&self, record: CompletionRecord) -> Result<(), CollaboratorError>;

    async fn record_mythic_run(&self, record: MythicRunRecord) -> Result<(), CollaboratorError>;

    async fn rating(
        &self,
        team: TeamId,
        bracket: Bracket,
    ) -> Result<Option<RatingRecord>, CollaboratorError>;

    async fn save_rating(&self, record: RatingRecord) -> Result<(), CollaboratorError>;

    async fn ratings_in_bracket(
        &self,
        bracket: Bracket,
    ) -> Result<Vec<RatingRecord>, CollaboratorError>;

    async fn record_match(&self, record: MatchRecord) -> Result<(), CollaboratorError>;

    async fn award_currency(&self, reward: CurrencyReward) -> Result<(), CollaboratorError>;

    async fn record_season_result(
        &self,
        record: SeasonResultRecord,
    ) -> Result<(), CollaboratorError>;

    async fn season_finalized(
        &self,
        season_id: u32,
        bracket: Bracket,
    ) -> Result<bool, CollaboratorError>;

    async fn mark_season_finalized(
        &self,
        season_id: u32,
        bracket: Bracket,
    ) -> Result<(), CollaboratorError>;
}

/// Delivery of typed messages to players.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn send(
        &self,
        recipients: &[CharacterId],
        message: OutboundMessage,
    ) -> Result<(), CollaboratorError>;

    /// Sends to every connected player.
    async fn send_global(&self, message: OutboundMessage) -> Result<(), CollaboratorError>;
}

/// World-side creature management.
#[async_trait]
pub trait CreatureSpawner: Send + Sync {
    async fn spawn(
        &self,
        instance: InstanceGuid,
        creature_id: u32,
    ) -> Result<CreatureGuid, CollaboratorError>;

    async fn despawn(
        &self,
        instance: InstanceGuid,
        creature: CreatureGuid,
    ) -> Result<(), CollaboratorError>;
}

/// Calendar time source.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// One implementation of every collaborator, shared by all actors.
#[derive(Clone)]
pub struct Collaborators {
    pub persistence: Arc<dyn Persistence>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub spawner: Arc<dyn CreatureSpawner>,
    pub templates: Arc<dyn TemplateStore>,
    pub clock: Arc<dyn Clock>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
