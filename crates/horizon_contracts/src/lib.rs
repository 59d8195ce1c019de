//! # Horizon Contracts
//!
//! Shared vocabulary of the Horizon instance and PvP runtime:
//!
//! * [`ids`] - typed identifiers and the lock-free instance GUID generator
//! * [`templates`] - strongly typed static game data and the template store
//! * [`collaborators`] - outbound persistence / broadcast / creature contracts
//! * [`memory`] - in-memory collaborator implementations
//! * [`actor`] - mailbox call/notify helpers and exit classification
//!
//! Nothing in this crate runs on its own; the actor crates build on it.

pub mod actor;
pub mod collaborators;
pub mod error;
pub mod ids;
pub mod memory;
pub mod templates;

pub use actor::{call, notify, ActorExit, ActorId};
pub use collaborators::{
    Bracket, Broadcaster, Clock, Collaborators, CompletionRecord, CreatureSpawner, Currency,
    CurrencyReward, LockoutRecord, MatchRecord, MythicRunRecord, OutboundMessage,
    ParticipantRecord, Persistence, RatingRecord, ResetKind, SeasonResultRecord, Side,
    SpellEffectKind, SystemClock,
};
pub use error::{ActorError, CollaboratorError};
pub use ids::{
    BossId, CharacterId, CreatureGuid, DefinitionId, GroupId, InstanceGuid, InstanceGuidGenerator,
    MatchId, TeamId,
};
pub use memory::{
    FixedClock, InMemoryCollaborators, LoggingBroadcaster, MemoryPersistence,
    RecordingBroadcaster, RecordingSpawner, SentMessage,
};
pub use templates::{
    AbilityTemplate, ArmorSpec, BattlegroundTemplate, BossEntry, BossTemplate, DamageModifiers,
    DefenseTemplate, Difficulty, EffectTemplate, InstanceDefinition, InstanceKind, MovementKind,
    ObjectiveKind, ObjectiveTemplate, PhaseCondition, PhaseTemplate, StaticTemplateStore,
    TelegraphShape, TemplateCatalog, TemplateError, TemplateStore, WarplotTemplate,
};
