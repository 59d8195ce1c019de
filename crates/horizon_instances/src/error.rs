//! Error types for instances, encounters and their registry.

use crate::instance::InstanceStatus;
use horizon_contracts::{ActorError, BossId, CharacterId, InstanceGuid};

/// Rejections from a boss encounter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncounterError {
    #[error("Boss is not engaged")]
    NotEngaged,

    #[error("Boss is already engaged")]
    AlreadyEngaged,

    #[error("Boss is already defeated")]
    AlreadyDefeated,

    /// The boss has infinite interrupt armor
    #[error("Boss cannot be interrupted")]
    InterruptImmune,

    #[error("Interrupt armor is depleted")]
    ArmorDepleted,

    #[error(transparent)]
    Actor(#[from] ActorError),
}

/// Rejections from an instance.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InstanceError {
    #[error("Character {0} is not a member of this instance")]
    NotMember(CharacterId),

    #[error("Character {0} is already a member of this instance")]
    AlreadyMember(CharacterId),

    #[error("Instance is full ({0} players)")]
    Full(usize),

    #[error("Only the group leader can do that")]
    NotLeader,

    #[error("Operation not allowed while the instance is {0:?}")]
    InvalidState(InstanceStatus),

    #[error("Boss {0} is already defeated")]
    BossAlreadyDefeated(BossId),

    #[error("Cannot reset while a boss is engaged")]
    BossEngaged,

    #[error("Nothing to reset")]
    NothingToReset,

    #[error("Not a Mythic+ instance")]
    NotMythic,

    #[error(transparent)]
    Encounter(#[from] EncounterError),

    #[error(transparent)]
    Actor(#[from] ActorError),
}

/// Lookup failures in the instance registry.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("Instance {0} not found")]
    InstanceNotFound(InstanceGuid),

    #[error("No encounter for boss {1} in instance {0}")]
    EncounterNotFound(InstanceGuid, BossId),

    #[error("Registry is shutting down")]
    ShuttingDown,
}
