use crate::matches::MatchPhase;
use horizon_contracts::{ActorError, Bracket, CharacterId, MatchId, TeamId};

/// Rejections from the arena queue.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("Team {0} is already queued")]
    AlreadyQueued(TeamId),

    #[error("Team {0} is not queued")]
    NotQueued(TeamId),

    #[error("Bracket {0} is not an arena bracket")]
    NotArenaBracket(Bracket),

    #[error("Bracket needs {expected} players, roster has {actual}")]
    WrongTeamSize { expected: usize, actual: usize },

    #[error("{0} is flagged as a deserter")]
    Deserter(CharacterId),

    #[error(transparent)]
    Actor(#[from] ActorError),
}

/// Rejections from match actors and the match supervisor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MatchError {
    #[error("Match not active (currently {0})")]
    NotActive(MatchPhase),

    #[error("{0} is not a participant")]
    NotParticipant(CharacterId),

    #[error("{0} has left the match")]
    Deserted(CharacterId),

    #[error("{killer} cannot be credited for killing {victim}, an ally")]
    FriendlyKill { killer: CharacterId, victim: CharacterId },

    #[error("Unknown objective {0}")]
    UnknownObjective(u32),

    #[error("Objective {0} cannot be used that way")]
    WrongObjectiveKind(u32),

    #[error("Unknown generator {0}")]
    UnknownGenerator(u32),

    #[error("Generator {0} belongs to your own side")]
    OwnGenerator(u32),

    #[error("Generator {0} is already destroyed")]
    GeneratorDestroyed(u32),

    #[error("Unknown defense {0}")]
    UnknownDefense(u32),

    #[error("Plug slot {0} does not exist")]
    InvalidSlot(u32),

    #[error("Plug slot {0} is already occupied")]
    SlotOccupied(u32),

    #[error("Not enough war coins: need {needed}, have {available}")]
    InsufficientCoins { needed: u32, available: u32 },

    #[error("{0} matches do not support that action")]
    Unsupported(&'static str),

    #[error("A side has {actual} players, limit is {limit}")]
    RosterTooLarge { limit: usize, actual: usize },

    #[error("Both sides need at least one player")]
    EmptyRoster,

    #[error("Match {0} not found")]
    NotFound(MatchId),

    #[error("Match supervisor is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Actor(#[from] ActorError),
}
