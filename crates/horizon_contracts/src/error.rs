//! Error types shared by every actor in the runtime.

/// Failures talking to an actor through its mailbox.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActorError {
    /// The actor has stopped (or crashed) and its mailbox is closed
    #[error("Actor mailbox is closed")]
    MailboxClosed,

    /// The actor dropped the request without answering, usually because it
    /// stopped while the request was queued
    #[error("Actor dropped the request without replying")]
    NoReply,
}

/// Failures reported by outbound collaborators.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Broadcast error: {0}")]
    Broadcast(String),

    #[error("Creature management error: {0}")]
    Creature(String),
}
