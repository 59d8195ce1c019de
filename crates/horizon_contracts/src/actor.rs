//! # Actor Plumbing
//!
//! Every stateful unit in the runtime (instance, boss encounter, match, queue,
//! scheduler) is a tokio task that owns its state and drains an `mpsc`
//! mailbox one message at a time. Callers hold a cheap, cloneable handle that
//! wraps the mailbox sender.
//!
//! Two interaction styles exist:
//!
//! * **call** - request/response, the message carries a `oneshot` reply sender
//! * **notify** - fire-and-forget, used for child-to-parent notifications
//!
//! Supervisors watch the `JoinHandle` of each actor and classify how it ended
//! with [`ActorExit`], so a panic inside one actor is observed and cleaned up
//! without unwinding into anything else.

use crate::error::ActorError;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;

/// Sends a request built by `build` and waits for the reply.
pub async fn call<M, T>(
    mailbox: &mpsc::Sender<M>,
    build: impl FnOnce(oneshot::Sender<T>) -> M,
) -> Result<T, ActorError> {
    let (reply, response) = oneshot::channel();
    mailbox
        .send(build(reply))
        .await
        .map_err(|_| ActorError::MailboxClosed)?;
    response.await.map_err(|_| ActorError::NoReply)
}

/// Sends a message without waiting for a reply.
pub async fn notify<M>(mailbox: &mpsc::Sender<M>, message: M) -> Result<(), ActorError> {
    mailbox
        .send(message)
        .await
        .map_err(|_| ActorError::MailboxClosed)
}

/// Identity of one actor incarnation.
///
/// A registry entry is only removed by the monitor of the incarnation that
/// created it, so a late exit notification never evicts a replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ActorId(pub u64);

static NEXT_ACTOR_ID: AtomicU64 = AtomicU64::new(1);

impl ActorId {
    pub fn next() -> Self {
        Self(NEXT_ACTOR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor#{}", self.0)
    }
}

/// How an actor task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActorExit {
    /// The actor returned from its run loop
    Normal,
    /// The actor panicked; the message is the panic payload when it is a string
    Panicked(String),
    /// The task was aborted
    Cancelled,
}

impl ActorExit {
    pub fn from_join(result: Result<(), JoinError>) -> Self {
        match result {
            Ok(()) => ActorExit::Normal,
            Err(error) if error.is_panic() => {
                let payload = error.into_panic();
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                ActorExit::Panicked(message)
            }
            Err(_) => ActorExit::Cancelled,
        }
    }

    pub fn is_crash(&self) -> bool {
        matches!(self, ActorExit::Panicked(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    enum Echo {
        Double(u32, oneshot::Sender<u32>),
    }

    #[tokio::test]
    async fn call_round_trip() {
        let (tx, mut rx) = mpsc::channel(4);
        tokio::spawn(async move {
            while let Some(Echo::Double(value, reply)) = rx.recv().await {
                let _ = reply.send(value * 2);
            }
        });

        let doubled = call(&tx, |reply| Echo::Double(21, reply)).await;
        assert_eq!(doubled, Ok(42));
    }

    #[tokio::test]
    async fn call_to_stopped_actor_fails() {
        let (tx, rx) = mpsc::channel::<Echo>(4);
        drop(rx);
        let result = call(&tx, |reply| Echo::Double(1, reply)).await;
        assert_eq!(result, Err(ActorError::MailboxClosed));
    }

    #[tokio::test]
    async fn dropped_reply_is_reported() {
        let (tx, mut rx) = mpsc::channel(4);
        tokio::spawn(async move {
            // Receive and drop without answering
            let _ = rx.recv().await;
        });
        let result = call(&tx, |reply| Echo::Double(1, reply)).await;
        assert_eq!(result, Err(ActorError::NoReply));
    }

    #[tokio::test]
    async fn panics_are_classified() {
        let handle = tokio::spawn(async {
            panic!("tick exploded");
        });
        let exit = ActorExit::from_join(handle.await);
        assert_eq!(exit, ActorExit::Panicked("tick exploded".to_string()));
        assert!(exit.is_crash());

        let handle = tokio::spawn(async {});
        assert_eq!(ActorExit::from_join(handle.await), ActorExit::Normal);
    }
}
