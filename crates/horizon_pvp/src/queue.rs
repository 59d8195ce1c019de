//! # Arena Queue
//!
//! One actor holds every waiting arena team. Entries are kept per bracket in
//! join order and carry a rating search window:
//!
//! * every match interval each bracket is scanned front to back for the first
//!   pair whose rating difference fits inside the smaller of the two windows
//! * every expansion interval all windows widen by a fixed step, capped
//! * each entry has its own timeout task; matching or leaving aborts it, and a
//!   firing that raced with either is recognised by its token and ignored
//!
//! Paired teams are handed to a [`MatchLauncher`], normally the match
//! supervisor. If the launch fails both teams go back to the front of the
//! queue with their windows intact.

use crate::config::QueueConfig;
use crate::deserter::DeserterTracker;
use crate::error::{MatchError, QueueError};
use crate::rating::DEFAULT_RATING;
use async_trait::async_trait;
use horizon_contracts::{
    call, notify, ActorError, Bracket, CharacterId, Collaborators, MatchId, OutboundMessage,
    TeamId,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// A team ready to be placed on one side of an arena match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArenaTeam {
    pub team: TeamId,
    pub roster: Vec<CharacterId>,
    pub rating: u32,
}

/// Starts matches for paired teams.
#[async_trait]
pub trait MatchLauncher: Send + Sync {
    async fn launch_arena(
        &self,
        bracket: Bracket,
        red: ArenaTeam,
        blue: ArenaTeam,
    ) -> Result<MatchId, MatchError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueEntry {
    pub team: TeamId,
    pub roster: Vec<CharacterId>,
    pub rating: u32,
    pub bracket: Bracket,
    pub enqueued_at: Instant,
    pub window: u32,
    token: u64,
}

impl QueueEntry {
    fn fits(&self, other: &QueueEntry) -> bool {
        self.rating.abs_diff(other.rating) <= self.window.min(other.window)
    }

    fn into_team(self) -> ArenaTeam {
        ArenaTeam {
            team: self.team,
            roster: self.roster,
            rating: self.rating,
        }
    }
}

/// Where a queued team stands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub team: TeamId,
    pub bracket: Bracket,
    pub rating: u32,
    pub window: u32,
    /// Zero-based place in the bracket
    pub position: usize,
    pub waited: Duration,
}

/// The queue contents without any timers attached.
#[derive(Debug)]
pub struct QueueState {
    config: QueueConfig,
    brackets: BTreeMap<Bracket, VecDeque<QueueEntry>>,
    next_token: u64,
}

impl QueueState {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            brackets: Bracket::ARENA
                .iter()
                .map(|&bracket| (bracket, VecDeque::new()))
                .collect(),
            next_token: 0,
        }
    }

    /// Appends a team; returns the token identifying this queue entry.
    pub fn join(
        &mut self,
        team: TeamId,
        roster: Vec<CharacterId>,
        rating: u32,
        bracket: Bracket,
        now: Instant,
    ) -> Result<u64, QueueError> {
        if !bracket.is_arena() {
            return Err(QueueError::NotArenaBracket(bracket));
        }
        if roster.len() != bracket.team_size() {
            return Err(QueueError::WrongTeamSize {
                expected: bracket.team_size(),
                actual: roster.len(),
            });
        }
        if self.locate(team).is_some() {
            return Err(QueueError::AlreadyQueued(team));
        }

        self.next_token += 1;
        let entry = QueueEntry {
            team,
            roster,
            rating,
            bracket,
            enqueued_at: now,
            window: self.config.initial_window.min(self.config.max_window),
            token: self.next_token,
        };
        self.brackets.entry(bracket).or_default().push_back(entry);
        Ok(self.next_token)
    }

    pub fn leave(&mut self, team: TeamId) -> Result<QueueEntry, QueueError> {
        let (bracket, index) = self.locate(team).ok_or(QueueError::NotQueued(team))?;
        self.brackets
            .get_mut(&bracket)
            .and_then(|entries| entries.remove(index))
            .ok_or(QueueError::NotQueued(team))
    }

    pub fn contains(&self, team: TeamId) -> bool {
        self.locate(team).is_some()
    }

    pub fn status(&self, team: TeamId, now: Instant) -> Option<QueueStatus> {
        let (bracket, position) = self.locate(team)?;
        let entry = self.brackets.get(&bracket)?.get(position)?;
        Some(QueueStatus {
            team,
            bracket,
            rating: entry.rating,
            window: entry.window,
            position,
            waited: now.saturating_duration_since(entry.enqueued_at),
        })
    }

    /// Removes and returns every pair that can be matched right now, oldest
    /// entries first.
    pub fn take_matches(&mut self) -> Vec<(QueueEntry, QueueEntry)> {
        let mut pairs = Vec::new();
        for entries in self.brackets.values_mut() {
            while let Some((i, j)) = first_pair(entries) {
                // j > i, so removing j first keeps i valid
                let second = entries.remove(j);
                let first = entries.remove(i);
                if let (Some(first), Some(second)) = (first, second) {
                    pairs.push((first, second));
                }
            }
        }
        pairs
    }

    /// Widens every window by one step, never past the cap.
    pub fn widen_windows(&mut self) {
        let QueueConfig { window_step, max_window, .. } = self.config;
        for entry in self.brackets.values_mut().flatten() {
            entry.window = entry.window.max(entry.window.saturating_add(window_step).min(max_window));
        }
    }

    /// Removes the entry for `team` if it is still the one `token` names.
    pub fn expire(&mut self, team: TeamId, token: u64) -> Option<QueueEntry> {
        let (bracket, index) = self.locate(team)?;
        let entries = self.brackets.get_mut(&bracket)?;
        if entries.get(index)?.token != token {
            return None;
        }
        entries.remove(index)
    }

    /// Puts entries back at the front of their bracket, keeping their order.
    pub fn requeue_front(&mut self, entries: Vec<QueueEntry>) {
        for entry in entries.into_iter().rev() {
            self.brackets.entry(entry.bracket).or_default().push_front(entry);
        }
    }

    pub fn len(&self, bracket: Bracket) -> usize {
        self.brackets.get(&bracket).map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self) -> bool {
        self.brackets.values().all(VecDeque::is_empty)
    }

    pub fn sizes(&self) -> Vec<(Bracket, usize)> {
        self.brackets
            .iter()
            .map(|(bracket, entries)| (*bracket, entries.len()))
            .collect()
    }

    fn locate(&self, team: TeamId) -> Option<(Bracket, usize)> {
        self.brackets.iter().find_map(|(bracket, entries)| {
            entries
                .iter()
                .position(|entry| entry.team == team)
                .map(|index| (*bracket, index))
        })
    }
}

fn first_pair(entries: &VecDeque<QueueEntry>) -> Option<(usize, usize)> {
    for i in 0..entries.len() {
        for j in (i + 1)..entries.len() {
            if entries[i].fits(&entries[j]) {
                return Some((i, j));
            }
        }
    }
    None
}

enum QueueCommand {
    Join {
        team: TeamId,
        roster: Vec<CharacterId>,
        bracket: Bracket,
        reply: oneshot::Sender<Result<QueueStatus, QueueError>>,
    },
    Leave {
        team: TeamId,
        reply: oneshot::Sender<Result<(), QueueError>>,
    },
    Status {
        team: TeamId,
        reply: oneshot::Sender<Option<QueueStatus>>,
    },
    FlagDeserter(CharacterId),
    DeserterRemaining {
        character: CharacterId,
        reply: oneshot::Sender<Option<chrono::Duration>>,
    },
    Sizes(oneshot::Sender<Vec<(Bracket, usize)>>),
    Stop,
}

/// Cloneable reference to the running arena queue.
#[derive(Debug, Clone)]
pub struct ArenaQueueHandle {
    sender: mpsc::Sender<QueueCommand>,
}

impl ArenaQueueHandle {
    pub async fn join(
        &self,
        team: TeamId,
        roster: Vec<CharacterId>,
        bracket: Bracket,
    ) -> Result<QueueStatus, QueueError> {
        call(&self.sender, |reply| QueueCommand::Join { team, roster, bracket, reply }).await?
    }

    pub async fn leave(&self, team: TeamId) -> Result<(), QueueError> {
        call(&self.sender, |reply| QueueCommand::Leave { team, reply }).await?
    }

    pub async fn status(&self, team: TeamId) -> Result<Option<QueueStatus>, ActorError> {
        call(&self.sender, |reply| QueueCommand::Status { team, reply }).await
    }

    pub async fn flag_deserter(&self, character: CharacterId) -> Result<(), ActorError> {
        notify(&self.sender, QueueCommand::FlagDeserter(character)).await
    }

    pub async fn deserter_remaining(
        &self,
        character: CharacterId,
    ) -> Result<Option<chrono::Duration>, ActorError> {
        call(&self.sender, |reply| QueueCommand::DeserterRemaining { character, reply }).await
    }

    pub async fn sizes(&self) -> Result<Vec<(Bracket, usize)>, ActorError> {
        call(&self.sender, QueueCommand::Sizes).await
    }

    pub async fn stop(&self) -> Result<(), ActorError> {
        notify(&self.sender, QueueCommand::Stop).await
    }
}

struct ArenaQueue {
    state: QueueState,
    config: QueueConfig,
    deserters: DeserterTracker,
    timeouts: HashMap<TeamId, AbortHandle>,
    expired: mpsc::UnboundedSender<(TeamId, u64)>,
    launcher: Arc<dyn MatchLauncher>,
    collaborators: Collaborators,
}

pub fn spawn_arena_queue(
    config: QueueConfig,
    collaborators: Collaborators,
    launcher: Arc<dyn MatchLauncher>,
) -> (ArenaQueueHandle, JoinHandle<()>) {
    let (sender, mailbox) = mpsc::channel(config.mailbox_capacity.max(1));
    let (expired, expirations) = mpsc::unbounded_channel();
    let queue = ArenaQueue {
        state: QueueState::new(config),
        config,
        deserters: DeserterTracker::new(config.deserter),
        timeouts: HashMap::new(),
        expired,
        launcher,
        collaborators,
    };
    let task = tokio::spawn(queue.run(mailbox, expirations));
    (ArenaQueueHandle { sender }, task)
}

impl ArenaQueue {
    async fn run(
        mut self,
        mut mailbox: mpsc::Receiver<QueueCommand>,
        mut expirations: mpsc::UnboundedReceiver<(TeamId, u64)>,
    ) {
        info!("🎯 Arena queue started");
        let start = Instant::now();
        let mut matching = interval_at(start + self.config.match_interval, self.config.match_interval);
        matching.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut expansion = interval_at(
            start + self.config.expansion_interval,
            self.config.expansion_interval,
        );
        expansion.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = mailbox.recv() => {
                    let Some(command) = command else { break };
                    if self.handle(command).await.is_break() {
                        break;
                    }
                }
                _ = matching.tick() => self.run_matching().await,
                _ = expansion.tick() => {
                    self.state.widen_windows();
                    self.deserters.prune(self.collaborators.clock.now());
                }
                Some((team, token)) = expirations.recv() => self.expire(team, token).await,
            }
        }

        for (_, timeout) in self.timeouts.drain() {
            timeout.abort();
        }
        info!("🎯 Arena queue stopped");
    }

    async fn handle(&mut self, command: QueueCommand) -> ControlFlow<()> {
        match command {
            QueueCommand::Join { team, roster, bracket, reply } => {
                let result = self.join(team, roster, bracket).await;
                let _ = reply.send(result);
            }
            QueueCommand::Leave { team, reply } => {
                let result = self.state.leave(team).map(|entry| {
                    self.cancel_timeout(entry.team);
                    info!(team = %team, bracket = %entry.bracket, "🚪 Team left the queue");
                });
                let _ = reply.send(result);
            }
            QueueCommand::Status { team, reply } => {
                let _ = reply.send(self.state.status(team, Instant::now()));
            }
            QueueCommand::FlagDeserter(character) => {
                let penalty = self.deserters.flag(character, self.collaborators.clock.now());
                info!("🏳️ {} flagged as deserter for {} min", character, penalty.num_minutes());
            }
            QueueCommand::DeserterRemaining { character, reply } => {
                let now = self.collaborators.clock.now();
                let _ = reply.send(self.deserters.remaining(character, now));
            }
            QueueCommand::Sizes(reply) => {
                let _ = reply.send(self.state.sizes());
            }
            QueueCommand::Stop => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    async fn join(
        &mut self,
        team: TeamId,
        roster: Vec<CharacterId>,
        bracket: Bracket,
    ) -> Result<QueueStatus, QueueError> {
        if self.state.contains(team) {
            return Err(QueueError::AlreadyQueued(team));
        }
        let now = self.collaborators.clock.now();
        if let Some(deserter) = roster
            .iter()
            .copied()
            .find(|&member| self.deserters.is_deserter(member, now))
        {
            return Err(QueueError::Deserter(deserter));
        }

        let rating = match self.collaborators.persistence.rating(team, bracket).await {
            Ok(Some(record)) => record.rating,
            Ok(None) => DEFAULT_RATING,
            Err(e) => {
                warn!(team = %team, "⚠️ Rating lookup failed, using default: {}", e);
                DEFAULT_RATING
            }
        };

        let enqueued_at = Instant::now();
        let token = self.state.join(team, roster, rating, bracket, enqueued_at)?;
        self.arm_timeout(team, token);
        info!(team = %team, bracket = %bracket, rating, "📥 Team queued");

        self.state
            .status(team, enqueued_at)
            .ok_or(QueueError::NotQueued(team))
    }

    fn arm_timeout(&mut self, team: TeamId, token: u64) {
        let expired = self.expired.clone();
        let timeout = self.config.entry_timeout;
        let task = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = expired.send((team, token));
        });
        if let Some(previous) = self.timeouts.insert(team, task.abort_handle()) {
            previous.abort();
        }
    }

    fn cancel_timeout(&mut self, team: TeamId) {
        if let Some(timeout) = self.timeouts.remove(&team) {
            timeout.abort();
        }
    }

    async fn expire(&mut self, team: TeamId, token: u64) {
        let Some(entry) = self.state.expire(team, token) else {
            debug!(team = %team, "Ignoring stale queue timeout");
            return;
        };
        self.timeouts.remove(&team);
        info!(team = %team, bracket = %entry.bracket, "⌛ Queue entry timed out");
        self.broadcast(&entry.roster, OutboundMessage::QueueTimedOut { team }).await;
    }

    async fn run_matching(&mut self) {
        let pairs = self.state.take_matches();
        let mut failed = Vec::new();

        for (red, blue) in pairs {
            let bracket = red.bracket;
            let launch = self
                .launcher
                .launch_arena(bracket, red.clone().into_team(), blue.clone().into_team())
                .await;
            match launch {
                Ok(match_id) => {
                    info!(
                        bracket = %bracket,
                        match_id = %match_id,
                        "🤝 Matched {} ({}) against {} ({})",
                        red.team, red.rating, blue.team, blue.rating
                    );
                    for entry in [&red, &blue] {
                        self.cancel_timeout(entry.team);
                        let message = OutboundMessage::QueuePopped { team: entry.team, match_id };
                        self.broadcast(&entry.roster, message).await;
                    }
                }
                Err(e) => {
                    warn!(bracket = %bracket, "⚠️ Could not start arena match, requeueing: {}", e);
                    failed.push(red);
                    failed.push(blue);
                }
            }
        }

        if !failed.is_empty() {
            self.state.requeue_front(failed);
        }
    }

    async fn broadcast(&self, recipients: &[CharacterId], message: OutboundMessage) {
        if let Err(e) = self.collaborators.broadcaster.send(recipients, message).await {
            warn!("⚠️ Queue broadcast failed: {}", e);
        }
    }
}
