//! # Match Supervisor
//!
//! Directory of running matches keyed by match ID. Starting a match validates
//! the rosters, resolves the template (falling back to a stub when static
//! data has no entry), spawns the match task and a monitor that removes the
//! entry when that incarnation exits. A crashed match is logged and dropped;
//! nothing else is affected.
//!
//! Matches notify the supervisor through an event channel. Desertions are
//! forwarded to the arena queue once one is attached.

use crate::config::MatchTimings;
use crate::error::MatchError;
use crate::matches::{
    spawn_match, ArenaRules, BattlegroundRules, MatchEvent, MatchHandle, MatchRules, WarplotRules,
};
use crate::queue::{ArenaQueueHandle, ArenaTeam, MatchLauncher};
use async_trait::async_trait;
use dashmap::DashMap;
use futures::future::join_all;
use horizon_contracts::{
    ActorExit, ActorId, BattlegroundTemplate, Bracket, CharacterId, Collaborators, MatchId,
    WarplotTemplate,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct MatchSupervisor {
    matches: Arc<DashMap<MatchId, MatchHandle>>,
    timings: MatchTimings,
    collaborators: Collaborators,
    events: mpsc::UnboundedSender<MatchEvent>,
    queue: Arc<OnceLock<ArenaQueueHandle>>,
    finished: Arc<AtomicUsize>,
    shutting_down: AtomicBool,
}

impl MatchSupervisor {
    pub fn new(timings: MatchTimings, collaborators: Collaborators) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        let queue = Arc::new(OnceLock::new());
        let finished = Arc::new(AtomicUsize::new(0));
        tokio::spawn(route_events(receiver, Arc::clone(&queue), Arc::clone(&finished)));

        Self {
            matches: Arc::new(DashMap::new()),
            timings,
            collaborators,
            events,
            queue,
            finished,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Routes desertions to `queue`. Only the first queue attached is kept.
    pub fn attach_queue(&self, queue: ArenaQueueHandle) {
        if self.queue.set(queue).is_err() {
            warn!("⚠️ Arena queue already attached to the match supervisor");
        }
    }

    pub fn start_battleground(
        &self,
        template_id: u32,
        red: Vec<CharacterId>,
        blue: Vec<CharacterId>,
    ) -> Result<MatchHandle, MatchError> {
        let template = self
            .collaborators
            .templates
            .battleground(template_id)
            .unwrap_or_else(|| {
                debug!("No battleground template {}, using stub", template_id);
                Arc::new(BattlegroundTemplate::stub(template_id))
            });
        let limit = template.team_size;
        self.launch(Box::new(BattlegroundRules::new(template)), &red, &blue, limit)
    }

    pub fn start_warplot(
        &self,
        template_id: u32,
        red: Vec<CharacterId>,
        blue: Vec<CharacterId>,
    ) -> Result<MatchHandle, MatchError> {
        let template = self
            .collaborators
            .templates
            .warplot(template_id)
            .unwrap_or_else(|| {
                debug!("No warplot template {}, using stub", template_id);
                Arc::new(WarplotTemplate::stub(template_id))
            });
        let limit = template.team_size;
        self.launch(Box::new(WarplotRules::new(template)), &red, &blue, limit)
    }

    pub fn start_arena(&self, bracket: Bracket, red: ArenaTeam, blue: ArenaTeam) -> Result<MatchHandle, MatchError> {
        let (red_roster, blue_roster) = (red.roster.clone(), blue.roster.clone());
        let rules = ArenaRules::new(bracket, red, blue);
        self.launch(Box::new(rules), &red_roster, &blue_roster, bracket.team_size())
    }

    fn launch(
        &self,
        rules: Box<dyn MatchRules>,
        red: &[CharacterId],
        blue: &[CharacterId],
        limit: usize,
    ) -> Result<MatchHandle, MatchError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(MatchError::ShuttingDown);
        }
        if red.is_empty() || blue.is_empty() {
            return Err(MatchError::EmptyRoster);
        }
        if let Some(actual) = [red.len(), blue.len()].into_iter().find(|&len| len > limit) {
            return Err(MatchError::RosterTooLarge { limit, actual });
        }

        let match_id = MatchId::new();
        let (handle, task) = spawn_match(
            match_id,
            rules,
            red,
            blue,
            self.timings,
            self.collaborators.clone(),
            self.events.clone(),
        );
        self.matches.insert(match_id, handle.clone());
        self.monitor(match_id, handle.actor_id(), task);
        Ok(handle)
    }

    fn monitor(&self, match_id: MatchId, actor_id: ActorId, task: JoinHandle<()>) {
        let matches = Arc::clone(&self.matches);
        tokio::spawn(async move {
            let exit = ActorExit::from_join(task.await);
            matches.remove_if(&match_id, |_, handle| handle.actor_id() == actor_id);
            match exit {
                ActorExit::Normal => debug!(match_id = %match_id, "Match {} exited", actor_id),
                ActorExit::Panicked(reason) => {
                    error!(match_id = %match_id, "💥 Match {} crashed: {}", actor_id, reason)
                }
                ActorExit::Cancelled => warn!(match_id = %match_id, "Match {} was cancelled", actor_id),
            }
        });
    }

    pub fn lookup(&self, match_id: MatchId) -> Result<MatchHandle, MatchError> {
        self.matches
            .get(&match_id)
            .map(|entry| entry.value().clone())
            .ok_or(MatchError::NotFound(match_id))
    }

    pub async fn stop_match(&self, match_id: MatchId) -> Result<(), MatchError> {
        let handle = self.lookup(match_id)?;
        handle.stop().await.map_err(|_| MatchError::NotFound(match_id))
    }

    pub fn count(&self) -> usize {
        self.matches.len()
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.matches
            .iter()
            .filter(|entry| entry.value().kind() == kind)
            .count()
    }

    /// Matches that reached `complete` since startup.
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::Acquire)
    }

    /// Stops every match, waiting up to `grace` for them to exit.
    pub async fn shutdown_all(&self, grace: Duration) {
        self.shutting_down.store(true, Ordering::Release);
        let handles: Vec<MatchHandle> = self
            .matches
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        info!("🛑 Stopping {} match(es)", handles.len());
        join_all(handles.iter().map(|handle| handle.stop())).await;

        let deadline = tokio::time::Instant::now() + grace;
        while !self.matches.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if !self.matches.is_empty() {
            warn!("⚠️ {} match(es) still running after shutdown grace period", self.matches.len());
        }
    }
}

#[async_trait]
impl MatchLauncher for MatchSupervisor {
    async fn launch_arena(&self, bracket: Bracket, red: ArenaTeam, blue: ArenaTeam) -> Result<MatchId, MatchError> {
        self.start_arena(bracket, red, blue).map(|handle| handle.match_id())
    }
}

async fn route_events(
    mut events: mpsc::UnboundedReceiver<MatchEvent>,
    queue: Arc<OnceLock<ArenaQueueHandle>>,
    finished: Arc<AtomicUsize>,
) {
    while let Some(event) = events.recv().await {
        match event {
            MatchEvent::Deserted { match_id, character } => {
                let Some(queue) = queue.get() else {
                    debug!(match_id = %match_id, "No arena queue attached, {} not flagged", character);
                    continue;
                };
                if let Err(e) = queue.flag_deserter(character).await {
                    warn!(match_id = %match_id, "⚠️ Could not flag deserter {}: {}", character, e);
                }
            }
            MatchEvent::Finished { match_id, kind, victory } => {
                finished.fetch_add(1, Ordering::AcqRel);
                debug!(match_id = %match_id, "{} match finished: {:?}", kind, victory);
            }
        }
    }
}
