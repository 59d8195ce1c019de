//! The instance task.

use super::state::{
    DeathOutcome, InstanceLaunch, InstanceSnapshot, InstanceState, LootMode, PlayerInfo,
};
use super::InstanceHandle;
use crate::config::InstanceConfig;
use crate::encounter::{EncounterHandle, EncounterLaunch, EncounterOutcome, EncounterReport};
use crate::error::InstanceError;
use crate::mythic::MythicTimerView;
use crate::registry::EncounterSupervisor;
use crate::scaling::scaled_health;
use horizon_contracts::{
    ActorId, BossId, BossTemplate, CharacterId, Collaborators, CompletionRecord, DamageModifiers,
    InstanceDefinition, InstanceGuid, LockoutRecord, MythicRunRecord, OutboundMessage,
};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

type Reply<T> = oneshot::Sender<Result<T, InstanceError>>;

pub(crate) enum InstanceCommand {
    AddPlayer { info: PlayerInfo, reply: Reply<()> },
    RemovePlayer { character: CharacterId, reply: Reply<Option<CharacterId>> },
    PlayerEntered { character: CharacterId, reply: Reply<()> },
    PlayerLeft { character: CharacterId, reply: Reply<()> },
    PlayerDied { character: CharacterId, reply: Reply<DeathOutcome> },
    PlayerResurrected { character: CharacterId, reply: Reply<()> },
    RespawnRemaining { character: CharacterId, reply: Reply<Duration> },
    EngageBoss { boss: BossId, reply: Reply<EncounterHandle> },
    RecordTrashKills { count: u32, reply: Reply<u32> },
    StartMythicTimer { reply: Reply<MythicTimerView> },
    MythicStatus { reply: oneshot::Sender<Option<MythicTimerView>> },
    SetLootMode { requester: CharacterId, mode: LootMode, reply: Reply<()> },
    SetLeader { requester: CharacterId, new_leader: CharacterId, reply: Reply<()> },
    Reset { requester: CharacterId, reply: Reply<()> },
    Snapshot { reply: oneshot::Sender<InstanceSnapshot> },
    Stop,
    #[cfg(test)]
    Crash,
}

struct InstanceActor {
    id: ActorId,
    state: InstanceState,
    config: InstanceConfig,
    collaborators: Collaborators,
    encounters: Arc<EncounterSupervisor>,
    reports: mpsc::UnboundedSender<EncounterReport>,
}

pub(crate) fn spawn_instance(
    guid: InstanceGuid,
    launch: InstanceLaunch,
    definition: Arc<InstanceDefinition>,
    config: InstanceConfig,
    collaborators: Collaborators,
    encounters: Arc<EncounterSupervisor>,
) -> (InstanceHandle, JoinHandle<()>) {
    let (sender, mailbox) = mpsc::channel(config.mailbox_capacity.max(1));
    let (reports, report_rx) = mpsc::unbounded_channel();
    let id = ActorId::next();

    let actor = InstanceActor {
        id,
        state: InstanceState::new(guid, launch, definition, config.mythic, config.respawn, Instant::now()),
        config,
        collaborators,
        encounters,
        reports,
    };
    let task = tokio::spawn(actor.run(mailbox, report_rx));
    (InstanceHandle::new(guid, id, sender), task)
}

impl InstanceActor {
    async fn run(
        mut self,
        mut mailbox: mpsc::Receiver<InstanceCommand>,
        mut report_rx: mpsc::UnboundedReceiver<EncounterReport>,
    ) {
        let guid = self.state.guid;
        self.state.mark_ready();
        info!(
            instance = %guid,
            "🏰 Instance '{}' ({:?}) ready for group {}",
            self.state.definition.name, self.state.difficulty, self.state.group
        );

        loop {
            let idle_deadline = self
                .state
                .idle_since()
                .map(|since| since + self.config.idle_timeout);

            tokio::select! {
                biased;
                Some(report) = report_rx.recv() => self.on_report(report).await,
                command = mailbox.recv() => {
                    let Some(command) = command else { break };
                    if self.handle(command).await.is_break() {
                        break;
                    }
                }
                _ = sleep_until(idle_deadline.unwrap_or_else(Instant::now)), if idle_deadline.is_some() => {
                    info!(instance = %guid, "💤 Nobody inside for {:?}, closing instance", self.config.idle_timeout);
                    break;
                }
            }
        }

        self.encounters.stop_instance(guid).await;
        info!(instance = %guid, "🏰 Instance {} stopped", self.id);
    }

    async fn handle(&mut self, command: InstanceCommand) -> ControlFlow<()> {
        let now = Instant::now();
        match command {
            InstanceCommand::AddPlayer { info, reply } => {
                let result = self.state.add_player(info);
                if result.is_ok() {
                    debug!(instance = %self.state.guid, "➕ {} joined as {:?}", info.character, info.role);
                    self.sync_participants().await;
                }
                let _ = reply.send(result);
            }
            InstanceCommand::RemovePlayer { character, reply } => {
                let result = self.state.remove_player(character, now);
                if let Ok(promoted) = &result {
                    debug!(instance = %self.state.guid, "➖ {} left the group", character);
                    if let Some(leader) = promoted {
                        info!(instance = %self.state.guid, "👑 {} promoted to leader", leader);
                    }
                    self.sync_participants().await;
                }
                let _ = reply.send(result);
            }
            InstanceCommand::PlayerEntered { character, reply } => {
                let result = self.state.player_entered(character, now).map(|first| {
                    if first {
                        info!(instance = %self.state.guid, "🚪 {} entered first, instance active", character);
                    }
                });
                let _ = reply.send(result);
            }
            InstanceCommand::PlayerLeft { character, reply } => {
                let _ = reply.send(self.state.player_left(character, now));
            }
            InstanceCommand::PlayerDied { character, reply } => {
                let result = match self.state.player_died(character, now) {
                    Ok(true) => Ok(self.wipe().await),
                    Ok(false) => Ok(DeathOutcome::Died),
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            InstanceCommand::PlayerResurrected { character, reply } => {
                let _ = reply.send(self.state.player_resurrected(character));
            }
            InstanceCommand::RespawnRemaining { character, reply } => {
                let _ = reply.send(self.state.respawn_remaining(character, now));
            }
            InstanceCommand::EngageBoss { boss, reply } => {
                let _ = reply.send(self.engage(boss));
            }
            InstanceCommand::RecordTrashKills { count, reply } => {
                let total = self.state.record_trash(count);
                debug!(instance = %self.state.guid, "🗑️ Trash kills: {} ({:.0}%)", total, self.state.trash_percent());
                self.maybe_complete().await;
                let _ = reply.send(Ok(total));
            }
            InstanceCommand::StartMythicTimer { reply } => {
                let result = self.state.start_mythic_timer(now);
                if let Ok(view) = &result {
                    info!(instance = %self.state.guid, "⏱️ Mythic+ {} timer running, limit {:?}", view.level, view.time_limit);
                }
                let _ = reply.send(result);
            }
            InstanceCommand::MythicStatus { reply } => {
                let _ = reply.send(self.state.mythic_view(now));
            }
            InstanceCommand::SetLootMode { requester, mode, reply } => {
                let result = self.state.set_loot_mode(requester, mode);
                if result.is_ok() {
                    info!(instance = %self.state.guid, "💰 Loot mode set to {:?}", mode);
                }
                let _ = reply.send(result);
            }
            InstanceCommand::SetLeader { requester, new_leader, reply } => {
                let result = self.state.set_leader(requester, new_leader);
                if result.is_ok() {
                    info!(instance = %self.state.guid, "👑 {} is now leader", new_leader);
                }
                let _ = reply.send(result);
            }
            InstanceCommand::Reset { requester, reply } => {
                let result = self.reset(requester, now).await;
                let _ = reply.send(result);
            }
            InstanceCommand::Snapshot { reply } => {
                let _ = reply.send(self.state.snapshot());
            }
            InstanceCommand::Stop => return ControlFlow::Break(()),
            #[cfg(test)]
            InstanceCommand::Crash => panic!("injected instance fault"),
        }
        ControlFlow::Continue(())
    }

    /// Resolves the boss template: static data, then the definition's boss
    /// entry, then a stub.
    fn boss_template(&self, boss: BossId) -> Arc<BossTemplate> {
        if let Some(template) = self.collaborators.templates.boss(boss) {
            return template;
        }
        match self.state.definition.boss_entry(boss) {
            Some(entry) => Arc::new(BossTemplate::from_entry(entry)),
            None => {
                debug!(instance = %self.state.guid, "No data for boss {}, using stub", boss);
                Arc::new(BossTemplate::stub(boss))
            }
        }
    }

    fn engage(&mut self, boss: BossId) -> Result<EncounterHandle, InstanceError> {
        if let Some(existing) = self.state.check_engage(boss)? {
            return Ok(existing);
        }

        let template = self.boss_template(boss);
        let max_health = scaled_health(
            template.base_health,
            self.state.difficulty,
            self.state.mythic_level,
            self.state.member_count(),
        );
        let mut modifiers = DamageModifiers::default();
        for affix in &self.state.affixes {
            modifiers.merge(&affix.boss_modifiers());
        }

        let handle = self.encounters.start(EncounterLaunch {
            instance: self.state.guid,
            template,
            max_health,
            modifiers,
            participants: self.state.members(),
            reports: self.reports.clone(),
        });
        self.state.insert_engaged(boss, handle.clone());
        Ok(handle)
    }

    async fn wipe(&mut self) -> DeathOutcome {
        let handles = self.state.apply_wipe();
        let bosses: Vec<BossId> = handles.iter().map(|h| h.boss_id()).collect();
        warn!(instance = %self.state.guid, "☠️ Everyone inside is dead, resetting {} boss(es)", bosses.len());

        for handle in handles {
            self.encounters
                .deregister(handle.instance(), handle.boss_id(), handle.actor_id());
            if let Err(e) = handle.wipe().await {
                debug!(instance = %self.state.guid, "Boss {} already gone: {}", handle.boss_id(), e);
            }
        }
        DeathOutcome::Wipe { bosses }
    }

    async fn on_report(&mut self, report: EncounterReport) {
        let guid = self.state.guid;
        match report.outcome {
            EncounterOutcome::Defeated => {
                if self.state.boss_defeated(report.boss_id, report.actor_id) {
                    info!(instance = %guid, "💀 Boss {} marked defeated", report.boss_id);
                    self.create_lockouts(report.boss_id).await;
                    self.maybe_complete().await;
                }
            }
            EncounterOutcome::Wiped => {
                if self.state.boss_released(report.boss_id, report.actor_id) {
                    info!(instance = %guid, "↩️ Boss {} reset after wipe", report.boss_id);
                }
            }
            EncounterOutcome::Lost(reason) => {
                if self.state.boss_released(report.boss_id, report.actor_id) {
                    warn!(instance = %guid, "⚠️ Boss {} encounter lost ({}), treating as wipe", report.boss_id, reason);
                }
            }
        }
    }

    async fn create_lockouts(&self, boss: BossId) {
        if !self.state.earns_lockout() {
            return;
        }
        let expires_at = self
            .config
            .schedule
            .lockout_expiry(self.state.definition.kind, self.collaborators.clock.now());

        for character in self.state.inside_members() {
            let lockout = LockoutRecord {
                character,
                definition_id: self.state.definition.id,
                difficulty: self.state.difficulty,
                boss_id: boss,
                expires_at,
            };
            if let Err(e) = self.collaborators.persistence.create_lockout(lockout).await {
                warn!(instance = %self.state.guid, "⚠️ Failed to create lockout for {}: {}", character, e);
            }
        }
    }

    async fn maybe_complete(&mut self) {
        if self.state.status == super::InstanceStatus::Completed || !self.state.is_complete() {
            return;
        }

        let now = Instant::now();
        self.state.mark_completed(now);
        let guid = self.state.guid;
        let duration = self
            .state
            .started_at()
            .map(|start| now.saturating_duration_since(start))
            .unwrap_or_default();
        info!(instance = %guid, "🎉 Instance '{}' completed in {:?}", self.state.definition.name, duration);

        let completed_at = self.collaborators.clock.now();
        for character in self.state.members() {
            let record = CompletionRecord {
                instance: guid,
                definition_id: self.state.definition.id,
                difficulty: self.state.difficulty,
                character,
                completed_at,
                duration_secs: duration.as_secs(),
                deaths: self.state.deaths(),
            };
            if let Err(e) = self.collaborators.persistence.record_completion(record).await {
                warn!(instance = %guid, "⚠️ Failed to record completion for {}: {}", character, e);
            }
            let message = OutboundMessage::InstanceCompleted {
                instance: guid,
                definition_id: self.state.definition.id,
                difficulty: self.state.difficulty,
            };
            if let Err(e) = self.collaborators.broadcaster.send(&[character], message).await {
                warn!(instance = %guid, "⚠️ Failed to notify {} of completion: {}", character, e);
            }
        }

        if let Some(view) = self.state.mythic_view(now) {
            info!(instance = %guid, "⏱️ Mythic+ {} finished, upgrade tier {}", view.level, view.upgrade_tier);
            let record = MythicRunRecord {
                instance: guid,
                definition_id: self.state.definition.id,
                level: view.level,
                affixes: self.state.affixes.iter().map(|a| a.name().to_string()).collect(),
                elapsed_secs: view.elapsed.as_secs(),
                deaths: self.state.deaths(),
                upgrade_tier: view.upgrade_tier,
                members: self.state.members(),
            };
            if let Err(e) = self.collaborators.persistence.record_mythic_run(record).await {
                warn!(instance = %guid, "⚠️ Failed to record Mythic+ run: {}", e);
            }
        }
    }

    async fn reset(&mut self, requester: CharacterId, now: Instant) -> Result<(), InstanceError> {
        let audience = self.state.members();
        self.state.reset(requester, now)?;
        let guid = self.state.guid;
        self.encounters.stop_instance(guid).await;
        info!(instance = %guid, "🔄 Instance reset by {}", requester);

        if let Err(e) = self
            .collaborators
            .broadcaster
            .send(&audience, OutboundMessage::InstanceReset { instance: guid })
            .await
        {
            warn!(instance = %guid, "⚠️ Failed to announce reset: {}", e);
        }
        Ok(())
    }

    async fn sync_participants(&self) {
        let members = self.state.members();
        for handle in self.state.engaged_handles() {
            if let Err(e) = handle.set_participants(members.clone()).await {
                debug!(instance = %self.state.guid, "Encounter {} gone before roster sync: {}", handle.boss_id(), e);
            }
        }
    }
}
