//! The boss encounter task: owns an [`EncounterState`], drives its ability
//! tick and enrage timer, and turns state signals into collaborator calls.

use super::state::{
    ActiveAdd, DamageOutcome, EncounterSignal, EncounterSnapshot, EncounterState, InterruptOutcome,
};
use crate::config::EncounterConfig;
use crate::error::EncounterError;
use horizon_contracts::{
    call, notify, ActorError, ActorId, BossId, BossTemplate, CharacterId, Collaborators,
    DamageModifiers, EffectTemplate, InstanceGuid, OutboundMessage, SpellEffectKind,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// How an encounter ended, as seen by its instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncounterOutcome {
    Defeated,
    Wiped,
    /// The encounter task died without reporting; treated like a wipe
    Lost(String),
}

/// Child-to-parent notification from an encounter to its instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncounterReport {
    pub instance: InstanceGuid,
    pub boss_id: BossId,
    pub actor_id: ActorId,
    pub outcome: EncounterOutcome,
}

/// Everything needed to start one encounter.
#[derive(Debug, Clone)]
pub struct EncounterLaunch {
    pub instance: InstanceGuid,
    pub template: Arc<BossTemplate>,
    pub max_health: u64,
    /// Modifiers applied for the whole fight (affixes)
    pub modifiers: DamageModifiers,
    pub participants: Vec<CharacterId>,
    pub reports: mpsc::UnboundedSender<EncounterReport>,
}

pub(crate) enum EncounterCommand {
    DealDamage {
        source: CharacterId,
        amount: u64,
        reply: oneshot::Sender<Result<DamageOutcome, EncounterError>>,
    },
    Interrupt {
        source: CharacterId,
        reply: oneshot::Sender<Result<InterruptOutcome, EncounterError>>,
    },
    SetParticipants(Vec<CharacterId>),
    Snapshot(oneshot::Sender<EncounterSnapshot>),
    Wipe,
    Stop,
    #[cfg(test)]
    Crash,
}

/// Cloneable reference to a running encounter.
#[derive(Debug, Clone)]
pub struct EncounterHandle {
    instance: InstanceGuid,
    boss_id: BossId,
    actor_id: ActorId,
    sender: mpsc::Sender<EncounterCommand>,
}

impl EncounterHandle {
    pub fn instance(&self) -> InstanceGuid {
        self.instance
    }

    pub fn boss_id(&self) -> BossId {
        self.boss_id
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    /// False once the encounter task has ended.
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    pub async fn deal_damage(&self, source: CharacterId, amount: u64) -> Result<DamageOutcome, EncounterError> {
        call(&self.sender, |reply| EncounterCommand::DealDamage { source, amount, reply }).await?
    }

    pub async fn interrupt(&self, source: CharacterId) -> Result<InterruptOutcome, EncounterError> {
        call(&self.sender, |reply| EncounterCommand::Interrupt { source, reply }).await?
    }

    pub async fn snapshot(&self) -> Result<EncounterSnapshot, ActorError> {
        call(&self.sender, EncounterCommand::Snapshot).await
    }

    pub async fn set_participants(&self, participants: Vec<CharacterId>) -> Result<(), ActorError> {
        notify(&self.sender, EncounterCommand::SetParticipants(participants)).await
    }

    /// Abandons the fight; the encounter reports the wipe and stops.
    pub async fn wipe(&self) -> Result<(), ActorError> {
        notify(&self.sender, EncounterCommand::Wipe).await
    }

    pub async fn stop(&self) -> Result<(), ActorError> {
        notify(&self.sender, EncounterCommand::Stop).await
    }

    #[cfg(test)]
    pub(crate) async fn crash(&self) -> Result<(), ActorError> {
        notify(&self.sender, EncounterCommand::Crash).await
    }
}

struct EncounterActor {
    id: ActorId,
    instance: InstanceGuid,
    state: EncounterState,
    config: EncounterConfig,
    collaborators: Collaborators,
    reports: mpsc::UnboundedSender<EncounterReport>,
    rng: StdRng,
}

/// Starts the encounter task. The boss is engaged as soon as the task runs.
pub(crate) fn spawn_encounter(
    launch: EncounterLaunch,
    config: EncounterConfig,
    collaborators: Collaborators,
) -> (EncounterHandle, JoinHandle<()>) {
    let (sender, mailbox) = mpsc::channel(config.mailbox_capacity.max(1));
    let id = ActorId::next();
    let handle = EncounterHandle {
        instance: launch.instance,
        boss_id: launch.template.id,
        actor_id: id,
        sender,
    };

    let actor = EncounterActor {
        id,
        instance: launch.instance,
        state: EncounterState::new(
            launch.instance,
            launch.template,
            launch.max_health,
            launch.modifiers,
            launch.participants,
            config,
        ),
        config,
        collaborators,
        reports: launch.reports,
        rng: StdRng::from_entropy(),
    };
    let task = tokio::spawn(actor.run(mailbox));
    (handle, task)
}

impl EncounterActor {
    async fn run(mut self, mut mailbox: mpsc::Receiver<EncounterCommand>) {
        let start = Instant::now();
        match self.state.engage(start, &mut self.rng) {
            Ok(signals) => self.apply(signals).await,
            Err(e) => {
                warn!(instance = %self.instance, boss = %self.state.boss_id(), "⚠️ Engage failed: {}", e);
                return;
            }
        }

        let tick = self.config.tick_interval;
        let mut ticker = interval_at(start + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let enrage_at = self
            .state
            .template()
            .enrage_after_secs
            .map(|secs| start + Duration::from_secs(secs));
        let enrage_timer = sleep_until(enrage_at.unwrap_or(start));
        tokio::pin!(enrage_timer);

        loop {
            tokio::select! {
                command = mailbox.recv() => {
                    let Some(command) = command else { break };
                    if self.handle(command).await.is_break() {
                        break;
                    }
                }
                _ = ticker.tick(), if self.state.is_engaged() => {
                    let signals = self.state.tick(Instant::now());
                    self.apply(signals).await;
                }
                () = &mut enrage_timer, if enrage_at.is_some() && self.state.is_engaged() && !self.state.is_enraged() => {
                    let signals = self.state.enrage();
                    self.apply(signals).await;
                }
            }
        }

        debug!(instance = %self.instance, boss = %self.state.boss_id(), "Encounter {} stopped", self.id);
    }

    async fn handle(&mut self, command: EncounterCommand) -> ControlFlow<()> {
        match command {
            EncounterCommand::DealDamage { source, amount, reply } => {
                let result = self.state.deal_damage(amount, Instant::now(), &mut self.rng);
                let result = match result {
                    Ok((outcome, signals)) => {
                        debug!(boss = %self.state.boss_id(), "🗡️ {} dealt {} ({} hp left)", source, outcome.applied, outcome.health);
                        self.apply(signals).await;
                        Ok(outcome)
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            EncounterCommand::Interrupt { source, reply } => {
                let result = match self.state.interrupt(Instant::now()) {
                    Ok((outcome, signals)) => {
                        debug!(boss = %self.state.boss_id(), "✋ {} interrupted: {:?}", source, outcome);
                        self.apply(signals).await;
                        Ok(outcome)
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(result);
            }
            EncounterCommand::SetParticipants(participants) => {
                self.state.set_participants(participants);
            }
            EncounterCommand::Snapshot(reply) => {
                let _ = reply.send(self.state.snapshot(Instant::now()));
            }
            EncounterCommand::Wipe => {
                let signals = self.state.wipe();
                self.apply(signals).await;
                return ControlFlow::Break(());
            }
            EncounterCommand::Stop => return ControlFlow::Break(()),
            #[cfg(test)]
            EncounterCommand::Crash => panic!("injected encounter fault"),
        }
        ControlFlow::Continue(())
    }

    async fn apply(&mut self, signals: Vec<EncounterSignal>) {
        let boss = self.state.boss_id();
        let instance = self.instance;
        for signal in signals {
            match signal {
                EncounterSignal::Engaged { name, max_health } => {
                    info!(instance = %instance, boss = %boss, "⚔️ {} engaged with {} health", name, max_health);
                    self.broadcast(OutboundMessage::BossEngaged { instance, boss, name, max_health })
                        .await;
                }
                EncounterSignal::PhaseChanged { phase } => {
                    info!(instance = %instance, boss = %boss, "🌀 Phase changed to '{}'", phase);
                    self.broadcast(OutboundMessage::BossPhaseChanged { instance, boss, phase })
                        .await;
                }
                EncounterSignal::Enraged => {
                    warn!(instance = %instance, boss = %boss, "🔥 Boss enraged");
                    self.broadcast(OutboundMessage::BossEnraged { instance, boss }).await;
                }
                EncounterSignal::MomentOfOpportunity { duration } => {
                    info!(instance = %instance, boss = %boss, "💥 Moment of opportunity");
                    self.broadcast(OutboundMessage::MomentOfOpportunity {
                        instance,
                        boss,
                        duration_ms: duration.as_millis() as u64,
                    })
                    .await;
                }
                EncounterSignal::Effect { ability_id, effect } => {
                    self.apply_effect(ability_id, effect).await;
                }
                EncounterSignal::Despawn(creatures) => {
                    for creature in creatures {
                        if let Err(e) = self.collaborators.spawner.despawn(instance, creature).await {
                            warn!(instance = %instance, "⚠️ Failed to despawn {}: {}", creature, e);
                        }
                    }
                }
                EncounterSignal::Defeated => {
                    info!(instance = %instance, boss = %boss, "🏆 Boss defeated");
                    self.broadcast(OutboundMessage::BossDefeated { instance, boss }).await;
                    self.report(EncounterOutcome::Defeated);
                }
                EncounterSignal::Wiped => {
                    info!(instance = %instance, boss = %boss, "☠️ Group wiped");
                    self.broadcast(OutboundMessage::BossWiped { instance, boss }).await;
                    self.report(EncounterOutcome::Wiped);
                }
            }
        }
    }

    async fn apply_effect(&mut self, ability_id: u32, effect: EffectTemplate) {
        let instance = self.instance;
        let boss = self.state.boss_id();
        let message = match effect {
            EffectTemplate::Damage { amount, .. } => OutboundMessage::SpellEffect {
                instance,
                boss,
                ability_id,
                kind: SpellEffectKind::Damage,
                spell_id: ability_id,
                amount,
                duration_ms: 0,
            },
            EffectTemplate::Telegraph { shape, radius, duration_ms, damage } => OutboundMessage::Telegraph {
                instance,
                boss,
                ability_id,
                shape,
                radius,
                duration_ms,
                damage,
            },
            EffectTemplate::Spawn { creature_id, count, despawn_with_boss } => {
                for _ in 0..count {
                    match self.collaborators.spawner.spawn(instance, creature_id).await {
                        Ok(guid) => self.state.register_add(ActiveAdd { guid, creature_id, despawn_with_boss }),
                        Err(e) => warn!(instance = %instance, boss = %boss, "⚠️ Failed to spawn add {}: {}", creature_id, e),
                    }
                }
                return;
            }
            EffectTemplate::Buff { spell_id, duration_ms } => OutboundMessage::SpellEffect {
                instance,
                boss,
                ability_id,
                kind: SpellEffectKind::Buff,
                spell_id,
                amount: 0,
                duration_ms,
            },
            EffectTemplate::Debuff { spell_id, duration_ms } => OutboundMessage::SpellEffect {
                instance,
                boss,
                ability_id,
                kind: SpellEffectKind::Debuff,
                spell_id,
                amount: 0,
                duration_ms,
            },
            EffectTemplate::Movement { kind, magnitude } => OutboundMessage::MovementForce {
                instance,
                boss,
                kind,
                magnitude,
            },
            EffectTemplate::Coordination { mechanic } => OutboundMessage::Coordination {
                instance,
                boss,
                mechanic,
            },
            EffectTemplate::Environmental { hazard, duration_ms } => OutboundMessage::Environmental {
                instance,
                hazard,
                duration_ms,
            },
        };
        self.broadcast(message).await;
    }

    async fn broadcast(&self, message: OutboundMessage) {
        if let Err(e) = self
            .collaborators
            .broadcaster
            .send(self.state.participants(), message)
            .await
        {
            warn!(instance = %self.instance, boss = %self.state.boss_id(), "⚠️ Broadcast failed: {}", e);
        }
    }

    fn report(&self, outcome: EncounterOutcome) {
        let report = EncounterReport {
            instance: self.instance,
            boss_id: self.state.boss_id(),
            actor_id: self.id,
            outcome,
        };
        if self.reports.send(report).is_err() {
            debug!(instance = %self.instance, "Instance gone before encounter report");
        }
    }
}
