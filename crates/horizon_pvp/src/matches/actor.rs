//! The match task: one per running match, driving the phase timers and score
//! tick and turning rule decisions into broadcasts, persistence and ratings.

use super::{
    ActionOutcome, MatchAction, MatchCore, MatchPhase, MatchRules, Participant, RulesView,
    Scoreboard, Victory,
};
use crate::config::MatchTimings;
use crate::error::MatchError;
use crate::rating::{apply_draw, apply_result};
use horizon_contracts::{
    call, notify, ActorError, ActorId, Bracket, CharacterId, Collaborators, CurrencyReward,
    MatchId, OutboundMessage, RatingRecord, Side, TeamId,
};
use serde::Serialize;
use std::ops::ControlFlow;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Notifications from a match to its supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchEvent {
    Deserted {
        match_id: MatchId,
        character: CharacterId,
    },
    Finished {
        match_id: MatchId,
        kind: &'static str,
        victory: Option<Victory>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchSnapshot {
    pub match_id: MatchId,
    pub kind: &'static str,
    pub phase: MatchPhase,
    pub score: Scoreboard,
    pub victory: Option<Victory>,
    pub participants: Vec<Participant>,
    pub rules: RulesView,
    /// Time until the current phase ends on its own
    pub phase_remaining: Duration,
}

pub(crate) enum MatchCommand {
    ReportKill {
        killer: CharacterId,
        victim: CharacterId,
        reply: oneshot::Sender<Result<Scoreboard, MatchError>>,
    },
    Act {
        character: CharacterId,
        action: MatchAction,
        reply: oneshot::Sender<Result<ActionOutcome, MatchError>>,
    },
    Leave {
        character: CharacterId,
        reply: oneshot::Sender<Result<(), MatchError>>,
    },
    Snapshot(oneshot::Sender<MatchSnapshot>),
    Stop,
    #[cfg(test)]
    Crash,
}

/// Cloneable reference to a running match.
#[derive(Debug, Clone)]
pub struct MatchHandle {
    match_id: MatchId,
    kind: &'static str,
    bracket: Bracket,
    actor_id: ActorId,
    sender: mpsc::Sender<MatchCommand>,
}

impl MatchHandle {
    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn bracket(&self) -> Bracket {
        self.bracket
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    pub async fn report_kill(&self, killer: CharacterId, victim: CharacterId) -> Result<Scoreboard, MatchError> {
        call(&self.sender, |reply| MatchCommand::ReportKill { killer, victim, reply }).await?
    }

    pub async fn interact_objective(&self, character: CharacterId, objective_id: u32) -> Result<ActionOutcome, MatchError> {
        self.act(character, MatchAction::InteractObjective { objective_id }).await
    }

    pub async fn capture_resource(&self, character: CharacterId, node_id: u32) -> Result<ActionOutcome, MatchError> {
        self.act(character, MatchAction::CaptureResource { node_id }).await
    }

    pub async fn damage_generator(
        &self,
        character: CharacterId,
        generator_id: u32,
        amount: u64,
    ) -> Result<ActionOutcome, MatchError> {
        self.act(character, MatchAction::DamageGenerator { generator_id, amount }).await
    }

    pub async fn install_defense(
        &self,
        character: CharacterId,
        defense_id: u32,
        slot: u32,
    ) -> Result<ActionOutcome, MatchError> {
        self.act(character, MatchAction::InstallDefense { defense_id, slot }).await
    }

    pub async fn act(&self, character: CharacterId, action: MatchAction) -> Result<ActionOutcome, MatchError> {
        call(&self.sender, |reply| MatchCommand::Act { character, action, reply }).await?
    }

    /// Leaving an active match flags the character as a deserter.
    pub async fn leave(&self, character: CharacterId) -> Result<(), MatchError> {
        call(&self.sender, |reply| MatchCommand::Leave { character, reply }).await?
    }

    pub async fn snapshot(&self) -> Result<MatchSnapshot, ActorError> {
        call(&self.sender, MatchCommand::Snapshot).await
    }

    pub async fn stop(&self) -> Result<(), ActorError> {
        notify(&self.sender, MatchCommand::Stop).await
    }

    #[cfg(test)]
    pub(crate) async fn crash(&self) -> Result<(), ActorError> {
        notify(&self.sender, MatchCommand::Crash).await
    }
}

struct MatchActor {
    id: ActorId,
    core: MatchCore,
    rules: Box<dyn MatchRules>,
    timings: MatchTimings,
    collaborators: Collaborators,
    events: mpsc::UnboundedSender<MatchEvent>,
    deadline: Instant,
}

pub(crate) fn spawn_match(
    match_id: MatchId,
    rules: Box<dyn MatchRules>,
    red: &[CharacterId],
    blue: &[CharacterId],
    timings: MatchTimings,
    collaborators: Collaborators,
    events: mpsc::UnboundedSender<MatchEvent>,
) -> (MatchHandle, JoinHandle<()>) {
    let (sender, mailbox) = mpsc::channel(timings.mailbox_capacity.max(1));
    let id = ActorId::next();
    let handle = MatchHandle {
        match_id,
        kind: rules.kind(),
        bracket: rules.bracket(),
        actor_id: id,
        sender,
    };
    let actor = MatchActor {
        id,
        core: MatchCore::new(match_id, rules.kind(), red, blue),
        rules,
        timings,
        collaborators,
        events,
        deadline: Instant::now() + timings.preparation,
    };
    let task = tokio::spawn(actor.run(mailbox));
    (handle, task)
}

impl MatchActor {
    async fn run(mut self, mut mailbox: mpsc::Receiver<MatchCommand>) {
        let match_id = self.core.match_id();
        info!(
            match_id = %match_id,
            "🏟️ {} match preparing: {} red vs {} blue",
            self.core.kind(),
            self.core.members(Side::Red).len(),
            self.core.members(Side::Blue).len()
        );
        self.broadcast_phase().await;

        let tick = self.timings.score_tick;
        let mut ticker = interval_at(self.deadline + tick, tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = mailbox.recv() => {
                    let Some(command) = command else { break };
                    if self.handle(command).await.is_break() {
                        break;
                    }
                }
                _ = ticker.tick(), if self.core.phase() == MatchPhase::Active => self.score_tick().await,
                () = sleep_until(self.deadline) => {
                    if self.on_deadline().await.is_break() {
                        break;
                    }
                }
            }
        }

        debug!(match_id = %match_id, "Match {} stopped", self.id);
    }

    async fn handle(&mut self, command: MatchCommand) -> ControlFlow<()> {
        match command {
            MatchCommand::ReportKill { killer, victim, reply } => {
                let result = self.report_kill(killer, victim).await;
                let _ = reply.send(result);
            }
            MatchCommand::Act { character, action, reply } => {
                let result = self.act(character, action).await;
                let _ = reply.send(result);
            }
            MatchCommand::Leave { character, reply } => {
                let result = self.leave(character).await;
                let _ = reply.send(result);
            }
            MatchCommand::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            MatchCommand::Stop => return ControlFlow::Break(()),
            #[cfg(test)]
            MatchCommand::Crash => panic!("injected match fault"),
        }
        ControlFlow::Continue(())
    }

    async fn on_deadline(&mut self) -> ControlFlow<()> {
        let now = Instant::now();
        match self.core.phase() {
            MatchPhase::Preparation => {
                self.core.advance(now);
                self.deadline = now + self.timings.active;
                info!(match_id = %self.core.match_id(), "⚔️ Match is live");
                self.broadcast_phase().await;
            }
            MatchPhase::Active => {
                let victory = self.rules.on_timeout(&self.core);
                self.finish(victory).await;
            }
            MatchPhase::Ending => self.complete().await,
            MatchPhase::Complete => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    async fn report_kill(&mut self, killer: CharacterId, victim: CharacterId) -> Result<Scoreboard, MatchError> {
        let (killer_side, victim_side) = self.core.record_kill(killer, victim)?;
        debug!(match_id = %self.core.match_id(), "💀 {} killed {}", killer, victim);
        let victory = self.rules.on_kill(&mut self.core, killer, killer_side, victim_side);
        self.after_scoring(victory).await;
        Ok(self.core.scoreboard())
    }

    async fn act(&mut self, character: CharacterId, action: MatchAction) -> Result<ActionOutcome, MatchError> {
        self.core.require_active()?;
        self.core.active_participant(character)?;
        let before = self.core.scoreboard();
        let (outcome, victory) = self.rules.on_action(&mut self.core, character, action)?;
        debug!(match_id = %self.core.match_id(), "🎯 {} {:?}", character, outcome);
        if self.core.scoreboard() != before || victory.is_some() {
            self.after_scoring(victory).await;
        }
        Ok(outcome)
    }

    async fn leave(&mut self, character: CharacterId) -> Result<(), MatchError> {
        let match_id = self.core.match_id();
        match self.core.phase() {
            MatchPhase::Preparation => {
                self.core.withdraw(character)?;
                info!(match_id = %match_id, "🚪 {} withdrew before the start", character);
            }
            MatchPhase::Active => {
                let participant = self.core.participant_mut(character)?;
                if participant.deserted {
                    return Ok(());
                }
                participant.deserted = true;
                participant.alive = false;
                let side = participant.side;
                warn!(match_id = %match_id, "🏳️ {} deserted the match", character);
                let _ = self.events.send(MatchEvent::Deserted { match_id, character });
                if let Some(victory) = self.rules.on_departure(&mut self.core, side) {
                    self.finish(victory).await;
                }
            }
            MatchPhase::Ending | MatchPhase::Complete => {
                self.core.participant(character)?;
            }
        }
        Ok(())
    }

    async fn score_tick(&mut self) {
        let before = self.core.scoreboard();
        let victory = self.rules.on_score_tick(&mut self.core);
        if self.core.scoreboard() != before || victory.is_some() {
            self.after_scoring(victory).await;
        }
    }

    async fn after_scoring(&mut self, victory: Option<Victory>) {
        let score = self.core.scoreboard();
        let message = OutboundMessage::MatchScore {
            match_id: self.core.match_id(),
            red: score.red,
            blue: score.blue,
        };
        self.broadcast(message).await;
        if let Some(victory) = victory {
            self.finish(victory).await;
        }
    }

    async fn finish(&mut self, victory: Victory) {
        let now = Instant::now();
        let match_id = self.core.match_id();
        if let Err(e) = self.core.decide(victory, now) {
            warn!(match_id = %match_id, "⚠️ Ignoring result {:?}: {}", victory, e);
            return;
        }
        self.deadline = now + self.timings.ending;

        let score = self.core.scoreboard();
        match victory.winner {
            Some(side) => info!(
                match_id = %match_id,
                "🏆 {} wins {}-{} ({:?})", side, score.red, score.blue, victory.reason
            ),
            None => info!(match_id = %match_id, "🤝 Draw {}-{} ({:?})", score.red, score.blue, victory.reason),
        }
        self.broadcast(OutboundMessage::MatchResult {
            match_id,
            winner: victory.winner,
        })
        .await;
        self.broadcast_phase().await;
    }

    async fn complete(&mut self) {
        let now = Instant::now();
        self.core.advance(now);
        self.deadline = now + self.timings.cleanup;
        let match_id = self.core.match_id();

        if let Err(e) = self.collaborators.persistence.record_match(self.core.to_record(now)).await {
            error!(match_id = %match_id, "❌ Failed to persist match result: {}", e);
        }
        self.apply_ratings().await;
        self.award_currency().await;

        let _ = self.events.send(MatchEvent::Finished {
            match_id,
            kind: self.core.kind(),
            victory: self.core.victory(),
        });
        info!(match_id = %match_id, "📦 Match complete");
        self.broadcast_phase().await;
    }

    async fn apply_ratings(&self) {
        let Some((red, blue)) = self.rules.rated_teams() else {
            return;
        };
        let bracket = self.rules.bracket();
        let (red_team, red_rating) = (red.team, red.rating);
        let (blue_team, blue_rating) = (blue.team, blue.rating);

        let (Some(mut red_record), Some(mut blue_record)) = (
            self.load_rating(red_team, bracket, red_rating).await,
            self.load_rating(blue_team, bracket, blue_rating).await,
        ) else {
            return;
        };

        let at = self.collaborators.clock.now();
        let (red_change, blue_change) = match self.core.victory().and_then(|v| v.winner) {
            Some(Side::Red) => apply_result(&mut red_record, &mut blue_record, at),
            Some(Side::Blue) => {
                let (blue_change, red_change) = apply_result(&mut blue_record, &mut red_record, at);
                (red_change, blue_change)
            }
            None => apply_draw(&mut red_record, &mut blue_record, at),
        };
        info!(
            match_id = %self.core.match_id(),
            bracket = %bracket,
            "📈 Ratings {} {:+} / {} {:+}",
            red_team,
            red_change.delta(),
            blue_team,
            blue_change.delta()
        );

        for record in [red_record, blue_record] {
            let team = record.team_id;
            if let Err(e) = self.collaborators.persistence.save_rating(record).await {
                error!(team = %team, "❌ Failed to save rating: {}", e);
            }
        }
    }

    async fn load_rating(&self, team: TeamId, bracket: Bracket, queued_at: u32) -> Option<RatingRecord> {
        match self.collaborators.persistence.rating(team, bracket).await {
            Ok(Some(record)) => Some(record),
            Ok(None) => Some(RatingRecord::new(team, bracket, queued_at)),
            Err(e) => {
                error!(team = %team, "❌ Rating lookup failed, result not rated: {}", e);
                None
            }
        }
    }

    async fn award_currency(&self) {
        let Some(rewards) = self.rules.rewards() else {
            return;
        };
        let winner = self.core.victory().and_then(|v| v.winner);
        let payouts: Vec<CurrencyReward> = self
            .core
            .participants()
            .filter(|p| !p.deserted)
            .map(|p| CurrencyReward {
                character: p.character,
                currency: rewards.currency,
                amount: match winner {
                    None => rewards.draw,
                    Some(side) if side == p.side => rewards.win,
                    Some(_) => rewards.loss,
                },
            })
            .collect();

        for reward in payouts {
            let character = reward.character;
            if let Err(e) = self.collaborators.persistence.award_currency(reward).await {
                warn!("⚠️ Failed to award currency to {}: {}", character, e);
            }
        }
    }

    fn snapshot(&self) -> MatchSnapshot {
        MatchSnapshot {
            match_id: self.core.match_id(),
            kind: self.core.kind(),
            phase: self.core.phase(),
            score: self.core.scoreboard(),
            victory: self.core.victory(),
            participants: self.core.participants().cloned().collect(),
            rules: self.rules.view(),
            phase_remaining: self.deadline.saturating_duration_since(Instant::now()),
        }
    }

    async fn broadcast_phase(&self) {
        let message = OutboundMessage::MatchPhase {
            match_id: self.core.match_id(),
            phase: self.core.phase().to_string(),
        };
        self.broadcast(message).await;
    }

    async fn broadcast(&self, message: OutboundMessage) {
        let recipients = self.core.everyone();
        if let Err(e) = self.collaborators.broadcaster.send(&recipients, message).await {
            warn!(match_id = %self.core.match_id(), "⚠️ Match broadcast failed: {}", e);
        }
    }
}
