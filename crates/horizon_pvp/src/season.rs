//! # Season Scheduler
//!
//! Background actor that wakes on a fixed interval and, for each bracket on
//! its own:
//!
//! 1. applies rating decay to records that have been idle for the inactivity
//!    window (no game and no earlier decay), never below the decay floor
//! 2. once the configured season end has passed, finalises the bracket a
//!    single time: a season result with its glory reward per team, then the
//!    bracket is marked finalised in persistence
//!
//! A bracket whose records cannot be read or written is logged and skipped;
//! the other brackets still run in the same pass and the failed one is
//! retried on the next.

use crate::config::SeasonConfig;
use chrono::{DateTime, Utc};
use horizon_contracts::{
    call, notify, ActorError, Bracket, CollaboratorError, Collaborators, RatingRecord,
    SeasonResultRecord,
};
use serde::Serialize;
use std::ops::ControlFlow;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Rating after decay, when `record` is due for it.
pub fn decayed_rating(record: &RatingRecord, now: DateTime<Utc>, config: &SeasonConfig) -> Option<u32> {
    if record.rating <= config.decay_floor {
        return None;
    }
    let last_activity = record.last_game_at.max(record.last_decay_at)?;
    if now - last_activity < config.decay_inactivity {
        return None;
    }
    Some(record.rating.saturating_sub(config.decay_amount).max(config.decay_floor))
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SeasonPass {
    pub decayed: usize,
    pub finalized: Vec<Bracket>,
    pub failed: Vec<Bracket>,
}

enum SeasonCommand {
    RunNow(oneshot::Sender<SeasonPass>),
    Stop,
}

#[derive(Debug, Clone)]
pub struct SeasonSchedulerHandle {
    sender: mpsc::Sender<SeasonCommand>,
}

impl SeasonSchedulerHandle {
    /// Runs a pass immediately and returns its summary.
    pub async fn run_now(&self) -> Result<SeasonPass, ActorError> {
        call(&self.sender, SeasonCommand::RunNow).await
    }

    pub async fn stop(&self) -> Result<(), ActorError> {
        notify(&self.sender, SeasonCommand::Stop).await
    }
}

struct SeasonScheduler {
    config: SeasonConfig,
    collaborators: Collaborators,
}

pub fn spawn_season_scheduler(
    config: SeasonConfig,
    collaborators: Collaborators,
) -> (SeasonSchedulerHandle, JoinHandle<()>) {
    let (sender, mailbox) = mpsc::channel(8);
    let scheduler = SeasonScheduler { config, collaborators };
    let task = tokio::spawn(scheduler.run(mailbox));
    (SeasonSchedulerHandle { sender }, task)
}

impl SeasonScheduler {
    async fn run(self, mut mailbox: mpsc::Receiver<SeasonCommand>) {
        info!(season = self.config.season_id, "🗓️ Season scheduler started");
        let period = self.config.check_interval;
        let mut checks = interval_at(Instant::now() + period, period);
        checks.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = mailbox.recv() => {
                    let Some(command) = command else { break };
                    if self.handle(command).await.is_break() {
                        break;
                    }
                }
                _ = checks.tick() => {
                    self.run_pass().await;
                }
            }
        }
        info!("🗓️ Season scheduler stopped");
    }

    async fn handle(&self, command: SeasonCommand) -> ControlFlow<()> {
        match command {
            SeasonCommand::RunNow(reply) => {
                let pass = self.run_pass().await;
                let _ = reply.send(pass);
            }
            SeasonCommand::Stop => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    async fn run_pass(&self) -> SeasonPass {
        let now = self.collaborators.clock.now();
        let mut pass = SeasonPass::default();
        for bracket in Bracket::ALL {
            match self.process(bracket, now).await {
                Ok((decayed, finalized)) => {
                    pass.decayed += decayed;
                    if finalized {
                        pass.finalized.push(bracket);
                    }
                }
                Err(e) => {
                    warn!(bracket = %bracket, "⚠️ Season housekeeping failed, skipping bracket: {}", e);
                    pass.failed.push(bracket);
                }
            }
        }
        debug!("Season pass: {:?}", pass);
        pass
    }

    async fn process(&self, bracket: Bracket, now: DateTime<Utc>) -> Result<(usize, bool), CollaboratorError> {
        let persistence = &self.collaborators.persistence;
        let records = persistence.ratings_in_bracket(bracket).await?;
        let season_over = self.config.season_end.is_some_and(|end| now >= end);

        if !season_over {
            let mut decayed = 0;
            for mut record in records {
                let Some(rating) = decayed_rating(&record, now, &self.config) else {
                    continue;
                };
                debug!(team = %record.team_id, bracket = %bracket, "📉 Decay {} -> {}", record.rating, rating);
                record.rating = rating;
                record.last_decay_at = Some(now);
                persistence.save_rating(record).await?;
                decayed += 1;
            }
            if decayed > 0 {
                info!(bracket = %bracket, "📉 Decayed {} inactive rating(s)", decayed);
            }
            return Ok((decayed, false));
        }

        let season_id = self.config.season_id;
        if persistence.season_finalized(season_id, bracket).await? {
            return Ok((0, false));
        }
        for record in &records {
            let result = SeasonResultRecord {
                season_id,
                bracket,
                team_id: record.team_id,
                final_rating: record.rating,
                season_high: record.season_high,
                reward: self.config.reward_for(record.rating).unwrap_or(0),
            };
            persistence.record_season_result(result).await?;
        }
        persistence.mark_season_finalized(season_id, bracket).await?;
        info!(bracket = %bracket, season = season_id, "🏁 Season finalised for {} team(s)", records.len());
        Ok((0, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use horizon_contracts::TeamId;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, 12, 0, 0).unwrap()
    }

    fn record(rating: u32, last_game: Option<DateTime<Utc>>) -> RatingRecord {
        let mut record = RatingRecord::new(TeamId(1), Bracket::ThreeVsThree, rating);
        record.last_game_at = last_game;
        record
    }

    #[test]
    fn decay_needs_inactivity_and_a_rating_above_the_floor() {
        let config = SeasonConfig::default();
        assert_eq!(decayed_rating(&record(2200, Some(at(1))), at(8), &config), Some(2175));
        assert_eq!(decayed_rating(&record(2200, Some(at(2))), at(8), &config), None);
        assert_eq!(decayed_rating(&record(1800, Some(at(1))), at(20), &config), None);
        assert_eq!(decayed_rating(&record(1810, Some(at(1))), at(20), &config), Some(1800));
        assert_eq!(decayed_rating(&record(2200, None), at(20), &config), None);
    }

    #[test]
    fn recent_decay_resets_the_clock() {
        let config = SeasonConfig::default();
        let mut decayed = record(2200, Some(at(1)));
        decayed.last_decay_at = Some(at(8));
        assert_eq!(decayed_rating(&decayed, at(14), &config), None);
        assert_eq!(decayed_rating(&decayed, at(8) + Duration::days(7), &config), Some(2175));
    }

    #[test]
    fn reward_tiers() {
        let config = SeasonConfig::default();
        assert_eq!(config.reward_for(2500), Some(1000));
        assert_eq!(config.reward_for(2100), Some(600));
        assert_eq!(config.reward_for(1999), Some(300));
        assert_eq!(config.reward_for(1500), Some(100));
        assert_eq!(config.reward_for(1499), None);
    }
}
