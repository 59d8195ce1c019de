//! # Lockout Reset Manager
//!
//! A background actor that wakes on a fixed cadence and runs the calendar
//! resets:
//!
//! * **daily** - once per UTC day after `daily_hour`; expires lockouts through
//!   persistence and broadcasts a reset notice
//! * **weekly** - once per week on `weekly_day` after the same hour; broadcast
//!   only, since every lockout already carries its own expiry timestamp
//!
//! The last reset date of each kind is kept in memory and persisted, so a
//! restarted manager, or a check that runs twice on the same day, never fires
//! a reset twice. A reset whose persistence call fails leaves its guard
//! untouched and is retried on the next check.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveDate, NaiveTime, Timelike, Utc, Weekday};
use horizon_contracts::{call, notify, ActorError, Collaborators, InstanceKind, OutboundMessage, ResetKind};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Calendar of daily and weekly reset boundaries, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetSchedule {
    pub daily_hour: u32,
    pub weekly_day: Weekday,
}

impl Default for ResetSchedule {
    fn default() -> Self {
        Self {
            daily_hour: 10,
            weekly_day: Weekday::Tue,
        }
    }
}

/// Last reset dates, one per reset kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetGuards {
    pub daily: Option<NaiveDate>,
    pub weekly: Option<NaiveDate>,
}

impl ResetGuards {
    fn set(&mut self, kind: ResetKind, date: NaiveDate) {
        match kind {
            ResetKind::Daily => self.daily = Some(date),
            ResetKind::Weekly => self.weekly = Some(date),
        }
    }
}

impl ResetSchedule {
    fn reset_time(&self) -> NaiveTime {
        NaiveTime::from_hms_opt(self.daily_hour, 0, 0).unwrap_or(NaiveTime::MIN)
    }

    fn boundary_on(&self, date: NaiveDate) -> DateTime<Utc> {
        date.and_time(self.reset_time()).and_utc()
    }

    /// First daily boundary strictly after `now`.
    pub fn next_daily_reset(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = self.boundary_on(now.date_naive());
        if today > now {
            today
        } else {
            today + ChronoDuration::days(1)
        }
    }

    /// First weekly boundary strictly after `now`.
    pub fn next_weekly_reset(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let days_ahead = (7 + self.weekly_day.num_days_from_monday()
            - now.weekday().num_days_from_monday())
            % 7;
        let candidate =
            self.boundary_on(now.date_naive()) + ChronoDuration::days(i64::from(days_ahead));
        if candidate > now {
            candidate
        } else {
            candidate + ChronoDuration::weeks(1)
        }
    }

    /// Expiry for a lockout earned now: raids lock until the weekly reset,
    /// everything else until the daily one.
    pub fn lockout_expiry(&self, kind: InstanceKind, now: DateTime<Utc>) -> DateTime<Utc> {
        match kind {
            InstanceKind::Raid => self.next_weekly_reset(now),
            _ => self.next_daily_reset(now),
        }
    }

    /// Resets that should fire at `now` given the last reset dates.
    pub fn due_resets(&self, now: DateTime<Utc>, guards: &ResetGuards) -> Vec<ResetKind> {
        let today = now.date_naive();
        if now.hour() < self.daily_hour {
            return Vec::new();
        }
        let mut due = Vec::new();
        if guards.daily != Some(today) {
            due.push(ResetKind::Daily);
        }
        if now.weekday() == self.weekly_day && guards.weekly != Some(today) {
            due.push(ResetKind::Weekly);
        }
        due
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutConfig {
    pub check_interval: Duration,
    pub schedule: ResetSchedule,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            schedule: ResetSchedule::default(),
        }
    }
}

enum LockoutCommand {
    CheckNow(oneshot::Sender<Vec<ResetKind>>),
    Guards(oneshot::Sender<ResetGuards>),
    Stop,
}

/// Handle to the running lockout manager.
#[derive(Debug, Clone)]
pub struct LockoutManagerHandle {
    sender: mpsc::Sender<LockoutCommand>,
}

impl LockoutManagerHandle {
    /// Runs a reset check immediately and returns the resets that fired.
    pub async fn check_now(&self) -> Result<Vec<ResetKind>, ActorError> {
        call(&self.sender, LockoutCommand::CheckNow).await
    }

    pub async fn guards(&self) -> Result<ResetGuards, ActorError> {
        call(&self.sender, LockoutCommand::Guards).await
    }

    pub async fn stop(&self) -> Result<(), ActorError> {
        notify(&self.sender, LockoutCommand::Stop).await
    }
}

impl std::fmt::Debug for LockoutCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockoutCommand::CheckNow(_) => write!(f, "CheckNow"),
            LockoutCommand::Guards(_) => write!(f, "Guards"),
            LockoutCommand::Stop => write!(f, "Stop"),
        }
    }
}

pub struct LockoutManager {
    config: LockoutConfig,
    collaborators: Collaborators,
    guards: ResetGuards,
}

impl LockoutManager {
    pub fn spawn(config: LockoutConfig, collaborators: Collaborators) -> (LockoutManagerHandle, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(16);
        let manager = Self {
            config,
            collaborators,
            guards: ResetGuards::default(),
        };
        let task = tokio::spawn(manager.run(receiver));
        (LockoutManagerHandle { sender }, task)
    }

    async fn run(mut self, mut mailbox: mpsc::Receiver<LockoutCommand>) {
        self.load_guards().await;
        info!(
            "🔒 Lockout manager started (daily reset {:02}:00 UTC, weekly on {})",
            self.config.schedule.daily_hour, self.config.schedule.weekly_day
        );

        let mut ticker = interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = mailbox.recv() => match command {
                    Some(LockoutCommand::CheckNow(reply)) => {
                        let fired = self.run_check().await;
                        let _ = reply.send(fired);
                    }
                    Some(LockoutCommand::Guards(reply)) => {
                        let _ = reply.send(self.guards);
                    }
                    Some(LockoutCommand::Stop) | None => break,
                },
                _ = ticker.tick() => {
                    self.run_check().await;
                }
            }
        }

        info!("🔒 Lockout manager stopped");
    }

    async fn load_guards(&mut self) {
        for kind in [ResetKind::Daily, ResetKind::Weekly] {
            match self.collaborators.persistence.last_reset(kind).await {
                Ok(Some(date)) => self.guards.set(kind, date),
                Ok(None) => {}
                Err(e) => warn!("⚠️ Could not read last {:?} reset date: {}", kind, e),
            }
        }
        debug!("🔒 Loaded reset guards: {:?}", self.guards);
    }

    async fn run_check(&mut self) -> Vec<ResetKind> {
        let now = self.collaborators.clock.now();
        let today = now.date_naive();
        let mut fired = Vec::new();

        for kind in self.config.schedule.due_resets(now, &self.guards) {
            let done = match kind {
                ResetKind::Daily => self.daily_reset(now).await,
                ResetKind::Weekly => self.weekly_reset().await,
            };
            if !done {
                continue;
            }
            self.guards.set(kind, today);
            if let Err(e) = self.collaborators.persistence.store_last_reset(kind, today).await {
                warn!("⚠️ Could not persist {:?} reset guard: {}", kind, e);
            }
            fired.push(kind);
        }

        fired
    }

    async fn daily_reset(&self, now: DateTime<Utc>) -> bool {
        let expired = match self.collaborators.persistence.expire_lockouts(now).await {
            Ok(count) => count,
            Err(e) => {
                warn!("⚠️ Daily reset failed, will retry: {}", e);
                return false;
            }
        };
        info!("🌅 Daily reset: expired {} lockouts", expired);
        self.announce(ResetKind::Daily).await;
        true
    }

    async fn weekly_reset(&self) -> bool {
        info!("📅 Weekly reset");
        self.announce(ResetKind::Weekly).await
    }

    async fn announce(&self, kind: ResetKind) -> bool {
        match self
            .collaborators
            .broadcaster
            .send_global(OutboundMessage::LockoutReset { kind })
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("⚠️ Failed to announce {:?} reset: {}", kind, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use horizon_contracts::{InMemoryCollaborators, LockoutRecord, Persistence, StaticTemplateStore};
    use horizon_contracts::{BossId, CharacterId, DefinitionId, Difficulty};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).single().unwrap()
    }

    // 2024-06-04 is a Tuesday
    const TUESDAY: (i32, u32, u32) = (2024, 6, 4);

    #[test]
    fn next_daily_boundary() {
        let schedule = ResetSchedule::default();
        let (y, m, d) = TUESDAY;
        assert_eq!(schedule.next_daily_reset(at(y, m, d, 9)), at(y, m, d, 10));
        assert_eq!(schedule.next_daily_reset(at(y, m, d, 10)), at(y, m, d + 1, 10));
    }

    #[test]
    fn next_weekly_boundary() {
        let schedule = ResetSchedule::default();
        let (y, m, d) = TUESDAY;
        assert_eq!(schedule.next_weekly_reset(at(y, m, d, 9)), at(y, m, d, 10));
        assert_eq!(schedule.next_weekly_reset(at(y, m, d, 11)), at(y, m, d + 7, 10));
        assert_eq!(schedule.next_weekly_reset(at(y, m, d + 2, 11)), at(y, m, d + 7, 10));
    }

    #[test]
    fn raids_lock_until_weekly_reset() {
        let schedule = ResetSchedule::default();
        let now = at(2024, 6, 6, 12);
        assert_eq!(schedule.lockout_expiry(InstanceKind::Dungeon, now), at(2024, 6, 7, 10));
        assert_eq!(schedule.lockout_expiry(InstanceKind::Raid, now), at(2024, 6, 11, 10));
    }

    #[test]
    fn due_resets_respect_hour_and_guards() {
        let schedule = ResetSchedule::default();
        let (y, m, d) = TUESDAY;
        let mut guards = ResetGuards::default();

        assert!(schedule.due_resets(at(y, m, d, 9), &guards).is_empty());
        assert_eq!(
            schedule.due_resets(at(y, m, d, 10), &guards),
            vec![ResetKind::Daily, ResetKind::Weekly]
        );

        guards.daily = Some(at(y, m, d, 0).date_naive());
        assert_eq!(schedule.due_resets(at(y, m, d, 15), &guards), vec![ResetKind::Weekly]);

        // Wednesday only has a daily reset
        assert_eq!(schedule.due_resets(at(y, m, d + 1, 15), &guards), vec![ResetKind::Daily]);
    }

    fn lockout(expires_at: DateTime<Utc>) -> LockoutRecord {
        LockoutRecord {
            character: CharacterId(1),
            definition_id: DefinitionId(10),
            difficulty: Difficulty::Veteran,
            boss_id: BossId(1),
            expires_at,
        }
    }

    #[tokio::test]
    async fn daily_reset_fires_once_per_day() {
        let (y, m, d) = TUESDAY;
        let memory = InMemoryCollaborators::new(StaticTemplateStore::default(), at(y, m, d + 1, 11));
        memory.persistence.create_lockout(lockout(at(y, m, d + 1, 10))).await.unwrap();

        let (handle, _task) = LockoutManager::spawn(LockoutConfig::default(), memory.bundle());
        // the first interval tick may already have run the reset
        let _ = handle.check_now().await.unwrap();
        assert!(handle.check_now().await.unwrap().is_empty());

        assert!(memory.persistence.all_lockouts().await.is_empty());
        let resets = memory
            .broadcaster
            .matching(|m| matches!(m, OutboundMessage::LockoutReset { kind: ResetKind::Daily }))
            .await;
        assert_eq!(resets.len(), 1);
        assert_eq!(
            memory.persistence.last_reset(ResetKind::Daily).await.unwrap(),
            Some(at(y, m, d + 1, 0).date_naive())
        );
        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn persisted_guard_prevents_refire_after_restart() {
        let (y, m, d) = TUESDAY;
        let now = at(y, m, d + 1, 11);
        let memory = InMemoryCollaborators::new(StaticTemplateStore::default(), now);
        memory
            .persistence
            .store_last_reset(ResetKind::Daily, now.date_naive())
            .await
            .unwrap();

        let (handle, _task) = LockoutManager::spawn(LockoutConfig::default(), memory.bundle());
        assert!(handle.check_now().await.unwrap().is_empty());
        assert_eq!(handle.guards().await.unwrap().daily, Some(now.date_naive()));
        assert!(memory.broadcaster.sent().await.is_empty());
    }

    #[tokio::test]
    async fn failed_expiry_is_retried_on_next_check() {
        let (y, m, d) = TUESDAY;
        let memory = InMemoryCollaborators::new(StaticTemplateStore::default(), at(y, m, d + 1, 11));
        memory.persistence.set_fail_lockout_expiry(true);

        let (handle, _task) = LockoutManager::spawn(LockoutConfig::default(), memory.bundle());
        assert!(handle.check_now().await.unwrap().is_empty());
        assert_eq!(handle.guards().await.unwrap().daily, None);

        memory.persistence.set_fail_lockout_expiry(false);
        assert_eq!(handle.check_now().await.unwrap(), vec![ResetKind::Daily]);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_check_runs_without_prompting() {
        let (y, m, d) = TUESDAY;
        let memory = InMemoryCollaborators::new(StaticTemplateStore::default(), at(y, m, d, 9));
        let (handle, _task) = LockoutManager::spawn(LockoutConfig::default(), memory.bundle());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(memory.broadcaster.sent().await.is_empty());

        memory.clock.set(at(y, m, d, 10));
        tokio::time::sleep(Duration::from_secs(61)).await;

        let guards = handle.guards().await.unwrap();
        assert_eq!(guards.daily, Some(at(y, m, d, 0).date_naive()));
        assert_eq!(guards.weekly, Some(at(y, m, d, 0).date_naive()));
        assert_eq!(memory.broadcaster.sent().await.len(), 2);
    }
}
