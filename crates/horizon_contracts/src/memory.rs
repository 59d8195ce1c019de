//! # In-Memory Collaborators
//!
//! Process-local implementations of the collaborator traits. The server binary
//! uses them when no external storage is wired in, and every test in the
//! workspace uses them as doubles: they record what was sent so assertions can
//! inspect it, and a few switches inject failures.

use crate::collaborators::{
    Bracket, Broadcaster, Clock, Collaborators, CompletionRecord, CreatureSpawner, CurrencyReward,
    LockoutRecord, MatchRecord, MythicRunRecord, OutboundMessage, Persistence, RatingRecord,
    ResetKind, SeasonResultRecord,
};
use crate::error::CollaboratorError;
use crate::ids::{CharacterId, CreatureGuid, InstanceGuid, TeamId};
use crate::templates::{StaticTemplateStore, TemplateStore};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use dashmap::{DashMap, DashSet};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Persistence backed by concurrent maps.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    lockouts: RwLock<Vec<LockoutRecord>>,
    resets: DashMap<ResetKind, NaiveDate>,
    completions: RwLock<Vec<CompletionRecord>>,
    mythic_runs: RwLock<Vec<MythicRunRecord>>,
    ratings: DashMap<(TeamId, Bracket), RatingRecord>,
    matches: RwLock<Vec<MatchRecord>>,
    rewards: RwLock<Vec<CurrencyReward>>,
    season_results: RwLock<Vec<SeasonResultRecord>>,
    finalized: DashSet<(u32, Bracket)>,
    fail_lockout_expiry: AtomicBool,
    failing_brackets: DashSet<Bracket>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `expire_lockouts` fail until switched off.
    pub fn set_fail_lockout_expiry(&self, fail: bool) {
        self.fail_lockout_expiry.store(fail, Ordering::Release);
    }

    /// Makes `ratings_in_bracket` fail for `bracket`.
    pub fn fail_bracket(&self, bracket: Bracket) {
        self.failing_brackets.insert(bracket);
    }

    pub async fn all_lockouts(&self) -> Vec<LockoutRecord> {
        self.lockouts.read().await.clone()
    }

    pub async fn completions(&self) -> Vec<CompletionRecord> {
        self.completions.read().await.clone()
    }

    pub async fn mythic_runs(&self) -> Vec<MythicRunRecord> {
        self.mythic_runs.read().await.clone()
    }

    pub async fn matches(&self) -> Vec<MatchRecord> {
        self.matches.read().await.clone()
    }

    pub async fn rewards(&self) -> Vec<CurrencyReward> {
        self.rewards.read().await.clone()
    }

    pub async fn season_results(&self) -> Vec<SeasonResultRecord> {
        self.season_results.read().await.clone()
    }

    pub fn insert_rating(&self, record: RatingRecord) {
        self.ratings.insert((record.team_id, record.bracket), record);
    }

    pub fn rating_of(&self, team: TeamId, bracket: Bracket) -> Option<RatingRecord> {
        self.ratings.get(&(team, bracket)).map(|r| r.value().clone())
    }
}

#[async_trait]
impl Persistence for MemoryPersistence {
    async fn create_lockout(&self, lockout: LockoutRecord) -> Result<(), CollaboratorError> {
        let mut lockouts = self.lockouts.write().await;
        lockouts.retain(|existing| {
            !(existing.character == lockout.character
                && existing.definition_id == lockout.definition_id
                && existing.difficulty == lockout.difficulty
                && existing.boss_id == lockout.boss_id)
        });
        lockouts.push(lockout);
        Ok(())
    }

    async fn lockouts_for(
        &self,
        character: CharacterId,
    ) -> Result<Vec<LockoutRecord>, CollaboratorError> {
        let lockouts = self.lockouts.read().await;
        Ok(lockouts
            .iter()
            .filter(|l| l.character == character)
            .cloned()
            .collect())
    }

    async fn expire_lockouts(&self, now: DateTime<Utc>) -> Result<usize, CollaboratorError> {
        if self.fail_lockout_expiry.load(Ordering::Acquire) {
            return Err(CollaboratorError::Persistence(
                "lockout store unavailable".to_string(),
            ));
        }
        let mut lockouts = self.lockouts.write().await;
        let before = lockouts.len();
        lockouts.retain(|l| l.expires_at > now);
        Ok(before - lockouts.len())
    }

    async fn last_reset(&self, kind: ResetKind) -> Result<Option<NaiveDate>, CollaboratorError> {
        Ok(self.resets.get(&kind).map(|d| *d.value()))
    }

    async fn store_last_reset(
        &self,
        kind: ResetKind,
        date: NaiveDate,
    ) -> Result<(), CollaboratorError> {
        self.resets.insert(kind, date);
        Ok(())
    }

    async fn record_completion(&self, record: CompletionRecord) -> Result<(), CollaboratorError> {
        self.completions.write().await.push(record);
        Ok(())
    }

    async fn record_mythic_run(&self, record: MythicRunRecord) -> Result<(), CollaboratorError> {
        self.mythic_runs.write().await.push(record);
        Ok(())
    }

    async fn rating(
        &self,
        team: TeamId,
        bracket: Bracket,
    ) -> Result<Option<RatingRecord>, CollaboratorError> {
        Ok(self.rating_of(team, bracket))
    }

    async fn save_rating(&self, record: RatingRecord) -> Result<(), CollaboratorError> {
        self.insert_rating(record);
        Ok(())
    }

    async fn ratings_in_bracket(
        &self,
        bracket: Bracket,
    ) -> Result<Vec<RatingRecord>, CollaboratorError> {
        if self.failing_brackets.contains(&bracket) {
            return Err(CollaboratorError::Persistence(format!(
                "rating shard for {bracket} unavailable"
            )));
        }
        let mut records: Vec<RatingRecord> = self
            .ratings
            .iter()
            .filter(|entry| entry.key().1 == bracket)
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|r| r.team_id);
        Ok(records)
    }

    async fn record_match(&self, record: MatchRecord) -> Result<(), CollaboratorError> {
        self.matches.write().await.push(record);
        Ok(())
    }

    async fn award_currency(&self, reward: CurrencyReward) -> Result<(), CollaboratorError> {
        self.rewards.write().await.push(reward);
        Ok(())
    }

    async fn record_season_result(
        &self,
        record: SeasonResultRecord,
    ) -> Result<(), CollaboratorError> {
        self.season_results.write().await.push(record);
        Ok(())
    }

    async fn season_finalized(
        &self,
        season_id: u32,
        bracket: Bracket,
    ) -> Result<bool, CollaboratorError> {
        Ok(self.finalized.contains(&(season_id, bracket)))
    }

    async fn mark_season_finalized(
        &self,
        season_id: u32,
        bracket: Bracket,
    ) -> Result<(), CollaboratorError> {
        self.finalized.insert((season_id, bracket));
        Ok(())
    }
}

/// A message captured by [`RecordingBroadcaster`]. `recipients` is `None` for
/// global sends.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub recipients: Option<Vec<CharacterId>>,
    pub message: OutboundMessage,
}

/// Broadcaster that keeps every message for later inspection.
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    sent: RwLock<Vec<SentMessage>>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<SentMessage> {
        self.sent.read().await.clone()
    }

    /// Messages matching `predicate`, in send order.
    pub async fn matching(
        &self,
        predicate: impl Fn(&OutboundMessage) -> bool,
    ) -> Vec<SentMessage> {
        self.sent
            .read()
            .await
            .iter()
            .filter(|m| predicate(&m.message))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl Broadcaster for RecordingBroadcaster {
    async fn send(
        &self,
        recipients: &[CharacterId],
        message: OutboundMessage,
    ) -> Result<(), CollaboratorError> {
        self.sent.write().await.push(SentMessage {
            recipients: Some(recipients.to_vec()),
            message,
        });
        Ok(())
    }

    async fn send_global(&self, message: OutboundMessage) -> Result<(), CollaboratorError> {
        self.sent.write().await.push(SentMessage {
            recipients: None,
            message,
        });
        Ok(())
    }
}

/// Broadcaster that only traces the JSON payload that would have been sent.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingBroadcaster;

impl LoggingBroadcaster {
    pub fn encode(message: &OutboundMessage) -> Result<String, CollaboratorError> {
        serde_json::to_string(message).map_err(|e| CollaboratorError::Broadcast(e.to_string()))
    }
}

#[async_trait]
impl Broadcaster for LoggingBroadcaster {
    async fn send(
        &self,
        recipients: &[CharacterId],
        message: OutboundMessage,
    ) -> Result<(), CollaboratorError> {
        let payload = Self::encode(&message)?;
        debug!(recipients = recipients.len(), %payload, "📡 Outbound message");
        Ok(())
    }

    async fn send_global(&self, message: OutboundMessage) -> Result<(), CollaboratorError> {
        let payload = Self::encode(&message)?;
        debug!(%payload, "📡 Outbound global message");
        Ok(())
    }
}

/// Creature spawner that hands out sequential GUIDs and tracks live creatures.
#[derive(Debug, Default)]
pub struct RecordingSpawner {
    next: AtomicU64,
    live: DashSet<(InstanceGuid, CreatureGuid)>,
    despawned: RwLock<HashSet<CreatureGuid>>,
}

impl RecordingSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self, instance: InstanceGuid) -> usize {
        self.live.iter().filter(|entry| entry.0 == instance).count()
    }

    pub async fn was_despawned(&self, creature: CreatureGuid) -> bool {
        self.despawned.read().await.contains(&creature)
    }
}

#[async_trait]
impl CreatureSpawner for RecordingSpawner {
    async fn spawn(
        &self,
        instance: InstanceGuid,
        _creature_id: u32,
    ) -> Result<CreatureGuid, CollaboratorError> {
        let guid = CreatureGuid(self.next.fetch_add(1, Ordering::Relaxed) + 1);
        self.live.insert((instance, guid));
        Ok(guid)
    }

    async fn despawn(
        &self,
        instance: InstanceGuid,
        creature: CreatureGuid,
    ) -> Result<(), CollaboratorError> {
        self.live.remove(&(instance, creature));
        self.despawned.write().await.insert(creature);
        Ok(())
    }
}

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self {
            millis: AtomicI64::new(at.timestamp_millis()),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.millis.store(at.timestamp_millis(), Ordering::Release);
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.millis
            .fetch_add(by.num_milliseconds(), Ordering::AcqRel);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.millis.load(Ordering::Acquire))
            .single()
            .unwrap_or_else(Utc::now)
    }
}

/// Concrete in-memory collaborators plus the type-erased bundle built from them.
#[derive(Clone)]
pub struct InMemoryCollaborators {
    pub persistence: Arc<MemoryPersistence>,
    pub broadcaster: Arc<RecordingBroadcaster>,
    pub spawner: Arc<RecordingSpawner>,
    pub clock: Arc<FixedClock>,
    pub templates: Arc<StaticTemplateStore>,
}

impl InMemoryCollaborators {
    pub fn new(templates: StaticTemplateStore, now: DateTime<Utc>) -> Self {
        Self {
            persistence: Arc::new(MemoryPersistence::new()),
            broadcaster: Arc::new(RecordingBroadcaster::new()),
            spawner: Arc::new(RecordingSpawner::new()),
            clock: Arc::new(FixedClock::new(now)),
            templates: Arc::new(templates),
        }
    }

    pub fn bundle(&self) -> Collaborators {
        let templates: Arc<dyn TemplateStore> = self.templates.clone();
        Collaborators {
            persistence: self.persistence.clone(),
            broadcaster: self.broadcaster.clone(),
            spawner: self.spawner.clone(),
            templates,
            clock: self.clock.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{BossId, DefinitionId};
    use crate::templates::Difficulty;

    fn lockout(character: u64, expires_at: DateTime<Utc>) -> LockoutRecord {
        LockoutRecord {
            character: CharacterId(character),
            definition_id: DefinitionId(1),
            difficulty: Difficulty::Veteran,
            boss_id: BossId(1),
            expires_at,
        }
    }

    #[tokio::test]
    async fn expire_removes_only_elapsed_lockouts() {
        let persistence = MemoryPersistence::new();
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        persistence
            .create_lockout(lockout(1, now - chrono::Duration::hours(1)))
            .await
            .unwrap();
        persistence
            .create_lockout(lockout(2, now + chrono::Duration::hours(1)))
            .await
            .unwrap();

        assert_eq!(persistence.expire_lockouts(now).await.unwrap(), 1);
        let remaining = persistence.all_lockouts().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].character, CharacterId(2));
    }

    #[tokio::test]
    async fn duplicate_lockout_replaces_previous() {
        let persistence = MemoryPersistence::new();
        let now = Utc::now();
        persistence.create_lockout(lockout(1, now)).await.unwrap();
        persistence
            .create_lockout(lockout(1, now + chrono::Duration::days(1)))
            .await
            .unwrap();
        assert_eq!(persistence.lockouts_for(CharacterId(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_bracket_only_affects_that_bracket() {
        let persistence = MemoryPersistence::new();
        persistence.insert_rating(RatingRecord::new(TeamId(1), Bracket::TwoVsTwo, 1500));
        persistence.insert_rating(RatingRecord::new(TeamId(2), Bracket::ThreeVsThree, 1600));
        persistence.fail_bracket(Bracket::TwoVsTwo);

        assert!(persistence.ratings_in_bracket(Bracket::TwoVsTwo).await.is_err());
        let three = persistence
            .ratings_in_bracket(Bracket::ThreeVsThree)
            .await
            .unwrap();
        assert_eq!(three.len(), 1);
    }

    #[test]
    fn fixed_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        clock.advance(chrono::Duration::minutes(90));
        assert_eq!(clock.now(), start + chrono::Duration::minutes(90));
    }

    #[test]
    fn logging_broadcaster_encodes_tagged_json() {
        let payload = LoggingBroadcaster::encode(&OutboundMessage::QueueTimedOut { team: TeamId(7) }).unwrap();
        assert_eq!(payload, r#"{"type":"queue_timed_out","team":7}"#);
    }
}
