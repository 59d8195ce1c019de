//! # Instances
//!
//! One task per dungeon, raid or adventure copy. The instance owns its
//! roster and progress, starts boss encounters on demand and reacts to their
//! defeat / wipe reports.
//!
//! Lifecycle: `initializing → waiting → active ⇄ boss_engaged → completed`,
//! with a leader-initiated soft reset returning to `waiting`.

mod actor;
mod state;

pub(crate) use actor::spawn_instance;
pub use state::{
    DeathOutcome, InstanceLaunch, InstanceSnapshot, InstanceStatus, LootMode, PlayerInfo, Role,
    RosterEntry,
};

use crate::encounter::EncounterHandle;
use crate::error::InstanceError;
use crate::mythic::MythicTimerView;
use actor::InstanceCommand;
use horizon_contracts::{call, notify, ActorError, ActorId, BossId, CharacterId, InstanceGuid};
use std::time::Duration;
use tokio::sync::mpsc;

/// Cloneable reference to a running instance.
#[derive(Debug, Clone)]
pub struct InstanceHandle {
    guid: InstanceGuid,
    actor_id: ActorId,
    sender: mpsc::Sender<InstanceCommand>,
}

impl InstanceHandle {
    pub(crate) fn new(guid: InstanceGuid, actor_id: ActorId, sender: mpsc::Sender<InstanceCommand>) -> Self {
        Self { guid, actor_id, sender }
    }

    pub fn guid(&self) -> InstanceGuid {
        self.guid
    }

    pub fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    pub async fn add_player(&self, info: PlayerInfo) -> Result<(), InstanceError> {
        call(&self.sender, |reply| InstanceCommand::AddPlayer { info, reply }).await?
    }

    /// Returns the promoted leader if the removed player was leading.
    pub async fn remove_player(&self, character: CharacterId) -> Result<Option<CharacterId>, InstanceError> {
        call(&self.sender, |reply| InstanceCommand::RemovePlayer { character, reply }).await?
    }

    pub async fn player_entered(&self, character: CharacterId) -> Result<(), InstanceError> {
        call(&self.sender, |reply| InstanceCommand::PlayerEntered { character, reply }).await?
    }

    pub async fn player_left(&self, character: CharacterId) -> Result<(), InstanceError> {
        call(&self.sender, |reply| InstanceCommand::PlayerLeft { character, reply }).await?
    }

    pub async fn player_died(&self, character: CharacterId) -> Result<DeathOutcome, InstanceError> {
        call(&self.sender, |reply| InstanceCommand::PlayerDied { character, reply }).await?
    }

    pub async fn player_resurrected(&self, character: CharacterId) -> Result<(), InstanceError> {
        call(&self.sender, |reply| InstanceCommand::PlayerResurrected { character, reply }).await?
    }

    pub async fn respawn_remaining(&self, character: CharacterId) -> Result<Duration, InstanceError> {
        call(&self.sender, |reply| InstanceCommand::RespawnRemaining { character, reply }).await?
    }

    /// Engages `boss`, or returns the running encounter if already engaged.
    pub async fn engage_boss(&self, boss: BossId) -> Result<EncounterHandle, InstanceError> {
        call(&self.sender, |reply| InstanceCommand::EngageBoss { boss, reply }).await?
    }

    /// Adds trash kills and returns the new total.
    pub async fn record_trash_kills(&self, count: u32) -> Result<u32, InstanceError> {
        call(&self.sender, |reply| InstanceCommand::RecordTrashKills { count, reply }).await?
    }

    pub async fn start_mythic_timer(&self) -> Result<MythicTimerView, InstanceError> {
        call(&self.sender, |reply| InstanceCommand::StartMythicTimer { reply }).await?
    }

    pub async fn mythic_status(&self) -> Result<Option<MythicTimerView>, ActorError> {
        call(&self.sender, |reply| InstanceCommand::MythicStatus { reply }).await
    }

    pub async fn set_loot_mode(&self, requester: CharacterId, mode: LootMode) -> Result<(), InstanceError> {
        call(&self.sender, |reply| InstanceCommand::SetLootMode { requester, mode, reply }).await?
    }

    pub async fn set_leader(&self, requester: CharacterId, new_leader: CharacterId) -> Result<(), InstanceError> {
        call(&self.sender, |reply| InstanceCommand::SetLeader { requester, new_leader, reply }).await?
    }

    pub async fn reset(&self, requester: CharacterId) -> Result<(), InstanceError> {
        call(&self.sender, |reply| InstanceCommand::Reset { requester, reply }).await?
    }

    pub async fn snapshot(&self) -> Result<InstanceSnapshot, ActorError> {
        call(&self.sender, |reply| InstanceCommand::Snapshot { reply }).await
    }

    pub async fn stop(&self) -> Result<(), ActorError> {
        notify(&self.sender, InstanceCommand::Stop).await
    }

    #[cfg(test)]
    pub(crate) async fn crash(&self) -> Result<(), ActorError> {
        notify(&self.sender, InstanceCommand::Crash).await
    }
}
