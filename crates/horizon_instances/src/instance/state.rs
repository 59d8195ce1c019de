//! Instance bookkeeping: roster, boss slots, counters and lifecycle.
//!
//! Everything here is synchronous; the actor wraps it with encounter spawning
//! and collaborator calls.

use crate::encounter::EncounterHandle;
use crate::error::InstanceError;
use crate::mythic::{trash_percent, Affix, MythicConfig, MythicTimer, MythicTimerView};
use crate::respawn::{RespawnPolicy, RespawnTracker};
use horizon_contracts::{
    ActorId, BossId, CharacterId, DefinitionId, Difficulty, GroupId, InstanceDefinition,
    InstanceGuid, InstanceKind,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Initializing,
    Waiting,
    Active,
    BossEngaged,
    Completed,
    Resetting,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LootMode {
    FreeForAll,
    RoundRobin,
    #[default]
    NeedBeforeGreed,
    MasterLoot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Tank,
    Healer,
    Damage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerInfo {
    pub character: CharacterId,
    pub role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub role: Role,
    pub alive: bool,
    pub inside: bool,
}

/// Parameters for a new instance, supplied by group formation.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceLaunch {
    pub definition_id: DefinitionId,
    pub difficulty: Difficulty,
    pub group: GroupId,
    pub leader: CharacterId,
    pub mythic_level: u8,
    pub affixes: Vec<Affix>,
    pub loot_mode: LootMode,
}

impl InstanceLaunch {
    pub fn new(definition_id: DefinitionId, difficulty: Difficulty, group: GroupId, leader: CharacterId) -> Self {
        Self {
            definition_id,
            difficulty,
            group,
            leader,
            mythic_level: 0,
            affixes: Vec::new(),
            loot_mode: LootMode::default(),
        }
    }

    pub fn mythic(mut self, level: u8, affixes: Vec<Affix>) -> Self {
        self.mythic_level = level;
        self.affixes = affixes;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeathOutcome {
    Died,
    /// Everyone inside was dead; these bosses were told to reset
    Wipe { bosses: Vec<BossId> },
}

pub(crate) enum BossSlot {
    Engaged(EncounterHandle),
    Defeated,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstanceSnapshot {
    pub guid: InstanceGuid,
    pub definition_id: DefinitionId,
    pub name: String,
    pub zone_id: u32,
    pub difficulty: Difficulty,
    pub group: GroupId,
    pub leader: CharacterId,
    pub status: InstanceStatus,
    pub loot_mode: LootMode,
    pub mythic_level: u8,
    pub affixes: Vec<Affix>,
    pub players: Vec<(CharacterId, RosterEntry)>,
    pub engaged: Vec<BossId>,
    pub defeated: Vec<BossId>,
    pub trash_kills: u32,
    pub trash_required: u32,
    pub trash_percent: f64,
    pub deaths: u32,
    pub started: bool,
}

pub(crate) struct InstanceState {
    pub guid: InstanceGuid,
    pub definition: Arc<InstanceDefinition>,
    pub difficulty: Difficulty,
    pub group: GroupId,
    pub leader: CharacterId,
    pub mythic_level: u8,
    pub affixes: Vec<Affix>,
    pub loot_mode: LootMode,
    pub status: InstanceStatus,
    roster: BTreeMap<CharacterId, RosterEntry>,
    bosses: BTreeMap<BossId, BossSlot>,
    trash_kills: u32,
    deaths: u32,
    started_at: Option<Instant>,
    idle_since: Option<Instant>,
    mythic: Option<MythicTimer>,
    respawn: BTreeMap<CharacterId, RespawnTracker>,
    respawn_policy: RespawnPolicy,
}

impl InstanceState {
    pub fn new(
        guid: InstanceGuid,
        launch: InstanceLaunch,
        definition: Arc<InstanceDefinition>,
        mythic_config: MythicConfig,
        respawn_policy: RespawnPolicy,
        now: Instant,
    ) -> Self {
        let mythic = (launch.difficulty == Difficulty::MythicPlus).then(|| {
            MythicTimer::new(
                launch.mythic_level,
                Duration::from_secs(definition.mythic_time_limit_secs),
                mythic_config,
            )
        });
        Self {
            guid,
            definition,
            difficulty: launch.difficulty,
            group: launch.group,
            leader: launch.leader,
            mythic_level: launch.mythic_level,
            affixes: launch.affixes,
            loot_mode: launch.loot_mode,
            status: InstanceStatus::Initializing,
            roster: BTreeMap::new(),
            bosses: BTreeMap::new(),
            trash_kills: 0,
            deaths: 0,
            started_at: None,
            idle_since: Some(now),
            mythic,
            respawn: BTreeMap::new(),
            respawn_policy,
        }
    }

    pub fn mark_ready(&mut self) {
        if self.status == InstanceStatus::Initializing {
            self.status = InstanceStatus::Waiting;
        }
    }

    pub fn idle_since(&self) -> Option<Instant> {
        self.idle_since
    }

    pub fn members(&self) -> Vec<CharacterId> {
        self.roster.keys().copied().collect()
    }

    pub fn inside_members(&self) -> Vec<CharacterId> {
        self.roster
            .iter()
            .filter(|(_, e)| e.inside)
            .map(|(c, _)| *c)
            .collect()
    }

    pub fn member_count(&self) -> usize {
        self.roster.len()
    }

    fn require_member(&self, character: CharacterId) -> Result<(), InstanceError> {
        if self.roster.contains_key(&character) {
            Ok(())
        } else {
            Err(InstanceError::NotMember(character))
        }
    }

    fn require_leader(&self, requester: CharacterId) -> Result<(), InstanceError> {
        if requester == self.leader {
            Ok(())
        } else {
            Err(InstanceError::NotLeader)
        }
    }

    fn refresh_idle(&mut self, now: Instant) {
        if self.roster.values().any(|e| e.inside) {
            self.idle_since = None;
        } else if self.idle_since.is_none() {
            self.idle_since = Some(now);
        }
    }

    pub fn add_player(&mut self, info: PlayerInfo) -> Result<(), InstanceError> {
        if self.roster.contains_key(&info.character) {
            return Err(InstanceError::AlreadyMember(info.character));
        }
        let capacity = self.definition.max_players;
        if self.roster.len() >= capacity {
            return Err(InstanceError::Full(capacity));
        }
        self.roster.insert(
            info.character,
            RosterEntry {
                role: info.role,
                alive: true,
                inside: false,
            },
        );
        Ok(())
    }

    /// Removes a member. Returns the new leader when the leader left and
    /// someone was promoted.
    pub fn remove_player(&mut self, character: CharacterId, now: Instant) -> Result<Option<CharacterId>, InstanceError> {
        if self.roster.remove(&character).is_none() {
            return Err(InstanceError::NotMember(character));
        }
        self.respawn.remove(&character);
        self.refresh_idle(now);

        if character != self.leader {
            return Ok(None);
        }
        // lowest remaining character id takes over
        match self.roster.keys().next().copied() {
            Some(next) => {
                self.leader = next;
                Ok(Some(next))
            }
            None => Ok(None),
        }
    }

    /// Marks a member as inside the zone. The first entry starts the instance.
    pub fn player_entered(&mut self, character: CharacterId, now: Instant) -> Result<bool, InstanceError> {
        let entry = self
            .roster
            .get_mut(&character)
            .ok_or(InstanceError::NotMember(character))?;
        entry.inside = true;
        self.idle_since = None;

        if self.status == InstanceStatus::Waiting {
            self.status = InstanceStatus::Active;
            self.started_at = Some(now);
            return Ok(true);
        }
        Ok(false)
    }

    pub fn player_left(&mut self, character: CharacterId, now: Instant) -> Result<(), InstanceError> {
        let entry = self
            .roster
            .get_mut(&character)
            .ok_or(InstanceError::NotMember(character))?;
        entry.inside = false;
        self.refresh_idle(now);
        Ok(())
    }

    /// Records a death and reports whether everyone inside is now dead.
    pub fn player_died(&mut self, character: CharacterId, now: Instant) -> Result<bool, InstanceError> {
        let entry = self
            .roster
            .get_mut(&character)
            .ok_or(InstanceError::NotMember(character))?;
        if !entry.alive {
            return Ok(false);
        }
        entry.alive = false;
        self.deaths += 1;
        self.respawn
            .entry(character)
            .or_default()
            .record_death(now, &self.respawn_policy);

        let mut inside = self.roster.values().filter(|e| e.inside).peekable();
        let wiped = inside.peek().is_some() && inside.all(|e| !e.alive);
        Ok(wiped)
    }

    pub fn player_resurrected(&mut self, character: CharacterId) -> Result<(), InstanceError> {
        let entry = self
            .roster
            .get_mut(&character)
            .ok_or(InstanceError::NotMember(character))?;
        entry.alive = true;
        Ok(())
    }

    pub fn respawn_remaining(&self, character: CharacterId, now: Instant) -> Result<Duration, InstanceError> {
        self.require_member(character)?;
        Ok(self
            .respawn
            .get(&character)
            .map(|t| t.remaining(now, &self.respawn_policy))
            .unwrap_or(Duration::ZERO))
    }

    /// Drops every engaged boss and revives everyone. Returns the dropped
    /// handles so the caller can tell them to wipe.
    pub fn apply_wipe(&mut self) -> Vec<EncounterHandle> {
        let engaged: Vec<BossId> = self
            .bosses
            .iter()
            .filter(|(_, slot)| matches!(slot, BossSlot::Engaged(_)))
            .map(|(id, _)| *id)
            .collect();

        let mut handles = Vec::with_capacity(engaged.len());
        for boss in engaged {
            if let Some(BossSlot::Engaged(handle)) = self.bosses.remove(&boss) {
                handles.push(handle);
            }
        }
        for entry in self.roster.values_mut() {
            entry.alive = true;
        }
        self.recompute_status();
        handles
    }

    /// Checks whether `boss` may be engaged. Returns the live handle when it
    /// already is.
    pub fn check_engage(&mut self, boss: BossId) -> Result<Option<EncounterHandle>, InstanceError> {
        match self.status {
            InstanceStatus::Active | InstanceStatus::BossEngaged => {}
            other => return Err(InstanceError::InvalidState(other)),
        }
        match self.bosses.get(&boss) {
            Some(BossSlot::Defeated) => Err(InstanceError::BossAlreadyDefeated(boss)),
            Some(BossSlot::Engaged(handle)) if handle.is_alive() => Ok(Some(handle.clone())),
            Some(BossSlot::Engaged(_)) => {
                self.bosses.remove(&boss);
                self.recompute_status();
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub fn insert_engaged(&mut self, boss: BossId, handle: EncounterHandle) {
        self.bosses.insert(boss, BossSlot::Engaged(handle));
        self.recompute_status();
    }

    fn engaged_by(&self, boss: BossId, actor: ActorId) -> bool {
        matches!(self.bosses.get(&boss), Some(BossSlot::Engaged(h)) if h.actor_id() == actor)
    }

    /// Marks a boss defeated if the report comes from its current encounter.
    pub fn boss_defeated(&mut self, boss: BossId, actor: ActorId) -> bool {
        if !self.engaged_by(boss, actor) {
            return false;
        }
        self.bosses.insert(boss, BossSlot::Defeated);
        self.recompute_status();
        true
    }

    /// Drops a wiped or lost boss so it can be engaged again.
    pub fn boss_released(&mut self, boss: BossId, actor: ActorId) -> bool {
        if !self.engaged_by(boss, actor) {
            return false;
        }
        self.bosses.remove(&boss);
        self.recompute_status();
        true
    }

    pub fn engaged_bosses(&self) -> Vec<BossId> {
        self.bosses
            .iter()
            .filter(|(_, s)| matches!(s, BossSlot::Engaged(_)))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn engaged_handles(&self) -> Vec<EncounterHandle> {
        self.bosses
            .values()
            .filter_map(|s| match s {
                BossSlot::Engaged(h) => Some(h.clone()),
                BossSlot::Defeated => None,
            })
            .collect()
    }

    pub fn defeated_bosses(&self) -> Vec<BossId> {
        self.bosses
            .iter()
            .filter(|(_, s)| matches!(s, BossSlot::Defeated))
            .map(|(id, _)| *id)
            .collect()
    }

    fn recompute_status(&mut self) {
        let engaged = self.bosses.values().any(|s| matches!(s, BossSlot::Engaged(_)));
        self.status = match self.status {
            InstanceStatus::Active if engaged => InstanceStatus::BossEngaged,
            InstanceStatus::BossEngaged if !engaged => InstanceStatus::Active,
            other => other,
        };
    }

    pub fn record_trash(&mut self, count: u32) -> u32 {
        self.trash_kills = self.trash_kills.saturating_add(count);
        self.trash_kills
    }

    pub fn trash_percent(&self) -> f64 {
        trash_percent(self.trash_kills, self.definition.trash_requirement)
    }

    /// Every known boss defeated, plus full trash on Mythic+.
    pub fn is_complete(&self) -> bool {
        let known: BTreeSet<BossId> = self
            .definition
            .bosses
            .iter()
            .map(|b| b.boss_id)
            .chain(self.bosses.keys().copied())
            .collect();
        if known.is_empty() {
            return false;
        }
        let all_defeated = known
            .iter()
            .all(|id| matches!(self.bosses.get(id), Some(BossSlot::Defeated)));
        let trash_done = self.difficulty != Difficulty::MythicPlus || self.trash_percent() >= 100.0;
        all_defeated && trash_done
    }

    pub fn mark_completed(&mut self, now: Instant) {
        self.status = InstanceStatus::Completed;
        if let Some(timer) = self.mythic.as_mut() {
            timer.finish(now);
        }
    }

    pub fn earns_lockout(&self) -> bool {
        self.difficulty != Difficulty::Normal || self.definition.kind == InstanceKind::Raid
    }

    pub fn deaths(&self) -> u32 {
        self.deaths
    }

    pub fn started_at(&self) -> Option<Instant> {
        self.started_at
    }

    pub fn start_mythic_timer(&mut self, now: Instant) -> Result<MythicTimerView, InstanceError> {
        let timer = self.mythic.as_mut().ok_or(InstanceError::NotMythic)?;
        timer.start(now);
        Ok(timer.view(now, self.deaths, self.trash_kills, self.definition.trash_requirement))
    }

    pub fn mythic_view(&self, now: Instant) -> Option<MythicTimerView> {
        self.mythic.as_ref().map(|timer| {
            timer.view(now, self.deaths, self.trash_kills, self.definition.trash_requirement)
        })
    }

    pub fn set_loot_mode(&mut self, requester: CharacterId, mode: LootMode) -> Result<(), InstanceError> {
        self.require_leader(requester)?;
        self.loot_mode = mode;
        Ok(())
    }

    pub fn set_leader(&mut self, requester: CharacterId, new_leader: CharacterId) -> Result<(), InstanceError> {
        self.require_leader(requester)?;
        self.require_member(new_leader)?;
        self.leader = new_leader;
        Ok(())
    }

    /// Soft reset: clears progress and sends everyone back outside.
    pub fn reset(&mut self, requester: CharacterId, now: Instant) -> Result<(), InstanceError> {
        self.require_leader(requester)?;
        if self.bosses.values().any(|s| matches!(s, BossSlot::Engaged(_))) {
            return Err(InstanceError::BossEngaged);
        }
        if self.bosses.is_empty() {
            return Err(InstanceError::NothingToReset);
        }

        self.status = InstanceStatus::Resetting;
        self.bosses.clear();
        self.trash_kills = 0;
        self.deaths = 0;
        self.started_at = None;
        self.respawn.clear();
        if let Some(timer) = self.mythic.as_mut() {
            timer.reset();
        }
        for entry in self.roster.values_mut() {
            entry.alive = true;
            entry.inside = false;
        }
        self.refresh_idle(now);
        self.status = InstanceStatus::Waiting;
        Ok(())
    }

    pub fn snapshot(&self) -> InstanceSnapshot {
        InstanceSnapshot {
            guid: self.guid,
            definition_id: self.definition.id,
            name: self.definition.name.clone(),
            zone_id: self.definition.zone_id,
            difficulty: self.difficulty,
            group: self.group,
            leader: self.leader,
            status: self.status,
            loot_mode: self.loot_mode,
            mythic_level: self.mythic_level,
            affixes: self.affixes.clone(),
            players: self.roster.iter().map(|(c, e)| (*c, *e)).collect(),
            engaged: self.engaged_bosses(),
            defeated: self.defeated_bosses(),
            trash_kills: self.trash_kills,
            trash_required: self.definition.trash_requirement,
            trash_percent: self.trash_percent(),
            deaths: self.deaths,
            started: self.started_at.is_some(),
        }
    }
}
