//! Rule-independent match state: phase, rosters, per-player stats, scores and
//! the objective board shared by the battleground and warplot rules.

use crate::error::MatchError;
use horizon_contracts::{
    CharacterId, MatchId, MatchRecord, ObjectiveKind, ObjectiveTemplate, ParticipantRecord, Side,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Match lifecycle. Phases only ever move forward, one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchPhase {
    Preparation,
    Active,
    Ending,
    Complete,
}

impl MatchPhase {
    pub fn next(self) -> Option<MatchPhase> {
        match self {
            MatchPhase::Preparation => Some(MatchPhase::Active),
            MatchPhase::Active => Some(MatchPhase::Ending),
            MatchPhase::Ending => Some(MatchPhase::Complete),
            MatchPhase::Complete => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchPhase::Preparation => "preparation",
            MatchPhase::Active => "active",
            MatchPhase::Ending => "ending",
            MatchPhase::Complete => "complete",
        }
    }
}

impl fmt::Display for MatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VictoryReason {
    ScoreLimit,
    /// Every enemy generator destroyed
    Objective,
    Elimination,
    /// Every player of one side left
    Forfeit,
    Timeout,
}

/// How a match was decided. `winner` is `None` on a draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Victory {
    pub winner: Option<Side>,
    pub reason: VictoryReason,
}

impl Victory {
    pub fn side(winner: Side, reason: VictoryReason) -> Self {
        Self {
            winner: Some(winner),
            reason,
        }
    }

    /// Higher score wins, exact tie is a draw.
    pub fn on_timeout(core: &MatchCore) -> Self {
        Self {
            winner: core.leading_side(),
            reason: VictoryReason::Timeout,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub kills: u32,
    pub deaths: u32,
    pub damage: u64,
    pub objectives: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub character: CharacterId,
    pub side: Side,
    pub stats: PlayerStats,
    pub alive: bool,
    pub deserted: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scoreboard {
    pub red: u32,
    pub blue: u32,
}

/// A pair of per-side values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerSide<T> {
    pub red: T,
    pub blue: T,
}

impl<T> PerSide<T> {
    pub fn get(&self, side: Side) -> &T {
        match side {
            Side::Red => &self.red,
            Side::Blue => &self.blue,
        }
    }

    pub fn get_mut(&mut self, side: Side) -> &mut T {
        match side {
            Side::Red => &mut self.red,
            Side::Blue => &mut self.blue,
        }
    }
}

#[derive(Debug)]
pub struct MatchCore {
    match_id: MatchId,
    kind: &'static str,
    phase: MatchPhase,
    participants: BTreeMap<CharacterId, Participant>,
    score: PerSide<u32>,
    victory: Option<Victory>,
    active_since: Option<Instant>,
    decided_at: Option<Instant>,
}

impl MatchCore {
    pub fn new(match_id: MatchId, kind: &'static str, red: &[CharacterId], blue: &[CharacterId]) -> Self {
        let participants = red
            .iter()
            .map(|&c| (c, Side::Red))
            .chain(blue.iter().map(|&c| (c, Side::Blue)))
            .map(|(character, side)| {
                let participant = Participant {
                    character,
                    side,
                    stats: PlayerStats::default(),
                    alive: true,
                    deserted: false,
                };
                (character, participant)
            })
            .collect();

        Self {
            match_id,
            kind,
            phase: MatchPhase::Preparation,
            participants,
            score: PerSide::default(),
            victory: None,
            active_since: None,
            decided_at: None,
        }
    }

    pub fn match_id(&self) -> MatchId {
        self.match_id
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn phase(&self) -> MatchPhase {
        self.phase
    }

    pub fn victory(&self) -> Option<Victory> {
        self.victory
    }

    /// Scoring and objective mutations are only accepted while active.
    pub fn require_active(&self) -> Result<(), MatchError> {
        if self.phase == MatchPhase::Active {
            Ok(())
        } else {
            Err(MatchError::NotActive(self.phase))
        }
    }

    /// Moves to the next phase and returns it.
    pub fn advance(&mut self, now: Instant) -> Option<MatchPhase> {
        let next = self.phase.next()?;
        match next {
            MatchPhase::Active => self.active_since = Some(now),
            MatchPhase::Ending => self.decided_at = Some(now),
            _ => {}
        }
        self.phase = next;
        Some(next)
    }

    /// Records the result and moves `active` to `ending`.
    pub fn decide(&mut self, victory: Victory, now: Instant) -> Result<(), MatchError> {
        self.require_active()?;
        self.victory = Some(victory);
        self.advance(now);
        Ok(())
    }

    pub fn participant(&self, character: CharacterId) -> Result<&Participant, MatchError> {
        self.participants
            .get(&character)
            .ok_or(MatchError::NotParticipant(character))
    }

    pub fn participant_mut(&mut self, character: CharacterId) -> Result<&mut Participant, MatchError> {
        self.participants
            .get_mut(&character)
            .ok_or(MatchError::NotParticipant(character))
    }

    /// A participant who has not deserted.
    pub fn active_participant(&self, character: CharacterId) -> Result<&Participant, MatchError> {
        let participant = self.participant(character)?;
        if participant.deserted {
            return Err(MatchError::Deserted(character));
        }
        Ok(participant)
    }

    pub fn side_of(&self, character: CharacterId) -> Result<Side, MatchError> {
        self.participant(character).map(|p| p.side)
    }

    pub fn participants(&self) -> impl Iterator<Item = &Participant> {
        self.participants.values()
    }

    /// Removes a player before the match starts.
    pub fn withdraw(&mut self, character: CharacterId) -> Result<Participant, MatchError> {
        self.participants
            .remove(&character)
            .ok_or(MatchError::NotParticipant(character))
    }

    /// Players of `side` still in the match.
    pub fn members(&self, side: Side) -> Vec<CharacterId> {
        self.participants
            .values()
            .filter(|p| p.side == side && !p.deserted)
            .map(|p| p.character)
            .collect()
    }

    /// Every player still in the match.
    pub fn everyone(&self) -> Vec<CharacterId> {
        self.participants
            .values()
            .filter(|p| !p.deserted)
            .map(|p| p.character)
            .collect()
    }

    /// Players of `side` alive and still in the match.
    pub fn standing(&self, side: Side) -> usize {
        self.participants
            .values()
            .filter(|p| p.side == side && p.alive && !p.deserted)
            .count()
    }

    pub fn add_score(&mut self, side: Side, points: u32) -> u32 {
        let score = self.score.get_mut(side);
        *score = score.saturating_add(points);
        *score
    }

    pub fn score(&self, side: Side) -> u32 {
        *self.score.get(side)
    }

    pub fn scoreboard(&self) -> Scoreboard {
        Scoreboard {
            red: self.score.red,
            blue: self.score.blue,
        }
    }

    /// Side with the strictly higher score.
    pub fn leading_side(&self) -> Option<Side> {
        match self.score.red.cmp(&self.score.blue) {
            std::cmp::Ordering::Greater => Some(Side::Red),
            std::cmp::Ordering::Less => Some(Side::Blue),
            std::cmp::Ordering::Equal => None,
        }
    }

    /// A victory once either side has reached `limit`.
    pub fn check_score_limit(&self, limit: u32) -> Option<Victory> {
        if limit == 0 || (self.score.red < limit && self.score.blue < limit) {
            return None;
        }
        Some(Victory {
            winner: self.leading_side(),
            reason: VictoryReason::ScoreLimit,
        })
    }

    /// Credits a kill between opposing players still in the match; returns
    /// the killer's and the victim's side.
    pub fn record_kill(&mut self, killer: CharacterId, victim: CharacterId) -> Result<(Side, Side), MatchError> {
        self.require_active()?;
        let killer_side = self.active_participant(killer)?.side;
        let victim_side = self.active_participant(victim)?.side;
        if killer == victim || killer_side == victim_side {
            return Err(MatchError::FriendlyKill { killer, victim });
        }
        let victim = self.participant_mut(victim)?;
        victim.stats.deaths += 1;
        victim.alive = false;
        self.participant_mut(killer)?.stats.kills += 1;
        Ok((killer_side, victim_side))
    }

    /// Time spent active, up to the decision when there is one.
    pub fn active_duration(&self, now: Instant) -> Duration {
        match self.active_since {
            Some(since) => self.decided_at.unwrap_or(now).saturating_duration_since(since),
            None => Duration::ZERO,
        }
    }

    pub fn to_record(&self, now: Instant) -> MatchRecord {
        MatchRecord {
            match_id: self.match_id,
            kind: self.kind.to_string(),
            winner: self.victory.and_then(|v| v.winner),
            red_score: self.score.red,
            blue_score: self.score.blue,
            duration_secs: self.active_duration(now).as_secs(),
            participants: self
                .participants
                .values()
                .map(|p| ParticipantRecord {
                    character: p.character,
                    side: p.side,
                    kills: p.stats.kills,
                    deaths: p.stats.deaths,
                    damage: p.stats.damage,
                    objectives: p.stats.objectives,
                    deserted: p.deserted,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveView {
    pub id: u32,
    pub name: String,
    pub kind: ObjectiveKind,
    pub owner: Option<Side>,
}

/// Capturable objectives and the points they are worth.
#[derive(Debug, Clone)]
pub struct ObjectiveBoard {
    objectives: Vec<(ObjectiveTemplate, Option<Side>)>,
}

impl ObjectiveBoard {
    pub fn new(templates: &[ObjectiveTemplate]) -> Self {
        Self {
            objectives: templates.iter().cloned().map(|t| (t, None)).collect(),
        }
    }

    /// Gives `objective_id` to `side`. Returns the capture points awarded, or
    /// `None` when the side already holds it.
    pub fn capture(&mut self, objective_id: u32, side: Side, kind: ObjectiveKind) -> Result<Option<u32>, MatchError> {
        let (template, owner) = self
            .objectives
            .iter_mut()
            .find(|(t, _)| t.id == objective_id)
            .ok_or(MatchError::UnknownObjective(objective_id))?;
        if template.kind != kind {
            return Err(MatchError::WrongObjectiveKind(objective_id));
        }
        if *owner == Some(side) {
            return Ok(None);
        }
        *owner = Some(side);
        Ok(Some(template.capture_points))
    }

    /// Points `side` earns per score tick from what it holds.
    pub fn held_points(&self, side: Side) -> u32 {
        self.objectives
            .iter()
            .filter(|(_, owner)| *owner == Some(side))
            .map(|(t, _)| t.points_per_tick)
            .sum()
    }

    pub fn owner(&self, objective_id: u32) -> Option<Side> {
        self.objectives
            .iter()
            .find(|(t, _)| t.id == objective_id)
            .and_then(|(_, owner)| *owner)
    }

    pub fn view(&self) -> Vec<ObjectiveView> {
        self.objectives
            .iter()
            .map(|(t, owner)| ObjectiveView {
                id: t.id,
                name: t.name.clone(),
                kind: t.kind,
                owner: *owner,
            })
            .collect()
    }
}
