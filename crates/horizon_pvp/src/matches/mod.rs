//! # Match Engine
//!
//! Every PvP match runs the same lifecycle actor:
//!
//! ```text
//! preparation ──(timer)──▶ active ──(victory | timer)──▶ ending ──(timer)──▶ complete ──(cleanup)──▶ exit
//! ```
//!
//! What scores, what wins and what a player can interact with is supplied by
//! a [`MatchRules`] implementation:
//!
//! * [`BattlegroundRules`] - control points and resource nodes, score limit
//! * [`WarplotRules`] - destructible generators, war coins and defenses
//! * [`ArenaRules`] - elimination, rated
//!
//! Rules are plain synchronous state; the actor owns timers, broadcasts and
//! persistence.

mod actor;
mod arena;
mod battleground;
mod core;
mod warplot;

pub use self::core::{
    MatchCore, MatchPhase, ObjectiveBoard, ObjectiveView, Participant, PerSide, PlayerStats,
    Scoreboard, Victory, VictoryReason,
};
pub use actor::{MatchEvent, MatchHandle, MatchSnapshot};
pub(crate) use actor::spawn_match;
pub use arena::ArenaRules;
pub use battleground::BattlegroundRules;
pub use warplot::{GeneratorView, WarplotRules};

use crate::error::MatchError;
use crate::queue::ArenaTeam;
use horizon_contracts::{Bracket, CharacterId, Currency, Side};
use serde::{Deserialize, Serialize};

/// Player interactions beyond kills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MatchAction {
    InteractObjective { objective_id: u32 },
    CaptureResource { node_id: u32 },
    DamageGenerator { generator_id: u32, amount: u64 },
    InstallDefense { defense_id: u32, slot: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Captured { objective_id: u32, side: Side },
    AlreadyHeld { objective_id: u32 },
    GeneratorDamaged { generator_id: u32, health: u64 },
    GeneratorDestroyed { generator_id: u32 },
    DefenseInstalled { defense_id: u32, slot: u32, coins_left: u32 },
}

/// Per-match currency payout for players who saw the match through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchRewards {
    pub currency: Currency,
    pub win: u32,
    pub loss: u32,
    pub draw: u32,
}

/// Rule-specific part of a match snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rules", rename_all = "snake_case")]
pub enum RulesView {
    Battleground {
        objectives: Vec<ObjectiveView>,
    },
    Warplot {
        generators: Vec<GeneratorView>,
        energy_nodes: Vec<ObjectiveView>,
        coins: PerSide<u32>,
        defenses: Vec<(Side, u32, u32)>,
    },
    Arena {
        bracket: Bracket,
        red: ArenaTeam,
        blue: ArenaTeam,
    },
}

/// Scoring and victory rules of one match kind.
pub trait MatchRules: Send + Sync + 'static {
    fn kind(&self) -> &'static str;

    fn bracket(&self) -> Bracket;

    /// Periodic score accrual while active.
    fn on_score_tick(&mut self, core: &mut MatchCore) -> Option<Victory>;

    /// Called after `core` has credited the kill.
    fn on_kill(&mut self, core: &mut MatchCore, killer: CharacterId, killer_side: Side, victim_side: Side) -> Option<Victory>;

    fn on_action(
        &mut self,
        core: &mut MatchCore,
        character: CharacterId,
        action: MatchAction,
    ) -> Result<(ActionOutcome, Option<Victory>), MatchError>;

    /// Called after a player of `side` deserted an active match.
    fn on_departure(&mut self, core: &mut MatchCore, side: Side) -> Option<Victory> {
        core.members(side)
            .is_empty()
            .then(|| Victory::side(side.opponent(), VictoryReason::Forfeit))
    }

    fn on_timeout(&self, core: &MatchCore) -> Victory {
        Victory::on_timeout(core)
    }

    /// Teams whose ratings the result moves.
    fn rated_teams(&self) -> Option<(&ArenaTeam, &ArenaTeam)> {
        None
    }

    fn rewards(&self) -> Option<MatchRewards> {
        None
    }

    fn view(&self) -> RulesView;
}
