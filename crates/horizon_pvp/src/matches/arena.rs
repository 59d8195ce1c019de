use super::{ActionOutcome, MatchAction, MatchCore, MatchRules, RulesView, Victory, VictoryReason};
use crate::error::MatchError;
use crate::queue::ArenaTeam;
use horizon_contracts::{Bracket, CharacterId, Side};

/// Rated elimination arena. A side loses once none of its players are alive
/// and still in the match. On timeout the side with more players standing
/// wins, then the side with more kills.
#[derive(Debug)]
pub struct ArenaRules {
    bracket: Bracket,
    red: ArenaTeam,
    blue: ArenaTeam,
}

impl ArenaRules {
    pub fn new(bracket: Bracket, red: ArenaTeam, blue: ArenaTeam) -> Self {
        Self { bracket, red, blue }
    }

    fn eliminated(core: &MatchCore, side: Side) -> Option<Victory> {
        (core.standing(side) == 0).then(|| Victory::side(side.opponent(), VictoryReason::Elimination))
    }
}

impl MatchRules for ArenaRules {
    fn kind(&self) -> &'static str {
        "arena"
    }

    fn bracket(&self) -> Bracket {
        self.bracket
    }

    fn on_score_tick(&mut self, _core: &mut MatchCore) -> Option<Victory> {
        None
    }

    fn on_kill(&mut self, core: &mut MatchCore, _killer: CharacterId, killer_side: Side, victim_side: Side) -> Option<Victory> {
        core.add_score(killer_side, 1);
        Self::eliminated(core, victim_side)
    }

    fn on_action(
        &mut self,
        _core: &mut MatchCore,
        _character: CharacterId,
        _action: MatchAction,
    ) -> Result<(ActionOutcome, Option<Victory>), MatchError> {
        Err(MatchError::Unsupported(self.kind()))
    }

    fn on_departure(&mut self, core: &mut MatchCore, side: Side) -> Option<Victory> {
        Self::eliminated(core, side)
    }

    fn on_timeout(&self, core: &MatchCore) -> Victory {
        let red = core.standing(Side::Red);
        let blue = core.standing(Side::Blue);
        let winner = match red.cmp(&blue) {
            std::cmp::Ordering::Greater => Some(Side::Red),
            std::cmp::Ordering::Less => Some(Side::Blue),
            std::cmp::Ordering::Equal => core.leading_side(),
        };
        Victory {
            winner,
            reason: VictoryReason::Timeout,
        }
    }

    fn rated_teams(&self) -> Option<(&ArenaTeam, &ArenaTeam)> {
        Some((&self.red, &self.blue))
    }

    fn view(&self) -> RulesView {
        RulesView::Arena {
            bracket: self.bracket,
            red: self.red.clone(),
            blue: self.blue.clone(),
        }
    }
}
