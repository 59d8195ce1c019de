use super::{ActionOutcome, MatchAction, MatchCore, MatchRewards, MatchRules, ObjectiveBoard, RulesView, Victory};
use crate::error::MatchError;
use horizon_contracts::{BattlegroundTemplate, Bracket, CharacterId, Currency, ObjectiveKind, Side};
use std::sync::Arc;

/// Objective battleground: control points are taken by interacting with
/// them, resource nodes by capturing them. Held objectives score every tick,
/// kills score immediately, first side to the score limit wins.
#[derive(Debug)]
pub struct BattlegroundRules {
    template: Arc<BattlegroundTemplate>,
    board: ObjectiveBoard,
}

impl BattlegroundRules {
    pub fn new(template: Arc<BattlegroundTemplate>) -> Self {
        let board = ObjectiveBoard::new(&template.objectives);
        Self { template, board }
    }

    pub fn template(&self) -> &BattlegroundTemplate {
        &self.template
    }

    fn capture(
        &mut self,
        core: &mut MatchCore,
        character: CharacterId,
        objective_id: u32,
        kind: ObjectiveKind,
    ) -> Result<(ActionOutcome, Option<Victory>), MatchError> {
        let side = core.side_of(character)?;
        let Some(points) = self.board.capture(objective_id, side, kind)? else {
            return Ok((ActionOutcome::AlreadyHeld { objective_id }, None));
        };
        core.participant_mut(character)?.stats.objectives += 1;
        core.add_score(side, points);
        let victory = core.check_score_limit(self.template.score_limit);
        Ok((ActionOutcome::Captured { objective_id, side }, victory))
    }
}

impl MatchRules for BattlegroundRules {
    fn kind(&self) -> &'static str {
        "battleground"
    }

    fn bracket(&self) -> Bracket {
        Bracket::Battleground
    }

    fn on_score_tick(&mut self, core: &mut MatchCore) -> Option<Victory> {
        for side in [Side::Red, Side::Blue] {
            core.add_score(side, self.board.held_points(side));
        }
        core.check_score_limit(self.template.score_limit)
    }

    fn on_kill(&mut self, core: &mut MatchCore, _killer: CharacterId, killer_side: Side, _victim_side: Side) -> Option<Victory> {
        core.add_score(killer_side, self.template.kill_points);
        core.check_score_limit(self.template.score_limit)
    }

    fn on_action(
        &mut self,
        core: &mut MatchCore,
        character: CharacterId,
        action: MatchAction,
    ) -> Result<(ActionOutcome, Option<Victory>), MatchError> {
        match action {
            MatchAction::InteractObjective { objective_id } => {
                self.capture(core, character, objective_id, ObjectiveKind::ControlPoint)
            }
            MatchAction::CaptureResource { node_id } => {
                self.capture(core, character, node_id, ObjectiveKind::ResourceNode)
            }
            _ => Err(MatchError::Unsupported(self.kind())),
        }
    }

    fn rewards(&self) -> Option<MatchRewards> {
        Some(MatchRewards {
            currency: Currency::Prestige,
            win: 200,
            loss: 50,
            draw: 100,
        })
    }

    fn view(&self) -> RulesView {
        RulesView::Battleground {
            objectives: self.board.view(),
        }
    }
}
