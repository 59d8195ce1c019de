use super::{
    ActionOutcome, MatchAction, MatchCore, MatchRewards, MatchRules, ObjectiveBoard, PerSide,
    RulesView, Victory, VictoryReason,
};
use crate::error::MatchError;
use horizon_contracts::{Bracket, CharacterId, Currency, ObjectiveKind, Side, WarplotTemplate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratorView {
    pub id: u32,
    pub side: Side,
    pub health: u64,
    pub max_health: u64,
}

/// Guild-vs-guild warplot. Each side defends its generators; destroying every
/// enemy generator wins outright. War coins accrue per tick and per kill and
/// pay for defenses installed into plug slots. Energy nodes score while held.
///
/// Generators are numbered from 1: red owns `1..=n`, blue `n+1..=2n`.
#[derive(Debug)]
pub struct WarplotRules {
    template: Arc<WarplotTemplate>,
    generators: Vec<GeneratorView>,
    energy_nodes: ObjectiveBoard,
    coins: PerSide<u32>,
    plugs: BTreeMap<(Side, u32), u32>,
}

impl WarplotRules {
    pub fn new(template: Arc<WarplotTemplate>) -> Self {
        let per_side = template.generators_per_side;
        let generators = (1..=per_side * 2)
            .map(|id| GeneratorView {
                id,
                side: if id <= per_side { Side::Red } else { Side::Blue },
                health: template.generator_health,
                max_health: template.generator_health,
            })
            .collect();
        let energy_nodes = ObjectiveBoard::new(&template.energy_nodes);
        Self {
            template,
            generators,
            energy_nodes,
            coins: PerSide::default(),
            plugs: BTreeMap::new(),
        }
    }

    pub fn coins(&self, side: Side) -> u32 {
        *self.coins.get(side)
    }

    pub fn generator(&self, id: u32) -> Option<&GeneratorView> {
        self.generators.iter().find(|g| g.id == id)
    }

    fn generators_left(&self, side: Side) -> usize {
        self.generators
            .iter()
            .filter(|g| g.side == side && g.health > 0)
            .count()
    }

    fn damage_generator(
        &mut self,
        core: &mut MatchCore,
        character: CharacterId,
        generator_id: u32,
        amount: u64,
    ) -> Result<(ActionOutcome, Option<Victory>), MatchError> {
        let attacker = core.side_of(character)?;
        let generator = self
            .generators
            .iter_mut()
            .find(|g| g.id == generator_id)
            .ok_or(MatchError::UnknownGenerator(generator_id))?;
        if generator.side == attacker {
            return Err(MatchError::OwnGenerator(generator_id));
        }
        if generator.health == 0 {
            return Err(MatchError::GeneratorDestroyed(generator_id));
        }

        let applied = amount.min(generator.health);
        generator.health -= applied;
        let health = generator.health;
        let defender = generator.side;
        core.participant_mut(character)?.stats.damage += applied;

        if health > 0 {
            return Ok((ActionOutcome::GeneratorDamaged { generator_id, health }, None));
        }

        core.participant_mut(character)?.stats.objectives += 1;
        core.add_score(attacker, self.template.generator_points);
        let victory = if self.generators_left(defender) == 0 {
            Some(Victory::side(attacker, VictoryReason::Objective))
        } else {
            core.check_score_limit(self.template.score_limit)
        };
        Ok((ActionOutcome::GeneratorDestroyed { generator_id }, victory))
    }

    fn install_defense(
        &mut self,
        core: &MatchCore,
        character: CharacterId,
        defense_id: u32,
        slot: u32,
    ) -> Result<ActionOutcome, MatchError> {
        let side = core.side_of(character)?;
        if slot >= self.template.plug_slots {
            return Err(MatchError::InvalidSlot(slot));
        }
        if self.plugs.contains_key(&(side, slot)) {
            return Err(MatchError::SlotOccupied(slot));
        }
        let cost = self
            .template
            .defenses
            .iter()
            .find(|d| d.id == defense_id)
            .map(|d| d.cost)
            .ok_or(MatchError::UnknownDefense(defense_id))?;

        let coins = self.coins.get_mut(side);
        if *coins < cost {
            return Err(MatchError::InsufficientCoins {
                needed: cost,
                available: *coins,
            });
        }
        *coins -= cost;
        let coins_left = *coins;
        self.plugs.insert((side, slot), defense_id);
        Ok(ActionOutcome::DefenseInstalled {
            defense_id,
            slot,
            coins_left,
        })
    }
}

impl MatchRules for WarplotRules {
    fn kind(&self) -> &'static str {
        "warplot"
    }

    fn bracket(&self) -> Bracket {
        Bracket::Warplot
    }

    fn on_score_tick(&mut self, core: &mut MatchCore) -> Option<Victory> {
        for side in [Side::Red, Side::Blue] {
            let coins = self.coins.get_mut(side);
            *coins = coins.saturating_add(self.template.coins_per_tick);
            core.add_score(side, self.energy_nodes.held_points(side));
        }
        core.check_score_limit(self.template.score_limit)
    }

    fn on_kill(&mut self, core: &mut MatchCore, _killer: CharacterId, killer_side: Side, _victim_side: Side) -> Option<Victory> {
        let coins = self.coins.get_mut(killer_side);
        *coins = coins.saturating_add(self.template.coins_per_kill);
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
            MatchAction::DamageGenerator { generator_id, amount } => {
                self.damage_generator(core, character, generator_id, amount)
            }
            MatchAction::InstallDefense { defense_id, slot } => {
                let outcome = self.install_defense(core, character, defense_id, slot)?;
                Ok((outcome, None))
            }
            MatchAction::CaptureResource { node_id } => {
                let side = core.side_of(character)?;
                let Some(points) = self.energy_nodes.capture(node_id, side, ObjectiveKind::ResourceNode)? else {
                    return Ok((ActionOutcome::AlreadyHeld { objective_id: node_id }, None));
                };
                core.participant_mut(character)?.stats.objectives += 1;
                core.add_score(side, points);
                let victory = core.check_score_limit(self.template.score_limit);
                Ok((ActionOutcome::Captured { objective_id: node_id, side }, victory))
            }
            MatchAction::InteractObjective { .. } => Err(MatchError::Unsupported(self.kind())),
        }
    }

    fn rewards(&self) -> Option<MatchRewards> {
        Some(MatchRewards {
            currency: Currency::WarCoins,
            win: 500,
            loss: 150,
            draw: 250,
        })
    }

    fn view(&self) -> RulesView {
        RulesView::Warplot {
            generators: self.generators.clone(),
            energy_nodes: self.energy_nodes.view(),
            coins: self.coins,
            defenses: self
                .plugs
                .iter()
                .map(|(&(side, slot), &defense)| (side, slot, defense))
                .collect(),
        }
    }
}
