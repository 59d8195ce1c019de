//! Pure boss-fight state.
//!
//! [`EncounterState`] never touches a collaborator. Every mutation returns the
//! [`EncounterSignal`]s it produced and the owning actor turns those into
//! broadcasts and creature calls. Time and randomness are passed in so the
//! whole state machine can be driven directly from tests.

use crate::config::EncounterConfig;
use crate::error::EncounterError;
use horizon_contracts::{
    ArmorSpec, BossId, BossTemplate, CharacterId, CreatureGuid, DamageModifiers, EffectTemplate,
    InstanceGuid, PhaseTemplate,
};
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterStatus {
    Initializing,
    Engaged,
    Defeated,
    Resetting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InterruptArmor {
    Finite { current: u32, max: u32 },
    Infinite,
}

impl From<ArmorSpec> for InterruptArmor {
    fn from(spec: ArmorSpec) -> Self {
        match spec {
            ArmorSpec::Finite(max) => InterruptArmor::Finite { current: max, max },
            ArmorSpec::Infinite => InterruptArmor::Infinite,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// Armor absorbed the interrupt
    Reduced { remaining: u32 },
    /// Armor hit zero, was restored to `restored` and the boss is vulnerable
    MomentOfOpportunity { restored: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct DamageOutcome {
    /// Damage actually removed from the boss after modifiers and clamping
    pub applied: u64,
    pub health: u64,
    pub max_health: u64,
    pub defeated: bool,
    pub phase: Option<String>,
}

/// Side effects produced by a state transition.
#[derive(Debug, Clone, PartialEq)]
pub enum EncounterSignal {
    Engaged { name: String, max_health: u64 },
    PhaseChanged { phase: String },
    Enraged,
    MomentOfOpportunity { duration: Duration },
    /// One effect of a fired ability, with damage already scaled
    Effect { ability_id: u32, effect: EffectTemplate },
    Despawn(Vec<CreatureGuid>),
    Defeated,
    Wiped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveAdd {
    pub guid: CreatureGuid,
    pub creature_id: u32,
    pub despawn_with_boss: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncounterSnapshot {
    pub instance: InstanceGuid,
    pub boss_id: BossId,
    pub name: String,
    pub status: EncounterStatus,
    pub health: u64,
    pub max_health: u64,
    pub health_percent: f64,
    pub phase: Option<String>,
    pub armor: InterruptArmor,
    pub vulnerability_pct: f64,
    pub outgoing_multiplier: f64,
    pub enraged: bool,
    pub adds: usize,
    pub buffs: usize,
    pub debuffs: usize,
}

/// Picks the phase for `health_percent`: the narrowest matching interval,
/// earliest in list order on a tie, `None` when nothing matches.
pub fn select_phase(phases: &[PhaseTemplate], health_percent: f64) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, phase) in phases.iter().enumerate() {
        if !phase.condition.holds(health_percent) {
            continue;
        }
        let width = phase.condition.width();
        match best {
            Some((_, best_width)) if best_width <= width => {}
            _ => best = Some((index, width)),
        }
    }
    best.map(|(index, _)| index)
}

fn scale(amount: u32, multiplier: f64) -> u32 {
    (f64::from(amount) * multiplier).round() as u32
}

pub struct EncounterState {
    instance: InstanceGuid,
    template: Arc<BossTemplate>,
    config: EncounterConfig,
    status: EncounterStatus,
    health: u64,
    max_health: u64,
    armor: InterruptArmor,
    phase: Option<usize>,
    /// Modifiers from affixes, the floor every reset returns to
    base_modifiers: DamageModifiers,
    modifiers: DamageModifiers,
    next_ready: HashMap<u32, Instant>,
    buffs: HashMap<u32, Instant>,
    debuffs: HashMap<(u32, CharacterId), Instant>,
    opportunity_until: Option<Instant>,
    enraged: bool,
    adds: Vec<ActiveAdd>,
    participants: Vec<CharacterId>,
}

impl EncounterState {
    pub fn new(
        instance: InstanceGuid,
        template: Arc<BossTemplate>,
        max_health: u64,
        base_modifiers: DamageModifiers,
        participants: Vec<CharacterId>,
        config: EncounterConfig,
    ) -> Self {
        let armor = InterruptArmor::from(template.interrupt_armor);
        Self {
            instance,
            template,
            config,
            status: EncounterStatus::Initializing,
            health: max_health,
            max_health,
            armor,
            phase: None,
            base_modifiers,
            modifiers: base_modifiers,
            next_ready: HashMap::new(),
            buffs: HashMap::new(),
            debuffs: HashMap::new(),
            opportunity_until: None,
            enraged: false,
            adds: Vec::new(),
            participants,
        }
    }

    pub fn boss_id(&self) -> BossId {
        self.template.id
    }

    pub fn template(&self) -> &BossTemplate {
        &self.template
    }

    pub fn status(&self) -> EncounterStatus {
        self.status
    }

    pub fn is_engaged(&self) -> bool {
        self.status == EncounterStatus::Engaged
    }

    pub fn is_enraged(&self) -> bool {
        self.enraged
    }

    pub fn health(&self) -> u64 {
        self.health
    }

    pub fn armor(&self) -> InterruptArmor {
        self.armor
    }

    pub fn participants(&self) -> &[CharacterId] {
        &self.participants
    }

    pub fn set_participants(&mut self, participants: Vec<CharacterId>) {
        self.participants = participants;
    }

    pub fn health_percent(&self) -> f64 {
        if self.max_health == 0 {
            return 0.0;
        }
        self.health as f64 * 100.0 / self.max_health as f64
    }

    pub fn phase_name(&self) -> Option<&str> {
        self.current_phase().map(|p| p.name.as_str())
    }

    fn current_phase(&self) -> Option<&PhaseTemplate> {
        self.phase.and_then(|i| self.template.phases.get(i))
    }

    fn vulnerability(&self, now: Instant) -> f64 {
        let opportunity = match self.opportunity_until {
            Some(until) if until > now => self.config.opportunity_vulnerability_pct,
            _ => 0.0,
        };
        self.modifiers.vulnerability_pct + opportunity
    }

    /// Multiplier on everything the boss deals, enrage included.
    pub fn outgoing_multiplier(&self) -> f64 {
        let enrage = if self.enraged {
            self.config.enrage_multiplier
        } else {
            1.0
        };
        self.modifiers.outgoing_multiplier * enrage
    }

    fn require_engaged(&self) -> Result<(), EncounterError> {
        match self.status {
            EncounterStatus::Engaged => Ok(()),
            EncounterStatus::Defeated => Err(EncounterError::AlreadyDefeated),
            _ => Err(EncounterError::NotEngaged),
        }
    }

    /// Starts the fight at full health in the phase matching 100%.
    pub fn engage(&mut self, now: Instant, rng: &mut impl Rng) -> Result<Vec<EncounterSignal>, EncounterError> {
        match self.status {
            EncounterStatus::Engaged => return Err(EncounterError::AlreadyEngaged),
            EncounterStatus::Defeated => return Err(EncounterError::AlreadyDefeated),
            EncounterStatus::Initializing | EncounterStatus::Resetting => {}
        }

        self.clear_fight_state();
        self.status = EncounterStatus::Engaged;

        let mut signals = vec![EncounterSignal::Engaged {
            name: self.template.name.clone(),
            max_health: self.max_health,
        }];
        self.update_phase(now, rng, &mut signals);
        Ok(signals)
    }

    fn clear_fight_state(&mut self) {
        self.health = self.max_health;
        self.armor = InterruptArmor::from(self.template.interrupt_armor);
        self.phase = None;
        self.modifiers = self.base_modifiers;
        self.next_ready.clear();
        self.buffs.clear();
        self.debuffs.clear();
        self.opportunity_until = None;
        self.enraged = false;
    }

    fn update_phase(&mut self, now: Instant, rng: &mut impl Rng, signals: &mut Vec<EncounterSignal>) {
        let selected = select_phase(&self.template.phases, self.health_percent());
        if selected == self.phase {
            return;
        }
        self.phase = selected;
        let Some(index) = selected else {
            return;
        };

        let template = Arc::clone(&self.template);
        let phase = &template.phases[index];
        self.modifiers.merge(&phase.modifiers);

        let max_stagger = self.config.max_initial_stagger.as_millis() as u64;
        for ability in &phase.abilities {
            let cap = ability.cooldown_ms.min(max_stagger);
            let stagger = if cap == 0 { 0 } else { rng.gen_range(0..=cap) };
            self.next_ready
                .insert(ability.id, now + Duration::from_millis(stagger));
        }

        signals.push(EncounterSignal::PhaseChanged {
            phase: phase.name.clone(),
        });
    }

    pub fn deal_damage(
        &mut self,
        amount: u64,
        now: Instant,
        rng: &mut impl Rng,
    ) -> Result<(DamageOutcome, Vec<EncounterSignal>), EncounterError> {
        self.require_engaged()?;

        let effective = (amount as f64 * (1.0 + self.vulnerability(now) / 100.0)).round() as u64;
        let applied = effective.min(self.health);
        self.health -= applied;

        let mut signals = Vec::new();
        if self.health == 0 {
            self.status = EncounterStatus::Defeated;
            let (doomed, kept): (Vec<ActiveAdd>, Vec<ActiveAdd>) = std::mem::take(&mut self.adds)
                .into_iter()
                .partition(|add| add.despawn_with_boss);
            self.adds = kept;
            if !doomed.is_empty() {
                signals.push(EncounterSignal::Despawn(doomed.iter().map(|a| a.guid).collect()));
            }
            signals.push(EncounterSignal::Defeated);
        } else {
            self.update_phase(now, rng, &mut signals);
        }

        let outcome = DamageOutcome {
            applied,
            health: self.health,
            max_health: self.max_health,
            defeated: self.status == EncounterStatus::Defeated,
            phase: self.phase_name().map(str::to_string),
        };
        Ok((outcome, signals))
    }

    pub fn interrupt(&mut self, now: Instant) -> Result<(InterruptOutcome, Vec<EncounterSignal>), EncounterError> {
        self.require_engaged()?;

        let InterruptArmor::Finite { current, max } = self.armor else {
            return Err(EncounterError::InterruptImmune);
        };
        if current == 0 {
            return Err(EncounterError::ArmorDepleted);
        }

        let remaining = current - 1;
        if remaining > 0 {
            self.armor = InterruptArmor::Finite { current: remaining, max };
            return Ok((InterruptOutcome::Reduced { remaining }, Vec::new()));
        }

        self.armor = InterruptArmor::Finite { current: max, max };
        self.opportunity_until = Some(now + self.config.opportunity_duration);
        Ok((
            InterruptOutcome::MomentOfOpportunity { restored: max },
            vec![EncounterSignal::MomentOfOpportunity {
                duration: self.config.opportunity_duration,
            }],
        ))
    }

    /// Expires timed effects and fires every ready ability of the current
    /// phase, in phase-definition order.
    pub fn tick(&mut self, now: Instant) -> Vec<EncounterSignal> {
        if !self.is_engaged() {
            return Vec::new();
        }

        self.buffs.retain(|_, until| *until > now);
        self.debuffs.retain(|_, until| *until > now);
        if matches!(self.opportunity_until, Some(until) if until <= now) {
            self.opportunity_until = None;
        }

        let Some(index) = self.phase else {
            return Vec::new();
        };
        let template = Arc::clone(&self.template);
        let multiplier = self.outgoing_multiplier();
        let mut signals = Vec::new();

        for ability in &template.phases[index].abilities {
            let ready = self.next_ready.get(&ability.id).is_some_and(|at| *at <= now);
            if !ready {
                continue;
            }
            self.next_ready
                .insert(ability.id, now + Duration::from_millis(ability.cooldown_ms));

            for effect in &ability.effects {
                let effect = self.resolve_effect(effect, multiplier, now);
                signals.push(EncounterSignal::Effect {
                    ability_id: ability.id,
                    effect,
                });
            }
        }
        signals
    }

    fn resolve_effect(&mut self, effect: &EffectTemplate, multiplier: f64, now: Instant) -> EffectTemplate {
        match effect {
            EffectTemplate::Damage { amount, school } => EffectTemplate::Damage {
                amount: scale(*amount, multiplier),
                school: school.clone(),
            },
            EffectTemplate::Telegraph {
                shape,
                radius,
                duration_ms,
                damage,
            } => EffectTemplate::Telegraph {
                shape: *shape,
                radius: *radius,
                duration_ms: *duration_ms,
                damage: scale(*damage, multiplier),
            },
            EffectTemplate::Buff { spell_id, duration_ms } => {
                self.buffs
                    .insert(*spell_id, now + Duration::from_millis(*duration_ms));
                effect.clone()
            }
            EffectTemplate::Debuff { spell_id, duration_ms } => {
                let until = now + Duration::from_millis(*duration_ms);
                for character in &self.participants {
                    self.debuffs.insert((*spell_id, *character), until);
                }
                effect.clone()
            }
            other => other.clone(),
        }
    }

    /// Applies the soft enrage. Returns nothing if already enraged or not engaged.
    pub fn enrage(&mut self) -> Vec<EncounterSignal> {
        if !self.is_engaged() || self.enraged {
            return Vec::new();
        }
        self.enraged = true;
        vec![EncounterSignal::Enraged]
    }

    pub fn register_add(&mut self, add: ActiveAdd) {
        self.adds.push(add);
    }

    /// Everyone died: the fight is abandoned and every add goes away.
    pub fn wipe(&mut self) -> Vec<EncounterSignal> {
        if !self.is_engaged() {
            return Vec::new();
        }
        self.status = EncounterStatus::Resetting;
        let mut signals = Vec::new();
        let adds: Vec<CreatureGuid> = self.adds.drain(..).map(|a| a.guid).collect();
        if !adds.is_empty() {
            signals.push(EncounterSignal::Despawn(adds));
        }
        signals.push(EncounterSignal::Wiped);
        signals
    }

    pub fn snapshot(&self, now: Instant) -> EncounterSnapshot {
        EncounterSnapshot {
            instance: self.instance,
            boss_id: self.template.id,
            name: self.template.name.clone(),
            status: self.status,
            health: self.health,
            max_health: self.max_health,
            health_percent: self.health_percent(),
            phase: self.phase_name().map(str::to_string),
            armor: self.armor,
            vulnerability_pct: self.vulnerability(now),
            outgoing_multiplier: self.outgoing_multiplier(),
            enraged: self.enraged,
            adds: self.adds.len(),
            buffs: self.buffs.len(),
            debuffs: self.debuffs.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use horizon_contracts::{AbilityTemplate, PhaseCondition};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn phase(name: &str, condition: PhaseCondition, abilities: Vec<AbilityTemplate>) -> PhaseTemplate {
        PhaseTemplate {
            name: name.to_string(),
            condition,
            abilities,
            modifiers: DamageModifiers::default(),
        }
    }

    fn ability(id: u32, cooldown_ms: u64, effects: Vec<EffectTemplate>) -> AbilityTemplate {
        AbilityTemplate {
            id,
            name: format!("ability-{id}"),
            cooldown_ms,
            effects,
        }
    }

    fn two_phase_boss(armor: ArmorSpec) -> BossTemplate {
        let mut frenzy = phase(
            "frenzy",
            PhaseCondition::HealthBelow { percent: 30.0 },
            vec![ability(2, 1_000, vec![EffectTemplate::Damage { amount: 100, school: "fire".into() }])],
        );
        frenzy.modifiers = DamageModifiers {
            vulnerability_pct: 0.0,
            outgoing_multiplier: 2.0,
        };
        BossTemplate {
            id: BossId(7),
            name: "Kuralak".into(),
            base_health: 1_000,
            interrupt_armor: armor,
            enrage_after_secs: Some(300),
            phases: vec![
                phase(
                    "opening",
                    PhaseCondition::HealthBetween { min: 0.0, max: 100.0 },
                    vec![ability(1, 5_000, vec![EffectTemplate::Damage { amount: 50, school: "physical".into() }])],
                ),
                frenzy,
            ],
        }
    }

    fn engaged(template: BossTemplate) -> (EncounterState, StdRng, Instant) {
        let mut rng = StdRng::seed_from_u64(7);
        let now = Instant::now();
        let health = template.base_health;
        let mut state = EncounterState::new(
            InstanceGuid(1),
            Arc::new(template),
            health,
            DamageModifiers::default(),
            vec![CharacterId(1), CharacterId(2)],
            EncounterConfig::default(),
        );
        state.engage(now, &mut rng).unwrap();
        (state, rng, now)
    }

    #[test]
    fn narrowest_phase_wins() {
        let boss = two_phase_boss(ArmorSpec::Finite(2));
        assert_eq!(select_phase(&boss.phases, 100.0), Some(0));
        assert_eq!(select_phase(&boss.phases, 29.0), Some(1));
        assert_eq!(select_phase(&[], 50.0), None);
    }

    #[test]
    fn tie_goes_to_first_phase() {
        let phases = vec![
            phase("a", PhaseCondition::HealthBelow { percent: 50.0 }, vec![]),
            phase("b", PhaseCondition::HealthBetween { min: 0.0, max: 50.0 }, vec![]),
        ];
        assert_eq!(select_phase(&phases, 10.0), Some(0));
    }

    #[test]
    fn no_matching_phase_selects_none() {
        let phases = vec![phase("upper", PhaseCondition::HealthAbove { percent: 50.0 }, vec![])];
        assert_eq!(select_phase(&phases, 50.0), None);
        assert_eq!(select_phase(&phases, 50.1), Some(0));
    }

    #[test]
    fn engage_enters_initial_phase() {
        let (state, _, _) = engaged(two_phase_boss(ArmorSpec::Finite(2)));
        assert!(state.is_engaged());
        assert_eq!(state.phase_name(), Some("opening"));
        assert_eq!(state.health(), 1_000);
    }

    #[test]
    fn engage_twice_is_rejected() {
        let (mut state, mut rng, now) = engaged(two_phase_boss(ArmorSpec::Finite(2)));
        assert_eq!(state.engage(now, &mut rng), Err(EncounterError::AlreadyEngaged));
    }

    #[test]
    fn damage_clamps_and_defeats() {
        let (mut state, mut rng, now) = engaged(two_phase_boss(ArmorSpec::Finite(2)));
        let (outcome, signals) = state.deal_damage(5_000, now, &mut rng).unwrap();
        assert_eq!(outcome.applied, 1_000);
        assert_eq!(outcome.health, 0);
        assert!(outcome.defeated);
        assert!(signals.contains(&EncounterSignal::Defeated));
        assert_eq!(
            state.deal_damage(1, now, &mut rng).unwrap_err(),
            EncounterError::AlreadyDefeated
        );
    }

    #[test]
    fn phase_change_merges_modifiers_permanently() {
        let (mut state, mut rng, now) = engaged(two_phase_boss(ArmorSpec::Finite(2)));
        let (outcome, signals) = state.deal_damage(750, now, &mut rng).unwrap();
        assert_eq!(outcome.phase.as_deref(), Some("frenzy"));
        assert!(signals.contains(&EncounterSignal::PhaseChanged { phase: "frenzy".into() }));
        assert_eq!(state.outgoing_multiplier(), 2.0);
    }

    #[test]
    fn interrupt_armor_counts_down_and_restores() {
        let (mut state, _, now) = engaged(two_phase_boss(ArmorSpec::Finite(2)));
        let (first, _) = state.interrupt(now).unwrap();
        assert_eq!(first, InterruptOutcome::Reduced { remaining: 1 });
        assert_eq!(state.armor(), InterruptArmor::Finite { current: 1, max: 2 });

        let (second, signals) = state.interrupt(now).unwrap();
        assert_eq!(second, InterruptOutcome::MomentOfOpportunity { restored: 2 });
        assert_eq!(state.armor(), InterruptArmor::Finite { current: 2, max: 2 });
        assert!(matches!(signals[0], EncounterSignal::MomentOfOpportunity { .. }));
    }

    #[test]
    fn moment_of_opportunity_doubles_damage_taken() {
        let (mut state, mut rng, now) = engaged(two_phase_boss(ArmorSpec::Finite(1)));
        state.interrupt(now).unwrap();
        let (outcome, _) = state.deal_damage(100, now, &mut rng).unwrap();
        assert_eq!(outcome.applied, 200);

        let later = now + Duration::from_secs(11);
        state.tick(later);
        let (outcome, _) = state.deal_damage(100, later, &mut rng).unwrap();
        assert_eq!(outcome.applied, 100);
    }

    #[test]
    fn infinite_armor_is_immune() {
        let (mut state, _, now) = engaged(two_phase_boss(ArmorSpec::Infinite));
        assert_eq!(state.interrupt(now).unwrap_err(), EncounterError::InterruptImmune);
    }

    #[test]
    fn zero_armor_is_depleted() {
        let (mut state, _, now) = engaged(two_phase_boss(ArmorSpec::Finite(0)));
        assert_eq!(state.interrupt(now).unwrap_err(), EncounterError::ArmorDepleted);
    }

    #[test]
    fn abilities_fire_within_stagger_then_on_cooldown() {
        let (mut state, _, now) = engaged(two_phase_boss(ArmorSpec::Finite(2)));
        let stagger = EncounterConfig::default().max_initial_stagger;

        let fired = state.tick(now + stagger);
        assert_eq!(fired.len(), 1);
        assert!(matches!(fired[0], EncounterSignal::Effect { ability_id: 1, .. }));

        // cooldown is 5s from the firing tick
        assert!(state.tick(now + stagger + Duration::from_secs(4)).is_empty());
        assert_eq!(state.tick(now + stagger + Duration::from_secs(5)).len(), 1);
    }

    #[test]
    fn enrage_scales_ability_damage() {
        let (mut state, _, now) = engaged(two_phase_boss(ArmorSpec::Finite(2)));
        assert_eq!(state.enrage(), vec![EncounterSignal::Enraged]);
        assert!(state.enrage().is_empty());

        let fired = state.tick(now + Duration::from_secs(3));
        assert_eq!(
            fired,
            vec![EncounterSignal::Effect {
                ability_id: 1,
                effect: EffectTemplate::Damage { amount: 500, school: "physical".into() },
            }]
        );
    }

    #[test]
    fn debuffs_apply_to_every_participant_and_expire() {
        let mut template = two_phase_boss(ArmorSpec::Finite(2));
        template.phases[0].abilities = vec![ability(
            3,
            60_000,
            vec![EffectTemplate::Debuff { spell_id: 99, duration_ms: 2_000 }],
        )];
        let (mut state, _, now) = engaged(template);

        let at = now + Duration::from_secs(3);
        state.tick(at);
        assert_eq!(state.snapshot(at).debuffs, 2);
        state.tick(at + Duration::from_secs(2));
        assert_eq!(state.snapshot(at).debuffs, 0);
    }

    #[test]
    fn defeat_despawns_only_flagged_adds() {
        let (mut state, mut rng, now) = engaged(two_phase_boss(ArmorSpec::Finite(2)));
        state.register_add(ActiveAdd { guid: CreatureGuid(1), creature_id: 5, despawn_with_boss: true });
        state.register_add(ActiveAdd { guid: CreatureGuid(2), creature_id: 5, despawn_with_boss: false });

        let (_, signals) = state.deal_damage(1_000, now, &mut rng).unwrap();
        assert_eq!(signals[0], EncounterSignal::Despawn(vec![CreatureGuid(1)]));
        assert_eq!(state.snapshot(now).adds, 1);
    }

    #[test]
    fn wipe_despawns_all_adds_and_restores_health_on_reengage() {
        let (mut state, mut rng, now) = engaged(two_phase_boss(ArmorSpec::Finite(2)));
        state.register_add(ActiveAdd { guid: CreatureGuid(4), creature_id: 5, despawn_with_boss: false });
        state.deal_damage(500, now, &mut rng).unwrap();

        let signals = state.wipe();
        assert_eq!(signals[0], EncounterSignal::Despawn(vec![CreatureGuid(4)]));
        assert_eq!(signals.last(), Some(&EncounterSignal::Wiped));
        assert_eq!(state.status(), EncounterStatus::Resetting);
        assert_eq!(state.deal_damage(1, now, &mut rng).unwrap_err(), EncounterError::NotEngaged);

        state.engage(now, &mut rng).unwrap();
        assert_eq!(state.health(), 1_000);
    }
}
