//! # Static Templates
//!
//! Strongly typed game data consumed by the runtime: boss encounters, instance
//! definitions, battlegrounds and warplots. Templates are loaded once at
//! startup (see [`StaticTemplateStore::load_from_file`]) and shared behind
//! `Arc`s; nothing in the runtime mutates them.
//!
//! Lookups that miss never fail an operation. Callers fall back to
//! [`InstanceDefinition::stub`] / [`BossTemplate::stub`] and log the miss.

use crate::ids::{BossId, DefinitionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Difficulty of an instance copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Normal,
    Veteran,
    Challenge,
    MythicPlus,
}

/// Broad category of an instance definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceKind {
    Dungeon,
    Raid,
    Adventure,
    Expedition,
}

/// Interrupt armor declared by a boss template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArmorSpec {
    Finite(u32),
    Infinite,
}

/// Health-percent predicate that activates a phase.
///
/// Intervals: `HealthAbove(p)` holds on `(p, 100]`, `HealthBelow(p)` on
/// `[0, p)`, `HealthBetween` on the closed range `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PhaseCondition {
    HealthAbove { percent: f64 },
    HealthBelow { percent: f64 },
    HealthBetween { min: f64, max: f64 },
}

impl PhaseCondition {
    pub fn holds(&self, health_percent: f64) -> bool {
        match *self {
            PhaseCondition::HealthAbove { percent } => health_percent > percent,
            PhaseCondition::HealthBelow { percent } => health_percent < percent,
            PhaseCondition::HealthBetween { min, max } => {
                health_percent >= min && health_percent <= max
            }
        }
    }

    /// Width of the health interval covered by this predicate. Narrower
    /// predicates are more specific.
    pub fn width(&self) -> f64 {
        match *self {
            PhaseCondition::HealthAbove { percent } => (100.0 - percent).max(0.0),
            PhaseCondition::HealthBelow { percent } => percent.max(0.0),
            PhaseCondition::HealthBetween { min, max } => (max - min).max(0.0),
        }
    }
}

/// Damage modifiers carried by a phase and accumulated by an encounter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DamageModifiers {
    /// Extra damage the boss takes, in percent.
    #[serde(default)]
    pub vulnerability_pct: f64,
    /// Multiplier applied to damage the boss deals.
    #[serde(default = "default_multiplier")]
    pub outgoing_multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

impl Default for DamageModifiers {
    fn default() -> Self {
        Self {
            vulnerability_pct: 0.0,
            outgoing_multiplier: 1.0,
        }
    }
}

impl DamageModifiers {
    /// Folds `other` into `self`. Vulnerability adds, multipliers compound.
    pub fn merge(&mut self, other: &DamageModifiers) {
        self.vulnerability_pct += other.vulnerability_pct;
        self.outgoing_multiplier *= other.outgoing_multiplier;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelegraphShape {
    Circle,
    Cone,
    Line,
    Donut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    Knockback,
    Pull,
    Root,
    Teleport,
}

/// One effect produced when an ability fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EffectTemplate {
    Damage {
        amount: u32,
        #[serde(default)]
        school: String,
    },
    Telegraph {
        shape: TelegraphShape,
        radius: f32,
        duration_ms: u64,
        damage: u32,
    },
    Spawn {
        creature_id: u32,
        count: u32,
        #[serde(default = "default_true")]
        despawn_with_boss: bool,
    },
    Buff {
        spell_id: u32,
        duration_ms: u64,
    },
    Debuff {
        spell_id: u32,
        duration_ms: u64,
    },
    Movement {
        kind: MovementKind,
        magnitude: f32,
    },
    Coordination {
        mechanic: String,
    },
    Environmental {
        hazard: String,
        duration_ms: u64,
    },
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AbilityTemplate {
    pub id: u32,
    pub name: String,
    pub cooldown_ms: u64,
    #[serde(default)]
    pub effects: Vec<EffectTemplate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTemplate {
    pub name: String,
    pub condition: PhaseCondition,
    #[serde(default)]
    pub abilities: Vec<AbilityTemplate>,
    #[serde(default)]
    pub modifiers: DamageModifiers,
}

/// Static description of a boss fight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BossTemplate {
    pub id: BossId,
    pub name: String,
    pub base_health: u64,
    pub interrupt_armor: ArmorSpec,
    /// Seconds after engage before the soft enrage multiplier is applied.
    #[serde(default)]
    pub enrage_after_secs: Option<u64>,
    #[serde(default)]
    pub phases: Vec<PhaseTemplate>,
}

/// Base health used when neither a template nor a definition entry knows the boss.
pub const STUB_BOSS_HEALTH: u64 = 100_000;

impl BossTemplate {
    /// Minimal template used when game data has no entry for `id`.
    pub fn stub(id: BossId) -> Self {
        Self {
            id,
            name: format!("Unknown Boss {}", id.0),
            base_health: STUB_BOSS_HEALTH,
            interrupt_armor: ArmorSpec::Finite(2),
            enrage_after_secs: None,
            phases: vec![PhaseTemplate {
                name: "default".to_string(),
                condition: PhaseCondition::HealthBetween {
                    min: 0.0,
                    max: 100.0,
                },
                abilities: Vec::new(),
                modifiers: DamageModifiers::default(),
            }],
        }
    }

    /// Template derived from the boss entry of an instance definition.
    pub fn from_entry(entry: &BossEntry) -> Self {
        let mut template = Self::stub(entry.boss_id);
        template.name = entry.name.clone();
        if let Some(health) = entry.base_health {
            template.base_health = health;
        }
        template
    }
}

/// Boss listed by an instance definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BossEntry {
    pub boss_id: BossId,
    pub name: String,
    #[serde(default)]
    pub base_health: Option<u64>,
}

/// Static description of a dungeon, raid or adventure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceDefinition {
    pub id: DefinitionId,
    pub name: String,
    pub kind: InstanceKind,
    pub zone_id: u32,
    #[serde(default = "default_max_players")]
    pub max_players: usize,
    #[serde(default)]
    pub bosses: Vec<BossEntry>,
    /// Trash kills that make up 100% for Mythic+ runs.
    #[serde(default)]
    pub trash_requirement: u32,
    /// Base Mythic+ time limit in seconds.
    #[serde(default = "default_mythic_limit")]
    pub mythic_time_limit_secs: u64,
}

fn default_max_players() -> usize {
    5
}

fn default_mythic_limit() -> u64 {
    30 * 60
}

impl InstanceDefinition {
    /// Minimal definition used when game data has no entry for `id`.
    pub fn stub(id: DefinitionId) -> Self {
        Self {
            id,
            name: format!("Unknown Instance {}", id.0),
            kind: InstanceKind::Dungeon,
            zone_id: 0,
            max_players: default_max_players(),
            bosses: Vec::new(),
            trash_requirement: 0,
            mythic_time_limit_secs: default_mythic_limit(),
        }
    }

    pub fn boss_entry(&self, boss_id: BossId) -> Option<&BossEntry> {
        self.bosses.iter().find(|entry| entry.boss_id == boss_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    /// Capturable point interacted with directly.
    ControlPoint,
    /// Resource node that generates score while held.
    ResourceNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectiveTemplate {
    pub id: u32,
    pub name: String,
    pub kind: ObjectiveKind,
    /// Points awarded immediately on capture.
    #[serde(default)]
    pub capture_points: u32,
    /// Points awarded to the holder every score tick.
    #[serde(default)]
    pub points_per_tick: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattlegroundTemplate {
    pub id: u32,
    pub name: String,
    pub team_size: usize,
    pub score_limit: u32,
    #[serde(default)]
    pub kill_points: u32,
    #[serde(default)]
    pub objectives: Vec<ObjectiveTemplate>,
}

impl BattlegroundTemplate {
    pub fn stub(id: u32) -> Self {
        Self {
            id,
            name: format!("Unknown Battleground {id}"),
            team_size: 10,
            score_limit: 1_000,
            kill_points: 5,
            objectives: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefenseTemplate {
    pub id: u32,
    pub name: String,
    pub cost: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarplotTemplate {
    pub id: u32,
    pub name: String,
    pub team_size: usize,
    pub score_limit: u32,
    pub generators_per_side: u32,
    pub generator_health: u64,
    #[serde(default)]
    pub generator_points: u32,
    #[serde(default)]
    pub kill_points: u32,
    #[serde(default)]
    pub coins_per_tick: u32,
    #[serde(default)]
    pub coins_per_kill: u32,
    #[serde(default)]
    pub plug_slots: u32,
    #[serde(default)]
    pub defenses: Vec<DefenseTemplate>,
    #[serde(default)]
    pub energy_nodes: Vec<ObjectiveTemplate>,
}

impl WarplotTemplate {
    pub fn stub(id: u32) -> Self {
        Self {
            id,
            name: format!("Unknown Warplot {id}"),
            team_size: 30,
            score_limit: 5_000,
            generators_per_side: 3,
            generator_health: 500_000,
            generator_points: 500,
            kill_points: 10,
            coins_per_tick: 5,
            coins_per_kill: 2,
            plug_slots: 6,
            defenses: Vec::new(),
            energy_nodes: Vec::new(),
        }
    }
}

/// Read-only static data lookups.
pub trait TemplateStore: Send + Sync {
    fn boss(&self, id: BossId) -> Option<Arc<BossTemplate>>;
    fn instance(&self, id: DefinitionId) -> Option<Arc<InstanceDefinition>>;
    fn battleground(&self, id: u32) -> Option<Arc<BattlegroundTemplate>>;
    fn warplot(&self, id: u32) -> Option<Arc<WarplotTemplate>>;
}

/// On-disk form of the template catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateCatalog {
    #[serde(default)]
    pub bosses: Vec<BossTemplate>,
    #[serde(default)]
    pub instances: Vec<InstanceDefinition>,
    #[serde(default)]
    pub battlegrounds: Vec<BattlegroundTemplate>,
    #[serde(default)]
    pub warplots: Vec<WarplotTemplate>,
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Failed to read template file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse template file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Template store populated once and never mutated afterwards.
#[derive(Debug, Default, Clone)]
pub struct StaticTemplateStore {
    bosses: HashMap<BossId, Arc<BossTemplate>>,
    instances: HashMap<DefinitionId, Arc<InstanceDefinition>>,
    battlegrounds: HashMap<u32, Arc<BattlegroundTemplate>>,
    warplots: HashMap<u32, Arc<WarplotTemplate>>,
}

impl StaticTemplateStore {
    pub fn from_catalog(catalog: TemplateCatalog) -> Self {
        Self {
            bosses: catalog
                .bosses
                .into_iter()
                .map(|t| (t.id, Arc::new(t)))
                .collect(),
            instances: catalog
                .instances
                .into_iter()
                .map(|d| (d.id, Arc::new(d)))
                .collect(),
            battlegrounds: catalog
                .battlegrounds
                .into_iter()
                .map(|b| (b.id, Arc::new(b)))
                .collect(),
            warplots: catalog
                .warplots
                .into_iter()
                .map(|w| (w.id, Arc::new(w)))
                .collect(),
        }
    }

    /// Parses a TOML catalog from disk.
    pub fn load_from_file(path: &Path) -> Result<Self, TemplateError> {
        let content = std::fs::read_to_string(path)?;
        let catalog: TemplateCatalog = toml::from_str(&content)?;
        Ok(Self::from_catalog(catalog))
    }

    pub fn len(&self) -> usize {
        self.bosses.len() + self.instances.len() + self.battlegrounds.len() + self.warplots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TemplateStore for StaticTemplateStore {
    fn boss(&self, id: BossId) -> Option<Arc<BossTemplate>> {
        self.bosses.get(&id).cloned()
    }

    fn instance(&self, id: DefinitionId) -> Option<Arc<InstanceDefinition>> {
        self.instances.get(&id).cloned()
    }

    fn battleground(&self, id: u32) -> Option<Arc<BattlegroundTemplate>> {
        self.battlegrounds.get(&id).cloned()
    }

    fn warplot(&self, id: u32) -> Option<Arc<WarplotTemplate>> {
        self.warplots.get(&id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn phase_condition_intervals() {
        let above = PhaseCondition::HealthAbove { percent: 70.0 };
        assert!(above.holds(100.0));
        assert!(!above.holds(70.0));

        let below = PhaseCondition::HealthBelow { percent: 30.0 };
        assert!(below.holds(0.0));
        assert!(!below.holds(30.0));

        let between = PhaseCondition::HealthBetween { min: 30.0, max: 70.0 };
        assert!(between.holds(30.0));
        assert!(between.holds(70.0));
        assert!(!between.holds(70.1));
        assert_eq!(between.width(), 40.0);
    }

    #[test]
    fn modifiers_accumulate() {
        let mut running = DamageModifiers::default();
        running.merge(&DamageModifiers {
            vulnerability_pct: 10.0,
            outgoing_multiplier: 1.5,
        });
        running.merge(&DamageModifiers {
            vulnerability_pct: 5.0,
            outgoing_multiplier: 2.0,
        });
        assert_eq!(running.vulnerability_pct, 15.0);
        assert_eq!(running.outgoing_multiplier, 3.0);
    }

    #[test]
    fn boss_entry_fallback_keeps_health() {
        let entry = BossEntry {
            boss_id: BossId(7),
            name: "Stormtalon".to_string(),
            base_health: Some(2_500_000),
        };
        let template = BossTemplate::from_entry(&entry);
        assert_eq!(template.name, "Stormtalon");
        assert_eq!(template.base_health, 2_500_000);
        assert_eq!(template.phases.len(), 1);
    }

    #[test]
    fn load_catalog_from_toml() {
        let toml_content = r#"
[[bosses]]
id = 1
name = "Stormtalon"
base_health = 1000000
interrupt_armor = { finite = 2 }
enrage_after_secs = 480

[[bosses.phases]]
name = "opening"
condition = { type = "health_above", percent = 50.0 }

[[bosses.phases.abilities]]
id = 10
name = "Lightning Strike"
cooldown_ms = 8000
effects = [
    { type = "telegraph", shape = "circle", radius = 8.0, duration_ms = 2000, damage = 5000 },
    { type = "spawn", creature_id = 99, count = 2 },
]

[[instances]]
id = 100
name = "Stormtalon's Lair"
kind = "dungeon"
zone_id = 382
trash_requirement = 120
bosses = [{ boss_id = 1, name = "Stormtalon" }]
"#;
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(toml_content.as_bytes()).unwrap();

        let store = StaticTemplateStore::load_from_file(file.path()).unwrap();
        let boss = store.boss(BossId(1)).expect("boss loaded");
        assert_eq!(boss.interrupt_armor, ArmorSpec::Finite(2));
        assert_eq!(boss.phases[0].abilities[0].effects.len(), 2);

        let definition = store.instance(DefinitionId(100)).expect("instance loaded");
        assert_eq!(definition.max_players, 5);
        assert!(store.battleground(1).is_none());
    }
}
