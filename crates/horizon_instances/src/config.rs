//! Runtime tunables for instances and boss encounters.
//!
//! These are plain value types; the binary builds them from its TOML
//! configuration and hands a copy to each registry.

use crate::lockout::ResetSchedule;
use crate::mythic::MythicConfig;
use crate::respawn::RespawnPolicy;
use std::time::Duration;

/// Settings shared by every boss encounter actor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncounterConfig {
    /// Period of the ability / effect-expiry tick
    pub tick_interval: Duration,
    /// Upper bound of the random delay before a freshly entered phase's
    /// abilities become ready
    pub max_initial_stagger: Duration,
    /// Multiplier applied to outgoing damage once the enrage timer fires
    pub enrage_multiplier: f64,
    /// Extra damage taken during a moment of opportunity, in percent
    pub opportunity_vulnerability_pct: f64,
    /// Length of a moment of opportunity
    pub opportunity_duration: Duration,
    /// Bounded mailbox size per encounter
    pub mailbox_capacity: usize,
}

impl Default for EncounterConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(1),
            max_initial_stagger: Duration::from_secs(3),
            enrage_multiplier: 10.0,
            opportunity_vulnerability_pct: 100.0,
            opportunity_duration: Duration::from_secs(10),
            mailbox_capacity: 64,
        }
    }
}

/// Settings shared by every instance actor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceConfig {
    /// An instance with nobody inside for this long stops itself
    pub idle_timeout: Duration,
    pub mailbox_capacity: usize,
    pub mythic: MythicConfig,
    pub respawn: RespawnPolicy,
    /// Reset calendar used to compute lockout expiry
    pub schedule: ResetSchedule,
    pub encounter: EncounterConfig,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(15 * 60),
            mailbox_capacity: 128,
            mythic: MythicConfig::default(),
            respawn: RespawnPolicy::default(),
            schedule: ResetSchedule::default(),
            encounter: EncounterConfig::default(),
        }
    }
}
