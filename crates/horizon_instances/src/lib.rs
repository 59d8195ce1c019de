//! # Horizon Instances
//!
//! Runtime for grouped PvE content:
//!
//! * [`instance`] - one actor per dungeon / raid copy: roster, boss slots,
//!   loot mode, Mythic+ timer, completion and lockouts
//! * [`encounter`] - one actor per boss fight: phases, ability tick,
//!   interrupt armor, adds and enrage
//! * [`registry`] - GUID-keyed directories and crash-isolating supervision
//! * [`lockout`] - daily / weekly reset manager
//! * [`scaling`], [`mythic`], [`respawn`] - the pure formulas the actors use

pub mod config;
pub mod encounter;
pub mod error;
pub mod instance;
pub mod lockout;
pub mod mythic;
pub mod registry;
pub mod respawn;
pub mod scaling;


pub use config::{EncounterConfig, InstanceConfig};
pub use encounter::{
    DamageOutcome, EncounterHandle, EncounterSnapshot, EncounterStatus, InterruptArmor,
    InterruptOutcome,
};
pub use error::{EncounterError, InstanceError, RegistryError};
pub use instance::{
    DeathOutcome, InstanceHandle, InstanceLaunch, InstanceSnapshot, InstanceStatus, LootMode,
    PlayerInfo, Role,
};
pub use lockout::{LockoutConfig, LockoutManager, LockoutManagerHandle, ResetGuards, ResetSchedule};
pub use mythic::{Affix, MythicConfig, MythicTimer, MythicTimerView};
pub use registry::{EncounterSupervisor, InstanceRegistry};
pub use respawn::{RespawnPolicy, RespawnTracker};
