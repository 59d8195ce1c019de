//! # Boss Encounters
//!
//! One task per active boss fight. The fight starts engaged as soon as the
//! task runs; it ends either defeated (kept alive for queries until the
//! instance resets) or wiped (the task stops after reporting).

mod actor;
mod state;

pub use actor::{EncounterHandle, EncounterLaunch, EncounterOutcome, EncounterReport};
pub(crate) use actor::spawn_encounter;
pub use state::{
    select_phase, ActiveAdd, DamageOutcome, EncounterSignal, EncounterSnapshot, EncounterState,
    EncounterStatus, InterruptArmor, InterruptOutcome,
};
