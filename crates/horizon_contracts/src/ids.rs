//! # Identifier Types
//!
//! Wrapper types for every identity the runtime passes around. Wrapping keeps
//! a boss ID from being handed where a character ID is expected and gives each
//! identifier a stable `Display` form for logs.
//!
//! Instance GUIDs are allocated without a central authority by
//! [`InstanceGuidGenerator`]: the millisecond wall clock occupies the high bits
//! and a per-process counter fills the low bits, so GUIDs are unique within a
//! process and sort roughly by creation time.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Number of low-order bits reserved for the per-millisecond counter.
pub const GUID_COUNTER_BITS: u32 = 16;

/// Unique identifier of a running dungeon/raid instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstanceGuid(pub u64);

impl InstanceGuid {
    /// Millisecond timestamp encoded in the high bits.
    pub fn timestamp_millis(&self) -> u64 {
        self.0 >> GUID_COUNTER_BITS
    }
}

impl fmt::Display for InstanceGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Lock-free generator for [`InstanceGuid`] values.
///
/// Each call produces `max(now_ms << 16, previous + 1)`, which keeps GUIDs
/// strictly increasing even when more than 65 536 GUIDs are requested within a
/// single millisecond or the wall clock steps backwards.
#[derive(Debug, Default)]
pub struct InstanceGuidGenerator {
    last: AtomicU64,
}

impl InstanceGuidGenerator {
    pub fn new() -> Self {
        Self { last: AtomicU64::new(0) }
    }

    /// Allocates the next GUID.
    pub fn next_guid(&self) -> InstanceGuid {
        let floor = current_millis() << GUID_COUNTER_BITS;
        let mut previous = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = floor.max(previous.wrapping_add(1));
            match self.last.compare_exchange_weak(
                previous,
                candidate,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return InstanceGuid(candidate),
                Err(actual) => previous = actual,
            }
        }
    }
}

fn current_millis() -> u64 {
    u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default()
}

/// Persistent character identifier owned by the account service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CharacterId(pub u64);

impl fmt::Display for CharacterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "char:{}", self.0)
    }
}

/// Static boss identifier from game data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BossId(pub u32);

impl fmt::Display for BossId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "boss:{}", self.0)
    }
}

/// Static instance definition identifier (the dungeon or raid, not the copy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DefinitionId(pub u32);

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "def:{}", self.0)
    }
}

/// Group that owns an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group:{}", self.0)
    }
}

/// PvP team identifier (arena team or pre-made group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TeamId(pub u64);

impl fmt::Display for TeamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "team:{}", self.0)
    }
}

/// Identifier of a running PvP match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchId(pub Uuid);

impl MatchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// World creature spawned on behalf of an encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CreatureGuid(pub u64);

impl fmt::Display for CreatureGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "creature#{}", self.0)
    }
}
