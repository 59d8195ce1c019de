//! Tunables for the PvP actors. The server binary builds these from its TOML
//! file; tests use the defaults or shrink the durations.

use crate::deserter::DeserterPolicy;
use chrono::{DateTime, Utc};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueueConfig {
    /// How often each bracket is scanned for pairs
    pub match_interval: Duration,
    /// How often every search window widens
    pub expansion_interval: Duration,
    pub initial_window: u32,
    pub window_step: u32,
    pub max_window: u32,
    /// Unmatched entries are dropped after this long
    pub entry_timeout: Duration,
    pub mailbox_capacity: usize,
    pub deserter: DeserterPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            match_interval: Duration::from_secs(5),
            expansion_interval: Duration::from_secs(30),
            initial_window: 100,
            window_step: 50,
            max_window: 500,
            entry_timeout: Duration::from_secs(600),
            mailbox_capacity: 128,
            deserter: DeserterPolicy::default(),
        }
    }
}

/// Phase durations shared by every match kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchTimings {
    pub preparation: Duration,
    pub active: Duration,
    pub ending: Duration,
    /// How long a completed match keeps answering queries before it exits
    pub cleanup: Duration,
    pub score_tick: Duration,
    pub mailbox_capacity: usize,
}

impl Default for MatchTimings {
    fn default() -> Self {
        Self {
            preparation: Duration::from_secs(60),
            active: Duration::from_secs(20 * 60),
            ending: Duration::from_secs(10),
            cleanup: Duration::from_secs(30),
            score_tick: Duration::from_secs(5),
            mailbox_capacity: 64,
        }
    }
}

/// One rating tier of the end-of-season rewards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewardTier {
    pub min_rating: u32,
    pub glory: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonConfig {
    pub check_interval: Duration,
    /// No game and no decay for this long makes a record decay
    pub decay_inactivity: chrono::Duration,
    pub decay_amount: u32,
    /// Decay never takes a rating below this
    pub decay_floor: u32,
    pub season_id: u32,
    pub season_end: Option<DateTime<Utc>>,
    /// Highest tier first
    pub reward_tiers: Vec<RewardTier>,
}

impl Default for SeasonConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(3600),
            decay_inactivity: chrono::Duration::days(7),
            decay_amount: 25,
            decay_floor: 1800,
            season_id: 1,
            season_end: None,
            reward_tiers: vec![
                RewardTier { min_rating: 2400, glory: 1000 },
                RewardTier { min_rating: 2100, glory: 600 },
                RewardTier { min_rating: 1800, glory: 300 },
                RewardTier { min_rating: 1500, glory: 100 },
            ],
        }
    }
}

impl SeasonConfig {
    /// Glory earned by a final rating, if it reaches any tier.
    pub fn reward_for(&self, rating: u32) -> Option<u32> {
        self.reward_tiers
            .iter()
            .find(|tier| rating >= tier.min_rating)
            .map(|tier| tier.glory)
    }
}
