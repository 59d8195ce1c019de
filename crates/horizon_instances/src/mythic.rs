//! # Mythic+ Timer
//!
//! Single home for every Mythic+ formula:
//!
//! * time limit = base × (1 + `level_time_scaling` × level)
//! * adjusted elapsed = wall time + deaths × `death_penalty`
//! * upgrade tier: 3 within 60% of the limit, 2 within 80%, 1 within 100%,
//!   otherwise 0
//! * trash percent = kills × 100 / requirement, capped at 100 (a zero
//!   requirement counts as complete)

use horizon_contracts::DamageModifiers;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

/// Fraction of the time limit for each upgrade tier, best tier first.
pub const TIER_CUTOFFS: [(u8, f64); 3] = [(3, 0.6), (2, 0.8), (1, 1.0)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affix {
    Fortified,
    Tyrannical,
    Bolstering,
    Raging,
    Sanguine,
    Explosive,
}

impl Affix {
    /// Modifiers an affix contributes to every boss in the run.
    pub fn boss_modifiers(self) -> DamageModifiers {
        match self {
            Affix::Tyrannical => DamageModifiers {
                vulnerability_pct: 0.0,
                outgoing_multiplier: 1.15,
            },
            _ => DamageModifiers::default(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Affix::Fortified => "fortified",
            Affix::Tyrannical => "tyrannical",
            Affix::Bolstering => "bolstering",
            Affix::Raging => "raging",
            Affix::Sanguine => "sanguine",
            Affix::Explosive => "explosive",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MythicConfig {
    pub death_penalty: Duration,
    pub level_time_scaling: f64,
}

impl Default for MythicConfig {
    fn default() -> Self {
        Self {
            death_penalty: Duration::from_secs(5),
            level_time_scaling: 0.05,
        }
    }
}

pub fn trash_percent(kills: u32, required: u32) -> f64 {
    if required == 0 {
        return 100.0;
    }
    (f64::from(kills) * 100.0 / f64::from(required)).min(100.0)
}

/// Read-only view of a run, returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MythicTimerView {
    pub level: u8,
    pub started: bool,
    pub finished: bool,
    pub elapsed: Duration,
    pub death_penalty: Duration,
    pub adjusted_elapsed: Duration,
    pub time_limit: Duration,
    pub remaining: Duration,
    pub upgrade_tier: u8,
    pub trash_percent: f64,
}

#[derive(Debug, Clone)]
pub struct MythicTimer {
    level: u8,
    base_limit: Duration,
    config: MythicConfig,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

impl MythicTimer {
    pub fn new(level: u8, base_limit: Duration, config: MythicConfig) -> Self {
        Self {
            level,
            base_limit,
            config,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    /// Starts the clock. Returns false if it was already running.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.started_at.is_some() {
            return false;
        }
        self.started_at = Some(now);
        true
    }

    pub fn finish(&mut self, now: Instant) {
        if self.started_at.is_some() && self.finished_at.is_none() {
            self.finished_at = Some(now);
        }
    }

    pub fn reset(&mut self) {
        self.started_at = None;
        self.finished_at = None;
    }

    pub fn time_limit(&self) -> Duration {
        self.base_limit
            .mul_f64(1.0 + self.config.level_time_scaling * f64::from(self.level))
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        match self.started_at {
            Some(start) => self.finished_at.unwrap_or(now).saturating_duration_since(start),
            None => Duration::ZERO,
        }
    }

    pub fn penalty(&self, deaths: u32) -> Duration {
        self.config.death_penalty * deaths
    }

    pub fn adjusted_elapsed(&self, now: Instant, deaths: u32) -> Duration {
        self.elapsed(now) + self.penalty(deaths)
    }

    pub fn upgrade_tier(&self, now: Instant, deaths: u32) -> u8 {
        if !self.is_started() {
            return 0;
        }
        let adjusted = self.adjusted_elapsed(now, deaths);
        let limit = self.time_limit();
        TIER_CUTOFFS
            .iter()
            .find(|(_, fraction)| adjusted <= limit.mul_f64(*fraction))
            .map(|(tier, _)| *tier)
            .unwrap_or(0)
    }

    pub fn view(&self, now: Instant, deaths: u32, trash_kills: u32, trash_required: u32) -> MythicTimerView {
        let adjusted = self.adjusted_elapsed(now, deaths);
        let limit = self.time_limit();
        MythicTimerView {
            level: self.level,
            started: self.is_started(),
            finished: self.finished_at.is_some(),
            elapsed: self.elapsed(now),
            death_penalty: self.penalty(deaths),
            adjusted_elapsed: adjusted,
            time_limit: limit,
            remaining: limit.saturating_sub(adjusted),
            upgrade_tier: self.upgrade_tier(now, deaths),
            trash_percent: trash_percent(trash_kills, trash_required),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timer(level: u8) -> MythicTimer {
        MythicTimer::new(level, Duration::from_secs(1000), MythicConfig::default())
    }

    #[test]
    fn limit_scales_with_level() {
        assert_eq!(timer(0).time_limit(), Duration::from_secs(1000));
        assert_eq!(timer(10).time_limit(), Duration::from_secs(1500));
    }

    #[test]
    fn tiers_follow_cutoffs() {
        let start = Instant::now();
        let mut t = timer(0);
        t.start(start);

        assert_eq!(t.upgrade_tier(start + Duration::from_secs(600), 0), 3);
        assert_eq!(t.upgrade_tier(start + Duration::from_secs(601), 0), 2);
        assert_eq!(t.upgrade_tier(start + Duration::from_secs(800), 0), 2);
        assert_eq!(t.upgrade_tier(start + Duration::from_secs(1000), 0), 1);
        assert_eq!(t.upgrade_tier(start + Duration::from_secs(1001), 0), 0);
    }

    #[test]
    fn deaths_push_run_into_lower_tier() {
        let start = Instant::now();
        let mut t = timer(0);
        t.start(start);
        let at = start + Duration::from_secs(590);
        assert_eq!(t.upgrade_tier(at, 0), 3);
        // 3 deaths × 5s = 15s penalty
        assert_eq!(t.upgrade_tier(at, 3), 2);
        assert_eq!(t.view(at, 3, 0, 0).death_penalty, Duration::from_secs(15));
    }

    #[test]
    fn finished_timer_stops_counting() {
        let start = Instant::now();
        let mut t = timer(2);
        t.start(start);
        t.finish(start + Duration::from_secs(100));
        assert_eq!(t.elapsed(start + Duration::from_secs(500)), Duration::from_secs(100));
    }

    #[test]
    fn unstarted_timer_reports_zero() {
        let t = timer(5);
        let view = t.view(Instant::now(), 4, 10, 20);
        assert!(!view.started);
        assert_eq!(view.elapsed, Duration::ZERO);
        assert_eq!(view.upgrade_tier, 0);
        assert_eq!(view.trash_percent, 50.0);
    }

    #[test]
    fn trash_percent_caps_at_hundred() {
        assert_eq!(trash_percent(150, 100), 100.0);
        assert_eq!(trash_percent(0, 0), 100.0);
        assert_eq!(trash_percent(25, 100), 25.0);
    }

    #[test]
    fn tyrannical_raises_boss_damage() {
        assert!(Affix::Tyrannical.boss_modifiers().outgoing_multiplier > 1.0);
        assert_eq!(Affix::Sanguine.boss_modifiers(), DamageModifiers::default());
    }
}
