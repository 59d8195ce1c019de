//! Per-player respawn timers.
//!
//! A [`RespawnTracker`] is plain state owned by the instance actor; it never
//! runs on its own. Each death inside the recent-death window lengthens the
//! next respawn delay by `per_death`, up to `max_delay`.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RespawnPolicy {
    pub base_delay: Duration,
    pub per_death: Duration,
    pub max_delay: Duration,
    pub window: Duration,
}

impl Default for RespawnPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            per_death: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            window: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RespawnTracker {
    recent_deaths: VecDeque<Instant>,
}

impl RespawnTracker {
    pub fn record_death(&mut self, now: Instant, policy: &RespawnPolicy) {
        self.prune(now, policy);
        self.recent_deaths.push_back(now);
    }

    /// Delay that applies to the most recent death.
    pub fn delay(&self, policy: &RespawnPolicy) -> Duration {
        let extra = self.recent_deaths.len().saturating_sub(1) as u32;
        (policy.base_delay + policy.per_death * extra).min(policy.max_delay)
    }

    /// Time left before the player may respawn; zero when eligible.
    pub fn remaining(&self, now: Instant, policy: &RespawnPolicy) -> Duration {
        match self.recent_deaths.back() {
            Some(last) => (*last + self.delay(policy)).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    pub fn can_respawn(&self, now: Instant, policy: &RespawnPolicy) -> bool {
        self.remaining(now, policy).is_zero()
    }

    fn prune(&mut self, now: Instant, policy: &RespawnPolicy) {
        while let Some(front) = self.recent_deaths.front() {
            if now.saturating_duration_since(*front) > policy.window {
                self.recent_deaths.pop_front();
            } else {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_deaths_extend_delay_up_to_cap() {
        let policy = RespawnPolicy::default();
        let mut tracker = RespawnTracker::default();
        let start = Instant::now();

        tracker.record_death(start, &policy);
        assert_eq!(tracker.delay(&policy), Duration::from_secs(5));

        for i in 1..10 {
            tracker.record_death(start + Duration::from_secs(i), &policy);
        }
        assert_eq!(tracker.delay(&policy), Duration::from_secs(30));
    }

    #[test]
    fn deaths_outside_window_are_forgotten() {
        let policy = RespawnPolicy::default();
        let mut tracker = RespawnTracker::default();
        let start = Instant::now();

        tracker.record_death(start, &policy);
        tracker.record_death(start + Duration::from_secs(1), &policy);
        assert_eq!(tracker.delay(&policy), Duration::from_secs(10));

        tracker.record_death(start + Duration::from_secs(300), &policy);
        assert_eq!(tracker.delay(&policy), Duration::from_secs(5));
    }

    #[test]
    fn eligibility_after_delay() {
        let policy = RespawnPolicy::default();
        let mut tracker = RespawnTracker::default();
        let start = Instant::now();
        assert!(tracker.can_respawn(start, &policy));

        tracker.record_death(start, &policy);
        assert!(!tracker.can_respawn(start + Duration::from_secs(4), &policy));
        assert_eq!(tracker.remaining(start + Duration::from_secs(3), &policy), Duration::from_secs(2));
        assert!(tracker.can_respawn(start + Duration::from_secs(5), &policy));
    }
}
