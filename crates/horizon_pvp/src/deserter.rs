//! Deserter flags for players who abandon an active match.
//!
//! The first offence flags a character for the base duration. Every further
//! offence within the repeat window doubles the previous penalty, up to the
//! cap. The tracker is plain state owned by the arena queue.

use chrono::{DateTime, Duration, Utc};
use horizon_contracts::CharacterId;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeserterPolicy {
    pub base: Duration,
    pub repeat_window: Duration,
    pub max: Duration,
}

impl Default for DeserterPolicy {
    fn default() -> Self {
        Self {
            base: Duration::minutes(15),
            repeat_window: Duration::hours(24),
            max: Duration::hours(2),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct DeserterRecord {
    offences: VecDeque<DateTime<Utc>>,
    flagged_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct DeserterTracker {
    policy: DeserterPolicy,
    records: HashMap<CharacterId, DeserterRecord>,
}

impl DeserterTracker {
    pub fn new(policy: DeserterPolicy) -> Self {
        Self {
            policy,
            records: HashMap::new(),
        }
    }

    /// Records an offence and returns the penalty it earned.
    pub fn flag(&mut self, character: CharacterId, now: DateTime<Utc>) -> Duration {
        let window = self.policy.repeat_window;
        let record = self.records.entry(character).or_default();
        while record
            .offences
            .front()
            .is_some_and(|&at| now - at >= window)
        {
            record.offences.pop_front();
        }

        let repeats = record.offences.len().min(16) as u32;
        let penalty = self
            .policy
            .base
            .checked_mul(1 << repeats)
            .unwrap_or(self.policy.max)
            .min(self.policy.max);

        record.offences.push_back(now);
        let until = now + penalty;
        record.flagged_until = Some(record.flagged_until.map_or(until, |existing| existing.max(until)));
        penalty
    }

    pub fn is_deserter(&self, character: CharacterId, now: DateTime<Utc>) -> bool {
        self.remaining(character, now).is_some()
    }

    /// Time left on the flag, if any.
    pub fn remaining(&self, character: CharacterId, now: DateTime<Utc>) -> Option<Duration> {
        let until = self.records.get(&character)?.flagged_until?;
        (until > now).then(|| until - now)
    }

    /// Forgets characters whose flag has lapsed and whose offences are all
    /// outside the repeat window.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let window = self.policy.repeat_window;
        self.records.retain(|_, record| {
            let flagged = record.flagged_until.is_some_and(|until| until > now);
            let recent = record.offences.back().is_some_and(|&at| now - at < window);
            flagged || recent
        });
    }

    pub fn tracked(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 5, 12, 0, 0).unwrap()
    }

    #[test]
    fn first_offence_gets_base_penalty() {
        let mut tracker = DeserterTracker::default();
        let who = CharacterId(1);
        assert_eq!(tracker.flag(who, noon()), Duration::minutes(15));
        assert!(tracker.is_deserter(who, noon() + Duration::minutes(14)));
        assert!(!tracker.is_deserter(who, noon() + Duration::minutes(15)));
        assert!(!tracker.is_deserter(CharacterId(2), noon()));
    }

    #[test]
    fn repeats_within_window_double_up_to_cap() {
        let mut tracker = DeserterTracker::default();
        let who = CharacterId(1);
        let penalties: Vec<Duration> = (0..5)
            .map(|i| tracker.flag(who, noon() + Duration::hours(i)))
            .collect();
        assert_eq!(
            penalties,
            vec![
                Duration::minutes(15),
                Duration::minutes(30),
                Duration::minutes(60),
                Duration::minutes(120),
                Duration::minutes(120),
            ]
        );
    }

    #[test]
    fn offences_outside_window_are_forgotten() {
        let mut tracker = DeserterTracker::default();
        let who = CharacterId(1);
        tracker.flag(who, noon());
        tracker.flag(who, noon() + Duration::hours(1));
        let later = noon() + Duration::hours(24) + Duration::minutes(30);
        assert_eq!(tracker.flag(who, later), Duration::minutes(30));
        assert_eq!(tracker.remaining(who, later), Some(Duration::minutes(30)));
    }

    #[test]
    fn prune_drops_stale_records() {
        let mut tracker = DeserterTracker::default();
        tracker.flag(CharacterId(1), noon());
        tracker.flag(CharacterId(2), noon() + Duration::hours(20));
        tracker.prune(noon() + Duration::hours(30));
        assert_eq!(tracker.tracked(), 1);
        assert!(!tracker.is_deserter(CharacterId(2), noon() + Duration::hours(30)));
    }
}
