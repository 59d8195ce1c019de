//! # Rating
//!
//! ELO-style team rating math. Persistence owns [`RatingRecord`]s; this module
//! only computes expected scores and deltas and folds a result into records.
//!
//! * expected score: `1 / (1 + 10^((opponent - own) / 400))`
//! * K-factor by experience: 40 under 10 games, 32 under 30, 24 after that
//! * a win always moves the winner up by at least one point; the gain
//!   shrinks as the winner's advantage grows but rounding leaves plateaus,
//!   flattening to exactly one point for lopsided games

use chrono::{DateTime, Utc};
use horizon_contracts::RatingRecord;
use serde::{Deserialize, Serialize};

/// Rating given to a team with no record in a bracket.
pub const DEFAULT_RATING: u32 = 1500;

/// Probability that a team rated `rating` beats one rated `opponent`.
pub fn expected_score(rating: u32, opponent: u32) -> f64 {
    let diff = f64::from(opponent) - f64::from(rating);
    1.0 / (1.0 + 10f64.powf(diff / 400.0))
}

pub fn k_factor(games_played: u32) -> f64 {
    match games_played {
        0..=9 => 40.0,
        10..=29 => 32.0,
        _ => 24.0,
    }
}

/// Points gained by the winner.
pub fn win_delta(winner: u32, loser: u32, winner_games: u32) -> u32 {
    let gain = k_factor(winner_games) * (1.0 - expected_score(winner, loser));
    (gain.round() as u32).max(1)
}

/// Points lost by the loser.
pub fn loss_delta(loser: u32, winner: u32, loser_games: u32) -> u32 {
    let loss = k_factor(loser_games) * expected_score(loser, winner);
    loss.round() as u32
}

/// Signed change for a drawn game.
pub fn draw_delta(rating: u32, opponent: u32, games: u32) -> i32 {
    let change = k_factor(games) * (0.5 - expected_score(rating, opponent));
    change.round() as i32
}

/// Before/after view of one record, for logs and snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatingChange {
    pub before: u32,
    pub after: u32,
}

impl RatingChange {
    pub fn delta(&self) -> i64 {
        i64::from(self.after) - i64::from(self.before)
    }
}

/// Folds a decided game into both teams' records.
pub fn apply_result(
    winner: &mut RatingRecord,
    loser: &mut RatingRecord,
    at: DateTime<Utc>,
) -> (RatingChange, RatingChange) {
    let gain = win_delta(winner.rating, loser.rating, winner.games_played);
    let loss = loss_delta(loser.rating, winner.rating, loser.games_played);

    let won = RatingChange {
        before: winner.rating,
        after: winner.rating.saturating_add(gain),
    };
    let lost = RatingChange {
        before: loser.rating,
        after: loser.rating.saturating_sub(loss),
    };

    record_game(winner, won.after, at);
    winner.games_won += 1;
    winner.win_streak += 1;
    winner.loss_streak = 0;

    record_game(loser, lost.after, at);
    loser.loss_streak += 1;
    loser.win_streak = 0;

    (won, lost)
}

/// Folds a drawn game into both records. Streaks are broken.
pub fn apply_draw(
    red: &mut RatingRecord,
    blue: &mut RatingRecord,
    at: DateTime<Utc>,
) -> (RatingChange, RatingChange) {
    let red_delta = draw_delta(red.rating, blue.rating, red.games_played);
    let blue_delta = draw_delta(blue.rating, red.rating, blue.games_played);

    let red_change = RatingChange {
        before: red.rating,
        after: shift(red.rating, red_delta),
    };
    let blue_change = RatingChange {
        before: blue.rating,
        after: shift(blue.rating, blue_delta),
    };

    for (record, after) in [(&mut *red, red_change.after), (&mut *blue, blue_change.after)] {
        record_game(record, after, at);
        record.win_streak = 0;
        record.loss_streak = 0;
    }
    (red_change, blue_change)
}

fn record_game(record: &mut RatingRecord, rating: u32, at: DateTime<Utc>) {
    record.rating = rating;
    record.season_high = record.season_high.max(rating);
    record.games_played += 1;
    record.last_game_at = Some(at);
}

fn shift(rating: u32, delta: i32) -> u32 {
    if delta >= 0 {
        rating.saturating_add(delta.unsigned_abs())
    } else {
        rating.saturating_sub(delta.unsigned_abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use horizon_contracts::{Bracket, TeamId};

    fn record(team: u64, rating: u32) -> RatingRecord {
        RatingRecord::new(TeamId(team), Bracket::TwoVsTwo, rating)
    }

    #[test]
    fn expected_score_is_symmetric() {
        assert!((expected_score(1500, 1500) - 0.5).abs() < 1e-9);
        let a = expected_score(1600, 1400);
        let b = expected_score(1400, 1600);
        assert!((a + b - 1.0).abs() < 1e-9);
        assert!(a > 0.75 && a < 0.77);
    }

    #[test]
    fn k_factor_tiers() {
        assert_eq!(k_factor(0), 40.0);
        assert_eq!(k_factor(9), 40.0);
        assert_eq!(k_factor(10), 32.0);
        assert_eq!(k_factor(29), 32.0);
        assert_eq!(k_factor(30), 24.0);
    }

    #[test]
    fn win_delta_is_at_least_one() {
        for advantage in (0..=2000).step_by(50) {
            assert!(win_delta(1000 + advantage, 1000, 50) >= 1);
        }
        assert_eq!(win_delta(3000, 100, 100), 1);
    }

    #[test]
    fn win_delta_shrinks_as_winner_advantage_grows() {
        let mut previous = u32::MAX;
        for advantage in (0..=500).step_by(100) {
            let delta = win_delta(1500 + advantage, 1500, 0);
            assert!(delta < previous, "advantage {advantage} gave {delta}");
            previous = delta;
        }
    }

    #[test]
    fn win_delta_never_grows_point_by_point() {
        // Rounding and the one-point floor flatten the curve into plateaus
        let mut previous = u32::MAX;
        for winner in 0..=4000 {
            let delta = win_delta(winner, 2000, 50);
            assert!(delta <= previous, "winner {winner} gave {delta} after {previous}");
            previous = delta;
        }
        assert_eq!(win_delta(3000, 100, 100), win_delta(3100, 100, 100));
    }

    #[test]
    fn even_match_moves_half_k() {
        assert_eq!(win_delta(1500, 1500, 0), 20);
        assert_eq!(loss_delta(1500, 1500, 0), 20);
        assert_eq!(win_delta(1500, 1500, 40), 12);
    }

    #[test]
    fn applying_a_result_updates_both_records() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();
        let mut winner = record(1, 1500);
        winner.loss_streak = 2;
        let mut loser = record(2, 1500);
        loser.win_streak = 3;

        let (won, lost) = apply_result(&mut winner, &mut loser, at);
        assert_eq!(won.delta(), 20);
        assert_eq!(lost.delta(), -20);

        assert_eq!(winner.rating, 1520);
        assert_eq!(winner.season_high, 1520);
        assert_eq!(winner.games_played, 1);
        assert_eq!(winner.games_won, 1);
        assert_eq!(winner.win_streak, 1);
        assert_eq!(winner.loss_streak, 0);
        assert_eq!(winner.last_game_at, Some(at));

        assert_eq!(loser.rating, 1480);
        assert_eq!(loser.season_high, 1500);
        assert_eq!(loser.games_won, 0);
        assert_eq!(loser.win_streak, 0);
        assert_eq!(loser.loss_streak, 1);
    }

    #[test]
    fn rating_never_goes_below_zero() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();
        let mut winner = record(1, 10);
        let mut loser = record(2, 5);
        apply_result(&mut winner, &mut loser, at);
        assert_eq!(loser.rating, 0);
    }

    #[test]
    fn draw_favours_the_underdog() {
        let at = Utc.with_ymd_and_hms(2024, 6, 1, 18, 0, 0).unwrap();
        let mut strong = record(1, 1700);
        let mut weak = record(2, 1500);
        strong.win_streak = 4;
        let (strong_change, weak_change) = apply_draw(&mut strong, &mut weak, at);
        assert!(strong_change.delta() < 0);
        assert!(weak_change.delta() > 0);
        assert_eq!(strong.win_streak, 0);
        assert_eq!(strong.games_played, 1);
        assert_eq!(strong.season_high, 1700);
    }
}
