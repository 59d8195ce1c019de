//! Boss health scaling by difficulty and group size.
//!
//! `scaled = base × difficulty multiplier × player-count multiplier`, where
//! the difficulty multiplier is 1.0 / 1.5 / 2.0 for normal / veteran /
//! challenge and `1.5 + 0.1 × level` for Mythic+, and the player-count
//! multiplier is flat up to five players, grows by [`PLAYER_SLOPE`] per extra
//! player up to twenty, and by half that slope beyond.

use horizon_contracts::Difficulty;

/// Players covered by the base health value.
pub const BASE_GROUP_SIZE: usize = 5;
/// Group size after which the per-player slope halves.
pub const LARGE_GROUP_SIZE: usize = 20;
/// Health added per player between the base and large group sizes.
pub const PLAYER_SLOPE: f64 = 0.1;

pub fn difficulty_multiplier(difficulty: Difficulty, mythic_level: u8) -> f64 {
    match difficulty {
        Difficulty::Normal => 1.0,
        Difficulty::Veteran => 1.5,
        Difficulty::Challenge => 2.0,
        Difficulty::MythicPlus => 1.5 + 0.1 * f64::from(mythic_level),
    }
}

pub fn player_count_multiplier(players: usize) -> f64 {
    if players <= BASE_GROUP_SIZE {
        return 1.0;
    }
    let mid = players.min(LARGE_GROUP_SIZE) - BASE_GROUP_SIZE;
    let large = players.saturating_sub(LARGE_GROUP_SIZE);
    1.0 + mid as f64 * PLAYER_SLOPE + large as f64 * PLAYER_SLOPE / 2.0
}

/// Max health of a boss for the given group.
pub fn scaled_health(base: u64, difficulty: Difficulty, mythic_level: u8, players: usize) -> u64 {
    let multiplier = difficulty_multiplier(difficulty, mythic_level) * player_count_multiplier(players);
    ((base as f64) * multiplier).round().max(1.0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_player_normal_is_unscaled() {
        assert_eq!(scaled_health(1_000_000, Difficulty::Normal, 0, 5), 1_000_000);
        assert_eq!(scaled_health(1_000_000, Difficulty::Normal, 0, 1), 1_000_000);
    }

    #[test]
    fn difficulty_multipliers() {
        assert_eq!(difficulty_multiplier(Difficulty::Veteran, 0), 1.5);
        assert_eq!(difficulty_multiplier(Difficulty::Challenge, 0), 2.0);
        assert!((difficulty_multiplier(Difficulty::MythicPlus, 10) - 2.5).abs() < 1e-9);
    }

    #[test]
    fn player_slope_halves_above_twenty() {
        assert!((player_count_multiplier(10) - 1.5).abs() < 1e-9);
        assert!((player_count_multiplier(20) - 2.5).abs() < 1e-9);
        assert!((player_count_multiplier(40) - 3.5).abs() < 1e-9);

        let step_mid = player_count_multiplier(11) - player_count_multiplier(10);
        let step_large = player_count_multiplier(31) - player_count_multiplier(30);
        assert!((step_mid - 2.0 * step_large).abs() < 1e-9);
    }

    #[test]
    fn raid_health_combines_both_factors() {
        // veteran, 20 players: 1.5 × 2.5
        assert_eq!(scaled_health(100_000, Difficulty::Veteran, 0, 20), 375_000);
    }
}
