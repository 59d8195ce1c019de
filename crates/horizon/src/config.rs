//! Configuration management for the Horizon instance runtime.
//!
//! The TOML file is split into one section per subsystem. Durations are
//! written as plain integers with the unit in the key name, and every field
//! has a default so partial files load. The typed configs the library crates
//! consume are built from here.

use chrono::{DateTime, Utc, Weekday};
use horizon_instances::{
    EncounterConfig, InstanceConfig, LockoutConfig, MythicConfig, ResetSchedule, RespawnPolicy,
};
use horizon_pvp::{DeserterPolicy, MatchTimings, QueueConfig, RewardTier, SeasonConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Application configuration loaded from TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub runtime: RuntimeSettings,
    #[serde(default)]
    pub encounters: EncounterSettings,
    #[serde(default)]
    pub mythic: MythicSettings,
    #[serde(default)]
    pub lockouts: LockoutSettings,
    #[serde(default)]
    pub queue: QueueSettings,
    #[serde(default)]
    pub matches: MatchSettings,
    #[serde(default)]
    pub season: SeasonSettings,
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Actor mailboxes, instance lifetime and shutdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Bounded mailbox size for instance, queue and match actors
    pub mailbox_capacity: usize,
    /// An empty instance stops itself after this long
    pub instance_idle_timeout_secs: u64,
    /// How long shutdown waits for actors to exit
    pub shutdown_grace_secs: u64,
    /// Period of the status report (0 to disable)
    pub status_interval_secs: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            mailbox_capacity: 128,
            instance_idle_timeout_secs: 15 * 60,
            shutdown_grace_secs: 10,
            status_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncounterSettings {
    pub tick_interval_ms: u64,
    pub max_initial_stagger_ms: u64,
    pub enrage_multiplier: f64,
    /// Extra damage taken during a moment of opportunity, in percent
    pub opportunity_vulnerability_pct: f64,
    pub opportunity_duration_secs: u64,
    pub respawn_base_secs: u64,
    pub respawn_per_death_secs: u64,
    pub respawn_max_secs: u64,
}

impl Default for EncounterSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            max_initial_stagger_ms: 3_000,
            enrage_multiplier: 10.0,
            opportunity_vulnerability_pct: 100.0,
            opportunity_duration_secs: 10,
            respawn_base_secs: 5,
            respawn_per_death_secs: 5,
            respawn_max_secs: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MythicSettings {
    pub death_penalty_secs: u64,
    /// Time limit growth per keystone level (0.05 = +5% per level)
    pub level_time_scaling: f64,
}

impl Default for MythicSettings {
    fn default() -> Self {
        Self {
            death_penalty_secs: 5,
            level_time_scaling: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutSettings {
    pub check_interval_secs: u64,
    /// UTC hour of the daily reset (0-23)
    pub daily_reset_hour: u32,
    /// Day of the weekly reset, e.g. "tue"
    pub weekly_reset_day: String,
}

impl Default for LockoutSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: 60,
            daily_reset_hour: 10,
            weekly_reset_day: "tue".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub match_interval_secs: u64,
    pub expansion_interval_secs: u64,
    pub initial_window: u32,
    pub window_step: u32,
    pub max_window: u32,
    pub entry_timeout_secs: u64,
    pub deserter_base_mins: i64,
    pub deserter_max_mins: i64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            match_interval_secs: 5,
            expansion_interval_secs: 30,
            initial_window: 100,
            window_step: 50,
            max_window: 500,
            entry_timeout_secs: 600,
            deserter_base_mins: 15,
            deserter_max_mins: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchSettings {
    pub preparation_secs: u64,
    pub active_secs: u64,
    pub ending_secs: u64,
    pub cleanup_secs: u64,
    pub score_tick_secs: u64,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            preparation_secs: 60,
            active_secs: 20 * 60,
            ending_secs: 10,
            cleanup_secs: 30,
            score_tick_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardTierSettings {
    pub min_rating: u32,
    pub glory: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonSettings {
    pub check_interval_secs: u64,
    pub decay_inactivity_days: i64,
    pub decay_amount: u32,
    pub decay_floor: u32,
    pub season_id: u32,
    /// RFC 3339 timestamp; finalisation never runs while unset
    pub season_end: Option<DateTime<Utc>>,
    pub reward_tiers: Vec<RewardTierSettings>,
}

impl Default for SeasonSettings {
    fn default() -> Self {
        let defaults = SeasonConfig::default();
        Self {
            check_interval_secs: defaults.check_interval.as_secs(),
            decay_inactivity_days: defaults.decay_inactivity.num_days(),
            decay_amount: defaults.decay_amount,
            decay_floor: defaults.decay_floor,
            season_id: defaults.season_id,
            season_end: defaults.season_end,
            reward_tiers: defaults
                .reward_tiers
                .iter()
                .map(|tier| RewardTierSettings {
                    min_rating: tier.min_rating,
                    glory: tier.glory,
                })
                .collect(),
        }
    }
}

/// Static data sources.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Templates TOML; stub templates are used when unset
    pub templates: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    pub level: String,
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl AppConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, a default configuration file is written at
    /// `path` and the defaults are returned.
    pub async fn load_from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let default_config = AppConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    pub fn templates_path(&self) -> Option<&Path> {
        self.data.templates.as_deref().map(Path::new)
    }

    pub fn weekly_reset_day(&self) -> Result<Weekday, String> {
        self.lockouts
            .weekly_reset_day
            .parse::<Weekday>()
            .map_err(|_| format!("Invalid weekly reset day: {}", self.lockouts.weekly_reset_day))
    }

    pub fn reset_schedule(&self) -> Result<ResetSchedule, String> {
        Ok(ResetSchedule {
            daily_hour: self.lockouts.daily_reset_hour,
            weekly_day: self.weekly_reset_day()?,
        })
    }

    pub fn encounter_config(&self) -> EncounterConfig {
        let encounters = &self.encounters;
        EncounterConfig {
            tick_interval: Duration::from_millis(encounters.tick_interval_ms),
            max_initial_stagger: Duration::from_millis(encounters.max_initial_stagger_ms),
            enrage_multiplier: encounters.enrage_multiplier,
            opportunity_vulnerability_pct: encounters.opportunity_vulnerability_pct,
            opportunity_duration: Duration::from_secs(encounters.opportunity_duration_secs),
            mailbox_capacity: self.runtime.mailbox_capacity,
        }
    }

    pub fn instance_config(&self) -> Result<InstanceConfig, String> {
        let encounters = &self.encounters;
        Ok(InstanceConfig {
            idle_timeout: Duration::from_secs(self.runtime.instance_idle_timeout_secs),
            mailbox_capacity: self.runtime.mailbox_capacity,
            mythic: MythicConfig {
                death_penalty: Duration::from_secs(self.mythic.death_penalty_secs),
                level_time_scaling: self.mythic.level_time_scaling,
            },
            respawn: RespawnPolicy {
                base_delay: Duration::from_secs(encounters.respawn_base_secs),
                per_death: Duration::from_secs(encounters.respawn_per_death_secs),
                max_delay: Duration::from_secs(encounters.respawn_max_secs),
                ..RespawnPolicy::default()
            },
            schedule: self.reset_schedule()?,
            encounter: self.encounter_config(),
        })
    }

    pub fn lockout_config(&self) -> Result<LockoutConfig, String> {
        Ok(LockoutConfig {
            check_interval: Duration::from_secs(self.lockouts.check_interval_secs),
            schedule: self.reset_schedule()?,
        })
    }

    pub fn queue_config(&self) -> QueueConfig {
        let queue = &self.queue;
        QueueConfig {
            match_interval: Duration::from_secs(queue.match_interval_secs),
            expansion_interval: Duration::from_secs(queue.expansion_interval_secs),
            initial_window: queue.initial_window,
            window_step: queue.window_step,
            max_window: queue.max_window,
            entry_timeout: Duration::from_secs(queue.entry_timeout_secs),
            mailbox_capacity: self.runtime.mailbox_capacity,
            deserter: DeserterPolicy {
                base: chrono::Duration::minutes(queue.deserter_base_mins),
                max: chrono::Duration::minutes(queue.deserter_max_mins),
                ..DeserterPolicy::default()
            },
        }
    }

    pub fn match_timings(&self) -> MatchTimings {
        let matches = &self.matches;
        MatchTimings {
            preparation: Duration::from_secs(matches.preparation_secs),
            active: Duration::from_secs(matches.active_secs),
            ending: Duration::from_secs(matches.ending_secs),
            cleanup: Duration::from_secs(matches.cleanup_secs),
            score_tick: Duration::from_secs(matches.score_tick_secs),
            mailbox_capacity: self.runtime.mailbox_capacity,
        }
    }

    pub fn season_config(&self) -> SeasonConfig {
        let season = &self.season;
        SeasonConfig {
            check_interval: Duration::from_secs(season.check_interval_secs),
            decay_inactivity: chrono::Duration::days(season.decay_inactivity_days),
            decay_amount: season.decay_amount,
            decay_floor: season.decay_floor,
            season_id: season.season_id,
            season_end: season.season_end,
            reward_tiers: season
                .reward_tiers
                .iter()
                .map(|tier| RewardTier {
                    min_rating: tier.min_rating,
                    glory: tier.glory,
                })
                .collect(),
        }
    }

    /// Validates the configuration for consistency and correctness.
    pub fn validate(&self) -> Result<(), String> {
        if self.runtime.mailbox_capacity == 0 {
            return Err("runtime.mailbox_capacity must be greater than 0".to_string());
        }

        let intervals = [
            ("encounters.tick_interval_ms", self.encounters.tick_interval_ms),
            ("lockouts.check_interval_secs", self.lockouts.check_interval_secs),
            ("queue.match_interval_secs", self.queue.match_interval_secs),
            ("queue.expansion_interval_secs", self.queue.expansion_interval_secs),
            ("queue.entry_timeout_secs", self.queue.entry_timeout_secs),
            ("matches.active_secs", self.matches.active_secs),
            ("matches.score_tick_secs", self.matches.score_tick_secs),
            ("season.check_interval_secs", self.season.check_interval_secs),
        ];
        if let Some((name, _)) = intervals.iter().find(|(_, value)| *value == 0) {
            return Err(format!("{name} must be greater than 0"));
        }

        if self.encounters.enrage_multiplier < 1.0 {
            return Err("encounters.enrage_multiplier must be at least 1.0".to_string());
        }
        if self.mythic.level_time_scaling < 0.0 {
            return Err("mythic.level_time_scaling cannot be negative".to_string());
        }
        if self.encounters.respawn_base_secs > self.encounters.respawn_max_secs {
            return Err("encounters.respawn_base_secs cannot exceed respawn_max_secs".to_string());
        }

        if self.lockouts.daily_reset_hour > 23 {
            return Err(format!(
                "Invalid daily reset hour: {}. Must be 0-23",
                self.lockouts.daily_reset_hour
            ));
        }
        self.weekly_reset_day()?;

        if self.queue.window_step == 0 {
            return Err("queue.window_step must be greater than 0".to_string());
        }
        if self.queue.initial_window > self.queue.max_window {
            return Err(format!(
                "queue.initial_window ({}) cannot exceed queue.max_window ({})",
                self.queue.initial_window, self.queue.max_window
            ));
        }
        if self.queue.deserter_base_mins <= 0 || self.queue.deserter_base_mins > self.queue.deserter_max_mins {
            return Err("queue.deserter_base_mins must be positive and at most deserter_max_mins".to_string());
        }

        if self.season.decay_inactivity_days <= 0 {
            return Err("season.decay_inactivity_days must be greater than 0".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn defaults_are_valid_and_match_library_defaults() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue_config(), QueueConfig::default());
        assert_eq!(config.match_timings(), MatchTimings::default());
        assert_eq!(config.season_config(), SeasonConfig::default());
        assert_eq!(config.lockout_config(), Ok(LockoutConfig::default()));
        assert_eq!(config.instance_config(), Ok(InstanceConfig::default()));
    }

    #[test]
    fn validation_rejects_inconsistent_values() {
        let mut config = AppConfig::default();
        config.queue.window_step = 0;
        assert!(config.validate().unwrap_err().contains("window_step"));

        let mut config = AppConfig::default();
        config.queue.initial_window = 600;
        assert!(config.validate().unwrap_err().contains("initial_window"));

        let mut config = AppConfig::default();
        config.matches.score_tick_secs = 0;
        assert_eq!(
            config.validate(),
            Err("matches.score_tick_secs must be greater than 0".to_string())
        );

        let mut config = AppConfig::default();
        config.lockouts.daily_reset_hour = 24;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.lockouts.weekly_reset_day = "someday".to_string();
        assert!(config.validate().unwrap_err().contains("weekly reset day"));

        let mut config = AppConfig::default();
        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [queue]
            initial_window = 150

            [lockouts]
            weekly_reset_day = "wed"

            [season]
            season_id = 4
            season_end = "2024-09-01T00:00:00Z"

            [data]
            templates = "data/templates.toml"
            "#,
        )
        .unwrap();

        assert_eq!(config.queue.initial_window, 150);
        assert_eq!(config.queue.window_step, 50);
        assert_eq!(config.reset_schedule().unwrap().weekly_day, Weekday::Wed);
        assert_eq!(config.matches, MatchSettings::default());
        let season = config.season_config();
        assert_eq!(season.season_id, 4);
        assert_eq!(season.season_end, Some(Utc.with_ymd_and_hms(2024, 9, 1, 0, 0, 0).unwrap()));
        assert_eq!(season.reward_tiers, SeasonConfig::default().reward_tiers);
        assert_eq!(config.templates_path(), Some(Path::new("data/templates.toml")));
    }

    #[tokio::test]
    async fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let created = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(created, AppConfig::default());
        assert!(path.exists());

        let reloaded = AppConfig::load_from_file(&path).await.unwrap();
        assert_eq!(reloaded, created);
    }

    #[tokio::test]
    async fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[queue\ninitial_window = ").await.unwrap();
        assert!(AppConfig::load_from_file(&path).await.is_err());
    }
}
