//! # Horizon Instance Runtime - Main Entry Point
//!
//! Hosts the dungeon / raid instance actors and the competitive PvP actors of
//! a Horizon game server. This entry point handles CLI parsing,
//! configuration loading and application lifecycle management.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration
//! horizon
//!
//! # Specify custom configuration and static data
//! horizon --config production.toml --templates data/templates.toml
//!
//! # JSON logging for production
//! horizon --json-logs --log-level debug
//! ```
//!
//! ## Configuration
//!
//! The runtime loads configuration from a TOML file (default: `config.toml`).
//! If the file doesn't exist, a default configuration will be created.
//!
//! ## Signal Handling
//!
//! SIGINT / SIGTERM start a graceful shutdown; a second signal exits at once.

use tracing::error;

mod app;
mod cli;
mod config;
mod logging;
mod signals;

use app::Application;
use cli::CliArgs;

pub use app::{apply_overrides, Runtime};
pub use config::{
    AppConfig, DataSettings, EncounterSettings, LockoutSettings, LoggingSettings, MatchSettings,
    MythicSettings, QueueSettings, RuntimeSettings, SeasonSettings,
};

/// Parses arguments, sets up logging and runs the application until shutdown.
///
/// # Exit Codes
///
/// * **0**: Successful execution and shutdown
/// * **1**: Error during startup, configuration, or runtime
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Logging settings come from the file, before it is validated
    let mut config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();
    apply_overrides(&mut config, &args);

    if let Err(e) = logging::setup_logging(&config.logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    match Application::new(args).await {
        Ok(app) => {
            if let Err(e) = app.run().await {
                error!("❌ Application error: {:?}", e);
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("❌ Failed to start application: {e:?}");
            std::process::exit(1);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use horizon_contracts::{
        Bracket, CharacterId, DefinitionId, Difficulty, GroupId, InMemoryCollaborators,
        StaticTemplateStore, TeamId,
    };
    use horizon_instances::InstanceLaunch;
    use std::path::PathBuf;
    use std::time::Duration;

    fn memory() -> InMemoryCollaborators {
        InMemoryCollaborators::new(
            StaticTemplateStore::default(),
            Utc.with_ymd_and_hms(2024, 6, 5, 12, 0, 0).unwrap(),
        )
    }

    #[test]
    fn cli_overrides_win_over_the_file() {
        let mut config = AppConfig::default();
        let args = CliArgs {
            config_path: PathBuf::from("config.toml"),
            templates: Some(PathBuf::from("data/templates.toml")),
            log_level: Some("debug".to_string()),
            json_logs: true,
        };
        apply_overrides(&mut config, &args);
        assert_eq!(config.data.templates.as_deref(), Some("data/templates.toml"));
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json_format);
    }

    #[test]
    fn invalid_reset_day_refuses_to_start() {
        let mut config = AppConfig::default();
        config.lockouts.weekly_reset_day = "funday".to_string();
        assert!(config.instance_config().is_err());
        assert!(config.lockout_config().is_err());
    }

    #[tokio::test]
    async fn runtime_starts_and_shuts_down_cleanly() {
        let memory = memory();
        let runtime = Runtime::start(&AppConfig::default(), memory.bundle()).unwrap();

        let instance = runtime
            .instances
            .create_instance(InstanceLaunch::new(
                DefinitionId(1),
                Difficulty::Normal,
                GroupId(1),
                CharacterId(1),
            ))
            .unwrap();
        runtime
            .queue
            .join(TeamId(1), vec![CharacterId(2), CharacterId(3)], Bracket::TwoVsTwo)
            .await
            .unwrap();
        let battleground = runtime
            .matches
            .start_battleground(1, vec![CharacterId(4)], vec![CharacterId(5)])
            .unwrap();
        assert_eq!(runtime.instances.instance_count(), 1);
        assert_eq!(runtime.matches.count(), 1);
        assert!(runtime.season.run_now().await.unwrap().failed.is_empty());

        let instances = runtime.instances.clone();
        let matches = runtime.matches.clone();
        runtime.shutdown(Duration::from_secs(2)).await;

        assert_eq!(instances.instance_count(), 0);
        assert_eq!(matches.count(), 0);
        assert!(!instance.is_alive());
        assert!(!battleground.is_alive());
    }
}
