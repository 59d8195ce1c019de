//! Application lifecycle: configuration, runtime wiring and graceful shutdown.
//!
//! [`Runtime`] owns every long-lived piece of the process:
//!
//! * the instance registry (instances + boss encounters)
//! * the lockout reset manager
//! * the match supervisor and the arena queue feeding it
//! * the season scheduler
//!
//! and stops them in dependency order: the queue first so no new matches
//! start, then matches, instances, and finally the schedulers.

use crate::{
    cli::CliArgs,
    config::AppConfig,
    logging::display_banner,
    signals::{wait_for_shutdown_signal, wait_for_shutdown_signal_silent},
};
use horizon_contracts::{
    Collaborators, LoggingBroadcaster, MemoryPersistence, RecordingSpawner, StaticTemplateStore,
    SystemClock, TemplateStore,
};
use horizon_instances::{InstanceRegistry, LockoutManager, LockoutManagerHandle};
use horizon_pvp::{
    spawn_arena_queue, spawn_season_scheduler, ArenaQueueHandle, MatchLauncher, MatchSupervisor,
    SeasonSchedulerHandle,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Running actors of one process.
pub struct Runtime {
    pub instances: Arc<InstanceRegistry>,
    pub lockouts: LockoutManagerHandle,
    pub matches: Arc<MatchSupervisor>,
    pub queue: ArenaQueueHandle,
    pub season: SeasonSchedulerHandle,
    tasks: Vec<JoinHandle<()>>,
}

impl Runtime {
    /// Starts every actor against `collaborators`.
    pub fn start(config: &AppConfig, collaborators: Collaborators) -> Result<Self, String> {
        let instances = Arc::new(InstanceRegistry::new(config.instance_config()?, collaborators.clone()));
        let (lockouts, lockout_task) = LockoutManager::spawn(config.lockout_config()?, collaborators.clone());

        let matches = Arc::new(MatchSupervisor::new(config.match_timings(), collaborators.clone()));
        let launcher: Arc<dyn MatchLauncher> = matches.clone();
        let (queue, queue_task) = spawn_arena_queue(config.queue_config(), collaborators.clone(), launcher);
        matches.attach_queue(queue.clone());

        let (season, season_task) = spawn_season_scheduler(config.season_config(), collaborators);

        Ok(Self {
            instances,
            lockouts,
            matches,
            queue,
            season,
            tasks: vec![lockout_task, queue_task, season_task],
        })
    }

    pub fn log_status(&self) {
        info!(
            "📊 Runtime - {} instance(s) | {} encounter(s) | {} match(es) | {} finished",
            self.instances.instance_count(),
            self.instances.encounter_count(),
            self.matches.count(),
            self.matches.finished()
        );
    }

    /// Stops every actor, waiting up to `grace` per stage.
    pub async fn shutdown(self, grace: Duration) {
        info!("📡 Phase 1: Closing the arena queue...");
        if let Err(e) = self.queue.stop().await {
            warn!("⚠️ Arena queue already stopped: {}", e);
        }

        info!("⚔️ Phase 2: Stopping matches...");
        self.matches.shutdown_all(grace).await;

        info!("🏰 Phase 3: Stopping instances and encounters...");
        self.instances.shutdown_all(grace).await;

        info!("🗓️ Phase 4: Stopping schedulers...");
        if let Err(e) = self.lockouts.stop().await {
            warn!("⚠️ Lockout manager already stopped: {}", e);
        }
        if let Err(e) = self.season.stop().await {
            warn!("⚠️ Season scheduler already stopped: {}", e);
        }

        for task in self.tasks {
            if tokio::time::timeout(grace, task).await.is_err() {
                warn!("⏰ Background task did not stop within the grace period");
            }
        }
    }
}

/// The configured process: loaded settings plus production collaborators.
pub struct Application {
    config: AppConfig,
    collaborators: Collaborators,
}

impl Application {
    /// Loads configuration, applies CLI overrides, validates and loads the
    /// static templates.
    pub async fn new(args: CliArgs) -> Result<Self, Box<dyn std::error::Error>> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;
        apply_overrides(&mut config, &args);

        if let Err(e) = config.validate() {
            return Err(format!("Configuration validation failed: {e}").into());
        }
        info!("✅ Configuration loaded and validated successfully");

        display_banner();

        let templates = match config.templates_path() {
            Some(path) => {
                let store = StaticTemplateStore::load_from_file(path)?;
                info!("📚 Loaded {} template(s) from {}", store.len(), path.display());
                store
            }
            None => {
                warn!("⚠️ No templates file configured, every template falls back to a stub");
                StaticTemplateStore::default()
            }
        };
        let templates: Arc<dyn TemplateStore> = Arc::new(templates);

        let collaborators = Collaborators {
            persistence: Arc::new(MemoryPersistence::new()),
            broadcaster: Arc::new(LoggingBroadcaster),
            spawner: Arc::new(RecordingSpawner::new()),
            templates,
            clock: Arc::new(SystemClock),
        };

        Ok(Self { config, collaborators })
    }

    /// Runs until a shutdown signal, then stops the runtime gracefully.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        info!("🌟 Starting Horizon instance runtime");
        self.log_configuration_summary();

        let runtime = Runtime::start(&self.config, self.collaborators)?;
        let runtime = Arc::new(runtime);

        let monitoring_handle = (self.config.runtime.status_interval_secs > 0).then(|| {
            let runtime = Arc::clone(&runtime);
            let period = Duration::from_secs(self.config.runtime.status_interval_secs);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    runtime.log_status();
                }
            })
        });

        info!("✅ Horizon runtime is now running!");
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        wait_for_shutdown_signal().await?;

        // merciless shutdown
        tokio::spawn(async move {
            if let Err(e) = wait_for_shutdown_signal_silent().await {
                error!("Failed to set up merciless shutdown signal handler: {e}");
                return;
            }
            warn!("Shutdown handler received again! I'll make this quick.");
            std::process::exit(1);
        });

        if let Some(handle) = monitoring_handle {
            handle.abort();
            let _ = handle.await;
        }

        let runtime = match Arc::try_unwrap(runtime) {
            Ok(runtime) => runtime,
            Err(_) => return Err("runtime still shared at shutdown".into()),
        };
        runtime.log_status();
        runtime
            .shutdown(Duration::from_secs(self.config.runtime.shutdown_grace_secs))
            .await;

        info!("✅ Horizon runtime shutdown complete");
        Ok(())
    }

    fn log_configuration_summary(&self) {
        let config = &self.config;
        info!("📋 Configuration Summary:");
        info!(
            "  📬 Mailbox capacity: {} | instance idle timeout: {}s",
            config.runtime.mailbox_capacity, config.runtime.instance_idle_timeout_secs
        );
        info!(
            "  🔒 Resets: daily {:02}:00 UTC, weekly on {}",
            config.lockouts.daily_reset_hour, config.lockouts.weekly_reset_day
        );
        info!(
            "  🎯 Queue: window {}±{} up to {}, checked every {}s",
            config.queue.initial_window,
            config.queue.window_step,
            config.queue.max_window,
            config.queue.match_interval_secs
        );
        info!(
            "  ⏱️ Matches: {}s preparation, {}s active",
            config.matches.preparation_secs, config.matches.active_secs
        );
        match config.season.season_end {
            Some(end) => info!("  🏁 Season {} ends {}", config.season.season_id, end),
            None => info!("  🏁 Season {} has no end date", config.season.season_id),
        }
    }
}

/// Applies command-line overrides on top of the file configuration.
pub fn apply_overrides(config: &mut AppConfig, args: &CliArgs) {
    if let Some(templates) = &args.templates {
        config.data.templates = Some(templates.to_string_lossy().to_string());
    }
    if let Some(log_level) = &args.log_level {
        config.logging.level = log_level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }
}
