//! # Registry and Supervision
//!
//! Concurrent directories of running instances (by GUID) and encounters (by
//! instance GUID + boss ID). Each registry:
//!
//! * starts actors on demand and treats "already running" as success
//! * watches every actor's `JoinHandle` from a monitor task, logs crashes and
//!   removes the entry of that exact incarnation only
//! * answers lookups without blocking, with a typed "not found"
//!
//! A crashed encounter is reported to its instance as lost, which the
//! instance handles like a wipe. A crashed or stopped instance takes its
//! encounters down with it.

use crate::config::{EncounterConfig, InstanceConfig};
use crate::encounter::{spawn_encounter, EncounterHandle, EncounterLaunch, EncounterOutcome, EncounterReport};
use crate::error::RegistryError;
use crate::instance::{spawn_instance, InstanceHandle, InstanceLaunch};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::join_all;
use horizon_contracts::{
    ActorExit, ActorId, BossId, Collaborators, InstanceDefinition, InstanceGuid,
    InstanceGuidGenerator,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type EncounterKey = (InstanceGuid, BossId);

/// Supervisor of every boss encounter task.
pub struct EncounterSupervisor {
    encounters: Arc<DashMap<EncounterKey, EncounterHandle>>,
    config: EncounterConfig,
    collaborators: Collaborators,
}

impl EncounterSupervisor {
    pub fn new(config: EncounterConfig, collaborators: Collaborators) -> Self {
        Self {
            encounters: Arc::new(DashMap::new()),
            config,
            collaborators,
        }
    }

    /// Starts the encounter for `(instance, boss)`, or returns the one
    /// already running.
    pub fn start(&self, launch: EncounterLaunch) -> EncounterHandle {
        let key = (launch.instance, launch.template.id);
        let entry = self.encounters.entry(key);
        if let Entry::Occupied(existing) = &entry {
            if existing.get().is_alive() {
                return existing.get().clone();
            }
        }

        let reports = launch.reports.clone();
        let (handle, task) = spawn_encounter(launch, self.config, self.collaborators.clone());
        entry.insert(handle.clone());
        self.monitor(key, handle.actor_id(), task, reports);
        handle
    }

    fn monitor(
        &self,
        key: EncounterKey,
        actor_id: ActorId,
        task: JoinHandle<()>,
        reports: mpsc::UnboundedSender<EncounterReport>,
    ) {
        let encounters = Arc::clone(&self.encounters);
        tokio::spawn(async move {
            let exit = ActorExit::from_join(task.await);
            encounters.remove_if(&key, |_, handle| handle.actor_id() == actor_id);

            let (instance, boss_id) = key;
            let reason = match exit {
                ActorExit::Normal => {
                    debug!(instance = %instance, boss = %boss_id, "Encounter {} exited", actor_id);
                    return;
                }
                ActorExit::Panicked(reason) => {
                    error!(instance = %instance, boss = %boss_id, "💥 Encounter {} crashed: {}", actor_id, reason);
                    reason
                }
                ActorExit::Cancelled => {
                    warn!(instance = %instance, boss = %boss_id, "Encounter {} was cancelled", actor_id);
                    "cancelled".to_string()
                }
            };
            let _ = reports.send(EncounterReport {
                instance,
                boss_id,
                actor_id,
                outcome: EncounterOutcome::Lost(reason),
            });
        });
    }

    pub fn lookup(&self, instance: InstanceGuid, boss: BossId) -> Result<EncounterHandle, RegistryError> {
        self.encounters
            .get(&(instance, boss))
            .map(|entry| entry.value().clone())
            .ok_or(RegistryError::EncounterNotFound(instance, boss))
    }

    /// Forgets an encounter incarnation without stopping it.
    pub fn deregister(&self, instance: InstanceGuid, boss: BossId, actor_id: ActorId) {
        self.encounters
            .remove_if(&(instance, boss), |_, handle| handle.actor_id() == actor_id);
    }

    /// Stops and forgets every encounter of `instance`.
    pub async fn stop_instance(&self, instance: InstanceGuid) {
        let keys: Vec<EncounterKey> = self
            .encounters
            .iter()
            .filter(|entry| entry.key().0 == instance)
            .map(|entry| *entry.key())
            .collect();

        for key in keys {
            if let Some((_, handle)) = self.encounters.remove(&key) {
                if let Err(e) = handle.stop().await {
                    debug!(instance = %instance, "Encounter {} already stopped: {}", handle.boss_id(), e);
                }
            }
        }
    }

    pub fn count(&self) -> usize {
        self.encounters.len()
    }

    pub fn count_for(&self, instance: InstanceGuid) -> usize {
        self.encounters
            .iter()
            .filter(|entry| entry.key().0 == instance)
            .count()
    }

    pub async fn shutdown_all(&self) {
        let handles: Vec<EncounterHandle> = self
            .encounters
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.encounters.clear();
        join_all(handles.iter().map(|handle| handle.stop())).await;
    }
}

/// Directory and supervisor of instance tasks.
pub struct InstanceRegistry {
    instances: Arc<DashMap<InstanceGuid, InstanceHandle>>,
    encounters: Arc<EncounterSupervisor>,
    guids: InstanceGuidGenerator,
    config: InstanceConfig,
    collaborators: Collaborators,
    shutting_down: AtomicBool,
}

impl InstanceRegistry {
    pub fn new(config: InstanceConfig, collaborators: Collaborators) -> Self {
        Self {
            instances: Arc::new(DashMap::new()),
            encounters: Arc::new(EncounterSupervisor::new(config.encounter, collaborators.clone())),
            guids: InstanceGuidGenerator::new(),
            config,
            collaborators,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Creates a new instance under a freshly generated GUID.
    pub fn create_instance(&self, launch: InstanceLaunch) -> Result<InstanceHandle, RegistryError> {
        let guid = self.guids.next_guid();
        self.start_instance(guid, launch)
    }

    /// Starts an instance under `guid`, or returns the running one.
    pub fn start_instance(&self, guid: InstanceGuid, launch: InstanceLaunch) -> Result<InstanceHandle, RegistryError> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(RegistryError::ShuttingDown);
        }

        let entry = self.instances.entry(guid);
        if let Entry::Occupied(existing) = &entry {
            if existing.get().is_alive() {
                return Ok(existing.get().clone());
            }
        }

        let definition = self
            .collaborators
            .templates
            .instance(launch.definition_id)
            .unwrap_or_else(|| {
                debug!("No definition {}, using stub", launch.definition_id);
                Arc::new(InstanceDefinition::stub(launch.definition_id))
            });

        let (handle, task) = spawn_instance(
            guid,
            launch,
            definition,
            self.config,
            self.collaborators.clone(),
            Arc::clone(&self.encounters),
        );
        entry.insert(handle.clone());
        self.monitor(guid, handle.actor_id(), task);
        Ok(handle)
    }

    fn monitor(&self, guid: InstanceGuid, actor_id: ActorId, task: JoinHandle<()>) {
        let instances = Arc::clone(&self.instances);
        let encounters = Arc::clone(&self.encounters);
        tokio::spawn(async move {
            let exit = ActorExit::from_join(task.await);
            instances.remove_if(&guid, |_, handle| handle.actor_id() == actor_id);
            if let ActorExit::Panicked(reason) = &exit {
                error!(instance = %guid, "💥 Instance {} crashed: {}", actor_id, reason);
            }
            if exit != ActorExit::Normal {
                encounters.stop_instance(guid).await;
            }
        });
    }

    pub fn lookup_instance(&self, guid: InstanceGuid) -> Result<InstanceHandle, RegistryError> {
        self.instances
            .get(&guid)
            .map(|entry| entry.value().clone())
            .ok_or(RegistryError::InstanceNotFound(guid))
    }

    pub fn lookup_encounter(&self, guid: InstanceGuid, boss: BossId) -> Result<EncounterHandle, RegistryError> {
        self.encounters.lookup(guid, boss)
    }

    pub async fn stop_instance(&self, guid: InstanceGuid) -> Result<(), RegistryError> {
        let handle = self.lookup_instance(guid)?;
        handle
            .stop()
            .await
            .map_err(|_| RegistryError::InstanceNotFound(guid))
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn encounter_count(&self) -> usize {
        self.encounters.count()
    }

    pub fn encounters(&self) -> &Arc<EncounterSupervisor> {
        &self.encounters
    }

    /// Stops every instance and encounter, waiting up to `grace` for the
    /// instance tasks to exit.
    pub async fn shutdown_all(&self, grace: Duration) {
        self.shutting_down.store(true, Ordering::Release);
        let handles: Vec<InstanceHandle> = self
            .instances
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        info!("🛑 Stopping {} instance(s)", handles.len());

        join_all(handles.iter().map(|handle| handle.stop())).await;

        let deadline = tokio::time::Instant::now() + grace;
        while !self.instances.is_empty() && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        if !self.instances.is_empty() {
            warn!("⚠️ {} instance(s) still running after shutdown grace period", self.instances.len());
        }
        self.encounters.shutdown_all().await;
    }
}
