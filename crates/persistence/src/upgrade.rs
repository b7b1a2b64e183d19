//! Background rewrite of save slots written with an older user data model.
//!
//! The job works on its own `StateStore` per file and only touches storage,
//! never the coordinator's live state, so it can run on the async compute
//! pool while the game keeps playing. Completion is observed by polling an
//! [`UpgradeHandle`] once per frame.

use std::sync::Arc;

use bevy::log::{error, info};
use bevy::tasks::{block_on, AsyncComputeTaskPool, Task, TaskPool};
use futures_lite::future;

use crate::persist_error::PersistError;
use crate::save_storage::SaveStorage;
use crate::state_store::{StateFactory, StateStore};

/// Inspects and possibly mutates one fully loaded save. Returning true
/// rewrites the slot (keeping a `.bak` of the original).
pub type UpgradeCallback = Box<dyn FnMut(&mut dyn StateStore) -> bool + Send>;

/// Outcome of one upgrade pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpgradeReport {
    pub examined: usize,
    pub upgraded: Vec<String>,
    pub failed: Vec<String>,
}

pub struct UpgradeJob {
    upgrade_always: bool,
    current_version: u32,
    callback: UpgradeCallback,
    storage: Arc<dyn SaveStorage>,
    factory: StateFactory,
}

impl UpgradeJob {
    pub fn new(
        upgrade_always: bool,
        current_version: u32,
        callback: UpgradeCallback,
        storage: Arc<dyn SaveStorage>,
        factory: StateFactory,
    ) -> Self {
        Self {
            upgrade_always,
            current_version,
            callback,
            storage,
            factory,
        }
    }

    /// Process every slot. A slot that fails is logged and skipped.
    pub fn run(mut self) -> UpgradeReport {
        let mut report = UpgradeReport::default();
        let slots = match self.storage.list_slots() {
            Ok(slots) => slots,
            Err(e) => {
                error!("Save upgrade: could not list save slots: {e}");
                return report;
            }
        };

        for slot in slots {
            report.examined += 1;
            match self.upgrade_slot(&slot) {
                Ok(true) => {
                    info!("Save upgrade: rewrote {slot}");
                    report.upgraded.push(slot);
                }
                Ok(false) => {}
                Err(e) => {
                    error!("Save upgrade: skipping {slot}: {e}");
                    report.failed.push(slot);
                }
            }
        }
        report
    }

    fn upgrade_slot(&mut self, slot: &str) -> Result<bool, PersistError> {
        let bytes = self.storage.read_slot(slot)?;
        let mut state = (self.factory)();
        state.load_from_bytes(&bytes, true)?;

        if !self.upgrade_always && !state.is_user_data_model_outdated(self.current_version) {
            return Ok(false);
        }
        if !(self.callback)(state.as_mut()) {
            return Ok(false);
        }

        state.mark_user_data_model_current(self.current_version);
        let upgraded = state.save_to_bytes()?;
        self.storage.backup_slot(slot)?;
        self.storage.write_slot(slot, &upgraded)?;
        Ok(true)
    }

    /// Run the job on the async compute pool.
    pub fn spawn(self) -> UpgradeHandle {
        let pool = AsyncComputeTaskPool::get_or_init(TaskPool::new);
        UpgradeHandle {
            task: Some(pool.spawn(async move { self.run() })),
            report: None,
        }
    }
}

/// Pollable completion handle for a spawned [`UpgradeJob`].
pub struct UpgradeHandle {
    task: Option<Task<UpgradeReport>>,
    report: Option<UpgradeReport>,
}

impl UpgradeHandle {
    /// Non-blocking. Returns the report once the job has finished.
    pub fn poll(&mut self) -> Option<&UpgradeReport> {
        if let Some(task) = self.task.as_mut() {
            if let Some(report) = block_on(future::poll_once(task)) {
                self.report = Some(report);
                self.task = None;
            }
        }
        self.report.as_ref()
    }

    pub fn is_done(&mut self) -> bool {
        self.poll().is_some()
    }
}
