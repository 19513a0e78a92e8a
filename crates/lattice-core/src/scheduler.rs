// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Delayed and externally-driven task resumption.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lattice_cluster::TaskId;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::error::CoreError;
use crate::resource::ResumeReason;
use crate::service::ResourceService;
use crate::sync::Protected;

/// Resumes suspended tasks: after a delay, from a network response, or
/// with an error.
///
/// A task terminates on whichever resume reaches it first; later resumes
/// for the same task are no-ops. Timers are actual delays, rounded up to
/// the configured tick, and are cancelled wholesale on shutdown.
pub struct SchedulerContext {
    service: Arc<ResourceService>,
    tick: Duration,
    timers: Arc<Protected<HashMap<TaskId, JoinHandle<()>>>>,
}

impl SchedulerContext {
    pub fn new(service: Arc<ResourceService>, tick: Duration) -> Self {
        Self {
            service,
            tick,
            timers: Arc::new(Protected::new(HashMap::new())),
        }
    }

    /// Schedules a scheduler-sourced resume of `task_id` after `delay`.
    ///
    /// The delay is rounded up to the scheduler tick. Scheduling a second
    /// timer for the same task replaces the first. The resume carries the
    /// actually elapsed time, not the requested delay.
    #[instrument(skip(self), fields(task_id = %task_id, delay_ms = delay.as_millis() as u64))]
    pub fn resume_task_after_delay(&self, task_id: TaskId, delay: Duration) {
        let delay = self.round_to_tick(delay);
        let service = Arc::clone(&self.service);
        let timers = Arc::clone(&self.timers);

        // The map lock is held across the spawn so the insert is ordered
        // before the timer's own removal, even for a zero-length delay.
        let mut armed = self.timers.write();
        let handle = tokio::spawn(async move {
            let started = tokio::time::Instant::now();
            tokio::time::sleep(delay).await;
            timers.write().remove(&task_id);
            service
                .resume(
                    task_id,
                    ResumeReason::Scheduler {
                        elapsed: started.elapsed(),
                    },
                )
                .await;
        });

        if let Some(replaced) = armed.insert(task_id, handle) {
            debug!("replacing existing timer for task");
            replaced.abort();
        }
    }

    /// Delivers a network-origin result to a suspended task.
    pub async fn resume_from_network(&self, task_id: TaskId, payload: Value) {
        self.cancel_timer(&task_id);
        self.service
            .resume(task_id, ResumeReason::Network { payload })
            .await;
    }

    /// Delivers a failure to a suspended task.
    pub async fn resume_with_error(&self, task_id: TaskId, error: CoreError) {
        self.cancel_timer(&task_id);
        self.service
            .resume(task_id, ResumeReason::Error { error })
            .await;
    }

    /// Number of timers currently armed.
    pub fn pending_timers(&self) -> usize {
        self.timers.read().len()
    }

    /// Aborts every armed timer. Suspended tasks are left untouched; the
    /// resource owning them decides their fate (usually via destroy).
    pub fn shutdown(&self) {
        let drained: Vec<JoinHandle<()>> = {
            let mut timers = self.timers.write();
            timers.drain().map(|(_, handle)| handle).collect()
        };
        for handle in drained {
            handle.abort();
        }
    }

    fn cancel_timer(&self, task_id: &TaskId) {
        if let Some(handle) = self.timers.write().remove(task_id) {
            handle.abort();
        }
    }

    fn round_to_tick(&self, delay: Duration) -> Duration {
        if self.tick.is_zero() || delay.is_zero() {
            return delay;
        }
        let ticks = delay.as_nanos().div_ceil(self.tick.as_nanos());
        // Saturates for absurd delays instead of panicking.
        self.tick.saturating_mul(ticks.try_into().unwrap_or(u32::MAX))
    }
}
