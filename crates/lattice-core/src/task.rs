// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Completion listener registry for suspended tasks.
//!
//! A dispatched method that suspends leaves a task outstanding; whoever
//! started the dispatch registers a listener pair here and is called back
//! exactly once when the task terminates. Exactly one finish wins: the
//! listener pair is removed before it is invoked, so a racing second
//! finish observes an unknown task and reports `false`.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use lattice_cluster::{ResourceId, TaskId};
use serde_json::Value;
use tracing::debug;

use crate::error::{CoreError, Result};

type ResultListener = Box<dyn FnOnce(Value) + Send>;
type ErrorListener = Box<dyn FnOnce(CoreError) + Send>;

struct Listeners {
    on_result: ResultListener,
    on_error: ErrorListener,
}

/// Maps outstanding task ids to their completion listeners.
///
/// The map sits behind a mutex rather than a read-write lock: the boxed
/// `FnOnce` listeners are `Send` but not `Sync`, and every finish mutates
/// the map anyway.
#[derive(Default)]
pub struct TaskRegistry {
    listeners: Mutex<HashMap<TaskId, Listeners>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, Listeners>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers the listener pair for `task_id`.
    ///
    /// At most one pair may be registered per task at a time; a second
    /// registration is [`CoreError::DuplicateTask`].
    pub fn register(
        &self,
        task_id: TaskId,
        on_result: impl FnOnce(Value) + Send + 'static,
        on_error: impl FnOnce(CoreError) + Send + 'static,
    ) -> Result<()> {
        let mut listeners = self.lock();
        if listeners.contains_key(&task_id) {
            return Err(CoreError::DuplicateTask { task_id });
        }
        listeners.insert(
            task_id,
            Listeners {
                on_result: Box::new(on_result),
                on_error: Box::new(on_error),
            },
        );
        Ok(())
    }

    /// Completes `task_id` with `result`. Returns true if a listener was
    /// invoked, false if the task was unknown or already resolved.
    pub fn finish_with_result(&self, task_id: &TaskId, result: Value) -> bool {
        let Some(listeners) = self.lock().remove(task_id) else {
            debug!(task_id = %task_id, "finish for unknown task ignored");
            return false;
        };
        (listeners.on_result)(result);
        true
    }

    /// Fails `task_id` with `error`. Returns true if a listener was
    /// invoked, false if the task was unknown or already resolved.
    pub fn finish_with_error(&self, task_id: &TaskId, error: CoreError) -> bool {
        let Some(listeners) = self.lock().remove(task_id) else {
            debug!(task_id = %task_id, "failure for unknown task ignored");
            return false;
        };
        (listeners.on_error)(error);
        true
    }

    /// Fails every outstanding task owned by `resource_id`. Returns how
    /// many listeners were invoked.
    pub fn fail_all_for_resource(&self, resource_id: ResourceId, error: &CoreError) -> usize {
        let drained: Vec<Listeners> = {
            let mut listeners = self.lock();
            let task_ids: Vec<TaskId> = listeners
                .keys()
                .filter(|task_id| task_id.resource_id() == resource_id)
                .copied()
                .collect();
            task_ids
                .into_iter()
                .filter_map(|task_id| listeners.remove(&task_id))
                .collect()
        };

        let count = drained.len();
        for listeners in drained {
            (listeners.on_error)(error.clone());
        }
        count
    }

    pub fn is_registered(&self, task_id: &TaskId) -> bool {
        self.lock().contains_key(task_id)
    }

    /// Number of currently outstanding tasks.
    pub fn outstanding(&self) -> usize {
        self.lock().len()
    }
}
