// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The caller-facing contexts.
//!
//! Each context is a thin facade over the shared services owned by the
//! runtime. Callers hold contexts, never the services directly; the
//! runtime wires them together at startup.

use std::sync::Arc;

use lattice_cluster::{Path, ResourceId, TaskId};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CoreError, Result};
use crate::event::{Event, EventService, Observation};
use crate::module::ModuleLoader;
use crate::service::{Listing, ResourceService, Unlink};
use crate::sync::AsyncPublisher;
use crate::task::TaskRegistry;

/// Resource lifecycle: create, dispatch, destroy, unload.
pub struct ResourceContext {
    service: Arc<ResourceService>,
    loader: Arc<dyn ModuleLoader>,
}

impl ResourceContext {
    pub fn new(service: Arc<ResourceService>, loader: Arc<dyn ModuleLoader>) -> Self {
        Self { service, loader }
    }

    /// Instantiates a resource of the named module at `path` and returns
    /// its assigned id.
    pub fn create(&self, path: &Path, module: &str, args: &[Value]) -> Result<ResourceId> {
        self.service.create(self.loader.as_ref(), path, module, args)
    }

    /// Destroys the resource immediately. Outstanding tasks are failed
    /// with a resource-destroyed error before this returns.
    pub fn destroy(&self, resource_id: ResourceId) -> Result<()> {
        self.service.destroy(resource_id)
    }

    /// Evicts the resource from memory without terminating its tasks,
    /// returning the serialized state blob.
    pub async fn unload(&self, resource_id: ResourceId) -> Result<Vec<u8>> {
        self.service.unload(resource_id).await
    }

    /// Dispatches `method` on the resource with completion listeners.
    pub async fn invoke(
        &self,
        resource_id: ResourceId,
        method: &str,
        args: Vec<Value>,
        on_result: impl FnOnce(Value) + Send + 'static,
        on_error: impl FnOnce(CoreError) + Send + 'static,
    ) -> Result<TaskId> {
        self.service
            .invoke_with_listeners(resource_id, method, args, on_result, on_error)
            .await
    }
}

/// The path directory.
pub struct IndexContext {
    service: Arc<ResourceService>,
}

impl IndexContext {
    pub fn new(service: Arc<ResourceService>) -> Self {
        Self { service }
    }

    /// All directory entries matching `query`, fully buffered before the
    /// call returns.
    pub fn list(&self, query: &Path) -> Vec<Listing> {
        self.service.list(query)
    }

    /// Associates an existing resource with an additional path.
    pub fn link(&self, resource_id: ResourceId, destination: &Path) -> Result<()> {
        self.service.link(resource_id, destination)
    }

    /// Makes whatever `source` addresses also reachable via `destination`.
    pub fn link_path(&self, source: &Path, destination: &Path) -> Result<()> {
        self.service.link_path(source, destination)
    }

    /// Removes one path association, destroying the resource when the
    /// removed path was its last reference.
    pub fn unlink(&self, path: &Path) -> Result<Unlink> {
        self.service.unlink(path)
    }

    pub fn resource_id_at(&self, path: &Path) -> Option<ResourceId> {
        self.service.resource_id_at(path)
    }
}

/// Completion listeners for suspended tasks.
pub struct TaskContext {
    tasks: Arc<TaskRegistry>,
}

impl TaskContext {
    pub fn new(tasks: Arc<TaskRegistry>) -> Self {
        Self { tasks }
    }

    /// Registers the listener pair for `task_id`. At most one pair per
    /// task at a time.
    pub fn register(
        &self,
        task_id: TaskId,
        on_result: impl FnOnce(Value) + Send + 'static,
        on_error: impl FnOnce(CoreError) + Send + 'static,
    ) -> Result<()> {
        self.tasks.register(task_id, on_result, on_error)
    }

    /// Completes `task_id` with `result`; true if a listener was invoked.
    pub fn finish_with_result(&self, task_id: &TaskId, result: Value) -> bool {
        self.tasks.finish_with_result(task_id, result)
    }

    /// Fails `task_id` with `error`; true if a listener was invoked.
    pub fn finish_with_error(&self, task_id: &TaskId, error: CoreError) -> bool {
        self.tasks.finish_with_error(task_id, error)
    }
}

/// Event observation and posting, synchronous and deferred.
pub struct EventContext {
    service: Arc<EventService>,
    queue: Arc<AsyncPublisher<Event>>,
}

impl EventContext {
    /// Wires a deferred delivery queue of `queue_depth` events in front of
    /// `service`. Must be called inside a tokio runtime.
    pub fn new(service: Arc<EventService>, queue_depth: usize) -> Self {
        let queue = Arc::new(AsyncPublisher::new(queue_depth));
        let poster = Arc::clone(&service);
        drop(queue.subscribe(move |event: &Event| poster.post(event)));
        Self { service, queue }
    }

    pub fn observe<T, F>(&self, path: Path, name: impl Into<String>, receiver: F) -> Observation
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.service.observe(path, name, receiver)
    }

    pub fn observe_raw(
        &self,
        path: Path,
        name: impl Into<String>,
        receiver: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Observation {
        self.service.observe_raw(path, name, receiver)
    }

    /// Delivers to every matching receiver before returning.
    pub fn post(&self, event: &Event) {
        self.service.post(event);
    }

    /// Fire-and-forget: enqueues the event for the delivery worker.
    pub fn post_async(&self, event: Event) {
        self.queue.publish(event);
    }

    pub(crate) fn queue(&self) -> &Arc<AsyncPublisher<Event>> {
        &self.queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Protected;
    use serde_json::json;

    fn path(s: &str) -> Path {
        Path::from_path_string(s).unwrap()
    }

    #[tokio::test]
    async fn test_event_context_sync_and_deferred_paths_agree() {
        let context = EventContext::new(Arc::new(EventService::new()), 16);
        let seen = Arc::new(Protected::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let _observation = context.observe(path("game/1"), "scoreChanged", move |score: i64| {
            sink.write().push(score);
        });

        context.post(&Event::new(path("game/1"), "scoreChanged", 1));
        context.post_async(Event::new(path("game/1"), "scoreChanged", 2));

        // Give the delivery worker a moment to drain the queue.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(*seen.read(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_task_context_round_trip() {
        let context = TaskContext::new(Arc::new(TaskRegistry::new()));
        let task_id = TaskId::generate(ResourceId::generate());
        let seen = Arc::new(Protected::new(Vec::new()));

        let sink = Arc::clone(&seen);
        context
            .register(task_id, move |value| sink.write().push(value), |_| {})
            .unwrap();

        assert!(context.finish_with_result(&task_id, json!("ok")));
        assert!(!context.finish_with_result(&task_id, json!("late")));
        assert_eq!(*seen.read(), vec![json!("ok")]);
    }
}
