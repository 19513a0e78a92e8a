// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resource storage, the path directory, and per-resource dispatch.
//!
//! One service instance owns every resident resource on this node together
//! with the path directory that addresses them. Directory operations are
//! linearizable per path: a single read-write lock guards the maps, so no
//! listing can observe a half-completed link or unlink.
//!
//! Dispatch is serialized per resource. Each resident resource sits behind
//! its own async mutex; many resources execute concurrently but a single
//! resource never sees two dispatches at once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use lattice_cluster::{NodeId, Path, ResourceId, TaskId};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::{CoreError, Result};
use crate::module::ModuleLoader;
use crate::monitor::InstanceResourceMonitor;
use crate::resource::{
    Invocation, Resource, ResumeReason, deserialize_buffered, serialize_buffered,
};
use crate::sync::Protected;
use crate::task::TaskRegistry;

/// One directory entry returned by [`ResourceService::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub path: Path,
    pub resource_id: ResourceId,
}

/// Outcome of an unlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unlink {
    pub resource_id: ResourceId,
    /// True when the unlinked path was the last reference and the resource
    /// was destroyed as a consequence.
    pub is_destroyed: bool,
}

type SharedResource = Arc<Mutex<Box<dyn Resource>>>;

#[derive(Default)]
struct ServiceState {
    resources: HashMap<ResourceId, SharedResource>,
    directory: HashMap<Path, ResourceId>,
    references: HashMap<ResourceId, HashSet<Path>>,
}

struct Hosting {
    node: NodeId,
    instances: Arc<InstanceResourceMonitor>,
}

/// Owns the resident resources and the directory addressing them.
pub struct ResourceService {
    state: Protected<ServiceState>,
    tasks: Arc<TaskRegistry>,
    hosting: Option<Hosting>,
}

impl ResourceService {
    pub fn new(tasks: Arc<TaskRegistry>) -> Self {
        Self {
            state: Protected::new(ServiceState::default()),
            tasks,
            hosting: None,
        }
    }

    /// Reports this node's hosted-resource count to `instances` as
    /// resources are created and destroyed.
    pub fn with_hosting(mut self, node: NodeId, instances: Arc<InstanceResourceMonitor>) -> Self {
        self.hosting = Some(Hosting { node, instances });
        self
    }

    /// The completion listener registry shared with this service.
    pub fn tasks(&self) -> &Arc<TaskRegistry> {
        &self.tasks
    }

    fn note_hosted(&self) {
        if let Some(hosting) = &self.hosting {
            hosting.instances.increment(hosting.node);
        }
    }

    fn note_unhosted(&self) {
        if let Some(hosting) = &self.hosting {
            hosting.instances.decrement(&hosting.node);
        }
    }

    /// Instantiates a resource of the named module and links it at `path`.
    ///
    /// A wildcard-terminated path has its wildcard replaced with a fresh
    /// UUID component, so concurrent creators under the same prefix never
    /// collide. Returns the assigned resource id.
    #[instrument(skip(self, loader, args), fields(path = %path, module = module))]
    pub fn create(
        &self,
        loader: &dyn ModuleLoader,
        path: &Path,
        module: &str,
        args: &[Value],
    ) -> Result<ResourceId> {
        let path = path.append_uuid_if_wildcard();
        if path.is_wildcard() {
            return Err(CoreError::bad_request(
                "cannot create a resource at a wildcard path",
            ));
        }

        let resource = loader.load(module, &path, args)?;
        let resource_id = resource.id();

        {
            let mut state = self.state.write();
            if state.directory.contains_key(&path) {
                return Err(CoreError::bad_request(format!(
                    "path '{path}' is already linked"
                )));
            }
            state
                .resources
                .insert(resource_id, Arc::new(Mutex::new(resource)));
            state.directory.insert(path.clone(), resource_id);
            state
                .references
                .entry(resource_id)
                .or_default()
                .insert(path.clone());
        }

        self.note_hosted();
        info!(resource_id = %resource_id, "resource created");
        Ok(resource_id)
    }

    /// Destroys the resource immediately.
    ///
    /// Every path referencing it is removed from the directory and every
    /// task still outstanding on it is failed with a resource-destroyed
    /// error before this call returns.
    #[instrument(skip(self), fields(resource_id = %resource_id))]
    pub fn destroy(&self, resource_id: ResourceId) -> Result<()> {
        {
            let mut state = self.state.write();
            let evicted = state.resources.remove(&resource_id).is_some();
            let paths = state.references.remove(&resource_id);
            if !evicted && paths.is_none() {
                return Err(CoreError::not_found(resource_id));
            }
            for path in paths.into_iter().flatten() {
                state.directory.remove(&path);
            }
        }

        let failed = self.tasks.fail_all_for_resource(
            resource_id,
            &CoreError::ResourceDestroyed { resource_id },
        );
        self.note_unhosted();
        info!(failed_tasks = failed, "resource destroyed");
        Ok(())
    }

    /// Evicts the resource from memory without terminating its tasks,
    /// returning its serialized state for later reconstitution. Directory
    /// entries and task listeners stay in place.
    #[instrument(skip(self), fields(resource_id = %resource_id))]
    pub async fn unload(&self, resource_id: ResourceId) -> Result<Vec<u8>> {
        let resource = {
            let mut state = self.state.write();
            state
                .resources
                .remove(&resource_id)
                .ok_or_else(|| CoreError::not_found(resource_id))?
        };

        let guard = resource.lock().await;
        let mut blob = Vec::new();
        serialize_buffered(guard.as_ref(), &mut blob)?;
        debug!(bytes = blob.len(), "resource unloaded");
        Ok(blob)
    }

    /// Reconstitutes a previously unloaded resource from its state blob.
    ///
    /// The resource must still be referenced by the directory; restoring
    /// an unknown or already-resident resource is a bad request.
    pub fn restore(&self, mut resource: Box<dyn Resource>, blob: &[u8]) -> Result<()> {
        let resource_id = resource.id();
        deserialize_buffered(resource.as_mut(), blob)?;

        let mut state = self.state.write();
        if !state.references.contains_key(&resource_id) {
            return Err(CoreError::bad_request(format!(
                "resource '{resource_id}' has no directory references to restore into"
            )));
        }
        if state.resources.contains_key(&resource_id) {
            return Err(CoreError::bad_request(format!(
                "resource '{resource_id}' is already resident"
            )));
        }
        state
            .resources
            .insert(resource_id, Arc::new(Mutex::new(resource)));
        Ok(())
    }

    /// Associates an existing resource with an additional path.
    pub fn link(&self, resource_id: ResourceId, destination: &Path) -> Result<()> {
        if destination.is_wildcard() {
            return Err(CoreError::bad_request(
                "cannot link a resource at a wildcard path",
            ));
        }

        let mut state = self.state.write();
        if !state.references.contains_key(&resource_id) && !state.resources.contains_key(&resource_id)
        {
            return Err(CoreError::not_found(resource_id));
        }
        if state.directory.contains_key(destination) {
            return Err(CoreError::bad_request(format!(
                "path '{destination}' is already linked"
            )));
        }
        state.directory.insert(destination.clone(), resource_id);
        state
            .references
            .entry(resource_id)
            .or_default()
            .insert(destination.clone());
        Ok(())
    }

    /// Makes whatever `source` addresses also reachable via `destination`.
    pub fn link_path(&self, source: &Path, destination: &Path) -> Result<()> {
        if destination.is_wildcard() {
            return Err(CoreError::bad_request(
                "cannot link a resource at a wildcard path",
            ));
        }

        let mut state = self.state.write();
        let resource_id = *state
            .directory
            .get(source)
            .ok_or_else(|| CoreError::not_found(source))?;
        if state.directory.contains_key(destination) {
            return Err(CoreError::bad_request(format!(
                "path '{destination}' is already linked"
            )));
        }
        state.directory.insert(destination.clone(), resource_id);
        state
            .references
            .entry(resource_id)
            .or_default()
            .insert(destination.clone());
        Ok(())
    }

    /// Removes one path association.
    ///
    /// When the removed path was the resource's last reference the resource
    /// is destroyed as well, its outstanding tasks failed before this call
    /// returns, and the result reports `is_destroyed = true`.
    #[instrument(skip(self), fields(path = %path))]
    pub fn unlink(&self, path: &Path) -> Result<Unlink> {
        if path.is_wildcard() {
            return Err(CoreError::bad_request("cannot unlink a wildcard path"));
        }

        let unlink = {
            let mut state = self.state.write();
            let resource_id = state
                .directory
                .remove(path)
                .ok_or_else(|| CoreError::not_found(path))?;

            let last_reference = match state.references.get_mut(&resource_id) {
                Some(paths) => {
                    paths.remove(path);
                    paths.is_empty()
                }
                None => {
                    warn!(resource_id = %resource_id, "directory entry without reference set");
                    true
                }
            };

            if last_reference {
                state.references.remove(&resource_id);
                state.resources.remove(&resource_id);
            }
            Unlink {
                resource_id,
                is_destroyed: last_reference,
            }
        };

        if unlink.is_destroyed {
            let resource_id = unlink.resource_id;
            let failed = self
                .tasks
                .fail_all_for_resource(resource_id, &CoreError::ResourceDestroyed { resource_id });
            self.note_unhosted();
            info!(resource_id = %resource_id, failed_tasks = failed, "last reference unlinked, resource destroyed");
        }
        Ok(unlink)
    }

    /// All directory entries matching `query`, fully buffered.
    pub fn list(&self, query: &Path) -> Vec<Listing> {
        self.state.with_read(|state| {
            state
                .directory
                .iter()
                .filter(|(path, _)| query.matches(path))
                .map(|(path, resource_id)| Listing {
                    path: path.clone(),
                    resource_id: *resource_id,
                })
                .collect()
        })
    }

    /// The resource id stored at exactly `path`.
    pub fn resource_id_at(&self, path: &Path) -> Option<ResourceId> {
        self.state.read().directory.get(path).copied()
    }

    /// True when the resource is known, resident or not.
    pub fn contains(&self, resource_id: ResourceId) -> bool {
        let state = self.state.read();
        state.resources.contains_key(&resource_id) || state.references.contains_key(&resource_id)
    }

    /// Dispatches `method` on the resource, registering `on_result` and
    /// `on_error` for the returned task.
    ///
    /// Dispatch is non-blocking from the resource's point of view: the
    /// method either completes inline (`on_result` is invoked before this
    /// returns) or suspends, in which case the listener pair waits in the
    /// task registry. Listeners are registered while the resource's own
    /// dispatch lock is still held, so a resume cannot slip in between
    /// suspension and registration.
    #[instrument(skip(self, args, on_result, on_error), fields(resource_id = %resource_id, method = method))]
    pub async fn invoke_with_listeners(
        &self,
        resource_id: ResourceId,
        method: &str,
        args: Vec<Value>,
        on_result: impl FnOnce(Value) + Send + 'static,
        on_error: impl FnOnce(CoreError) + Send + 'static,
    ) -> Result<TaskId> {
        let resource = self.resident(resource_id)?;
        let mut guard = resource.lock().await;

        match guard.invoke(method, args)? {
            Invocation::Pending(task_id) => {
                self.tasks.register(task_id, on_result, on_error)?;
                debug!(task_id = %task_id, "dispatch suspended");
                Ok(task_id)
            }
            Invocation::Complete(task_id, value) => {
                drop(guard);
                on_result(value);
                Ok(task_id)
            }
        }
    }

    /// Delivers a resume to the task's owning resource and completes the
    /// registered listeners accordingly.
    ///
    /// Resuming an unknown or already-terminal task is a logged no-op;
    /// nothing here ever throws back across the network boundary for that
    /// case.
    #[instrument(skip(self, reason), fields(task_id = %task_id))]
    pub async fn resume(&self, task_id: TaskId, reason: ResumeReason) {
        let resource_id = task_id.resource_id();
        let Ok(resource) = self.resident(resource_id) else {
            warn!(resource_id = %resource_id, "resume for non-resident resource ignored");
            return;
        };

        let acknowledged = {
            let mut guard = resource.lock().await;
            guard.resume(&task_id, reason.clone())
        };
        if !acknowledged {
            debug!("resume for unknown or terminal task ignored");
        }

        match reason {
            ResumeReason::Network { payload } => {
                self.tasks.finish_with_result(&task_id, payload);
            }
            ResumeReason::Scheduler { elapsed } => {
                let elapsed_ms = Value::from(elapsed.as_millis() as u64);
                self.tasks.finish_with_result(&task_id, elapsed_ms);
            }
            ResumeReason::Error { error } => {
                self.tasks.finish_with_error(&task_id, error);
            }
        }
    }

    fn resident(&self, resource_id: ResourceId) -> Result<SharedResource> {
        self.state
            .read()
            .resources
            .get(&resource_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(resource_id))
    }
}
