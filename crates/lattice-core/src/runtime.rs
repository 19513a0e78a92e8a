// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Runtime construction and lifecycle.
//!
//! Everything the contexts share is owned by one explicitly constructed
//! [`CoreRuntime`]: no process-wide statics, no ambient executors. The
//! builder collects the module loader and configuration, `start` wires the
//! services and registers the built-in operation table, and `shutdown`
//! tears the background work down again.

use std::sync::Arc;

use lattice_cluster::NodeId;
use tracing::{info, warn};

use crate::config::Config;
use crate::context::{EventContext, IndexContext, ResourceContext, TaskContext};
use crate::dispatch::{
    DispatchMode, OperationDescriptor, OperationRegistry, ParameterDescriptor, ParameterRole,
    RoutingKind,
};
use crate::error::{CoreError, Result};
use crate::event::EventService;
use crate::handler::HandlerContext;
use crate::module::ModuleLoader;
use crate::monitor::{InstanceResourceMonitor, ResourceAvailabilityMonitor};
use crate::routing::{
    Addressed, AggregateOrAddressed, Any, RemoteAddressRegistry, RoutingStrategy,
};
use crate::scheduler::SchedulerContext;
use crate::service::ResourceService;
use crate::task::TaskRegistry;

/// Builder for [`CoreRuntimeConfig`].
#[derive(Default)]
pub struct CoreRuntimeBuilder {
    loader: Option<Arc<dyn ModuleLoader>>,
    config: Option<Config>,
    node_id: Option<NodeId>,
}

impl CoreRuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// The module loader resolving resource implementations. Required.
    pub fn module_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Runtime configuration. Defaults to [`Config::default`].
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// This node's identity. Defaults to a freshly generated id.
    pub fn node_id(mut self, node_id: NodeId) -> Self {
        self.node_id = Some(node_id);
        self
    }

    pub fn build(self) -> Result<CoreRuntimeConfig> {
        let loader = self
            .loader
            .ok_or_else(|| CoreError::bad_request("a module loader is required"))?;
        Ok(CoreRuntimeConfig {
            loader,
            config: self.config.unwrap_or_default(),
            node_id: self.node_id.unwrap_or_else(NodeId::generate),
        })
    }
}

/// A validated runtime configuration, ready to start.
pub struct CoreRuntimeConfig {
    loader: Arc<dyn ModuleLoader>,
    config: Config,
    node_id: NodeId,
}

impl CoreRuntimeConfig {
    /// Wires the services and contexts and spawns the background workers.
    /// Must be called inside a tokio runtime.
    pub fn start(self) -> CoreRuntime {
        let tasks = Arc::new(TaskRegistry::new());
        let instances = Arc::new(InstanceResourceMonitor::new());
        let service = Arc::new(
            ResourceService::new(Arc::clone(&tasks))
                .with_hosting(self.node_id, Arc::clone(&instances)),
        );
        let events = Arc::new(EventService::new());

        let resource_context = Arc::new(ResourceContext::new(
            Arc::clone(&service),
            Arc::clone(&self.loader),
        ));
        let index_context = Arc::new(IndexContext::new(Arc::clone(&service)));
        let task_context = Arc::new(TaskContext::new(Arc::clone(&tasks)));
        let event_context = Arc::new(EventContext::new(
            Arc::clone(&events),
            self.config.event_queue_depth,
        ));
        let scheduler_context = Arc::new(SchedulerContext::new(
            Arc::clone(&service),
            self.config.scheduler_tick,
        ));
        let handler_context = Arc::new(HandlerContext::new(
            Arc::clone(&service),
            Arc::clone(&self.loader),
            self.config.handler_timeout,
        ));

        let operations = Arc::new(OperationRegistry::new());
        for descriptor in builtin_operations() {
            if let Err(error) = operations.register(descriptor) {
                warn!(%error, "skipping invalid built-in operation descriptor");
            }
        }

        info!(node_id = %self.node_id, operations = operations.len(), "runtime started");
        CoreRuntime {
            node_id: self.node_id,
            resource_context,
            index_context,
            task_context,
            event_context,
            scheduler_context,
            handler_context,
            operations,
            availability: Arc::new(ResourceAvailabilityMonitor::new()),
            instances,
            remotes: Arc::new(RemoteAddressRegistry::new()),
        }
    }
}

/// The running core: owns every context and background worker.
pub struct CoreRuntime {
    node_id: NodeId,
    resource_context: Arc<ResourceContext>,
    index_context: Arc<IndexContext>,
    task_context: Arc<TaskContext>,
    event_context: Arc<EventContext>,
    scheduler_context: Arc<SchedulerContext>,
    handler_context: Arc<HandlerContext>,
    operations: Arc<OperationRegistry>,
    availability: Arc<ResourceAvailabilityMonitor>,
    instances: Arc<InstanceResourceMonitor>,
    remotes: Arc<RemoteAddressRegistry>,
}

impl CoreRuntime {
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn resource_context(&self) -> &Arc<ResourceContext> {
        &self.resource_context
    }

    pub fn index_context(&self) -> &Arc<IndexContext> {
        &self.index_context
    }

    pub fn task_context(&self) -> &Arc<TaskContext> {
        &self.task_context
    }

    pub fn event_context(&self) -> &Arc<EventContext> {
        &self.event_context
    }

    pub fn scheduler_context(&self) -> &Arc<SchedulerContext> {
        &self.scheduler_context
    }

    pub fn handler_context(&self) -> &Arc<HandlerContext> {
        &self.handler_context
    }

    /// The transport-facing operation table.
    pub fn operations(&self) -> &Arc<OperationRegistry> {
        &self.operations
    }

    pub fn availability(&self) -> &Arc<ResourceAvailabilityMonitor> {
        &self.availability
    }

    pub fn instances(&self) -> &Arc<InstanceResourceMonitor> {
        &self.instances
    }

    pub fn remotes(&self) -> &Arc<RemoteAddressRegistry> {
        &self.remotes
    }

    /// Resolves an operation descriptor's routing kind to a strategy wired
    /// to this runtime's monitors and registries.
    pub fn routing_strategy(&self, kind: RoutingKind) -> Arc<dyn RoutingStrategy> {
        match kind {
            RoutingKind::Addressed => Arc::new(Addressed),
            RoutingKind::Any => Arc::new(Any::new(Arc::clone(&self.availability))),
            RoutingKind::AggregateOrAddressed => {
                Arc::new(AggregateOrAddressed::new(Arc::clone(&self.remotes)))
            }
        }
    }

    /// Stops timers and drains the deferred event queue.
    pub async fn shutdown(self) {
        self.scheduler_context.shutdown();

        let CoreRuntime { event_context, .. } = self;
        let queue = Arc::clone(event_context.queue());
        drop(event_context);
        match Arc::try_unwrap(queue) {
            Ok(queue) => queue.shutdown().await,
            Err(_) => warn!("event queue still shared at shutdown, skipping drain"),
        }
        info!("runtime stopped");
    }
}

/// The built-in remotely invokable operations, registered at startup.
fn builtin_operations() -> Vec<OperationDescriptor> {
    use DispatchMode::{Asynchronous, Synchronous};
    use ParameterRole::{Address, ErrorHandler, ResultHandler, Serialize};

    let op = |interface: &str,
              operation: &str,
              mode: DispatchMode,
              routing: Option<RoutingKind>,
              parameters: Vec<ParameterDescriptor>| {
        OperationDescriptor {
            interface: interface.to_string(),
            operation: operation.to_string(),
            mode,
            routing,
            parameters,
        }
    };
    let p = ParameterDescriptor::new;

    vec![
        op(
            "ResourceContext",
            "create",
            Asynchronous,
            Some(RoutingKind::Any),
            vec![
                p("path", Serialize),
                p("module", Serialize),
                p("args", Serialize),
                p("onCreated", ResultHandler),
                p("onFailure", ErrorHandler),
            ],
        ),
        op(
            "ResourceContext",
            "destroy",
            Asynchronous,
            Some(RoutingKind::Addressed),
            vec![
                p("resourceId", Address),
                p("onDestroyed", ResultHandler),
                p("onFailure", ErrorHandler),
            ],
        ),
        op(
            "ResourceContext",
            "invoke",
            Asynchronous,
            Some(RoutingKind::Addressed),
            vec![
                p("resourceId", Address),
                p("method", Serialize),
                p("args", Serialize),
                p("onResult", ResultHandler),
                p("onError", ErrorHandler),
            ],
        ),
        op(
            "IndexContext",
            "list",
            Synchronous,
            Some(RoutingKind::AggregateOrAddressed),
            vec![p("query", Serialize)],
        ),
        op(
            "IndexContext",
            "link",
            Asynchronous,
            Some(RoutingKind::Addressed),
            vec![
                p("resourceId", Address),
                p("destination", Serialize),
                p("onLinked", ResultHandler),
                p("onFailure", ErrorHandler),
            ],
        ),
        op(
            "IndexContext",
            "linkPath",
            Asynchronous,
            Some(RoutingKind::Addressed),
            vec![
                p("source", Serialize),
                p("destination", Serialize),
                p("onLinked", ResultHandler),
                p("onFailure", ErrorHandler),
            ],
        ),
        op(
            "IndexContext",
            "unlink",
            Asynchronous,
            Some(RoutingKind::Addressed),
            vec![
                p("path", Serialize),
                p("onUnlinked", ResultHandler),
                p("onFailure", ErrorHandler),
            ],
        ),
        op(
            "SchedulerContext",
            "resumeTaskAfterDelay",
            Asynchronous,
            Some(RoutingKind::Addressed),
            vec![
                p("taskId", Address),
                p("delayMs", Serialize),
            ],
        ),
        op(
            "SchedulerContext",
            "resumeFromNetwork",
            Asynchronous,
            Some(RoutingKind::Addressed),
            vec![p("taskId", Address), p("payload", Serialize)],
        ),
        op(
            "SchedulerContext",
            "resumeWithError",
            Asynchronous,
            Some(RoutingKind::Addressed),
            vec![p("taskId", Address), p("error", Serialize)],
        ),
        op(
            "HandlerContext",
            "invokeSingleUse",
            Synchronous,
            Some(RoutingKind::Any),
            vec![
                p("module", Serialize),
                p("args", Serialize),
                p("method", Serialize),
                p("methodArgs", Serialize),
            ],
        ),
        op(
            "EventContext",
            "post",
            Asynchronous,
            Some(RoutingKind::AggregateOrAddressed),
            vec![p("event", Serialize)],
        ),
    ]
}
