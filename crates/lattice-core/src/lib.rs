// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lattice Core - Distributed Resource Runtime
//!
//! This crate is the node-local half of the lattice cluster: it owns the
//! resident resources, the path directory addressing them, the suspend/
//! resume task machinery, and the event fabric. Node-to-node transport and
//! the module execution engine are external collaborators reached only
//! through the interfaces defined here.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        Transport / Codec                             │
//! │          (external; consults the OperationRegistry table)           │
//! └─────────────────────────────────────────────────────────────────────┘
//!           │ routed via RoutingStrategy + monitors
//!           ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          CoreRuntime                                 │
//! │  ResourceContext │ IndexContext │ TaskContext │ EventContext        │
//! │  SchedulerContext │ HandlerContext                                  │
//! └─────────────────────────────────────────────────────────────────────┘
//!           │                                   │
//!           ▼                                   ▼
//! ┌───────────────────────┐        ┌─────────────────────────────┐
//! │   ResourceService     │        │        EventService          │
//! │ resources + directory │        │  (path, name) receiver map   │
//! │ per-resource dispatch │        │  sync post / deferred queue  │
//! └───────────────────────┘        └─────────────────────────────┘
//!           │
//!           ▼
//! ┌───────────────────────┐
//! │     ModuleLoader      │
//! │ (external; name →     │
//! │  resource logic)      │
//! └───────────────────────┘
//! ```
//!
//! # Dispatch model
//!
//! A method invocation on a resource is non-blocking: it returns a
//! [`TaskId`](lattice_cluster::TaskId) once accepted and either completes
//! inline or suspends. A suspended task terminates on exactly one of a
//! network response, a scheduler timer, or an error; later resumes for the
//! same task are safe no-ops. Dispatch is serialized per resource while
//! distinct resources run concurrently.

pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod handler;
pub mod module;
pub mod monitor;
pub mod resource;
pub mod routing;
pub mod runtime;
pub mod scheduler;
pub mod service;
pub mod sync;
pub mod task;

pub use config::Config;
pub use context::{EventContext, IndexContext, ResourceContext, TaskContext};
pub use dispatch::{
    DispatchMode, OperationDescriptor, OperationRegistry, ParameterDescriptor, ParameterRole,
    RoutingKind,
};
pub use error::{CoreError, Result};
pub use event::{Event, EventHeader, EventService, Observation};
pub use handler::HandlerContext;
pub use module::ModuleLoader;
pub use monitor::{InstanceResourceMonitor, LoadReport, ResourceAvailabilityMonitor};
pub use resource::{Attributes, Invocation, Resource, ResumeReason};
pub use routing::{
    Addressed, AggregateOrAddressed, Any, RemoteAddressRegistry, RoutingAddressProvider,
    RoutingStrategy,
};
pub use runtime::{CoreRuntime, CoreRuntimeBuilder, CoreRuntimeConfig};
pub use scheduler::SchedulerContext;
pub use service::{Listing, ResourceService, Unlink};
pub use task::TaskRegistry;
