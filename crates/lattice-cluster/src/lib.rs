// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Lattice Cluster - addressing primitives
//!
//! This crate defines the global address space shared by every node in a
//! lattice deployment:
//!
//! - [`Path`]: hierarchical, optionally context-scoped, wildcard-aware address
//!   used both as a directory key and as an event channel key.
//! - [`ResourceId`]: globally unique identity of one resource for its lifetime.
//! - [`TaskId`]: identity of one in-flight asynchronous operation, owned by a
//!   resource. Meaningless without its owning resource.
//! - [`NodeId`]: compound `instance.application` identity of one worker
//!   process hosting a subset of resources for one application.
//!
//! All identifiers have bit-exact string encodings and round-trip through
//! `FromStr`/`Display`. Nothing here is async and nothing allocates beyond the
//! strings it stores; the runtime crate (`lattice-core`) builds on top.

pub mod id;
pub mod path;

pub use id::{IdError, NodeId, ResourceId, TaskId};
pub use path::{Path, PathError};
