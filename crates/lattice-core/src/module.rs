// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resolution of module names to resource implementations.

use lattice_cluster::Path;
use serde_json::Value;

use crate::error::Result;
use crate::resource::Resource;

/// Resolves a module name to executable resource logic.
///
/// The loader is an external collaborator: what a "module" is (a script, a
/// compiled plugin, a fixture) is opaque to the runtime, which only hands
/// over the creation path, the module name, and the creation arguments.
/// An unresolvable name is [`CoreError::ModuleNotFound`].
///
/// [`CoreError::ModuleNotFound`]: crate::error::CoreError::ModuleNotFound
pub trait ModuleLoader: Send + Sync {
    /// Instantiates a new resource of the named module.
    fn load(&self, module: &str, path: &Path, args: &[Value]) -> Result<Box<dyn Resource>>;
}
