// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for lattice-core integration tests.
//!
//! Provides a scripted module loader and a started runtime wrapped in a
//! TestContext.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::sync::Arc;

use serde_json::Value;

use lattice_cluster::{Path, ResourceId, TaskId};
use lattice_core::error::Result;
use lattice_core::{
    Attributes, Config, CoreError, CoreRuntime, CoreRuntimeBuilder, Invocation, ModuleLoader,
    Resource, ResumeReason,
};

/// A resource with one inline method, one accumulating method, and one
/// suspending method. Enough to exercise every dispatch shape.
pub struct ScriptedResource {
    id: ResourceId,
    attributes: Attributes,
    total: i64,
    pending: Vec<TaskId>,
}

impl ScriptedResource {
    pub fn new() -> Self {
        Self {
            id: ResourceId::generate(),
            attributes: Attributes::new(),
            total: 0,
            pending: Vec::new(),
        }
    }
}

impl Resource for ScriptedResource {
    fn id(&self) -> ResourceId {
        self.id
    }

    fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    fn invoke(&mut self, method: &str, args: Vec<Value>) -> Result<Invocation> {
        let task_id = TaskId::generate(self.id);
        match method {
            // Completes inline with its first argument.
            "echo" => Ok(Invocation::Complete(
                task_id,
                args.into_iter().next().unwrap_or(Value::Null),
            )),
            // Accumulates into serializable state, completes inline.
            "add" => {
                self.total += args.first().and_then(Value::as_i64).unwrap_or(0);
                Ok(Invocation::Complete(task_id, Value::from(self.total)))
            }
            // Suspends until resumed.
            "wait" => {
                self.pending.push(task_id);
                Ok(Invocation::Pending(task_id))
            }
            _ => Err(CoreError::MethodNotFound {
                resource_id: self.id,
                method: method.to_string(),
            }),
        }
    }

    fn resume(&mut self, task_id: &TaskId, _reason: ResumeReason) -> bool {
        match self.pending.iter().position(|pending| pending == task_id) {
            Some(index) => {
                self.pending.remove(index);
                true
            }
            None => false,
        }
    }

    fn tasks(&self) -> Vec<TaskId> {
        self.pending.clone()
    }

    fn serialize(&self, writer: &mut dyn Write) -> Result<()> {
        writer.write_all(&self.total.to_be_bytes())?;
        Ok(())
    }

    fn deserialize(&mut self, reader: &mut dyn Read) -> Result<()> {
        let mut bytes = [0_u8; 8];
        reader.read_exact(&mut bytes)?;
        self.total = i64::from_be_bytes(bytes);
        Ok(())
    }
}

/// Resolves the single "scripted" module.
pub struct ScriptedLoader;

impl ModuleLoader for ScriptedLoader {
    fn load(&self, module: &str, _path: &Path, _args: &[Value]) -> Result<Box<dyn Resource>> {
        match module {
            "scripted" => Ok(Box::new(ScriptedResource::new())),
            other => Err(CoreError::ModuleNotFound {
                module: other.to_string(),
            }),
        }
    }
}

/// A started runtime plus convenience accessors for tests.
pub struct TestContext {
    pub runtime: CoreRuntime,
}

impl TestContext {
    pub fn start() -> Self {
        Self::start_with_config(Config::default())
    }

    pub fn start_with_config(config: Config) -> Self {
        init_tracing();
        let runtime = CoreRuntimeBuilder::new()
            .module_loader(Arc::new(ScriptedLoader))
            .config(config)
            .build()
            .expect("runtime config must build")
            .start();
        Self { runtime }
    }

    pub async fn shutdown(self) {
        self.runtime.shutdown().await;
    }
}

/// Parses a path literal, panicking on typos in the test itself.
pub fn path(s: &str) -> Path {
    Path::from_path_string(s).expect(s)
}

/// Initializes test logging once; respects RUST_LOG.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
