// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The addressable unit of work and its dispatch contract.

use std::collections::HashMap;
use std::io::{BufReader, BufWriter, Read, Write};
use std::time::Duration;

use lattice_cluster::{ResourceId, TaskId};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CoreError, Result};

/// Buffer size for the buffered serialize/deserialize adapters.
pub const IO_BUFFER_SIZE: usize = 4096;

/// Contextual key/value data attached to a resource.
///
/// Equality is full-map comparison: two bags are equal when every key maps
/// to an equal value.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Attributes {
    entries: HashMap<String, Value>,
}

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `key`, returning the previous value if any.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    /// Reads `key` as a `T`. A present value of the wrong shape is an
    /// [`CoreError::InvalidConversion`]; an absent key is `Ok(None)`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.entries.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
                CoreError::InvalidConversion {
                    what: format!("attribute '{key}'"),
                    details: e.to_string(),
                }
            }),
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }
}

/// Why a suspended task is being resumed.
#[derive(Debug, Clone)]
pub enum ResumeReason {
    /// A scheduler timer fired; carries the elapsed delay.
    Scheduler { elapsed: Duration },
    /// A network response arrived for the task.
    Network { payload: Value },
    /// The operation behind the task failed.
    Error { error: CoreError },
}

/// Outcome of dispatching a method on a resource.
///
/// Dispatch is non-blocking: a method either completes inline with a value
/// or suspends, leaving the task outstanding until a later resume.
#[derive(Debug, Clone)]
pub enum Invocation {
    /// The method suspended; the task completes via a later resume.
    Pending(TaskId),
    /// The method completed inline with this value.
    Complete(TaskId, Value),
}

impl Invocation {
    pub fn task_id(&self) -> TaskId {
        match self {
            Self::Pending(task_id) | Self::Complete(task_id, _) => *task_id,
        }
    }
}

/// A stateful, addressable unit of work.
///
/// Identity and the dispatch table live here; the paths that reference a
/// resource are owned by the directory, not by the resource itself. The
/// runtime serializes dispatch per resource, so `invoke` and `resume` are
/// never entered concurrently for one instance.
pub trait Resource: Send {
    /// The immutable identity assigned at creation.
    fn id(&self) -> ResourceId;

    /// The resource's attribute bag.
    fn attributes(&self) -> &Attributes;

    fn attributes_mut(&mut self) -> &mut Attributes;

    /// Dispatches `method` with `args`. A name missing from the dispatch
    /// table is [`CoreError::MethodNotFound`].
    fn invoke(&mut self, method: &str, args: Vec<Value>) -> Result<Invocation>;

    /// Resumes a suspended task. Returns false when `task_id` is unknown or
    /// already terminal; that case is a logged no-op for the caller, never
    /// an error across the network boundary.
    fn resume(&mut self, task_id: &TaskId, reason: ResumeReason) -> bool;

    /// The tasks currently outstanding on this resource.
    fn tasks(&self) -> Vec<TaskId>;

    /// Writes the implementation-opaque state blob.
    fn serialize(&self, writer: &mut dyn Write) -> Result<()>;

    /// Restores state from a blob previously written by [`serialize`].
    ///
    /// [`serialize`]: Resource::serialize
    fn deserialize(&mut self, reader: &mut dyn Read) -> Result<()>;
}

/// Buffered adapter over [`Resource::serialize`], using a fixed
/// [`IO_BUFFER_SIZE`] buffer and flushing before returning.
pub fn serialize_buffered(resource: &dyn Resource, writer: impl Write) -> Result<()> {
    let mut buffered = BufWriter::with_capacity(IO_BUFFER_SIZE, writer);
    resource.serialize(&mut buffered)?;
    buffered.flush()?;
    Ok(())
}

/// Buffered adapter over [`Resource::deserialize`].
pub fn deserialize_buffered(resource: &mut dyn Resource, reader: impl Read) -> Result<()> {
    let mut buffered = BufReader::with_capacity(IO_BUFFER_SIZE, reader);
    resource.deserialize(&mut buffered)
}
