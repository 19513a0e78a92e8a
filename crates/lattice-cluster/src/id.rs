// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Identifier types for resources, tasks, and worker nodes.
//!
//! String encodings are bit-exact and round-trip:
//!
//! | Type | Encoding |
//! |------|----------|
//! | [`ResourceId`] | `<uuid>` |
//! | [`TaskId`] | `<resource-uuid>/<uuid>` |
//! | [`NodeId`] | `<instance-uuid>.<application-uuid>` |
//!
//! UUIDs render as lowercase hyphenated form, which sorts identically as
//! bytes and as strings. That property is what makes the lowest-NodeId
//! tie-break in routing deterministic without extra state.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised when parsing identifier strings.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum IdError {
    /// The string is not a valid resource id.
    #[error("invalid resource id '{0}'")]
    InvalidResourceId(String),

    /// The string is not a valid task id.
    #[error("malformed task id '{0}': expected '<resource>/<uuid>'")]
    InvalidTaskId(String),

    /// The string is not a valid node id.
    #[error("malformed node id '{0}': expected '<instance>.<application>'")]
    InvalidNodeId(String),
}

/// Globally unique identity of one resource.
///
/// Assigned at creation and stable for the resource's whole lifetime,
/// including across `unload`/`deserialize` cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(Uuid);

impl ResourceId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the bit-exact string form.
    pub fn as_string(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ResourceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|_| IdError::InvalidResourceId(s.to_string()))
    }
}

/// Identity of one in-flight asynchronous operation.
///
/// A task id is a composite of its owning [`ResourceId`] plus a unique
/// suffix. It carries no meaning outside the owning resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId {
    resource: ResourceId,
    suffix: Uuid,
}

impl TaskId {
    /// Generates a fresh task id owned by the given resource.
    pub fn generate(resource: ResourceId) -> Self {
        Self {
            resource,
            suffix: Uuid::new_v4(),
        }
    }

    /// The owning resource.
    pub fn resource_id(&self) -> ResourceId {
        self.resource
    }

    /// Returns the bit-exact string form, `<resource>/<uuid>`.
    pub fn as_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource, self.suffix)
    }
}

impl FromStr for TaskId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (resource, suffix) = s
            .split_once('/')
            .ok_or_else(|| IdError::InvalidTaskId(s.to_string()))?;

        if suffix.contains('/') {
            return Err(IdError::InvalidTaskId(s.to_string()));
        }

        let resource = resource
            .parse::<ResourceId>()
            .map_err(|_| IdError::InvalidTaskId(s.to_string()))?;

        let suffix =
            Uuid::parse_str(suffix).map_err(|_| IdError::InvalidTaskId(s.to_string()))?;

        Ok(Self { resource, suffix })
    }
}

/// Compound identity of one worker process.
///
/// A node is addressed by the pair `(instance, application)`: the instance
/// UUID identifies the host process slot, the application UUID identifies
/// which application's resources it hosts. If three applications scale
/// across two instances, the deployment has six addressable nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    instance: Uuid,
    application: Uuid,
}

impl NodeId {
    /// Builds a node id from its two halves.
    pub fn new(instance: Uuid, application: Uuid) -> Self {
        Self {
            instance,
            application,
        }
    }

    /// Generates a completely random node id. Used mostly in tests.
    pub fn generate() -> Self {
        Self {
            instance: Uuid::new_v4(),
            application: Uuid::new_v4(),
        }
    }

    /// The master node for an instance.
    ///
    /// By convention the master node is the node whose application id equals
    /// its instance id, so it is addressable knowing only the instance.
    pub fn master(instance: Uuid) -> Self {
        Self {
            instance,
            application: instance,
        }
    }

    /// The instance half of the identity.
    pub fn instance(&self) -> Uuid {
        self.instance
    }

    /// The application half of the identity.
    pub fn application(&self) -> Uuid {
        self.application
    }

    /// True if this node is the master node of its instance.
    pub fn is_master(&self) -> bool {
        self.instance == self.application
    }

    /// Returns the bit-exact string form, `<instance>.<application>`.
    pub fn as_string(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.instance, self.application)
    }
}

impl FromStr for NodeId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (instance, application) = s
            .split_once('.')
            .ok_or_else(|| IdError::InvalidNodeId(s.to_string()))?;

        if application.contains('.') {
            return Err(IdError::InvalidNodeId(s.to_string()));
        }

        let instance =
            Uuid::parse_str(instance).map_err(|_| IdError::InvalidNodeId(s.to_string()))?;
        let application =
            Uuid::parse_str(application).map_err(|_| IdError::InvalidNodeId(s.to_string()))?;

        Ok(Self {
            instance,
            application,
        })
    }
}

macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(D::Error::custom)
            }
        }
    };
}

string_serde!(ResourceId);
string_serde!(TaskId);
string_serde!(NodeId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_id_round_trip() {
        let id = ResourceId::generate();
        let parsed: ResourceId = id.as_string().parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_task_id_round_trip() {
        let task = TaskId::generate(ResourceId::generate());
        let parsed: TaskId = task.as_string().parse().unwrap();
        assert_eq!(task, parsed);
        assert_eq!(task.resource_id(), parsed.resource_id());
    }

    #[test]
    fn test_task_id_has_exactly_one_separator() {
        let task = TaskId::generate(ResourceId::generate());
        assert_eq!(task.as_string().matches('/').count(), 1);

        let garbled = format!("{}/extra", task.as_string());
        assert!(garbled.parse::<TaskId>().is_err());
    }

    #[test]
    fn test_node_id_round_trip() {
        let node = NodeId::generate();
        let parsed: NodeId = node.as_string().parse().unwrap();
        assert_eq!(node, parsed);
        assert_eq!(node.instance(), parsed.instance());
        assert_eq!(node.application(), parsed.application());
    }

    #[test]
    fn test_node_id_rejects_malformed() {
        assert!("not-a-node".parse::<NodeId>().is_err());
        assert!(format!("{}", Uuid::new_v4()).parse::<NodeId>().is_err());
        assert!(
            format!("{}.{}.{}", Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4())
                .parse::<NodeId>()
                .is_err()
        );
    }

    #[test]
    fn test_master_node_convention() {
        let instance = Uuid::new_v4();
        let master = NodeId::master(instance);
        assert!(master.is_master());
        assert_eq!(master.instance(), master.application());
        assert!(!NodeId::generate().is_master());
    }

    #[test]
    fn test_string_order_matches_value_order() {
        let mut nodes: Vec<NodeId> = (0..16).map(|_| NodeId::generate()).collect();
        let mut strings: Vec<String> = nodes.iter().map(NodeId::as_string).collect();
        nodes.sort();
        strings.sort();
        let sorted_as_strings: Vec<String> = nodes.iter().map(NodeId::as_string).collect();
        assert_eq!(strings, sorted_as_strings);
    }

    #[test]
    fn test_serde_uses_string_form() {
        let node = NodeId::generate();
        let json = serde_json::to_string(&node).unwrap();
        assert_eq!(json, format!("\"{}\"", node));
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(node, back);
    }
}
