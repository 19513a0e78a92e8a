// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Destination selection for outbound operations.
//!
//! A [`RoutingStrategy`] turns an operation's addressing information into a
//! concrete set of destination nodes. An empty destination set is always an
//! error, never a silent no-op: every strategy either produces at least one
//! node or fails.

use std::collections::BTreeSet;
use std::sync::Arc;

use lattice_cluster::NodeId;
use tracing::instrument;

use crate::error::{CoreError, Result};
use crate::monitor::ResourceAvailabilityMonitor;
use crate::sync::Protected;

/// Source of an explicit destination address for an operation.
pub trait RoutingAddressProvider {
    /// The address the caller pinned the operation to, if any.
    fn routing_address(&self) -> Option<NodeId>;
}

impl RoutingAddressProvider for Option<NodeId> {
    fn routing_address(&self) -> Option<NodeId> {
        *self
    }
}

/// Picks destination nodes for an operation.
pub trait RoutingStrategy: Send + Sync {
    /// Resolves the destination set. Never returns an empty set.
    fn destination_addresses(
        &self,
        provider: &dyn RoutingAddressProvider,
    ) -> Result<BTreeSet<NodeId>>;
}

/// Routes to exactly the node the caller addressed.
///
/// An operation reaching this strategy without an address is malformed.
#[derive(Debug, Default)]
pub struct Addressed;

impl RoutingStrategy for Addressed {
    fn destination_addresses(
        &self,
        provider: &dyn RoutingAddressProvider,
    ) -> Result<BTreeSet<NodeId>> {
        match provider.routing_address() {
            Some(node) => Ok(BTreeSet::from([node])),
            None => Err(CoreError::bad_request(
                "addressed operation carries no routing address",
            )),
        }
    }
}

/// Routes to any one suitable node, preferring the least loaded.
///
/// Explicit addresses are ignored: the availability monitor alone picks the
/// destination. With no load reports yet the cluster cannot take the
/// operation at all.
pub struct Any {
    monitor: Arc<ResourceAvailabilityMonitor>,
}

impl Any {
    pub fn new(monitor: Arc<ResourceAvailabilityMonitor>) -> Self {
        Self { monitor }
    }
}

impl RoutingStrategy for Any {
    #[instrument(skip_all)]
    fn destination_addresses(
        &self,
        _provider: &dyn RoutingAddressProvider,
    ) -> Result<BTreeSet<NodeId>> {
        match self.monitor.best_node() {
            Some(node) => Ok(BTreeSet::from([node])),
            None => Err(CoreError::NoNodesAvailable),
        }
    }
}

/// Routes to one addressed node, or fans out to every registered remote.
///
/// Aggregate operations (queries that must consult the whole cluster) use
/// this: an explicit address narrows them to one node, otherwise they go
/// everywhere.
pub struct AggregateOrAddressed {
    registry: Arc<RemoteAddressRegistry>,
}

impl AggregateOrAddressed {
    pub fn new(registry: Arc<RemoteAddressRegistry>) -> Self {
        Self { registry }
    }
}

impl RoutingStrategy for AggregateOrAddressed {
    #[instrument(skip_all)]
    fn destination_addresses(
        &self,
        provider: &dyn RoutingAddressProvider,
    ) -> Result<BTreeSet<NodeId>> {
        if let Some(node) = provider.routing_address() {
            return Ok(BTreeSet::from([node]));
        }
        let all = self.registry.snapshot();
        if all.is_empty() {
            return Err(CoreError::NoNodesAvailable);
        }
        Ok(all)
    }
}

/// The set of remote nodes currently reachable from this instance.
#[derive(Debug, Default)]
pub struct RemoteAddressRegistry {
    nodes: Protected<BTreeSet<NodeId>>,
}

impl RemoteAddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `node`. Returns false if it was already present.
    pub fn add(&self, node: NodeId) -> bool {
        self.nodes.write().insert(node)
    }

    /// Removes `node`. Returns false if it was not present.
    pub fn remove(&self, node: &NodeId) -> bool {
        self.nodes.write().remove(node)
    }

    /// All registered nodes, in id order.
    pub fn snapshot(&self) -> BTreeSet<NodeId> {
        self.nodes.read().clone()
    }

    pub fn contains(&self, node: &NodeId) -> bool {
        self.nodes.read().contains(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn node(seed: u128) -> NodeId {
        NodeId::new(Uuid::from_u128(seed), Uuid::from_u128(0xA99))
    }

    #[test]
    fn test_addressed_requires_an_address() {
        let strategy = Addressed;

        let destinations = strategy.destination_addresses(&Some(node(1))).unwrap();
        assert_eq!(destinations, BTreeSet::from([node(1)]));

        let err = strategy.destination_addresses(&None::<NodeId>).unwrap_err();
        assert_eq!(err.error_code(), "BAD_REQUEST");
    }

    #[test]
    fn test_any_ignores_explicit_address() {
        let monitor = Arc::new(ResourceAvailabilityMonitor::new());
        monitor.report(node(1), 0.0);
        let strategy = Any::new(monitor);

        let destinations = strategy.destination_addresses(&Some(node(9))).unwrap();
        assert_eq!(destinations, BTreeSet::from([node(1)]));
    }

    #[test]
    fn test_any_picks_least_loaded() {
        let monitor = Arc::new(ResourceAvailabilityMonitor::new());
        monitor.report(node(1), 0.8);
        monitor.report(node(2), 0.1);
        let strategy = Any::new(monitor);

        let destinations = strategy.destination_addresses(&None::<NodeId>).unwrap();
        assert_eq!(destinations, BTreeSet::from([node(2)]));
    }

    #[test]
    fn test_any_with_cold_cluster_is_an_error() {
        let strategy = Any::new(Arc::new(ResourceAvailabilityMonitor::new()));
        let err = strategy.destination_addresses(&None::<NodeId>).unwrap_err();
        assert_eq!(err.error_code(), "NO_NODES_AVAILABLE");
    }

    #[test]
    fn test_aggregate_fans_out_without_address() {
        let registry = Arc::new(RemoteAddressRegistry::new());
        registry.add(node(1));
        registry.add(node(2));
        let strategy = AggregateOrAddressed::new(Arc::clone(&registry));

        let destinations = strategy.destination_addresses(&None::<NodeId>).unwrap();
        assert_eq!(destinations, BTreeSet::from([node(1), node(2)]));

        let narrowed = strategy.destination_addresses(&Some(node(2))).unwrap();
        assert_eq!(narrowed, BTreeSet::from([node(2)]));
    }

    #[test]
    fn test_aggregate_with_empty_registry_is_an_error() {
        let strategy = AggregateOrAddressed::new(Arc::new(RemoteAddressRegistry::new()));
        let err = strategy.destination_addresses(&None::<NodeId>).unwrap_err();
        assert_eq!(err.error_code(), "NO_NODES_AVAILABLE");
    }

    #[test]
    fn test_registry_add_remove() {
        let registry = RemoteAddressRegistry::new();
        assert!(registry.add(node(1)));
        assert!(!registry.add(node(1)));
        assert!(registry.contains(&node(1)));
        assert!(registry.remove(&node(1)));
        assert!(!registry.remove(&node(1)));
        assert!(registry.snapshot().is_empty());
    }
}
