// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Node availability and load tracking.
//!
//! The routing strategies consult these monitors to pick destinations.
//! Reports arrive from the transport layer as nodes announce themselves;
//! nothing here ages entries out, a node disappears when [`forget`] is
//! called for it.
//!
//! [`forget`]: ResourceAvailabilityMonitor::forget

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use lattice_cluster::NodeId;
use rand::seq::SliceRandom;
use tracing::debug;

use crate::sync::Protected;

/// A single load announcement from a node.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    /// Reported load, higher means busier. Units are up to the reporter;
    /// only relative order matters here.
    pub load: f64,
    /// When the report was recorded.
    pub reported_at: DateTime<Utc>,
}

/// Tracks which nodes can host resources and how loaded they are.
#[derive(Debug, Default)]
pub struct ResourceAvailabilityMonitor {
    reports: Protected<HashMap<NodeId, LoadReport>>,
}

impl ResourceAvailabilityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records (or replaces) the load report for `node`.
    pub fn report(&self, node: NodeId, load: f64) {
        debug!(node = %node, load, "load report");
        self.reports.write().insert(
            node,
            LoadReport {
                load,
                reported_at: Utc::now(),
            },
        );
    }

    /// Removes `node` from consideration. Unknown nodes are a no-op.
    pub fn forget(&self, node: &NodeId) {
        if self.reports.write().remove(node).is_some() {
            debug!(node = %node, "node forgotten");
        }
    }

    /// The least loaded known node. Ties break towards the smaller node id
    /// so that every instance picks the same winner.
    pub fn best_node(&self) -> Option<NodeId> {
        self.reports
            .read()
            .iter()
            .min_by(|(a_node, a), (b_node, b)| {
                a.load.total_cmp(&b.load).then_with(|| a_node.cmp(b_node))
            })
            .map(|(node, _)| *node)
    }

    /// A uniformly random known node, ignoring load.
    pub fn random_node(&self) -> Option<NodeId> {
        let nodes: Vec<NodeId> = self.reports.read().keys().copied().collect();
        nodes.choose(&mut rand::thread_rng()).copied()
    }

    /// Every node with a current report, in id order.
    pub fn known_nodes(&self) -> BTreeSet<NodeId> {
        self.reports.read().keys().copied().collect()
    }

    /// The report currently held for `node`.
    pub fn report_for(&self, node: &NodeId) -> Option<LoadReport> {
        self.reports.read().get(node).cloned()
    }
}

/// Counts resources hosted per node on this instance's behalf.
///
/// Counts saturate at zero: a decrement for a node that was never
/// incremented does not underflow, it is logged and ignored.
#[derive(Debug, Default)]
pub struct InstanceResourceMonitor {
    counts: Protected<HashMap<NodeId, u64>>,
}

impl InstanceResourceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Notes one more resource hosted at `node`.
    pub fn increment(&self, node: NodeId) {
        *self.counts.write().entry(node).or_insert(0) += 1;
    }

    /// Notes one fewer resource hosted at `node`.
    pub fn decrement(&self, node: &NodeId) {
        let mut counts = self.counts.write();
        match counts.get_mut(node) {
            Some(count) if *count > 1 => *count -= 1,
            Some(_) => {
                counts.remove(node);
            }
            None => {
                debug!(node = %node, "decrement for untracked node ignored");
            }
        }
    }

    /// How many resources are currently counted at `node`.
    pub fn count(&self, node: &NodeId) -> u64 {
        self.counts.read().get(node).copied().unwrap_or(0)
    }

    /// The node hosting the fewest resources, smaller id winning ties.
    /// Only nodes with at least one prior increment are considered.
    pub fn least_loaded(&self) -> Option<NodeId> {
        self.counts
            .read()
            .iter()
            .min_by(|(a_node, a), (b_node, b)| a.cmp(b).then_with(|| a_node.cmp(b_node)))
            .map(|(node, _)| *node)
    }
}
