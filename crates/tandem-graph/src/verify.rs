//! Debug-time verification helpers for dependency orders.
//!
//! Intended for tests and debug builds to catch ordering bugs early. They
//! should be cheap.

use std::collections::HashSet;

use tandem_core::config::Backend;
use tandem_core::id::NodeId;

use crate::graph::Graph;

/// Verify that every node in `order` comes after those of its dependencies
/// that also appear in `order`, and that no node appears twice.
pub fn assert_topological(graph: &Graph, order: &[NodeId], backend: Backend) {
    let listed: HashSet<NodeId> = order.iter().copied().collect();
    assert_eq!(listed.len(), order.len(), "dependency order repeats a node");

    let mut seen = HashSet::<NodeId>::new();
    for id in order {
        let node = graph
            .get(*id)
            .unwrap_or_else(|| panic!("{id} is not part of the graph"));
        for dep in node.deps(backend) {
            assert!(
                !listed.contains(&dep) || seen.contains(&dep),
                "dependency {dep} not satisfied before {}",
                node.name
            );
        }
        seen.insert(*id);
    }
}
