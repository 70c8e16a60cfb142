//! Dependency resolution per backend.
//!
//! Both operations walk the same ancestor set: the transitive sources of a
//! node (plus eval sources for the in-memory engine), stopping at ancestors
//! that are already available on the target backend. Availability comes from
//! the engine through `MaterializationView`, so this module stays pure.

use std::collections::HashMap;

use tandem_core::config::Backend;
use tandem_core::error::{Error, Result};
use tandem_core::id::NodeId;

use crate::graph::Graph;
use crate::node::Op;

/// Read-only view of the engine's per-node materialization state.
pub trait MaterializationView {
    /// A result is cached in memory.
    fn in_memory(&self, id: NodeId) -> bool;
    /// A table exists on the current relational connection.
    fn relational(&self, id: NodeId) -> bool;
    /// The result was too large to read back into memory.
    fn out_of_memory(&self, id: NodeId) -> bool;
}

fn materialized(view: &dyn MaterializationView, id: NodeId, backend: Backend) -> bool {
    match backend {
        Backend::InMemory => view.in_memory(id),
        Backend::Relational => view.relational(id),
    }
}

/// Available through a single transfer from the other backend: a bulk load
/// into SQLite or a read-back into memory. Traversal stops here too.
fn transferable(view: &dyn MaterializationView, id: NodeId, backend: Backend) -> bool {
    match backend {
        Backend::InMemory => view.relational(id) && !view.out_of_memory(id),
        Backend::Relational => view.in_memory(id),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Ancestors of `node` (excluding it) that are not materialized on `backend`,
/// each after all of its sources. Ties follow source declaration order.
pub fn dependency_order(
    graph: &Graph,
    node: NodeId,
    backend: Backend,
    view: &dyn MaterializationView,
) -> Result<Vec<NodeId>> {
    let mut marks: HashMap<NodeId, Mark> = HashMap::new();
    let mut order = Vec::new();
    visit(graph, node, node, backend, view, &mut marks, &mut order)?;
    Ok(order)
}

fn visit(
    graph: &Graph,
    root: NodeId,
    id: NodeId,
    backend: Backend,
    view: &dyn MaterializationView,
    marks: &mut HashMap<NodeId, Mark>,
    order: &mut Vec<NodeId>,
) -> Result<()> {
    match marks.get(&id) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::Visiting) => {
            return Err(Error::Invariant(format!(
                "cycle detected at {}",
                graph.node(id)?.name
            )))
        }
        None => {}
    }

    if id != root {
        if materialized(view, id, backend) {
            marks.insert(id, Mark::Done);
            return Ok(());
        }
        if transferable(view, id, backend) {
            marks.insert(id, Mark::Done);
            order.push(id);
            return Ok(());
        }
    }

    marks.insert(id, Mark::Visiting);
    let node = graph.node(id)?;
    for dep in node.deps(backend) {
        visit(graph, root, dep, backend, view, marks, order)?;
    }
    marks.insert(id, Mark::Done);
    if id != root {
        order.push(id);
    }
    Ok(())
}

fn computable(
    graph: &Graph,
    id: NodeId,
    backend: Backend,
    view: &dyn MaterializationView,
    known: &HashMap<NodeId, bool>,
) -> Result<bool> {
    let node = graph.node(id)?;
    let deps_ok = || node.deps(backend).all(|d| known.get(&d).copied().unwrap_or(true));
    Ok(match backend {
        Backend::Relational => {
            view.relational(id)
                || view.in_memory(id)
                // Containers render through the aggregator built on them.
                || ((node.op.has_sql() || node.op.is_container()) && deps_ok())
        }
        Backend::InMemory => {
            !view.out_of_memory(id)
                && (view.in_memory(id)
                    || view.relational(id)
                    || (!matches!(node.op, Op::Source) && deps_ok()))
        }
    })
}

/// Fail with `BackendUnreachable` if `node` or any ancestor in its dependency
/// order cannot be produced on `backend`.
///
/// Relational: an ancestor is computable if it is there already, can be bulk
/// loaded from memory, or has a SQL form over computable sources. An uncached
/// fallback therefore blocks the relational engine. In-memory: cached,
/// readable from SQLite, or evaluable from computable inputs; results too
/// large for memory never are.
pub fn computability_check(
    graph: &Graph,
    node: NodeId,
    backend: Backend,
    view: &dyn MaterializationView,
) -> Result<()> {
    let mut walk = dependency_order(graph, node, backend, view)?;
    walk.push(node);

    let mut known: HashMap<NodeId, bool> = HashMap::with_capacity(walk.len());
    let mut failures = 0usize;
    for id in walk {
        let ok = computable(graph, id, backend, view, &known)?;
        if !ok {
            failures += 1;
        }
        known.insert(id, ok);
    }

    if failures > 0 {
        return Err(Error::BackendUnreachable { backend, failures });
    }
    Ok(())
}
