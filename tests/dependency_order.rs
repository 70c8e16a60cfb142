//! Dependency resolution: topological order, determinism and computability.

use std::collections::HashSet;

use tandem_core::config::Backend;
use tandem_core::error::Error;
use tandem_core::id::NodeId;
use tandem_core::ops::{AggFunc, ArithOp, CompareOp, JoinType};
use tandem_core::schema::{DataType, Field, Schema};
use tandem_core::types::Scalar;
use tandem_graph::verify::assert_topological;
use tandem_graph::{computability_check, dependency_order, Graph, MaterializationView};

#[derive(Default)]
struct View {
    mem: HashSet<NodeId>,
    rel: HashSet<NodeId>,
    oom: HashSet<NodeId>,
}

impl View {
    /// Base tables are cached on both backends from the start.
    fn sources(ids: &[NodeId]) -> Self {
        Self {
            mem: ids.iter().copied().collect(),
            rel: ids.iter().copied().collect(),
            oom: HashSet::new(),
        }
    }
}

impl MaterializationView for View {
    fn in_memory(&self, id: NodeId) -> bool {
        self.mem.contains(&id)
    }
    fn relational(&self, id: NodeId) -> bool {
        self.rel.contains(&id)
    }
    fn out_of_memory(&self, id: NodeId) -> bool {
        self.oom.contains(&id)
    }
}

struct Pipeline {
    g: Graph,
    a: NodeId,
    b: NodeId,
    c0: NodeId,
    crit: NodeId,
    sel: NodeId,
    joined: NodeId,
    total: NodeId,
}

fn pipeline() -> Pipeline {
    let schema = Schema::new(vec![
        Field::new("c0", DataType::Int64, false),
        Field::new("c1", DataType::Int64, false),
    ]);
    let mut g = Graph::new("d");
    let a = g.source(schema.clone()).unwrap();
    let b = g.source(schema).unwrap();
    let c0 = g.projection(a, &["c0"], false).unwrap();
    let one = g.constant(Scalar::I64(1));
    let crit = g.compare(CompareOp::Gt, c0, one).unwrap();
    let sel = g.selection(a, crit).unwrap();
    let joined = g
        .join(sel, b, vec!["c0".into()], vec!["c0".into()], JoinType::Inner)
        .unwrap();
    let x = g.projection(joined, &["c1_x"], false).unwrap();
    let total = g.aggregate(x, AggFunc::Sum).unwrap();
    Pipeline {
        g,
        a,
        b,
        c0,
        crit,
        sel,
        joined,
        total,
    }
}

#[test]
fn test_order_is_topological_on_both_backends() {
    let p = pipeline();
    let view = View::sources(&[p.a, p.b]);
    for backend in [Backend::InMemory, Backend::Relational] {
        let order = dependency_order(&p.g, p.total, backend, &view).unwrap();
        assert_topological(&p.g, &order, backend);
        assert!(!order.contains(&p.total));
        assert!(!order.contains(&p.a), "materialized sources are not listed");
    }
}

#[test]
fn test_relational_order_skips_eval_sources() {
    let p = pipeline();
    let view = View::sources(&[p.a, p.b]);

    let mem = dependency_order(&p.g, p.sel, Backend::InMemory, &view).unwrap();
    assert!(mem.contains(&p.crit));
    assert!(mem.contains(&p.c0));

    let rel = dependency_order(&p.g, p.sel, Backend::Relational, &view).unwrap();
    assert!(rel.is_empty(), "criteria are inlined into the WHERE clause");
}

#[test]
fn test_order_is_deterministic() {
    let p = pipeline();
    let view = View::sources(&[p.a, p.b]);
    let first = dependency_order(&p.g, p.total, Backend::InMemory, &view).unwrap();
    let second = dependency_order(&p.g, p.total, Backend::InMemory, &view).unwrap();
    assert_eq!(first, second);

    // The ancestors of `joined` come out in the same relative order whether
    // `joined` or a descendant triggers the walk.
    let direct = dependency_order(&p.g, p.joined, Backend::InMemory, &view).unwrap();
    let within: Vec<NodeId> = first
        .iter()
        .copied()
        .filter(|id| direct.contains(id))
        .collect();
    assert_eq!(direct, within);
}

#[test]
fn test_walk_stops_at_materialized_nodes() {
    let p = pipeline();
    let mut view = View::sources(&[p.a, p.b]);
    view.rel.insert(p.joined);

    let rel = dependency_order(&p.g, p.total, Backend::Relational, &view).unwrap();
    assert!(!rel.contains(&p.joined));
    assert!(!rel.contains(&p.sel));

    // In memory, a relational table is one read-back away: listed, not walked.
    let mem = dependency_order(&p.g, p.total, Backend::InMemory, &view).unwrap();
    assert!(mem.contains(&p.joined));
    assert!(!mem.contains(&p.sel));
}

#[test]
fn test_out_of_memory_blocks_in_memory_only() {
    let p = pipeline();
    let mut view = View::sources(&[p.a, p.b]);
    view.rel.insert(p.joined);
    view.oom.insert(p.joined);

    let err = computability_check(&p.g, p.total, Backend::InMemory, &view).unwrap_err();
    assert!(matches!(
        err,
        Error::BackendUnreachable {
            backend: Backend::InMemory,
            ..
        }
    ));
    computability_check(&p.g, p.total, Backend::Relational, &view).unwrap();
}

#[test]
fn test_uncached_fallback_blocks_relational() {
    let mut p = pipeline();
    let described = p.g.describe(p.sel).unwrap();
    let n = p.g.projection(described, &["c1"], false).unwrap();
    let doubled = p.g.arith(ArithOp::Mul, n, n).unwrap();
    let view = View::sources(&[p.a, p.b]);

    let err = computability_check(&p.g, doubled, Backend::Relational, &view).unwrap_err();
    assert!(matches!(
        err,
        Error::BackendUnreachable {
            backend: Backend::Relational,
            failures
        } if failures >= 1
    ));
    computability_check(&p.g, doubled, Backend::InMemory, &view).unwrap();

    // Once the fallback result is in memory it can be bulk loaded.
    let mut view = view;
    view.mem.insert(described);
    computability_check(&p.g, doubled, Backend::Relational, &view).unwrap();
}

#[test]
fn test_uncached_source_is_unreachable() {
    let p = pipeline();
    let view = View::sources(&[p.a]);
    assert!(computability_check(&p.g, p.joined, Backend::InMemory, &view).is_err());
    assert!(computability_check(&p.g, p.joined, Backend::Relational, &view).is_err());
}
