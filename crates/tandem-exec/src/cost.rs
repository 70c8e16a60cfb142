//! Cost model behind the BEST strategy.
//!
//! Row counts are exact once a node has been materialized on either backend;
//! before that they are estimated from the inputs with coarse selectivity,
//! join and grouping heuristics. Bytes are rows × schema row width, the same
//! model the engine uses for its read-back check.

use std::collections::HashMap;

use tandem_core::config::CostWeights;
use tandem_core::id::NodeId;
use tandem_core::ops::{BoolOp, CompareOp, JoinType};
use tandem_graph::node::{Criterion, FallbackOp, Op};
use tandem_graph::{Graph, MaterializationView};
use tandem_mem::estimate_rows_bytes;

/// Materialization state plus what is known about sizes.
pub trait Statistics: MaterializationView {
    /// Exact row count, if the node has been materialized.
    fn known_rows(&self, id: NodeId) -> Option<u64>;
}

pub struct CostContext<'a> {
    pub graph: &'a Graph,
    pub stats: &'a dyn Statistics,
    /// Memory still free for cached results.
    pub available_bytes: usize,
    pub weights: CostWeights,
}

/// Decides, for a node about to be computed, whether the relational engine
/// should run it.
pub trait CostModel: Send {
    fn should_offload(&self, ctx: &CostContext<'_>, node: NodeId) -> bool;
}

/// Rows passing a predicate, as a fraction of the input.
fn selectivity(graph: &Graph, criterion: NodeId) -> f64 {
    let Some(node) = graph.get(criterion) else {
        return 0.5;
    };
    let operand = |idx: usize| {
        node.eval_sources
            .get(idx)
            .map(|id| selectivity(graph, *id))
            .unwrap_or(0.5)
    };
    match &node.op {
        Op::Criterion(Criterion::Compare(CompareOp::Eq)) => 0.1,
        Op::Criterion(Criterion::Compare(CompareOp::Ne)) => 0.9,
        Op::Criterion(Criterion::Compare(_)) => 0.33,
        Op::Criterion(Criterion::IsNull) => 0.05,
        Op::Criterion(Criterion::Like(_)) => 0.25,
        Op::Criterion(Criterion::Logical(BoolOp::Not)) => 1.0 - operand(0),
        Op::Criterion(Criterion::Logical(BoolOp::And)) => operand(0) * operand(1),
        Op::Criterion(Criterion::Logical(BoolOp::Or)) => {
            let (a, b) = (operand(0), operand(1));
            a + b - a * b
        }
        _ => 0.5,
    }
}

fn join_cardinality(left: u64, right: u64, how: JoinType) -> u64 {
    match how {
        JoinType::Inner => {
            let cross = (left as f64 * right as f64).sqrt();
            (cross as u64).max(1).min(left.min(right))
        }
        // At least every left row; right duplicates inflate it a little.
        JoinType::Left => (left as f64 * 1.2) as u64,
    }
}

fn aggregate_groups(input: u64, keys: usize) -> u64 {
    if keys == 0 {
        return 1;
    }
    let factor = match keys {
        1 => 0.1,
        2 => 0.25,
        3 => 0.4,
        _ => 0.5,
    };
    ((input as f64 * factor) as u64).max(1).min(input)
}

/// Row estimates for one decision, memoized across the walk.
pub struct RowEstimator<'c, 'a> {
    ctx: &'c CostContext<'a>,
    memo: HashMap<NodeId, u64>,
}

impl<'c, 'a> RowEstimator<'c, 'a> {
    pub fn new(ctx: &'c CostContext<'a>) -> Self {
        Self {
            ctx,
            memo: HashMap::new(),
        }
    }

    pub fn rows(&mut self, id: NodeId) -> u64 {
        if let Some(r) = self.ctx.stats.known_rows(id) {
            return r;
        }
        if let Some(r) = self.memo.get(&id) {
            return *r;
        }
        let graph: &'a Graph = self.ctx.graph;
        let Some(node) = graph.get(id) else {
            return 0;
        };
        let first = node.sources.first().copied();
        let src = |this: &mut Self| first.map(|s| this.rows(s)).unwrap_or(0);

        let rows = match &node.op {
            Op::Source => 0,
            Op::Constant(_) => 1,
            Op::Projection { columns, distinct } => {
                let n = src(self);
                if *distinct {
                    aggregate_groups(n, columns.len())
                } else {
                    n
                }
            }
            Op::Selection => {
                let n = src(self);
                let s = node
                    .eval_sources
                    .first()
                    .map(|c| selectivity(graph, *c))
                    .unwrap_or(0.5);
                ((n as f64 * s) as u64).max(1).min(n)
            }
            Op::Join { how, .. } => {
                let l = src(self);
                let r = node.sources.get(1).map(|s| self.rows(*s)).unwrap_or(0);
                join_cardinality(l, r, *how)
            }
            Op::Union => node.sources.clone().into_iter().map(|s| self.rows(s)).sum(),
            Op::Limit { n } => src(self).min(*n as u64),
            Op::Aggregator { input, keys, .. } => {
                let n = self.rows(*input);
                aggregate_groups(n, keys.len())
            }
            Op::Fallback(FallbackOp::Describe) => {
                tandem_frame::describe::STATISTICS.len() as u64
            }
            Op::Criterion(_)
            | Op::Arithmetic(_)
            | Op::OrderBy { .. }
            | Op::GroupBy { .. }
            | Op::GroupByProjection { .. }
            | Op::Rename { .. }
            | Op::Assign { .. }
            | Op::Fallback(FallbackOp::Apply { .. }) => src(self),
        };
        self.memo.insert(id, rows);
        rows
    }

    pub fn bytes(&mut self, id: NodeId) -> usize {
        let rows = self.rows(id);
        match self.ctx.graph.get(id) {
            Some(node) => estimate_rows_bytes(&node.schema, rows),
            None => 0,
        }
    }
}

/// Inputs holding the data a node reads. Grouping containers stand for the
/// table they group.
pub fn data_inputs(graph: &Graph, id: NodeId) -> Vec<NodeId> {
    let Some(node) = graph.get(id) else {
        return Vec::new();
    };
    node.sources
        .iter()
        .map(|s| {
            let mut cur = *s;
            while let Some(n) = graph.get(cur) {
                match (n.op.is_container(), n.sources.first()) {
                    (true, Some(next)) => cur = *next,
                    _ => break,
                }
            }
            cur
        })
        .collect()
}

/// Offload when memory would not hold the working set, or when the weighted
/// transfer + scan cost of the relational engine is lower.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCostModel;

impl CostModel for DefaultCostModel {
    fn should_offload(&self, ctx: &CostContext<'_>, id: NodeId) -> bool {
        let Some(node) = ctx.graph.get(id) else {
            return false;
        };
        if matches!(node.op, Op::Source | Op::Fallback(_)) {
            return false;
        }

        let inputs = data_inputs(ctx.graph, id);
        // An input that only exists in SQLite cannot be pulled into memory.
        if inputs.iter().any(|i| ctx.stats.out_of_memory(*i)) {
            return true;
        }

        let mut est = RowEstimator::new(ctx);
        let out = est.bytes(id);
        let mut scanned = 0usize;
        let mut missing_mem = 0usize;
        let mut missing_rel = 0usize;
        for i in &inputs {
            let b = est.bytes(*i);
            scanned = scanned.saturating_add(b);
            if !ctx.stats.in_memory(*i) {
                missing_mem = missing_mem.saturating_add(b);
            }
            if !ctx.stats.relational(*i) {
                missing_rel = missing_rel.saturating_add(b);
            }
        }

        if missing_mem.saturating_add(out) > ctx.available_bytes {
            return true;
        }

        let w = ctx.weights;
        let relational = w.load_per_byte * missing_rel as f64
            + w.read_per_byte * out as f64
            + w.sql_scan_per_byte * scanned as f64;
        let in_memory = w.read_per_byte * missing_mem as f64 + w.mem_scan_per_byte * scanned as f64;
        relational < in_memory
    }
}
