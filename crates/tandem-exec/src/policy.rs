//! Offload policy: which backend computes a node.

use tandem_core::config::{Backend, OffloadStrategy};
use tandem_core::error::Error;
use tandem_core::id::NodeId;
use tandem_graph::node::Op;

use crate::cost::{CostContext, CostModel};
use crate::error::Result;

/// Backend for `id` under `strategy`.
///
/// Base tables, constants and fallback operations are always produced in
/// memory; everything else follows the strategy, with BEST asking `model`.
pub fn choose_backend(
    strategy: Option<OffloadStrategy>,
    model: &dyn CostModel,
    ctx: &CostContext<'_>,
    id: NodeId,
) -> Result<Backend> {
    let strategy = strategy.ok_or_else(|| {
        Error::Config("no offload strategy set (expected ALWAYS, NEVER or BEST)".into())
    })?;

    let node = ctx.graph.node(id)?;
    if matches!(node.op, Op::Source | Op::Constant(_) | Op::Fallback(_)) {
        return Ok(Backend::InMemory);
    }

    Ok(match strategy {
        OffloadStrategy::Always => Backend::Relational,
        OffloadStrategy::Never => Backend::InMemory,
        OffloadStrategy::Best => {
            if model.should_offload(ctx, id) {
                Backend::Relational
            } else {
                Backend::InMemory
            }
        }
    })
}
