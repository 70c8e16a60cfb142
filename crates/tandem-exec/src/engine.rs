//! The execution engine.
//!
//! Owns the graph, one state record per node, the relational store and the
//! memory budget. `compute` walks a node through
//! `Uncomputed -> Computing -> Cached` on the backend picked by the policy,
//! materializing whatever ancestors that backend still needs first.
//!
//! A relational result is only read back if its estimated footprint fits in
//! the memory still available. Otherwise the node is flagged out-of-memory:
//! it stays usable as an input on SQLite, but can never be pulled into memory.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use tandem_core::budget::MemoryBudget;
use tandem_core::config::{Backend, EngineConfig, OffloadStrategy};
use tandem_core::error::{Error, Result as CoreResult};
use tandem_core::id::{session_tag, Generation, NodeId};
use tandem_core::types::Table;
use tandem_frame::Value;
use tandem_graph::node::Op;
use tandem_graph::{computability_check, dependency_order, Graph, MaterializationView};
use tandem_mem::{estimate_rows_bytes, BudgetGuardImpl, MemoryBudgetImpl};
use tandem_store::{RelationalStore, StoreStats};

use crate::cost::{CostContext, CostModel, DefaultCostModel, Statistics};
use crate::error::{ExecError, Result};
use crate::eval::{coerce_table, evaluate};
use crate::metrics::emit_span;
use crate::policy::choose_backend;

struct Cached {
    value: Arc<Value>,
    _guard: BudgetGuardImpl,
}

#[derive(Default)]
struct NodeState {
    cached: Option<Cached>,
    /// Generation of the connection holding this node's table.
    relational: Option<Generation>,
    /// Sticky: the result was too large to read back.
    out_of_memory: bool,
    rows: Option<u64>,
    /// Estimated read-back footprint, recorded when the guard refused it.
    estimated: usize,
    computing: bool,
}

/// Read-only snapshot of engine state for the resolver and cost model.
pub struct EngineView<'a> {
    states: &'a [NodeState],
    generation: Generation,
}

impl EngineView<'_> {
    fn state(&self, id: NodeId) -> Option<&NodeState> {
        self.states.get(id.index())
    }
}

impl MaterializationView for EngineView<'_> {
    fn in_memory(&self, id: NodeId) -> bool {
        self.state(id).is_some_and(|s| s.cached.is_some())
    }

    fn relational(&self, id: NodeId) -> bool {
        self.state(id)
            .is_some_and(|s| s.relational == Some(self.generation))
    }

    fn out_of_memory(&self, id: NodeId) -> bool {
        self.state(id).is_some_and(|s| s.out_of_memory)
    }
}

impl Statistics for EngineView<'_> {
    fn known_rows(&self, id: NodeId) -> Option<u64> {
        self.state(id).and_then(|s| s.rows)
    }
}

pub struct Engine {
    graph: Graph,
    states: Vec<NodeState>,
    store: RelationalStore,
    budget: MemoryBudgetImpl,
    config: EngineConfig,
    cost_model: Box<dyn CostModel>,
    /// Backend per node for the current top-level `compute`.
    decisions: HashMap<NodeId, Backend>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("nodes", &self.graph.len())
            .field("store", &self.store)
            .field("budget", &self.budget)
            .finish()
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        let store = RelationalStore::open(config.database_path.as_deref().map(Path::new))?;
        Ok(Self {
            graph: Graph::new(session_tag()),
            states: Vec::new(),
            store,
            budget: MemoryBudgetImpl::new(config.mem_cap_bytes),
            config,
            cost_model: Box::new(DefaultCostModel),
            decisions: HashMap::new(),
        })
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn view(&self) -> EngineView<'_> {
        EngineView {
            states: &self.states,
            generation: self.store.generation(),
        }
    }

    fn state(&self, id: NodeId) -> Result<&NodeState> {
        self.states
            .get(id.index())
            .ok_or_else(|| Error::Invariant(format!("{id} has no execution state")).into())
    }

    fn state_mut(&mut self, id: NodeId) -> Result<&mut NodeState> {
        self.states
            .get_mut(id.index())
            .ok_or_else(|| Error::Invariant(format!("{id} has no execution state")).into())
    }

    fn is_relational(&self, id: NodeId) -> bool {
        self.view().relational(id)
    }

    // ----- construction -----

    /// Add a node through one of the graph constructors.
    pub fn build<F>(&mut self, f: F) -> Result<NodeId>
    where
        F: FnOnce(&mut Graph) -> CoreResult<NodeId>,
    {
        let id = f(&mut self.graph)?;
        self.states.resize_with(self.graph.len(), NodeState::default);
        Ok(id)
    }

    /// Register a base table. It is cached in memory and bulk loaded into
    /// SQLite right away.
    pub fn add_source(&mut self, table: Table) -> Result<NodeId> {
        let schema = table.infer_schema();
        let table = coerce_table(table, &schema);
        let id = self.build(|g| g.source(schema.clone()))?;
        let name = self.graph.node(id)?.name.clone();

        self.store.bulk_load(&name, &table, &schema)?;
        let generation = self.store.generation();
        let rows = table.num_rows() as u64;
        let value = Value::Table(table);
        let guard = self.budget.acquire_unchecked(value.footprint(), "source");

        let state = self.state_mut(id)?;
        state.relational = Some(generation);
        state.rows = Some(rows);
        state.cached = Some(Cached {
            value: Arc::new(value),
            _guard: guard,
        });
        Ok(id)
    }

    // ----- configuration -----

    pub fn strategy(&self) -> Option<OffloadStrategy> {
        self.config.strategy
    }

    pub fn set_strategy(&mut self, strategy: Option<OffloadStrategy>) {
        self.config.strategy = strategy;
    }

    pub fn set_cost_model(&mut self, model: Box<dyn CostModel>) {
        self.cost_model = model;
    }

    pub fn database_file(&self) -> &Path {
        self.store.path()
    }

    /// Move to another database file. Relational caches refer to the old
    /// connection and are invalid from here on.
    pub fn set_database_file(&mut self, path: &Path, delete_old: bool) -> Result<()> {
        self.store.set_path(path, delete_old)?;
        Ok(())
    }

    pub fn close(&mut self, delete: bool) -> Result<()> {
        self.store.close(delete)?;
        Ok(())
    }

    pub fn stats(&self) -> StoreStats {
        self.store.stats()
    }

    pub fn available_memory(&self) -> usize {
        self.budget.available_bytes()
    }

    /// Highest amount of memory held by cached results so far.
    pub fn peak_memory(&self) -> usize {
        self.budget.peak_bytes()
    }

    pub fn storage_size(&self) -> Result<u64> {
        Ok(self.store.storage_size()?)
    }

    // ----- inspection -----

    pub fn is_out_of_memory(&self, id: NodeId) -> bool {
        self.view().out_of_memory(id)
    }

    pub fn is_cached(&self, id: NodeId) -> bool {
        self.view().in_memory(id)
    }

    /// The statement that would create `id` on SQLite now.
    pub fn sql(&self, id: NodeId) -> Result<String> {
        Ok(tandem_sql::render(&self.graph, id, &self.view())?)
    }

    /// Drop the in-memory copy of `id`. Base tables are never evicted: they
    /// are the only copy that survives a change of database file. Returns
    /// whether anything was released.
    pub fn evict(&mut self, id: NodeId) -> Result<bool> {
        let is_source = matches!(self.graph.node(id)?.op, Op::Source);
        let state = self.state_mut(id)?;
        if state.cached.is_none() || is_source {
            return Ok(false);
        }
        state.cached = None;
        Ok(true)
    }

    // ----- computation -----

    /// Materialize `id` and return its in-memory value.
    pub fn compute(&mut self, id: NodeId) -> Result<Arc<Value>> {
        self.decisions.clear();
        self.materialize(id)?;

        let state = self.state(id)?;
        match &state.cached {
            Some(c) => Ok(Arc::clone(&c.value)),
            None => Err(ExecError::ResultTooLarge {
                node: self.graph.node(id)?.name.clone(),
                estimated: state.estimated,
                available: self.budget.available_bytes(),
            }),
        }
    }

    fn cached_value(&self, id: NodeId) -> Result<Arc<Value>> {
        match &self.state(id)?.cached {
            Some(c) => Ok(Arc::clone(&c.value)),
            None => Err(Error::Invariant(format!(
                "{} is needed in memory but is not cached",
                self.graph.node(id)?.name
            ))
            .into()),
        }
    }

    fn decide(&mut self, id: NodeId) -> Result<Backend> {
        if let Some(b) = self.decisions.get(&id) {
            return Ok(*b);
        }
        let view = self.view();
        let ctx = CostContext {
            graph: &self.graph,
            stats: &view,
            available_bytes: self.budget.available_bytes(),
            weights: self.config.cost_weights,
        };
        let backend = choose_backend(self.config.strategy, self.cost_model.as_ref(), &ctx, id)?;
        debug!(node = %self.graph.node(id)?.name, %backend, "backend chosen");
        self.decisions.insert(id, backend);
        Ok(backend)
    }

    /// Leave `id` cached in memory, or out-of-memory with a live table.
    fn materialize(&mut self, id: NodeId) -> Result<()> {
        let node = self.graph.node(id)?;
        if node.op.is_container() {
            return Err(Error::Invariant(format!(
                "{} is a grouping and has no result of its own",
                node.name
            ))
            .into());
        }

        let relational = self.is_relational(id);
        let state = self.state(id)?;
        if state.cached.is_some() {
            return Ok(());
        }
        if state.out_of_memory && relational {
            return Ok(());
        }
        if relational {
            return self.read_back(id);
        }
        if state.computing {
            return Err(Error::Invariant(format!("{} was re-entered while computing", node.name)).into());
        }

        // A result known not to fit is rebuilt on SQLite only.
        let has_sql = node.op.has_sql();
        let out_of_memory = state.out_of_memory;
        let mut backend = if out_of_memory {
            Backend::Relational
        } else {
            self.decide(id)?
        };
        // Under BEST a node whose fallback ancestors are not cached yet stays
        // in memory, where those ancestors can still be computed.
        if backend == Backend::Relational
            && !out_of_memory
            && self.rerouting()
            && computability_check(&self.graph, id, Backend::Relational, &self.view()).is_err()
        {
            debug!(node = %self.graph.node(id)?.name, "relational backend unreachable, staying in memory");
            backend = Backend::InMemory;
            self.decisions.insert(id, backend);
        }
        // Under BEST an ancestor stuck on SQLite pulls the node there too.
        // A forced NEVER reports the ancestor as unreachable instead.
        if backend == Backend::InMemory
            && has_sql
            && self.rerouting()
            && self.needs_out_of_memory_input(id)?
        {
            debug!(node = %self.graph.node(id)?.name, "ancestor out of memory, moving to relational");
            backend = Backend::Relational;
            self.decisions.insert(id, backend);
        }

        self.state_mut(id)?.computing = true;
        let out = self.run_on(id, backend);
        self.state_mut(id)?.computing = false;
        out
    }

    fn rerouting(&self) -> bool {
        self.config.strategy == Some(OffloadStrategy::Best)
    }

    /// Some ancestor the in-memory engine would need exists only on SQLite.
    fn needs_out_of_memory_input(&self, id: NodeId) -> Result<bool> {
        let view = self.view();
        let order = dependency_order(&self.graph, id, Backend::InMemory, &view)?;
        Ok(order.into_iter().any(|dep| view.out_of_memory(dep)))
    }

    fn run_on(&mut self, id: NodeId, backend: Backend) -> Result<()> {
        computability_check(&self.graph, id, backend, &self.view())?;
        let order = dependency_order(&self.graph, id, backend, &self.view())?;
        #[cfg(debug_assertions)]
        tandem_graph::verify::assert_topological(&self.graph, &order, backend);

        match backend {
            Backend::InMemory => self.run_in_memory(id, &order),
            Backend::Relational => self.run_relational(id, &order),
        }
    }

    fn run_in_memory(&mut self, id: NodeId, order: &[NodeId]) -> Result<()> {
        for &dep in order {
            if self.graph.node(dep)?.op.is_container() {
                continue;
            }
            self.materialize(dep)?;
            if !self.is_cached(dep) {
                // The input turned out too large to read back.
                let node = self.graph.node(id)?;
                if node.op.has_sql() && self.rerouting() {
                    debug!(node = %node.name, input = %self.graph.node(dep)?.name, "input out of memory, moving to relational");
                    self.decisions.insert(id, Backend::Relational);
                    return self.run_on(id, Backend::Relational);
                }
                let state = self.state(dep)?;
                return Err(ExecError::ResultTooLarge {
                    node: self.graph.node(dep)?.name.clone(),
                    estimated: state.estimated,
                    available: self.budget.available_bytes(),
                });
            }
        }

        let value = evaluate(&self.graph, id, |dep| self.cached_value(dep))?;
        let rows = match &value {
            Value::Table(t) => t.num_rows() as u64,
            Value::Series(_) | Value::Scalar(_) => 1,
        };
        let guard = self.budget.acquire_unchecked(value.footprint(), "eval");
        let state = self.state_mut(id)?;
        state.rows = Some(rows);
        state.cached = Some(Cached {
            value: Arc::new(value),
            _guard: guard,
        });

        emit_span(
            "materialize",
            &[
                ("node", self.graph.node(id)?.name.clone()),
                ("backend", Backend::InMemory.to_string()),
                ("rows", rows.to_string()),
            ],
        );
        Ok(())
    }

    fn run_relational(&mut self, id: NodeId, order: &[NodeId]) -> Result<()> {
        let pipelined = !self.config.materialize_intermediates;
        for &dep in order {
            let dep_node = self.graph.node(dep)?;
            if dep_node.op.is_container() {
                continue;
            }
            let has_sql = dep_node.op.has_sql();

            if self.is_cached(dep) {
                if !self.is_relational(dep) {
                    self.offload(dep)?;
                }
                continue;
            }
            if self.is_out_of_memory(dep) {
                // Table lost with the previous connection.
                if !(pipelined && has_sql) {
                    self.create_relational(dep)?;
                }
                continue;
            }
            if pipelined && has_sql {
                continue;
            }
            self.materialize(dep)?;
            if !self.is_relational(dep) {
                self.offload(dep)?;
            }
        }

        self.create_relational(id)?;
        if !self.is_out_of_memory(id) {
            self.read_back(id)?;
        }
        Ok(())
    }

    /// Bulk load the in-memory value of `id` into SQLite.
    fn offload(&mut self, id: NodeId) -> Result<()> {
        let value = self.cached_value(id)?;
        let node = self.graph.node(id)?;
        let table = value.to_table(&node.columns())?;
        self.store.bulk_load(&node.name, &table, &node.schema)?;
        debug!(node = %node.name, rows = table.num_rows(), "offloaded");
        let generation = self.store.generation();
        self.state_mut(id)?.relational = Some(generation);
        Ok(())
    }

    fn create_relational(&mut self, id: NodeId) -> Result<()> {
        let sql = tandem_sql::render(&self.graph, id, &self.view())?;
        let name = self.graph.node(id)?.name.clone();
        tracing::trace!(node = %name, %sql, "compiled");
        self.store.create_table_as(&name, &sql)?;
        let rows = self.store.row_count(&name)?;
        let generation = self.store.generation();

        let state = self.state_mut(id)?;
        state.relational = Some(generation);
        state.rows = Some(rows);

        emit_span(
            "materialize",
            &[
                ("node", name),
                ("backend", Backend::Relational.to_string()),
                ("rows", rows.to_string()),
            ],
        );
        Ok(())
    }

    /// Pull the table of `id` into memory if the budget allows it; otherwise
    /// flag it out-of-memory.
    fn read_back(&mut self, id: NodeId) -> Result<()> {
        let node = self.graph.node(id)?;
        let name = node.name.clone();
        let rows = match self.state(id)?.rows {
            Some(r) => r,
            None => self.store.row_count(&name)?,
        };
        let estimated = estimate_rows_bytes(&node.schema, rows);
        let available = self.budget.available_bytes();
        if estimated > available {
            debug!(node = %name, estimated, available, "result too large to read back");
            let state = self.state_mut(id)?;
            state.out_of_memory = true;
            state.estimated = estimated;
            state.rows = Some(rows);
            return Ok(());
        }

        let mut guard = self.budget.acquire(estimated, "readback")?;
        let columns = node.columns();
        let table = coerce_table(self.store.read_table(&name, &columns)?, &node.schema);
        let value = match &node.op {
            Op::Aggregator { keys, .. } if keys.is_empty() => Value::collapse(table),
            _ => Value::Table(table),
        };
        guard.resize_unchecked(value.footprint());

        let state = self.state_mut(id)?;
        state.rows = Some(rows);
        state.cached = Some(Cached {
            value: Arc::new(value),
            _guard: guard,
        });
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(e) = self.store.close(false) {
            debug!(error = %e, "closing relational store failed");
        }
    }
}
