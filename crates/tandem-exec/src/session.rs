//! User-facing handles.
//!
//! A `Session` owns one engine behind a mutex. `DataFrame` and `GroupBy` are
//! cheap handles (session + node id); every method builds a new node, except
//! `assign`, which re-points the handle it is called on.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tandem_core::config::{EngineConfig, OffloadStrategy};
use tandem_core::error::{Error, Result as CoreResult};
use tandem_core::id::NodeId;
use tandem_core::ops::{AggFunc, ArithOp, BoolOp, CompareOp, JoinType, UnaryOp};
use tandem_core::schema::Schema;
use tandem_core::types::{Scalar, Table};
use tandem_frame::Value;
use tandem_graph::Graph;
use tandem_store::{readers, StoreStats};

use crate::cost::CostModel;
use crate::engine::Engine;
use crate::error::{ExecError, Result};

#[derive(Clone)]
pub struct Session {
    engine: Arc<Mutex<Engine>>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.engine.try_lock() {
            Ok(engine) => f.debug_tuple("Session").field(&*engine).finish(),
            Err(_) => f.debug_tuple("Session").field(&"<busy>").finish(),
        }
    }
}

impl Session {
    pub fn new(config: EngineConfig) -> Result<Self> {
        Ok(Self {
            engine: Arc::new(Mutex::new(Engine::new(config)?)),
        })
    }

    /// Session configured from `TANDEM_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(EngineConfig::from_env()?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Engine>> {
        self.engine.lock().map_err(|_| ExecError::Poisoned)
    }

    fn same(&self, other: &Session) -> bool {
        Arc::ptr_eq(&self.engine, &other.engine)
    }

    fn frame(&self, id: NodeId) -> DataFrame {
        DataFrame {
            session: self.clone(),
            id,
        }
    }

    fn build<F>(&self, f: F) -> Result<DataFrame>
    where
        F: FnOnce(&mut Graph) -> CoreResult<NodeId>,
    {
        let id = self.lock()?.build(f)?;
        Ok(self.frame(id))
    }

    // ----- ingestion -----

    pub fn from_table(&self, table: Table) -> Result<DataFrame> {
        let id = self.lock()?.add_source(table)?;
        Ok(self.frame(id))
    }

    pub fn from_rows<S: AsRef<str>>(&self, columns: &[S], rows: Vec<Vec<Scalar>>) -> Result<DataFrame> {
        self.from_table(Table::from_rows(columns, rows)?)
    }

    pub fn read_csv(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        self.from_table(readers::read_csv(path)?)
    }

    /// Load a JSON array of records.
    pub fn read_json(&self, path: impl AsRef<Path>) -> Result<DataFrame> {
        self.from_table(readers::read_json(path)?)
    }

    /// Stack frames with the same column set, in the first frame's column order.
    pub fn concat(&self, frames: &[&DataFrame]) -> Result<DataFrame> {
        let ids = frames
            .iter()
            .map(|f| self.own(f))
            .collect::<Result<Vec<_>>>()?;
        self.build(|g| g.union(&ids))
    }

    pub fn merge<S: AsRef<str>>(
        &self,
        left: &DataFrame,
        right: &DataFrame,
        on: &[S],
        how: JoinType,
    ) -> Result<DataFrame> {
        self.own(left)?;
        left.merge(right, on, how)
    }

    fn own(&self, frame: &DataFrame) -> Result<NodeId> {
        if self.same(&frame.session) {
            Ok(frame.id)
        } else {
            Err(foreign())
        }
    }

    // ----- configuration -----

    pub fn strategy(&self) -> Result<Option<OffloadStrategy>> {
        Ok(self.lock()?.strategy())
    }

    /// `None` leaves the session unconfigured; `compute` then fails.
    pub fn set_strategy(&self, strategy: Option<OffloadStrategy>) -> Result<()> {
        self.lock()?.set_strategy(strategy);
        Ok(())
    }

    pub fn set_cost_model(&self, model: Box<dyn CostModel>) -> Result<()> {
        self.lock()?.set_cost_model(model);
        Ok(())
    }

    pub fn database_file(&self) -> Result<PathBuf> {
        Ok(self.lock()?.database_file().to_path_buf())
    }

    pub fn set_database_file(&self, path: impl AsRef<Path>, delete_old: bool) -> Result<()> {
        self.lock()?.set_database_file(path.as_ref(), delete_old)
    }

    /// Close the relational connection. Temp databases are always removed;
    /// a user-supplied file only with `delete`.
    pub fn close(&self, delete: bool) -> Result<()> {
        self.lock()?.close(delete)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        Ok(self.lock()?.stats())
    }

    pub fn available_memory(&self) -> Result<usize> {
        Ok(self.lock()?.available_memory())
    }

    pub fn peak_memory(&self) -> Result<usize> {
        Ok(self.lock()?.peak_memory())
    }

    /// Bytes currently used by the relational database file.
    pub fn storage_size(&self) -> Result<u64> {
        self.lock()?.storage_size()
    }
}

fn foreign() -> ExecError {
    Error::Construction("operands belong to different sessions".into()).into()
}

/// Right-hand side of a comparison, arithmetic or assignment.
#[derive(Debug, Clone)]
pub enum Operand {
    Frame(DataFrame),
    Value(Scalar),
}

impl From<&DataFrame> for Operand {
    fn from(f: &DataFrame) -> Self {
        Operand::Frame(f.clone())
    }
}

impl From<DataFrame> for Operand {
    fn from(f: DataFrame) -> Self {
        Operand::Frame(f)
    }
}

impl From<Scalar> for Operand {
    fn from(v: Scalar) -> Self {
        Operand::Value(v)
    }
}

macro_rules! scalar_operand {
    ($($t:ty),*) => {
        $(impl From<$t> for Operand {
            fn from(v: $t) -> Self {
                Operand::Value(Scalar::from(v))
            }
        })*
    };
}

scalar_operand!(i64, f64, bool, &str);

/// A lazy table, column or expression.
#[derive(Clone)]
pub struct DataFrame {
    session: Session,
    id: NodeId,
}

impl std::fmt::Debug for DataFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataFrame").field("id", &self.id).finish()
    }
}

impl DataFrame {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn derive<F>(&self, f: F) -> Result<DataFrame>
    where
        F: FnOnce(&mut Graph) -> CoreResult<NodeId>,
    {
        self.session.build(f)
    }

    fn operand(&self, value: Operand) -> Result<NodeId> {
        match value {
            Operand::Frame(f) => self.session.own(&f),
            Operand::Value(v) => Ok(self.session.lock()?.build(|g| Ok(g.constant(v)))?),
        }
    }

    // ----- inspection -----

    pub fn columns(&self) -> Result<Vec<String>> {
        Ok(self.session.lock()?.graph().node(self.id)?.columns())
    }

    pub fn schema(&self) -> Result<Schema> {
        Ok(self.session.lock()?.graph().node(self.id)?.schema.clone())
    }

    /// Table name on the relational engine.
    pub fn name(&self) -> Result<String> {
        Ok(self.session.lock()?.graph().node(self.id)?.name.clone())
    }

    pub fn dependents(&self) -> Result<Vec<DataFrame>> {
        let ids = self.session.lock()?.graph().dependents(self.id).to_vec();
        Ok(ids.into_iter().map(|id| self.session.frame(id)).collect())
    }

    // ----- projection and selection -----

    /// Single column, usable as an expression operand.
    pub fn col(&self, name: &str) -> Result<DataFrame> {
        let id = self.id;
        self.derive(|g| g.projection(id, &[name], false))
    }

    pub fn select<S: AsRef<str>>(&self, columns: &[S]) -> Result<DataFrame> {
        let id = self.id;
        self.derive(|g| g.projection(id, columns, false))
    }

    /// Rows for which `criterion` holds.
    pub fn filter(&self, criterion: &DataFrame) -> Result<DataFrame> {
        let (id, crit) = (self.id, self.session.own(criterion)?);
        self.derive(|g| g.selection(id, crit))
    }

    // ----- criteria -----

    fn compare(&self, op: CompareOp, rhs: Operand) -> Result<DataFrame> {
        let (lhs, rhs) = (self.id, self.operand(rhs)?);
        self.derive(|g| g.compare(op, lhs, rhs))
    }

    pub fn eq(&self, rhs: impl Into<Operand>) -> Result<DataFrame> {
        self.compare(CompareOp::Eq, rhs.into())
    }

    pub fn ne(&self, rhs: impl Into<Operand>) -> Result<DataFrame> {
        self.compare(CompareOp::Ne, rhs.into())
    }

    pub fn lt(&self, rhs: impl Into<Operand>) -> Result<DataFrame> {
        self.compare(CompareOp::Lt, rhs.into())
    }

    pub fn le(&self, rhs: impl Into<Operand>) -> Result<DataFrame> {
        self.compare(CompareOp::Le, rhs.into())
    }

    pub fn gt(&self, rhs: impl Into<Operand>) -> Result<DataFrame> {
        self.compare(CompareOp::Gt, rhs.into())
    }

    pub fn ge(&self, rhs: impl Into<Operand>) -> Result<DataFrame> {
        self.compare(CompareOp::Ge, rhs.into())
    }

    /// SQL `LIKE` with `%` and `_` wildcards.
    pub fn like(&self, pattern: &str) -> Result<DataFrame> {
        let id = self.id;
        self.derive(|g| g.like(id, pattern))
    }

    pub fn is_null(&self) -> Result<DataFrame> {
        let id = self.id;
        self.derive(|g| g.is_null(id))
    }

    pub fn and(&self, other: &DataFrame) -> Result<DataFrame> {
        let (lhs, rhs) = (self.id, self.session.own(other)?);
        self.derive(|g| g.logical(BoolOp::And, lhs, Some(rhs)))
    }

    pub fn or(&self, other: &DataFrame) -> Result<DataFrame> {
        let (lhs, rhs) = (self.id, self.session.own(other)?);
        self.derive(|g| g.logical(BoolOp::Or, lhs, Some(rhs)))
    }

    pub fn not(&self) -> Result<DataFrame> {
        let id = self.id;
        self.derive(|g| g.logical(BoolOp::Not, id, None))
    }

    // ----- arithmetic -----

    fn arith(&self, op: ArithOp, rhs: Operand) -> Result<DataFrame> {
        let (lhs, rhs) = (self.id, self.operand(rhs)?);
        self.derive(|g| g.arith(op, lhs, rhs))
    }

    pub fn add(&self, rhs: impl Into<Operand>) -> Result<DataFrame> {
        self.arith(ArithOp::Add, rhs.into())
    }

    pub fn sub(&self, rhs: impl Into<Operand>) -> Result<DataFrame> {
        self.arith(ArithOp::Sub, rhs.into())
    }

    pub fn mul(&self, rhs: impl Into<Operand>) -> Result<DataFrame> {
        self.arith(ArithOp::Mul, rhs.into())
    }

    /// True division; the result is always a float.
    pub fn div(&self, rhs: impl Into<Operand>) -> Result<DataFrame> {
        self.arith(ArithOp::Div, rhs.into())
    }

    pub fn rem(&self, rhs: impl Into<Operand>) -> Result<DataFrame> {
        self.arith(ArithOp::Rem, rhs.into())
    }

    pub fn bitand(&self, rhs: impl Into<Operand>) -> Result<DataFrame> {
        self.arith(ArithOp::BitAnd, rhs.into())
    }

    pub fn bitor(&self, rhs: impl Into<Operand>) -> Result<DataFrame> {
        self.arith(ArithOp::BitOr, rhs.into())
    }

    pub fn bitxor(&self, rhs: impl Into<Operand>) -> Result<DataFrame> {
        self.arith(ArithOp::BitXor, rhs.into())
    }

    pub fn neg(&self) -> Result<DataFrame> {
        let id = self.id;
        self.derive(|g| g.unary(UnaryOp::Neg, id))
    }

    pub fn bitnot(&self) -> Result<DataFrame> {
        let id = self.id;
        self.derive(|g| g.unary(UnaryOp::BitNot, id))
    }

    // ----- joins and reshaping -----

    /// Equi-join on columns both sides share. Other clashing names get
    /// `_x` / `_y` suffixes.
    pub fn merge<S: AsRef<str>>(&self, other: &DataFrame, on: &[S], how: JoinType) -> Result<DataFrame> {
        self.join_on(other, on, on, how)
    }

    pub fn join_on<L: AsRef<str>, R: AsRef<str>>(
        &self,
        other: &DataFrame,
        left_on: &[L],
        right_on: &[R],
        how: JoinType,
    ) -> Result<DataFrame> {
        let (left, right) = (self.id, self.session.own(other)?);
        let left_on = left_on.iter().map(|k| k.as_ref().to_string()).collect();
        let right_on = right_on.iter().map(|k| k.as_ref().to_string()).collect();
        self.derive(|g| g.join(left, right, left_on, right_on, how))
    }

    pub fn groupby<S: AsRef<str>>(&self, keys: &[S]) -> Result<GroupBy> {
        let (id, keys) = (self.id, keys.iter().map(|k| k.as_ref().to_string()).collect());
        let frame = self.derive(|g| g.group_by(id, keys))?;
        Ok(GroupBy { frame })
    }

    /// Replace or append `column`. The handle now points at the new version;
    /// frames derived earlier keep seeing the old one.
    pub fn assign(&mut self, column: &str, value: impl Into<Operand>) -> Result<()> {
        let (target, value) = (self.id, self.operand(value.into())?);
        let next = self.derive(|g| g.assign(target, column, value))?;
        self.id = next.id;
        Ok(())
    }

    pub fn rename<A: AsRef<str>, B: AsRef<str>>(&self, mapping: &[(A, B)]) -> Result<DataFrame> {
        let id = self.id;
        let mapping = mapping
            .iter()
            .map(|(from, to)| (from.as_ref().to_string(), to.as_ref().to_string()))
            .collect();
        self.derive(|g| g.rename(id, mapping))
    }

    pub fn sort_values<S: AsRef<str>>(&self, by: &[S], ascending: bool) -> Result<DataFrame> {
        let id = self.id;
        let keys = by.iter().map(|k| (k.as_ref().to_string(), ascending)).collect();
        self.derive(|g| g.order_by(id, keys))
    }

    pub fn head(&self, n: usize) -> Result<DataFrame> {
        let id = self.id;
        self.derive(|g| g.limit(id, n))
    }

    pub fn drop_duplicates(&self) -> Result<DataFrame> {
        let columns = self.columns()?;
        let id = self.id;
        self.derive(|g| g.projection(id, &columns, true))
    }

    pub fn union(&self, others: &[&DataFrame]) -> Result<DataFrame> {
        let mut ids = vec![self.id];
        for other in others {
            ids.push(self.session.own(other)?);
        }
        self.derive(|g| g.union(&ids))
    }

    /// Summary statistics per numeric column. Runs in memory only.
    pub fn describe(&self) -> Result<DataFrame> {
        let id = self.id;
        self.derive(|g| g.describe(id))
    }

    /// Run `func` over the whole table in memory. `output` declares the
    /// columns it returns.
    pub fn apply<F>(&self, name: &str, output: Schema, func: F) -> Result<DataFrame>
    where
        F: Fn(&Table) -> CoreResult<Table> + Send + Sync + 'static,
    {
        let id = self.id;
        self.derive(|g| g.apply(id, name, output, Arc::new(func)))
    }

    // ----- aggregation -----

    fn aggregate(&self, func: AggFunc) -> Result<DataFrame> {
        let id = self.id;
        self.derive(|g| g.aggregate(id, func))
    }

    pub fn sum(&self) -> Result<DataFrame> {
        self.aggregate(AggFunc::Sum)
    }

    pub fn mean(&self) -> Result<DataFrame> {
        self.aggregate(AggFunc::Mean)
    }

    pub fn count(&self) -> Result<DataFrame> {
        self.aggregate(AggFunc::Count)
    }

    pub fn min(&self) -> Result<DataFrame> {
        self.aggregate(AggFunc::Min)
    }

    pub fn max(&self) -> Result<DataFrame> {
        self.aggregate(AggFunc::Max)
    }

    pub fn prod(&self) -> Result<DataFrame> {
        self.aggregate(AggFunc::Prod)
    }

    pub fn any(&self) -> Result<DataFrame> {
        self.aggregate(AggFunc::Any)
    }

    pub fn all(&self) -> Result<DataFrame> {
        self.aggregate(AggFunc::All)
    }

    // ----- materialization -----

    /// Materialize on the backend chosen by the session's strategy.
    pub fn compute(&self) -> Result<Arc<Value>> {
        self.session.lock()?.compute(self.id)
    }

    /// Computed result as a table; collapsed aggregates become one row.
    pub fn to_table(&self) -> Result<Table> {
        let mut engine = self.session.lock()?;
        let value = engine.compute(self.id)?;
        let columns = engine.graph().node(self.id)?.columns();
        Ok(value.to_table(&columns)?)
    }

    /// The SQLite statement that would produce this frame right now.
    pub fn sql(&self) -> Result<String> {
        self.session.lock()?.sql(self.id)
    }

    pub fn is_out_of_memory(&self) -> Result<bool> {
        Ok(self.session.lock()?.is_out_of_memory(self.id))
    }

    /// Free the cached in-memory result, if any.
    pub fn evict(&self) -> Result<bool> {
        self.session.lock()?.evict(self.id)
    }
}

/// Rows grouped by key columns, waiting for an aggregation.
#[derive(Debug, Clone)]
pub struct GroupBy {
    frame: DataFrame,
}

impl GroupBy {
    /// Restrict the aggregated columns (keys are always kept).
    pub fn select<S: AsRef<str>>(&self, columns: &[S]) -> Result<GroupBy> {
        let id = self.frame.id;
        let columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        let frame = self.frame.derive(|g| g.group_projection(id, columns))?;
        Ok(GroupBy { frame })
    }

    pub fn sum(&self) -> Result<DataFrame> {
        self.frame.aggregate(AggFunc::Sum)
    }

    pub fn mean(&self) -> Result<DataFrame> {
        self.frame.aggregate(AggFunc::Mean)
    }

    pub fn count(&self) -> Result<DataFrame> {
        self.frame.aggregate(AggFunc::Count)
    }

    pub fn min(&self) -> Result<DataFrame> {
        self.frame.aggregate(AggFunc::Min)
    }

    pub fn max(&self) -> Result<DataFrame> {
        self.frame.aggregate(AggFunc::Max)
    }

    pub fn prod(&self) -> Result<DataFrame> {
        self.frame.aggregate(AggFunc::Prod)
    }

    pub fn any(&self) -> Result<DataFrame> {
        self.frame.aggregate(AggFunc::Any)
    }

    pub fn all(&self) -> Result<DataFrame> {
        self.frame.aggregate(AggFunc::All)
    }
}
