//! Node arena with construction-time validation and schema inference.
//!
//! Every constructor checks its arguments against the schemas of its inputs
//! and fails with `Error::Construction` before anything is added. A node that
//! made it into the arena therefore has a fully known output schema.

use std::collections::HashSet;

use tandem_core::error::{Error, Result};
use tandem_core::id::NodeId;
use tandem_core::ops::{AggFunc, ArithOp, BoolOp, CompareOp, JoinType, UnaryOp};
use tandem_core::schema::{DataType, Field, JoinLayout, Schema};
use tandem_core::types::Scalar;
use tandem_frame::describe::describe_schema;

use crate::node::{Arithmetic, Criterion, FallbackOp, Node, Op, TableFn};

/// Column name given to a bare constant.
pub const CONSTANT_COLUMN: &str = "constant";

#[derive(Debug, Default)]
pub struct Graph {
    tag: String,
    nodes: Vec<Node>,
    dependents: Vec<Vec<NodeId>>,
}

impl Graph {
    /// `tag` keeps relational names unique across sessions sharing a database.
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            nodes: Vec::new(),
            dependents: Vec::new(),
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index())
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.get(id)
            .ok_or_else(|| Error::Invariant(format!("{id} is not part of this graph")))
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Nodes built directly on top of `id` (lookup only).
    pub fn dependents(&self, id: NodeId) -> &[NodeId] {
        self.dependents
            .get(id.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn push(&mut self, op: Op, sources: Vec<NodeId>, eval_sources: Vec<NodeId>, schema: Schema) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u64);
        let mut registered = HashSet::new();
        for dep in sources.iter().chain(eval_sources.iter()) {
            if registered.insert(*dep) {
                self.dependents[dep.index()].push(id);
            }
        }
        self.nodes.push(Node {
            id,
            name: format!("t{}_{}", self.tag, id.get()),
            op,
            sources,
            eval_sources,
            schema,
        });
        self.dependents.push(Vec::new());
        id
    }

    /// A node whose output is a table (not a constant or a grouping container).
    fn table(&self, id: NodeId) -> Result<&Node> {
        let node = self.node(id)?;
        match &node.op {
            Op::Constant(_) => Err(Error::Construction(format!(
                "{} is a constant, not a table",
                node.name
            ))),
            op if op.is_container() => Err(Error::Construction(format!(
                "{} is a grouping, aggregate it first",
                node.name
            ))),
            _ => Ok(node),
        }
    }

    // ----- base values -----

    /// Base table with the given schema. The data is owned by the engine.
    pub fn source(&mut self, schema: Schema) -> Result<NodeId> {
        let mut seen = HashSet::new();
        for f in &schema.fields {
            if !seen.insert(f.name.as_str()) {
                return Err(Error::Construction(format!(
                    "duplicate column name '{}'",
                    f.name
                )));
            }
        }
        Ok(self.push(Op::Source, vec![], vec![], schema))
    }

    pub fn constant(&mut self, value: Scalar) -> NodeId {
        let schema = Schema::new(vec![Field::new(
            CONSTANT_COLUMN,
            value.data_type(),
            value.is_null(),
        )]);
        self.push(Op::Constant(value), vec![], vec![], schema)
    }

    // ----- expressions -----

    /// Owning table of an expression operand: `None` for constants.
    pub fn expression_base(&self, id: NodeId) -> Result<Option<NodeId>> {
        let node = self.node(id)?;
        match &node.op {
            Op::Constant(_) => Ok(None),
            Op::Projection { columns, .. } if columns.len() == 1 => Ok(Some(node.sources[0])),
            Op::Criterion(_) | Op::Arithmetic(_) => Ok(Some(node.sources[0])),
            _ => Err(Error::Construction(format!(
                "{} ({}) is not a column, constant or expression",
                node.name,
                node.op.kind()
            ))),
        }
    }

    /// Output field of an expression operand.
    fn operand_field(&self, id: NodeId) -> Result<&Field> {
        self.node(id)?
            .schema
            .field(0)
            .ok_or_else(|| Error::Construction(format!("{id} has no columns")))
    }

    /// Shared owning table of `operands`, plus the output column name taken
    /// from the first column operand.
    fn expression_owner(&self, operands: &[NodeId]) -> Result<(NodeId, String)> {
        let mut owner: Option<NodeId> = None;
        let mut name: Option<String> = None;
        for &op in operands {
            if let Some(base) = self.expression_base(op)? {
                match owner {
                    Some(existing) if existing != base => {
                        return Err(Error::Construction(format!(
                            "expression mixes columns of {} and {}",
                            self.node(existing)?.name,
                            self.node(base)?.name
                        )))
                    }
                    _ => owner = Some(base),
                }
                if name.is_none() {
                    name = Some(self.operand_field(op)?.name.clone());
                }
            }
        }
        match (owner, name) {
            (Some(owner), Some(name)) => Ok((owner, name)),
            _ => Err(Error::Construction(
                "expression needs at least one column operand".into(),
            )),
        }
    }

    fn push_criterion(&mut self, criterion: Criterion, operands: Vec<NodeId>) -> Result<NodeId> {
        let (owner, name) = self.expression_owner(&operands)?;
        let schema = Schema::new(vec![Field::new(name, DataType::Boolean, true)]);
        Ok(self.push(Op::Criterion(criterion), vec![owner], operands, schema))
    }

    /// Numbers never compare against text or blobs: SQLite would coerce the
    /// text through column affinity where the in-memory engine would not.
    pub fn compare(&mut self, op: CompareOp, lhs: NodeId, rhs: NodeId) -> Result<NodeId> {
        let l = self.operand_field(lhs)?.data_type;
        let r = self.operand_field(rhs)?.data_type;
        if l.is_numeric() != r.is_numeric() && l != DataType::Null && r != DataType::Null {
            return Err(Error::Construction(format!(
                "cannot compare {:?} with {:?}",
                l, r
            )));
        }
        self.push_criterion(Criterion::Compare(op), vec![lhs, rhs])
    }

    pub fn like(&mut self, operand: NodeId, pattern: impl Into<String>) -> Result<NodeId> {
        self.push_criterion(Criterion::Like(pattern.into()), vec![operand])
    }

    pub fn is_null(&mut self, operand: NodeId) -> Result<NodeId> {
        self.push_criterion(Criterion::IsNull, vec![operand])
    }

    /// `AND` / `OR` take two criteria, `NOT` takes one (`rhs` must be `None`).
    pub fn logical(&mut self, op: BoolOp, lhs: NodeId, rhs: Option<NodeId>) -> Result<NodeId> {
        let operands: Vec<NodeId> = match (op, rhs) {
            (BoolOp::Not, None) => vec![lhs],
            (BoolOp::And | BoolOp::Or, Some(rhs)) => vec![lhs, rhs],
            _ => {
                return Err(Error::Construction(format!(
                    "{:?} takes {} operand(s)",
                    op,
                    if op == BoolOp::Not { 1 } else { 2 }
                )))
            }
        };
        for &operand in &operands {
            let node = self.node(operand)?;
            if !matches!(node.op, Op::Criterion(_)) {
                return Err(Error::Construction(format!(
                    "{:?} requires criterion operands, got {}",
                    op,
                    node.op.kind()
                )));
            }
        }
        self.push_criterion(Criterion::Logical(op), operands)
    }

    fn numeric_operand(&self, id: NodeId) -> Result<DataType> {
        let dt = self.operand_field(id)?.data_type;
        if dt.is_numeric() || dt == DataType::Null {
            Ok(dt)
        } else {
            Err(Error::Construction(format!(
                "arithmetic on non-numeric operand of type {:?}",
                dt
            )))
        }
    }

    pub fn arith(&mut self, op: ArithOp, lhs: NodeId, rhs: NodeId) -> Result<NodeId> {
        let (owner, name) = self.expression_owner(&[lhs, rhs])?;
        let dt = op.result_type(self.numeric_operand(lhs)?, self.numeric_operand(rhs)?);
        let schema = Schema::new(vec![Field::new(name, dt, true)]);
        Ok(self.push(
            Op::Arithmetic(Arithmetic::Binary(op)),
            vec![owner],
            vec![lhs, rhs],
            schema,
        ))
    }

    pub fn unary(&mut self, op: UnaryOp, operand: NodeId) -> Result<NodeId> {
        let (owner, name) = self.expression_owner(&[operand])?;
        let dt = match (op, self.numeric_operand(operand)?) {
            (UnaryOp::Neg, DataType::Float64) => DataType::Float64,
            _ => DataType::Int64,
        };
        let schema = Schema::new(vec![Field::new(name, dt, true)]);
        Ok(self.push(
            Op::Arithmetic(Arithmetic::Unary(op)),
            vec![owner],
            vec![operand],
            schema,
        ))
    }

    // ----- table operations -----

    pub fn projection<S: AsRef<str>>(
        &mut self,
        source: NodeId,
        columns: &[S],
        distinct: bool,
    ) -> Result<NodeId> {
        if columns.is_empty() {
            return Err(Error::Construction("projection needs at least one column".into()));
        }
        let schema = self.table(source)?.schema.project(columns)?;
        let columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
        if columns.iter().collect::<HashSet<_>>().len() != columns.len() {
            return Err(Error::Construction(format!(
                "projection repeats a column: {:?}",
                columns
            )));
        }
        Ok(self.push(
            Op::Projection { columns, distinct },
            vec![source],
            vec![],
            schema,
        ))
    }

    /// Rows of `table` where `criterion` holds.
    pub fn selection(&mut self, table: NodeId, criterion: NodeId) -> Result<NodeId> {
        let schema = self.table(table)?.schema.clone();
        let crit = self.node(criterion)?;
        let is_predicate = match &crit.op {
            Op::Criterion(_) => true,
            Op::Projection { columns, .. } => columns.len() == 1,
            _ => false,
        };
        if !is_predicate {
            return Err(Error::Construction(format!(
                "selection criterion must be a criterion or single column, got {}",
                crit.op.kind()
            )));
        }
        if self.expression_base(criterion)? != Some(table) {
            return Err(Error::Construction(format!(
                "criterion {} does not reference {}",
                crit.name,
                self.node(table)?.name
            )));
        }
        Ok(self.push(Op::Selection, vec![table], vec![criterion], schema))
    }

    pub fn join(
        &mut self,
        left: NodeId,
        right: NodeId,
        left_on: Vec<String>,
        right_on: Vec<String>,
        how: JoinType,
    ) -> Result<NodeId> {
        let layout = JoinLayout::new(
            &self.table(left)?.schema,
            &self.table(right)?.schema,
            &left_on,
            &right_on,
            how == JoinType::Left,
        )?;
        let schema = layout.schema.clone();
        Ok(self.push(
            Op::Join {
                left_on,
                right_on,
                how,
                layout,
            },
            vec![left, right],
            vec![],
            schema,
        ))
    }

    /// Concatenation of `sources`, in the first source's column order.
    pub fn union(&mut self, sources: &[NodeId]) -> Result<NodeId> {
        let first = sources
            .first()
            .ok_or_else(|| Error::Construction("union needs at least one source".into()))?;
        let mut schema = self.table(*first)?.schema.clone();
        for &other in &sources[1..] {
            let other_schema = &self.table(other)?.schema;
            if !schema.same_columns(other_schema) {
                return Err(Error::Construction(format!(
                    "union sources differ in columns: {:?} vs {:?}",
                    schema.names(),
                    other_schema.names()
                )));
            }
            for field in schema.fields.iter_mut() {
                if let Some(o) = other_schema.field_named(&field.name) {
                    field.data_type = field.data_type.unify(o.data_type);
                    field.nullable |= o.nullable;
                }
            }
        }
        Ok(self.push(Op::Union, sources.to_vec(), vec![], schema))
    }

    pub fn order_by(&mut self, source: NodeId, keys: Vec<(String, bool)>) -> Result<NodeId> {
        let schema = self.table(source)?.schema.clone();
        if keys.is_empty() {
            return Err(Error::Construction("sort needs at least one key".into()));
        }
        let names: Vec<&str> = keys.iter().map(|(k, _)| k.as_str()).collect();
        schema.require_columns(&names)?;
        Ok(self.push(Op::OrderBy { keys }, vec![source], vec![], schema))
    }

    pub fn limit(&mut self, source: NodeId, n: usize) -> Result<NodeId> {
        let schema = self.table(source)?.schema.clone();
        Ok(self.push(Op::Limit { n }, vec![source], vec![], schema))
    }

    pub fn group_by(&mut self, source: NodeId, keys: Vec<String>) -> Result<NodeId> {
        let schema = self.table(source)?.schema.clone();
        if keys.is_empty() {
            return Err(Error::Construction("group by needs at least one key".into()));
        }
        schema.require_columns(&keys)?;
        Ok(self.push(Op::GroupBy { keys }, vec![source], vec![], schema))
    }

    /// Column subset of a grouping.
    pub fn group_projection(&mut self, group: NodeId, columns: Vec<String>) -> Result<NodeId> {
        let node = self.node(group)?;
        let Op::GroupBy { keys } = &node.op else {
            return Err(Error::Construction(format!(
                "{} is not a group by",
                node.name
            )));
        };
        let mut wanted = keys.clone();
        wanted.extend(columns.iter().filter(|c| !keys.contains(c)).cloned());
        let schema = node.schema.project(&wanted)?;
        Ok(self.push(
            Op::GroupByProjection { columns },
            vec![group],
            vec![],
            schema,
        ))
    }

    /// Aggregate a table (scalar result) or a grouping (one row per group).
    pub fn aggregate(&mut self, source: NodeId, func: AggFunc) -> Result<NodeId> {
        let node = self.node(source)?;
        let (input, keys, selected): (NodeId, Vec<String>, Option<Vec<String>>) = match &node.op {
            Op::GroupBy { keys } => (node.sources[0], keys.clone(), None),
            Op::GroupByProjection { columns } => {
                let group = self.node(node.sources[0])?;
                let Op::GroupBy { keys } = &group.op else {
                    return Err(Error::Invariant(format!(
                        "{} does not project a group by",
                        node.name
                    )));
                };
                (group.sources[0], keys.clone(), Some(columns.clone()))
            }
            Op::Constant(_) => {
                return Err(Error::Construction("cannot aggregate a constant".into()))
            }
            _ => (source, Vec::new(), None),
        };

        let input_schema = &self.node(input)?.schema;
        let columns: Vec<String> = selected
            .unwrap_or_else(|| input_schema.names())
            .into_iter()
            .filter(|c| !keys.contains(c))
            .collect();
        if columns.is_empty() {
            return Err(Error::Construction(format!(
                "{} needs at least one non-key column",
                func
            )));
        }

        let mut fields = Vec::with_capacity(keys.len() + columns.len());
        for k in &keys {
            fields.push(input_schema.field_named(k).cloned().ok_or_else(|| {
                Error::Construction(format!("group key '{}' not found", k))
            })?);
        }
        for c in &columns {
            let f = input_schema
                .field_named(c)
                .ok_or_else(|| Error::Construction(format!("column '{}' not found", c)))?;
            if func.requires_numeric() && !(f.data_type.is_numeric() || f.data_type == DataType::Null) {
                return Err(Error::Construction(format!(
                    "{} is not defined for column '{}' of type {:?}",
                    func, c, f.data_type
                )));
            }
            let nullable = matches!(func, AggFunc::Mean | AggFunc::Min | AggFunc::Max);
            fields.push(Field::new(c.clone(), func.result_type(f.data_type), nullable));
        }

        Ok(self.push(
            Op::Aggregator {
                func,
                input,
                keys,
                columns,
            },
            vec![source],
            vec![],
            Schema::new(fields),
        ))
    }

    pub fn rename(&mut self, source: NodeId, mapping: Vec<(String, String)>) -> Result<NodeId> {
        let input = &self.table(source)?.schema;
        let from: Vec<&str> = mapping.iter().map(|(f, _)| f.as_str()).collect();
        input.require_columns(&from)?;
        let fields: Vec<Field> = input
            .fields
            .iter()
            .map(|f| match mapping.iter().find(|(from, _)| *from == f.name) {
                Some((_, to)) => f.renamed(to.clone()),
                None => f.clone(),
            })
            .collect();
        let mut seen = HashSet::new();
        for f in &fields {
            if !seen.insert(f.name.as_str()) {
                return Err(Error::Construction(format!(
                    "rename produces duplicate column '{}'",
                    f.name
                )));
            }
        }
        let schema = Schema::new(fields);
        Ok(self.push(Op::Rename { mapping }, vec![source], vec![], schema))
    }

    /// Replace or append `column` of `target` with `value`.
    ///
    /// `target` becomes the frozen predecessor: the returned node is the new
    /// head of the assignment chain and nothing built on `target` changes.
    pub fn assign(&mut self, target: NodeId, column: impl Into<String>, value: NodeId) -> Result<NodeId> {
        let column = column.into();
        let mut schema = self.table(target)?.schema.clone();
        if let Some(base) = self.expression_base(value)? {
            if base != target {
                return Err(Error::Construction(format!(
                    "assigned value references {}, not {}",
                    self.node(base)?.name,
                    self.node(target)?.name
                )));
            }
        }
        let field = self.operand_field(value)?;
        let new_field = Field::new(column.clone(), field.data_type, field.nullable);
        match schema.index_of(&column) {
            Some(idx) => schema.fields[idx] = new_field,
            None => schema.fields.push(new_field),
        }
        Ok(self.push(Op::Assign { column }, vec![target], vec![value], schema))
    }

    pub fn describe(&mut self, source: NodeId) -> Result<NodeId> {
        let schema = describe_schema(&self.table(source)?.schema);
        Ok(self.push(Op::Fallback(FallbackOp::Describe), vec![source], vec![], schema))
    }

    /// In-memory-only table function producing `output`.
    pub fn apply(
        &mut self,
        source: NodeId,
        name: impl Into<String>,
        output: Schema,
        func: TableFn,
    ) -> Result<NodeId> {
        self.table(source)?;
        if output.is_empty() {
            return Err(Error::Construction("apply must declare its output columns".into()));
        }
        let mut seen = HashSet::new();
        for f in &output.fields {
            if !seen.insert(f.name.as_str()) {
                return Err(Error::Construction(format!(
                    "apply declares column '{}' twice",
                    f.name
                )));
            }
        }
        Ok(self.push(
            Op::Fallback(FallbackOp::Apply {
                name: name.into(),
                func,
            }),
            vec![source],
            vec![],
            output,
        ))
    }
}
