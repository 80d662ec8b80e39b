use std::any::Any;
use std::cell::Cell;
use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt::Display;
use std::fmt::Formatter;
use std::rc::Rc;
use std::sync::Arc;

use crate::access::engine::Scan;
use crate::access::value::Values;
use crate::catalog::r#type::Value;
use crate::error::Error;
use crate::error::Result;
use crate::internal_err;
use crate::sql::execution::compiler::ExecutionPlan;
use crate::sql::execution::compiler::RecordBatch;
use crate::sql::execution::context::Context;
use crate::sql::execution::expr::PhysicalExpr;
use crate::sql::execution::Scheduler;
use crate::sql::plan::plan::TableScan;
use crate::sql::plan::schema::LogicalSchema;
use crate::sql::plan::schema::TableReference;
use crate::value_err;

#[derive(Debug)]
pub struct ValuesExec {
    schema: LogicalSchema,
    values: Vec<Vec<Arc<dyn PhysicalExpr>>>,
    cursor: Cell<usize>,
}

impl ValuesExec {
    pub fn new(schema: LogicalSchema, values: Vec<Vec<Arc<dyn PhysicalExpr>>>) -> Self {
        Self { schema, values, cursor: Cell::new(0) }
    }
}

impl ExecutionPlan for ValuesExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> LogicalSchema {
        self.schema.clone()
    }

    fn init(&self, _ctx: &mut dyn Context) -> Result<()> {
        self.cursor.set(0);
        Ok(())
    }

    fn execute(&self, ctx: &mut dyn Context) -> Result<Option<RecordBatch>> {
        let cursor = self.cursor.get();
        if cursor >= self.values.len() {
            return Ok(None);
        }
        let to = self.values.len().min(cursor + ctx.vector_size());

        // Dummy batch for cell expr evaluation
        let batch = RecordBatch::new(&self.schema, vec![]);
        let result = self.values[cursor..to]
            .iter()
            .map(|row_exprs| {
                row_exprs
                    .iter()
                    .map(|cell| cell.evaluate(ctx, &batch)?.scalar())
                    .collect::<Result<Vec<_>>>()
                    .map(Values::from)
            })
            .collect::<Result<Vec<_>>>()?;

        self.cursor.set(to);
        Ok(Some(RecordBatch::new(&self.schema, result)))
    }
}

impl Display for ValuesExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let values = self
            .values
            .iter()
            .take(3)
            .map(|row| {
                let item = row.iter().map(|expr| expr.to_string()).collect::<Vec<_>>().join(", ");
                format!("({})", item)
            })
            .collect::<Vec<_>>();
        let eclipse = if self.values.len() > 3 { "..." } else { "" };
        write!(f, "ValuesExec: {}{}", values.join(", "), eclipse)
    }
}

#[derive(Debug)]
pub struct ProjectionExec {
    input: Arc<dyn ExecutionPlan>,
    exprs: Vec<Arc<dyn PhysicalExpr>>,
    output_schema: LogicalSchema,
}

impl ProjectionExec {
    pub fn new(
        input: Arc<dyn ExecutionPlan>,
        exprs: Vec<Arc<dyn PhysicalExpr>>,
        output_schema: LogicalSchema,
    ) -> Self {
        Self { input, exprs, output_schema }
    }
}

impl ExecutionPlan for ProjectionExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> LogicalSchema {
        self.output_schema.clone()
    }

    fn init(&self, ctx: &mut dyn Context) -> Result<()> {
        self.input.init(ctx)
    }

    fn execute(&self, ctx: &mut dyn Context) -> Result<Option<RecordBatch>> {
        let rb = match self.input.execute(ctx)? {
            Some(rb) => rb,
            None => return Ok(None),
        };
        let mut output_rows = Vec::with_capacity(rb.num_rows());
        for row in rb.rows {
            let mut output_row = Vec::with_capacity(self.exprs.len());
            let batch = RecordBatch::new(&rb.schema, vec![row]);
            for expr in &self.exprs {
                let values = expr.evaluate(ctx, &batch)?;
                output_row.push(values.scalar()?)
            }
            output_rows.push(Values::from(output_row));
        }
        Ok(Some(RecordBatch::new(&self.output_schema, output_rows)))
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![&self.input]
    }
}

impl Display for ProjectionExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ProjectionExec: ")?;
        for (i, expr) in self.exprs.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{expr}")?;
        }
        Ok(())
    }
}

pub struct SeqScanExec {
    relation: TableReference,
    table_name: String,
    output_schema: LogicalSchema,
    scan: RefCell<Option<Scan>>,
}

impl std::fmt::Debug for SeqScanExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeqScanExec")
            .field("relation", &self.relation)
            .field("table_name", &self.table_name)
            .finish()
    }
}

impl SeqScanExec {
    pub fn new(ts: TableScan) -> Self {
        SeqScanExec {
            relation: ts.relation,
            table_name: ts.table.name,
            output_schema: ts.output_schema,
            scan: RefCell::new(None),
        }
    }
}

impl ExecutionPlan for SeqScanExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> LogicalSchema {
        self.output_schema.clone()
    }

    fn init(&self, ctx: &mut dyn Context) -> Result<()> {
        let txn = ctx.txn();
        let scan = txn.scan(&self.table_name)?;
        self.scan.borrow_mut().replace(scan);
        Ok(())
    }

    fn execute(&self, ctx: &mut dyn Context) -> Result<Option<RecordBatch>> {
        let mut scan_borrow = self.scan.borrow_mut();
        let scan =
            scan_borrow.as_mut().ok_or_else(|| Error::internal("SeqScanExec not initialized"))?;
        let mut rows = vec![];
        while let Some(tuple) = scan.next().transpose()? {
            rows.push(tuple.values);
            if rows.len() == ctx.vector_size() {
                break;
            }
        }
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(RecordBatch::new(&self.output_schema, rows)))
    }
}

impl Display for SeqScanExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SeqScanExec: {}", self.relation)
    }
}

#[derive(Debug)]
pub struct SubqueryAliasExec {
    input: Arc<dyn ExecutionPlan>,
    alias_schema: LogicalSchema,
    alias: TableReference,
}

impl SubqueryAliasExec {
    pub fn new(
        input: Arc<dyn ExecutionPlan>,
        alias_schema: LogicalSchema,
        alias: TableReference,
    ) -> Self {
        Self { input, alias_schema, alias }
    }
}

impl ExecutionPlan for SubqueryAliasExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> LogicalSchema {
        self.alias_schema.clone()
    }

    fn init(&self, ctx: &mut dyn Context) -> Result<()> {
        self.input.init(ctx)
    }

    fn execute(&self, ctx: &mut dyn Context) -> Result<Option<RecordBatch>> {
        let rb = match self.input.execute(ctx)? {
            Some(rb) => rb,
            None => return Ok(None),
        };
        if rb.schema.len() != self.alias_schema.len() {
            return Err(internal_err!(
                "Unexpected alias schema fields size, expect {}, got {}",
                self.alias_schema.len(),
                rb.schema.len()
            ));
        }
        Ok(Some(RecordBatch::new(&self.alias_schema, rb.rows)))
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![&self.input]
    }
}

impl Display for SubqueryAliasExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SubqueryAliasExec: {}", self.alias)
    }
}

/// Filter physical executor
#[derive(Debug)]
pub struct FilterExec {
    input: Arc<dyn ExecutionPlan>,
    predicate: Arc<dyn PhysicalExpr>,
}

impl FilterExec {
    pub fn new(input: Arc<dyn ExecutionPlan>, predicate: Arc<dyn PhysicalExpr>) -> Self {
        Self { input, predicate }
    }
}

impl ExecutionPlan for FilterExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> LogicalSchema {
        self.input.schema()
    }

    fn init(&self, ctx: &mut dyn Context) -> Result<()> {
        self.input.init(ctx)
    }

    fn execute(&self, ctx: &mut dyn Context) -> Result<Option<RecordBatch>> {
        let rb = match self.input.execute(ctx)? {
            Some(rb) => rb,
            None => return Ok(None),
        };
        if rb.num_rows() == 0 {
            return Ok(Some(rb));
        }
        let keep = self.predicate.evaluate(ctx, &rb)?;
        if keep.len() != rb.num_rows() {
            return Err(internal_err!(
                "Filter predicate produced {} values for {} rows",
                keep.len(),
                rb.num_rows()
            ));
        }
        let rows = rb
            .rows
            .into_iter()
            .zip(keep.into_iter())
            .filter_map(|(row, keep)| match keep {
                // a predicate evaluating to false or NULL drops the row
                Value::Boolean(true) => Some(Ok(row)),
                Value::Boolean(false) | Value::Null => None,
                v => Some(Err(value_err!("Filter predicate must be a boolean, got {}", v))),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Some(RecordBatch::new(&rb.schema, rows)))
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![&self.input]
    }
}

impl Display for FilterExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "FilterExec: {}", self.predicate)
    }
}

/// Sort physical executor. Materializes the whole input on the first
/// poll, then yields it in batches.
#[derive(Debug)]
pub struct SortExec {
    input: Arc<dyn ExecutionPlan>,
    order: Vec<SortExprExec>,
    sorted: RefCell<Option<Vec<Values>>>,
    cursor: Cell<usize>,
}

#[derive(Debug)]
pub struct SortExprExec {
    pub expr: Arc<dyn PhysicalExpr>,
    pub asc: bool,
}

impl SortExprExec {
    pub fn new(expr: Arc<dyn PhysicalExpr>, asc: bool) -> Self {
        Self { expr, asc }
    }
}

impl SortExec {
    pub fn new(input: Arc<dyn ExecutionPlan>, order: Vec<SortExprExec>) -> Self {
        Self { input, order, sorted: RefCell::new(None), cursor: Cell::new(0) }
    }

    fn materialize(&self, ctx: &mut dyn Context) -> Result<Vec<Values>> {
        let schema = self.input.schema();
        let rs = Scheduler::poll_executor(ctx, &self.input)?;

        // compute sort keys per row
        let mut keyed = rs
            .into_iter()
            .map(|row| {
                let batch = RecordBatch::new(&schema, vec![row.clone()]);
                let keys = self
                    .order
                    .iter()
                    .map(|it| it.expr.evaluate(ctx, &batch)?.scalar())
                    .collect::<Result<Vec<_>>>()?;
                Ok((keys, row))
            })
            .collect::<Result<Vec<_>>>()?;
        keyed.sort_by(|(a, _), (b, _)| {
            for (i, order) in self.order.iter().enumerate() {
                let ord = a[i].partial_cmp(&b[i]).unwrap_or(std::cmp::Ordering::Equal);
                let ord = if order.asc { ord } else { ord.reverse() };
                if ord != std::cmp::Ordering::Equal {
                    return ord;
                }
            }
            std::cmp::Ordering::Equal
        });
        Ok(keyed.into_iter().map(|(_, row)| row).collect())
    }
}

impl ExecutionPlan for SortExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> LogicalSchema {
        self.input.schema()
    }

    fn init(&self, ctx: &mut dyn Context) -> Result<()> {
        self.sorted.replace(None);
        self.cursor.set(0);
        self.input.init(ctx)
    }

    fn execute(&self, ctx: &mut dyn Context) -> Result<Option<RecordBatch>> {
        if self.sorted.borrow().is_none() {
            let rows = self.materialize(ctx)?;
            self.sorted.replace(Some(rows));
        }
        let sorted = self.sorted.borrow();
        let rows =
            sorted.as_ref().ok_or_else(|| Error::internal("SortExec not materialized"))?;
        let cursor = self.cursor.get();
        if cursor >= rows.len() {
            return Ok(None);
        }
        let to = rows.len().min(cursor + ctx.vector_size());
        self.cursor.set(to);
        Ok(Some(RecordBatch::new(&self.schema(), rows[cursor..to].to_vec())))
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![&self.input]
    }
}

impl Display for SortExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let order = self
            .order
            .iter()
            .map(|it| format!("{} {}", it.expr, if it.asc { "ASC" } else { "DESC" }))
            .collect::<Vec<_>>();
        write!(f, "SortExec: {}", order.join(", "))
    }
}

/// Limit physical executor
#[derive(Debug)]
pub struct LimitExec {
    input: Arc<dyn ExecutionPlan>,
    skip: usize,
    fetch: Option<usize>,
    skipped: Cell<usize>,
    fetched: Cell<usize>,
}

impl LimitExec {
    pub fn new(input: Arc<dyn ExecutionPlan>, skip: Option<u64>, fetch: Option<u64>) -> Self {
        Self {
            input,
            skip: skip.unwrap_or(0) as usize,
            fetch: fetch.map(|it| it as usize),
            skipped: Cell::new(0),
            fetched: Cell::new(0),
        }
    }
}

impl ExecutionPlan for LimitExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> LogicalSchema {
        self.input.schema()
    }

    fn init(&self, ctx: &mut dyn Context) -> Result<()> {
        self.skipped.set(0);
        self.fetched.set(0);
        self.input.init(ctx)
    }

    fn execute(&self, ctx: &mut dyn Context) -> Result<Option<RecordBatch>> {
        // Stop polling the input once the fetch budget is spent. This
        // is what terminates unbounded inputs, e.g. a recursive CTE
        // with no intrinsic fixpoint.
        if let Some(fetch) = self.fetch {
            if self.fetched.get() >= fetch {
                return Ok(None);
            }
        }
        let rb = match self.input.execute(ctx)? {
            Some(rb) => rb,
            None => return Ok(None),
        };
        let mut rows = rb.rows;
        let to_skip = self.skip.saturating_sub(self.skipped.get()).min(rows.len());
        if to_skip > 0 {
            self.skipped.set(self.skipped.get() + to_skip);
            rows.drain(..to_skip);
        }
        if let Some(fetch) = self.fetch {
            let budget = fetch - self.fetched.get();
            rows.truncate(budget);
        }
        self.fetched.set(self.fetched.get() + rows.len());
        Ok(Some(RecordBatch::new(&rb.schema, rows)))
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![&self.input]
    }
}

impl Display for LimitExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "LimitExec: skip={}, fetch={:?}", self.skip, self.fetch)
    }
}

/// Union physical executor: drains the left input, then the right.
/// Distinct mode drops rows already emitted.
#[derive(Debug)]
pub struct UnionExec {
    left: Arc<dyn ExecutionPlan>,
    right: Arc<dyn ExecutionPlan>,
    all: bool,
    schema: LogicalSchema,
    left_done: Cell<bool>,
    seen: RefCell<HashSet<Values>>,
}

impl UnionExec {
    pub fn new(
        left: Arc<dyn ExecutionPlan>,
        right: Arc<dyn ExecutionPlan>,
        all: bool,
        schema: LogicalSchema,
    ) -> Self {
        Self {
            left,
            right,
            all,
            schema,
            left_done: Cell::new(false),
            seen: RefCell::new(HashSet::new()),
        }
    }

    fn dedup(&self, rows: Vec<Values>) -> Vec<Values> {
        if self.all {
            return rows;
        }
        let mut seen = self.seen.borrow_mut();
        rows.into_iter().filter(|row| seen.insert(row.clone())).collect()
    }
}

impl ExecutionPlan for UnionExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> LogicalSchema {
        self.schema.clone()
    }

    fn init(&self, ctx: &mut dyn Context) -> Result<()> {
        self.left_done.set(false);
        self.seen.borrow_mut().clear();
        self.left.init(ctx)?;
        self.right.init(ctx)
    }

    fn execute(&self, ctx: &mut dyn Context) -> Result<Option<RecordBatch>> {
        if !self.left_done.get() {
            if let Some(rb) = self.left.execute(ctx)? {
                return Ok(Some(RecordBatch::new(&self.schema, self.dedup(rb.rows))));
            }
            self.left_done.set(true);
        }
        match self.right.execute(ctx)? {
            Some(rb) => Ok(Some(RecordBatch::new(&self.schema, self.dedup(rb.rows)))),
            None => Ok(None),
        }
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![&self.left, &self.right]
    }
}

impl Display for UnionExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "UnionExec: {}", if self.all { "all" } else { "distinct" })
    }
}

/// The working table shared between a [`RecursiveCteExec`] and the
/// [`WorkTableExec`] nodes inside its recursive term. Holds the rows
/// produced by the previous iteration.
#[derive(Clone, Debug, Default)]
pub struct WorkTable(Rc<RefCell<Vec<Values>>>);

impl WorkTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> Vec<Values> {
        self.0.borrow().clone()
    }

    fn set(&self, rows: Vec<Values>) {
        *self.0.borrow_mut() = rows;
    }

    fn is_empty(&self) -> bool {
        self.0.borrow().is_empty()
    }
}

/// Recursive CTE physical executor.
///
/// Evaluates the static term once, then repeatedly evaluates the
/// recursive term with the working table holding the previous
/// iteration's delta, until an iteration produces no new rows. Under
/// UNION (distinct) a row that was already produced does not count as
/// new, which is the usual fixpoint termination argument; under UNION
/// ALL termination is the query's own responsibility (or an enclosing
/// LIMIT's).
#[derive(Debug)]
pub struct RecursiveCteExec {
    name: String,
    static_term: Arc<dyn ExecutionPlan>,
    recursive_term: Arc<dyn ExecutionPlan>,
    all: bool,
    schema: LogicalSchema,
    work_table: WorkTable,

    buffer: RefCell<Vec<Values>>,
    seen: RefCell<HashSet<Values>>,
    done: Cell<bool>,
}

impl RecursiveCteExec {
    pub fn new(
        name: String,
        static_term: Arc<dyn ExecutionPlan>,
        recursive_term: Arc<dyn ExecutionPlan>,
        all: bool,
        schema: LogicalSchema,
        work_table: WorkTable,
    ) -> Self {
        Self {
            name,
            static_term,
            recursive_term,
            all,
            schema,
            work_table,
            buffer: RefCell::new(Vec::new()),
            seen: RefCell::new(HashSet::new()),
            done: Cell::new(false),
        }
    }

    fn dedup(&self, rows: Vec<Values>) -> Vec<Values> {
        if self.all {
            return rows;
        }
        let mut seen = self.seen.borrow_mut();
        rows.into_iter().filter(|row| seen.insert(row.clone())).collect()
    }

    /// Run one iteration of the recursive term against the current
    /// working table, returning the new delta.
    fn iterate(&self, ctx: &mut dyn Context) -> Result<Vec<Values>> {
        let produced = Scheduler::poll_executor(ctx, &self.recursive_term)?;
        Ok(self.dedup(produced))
    }
}

impl ExecutionPlan for RecursiveCteExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> LogicalSchema {
        self.schema.clone()
    }

    fn init(&self, ctx: &mut dyn Context) -> Result<()> {
        self.buffer.borrow_mut().clear();
        self.seen.borrow_mut().clear();
        self.done.set(false);

        let static_rows = Scheduler::poll_executor(ctx, &self.static_term)?;
        let static_rows = self.dedup(static_rows);
        self.work_table.set(static_rows.clone());
        *self.buffer.borrow_mut() = static_rows;
        Ok(())
    }

    fn execute(&self, ctx: &mut dyn Context) -> Result<Option<RecordBatch>> {
        loop {
            {
                let mut buffer = self.buffer.borrow_mut();
                if !buffer.is_empty() {
                    let n = buffer.len().min(ctx.vector_size());
                    let rows = buffer.drain(..n).collect::<Vec<_>>();
                    return Ok(Some(RecordBatch::new(&self.schema, rows)));
                }
            }
            if self.done.get() {
                return Ok(None);
            }
            if self.work_table.is_empty() {
                self.done.set(true);
                continue;
            }
            let delta = self.iterate(ctx)?;
            if delta.is_empty() {
                self.done.set(true);
                continue;
            }
            self.work_table.set(delta.clone());
            self.buffer.borrow_mut().extend(delta);
        }
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![&self.static_term, &self.recursive_term]
    }
}

impl Display for RecursiveCteExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "RecursiveCteExec: {}, union all: {}", self.name, self.all)
    }
}

/// Working table scan physical executor: emits the current working
/// table of the enclosing recursive CTE once per initialization.
#[derive(Debug)]
pub struct WorkTableExec {
    name: String,
    schema: LogicalSchema,
    work_table: WorkTable,
    emitted: Cell<bool>,
}

impl WorkTableExec {
    pub fn new(name: String, schema: LogicalSchema, work_table: WorkTable) -> Self {
        Self { name, schema, work_table, emitted: Cell::new(false) }
    }
}

impl ExecutionPlan for WorkTableExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> LogicalSchema {
        self.schema.clone()
    }

    fn init(&self, _ctx: &mut dyn Context) -> Result<()> {
        self.emitted.set(false);
        Ok(())
    }

    fn execute(&self, _ctx: &mut dyn Context) -> Result<Option<RecordBatch>> {
        if self.emitted.get() {
            return Ok(None);
        }
        self.emitted.set(true);
        Ok(Some(RecordBatch::new(&self.schema, self.work_table.rows())))
    }
}

impl Display for WorkTableExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "WorkTableExec: {}", self.name)
    }
}
