use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::fmt::Display;
use std::sync::Arc;

use crate::access::value::Values;
use crate::error::Result;
use crate::internal_err;
use crate::sql::execution::context::Context;
use crate::sql::execution::ddl::CreateTableExec;
use crate::sql::execution::dml::InsertExec;
use crate::sql::execution::expr::BinaryExprExec;
use crate::sql::execution::expr::CastExec;
use crate::sql::execution::expr::FieldReferenceExec;
use crate::sql::execution::expr::FunctionCallExec;
use crate::sql::execution::expr::FunctionCallable;
use crate::sql::execution::expr::IsNullExec;
use crate::sql::execution::expr::LikeExec;
use crate::sql::execution::expr::NegativeExec;
use crate::sql::execution::expr::ParameterExec;
use crate::sql::execution::expr::PhysicalExpr;
use crate::sql::execution::expr::ValueExec;
use crate::sql::execution::query::FilterExec;
use crate::sql::execution::query::ProjectionExec;
use crate::sql::execution::query::RecursiveCteExec;
use crate::sql::execution::query::SeqScanExec;
use crate::sql::execution::query::SortExec;
use crate::sql::execution::query::SortExprExec;
use crate::sql::execution::query::SubqueryAliasExec;
use crate::sql::execution::query::UnionExec;
use crate::sql::execution::query::ValuesExec;
use crate::sql::execution::query::WorkTable;
use crate::sql::execution::query::WorkTableExec;
use crate::sql::execution::query::LimitExec;
use crate::sql::func::FunctionRegistry;
use crate::sql::plan::expr::Alias;
use crate::sql::plan::expr::BinaryExpr;
use crate::sql::plan::expr::Cast;
use crate::sql::plan::expr::Expr;
use crate::sql::plan::expr::Like;
use crate::sql::plan::expr::Operator;
use crate::sql::plan::expr::Parameter;
use crate::sql::plan::expr::ScalarFunction;
use crate::sql::plan::plan::CreateTable;
use crate::sql::plan::plan::Filter;
use crate::sql::plan::plan::Insert;
use crate::sql::plan::plan::Limit;
use crate::sql::plan::plan::Plan;
use crate::sql::plan::plan::Projection;
use crate::sql::plan::plan::RecursiveCte;
use crate::sql::plan::plan::Sort;
use crate::sql::plan::plan::SubqueryAlias;
use crate::sql::plan::plan::Union;
use crate::sql::plan::plan::Values as ValuesPlan;
use crate::sql::plan::plan::WorkTableScan;
use crate::sql::plan::schema::LogicalSchema;
use crate::catalog::r#type::Value;

/// A physical executable node in the query plan.
///
/// Follows a vectorized iterator model: every `execute` call yields a
/// batch of tuples rather than one tuple at a time.
pub trait ExecutionPlan: Debug + Display {
    /// Returns the physical node as [`Any`] so that it can be
    /// downcast to a specific implementation.
    fn as_any(&self) -> &dyn Any;

    fn schema(&self) -> LogicalSchema;

    /// Initialize the executor.
    fn init(&self, ctx: &mut dyn Context) -> Result<()>;

    /// Yields the next batch of tuples from this executor.
    fn execute(&self, ctx: &mut dyn Context) -> Result<Option<RecordBatch>>;

    /// Get a list of children `ExecutionPlan`s that act as inputs to this plan.
    /// The returned list will be empty for leaf nodes such as scans, will contain
    /// a single value for unary nodes, or two values for binary nodes.
    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![]
    }
}

/// A dataset with multiple row-wise values
#[derive(Clone)]
pub struct RecordBatch {
    pub schema: LogicalSchema,
    pub rows: Vec<Values>,
}

impl RecordBatch {
    pub fn new(schema: &LogicalSchema, rows: Vec<Values>) -> Self {
        Self { schema: schema.clone(), rows }
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}

/// Compiles logical plans into executable physical plans.
///
/// The Compiler transforms logical query plans into physical execution plans
/// by selecting concrete implementations for each operation. It handles the
/// conversion of logical expressions into physical expressions and builds
/// the execution tree that can be run against actual data.
///
/// This is also known as physical planning in query processing terminology.
pub struct Compiler {
    func_registry: Arc<FunctionRegistry>,
    /// Working tables of recursive CTEs in scope during compilation,
    /// shared between each RecursiveCteExec and the WorkTableExec
    /// nodes of its recursive term.
    work_tables: RefCell<HashMap<String, WorkTable>>,
}

impl Compiler {
    pub fn new(func_registry: Arc<FunctionRegistry>) -> Self {
        Self { func_registry, work_tables: RefCell::new(HashMap::new()) }
    }

    pub fn build_execution_plan(&self, plan: Plan) -> Result<Arc<dyn ExecutionPlan>> {
        match plan {
            Plan::CreateTable(CreateTable { table, if_not_exists }) => {
                Ok(Arc::new(CreateTableExec::new(table, if_not_exists)))
            }
            Plan::Insert(Insert { table, input }) => {
                let input = self.build_execution_plan(*input)?;
                Ok(Arc::new(InsertExec::new(table, input)))
            }
            Plan::Values(ValuesPlan { schema, values }) => {
                let exprs = values
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .map(|it| self.build_physical_expr(it, &schema))
                            .collect::<Result<Vec<_>>>()
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(ValuesExec::new(schema, exprs)))
            }
            Plan::Projection(Projection { exprs, input, output_schema }) => {
                let exprs = exprs
                    .into_iter()
                    .map(|it| self.build_physical_expr(it, input.schema()))
                    .collect::<Result<Vec<_>>>()?;
                let input = self.build_execution_plan(*input)?;
                Ok(Arc::new(ProjectionExec::new(input, exprs, output_schema)))
            }
            Plan::TableScan(t) => Ok(Arc::new(SeqScanExec::new(t))),
            Plan::SubqueryAlias(SubqueryAlias { input, schema, alias }) => {
                let input = self.build_execution_plan(*input)?;
                Ok(Arc::new(SubqueryAliasExec::new(input, schema, alias)))
            }
            Plan::Filter(Filter { predicate, input }) => {
                let pred = self.build_physical_expr(predicate, input.schema())?;
                let input = self.build_execution_plan(*input)?;
                Ok(Arc::new(FilterExec::new(input, pred)))
            }
            Plan::Sort(Sort { input, expr }) => {
                let order = expr
                    .into_iter()
                    .map(|it| {
                        let expr = self.build_physical_expr(it.expr, input.schema())?;
                        Ok(SortExprExec::new(expr, it.asc))
                    })
                    .collect::<Result<Vec<_>>>()?;
                let input = self.build_execution_plan(*input)?;
                Ok(Arc::new(SortExec::new(input, order)))
            }
            Plan::Limit(Limit { input, skip, fetch }) => {
                let input = self.build_execution_plan(*input)?;
                Ok(Arc::new(LimitExec::new(input, skip, fetch)))
            }
            Plan::Union(Union { left, right, all, schema }) => {
                let left = self.build_execution_plan(*left)?;
                let right = self.build_execution_plan(*right)?;
                Ok(Arc::new(UnionExec::new(left, right, all, schema)))
            }
            Plan::RecursiveCte(RecursiveCte { name, static_term, recursive_term, all, schema }) => {
                let static_term = self.build_execution_plan(*static_term)?;
                let work_table = WorkTable::new();
                self.work_tables.borrow_mut().insert(name.clone(), work_table.clone());
                let recursive_term = self.build_execution_plan(*recursive_term);
                self.work_tables.borrow_mut().remove(&name);
                let recursive_term = recursive_term?;
                Ok(Arc::new(RecursiveCteExec::new(
                    name,
                    static_term,
                    recursive_term,
                    all,
                    schema,
                    work_table,
                )))
            }
            Plan::WorkTableScan(WorkTableScan { name, schema }) => {
                let work_table =
                    self.work_tables.borrow().get(&name).cloned().ok_or_else(|| {
                        internal_err!("No working table in scope for recursive CTE {}", name)
                    })?;
                Ok(Arc::new(WorkTableExec::new(name, schema, work_table)))
            }
        }
    }

    fn build_physical_expr(
        &self,
        expr: Expr,
        input_schema: &LogicalSchema,
    ) -> Result<Arc<dyn PhysicalExpr>> {
        match expr {
            Expr::Alias(Alias { expr, .. }) => self.build_physical_expr(*expr, input_schema),
            Expr::Value(value) => Ok(Arc::new(ValueExec::new(value))),
            Expr::FieldReference(f) => Ok(Arc::new(FieldReferenceExec::try_new(f, input_schema)?)),
            Expr::Parameter(Parameter { index, datatype }) => {
                Ok(Arc::new(ParameterExec::new(index, datatype)))
            }
            Expr::Not(expr) => {
                let left = self.build_physical_expr(*expr, input_schema)?;
                let right: Arc<dyn PhysicalExpr> = Arc::new(ValueExec::new(Value::Boolean(false)));
                Ok(Arc::new(BinaryExprExec::new(left, Operator::Eq, right)))
            }
            Expr::IsNull(expr) => {
                let expr = self.build_physical_expr(*expr, input_schema)?;
                Ok(Arc::new(IsNullExec::new(expr, false)))
            }
            Expr::IsNotNull(expr) => {
                let expr = self.build_physical_expr(*expr, input_schema)?;
                Ok(Arc::new(IsNullExec::new(expr, true)))
            }
            Expr::Negative(expr) => {
                let expr = self.build_physical_expr(*expr, input_schema)?;
                Ok(Arc::new(NegativeExec::new(expr)))
            }
            Expr::Like(Like { negated, expr, pattern }) => {
                let expr = self.build_physical_expr(*expr, input_schema)?;
                let pattern = self.build_physical_expr(*pattern, input_schema)?;
                Ok(Arc::new(LikeExec::new(expr, pattern, negated)))
            }
            Expr::BinaryExpr(BinaryExpr { left, op, right }) => {
                let left = self.build_physical_expr(*left, input_schema)?;
                let right = self.build_physical_expr(*right, input_schema)?;
                Ok(Arc::new(BinaryExprExec::new(left, op, right)))
            }
            Expr::Cast(Cast { expr, data_type }) => {
                let expr = self.build_physical_expr(*expr, input_schema)?;
                Ok(Arc::new(CastExec::new(data_type, expr)))
            }
            Expr::ScalarFunction(ScalarFunction { name, args, datatype }) => {
                let args = args
                    .into_iter()
                    .map(|it| self.build_physical_expr(it, input_schema))
                    .collect::<Result<Vec<_>>>()?;
                let callable = if self.func_registry.decl(&name).is_some() {
                    FunctionCallable::Defined(Arc::clone(&self.func_registry))
                } else if let Some(udf) = self.func_registry.udf(&name) {
                    FunctionCallable::Builtin(udf)
                } else {
                    return Err(internal_err!("Unknown function {}", name));
                };
                Ok(Arc::new(FunctionCallExec::new(name, args, datatype, callable)))
            }
        }
    }
}
