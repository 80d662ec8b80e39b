use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use crate::catalog::catalog::Catalog;
use crate::catalog::column::Column;
use crate::catalog::r#type::DataType;
use crate::catalog::r#type::Value;
use crate::error::Error;
use crate::error::Result;
use crate::parse_err;
use crate::sql::func::FunctionRegistry;
use crate::sql::func::ReturnType;
use crate::sql::parser::ast::BinaryOperator;
use crate::sql::parser::ast::CreateTable as SQLCreateTable;
use crate::sql::parser::ast::DataType as SQLDataType;
use crate::sql::parser::ast::Expr as SQLExpr;
use crate::sql::parser::ast::Function;
use crate::sql::parser::ast::Ident;
use crate::sql::parser::ast::Insert as SQLInsert;
use crate::sql::parser::ast::InsertSource;
use crate::sql::parser::ast::Query;
use crate::sql::parser::ast::Select;
use crate::sql::parser::ast::SelectItem;
use crate::sql::parser::ast::SetExpr;
use crate::sql::parser::ast::Statement;
use crate::sql::parser::ast::TableFactor;
use crate::sql::parser::ast::UnaryOperator;
use crate::sql::parser::ast::Value as SQLValue;
use crate::sql::parser::ast::Values as SQLValues;
use crate::sql::parser::ast::With;
use crate::sql::plan::expr::Alias;
use crate::sql::plan::expr::BinaryExpr;
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
use crate::sql::plan::plan::SortExpr;
use crate::sql::plan::plan::SubqueryAlias;
use crate::sql::plan::plan::TableScan;
use crate::sql::plan::plan::Union;
use crate::sql::plan::plan::Values;
use crate::sql::plan::plan::WorkTableScan;
use crate::sql::plan::schema::FieldBuilder;
use crate::sql::plan::schema::LogicalSchema;
use crate::sql::plan::schema::TableReference;
use crate::sql::plan::schema::EMPTY_SCHEMA;
use crate::unsupported_err;
use crate::value_err;

/// An ordered positional parameter list derived from a function's
/// declared argument types. Installed into a [`BindContext`] so that
/// `$N` references inside a function body resolve to the declared
/// type of argument N.
#[derive(Clone, Debug, PartialEq)]
pub struct ParameterBinding {
    types: Vec<DataType>,
}

impl ParameterBinding {
    pub fn new(arg_types: &[DataType]) -> Self {
        Self { types: arg_types.to_vec() }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// The declared type of the parameter at the zero-based `index`.
    pub fn datatype(&self, index: usize) -> Result<&DataType> {
        self.types
            .get(index)
            .ok_or_else(|| parse_err!("There is no parameter ${}", index + 1))
    }
}

/// Per-statement binding state.
///
/// A function body is always bound through a fresh `BindContext` that
/// carries only the owning catalog and the body's own parameter
/// binding, so no CTEs or parameters of an enclosing statement leak
/// into the body's compilation.
pub struct BindContext {
    /// The catalog for relation/column lookup.
    catalog: Arc<dyn Catalog>,
    /// Positional parameter types, if the statement being bound is a
    /// function body.
    parameters: Option<ParameterBinding>,
    /// CTE plans in scope, keyed by normalized alias.
    ctes: HashMap<String, Plan>,
    /// Working-table schemas of recursive CTEs being planned, keyed by
    /// normalized alias.
    work_tables: HashMap<String, LogicalSchema>,
}

impl BindContext {
    pub fn new(catalog: Arc<dyn Catalog>) -> Self {
        Self { catalog, parameters: None, ctes: HashMap::new(), work_tables: HashMap::new() }
    }

    /// A fresh context with the given parameter binding installed.
    pub fn with_parameters(catalog: Arc<dyn Catalog>, parameters: ParameterBinding) -> Self {
        Self {
            catalog,
            parameters: Some(parameters),
            ctes: HashMap::new(),
            work_tables: HashMap::new(),
        }
    }
}

/// Normalizes unquoted identifiers to lower case.
struct IdentNormalizer {
    normalize: bool,
}

impl IdentNormalizer {
    fn new(normalize: bool) -> Self {
        Self { normalize }
    }

    fn normalize(&self, ident: &Ident) -> String {
        if self.normalize && !ident.double_quoted {
            return ident.value.to_lowercase();
        }
        ident.value.clone()
    }
}

/// SQL query planner and binder
///
/// This struct is used to convert a SQL AST into a Logical plan node [`Plan`].
///
/// It performs the following tasks:
///
/// 1. Name and type resolution (called "binding" in other systems). This
///    phase looks up table and column names using the [`Catalog`], and
///    function names using the [`FunctionRegistry`].
/// 2. Mechanical translation of the AST into a Logical plan node [`Plan`].
pub struct Planner {
    ident_normalizer: IdentNormalizer,
    func_registry: Arc<FunctionRegistry>,
}

impl Planner {
    pub fn new(func_registry: Arc<FunctionRegistry>) -> Self {
        let ident_normalizer = IdentNormalizer::new(true);
        Self { ident_normalizer, func_registry }
    }

    pub fn sql_statement_to_plan(
        &self,
        ctx: &mut BindContext,
        statement: Statement,
    ) -> Result<Plan> {
        match statement {
            Statement::CreateTable(sql_create_table) => {
                self.create_table_to_plan(sql_create_table)
            }
            Statement::Insert(insert) => self.insert_to_plan(ctx, insert),
            Statement::Select { query } => self.query_to_plan(ctx, *query),
        }
    }

    /// Generate a logical plan from an SQL query/subquery
    fn query_to_plan(&self, ctx: &mut BindContext, query: Query) -> Result<Plan> {
        let Query { with, body, order_by, limit_clause } = query;
        if let Some(with) = with {
            self.plan_with(ctx, with)?;
        }
        let plan = self.set_expr_to_plan(ctx, body)?;
        let skip = limit_clause.as_ref().and_then(|it| it.offset);
        let fetch = limit_clause.as_ref().and_then(|it| it.limit);
        self.finish_query(ctx, plan, order_by, skip, fetch)
    }

    /// Apply ORDER BY and LIMIT clauses on top of a planned query body.
    fn finish_query(
        &self,
        ctx: &mut BindContext,
        mut plan: Plan,
        order_by: Vec<crate::sql::parser::ast::OrderByExpr>,
        skip: Option<u64>,
        fetch: Option<u64>,
    ) -> Result<Plan> {
        let order_by_schema = plan.schema().clone();
        let order_by_exprs = order_by
            .into_iter()
            .map(|it| {
                let expr = self.sqlexpr_to_expr(ctx, it.expr, &order_by_schema)?;
                let asc = if let Some(desc) = it.desc { !desc } else { true };
                Ok(SortExpr { expr, asc })
            })
            .collect::<Result<Vec<_>>>()?;
        if !order_by_exprs.is_empty() {
            plan = Plan::Sort(Sort::new(order_by_exprs, plan))
        }
        if skip.is_some() || fetch.is_some() {
            plan = Plan::Limit(Limit::new(plan, skip, fetch))
        }
        Ok(plan)
    }

    /// Bind the WITH clause: plan each CTE and make it referable by name.
    fn plan_with(&self, ctx: &mut BindContext, with: With) -> Result<()> {
        for cte in with.ctes {
            let name = self.ident_normalizer.normalize(&cte.alias);
            if ctx.ctes.contains_key(&name) {
                return Err(parse_err!("WITH query name {} specified more than once", name));
            }
            let plan = if with.recursive {
                self.recursive_cte_to_plan(ctx, &name, *cte.query)?
            } else {
                self.query_to_plan(ctx, *cte.query)?
            };
            ctx.ctes.insert(name, plan);
        }
        Ok(())
    }

    /// Plan a recursive CTE of the required form
    /// `static-term UNION [ALL] recursive-term`, where the recursive
    /// term may scan the CTE's own working table by name.
    fn recursive_cte_to_plan(&self, ctx: &mut BindContext, name: &str, query: Query) -> Result<Plan> {
        let Query { with, body, order_by, limit_clause } = query;
        if with.is_some() {
            return Err(unsupported_err!("Nested WITH inside recursive query {}", name));
        }
        let (left, all, right) = match body {
            SetExpr::SetOperation { left, all, right, .. } => (*left, all, *right),
            _ => {
                return Err(parse_err!(
                    "Recursive query {} must have the form: static-term UNION [ALL] recursive-term",
                    name
                ))
            }
        };
        let static_plan = self.set_expr_to_plan(ctx, left)?;
        let schema = static_plan.schema().clone();
        let work_table_schema = schema.with_qualifier(&TableReference::new(name));
        ctx.work_tables.insert(name.to_string(), work_table_schema);
        let recursive_plan = self.set_expr_to_plan(ctx, right);
        ctx.work_tables.remove(name);
        let recursive_plan = recursive_plan?;
        schema.check_compatible(recursive_plan.schema())?;
        let plan = Plan::RecursiveCte(RecursiveCte {
            name: name.to_string(),
            static_term: Box::new(static_plan),
            recursive_term: Box::new(recursive_plan),
            all,
            schema,
        });
        let skip = limit_clause.as_ref().and_then(|it| it.offset);
        let fetch = limit_clause.as_ref().and_then(|it| it.limit);
        self.finish_query(ctx, plan, order_by, skip, fetch)
    }

    fn set_expr_to_plan(&self, ctx: &mut BindContext, body: SetExpr) -> Result<Plan> {
        match body {
            SetExpr::Select(select) => self.select_to_plan(ctx, *select),
            SetExpr::Values(values) => self.values_to_plan(ctx, values),
            SetExpr::SetOperation { left, all, right, .. } => {
                let left = self.set_expr_to_plan(ctx, *left)?;
                let right = self.set_expr_to_plan(ctx, *right)?;
                Ok(Plan::Union(Union::try_new(left, right, all)?))
            }
        }
    }

    fn select_to_plan(&self, ctx: &mut BindContext, select: Select) -> Result<Plan> {
        // plan the FROM clause; a FROM-less select projects off a
        // single empty row.
        let mut plan = match select.from {
            Some(factor) => self.plan_table_factor(ctx, factor)?,
            None => Plan::Values(Values { schema: EMPTY_SCHEMA.clone(), values: vec![vec![]] }),
        };

        // plan the selection
        if let Some(sqlexpr) = select.selection {
            let schema = plan.schema().clone();
            let expr = self.sqlexpr_to_expr(ctx, sqlexpr, &schema)?;
            plan = Plan::Filter(Filter::try_new(expr, plan)?)
        }

        // Build the select exprs from projection
        let select_exprs = select
            .projection
            .into_iter()
            .map(|it| self.parse_select_item(ctx, &plan, it))
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        debug!("select_exprs: {}", crate::format_expr_vec!(select_exprs));

        Ok(Plan::Projection(Projection::try_new(select_exprs, plan)?))
    }

    fn parse_select_item(
        &self,
        ctx: &mut BindContext,
        input: &Plan,
        item: SelectItem,
    ) -> Result<Vec<Expr>> {
        let schema = input.schema();
        match item {
            SelectItem::UnnamedExpr(expr) => {
                let expr = self.sqlexpr_to_expr(ctx, expr, schema)?;
                Ok(vec![expr])
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                let expr = self.sqlexpr_to_expr(ctx, expr, schema)?;
                let name = self.ident_normalizer.normalize(&alias);
                Ok(vec![Expr::Alias(Alias::new(expr, name))])
            }
            SelectItem::Wildcard => {
                if schema.is_empty() {
                    return Err(Error::parse("SELECT * with no tables specified is not valid"));
                }
                let exprs = (0..schema.len())
                    .map(|i| Expr::FieldReference(schema.field_reference(i)))
                    .collect();
                Ok(exprs)
            }
        }
    }

    fn plan_table_factor(&self, ctx: &mut BindContext, factor: TableFactor) -> Result<Plan> {
        match factor {
            TableFactor::Table { name, alias } => {
                let name = self.ident_normalizer.normalize(&name);

                // the FROM name may refer to the working table of a
                // recursive CTE currently being planned,
                if let Some(schema) = ctx.work_tables.get(&name) {
                    let plan =
                        Plan::WorkTableScan(WorkTableScan { name: name.clone(), schema: schema.clone() });
                    return match alias {
                        Some(alias) => {
                            Ok(Plan::SubqueryAlias(SubqueryAlias::new(plan, alias.into())))
                        }
                        None => Ok(plan),
                    };
                }

                // or to a CTE in scope,
                if let Some(cte_plan) = ctx.ctes.get(&name) {
                    let relation = TableReference::from(alias.unwrap_or_else(|| name.clone()));
                    return Ok(Plan::SubqueryAlias(SubqueryAlias::new(cte_plan.clone(), relation)));
                }

                // otherwise it must be a catalog table.
                let table = ctx.catalog.must_get_table(&name)?;
                let mut output_schema = LogicalSchema::from(table.clone());
                let relation = match alias {
                    Some(alias) => {
                        let relation = TableReference::from(alias);
                        output_schema = output_schema.with_qualifier(&relation);
                        relation
                    }
                    None => TableReference::new(&name),
                };
                Ok(Plan::TableScan(TableScan { relation, table, output_schema }))
            }
            TableFactor::Derived { subquery, alias } => {
                let plan = self.query_to_plan(ctx, *subquery)?;
                match alias {
                    Some(alias) => {
                        Ok(Plan::SubqueryAlias(SubqueryAlias::new(plan, alias.into())))
                    }
                    None => Ok(plan),
                }
            }
        }
    }

    fn values_to_plan(&self, ctx: &mut BindContext, values: SQLValues) -> Result<Plan> {
        let rows = values
            .rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|it| self.sqlexpr_to_expr(ctx, it, &EMPTY_SCHEMA))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        let arity = rows.first().map(|it| it.len()).unwrap_or(0);
        if arity == 0 {
            return Err(Error::parse("VALUES requires at least one expression"));
        }
        if rows.iter().any(|row| row.len() != arity) {
            return Err(Error::parse("VALUES lists must all be the same length"));
        }

        // Type each column from the first row that gives it a non-null
        // type; columns are named column1..columnN.
        let mut fields = Vec::with_capacity(arity);
        for i in 0..arity {
            let mut datatype = DataType::Null;
            let mut nullable = false;
            for row in &rows {
                let (dt, n) = row[i].datatype_and_nullable(&EMPTY_SCHEMA)?;
                nullable = nullable || n;
                if datatype == DataType::Null {
                    datatype = dt;
                } else if dt != DataType::Null && dt != datatype {
                    if datatype.can_convert_implicit(&dt) {
                        datatype = dt;
                    } else if !dt.can_convert_implicit(&datatype) {
                        return Err(value_err!(
                            "VALUES column {} cannot hold both {} and {}",
                            i + 1,
                            datatype,
                            dt
                        ));
                    }
                }
            }
            fields.push(
                FieldBuilder::new(format!("column{}", i + 1), datatype).nullable(nullable).build(),
            );
        }
        let schema = LogicalSchema::from_unqualified_fields(fields.into())?;
        Ok(Plan::Values(Values { schema, values: rows }))
    }

    fn insert_to_plan(&self, ctx: &mut BindContext, insert: SQLInsert) -> Result<Plan> {
        let table_name = self.ident_normalizer.normalize(&insert.table);
        let table = ctx.catalog.must_get_table(&table_name)?;

        let source = match insert.source {
            InsertSource::Values(values) => self.values_to_plan(ctx, values)?,
            InsertSource::Select(query) => self.query_to_plan(ctx, *query)?,
        };

        // the columns the source rows populate, defaulting to all of
        // the table's columns in order.
        let columns = if insert.columns.is_empty() {
            table.columns.iter().map(|it| it.name.clone()).collect::<Vec<_>>()
        } else {
            insert.columns.iter().map(|it| self.ident_normalizer.normalize(it)).collect()
        };
        for name in &columns {
            if table.columns.find(name).is_none() {
                return Err(value_err!("Column {} does not exist in table {}", name, table_name));
            }
        }
        if source.schema().len() != columns.len() {
            return Err(value_err!(
                "Insert source has {} columns, expected {}",
                source.schema().len(),
                columns.len()
            ));
        }

        // Re-shape the source rows to the table's column order, filling
        // omitted columns with their default.
        let source_schema = source.schema().clone();
        let exprs = table
            .columns
            .iter()
            .map(|column| {
                let expr = match columns.iter().position(|it| it == &column.name) {
                    Some(pos) => Expr::FieldReference(source_schema.field_reference(pos))
                        .cast_to(&column.datatype, &source_schema)?,
                    None => Expr::Value(column.default.clone().unwrap_or(Value::Null)),
                };
                Ok(Expr::Alias(Alias::new(expr, column.name.clone())))
            })
            .collect::<Result<Vec<_>>>()?;
        let input = Plan::Projection(Projection::try_new(exprs, source)?);
        Ok(Plan::Insert(Insert {
            table: TableReference::new(&table_name),
            input: Box::new(input),
        }))
    }

    fn create_table_to_plan(&self, create: SQLCreateTable) -> Result<Plan> {
        let name = self.ident_normalizer.normalize(&create.name);
        let columns = create
            .columns
            .into_iter()
            .map(|it| {
                let datatype = match it.datatype {
                    SQLDataType::Boolean => DataType::Boolean,
                    SQLDataType::Integer => DataType::Integer,
                    SQLDataType::Float => DataType::Float,
                    SQLDataType::String => DataType::String,
                };
                let default = it.default.map(|expr| self.eval_const_expr(expr)).transpose()?;
                Ok(Column {
                    name: self.ident_normalizer.normalize(&it.name),
                    datatype,
                    primary_key: it.primary_key,
                    nullable: it.nullable,
                    unique: it.unique,
                    default,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let table = crate::catalog::table::Table::try_new(name, columns)?;
        Ok(Plan::CreateTable(CreateTable { table, if_not_exists: create.if_not_exists }))
    }

    /// Evaluate a constant expression, e.g. a column default. Only
    /// literals and signed numeric literals are supported.
    fn eval_const_expr(&self, expr: SQLExpr) -> Result<Value> {
        match expr {
            SQLExpr::Value(v) => self.sqlvalue_to_value(v),
            SQLExpr::UnaryOp { op: UnaryOperator::Minus, expr } => {
                match self.eval_const_expr(*expr)? {
                    Value::Integer(i) => Ok(Value::Integer(-i)),
                    Value::Float(f) => Ok(Value::Float(-f)),
                    v => Err(value_err!("Can't negate {}", v)),
                }
            }
            SQLExpr::UnaryOp { op: UnaryOperator::Plus, expr } => self.eval_const_expr(*expr),
            SQLExpr::Nested(expr) => self.eval_const_expr(*expr),
            expr => Err(value_err!("Unsupported constant expression {}", expr)),
        }
    }

    fn sqlvalue_to_value(&self, value: SQLValue) -> Result<Value> {
        let value = match value {
            SQLValue::Null => Value::Null,
            SQLValue::Boolean(b) => Value::Boolean(b),
            SQLValue::String(s) => Value::String(s),
            SQLValue::Number(s) => {
                if s.contains('.') || s.contains('e') || s.contains('E') {
                    Value::Float(
                        s.parse::<f64>()
                            .map_err(|err| parse_err!("Invalid number {}: {}", s, err))?,
                    )
                } else {
                    Value::Integer(
                        s.parse::<i64>()
                            .map_err(|err| parse_err!("Invalid number {}: {}", s, err))?,
                    )
                }
            }
        };
        Ok(value)
    }

    fn sqlexpr_to_expr(
        &self,
        ctx: &mut BindContext,
        sqlexpr: SQLExpr,
        schema: &LogicalSchema,
    ) -> Result<Expr> {
        match sqlexpr {
            SQLExpr::Value(v) => Ok(Expr::Value(self.sqlvalue_to_value(v)?)),
            SQLExpr::Identifier(ident) => {
                let name = self.ident_normalizer.normalize(&ident);
                match schema.find(&name) {
                    Some((relation, _)) => {
                        Ok(Expr::FieldReference(crate::sql::plan::schema::FieldReference::new(
                            name, relation,
                        )))
                    }
                    None => Err(parse_err!("Column {} not found", name)),
                }
            }
            SQLExpr::CompoundIdentifier(idents) => {
                if idents.len() != 2 {
                    return Err(parse_err!(
                        "Unsupported compound identifier {}",
                        idents
                            .iter()
                            .map(|it| it.value.as_str())
                            .collect::<Vec<_>>()
                            .join(".")
                    ));
                }
                let relation = TableReference::from(self.ident_normalizer.normalize(&idents[0]));
                let name = self.ident_normalizer.normalize(&idents[1]);
                let fr = crate::sql::plan::schema::FieldReference::new(name, Some(relation));
                // ensure the reference resolves
                schema.field_by_ref(&fr)?;
                Ok(Expr::FieldReference(fr))
            }
            SQLExpr::Parameter(index) => {
                let binding = ctx.parameters.as_ref().ok_or_else(|| {
                    parse_err!("There is no parameter ${} in this context", index)
                })?;
                let datatype = binding.datatype(index - 1)?.clone();
                Ok(Expr::Parameter(Parameter { index: index - 1, datatype }))
            }
            SQLExpr::UnaryOp { op, expr } => {
                let expr = self.sqlexpr_to_expr(ctx, *expr, schema)?;
                match op {
                    UnaryOperator::Plus => Ok(expr),
                    UnaryOperator::Minus => {
                        // fold negated numeric literals
                        if let Expr::Value(Value::Integer(i)) = expr {
                            return Ok(Expr::Value(Value::Integer(-i)));
                        }
                        if let Expr::Value(Value::Float(f)) = expr {
                            return Ok(Expr::Value(Value::Float(-f)));
                        }
                        Ok(Expr::Negative(Box::new(expr)))
                    }
                    UnaryOperator::Not => Ok(Expr::Not(Box::new(expr))),
                }
            }
            SQLExpr::Nested(expr) => self.sqlexpr_to_expr(ctx, *expr, schema),
            SQLExpr::IsNull(expr) => {
                Ok(Expr::IsNull(Box::new(self.sqlexpr_to_expr(ctx, *expr, schema)?)))
            }
            SQLExpr::IsNotNull(expr) => {
                Ok(Expr::IsNotNull(Box::new(self.sqlexpr_to_expr(ctx, *expr, schema)?)))
            }
            SQLExpr::Like { negated, expr, pattern } => {
                let expr = self.sqlexpr_to_expr(ctx, *expr, schema)?;
                let pattern = self.sqlexpr_to_expr(ctx, *pattern, schema)?;
                Ok(Expr::Like(Like {
                    negated,
                    expr: Box::new(expr),
                    pattern: Box::new(pattern),
                }))
            }
            SQLExpr::BinaryOp { left, op, right } => {
                let left = self.sqlexpr_to_expr(ctx, *left, schema)?;
                let right = self.sqlexpr_to_expr(ctx, *right, schema)?;
                let op = match op {
                    BinaryOperator::Plus => Operator::Plus,
                    BinaryOperator::Minus => Operator::Minus,
                    BinaryOperator::Multiply => Operator::Multiply,
                    BinaryOperator::Divide => Operator::Divide,
                    BinaryOperator::Modulo => Operator::Modulo,
                    BinaryOperator::Eq => Operator::Eq,
                    BinaryOperator::NotEq => Operator::NotEq,
                    BinaryOperator::Gt => Operator::Gt,
                    BinaryOperator::GtEq => Operator::GtEq,
                    BinaryOperator::Lt => Operator::Lt,
                    BinaryOperator::LtEq => Operator::LtEq,
                    BinaryOperator::And => Operator::And,
                    BinaryOperator::Or => Operator::Or,
                };
                Ok(Expr::BinaryExpr(BinaryExpr::new(left, op, right)))
            }
            SQLExpr::Function(func) => self.function_call_to_expr(ctx, func, schema),
        }
    }

    fn function_call_to_expr(
        &self,
        ctx: &mut BindContext,
        func: Function,
        schema: &LogicalSchema,
    ) -> Result<Expr> {
        let name = self.ident_normalizer.normalize(&func.name);
        let args = func
            .args
            .into_iter()
            .map(|it| self.sqlexpr_to_expr(ctx, it, schema))
            .collect::<Result<Vec<_>>>()?;

        // language-defined functions shadow builtins
        if let Some(decl) = self.func_registry.decl(&name) {
            if args.len() != decl.arg_types.len() {
                return Err(value_err!(
                    "Function {} expects {} arguments, got {}",
                    name,
                    decl.arg_types.len(),
                    args.len()
                ));
            }
            let args = args
                .into_iter()
                .zip(decl.arg_types.iter())
                .map(|(arg, datatype)| arg.cast_to(datatype, schema))
                .collect::<Result<Vec<_>>>()?;
            let datatype = match decl.returns {
                ReturnType::Void => DataType::Null,
                ReturnType::Scalar(datatype) => datatype,
                ReturnType::Table(_) => {
                    return Err(unsupported_err!(
                        "Set-returning function {} is not allowed in an expression",
                        name
                    ))
                }
            };
            return Ok(Expr::ScalarFunction(ScalarFunction { name, args, datatype }));
        }

        if let Some(udf) = self.func_registry.udf(&name) {
            let arg_fields = args
                .iter()
                .map(|it| it.to_field(schema).map(Arc::new))
                .collect::<Result<Vec<_>>>()?;
            let field = udf.return_field(&arg_fields)?;
            let datatype = field.datatype.clone();
            return Ok(Expr::ScalarFunction(ScalarFunction { name, args, datatype }));
        }

        Err(parse_err!("Unknown function {}", name))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::access::memory::Memory;
    use crate::catalog::column::ColumnBuilder;
    use crate::catalog::table::Table;
    use crate::sql::func::FunctionDecl;
    use crate::sql::parser::Parser;

    fn setup() -> Result<(Arc<Memory>, Planner)> {
        let engine = Arc::new(Memory::new());
        engine.create_table(Table::new(
            "users",
            vec![
                ColumnBuilder::new("id", DataType::Integer).primary_key().build(),
                ColumnBuilder::new("name", DataType::String).build(),
            ],
        ))?;
        let planner = Planner::new(Arc::new(FunctionRegistry::new()));
        Ok((engine, planner))
    }

    fn plan_sql(engine: &Arc<Memory>, planner: &Planner, sql: &str) -> Result<Plan> {
        let stmt = Parser::new(sql)?.parse_statement()?;
        let mut ctx = BindContext::new(engine.clone());
        planner.sql_statement_to_plan(&mut ctx, stmt)
    }

    #[test]
    fn test_plan_simple_select() -> Result<()> {
        let (engine, planner) = setup()?;
        let plan = plan_sql(&engine, &planner, "SELECT id, name FROM users WHERE id = 1")?;
        assert_eq!(
            plan.to_string(),
            "Projection: users.id, users.name\n  Filter: users.id = 1\n    TableScan: users"
        );
        assert!(plan.is_query());
        Ok(())
    }

    #[test]
    fn test_plan_wildcard_and_alias() -> Result<()> {
        let (engine, planner) = setup()?;
        let plan = plan_sql(&engine, &planner, "SELECT * FROM users AS u WHERE u.id = 1")?;
        assert_eq!(plan.schema().len(), 2);
        assert!(plan_sql(&engine, &planner, "SELECT u.id FROM users").is_err());
        Ok(())
    }

    #[test]
    fn test_plan_union_compatibility() -> Result<()> {
        let (engine, planner) = setup()?;
        let plan = plan_sql(&engine, &planner, "SELECT 1 UNION ALL SELECT 2")?;
        assert!(matches!(plan, Plan::Union(_)));
        assert!(plan_sql(&engine, &planner, "SELECT 1 UNION SELECT 'a'").is_err());
        Ok(())
    }

    #[test]
    fn test_plan_values_typing() -> Result<()> {
        let (engine, planner) = setup()?;
        let plan = plan_sql(&engine, &planner, "VALUES (NULL, 1), (2, 2.5)")?;
        let schema = plan.schema();
        assert_eq!(schema.field(0).name, "column1");
        assert_eq!(schema.field(0).datatype, DataType::Integer);
        assert_eq!(schema.field(1).datatype, DataType::Float);
        assert!(plan_sql(&engine, &planner, "VALUES (1), (1, 2)").is_err());
        Ok(())
    }

    #[test]
    fn test_plan_parameters_require_binding() -> Result<()> {
        let (engine, planner) = setup()?;
        // no binding installed
        assert!(plan_sql(&engine, &planner, "SELECT $1 + $2").is_err());

        let stmt = Parser::new("SELECT $1 + $2")?.parse_statement()?;
        let binding = ParameterBinding::new(&[DataType::Integer, DataType::Integer]);
        let mut ctx = BindContext::with_parameters(engine.clone(), binding);
        let plan = planner.sql_statement_to_plan(&mut ctx, stmt)?;
        assert_eq!(plan.schema().field(0).datatype, DataType::Integer);

        // out of range
        let stmt = Parser::new("SELECT $3")?.parse_statement()?;
        let binding = ParameterBinding::new(&[DataType::Integer, DataType::Integer]);
        let mut ctx = BindContext::with_parameters(engine.clone(), binding);
        assert!(planner.sql_statement_to_plan(&mut ctx, stmt).is_err());
        Ok(())
    }

    #[test]
    fn test_plan_recursive_cte_requires_union() -> Result<()> {
        let (engine, planner) = setup()?;
        let err = plan_sql(
            &engine,
            &planner,
            "WITH RECURSIVE r AS (SELECT 1) SELECT * FROM r",
        );
        assert!(err.is_err());

        let plan = plan_sql(
            &engine,
            &planner,
            "WITH RECURSIVE r AS (SELECT 1 AS n UNION ALL SELECT n + 1 FROM r WHERE n < 3) \
             SELECT * FROM r",
        )?;
        assert!(plan.to_string().contains("RecursiveCte: r"));
        assert!(plan.to_string().contains("WorkTableScan: r"));
        Ok(())
    }

    #[test]
    fn test_plan_function_calls() -> Result<()> {
        let (engine, _) = setup()?;
        let registry = Arc::new(FunctionRegistry::new());
        registry.declare(FunctionDecl {
            name: "fortytwo".to_string(),
            arg_types: vec![],
            returns: ReturnType::Scalar(DataType::Integer),
        })?;
        let planner = Planner::new(registry);

        let plan = plan_sql(&engine, &planner, "SELECT fortytwo() + 1")?;
        assert_eq!(plan.schema().field(0).datatype, DataType::Integer);

        // builtin
        let plan = plan_sql(&engine, &planner, "SELECT upper(name) FROM users")?;
        assert_eq!(plan.schema().field(0).datatype, DataType::String);

        // arity mismatch and unknown function
        assert!(plan_sql(&engine, &planner, "SELECT fortytwo(1)").is_err());
        assert!(plan_sql(&engine, &planner, "SELECT nope()").is_err());
        Ok(())
    }

    #[test]
    fn test_plan_insert_reorders_and_defaults() -> Result<()> {
        let (engine, planner) = setup()?;
        let plan = plan_sql(&engine, &planner, "INSERT INTO users (name, id) VALUES ('a', 1)")?;
        let Plan::Insert(insert) = plan else { panic!("expected insert plan") };
        // input projection is shaped like the table: id, name
        assert_eq!(insert.input.schema().field(0).name, "id");
        assert_eq!(insert.input.schema().field(1).name, "name");
        Ok(())
    }
}
