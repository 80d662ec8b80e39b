use std::fmt::Display;
use std::fmt::Formatter;

use crate::catalog::table::Table;
use crate::error::Result;
use crate::format_expr_vec;
use crate::sql::plan::expr::Expr;
use crate::sql::plan::schema::LogicalSchema;
use crate::sql::plan::schema::TableReference;
use crate::sql::plan::schema::EMPTY_SCHEMA;

/// A `Plan` is a logical node in a tree of relational operators(such as
/// Projection or Filter). Also known as `Logical Plan`
#[derive(Clone, Debug)]
pub enum Plan {
    /// Create table
    CreateTable(CreateTable),
    /// Insert data
    Insert(Insert),
    /// Values expression. See
    /// [Postgres VALUES](https://www.postgresql.org/docs/current/queries-values.html)
    /// documentation for more details. This is used to implement SQL such as
    /// `VALUES (1, 2), (3, 4)`
    Values(Values),
    /// Evaluates an arbitrary list of expressions on its input.
    Projection(Projection),
    /// Scan rows from a table/relation.
    TableScan(TableScan),
    /// Aliased relation provides, or changes, the name of a relation.
    SubqueryAlias(SubqueryAlias),
    /// Filters rows from its input that do not match an
    /// expression (essentially a WHERE clause with a predicate
    /// expression).
    Filter(Filter),
    /// Sorts its input according to a list of sort expressions. This
    /// is used to implement SQL `ORDER BY`
    Sort(Sort),
    /// Skip some number of rows, and then fetch some number of rows.
    Limit(Limit),
    /// Concatenate two row sets, deduplicating unless `all` is set.
    /// This is used to implement SQL `UNION [ALL]`.
    Union(Union),
    /// A recursive common table expression: evaluate the static term,
    /// then iterate the recursive term against the previous iteration's
    /// rows until a fixpoint.
    RecursiveCte(RecursiveCte),
    /// Scan the working table of the enclosing recursive CTE.
    WorkTableScan(WorkTableScan),
}

impl Plan {
    pub fn schema(&self) -> &LogicalSchema {
        match self {
            Plan::CreateTable(_) | Plan::Insert(_) => &EMPTY_SCHEMA,
            Plan::Values(Values { schema, .. }) => schema,
            Plan::Projection(Projection { output_schema, .. }) => output_schema,
            Plan::TableScan(TableScan { output_schema, .. }) => output_schema,
            Plan::SubqueryAlias(SubqueryAlias { schema, .. }) => schema,
            Plan::Filter(Filter { input, .. }) => input.schema(),
            Plan::Sort(Sort { input, .. }) => input.schema(),
            Plan::Limit(Limit { input, .. }) => input.schema(),
            Plan::Union(Union { schema, .. }) => schema,
            Plan::RecursiveCte(RecursiveCte { schema, .. }) => schema,
            Plan::WorkTableScan(WorkTableScan { schema, .. }) => schema,
        }
    }

    /// Whether this plan node produces rows, i.e. is a query rather
    /// than DDL/DML. Function bodies must compile to a query root.
    pub fn is_query(&self) -> bool {
        !matches!(self, Plan::CreateTable(_) | Plan::Insert(_))
    }

    fn children(&self) -> Vec<&Plan> {
        match self {
            Plan::CreateTable(_)
            | Plan::Values(_)
            | Plan::TableScan(_)
            | Plan::WorkTableScan(_) => vec![],
            Plan::Insert(Insert { input, .. }) => vec![input],
            Plan::Projection(Projection { input, .. }) => vec![input],
            Plan::SubqueryAlias(SubqueryAlias { input, .. }) => vec![input],
            Plan::Filter(Filter { input, .. }) => vec![input],
            Plan::Sort(Sort { input, .. }) => vec![input],
            Plan::Limit(Limit { input, .. }) => vec![input],
            Plan::Union(Union { left, right, .. }) => vec![left, right],
            Plan::RecursiveCte(RecursiveCte { static_term, recursive_term, .. }) => {
                vec![static_term, recursive_term]
            }
        }
    }

    fn fmt_indent(&self, f: &mut Formatter<'_>, indent: usize) -> std::fmt::Result {
        for _ in 0..indent {
            f.write_str("  ")?;
        }
        match self {
            Plan::CreateTable(CreateTable { table, if_not_exists }) => {
                write!(f, "CreateTable: {}, if not exists: {}", table.name, if_not_exists)?
            }
            Plan::Insert(Insert { table, .. }) => write!(f, "Insert: {}", table)?,
            Plan::Values(Values { values, .. }) => {
                let rows = values
                    .iter()
                    .take(3)
                    .map(|row| format!("({})", format_expr_vec!(row)))
                    .collect::<Vec<_>>();
                let eclipse = if values.len() > 3 { "..." } else { "" };
                write!(f, "Values: {}{}", rows.join(", "), eclipse)?
            }
            Plan::Projection(Projection { exprs, .. }) => {
                write!(f, "Projection: {}", format_expr_vec!(exprs))?
            }
            Plan::TableScan(TableScan { relation, .. }) => write!(f, "TableScan: {}", relation)?,
            Plan::SubqueryAlias(SubqueryAlias { alias, .. }) => {
                write!(f, "SubqueryAlias: {}", alias)?
            }
            Plan::Filter(Filter { predicate, .. }) => write!(f, "Filter: {}", predicate)?,
            Plan::Sort(Sort { expr, .. }) => {
                let items = expr.iter().map(|it| it.to_string()).collect::<Vec<_>>();
                write!(f, "Sort: {}", items.join(", "))?
            }
            Plan::Limit(Limit { skip, fetch, .. }) => {
                write!(f, "Limit: skip={:?}, fetch={:?}", skip, fetch)?
            }
            Plan::Union(Union { all, .. }) => {
                write!(f, "Union: {}", if *all { "all" } else { "distinct" })?
            }
            Plan::RecursiveCte(RecursiveCte { name, all, .. }) => {
                write!(f, "RecursiveCte: {}, union all: {}", name, all)?
            }
            Plan::WorkTableScan(WorkTableScan { name, .. }) => {
                write!(f, "WorkTableScan: {}", name)?
            }
        }
        for child in self.children() {
            f.write_str("\n")?;
            child.fmt_indent(f, indent + 1)?;
        }
        Ok(())
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.fmt_indent(f, 0)
    }
}

#[derive(Clone, Debug)]
pub struct CreateTable {
    /// The full table schema to create.
    pub table: Table,
    pub if_not_exists: bool,
}

#[derive(Clone, Debug)]
pub struct Insert {
    pub table: TableReference,
    /// Input plan producing rows already shaped like the target table.
    pub input: Box<Plan>,
}

#[derive(Clone, Debug)]
pub struct Values {
    pub schema: LogicalSchema,
    pub values: Vec<Vec<Expr>>,
}

#[derive(Clone, Debug)]
pub struct Projection {
    pub exprs: Vec<Expr>,
    pub input: Box<Plan>,
    pub output_schema: LogicalSchema,
}

impl Projection {
    pub fn try_new(exprs: Vec<Expr>, input: Plan) -> Result<Self> {
        let fields = exprs
            .iter()
            .map(|it| it.to_field(input.schema()))
            .collect::<Result<Vec<_>>>()?;
        let output_schema = LogicalSchema::from_unqualified_fields(fields.into())?;
        Ok(Self { exprs, input: Box::new(input), output_schema })
    }
}

#[derive(Clone, Debug)]
pub struct TableScan {
    pub relation: TableReference,
    /// The catalog definition of the scanned table.
    pub table: Table,
    pub output_schema: LogicalSchema,
}

#[derive(Clone, Debug)]
pub struct SubqueryAlias {
    pub input: Box<Plan>,
    pub schema: LogicalSchema,
    pub alias: TableReference,
}

impl SubqueryAlias {
    pub fn new(input: Plan, alias: TableReference) -> Self {
        let schema = input.schema().with_qualifier(&alias);
        Self { input: Box::new(input), schema, alias }
    }
}

#[derive(Clone, Debug)]
pub struct Filter {
    pub predicate: Expr,
    pub input: Box<Plan>,
}

impl Filter {
    pub fn try_new(predicate: Expr, input: Plan) -> Result<Self> {
        Ok(Self { predicate, input: Box::new(input) })
    }
}

#[derive(Clone, Debug)]
pub struct Sort {
    pub expr: Vec<SortExpr>,
    pub input: Box<Plan>,
}

impl Sort {
    pub fn new(expr: Vec<SortExpr>, input: Plan) -> Self {
        Self { expr, input: Box::new(input) }
    }
}

#[derive(Clone, Debug)]
pub struct SortExpr {
    pub expr: Expr,
    pub asc: bool,
}

impl Display for SortExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.expr, if self.asc { "ASC" } else { "DESC" })
    }
}

#[derive(Clone, Debug)]
pub struct Limit {
    pub input: Box<Plan>,
    pub skip: Option<u64>,
    pub fetch: Option<u64>,
}

impl Limit {
    pub fn new(input: Plan, skip: Option<u64>, fetch: Option<u64>) -> Self {
        Self { input: Box::new(input), skip, fetch }
    }
}

#[derive(Clone, Debug)]
pub struct Union {
    pub left: Box<Plan>,
    pub right: Box<Plan>,
    pub all: bool,
    pub schema: LogicalSchema,
}

impl Union {
    /// The output schema of a set operation takes the left input's
    /// field names; the right input only needs compatible arity and
    /// per-position types.
    pub fn try_new(left: Plan, right: Plan, all: bool) -> Result<Self> {
        left.schema().check_compatible(right.schema())?;
        let schema = left.schema().clone();
        Ok(Self { left: Box::new(left), right: Box::new(right), all, schema })
    }
}

#[derive(Clone, Debug)]
pub struct RecursiveCte {
    pub name: String,
    pub static_term: Box<Plan>,
    pub recursive_term: Box<Plan>,
    pub all: bool,
    pub schema: LogicalSchema,
}

#[derive(Clone, Debug)]
pub struct WorkTableScan {
    pub name: String,
    pub schema: LogicalSchema,
}
