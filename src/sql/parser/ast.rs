use std::fmt::Formatter;

use crate::sql::parser::display_utils::display_comma_separated;
use crate::sql::parser::display_utils::display_dot_separated;
use crate::sql::parser::lexer::Token;

#[derive(Debug)]
pub enum Statement {
    /// ```sql
    /// CREATE TABLE
    /// ```
    CreateTable(CreateTable),
    ///```sql
    ///  INSERT INTO
    /// ```
    Insert(Insert),
    /// ```sql
    /// SELECT | VALUES | WITH
    /// ```
    Select { query: Box<Query> },
}

/// Classification of a statement by its top-level form, used to gate
/// which statements may appear as a function body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Union,
    UnionAll,
    With,
    WithRecursive,
    Values,
    CreateTable,
    Insert,
}

impl Statement {
    pub fn kind(&self) -> StatementKind {
        match self {
            Statement::CreateTable(_) => StatementKind::CreateTable,
            Statement::Insert(_) => StatementKind::Insert,
            Statement::Select { query } => match &query.with {
                Some(with) if with.recursive => StatementKind::WithRecursive,
                Some(_) => StatementKind::With,
                None => match &query.body {
                    SetExpr::Select(_) => StatementKind::Select,
                    SetExpr::Values(_) => StatementKind::Values,
                    SetExpr::SetOperation { all: true, .. } => StatementKind::UnionAll,
                    SetExpr::SetOperation { all: false, .. } => StatementKind::Union,
                },
            },
        }
    }
}

impl std::fmt::Display for StatementKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            StatementKind::Select => "SELECT",
            StatementKind::Union => "UNION",
            StatementKind::UnionAll => "UNION ALL",
            StatementKind::With => "WITH",
            StatementKind::WithRecursive => "WITH RECURSIVE",
            StatementKind::Values => "VALUES",
            StatementKind::CreateTable => "CREATE TABLE",
            StatementKind::Insert => "INSERT",
        })
    }
}

impl std::fmt::Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Statement::CreateTable(create_table) => create_table.fmt(f),
            Statement::Insert(insert) => insert.fmt(f),
            Statement::Select { query } => query.fmt(f),
        }
    }
}

/// An identifier, decomposed into its value or character data and the quote style.
#[derive(Debug, Clone)]
pub struct Ident {
    /// The value of the identifier without quotes.
    pub value: String,
    /// Whether the identifier is double-quoted.
    pub double_quoted: bool,
}

impl Ident {
    pub fn new(value: &str) -> Ident {
        Ident { value: value.to_string(), double_quoted: false }
    }

    pub fn from_ident_token(tok: &Token) -> Ident {
        if let Token::Ident(value, double_quoted) = tok {
            Ident { value: value.to_string(), double_quoted: *double_quoted }
        } else {
            panic!("Expected Token::Ident, got {:?}", tok)
        }
    }
}

impl std::fmt::Display for Ident {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.double_quoted {
            write!(f, "\"{}\"", self.value)
        } else {
            f.write_str(&self.value)
        }
    }
}

/// A query expression: an optional WITH clause, a set-expression
/// body, and optional ORDER BY / LIMIT clauses.
#[derive(Debug)]
pub struct Query {
    /// WITH [RECURSIVE]
    pub with: Option<With>,
    /// SELECT, VALUES or a set operation over them
    pub body: SetExpr,
    /// ORDER BY
    pub order_by: Vec<OrderByExpr>,
    /// `LIMIT ... OFFSET ...`
    pub limit_clause: Option<LimitClause>,
}

impl std::fmt::Display for Query {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(with) = &self.with {
            write!(f, "{} ", with)?;
        }
        self.body.fmt(f)?;
        if !self.order_by.is_empty() {
            write!(f, " ORDER BY {}", display_comma_separated(&self.order_by))?;
        }
        if let Some(c) = &self.limit_clause {
            write!(f, " {}", c)?;
        }
        Ok(())
    }
}

/// The WITH clause of a query.
#[derive(Debug)]
pub struct With {
    pub recursive: bool,
    pub ctes: Vec<Cte>,
}

impl std::fmt::Display for With {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "WITH {}{}",
            if self.recursive { "RECURSIVE " } else { "" },
            display_comma_separated(&self.ctes)
        )
    }
}

/// A single common table expression, `name AS (query)`.
#[derive(Debug)]
pub struct Cte {
    pub alias: Ident,
    pub query: Box<Query>,
}

impl std::fmt::Display for Cte {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} AS ({})", self.alias, self.query)
    }
}

/// The body of a query: a node in a tree of set operations over
/// SELECT and VALUES leaves.
#[derive(Debug)]
pub enum SetExpr {
    Select(Box<Select>),
    Values(Values),
    SetOperation { left: Box<SetExpr>, op: SetOperator, all: bool, right: Box<SetExpr> },
}

impl std::fmt::Display for SetExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SetExpr::Select(select) => select.fmt(f),
            SetExpr::Values(values) => values.fmt(f),
            SetExpr::SetOperation { left, op, all, right } => {
                write!(f, "{} {}{} {}", left, op, if *all { " ALL" } else { "" }, right)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SetOperator {
    Union,
}

impl std::fmt::Display for SetOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SetOperator::Union => f.write_str("UNION"),
        }
    }
}

/// The `SELECT` core.
#[derive(Debug)]
pub struct Select {
    /// projection expressions
    pub projection: Vec<SelectItem>,
    /// FROM
    pub from: Option<TableFactor>,
    /// WHERE
    pub selection: Option<Expr>,
}

impl std::fmt::Display for Select {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "SELECT {}", display_comma_separated(&self.projection))?;
        if let Some(from) = &self.from {
            write!(f, " FROM {}", from)?;
        }
        if let Some(s) = &self.selection {
            write!(f, " WHERE {}", s)?;
        }
        Ok(())
    }
}

/// One item of the comma-separated list following `SELECT`
#[derive(Debug)]
pub enum SelectItem {
    /// Any expression, not followed by `[ AS ] alias`
    UnnamedExpr(Expr),
    /// An expression, followed by `[ AS ] alias`
    ExprWithAlias { expr: Expr, alias: Ident },
    /// An unqualified `*`
    Wildcard,
}

impl std::fmt::Display for SelectItem {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SelectItem::UnnamedExpr(expr) => write!(f, "{expr}"),
            SelectItem::ExprWithAlias { expr, alias } => write!(f, "{expr} AS {alias}"),
            SelectItem::Wildcard => write!(f, "*"),
        }
    }
}

#[derive(Debug)]
pub enum TableFactor {
    Table { name: Ident, alias: Option<String> },
    Derived { subquery: Box<Query>, alias: Option<String> },
}

impl std::fmt::Display for TableFactor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TableFactor::Table { name, alias } => {
                write!(
                    f,
                    "{name}{s}",
                    s = if let Some(s) = alias { format!(" AS {s}") } else { "".to_string() }
                )
            }
            TableFactor::Derived { subquery, alias } => {
                write!(
                    f,
                    "({subquery}){s}",
                    s = if let Some(s) = alias { format!(" AS {s}") } else { "".to_string() }
                )
            }
        }
    }
}

/// An `ORDER BY` expression
#[derive(Debug)]
pub struct OrderByExpr {
    pub expr: Expr,
    /// Optional `ASC` or `DESC`
    pub desc: Option<bool>,
}

impl std::fmt::Display for OrderByExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.expr.fmt(f)?;
        write!(f, " {}", if self.desc.unwrap_or(false) { "DESC" } else { "ASC" })
    }
}

/// `LIMIT ... OFFSET ...`
#[derive(Debug)]
pub struct LimitClause {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl std::fmt::Display for LimitClause {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(limit) = self.limit {
            write!(f, "LIMIT {}", limit)?;
        }
        if let Some(offset) = self.offset {
            write!(f, " OFFSET {}", offset)?;
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct Values {
    pub rows: Vec<Vec<Expr>>,
}

impl std::fmt::Display for Values {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("VALUES ")?;
        let mut delim = "";
        for row in &self.rows {
            f.write_str(delim)?;
            delim = ", ";
            write!(f, "({})", display_comma_separated(row))?;
        }
        Ok(())
    }
}

/// CREATE TABLE statement.
#[derive(Debug)]
pub struct CreateTable {
    pub name: Ident,
    pub columns: Vec<Column>,
    pub if_not_exists: bool,
}

impl std::fmt::Display for CreateTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "CREATE TABLE {if_not_exists}{name} ({columns})",
            if_not_exists = if self.if_not_exists { "IF NOT EXISTS " } else { "" },
            name = self.name,
            columns = display_comma_separated(&self.columns)
        )
    }
}

/// SQL column definition
#[derive(Debug)]
pub struct Column {
    pub name: Ident,
    pub datatype: DataType,
    pub primary_key: bool,
    pub nullable: bool,
    pub unique: bool,
    pub default: Option<Expr>,
}

impl Default for Column {
    fn default() -> Self {
        Column {
            name: Ident::new(""),
            datatype: DataType::Integer,
            primary_key: false,
            nullable: true,
            unique: false,
            default: None,
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.datatype)?;
        if self.primary_key {
            write!(f, " PRIMARY KEY")?;
        }
        if self.unique {
            write!(f, " UNIQUE")?;
        }
        if let Some(expr) = &self.default {
            write!(f, " DEFAULT {}", expr)?;
        }
        if !self.nullable {
            write!(f, " NOT NULL")?
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum DataType {
    Boolean,
    Integer,
    Float,
    String,
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::Boolean => "BOOLEAN",
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::String => "TEXT",
        })
    }
}

/// INSERT statement.
#[derive(Debug)]
pub struct Insert {
    /// TABLE
    pub table: Ident,
    /// COLUMNS
    pub columns: Vec<Ident>,
    pub source: InsertSource,
}

impl std::fmt::Display for Insert {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "INSERT INTO {}", self.table)?;
        if !self.columns.is_empty() {
            write!(f, " ({})", display_comma_separated(&self.columns))?;
        }
        write!(f, " {}", self.source)
    }
}

#[derive(Debug)]
pub enum InsertSource {
    Select(Box<Query>),
    Values(Values),
}

impl std::fmt::Display for InsertSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InsertSource::Select(q) => q.fmt(f),
            InsertSource::Values(values) => values.fmt(f),
        }
    }
}

/// An SQL expression.
#[derive(Debug)]
pub enum Expr {
    /// A literal value, such as string, number or NULL
    Value(Value),
    /// Identifier e.g. table name or column name
    Identifier(Ident),
    /// Multi-part identifier, e.g. `table_alias.column`
    CompoundIdentifier(Vec<Ident>),
    /// A positional parameter reference, e.g. `$1`. The index is
    /// 1-based as written in the SQL text.
    Parameter(usize),
    BinaryOp {
        left: Box<Expr>,
        op: BinaryOperator,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        expr: Box<Expr>,
    },
    /// Nested expression e.g. `(foo > bar)` or `(1)`
    Nested(Box<Expr>),
    /// `IS NULL` operator
    IsNull(Box<Expr>),
    /// `IS NOT NULL` operator
    IsNotNull(Box<Expr>),
    /// `[NOT] LIKE <pattern>`
    Like {
        negated: bool,
        expr: Box<Expr>,
        pattern: Box<Expr>,
    },
    /// Scalar function call e.g. `upper(name)` or `fib($1 - 1)`
    Function(Function),
}

impl std::fmt::Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Value(v) => write!(f, "{v}"),
            Expr::Identifier(ident) => write!(f, "{ident}"),
            Expr::CompoundIdentifier(s) => display_dot_separated(s).fmt(f),
            Expr::Parameter(i) => write!(f, "${i}"),
            Expr::BinaryOp { left, op, right } => write!(f, "{left} {op} {right}"),
            Expr::UnaryOp { op, expr } => write!(f, "{op}{expr}"),
            Expr::Nested(expr) => write!(f, "({expr})"),
            Expr::IsNull(expr) => write!(f, "{expr} IS NULL"),
            Expr::IsNotNull(expr) => write!(f, "{expr} IS NOT NULL"),
            Expr::Like { negated, expr, pattern } => {
                write!(f, "{} {}LIKE {}", expr, if *negated { "NOT " } else { "" }, pattern)
            }
            Expr::Function(func) => write!(f, "{func}"),
        }
    }
}

#[derive(Debug)]
pub enum Value {
    Number(String),
    String(String),
    Null,
    Boolean(bool),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Number(s) => write!(f, "{s}"),
            Value::String(s) => write!(f, "'{s}'"),
            Value::Null => write!(f, "NULL"),
            Value::Boolean(b) => write!(f, "{b}"),
        }
    }
}

#[derive(Debug)]
pub enum BinaryOperator {
    /// Plus, e.g. `a + b`
    Plus,
    /// Minus, e.g. `a - b`
    Minus,
    /// Multiply, e.g. `a * b`
    Multiply,
    /// Divide, e.g. `a / b`
    Divide,
    /// Modulo, e.g. `a % b`
    Modulo,
    /// Equal, e.g. `a = b`
    Eq,
    /// Not equal, e.g. `a != b`
    NotEq,
    /// Greater than, e.g. `a > b`
    Gt,
    /// Greater equal, e.g. `a >= b`
    GtEq,
    /// Less than, e.g. `a < b`
    Lt,
    /// Less equal, e.g. `a <= b`
    LtEq,
    /// And, e.g. `a AND b`
    And,
    /// Or, e.g. `a OR b`
    Or,
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOperator::Plus => f.write_str("+"),
            BinaryOperator::Minus => f.write_str("-"),
            BinaryOperator::Multiply => f.write_str("*"),
            BinaryOperator::Divide => f.write_str("/"),
            BinaryOperator::Modulo => f.write_str("%"),
            BinaryOperator::Eq => f.write_str("="),
            BinaryOperator::NotEq => f.write_str("!="),
            BinaryOperator::Gt => f.write_str(">"),
            BinaryOperator::GtEq => f.write_str(">="),
            BinaryOperator::Lt => f.write_str("<"),
            BinaryOperator::LtEq => f.write_str("<="),
            BinaryOperator::And => f.write_str("AND"),
            BinaryOperator::Or => f.write_str("OR"),
        }
    }
}

#[derive(Debug)]
pub enum UnaryOperator {
    /// Plus, e.g. `+9`
    Plus,
    /// Minus, e.g. `-9`
    Minus,
    /// Not, e.g. `NOT TRUE`
    Not,
}

impl std::fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOperator::Plus => f.write_str("+"),
            UnaryOperator::Minus => f.write_str("-"),
            UnaryOperator::Not => f.write_str("NOT "),
        }
    }
}

/// A function call
#[derive(Debug)]
pub struct Function {
    pub name: Ident,
    /// The arguments to the function within the delimiting parentheses.
    pub args: Vec<Expr>,
}

impl std::fmt::Display for Function {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, display_comma_separated(&self.args))
    }
}

/// This represents the operators for which precedence must be defined
pub enum Precedence {
    UnaryOp,
    MulDivModOp,
    PlusMinus,
    Eq,
    Like,
    Is,
    And,
    Or,
}
