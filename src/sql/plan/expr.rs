use std::fmt::Display;
use std::fmt::Formatter;

use crate::catalog::r#type::DataType;
use crate::catalog::r#type::Value;
use crate::error::Result;
use crate::parse_err;
use crate::sql::plan::schema::Field;
use crate::sql::plan::schema::FieldBuilder;
use crate::sql::plan::schema::FieldReference;
use crate::sql::plan::schema::LogicalSchema;
use crate::sql::plan::schema::TableReference;
use crate::value_err;

/// Represents logical expressions such as `A + 1`.
///
/// For example the expression `A + 1` will be represented as
///
///```text
///  BinaryExpr {
///    left: Expr::FieldReference(FieldReference{'A', None}),
///    op: Operator::Plus,
///    right: Expr::Value(Value::Integer(1))
/// }
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Alias(Alias),
    Value(Value),
    FieldReference(FieldReference),
    /// A positional function parameter resolved against the installed
    /// parameter binding. The index is zero-based; the SQL text form
    /// `$1` refers to index 0. Its value is supplied by the ambient
    /// execution context at evaluation time.
    Parameter(Parameter),
    Not(Box<Expr>),
    IsNull(Box<Expr>),
    IsNotNull(Box<Expr>),
    Negative(Box<Expr>),
    Like(Like),
    /// A binary expression such as "age > 21"
    BinaryExpr(BinaryExpr),
    /// Casts the expression to a given type and will return a runtime error
    /// if the expression cannot be cast.
    Cast(Cast),
    /// A scalar function call, either a builtin or a language-defined
    /// function resolved from the function registry.
    ScalarFunction(ScalarFunction),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Alias {
    pub expr: Box<Expr>,
    pub relation: Option<TableReference>,
    pub name: String,
}

impl Alias {
    pub fn new(expr: Expr, name: impl Into<String>) -> Self {
        Self { expr: Box::new(expr), relation: None, name: name.into() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    /// Zero-based parameter position.
    pub index: usize,
    pub datatype: DataType,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Like {
    pub negated: bool,
    pub expr: Box<Expr>,
    pub pattern: Box<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BinaryExpr {
    pub left: Box<Expr>,
    pub op: Operator,
    pub right: Box<Expr>,
}

impl BinaryExpr {
    pub fn new(left: Expr, op: Operator, right: Expr) -> Self {
        Self { left: Box::new(left), op, right: Box::new(right) }
    }

    pub fn datatype_and_nullable(&self, schema: &LogicalSchema) -> Result<(DataType, bool)> {
        let (ld, ln) = self.left.datatype_and_nullable(schema)?;
        let (rd, rn) = self.right.datatype_and_nullable(schema)?;
        let datatype = BinaryTypeCoercer::new(&ld, &self.op, &rd).get_result_type()?;
        Ok((datatype, ln || rn))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Cast {
    pub expr: Box<Expr>,
    pub data_type: DataType,
}

impl Cast {
    pub fn new(expr: Expr, data_type: DataType) -> Self {
        Self { expr: Box::new(expr), data_type }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ScalarFunction {
    pub name: String,
    pub args: Vec<Expr>,
    /// The datatype this call produces, resolved at bind time.
    pub datatype: DataType,
}

/// Operators applied to expressions
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Operator {
    Plus,
    Minus,
    Multiply,
    Divide,
    Modulo,
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
    And,
    Or,
}

impl Operator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Eq
                | Operator::NotEq
                | Operator::Gt
                | Operator::GtEq
                | Operator::Lt
                | Operator::LtEq
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Operator::And | Operator::Or)
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Modulo => "%",
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::And => "AND",
            Operator::Or => "OR",
        })
    }
}

/// Decides the result type of a binary expression from its operand
/// types and operator.
pub struct BinaryTypeCoercer<'a> {
    left: &'a DataType,
    op: &'a Operator,
    right: &'a DataType,
}

impl<'a> BinaryTypeCoercer<'a> {
    pub fn new(left: &'a DataType, op: &'a Operator, right: &'a DataType) -> Self {
        Self { left, op, right }
    }

    pub fn get_result_type(&self) -> Result<DataType> {
        if self.op.is_comparison() || self.op.is_logical() {
            return Ok(DataType::Boolean);
        }
        let datatype = match (self.left, self.right) {
            (DataType::Null, other) | (other, DataType::Null) => other.clone(),
            (DataType::Integer, DataType::Integer) => DataType::Integer,
            (DataType::Integer, DataType::Float)
            | (DataType::Float, DataType::Integer)
            | (DataType::Float, DataType::Float) => DataType::Float,
            (l, r) => {
                return Err(value_err!("Can't apply {} to {} and {}", self.op, l, r));
            }
        };
        Ok(datatype)
    }
}

impl Expr {
    pub fn to_field(&self, schema: &LogicalSchema) -> Result<Field> {
        let name = match self {
            Expr::Alias(Alias { name, .. }) => name.clone(),
            Expr::FieldReference(FieldReference { name, .. }) => name.clone(),
            _ => self.to_string(),
        };
        let (datatype, nullable) = self.datatype_and_nullable(schema)?;
        Ok(FieldBuilder::new(name, datatype).nullable(nullable).build())
    }

    /// Wrap this expr in a `Expr::Cast` to the target `DataType`
    pub fn cast_to(self, cast_to_type: &DataType, schema: &LogicalSchema) -> Result<Expr> {
        let (this_type, _) = self.datatype_and_nullable(schema)?;
        if this_type == *cast_to_type {
            return Ok(self);
        }
        if !this_type.can_cast_to(cast_to_type) {
            return Err(parse_err!("Cannot convert {} to {}", this_type, cast_to_type));
        }
        Ok(Expr::Cast(Cast::new(self, cast_to_type.clone())))
    }

    /// The datatype and nullability the expr would produce
    pub fn datatype_and_nullable(&self, schema: &LogicalSchema) -> Result<(DataType, bool)> {
        let (datatype, nullable) = match self {
            Expr::Alias(Alias { expr, .. }) => expr.datatype_and_nullable(schema)?,
            Expr::Value(value) => (value.datatype(), value.is_null()),
            Expr::FieldReference(field_ref) => {
                let f = schema.field_by_ref(field_ref)?;
                (f.datatype.clone(), f.nullable)
            }
            Expr::Parameter(Parameter { datatype, .. }) => (datatype.clone(), true),
            Expr::Not(_) | Expr::IsNull(_) | Expr::IsNotNull(_) => (DataType::Boolean, false),
            Expr::Negative(expr) => expr.datatype_and_nullable(schema)?,
            Expr::Like(Like { expr, .. }) => {
                let (_, nullable) = expr.datatype_and_nullable(schema)?;
                (DataType::Boolean, nullable)
            }
            Expr::BinaryExpr(binary_expr) => binary_expr.datatype_and_nullable(schema)?,
            Expr::Cast(Cast { expr, data_type }) => {
                let (_, nullable) = expr.datatype_and_nullable(schema)?;
                (data_type.clone(), nullable)
            }
            Expr::ScalarFunction(ScalarFunction { datatype, .. }) => (datatype.clone(), true),
        };
        Ok((datatype, nullable))
    }
}

#[macro_export]
macro_rules! format_expr_vec {
    ( $ARRAY:expr ) => {{
        $ARRAY.iter().map(|e| format!("{e}")).collect::<Vec<String>>().join(", ")
    }};
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::Alias(Alias { name, expr, .. }) => write!(f, "{expr} AS {name}"),
            Expr::Value(value) => write!(f, "{value}"),
            Expr::FieldReference(fr) => write!(f, "{fr}"),
            Expr::Parameter(Parameter { index, .. }) => write!(f, "${}", index + 1),
            Expr::Not(expr) => write!(f, "NOT {expr}"),
            Expr::IsNull(expr) => write!(f, "{expr} IS NULL"),
            Expr::IsNotNull(expr) => write!(f, "{expr} IS NOT NULL"),
            Expr::Negative(expr) => write!(f, "(-{expr})"),
            Expr::Like(Like { negated, expr, pattern }) => {
                write!(f, "{expr}")?;
                if *negated {
                    write!(f, " NOT")?;
                }
                write!(f, " LIKE {pattern}")
            }
            Expr::BinaryExpr(BinaryExpr { left, op, right }) => write!(f, "{left} {op} {right}"),
            Expr::Cast(Cast { expr, data_type }) => write!(f, "CAST({expr} AS {data_type})"),
            Expr::ScalarFunction(ScalarFunction { name, args, .. }) => {
                write!(f, "{}({})", name, format_expr_vec!(args))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::plan::schema::EMPTY_SCHEMA;

    #[test]
    fn test_binary_type_coercion() -> Result<()> {
        let t = BinaryTypeCoercer::new(&DataType::Integer, &Operator::Plus, &DataType::Float)
            .get_result_type()?;
        assert_eq!(t, DataType::Float);

        let t = BinaryTypeCoercer::new(&DataType::Integer, &Operator::Lt, &DataType::Integer)
            .get_result_type()?;
        assert_eq!(t, DataType::Boolean);

        assert!(BinaryTypeCoercer::new(&DataType::String, &Operator::Plus, &DataType::Integer)
            .get_result_type()
            .is_err());
        Ok(())
    }

    #[test]
    fn test_cast_to() -> Result<()> {
        let expr = Expr::Value(Value::Integer(1)).cast_to(&DataType::Float, &EMPTY_SCHEMA)?;
        assert!(matches!(expr, Expr::Cast(_)));

        // No-op cast is elided.
        let expr = Expr::Value(Value::Integer(1)).cast_to(&DataType::Integer, &EMPTY_SCHEMA)?;
        assert_eq!(expr, Expr::Value(Value::Integer(1)));
        Ok(())
    }

    #[test]
    fn test_expr_display() {
        let expr = Expr::BinaryExpr(BinaryExpr::new(
            Expr::Parameter(Parameter { index: 0, datatype: DataType::Integer }),
            Operator::Plus,
            Expr::Parameter(Parameter { index: 1, datatype: DataType::Integer }),
        ));
        assert_eq!(expr.to_string(), "$1 + $2");
    }
}
