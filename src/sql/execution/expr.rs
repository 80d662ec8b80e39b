use std::any::Any;
use std::fmt::Debug;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

use crate::access::value::Values;
use crate::catalog::r#type::DataType;
use crate::catalog::r#type::Value;
use crate::error::Error;
use crate::error::Result;
use crate::internal_err;
use crate::sql::execution::compiler::RecordBatch;
use crate::sql::execution::context::current_execution_ctx;
use crate::sql::execution::context::Context;
use crate::sql::func::scalar::ScalarUDF;
use crate::sql::func::FunctionRegistry;
use crate::sql::func::FunctionValue;
use crate::sql::plan::expr::BinaryTypeCoercer;
use crate::sql::plan::expr::Operator;
use crate::sql::plan::schema::FieldReference;
use crate::sql::plan::schema::LogicalSchema;
use crate::value_err;

/// Physical expr executor
pub trait PhysicalExpr: Debug + Display {
    /// Returns the physical expression as [`Any`] so that it can be
    /// downcast to a specific implementation.
    fn as_any(&self) -> &dyn Any;

    /// Get the data type of the expr, given the schema of the input.
    fn data_type(&self, schema: &LogicalSchema) -> Result<DataType>;

    /// Evaluate an expression against a RecordBatch, returns
    /// paired columnar-values with the input records.
    fn evaluate(&self, ctx: &mut dyn Context, batch: &RecordBatch) -> Result<Values>;

    /// Get a list of child PhysicalExpr that provide the input for this expr.
    fn children(&self) -> Vec<&Arc<dyn PhysicalExpr>> {
        vec![]
    }
}

/// Literal value physical expr
#[derive(Debug)]
pub struct ValueExec {
    value: Value,
}

impl ValueExec {
    pub fn new(value: Value) -> Self {
        ValueExec { value }
    }
}

impl PhysicalExpr for ValueExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self, _schema: &LogicalSchema) -> Result<DataType> {
        Ok(self.value.datatype())
    }

    fn evaluate(&self, _ctx: &mut dyn Context, batch: &RecordBatch) -> Result<Values> {
        let n = batch.num_rows();
        if n == 0 {
            // In case of it is a dummy RecordBatch, we need to
            // return a single scalar value.
            return Ok(vec![self.value.clone()].into());
        }
        Ok(vec![self.value.clone(); n].into())
    }
}

impl Display for ValueExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}

/// Field reference physical expr
#[derive(Debug)]
pub struct FieldReferenceExec {
    /// The name of the column (used for debugging and display purposes)
    name: String,
    /// index of schema
    index: usize,
}

impl FieldReferenceExec {
    pub fn try_new(f: FieldReference, schema: &LogicalSchema) -> Result<Self> {
        let index = schema
            .field_index_by_name(&f.relation, &f.name)
            .ok_or_else(|| Error::parse(format!("Unexpected field reference {}", f)))?;
        Ok(Self { name: f.name, index })
    }
}

impl PhysicalExpr for FieldReferenceExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self, schema: &LogicalSchema) -> Result<DataType> {
        Ok(schema.field(self.index).datatype.clone())
    }

    fn evaluate(&self, _ctx: &mut dyn Context, batch: &RecordBatch) -> Result<Values> {
        Ok(batch.rows.iter().map(|row| row[self.index].clone()).collect::<Vec<_>>().into())
    }
}

impl Display for FieldReferenceExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.name, self.index)
    }
}

/// Positional parameter physical expr.
///
/// The value is not part of the compiled plan: it is read from the
/// ambient execution context of the invocation being evaluated, which
/// is what lets one compiled plan serve concurrent and recursive
/// calls with different argument values.
#[derive(Debug)]
pub struct ParameterExec {
    /// Zero-based parameter position.
    index: usize,
    datatype: DataType,
}

impl ParameterExec {
    pub fn new(index: usize, datatype: DataType) -> Self {
        Self { index, datatype }
    }
}

impl PhysicalExpr for ParameterExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self, _schema: &LogicalSchema) -> Result<DataType> {
        Ok(self.datatype.clone())
    }

    fn evaluate(&self, _ctx: &mut dyn Context, batch: &RecordBatch) -> Result<Values> {
        let exec_ctx = current_execution_ctx().ok_or_else(|| {
            internal_err!("No active execution context for parameter ${}", self.index + 1)
        })?;
        let value = exec_ctx
            .parameters
            .get(self.index)
            .ok_or_else(|| value_err!("No value for parameter ${}", self.index + 1))?
            .clone();
        let n = batch.num_rows();
        if n == 0 {
            return Ok(vec![value].into());
        }
        Ok(vec![value; n].into())
    }
}

impl Display for ParameterExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "${}", self.index + 1)
    }
}

/// Binary physical expr
#[derive(Debug)]
pub struct BinaryExprExec {
    left: Arc<dyn PhysicalExpr>,
    op: Operator,
    right: Arc<dyn PhysicalExpr>,
}

impl BinaryExprExec {
    pub fn new(left: Arc<dyn PhysicalExpr>, op: Operator, right: Arc<dyn PhysicalExpr>) -> Self {
        Self { left, op, right }
    }
}

// TODO: wrap arithmetic overflow
macro_rules! arithmetic_op {
    ($lhs:expr,$op:tt,$rhs:expr) => {{
        match ($lhs, $rhs) {
            (Value::Integer(lhs), Value::Integer(rhs)) => Ok(Value::Integer(lhs $op rhs)),
            (Value::Integer(lhs), Value::Float(rhs)) => Ok(Value::Float(lhs as f64 $op rhs)),
            (Value::Integer(_), Value::Null) => Ok(Value::Null),
            (Value::Float(lhs), Value::Integer(rhs)) => Ok(Value::Float(lhs $op rhs as f64)),
            (Value::Float(lhs), Value::Float(rhs)) => Ok(Value::Float(lhs $op rhs)),
            (Value::Float(_), Value::Null) => Ok(Value::Null),
            (Value::Null, Value::Float(_)) => Ok(Value::Null),
            (Value::Null, Value::Integer(_)) => Ok(Value::Null),
            (Value::Null, Value::Null) => Ok(Value::Null),
            (lhs, rhs) => {
                Err($crate::error::Error::Value(format!("Can't {} {} and {}", stringify!($op), lhs, rhs)))
            }
        }
    }};
}

macro_rules! compare_op {
    ($lhs:expr,$op:tt,$rhs:expr) => {{
        match ($lhs, $rhs) {
            (Value::Boolean(lhs), Value::Boolean(rhs)) => Ok(Value::Boolean(lhs $op rhs)),
            (Value::Integer(lhs), Value::Integer(rhs)) => Ok(Value::Boolean(lhs $op rhs)),
            (Value::Integer(lhs), Value::Float(rhs)) => Ok(Value::Boolean((lhs as f64) $op rhs)),
            (Value::Float(lhs), Value::Integer(rhs)) => Ok(Value::Boolean(lhs $op rhs as f64)),
            (Value::Float(lhs), Value::Float(rhs)) => Ok(Value::Boolean(lhs $op rhs)),
            (Value::String(lhs), Value::String(rhs)) => Ok(Value::Boolean(lhs $op rhs)),
            (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
            (lhs, rhs) => {
                Err($crate::error::Error::Value(format!("Can't compare {} and {}", lhs, rhs)))
            }
        }
    }};
}

impl PhysicalExpr for BinaryExprExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self, schema: &LogicalSchema) -> Result<DataType> {
        let ld = self.left.data_type(schema)?;
        let rd = self.right.data_type(schema)?;
        let type_coercer = BinaryTypeCoercer::new(&ld, &self.op, &rd);
        type_coercer.get_result_type()
    }

    fn evaluate(&self, ctx: &mut dyn Context, batch: &RecordBatch) -> Result<Values> {
        let lhs = self.left.evaluate(ctx, batch)?;
        let rhs = self.right.evaluate(ctx, batch)?;
        if lhs.len() != rhs.len() {
            return Err(internal_err!(
                "Cannot evaluate arrays of different length, got {} vs {}",
                lhs.len(),
                rhs.len()
            ));
        }
        let zip = lhs.into_iter().zip(rhs.into_iter());
        let values: Result<Vec<Value>> = match self.op {
            Operator::Plus => zip.map(|(l, r)| arithmetic_op!(l, +, r)).collect(),
            Operator::Minus => zip.map(|(l, r)| arithmetic_op!(l, -, r)).collect(),
            Operator::Multiply => zip.map(|(l, r)| arithmetic_op!(l, *, r)).collect(),
            Operator::Divide => zip
                .map(|(l, r)| {
                    if !l.is_null() && (r == Value::Integer(0) && matches!(l, Value::Integer(_))) {
                        return Err(Error::value("Division by zero"));
                    }
                    arithmetic_op!(l, /, r)
                })
                .collect(),
            Operator::Modulo => zip
                .map(|(l, r)| {
                    if !l.is_null() && (r == Value::Integer(0) && matches!(l, Value::Integer(_))) {
                        return Err(Error::value("Division by zero"));
                    }
                    arithmetic_op!(l, %, r)
                })
                .collect(),
            Operator::Eq => zip.map(|(l, r)| compare_op!(l, ==, r)).collect(),
            Operator::NotEq => zip.map(|(l, r)| compare_op!(l, !=, r)).collect(),
            Operator::Gt => zip.map(|(l, r)| compare_op!(l, >, r)).collect(),
            Operator::GtEq => zip.map(|(l, r)| compare_op!(l, >=, r)).collect(),
            Operator::Lt => zip.map(|(l, r)| compare_op!(l, <, r)).collect(),
            Operator::LtEq => zip.map(|(l, r)| compare_op!(l, <=, r)).collect(),
            Operator::And => zip
                .map(|(l, r)| match (l, r) {
                    (Value::Boolean(lhs), Value::Boolean(rhs)) => Ok(Value::Boolean(lhs && rhs)),
                    (Value::Boolean(lhs), Value::Null) if !lhs => Ok(Value::Boolean(false)),
                    (Value::Boolean(_), Value::Null) => Ok(Value::Null),
                    (Value::Null, Value::Boolean(rhs)) if !rhs => Ok(Value::Boolean(false)),
                    (Value::Null, Value::Boolean(_)) => Ok(Value::Null),
                    (Value::Null, Value::Null) => Ok(Value::Null),
                    (lhs, rhs) => Err(value_err!("Can't and {} and {}", lhs, rhs)),
                })
                .collect(),
            Operator::Or => zip
                .map(|(l, r)| match (l, r) {
                    (Value::Boolean(lhs), Value::Boolean(rhs)) => Ok(Value::Boolean(lhs || rhs)),
                    (Value::Boolean(lhs), Value::Null) if lhs => Ok(Value::Boolean(true)),
                    (Value::Boolean(_), Value::Null) => Ok(Value::Null),
                    (Value::Null, Value::Boolean(rhs)) if rhs => Ok(Value::Boolean(true)),
                    (Value::Null, Value::Boolean(_)) => Ok(Value::Null),
                    (Value::Null, Value::Null) => Ok(Value::Null),
                    (lhs, rhs) => Err(value_err!("Can't or {} and {}", lhs, rhs)),
                })
                .collect(),
        };
        values.map(Values::from)
    }

    fn children(&self) -> Vec<&Arc<dyn PhysicalExpr>> {
        vec![&self.left, &self.right]
    }
}

impl Display for BinaryExprExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {}", self.left, self.op, self.right)
    }
}

/// Numeric negation physical expr
#[derive(Debug)]
pub struct NegativeExec {
    expr: Arc<dyn PhysicalExpr>,
}

impl NegativeExec {
    pub fn new(expr: Arc<dyn PhysicalExpr>) -> Self {
        Self { expr }
    }
}

impl PhysicalExpr for NegativeExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self, schema: &LogicalSchema) -> Result<DataType> {
        self.expr.data_type(schema)
    }

    fn evaluate(&self, ctx: &mut dyn Context, batch: &RecordBatch) -> Result<Values> {
        let values = self.expr.evaluate(ctx, batch)?;
        let values = values
            .into_iter()
            .map(|it| match it {
                Value::Integer(i) => Ok(Value::Integer(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                Value::Null => Ok(Value::Null),
                v => Err(value_err!("Can't negate {}", v)),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(values.into())
    }

    fn children(&self) -> Vec<&Arc<dyn PhysicalExpr>> {
        vec![&self.expr]
    }
}

impl Display for NegativeExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "(-{})", self.expr)
    }
}

/// `IS [NOT] NULL` physical expr
#[derive(Debug)]
pub struct IsNullExec {
    expr: Arc<dyn PhysicalExpr>,
    negated: bool,
}

impl IsNullExec {
    pub fn new(expr: Arc<dyn PhysicalExpr>, negated: bool) -> Self {
        Self { expr, negated }
    }
}

impl PhysicalExpr for IsNullExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self, _schema: &LogicalSchema) -> Result<DataType> {
        Ok(DataType::Boolean)
    }

    fn evaluate(&self, ctx: &mut dyn Context, batch: &RecordBatch) -> Result<Values> {
        let values = self.expr.evaluate(ctx, batch)?;
        let values = values
            .into_iter()
            .map(|it| Value::Boolean(it.is_null() != self.negated))
            .collect::<Vec<_>>();
        Ok(values.into())
    }

    fn children(&self) -> Vec<&Arc<dyn PhysicalExpr>> {
        vec![&self.expr]
    }
}

impl Display for IsNullExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} IS {}NULL", self.expr, if self.negated { "NOT " } else { "" })
    }
}

/// `[NOT] LIKE` physical expr
#[derive(Debug)]
pub struct LikeExec {
    expr: Arc<dyn PhysicalExpr>,
    pattern: Arc<dyn PhysicalExpr>,
    negated: bool,
}

impl LikeExec {
    pub fn new(
        expr: Arc<dyn PhysicalExpr>,
        pattern: Arc<dyn PhysicalExpr>,
        negated: bool,
    ) -> Self {
        Self { expr, pattern, negated }
    }

    /// Convert a SQL LIKE pattern to an anchored regex: `%` matches any
    /// substring, `_` any single character, everything else literally.
    fn like_to_regex(pattern: &str) -> Result<regex::Regex> {
        let mut out = String::with_capacity(pattern.len() + 2);
        out.push('^');
        for c in pattern.chars() {
            match c {
                '%' => out.push_str(".*"),
                '_' => out.push('.'),
                c => out.push_str(&regex::escape(&c.to_string())),
            }
        }
        out.push('$');
        regex::Regex::new(&out).map_err(|err| internal_err!("Invalid LIKE pattern: {}", err))
    }
}

impl PhysicalExpr for LikeExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self, _schema: &LogicalSchema) -> Result<DataType> {
        Ok(DataType::Boolean)
    }

    fn evaluate(&self, ctx: &mut dyn Context, batch: &RecordBatch) -> Result<Values> {
        let lhs = self.expr.evaluate(ctx, batch)?;
        let rhs = self.pattern.evaluate(ctx, batch)?;
        if lhs.len() != rhs.len() {
            return Err(internal_err!(
                "Cannot compare arrays of different length, got {} vs {}",
                lhs.len(),
                rhs.len()
            ));
        }
        let values = lhs
            .into_iter()
            .zip(rhs.into_iter())
            .map(|(txt, pat)| match (txt, pat) {
                (Value::String(t), Value::String(p)) => {
                    let regex = Self::like_to_regex(&p)?;
                    Ok(Value::Boolean(regex.is_match(&t) != self.negated))
                }
                (Value::Null, _) | (_, Value::Null) => Ok(Value::Null),
                (t, p) => Err(value_err!("Like expects string value, got {} and {}", t, p)),
            })
            .collect::<Result<Vec<Value>>>()?;
        Ok(values.into())
    }

    fn children(&self) -> Vec<&Arc<dyn PhysicalExpr>> {
        vec![&self.expr, &self.pattern]
    }
}

impl Display for LikeExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}LIKE {}", self.expr, if self.negated { "NOT " } else { "" }, self.pattern)
    }
}

/// Runtime cast physical expr
#[derive(Debug)]
pub struct CastExec {
    datatype: DataType,
    expr: Arc<dyn PhysicalExpr>,
}

impl CastExec {
    pub fn new(datatype: DataType, expr: Arc<dyn PhysicalExpr>) -> Self {
        Self { datatype, expr }
    }
}

impl PhysicalExpr for CastExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self, _schema: &LogicalSchema) -> Result<DataType> {
        Ok(self.datatype.clone())
    }

    fn evaluate(&self, ctx: &mut dyn Context, batch: &RecordBatch) -> Result<Values> {
        let values = self.expr.evaluate(ctx, batch)?;
        let values = values
            .into_iter()
            .map(|it| it.cast_to(&self.datatype))
            .collect::<Result<Vec<_>>>()?;
        Ok(values.into())
    }

    fn children(&self) -> Vec<&Arc<dyn PhysicalExpr>> {
        vec![&self.expr]
    }
}

impl Display for CastExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CAST({} AS {})", self.expr, self.datatype)
    }
}

/// How a scalar function call resolves to an implementation.
pub enum FunctionCallable {
    /// A builtin scalar UDF, bound at compile time.
    Builtin(Arc<dyn ScalarUDF>),
    /// A language-defined function, resolved from the registry at call
    /// time. Late binding is what allows a function body to call a
    /// function whose registration is still in progress, i.e. itself.
    Defined(Arc<FunctionRegistry>),
}

impl Debug for FunctionCallable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            FunctionCallable::Builtin(udf) => write!(f, "Builtin({:?})", udf),
            FunctionCallable::Defined(_) => write!(f, "Defined"),
        }
    }
}

/// Scalar function call physical expr.
#[derive(Debug)]
pub struct FunctionCallExec {
    name: String,
    args: Vec<Arc<dyn PhysicalExpr>>,
    datatype: DataType,
    callable: FunctionCallable,
}

impl FunctionCallExec {
    pub fn new(
        name: String,
        args: Vec<Arc<dyn PhysicalExpr>>,
        datatype: DataType,
        callable: FunctionCallable,
    ) -> Self {
        Self { name, args, datatype, callable }
    }
}

impl PhysicalExpr for FunctionCallExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn data_type(&self, _schema: &LogicalSchema) -> Result<DataType> {
        Ok(self.datatype.clone())
    }

    fn evaluate(&self, ctx: &mut dyn Context, batch: &RecordBatch) -> Result<Values> {
        // Evaluate the arguments columnar-wise, then transpose into
        // per-row argument tuples.
        let num_rows = batch.num_rows().max(1);
        let columns = self
            .args
            .iter()
            .map(|it| it.evaluate(ctx, batch))
            .collect::<Result<Vec<_>>>()?;
        let rows = (0..num_rows)
            .map(|i| {
                columns
                    .iter()
                    .map(|col| {
                        col.get(i).cloned().ok_or_else(|| {
                            internal_err!("Argument column of function {} is too short", self.name)
                        })
                    })
                    .collect::<Result<Vec<_>>>()
                    .map(Values::from)
            })
            .collect::<Result<Vec<_>>>()?;

        match &self.callable {
            FunctionCallable::Builtin(udf) => udf.invoke_batch(&rows),
            FunctionCallable::Defined(registry) => {
                let callable = registry.callable(&self.name)?;
                let values = rows
                    .iter()
                    .map(|row| {
                        let result = callable.call(row)?;
                        match result {
                            FunctionValue::Null => Ok(Value::Null),
                            FunctionValue::Scalar(value) => Ok(value),
                            FunctionValue::Table(_) => Err(internal_err!(
                                "Function {} returned a row set in an expression",
                                self.name
                            )),
                        }
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(values.into())
            }
        }
    }

    fn children(&self) -> Vec<&Arc<dyn PhysicalExpr>> {
        self.args.iter().collect()
    }
}

impl Display for FunctionCallExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let args = self.args.iter().map(|it| it.to_string()).collect::<Vec<_>>();
        write!(f, "{}({})", self.name, args.join(", "))
    }
}
