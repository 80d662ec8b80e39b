use std::sync::Arc;

use log::debug;

use crate::access::engine::TransactionProvider;
use crate::access::value::Values;
use crate::catalog::catalog::Catalog;
use crate::catalog::r#type::DataType;
use crate::catalog::r#type::Value;
use crate::config::Config;
use crate::error::Error;
use crate::error::Result;
use crate::error::SqlState;
use crate::sql::execution::compiler::Compiler;
use crate::sql::execution::compiler::ExecutionPlan;
use crate::sql::execution::context::current_execution_ctx;
use crate::sql::execution::context::push_execution_ctx;
use crate::sql::execution::context::Context;
use crate::sql::execution::context::ExecContext;
use crate::sql::execution::context::ExecutionContext;
use crate::sql::execution::Scheduler;
use crate::sql::func::CompiledFunction;
use crate::sql::func::FunctionDefinition;
use crate::sql::func::FunctionRegistry;
use crate::sql::func::FunctionValue;
use crate::sql::func::ReturnType;
use crate::sql::parser::ast::Statement;
use crate::sql::parser::ast::StatementKind;
use crate::sql::parser::Parser;
use crate::sql::plan::planner::BindContext;
use crate::sql::plan::planner::ParameterBinding;
use crate::sql::plan::planner::Planner;
use crate::sql::plan::schema::LogicalSchema;
use crate::unsupported_err;
use crate::value_err;

/// The SQL function language handler.
///
/// Compiles a function whose body is itself written in the query
/// language: the body is parsed and validated, compiled once into a
/// row-producing plan with the declared argument types bound as
/// positional parameters, paired with a return transformer chosen from
/// the declared return type, and wrapped into a reusable callable.
/// Every later invocation only executes the already-compiled plan.
pub struct SqlFunctionLanguage {
    registry: Arc<FunctionRegistry>,
    provider: Arc<dyn TransactionProvider>,
    vector_size: usize,
    max_call_depth: usize,
}

impl SqlFunctionLanguage {
    pub fn new(
        registry: Arc<FunctionRegistry>,
        provider: Arc<dyn TransactionProvider>,
        config: &Config,
    ) -> Self {
        Self {
            registry,
            provider,
            vector_size: config.vector_size,
            max_call_depth: config.max_call_depth,
        }
    }

    /// Compile a function definition into a callable. Invoked once per
    /// definition, at registration time; errors here are fatal to the
    /// registration.
    pub fn compile(&self, def: &FunctionDefinition) -> Result<Arc<dyn CompiledFunction>> {
        let stmt = validate_body(&def.body)?;
        let kind = stmt.kind();
        debug!("compiling sql function body: {}", stmt);

        // Compile the body in a fresh binding scope carrying only the
        // owning schema and the body's own parameter binding, so that
        // nothing from a statement currently being compiled leaks into
        // the body and the body compiles as if it were top-level.
        let binding = ParameterBinding::new(&def.arg_types);
        let mut ctx = BindContext::with_parameters(Arc::clone(&def.catalog), binding);
        let planner = Planner::new(Arc::clone(&self.registry));
        let plan = planner.sql_statement_to_plan(&mut ctx, stmt)?;
        if !plan.is_query() {
            return Err(unsupported_err!("Unsupported statement type in function: {}", kind));
        }
        let schema = plan.schema().clone();
        let compiler = Compiler::new(Arc::clone(&self.registry));
        let executor = compiler.build_execution_plan(plan)?;

        let transformer = ReturnTransformer::select(&def.returns, &schema)?;

        Ok(Arc::new(SqlFunction {
            plan: executor,
            transformer,
            catalog: Arc::clone(&def.catalog),
            provider: Arc::clone(&self.provider),
            arg_types: def.arg_types.clone(),
            vector_size: self.vector_size,
            max_call_depth: self.max_call_depth,
        }))
    }
}

/// Parse the function body and reject anything that is not a single
/// row-producing statement.
fn validate_body(body: &str) -> Result<Statement> {
    let mut stmts = Parser::new(body)?.parse_statements()?;
    if stmts.len() != 1 {
        return Err(Error::statement_count(stmts.len()));
    }
    let stmt = stmts.remove(0);
    match stmt.kind() {
        StatementKind::Select
        | StatementKind::Union
        | StatementKind::UnionAll
        | StatementKind::With
        | StatementKind::WithRecursive
        | StatementKind::Values => Ok(stmt),
        kind => Err(unsupported_err!("Unsupported statement type in function: {}", kind)),
    }
}

/// The result-shaping strategy of a function, chosen once at
/// registration from the declared return type and the compiled plan's
/// output columns, and applied uniformly on every call.
enum ReturnTransformer {
    /// Ignore the output rows, the function returns nothing.
    Void,
    /// Convert every output row to the declared record shape.
    Table { types: Vec<DataType> },
    /// Take the single column of the first output row.
    Scalar { datatype: DataType },
}

impl ReturnTransformer {
    fn select(returns: &ReturnType, schema: &LogicalSchema) -> Result<ReturnTransformer> {
        match returns {
            ReturnType::Void => Ok(ReturnTransformer::Void),
            ReturnType::Table(fields) => {
                // The plan's row shape converts to the declared record
                // shape positionally: same arity, each output column
                // implicitly convertible to the field at its position.
                let convertible = fields.len() == schema.len()
                    && schema
                        .fields()
                        .iter()
                        .zip(fields.iter())
                        .all(|(out, field)| out.datatype.can_convert_implicit(&field.datatype));
                if !convertible {
                    return Err(Error::return_type_mismatch(
                        "return type mismatch in function declared to return record",
                        SqlState::InvalidFunctionDefinitionTable,
                    ));
                }
                let types = fields.iter().map(|it| it.datatype.clone()).collect();
                Ok(ReturnTransformer::Table { types })
            }
            ReturnType::Scalar(datatype) => {
                if schema.len() != 1
                    || !schema.field(0).datatype.can_convert_implicit(datatype)
                {
                    return Err(Error::return_type_mismatch(
                        format!(
                            "return type mismatch in function declared to return {}",
                            datatype
                        ),
                        SqlState::InvalidFunctionDefinitionScalar,
                    ));
                }
                Ok(ReturnTransformer::Scalar { datatype: datatype.clone() })
            }
        }
    }

    /// Shape the raw plan output into the function's return value.
    /// `rows` is `None` when the executor produced no result set at
    /// all, which is distinct from an empty one.
    fn apply(&self, rows: Option<Vec<Values>>) -> Result<FunctionValue> {
        match self {
            ReturnTransformer::Void => Ok(FunctionValue::Null),
            ReturnTransformer::Table { types } => {
                let rows = match rows {
                    None => return Ok(FunctionValue::Null),
                    Some(rows) => rows,
                };
                let rows = rows
                    .into_iter()
                    .map(|row| {
                        row.into_iter()
                            .zip(types.iter())
                            .map(|(value, datatype)| value.cast_to(datatype))
                            .collect::<Result<Vec<_>>>()
                            .map(Values::from)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(FunctionValue::Table(rows))
            }
            ReturnTransformer::Scalar { datatype } => {
                let first = rows.and_then(|rows| rows.into_iter().next());
                match first {
                    Some(row) => Ok(FunctionValue::Scalar(row.scalar()?.cast_to(datatype)?)),
                    None => Ok(FunctionValue::Scalar(Value::Null)),
                }
            }
        }
    }
}

/// A compiled SQL-language function: the invocation closure returned
/// to the engine. The compiled plan and transformer are fixed and
/// shared; all per-call state lives in the execution context pushed
/// for the duration of each call.
struct SqlFunction {
    plan: Arc<dyn ExecutionPlan>,
    transformer: ReturnTransformer,
    catalog: Arc<dyn Catalog>,
    provider: Arc<dyn TransactionProvider>,
    arg_types: Vec<DataType>,
    vector_size: usize,
    max_call_depth: usize,
}

impl CompiledFunction for SqlFunction {
    fn call(&self, args: &[Value]) -> Result<FunctionValue> {
        if args.len() != self.arg_types.len() {
            return Err(value_err!(
                "Function expects {} arguments, got {}",
                self.arg_types.len(),
                args.len()
            ));
        }
        // Argument values convert to the declared types at call time;
        // a failed conversion aborts this invocation only.
        let args = args
            .iter()
            .zip(self.arg_types.iter())
            .map(|(value, datatype)| value.cast_to(datatype))
            .collect::<Result<Vec<_>>>()?;

        let ctx = match current_execution_ctx() {
            // A nested call inherits the enclosing context, so the body
            // sees the same schema and transactional view as its caller;
            // only the parameter values are re-bound.
            Some(active) => active.derive(args),
            // A top-level call, e.g. a pure function reduced with
            // constant arguments outside any statement evaluation, gets
            // a brand-new context from the owning schema and the
            // engine's current transaction.
            None => ExecutionContext::new(
                Arc::clone(&self.catalog),
                self.provider.current_transaction()?,
                args,
            ),
        };
        let txn = Arc::clone(&ctx.transaction);

        // The context is active exactly for the duration of this call;
        // it is popped on success, failure and panic alike, so the
        // caller's own parameter binding is restored on every exit path.
        push_execution_ctx(ctx, self.max_call_depth, || {
            let exec: &mut dyn Context = &mut ExecContext::new(txn, self.vector_size);
            let rs = Scheduler::execute(exec, Arc::clone(&self.plan))?;
            self.transformer.apply(Some(rs.rows))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::memory::Memory;
    use crate::catalog::column::ColumnBuilder;
    use crate::catalog::table::Table;
    use crate::sql::func::FunctionDecl;
    use crate::sql::plan::schema::FieldBuilder;
    use crate::sql::plan::schema::Fields;

    fn language(engine: &Arc<Memory>) -> (Arc<FunctionRegistry>, SqlFunctionLanguage) {
        let registry = Arc::new(FunctionRegistry::new());
        let language = SqlFunctionLanguage::new(
            Arc::clone(&registry),
            engine.clone(),
            &Config::default(),
        );
        (registry, language)
    }

    fn definition(engine: &Arc<Memory>, body: &str, args: &[DataType], returns: ReturnType) -> FunctionDefinition {
        FunctionDefinition::new(body, engine.clone() as Arc<dyn Catalog>, args.to_vec(), returns)
    }

    fn setup_users(engine: &Arc<Memory>) -> Result<()> {
        engine.create_table(Table::new(
            "users",
            vec![
                ColumnBuilder::new("id", DataType::Integer).primary_key().build(),
                ColumnBuilder::new("name", DataType::String).build(),
            ],
        ))
    }

    #[test]
    fn test_body_must_be_a_single_statement() {
        for body in ["", ";;", "SELECT 1; SELECT 2"] {
            let err = validate_body(body).unwrap_err();
            assert!(
                matches!(err, Error::StatementCount { .. }),
                "body {:?} should fail the statement count check, got {:?}",
                body,
                err
            );
        }
        assert!(validate_body("SELECT 1").is_ok());
        assert!(validate_body("SELECT 1;").is_ok());
    }

    #[test]
    fn test_body_kind_gate() {
        for body in [
            "SELECT 1",
            "SELECT 1 UNION SELECT 2",
            "SELECT 1 UNION ALL SELECT 2",
            "WITH a AS (SELECT 1) SELECT * FROM a",
            "WITH RECURSIVE r AS (SELECT 1 UNION SELECT 2) SELECT * FROM r",
            "VALUES (1), (2)",
        ] {
            assert!(validate_body(body).is_ok(), "body {:?} should pass the kind gate", body);
        }
        for body in ["CREATE TABLE t (id INTEGER PRIMARY KEY)", "INSERT INTO t VALUES (1)"] {
            let err = validate_body(body).unwrap_err();
            assert!(
                matches!(err, Error::NotSupported(_)),
                "body {:?} should fail the kind gate, got {:?}",
                body,
                err
            );
        }
    }

    #[test]
    fn test_transformer_selection_void() -> Result<()> {
        let schema = LogicalSchema::from_unqualified_fields(
            vec![FieldBuilder::new("x", DataType::Integer).build()].into(),
        )?;
        let transformer = ReturnTransformer::select(&ReturnType::Void, &schema)?;
        // rows are ignored entirely
        let out = transformer.apply(Some(vec![Values::from(vec![Value::Integer(1)])]))?;
        assert_eq!(out, FunctionValue::Null);
        Ok(())
    }

    #[test]
    fn test_transformer_selection_table_mismatch() -> Result<()> {
        let schema = LogicalSchema::from_unqualified_fields(
            vec![
                FieldBuilder::new("a", DataType::Integer).build(),
                FieldBuilder::new("b", DataType::String).build(),
            ]
            .into(),
        )?;
        // arity mismatch
        let record: Fields = vec![FieldBuilder::new("a", DataType::Integer).build()].into();
        let err = ReturnTransformer::select(&ReturnType::Table(record), &schema).unwrap_err();
        assert_eq!(err.sql_state(), Some(SqlState::InvalidFunctionDefinitionTable));

        // positional type mismatch
        let record: Fields = vec![
            FieldBuilder::new("a", DataType::String).build(),
            FieldBuilder::new("b", DataType::String).build(),
        ]
        .into();
        let err = ReturnTransformer::select(&ReturnType::Table(record), &schema).unwrap_err();
        assert_eq!(err.sql_state(), Some(SqlState::InvalidFunctionDefinitionTable));

        // positional match ignores names, allows implicit widening
        let record: Fields = vec![
            FieldBuilder::new("total", DataType::Float).build(),
            FieldBuilder::new("label", DataType::String).build(),
        ]
        .into();
        assert!(ReturnTransformer::select(&ReturnType::Table(record), &schema).is_ok());
        Ok(())
    }

    #[test]
    fn test_transformer_selection_scalar_mismatch() -> Result<()> {
        let two_cols = LogicalSchema::from_unqualified_fields(
            vec![
                FieldBuilder::new("a", DataType::Integer).build(),
                FieldBuilder::new("b", DataType::Integer).build(),
            ]
            .into(),
        )?;
        let err = ReturnTransformer::select(&ReturnType::Scalar(DataType::Integer), &two_cols)
            .unwrap_err();
        assert_eq!(err.sql_state(), Some(SqlState::InvalidFunctionDefinitionScalar));

        let string_col = LogicalSchema::from_unqualified_fields(
            vec![FieldBuilder::new("a", DataType::String).build()].into(),
        )?;
        let err = ReturnTransformer::select(&ReturnType::Scalar(DataType::Integer), &string_col)
            .unwrap_err();
        assert_eq!(err.sql_state(), Some(SqlState::InvalidFunctionDefinitionScalar));

        // Integer widens to Float implicitly
        let int_col = LogicalSchema::from_unqualified_fields(
            vec![FieldBuilder::new("a", DataType::Integer).build()].into(),
        )?;
        assert!(ReturnTransformer::select(&ReturnType::Scalar(DataType::Float), &int_col).is_ok());
        Ok(())
    }

    #[test]
    fn test_transformer_apply_absent_vs_empty() -> Result<()> {
        let transformer = ReturnTransformer::Table { types: vec![DataType::Integer] };
        // an absent result set is the absence-of-value marker
        assert_eq!(transformer.apply(None)?, FunctionValue::Null);
        // an empty result set is an empty table
        assert_eq!(transformer.apply(Some(vec![]))?, FunctionValue::Table(vec![]));

        let transformer = ReturnTransformer::Scalar { datatype: DataType::Integer };
        assert_eq!(transformer.apply(Some(vec![]))?, FunctionValue::Scalar(Value::Null));
        Ok(())
    }

    #[test]
    fn test_compile_and_call_scalar() -> Result<()> {
        let engine = Arc::new(Memory::new());
        let (_, language) = language(&engine);
        let def = definition(
            &engine,
            "select $1 + $2",
            &[DataType::Integer, DataType::Integer],
            ReturnType::Scalar(DataType::Integer),
        );
        let callable = language.compile(&def)?;
        let out = callable.call(&[Value::Integer(2), Value::Integer(3)])?;
        assert_eq!(out, FunctionValue::Scalar(Value::Integer(5)));

        // argument values convert at call time
        let out = callable.call(&[Value::Null, Value::Integer(3)])?;
        assert_eq!(out, FunctionValue::Scalar(Value::Null));

        // arity and conversion failures abort the single invocation
        assert!(callable.call(&[Value::Integer(1)]).is_err());
        assert!(callable
            .call(&[Value::String("a".to_string()), Value::Integer(3)])
            .is_err());
        Ok(())
    }

    #[test]
    fn test_compile_and_call_table() -> Result<()> {
        let engine = Arc::new(Memory::new());
        setup_users(&engine)?;
        let txn = crate::access::engine::Engine::begin(engine.as_ref())?;
        use crate::access::engine::Transaction;
        txn.insert(
            "users",
            crate::access::value::Tuple::new(
                Values::from(vec![Value::Integer(1), Value::String("alice".to_string())]),
                engine.must_get_table("users")?.columns,
            )?,
        )?;
        txn.commit()?;

        let (_, language) = language(&engine);
        let record: Fields = vec![
            FieldBuilder::new("id", DataType::Integer).build(),
            FieldBuilder::new("name", DataType::String).build(),
        ]
        .into();
        let def = definition(&engine, "select * from users", &[], ReturnType::Table(record));
        let callable = language.compile(&def)?;
        let out = callable.call(&[])?;
        assert_eq!(
            out,
            FunctionValue::Table(vec![Values::from(vec![
                Value::Integer(1),
                Value::String("alice".to_string())
            ])])
        );
        Ok(())
    }

    #[test]
    fn test_compile_and_call_void() -> Result<()> {
        let engine = Arc::new(Memory::new());
        let (_, language) = language(&engine);
        let def = definition(&engine, "select 42", &[], ReturnType::Void);
        let callable = language.compile(&def)?;
        assert_eq!(callable.call(&[])?, FunctionValue::Null);
        Ok(())
    }

    #[test]
    fn test_compile_rejects_mismatched_returns() -> Result<()> {
        let engine = Arc::new(Memory::new());
        let (_, language) = language(&engine);

        let def = definition(
            &engine,
            "select 1, 2",
            &[],
            ReturnType::Scalar(DataType::Integer),
        );
        let err = language.compile(&def).unwrap_err();
        assert_eq!(err.sql_state(), Some(SqlState::InvalidFunctionDefinitionScalar));

        let record: Fields = vec![FieldBuilder::new("a", DataType::Boolean).build()].into();
        let def = definition(&engine, "select 1", &[], ReturnType::Table(record));
        let err = language.compile(&def).unwrap_err();
        assert_eq!(err.sql_state(), Some(SqlState::InvalidFunctionDefinitionTable));
        Ok(())
    }

    #[test]
    fn test_self_recursive_function() -> Result<()> {
        // fib(n): the body references the function being registered;
        // the declaration is installed before the body compiles, the
        // callable resolves lazily at call time.
        let engine = Arc::new(Memory::new());
        let (registry, language) = language(&engine);
        registry.declare(FunctionDecl {
            name: "fib".to_string(),
            arg_types: vec![DataType::Integer],
            returns: ReturnType::Scalar(DataType::Integer),
        })?;
        let def = definition(
            &engine,
            "select fib($1 - 1) + fib($1 - 2)",
            &[DataType::Integer],
            ReturnType::Scalar(DataType::Integer),
        );
        let callable = language.compile(&def)?;
        registry.install("fib", Arc::clone(&callable))?;

        // The naive recursive body has no base case in SQL; bound the
        // recursion through the depth limit instead and check that the
        // error unwinds cleanly with the context stack restored.
        let err = callable.call(&[Value::Integer(100)]);
        assert!(err.is_err());
        assert!(!crate::sql::execution::context::has_execution_ctx());
        Ok(())
    }
}
