use std::sync::Arc;

use log::debug;

use crate::access::engine::Engine;
use crate::access::engine::Transaction;
use crate::access::engine::TransactionProvider;
use crate::catalog::catalog::Catalog;
use crate::catalog::r#type::DataType;
use crate::catalog::r#type::Value;
use crate::config::Config;
use crate::error::Error;
use crate::error::Result;
use crate::sql::execution::compiler::Compiler;
use crate::sql::execution::context::push_execution_ctx;
use crate::sql::execution::context::Context;
use crate::sql::execution::context::ExecContext;
use crate::sql::execution::context::ExecutionContext;
use crate::sql::execution::ResultSet;
use crate::sql::execution::Scheduler;
use crate::sql::func::language::SqlFunctionLanguage;
use crate::sql::func::CompiledFunction;
use crate::sql::func::FunctionDecl;
use crate::sql::func::FunctionDefinition;
use crate::sql::func::FunctionRegistry;
use crate::sql::func::FunctionValue;
use crate::sql::func::ReturnType;
use crate::sql::parser::ast::Statement;
use crate::sql::parser::Parser;
use crate::sql::plan::planner::BindContext;
use crate::sql::plan::planner::Planner;
use crate::value_err;

/// A source agnostic session for queries and function registration.
pub struct Session<E>
where
    E: Engine + Catalog + TransactionProvider + 'static,
    E::Transaction: 'static,
{
    engine: Arc<E>,

    planner: Planner,
    registry: Arc<FunctionRegistry>,
    language: SqlFunctionLanguage,
    vector_size: usize,
    max_call_depth: usize,

    txn: Option<Arc<dyn Transaction>>,
}

impl<E> Session<E>
where
    E: Engine + Catalog + TransactionProvider + 'static,
    E::Transaction: 'static,
{
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, Config::default())
    }

    pub fn with_config(engine: E, config: Config) -> Self {
        let engine = Arc::new(engine);
        let registry = Arc::new(FunctionRegistry::new());
        let planner = Planner::new(Arc::clone(&registry));
        let language = SqlFunctionLanguage::new(
            Arc::clone(&registry),
            Arc::clone(&engine) as Arc<dyn TransactionProvider>,
            &config,
        );
        Self {
            engine,
            planner,
            registry,
            language,
            vector_size: config.vector_size,
            max_call_depth: config.max_call_depth,
            txn: None,
        }
    }

    /// Register a function whose body is written in the query language.
    ///
    /// The declaration becomes visible before the body compiles, so the
    /// body may reference the function being registered. A failed
    /// compilation removes the declaration again; registration errors
    /// are fatal to the function, never to the session.
    pub fn create_function(
        &self,
        name: &str,
        arg_types: Vec<DataType>,
        returns: ReturnType,
        body: &str,
    ) -> Result<()> {
        let name = name.to_lowercase();
        debug!("registering sql function {}({:?})", name, arg_types);
        self.registry.declare(FunctionDecl {
            name: name.clone(),
            arg_types: arg_types.clone(),
            returns: returns.clone(),
        })?;
        let def = FunctionDefinition::new(
            body,
            Arc::clone(&self.engine) as Arc<dyn Catalog>,
            arg_types,
            returns,
        );
        match self.language.compile(&def) {
            Ok(callable) => self.registry.install(&name, callable),
            Err(err) => {
                self.registry.remove(&name);
                Err(err)
            }
        }
    }

    /// Resolve a registered function's callable.
    pub fn function(&self, name: &str) -> Result<Arc<dyn CompiledFunction>> {
        self.registry.callable(&name.to_lowercase())
    }

    /// Invoke a registered function directly, outside any statement.
    pub fn call_function(&self, name: &str, args: &[Value]) -> Result<FunctionValue> {
        self.function(name)?.call(args)
    }

    /// Begins an explicit transaction.
    pub fn begin(&mut self) -> Result<()> {
        if self.txn.is_some() {
            return Err(Error::value("Already in a transaction"));
        }
        self.txn = Some(Arc::new(self.engine.begin()?));
        Ok(())
    }

    /// Commits the current explicit transaction.
    pub fn commit(&mut self) -> Result<()> {
        let txn = self.txn.take().ok_or_else(|| Error::value("Not in a transaction"))?;
        txn.commit()
    }

    /// Rolls back the current explicit transaction.
    pub fn rollback(&mut self) -> Result<()> {
        let txn = self.txn.take().ok_or_else(|| Error::value("Not in a transaction"))?;
        txn.rollback()
    }

    /// Process one query statement. Without an explicit transaction,
    /// the statement runs in an implicit one that commits on success
    /// and rolls back on failure.
    pub fn execute_query(&mut self, query: impl Into<String>) -> Result<ResultSet> {
        let query = query.into();
        debug!("executing query {}", query);
        let stmt = self.parse_query(&query)?;
        if self.txn.is_some() {
            return self.execute_stmt(stmt);
        }

        let txn = match stmt {
            Statement::Select { .. } => self.engine.begin_read_only(),
            _ => self.engine.begin(),
        }?;
        self.txn = Some(Arc::new(txn));
        let res = self.execute_stmt(stmt);
        let txn =
            self.txn.take().ok_or_else(|| Error::internal("Implicit transaction detached"))?;
        match res {
            Ok(rs) => {
                txn.commit()?;
                Ok(rs)
            }
            Err(err) => {
                let _ = txn.rollback();
                Err(err)
            }
        }
    }

    fn parse_query(&self, query: &str) -> Result<Statement> {
        let mut stmts = Parser::new(query)?.parse_statements()?;
        if stmts.len() != 1 {
            return Err(value_err!("Expected a single statement, got {}", stmts.len()));
        }
        Ok(stmts.remove(0))
    }

    /// Execute a statement inside the attached transaction.
    fn execute_stmt(&mut self, stmt: Statement) -> Result<ResultSet> {
        let txn = self.txn.clone().ok_or_else(|| Error::internal("No transaction attached"))?;
        let catalog: Arc<dyn Catalog> = Arc::clone(&txn) as Arc<dyn Catalog>;
        let mut ctx = BindContext::new(Arc::clone(&catalog));
        let plan = self.planner.sql_statement_to_plan(&mut ctx, stmt)?;
        let compiler = Compiler::new(Arc::clone(&self.registry));
        let executor = compiler.build_execution_plan(plan)?;

        // Statement execution establishes the ambient execution context,
        // so functions invoked by this statement inherit its transaction
        // and see the statement's transactional view.
        let exec_ctx = ExecutionContext::new(catalog, Arc::clone(&txn), vec![]);
        let vector_size = self.vector_size;
        push_execution_ctx(exec_ctx, self.max_call_depth, || {
            let ctx: &mut dyn Context = &mut ExecContext::new(txn, vector_size);
            Scheduler::execute(ctx, executor)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::memory::Memory;

    fn session() -> Session<Memory> {
        Session::new(Memory::new())
    }

    #[test]
    fn test_execute_query_roundtrip() -> Result<()> {
        let mut session = session();
        session.execute_query(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        )?;
        session.execute_query(
            "INSERT INTO users (id, name) VALUES (1, 'alice'), (2, 'bob')",
        )?;
        let rs = session.execute_query("SELECT name FROM users ORDER BY name DESC")?;
        assert_eq!(
            rs.rows,
            vec![
                vec![Value::String("bob".to_string())].into(),
                vec![Value::String("alice".to_string())].into(),
            ]
        );
        Ok(())
    }

    #[test]
    fn test_implicit_transaction_rolls_back_on_error() -> Result<()> {
        let mut session = session();
        session.execute_query("CREATE TABLE t (id INTEGER PRIMARY KEY)")?;
        // the second row collides on the primary key, the whole
        // statement rolls back
        let err = session.execute_query("INSERT INTO t VALUES (1), (1)");
        assert!(err.is_err());
        let rs = session.execute_query("SELECT * FROM t")?;
        assert!(rs.is_empty());
        Ok(())
    }

    #[test]
    fn test_explicit_transaction() -> Result<()> {
        let mut session = session();
        session.execute_query("CREATE TABLE t (id INTEGER PRIMARY KEY)")?;
        session.begin()?;
        session.execute_query("INSERT INTO t VALUES (1)")?;
        session.rollback()?;
        let rs = session.execute_query("SELECT * FROM t")?;
        assert!(rs.is_empty());
        Ok(())
    }

    #[test]
    fn test_function_called_from_statement() -> Result<()> {
        let mut session = session();
        session.create_function(
            "add2",
            vec![DataType::Integer, DataType::Integer],
            ReturnType::Scalar(DataType::Integer),
            "select $1 + $2",
        )?;
        let rs = session.execute_query("SELECT add2(2, 3)")?;
        assert_eq!(rs.rows, vec![vec![Value::Integer(5)].into()]);

        // direct invocation outside any statement
        let out = session.call_function("add2", &[Value::Integer(40), Value::Integer(2)])?;
        assert_eq!(out, FunctionValue::Scalar(Value::Integer(42)));
        Ok(())
    }
}
