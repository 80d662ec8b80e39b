use std::cell::RefCell;
use std::sync::Arc;

use crate::access::engine::Transaction;
use crate::catalog::catalog::Catalog;
use crate::catalog::r#type::Value;
use crate::error::Result;
use crate::value_err;

/// Context provides the execution environment for physical operators.
///
/// Operators read the transaction and batch size through this trait
/// rather than holding them directly, so the same compiled plan can be
/// executed against different transactions.
pub trait Context {
    /// Returns the transaction associated with this context.
    /// Used by physical operators to access catalog metadata and perform data operations.
    fn txn(&self) -> Arc<dyn Transaction>;

    /// Returns the configured batch size for vectorized execution.
    /// Physical operators use this to determine how many tuples to process at once.
    fn vector_size(&self) -> usize;
}

/// Runtime execution context passed across physical nodes during
/// statement execution.
pub struct ExecContext {
    /// The transaction attached to the context
    transaction: Arc<dyn Transaction>,
    vector_size: usize,
}

impl ExecContext {
    pub fn new(transaction: Arc<dyn Transaction>, vector_size: usize) -> Self {
        Self { transaction, vector_size }
    }
}

impl Context for ExecContext {
    fn txn(&self) -> Arc<dyn Transaction> {
        self.transaction.clone()
    }

    fn vector_size(&self) -> usize {
        self.vector_size
    }
}

/// The ambient per-call state of one function/statement invocation:
/// the schema it was bound against, the transaction it runs in, and
/// the current positional parameter values.
///
/// Contexts live on a thread-local stack rather than being threaded
/// through every evaluation call site; deeply nested expression
/// evaluation reads the active context implicitly. Strict LIFO
/// discipline on that stack is what keeps the parameter values of
/// nested invocations from leaking into each other.
#[derive(Clone)]
pub struct ExecutionContext {
    pub catalog: Arc<dyn Catalog>,
    pub transaction: Arc<dyn Transaction>,
    pub parameters: Vec<Value>,
}

impl ExecutionContext {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        transaction: Arc<dyn Transaction>,
        parameters: Vec<Value>,
    ) -> Self {
        Self { catalog, transaction, parameters }
    }

    /// Derive the context for a nested invocation: same schema and
    /// transaction as the enclosing context, only the parameter values
    /// are replaced.
    pub fn derive(&self, parameters: Vec<Value>) -> Self {
        Self {
            catalog: Arc::clone(&self.catalog),
            transaction: Arc::clone(&self.transaction),
            parameters,
        }
    }
}

thread_local! {
    /// One context stack per thread. Concurrent logical executions on
    /// other threads have their own stack and cannot observe this one.
    static CONTEXT_STACK: RefCell<Vec<ExecutionContext>> = const { RefCell::new(Vec::new()) };
}

/// Whether an execution context is currently active on this thread.
pub fn has_execution_ctx() -> bool {
    CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
}

/// The currently active execution context, if any.
pub fn current_execution_ctx() -> Option<ExecutionContext> {
    CONTEXT_STACK.with(|stack| stack.borrow().last().cloned())
}

/// The number of active context frames on this thread.
pub fn execution_ctx_depth() -> usize {
    CONTEXT_STACK.with(|stack| stack.borrow().len())
}

/// Run `f` with `ctx` pushed as the active execution context.
///
/// The context is popped when `f` returns, whether it succeeds, fails
/// or panics; the previously active context is restored exactly as it
/// was. `max_depth` bounds the stack against runaway recursive calls.
pub fn push_execution_ctx<T, F>(ctx: ExecutionContext, max_depth: usize, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    CONTEXT_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        if stack.len() >= max_depth {
            return Err(value_err!("Function call depth limit {} exceeded", max_depth));
        }
        stack.push(ctx);
        Ok(())
    })?;
    let _guard = StackGuard;
    f()
}

struct StackGuard;

impl Drop for StackGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::engine::TransactionProvider;
    use crate::access::memory::Memory;
    use crate::error::Error;

    fn test_ctx(param: i64) -> Result<ExecutionContext> {
        let engine = Arc::new(Memory::new());
        let txn = engine.current_transaction()?;
        Ok(ExecutionContext::new(engine, txn, vec![Value::Integer(param)]))
    }

    fn current_param() -> Value {
        current_execution_ctx().unwrap().parameters[0].clone()
    }

    #[test]
    fn test_nested_push_restores_outer_context() -> Result<()> {
        assert!(!has_execution_ctx());
        push_execution_ctx(test_ctx(1)?, 8, || {
            assert_eq!(current_param(), Value::Integer(1));
            let inner = current_execution_ctx().unwrap().derive(vec![Value::Integer(2)]);
            push_execution_ctx(inner, 8, || {
                assert_eq!(current_param(), Value::Integer(2));
                assert_eq!(execution_ctx_depth(), 2);
                Ok(())
            })?;
            // the outer parameter values are intact after the inner call
            assert_eq!(current_param(), Value::Integer(1));
            assert_eq!(execution_ctx_depth(), 1);
            Ok(())
        })?;
        assert!(!has_execution_ctx());
        Ok(())
    }

    #[test]
    fn test_pop_on_error() -> Result<()> {
        let res: Result<()> =
            push_execution_ctx(test_ctx(1)?, 8, || Err(Error::value("boom")));
        assert!(res.is_err());
        assert!(!has_execution_ctx());
        Ok(())
    }

    #[test]
    fn test_pop_on_panic() -> Result<()> {
        let ctx = test_ctx(1)?;
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<()> = push_execution_ctx(ctx, 8, || panic!("boom"));
        }));
        assert!(res.is_err());
        assert!(!has_execution_ctx());
        Ok(())
    }

    #[test]
    fn test_depth_limit() -> Result<()> {
        fn recurse(n: usize) -> Result<usize> {
            let ctx = current_execution_ctx().unwrap().derive(vec![]);
            match push_execution_ctx(ctx, 4, || recurse(n + 1)) {
                Ok(depth) => Ok(depth),
                Err(_) => Ok(n),
            }
        }
        let depth = push_execution_ctx(test_ctx(0)?, 4, || recurse(1))?;
        assert_eq!(depth, 4, "recursion stops at the depth limit");
        assert!(!has_execution_ctx());
        Ok(())
    }

    #[test]
    fn test_derive_keeps_transaction() -> Result<()> {
        let ctx = test_ctx(7)?;
        let version = ctx.transaction.version();
        let derived = ctx.derive(vec![Value::Integer(8)]);
        assert_eq!(derived.transaction.version(), version);
        assert_eq!(derived.parameters, vec![Value::Integer(8)]);
        Ok(())
    }
}
