use std::sync::Arc;

use crate::access::value::PrimaryKey;
use crate::access::value::Tuple;
use crate::catalog::catalog::Catalog;
use crate::error::Result;

/// The Transactional access engine interface
pub trait Engine {
    type Transaction: Transaction;

    /// Begins a read-write transaction.
    fn begin(&self) -> Result<Self::Transaction>;

    /// Begins a read-only transaction.
    fn begin_read_only(&self) -> Result<Self::Transaction>;
}

/// A table scan iterator
pub type Scan = Box<dyn Iterator<Item = Result<Tuple>>>;

/// Relation oriented transaction.
pub trait Transaction: Catalog {
    /// The transaction's version
    fn version(&self) -> u64;

    /// Whether the transaction is read-only
    fn read_only(&self) -> bool;

    /// Commits the transaction
    fn commit(&self) -> Result<()>;
    /// Rolls back the transaction
    fn rollback(&self) -> Result<()>;

    /// Inserts a new table row
    fn insert(&self, table: &str, tuple: Tuple) -> Result<PrimaryKey>;
    /// Scan a table
    fn scan(&self, table: &str) -> Result<Scan>;
}

/// Hands out the engine's current transaction. Used by compiled
/// functions invoked outside any statement evaluation, where no
/// ambient execution context supplies one.
pub trait TransactionProvider {
    fn current_transaction(&self) -> Result<Arc<dyn Transaction>>;
}
