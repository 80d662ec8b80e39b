use std::cell::Cell;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::access::engine::Engine;
use crate::access::engine::Scan;
use crate::access::engine::Transaction;
use crate::access::engine::TransactionProvider;
use crate::access::value::PrimaryKey;
use crate::access::value::Tuple;
use crate::access::value::Values;
use crate::catalog::catalog::Catalog;
use crate::catalog::table::Table;
use crate::catalog::table::Tables;
use crate::error::Error;
use crate::error::Result;
use crate::value_err;

/// The committed engine state: table schemas plus row storage,
/// stamped with a monotonically increasing version.
#[derive(Debug, Clone, Default)]
struct State {
    version: u64,
    tables: BTreeMap<String, Table>,
    rows: BTreeMap<String, Vec<Values>>,
}

/// An in-memory transactional engine.
///
/// Transactions operate on a snapshot of the committed state taken at
/// begin time; writes buffer in the snapshot and publish on commit.
/// `Memory` itself implements [`Catalog`] over the latest committed
/// state, which is what a function definition holds on to as its
/// owning schema.
#[derive(Clone)]
pub struct Memory {
    state: Arc<Mutex<State>>,
}

impl Memory {
    pub fn new() -> Memory {
        Memory { state: Arc::new(Mutex::new(State::default())) }
    }

    fn begin_txn(&self, read_only: bool) -> Result<MemoryTransaction> {
        let state = self.state.lock()?;
        Ok(MemoryTransaction {
            shared: Arc::clone(&self.state),
            version: state.version,
            read_only,
            snapshot: RefCell::new(state.clone()),
            done: Cell::new(false),
        })
    }
}

impl Default for Memory {
    fn default() -> Self {
        Memory::new()
    }
}

impl Engine for Memory {
    type Transaction = MemoryTransaction;

    fn begin(&self) -> Result<MemoryTransaction> {
        self.begin_txn(false)
    }

    fn begin_read_only(&self) -> Result<MemoryTransaction> {
        self.begin_txn(true)
    }
}

impl Catalog for Memory {
    fn get_table(&self, table_name: &str) -> Result<Option<Table>> {
        let state = self.state.lock()?;
        Ok(state.tables.get(table_name).cloned())
    }

    fn create_table(&self, table: Table) -> Result<()> {
        // Single-op transaction: validate, publish, bump version.
        table.validate()?;
        let mut state = self.state.lock()?;
        if state.tables.contains_key(&table.name) {
            return Err(value_err!("Table {} already exists", table.name));
        }
        state.rows.insert(table.name.clone(), Vec::new());
        state.tables.insert(table.name.clone(), table);
        state.version += 1;
        Ok(())
    }

    fn scan_tables(&self) -> Result<Tables> {
        let state = self.state.lock()?;
        let tables = state.tables.values().cloned().collect::<Vec<_>>();
        Ok(Box::new(tables.into_iter()))
    }
}

impl TransactionProvider for Memory {
    fn current_transaction(&self) -> Result<Arc<dyn Transaction>> {
        Ok(Arc::new(self.begin_read_only()?))
    }
}

/// A transaction over a snapshot of the committed state.
pub struct MemoryTransaction {
    shared: Arc<Mutex<State>>,
    version: u64,
    read_only: bool,
    snapshot: RefCell<State>,
    done: Cell<bool>,
}

impl MemoryTransaction {
    fn check_active(&self) -> Result<()> {
        if self.done.get() {
            return Err(Error::internal("Transaction already committed or rolled back"));
        }
        Ok(())
    }

    fn check_writable(&self) -> Result<()> {
        self.check_active()?;
        if self.read_only {
            return Err(Error::value("Can't write in a read-only transaction"));
        }
        Ok(())
    }
}

impl Transaction for MemoryTransaction {
    fn version(&self) -> u64 {
        self.version
    }

    fn read_only(&self) -> bool {
        self.read_only
    }

    fn commit(&self) -> Result<()> {
        self.check_active()?;
        self.done.set(true);
        if self.read_only {
            return Ok(());
        }
        // Publish the snapshot as the new committed state. Concurrent
        // writers are last-commit-wins.
        let mut state = self.shared.lock()?;
        let mut snapshot = self.snapshot.borrow().clone();
        snapshot.version = state.version + 1;
        *state = snapshot;
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.check_active()?;
        self.done.set(true);
        Ok(())
    }

    fn insert(&self, table: &str, tuple: Tuple) -> Result<PrimaryKey> {
        self.check_writable()?;
        let mut snapshot = self.snapshot.borrow_mut();
        let schema = snapshot
            .tables
            .get(table)
            .ok_or_else(|| value_err!("Table {} does not exist", table))?
            .clone();
        let pk = tuple.primary_key()?.clone();
        let pk_idx = schema.columns.get_pk_column_idx()?;
        let rows = snapshot.rows.entry(table.to_string()).or_default();
        if rows.iter().any(|row| row.get(pk_idx) == Some(&pk)) {
            return Err(value_err!("Duplicate primary key {} for table {}", pk, table));
        }
        for (idx, column) in schema.columns.iter().enumerate() {
            if !column.unique || column.primary_key {
                continue;
            }
            let value = &tuple.values[idx];
            if value.is_null() {
                continue;
            }
            if rows.iter().any(|row| row.get(idx) == Some(value)) {
                return Err(value_err!("Duplicate value {} for unique column {}", value, column.name));
            }
        }
        rows.push(tuple.values);
        Ok(pk)
    }

    fn scan(&self, table: &str) -> Result<Scan> {
        self.check_active()?;
        let snapshot = self.snapshot.borrow();
        let schema = snapshot
            .tables
            .get(table)
            .ok_or_else(|| value_err!("Table {} does not exist", table))?;
        let columns = schema.columns.clone();
        let rows = snapshot.rows.get(table).cloned().unwrap_or_default();
        Ok(Box::new(rows.into_iter().map(move |values| Tuple::new(values, columns.clone()))))
    }
}

impl Catalog for MemoryTransaction {
    fn get_table(&self, table_name: &str) -> Result<Option<Table>> {
        self.check_active()?;
        Ok(self.snapshot.borrow().tables.get(table_name).cloned())
    }

    fn create_table(&self, table: Table) -> Result<()> {
        self.check_writable()?;
        table.validate()?;
        let mut snapshot = self.snapshot.borrow_mut();
        if snapshot.tables.contains_key(&table.name) {
            return Err(value_err!("Table {} already exists", table.name));
        }
        snapshot.rows.insert(table.name.clone(), Vec::new());
        snapshot.tables.insert(table.name.clone(), table);
        Ok(())
    }

    fn scan_tables(&self) -> Result<Tables> {
        self.check_active()?;
        let tables = self.snapshot.borrow().tables.values().cloned().collect::<Vec<_>>();
        Ok(Box::new(tables.into_iter()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::column::ColumnBuilder;
    use crate::catalog::r#type::DataType;
    use crate::catalog::r#type::Value;

    fn users_table() -> Table {
        Table::new(
            "users",
            vec![
                ColumnBuilder::new("id", DataType::Integer).primary_key().build(),
                ColumnBuilder::new("name", DataType::String).build(),
            ],
        )
    }

    fn user_row(id: i64, name: &str) -> Values {
        Values::from(vec![Value::Integer(id), Value::String(name.to_string())])
    }

    #[test]
    fn test_snapshot_isolation() -> Result<()> {
        let engine = Memory::new();
        let table = users_table();

        let txn = engine.begin()?;
        txn.create_table(table.clone())?;
        txn.insert("users", Tuple::new(user_row(1, "alice"), table.columns.clone())?)?;

        // Uncommitted writes are invisible to a new snapshot.
        let other = engine.begin_read_only()?;
        assert!(other.get_table("users")?.is_none());
        other.rollback()?;

        txn.commit()?;

        let txn = engine.begin_read_only()?;
        let rows = txn.scan("users")?.collect::<Result<Vec<_>>>()?;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].values, user_row(1, "alice"));
        Ok(())
    }

    #[test]
    fn test_rollback_discards_writes() -> Result<()> {
        let engine = Memory::new();
        let txn = engine.begin()?;
        txn.create_table(users_table())?;
        txn.rollback()?;
        assert!(engine.get_table("users")?.is_none());
        Ok(())
    }

    #[test]
    fn test_duplicate_primary_key() -> Result<()> {
        let engine = Memory::new();
        let table = users_table();
        let txn = engine.begin()?;
        txn.create_table(table.clone())?;
        txn.insert("users", Tuple::new(user_row(1, "alice"), table.columns.clone())?)?;
        let err = txn.insert("users", Tuple::new(user_row(1, "bob"), table.columns.clone())?);
        assert!(err.is_err());
        Ok(())
    }

    #[test]
    fn test_read_only_rejects_writes() -> Result<()> {
        let engine = Memory::new();
        let txn = engine.begin_read_only()?;
        assert!(txn.create_table(users_table()).is_err());
        Ok(())
    }
}
