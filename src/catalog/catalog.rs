use crate::catalog::table::Table;
use crate::catalog::table::Tables;
use crate::error::Result;
use crate::value_err;

/// The catalog stores schema information. It handles table
/// creation and table lookup.
pub trait Catalog {
    /// Gets a table, if it exists
    fn get_table(&self, table_name: &str) -> Result<Option<Table>>;

    /// Gets a table, and errors if it does not exist
    fn must_get_table(&self, table: &str) -> Result<Table> {
        self.get_table(table)?.ok_or_else(|| value_err!("Table {} does not exist", table))
    }

    /// Creates a new table
    fn create_table(&self, table: Table) -> Result<()>;

    /// Get all tables
    fn scan_tables(&self) -> Result<Tables>;
}
