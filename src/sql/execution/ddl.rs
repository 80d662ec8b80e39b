use std::any::Any;
use std::cell::Cell;
use std::fmt::Display;
use std::fmt::Formatter;

use log::debug;

use crate::catalog::table::Table;
use crate::error::Result;
use crate::sql::execution::compiler::ExecutionPlan;
use crate::sql::execution::compiler::RecordBatch;
use crate::sql::execution::context::Context;
use crate::sql::plan::schema::LogicalSchema;
use crate::sql::plan::schema::EMPTY_SCHEMA;

/// Create table physical executor
#[derive(Debug)]
pub struct CreateTableExec {
    table: Table,
    if_not_exists: bool,
    done: Cell<bool>,
}

impl CreateTableExec {
    pub fn new(table: Table, if_not_exists: bool) -> Self {
        Self { table, if_not_exists, done: Cell::new(false) }
    }
}

impl ExecutionPlan for CreateTableExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> LogicalSchema {
        EMPTY_SCHEMA.clone()
    }

    fn init(&self, _ctx: &mut dyn Context) -> Result<()> {
        self.done.set(false);
        Ok(())
    }

    fn execute(&self, ctx: &mut dyn Context) -> Result<Option<RecordBatch>> {
        if self.done.get() {
            return Ok(None);
        }
        self.done.set(true);
        let txn = ctx.txn();
        if self.if_not_exists && txn.get_table(&self.table.name)?.is_some() {
            debug!("table {} already exists, skipping", self.table.name);
            return Ok(None);
        }
        txn.create_table(self.table.clone())?;
        Ok(None)
    }
}

impl Display for CreateTableExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "CreateTableExec: {}", self.table.name)
    }
}
