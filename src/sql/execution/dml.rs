use std::any::Any;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

use log::debug;

use crate::access::value::Tuple;
use crate::error::Result;
use crate::sql::execution::compiler::ExecutionPlan;
use crate::sql::execution::compiler::RecordBatch;
use crate::sql::execution::context::Context;
use crate::sql::plan::schema::LogicalSchema;
use crate::sql::plan::schema::TableReference;
use crate::sql::plan::schema::EMPTY_SCHEMA;

/// Insert physical executor. The input plan produces rows already
/// shaped like the target table.
#[derive(Debug)]
pub struct InsertExec {
    table: TableReference,
    input: Arc<dyn ExecutionPlan>,
}

impl InsertExec {
    pub fn new(table: TableReference, input: Arc<dyn ExecutionPlan>) -> Self {
        Self { table, input }
    }
}

impl ExecutionPlan for InsertExec {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn schema(&self) -> LogicalSchema {
        EMPTY_SCHEMA.clone()
    }

    fn init(&self, ctx: &mut dyn Context) -> Result<()> {
        self.input.init(ctx)
    }

    fn execute(&self, ctx: &mut dyn Context) -> Result<Option<RecordBatch>> {
        let txn = ctx.txn();
        let table = txn.must_get_table(&self.table.to_string())?;
        let mut count = 0usize;
        while let Some(rb) = self.input.execute(ctx)? {
            for row in rb.rows {
                let tuple = Tuple::new(row, table.columns.clone())?;
                txn.insert(&table.name, tuple)?;
                count += 1;
            }
        }
        debug!("inserted {} rows into {}", count, table.name);
        Ok(None)
    }

    fn children(&self) -> Vec<&Arc<dyn ExecutionPlan>> {
        vec![&self.input]
    }
}

impl Display for InsertExec {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "InsertExec: {}", self.table)
    }
}
