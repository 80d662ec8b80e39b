use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

use crate::access::value::Values;
use crate::error::Result;
use crate::internal_err;
use crate::sql::execution::compiler::ExecutionPlan;
use crate::sql::execution::context::Context;
use crate::sql::plan::schema::LogicalSchema;

pub mod compiler;
pub mod context;
mod ddl;
mod dml;
pub mod expr;
pub mod query;

pub struct Scheduler {}

impl Scheduler {
    /// Execute a physical query plan to exhaustion.
    pub fn execute(ctx: &mut dyn Context, executor: Arc<dyn ExecutionPlan>) -> Result<ResultSet> {
        let rows = Self::poll_executor(ctx, &executor)?;
        Ok(ResultSet { schema: executor.schema(), rows })
    }

    /// Initialize the executor and poll it until exhausted.
    pub fn poll_executor(
        ctx: &mut dyn Context,
        executor: &Arc<dyn ExecutionPlan>,
    ) -> Result<Vec<Values>> {
        executor.init(ctx)?;
        let mut rows = vec![];
        while let Some(rb) = executor.execute(ctx)? {
            rows.extend(rb.rows);
        }
        Ok(rows)
    }
}

pub struct ResultSet {
    pub schema: LogicalSchema,
    pub rows: Vec<Values>,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn num_cols(&self) -> usize {
        self.schema.fields().len()
    }

    /// The values of the column at `col_idx`, one per row.
    pub fn columnar_values_at(&self, col_idx: usize) -> Result<Values> {
        let values = self
            .rows
            .iter()
            .map(|row| {
                row.get(col_idx)
                    .cloned()
                    .ok_or_else(|| internal_err!("value at column {} is out of bound", col_idx))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Values::from(values))
    }
}

impl Display for ResultSet {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names =
            self.schema.fields().iter().map(|it| it.name.clone()).collect::<Vec<_>>();
        writeln!(f, "{}", names.join(" | "))?;
        for row in &self.rows {
            let row = row.iter().map(|it| it.to_string()).collect::<Vec<_>>();
            writeln!(f, "{}", row.join(" | "))?;
        }
        Ok(())
    }
}
