use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::catalog::column::Columns;
use crate::error::Error;
use crate::error::Result;
use crate::value_err;

/// A reference-counted reference to a [`Table`].
pub type TableRef = Arc<Table>;

/// Describes the schema of a table: its name plus an ordered
/// sequence of columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    /// Table name, a qualifier name the columns belongs.
    pub name: String,
    /// A sequence of columns that describe the table.
    pub columns: Columns,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: impl Into<Columns>) -> Table {
        Table { name: name.into(), columns: columns.into() }
    }

    pub fn try_new(name: impl Into<String>, columns: impl Into<Columns>) -> Result<Table> {
        let table = Table { name: name.into(), columns: columns.into() };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::value("Table name can't be empty"));
        }
        if self.columns.is_empty() {
            return Err(value_err!("Table {} have no columns", self.name));
        }
        match self.columns.iter().filter(|it| it.primary_key).count() {
            1 => {}
            0 => return Err(value_err!("No primary key in table {}", self.name)),
            _ => return Err(value_err!("Multiple primary keys in table {}", self.name)),
        };
        self.columns.validate()?;
        Ok(())
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "TABLE {}(", self.name)?;
        for (i, col) in self.columns.iter().enumerate() {
            write!(f, "{}", col)?;
            if i < self.columns.len() - 1 {
                write!(f, ", ")?;
            }
        }
        write!(f, ")")?;
        Ok(())
    }
}

/// A table schema iterator
pub type Tables = Box<dyn Iterator<Item = Table>>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::column::ColumnBuilder;
    use crate::catalog::r#type::DataType;

    #[test]
    fn test_table_validate() {
        let columns = vec![
            ColumnBuilder::new("id", DataType::Integer).primary_key().build(),
            ColumnBuilder::new("name", DataType::String).build(),
        ];
        assert!(Table::try_new("users", columns).is_ok());

        let columns = vec![ColumnBuilder::new("id", DataType::Integer).build()];
        assert!(Table::try_new("users", columns).is_err());
    }
}
