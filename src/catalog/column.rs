use std::ops::Deref;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::catalog::r#type::DataType;
use crate::catalog::r#type::Value;
use crate::error::Error;
use crate::error::Result;
use crate::value_err;

/// A reference counted [`Column`]
pub type ColumnRef = Arc<Column>;

/// A table column schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Column data type
    pub datatype: DataType,
    /// Whether a column is a primary key
    pub primary_key: bool,
    /// Whether a column is nullable
    pub nullable: bool,
    /// Whether the column should only take unique values
    pub unique: bool,
    /// The default value of the column
    pub default: Option<Value>,
}

impl Column {
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::value("Column name can't be empty"));
        }
        if self.primary_key && self.nullable {
            return Err(value_err!("Primary key {} cannot be nullable", self.name));
        }
        if self.primary_key && !self.unique {
            return Err(value_err!("Primary key {} must be unique", self.name));
        }
        if let Some(default) = &self.default {
            let datatype = default.datatype();
            if datatype != DataType::Null && datatype != self.datatype {
                return Err(value_err!(
                    "Default value for column {} has datatype {}, expect {}",
                    self.name,
                    datatype,
                    self.datatype
                ));
            }
            if datatype == DataType::Null && !self.nullable {
                return Err(value_err!(
                    "Can't use NULL as default for non-nullable column {}",
                    self.name
                ));
            }
        }
        Ok(())
    }
}

/// Builder for creating [`Column`] instances with a fluent interface
pub struct ColumnBuilder {
    name: String,
    datatype: DataType,
    primary_key: bool,
    nullable: bool,
    unique: bool,
    default: Option<Value>,
}

impl ColumnBuilder {
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Self {
            name: name.into(),
            datatype,
            primary_key: false,
            nullable: true,
            unique: false,
            default: None,
        }
    }

    /// Mark this column as the primary key. Primary keys are
    /// automatically not nullable and unique.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self.unique = true;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn build(self) -> Column {
        Column {
            name: self.name,
            datatype: self.datatype,
            primary_key: self.primary_key,
            nullable: self.nullable,
            unique: self.unique,
            default: self.default,
        }
    }
}

impl std::fmt::Display for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.datatype)?;
        if self.primary_key {
            write!(f, " PRIMARY KEY")?;
        }
        if !self.nullable {
            write!(f, " NOT NULL")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Columns(Arc<[ColumnRef]>);

impl Columns {
    pub fn empty() -> Self {
        Self(Arc::new([]))
    }

    /// Searches for a column by name, returning it along with its index if found
    pub fn find(&self, name: &str) -> Option<(usize, &ColumnRef)> {
        self.0.iter().enumerate().find(|(_, c)| c.name == name)
    }

    pub fn get_pk_column_idx(&self) -> Result<usize> {
        self.0
            .iter()
            .position(|it| it.primary_key)
            .ok_or_else(|| Error::value("Primary key column not found"))
    }

    pub fn validate(&self) -> Result<()> {
        for column in self {
            column.validate()?
        }
        Ok(())
    }
}

impl Default for Columns {
    fn default() -> Self {
        Self::empty()
    }
}

impl FromIterator<Column> for Columns {
    fn from_iter<T: IntoIterator<Item = Column>>(iter: T) -> Self {
        iter.into_iter().map(Arc::new).collect()
    }
}

impl FromIterator<ColumnRef> for Columns {
    fn from_iter<T: IntoIterator<Item = ColumnRef>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<Column>> for Columns {
    fn from(value: Vec<Column>) -> Self {
        value.into_iter().collect()
    }
}

impl From<Vec<ColumnRef>> for Columns {
    fn from(value: Vec<ColumnRef>) -> Self {
        value.into_iter().collect()
    }
}

impl Deref for Columns {
    type Target = [ColumnRef];

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl<'a> IntoIterator for &'a Columns {
    type Item = &'a ColumnRef;
    type IntoIter = std::slice::Iter<'a, ColumnRef>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_validate() {
        let column = ColumnBuilder::new("id", DataType::Integer).primary_key().build();
        assert!(column.validate().is_ok());

        let column = Column {
            name: "id".to_string(),
            datatype: DataType::Integer,
            primary_key: true,
            nullable: true,
            unique: true,
            default: None,
        };
        assert!(column.validate().is_err());

        let column = ColumnBuilder::new("n", DataType::Integer)
            .default_value(Value::String("oops".to_string()))
            .build();
        assert!(column.validate().is_err());
    }
}
