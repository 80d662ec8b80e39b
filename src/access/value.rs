use std::ops::Deref;
use std::ops::DerefMut;

use serde::Deserialize;
use serde::Serialize;

use crate::catalog::column::Columns;
use crate::catalog::r#type::DataType;
use crate::catalog::r#type::Value;
use crate::error::Error;
use crate::error::Result;
use crate::internal_err;
use crate::value_err;

/// Tabular values, i.e., one row of values
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Values(Vec<Value>);

impl Values {
    pub fn into_vec(self) -> Vec<Value> {
        self.0
    }

    pub fn scalar(mut self) -> Result<Value> {
        let sz = self.len();
        if sz != 1 {
            return Err(internal_err!("Expect single scalar value, got {} values", sz));
        }
        Ok(self.0.remove(0))
    }
}

impl From<Vec<Value>> for Values {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

impl Deref for Values {
    type Target = [Value];

    fn deref(&self) -> &[Value] {
        &self.0
    }
}

impl DerefMut for Values {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl IntoIterator for Values {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Values {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

pub type PrimaryKey = Value;

/// A stored table row: values paired with the column schema they
/// conform to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    pub values: Values,
    columns: Columns,
}

impl Tuple {
    pub fn new(values: Values, columns: Columns) -> Result<Tuple> {
        let tuple = Tuple { values, columns };
        tuple.validate()?;
        Ok(tuple)
    }

    pub fn primary_key(&self) -> Result<&'_ Value> {
        let idx = self.columns.get_pk_column_idx()?;
        self.values.get(idx).ok_or_else(|| Error::value("Primary key not found"))
    }

    fn validate(&self) -> Result<()> {
        if self.values.len() != self.columns.len() {
            return Err(Error::value("Invalid values size"));
        }
        for (column, value) in self.columns.iter().zip(&self.values) {
            match value.datatype() {
                DataType::Null if column.nullable => Ok(()),
                DataType::Null => {
                    Err(value_err!("NULL value is not allowed for column {}", column.name))
                }
                datatype if datatype != column.datatype => {
                    Err(value_err!("Invalid datatype {} for column {}", datatype, column.name))
                }
                _ => Ok(()),
            }?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::column::ColumnBuilder;

    #[test]
    fn test_tuple_validate() -> Result<()> {
        let columns = Columns::from(vec![
            ColumnBuilder::new("id", DataType::Integer).primary_key().build(),
            ColumnBuilder::new("name", DataType::String).build(),
        ]);

        let values = Values::from(vec![Value::Integer(1), Value::String("a".to_string())]);
        let tuple = Tuple::new(values, columns.clone())?;
        assert_eq!(tuple.primary_key()?, &Value::Integer(1));

        let values = Values::from(vec![Value::Integer(1)]);
        assert!(Tuple::new(values, columns.clone()).is_err());

        let values = Values::from(vec![Value::Null, Value::Null]);
        assert!(Tuple::new(values, columns).is_err());
        Ok(())
    }
}
