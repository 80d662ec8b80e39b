use std::cmp::Ordering;
use std::hash::Hash;
use std::hash::Hasher;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Result;
use crate::value_err;

/// A datatype
#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Integer,
    Float,
    String,
    Null,
}

impl DataType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float)
    }

    /// Whether a value of this type can be cast to `to` at runtime.
    pub fn can_cast_to(&self, to: &DataType) -> bool {
        if self == to {
            return true;
        }
        match (self, to) {
            (DataType::Null, _) => true,
            (DataType::Boolean, DataType::Integer | DataType::Float | DataType::String) => true,
            (DataType::Integer, DataType::Boolean | DataType::Float | DataType::String) => true,
            (DataType::Float, DataType::Boolean | DataType::String) => true,
            (DataType::String, DataType::Boolean) => true,
            _ => false,
        }
    }

    /// Whether this type converts to `to` without an explicit cast.
    /// Strictly narrower than [`DataType::can_cast_to`]: only the
    /// lossless conversions qualify.
    pub fn can_convert_implicit(&self, to: &DataType) -> bool {
        if self == to {
            return true;
        }
        match (self, to) {
            (DataType::Null, _) => true,
            (DataType::Integer, DataType::Float) => true,
            _ => false,
        }
    }
}

impl Default for DataType {
    fn default() -> Self {
        Self::String
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::Boolean => "BOOLEAN",
            Self::Integer => "INTEGER",
            Self::Float => "FLOAT",
            Self::String => "TEXT",
            Self::Null => "NULL",
        })
    }
}

/// A specific value of a data type
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
}

impl Value {
    pub fn datatype(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::String(_) => DataType::String,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn cast_to(&self, to: &DataType) -> Result<Value> {
        if self.datatype() == *to {
            return Ok(self.clone());
        }
        let value = match (self, to) {
            (Value::Null, _) => Value::Null,
            (Value::Boolean(b), DataType::Integer) => Value::Integer(*b as i64),
            (Value::Boolean(b), DataType::Float) => Value::Float(*b as i64 as f64),
            (Value::Boolean(b), DataType::String) => Value::String(b.to_string()),
            (Value::Integer(i), DataType::Boolean) => Value::Boolean(*i != 0),
            (Value::Integer(i), DataType::Float) => Value::Float(*i as f64),
            (Value::Integer(i), DataType::String) => Value::String(i.to_string()),
            (Value::Float(f), DataType::Boolean) => Value::Boolean(!f.eq(&0.0)),
            (Value::Float(f), DataType::String) => Value::String(f.to_string()),
            (Value::String(s), DataType::Boolean) => Value::Boolean(!s.is_empty()),
            (_, typ) => return Err(value_err!("Can't cast {} to type {}", self, typ)),
        };
        Ok(value)
    }
}

impl Eq for Value {}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => {
                // Treat NaN as equal to NaN
                if a.is_nan() && b.is_nan() {
                    true
                } else {
                    a == b
                }
            }
            (Value::String(a), Value::String(b)) => a == b,

            // Cross-type numeric equality
            (Value::Integer(a), Value::Float(b)) => *a as f64 == *b,
            (Value::Float(a), Value::Integer(b)) => *a == *b as f64,

            // Different variants types are never equal
            _ => false,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self == other {
            return Some(Ordering::Equal);
        }

        match (self, other) {
            // Same types - direct comparison
            (Value::Boolean(a), Value::Boolean(b)) => a.partial_cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.partial_cmp(b),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => a.partial_cmp(b),

            // Cross-type numeric comparisons
            (Value::Integer(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Integer(b)) => a.partial_cmp(&(*b as f64)),

            // Null sorts first
            (Value::Null, _) => Some(Ordering::Less),
            (_, Value::Null) => Some(Ordering::Greater),

            // Different types that can't be compared
            _ => None,
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Null => {
                0u8.hash(state);
            }
            Value::Boolean(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Value::Integer(i) => {
                2u8.hash(state);
                i.hash(state);
            }
            Value::Float(f) => {
                3u8.hash(state);
                // For floats, convert to bits to handle NaN and -0.0 consistently
                f.to_bits().hash(state);
            }
            Value::String(s) => {
                4u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ans = match self {
            Value::Null => "NULL".to_string(),
            Value::Boolean(b) if *b => "TRUE".to_string(),
            Value::Boolean(_) => "FALSE".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => format!("{:.2}", f),
            Value::String(s) => format!("'{}'", s),
        };
        // Use pad to work with formatting flags.
        f.pad(&ans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_implicit_conversion_is_narrower_than_cast() {
        assert!(DataType::Integer.can_convert_implicit(&DataType::Float));
        assert!(DataType::Null.can_convert_implicit(&DataType::String));
        assert!(DataType::Integer.can_convert_implicit(&DataType::Integer));

        // Casts that are not implicit conversions.
        assert!(DataType::Integer.can_cast_to(&DataType::String));
        assert!(!DataType::Integer.can_convert_implicit(&DataType::String));
        assert!(DataType::Boolean.can_cast_to(&DataType::Integer));
        assert!(!DataType::Boolean.can_convert_implicit(&DataType::Integer));
        assert!(!DataType::Float.can_convert_implicit(&DataType::Integer));
    }

    #[test]
    fn test_cast_values() -> Result<()> {
        assert_eq!(Value::Integer(3).cast_to(&DataType::Float)?, Value::Float(3.0));
        assert_eq!(Value::Null.cast_to(&DataType::Integer)?, Value::Null);
        assert_eq!(
            Value::Integer(42).cast_to(&DataType::String)?,
            Value::String("42".to_string())
        );
        assert!(Value::String("a".to_string()).cast_to(&DataType::Integer).is_err());
        Ok(())
    }

    #[test]
    fn test_cross_type_numeric_equality() {
        assert_eq!(Value::Integer(2), Value::Float(2.0));
        assert!(Value::Integer(1) < Value::Float(1.5));
        assert!(Value::Null < Value::Integer(i64::MIN));
    }
}
