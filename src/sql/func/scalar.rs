use std::fmt::Debug;

use crate::access::value::Values;
use crate::catalog::r#type::DataType;
use crate::catalog::r#type::Value;
use crate::error::Result;
use crate::internal_err;
use crate::sql::plan::schema::FieldRef;
use crate::value_err;

/// Trait for implementing builtin scalar functions.
pub trait ScalarUDF: Debug + Sync + Send {
    /// Returns this function's name.
    fn name(&self) -> &str;

    /// Return the field this function produces given the input argument
    /// fields. Errors if the arguments do not fit the function.
    fn return_field(&self, arg_fields: &[FieldRef]) -> Result<FieldRef>;

    /// Invoke the function over a batch of rows. `args[i]` holds the
    /// evaluated argument values of row `i`; the output pairs one value
    /// with each input row.
    fn invoke_batch(&self, args: &[Values]) -> Result<Values>;
}

macro_rules! make_udf_function {
    ($UDF:ty, $NAME:ident) => {
        pub fn $NAME() -> std::sync::Arc<dyn ScalarUDF> {
            static INSTANCE: std::sync::LazyLock<std::sync::Arc<dyn ScalarUDF>> =
                std::sync::LazyLock::new(|| std::sync::Arc::new(<$UDF>::new()));
            std::sync::Arc::clone(&INSTANCE)
        }
    };
}

make_udf_function!(UpperFunc, upper);

#[derive(Debug)]
pub struct UpperFunc {}

impl UpperFunc {
    pub fn new() -> Self {
        Self {}
    }
}

impl Default for UpperFunc {
    fn default() -> Self {
        Self::new()
    }
}

impl ScalarUDF for UpperFunc {
    fn name(&self) -> &str {
        "upper"
    }

    fn return_field(&self, arg_fields: &[FieldRef]) -> Result<FieldRef> {
        if arg_fields.len() != 1 {
            return Err(internal_err!(
                "upper function expect exact one argument, got {}",
                arg_fields.len()
            ));
        }
        if arg_fields[0].datatype != DataType::String && arg_fields[0].datatype != DataType::Null {
            return Err(internal_err!(
                "upper function expect string argument, got {}",
                arg_fields[0].datatype
            ));
        }
        Ok(arg_fields[0].clone())
    }

    fn invoke_batch(&self, args: &[Values]) -> Result<Values> {
        let out_values = args
            .iter()
            .map(|row| match row.first() {
                Some(Value::String(s)) => Ok(Value::String(s.to_uppercase())),
                Some(Value::Null) => Ok(Value::Null),
                Some(value) => Err(value_err!("Expect String value got {}", value.datatype())),
                None => Err(internal_err!("upper function expect exact one argument, got 0")),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Values::from(out_values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upper() -> Result<()> {
        let func = upper();
        let args = vec![
            Values::from(vec![Value::String("hello".to_string())]),
            Values::from(vec![Value::Null]),
        ];
        let out = func.invoke_batch(&args)?;
        assert_eq!(out[0], Value::String("HELLO".to_string()));
        assert_eq!(out[1], Value::Null);
        Ok(())
    }
}
