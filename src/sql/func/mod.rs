use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Display;
use std::fmt::Formatter;
use std::sync::Arc;

use crate::access::value::Values;
use crate::catalog::catalog::Catalog;
use crate::catalog::r#type::DataType;
use crate::catalog::r#type::Value;
use crate::error::Result;
use crate::sql::func::scalar::upper;
use crate::sql::func::scalar::ScalarUDF;
use crate::sql::plan::schema::Fields;
use crate::value_err;

pub mod language;
pub mod scalar;

/// The declared return type of a language-defined function, fixed at
/// registration time.
#[derive(Clone, Debug, PartialEq)]
pub enum ReturnType {
    /// The function returns no value.
    Void,
    /// A single scalar value of the given type.
    Scalar(DataType),
    /// A set of rows shaped like the given record: an ordered list of
    /// named, typed fields.
    Table(Fields),
}

impl Display for ReturnType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ReturnType::Void => f.write_str("VOID"),
            ReturnType::Scalar(datatype) => datatype.fmt(f),
            ReturnType::Table(fields) => {
                write!(f, "TABLE(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", field)?;
                }
                write!(f, ")")
            }
        }
    }
}

/// The result of invoking a language-defined function.
#[derive(Clone, Debug, PartialEq)]
pub enum FunctionValue {
    /// The absence of a value: void functions, or an absent result set.
    /// Distinct from an empty table.
    Null,
    Scalar(Value),
    Table(Vec<Values>),
}

/// A function compiled into an executable form. Calling it is
/// side-effect free with respect to the function itself: the same
/// compiled plan and return transformer serve every call, and the
/// callable may be invoked arbitrarily many times, including
/// recursively.
pub trait CompiledFunction {
    fn call(&self, args: &[Value]) -> Result<FunctionValue>;
}

/// Everything the engine hands to a function language handler when a
/// function is registered.
pub struct FunctionDefinition {
    /// The raw function body text, written in the query language.
    pub body: String,
    /// The namespace the function belongs to. Shared with the engine,
    /// not owned; the body compiles against it.
    pub catalog: Arc<dyn Catalog>,
    /// Ordered declared argument types.
    pub arg_types: Vec<DataType>,
    /// Declared return type.
    pub returns: ReturnType,
}

impl FunctionDefinition {
    pub fn new(
        body: impl Into<String>,
        catalog: Arc<dyn Catalog>,
        arg_types: Vec<DataType>,
        returns: ReturnType,
    ) -> Self {
        Self { body: body.into(), catalog, arg_types, returns }
    }
}

/// The declaration of a function as the planner sees it: enough to
/// type-check a call without the compiled body.
#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub arg_types: Vec<DataType>,
    pub returns: ReturnType,
}

struct DefinedFunction {
    decl: FunctionDecl,
    /// Installed after the body compiles. A declaration without a
    /// callable exists only during registration of that function,
    /// which is what lets a function body reference itself.
    callable: Option<Arc<dyn CompiledFunction>>,
}

/// Registry of functions the planner can resolve: builtin scalar UDFs
/// plus language-defined functions registered at runtime.
pub struct FunctionRegistry {
    scalar_functions: HashMap<String, Arc<dyn ScalarUDF>>,
    defined: RefCell<HashMap<String, DefinedFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        let scalar_functions = vec![upper()];
        let scalar_map = scalar_functions
            .into_iter()
            .map(|it| (it.name().to_string(), it))
            .collect::<HashMap<String, Arc<dyn ScalarUDF>>>();
        Self { scalar_functions: scalar_map, defined: RefCell::new(HashMap::new()) }
    }

    /// Get builtin scalar udf with the given name.
    pub fn udf(&self, name: &str) -> Option<Arc<dyn ScalarUDF>> {
        self.scalar_functions.get(name).cloned()
    }

    /// Get the declaration of a language-defined function.
    pub fn decl(&self, name: &str) -> Option<FunctionDecl> {
        self.defined.borrow().get(name).map(|it| it.decl.clone())
    }

    /// Declare a language-defined function, making its signature
    /// resolvable before its body is compiled.
    pub fn declare(&self, decl: FunctionDecl) -> Result<()> {
        let mut defined = self.defined.borrow_mut();
        if defined.contains_key(&decl.name) {
            return Err(value_err!("Function {} already exists", decl.name));
        }
        let name = decl.name.clone();
        defined.insert(name, DefinedFunction { decl, callable: None });
        Ok(())
    }

    /// Attach the compiled callable to a previously declared function.
    pub fn install(&self, name: &str, callable: Arc<dyn CompiledFunction>) -> Result<()> {
        let mut defined = self.defined.borrow_mut();
        match defined.get_mut(name) {
            Some(function) => {
                function.callable = Some(callable);
                Ok(())
            }
            None => Err(value_err!("Function {} is not declared", name)),
        }
    }

    /// Drop a function declaration, e.g. when its body failed to compile.
    pub fn remove(&self, name: &str) {
        self.defined.borrow_mut().remove(name);
    }

    /// Resolve the callable for a declared function.
    pub fn callable(&self, name: &str) -> Result<Arc<dyn CompiledFunction>> {
        let defined = self.defined.borrow();
        let function =
            defined.get(name).ok_or_else(|| value_err!("Function {} does not exist", name))?;
        function
            .callable
            .clone()
            .ok_or_else(|| value_err!("Function {} is still being registered", name))
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        FunctionRegistry::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    impl CompiledFunction for Nop {
        fn call(&self, _args: &[Value]) -> Result<FunctionValue> {
            Ok(FunctionValue::Null)
        }
    }

    #[test]
    fn test_declare_install_resolve() -> Result<()> {
        let registry = FunctionRegistry::new();
        let decl = FunctionDecl {
            name: "f".to_string(),
            arg_types: vec![DataType::Integer],
            returns: ReturnType::Scalar(DataType::Integer),
        };
        registry.declare(decl.clone())?;
        // Declared but not installed: resolvable signature, no callable.
        assert!(registry.decl("f").is_some());
        assert!(registry.callable("f").is_err());

        registry.install("f", Arc::new(Nop))?;
        assert_eq!(registry.callable("f")?.call(&[])?, FunctionValue::Null);

        assert!(registry.declare(decl).is_err(), "duplicate declaration");
        registry.remove("f");
        assert!(registry.decl("f").is_none());
        Ok(())
    }

    #[test]
    fn test_builtin_lookup() {
        let registry = FunctionRegistry::new();
        assert!(registry.udf("upper").is_some());
        assert!(registry.udf("nope").is_none());
    }
}
