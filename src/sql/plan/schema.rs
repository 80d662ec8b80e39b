use std::collections::BTreeSet;
use std::fmt::Formatter;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::LazyLock;

use crate::catalog::column::ColumnRef;
use crate::catalog::r#type::DataType;
use crate::catalog::r#type::Value;
use crate::catalog::table::Table;
use crate::error::Error;
use crate::error::Result;
use crate::internal_err;
use crate::parse_err;

/// A logical named reference to a qualified field in a schema.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldReference {
    /// field/column name.
    pub name: String,
    /// relation/table reference as qualifier to specify the source of the
    /// field/column.
    pub relation: Option<TableReference>,
}

impl FieldReference {
    pub fn new(name: impl Into<String>, relation: Option<TableReference>) -> Self {
        Self { name: name.into(), relation }
    }

    pub fn new_unqualified(name: impl Into<String>) -> Self {
        Self { name: name.into(), relation: None }
    }
}

impl std::fmt::Display for FieldReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.relation {
            Some(relation) => write!(f, "{}.{}", relation, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// A name or alias used as a reference to a table.
#[derive(Clone, Debug, PartialOrd, PartialEq, Ord, Eq, Hash)]
pub struct TableReference(Arc<str>);

impl TableReference {
    pub fn new(table: &str) -> TableReference {
        TableReference(Arc::from(table))
    }
}

impl From<&str> for TableReference {
    fn from(s: &str) -> Self {
        TableReference::new(s)
    }
}

impl From<String> for TableReference {
    fn from(s: String) -> Self {
        TableReference(Arc::from(s))
    }
}

impl std::fmt::Display for TableReference {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A reference counted [`Field`]
pub type FieldRef = Arc<Field>;

/// Describes a single column in a [`LogicalSchema`].
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    pub name: String,
    pub datatype: DataType,
    pub nullable: bool,
    pub default: Option<Value>,
}

impl From<&ColumnRef> for Field {
    fn from(column: &ColumnRef) -> Self {
        Self {
            name: column.name.clone(),
            datatype: column.datatype.clone(),
            nullable: column.nullable,
            default: column.default.clone(),
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.name, self.datatype)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Fields(Arc<[FieldRef]>);

impl Fields {
    /// Returns a new empty [`Fields`]
    pub fn empty() -> Self {
        Self(Arc::new([]))
    }

    pub fn find(&self, name: &str) -> Option<(usize, &FieldRef)> {
        self.0.iter().enumerate().find(|(_, c)| c.name == name)
    }
}

impl FromIterator<Field> for Fields {
    fn from_iter<T: IntoIterator<Item = Field>>(iter: T) -> Self {
        iter.into_iter().map(Arc::new).collect()
    }
}

impl FromIterator<FieldRef> for Fields {
    fn from_iter<T: IntoIterator<Item = FieldRef>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<Vec<Field>> for Fields {
    fn from(value: Vec<Field>) -> Self {
        value.into_iter().collect()
    }
}

impl From<Vec<FieldRef>> for Fields {
    fn from(value: Vec<FieldRef>) -> Self {
        value.into_iter().collect()
    }
}

impl Deref for Fields {
    type Target = [FieldRef];

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

/// Builder for creating [`Field`] instances with a fluent interface
pub struct FieldBuilder {
    name: String,
    datatype: DataType,
    nullable: bool,
    default: Option<Value>,
}

impl FieldBuilder {
    /// Create a new field builder with the required name and data type
    pub fn new(name: impl Into<String>, datatype: DataType) -> Self {
        Self { name: name.into(), datatype, nullable: true, default: None }
    }

    /// Set whether this field is nullable
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Mark this field as not nullable
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set the default value for this field
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Build the field
    pub fn build(self) -> Field {
        Field {
            name: self.name,
            datatype: self.datatype,
            nullable: self.nullable,
            default: self.default,
        }
    }
}

/// An empty logical schema, for plan nodes that produce no rows.
pub static EMPTY_SCHEMA: LazyLock<LogicalSchema> = LazyLock::new(LogicalSchema::empty);

/// Logical schema at planner where each field have an optional table reference,
/// typically the table name or table alias, to tracks which table/relation each
/// field belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct LogicalSchema {
    /// A sequence of fields that describe the schema.
    fields: Fields,
    /// Optional qualifiers for each column in this schema to specify the source
    /// of each column. In the same order as the `fields`
    qualifiers: Vec<Option<TableReference>>,
}

impl LogicalSchema {
    pub fn empty() -> Self {
        Self { fields: Fields::empty(), qualifiers: vec![] }
    }

    pub fn new(fields: Fields, qualifiers: Vec<Option<TableReference>>) -> Result<Self> {
        if fields.len() != qualifiers.len() {
            return Err(Error::internal("Invalid fields and qualifiers size"));
        }
        let schema = LogicalSchema { fields, qualifiers };
        schema.check_names()?;
        Ok(schema)
    }

    pub fn from_unqualified_fields(fields: Fields) -> Result<Self> {
        let sz = fields.len();
        let schema = LogicalSchema { fields, qualifiers: vec![None; sz] };
        schema.check_names()?;
        Ok(schema)
    }

    /// Re-qualify every field of this schema with the given alias.
    pub fn with_qualifier(&self, alias: &TableReference) -> Self {
        let sz = self.fields.len();
        Self { fields: self.fields.clone(), qualifiers: vec![Some(alias.clone()); sz] }
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn field(&self, index: usize) -> &FieldRef {
        &self.fields[index]
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_by_ref(&self, field: &FieldReference) -> Result<FieldRef> {
        let relation = &field.relation;
        if let Some(idx) = self.field_index_by_name(relation, &field.name) {
            return Ok(self.fields[idx].clone());
        }
        Err(parse_err!("Column {} not found", field))
    }

    pub fn field_reference(&self, index: usize) -> FieldReference {
        FieldReference::new(self.fields[index].name.clone(), self.qualifiers[index].clone())
    }

    /// Searches for a column by name, returning it along with its table
    /// reference if found
    pub fn find(&self, name: &str) -> Option<(Option<TableReference>, &FieldRef)> {
        if let Some((i, f)) = self.fields.find(name) {
            let q = self.qualifiers[i].clone();
            return Some((q, f));
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = (Option<&TableReference>, &FieldRef)> {
        self.fields.iter().zip(self.qualifiers.iter()).map(|(f, q)| (q.as_ref(), f))
    }

    pub fn field_index_by_name(
        &self,
        qualifier: &Option<TableReference>,
        name: &str,
    ) -> Option<usize> {
        let mut matches = self
            .iter()
            .enumerate()
            .filter(|(_, (q, f))| {
                match (&qualifier, q) {
                    // The given qualifier and current checking column qualifier are both qualified,
                    // compare both qualifier and the column name.
                    (Some(q), Some(t)) => q.eq(t) && f.name == name,
                    // The given qualifier is qualified but the current checking column qualifier
                    // is not qualified, consider it as a false.
                    (Some(_), None) => false,
                    // The given qualifier is not qualified, compare the column name only.
                    (None, Some(_)) | (None, None) => f.name == name,
                }
            })
            .map(|(idx, _)| idx);
        matches.next()
    }

    /// Check whether another schema has the same arity and per-position
    /// datatypes, e.g. to pair the two sides of a set operation.
    pub fn check_compatible(&self, other: &LogicalSchema) -> Result<()> {
        if self.len() != other.len() {
            return Err(internal_err!(
                "Schemas have different field counts, {} vs {}",
                self.len(),
                other.len()
            ));
        }
        for i in 0..self.len() {
            let a = &self.field(i).datatype;
            let b = &other.field(i).datatype;
            if a != b && !b.can_convert_implicit(a) && !a.can_convert_implicit(b) {
                return Err(internal_err!(
                    "Incompatible field type at {}, expect {}, got {}",
                    i,
                    a,
                    b
                ));
            }
        }
        Ok(())
    }

    fn check_names(&self) -> Result<()> {
        let mut qualified_names = BTreeSet::new();
        let mut unqualified_names = BTreeSet::new();
        for (c, q) in self.fields.iter().zip(&self.qualifiers) {
            if let Some(q) = q {
                if !qualified_names.insert((q, &c.name)) {
                    return Err(parse_err!(
                        "Invalid schema, duplicate qualified column {}.{}",
                        q,
                        &c.name
                    ));
                }
                continue;
            }
            if !unqualified_names.insert(&c.name) {
                return Err(parse_err!("Invalid schema, duplicate unqualified column {}", &c.name));
            }
        }
        for (q, name) in qualified_names {
            if unqualified_names.contains(name) {
                return Err(parse_err!("Invalid schema, ambiguous reference {}.{}", q, name));
            }
        }
        Ok(())
    }
}

impl From<Table> for LogicalSchema {
    fn from(table: Table) -> Self {
        let sz = table.columns.len();
        let fields = table.columns.iter().map(Field::from).collect::<Vec<_>>().into();
        let relation = TableReference::new(&table.name);
        Self { fields, qualifiers: vec![Some(relation); sz] }
    }
}

impl std::fmt::Display for LogicalSchema {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, (q, field)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if let Some(q) = q {
                write!(f, "{}.", q)?;
            }
            write!(f, "{}", field)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(names: &[(&str, DataType)]) -> LogicalSchema {
        let fields = names
            .iter()
            .map(|(name, dt)| FieldBuilder::new(*name, dt.clone()).build())
            .collect::<Vec<_>>();
        LogicalSchema::from_unqualified_fields(fields.into()).unwrap()
    }

    #[test]
    fn test_field_lookup() {
        let s = schema(&[("a", DataType::Integer), ("b", DataType::String)]);
        assert_eq!(s.field_index_by_name(&None, "b"), Some(1));
        assert_eq!(s.field_index_by_name(&None, "c"), None);
        assert_eq!(
            s.field_index_by_name(&Some(TableReference::new("t")), "a"),
            None,
            "unqualified fields do not match a qualified lookup"
        );
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let fields: Fields = vec![
            FieldBuilder::new("a", DataType::Integer).build(),
            FieldBuilder::new("a", DataType::Integer).build(),
        ]
        .into();
        assert!(LogicalSchema::from_unqualified_fields(fields).is_err());
    }

    #[test]
    fn test_check_compatible() {
        let a = schema(&[("a", DataType::Integer), ("b", DataType::String)]);
        let b = schema(&[("x", DataType::Float), ("y", DataType::String)]);
        // Integer converts to Float implicitly, names are irrelevant.
        assert!(a.check_compatible(&b).is_ok());

        let c = schema(&[("x", DataType::String)]);
        assert!(a.check_compatible(&c).is_err());
    }
}
