//! Table, field, and grouping descriptors consumed by the index core.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use crate::expr::Expr;

/// A named expression: one output column of a table.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    expr: Arc<dyn Expr>,
}

impl Field {
    /// Creates a new field.
    pub fn new(name: impl Into<String>, expr: Arc<dyn Expr>) -> Self {
        Self {
            name: name.into(),
            expr,
        }
    }

    /// Name of this field.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Expression evaluated for this field.
    pub fn expr(&self) -> &Arc<dyn Expr> {
        &self.expr
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?})", self.name, self.expr)
    }
}

/// Ordered list of fields.
#[derive(Debug, Clone, Default)]
pub struct Fields(Vec<Field>);

impl Fields {
    /// Wraps an ordered field list.
    pub fn new(fields: Vec<Field>) -> Self {
        Self(fields)
    }

    /// Names of all fields, in order.
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(Field::name).collect()
    }
}

impl Deref for Fields {
    type Target = [Field];

    fn deref(&self) -> &[Field] {
        &self.0
    }
}

impl From<Vec<Field>> for Fields {
    fn from(fields: Vec<Field>) -> Self {
        Self(fields)
    }
}

/// A grouped dimension advertised through pipeline metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBy {
    name: String,
}

impl GroupBy {
    /// Creates a grouped-dimension descriptor.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Name of the grouped dimension.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Descriptor for one table: an ordered field list at a fixed resolution.
///
/// A table is stable for the duration of a single tree update; field lists
/// may grow between calls (nodes lazily grow their slot vectors to match).
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    fields: Fields,
    resolution: Duration,
}

impl Table {
    /// Creates a new table descriptor.
    pub fn new(name: impl Into<String>, fields: Fields, resolution: Duration) -> Self {
        Self {
            name: name.into(),
            fields,
            resolution,
        }
    }

    /// Name of this table.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ordered fields of this table.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Duration of one output period.
    pub fn resolution(&self) -> Duration {
        self.resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{count, sum};

    #[test]
    fn test_field_names() {
        let fields = Fields::new(vec![
            Field::new("hits", sum("hits")),
            Field::new("uniques", count("user")),
        ]);
        assert_eq!(fields.names(), vec!["hits", "uniques"]);
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_field_display() {
        let field = Field::new("hits", sum("hits"));
        let rendered = field.to_string();
        assert!(rendered.starts_with("hits ("));
    }
}
