use std::sync::Arc;

use crate::schema::Schema;

/// One structured extraction result: a value per schema field, in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperRecord {
    schema: Arc<Schema>,
    values: Vec<String>,
}

impl PaperRecord {
    /// Build a record from values in schema order.
    ///
    /// Short inputs are padded with `""` and long inputs truncated so the
    /// record always has exactly `schema.len()` values.
    pub fn from_values(schema: Arc<Schema>, mut values: Vec<String>) -> Self {
        values.resize(schema.len(), String::new());
        Self { schema, values }
    }

    /// Build a record from `(name, value)` pairs; undeclared names are ignored.
    pub fn from_pairs<'a>(
        schema: Arc<Schema>,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let mut values = vec![String::new(); schema.len()];
        for (name, value) in pairs {
            if let Some(i) = schema.position(name) {
                values[i] = value.to_string();
            }
        }
        Self { schema, values }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.schema.position(name).map(|i| self.values[i].as_str())
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// `(field name, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.schema
            .field_names()
            .zip(self.values.iter().map(String::as_str))
    }
}
