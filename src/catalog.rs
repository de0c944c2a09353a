//! In-memory table schema definitions.
//!
//! The catalog proper (table registry, name resolution) lives in the layer
//! above the storage engine; this module only carries the ordered column
//! list that drives tuple deserialization.

use crate::access::value::DataType;

/// A single column: name plus declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }
}

/// Ordered list of columns for one table.
///
/// Column order is significant: tuples are serialized and deserialized in
/// schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name() == name)
    }

    pub fn column_type(&self, name: &str) -> Option<DataType> {
        self.columns
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.data_type())
    }

    /// Column types in schema order, used to drive the value codec.
    pub fn data_types(&self) -> Vec<DataType> {
        self.columns.iter().map(|c| c.data_type()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", DataType::Int32),
            Column::new("name", DataType::Varchar),
            Column::new("active", DataType::Boolean),
        ])
    }

    #[test]
    fn test_column_lookup() {
        let schema = sample_schema();
        assert_eq!(schema.column_count(), 3);
        assert_eq!(schema.column_index("name"), Some(1));
        assert_eq!(schema.column_index("missing"), None);
        assert_eq!(schema.column_type("active"), Some(DataType::Boolean));
        assert_eq!(schema.column_type("missing"), None);
    }

    #[test]
    fn test_data_types_preserve_order() {
        let schema = sample_schema();
        assert_eq!(
            schema.data_types(),
            vec![DataType::Int32, DataType::Varchar, DataType::Boolean]
        );
    }
}
