//! Column and super-column value types

use crate::blob::{Blob, BlobRef};

/// A named, timestamped value within a row
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    pub name: Blob,
    pub value: Blob,
    /// Write timestamp, microseconds by convention
    pub timestamp: i64,
}

impl Column {
    /// Create a column, taking ownership of `name` and `value`
    pub fn new(name: impl Into<Blob>, value: impl Into<Blob>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            timestamp,
        }
    }

    pub fn name(&self) -> &Blob {
        &self.name
    }

    pub fn value(&self) -> &Blob {
        &self.value
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Check whether this column's name equals `name`, byte for byte
    pub fn has_name<'a>(&self, name: impl Into<BlobRef<'a>>) -> bool {
        let name: BlobRef<'_> = name.into();
        self.name == name
    }

    /// Split the column into its owned parts
    pub fn into_parts(self) -> (Blob, Blob, i64) {
        (self.name, self.value, self.timestamp)
    }
}

/// A named grouping of columns within a row
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SuperColumn {
    pub name: Blob,
    pub columns: Vec<Column>,
}

impl SuperColumn {
    pub fn new(name: impl Into<Blob>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    pub fn with_columns(name: impl Into<Blob>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    pub fn name(&self) -> &Blob {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn push(&mut self, column: Column) {
        self.columns.push(column);
    }

    /// Find a sub-column by name
    pub fn find<'a>(&self, name: impl Into<BlobRef<'a>>) -> Option<&Column> {
        let name: BlobRef<'_> = name.into();
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn into_columns(self) -> Vec<Column> {
        self.columns
    }
}

impl IntoIterator for SuperColumn {
    type Item = Column;
    type IntoIter = std::vec::IntoIter<Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

impl<'a> IntoIterator for &'a SuperColumn {
    type Item = &'a Column;
    type IntoIter = std::slice::Iter<'a, Column>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.iter()
    }
}
