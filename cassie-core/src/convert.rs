//! Conversion between cassie values and transport records
//!
//! Inbound conversions from borrowed records always copy: transport buffers
//! are only valid for the duration of the call that produced them.

use crate::blob::{Blob, BlobRef};
use crate::column::{Column, SuperColumn};
use crate::error::{CassieError, CassieResult};
use crate::transport::{
    ColumnOrSuperColumn, ColumnParent, ColumnPath, WireColumn, WireSuperColumn,
};

impl Column {
    /// Copy a transport column into an owned column
    pub fn from_wire(record: &WireColumn) -> Self {
        Self {
            name: Blob::copy_from(&record.name),
            value: Blob::copy_from(&record.value),
            timestamp: record.timestamp,
        }
    }

    /// Build the outbound record; the column stays with the caller
    pub fn to_wire(&self) -> WireColumn {
        WireColumn {
            name: self.name.as_bytes().to_vec(),
            value: self.value.as_bytes().to_vec(),
            timestamp: self.timestamp,
        }
    }
}

impl From<WireColumn> for Column {
    fn from(record: WireColumn) -> Self {
        Self {
            name: Blob::new(record.name),
            value: Blob::new(record.value),
            timestamp: record.timestamp,
        }
    }
}

impl From<Column> for WireColumn {
    fn from(column: Column) -> Self {
        let (name, value, timestamp) = column.into_parts();
        WireColumn {
            name: name.into_vec(),
            value: value.into_vec(),
            timestamp,
        }
    }
}

impl SuperColumn {
    /// Copy a transport super-column, and every column in it
    pub fn from_wire(record: &WireSuperColumn) -> Self {
        Self {
            name: Blob::copy_from(&record.name),
            columns: columns_from_wire(&record.columns),
        }
    }

    pub fn to_wire(&self) -> WireSuperColumn {
        WireSuperColumn {
            name: self.name.as_bytes().to_vec(),
            columns: self.columns.iter().map(Column::to_wire).collect(),
        }
    }
}

impl From<WireSuperColumn> for SuperColumn {
    fn from(record: WireSuperColumn) -> Self {
        Self {
            name: Blob::new(record.name),
            columns: record.columns.into_iter().map(Column::from).collect(),
        }
    }
}

pub fn columns_from_wire(records: &[WireColumn]) -> Vec<Column> {
    records.iter().map(Column::from_wire).collect()
}

pub fn super_columns_from_wire(records: &[WireSuperColumn]) -> Vec<SuperColumn> {
    records.iter().map(SuperColumn::from_wire).collect()
}

/// Write target for `column_family`, optionally inside `super_column`
pub fn column_parent(column_family: &str, super_column: Option<BlobRef<'_>>) -> ColumnParent {
    ColumnParent {
        column_family: column_family.to_string(),
        super_column: super_column.map(|name| name.as_bytes().to_vec()),
    }
}

/// Read/delete target; absent parts stay `None`, empty parts stay `Some(empty)`
pub fn column_path(
    column_family: &str,
    super_column: Option<BlobRef<'_>>,
    column: Option<BlobRef<'_>>,
) -> ColumnPath {
    ColumnPath {
        column_family: column_family.to_string(),
        super_column: super_column.map(|name| name.as_bytes().to_vec()),
        column: column.map(|name| name.as_bytes().to_vec()),
    }
}

/// Extract the column from a point-read response
pub fn expect_column(response: ColumnOrSuperColumn) -> CassieResult<Column> {
    match response.column {
        Some(record) => Ok(Column::from(record)),
        None => Err(CassieError::other(
            "UnexpectedResponse",
            "expected a column, got a super-column or nothing",
        )),
    }
}

/// Extract the super-column from a point-read response
pub fn expect_super_column(response: ColumnOrSuperColumn) -> CassieResult<SuperColumn> {
    match response.super_column {
        Some(record) => Ok(SuperColumn::from(record)),
        None => Err(CassieError::other(
            "UnexpectedResponse",
            "expected a super-column, got a column or nothing",
        )),
    }
}
