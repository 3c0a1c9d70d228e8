//! CQL statements for column families stored as compact tables
//!
//! A standard column family `cf` is the table
//! `cf (key blob, column1 blob, value blob, PRIMARY KEY (key, column1))`.
//! A super column family adds a `column2` clustering column holding the
//! sub-column name, with `column1` holding the super-column name.

use cassie_core::transport::{ColumnParent, ColumnPath, TransportError, TransportResult};

/// A value bound to a `?` marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundValue {
    Blob(Vec<u8>),
    BigInt(i64),
    Text(String),
}

/// Whether a column family holds plain columns or super-columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Standard,
    Super,
}

/// How the rows of a read are turned back into a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadShape {
    /// First row is the column
    Column,
    /// All rows are the sub-columns of this super-column
    SuperColumn { name: Vec<u8> },
}

/// Statement text plus its bound values, in marker order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CqlStatement {
    pub text: String,
    pub values: Vec<BoundValue>,
}

impl CqlStatement {
    fn new(text: String) -> Self {
        Self {
            text,
            values: Vec::new(),
        }
    }

    fn bind_blob(mut self, bytes: &[u8]) -> Self {
        self.values.push(BoundValue::Blob(bytes.to_vec()));
        self
    }

    fn bind_bigint(mut self, value: i64) -> Self {
        self.values.push(BoundValue::BigInt(value));
        self
    }
}

/// Double-quote an identifier, preserving case
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `"ks"."cf"`, or just `"cf"` when no keyspace is known
pub fn table_name(keyspace: Option<&str>, column_family: &str) -> String {
    match keyspace {
        Some(keyspace) => format!(
            "{}.{}",
            quote_identifier(keyspace),
            quote_identifier(column_family)
        ),
        None => quote_identifier(column_family),
    }
}

pub fn use_keyspace(keyspace: &str) -> String {
    format!("USE {}", quote_identifier(keyspace))
}

pub const SELECT_CLUSTER_NAME: &str = "SELECT cluster_name FROM system.local";

pub const SELECT_KEYSPACES: &str = "SELECT keyspace_name FROM system_schema.keyspaces";

pub const SELECT_TABLES: &str = "SELECT keyspace_name, table_name FROM system_schema.tables";

/// Column names of one table, used to tell standard from super column families
pub fn select_table_columns(keyspace: &str, column_family: &str) -> CqlStatement {
    CqlStatement {
        text: "SELECT column_name FROM system_schema.columns WHERE keyspace_name = ? AND table_name = ?"
            .to_string(),
        values: vec![
            BoundValue::Text(keyspace.to_string()),
            BoundValue::Text(column_family.to_string()),
        ],
    }
}

pub fn create_keyspace(keyspace: &str, replication_factor: u32) -> String {
    format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        quote_identifier(keyspace),
        replication_factor
    )
}

pub fn create_standard_table(keyspace: &str, column_family: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (key blob, column1 blob, value blob, PRIMARY KEY (key, column1))",
        table_name(Some(keyspace), column_family)
    )
}

pub fn create_super_table(keyspace: &str, column_family: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (key blob, column1 blob, column2 blob, value blob, PRIMARY KEY (key, column1, column2))",
        table_name(Some(keyspace), column_family)
    )
}

fn column_family(name: &str) -> TransportResult<&str> {
    if name.is_empty() {
        return Err(TransportError::invalid_request(
            "column_family may not be empty",
        ));
    }
    Ok(name)
}

/// Write one cell, at the column's own timestamp
pub fn insert(
    keyspace: Option<&str>,
    kind: TableKind,
    key: &[u8],
    parent: &ColumnParent,
    name: &[u8],
    value: &[u8],
    timestamp: i64,
) -> TransportResult<CqlStatement> {
    let table = table_name(keyspace, column_family(&parent.column_family)?);

    let statement = match (kind, &parent.super_column) {
        (TableKind::Standard, None) => CqlStatement::new(format!(
            "INSERT INTO {} (key, column1, value) VALUES (?, ?, ?) USING TIMESTAMP ?",
            table
        ))
        .bind_blob(key)
        .bind_blob(name),
        (TableKind::Standard, Some(_)) => {
            return Err(TransportError::invalid_request(format!(
                "supercolumn parameter is invalid for standard CF {}",
                parent.column_family
            )))
        }
        (TableKind::Super, Some(super_column)) if !super_column.is_empty() => {
            CqlStatement::new(format!(
                "INSERT INTO {} (key, column1, column2, value) VALUES (?, ?, ?, ?) USING TIMESTAMP ?",
                table
            ))
            .bind_blob(key)
            .bind_blob(super_column)
            .bind_blob(name)
        }
        (TableKind::Super, _) => {
            return Err(TransportError::invalid_request(format!(
                "missing or empty supercolumn name for super CF {}",
                parent.column_family
            )))
        }
    };

    Ok(statement.bind_blob(value).bind_bigint(timestamp))
}

/// Read a column, a sub-column, or a whole super-column
pub fn select(
    keyspace: Option<&str>,
    kind: TableKind,
    key: &[u8],
    path: &ColumnPath,
) -> TransportResult<(CqlStatement, ReadShape)> {
    let table = table_name(keyspace, column_family(&path.column_family)?);

    match (kind, &path.super_column, &path.column) {
        (TableKind::Standard, None, Some(column)) => Ok((
            CqlStatement::new(format!(
                "SELECT column1, value, WRITETIME(value) FROM {} WHERE key = ? AND column1 = ?",
                table
            ))
            .bind_blob(key)
            .bind_blob(column),
            ReadShape::Column,
        )),
        (TableKind::Standard, _, _) => Err(TransportError::invalid_request(format!(
            "column parameter is not optional for standard CF {}",
            path.column_family
        ))),
        (TableKind::Super, Some(super_column), Some(column)) => Ok((
            CqlStatement::new(format!(
                "SELECT column2, value, WRITETIME(value) FROM {} WHERE key = ? AND column1 = ? AND column2 = ?",
                table
            ))
            .bind_blob(key)
            .bind_blob(super_column)
            .bind_blob(column),
            ReadShape::Column,
        )),
        (TableKind::Super, Some(super_column), None) => Ok((
            CqlStatement::new(format!(
                "SELECT column2, value, WRITETIME(value) FROM {} WHERE key = ? AND column1 = ?",
                table
            ))
            .bind_blob(key)
            .bind_blob(super_column),
            ReadShape::SuperColumn {
                name: super_column.clone(),
            },
        )),
        (TableKind::Super, None, _) => Err(TransportError::invalid_request(format!(
            "supercolumn parameter is not optional for super CF {}",
            path.column_family
        ))),
    }
}

/// Delete everything under the path that is not newer than `timestamp`
pub fn delete(
    keyspace: Option<&str>,
    kind: TableKind,
    key: &[u8],
    path: &ColumnPath,
    timestamp: i64,
) -> TransportResult<CqlStatement> {
    let table = table_name(keyspace, column_family(&path.column_family)?);

    let clustering: Vec<&Vec<u8>> = match (kind, &path.super_column, &path.column) {
        (TableKind::Standard, Some(_), _) => {
            return Err(TransportError::invalid_request(format!(
                "supercolumn parameter is invalid for standard CF {}",
                path.column_family
            )))
        }
        (TableKind::Super, None, Some(_)) => {
            return Err(TransportError::invalid_request(format!(
                "column requires a supercolumn for super CF {}",
                path.column_family
            )))
        }
        (_, None, None) => Vec::new(),
        (TableKind::Standard, None, Some(column)) => vec![column],
        (TableKind::Super, Some(super_column), None) => vec![super_column],
        (TableKind::Super, Some(super_column), Some(column)) => vec![super_column, column],
    };

    let mut statement = CqlStatement::new(format!(
        "DELETE FROM {} USING TIMESTAMP ? WHERE key = ?",
        table
    ))
    .bind_bigint(timestamp)
    .bind_blob(key);

    for (index, name) in clustering.into_iter().enumerate() {
        statement.text.push_str(&format!(" AND column{} = ?", index + 1));
        statement = statement.bind_blob(name);
    }

    Ok(statement)
}

/// Super tables carry the sub-column name in `column2`
pub fn table_kind(column_names: &[String]) -> Option<TableKind> {
    if column_names.is_empty() {
        return None;
    }
    if column_names.iter().any(|name| name == "column2") {
        Some(TableKind::Super)
    } else {
        Some(TableKind::Standard)
    }
}
