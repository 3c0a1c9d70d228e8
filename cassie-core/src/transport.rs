//! Transport client interface
//!
//! The transport owns the physical connection and the wire encoding. cassie
//! only talks to it through [`Transport`] and the record types below, which
//! mirror the store's own column, super-column and path structures.

use std::time::Duration;
use thiserror::Error;

use crate::consistency::ConsistencyLevel;

/// A column as the transport sends and receives it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireColumn {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
    pub timestamp: i64,
}

/// A super-column as the transport sends and receives it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireSuperColumn {
    pub name: Vec<u8>,
    pub columns: Vec<WireColumn>,
}

/// Result of a point read: exactly one of the two fields is set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnOrSuperColumn {
    pub column: Option<WireColumn>,
    pub super_column: Option<WireSuperColumn>,
}

impl ColumnOrSuperColumn {
    pub fn from_column(column: WireColumn) -> Self {
        Self {
            column: Some(column),
            super_column: None,
        }
    }

    pub fn from_super_column(super_column: WireSuperColumn) -> Self {
        Self {
            column: None,
            super_column: Some(super_column),
        }
    }
}

/// Target of a write: a column family and, for super column families, the
/// super-column the new column lands in
///
/// `None` means "not provided"; `Some(vec![])` is a provided, empty name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnParent {
    pub column_family: String,
    pub super_column: Option<Vec<u8>>,
}

/// Target of a read or delete
///
/// The optional parts keep the distinction between "not provided" and
/// "provided as empty": deleting with no super-column and no column drops the
/// whole row, with only a super-column drops that super-column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnPath {
    pub column_family: String,
    pub super_column: Option<Vec<u8>>,
    pub column: Option<Vec<u8>>,
}

/// Keyspace as reported by the cluster
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyspaceDefinition {
    pub name: String,
    pub column_families: Vec<String>,
}

impl KeyspaceDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Failures raised by a transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The store rejected the request
    #[error("InvalidRequestException: {why}")]
    InvalidRequest { why: String },

    /// The requested column or super-column does not exist
    #[error("NotFoundException")]
    NotFound,

    /// Connection, framing or I/O failure
    #[error("TTransportException: {message}")]
    Transport { message: String },

    /// Anything else, tagged with the originating error's kind
    #[error("{kind}: {message}")]
    Other { kind: String, message: String },
}

impl TransportError {
    pub fn invalid_request<S: Into<String>>(why: S) -> Self {
        Self::InvalidRequest { why: why.into() }
    }

    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    pub fn other<K: Into<String>, S: Into<String>>(kind: K, message: S) -> Self {
        Self::Other {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// One connected client. Calls block until the round trip completes.
///
/// A `keyspace` of `None` targets the keyspace selected by the last
/// [`Transport::set_keyspace`].
pub trait Transport: Send {
    fn set_keyspace(&mut self, keyspace: &str) -> TransportResult<()>;

    fn cluster_name(&mut self) -> TransportResult<String>;

    fn keyspaces(&mut self) -> TransportResult<Vec<KeyspaceDefinition>>;

    fn insert(
        &mut self,
        keyspace: Option<&str>,
        key: &[u8],
        parent: &ColumnParent,
        column: &WireColumn,
        consistency: ConsistencyLevel,
    ) -> TransportResult<()>;

    /// Point read; raises [`TransportError::NotFound`] on a miss
    fn get(
        &mut self,
        keyspace: Option<&str>,
        key: &[u8],
        path: &ColumnPath,
        consistency: ConsistencyLevel,
    ) -> TransportResult<ColumnOrSuperColumn>;

    fn remove(
        &mut self,
        keyspace: Option<&str>,
        key: &[u8],
        path: &ColumnPath,
        timestamp: i64,
        consistency: ConsistencyLevel,
    ) -> TransportResult<()>;

    /// `None` waits forever
    fn set_recv_timeout(&mut self, timeout: Option<Duration>);

    /// `None` waits forever
    fn set_send_timeout(&mut self, timeout: Option<Duration>);

    /// Tear down the connection
    fn close(&mut self) {}
}

/// Produces connected transports
pub trait Connector {
    type Transport: Transport + 'static;

    /// Connect and handshake with `host:port`; `None` waits forever
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> TransportResult<Self::Transport>;
}

impl<C: Connector + ?Sized> Connector for &C {
    type Transport = C::Transport;

    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> TransportResult<Self::Transport> {
        (**self).connect(host, port, timeout)
    }
}
