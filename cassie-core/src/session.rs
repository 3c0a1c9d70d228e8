//! Sessions and the operations issued through them
//!
//! A [`Session`] owns one transport connection. Every operation is a single
//! blocking round trip; its outcome is returned directly and also recorded on
//! the session, so [`Session::last_error_code`] always describes the most
//! recent call. A miss on a read is `Ok(None)`, not an error.

use std::fmt;
use std::io::{self, Write};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::blob::BlobRef;
use crate::column::{Column, SuperColumn};
use crate::config::ClientConfig;
use crate::consistency::ConsistencyLevel;
use crate::convert::{column_parent, column_path, expect_column, expect_super_column};
use crate::error::{CassieError, CassieResult, ErrorCode, ErrorState};
use crate::transport::{ColumnOrSuperColumn, ColumnPath, Connector, Transport, TransportError};

/// Cluster name and keyspace names, as reported by the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterDescription {
    pub cluster_name: String,
    pub keyspaces: Vec<String>,
}

impl fmt::Display for ClusterDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "\tcluster name: {}", self.cluster_name)?;
        for keyspace in &self.keyspaces {
            writeln!(f, "\tkeyspace: {}", keyspace)?;
        }
        Ok(())
    }
}

/// A connected client session
///
/// Operations take `&mut self`: a session carries one request at a time.
/// Share work across threads by giving each worker its own session.
pub struct Session {
    host: String,
    port: u16,
    transport: Box<dyn Transport>,
    keyspace: Option<String>,
    errors: ErrorState,
}

impl Session {
    /// Connect to `host:port`; `None` waits forever for the handshake
    ///
    /// No session exists unless the connection succeeded.
    pub fn connect<C: Connector>(
        connector: &C,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> CassieResult<Self> {
        info!("Connecting to {}:{} (timeout: {:?})", host, port, timeout);

        let transport = connector.connect(host, port, timeout).map_err(|e| {
            warn!("Failed to connect to {}:{}: {}", host, port, e);
            CassieError::from(e)
        })?;

        info!("Session established with {}:{}", host, port);
        Ok(Self::with_transport(host, port, transport))
    }

    /// Same as [`Session::connect`], with the host given as raw bytes
    pub fn connect_blob<C: Connector>(
        connector: &C,
        host: BlobRef<'_>,
        port: u16,
        timeout: Option<Duration>,
    ) -> CassieResult<Self> {
        let host = host
            .to_utf8()
            .map_err(|e| CassieError::other("Utf8Error", format!("host is not UTF-8: {}", e)))?;
        Self::connect(connector, host, port, timeout)
    }

    /// Connect with `config`, apply its timeouts and select its keyspace
    pub fn from_config<C: Connector>(connector: &C, config: &ClientConfig) -> CassieResult<Self> {
        let mut session = Self::connect(
            connector,
            &config.host,
            config.port,
            config.connect_timeout(),
        )?;

        session.set_recv_timeout(config.recv_timeout());
        session.set_send_timeout(config.send_timeout());

        if let Some(keyspace) = &config.keyspace {
            session.set_keyspace(keyspace)?;
        }

        Ok(session)
    }

    /// Wrap an already connected transport
    pub fn with_transport<T: Transport + 'static>(host: &str, port: u16, transport: T) -> Self {
        Self {
            host: host.to_string(),
            port,
            transport: Box::new(transport),
            keyspace: None,
            errors: ErrorState::default(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Keyspace selected by the last successful [`Session::set_keyspace`]
    pub fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }

    /// The error recorded by the last operation, if it failed
    pub fn last_error(&self) -> Option<&CassieError> {
        self.errors.error()
    }

    pub fn last_error_code(&self) -> ErrorCode {
        self.errors.code()
    }

    pub fn last_error_message(&self) -> Option<String> {
        self.errors.message()
    }

    /// Select the keyspace later calls without an explicit keyspace use
    pub fn set_keyspace(&mut self, keyspace: &str) -> CassieResult<()> {
        debug!("Setting keyspace: {}", keyspace);

        let result = self
            .transport
            .set_keyspace(keyspace)
            .map_err(CassieError::from);
        if result.is_ok() {
            self.keyspace = Some(keyspace.to_string());
        }
        self.finish("set_keyspace", result)
    }

    /// Same as [`Session::set_keyspace`], with the name given as raw bytes
    pub fn set_keyspace_blob(&mut self, keyspace: BlobRef<'_>) -> CassieResult<()> {
        match keyspace.to_utf8() {
            Ok(name) => self.set_keyspace(name),
            Err(e) => {
                let result = Err(CassieError::other(
                    "Utf8Error",
                    format!("keyspace is not UTF-8: {}", e),
                ));
                self.finish("set_keyspace", result)
            }
        }
    }

    /// Write `column` into row `key` of a standard column family
    ///
    /// The column is only borrowed; the caller still owns it afterwards.
    pub fn insert(
        &mut self,
        keyspace: &str,
        column_family: &str,
        key: impl AsRef<[u8]>,
        column: &Column,
        consistency: ConsistencyLevel,
    ) -> CassieResult<()> {
        self.insert_into(keyspace, column_family, key.as_ref(), None, column, consistency)
    }

    /// Write `column` into `super_column` of row `key` of a super column family
    pub fn insert_super<'n>(
        &mut self,
        keyspace: &str,
        column_family: &str,
        key: impl AsRef<[u8]>,
        super_column: impl Into<BlobRef<'n>>,
        column: &Column,
        consistency: ConsistencyLevel,
    ) -> CassieResult<()> {
        self.insert_into(
            keyspace,
            column_family,
            key.as_ref(),
            Some(super_column.into()),
            column,
            consistency,
        )
    }

    fn insert_into(
        &mut self,
        keyspace: &str,
        column_family: &str,
        key: &[u8],
        super_column: Option<BlobRef<'_>>,
        column: &Column,
        consistency: ConsistencyLevel,
    ) -> CassieResult<()> {
        let parent = column_parent(column_family, super_column);
        let record = column.to_wire();

        debug!(
            "Inserting column: keyspace={}, column_family={}, key_len={}, name_len={}, value_len={}, consistency={}",
            keyspace,
            column_family,
            key.len(),
            record.name.len(),
            record.value.len(),
            consistency
        );

        let result = self
            .transport
            .insert(Some(keyspace), key, &parent, &record, consistency)
            .map_err(CassieError::from);
        self.finish("insert", result)
    }

    /// Read one column of a standard column family
    ///
    /// Returns `Ok(None)` when the column does not exist.
    pub fn get<'n>(
        &mut self,
        keyspace: &str,
        column_family: &str,
        key: impl AsRef<[u8]>,
        name: impl Into<BlobRef<'n>>,
        consistency: ConsistencyLevel,
    ) -> CassieResult<Option<Column>> {
        let path = column_path(column_family, None, Some(name.into()));
        let result = self
            .read(keyspace, key.as_ref(), &path, consistency)
            .and_then(|response| response.map(expect_column).transpose());
        self.finish("get", result)
    }

    /// Read one column inside a super-column
    pub fn get_in_super<'n>(
        &mut self,
        keyspace: &str,
        column_family: &str,
        key: impl AsRef<[u8]>,
        super_column: impl Into<BlobRef<'n>>,
        name: impl Into<BlobRef<'n>>,
        consistency: ConsistencyLevel,
    ) -> CassieResult<Option<Column>> {
        let path = column_path(
            column_family,
            Some(super_column.into()),
            Some(name.into()),
        );
        let result = self
            .read(keyspace, key.as_ref(), &path, consistency)
            .and_then(|response| response.map(expect_column).transpose());
        self.finish("get_in_super", result)
    }

    /// Read a whole super-column with all of its columns
    pub fn get_super_column<'n>(
        &mut self,
        keyspace: &str,
        column_family: &str,
        key: impl AsRef<[u8]>,
        super_column: impl Into<BlobRef<'n>>,
        consistency: ConsistencyLevel,
    ) -> CassieResult<Option<SuperColumn>> {
        let path = column_path(column_family, Some(super_column.into()), None);
        let result = self
            .read(keyspace, key.as_ref(), &path, consistency)
            .and_then(|response| response.map(expect_super_column).transpose());
        self.finish("get_super_column", result)
    }

    fn read(
        &mut self,
        keyspace: &str,
        key: &[u8],
        path: &ColumnPath,
        consistency: ConsistencyLevel,
    ) -> CassieResult<Option<ColumnOrSuperColumn>> {
        debug!(
            "Reading: keyspace={}, column_family={}, key_len={}, super_column={}, column={}, consistency={}",
            keyspace,
            path.column_family,
            key.len(),
            path.super_column.is_some(),
            path.column.is_some(),
            consistency
        );

        match self.transport.get(Some(keyspace), key, path, consistency) {
            Ok(response) => Ok(Some(response)),
            Err(TransportError::NotFound) => {
                debug!("Column not found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Delete from row `key` in the current keyspace
    ///
    /// With neither name set the whole row goes; with only `super_column` the
    /// whole super-column goes. An empty name is still a name.
    pub fn remove(
        &mut self,
        column_family: &str,
        key: impl AsRef<[u8]>,
        super_column: Option<BlobRef<'_>>,
        column: Option<BlobRef<'_>>,
        consistency: ConsistencyLevel,
    ) -> CassieResult<()> {
        let key = key.as_ref();
        let path = column_path(column_family, super_column, column);
        let timestamp = now_micros();

        debug!(
            "Removing: column_family={}, key_len={}, super_column={}, column={}, timestamp={}, consistency={}",
            column_family,
            key.len(),
            path.super_column.is_some(),
            path.column.is_some(),
            timestamp,
            consistency
        );

        let result = self
            .transport
            .remove(None, key, &path, timestamp, consistency)
            .map_err(CassieError::from);
        self.finish("remove", result)
    }

    /// Fetch the cluster name and the names of its keyspaces
    pub fn describe(&mut self) -> CassieResult<ClusterDescription> {
        let result = self.fetch_description();
        self.finish("describe", result)
    }

    fn fetch_description(&mut self) -> CassieResult<ClusterDescription> {
        let cluster_name = self.transport.cluster_name()?;
        let keyspaces = self
            .transport
            .keyspaces()?
            .iter()
            .map(|definition| definition.name().to_string())
            .collect();

        Ok(ClusterDescription {
            cluster_name,
            keyspaces,
        })
    }

    /// Write the cluster description to `out`; a failure is written too
    pub fn print_debug<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        match self.describe() {
            Ok(description) => write!(out, "{}", description),
            Err(e) => writeln!(out, "Exception caught: {}", e),
        }
    }

    /// Applies from the next call; `None` waits forever
    pub fn set_recv_timeout(&mut self, timeout: Option<Duration>) {
        debug!("Setting receive timeout: {:?}", timeout);
        self.transport.set_recv_timeout(timeout);
    }

    /// Applies from the next call; `None` waits forever
    pub fn set_send_timeout(&mut self, timeout: Option<Duration>) {
        debug!("Setting send timeout: {:?}", timeout);
        self.transport.set_send_timeout(timeout);
    }

    /// Close the connection
    pub fn close(self) {
        drop(self);
    }

    fn finish<T>(&mut self, operation: &str, result: CassieResult<T>) -> CassieResult<T> {
        self.errors.record(&result);
        if let Err(e) = &result {
            warn!("{} failed ({}): {}", operation, e.code(), e);
        }
        result
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        info!("Closing session to {}:{}", self.host, self.port);
        self.transport.close();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("keyspace", &self.keyspace)
            .field("last_error", &self.errors.error())
            .finish()
    }
}

/// Current time in microseconds since the epoch
pub fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_micros()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
