//! In-memory transport for unit testing
//!
//! [`MockCluster`] keeps keyspaces, column families and rows in memory and
//! records every call its transports receive, so tests can assert on exactly
//! what went out. Connection loss and arbitrary failures can be injected.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::consistency::ConsistencyLevel;
use crate::transport::{
    ColumnOrSuperColumn, ColumnParent, ColumnPath, Connector, KeyspaceDefinition, Transport,
    TransportError, TransportResult, WireColumn, WireSuperColumn,
};

/// Layout of a column family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnFamilyKind {
    Standard,
    Super,
}

/// One call as received by a mock transport
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    SetKeyspace {
        keyspace: String,
    },
    ClusterName,
    Keyspaces,
    Insert {
        keyspace: Option<String>,
        key: Vec<u8>,
        parent: ColumnParent,
        column: WireColumn,
        consistency: ConsistencyLevel,
    },
    Get {
        keyspace: Option<String>,
        key: Vec<u8>,
        path: ColumnPath,
        consistency: ConsistencyLevel,
    },
    Remove {
        keyspace: Option<String>,
        key: Vec<u8>,
        path: ColumnPath,
        timestamp: i64,
        consistency: ConsistencyLevel,
    },
    SetRecvTimeout(Option<Duration>),
    SetSendTimeout(Option<Duration>),
    Close,
}

/// Cells of a row, keyed by (super-column name, column name). Standard
/// column families use an empty super-column name.
type Row = BTreeMap<(Vec<u8>, Vec<u8>), WireColumn>;

#[derive(Debug)]
struct MockColumnFamily {
    kind: ColumnFamilyKind,
    rows: BTreeMap<Vec<u8>, Row>,
}

#[derive(Debug)]
struct MockState {
    cluster_name: String,
    keyspaces: BTreeMap<String, BTreeMap<String, MockColumnFamily>>,
    calls: Vec<RecordedCall>,
    reachable: bool,
    connected: bool,
    pending_failure: Option<TransportError>,
    open_connections: usize,
}

/// Shared in-memory cluster; every transport it hands out sees the same data
#[derive(Debug, Clone)]
pub struct MockCluster {
    state: Arc<Mutex<MockState>>,
}

impl MockCluster {
    /// Create an empty cluster with a `system` keyspace
    pub fn new(cluster_name: &str) -> Self {
        info!("Creating a mock cluster for testing: {}", cluster_name);

        let mut keyspaces = BTreeMap::new();
        keyspaces.insert("system".to_string(), BTreeMap::new());

        Self {
            state: Arc::new(Mutex::new(MockState {
                cluster_name: cluster_name.to_string(),
                keyspaces,
                calls: Vec::new(),
                reachable: true,
                connected: true,
                pending_failure: None,
                open_connections: 0,
            })),
        }
    }

    /// Add a keyspace with the given column families
    pub fn with_keyspace(self, name: &str, column_families: &[(&str, ColumnFamilyKind)]) -> Self {
        {
            let mut state = self.state.lock();
            let keyspace = state.keyspaces.entry(name.to_string()).or_default();
            for (cf, kind) in column_families {
                keyspace.insert(
                    cf.to_string(),
                    MockColumnFamily {
                        kind: *kind,
                        rows: BTreeMap::new(),
                    },
                );
            }
        }
        self
    }

    /// A connector handing out transports bound to this cluster
    pub fn connector(&self) -> MockConnector {
        MockConnector {
            cluster: self.clone(),
        }
    }

    /// Refuse (or accept again) new connections
    pub fn set_reachable(&self, reachable: bool) {
        self.state.lock().reachable = reachable;
    }

    /// Drop every live connection: calls fail with a transport error until
    /// [`MockCluster::reconnect`]
    pub fn disconnect(&self) {
        debug!("Mock: dropping all connections");
        self.state.lock().connected = false;
    }

    pub fn reconnect(&self) {
        self.state.lock().connected = true;
    }

    /// Make the next data call fail with `error`
    pub fn fail_next(&self, error: TransportError) {
        self.state.lock().pending_failure = Some(error);
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    pub fn last_call(&self) -> Option<RecordedCall> {
        self.state.lock().calls.last().cloned()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Number of transports connected and not yet closed
    pub fn open_connections(&self) -> usize {
        self.state.lock().open_connections
    }

    /// Number of cells stored in one row
    pub fn cell_count(&self, keyspace: &str, column_family: &str, key: &[u8]) -> usize {
        self.state
            .lock()
            .keyspaces
            .get(keyspace)
            .and_then(|cfs| cfs.get(column_family))
            .and_then(|cf| cf.rows.get(key))
            .map_or(0, BTreeMap::len)
    }
}

/// Connector for a [`MockCluster`]
#[derive(Debug, Clone)]
pub struct MockConnector {
    cluster: MockCluster,
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> TransportResult<MockTransport> {
        let mut state = self.cluster.state.lock();
        if !state.reachable {
            return Err(TransportError::transport(format!(
                "connect() failed for {}:{}: Connection refused",
                host, port
            )));
        }

        trace!("Mock: connected to {}:{} (timeout {:?})", host, port, timeout);
        state.open_connections += 1;

        Ok(MockTransport {
            state: self.cluster.state.clone(),
            keyspace: None,
            recv_timeout: None,
            send_timeout: None,
            closed: false,
        })
    }
}

/// A transport bound to a [`MockCluster`]
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    keyspace: Option<String>,
    recv_timeout: Option<Duration>,
    send_timeout: Option<Duration>,
    closed: bool,
}

impl MockTransport {
    pub fn recv_timeout(&self) -> Option<Duration> {
        self.recv_timeout
    }

    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout
    }

    /// Record `call`, then fail it if the link is down or a failure is queued
    fn begin(&self, state: &mut MockState, call: RecordedCall) -> TransportResult<()> {
        state.calls.push(call);

        if self.closed {
            return Err(TransportError::transport("Transport is closed"));
        }
        if !state.connected {
            return Err(TransportError::transport("No more data to read."));
        }
        match state.pending_failure.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn resolve_keyspace<'a>(&'a self, keyspace: Option<&'a str>) -> TransportResult<&'a str> {
        keyspace
            .or(self.keyspace.as_deref())
            .ok_or_else(|| TransportError::invalid_request("You have not set a keyspace for this session"))
    }
}

fn column_family<'s>(
    state: &'s mut MockState,
    keyspace: &str,
    name: &str,
) -> TransportResult<&'s mut MockColumnFamily> {
    state
        .keyspaces
        .get_mut(keyspace)
        .ok_or_else(|| TransportError::invalid_request(format!("Keyspace {} does not exist", keyspace)))?
        .get_mut(name)
        .ok_or_else(|| TransportError::invalid_request(format!("unconfigured columnfamily {}", name)))
}

fn validate_key(key: &[u8]) -> TransportResult<()> {
    if key.is_empty() {
        return Err(TransportError::invalid_request("Key may not be empty"));
    }
    Ok(())
}

impl Transport for MockTransport {
    fn set_keyspace(&mut self, keyspace: &str) -> TransportResult<()> {
        let mut state = self.state.lock();
        self.begin(
            &mut state,
            RecordedCall::SetKeyspace {
                keyspace: keyspace.to_string(),
            },
        )?;

        if !state.keyspaces.contains_key(keyspace) {
            return Err(TransportError::invalid_request(format!(
                "Keyspace {} does not exist",
                keyspace
            )));
        }
        drop(state);

        self.keyspace = Some(keyspace.to_string());
        Ok(())
    }

    fn cluster_name(&mut self) -> TransportResult<String> {
        let mut state = self.state.lock();
        self.begin(&mut state, RecordedCall::ClusterName)?;
        Ok(state.cluster_name.clone())
    }

    fn keyspaces(&mut self) -> TransportResult<Vec<KeyspaceDefinition>> {
        let mut state = self.state.lock();
        self.begin(&mut state, RecordedCall::Keyspaces)?;
        Ok(state
            .keyspaces
            .iter()
            .map(|(name, cfs)| KeyspaceDefinition {
                name: name.clone(),
                column_families: cfs.keys().cloned().collect(),
            })
            .collect())
    }

    fn insert(
        &mut self,
        keyspace: Option<&str>,
        key: &[u8],
        parent: &ColumnParent,
        column: &WireColumn,
        consistency: ConsistencyLevel,
    ) -> TransportResult<()> {
        let mut state = self.state.lock();
        self.begin(
            &mut state,
            RecordedCall::Insert {
                keyspace: keyspace.map(str::to_string),
                key: key.to_vec(),
                parent: parent.clone(),
                column: column.clone(),
                consistency,
            },
        )?;

        let keyspace = self.resolve_keyspace(keyspace)?;
        validate_key(key)?;
        if column.name.is_empty() {
            return Err(TransportError::invalid_request("Column name must not be empty"));
        }

        let cf = column_family(&mut state, keyspace, &parent.column_family)?;
        let super_name = match (cf.kind, &parent.super_column) {
            (ColumnFamilyKind::Standard, None) => Vec::new(),
            (ColumnFamilyKind::Standard, Some(_)) => {
                return Err(TransportError::invalid_request(format!(
                    "supercolumn parameter is invalid for standard CF {}",
                    parent.column_family
                )))
            }
            (ColumnFamilyKind::Super, Some(name)) if !name.is_empty() => name.clone(),
            (ColumnFamilyKind::Super, _) => {
                return Err(TransportError::invalid_request(format!(
                    "missing or empty supercolumn name for super CF {}",
                    parent.column_family
                )))
            }
        };

        let row = cf.rows.entry(key.to_vec()).or_default();
        let cell = (super_name, column.name.clone());
        let newer = row
            .get(&cell)
            .map_or(true, |existing| column.timestamp >= existing.timestamp);
        if newer {
            row.insert(cell, column.clone());
        }
        Ok(())
    }

    fn get(
        &mut self,
        keyspace: Option<&str>,
        key: &[u8],
        path: &ColumnPath,
        consistency: ConsistencyLevel,
    ) -> TransportResult<ColumnOrSuperColumn> {
        let mut state = self.state.lock();
        self.begin(
            &mut state,
            RecordedCall::Get {
                keyspace: keyspace.map(str::to_string),
                key: key.to_vec(),
                path: path.clone(),
                consistency,
            },
        )?;

        let keyspace = self.resolve_keyspace(keyspace)?;
        validate_key(key)?;
        let cf = column_family(&mut state, keyspace, &path.column_family)?;
        let row = cf.rows.get(key);

        match (cf.kind, &path.super_column, &path.column) {
            (ColumnFamilyKind::Standard, None, Some(column)) => row
                .and_then(|row| row.get(&(Vec::new(), column.clone())))
                .cloned()
                .map(ColumnOrSuperColumn::from_column)
                .ok_or(TransportError::NotFound),
            (ColumnFamilyKind::Standard, _, _) => Err(TransportError::invalid_request(format!(
                "column parameter is not optional for standard CF {}",
                path.column_family
            ))),
            (ColumnFamilyKind::Super, Some(super_name), Some(column)) => row
                .and_then(|row| row.get(&(super_name.clone(), column.clone())))
                .cloned()
                .map(ColumnOrSuperColumn::from_column)
                .ok_or(TransportError::NotFound),
            (ColumnFamilyKind::Super, Some(super_name), None) => {
                let columns: Vec<WireColumn> = row
                    .into_iter()
                    .flat_map(|row| row.iter())
                    .filter(|((sc, _), _)| sc == super_name)
                    .map(|(_, column)| column.clone())
                    .collect();
                if columns.is_empty() {
                    return Err(TransportError::NotFound);
                }
                Ok(ColumnOrSuperColumn::from_super_column(WireSuperColumn {
                    name: super_name.clone(),
                    columns,
                }))
            }
            (ColumnFamilyKind::Super, None, _) => Err(TransportError::invalid_request(format!(
                "supercolumn parameter is not optional for super CF {}",
                path.column_family
            ))),
        }
    }

    fn remove(
        &mut self,
        keyspace: Option<&str>,
        key: &[u8],
        path: &ColumnPath,
        timestamp: i64,
        consistency: ConsistencyLevel,
    ) -> TransportResult<()> {
        let mut state = self.state.lock();
        self.begin(
            &mut state,
            RecordedCall::Remove {
                keyspace: keyspace.map(str::to_string),
                key: key.to_vec(),
                path: path.clone(),
                timestamp,
                consistency,
            },
        )?;

        let keyspace = self.resolve_keyspace(keyspace)?;
        validate_key(key)?;
        let cf = column_family(&mut state, keyspace, &path.column_family)?;

        let matches: Box<dyn Fn(&(Vec<u8>, Vec<u8>)) -> bool> =
            match (cf.kind, &path.super_column, &path.column) {
                (ColumnFamilyKind::Standard, Some(_), _) => {
                    return Err(TransportError::invalid_request(format!(
                        "supercolumn parameter is invalid for standard CF {}",
                        path.column_family
                    )))
                }
                (ColumnFamilyKind::Super, None, Some(_)) => {
                    return Err(TransportError::invalid_request(format!(
                        "column requires a supercolumn for super CF {}",
                        path.column_family
                    )))
                }
                (_, None, None) => Box::new(|_| true),
                (ColumnFamilyKind::Standard, None, Some(column)) => {
                    let column = column.clone();
                    Box::new(move |(_, name)| *name == column)
                }
                (ColumnFamilyKind::Super, Some(super_name), None) => {
                    let super_name = super_name.clone();
                    Box::new(move |(sc, _)| *sc == super_name)
                }
                (ColumnFamilyKind::Super, Some(super_name), Some(column)) => {
                    let cell = (super_name.clone(), column.clone());
                    Box::new(move |candidate| *candidate == cell)
                }
            };

        if let Some(row) = cf.rows.get_mut(key) {
            row.retain(|cell, column| !(matches(cell) && column.timestamp <= timestamp));
            if row.is_empty() {
                cf.rows.remove(key);
            }
        }
        Ok(())
    }

    fn set_recv_timeout(&mut self, timeout: Option<Duration>) {
        self.state.lock().calls.push(RecordedCall::SetRecvTimeout(timeout));
        self.recv_timeout = timeout;
    }

    fn set_send_timeout(&mut self, timeout: Option<Duration>) {
        self.state.lock().calls.push(RecordedCall::SetSendTimeout(timeout));
        self.send_timeout = timeout;
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let mut state = self.state.lock();
        state.calls.push(RecordedCall::Close);
        state.open_connections = state.open_connections.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> MockCluster {
        MockCluster::new("Test Cluster").with_keyspace(
            "Keyspace1",
            &[
                ("Standard2", ColumnFamilyKind::Standard),
                ("Super1", ColumnFamilyKind::Super),
            ],
        )
    }

    fn wire(name: &[u8], value: &[u8], timestamp: i64) -> WireColumn {
        WireColumn {
            name: name.to_vec(),
            value: value.to_vec(),
            timestamp,
        }
    }

    fn standard_path(column: &[u8]) -> ColumnPath {
        ColumnPath {
            column_family: "Standard2".to_string(),
            super_column: None,
            column: Some(column.to_vec()),
        }
    }

    #[test]
    fn test_mock_basic_operations() {
        let cluster = cluster();
        let mut transport = cluster.connector().connect("localhost", 9160, None).unwrap();
        let parent = ColumnParent {
            column_family: "Standard2".to_string(),
            super_column: None,
        };

        transport
            .insert(Some("Keyspace1"), b"joe", &parent, &wire(b"age", b"40", 1), ConsistencyLevel::One)
            .unwrap();

        let response = transport
            .get(Some("Keyspace1"), b"joe", &standard_path(b"age"), ConsistencyLevel::One)
            .unwrap();
        assert_eq!(response.column, Some(wire(b"age", b"40", 1)));
        assert_eq!(cluster.cell_count("Keyspace1", "Standard2", b"joe"), 1);
        assert_eq!(cluster.calls().len(), 2);
    }

    #[test]
    fn test_older_write_loses() {
        let cluster = cluster();
        let mut transport = cluster.connector().connect("localhost", 9160, None).unwrap();
        let parent = ColumnParent {
            column_family: "Standard2".to_string(),
            super_column: None,
        };

        transport
            .insert(Some("Keyspace1"), b"joe", &parent, &wire(b"age", b"41", 10), ConsistencyLevel::One)
            .unwrap();
        transport
            .insert(Some("Keyspace1"), b"joe", &parent, &wire(b"age", b"40", 5), ConsistencyLevel::One)
            .unwrap();

        let response = transport
            .get(Some("Keyspace1"), b"joe", &standard_path(b"age"), ConsistencyLevel::One)
            .unwrap();
        assert_eq!(response.column.unwrap().value, b"41".to_vec());
    }

    #[test]
    fn test_missing_keyspace_selection() {
        let cluster = cluster();
        let mut transport = cluster.connector().connect("localhost", 9160, None).unwrap();

        let err = transport
            .get(None, b"joe", &standard_path(b"age"), ConsistencyLevel::One)
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidRequest { .. }));

        transport.set_keyspace("Keyspace1").unwrap();
        let err = transport
            .get(None, b"joe", &standard_path(b"age"), ConsistencyLevel::One)
            .unwrap_err();
        assert_eq!(err, TransportError::NotFound);
    }

    #[test]
    fn test_unreachable_and_disconnect() {
        let cluster = cluster();
        cluster.set_reachable(false);
        assert!(matches!(
            cluster.connector().connect("localhost", 9160, None),
            Err(TransportError::Transport { .. })
        ));

        cluster.set_reachable(true);
        let mut transport = cluster.connector().connect("localhost", 9160, None).unwrap();
        cluster.disconnect();
        assert!(matches!(
            transport.cluster_name(),
            Err(TransportError::Transport { .. })
        ));

        cluster.reconnect();
        assert_eq!(transport.cluster_name().unwrap(), "Test Cluster");
    }

    #[test]
    fn test_injected_failure_is_consumed() {
        let cluster = cluster();
        let mut transport = cluster.connector().connect("localhost", 9160, None).unwrap();

        cluster.fail_next(TransportError::other("TimedOutException", "timed out"));
        assert!(matches!(
            transport.keyspaces(),
            Err(TransportError::Other { .. })
        ));
        let names: Vec<String> = transport
            .keyspaces()
            .unwrap()
            .iter()
            .map(|ks| ks.name().to_string())
            .collect();
        assert_eq!(names, vec!["Keyspace1", "system"]);
    }

    #[test]
    fn test_close_releases_connection() {
        let cluster = cluster();
        let mut transport = cluster.connector().connect("localhost", 9160, None).unwrap();
        assert_eq!(cluster.open_connections(), 1);

        transport.close();
        transport.close();
        assert_eq!(cluster.open_connections(), 0);
        assert!(transport.cluster_name().is_err());
    }
}
