//! Blocking cassie transport over the ScyllaDB Rust driver
//!
//! Each transport owns a small tokio runtime and a driver session, and blocks
//! on the runtime for every call.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use cassie_core::transport::{
    ColumnOrSuperColumn, ColumnParent, ColumnPath, Connector, KeyspaceDefinition, Transport,
    TransportError, TransportResult, WireColumn, WireSuperColumn,
};
use cassie_core::ConsistencyLevel;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

// ScyllaDB Rust driver imports
use scylla::client::execution_profile::ExecutionProfile;
use scylla::client::session::Session;
use scylla::client::session_builder::SessionBuilder;
use scylla::errors::{DbError, ExecutionError, RequestAttemptError};
use scylla::response::query_result::QueryResult;
use scylla::statement::unprepared::Statement;
use scylla::statement::Consistency;
use scylla::value::CqlValue;

use crate::cql::{self, BoundValue, ReadShape, TableKind};

/// Opens [`ScyllaTransport`]s against a single contact point
#[derive(Debug, Clone, Default)]
pub struct ScyllaConnector {
    username: Option<String>,
    password: Option<String>,
}

impl ScyllaConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Authenticate with a username and password
    pub fn with_credentials<U: Into<String>, P: Into<String>>(mut self, username: U, password: P) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }
}

impl Connector for ScyllaConnector {
    type Transport = ScyllaTransport;

    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> TransportResult<ScyllaTransport> {
        let address = format!("{}:{}", host, port);
        info!("Initializing ScyllaDB session with contact point: {}", address);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .map_err(|e| TransportError::other("RuntimeError", e.to_string()))?;

        // Statements carry their own timeout; without one they wait forever
        let mut builder = SessionBuilder::new()
            .known_node(&address)
            .default_execution_profile_handle(
                ExecutionProfile::builder()
                    .consistency(Consistency::One)
                    .request_timeout(None)
                    .build()
                    .into_handle(),
            );

        if let (Some(username), Some(password)) = (&self.username, &self.password) {
            builder = builder.user(username, password);
        }

        if let Some(limit) = timeout {
            builder = builder.connection_timeout(limit);
        }

        let session = runtime.block_on(async {
            let build = builder.build();
            let result = match timeout {
                Some(limit) => tokio::time::timeout(limit, build).await.map_err(|_| {
                    TransportError::transport(format!("Timed out connecting to {}", address))
                })?,
                None => build.await,
            };
            result.map_err(|e| {
                TransportError::transport(format!("Failed to connect to {}: {}", address, e))
            })
        })?;

        info!("ScyllaDB session established with {}", address);

        Ok(ScyllaTransport {
            session: Some(session),
            address,
            keyspace: None,
            tables: HashMap::new(),
            recv_timeout: None,
            send_timeout: None,
            runtime,
        })
    }
}

/// One driver session; column families are addressed as compact CQL tables
pub struct ScyllaTransport {
    session: Option<Session>,
    address: String,
    keyspace: Option<String>,
    /// Kind of each column family seen so far, by (keyspace, column family)
    tables: HashMap<(String, String), TableKind>,
    recv_timeout: Option<Duration>,
    send_timeout: Option<Duration>,
    runtime: Runtime,
}

impl ScyllaTransport {
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Create `keyspace` with its standard and super column families
    pub fn create_schema(
        &mut self,
        keyspace: &str,
        replication_factor: u32,
        standard: &[&str],
        super_column_families: &[&str],
    ) -> TransportResult<()> {
        info!("Creating schema for keyspace {}", keyspace);
        self.execute(&cql::create_keyspace(keyspace, replication_factor), Vec::new(), None)?;

        for column_family in standard {
            self.execute(&cql::create_standard_table(keyspace, column_family), Vec::new(), None)?;
        }
        for column_family in super_column_families {
            self.execute(&cql::create_super_table(keyspace, column_family), Vec::new(), None)?;
        }
        Ok(())
    }

    fn execute(
        &self,
        text: &str,
        values: Vec<BoundValue>,
        consistency: Option<ConsistencyLevel>,
    ) -> TransportResult<QueryResult> {
        let session = self
            .session
            .as_ref()
            .ok_or_else(|| TransportError::transport("Connection is closed"))?;

        let mut statement = Statement::new(text);
        if let Some(level) = consistency {
            statement.set_consistency(to_scylla_consistency(level));
        }
        statement.set_request_timeout(combined_timeout(self.recv_timeout, self.send_timeout));

        let values: Vec<CqlValue> = values.into_iter().map(to_cql_value).collect();

        debug!("Executing CQL: {}", text);
        self.runtime
            .block_on(session.query_unpaged(statement, values))
            .map_err(classify_execution_error)
    }

    fn target_keyspace<'a>(&'a self, keyspace: Option<&'a str>) -> Option<&'a str> {
        keyspace.or(self.keyspace.as_deref())
    }

    /// Look up whether `column_family` is a standard or a super column family
    fn table_kind(&mut self, keyspace: Option<&str>, column_family: &str) -> TransportResult<TableKind> {
        if column_family.is_empty() {
            return Err(TransportError::invalid_request("column_family may not be empty"));
        }
        let keyspace = self
            .target_keyspace(keyspace)
            .ok_or_else(|| TransportError::invalid_request("No keyspace has been specified"))?
            .to_string();

        let cache_key = (keyspace, column_family.to_string());
        if let Some(kind) = self.tables.get(&cache_key) {
            return Ok(*kind);
        }

        let statement = cql::select_table_columns(&cache_key.0, &cache_key.1);
        let result = self.execute(&statement.text, statement.values, None)?;
        let rows_result = result.into_rows_result().map_err(deserialization_error)?;
        let mut column_names = Vec::new();
        for row in rows_result
            .rows::<(String,)>()
            .map_err(deserialization_error)?
        {
            column_names.push(row.map_err(deserialization_error)?.0);
        }

        let kind = cql::table_kind(&column_names).ok_or_else(|| {
            TransportError::invalid_request(format!(
                "unconfigured table {}",
                column_family
            ))
        })?;
        debug!("Column family {}.{} is {:?}", cache_key.0, cache_key.1, kind);
        self.tables.insert(cache_key, kind);
        Ok(kind)
    }
}

impl Transport for ScyllaTransport {
    fn set_keyspace(&mut self, keyspace: &str) -> TransportResult<()> {
        self.execute(&cql::use_keyspace(keyspace), Vec::new(), None)?;
        self.keyspace = Some(keyspace.to_string());
        Ok(())
    }

    fn cluster_name(&mut self) -> TransportResult<String> {
        let result = self.execute(cql::SELECT_CLUSTER_NAME, Vec::new(), None)?;
        let rows_result = result.into_rows_result().map_err(deserialization_error)?;
        let mut rows = rows_result
            .rows::<(String,)>()
            .map_err(deserialization_error)?;

        match rows.next() {
            Some(row) => Ok(row.map_err(deserialization_error)?.0),
            None => Err(TransportError::other(
                "UnexpectedResponse",
                "system.local returned no rows",
            )),
        }
    }

    fn keyspaces(&mut self) -> TransportResult<Vec<KeyspaceDefinition>> {
        let mut keyspaces: BTreeMap<String, Vec<String>> = BTreeMap::new();

        let result = self.execute(cql::SELECT_KEYSPACES, Vec::new(), None)?;
        let rows_result = result.into_rows_result().map_err(deserialization_error)?;
        for row in rows_result
            .rows::<(String,)>()
            .map_err(deserialization_error)?
        {
            let (name,) = row.map_err(deserialization_error)?;
            keyspaces.entry(name).or_default();
        }

        let result = self.execute(cql::SELECT_TABLES, Vec::new(), None)?;
        let rows_result = result.into_rows_result().map_err(deserialization_error)?;
        for row in rows_result
            .rows::<(String, String)>()
            .map_err(deserialization_error)?
        {
            let (keyspace, table) = row.map_err(deserialization_error)?;
            keyspaces.entry(keyspace).or_default().push(table);
        }

        Ok(keyspaces
            .into_iter()
            .map(|(name, column_families)| KeyspaceDefinition {
                name,
                column_families,
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
        let kind = self.table_kind(keyspace, &parent.column_family)?;
        let statement = cql::insert(
            self.target_keyspace(keyspace),
            kind,
            key,
            parent,
            &column.name,
            &column.value,
            column.timestamp,
        )?;
        self.execute(&statement.text, statement.values, Some(consistency))?;
        Ok(())
    }

    fn get(
        &mut self,
        keyspace: Option<&str>,
        key: &[u8],
        path: &ColumnPath,
        consistency: ConsistencyLevel,
    ) -> TransportResult<ColumnOrSuperColumn> {
        let kind = self.table_kind(keyspace, &path.column_family)?;
        let (statement, shape) = cql::select(self.target_keyspace(keyspace), kind, key, path)?;
        let result = self.execute(&statement.text, statement.values, Some(consistency))?;
        let columns = wire_columns(result)?;

        match shape {
            ReadShape::Column => columns
                .into_iter()
                .next()
                .map(ColumnOrSuperColumn::from_column)
                .ok_or(TransportError::NotFound),
            ReadShape::SuperColumn { name } => {
                if columns.is_empty() {
                    return Err(TransportError::NotFound);
                }
                Ok(ColumnOrSuperColumn::from_super_column(WireSuperColumn {
                    name,
                    columns,
                }))
            }
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
        let kind = self.table_kind(keyspace, &path.column_family)?;
        let statement = cql::delete(self.target_keyspace(keyspace), kind, key, path, timestamp)?;
        self.execute(&statement.text, statement.values, Some(consistency))?;
        Ok(())
    }

    fn set_recv_timeout(&mut self, timeout: Option<Duration>) {
        self.recv_timeout = timeout;
    }

    fn set_send_timeout(&mut self, timeout: Option<Duration>) {
        self.send_timeout = timeout;
    }

    fn close(&mut self) {
        if let Some(session) = self.session.take() {
            let _guard = self.runtime.enter();
            drop(session);
            info!("Closed ScyllaDB session with {}", self.address);
        }
    }
}

impl Drop for ScyllaTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// Rows of `(name, value, WRITETIME(value))`
fn wire_columns(result: QueryResult) -> TransportResult<Vec<WireColumn>> {
    let rows_result = result.into_rows_result().map_err(deserialization_error)?;
    let rows = rows_result
        .rows::<(Vec<u8>, Vec<u8>, Option<i64>)>()
        .map_err(deserialization_error)?;

    let mut columns = Vec::new();
    for row in rows {
        let (name, value, timestamp) = row.map_err(deserialization_error)?;
        columns.push(WireColumn {
            name,
            value,
            timestamp: timestamp.unwrap_or(0),
        });
    }
    Ok(columns)
}

fn deserialization_error<E: std::fmt::Display>(e: E) -> TransportError {
    TransportError::other("DeserializationError", e.to_string())
}

fn to_cql_value(value: BoundValue) -> CqlValue {
    match value {
        BoundValue::Blob(bytes) => CqlValue::Blob(bytes),
        BoundValue::BigInt(value) => CqlValue::BigInt(value),
        BoundValue::Text(text) => CqlValue::Text(text),
    }
}

pub fn to_scylla_consistency(level: ConsistencyLevel) -> Consistency {
    match level {
        ConsistencyLevel::One => Consistency::One,
        ConsistencyLevel::Quorum => Consistency::Quorum,
        ConsistencyLevel::LocalQuorum => Consistency::LocalQuorum,
        ConsistencyLevel::EachQuorum => Consistency::EachQuorum,
        ConsistencyLevel::All => Consistency::All,
        ConsistencyLevel::Any => Consistency::Any,
        ConsistencyLevel::Two => Consistency::Two,
        ConsistencyLevel::Three => Consistency::Three,
    }
}

/// One request covers both directions, so the budgets add up
fn combined_timeout(recv: Option<Duration>, send: Option<Duration>) -> Option<Duration> {
    match (recv, send) {
        (Some(recv), Some(send)) => Some(recv + send),
        (Some(limit), None) | (None, Some(limit)) => Some(limit),
        (None, None) => None,
    }
}

fn classify_execution_error(error: ExecutionError) -> TransportError {
    match &error {
        ExecutionError::BadQuery(_) => TransportError::invalid_request(error.to_string()),
        ExecutionError::LastAttemptError(RequestAttemptError::DbError(db_error, message)) => {
            classify_db_error(db_error, message)
        }
        ExecutionError::LastAttemptError(_)
        | ExecutionError::ConnectionPoolError(_)
        | ExecutionError::RequestTimeout(_) => TransportError::transport(error.to_string()),
        _ => {
            warn!("Unclassified driver error: {:?}", error);
            TransportError::other("ExecutionError", error.to_string())
        }
    }
}

fn classify_db_error(db_error: &DbError, message: &str) -> TransportError {
    match db_error {
        DbError::Invalid
        | DbError::SyntaxError
        | DbError::Unauthorized
        | DbError::ConfigError
        | DbError::AlreadyExists { .. } => TransportError::invalid_request(message),
        DbError::Unavailable { .. } => TransportError::other("UnavailableException", message),
        DbError::ReadTimeout { .. } | DbError::WriteTimeout { .. } => {
            TransportError::other("TimedOutException", message)
        }
        DbError::AuthenticationError => {
            TransportError::other("AuthenticationException", message)
        }
        _ => TransportError::other("DbError", message),
    }
}
