use anyhow::{anyhow, Result};
use cassie_core::mock_transport::{ColumnFamilyKind, MockCluster};
use cassie_core::{Blob, BlobRef, ClientConfig, Column, ConsistencyLevel, Connector, Session};
use cassie_scylla::{soak, ScyllaConnector};
use clap::{Parser, Subcommand};
use std::io;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Column-family store client
#[derive(Parser)]
#[command(name = "cassie")]
#[command(about = "Read, write and delete columns in a Cassandra-compatible cluster")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Host to connect to (overrides CASSIE_HOST and the config file)
    #[arg(long)]
    host: Option<String>,

    /// Port to connect to
    #[arg(short, long)]
    port: Option<u16>,

    /// Connect, receive and send timeout in milliseconds; negative waits forever
    #[arg(long, allow_negative_numbers = true)]
    timeout_ms: Option<i64>,

    /// Keyspace to select after connecting
    #[arg(short, long)]
    keyspace: Option<String>,

    /// Username for authentication
    #[arg(long, requires = "password")]
    username: Option<String>,

    /// Password for authentication
    #[arg(long, requires = "username")]
    password: Option<String>,

    /// Run against an in-memory cluster instead of the network
    #[arg(long)]
    mock: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the cluster name and its keyspaces
    Debug,

    /// Write one column
    Insert {
        column_family: String,
        key: String,
        name: String,
        value: String,

        /// Super-column to write into
        #[arg(long)]
        super_column: Option<String>,

        /// Column timestamp in microseconds (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,

        /// Consistency level (defaults to the configured one)
        #[arg(short, long)]
        consistency: Option<ConsistencyLevel>,
    },

    /// Read one column, or a whole super-column when only --super-column is given
    Get {
        column_family: String,
        key: String,
        name: Option<String>,

        #[arg(long)]
        super_column: Option<String>,

        /// Consistency level (defaults to the configured one)
        #[arg(short, long)]
        consistency: Option<ConsistencyLevel>,
    },

    /// Delete a column, a super-column, or the whole row from the selected keyspace
    Remove {
        column_family: String,
        key: String,

        #[arg(long)]
        super_column: Option<String>,

        #[arg(long)]
        column: Option<String>,

        /// Consistency level (defaults to the configured one)
        #[arg(short, long)]
        consistency: Option<ConsistencyLevel>,
    },

    /// Create a keyspace with standard and super column families
    InitSchema {
        keyspace: String,

        /// Standard column families to create
        #[arg(long, value_delimiter = ',', default_values = ["Standard1", "Standard2"])]
        standard: Vec<String>,

        /// Super column families to create
        #[arg(long = "super", value_delimiter = ',', default_values = ["Super1"])]
        super_column_families: Vec<String>,

        #[arg(long, default_value = "1")]
        replication_factor: u32,
    },

    /// Insert and read back a binary column over and over
    Blobs {
        /// Sessions to open, one after another
        #[arg(long, default_value = "1")]
        generations: u64,

        /// Round trips per session
        #[arg(long, default_value = "10000")]
        iterations: usize,
    },
}

/// Either a real connector or an in-memory cluster
enum Backend {
    Scylla(ScyllaConnector),
    Mock(MockCluster),
}

impl Backend {
    fn open(&self, config: &ClientConfig) -> Result<Session> {
        let session = match self {
            Backend::Scylla(connector) => Session::from_config(connector, config)?,
            Backend::Mock(cluster) => Session::from_config(&cluster.connector(), config)?,
        };
        Ok(session)
    }
}

fn mock_cluster() -> MockCluster {
    MockCluster::new("Test Cluster")
        .with_keyspace(
            "Keyspace1",
            &[
                ("Standard1", ColumnFamilyKind::Standard),
                ("Standard2", ColumnFamilyKind::Standard),
                ("Super1", ColumnFamilyKind::Super),
            ],
        )
}

fn load_config(cli: &Cli) -> Result<ClientConfig> {
    let mut config = ClientConfig::load()?;

    if let Some(host) = &cli.host {
        config.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(timeout) = cli.timeout_ms {
        let timeout = u64::try_from(timeout).ok();
        config.connect_timeout_ms = timeout;
        config.recv_timeout_ms = timeout;
        config.send_timeout_ms = timeout;
    }
    if let Some(keyspace) = &cli.keyspace {
        config.keyspace = Some(keyspace.clone());
    }

    config.validate()?;
    Ok(config)
}

fn selected_keyspace(session: &Session) -> Result<String> {
    session
        .keyspace()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("No keyspace selected; pass --keyspace or set CASSIE_KEYSPACE"))
}

fn print_column(column: &Column) {
    println!(
        "name={:?} value={:?} timestamp={}",
        column.name(),
        column.value(),
        column.timestamp()
    );
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(io::stderr)
        .init();

    let config = load_config(&cli)?;

    let backend = if cli.mock {
        info!("Using in-memory cluster");
        Backend::Mock(mock_cluster())
    } else {
        let connector = match (&cli.username, &cli.password) {
            (Some(username), Some(password)) => {
                ScyllaConnector::new().with_credentials(username, password)
            }
            _ => ScyllaConnector::new(),
        };
        Backend::Scylla(connector)
    };

    match cli.command {
        Commands::Debug => {
            let mut session = backend.open(&config)?;
            session.print_debug(&mut io::stdout())?;
        }

        Commands::Insert {
            column_family,
            key,
            name,
            value,
            super_column,
            timestamp,
            consistency,
        } => {
            let consistency = config.consistency_or(consistency);
            let mut session = backend.open(&config)?;
            let keyspace = selected_keyspace(&session)?;
            let column = Column::new(
                name,
                value,
                timestamp.unwrap_or_else(cassie_core::session::now_micros),
            );

            match super_column {
                Some(super_column) => session.insert_super(
                    &keyspace,
                    &column_family,
                    &key,
                    super_column.as_str(),
                    &column,
                    consistency,
                )?,
                None => session.insert(&keyspace, &column_family, &key, &column, consistency)?,
            }
            info!("Inserted into {}/{}", keyspace, column_family);
        }

        Commands::Get {
            column_family,
            key,
            name,
            super_column,
            consistency,
        } => {
            let consistency = config.consistency_or(consistency);
            let mut session = backend.open(&config)?;
            let keyspace = selected_keyspace(&session)?;

            match (super_column, name) {
                (None, None) => return Err(anyhow!("A column name or --super-column is required")),
                (None, Some(name)) => {
                    match session.get(&keyspace, &column_family, &key, name.as_str(), consistency)? {
                        Some(column) => print_column(&column),
                        None => println!("(not found)"),
                    }
                }
                (Some(super_column), Some(name)) => {
                    match session.get_in_super(
                        &keyspace,
                        &column_family,
                        &key,
                        super_column.as_str(),
                        name.as_str(),
                        consistency,
                    )? {
                        Some(column) => print_column(&column),
                        None => println!("(not found)"),
                    }
                }
                (Some(super_column), None) => {
                    match session.get_super_column(
                        &keyspace,
                        &column_family,
                        &key,
                        super_column.as_str(),
                        consistency,
                    )? {
                        Some(found) => {
                            println!("super_column={:?} columns={}", found.name(), found.column_count());
                            for column in &found {
                                print_column(column);
                            }
                        }
                        None => println!("(not found)"),
                    }
                }
            }
        }

        Commands::Remove {
            column_family,
            key,
            super_column,
            column,
            consistency,
        } => {
            let consistency = config.consistency_or(consistency);
            let mut session = backend.open(&config)?;
            selected_keyspace(&session)?;

            let super_column = super_column.map(Blob::from);
            let column = column.map(Blob::from);
            session.remove(
                &column_family,
                &key,
                super_column.as_ref().map(BlobRef::from),
                column.as_ref().map(BlobRef::from),
                consistency,
            )?;
            info!("Removed from {}", column_family);
        }

        Commands::InitSchema {
            keyspace,
            standard,
            super_column_families,
            replication_factor,
        } => {
            let connector = match &backend {
                Backend::Scylla(connector) => connector,
                Backend::Mock(_) => return Err(anyhow!("init-schema needs a real cluster")),
            };
            let mut transport =
                connector.connect(&config.host, config.port, config.connect_timeout())?;

            let standard: Vec<&str> = standard.iter().map(String::as_str).collect();
            let super_column_families: Vec<&str> =
                super_column_families.iter().map(String::as_str).collect();
            transport.create_schema(
                &keyspace,
                replication_factor,
                &standard,
                &super_column_families,
            )?;
            println!("Schema ready in keyspace {}", keyspace);
        }

        Commands::Blobs {
            generations,
            iterations,
        } => {
            soak::run(|| backend.open(&config), generations, iterations)?;
            println!(
                "{} generation(s) of {} round trips passed",
                generations, iterations
            );
        }
    }

    Ok(())
}
