//! # cassie core library
//!
//! Client-side data access for column-family (wide-row) stores: reading,
//! writing and deleting columns and super-columns by row key, column family
//! and optional super-column/column name, at a per-call consistency level.
//!
//! ## Features
//!
//! - **Values**: binary-safe owned [`Blob`]s and borrowed [`BlobRef`] views,
//!   [`Column`]s and [`SuperColumn`]s
//! - **Conversion**: copying translation to and from transport records
//! - **Sessions**: one blocking connection per [`Session`], with every outcome
//!   classified as none / invalid request / transport / other
//! - **Testing**: an in-memory [`mock_transport::MockCluster`]
//!
//! ## Architecture
//!
//! The network side lives behind the [`transport::Transport`] and
//! [`transport::Connector`] traits. This crate never encodes anything on the
//! wire itself; `cassie-scylla` provides a transport for real clusters.

pub mod blob;
pub mod column;
pub mod config;
pub mod consistency;
pub mod convert;
pub mod error;
pub mod mock_transport;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use blob::{Blob, BlobRef};
pub use column::{Column, SuperColumn};
pub use config::ClientConfig;
pub use consistency::ConsistencyLevel;
pub use error::{CassieError, CassieResult, ErrorCode};
pub use session::{ClusterDescription, Session};
pub use transport::{Connector, Transport, TransportError};

/// Version information for cassie
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
