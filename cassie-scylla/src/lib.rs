//! ScyllaDB/Cassandra transport for cassie
//!
//! [`ScyllaConnector`] plugs the ScyllaDB Rust driver in behind
//! [`cassie_core::Connector`], so a [`cassie_core::Session`] can talk to a
//! real cluster over CQL.

pub mod cql;
pub mod soak;
pub mod transport;

pub use transport::{ScyllaConnector, ScyllaTransport};
