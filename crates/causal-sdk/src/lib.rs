//! Causal SDK - async nodes for causal-order chat clusters
//!
//! This crate runs [`causal_delivery::DeliveryEngine`]s as single-writer
//! tokio actors connected by a pub/sub transport.
//!
//! # Quick Start
//!
//! ```rust
//! use causal_sdk::{MemoryBus, Membership, Session};
//!
//! # tokio_test::block_on(async {
//! let session = Session::new(MemoryBus::default(), Membership::numbered(2));
//! let alice = session.join("0").unwrap();
//! let bob = session.join("1").unwrap();
//!
//! alice.send("Hello from Node 0!").await.unwrap();
//! bob.wait_for_delivered(1).await.unwrap();
//!
//! assert_eq!(bob.delivered()[0].1, "Hello from Node 0!");
//! session.shutdown().await;
//! # });
//! ```
//!
//! # Architecture
//!
//! - [`node`] - the node actor, its handle and ingest statuses
//! - [`observer`] - cursor-based incremental reads for dashboards
//! - [`network`] - transport abstractions and the in-memory bus
//! - [`session`] - registry of the nodes in one cluster
//! - [`config`] - node configuration
//! - [`error`] - error types

pub mod config;
pub mod error;
pub mod network;
pub mod node;
pub mod observer;
pub mod session;

// Re-exports for convenience
pub use config::{NodeConfig, NodeConfigBuilder, DEFAULT_COMMAND_CAPACITY};
pub use error::{Result, SdkError, TransportError};
pub use network::{
    create_network, BusConfig, BusConfigBuilder, BusEndpoint, MemoryBus, Transport,
    TransportFactory,
};
pub use node::{spawn_node, IngestStatus, NodeHandle, NodeSnapshot};
pub use observer::Observer;
pub use session::{Session, SessionEvent};

// Re-export commonly used types from the core crates
pub use causal_core::{CausalOrder, Membership, Message, ProcessId, Timestamp};
pub use causal_delivery::DeliveryPolicy;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::NodeConfig;
    pub use crate::error::SdkError;
    pub use crate::network::{MemoryBus, Transport, TransportFactory};
    pub use crate::node::{spawn_node, IngestStatus, NodeHandle};
    pub use crate::session::Session;
    pub use causal_core::{Membership, Message, ProcessId};
    pub use causal_delivery::DeliveryPolicy;
}
