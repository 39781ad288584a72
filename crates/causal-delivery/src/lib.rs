//! Causal Delivery - ordering received messages by causality
//!
//! This crate implements the delivery side of causal broadcast:
//! - [`pending`] - messages received but not yet deliverable
//! - [`log`] - the append-only delivered log with cursor reads
//! - [`engine`] - the deliverability predicate and fixed-point drain
//! - [`simulator`] - a deterministic lossless network and cluster harness
//!
//! # Causal delivery
//!
//! ```text
//! On send of m by process i:
//!   C[i] := C[i] + 1
//!   deliver(m) with stamp copy(C)
//!
//! On receive of m from s stamped T:
//!   if ∀p ≠ s: C[p] ≥ T[p]  (and T[s] = C[s] + 1 under CausalFifo)
//!       C := max(C, T); deliver(m); drain()
//!   else
//!       pending := pending ∪ {m}
//!
//! drain():
//!   repeat
//!       for each m in pending, in arrival order:
//!           if deliverable(m): C := max(C, T(m)); deliver(m); remove m
//!   until a full pass delivers nothing
//! ```
//!
//! # Example
//!
//! ```rust
//! use causal_core::Membership;
//! use causal_delivery::{DeliveryEngine, DeliveryPolicy, IngestOutcome};
//!
//! let members = Membership::numbered(2);
//! let mut alice = DeliveryEngine::new("0".into(), members.clone(), DeliveryPolicy::default()).unwrap();
//! let mut bob = DeliveryEngine::new("1".into(), members, DeliveryPolicy::default()).unwrap();
//!
//! let first = alice.send("hello");
//! let second = alice.send("again");
//!
//! // Out of order: the second message waits for the first.
//! assert_eq!(bob.ingest(second), IngestOutcome::Buffered);
//! assert!(matches!(bob.ingest(first), IngestOutcome::Delivered(ref m) if m.len() == 2));
//! assert_eq!(bob.pending_count(), 0);
//! ```

pub mod engine;
pub mod log;
pub mod pending;
pub mod simulator;

pub use engine::{DeliveryEngine, DeliveryPolicy, IngestOutcome};
pub use log::DeliveredLog;
pub use pending::PendingSet;
pub use simulator::{ChatCluster, ChatNetworkSimulator, NetworkConfig};
