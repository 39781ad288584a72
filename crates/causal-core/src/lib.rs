//! Causal Core - clocks and messages for causal broadcast
//!
//! This crate holds the vocabulary shared by every process in a chat cluster:
//! - [`process`] - process identifiers and the fixed cluster membership
//! - [`clock`] - vector timestamps, the causal order between them, and the
//!   live per-process vector clock
//! - [`message`] - the immutable chat message and its JSON wire format
//!
//! # Vector clocks
//!
//! ```text
//! On send by process i:
//!   C[i] := C[i] + 1
//!   stamp := copy(C)
//!
//! On delivery of a message stamped T:
//!   ∀p ∈ members: C[p] := max(C[p], T[p])
//! ```
//!
//! # Example
//!
//! ```rust
//! use causal_core::{CausalOrder, Membership, ProcessId, VectorClock};
//!
//! let members = Membership::numbered(2);
//! let mut a = VectorClock::new(ProcessId::new("0"), &members).unwrap();
//! let mut b = VectorClock::new(ProcessId::new("1"), &members).unwrap();
//!
//! a.increment();
//! b.increment();
//! assert_eq!(a.snapshot().compare(&b.snapshot()), CausalOrder::Concurrent);
//!
//! b.merge(&a.snapshot());
//! assert!(a.snapshot().happens_before(&b.snapshot()));
//! ```

pub mod clock;
pub mod message;
pub mod process;

pub use clock::{CausalOrder, Timestamp, VectorClock};
pub use message::{Message, MessageId, WireError};
pub use process::{Membership, MembershipError, ProcessId};
