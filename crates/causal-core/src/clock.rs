//! Vector timestamps and the per-process vector clock.
//!
//! A [`Timestamp`] is an immutable snapshot of causal knowledge: for every
//! process, how many of its messages the holder had observed. A
//! [`VectorClock`] is the live, owned clock a process advances as it sends
//! and delivers messages.
//!
//! Absent entries read as zero, so `{0:1}` and `{0:1, 1:0}` denote the same
//! point in causal history and compare equal.

use crate::process::{Membership, MembershipError, ProcessId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::hash::{Hash, Hasher};

/// Causal relation between two timestamps.
///
/// Exactly one variant holds for any pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CausalOrder {
    /// Identical causal knowledge.
    Equal,
    /// The left timestamp happened before the right one.
    Before,
    /// The left timestamp happened after the right one.
    After,
    /// Neither saw the other.
    Concurrent,
}

/// Snapshot of a vector clock.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp {
    entries: BTreeMap<ProcessId, u64>,
}

impl Timestamp {
    /// Create an empty timestamp (every entry reads as zero).
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Timestamp with an explicit zero entry for every member.
    pub fn zeroed(membership: &Membership) -> Self {
        Self {
            entries: membership.iter().map(|p| (p.clone(), 0)).collect(),
        }
    }

    /// Create a timestamp from entries.
    pub fn from_entries<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (P, u64)>,
        P: Into<ProcessId>,
    {
        Self {
            entries: entries.into_iter().map(|(p, n)| (p.into(), n)).collect(),
        }
    }

    /// Get the counter for a process.
    pub fn get(&self, process: &str) -> u64 {
        self.entries.get(process).copied().unwrap_or(0)
    }

    pub fn set(&mut self, process: impl Into<ProcessId>, value: u64) {
        self.entries.insert(process.into(), value);
    }

    /// Compare two timestamps component-wise over the union of their keys.
    pub fn compare(&self, other: &Timestamp) -> CausalOrder {
        let keys: BTreeSet<&ProcessId> = self.entries.keys().chain(other.entries.keys()).collect();

        let mut less = false;
        let mut greater = false;
        for key in keys {
            match self.get(key.as_str()).cmp(&other.get(key.as_str())) {
                Ordering::Less => less = true,
                Ordering::Greater => greater = true,
                Ordering::Equal => {}
            }
            if less && greater {
                return CausalOrder::Concurrent;
            }
        }

        match (less, greater) {
            (false, false) => CausalOrder::Equal,
            (true, false) => CausalOrder::Before,
            (false, true) => CausalOrder::After,
            (true, true) => CausalOrder::Concurrent,
        }
    }

    /// `self[p] <= other[p]` for all `p`, strictly for at least one.
    pub fn happens_before(&self, other: &Timestamp) -> bool {
        self.compare(other) == CausalOrder::Before
    }

    pub fn happens_after(&self, other: &Timestamp) -> bool {
        self.compare(other) == CausalOrder::After
    }

    /// Neither happened before the other and they are not equal.
    pub fn is_concurrent_with(&self, other: &Timestamp) -> bool {
        self.compare(other) == CausalOrder::Concurrent
    }

    /// True if `self[p] >= other[p]` for every process.
    pub fn dominates(&self, other: &Timestamp) -> bool {
        matches!(self.compare(other), CausalOrder::Equal | CausalOrder::After)
    }

    /// Component-wise maximum over the union of keys.
    pub fn merged_with(&self, other: &Timestamp) -> Timestamp {
        let mut result = self.clone();
        for (process, &value) in &other.entries {
            let current = result.entries.entry(process.clone()).or_insert(0);
            *current = (*current).max(value);
        }
        result
    }

    /// Copy of this timestamp over exactly the given membership.
    ///
    /// Entries for unknown processes are dropped and missing members read as
    /// zero.
    pub fn restricted_to(&self, membership: &Membership) -> Timestamp {
        Timestamp {
            entries: membership
                .iter()
                .map(|p| (p.clone(), self.get(p.as_str())))
                .collect(),
        }
    }

    /// Iterate over all explicit entries.
    pub fn iter(&self) -> impl Iterator<Item = (&ProcessId, &u64)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all counters (number of sends this snapshot accounts for).
    pub fn total(&self) -> u64 {
        self.entries.values().sum()
    }

    /// Plain `(process, counter)` pairs in process order.
    pub fn to_map(&self) -> BTreeMap<String, u64> {
        self.entries
            .iter()
            .map(|(p, &n)| (p.0.clone(), n))
            .collect()
    }
}

impl PartialEq for Timestamp {
    fn eq(&self, other: &Self) -> bool {
        self.compare(other) == CausalOrder::Equal
    }
}

impl Eq for Timestamp {}

impl Hash for Timestamp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Zero entries are skipped so hashing agrees with equality.
        for (process, value) in self.entries.iter().filter(|(_, v)| **v > 0) {
            process.hash(state);
            value.hash(state);
        }
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match self.compare(other) {
            CausalOrder::Equal => Some(Ordering::Equal),
            CausalOrder::Before => Some(Ordering::Less),
            CausalOrder::After => Some(Ordering::Greater),
            CausalOrder::Concurrent => None,
        }
    }
}

/// The live vector clock of one process.
///
/// The key set is fixed to the membership at construction. Only the owner's
/// entry is ever incremented; every other entry moves through [`merge`].
///
/// [`merge`]: VectorClock::merge
#[derive(Debug)]
pub struct VectorClock {
    owner: ProcessId,
    counters: Timestamp,
}

impl VectorClock {
    /// Create a clock with every member's counter at zero.
    pub fn new(owner: ProcessId, membership: &Membership) -> Result<Self, MembershipError> {
        membership.ensure_member(&owner)?;
        Ok(Self {
            owner,
            counters: Timestamp::zeroed(membership),
        })
    }

    pub fn owner(&self) -> &ProcessId {
        &self.owner
    }

    /// Advance the owner's counter, returning the new value.
    pub fn increment(&mut self) -> u64 {
        let entry = self.counters.entries.entry(self.owner.clone()).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Take the component-wise maximum with `other`.
    ///
    /// Processes outside the membership are ignored.
    pub fn merge(&mut self, other: &Timestamp) {
        for (process, value) in self.counters.entries.iter_mut() {
            *value = (*value).max(other.get(process.as_str()));
        }
    }

    /// Independent copy of the current counters.
    pub fn snapshot(&self) -> Timestamp {
        self.counters.clone()
    }

    pub fn get(&self, process: &str) -> u64 {
        self.counters.get(process)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProcessId, &u64)> {
        self.counters.iter()
    }
}
