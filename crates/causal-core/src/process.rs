//! Process identity and closed cluster membership.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

/// Unique identifier of a process in the cluster.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(pub String);

impl ProcessId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Borrow<str> for ProcessId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ProcessId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ProcessId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Errors raised when a clock or node is built against a membership.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MembershipError {
    #[error("Membership must contain at least one process")]
    Empty,

    #[error("Process {0} is not a member of the cluster")]
    NotAMember(ProcessId),
}

/// The fixed set of processes in a cluster.
///
/// Decided once at cluster formation. Every clock in the cluster is sized by
/// the same membership, so all timestamps share one key set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Membership {
    members: BTreeSet<ProcessId>,
}

impl Membership {
    /// Build a membership from explicit identifiers.
    pub fn new<I, P>(members: I) -> Result<Self, MembershipError>
    where
        I: IntoIterator<Item = P>,
        P: Into<ProcessId>,
    {
        let members: BTreeSet<ProcessId> = members.into_iter().map(Into::into).collect();
        if members.is_empty() {
            return Err(MembershipError::Empty);
        }
        Ok(Self { members })
    }

    /// Membership of `n` processes named `"0"` through `"n-1"`.
    ///
    /// `n == 0` yields a single process `"0"`.
    pub fn numbered(n: usize) -> Self {
        let members = (0..n.max(1)).map(|i| ProcessId(i.to_string())).collect();
        Self { members }
    }

    pub fn contains(&self, id: &ProcessId) -> bool {
        self.members.contains(id)
    }

    /// Fail unless `id` belongs to the cluster.
    pub fn ensure_member(&self, id: &ProcessId) -> Result<(), MembershipError> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(MembershipError::NotAMember(id.clone()))
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessId> {
        self.members.iter()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl<'a> IntoIterator for &'a Membership {
    type Item = &'a ProcessId;
    type IntoIter = std::collections::btree_set::Iter<'a, ProcessId>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_membership() {
        let members = Membership::numbered(3);
        assert_eq!(members.len(), 3);
        assert!(members.contains(&ProcessId::new("0")));
        assert!(members.contains(&ProcessId::new("2")));
        assert!(!members.contains(&ProcessId::new("3")));
    }

    #[test]
    fn test_empty_membership_rejected() {
        let result = Membership::new(Vec::<String>::new());
        assert_eq!(result, Err(MembershipError::Empty));
    }

    #[test]
    fn test_ensure_member() {
        let members = Membership::new(["alice", "bob"]).unwrap();
        assert!(members.ensure_member(&"alice".into()).is_ok());
        assert_eq!(
            members.ensure_member(&"carol".into()),
            Err(MembershipError::NotAMember(ProcessId::new("carol")))
        );
    }

    #[test]
    fn test_process_id_serializes_as_string() {
        let json = serde_json::to_string(&ProcessId::new("7")).unwrap();
        assert_eq!(json, "\"7\"");
    }
}
