//! Node configuration.

use causal_core::{Membership, MembershipError, ProcessId};
use causal_delivery::DeliveryPolicy;

/// Default capacity of a node's command queue.
pub const DEFAULT_COMMAND_CAPACITY: usize = 256;

/// Configuration for one chat node.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// This node's identity; must be a member.
    pub process_id: ProcessId,
    /// The fixed set of processes in the cluster.
    pub membership: Membership,
    /// Bound on queued `send`/`ingest`/`shutdown` commands.
    pub command_capacity: usize,
    /// Which deliverability predicate to apply.
    pub delivery_policy: DeliveryPolicy,
}

impl NodeConfig {
    pub fn builder(process_id: impl Into<ProcessId>, membership: Membership) -> NodeConfigBuilder {
        NodeConfigBuilder::new(process_id, membership)
    }
}

/// Builder for node configuration.
pub struct NodeConfigBuilder {
    config: NodeConfig,
}

impl NodeConfigBuilder {
    pub fn new(process_id: impl Into<ProcessId>, membership: Membership) -> Self {
        Self {
            config: NodeConfig {
                process_id: process_id.into(),
                membership,
                command_capacity: DEFAULT_COMMAND_CAPACITY,
                delivery_policy: DeliveryPolicy::default(),
            },
        }
    }

    pub fn command_capacity(mut self, capacity: usize) -> Self {
        self.config.command_capacity = capacity;
        self
    }

    pub fn delivery_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.config.delivery_policy = policy;
        self
    }

    /// Finish the configuration.
    ///
    /// Fails if the process is not a member of the cluster. A zero command
    /// capacity is raised to one.
    pub fn build(mut self) -> Result<NodeConfig, MembershipError> {
        self.config
            .membership
            .ensure_member(&self.config.process_id)?;
        self.config.command_capacity = self.config.command_capacity.max(1);
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = NodeConfig::builder("0", Membership::numbered(3))
            .build()
            .unwrap();

        assert_eq!(config.process_id, ProcessId::new("0"));
        assert_eq!(config.command_capacity, DEFAULT_COMMAND_CAPACITY);
        assert_eq!(config.delivery_policy, DeliveryPolicy::CausalFifo);
    }

    #[test]
    fn test_builder_overrides() {
        let config = NodeConfig::builder("2", Membership::numbered(3))
            .command_capacity(0)
            .delivery_policy(DeliveryPolicy::Causal)
            .build()
            .unwrap();

        assert_eq!(config.command_capacity, 1);
        assert_eq!(config.delivery_policy, DeliveryPolicy::Causal);
    }

    #[test]
    fn test_non_member_rejected() {
        let err = NodeConfig::builder("7", Membership::numbered(3))
            .build()
            .unwrap_err();
        assert_eq!(err, MembershipError::NotAMember(ProcessId::new("7")));
    }
}
