//! Session registry for the nodes of one cluster.

use crate::config::NodeConfig;
use crate::error::{Result, SdkError};
use crate::network::TransportFactory;
use crate::node::{spawn_node, NodeHandle};
use causal_core::{Membership, ProcessId};
use causal_delivery::DeliveryPolicy;
use futures::future::join_all;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tokio::sync::broadcast;
use tracing::info;

/// Events emitted by a session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// A node joined the session.
    NodeJoined { node_id: ProcessId },
    /// A node left the session.
    NodeLeft { node_id: ProcessId },
    /// Every node was shut down.
    Closed,
}

/// Explicit registry of running nodes keyed by process id.
///
/// Nodes are created with [`Session::join`] and torn down with
/// [`Session::leave`] or [`Session::shutdown`]. Only members of the session's
/// membership may join, and each member joins at most once: a stopped node's
/// clock is lost, so a fresh one would reuse stamps its peers already hold.
pub struct Session<F: TransportFactory> {
    factory: F,
    membership: Membership,
    delivery_policy: DeliveryPolicy,
    command_capacity: Option<usize>,
    nodes: RwLock<HashMap<ProcessId, NodeHandle>>,
    departed: RwLock<HashSet<ProcessId>>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl<F: TransportFactory> Session<F> {
    pub fn new(factory: F, membership: Membership) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        Self {
            factory,
            membership,
            delivery_policy: DeliveryPolicy::default(),
            command_capacity: None,
            nodes: RwLock::new(HashMap::new()),
            departed: RwLock::new(HashSet::new()),
            event_tx,
        }
    }

    pub fn with_delivery_policy(mut self, policy: DeliveryPolicy) -> Self {
        self.delivery_policy = policy;
        self
    }

    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = Some(capacity);
        self
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Start a node for `process_id`, or return the one already running.
    ///
    /// Fails with [`SdkError::Departed`] for a process that left or whose
    /// node was stopped.
    pub fn join(&self, process_id: impl Into<ProcessId>) -> Result<NodeHandle> {
        let process_id = process_id.into();
        let mut nodes = self.nodes.write();

        if let Some(handle) = nodes.get(&process_id) {
            if !handle.is_stopped() {
                return Ok(handle.clone());
            }
            nodes.remove(&process_id);
            self.departed.write().insert(process_id.clone());
        }
        if self.departed.read().contains(&process_id) {
            return Err(SdkError::Departed(process_id));
        }

        let mut builder = NodeConfig::builder(process_id.clone(), self.membership.clone())
            .delivery_policy(self.delivery_policy);
        if let Some(capacity) = self.command_capacity {
            builder = builder.command_capacity(capacity);
        }
        let config = builder.build()?;

        let transport = self.factory.connect(&process_id)?;
        let handle = spawn_node(config, transport)?;
        nodes.insert(process_id.clone(), handle.clone());
        drop(nodes);

        info!(node = %process_id, "node joined session");
        let _ = self.event_tx.send(SessionEvent::NodeJoined {
            node_id: process_id,
        });

        Ok(handle)
    }

    /// Look up a running node.
    pub fn node(&self, process_id: &ProcessId) -> Result<NodeHandle> {
        self.nodes
            .read()
            .get(process_id)
            .cloned()
            .ok_or_else(|| SdkError::UnknownNode(process_id.clone()))
    }

    /// Stop one node and remove it from the registry.
    pub async fn leave(&self, process_id: &ProcessId) -> Result<()> {
        let handle = self
            .nodes
            .write()
            .remove(process_id)
            .ok_or_else(|| SdkError::UnknownNode(process_id.clone()))?;
        self.departed.write().insert(process_id.clone());

        match handle.shutdown().await {
            Ok(()) | Err(SdkError::NodeStopped) => {}
            Err(e) => return Err(e),
        }

        info!(node = %process_id, "node left session");
        let _ = self.event_tx.send(SessionEvent::NodeLeft {
            node_id: process_id.clone(),
        });
        Ok(())
    }

    /// Handles of every registered node, ordered by id.
    pub fn nodes(&self) -> Vec<NodeHandle> {
        let mut nodes: Vec<_> = self.nodes.read().values().cloned().collect();
        nodes.sort_by(|a, b| a.id().cmp(b.id()));
        nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Stop every node and clear the registry.
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self.nodes.write().drain().map(|(_, h)| h).collect();
        self.departed
            .write()
            .extend(handles.iter().map(|h| h.id().clone()));
        join_all(handles.iter().map(|h| h.shutdown())).await;

        info!(nodes = handles.len(), "session closed");
        let _ = self.event_tx.send(SessionEvent::Closed);
    }
}
