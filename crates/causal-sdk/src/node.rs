//! The node actor.
//!
//! Each node is one tokio task that owns a [`DeliveryEngine`] and its
//! transport. Local sends, inbound frames and shutdown requests are all
//! serialized through that task, so the engine has a single writer and the
//! delivered log order equals command-processing order.
//!
//! Callers talk to the task through a cloneable [`NodeHandle`]. Reads never
//! reach the engine: after every command the actor publishes copies into a
//! shared view and bumps a `watch` version so observers wake up.

use crate::config::NodeConfig;
use crate::error::{Result, SdkError};
use crate::network::Transport;
use crate::observer::Observer;
use causal_core::{Membership, Message, ProcessId, Timestamp};
use causal_delivery::{DeliveryEngine, DeliveryPolicy, IngestOutcome};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

/// What happened to a frame handed to [`NodeHandle::ingest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStatus {
    /// The frame and this many messages in total were delivered.
    Delivered(usize),
    /// Waiting on causal predecessors.
    Buffered,
    /// Already delivered or already pending.
    Duplicate,
    /// Malformed payload, invalid stamp or unknown sender; state unchanged.
    Rejected(String),
}

/// Point-in-time copy of a node's state, shaped for dashboards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub node_id: String,
    pub clock: BTreeMap<String, u64>,
    pub delivered: Vec<(String, String)>,
    pub pending_count: usize,
}

impl NodeSnapshot {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

enum Command {
    Send {
        content: String,
        reply: oneshot::Sender<Result<Message>>,
    },
    Ingest {
        frame: Vec<u8>,
        reply: oneshot::Sender<IngestStatus>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Copies published by the actor after each command.
#[derive(Debug, Default)]
pub(crate) struct NodeView {
    pub(crate) clock: Timestamp,
    pub(crate) delivered: Vec<Message>,
    pub(crate) pending: usize,
    pub(crate) stopped: bool,
}

/// State shared between the actor, its handles and observers.
pub(crate) struct NodeShared {
    pub(crate) id: ProcessId,
    pub(crate) membership: Membership,
    pub(crate) policy: DeliveryPolicy,
    pub(crate) view: RwLock<NodeView>,
    pub(crate) version: watch::Sender<u64>,
}

impl NodeShared {
    pub(crate) fn is_stopped(&self) -> bool {
        self.view.read().stopped
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }
}

/// Start a node task for `config`, attached to `transport`.
///
/// Must be called from within a tokio runtime. Fails if the transport
/// cannot be subscribed to.
pub fn spawn_node<T: Transport>(config: NodeConfig, transport: T) -> Result<NodeHandle> {
    let engine = DeliveryEngine::new(
        config.process_id.clone(),
        config.membership.clone(),
        config.delivery_policy,
    )?;
    let inbound = transport.subscribe()?;

    let (commands_tx, commands_rx) = mpsc::channel(config.command_capacity.max(1));
    let (version, _) = watch::channel(0);

    let shared = Arc::new(NodeShared {
        id: config.process_id,
        membership: config.membership,
        policy: config.delivery_policy,
        view: RwLock::new(NodeView {
            clock: engine.clock(),
            ..Default::default()
        }),
        version,
    });

    let actor = NodeActor {
        engine,
        transport,
        shared: shared.clone(),
        commands: commands_rx,
        inbound: Some(inbound),
    };
    tokio::spawn(actor.run());

    Ok(NodeHandle {
        shared,
        commands: commands_tx,
    })
}

struct NodeActor<T: Transport> {
    engine: DeliveryEngine,
    transport: T,
    shared: Arc<NodeShared>,
    commands: mpsc::Receiver<Command>,
    inbound: Option<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl<T: Transport> NodeActor<T> {
    async fn run(mut self) {
        info!(
            node = %self.shared.id,
            members = self.shared.membership.len(),
            policy = ?self.shared.policy,
            "node started"
        );

        loop {
            tokio::select! {
                biased;

                command = self.commands.recv() => match command {
                    Some(Command::Send { content, reply }) => {
                        let result = self.send(content).await;
                        let _ = reply.send(result);
                    }
                    Some(Command::Ingest { frame, reply }) => {
                        let status = self.ingest(&frame);
                        let _ = reply.send(status);
                    }
                    Some(Command::Shutdown { reply }) => {
                        self.stop().await;
                        let _ = reply.send(());
                        return;
                    }
                    // Every handle dropped.
                    None => break,
                },

                frame = next_frame(&mut self.inbound) => match frame {
                    Some(frame) => {
                        self.ingest(&frame);
                    }
                    None => {
                        debug!(node = %self.shared.id, "inbound stream closed");
                        self.inbound = None;
                    }
                },
            }
        }

        self.stop().await;
    }

    async fn send(&mut self, content: String) -> Result<Message> {
        let message = self.engine.send(content);
        self.publish_view();

        let frame = message.encode()?;
        if let Err(source) = self.transport.publish(frame).await {
            warn!(
                node = %self.shared.id,
                error = %source,
                "broadcast failed, message delivered locally only"
            );
            return Err(SdkError::Broadcast { message, source });
        }

        debug!(
            node = %self.shared.id,
            stamp = ?message.stamp().to_map(),
            "sent message"
        );
        Ok(message)
    }

    fn ingest(&mut self, frame: &[u8]) -> IngestStatus {
        let node = &self.shared.id;
        let status = match self.engine.ingest_raw(frame) {
            Ok(IngestOutcome::Delivered(messages)) => {
                debug!(
                    node = %node,
                    sender = ?messages.first().map(Message::sender),
                    delivered = messages.len(),
                    pending = self.engine.pending_count(),
                    "delivered message"
                );
                IngestStatus::Delivered(messages.len())
            }
            Ok(IngestOutcome::Buffered) => {
                debug!(
                    node = %node,
                    pending = self.engine.pending_count(),
                    "buffered message awaiting predecessors"
                );
                IngestStatus::Buffered
            }
            Ok(IngestOutcome::Duplicate) => {
                debug!(node = %node, "ignored duplicate message");
                IngestStatus::Duplicate
            }
            Ok(IngestOutcome::UnknownSender(sender)) => {
                warn!(node = %node, sender = %sender, "dropping message from unknown sender");
                IngestStatus::Rejected(format!("unknown sender {}", sender))
            }
            Ok(IngestOutcome::InvalidStamp(sender)) => {
                warn!(
                    node = %node,
                    sender = %sender,
                    "dropping message with no sender event in its stamp"
                );
                IngestStatus::Rejected(format!("stamp has no event from sender {}", sender))
            }
            Err(error) => {
                warn!(node = %node, error = %error, "dropping malformed frame");
                IngestStatus::Rejected(error.to_string())
            }
        };

        self.publish_view();
        status
    }

    /// Copy engine state into the shared view and wake observers.
    fn publish_view(&self) {
        {
            let mut view = self.shared.view.write();
            let known = view.delivered.len();
            view.delivered
                .extend_from_slice(self.engine.delivered_since(known));
            view.clock = self.engine.clock();
            view.pending = self.engine.pending_count();
        }
        self.shared.bump();
    }

    async fn stop(&mut self) {
        // Refuse anything still queued; their callers see `NodeStopped`.
        self.commands.close();
        while self.commands.try_recv().is_ok() {}

        self.transport.close().await;
        self.shared.view.write().stopped = true;
        self.shared.bump();

        info!(
            node = %self.shared.id,
            delivered = self.engine.delivered().len(),
            pending = self.engine.pending_count(),
            "node stopped"
        );
    }
}

async fn next_frame(inbound: &mut Option<mpsc::UnboundedReceiver<Vec<u8>>>) -> Option<Vec<u8>> {
    match inbound {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    shared: Arc<NodeShared>,
    commands: mpsc::Sender<Command>,
}

impl NodeHandle {
    pub fn id(&self) -> &ProcessId {
        &self.shared.id
    }

    pub fn membership(&self) -> &Membership {
        &self.shared.membership
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.shared.policy
    }

    async fn request<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> Command) -> Result<R> {
        if self.is_stopped() {
            return Err(SdkError::NodeStopped);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .await
            .map_err(|_| SdkError::NodeStopped)?;
        reply_rx.await.map_err(|_| SdkError::NodeStopped)
    }

    /// Send a chat message to the cluster.
    ///
    /// The message is delivered locally before it is published. If
    /// publishing fails the error is [`SdkError::Broadcast`], which still
    /// carries the delivered message.
    pub async fn send(&self, content: impl Into<String>) -> Result<Message> {
        let content = content.into();
        self.request(|reply| Command::Send { content, reply }).await?
    }

    /// Hand a raw wire frame to the node, as if it came from the transport.
    pub async fn ingest(&self, frame: impl Into<Vec<u8>>) -> Result<IngestStatus> {
        let frame = frame.into();
        self.request(|reply| Command::Ingest { frame, reply }).await
    }

    /// Stop the node and release its transport.
    ///
    /// A second call fails with [`SdkError::NodeStopped`].
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Current clock.
    pub fn clock(&self) -> Timestamp {
        self.shared.view.read().clock.clone()
    }

    /// `(sender, content)` pairs in delivery order.
    pub fn delivered(&self) -> Vec<(ProcessId, String)> {
        self.shared
            .view
            .read()
            .delivered
            .iter()
            .map(|m| (m.sender().clone(), m.content().to_string()))
            .collect()
    }

    pub fn delivered_messages(&self) -> Vec<Message> {
        self.shared.view.read().delivered.clone()
    }

    /// Messages delivered after the first `cursor` ones.
    pub fn delivered_since(&self, cursor: usize) -> Vec<Message> {
        self.shared
            .view
            .read()
            .delivered
            .get(cursor..)
            .map(<[Message]>::to_vec)
            .unwrap_or_default()
    }

    pub fn delivered_count(&self) -> usize {
        self.shared.view.read().delivered.len()
    }

    pub fn pending_count(&self) -> usize {
        self.shared.view.read().pending
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.is_stopped()
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let view = self.shared.view.read();
        NodeSnapshot {
            node_id: self.shared.id.to_string(),
            clock: view.clock.to_map(),
            delivered: view
                .delivered
                .iter()
                .map(|m| (m.sender().to_string(), m.content().to_string()))
                .collect(),
            pending_count: view.pending,
        }
    }

    /// A cursor over this node's delivered log, starting at the beginning.
    pub fn observe(&self) -> Observer {
        Observer::new(self.shared.clone())
    }

    /// Wait until at least `count` messages have been delivered.
    ///
    /// Fails with [`SdkError::NodeStopped`] if the node stops first.
    pub async fn wait_for_delivered(&self, count: usize) -> Result<()> {
        let mut version = self.shared.version.subscribe();
        loop {
            let _ = version.borrow_and_update();
            {
                let view = self.shared.view.read();
                if view.delivered.len() >= count {
                    return Ok(());
                }
                if view.stopped {
                    return Err(SdkError::NodeStopped);
                }
            }
            version
                .changed()
                .await
                .map_err(|_| SdkError::NodeStopped)?;
        }
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.shared.id)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
