//! Incremental reads of a node's delivered log.

use crate::error::{Result, SdkError};
use crate::node::NodeShared;
use causal_core::Message;
use std::sync::Arc;
use tokio::sync::watch;

/// A cursor over one node's delivered log.
///
/// Each message is handed out once. Reading never blocks the node: the
/// observer only looks at the copies the node publishes after each command.
pub struct Observer {
    shared: Arc<NodeShared>,
    version: watch::Receiver<u64>,
    cursor: usize,
}

impl Observer {
    pub(crate) fn new(shared: Arc<NodeShared>) -> Self {
        let version = shared.version.subscribe();
        Self {
            shared,
            version,
            cursor: 0,
        }
    }

    /// Number of messages already handed out.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Messages delivered since the last call, possibly none.
    pub fn poll(&mut self) -> Vec<Message> {
        let view = self.shared.view.read();
        let batch = view
            .delivered
            .get(self.cursor..)
            .map(<[Message]>::to_vec)
            .unwrap_or_default();
        self.cursor += batch.len();
        batch
    }

    /// Wait for at least one new delivered message.
    ///
    /// Once the node has stopped and everything has been read, this fails
    /// with [`SdkError::NodeStopped`].
    pub async fn next_batch(&mut self) -> Result<Vec<Message>> {
        loop {
            let _ = self.version.borrow_and_update();

            let batch = self.poll();
            if !batch.is_empty() {
                return Ok(batch);
            }
            if self.shared.is_stopped() {
                return Err(SdkError::NodeStopped);
            }

            self.version
                .changed()
                .await
                .map_err(|_| SdkError::NodeStopped)?;
        }
    }
}

impl std::fmt::Debug for Observer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observer")
            .field("node", &self.shared.id)
            .field("cursor", &self.cursor)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::NodeConfig;
    use crate::error::SdkError;
    use crate::network::MemoryBus;
    use crate::node::spawn_node;
    use causal_core::Membership;
    use std::time::Duration;

    #[tokio::test]
    async fn test_poll_advances_cursor() {
        let bus = MemoryBus::default();
        let config = NodeConfig::builder("0", Membership::numbered(1))
            .build()
            .unwrap();
        let node = spawn_node(config, bus.endpoint("0")).unwrap();
        let mut observer = node.observe();

        assert!(observer.poll().is_empty());
        node.send("one").await.unwrap();
        node.send("two").await.unwrap();

        let batch = observer.poll();
        assert_eq!(batch.len(), 2);
        assert_eq!(observer.cursor(), 2);
        assert!(observer.poll().is_empty());

        node.send("three").await.unwrap();
        assert_eq!(observer.poll()[0].content(), "three");
    }

    #[tokio::test]
    async fn test_next_batch_wakes_on_delivery() {
        let bus = MemoryBus::default();
        let config = NodeConfig::builder("0", Membership::numbered(1))
            .build()
            .unwrap();
        let node = spawn_node(config, bus.endpoint("0")).unwrap();
        let mut observer = node.observe();

        let sender = node.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            sender.send("later").await.unwrap();
        });

        let batch = tokio::time::timeout(Duration::from_secs(5), observer.next_batch())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch[0].content(), "later");
    }

    #[tokio::test]
    async fn test_next_batch_after_shutdown() {
        let bus = MemoryBus::default();
        let config = NodeConfig::builder("0", Membership::numbered(1))
            .build()
            .unwrap();
        let node = spawn_node(config, bus.endpoint("0")).unwrap();
        let mut observer = node.observe();

        node.send("last words").await.unwrap();
        node.shutdown().await.unwrap();

        // What was delivered before the stop is still handed out once.
        assert_eq!(observer.next_batch().await.unwrap().len(), 1);
        assert!(matches!(
            observer.next_batch().await,
            Err(SdkError::NodeStopped)
        ));
    }
}
