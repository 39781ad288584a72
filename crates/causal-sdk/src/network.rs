//! Transport abstractions and an in-memory fan-out bus.
//!
//! A [`Transport`] is best-effort: a published frame reaches each other
//! endpoint at most once per link, in no particular order across senders.
//! [`MemoryBus`] implements that contract inside one process and can add
//! random per-link delay and duplication to exercise causal buffering.

use crate::error::TransportError;
use async_trait::async_trait;
use causal_core::{Membership, ProcessId};
use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Abstract pub/sub endpoint used by one node.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Fan a frame out to every other endpoint.
    async fn publish(&self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Take the stream of inbound frames.
    ///
    /// Each endpoint has exactly one subscriber.
    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, TransportError>;

    /// Release the endpoint. Later publishes fail with [`TransportError::Closed`].
    async fn close(&self);
}

/// Creates transport endpoints for processes joining a cluster.
pub trait TransportFactory: Send + Sync + 'static {
    type Transport: Transport;

    fn connect(&self, process_id: &ProcessId) -> Result<Self::Transport, TransportError>;
}

/// Delay and duplication applied by a [`MemoryBus`].
#[derive(Clone, Debug)]
pub struct BusConfig {
    /// Lower bound of the per-link delivery delay.
    pub min_delay: Duration,
    /// Upper bound of the per-link delivery delay.
    pub max_delay: Duration,
    /// Probability that a link delivers a frame twice (0.0 - 1.0)
    pub duplicate_rate: f64,
    /// Seed for delay and duplication choices; entropy when `None`.
    pub seed: Option<u64>,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            duplicate_rate: 0.0,
            seed: None,
        }
    }
}

impl BusConfig {
    pub fn builder() -> BusConfigBuilder {
        BusConfigBuilder::new()
    }

    fn is_immediate(&self) -> bool {
        self.max_delay.is_zero()
    }
}

/// Builder for bus configuration.
pub struct BusConfigBuilder {
    config: BusConfig,
}

impl BusConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: BusConfig::default(),
        }
    }

    /// Delay each link by a random duration in `[min, max]`.
    pub fn delay(mut self, min: Duration, max: Duration) -> Self {
        self.config.min_delay = min;
        self.config.max_delay = max.max(min);
        self
    }

    pub fn duplicate_rate(mut self, rate: f64) -> Self {
        self.config.duplicate_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn build(self) -> BusConfig {
        self.config
    }
}

impl Default for BusConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

type SharedSubscribers = RwLock<HashMap<ProcessId, mpsc::UnboundedSender<Vec<u8>>>>;

struct BusInner {
    config: BusConfig,
    subscribers: SharedSubscribers,
    rng: Mutex<StdRng>,
}

impl BusInner {
    /// Copies of a frame a single link should carry, with their delays.
    fn plan_link(&self) -> Vec<Duration> {
        let mut rng = self.rng.lock();
        let copies = if rng.gen::<f64>() < self.config.duplicate_rate {
            2
        } else {
            1
        };

        (0..copies)
            .map(|_| {
                if self.config.is_immediate() {
                    Duration::ZERO
                } else {
                    let span = self.config.max_delay.saturating_sub(self.config.min_delay);
                    self.config.min_delay + span.mul_f64(rng.gen::<f64>())
                }
            })
            .collect()
    }
}

/// In-process fan-out bus shared by every endpoint of a cluster.
#[derive(Clone)]
pub struct MemoryBus {
    inner: Arc<BusInner>,
}

impl MemoryBus {
    pub fn new(config: BusConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            inner: Arc::new(BusInner {
                config,
                subscribers: RwLock::new(HashMap::new()),
                rng: Mutex::new(rng),
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Attach an endpoint for `process_id`, replacing any previous one.
    pub fn endpoint(&self, process_id: impl Into<ProcessId>) -> BusEndpoint {
        let process_id = process_id.into();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .subscribers
            .write()
            .insert(process_id.clone(), tx.clone());
        debug!(endpoint = %process_id, "bus endpoint connected");

        BusEndpoint {
            process_id,
            bus: self.inner.clone(),
            sender: tx,
            receiver: Mutex::new(Some(rx)),
            closed: AtomicBool::new(false),
        }
    }

    /// Hand a raw frame to one endpoint, bypassing delay and duplication.
    pub fn inject(&self, to: &ProcessId, frame: Vec<u8>) -> Result<(), TransportError> {
        let subscribers = self.inner.subscribers.read();
        let tx = subscribers
            .get(to)
            .ok_or_else(|| TransportError::UnknownEndpoint(to.clone()))?;
        tx.send(frame).map_err(|_| TransportError::Closed)
    }

    /// Processes with a live endpoint.
    pub fn endpoints(&self) -> Vec<ProcessId> {
        let mut ids: Vec<_> = self.inner.subscribers.read().keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

impl TransportFactory for MemoryBus {
    type Transport = BusEndpoint;

    fn connect(&self, process_id: &ProcessId) -> Result<BusEndpoint, TransportError> {
        Ok(self.endpoint(process_id.clone()))
    }
}

/// One process's attachment to a [`MemoryBus`].
pub struct BusEndpoint {
    process_id: ProcessId,
    bus: Arc<BusInner>,
    sender: mpsc::UnboundedSender<Vec<u8>>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>,
    closed: AtomicBool,
}

impl BusEndpoint {
    pub fn process_id(&self) -> &ProcessId {
        &self.process_id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark closed and unregister from the bus. Returns false if already closed.
    fn detach(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        // A newer endpoint for the same process keeps its registration.
        let mut subscribers = self.bus.subscribers.write();
        if subscribers
            .get(&self.process_id)
            .is_some_and(|tx| tx.same_channel(&self.sender))
        {
            subscribers.remove(&self.process_id);
        }
        true
    }
}

impl Drop for BusEndpoint {
    fn drop(&mut self) {
        if self.detach() {
            debug!(endpoint = %self.process_id, "bus endpoint dropped");
        }
    }
}

#[async_trait]
impl Transport for BusEndpoint {
    async fn publish(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }

        let links: Vec<_> = {
            let subscribers = self.bus.subscribers.read();
            subscribers
                .iter()
                .filter(|(id, _)| **id != self.process_id)
                .map(|(_, tx)| tx.clone())
                .collect()
        };

        for tx in links {
            for delay in self.bus.plan_link() {
                if delay.is_zero() {
                    // A receiver that went away is a lost link, not a failure.
                    let _ = tx.send(frame.clone());
                } else {
                    let tx = tx.clone();
                    let frame = frame.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(frame);
                    });
                }
            }
        }

        Ok(())
    }

    fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<Vec<u8>>, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.receiver
            .lock()
            .take()
            .ok_or(TransportError::AlreadySubscribed)
    }

    async fn close(&self) {
        if self.detach() {
            debug!(endpoint = %self.process_id, "bus endpoint closed");
        }
    }
}

/// Create a bus with one endpoint per member of a numbered cluster.
pub fn create_network(count: usize, config: BusConfig) -> (Membership, MemoryBus, Vec<BusEndpoint>) {
    let membership = Membership::numbered(count);
    let bus = MemoryBus::new(config);
    let endpoints = membership.iter().map(|id| bus.endpoint(id.clone())).collect();
    (membership, bus, endpoints)
}
