//! Deterministic network simulation for causal delivery.
//!
//! [`ChatNetworkSimulator`] carries encoded frames between engines and can
//! lose, duplicate and reorder them. [`ChatCluster`] wires a set of
//! [`DeliveryEngine`]s to one simulator so whole-cluster scenarios can be
//! replayed step by step.

use crate::engine::{DeliveryEngine, DeliveryPolicy, IngestOutcome};
use causal_core::{Membership, Message, ProcessId, WireError};
use std::collections::VecDeque;

/// Fault injection for the simulated network.
#[derive(Clone, Debug)]
pub struct NetworkConfig {
    /// Probability of message loss (0.0 - 1.0)
    pub loss_rate: f64,
    /// Probability of message duplication (0.0 - 1.0)
    pub dup_rate: f64,
    /// Probability of message reordering (0.0 - 1.0)
    pub reorder_rate: f64,
    /// Seed for the internal random generator
    pub seed: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            loss_rate: 0.0,
            dup_rate: 0.0,
            reorder_rate: 0.0,
            seed: 42,
        }
    }
}

impl NetworkConfig {
    /// Create a lossy network configuration
    pub fn lossy(loss_rate: f64) -> Self {
        Self {
            loss_rate,
            ..Default::default()
        }
    }

    /// Create a network that reorders frames
    pub fn reordering(reorder_rate: f64) -> Self {
        Self {
            reorder_rate,
            ..Default::default()
        }
    }

    /// Create a chaotic network (all problems)
    pub fn chaotic() -> Self {
        Self {
            loss_rate: 0.1,
            dup_rate: 0.2,
            reorder_rate: 0.5,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// An encoded frame addressed to one process.
#[derive(Clone, Debug)]
pub struct Envelope {
    pub to: ProcessId,
    pub frame: Vec<u8>,
}

/// Network simulator for causal broadcast
#[derive(Debug)]
pub struct ChatNetworkSimulator {
    /// Frames in flight
    in_flight: VecDeque<Envelope>,
    /// Frames that were "lost"
    lost: Vec<Envelope>,
    config: NetworkConfig,
    rng_state: u64,
}

impl ChatNetworkSimulator {
    pub fn new(config: NetworkConfig) -> Self {
        Self {
            in_flight: VecDeque::new(),
            lost: Vec::new(),
            rng_state: config.seed,
            config,
        }
    }

    /// Simple LCG random number generator
    fn next_random(&mut self) -> f64 {
        self.rng_state = self.rng_state.wrapping_mul(1103515245).wrapping_add(12345);
        ((self.rng_state >> 16) & 0x7fff) as f64 / 32768.0
    }

    fn enqueue(&mut self, envelope: Envelope) {
        if self.next_random() < self.config.reorder_rate && !self.in_flight.is_empty() {
            let pos = (self.next_random() * self.in_flight.len() as f64) as usize;
            self.in_flight.insert(pos.min(self.in_flight.len()), envelope);
        } else {
            self.in_flight.push_back(envelope);
        }
    }

    /// Send a frame
    pub fn send(&mut self, envelope: Envelope) {
        if self.next_random() < self.config.loss_rate {
            self.lost.push(envelope);
            return;
        }

        if self.next_random() < self.config.dup_rate {
            self.enqueue(envelope.clone());
        }
        self.enqueue(envelope);
    }

    /// Receive the next frame
    pub fn receive(&mut self) -> Option<Envelope> {
        self.in_flight.pop_front()
    }

    /// Put every lost frame back in flight
    pub fn retransmit_lost(&mut self) {
        let lost: Vec<_> = self.lost.drain(..).collect();
        for envelope in lost {
            self.enqueue(envelope);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn lost_count(&self) -> usize {
        self.lost.len()
    }
}

/// A cluster of delivery engines sharing one simulated network.
#[derive(Debug)]
pub struct ChatCluster {
    engines: Vec<DeliveryEngine>,
    network: ChatNetworkSimulator,
}

impl ChatCluster {
    /// Create a cluster of `n` processes named `"0"` through `"n-1"`.
    pub fn new(n: usize, policy: DeliveryPolicy, config: NetworkConfig) -> Self {
        let membership = Membership::numbered(n);
        let engines = membership
            .iter()
            .filter_map(|id| DeliveryEngine::new(id.clone(), membership.clone(), policy).ok())
            .collect();

        Self {
            engines,
            network: ChatNetworkSimulator::new(config),
        }
    }

    pub fn engine(&self, idx: usize) -> &DeliveryEngine {
        &self.engines[idx]
    }

    /// Send from one process and broadcast the frame to every other one.
    pub fn send(&mut self, from_idx: usize, content: &str) -> Result<Message, WireError> {
        let message = self.engines[from_idx].send(content);
        let frame = message.encode()?;

        let recipients: Vec<ProcessId> = self
            .engines
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != from_idx)
            .map(|(_, e)| e.owner().clone())
            .collect();

        for to in recipients {
            self.network.send(Envelope {
                to,
                frame: frame.clone(),
            });
        }

        Ok(message)
    }

    /// Deliver one frame from the network.
    ///
    /// Returns `None` once nothing is in flight.
    pub fn process_one(&mut self) -> Option<Result<IngestOutcome, WireError>> {
        let envelope = self.network.receive()?;
        let engine = self
            .engines
            .iter_mut()
            .find(|e| e.owner() == &envelope.to)?;
        Some(engine.ingest_raw(&envelope.frame))
    }

    /// Drain all frames currently in flight.
    pub fn drain_network(&mut self) {
        while self.process_one().is_some() {}
    }

    /// Retransmit and process
    pub fn retransmit_and_process(&mut self) {
        self.network.retransmit_lost();
        self.drain_network();
    }

    /// Every frame delivered and nothing left pending anywhere.
    pub fn is_quiescent(&self) -> bool {
        self.network.is_empty()
            && self.network.lost_count() == 0
            && self.engines.iter().all(|e| e.pending_count() == 0)
    }

    /// Total pending messages across all processes.
    pub fn total_pending(&self) -> usize {
        self.engines.iter().map(|e| e.pending_count()).sum()
    }

    /// Contents delivered by one process, in its local order.
    pub fn delivered_contents(&self, idx: usize) -> Vec<String> {
        self.engines[idx]
            .delivered()
            .entries()
            .iter()
            .map(|m| m.content().to_string())
            .collect()
    }

    pub fn network(&self) -> &ChatNetworkSimulator {
        &self.network
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_network_delivers_everything() {
        let mut cluster = ChatCluster::new(3, DeliveryPolicy::CausalFifo, NetworkConfig::default());
        cluster.send(0, "a").unwrap();
        cluster.send(1, "b").unwrap();
        cluster.drain_network();

        assert!(cluster.is_quiescent());
        for i in 0..3 {
            assert_eq!(cluster.engine(i).delivered().len(), 2);
        }
    }

    #[test]
    fn test_lossy_network_recovers_after_retransmit() {
        let mut cluster = ChatCluster::new(3, DeliveryPolicy::CausalFifo, NetworkConfig::lossy(0.5));
        for round in 0..5 {
            cluster.send(round % 3, &format!("m{}", round)).unwrap();
        }

        cluster.drain_network();
        for _ in 0..20 {
            if cluster.is_quiescent() {
                break;
            }
            cluster.retransmit_and_process();
        }

        assert!(cluster.is_quiescent());
        for i in 0..3 {
            assert_eq!(cluster.engine(i).delivered().len(), 5);
        }
    }

    #[test]
    fn test_simulator_duplicates() {
        let config = NetworkConfig {
            dup_rate: 1.0,
            ..Default::default()
        };
        let mut network = ChatNetworkSimulator::new(config);
        network.send(Envelope {
            to: "0".into(),
            frame: vec![1],
        });
        assert_eq!(network.in_flight_count(), 2);
    }
}
