//! The causal delivery engine.
//!
//! A [`DeliveryEngine`] owns one process's vector clock, pending buffer and
//! delivered log. It decides, for every received message, whether the
//! message's causal predecessors have all been delivered locally; if so the
//! message is delivered and the buffer is drained to a fixed point, otherwise
//! it waits in the buffer.
//!
//! The engine is synchronous and single-threaded. Callers that receive from
//! several sources serialize access to it (see the node actor in
//! `causal-sdk`).

use crate::log::DeliveredLog;
use crate::pending::PendingSet;
use causal_core::{
    Membership, MembershipError, Message, MessageId, ProcessId, Timestamp, VectorClock, WireError,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// How strictly messages from one sender are ordered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Deliver once every other process's component of the stamp has been
    /// seen. A sender's own messages may be delivered out of send order if
    /// the transport reorders them.
    Causal,
    /// As [`DeliveryPolicy::Causal`], and additionally require the message
    /// to be the sender's next one (`T[s] == C[s] + 1`).
    #[default]
    CausalFifo,
}

/// Result of handing a received message to the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The message was delivered, followed by every buffered message it
    /// unblocked, in delivery order.
    Delivered(Vec<Message>),
    /// The message waits for causal predecessors.
    Buffered,
    /// The message was already delivered or buffered.
    Duplicate,
    /// The sender is not a member of the cluster; the message was dropped.
    UnknownSender(ProcessId),
    /// The stamp carries no event for its own sender, so no send produced
    /// it; the message was dropped.
    InvalidStamp(ProcessId),
}

/// Clock, pending buffer and delivered log of one process.
#[derive(Debug)]
pub struct DeliveryEngine {
    membership: Membership,
    policy: DeliveryPolicy,
    clock: VectorClock,
    pending: PendingSet,
    log: DeliveredLog,
    /// Identities of every delivered or pending message.
    seen: HashSet<MessageId>,
}

impl DeliveryEngine {
    pub fn new(
        owner: ProcessId,
        membership: Membership,
        policy: DeliveryPolicy,
    ) -> Result<Self, MembershipError> {
        let clock = VectorClock::new(owner, &membership)?;
        Ok(Self {
            membership,
            policy,
            clock,
            pending: PendingSet::new(),
            log: DeliveredLog::new(),
            seen: HashSet::new(),
        })
    }

    pub fn owner(&self) -> &ProcessId {
        self.clock.owner()
    }

    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// Stamp and deliver a locally sent message.
    ///
    /// The returned message is already in the delivered log; the caller is
    /// responsible for broadcasting it.
    pub fn send(&mut self, content: impl Into<String>) -> Message {
        self.clock.increment();
        let message = Message::new(self.owner().clone(), content, self.clock.snapshot());

        self.seen.insert(message.id(&self.membership));
        self.log.append(message.clone());
        self.drain();

        message
    }

    /// Handle a message received from the network.
    pub fn ingest(&mut self, message: Message) -> IngestOutcome {
        let sender = message.sender().clone();
        if !self.membership.contains(&sender) {
            return IngestOutcome::UnknownSender(sender);
        }
        if message.stamp().get(sender.as_str()) == 0 {
            return IngestOutcome::InvalidStamp(sender);
        }

        let id = message.id(&self.membership);
        if self.seen.contains(&id) || self.is_stale(&message) {
            return IngestOutcome::Duplicate;
        }
        self.seen.insert(id);

        if self.is_deliverable(&message) {
            self.clock.merge(message.stamp());
            self.log.append(message.clone());

            let mut delivered = vec![message];
            delivered.extend(self.drain());
            IngestOutcome::Delivered(delivered)
        } else {
            self.pending.insert(message);
            IngestOutcome::Buffered
        }
    }

    /// Decode a wire frame and ingest it.
    ///
    /// A malformed frame returns an error and leaves the engine untouched.
    pub fn ingest_raw(&mut self, frame: &[u8]) -> Result<IngestOutcome, WireError> {
        let message = Message::decode(frame)?;
        Ok(self.ingest(message))
    }

    /// Whether `message` could be delivered against the current clock.
    pub fn is_deliverable(&self, message: &Message) -> bool {
        deliverable(&self.clock, &self.membership, self.policy, message)
    }

    /// Under FIFO ordering, a message not ahead of our view of its sender
    /// has already been delivered.
    fn is_stale(&self, message: &Message) -> bool {
        self.policy == DeliveryPolicy::CausalFifo
            && message.stamp().get(message.sender().as_str())
                <= self.clock.get(message.sender().as_str())
    }

    /// Deliver buffered messages until a full pass delivers nothing.
    fn drain(&mut self) -> Vec<Message> {
        let mut delivered = Vec::new();

        loop {
            let Self {
                membership,
                policy,
                clock,
                pending,
                ..
            } = self;
            let policy = *policy;

            let pass = pending.take_pass(|message| {
                if deliverable(clock, membership, policy, message) {
                    clock.merge(message.stamp());
                    true
                } else {
                    false
                }
            });

            if pass.is_empty() {
                break;
            }

            for message in pass {
                self.log.append(message.clone());
                delivered.push(message);
            }
        }

        delivered
    }

    /// Snapshot of the current clock.
    pub fn clock(&self) -> Timestamp {
        self.clock.snapshot()
    }

    pub fn delivered(&self) -> &DeliveredLog {
        &self.log
    }

    pub fn delivered_since(&self, cursor: usize) -> &[Message] {
        self.log.since(cursor)
    }

    pub fn pending(&self) -> &PendingSet {
        &self.pending
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

fn deliverable(
    clock: &VectorClock,
    membership: &Membership,
    policy: DeliveryPolicy,
    message: &Message,
) -> bool {
    let sender = message.sender();
    let stamp = message.stamp();

    let predecessors_seen = membership
        .iter()
        .filter(|p| *p != sender)
        .all(|p| clock.get(p.as_str()) >= stamp.get(p.as_str()));

    match policy {
        DeliveryPolicy::Causal => predecessors_seen,
        DeliveryPolicy::CausalFifo => {
            predecessors_seen && stamp.get(sender.as_str()) == clock.get(sender.as_str()) + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(owner: &str, n: usize, policy: DeliveryPolicy) -> DeliveryEngine {
        DeliveryEngine::new(owner.into(), Membership::numbered(n), policy).unwrap()
    }

    fn stamped(sender: &str, content: &str, entries: &[(&str, u64)]) -> Message {
        Message::new(
            sender.into(),
            content,
            Timestamp::from_entries(entries.iter().map(|&(p, n)| (p, n))),
        )
    }

    fn contents(messages: &[Message]) -> Vec<&str> {
        messages.iter().map(|m| m.content()).collect()
    }

    #[test]
    fn test_send_delivers_locally() {
        let mut node = engine("0", 3, DeliveryPolicy::CausalFifo);
        let first = node.send("a");
        let second = node.send("b");

        assert_eq!(first.stamp().get("0"), 1);
        assert_eq!(second.stamp().get("0"), 2);
        assert!(first.stamp().happens_before(second.stamp()));
        assert_eq!(contents(node.delivered().entries()), vec!["a", "b"]);
        assert_eq!(node.clock().get("0"), 2);
    }

    #[test]
    fn test_sent_stamp_is_a_copy() {
        let mut node = engine("0", 2, DeliveryPolicy::CausalFifo);
        let first = node.send("a");
        node.send("b");
        assert_eq!(first.stamp().get("0"), 1);
    }

    #[test]
    fn test_ingest_ready_message() {
        let mut node = engine("2", 3, DeliveryPolicy::CausalFifo);
        let outcome = node.ingest(stamped("0", "m0", &[("0", 1)]));

        assert!(matches!(outcome, IngestOutcome::Delivered(ref m) if m.len() == 1));
        assert_eq!(node.clock().get("0"), 1);
    }

    #[test]
    fn test_ingest_buffers_until_dependency_arrives() {
        let mut node = engine("2", 3, DeliveryPolicy::CausalFifo);

        // m1 from 1 was sent after 1 delivered m0 from 0.
        let m0 = stamped("0", "m0", &[("0", 1)]);
        let m1 = stamped("1", "m1", &[("0", 1), ("1", 1)]);

        assert_eq!(node.ingest(m1), IngestOutcome::Buffered);
        assert_eq!(node.pending_count(), 1);
        assert!(node.delivered().is_empty());

        match node.ingest(m0) {
            IngestOutcome::Delivered(delivered) => {
                assert_eq!(contents(&delivered), vec!["m0", "m1"]);
            }
            other => panic!("expected delivery, got {:?}", other),
        }
        assert_eq!(node.pending_count(), 0);
        assert_eq!(node.clock().get("1"), 1);
    }

    #[test]
    fn test_drain_reaches_fixed_point() {
        let mut node = engine("3", 4, DeliveryPolicy::CausalFifo);

        // Chain a -> b -> c, buffered in reverse arrival order.
        let a = stamped("0", "a", &[("0", 1)]);
        let b = stamped("1", "b", &[("0", 1), ("1", 1)]);
        let c = stamped("2", "c", &[("0", 1), ("1", 1), ("2", 1)]);

        assert_eq!(node.ingest(c), IngestOutcome::Buffered);
        assert_eq!(node.ingest(b), IngestOutcome::Buffered);

        match node.ingest(a) {
            IngestOutcome::Delivered(delivered) => {
                assert_eq!(contents(&delivered), vec!["a", "b", "c"]);
            }
            other => panic!("expected delivery, got {:?}", other),
        }
        assert!(node.pending().is_empty());
    }

    #[test]
    fn test_drain_requires_second_pass() {
        let mut node = engine("3", 4, DeliveryPolicy::CausalFifo);

        let a = stamped("0", "a", &[("0", 1)]);
        let b = stamped("1", "b", &[("0", 1), ("1", 1)]);
        let c = stamped("2", "c", &[("0", 1), ("1", 1), ("2", 1)]);

        // c is scanned before b in the first pass, so only a second pass
        // can deliver it.
        node.ingest(c);
        node.ingest(b);
        let outcome = node.ingest(a);
        assert!(matches!(outcome, IngestOutcome::Delivered(ref m) if m.len() == 3));
    }

    #[test]
    fn test_independent_messages_are_not_blocked() {
        let mut node = engine("3", 4, DeliveryPolicy::CausalFifo);

        // Depends on an m0 that never arrives.
        let blocked = stamped("1", "blocked", &[("0", 1), ("1", 1)]);
        let free = stamped("2", "free", &[("2", 1)]);

        assert_eq!(node.ingest(blocked), IngestOutcome::Buffered);
        assert!(matches!(node.ingest(free), IngestOutcome::Delivered(_)));
        assert_eq!(node.pending_count(), 1);
    }

    #[test]
    fn test_duplicate_ingest_is_ignored() {
        for policy in [DeliveryPolicy::Causal, DeliveryPolicy::CausalFifo] {
            let mut node = engine("1", 2, policy);
            let m = stamped("0", "once", &[("0", 1)]);

            assert!(matches!(node.ingest(m.clone()), IngestOutcome::Delivered(_)));
            assert_eq!(node.ingest(m), IngestOutcome::Duplicate);
            assert_eq!(node.delivered().len(), 1);
        }
    }

    #[test]
    fn test_duplicate_of_pending_is_ignored() {
        let mut node = engine("2", 3, DeliveryPolicy::Causal);
        let m = stamped("1", "waiting", &[("0", 1), ("1", 1)]);

        assert_eq!(node.ingest(m.clone()), IngestOutcome::Buffered);
        assert_eq!(node.ingest(m), IngestOutcome::Duplicate);
        assert_eq!(node.pending_count(), 1);
    }

    #[test]
    fn test_own_echo_is_duplicate() {
        for policy in [DeliveryPolicy::Causal, DeliveryPolicy::CausalFifo] {
            let mut node = engine("0", 2, policy);
            let sent = node.send("mine");
            assert_eq!(node.ingest(sent), IngestOutcome::Duplicate);
            assert_eq!(node.delivered().len(), 1);
        }
    }

    #[test]
    fn test_unknown_sender_dropped() {
        let mut node = engine("0", 2, DeliveryPolicy::CausalFifo);
        let outcome = node.ingest(stamped("mallory", "?", &[("mallory", 1)]));

        assert_eq!(outcome, IngestOutcome::UnknownSender(ProcessId::new("mallory")));
        assert!(node.delivered().is_empty());
        assert_eq!(node.pending_count(), 0);
    }

    #[test]
    fn test_zero_sender_entry_rejected() {
        for policy in [DeliveryPolicy::Causal, DeliveryPolicy::CausalFifo] {
            let mut node = engine("1", 2, policy);
            let outcome = node.ingest(stamped("0", "unsent", &[("0", 0), ("1", 0)]));

            assert_eq!(outcome, IngestOutcome::InvalidStamp(ProcessId::new("0")));
            assert!(node.delivered().is_empty());
            assert_eq!(node.pending_count(), 0);

            // The real first message from 0 still goes through.
            assert!(matches!(
                node.ingest(stamped("0", "first", &[("0", 1)])),
                IngestOutcome::Delivered(_)
            ));
        }
    }

    #[test]
    fn test_unknown_stamp_entries_ignored() {
        let mut node = engine("1", 2, DeliveryPolicy::CausalFifo);
        let m = stamped("0", "hi", &[("0", 1), ("ghost", 5)]);

        assert!(matches!(node.ingest(m), IngestOutcome::Delivered(_)));
        assert_eq!(node.clock().get("ghost"), 0);
        assert_eq!(node.clock().len(), 2);
    }

    #[test]
    fn test_malformed_frame_leaves_state_unchanged() {
        let mut node = engine("1", 2, DeliveryPolicy::CausalFifo);
        node.ingest(stamped("0", "before", &[("0", 1)]));
        let clock = node.clock();

        assert!(node.ingest_raw(b"{\"sender_id\": 0").is_err());
        assert_eq!(node.clock(), clock);
        assert_eq!(node.delivered().len(), 1);
        assert_eq!(node.pending_count(), 0);

        let next = stamped("0", "after", &[("0", 2)]).encode().unwrap();
        assert!(matches!(node.ingest_raw(&next), Ok(IngestOutcome::Delivered(_))));
    }

    #[test]
    fn test_fifo_policy_holds_back_sender_gaps() {
        let mut node = engine("1", 2, DeliveryPolicy::CausalFifo);
        let second = stamped("0", "second", &[("0", 2)]);
        let first = stamped("0", "first", &[("0", 1)]);

        assert_eq!(node.ingest(second), IngestOutcome::Buffered);
        match node.ingest(first) {
            IngestOutcome::Delivered(delivered) => {
                assert_eq!(contents(&delivered), vec!["first", "second"]);
            }
            other => panic!("expected delivery, got {:?}", other),
        }
    }

    #[test]
    fn test_causal_policy_allows_sender_gaps() {
        let mut node = engine("1", 2, DeliveryPolicy::Causal);
        let second = stamped("0", "second", &[("0", 2)]);
        let first = stamped("0", "first", &[("0", 1)]);

        assert!(matches!(node.ingest(second), IngestOutcome::Delivered(_)));
        assert!(matches!(node.ingest(first), IngestOutcome::Delivered(_)));
        assert_eq!(contents(node.delivered().entries()), vec!["second", "first"]);
    }

    #[test]
    fn test_delivered_since() {
        let mut node = engine("0", 2, DeliveryPolicy::CausalFifo);
        node.send("a");
        node.send("b");
        node.send("c");

        assert_eq!(contents(node.delivered_since(1)), vec!["b", "c"]);
        assert!(node.delivered_since(3).is_empty());
    }

    #[test]
    fn test_default_policy_is_fifo() {
        assert_eq!(DeliveryPolicy::default(), DeliveryPolicy::CausalFifo);
    }
}
