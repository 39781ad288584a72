//! Buffer of received messages waiting on causal predecessors.
//!
//! Messages leave the buffer only by being delivered. There is no timeout or
//! eviction: a message whose predecessor never arrives stays here for the
//! lifetime of the node, so operators should watch [`PendingSet::len`].

use causal_core::Message;

/// Messages received but not yet deliverable, in arrival order.
#[derive(Clone, Debug, Default)]
pub struct PendingSet {
    messages: Vec<Message>,
}

impl PendingSet {
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Buffer a message behind everything already pending.
    pub fn insert(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Make one pass over the buffer in arrival order.
    ///
    /// `ready` is asked about each message in turn; those it accepts are
    /// removed and returned in the order they were accepted. `ready` may
    /// change the state it inspects, so a message accepted early in the pass
    /// can make a later one ready within the same pass.
    pub fn take_pass<F>(&mut self, mut ready: F) -> Vec<Message>
    where
        F: FnMut(&Message) -> bool,
    {
        let mut taken = Vec::new();
        let mut kept = Vec::with_capacity(self.messages.len());

        for message in self.messages.drain(..) {
            if ready(&message) {
                taken.push(message);
            } else {
                kept.push(message);
            }
        }

        self.messages = kept;
        taken
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
