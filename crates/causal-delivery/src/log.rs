//! Append-only log of delivered messages.

use causal_core::{Message, ProcessId};

/// Messages in the order this process delivered them.
#[derive(Clone, Debug, Default)]
pub struct DeliveredLog {
    entries: Vec<Message>,
}

impl DeliveredLog {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn append(&mut self, message: Message) {
        self.entries.push(message);
    }

    /// Entries appended after the first `cursor` ones.
    ///
    /// A cursor past the end yields an empty slice.
    pub fn since(&self, cursor: usize) -> &[Message] {
        self.entries.get(cursor..).unwrap_or(&[])
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    /// `(sender, content)` pairs in delivery order.
    pub fn pairs(&self) -> Vec<(ProcessId, String)> {
        self.entries
            .iter()
            .map(|m| (m.sender().clone(), m.content().to_string()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
