//! FIFO of inbound messages waiting to trigger a run.

use std::collections::VecDeque;

use clickflow_core::types::InboundMessage;

/// Messages in arrival order. A message id is accepted at most once while
/// it is queued.
#[derive(Debug, Default, Clone)]
pub struct MessageQueue {
    items: VecDeque<InboundMessage>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message. Returns false if one with the same id is queued.
    pub fn push(&mut self, message: InboundMessage) -> bool {
        if self.items.iter().any(|m| m.id == message.id) {
            return false;
        }
        self.items.push_back(message);
        true
    }

    /// Put a message back at the head after a failed hand-off.
    pub fn push_front(&mut self, message: InboundMessage) {
        if !self.items.iter().any(|m| m.id == message.id) {
            self.items.push_front(message);
        }
    }

    pub fn front(&self) -> Option<&InboundMessage> {
        self.items.front()
    }

    pub fn pop_front(&mut self) -> Option<InboundMessage> {
        self.items.pop_front()
    }

    /// Drop everything, returning how many messages were discarded.
    pub fn clear(&mut self) -> usize {
        let n = self.items.len();
        self.items.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InboundMessage> {
        self.items.iter()
    }
}
