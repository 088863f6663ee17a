//! Bounded conversation history.

use std::collections::VecDeque;

/// Past assistant utterances, oldest first, bounded to `capacity` entries.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    entries: VecDeque<String>,
    capacity: usize,
}

impl ConversationHistory {
    /// Create an empty history holding at most `capacity` entries.
    ///
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an utterance, dropping the oldest entries beyond capacity.
    pub fn push(&mut self, utterance: impl Into<String>) {
        self.entries.push_back(utterance.into());
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Up to the last `limit` entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<String> {
        let skip = self.entries.len().saturating_sub(limit);
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
