//! Capped, role-tagged conversation history shared across provider calls

use crate::models::{Message, Role};

/// Default capacity: the system prompt plus the four most recent messages
pub const DEFAULT_HISTORY_CAP: usize = 5;

/// Ordered chat history whose first element is always the system prompt.
///
/// The buffer never grows past `cap`; when it would, the oldest non-system
/// messages are dropped first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationBuffer {
    messages: Vec<Message>,
    cap: usize,
}

impl ConversationBuffer {
    /// `cap` is clamped to at least 2 so one exchange always fits next to
    /// the system prompt.
    pub fn new(system_prompt: impl Into<String>, cap: usize) -> Self {
        Self {
            messages: vec![Message::system(system_prompt)],
            cap: cap.max(2),
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn system_prompt(&self) -> &str {
        &self.messages[0].content
    }

    /// Appends a message and truncates. System messages after the head are
    /// rejected so the head invariant cannot be broken from outside.
    pub fn push(&mut self, message: Message) {
        if message.role == Role::System {
            return;
        }
        self.messages.push(message);
        self.truncate();
    }

    /// Returns a copy of the history followed by `message`, truncated to the
    /// cap. This is the payload sent to a provider.
    pub fn with_pending(&self, message: Message) -> Vec<Message> {
        let mut pending = self.clone();
        pending.push(message);
        pending.messages
    }

    /// Resets the buffer to just the system prompt.
    pub fn clear(&mut self) {
        self.messages.truncate(1);
    }

    fn truncate(&mut self) {
        if self.messages.len() <= self.cap {
            return;
        }
        let keep_from = self.messages.len() - (self.cap - 1);
        let mut kept = Vec::with_capacity(self.cap);
        kept.push(self.messages[0].clone());
        kept.extend(self.messages[keep_from..].iter().cloned());
        self.messages = kept;
    }
}
