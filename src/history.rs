use crate::types::ChatMessage;

/// In-memory conversation for a single session.
///
/// Turns are only ever appended whole; the sequence is emptied as a unit by
/// [`History::clear`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct History {
    turns: Vec<ChatMessage>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(ChatMessage::assistant(content));
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[ChatMessage] {
        &self.turns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_in_order_and_clears() {
        let mut history = History::new();
        history.push_user("hello");
        history.push_assistant("hi there");

        assert_eq!(
            history.turns(),
            &[ChatMessage::user("hello"), ChatMessage::assistant("hi there")]
        );

        history.clear();
        assert!(history.turns().is_empty());
    }
}
