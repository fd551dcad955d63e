//! Sink for everything a chat turn shows to the user.

use crate::types::Role;
use std::time::Duration;
use time::OffsetDateTime;

/// Receives display updates from a running turn.
///
/// Streaming turns call `begin_assistant`, then `update_assistant` with the
/// full reply so far after every delta, then exactly one of
/// `finish_assistant` or `fail_assistant`.
pub trait Renderer {
    fn push_user(&mut self, content: &str);

    /// A complete assistant reply from a buffered exchange.
    fn push_assistant(&mut self, content: &str, elapsed: Duration);

    fn begin_assistant(&mut self);
    fn update_assistant(&mut self, content: &str);
    fn finish_assistant(&mut self, elapsed: Duration);

    /// Ends the in-progress bubble with an error in place of the reply.
    fn fail_assistant(&mut self, message: &str);

    /// Shows an error as a standalone assistant bubble.
    fn show_error(&mut self, message: &str);
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bubble {
    pub role: Role,
    pub content: String,
    pub elapsed: Option<Duration>,
    pub is_error: bool,
    pub is_streaming: bool,
    pub created_at: OffsetDateTime,
}

impl Bubble {
    fn new(role: Role, content: &str) -> Self {
        Self {
            role,
            content: content.to_string(),
            elapsed: None,
            is_error: false,
            is_streaming: false,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn error(message: &str) -> Self {
        Self {
            is_error: true,
            ..Self::new(Role::Assistant, message)
        }
    }

    pub fn elapsed_label(&self) -> Option<String> {
        self.elapsed.map(format_elapsed)
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    format!("{:.2}s", elapsed.as_secs_f64())
}

/// Ordered list of rendered bubbles; the message list of the UI.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transcript {
    bubbles: Vec<Bubble>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bubbles(&self) -> &[Bubble] {
        &self.bubbles
    }

    pub fn clear(&mut self) {
        self.bubbles.clear();
    }

    pub fn is_streaming(&self) -> bool {
        self.bubbles.last().is_some_and(|bubble| bubble.is_streaming)
    }

    fn streaming_bubble(&mut self) -> Option<&mut Bubble> {
        self.bubbles.last_mut().filter(|bubble| bubble.is_streaming)
    }
}

impl Renderer for Transcript {
    fn push_user(&mut self, content: &str) {
        self.bubbles.push(Bubble::new(Role::User, content));
    }

    fn push_assistant(&mut self, content: &str, elapsed: Duration) {
        let mut bubble = Bubble::new(Role::Assistant, content);
        bubble.elapsed = Some(elapsed);
        self.bubbles.push(bubble);
    }

    fn begin_assistant(&mut self) {
        let mut bubble = Bubble::new(Role::Assistant, "");
        bubble.is_streaming = true;
        self.bubbles.push(bubble);
    }

    fn update_assistant(&mut self, content: &str) {
        if let Some(bubble) = self.streaming_bubble() {
            bubble.content.clear();
            bubble.content.push_str(content);
        }
    }

    fn finish_assistant(&mut self, elapsed: Duration) {
        if let Some(bubble) = self.streaming_bubble() {
            bubble.elapsed = Some(elapsed);
            bubble.is_streaming = false;
        }
    }

    fn fail_assistant(&mut self, message: &str) {
        match self.streaming_bubble() {
            Some(bubble) => {
                bubble.content = message.to_string();
                bubble.is_error = true;
                bubble.is_streaming = false;
            }
            None => self.show_error(message),
        }
    }

    fn show_error(&mut self, message: &str) {
        self.bubbles.push(Bubble::error(message));
    }
}

/// Transient notice shown over the UI.
///
/// Every [`ToastSlot::show`] hands out a new generation, and
/// [`ToastSlot::hide`] only clears the notice it was given the generation
/// for, so an expired timer cannot hide a newer notice.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToastSlot {
    message: Option<String>,
    generation: u64,
}

impl ToastSlot {
    pub fn show(&mut self, message: &str) -> u64 {
        self.generation = self.generation.wrapping_add(1);
        self.message = Some(message.to_string());
        self.generation
    }

    pub fn hide(&mut self, generation: u64) {
        if self.generation == generation {
            self.message = None;
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_toast_timer_keeps_newer_message() {
        let mut toast = ToastSlot::default();
        let first = toast.show("Settings saved");
        let second = toast.show("Settings saved");

        toast.hide(first);
        assert_eq!(toast.message(), Some("Settings saved"));

        toast.hide(second);
        assert_eq!(toast.message(), None);
    }

    #[test]
    fn streaming_bubble_is_redrawn_then_finalized() {
        let mut transcript = Transcript::new();
        transcript.push_user("hello");
        transcript.begin_assistant();
        transcript.update_assistant("He");
        transcript.update_assistant("Hello");
        assert!(transcript.is_streaming());
        transcript.finish_assistant(Duration::from_millis(1250));

        let reply = &transcript.bubbles()[1];
        assert_eq!(reply.content, "Hello");
        assert_eq!(reply.elapsed_label().as_deref(), Some("1.25s"));
        assert!(!transcript.is_streaming());
    }

    #[test]
    fn failure_replaces_in_progress_bubble() {
        let mut transcript = Transcript::new();
        transcript.begin_assistant();
        transcript.update_assistant("partial");
        transcript.fail_assistant("Error: connection reset");

        assert_eq!(transcript.bubbles().len(), 1);
        let bubble = &transcript.bubbles()[0];
        assert!(bubble.is_error);
        assert_eq!(bubble.content, "Error: connection reset");
        assert_eq!(bubble.elapsed, None);
    }

    #[test]
    fn failure_without_bubble_appends_error() {
        let mut transcript = Transcript::new();
        transcript.push_user("hi");
        transcript.fail_assistant("Error: boom");
        assert_eq!(transcript.bubbles().len(), 2);
        assert_eq!(transcript.bubbles()[1].role, Role::Assistant);
    }
}
