use crate::render::{Bubble, Renderer, Transcript};
use crate::session::ChatSession;
use crate::settings::GenerationSettings;
use crate::types::Role;
use crate::views::shared::{format_message_timestamp, markdown_to_html};
use dioxus::events::Key;
use dioxus::prelude::*;
use std::time::Duration;

const SCROLL_TO_BOTTOM: &str =
    "document.getElementById('chat-list')?.lastElementChild?.scrollIntoView({block: 'end'});";

/// Pushes turn updates into the transcript signal the message list renders.
struct SignalRenderer {
    transcript: Signal<Transcript>,
}

impl SignalRenderer {
    fn apply(&mut self, update: impl FnOnce(&mut Transcript)) {
        self.transcript.with_mut(update);
        let _ = document::eval(SCROLL_TO_BOTTOM);
    }
}

impl Renderer for SignalRenderer {
    fn push_user(&mut self, content: &str) {
        self.apply(|t| t.push_user(content));
    }

    fn push_assistant(&mut self, content: &str, elapsed: Duration) {
        self.apply(|t| t.push_assistant(content, elapsed));
    }

    fn begin_assistant(&mut self) {
        self.apply(|t| t.begin_assistant());
    }

    fn update_assistant(&mut self, content: &str) {
        self.apply(|t| t.update_assistant(content));
    }

    fn finish_assistant(&mut self, elapsed: Duration) {
        self.apply(|t| t.finish_assistant(elapsed));
    }

    fn fail_assistant(&mut self, message: &str) {
        self.apply(|t| t.fail_assistant(message));
    }

    fn show_error(&mut self, message: &str) {
        self.apply(|t| t.show_error(message));
    }
}

#[component]
pub fn ChatView(
    settings: Signal<GenerationSettings>,
    transcript: Signal<Transcript>,
) -> Element {
    let session = use_context::<ChatSession>();
    let mut input = use_signal(String::new);
    let sending = use_signal(|| false);

    let mut send_message = {
        let mut sending_signal = sending;
        let mut input_signal = input;
        move |text: String| {
            if text.trim().is_empty() || sending_signal() {
                return;
            }
            input_signal.set(String::new());
            sending_signal.set(true);

            let session = consume_context::<ChatSession>();
            let snapshot = settings();
            spawn(async move {
                let mut renderer = SignalRenderer { transcript };
                if let Err(err) = session.send(&text, &snapshot, &mut renderer).await {
                    tracing::warn!("turn ended without a reply: {err}");
                }
                sending_signal.set(false);
            });
        }
    };

    let bubbles = transcript.read().bubbles().to_vec();

    rsx! {
        div { class: "main-container",
            div { id: "chat-list", class: "chat-list",
                for bubble in bubbles.iter() {
                    MessageRow { bubble: bubble.clone() }
                }
            }

            form { class: "composer",
                textarea {
                    rows: "1", placeholder: "Type a message…",
                    value: "{input}", oninput: move |ev| input.set(ev.value()),
                    onkeydown: move |ev| {
                        if ev.key() == Key::Enter && !ev.modifiers().shift() {
                            ev.prevent_default();
                            let text = input();
                            send_message(text);
                        }
                    },
                    disabled: sending(), autofocus: true,
                }
                if sending() {
                    button {
                        class: "btn", r#type: "button",
                        onclick: move |_| session.cancel_current(),
                        "Stop"
                    }
                } else {
                    button {
                        class: "btn btn-primary", r#type: "button",
                        disabled: input().trim().is_empty(),
                        onclick: move |_| {
                            let text = input();
                            send_message(text);
                        },
                        "Send"
                    }
                }
            }
        }
    }
}

#[component]
fn MessageRow(bubble: Bubble) -> Element {
    let role_class = match bubble.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let bubble_class = if bubble.is_error {
        "bubble assistant error"
    } else {
        match bubble.role {
            Role::User => "bubble user",
            Role::Assistant => "bubble assistant",
        }
    };
    let timestamp = format_message_timestamp(bubble.created_at);
    let elapsed = bubble.elapsed_label();

    rsx! {
        div { class: format_args!("message-row {}", role_class),
            div { class: "{bubble_class}",
                if bubble.is_streaming && bubble.content.is_empty() {
                    span { class: "shimmer-text", "Processing…" }
                } else if matches!(bubble.role, Role::Assistant) && !bubble.is_error {
                    div { class: "md", dangerous_inner_html: "{markdown_to_html(&bubble.content)}" }
                } else {
                    "{bubble.content}"
                }
            }
            div { class: "message-meta",
                if let Some(ts) = timestamp {
                    span { class: "message-timestamp", "{ts}" }
                }
                if let Some(elapsed) = elapsed {
                    span { class: "message-metrics", "{elapsed}" }
                }
            }
        }
    }
}
