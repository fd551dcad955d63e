use crate::render::{ToastSlot, Transcript};
use crate::session::ChatSession;
use crate::settings::{GenerationSettings, SettingsStore};
use crate::storage::PlatformStore;
use crate::views::shared::{Toast, show_toast};
use dioxus::prelude::*;

const REASONING_LEVELS: &[(&str, &str)] = &[
    ("", "Default"),
    ("low", "Low"),
    ("medium", "Medium"),
    ("high", "High"),
];

#[component]
pub fn SettingsView(
    settings: Signal<GenerationSettings>,
    transcript: Signal<Transcript>,
) -> Element {
    let mut settings = settings;
    let mut transcript = transcript;
    let store = use_context::<SettingsStore<PlatformStore>>();
    let session = use_context::<ChatSession>();
    let mut draft = use_signal(|| settings());
    let toast = use_signal(ToastSlot::default);
    let mut confirm_clear = use_signal(|| false);

    let on_save = move |_| {
        let next = draft();
        // Persistence is best effort; the session keeps the new values either way.
        if let Err(err) = store.save(&next) {
            tracing::warn!("failed to persist settings: {err}");
        }
        settings.set(next);
        show_toast(toast, "Settings saved");
    };

    let on_clear = move |_| {
        if !confirm_clear() {
            confirm_clear.set(true);
            return;
        }
        confirm_clear.set(false);
        match session.clear_history() {
            Ok(()) => transcript.with_mut(|t| t.clear()),
            Err(err) => show_toast(toast, &format!("Cannot clear: {err}")),
        }
    };

    let current = draft();

    rsx! {
        div { class: "main-container",
            div { class: "settings-section",
                h3 { class: "section-title", "Generation" }
                label { "Temperature"
                    input {
                        r#type: "number", min: "0", max: "2", step: "0.1",
                        value: "{current.temperature}",
                        oninput: move |ev| {
                            if let Ok(value) = ev.value().parse::<f32>() {
                                draft.with_mut(|d| d.temperature = value);
                            }
                        },
                    }
                }
                label { "Max tokens"
                    input {
                        r#type: "number", min: "1", step: "1",
                        value: "{current.max_tokens}",
                        oninput: move |ev| {
                            if let Ok(value) = ev.value().parse::<u32>() {
                                if value > 0 {
                                    draft.with_mut(|d| d.max_tokens = value);
                                }
                            }
                        },
                    }
                }
                label { "Reasoning effort"
                    select {
                        value: "{current.reasoning_effort}",
                        onchange: move |ev| draft.with_mut(|d| d.reasoning_effort = ev.value()),
                        for (value, label) in REASONING_LEVELS.iter().copied() {
                            option {
                                value: value,
                                selected: current.reasoning_effort == value,
                                "{label}"
                            }
                        }
                    }
                }
                label {
                    input {
                        r#type: "checkbox",
                        checked: current.streaming_mode,
                        onchange: move |ev| draft.with_mut(|d| d.streaming_mode = ev.checked()),
                    }
                    "Stream responses"
                }
                button { class: "btn btn-primary", r#type: "button", onclick: on_save, "Save" }
            }
            div { class: "settings-section",
                h3 { class: "section-title", "Conversation" }
                button {
                    class: "btn", r#type: "button", onclick: on_clear,
                    if confirm_clear() { "Click again to clear history" } else { "Clear history" }
                }
            }
            Toast { toast }
        }
    }
}
