use crate::config::ChatConfig;
use crate::render::Transcript;
use crate::session::ChatSession;
use crate::settings::SettingsStore;
use crate::storage::platform_store;
use crate::views::{ChatView, SettingsView};
use dioxus::prelude::*;

const BASE_CSS: &str = r#"
body { margin: 0; font-family: system-ui, sans-serif; }
.header { display: flex; gap: 1rem; padding: 0.75rem 1rem; border-bottom: 1px solid #ddd; }
.tab { cursor: pointer; font-size: 1rem; margin: 0; opacity: 0.6; }
.tab.active { opacity: 1; }
.tab-panel { display: none; }
.tab-panel.active { display: block; }
.chat-list { display: flex; flex-direction: column; gap: 0.75rem; padding: 1rem; }
.message-row.user { align-self: flex-end; }
.message-row.assistant { align-self: flex-start; }
.bubble { padding: 0.5rem 0.75rem; border-radius: 0.5rem; max-width: 40rem; }
.bubble.user { background: #1f2937; color: #fff; white-space: pre-wrap; }
.bubble.assistant { background: #f3f4f6; }
.bubble.error { background: #fee2e2; color: #991b1b; }
.message-meta { font-size: 0.75rem; color: #6b7280; display: flex; gap: 0.5rem; }
.composer { display: flex; gap: 0.5rem; padding: 1rem; }
.composer textarea { flex: 1; }
.settings-section { padding: 1rem; display: grid; gap: 0.5rem; max-width: 24rem; }
.toast { position: fixed; bottom: 1rem; right: 1rem; padding: 0.5rem 1rem; background: #065f46; color: #fff; border-radius: 0.5rem; }
"#;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AppTab {
    Chat,
    Settings,
}

#[component]
pub fn App() -> Element {
    let config = use_context::<ChatConfig>();
    let store = use_hook(|| SettingsStore::new(platform_store(config.data_dir.as_deref())));
    let session = use_hook(|| ChatSession::from_config(&config));
    let settings = use_signal(|| store.load());
    let transcript = use_signal(Transcript::new);
    let active_tab = use_signal(|| AppTab::Chat);

    use_context_provider(|| store.clone());
    use_context_provider(|| session.clone());

    rsx! {
        style { dangerous_inner_html: "{BASE_CSS}" }
        div { class: "header",
            TabButton { active_tab, tab: AppTab::Chat, label: "Chat" }
            TabButton { active_tab, tab: AppTab::Settings, label: "Settings" }
        }
        TabPanel {
            active_tab,
            tab: AppTab::Chat,
            children: rsx!( ChatView { settings, transcript } ),
        }
        TabPanel {
            active_tab,
            tab: AppTab::Settings,
            children: rsx!( SettingsView { settings, transcript } ),
        }
    }
}

#[component]
fn TabPanel(active_tab: Signal<AppTab>, tab: AppTab, children: Element) -> Element {
    let is_active = active_tab() == tab;
    let class_suffix = if is_active { "active" } else { "" };
    rsx! {
        div {
            class: format_args!("tab-panel {}", class_suffix),
            aria_hidden: (!is_active).to_string(),
            {children}
        }
    }
}

#[component]
fn TabButton(active_tab: Signal<AppTab>, tab: AppTab, label: &'static str) -> Element {
    let mut active_tab = active_tab;
    let class = if active_tab() == tab {
        "tab active"
    } else {
        "tab"
    };
    rsx! {
        h1 {
            class: class,
            onclick: move |_| active_tab.set(tab),
            "{label}"
        }
    }
}
