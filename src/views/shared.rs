use crate::render::ToastSlot;
use comrak::plugins::syntect::SyntectAdapter;
use comrak::{ComrakOptions, ComrakPlugins, markdown_to_html_with_plugins};
use dioxus::prelude::*;
use once_cell::sync::Lazy;
use std::time::Duration;
use time::{OffsetDateTime, UtcOffset, format_description::FormatItem, macros::format_description};

pub const TOAST_HIDE_DELAY: Duration = Duration::from_secs(2);

static MARKDOWN_OPTIONS: Lazy<ComrakOptions> = Lazy::new(|| {
    let mut options = ComrakOptions::default();
    options.extension.table = true;
    options.extension.strikethrough = true;
    options.extension.tasklist = true;
    options
});

const MESSAGE_TIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[hour repr:12 padding:zero]:[minute padding:zero] [period case:upper]");

pub fn markdown_to_html(md: &str) -> String {
    let adapter = SyntectAdapter::new(Some("base16-ocean.dark"));
    let mut plugins = ComrakPlugins::default();
    plugins.render.codefence_syntax_highlighter = Some(&adapter);
    markdown_to_html_with_plugins(md, &MARKDOWN_OPTIONS, &plugins)
}

pub fn format_message_timestamp(timestamp: OffsetDateTime) -> Option<String> {
    let mut datetime = timestamp;
    if let Ok(offset) = UtcOffset::current_local_offset() {
        datetime = datetime.to_offset(offset);
    }
    datetime.format(MESSAGE_TIME_FORMAT).ok()
}

/// Shows `message` for [`TOAST_HIDE_DELAY`], then clears it.
pub fn show_toast(mut toast: Signal<ToastSlot>, message: &str) {
    let generation = toast.with_mut(|slot| slot.show(message));
    spawn(async move {
        tokio::time::sleep(TOAST_HIDE_DELAY).await;
        toast.with_mut(|slot| slot.hide(generation));
    });
}

#[component]
pub fn Toast(toast: Signal<ToastSlot>) -> Element {
    let message = toast.read().message().map(str::to_string);
    rsx! {
        if let Some(text) = message {
            div { class: "toast", role: "status", "{text}" }
        }
    }
}
