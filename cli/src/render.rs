//! Plain-text rendering of a conversation view for the terminal.

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;

use std::collections::HashSet;

use client::{ConnectionState, RenderedEntry, RenderedToolCall, ViewState};
use wire::{Conversation, Message, format_timestamp};

const RESULT_PREVIEW_CHARS: usize = 200;

/// One-line summary: title, model, counters.
#[must_use]
pub fn format_header(conversation: Option<&Conversation>, message_count: u64, total_cost: f64) -> String {
    let title = conversation.and_then(|c| c.title.as_deref()).unwrap_or("(untitled)");
    let model = conversation
        .and_then(|c| c.llm_model.as_deref())
        .map(|model| format!(" [{model}]"))
        .unwrap_or_default();
    format!("{title}{model} | {message_count} messages | ${total_cost:.4}")
}

/// One row of `list`: id, title, model.
#[must_use]
pub fn format_conversation_row(conversation: &Conversation) -> String {
    let title = conversation.title.as_deref().unwrap_or("(untitled)");
    match conversation.llm_model.as_deref() {
        Some(model) => format!("{}  {title}  [{model}]", conversation.id),
        None => format!("{}  {title}", conversation.id),
    }
}

#[must_use]
pub fn format_entry(entry: &RenderedEntry) -> String {
    match entry {
        RenderedEntry::Message { message, pending, tool_calls } => {
            let mut lines = vec![message_line(message, *pending)];
            lines.extend(tool_calls.iter().flat_map(tool_call_lines));
            lines.join("\n")
        }
        RenderedEntry::Placeholder { label, .. } => format!("... {label}"),
    }
}

#[must_use]
pub fn format_transcript(entries: &[RenderedEntry]) -> String {
    entries.iter().map(format_entry).collect::<Vec<_>>().join("\n")
}

fn message_line(message: &Message, pending: bool) -> String {
    let mut line = format!("[{}] {}:", format_timestamp(message.created_at), message.role.as_str());
    if let Some(text) = message.text() {
        line.push(' ');
        line.push_str(text);
    }
    if message.has_image() {
        line.push_str(" [image]");
    }
    if pending {
        line.push_str(" (sending)");
    }
    line
}

fn call_line(rendered: &RenderedToolCall) -> String {
    let arguments = rendered
        .call
        .arguments
        .to_value()
        .map_or_else(|| "<invalid arguments>".to_owned(), |value| value.to_string());
    format!("  -> {}({arguments})", rendered.call.name)
}

fn tool_call_lines(rendered: &RenderedToolCall) -> Vec<String> {
    let mut lines = vec![call_line(rendered)];
    if let Some(result) = &rendered.result {
        lines.push(format!("     = {}", preview(result.text().unwrap_or(""))));
    }
    lines
}

fn preview(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("");
    let mut preview: String = first_line.chars().take(RESULT_PREVIEW_CHARS).collect();
    if first_line.chars().count() > RESULT_PREVIEW_CHARS || text.lines().nth(1).is_some() {
        preview.push_str(" ...");
    }
    preview
}

fn connection_label(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Disconnected => "disconnected",
        ConnectionState::Connecting => "connecting",
        ConnectionState::Connected => "connected",
    }
}

/// Lines produced by one [`WatchPrinter::update`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct WatchOutput {
    /// Transcript lines, for stdout.
    pub transcript: Vec<String>,
    /// Activity and connection changes, for stderr.
    pub status: Vec<String>,
}

/// Incremental printer for `watch`: emits each confirmed message once, each
/// tool result once, and status changes.
#[derive(Debug, Default)]
pub struct WatchPrinter {
    printed_messages: HashSet<String>,
    printed_results: HashSet<String>,
    last_activity: Option<String>,
    last_connection: Option<ConnectionState>,
    last_error: Option<String>,
}

impl WatchPrinter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark everything already in `state` as printed without printing it.
    pub fn skip_existing(&mut self, state: &ViewState) {
        let _ = self.update(state);
    }

    pub fn update(&mut self, state: &ViewState) -> WatchOutput {
        let mut out = Vec::new();
        for entry in &state.entries {
            let RenderedEntry::Message { message, pending, tool_calls } = entry else {
                continue;
            };
            if *pending {
                continue;
            }
            if self.printed_messages.insert(message.id.clone()) {
                out.push(message_line(message, false));
                out.extend(tool_calls.iter().map(call_line));
            }
            for call in tool_calls {
                if let Some(result) = &call.result {
                    if self.printed_results.insert(call.call.id.clone()) {
                        out.push(format!("  <- {}: {}", call.call.name, preview(result.text().unwrap_or(""))));
                    }
                }
            }
        }

        let mut status = Vec::new();
        if self.last_connection != Some(state.connection) {
            status.push(format!("-- {}", connection_label(state.connection)));
            self.last_connection = Some(state.connection);
        }
        let activity = state.activity.label().map(str::to_owned);
        if activity != self.last_activity {
            status.push(match &activity {
                Some(label) => format!("... {label}"),
                None => "... idle".to_owned(),
            });
            self.last_activity = activity;
        }
        let error = state
            .channel_error
            .clone()
            .or_else(|| state.last_agent_error.clone())
            .or_else(|| state.last_error.as_ref().map(ToString::to_string));
        if error != self.last_error {
            if let Some(error) = &error {
                status.push(format!("!! {error}"));
            }
            self.last_error = error;
        }
        WatchOutput { transcript: out, status }
    }
}
