use super::*;
use client::Activity;
use serde_json::json;
use wire::{Role, ToolArguments, ToolCall, parse_timestamp};

fn message(id: &str, role: Role, content: &str) -> Message {
    let created_at = parse_timestamp("2025-01-01T00:00:01Z").expect("valid timestamp");
    Message::new(id, role, created_at).with_content(content)
}

fn row(message: Message, tool_calls: Vec<RenderedToolCall>) -> RenderedEntry {
    RenderedEntry::Message { message, pending: false, tool_calls }
}

fn search_call(result: Option<Message>) -> RenderedToolCall {
    RenderedToolCall {
        call: ToolCall::new("t1", "search", ToolArguments::Encoded("{\"q\":\"rust\"}".to_owned())),
        result,
    }
}

fn state(entries: Vec<RenderedEntry>) -> ViewState {
    ViewState {
        conversation_id: "c1".to_owned(),
        conversation: None,
        entries,
        activity: Activity::Idle,
        turn_open: false,
        connection: ConnectionState::Connected,
        message_count: 0,
        total_cost: 0.0,
        last_error: None,
        last_agent_error: None,
        channel_error: None,
        mounted: true,
    }
}

#[test]
fn header_shows_title_model_and_counters() {
    let conversation: Conversation =
        serde_json::from_value(json!({ "id": "c1", "title": "Weather", "llm_model": "gpt-4o" })).unwrap();
    assert_eq!(format_header(Some(&conversation), 3, 0.5), "Weather [gpt-4o] | 3 messages | $0.5000");
    assert_eq!(format_header(None, 0, 0.0), "(untitled) | 0 messages | $0.0000");
}

#[test]
fn conversation_rows_show_id_title_and_model() {
    let titled: Conversation =
        serde_json::from_value(json!({ "id": "c1", "title": "Weather", "llm_model": "gpt-4o" })).unwrap();
    let bare: Conversation = serde_json::from_value(json!({ "id": "c2", "title": null })).unwrap();
    assert_eq!(format_conversation_row(&titled), "c1  Weather  [gpt-4o]");
    assert_eq!(format_conversation_row(&bare), "c2  (untitled)");
}

#[test]
fn entry_lists_calls_and_results_under_the_message() {
    let entry = row(
        message("a1", Role::Assistant, "Searching"),
        vec![search_call(Some(message("r1", Role::Tool, "found it\nmore")))],
    );
    assert_eq!(
        format_entry(&entry),
        "[2025-01-01T00:00:01Z] assistant: Searching\n  -> search({\"q\":\"rust\"})\n     = found it ..."
    );
}

#[test]
fn pending_rows_and_placeholders_are_marked() {
    let pending = RenderedEntry::Message {
        message: message("local-1", Role::User, "hi"),
        pending: true,
        tool_calls: Vec::new(),
    };
    let placeholder = RenderedEntry::Placeholder { id: "transient-1".to_owned(), label: "Thinking".to_owned() };

    assert_eq!(
        format_transcript(&[pending, placeholder]),
        "[2025-01-01T00:00:01Z] user: hi (sending)\n... Thinking"
    );
}

#[test]
fn undecodable_arguments_are_flagged() {
    let call = RenderedToolCall {
        call: ToolCall::new("t2", "browser", ToolArguments::Encoded("{not json".to_owned())),
        result: None,
    };
    let rendered = format_entry(&row(message("a1", Role::Assistant, ""), vec![call]));
    assert_eq!(rendered.lines().nth(1), Some("  -> browser(<invalid arguments>)"));
}

#[test]
fn watch_printer_emits_each_message_once() {
    let mut printer = WatchPrinter::new();
    let first = state(vec![row(message("m1", Role::User, "hello"), Vec::new())]);

    let output = printer.update(&first);
    assert_eq!(output.transcript, vec!["[2025-01-01T00:00:01Z] user: hello"]);
    assert_eq!(output.status, vec!["-- connected"]);

    assert_eq!(printer.update(&first), WatchOutput::default());
}

#[test]
fn watch_printer_skips_pending_rows_until_confirmed() {
    let mut printer = WatchPrinter::new();
    let pending = RenderedEntry::Message {
        message: message("local-1", Role::User, "hello"),
        pending: true,
        tool_calls: Vec::new(),
    };
    assert!(printer.update(&state(vec![pending])).transcript.is_empty());

    let confirmed = printer.update(&state(vec![row(message("m1", Role::User, "hello"), Vec::new())]));
    assert_eq!(confirmed.transcript.len(), 1);
}

#[test]
fn watch_printer_reports_late_tool_results() {
    let mut printer = WatchPrinter::new();
    let before = printer.update(&state(vec![row(message("a1", Role::Assistant, "Searching"), vec![search_call(None)])]));
    assert_eq!(before.transcript.len(), 2);

    let after = printer.update(&state(vec![row(
        message("a1", Role::Assistant, "Searching"),
        vec![search_call(Some(message("r1", Role::Tool, "42")))],
    )]));
    assert_eq!(after.transcript, vec!["  <- search: 42"]);
}

#[test]
fn watch_printer_reports_status_changes() {
    let mut printer = WatchPrinter::new();
    let mut current = state(Vec::new());
    printer.skip_existing(&current);

    current.activity = Activity::Working { label: "Thinking".to_owned(), placeholder_id: "transient-1".to_owned() };
    assert_eq!(printer.update(&current).status, vec!["... Thinking"]);

    current.connection = ConnectionState::Connecting;
    current.channel_error = Some("HTTP 401".to_owned());
    assert_eq!(printer.update(&current).status, vec!["-- connecting", "!! HTTP 401"]);
    assert!(printer.update(&current).status.is_empty());

    current.activity = Activity::Idle;
    assert_eq!(printer.update(&current).status, vec!["... idle"]);
}
