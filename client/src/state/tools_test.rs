use super::*;
use serde_json::json;
use time::OffsetDateTime;
use wire::ToolArguments;

fn call(id: &str, name: &str) -> ToolCall {
    ToolCall { id: id.to_owned(), name: name.to_owned(), arguments: ToolArguments::Structured(json!({})) }
}

fn assistant(id: &str, calls: Vec<ToolCall>) -> Message {
    Message::new(id, Role::Assistant, OffsetDateTime::UNIX_EPOCH).with_tool_calls(calls)
}

fn tool_result(id: &str, call_id: &str, content: &str) -> Message {
    Message::new(id, Role::Tool, OffsetDateTime::UNIX_EPOCH)
        .with_tool_call_id(call_id)
        .with_content(content)
}

#[test]
fn maps_invocation_to_its_result() {
    let mut tools = ToolCorrelator::new();
    tools.observe(&assistant("a1", vec![call("t1", "search")]));
    tools.observe(&tool_result("r1", "t1", "result"));

    assert!(tools.is_invoked("t1"));
    let result = tools.result_for("t1").expect("correlated");
    assert_eq!(result.id, "r1");
    assert_eq!(result.text(), Some("result"));
}

#[test]
fn first_result_wins() {
    let mut tools = ToolCorrelator::new();
    tools.observe(&assistant("a1", vec![call("t1", "search")]));
    tools.observe(&tool_result("r1", "t1", "first"));
    tools.observe(&tool_result("r2", "t1", "second"));
    assert_eq!(tools.result_for("t1").map(|m| m.id.as_str()), Some("r1"));
}

#[test]
fn result_before_invocation_still_correlates() {
    let tools = ToolCorrelator::build(&[
        tool_result("r1", "t1", "early"),
        assistant("a1", vec![call("t1", "search")]),
    ]);
    assert!(tools.result_for("t1").is_some());
    assert!(tools.is_invoked("t1"));
}

#[test]
fn orphan_tool_messages_are_flagged() {
    let mut tools = ToolCorrelator::new();
    tools.observe(&assistant("a1", vec![call("t1", "search")]));

    assert!(!tools.is_orphan(&tool_result("r1", "t1", "ok")));
    assert!(tools.is_orphan(&tool_result("r2", "t9", "stray")));
    assert!(tools.is_orphan(&Message::new("r3", Role::Tool, OffsetDateTime::UNIX_EPOCH)));
    assert!(!tools.is_orphan(&assistant("a2", vec![])));
}

#[test]
fn terminate_calls_never_enter_the_indexes() {
    let mut tools = ToolCorrelator::new();
    tools.observe(&assistant("a1", vec![call("t1", "search"), call("t2", "Terminate")]));
    tools.observe(&tool_result("r1", "t1", "ok"));
    tools.observe(&tool_result("r2", "t2", "done"));

    assert!(!tools.is_invoked("t2"));
    assert!(tools.result_for("t2").is_none());
    assert_eq!(tools.result_for("t1").map(|m| m.id.as_str()), Some("r1"));
}

#[test]
fn terminate_descriptor_arriving_late_drops_an_earlier_result() {
    let mut tools = ToolCorrelator::new();
    tools.observe(&tool_result("r1", "t1", "done"));
    tools.observe(&assistant("a1", vec![call("t1", "terminate")]));
    assert!(tools.result_for("t1").is_none());
}

#[test]
fn sentinel_helpers() {
    let message = assistant("a1", vec![call("t1", "search"), call("t2", "terminate")]);
    assert!(signals_terminate(&message));
    let names: Vec<&str> = displayable_calls(&message).map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["search"]);
    assert!(!signals_terminate(&assistant("a2", vec![call("t3", "search")])));
}

#[test]
fn calls_without_ids_are_ignored() {
    let mut tools = ToolCorrelator::new();
    tools.observe(&assistant("a1", vec![call("", "search")]));
    tools.observe(&tool_result("r1", "", "ok"));
    assert!(!tools.is_invoked(""));
    assert!(tools.result_for("").is_none());
}
