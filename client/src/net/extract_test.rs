use super::*;
use serde_json::json;
use wire::Role;

fn bare() -> Value {
    json!({ "id": "m1", "role": "assistant", "content": "hi", "created_at": "2025-01-01T00:00:00Z" })
}

fn expect_message(extraction: Extraction) -> Message {
    match extraction {
        Extraction::Message(message) => *message,
        other => panic!("expected a message, got {other:?}"),
    }
}

#[test]
fn extracts_bare_message() {
    let message = expect_message(MessageExtractor::default().extract(&bare()));
    assert_eq!(message.id, "m1");
    assert_eq!(message.role, Role::Assistant);
}

#[test]
fn extracts_nested_message() {
    let message = expect_message(MessageExtractor::default().extract(&json!({ "message": bare() })));
    assert_eq!(message.id, "m1");
}

#[test]
fn nested_string_field_is_not_a_message() {
    let payload = json!({ "message": "LLM did not call any tool" });
    assert!(matches!(MessageExtractor::default().extract(&payload), Extraction::Unmatched));
}

#[test]
fn agent_payloads_are_unmatched() {
    let extractor = MessageExtractor::default();
    for payload in [json!({ "tools": ["search"] }), json!({ "content": "thinking" }), Value::Null, json!([1, 2])] {
        assert!(matches!(extractor.extract(&payload), Extraction::Unmatched), "{payload}");
    }
}

#[test]
fn matched_shape_with_bad_fields_is_malformed() {
    let payload = json!({ "message": { "id": "m1", "role": "narrator" } });
    match MessageExtractor::default().extract(&payload) {
        Extraction::Malformed { shape, .. } => assert_eq!(shape, MessageShape::Nested("message".to_owned())),
        other => panic!("expected malformed, got {other:?}"),
    }
}

#[test]
fn added_shapes_extend_recognition() {
    let payload = json!({ "data": bare() });
    assert!(matches!(MessageExtractor::default().extract(&payload), Extraction::Unmatched));

    let extractor = MessageExtractor::default().with_shape(MessageShape::Nested("data".to_owned()));
    assert_eq!(expect_message(extractor.extract(&payload)).id, "m1");
    assert_eq!(extractor.shapes().len(), 3);
}

#[test]
fn configured_fields_are_tried_before_the_bare_shape() {
    let extractor = MessageExtractor::for_fields(&["data".to_owned(), "message".to_owned()]);
    assert_eq!(
        extractor.shapes(),
        &[
            MessageShape::Nested("data".to_owned()),
            MessageShape::Nested("message".to_owned()),
            MessageShape::Bare
        ]
    );
    assert_eq!(expect_message(extractor.extract(&json!({ "data": bare() }))).id, "m1");
    assert_eq!(MessageExtractor::for_fields(&["message".to_owned()]), MessageExtractor::default());
    assert_eq!(MessageExtractor::for_fields(&[]).shapes(), &[MessageShape::Bare]);
}

#[test]
fn duplicate_shapes_are_not_added_twice() {
    let extractor = MessageExtractor::empty().with_shape(MessageShape::Bare).with_shape(MessageShape::Bare);
    assert_eq!(extractor.shapes(), &[MessageShape::Bare]);
}

#[test]
fn empty_extractor_matches_nothing() {
    assert!(matches!(MessageExtractor::empty().extract(&bare()), Extraction::Unmatched));
}
