use super::*;
use serde_json::json;

#[test]
fn decode_inbound_reads_event_and_payload() {
    let text = r#"{"type":"notify","event":"agent.step","payload":{"step":1,"max_steps":20}}"#;
    let Inbound::Envelope(envelope) = decode_inbound(text) else {
        panic!("expected envelope");
    };
    assert_eq!(envelope.event, "agent.step");
    assert_eq!(envelope.payload, json!({"step": 1, "max_steps": 20}));
}

#[test]
fn decode_inbound_defaults_missing_payload_to_null() {
    let Inbound::Envelope(envelope) = decode_inbound(r#"{"event":"agent.finished"}"#) else {
        panic!("expected envelope");
    };
    assert_eq!(envelope.payload, Value::Null);
}

#[test]
fn decode_inbound_keeps_malformed_json_as_opaque_text() {
    let inbound = decode_inbound("{not json");
    assert_eq!(inbound, Inbound::Opaque("{not json".to_owned()));
}

#[test]
fn decode_inbound_keeps_non_object_json_as_opaque_text() {
    assert_eq!(decode_inbound("[1,2]"), Inbound::Opaque("[1,2]".to_owned()));
    assert_eq!(decode_inbound("\"hi\""), Inbound::Opaque("\"hi\"".to_owned()));
}

#[test]
fn decode_inbound_wraps_eventless_object_as_payload() {
    let Inbound::Envelope(envelope) = decode_inbound(r#"{"id":"m1","role":"user"}"#) else {
        panic!("expected envelope");
    };
    assert_eq!(envelope.event, "");
    assert_eq!(envelope.payload, json!({"id": "m1", "role": "user"}));
}

#[test]
fn decode_inbound_ignores_non_string_event_field() {
    let Inbound::Envelope(envelope) = decode_inbound(r#"{"event":5,"payload":{}}"#) else {
        panic!("expected envelope");
    };
    assert_eq!(envelope.event, "");
    assert_eq!(envelope.payload, json!({"event": 5, "payload": {}}));
}

#[test]
fn decode_inbound_bytes_handles_utf8_and_garbage() {
    let inbound = decode_inbound_bytes(br#"{"event":"agent.step","payload":null}"#);
    assert!(matches!(inbound, Inbound::Envelope(ref e) if e.event == "agent.step"));

    let inbound = decode_inbound_bytes(&[0xff, 0xfe, 0x41]);
    assert!(matches!(inbound, Inbound::Opaque(_)));
}

#[test]
fn encode_outbound_produces_compact_json() {
    assert_eq!(encode_outbound(&json!({"ping": true})), r#"{"ping":true}"#);
}

#[test]
fn decode_message_rejects_non_objects() {
    let err = decode_message(&json!("m1")).expect_err("string is not a message");
    assert!(matches!(err, WireError::NotAnObject));
}

#[test]
fn decode_message_reports_missing_role() {
    let err = decode_message(&json!({"id": "m1"})).expect_err("role is required");
    assert!(matches!(err, WireError::Message(_)));
}

#[test]
fn decode_message_accepts_backend_payload() {
    let msg = decode_message(&json!({
        "id": "7d1c",
        "conversation_id": "c1",
        "role": "assistant",
        "content": "hi",
        "tool_calls": null,
        "tool_call_id": null,
        "base64_image": null,
        "created_at": "2024-05-01T10:00:00.123456+00:00",
        "updated_at": "2024-05-01T10:00:00.123456+00:00"
    }))
    .expect("decode");
    assert_eq!(msg.id, "7d1c");
    assert_eq!(msg.role, Role::Assistant);
    assert_eq!(msg.text(), Some("hi"));
    assert!(msg.tool_calls.is_empty());
    assert!(msg.updated_at.is_some());
}
