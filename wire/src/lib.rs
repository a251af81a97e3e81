//! Shared wire model for the conversation REST API and live event channel.
//!
//! This crate owns the JSON representation used by both `client` and `cli`.
//! It intentionally keeps envelope payloads flexible (`serde_json::Value`):
//! the backend pushes several payload shapes for the same logical event, and
//! deciding which shape carries a message is the client's job, not the
//! codec's.
//!
//! ERROR HANDLING
//! ==============
//! Inbound channel frames never fail to decode. Anything that is not a JSON
//! object survives as [`Inbound::Opaque`] text so the listening loop can log
//! it and move on. Typed decoding of a message body is fallible and reported
//! through [`WireError`].

mod message;
mod timestamp;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use message::{
    Conversation, ConversationDetail, CreateConversationRequest, Message, Role, SubmitRequest, ToolArguments,
    ToolCall,
};
pub use timestamp::{format_timestamp, parse_timestamp};

/// Error returned by [`decode_message`].
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The value did not deserialize into a [`Message`].
    #[error("failed to decode message: {0}")]
    Message(#[from] serde_json::Error),
    /// The value is not a JSON object and cannot be a message.
    #[error("message payload is not a JSON object")]
    NotAnObject,
}

/// The outer `{event, payload}` wrapper delivered over the live channel.
///
/// The backend also sends a `type` field (always `"notify"`); it carries no
/// information for the client and is dropped during decode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Dotted event name, e.g. `"message.created"`. Empty when the frame was
    /// a JSON object without an `event` field.
    pub event: String,
    /// Event body; shape depends on `event`.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Build an envelope from an event name and payload.
    #[must_use]
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self { event: event.into(), payload }
    }
}

/// Result of defensively decoding one inbound channel frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// A JSON object, normalized into an envelope.
    Envelope(Envelope),
    /// Anything else: invalid JSON, or JSON that is not an object.
    Opaque(String),
}

/// Decode a text frame into an [`Inbound`] value. Never fails.
///
/// A JSON object without an `event` string becomes an envelope with an empty
/// event name whose payload is the whole object, so payload matchers still
/// get a chance to recognize it.
#[must_use]
pub fn decode_inbound(text: &str) -> Inbound {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Inbound::Opaque(text.to_owned());
    };
    let Value::Object(mut map) = value else {
        return Inbound::Opaque(text.to_owned());
    };

    match map.get("event").and_then(Value::as_str).map(str::to_owned) {
        Some(event) => {
            let payload = map.remove("payload").unwrap_or(Value::Null);
            Inbound::Envelope(Envelope { event, payload })
        }
        None => Inbound::Envelope(Envelope { event: String::new(), payload: Value::Object(map) }),
    }
}

/// Decode a binary frame. UTF-8 bytes go through [`decode_inbound`]; other
/// bytes are kept as lossy opaque text.
#[must_use]
pub fn decode_inbound_bytes(bytes: &[u8]) -> Inbound {
    match std::str::from_utf8(bytes) {
        Ok(text) => decode_inbound(text),
        Err(_) => Inbound::Opaque(String::from_utf8_lossy(bytes).into_owned()),
    }
}

/// Serialize an outbound payload to channel text.
#[must_use]
pub fn encode_outbound(payload: &Value) -> String {
    // Serializing a `Value` cannot fail: all map keys are strings already.
    serde_json::to_string(payload).unwrap_or_default()
}

/// Decode a JSON value into a [`Message`].
///
/// # Errors
///
/// Returns [`WireError::NotAnObject`] for non-object values and
/// [`WireError::Message`] when required fields are missing or mistyped.
pub fn decode_message(value: &Value) -> Result<Message, WireError> {
    if !value.is_object() {
        return Err(WireError::NotAnObject);
    }
    Ok(Message::deserialize(value)?)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
