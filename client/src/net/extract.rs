//! Pulls a [`Message`] out of an envelope payload.
//!
//! The backend has been seen to deliver a message either as the payload
//! itself or nested one level under `message`. The extractor tries an ordered
//! list of shapes; new shapes are added with [`MessageExtractor::with_shape`]
//! rather than by editing the matcher. A payload no shape recognises is
//! reported as `Unmatched` so the caller can log it.

#[cfg(test)]
#[path = "extract_test.rs"]
mod extract_test;

use serde_json::Value;
use wire::{Message, WireError, decode_message};

/// Field that carries the message in the nested shape.
pub const NESTED_MESSAGE_FIELD: &str = "message";

/// One recognised payload layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageShape {
    /// The payload is the message.
    Bare,
    /// The message sits under this field of the payload.
    Nested(String),
}

impl MessageShape {
    fn locate<'a>(&self, payload: &'a Value) -> Option<&'a Value> {
        let candidate = match self {
            Self::Bare => payload,
            Self::Nested(field) => payload.get(field)?,
        };
        looks_like_message(candidate).then_some(candidate)
    }
}

/// Objects carrying both `id` and `role` are treated as messages.
fn looks_like_message(value: &Value) -> bool {
    value.as_object().is_some_and(|object| object.contains_key("id") && object.contains_key("role"))
}

#[derive(Debug)]
pub enum Extraction {
    Message(Box<Message>),
    /// A shape matched but the message failed to decode.
    Malformed { shape: MessageShape, error: WireError },
    Unmatched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageExtractor {
    shapes: Vec<MessageShape>,
}

impl Default for MessageExtractor {
    fn default() -> Self {
        Self {
            shapes: vec![MessageShape::Nested(NESTED_MESSAGE_FIELD.to_owned()), MessageShape::Bare],
        }
    }
}

impl MessageExtractor {
    /// An extractor that recognises nothing until shapes are added.
    #[must_use]
    pub fn empty() -> Self {
        Self { shapes: Vec::new() }
    }

    /// Nested shapes for each field in order, then the bare shape.
    #[must_use]
    pub fn for_fields(fields: &[String]) -> Self {
        fields
            .iter()
            .fold(Self::empty(), |extractor, field| extractor.with_shape(MessageShape::Nested(field.clone())))
            .with_shape(MessageShape::Bare)
    }

    /// Append a shape, tried after the existing ones.
    #[must_use]
    pub fn with_shape(mut self, shape: MessageShape) -> Self {
        if !self.shapes.contains(&shape) {
            self.shapes.push(shape);
        }
        self
    }

    #[must_use]
    pub fn shapes(&self) -> &[MessageShape] {
        &self.shapes
    }

    #[must_use]
    pub fn extract(&self, payload: &Value) -> Extraction {
        for shape in &self.shapes {
            let Some(candidate) = shape.locate(payload) else {
                continue;
            };
            return match decode_message(candidate) {
                Ok(message) => Extraction::Message(Box::new(message)),
                Err(error) => Extraction::Malformed { shape: shape.clone(), error },
            };
        }
        Extraction::Unmatched
    }
}
