//! Conversation and message DTOs.
//!
//! DESIGN
//! ======
//! These types mirror the backend's message schema closely so serde stays
//! the single place where payload quirks are absorbed: nullable tool-call
//! lists, two tool-call layouts, string-encoded or structured arguments, and
//! the camelCase aliases on the snapshot counters.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::timestamp;

/// Author role of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// Arguments of a tool invocation, as the model produced them.
#[derive(Clone, Debug, PartialEq)]
pub enum ToolArguments {
    /// Already-structured JSON arguments.
    Structured(Value),
    /// JSON arguments still encoded as a string (OpenAI style).
    Encoded(String),
}

impl ToolArguments {
    /// Structured view of the arguments; decodes string-encoded JSON.
    /// Returns `None` when an encoded string is not valid JSON.
    #[must_use]
    pub fn to_value(&self) -> Option<Value> {
        match self {
            Self::Structured(value) => Some(value.clone()),
            Self::Encoded(raw) => serde_json::from_str(raw).ok(),
        }
    }

    fn from_value(value: Option<Value>) -> Self {
        match value {
            Some(Value::String(raw)) => Self::Encoded(raw),
            Some(Value::Null) | None => Self::Structured(Value::Object(Map::new())),
            Some(other) => Self::Structured(other),
        }
    }

    fn as_value(&self) -> Value {
        match self {
            Self::Structured(value) => value.clone(),
            Self::Encoded(raw) => Value::String(raw.clone()),
        }
    }
}

impl Default for ToolArguments {
    fn default() -> Self {
        Self::Structured(Value::Object(Map::new()))
    }
}

/// A structured record of a tool call embedded in an assistant message.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct ToolCall {
    /// Invocation identifier; tool messages reference it via `tool_call_id`.
    pub id: String,
    /// Tool name, e.g. `"web_search"`.
    pub name: String,
    pub arguments: ToolArguments,
}

impl ToolCall {
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: ToolArguments) -> Self {
        Self { id: id.into(), name: name.into(), arguments }
    }
}

#[derive(Deserialize)]
struct RawFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
}

/// Accepts both `{id, type, function:{name, arguments}}` and
/// `{id, name, arguments}`.
#[derive(Deserialize)]
struct RawToolCall {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
    #[serde(default)]
    function: Option<RawFunction>,
}

impl<'de> Deserialize<'de> for ToolCall {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = RawToolCall::deserialize(deserializer)?;
        let (name, arguments) = match raw.function {
            Some(function) => (function.name.or(raw.name), function.arguments.or(raw.arguments)),
            None => (raw.name, raw.arguments),
        };
        Ok(Self {
            id: raw.id.unwrap_or_default(),
            name: name.unwrap_or_default(),
            arguments: ToolArguments::from_value(arguments),
        })
    }
}

impl Serialize for ToolCall {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serde_json::json!({
            "id": self.id,
            "type": "function",
            "function": { "name": self.name, "arguments": self.arguments.as_value() },
        })
        .serialize(serializer)
    }
}

fn deserialize_tool_calls<'de, D>(deserializer: D) -> Result<Vec<ToolCall>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<ToolCall>>::deserialize(deserializer)?.unwrap_or_default())
}

/// One transcript message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned id (UUID string) once persisted.
    pub id: String,
    #[serde(default)]
    pub conversation_id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "deserialize_tool_calls", skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// Set only on `role=tool`; the invocation id this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool name on `role=tool` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Inline base64-encoded image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_image: Option<String>,
    #[serde(
        default = "timestamp::now_utc",
        deserialize_with = "timestamp::deserialize_created_at",
        serialize_with = "timestamp::serialize"
    )]
    pub created_at: OffsetDateTime,
    #[serde(
        default,
        deserialize_with = "timestamp::deserialize_optional",
        serialize_with = "timestamp::serialize_optional"
    )]
    pub updated_at: Option<OffsetDateTime>,
}

impl Message {
    /// A bare message with no content, calls, or image.
    #[must_use]
    pub fn new(id: impl Into<String>, role: Role, created_at: OffsetDateTime) -> Self {
        Self {
            id: id.into(),
            conversation_id: None,
            role,
            content: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
            base64_image: None,
            created_at,
            updated_at: None,
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    #[must_use]
    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }

    #[must_use]
    pub fn with_tool_call_id(mut self, call_id: impl Into<String>) -> Self {
        self.tool_call_id = Some(call_id.into());
        self
    }

    #[must_use]
    pub fn with_image(mut self, base64_image: impl Into<String>) -> Self {
        self.base64_image = Some(base64_image.into());
        self
    }

    /// Non-blank text content, if any.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().filter(|text| !text.trim().is_empty())
    }

    #[must_use]
    pub fn has_image(&self) -> bool {
        self.base64_image.as_deref().is_some_and(|image| !image.is_empty())
    }
}

/// Conversation metadata. Title and model are server-authoritative.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub llm_model: Option<String>,
}

/// Snapshot response: metadata plus the full ordered history.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, alias = "messageCount")]
    pub message_count: u64,
    #[serde(default, alias = "totalCost")]
    pub total_cost: f64,
    /// True when the conversation holds only its opening user message and no
    /// agent run has started yet.
    #[serde(default, alias = "firstInitiate")]
    pub first_initiate: bool,
}

/// Body of the submission write.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base64_image: Option<String>,
}

/// Body of the conversation-creation write: the model plus the opening user
/// message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateConversationRequest {
    pub model: String,
    pub content: String,
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
