//! Reconciler: merges the snapshot, live envelopes, and local submissions
//! into one transcript.
//!
//! DESIGN
//! ======
//! The reconciler is the only writer of the transcript store. Every input is
//! applied synchronously through `&mut self`, so each envelope is fully
//! processed before the next one is looked at; the async shell around it
//! ([`crate::view`]) only decides the order inputs arrive in.
//!
//! Each envelope goes through two independent steps:
//! 1. payload extraction, and `ingest` when a message is found;
//! 2. event classification via the configured [`EventTable`], which drives
//!    the activity state machine.
//!
//! Activity and the agent turn are tracked separately. Activity drops to
//! `Idle` whenever a substantive message lands, including the user's own
//! echo, while the turn opened by a submission or the first-turn trigger
//! stays open until a work-finished event or a terminate call closes it.
//!
//! ERROR HANDLING
//! ==============
//! Nothing here fails. Malformed, unmatched, duplicate, and foreign payloads
//! are logged and dropped so one bad envelope never disturbs the stream.

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod reconciler_test;

use serde_json::Value;
use time::OffsetDateTime;
use wire::{Conversation, ConversationDetail, Envelope, Message, Role, ToolCall};

use crate::config::{EventClass, EventTable};
use crate::net::extract::{Extraction, MessageExtractor};
use crate::state::activity::{Activity, ActivityMachine, LABEL_PREPARING, LABEL_RUNNING, LABEL_THINKING, is_substantive};
use crate::state::tools::{ToolCorrelator, displayable_calls, signals_terminate};
use crate::state::transcript::{Ingested, TranscriptStore, is_provisional, optimistic_user_message};

/// A tool call as rendered: the call plus its result, once one arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedToolCall {
    pub call: ToolCall,
    pub result: Option<Message>,
}

/// One visible row of the transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedEntry {
    Message {
        message: Message,
        /// Optimistic entry still waiting for its server echo.
        pending: bool,
        tool_calls: Vec<RenderedToolCall>,
    },
    /// The agent-is-working indicator.
    Placeholder { id: String, label: String },
}

impl RenderedEntry {
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Message { message, .. } => &message.id,
            Self::Placeholder { id, .. } => id,
        }
    }
}

/// What [`Reconciler::apply_envelope`] did.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub class: EventClass,
    /// Outcome of ingesting the payload's message, if it carried one.
    pub ingested: Option<Ingested>,
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    conversation_id: String,
    conversation: Option<Conversation>,
    message_count: u64,
    total_cost: f64,
    first_initiate: bool,
    last_agent_error: Option<String>,
    turn_open: bool,
    store: TranscriptStore,
    tools: ToolCorrelator,
    activity: ActivityMachine,
    extractor: MessageExtractor,
    events: EventTable,
}

impl Reconciler {
    #[must_use]
    pub fn new(conversation_id: impl Into<String>, events: EventTable) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            conversation: None,
            message_count: 0,
            total_cost: 0.0,
            first_initiate: false,
            last_agent_error: None,
            turn_open: false,
            store: TranscriptStore::new(),
            tools: ToolCorrelator::new(),
            activity: ActivityMachine::new(),
            extractor: MessageExtractor::default(),
            events,
        }
    }

    #[must_use]
    pub fn with_extractor(mut self, extractor: MessageExtractor) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replace everything with a freshly loaded snapshot.
    pub fn seed(&mut self, detail: ConversationDetail) {
        let ConversationDetail { conversation, messages, message_count, total_cost, first_initiate } = detail;
        tracing::debug!(
            conversation_id = %self.conversation_id,
            messages = messages.len(),
            first_initiate,
            "seeding transcript"
        );
        self.conversation = Some(conversation);
        self.message_count = message_count;
        self.total_cost = total_cost;
        self.first_initiate = first_initiate;
        self.last_agent_error = None;
        self.turn_open = false;

        self.store.seed(messages);
        self.tools = ToolCorrelator::build(self.store.messages());
        self.activity.reset();
    }

    /// Show a locally typed message right away and mark the agent as
    /// working. Returns the optimistic entry, or `None` for a blank
    /// submission.
    pub fn submit_local(&mut self, content: &str, base64_image: Option<String>) -> Option<Message> {
        let base64_image = base64_image.filter(|image| !image.is_empty());
        if content.trim().is_empty() && base64_image.is_none() {
            return None;
        }
        let message = optimistic_user_message(content, base64_image, OffsetDateTime::now_utc());
        if !self.store.append_optimistic(message.clone()) {
            return None;
        }
        self.first_initiate = false;
        self.turn_open = true;
        self.activity.begin(LABEL_THINKING, &mut self.store);
        tracing::debug!(
            message_id = %message.id,
            pending = self.store.pending_optimistic(),
            "optimistic message added"
        );
        Some(message)
    }

    /// Enter `Working` without a local submission (first-turn trigger).
    pub fn begin_work(&mut self, label: &str) {
        self.first_initiate = false;
        self.turn_open = true;
        self.activity.begin(label, &mut self.store);
    }

    /// Leave `Working` and close the turn, e.g. after a failed write.
    pub fn finish_work(&mut self) {
        self.turn_open = false;
        self.activity.finish(&mut self.store);
    }

    /// Merge one server message.
    pub fn ingest(&mut self, message: Message) -> Ingested {
        if let Some(foreign) = message
            .conversation_id
            .as_deref()
            .filter(|id| *id != self.conversation_id)
        {
            tracing::debug!(message_id = %message.id, conversation_id = %foreign, "dropping message for another conversation");
            return Ingested::Rejected;
        }

        let stored = message.clone();
        let outcome = self.store.ingest(message);
        match &outcome {
            Ingested::Inserted | Ingested::Superseded { .. } => {
                if let Ingested::Superseded { provisional_id } = &outcome {
                    tracing::debug!(
                        message_id = %stored.id,
                        %provisional_id,
                        pending = self.store.pending_optimistic(),
                        "optimistic message confirmed"
                    );
                }
                self.message_count += 1;
                self.tools.observe(&stored);
                if stored.role == Role::Tool && self.tools.is_orphan(&stored) {
                    tracing::debug!(message_id = %stored.id, "tool result without matching invocation");
                }
                self.activity.on_ingested(&stored, &self.tools, &mut self.store);
                if signals_terminate(&stored) {
                    self.turn_open = false;
                }
            }
            Ingested::Duplicate => tracing::debug!(message_id = %stored.id, "duplicate message dropped"),
            Ingested::Rejected => tracing::debug!(message_id = %stored.id, "message id rejected"),
        }
        outcome
    }

    /// Apply one channel envelope.
    pub fn apply_envelope(&mut self, envelope: &Envelope) -> Applied {
        let class = self.events.classify(&envelope.event);

        let ingested = match self.extractor.extract(&envelope.payload) {
            Extraction::Message(message) => Some(self.ingest(*message)),
            Extraction::Malformed { shape, error } => {
                tracing::warn!(event = %envelope.event, shape = ?shape, error = %error, "malformed message payload");
                None
            }
            Extraction::Unmatched => {
                if class == EventClass::Message {
                    tracing::warn!(event = %envelope.event, payload = %envelope.payload, "unrecognised message payload shape");
                }
                None
            }
        };

        match class {
            EventClass::WorkStarted => self.activity.begin(LABEL_THINKING, &mut self.store),
            EventClass::ToolPrepared => {
                let label = preparing_label(&envelope.payload);
                self.activity.begin(label, &mut self.store);
            }
            EventClass::ToolResult => {
                if let Some(error) = payload_str(&envelope.payload, "error") {
                    tracing::warn!(event = %envelope.event, error, "tool reported an error");
                }
                let label = running_label(&envelope.payload);
                self.activity.begin(label, &mut self.store);
            }
            EventClass::WorkFinished => {
                if let Some(detail) = payload_str(&envelope.payload, "detail") {
                    tracing::warn!(event = %envelope.event, detail, "agent reported an error");
                    self.last_agent_error = Some(detail.to_owned());
                }
                self.turn_open = false;
                self.activity.finish(&mut self.store);
            }
            EventClass::Message => {}
            EventClass::Other => {
                tracing::trace!(event = %envelope.event, "event not in table");
            }
        }

        Applied { class, ingested }
    }

    /// Visible rows in render order.
    ///
    /// Tool-role messages never render on their own: a correlated result is
    /// shown under its call, and an orphan is suppressed.
    #[must_use]
    pub fn rendered(&self) -> Vec<RenderedEntry> {
        let mut rows: Vec<RenderedEntry> = self
            .store
            .messages()
            .iter()
            .filter(|message| message.role != Role::Tool && is_substantive(message, &self.tools))
            .map(|message| RenderedEntry::Message {
                message: message.clone(),
                pending: is_provisional(&message.id),
                tool_calls: displayable_calls(message)
                    .map(|call| RenderedToolCall {
                        call: call.clone(),
                        result: self.tools.result_for(&call.id).cloned(),
                    })
                    .collect(),
            })
            .collect();

        if let Some(placeholder) = self.store.transient() {
            let label = self
                .activity
                .state()
                .label()
                .or_else(|| placeholder.text())
                .unwrap_or(LABEL_THINKING);
            rows.push(RenderedEntry::Placeholder { id: placeholder.id.clone(), label: label.to_owned() });
        }
        rows
    }

    /// Forget activity on teardown.
    pub fn reset(&mut self) {
        self.turn_open = false;
        self.activity.reset();
    }

    #[must_use]
    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    #[must_use]
    pub fn conversation(&self) -> Option<&Conversation> {
        self.conversation.as_ref()
    }

    #[must_use]
    pub fn message_count(&self) -> u64 {
        self.message_count
    }

    #[must_use]
    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Whether the snapshot asked the client to start the first agent turn.
    #[must_use]
    pub fn first_initiate(&self) -> bool {
        self.first_initiate
    }

    /// Whether an agent turn started by a submission or the first-turn
    /// trigger has not finished yet.
    #[must_use]
    pub fn turn_open(&self) -> bool {
        self.turn_open
    }

    #[must_use]
    pub fn last_agent_error(&self) -> Option<&str> {
        self.last_agent_error.as_deref()
    }

    #[must_use]
    pub fn activity(&self) -> &Activity {
        self.activity.state()
    }

    #[must_use]
    pub fn store(&self) -> &TranscriptStore {
        &self.store
    }

    #[must_use]
    pub fn tools(&self) -> &ToolCorrelator {
        &self.tools
    }
}

fn payload_str<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn preparing_label(payload: &Value) -> String {
    let names: Vec<&str> = payload
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| tools.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if names.is_empty() {
        LABEL_PREPARING.to_owned()
    } else {
        format!("{LABEL_PREPARING}: {}", names.join(", "))
    }
}

fn running_label(payload: &Value) -> String {
    match payload_str(payload, "tool").or_else(|| payload_str(payload, "name")) {
        Some(tool) => format!("Running {tool}"),
        None => LABEL_RUNNING.to_owned(),
    }
}
