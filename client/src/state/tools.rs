//! Tool correlator: pairs tool invocations with their result messages.
//!
//! Two derived indexes over the transcript:
//! - `results`: invocation id → the first `role=tool` message answering it.
//!   Later answers for the same id are ignored so a rendered result never
//!   changes underneath the reader.
//! - `invoked`: every invocation id carried by an assistant message. A tool
//!   message whose linkage id is not in this set is an orphan and does not
//!   render on its own.
//!
//! Calls to the end-of-turn sentinel tool never enter either index.

use std::collections::{HashMap, HashSet};

use wire::{Message, Role, ToolCall};

/// Name of the end-of-turn sentinel tool.
pub const TERMINATE_TOOL: &str = "terminate";

#[must_use]
pub fn is_terminate(call: &ToolCall) -> bool {
    call.name.eq_ignore_ascii_case(TERMINATE_TOOL)
}

/// Tool calls that render (everything except the sentinel).
pub fn displayable_calls(message: &Message) -> impl Iterator<Item = &ToolCall> {
    message.tool_calls.iter().filter(|call| !is_terminate(call))
}

/// Whether a message carries the end-of-turn sentinel.
#[must_use]
pub fn signals_terminate(message: &Message) -> bool {
    message.tool_calls.iter().any(is_terminate)
}

#[derive(Clone, Debug, Default)]
pub struct ToolCorrelator {
    results: HashMap<String, Message>,
    invoked: HashSet<String>,
    /// Invocation ids of sentinel calls; their results are dropped too.
    terminated: HashSet<String>,
}

impl ToolCorrelator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild both indexes from scratch.
    #[must_use]
    pub fn build<'a>(messages: impl IntoIterator<Item = &'a Message>) -> Self {
        let mut correlator = Self::new();
        for message in messages {
            correlator.observe(message);
        }
        correlator
    }

    /// Fold one newly stored message into the indexes.
    pub fn observe(&mut self, message: &Message) {
        match message.role {
            Role::Assistant => {
                for call in &message.tool_calls {
                    if call.id.is_empty() {
                        continue;
                    }
                    if is_terminate(call) {
                        self.terminated.insert(call.id.clone());
                        self.results.remove(&call.id);
                    } else {
                        self.invoked.insert(call.id.clone());
                    }
                }
            }
            Role::Tool => {
                let Some(call_id) = message.tool_call_id.as_deref().filter(|id| !id.is_empty()) else {
                    return;
                };
                if self.terminated.contains(call_id) {
                    return;
                }
                self.results
                    .entry(call_id.to_owned())
                    .or_insert_with(|| message.clone());
            }
            Role::System | Role::User => {}
        }
    }

    /// The result message answering `call_id`, if one has arrived.
    #[must_use]
    pub fn result_for(&self, call_id: &str) -> Option<&Message> {
        self.results.get(call_id)
    }

    /// Whether some assistant message carries a (non-sentinel) call with
    /// this id.
    #[must_use]
    pub fn is_invoked(&self, call_id: &str) -> bool {
        self.invoked.contains(call_id)
    }

    /// A tool message with no matching invocation descriptor.
    #[must_use]
    pub fn is_orphan(&self, message: &Message) -> bool {
        message.role == Role::Tool
            && !message
                .tool_call_id
                .as_deref()
                .is_some_and(|id| self.is_invoked(id))
    }
}

#[cfg(test)]
#[path = "tools_test.rs"]
mod tools_test;
