//! Activity state machine: whether the agent is currently working, and the
//! placeholder entry that shows it.
//!
//! DESIGN
//! ======
//! Two states, `Idle` and `Working`. Entering `Working` from `Idle` puts a
//! synthetic assistant message in the store's transient tail slot; leaving
//! `Working` removes it. The placeholder never goes through
//! [`TranscriptStore::ingest`], so it cannot collide with server ids and the
//! tool correlator never sees it.

#[cfg(test)]
#[path = "activity_test.rs"]
mod activity_test;

use time::OffsetDateTime;
use wire::{Message, Role};

use super::tools::{ToolCorrelator, displayable_calls, signals_terminate};
use super::transcript::{TranscriptStore, transient_id};

pub const LABEL_THINKING: &str = "Thinking";
pub const LABEL_PREPARING: &str = "Preparing tools";
pub const LABEL_RUNNING: &str = "Running tools";

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Activity {
    #[default]
    Idle,
    Working {
        label: String,
        placeholder_id: String,
    },
}

impl Activity {
    #[must_use]
    pub fn is_working(&self) -> bool {
        matches!(self, Self::Working { .. })
    }

    #[must_use]
    pub fn label(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Working { label, .. } => Some(label),
        }
    }
}

/// Lifecycle signal decoded from a channel event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Signal {
    Started { label: String },
    Finished,
}

/// A message renders when it has text, an image, or a displayable tool call.
/// Tool results with no matching invocation do not render.
#[must_use]
pub fn is_substantive(message: &Message, tools: &ToolCorrelator) -> bool {
    if message.role == Role::Tool && tools.is_orphan(message) {
        return false;
    }
    message.text().is_some() || message.has_image() || displayable_calls(message).next().is_some()
}

#[derive(Clone, Debug, Default)]
pub struct ActivityMachine {
    state: Activity,
}

impl ActivityMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> &Activity {
        &self.state
    }

    pub fn on_signal(&mut self, signal: Signal, store: &mut TranscriptStore) {
        match signal {
            Signal::Started { label } => self.begin(label, store),
            Signal::Finished => self.finish(store),
        }
    }

    /// React to a message that was just inserted into the store.
    pub fn on_ingested(&mut self, message: &Message, tools: &ToolCorrelator, store: &mut TranscriptStore) {
        if signals_terminate(message) {
            self.finish(store);
            return;
        }
        if !is_substantive(message, tools) {
            return;
        }
        self.finish(store);

        let pending: Vec<&str> = displayable_calls(message).map(|call| call.name.as_str()).collect();
        if message.role == Role::Assistant && !pending.is_empty() {
            self.begin(running_label(&pending), store);
        }
    }

    /// Enter `Working`, creating the placeholder if idle and relabelling it
    /// otherwise.
    pub fn begin(&mut self, label: impl Into<String>, store: &mut TranscriptStore) {
        let label = label.into();
        let placeholder_id = match &self.state {
            Activity::Working { placeholder_id, .. } => placeholder_id.clone(),
            Activity::Idle => transient_id(),
        };
        let placeholder = Message::new(placeholder_id.clone(), Role::Assistant, OffsetDateTime::now_utc())
            .with_content(label.clone());
        store.append_transient(placeholder);
        self.state = Activity::Working { label, placeholder_id };
    }

    /// Enter `Idle`, removing the placeholder if present.
    pub fn finish(&mut self, store: &mut TranscriptStore) {
        if let Activity::Working { placeholder_id, .. } = std::mem::take(&mut self.state) {
            store.remove_by_id(&placeholder_id);
        }
    }

    /// Forget the state without touching any store (view teardown).
    pub fn reset(&mut self) {
        self.state = Activity::Idle;
    }
}

fn running_label(names: &[&str]) -> String {
    format!("Running {}", names.join(", "))
}
