//! Transcript store: the ordered, deduplicated message list of one
//! conversation view.
//!
//! DESIGN
//! ======
//! Messages stay sorted ascending by `(created_at, id)` after every
//! operation and no id appears twice. Server messages are appended once and
//! never mutated; a repeat delivery of the same id is dropped. Locally
//! created entries live in reserved id namespaces (`local-…` for optimistic
//! submissions, `transient-…` for the activity placeholder) that server ids
//! can never enter, so they cannot collide with or be mistaken for persisted
//! rows.
//!
//! The transient placeholder is kept outside the sorted list in a single tail
//! slot. It always renders last, is never ingested, and is invisible to
//! anything that walks [`TranscriptStore::messages`].

use std::collections::HashSet;

use time::OffsetDateTime;
use wire::{Message, Role};

/// Id prefix for optimistic (not yet persisted) messages.
pub const PROVISIONAL_PREFIX: &str = "local-";
/// Id prefix for transient rendering-only entries.
pub const TRANSIENT_PREFIX: &str = "transient-";

/// Fresh id in the optimistic namespace.
#[must_use]
pub fn provisional_id() -> String {
    format!("{PROVISIONAL_PREFIX}{}", uuid::Uuid::new_v4())
}

/// Fresh id in the transient namespace.
#[must_use]
pub fn transient_id() -> String {
    format!("{TRANSIENT_PREFIX}{}", uuid::Uuid::new_v4())
}

#[must_use]
pub fn is_provisional(id: &str) -> bool {
    id.starts_with(PROVISIONAL_PREFIX)
}

/// True for any id the client minted itself.
#[must_use]
pub fn is_local_id(id: &str) -> bool {
    is_provisional(id) || id.starts_with(TRANSIENT_PREFIX)
}

/// Build the optimistic user message for a local submission.
#[must_use]
pub fn optimistic_user_message(content: &str, base64_image: Option<String>, now: OffsetDateTime) -> Message {
    let mut message = Message::new(provisional_id(), Role::User, now).with_content(content);
    message.base64_image = base64_image;
    message
}

/// Outcome of [`TranscriptStore::ingest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingested {
    /// Inserted as a new entry.
    Inserted,
    /// Inserted, replacing the optimistic entry with this id.
    Superseded { provisional_id: String },
    /// Same id already present; nothing changed.
    Duplicate,
    /// Empty id or an id inside a client-reserved namespace; nothing changed.
    Rejected,
}

impl Ingested {
    /// Whether the message is now part of the store.
    #[must_use]
    pub fn is_inserted(&self) -> bool {
        matches!(self, Self::Inserted | Self::Superseded { .. })
    }
}

#[derive(Clone, Debug, Default)]
pub struct TranscriptStore {
    messages: Vec<Message>,
    transient: Option<Message>,
}

fn sort_key(message: &Message) -> (OffsetDateTime, &str) {
    (message.created_at, message.id.as_str())
}

impl TranscriptStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all contents (including any transient entry) with `messages`.
    /// Repeated ids keep their first occurrence.
    pub fn seed(&mut self, messages: Vec<Message>) {
        let mut seen = HashSet::new();
        let mut messages: Vec<Message> = messages
            .into_iter()
            .filter(|message| !message.id.is_empty() && seen.insert(message.id.clone()))
            .collect();
        messages.sort_by(|a, b| sort_key(a).cmp(&sort_key(b)));
        self.messages = messages;
        self.transient = None;
    }

    /// Insert a locally created message. Returns `false` (and changes
    /// nothing) unless the id is in the optimistic namespace and unused.
    pub fn append_optimistic(&mut self, message: Message) -> bool {
        if !is_provisional(&message.id) || self.contains(&message.id) {
            return false;
        }
        self.insert_sorted(message);
        true
    }

    /// Merge one server message.
    ///
    /// 1. A known id is a duplicate and is dropped.
    /// 2. A `user` message supersedes the oldest optimistic user entry that
    ///    is not newer than it; when client/server clocks disagree so that no
    ///    entry qualifies, the oldest optimistic entry with identical text is
    ///    superseded instead.
    /// 3. The message is placed in `(created_at, id)` order.
    pub fn ingest(&mut self, message: Message) -> Ingested {
        if message.id.is_empty() || is_local_id(&message.id) {
            return Ingested::Rejected;
        }
        if self.contains(&message.id) {
            return Ingested::Duplicate;
        }

        let superseded = if message.role == Role::User {
            self.supersession_target(&message)
                .map(|index| self.messages.remove(index).id)
        } else {
            None
        };

        self.insert_sorted(message);
        match superseded {
            Some(provisional_id) => Ingested::Superseded { provisional_id },
            None => Ingested::Inserted,
        }
    }

    /// Remove one entry (sorted or transient) by id.
    pub fn remove_by_id(&mut self, id: &str) -> Option<Message> {
        if self.transient.as_ref().is_some_and(|t| t.id == id) {
            return self.transient.take();
        }
        let index = self.messages.iter().position(|m| m.id == id)?;
        Some(self.messages.remove(index))
    }

    /// Put a rendering-only entry in the tail slot, replacing any previous
    /// one. The id must be in the transient namespace.
    pub fn append_transient(&mut self, message: Message) -> bool {
        if !message.id.starts_with(TRANSIENT_PREFIX) {
            return false;
        }
        self.transient = Some(message);
        true
    }

    /// Sorted messages, without the transient entry.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn transient(&self) -> Option<&Message> {
        self.transient.as_ref()
    }

    /// Everything that renders, in render order: sorted messages, then the
    /// transient entry.
    pub fn entries(&self) -> impl Iterator<Item = &Message> {
        self.messages.iter().chain(self.transient.iter())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Message> {
        self.entries().find(|m| m.id == id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Number of sorted messages (the transient entry is not counted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Optimistic entries still waiting for their server echo.
    #[must_use]
    pub fn pending_optimistic(&self) -> usize {
        self.messages.iter().filter(|m| is_provisional(&m.id)).count()
    }

    fn supersession_target(&self, incoming: &Message) -> Option<usize> {
        let mut candidates = self
            .messages
            .iter()
            .enumerate()
            .filter(|(_, m)| m.role == Role::User && is_provisional(&m.id));

        // `messages` is sorted, so the first qualifying entry is the oldest.
        let by_time = candidates
            .clone()
            .find(|(_, m)| m.created_at <= incoming.created_at)
            .map(|(index, _)| index);
        by_time.or_else(|| {
            candidates
                .find(|(_, m)| m.content.is_some() && m.content == incoming.content)
                .map(|(index, _)| index)
        })
    }

    fn insert_sorted(&mut self, message: Message) {
        // Walk from the tail: live messages almost always belong at the end.
        let key = sort_key(&message);
        let index = self
            .messages
            .iter()
            .rposition(|existing| sort_key(existing) <= key)
            .map_or(0, |i| i + 1);
        self.messages.insert(index, message);
    }
}

#[cfg(test)]
#[path = "transcript_test.rs"]
mod transcript_test;

#[cfg(test)]
#[path = "transcript_proptests.rs"]
mod transcript_proptests;
