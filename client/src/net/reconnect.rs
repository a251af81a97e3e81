//! Reconnect policy for the event channel.
//!
//! An explicit state machine, `Disconnected -> Connecting -> Connected ->
//! Disconnected`, consulted by the view after every disconnect. Backoff
//! starts at `initial_ms`, doubles per failed attempt, caps at `max_ms`, and
//! resets once a connection is established. Consecutive auth failures are
//! counted separately; reaching `max_auth_failures` stops reconnecting.

#[cfg(test)]
#[path = "reconnect_test.rs"]
mod reconnect_test;

use std::time::Duration;

use super::channel::DisconnectReason;
use crate::config::ReconnectSettings;

/// Connection status as shown to a renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectDecision {
    RetryAfter(Duration),
    /// Too many consecutive auth failures.
    GiveUp { auth_failures: u32 },
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    settings: ReconnectSettings,
    state: ConnectionState,
    backoff_ms: u64,
    auth_failures: u32,
    attempts: u64,
}

impl ReconnectPolicy {
    #[must_use]
    pub fn new(settings: ReconnectSettings) -> Self {
        Self {
            settings,
            state: ConnectionState::Disconnected,
            backoff_ms: settings.initial_ms,
            auth_failures: 0,
            attempts: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    #[must_use]
    pub fn auth_failures(&self) -> u32 {
        self.auth_failures
    }

    /// A connect attempt is starting.
    pub fn connecting(&mut self) {
        self.state = ConnectionState::Connecting;
        self.attempts += 1;
    }

    /// The channel reported `Connected`.
    pub fn connected(&mut self) {
        self.state = ConnectionState::Connected;
        self.backoff_ms = self.settings.initial_ms;
        self.auth_failures = 0;
    }

    /// The channel reported a disconnect; decide what happens next.
    pub fn disconnected(&mut self, reason: &DisconnectReason) -> ReconnectDecision {
        self.state = ConnectionState::Disconnected;

        if reason.is_auth() {
            self.auth_failures = self.auth_failures.saturating_add(1);
            if self.auth_failures >= self.settings.max_auth_failures {
                return ReconnectDecision::GiveUp { auth_failures: self.auth_failures };
            }
        }

        let delay = Duration::from_millis(self.backoff_ms);
        self.backoff_ms = self.backoff_ms.saturating_mul(2).min(self.settings.max_ms.max(self.settings.initial_ms));
        ReconnectDecision::RetryAfter(delay)
    }
}
