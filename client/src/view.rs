//! Conversation view lifecycle: load, subscribe, reconcile, tear down.
//!
//! DESIGN
//! ======
//! [`ConversationView::mount`] loads the snapshot (the only fatal step), then
//! spawns a single task that owns the [`Reconciler`] and drains its inputs
//! one at a time:
//! - channel events from the current [`EventChannel`],
//! - commands from the [`ViewHandle`] (`Submit`, `Close`),
//! - completed REST calls, which run as separate tasks so the loop keeps
//!   consuming events while a submission is in flight,
//! - the reconnect timer.
//!
//! After every input the loop publishes an owned [`ViewState`] on a
//! `tokio::sync::watch` channel. Teardown closes the channel handle and drops
//! the completion queue, so REST results and socket events that resolve
//! afterwards have nowhere to land.
//!
//! ERROR HANDLING
//! ==============
//! Snapshot failures abort the mount. Submission and trigger failures are
//! reported to the caller and kept in `ViewState::last_error`; the optimistic
//! entry stays where it is because the server may have stored it anyway.

#[cfg(test)]
#[path = "view_test.rs"]
mod view_test;

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use wire::{Conversation, SubmitRequest};

use crate::config::ClientConfig;
use crate::net::api::{ApiError, ConversationApi};
use crate::net::channel::{ChannelEvent, EventChannel};
use crate::net::credentials::CredentialProvider;
use crate::net::extract::MessageExtractor;
use crate::net::reconnect::{ConnectionState, ReconnectDecision, ReconnectPolicy};
use crate::reconciler::{Reconciler, RenderedEntry};
use crate::state::activity::{Activity, LABEL_THINKING};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ViewError {
    /// Snapshot load failed; the view never mounted.
    #[error("failed to load conversation: {0}")]
    Load(ApiError),

    #[error("failed to submit message: {0}")]
    Submit(ApiError),

    #[error("failed to start first turn: {0}")]
    Trigger(ApiError),

    #[error("message is empty")]
    EmptyMessage,

    #[error("conversation view is closed")]
    Closed,
}

/// Everything a renderer needs, published after each applied input.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub conversation_id: String,
    pub conversation: Option<Conversation>,
    pub entries: Vec<RenderedEntry>,
    pub activity: Activity,
    /// An agent turn started by a submission or the first-turn trigger is
    /// still running. Unlike `activity`, the user's own echo does not end it.
    pub turn_open: bool,
    pub connection: ConnectionState,
    pub message_count: u64,
    pub total_cost: f64,
    /// Latest non-fatal submission or trigger failure.
    pub last_error: Option<ViewError>,
    /// Latest error the agent reported over the channel.
    pub last_agent_error: Option<String>,
    /// Set when reconnecting stopped after repeated auth failures.
    pub channel_error: Option<String>,
    pub mounted: bool,
}

#[derive(Debug)]
enum ViewCommand {
    Submit {
        content: String,
        base64_image: Option<String>,
        reply: oneshot::Sender<Result<(), ViewError>>,
    },
    Close,
}

#[derive(Debug)]
enum Completion {
    Submitted {
        result: Result<Value, ApiError>,
        reply: oneshot::Sender<Result<(), ViewError>>,
    },
    Triggered(Result<Value, ApiError>),
}

enum Input {
    Channel(Option<ChannelEvent>),
    Command(Option<ViewCommand>),
    Completed(Completion),
    Retry,
}

/// Caller-side handle to a mounted view.
#[derive(Debug)]
pub struct ViewHandle {
    commands: mpsc::UnboundedSender<ViewCommand>,
    state: watch::Receiver<ViewState>,
    task: JoinHandle<()>,
}

impl ViewHandle {
    /// Submit a message and wait for the REST write to finish. The
    /// optimistic entry is visible in the published state before this
    /// resolves.
    ///
    /// # Errors
    ///
    /// [`ViewError::Submit`] when the write fails, [`ViewError::EmptyMessage`]
    /// for a blank submission, [`ViewError::Closed`] after teardown.
    pub async fn submit(&self, content: impl Into<String>, base64_image: Option<String>) -> Result<(), ViewError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(ViewCommand::Submit { content: content.into(), base64_image, reply })
            .map_err(|_| ViewError::Closed)?;
        response.await.map_err(|_| ViewError::Closed)?
    }

    /// Latest published state.
    #[must_use]
    pub fn state(&self) -> ViewState {
        self.state.borrow().clone()
    }

    /// A receiver that observes every future publication.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ViewState> {
        self.state.clone()
    }

    /// Wait until the published state satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::Closed`] if the view loop ends first.
    pub async fn wait_for(&self, mut predicate: impl FnMut(&ViewState) -> bool) -> Result<ViewState, ViewError> {
        let mut state = self.state.clone();
        let matched = state.wait_for(|s| predicate(s)).await.map_err(|_| ViewError::Closed)?;
        Ok(matched.clone())
    }

    /// Tear the view down. Idempotent.
    pub fn close(&self) {
        let _ = self.commands.send(ViewCommand::Close);
    }

    /// Tear down and wait for the loop to finish.
    pub async fn shutdown(self) {
        self.close();
        if let Err(e) = self.task.await {
            tracing::warn!(error = %e, "view task ended abnormally");
        }
    }
}

/// Mount parameters for one conversation.
pub struct ConversationView {
    config: ClientConfig,
    conversation_id: String,
    api: Arc<dyn ConversationApi>,
    credentials: Arc<dyn CredentialProvider>,
}

impl ConversationView {
    #[must_use]
    pub fn new(
        config: ClientConfig,
        conversation_id: impl Into<String>,
        api: Arc<dyn ConversationApi>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self { config, conversation_id: conversation_id.into(), api, credentials }
    }

    /// Load the snapshot and start the view loop.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::Load`] if the snapshot cannot be fetched.
    pub async fn mount(self) -> Result<ViewHandle, ViewError> {
        let detail = self
            .api
            .fetch_conversation(&self.conversation_id)
            .await
            .map_err(ViewError::Load)?;

        let mut reconciler = Reconciler::new(self.conversation_id.clone(), self.config.events.clone())
            .with_extractor(MessageExtractor::for_fields(&self.config.message_fields));
        reconciler.seed(detail);
        tracing::info!(
            conversation_id = %self.conversation_id,
            messages = reconciler.store().len(),
            "conversation mounted"
        );

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let mut view = ViewLoop {
            policy: ReconnectPolicy::new(self.config.reconnect),
            config: self.config,
            api: self.api,
            credentials: self.credentials,
            reconciler,
            channel: None,
            events: None,
            retry_at: None,
            commands: commands_rx,
            completions_tx,
            completions: completions_rx,
            state: None,
            last_error: None,
            channel_error: None,
        };

        if view.config.auto_trigger_first && view.reconciler.first_initiate() {
            view.trigger_first_turn();
        }
        view.open_channel();

        let (state_tx, state_rx) = watch::channel(view.snapshot(true));
        view.state = Some(state_tx);
        let task = tokio::spawn(view.run());

        Ok(ViewHandle { commands: commands_tx, state: state_rx, task })
    }
}

struct ViewLoop {
    config: ClientConfig,
    api: Arc<dyn ConversationApi>,
    credentials: Arc<dyn CredentialProvider>,
    reconciler: Reconciler,
    policy: ReconnectPolicy,
    channel: Option<EventChannel>,
    events: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    retry_at: Option<Instant>,
    commands: mpsc::UnboundedReceiver<ViewCommand>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    state: Option<watch::Sender<ViewState>>,
    last_error: Option<ViewError>,
    channel_error: Option<String>,
}

impl ViewLoop {
    async fn run(mut self) {
        loop {
            let input = tokio::select! {
                event = recv_optional(&mut self.events) => Input::Channel(event),
                command = self.commands.recv() => Input::Command(command),
                Some(done) = self.completions.recv() => Input::Completed(done),
                () = sleep_optional(self.retry_at) => Input::Retry,
            };

            match input {
                Input::Channel(Some(event)) => self.on_channel_event(event),
                Input::Channel(None) => self.events = None,
                Input::Command(Some(ViewCommand::Submit { content, base64_image, reply })) => {
                    self.submit(content, base64_image, reply);
                }
                Input::Command(Some(ViewCommand::Close) | None) => break,
                Input::Completed(done) => self.on_completion(done),
                Input::Retry => {
                    self.retry_at = None;
                    self.open_channel();
                }
            }
            self.publish(true);
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        self.events = None;
        self.retry_at = None;
        self.commands.close();
        self.completions.close();
        self.reconciler.reset();
        self.publish(false);
        tracing::info!(conversation_id = %self.reconciler.conversation_id(), "conversation view closed");
    }

    fn open_channel(&mut self) {
        if let Some(previous) = self.channel.take() {
            previous.close();
        }
        self.policy.connecting();
        let (channel, events) = EventChannel::open(
            &self.config,
            self.reconciler.conversation_id(),
            Arc::clone(&self.credentials),
        );
        self.channel = Some(channel);
        self.events = Some(events);
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                self.policy.connected();
                self.channel_error = None;
            }
            ChannelEvent::Envelope(envelope) => {
                self.reconciler.apply_envelope(&envelope);
            }
            ChannelEvent::Opaque(text) => {
                tracing::debug!(frame = %text, "ignoring non-envelope frame");
            }
            ChannelEvent::Disconnected(reason) => {
                if let Some(channel) = self.channel.take() {
                    channel.close();
                }
                match self.policy.disconnected(&reason) {
                    ReconnectDecision::RetryAfter(delay) => {
                        tracing::info!(reason = %reason, delay_ms = delay.as_millis(), "channel reconnect scheduled");
                        self.retry_at = Some(Instant::now() + delay);
                    }
                    ReconnectDecision::GiveUp { auth_failures } => {
                        tracing::warn!(reason = %reason, auth_failures, "channel reconnect abandoned");
                        self.channel_error = Some(reason.to_string());
                    }
                }
            }
        }
    }

    fn submit(&mut self, content: String, base64_image: Option<String>, reply: oneshot::Sender<Result<(), ViewError>>) {
        let Some(local) = self.reconciler.submit_local(&content, base64_image) else {
            let _ = reply.send(Err(ViewError::EmptyMessage));
            return;
        };
        let request = SubmitRequest { content, base64_image: local.base64_image };
        let api = Arc::clone(&self.api);
        let conversation_id = self.reconciler.conversation_id().to_owned();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = api.submit_message(&conversation_id, &request).await;
            let _ = completions.send(Completion::Submitted { result, reply });
        });
    }

    fn trigger_first_turn(&mut self) {
        self.reconciler.begin_work(LABEL_THINKING);
        let api = Arc::clone(&self.api);
        let conversation_id = self.reconciler.conversation_id().to_owned();
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = api.trigger_first_message(&conversation_id).await;
            let _ = completions.send(Completion::Triggered(result));
        });
    }

    fn on_completion(&mut self, done: Completion) {
        match done {
            Completion::Submitted { result: Ok(_), reply } => {
                let _ = reply.send(Ok(()));
            }
            Completion::Submitted { result: Err(e), reply } => {
                tracing::warn!(error = %e, "message submission failed");
                self.reconciler.finish_work();
                let error = ViewError::Submit(e);
                self.last_error = Some(error.clone());
                // Callers read the state as soon as the reply lands.
                self.publish(true);
                let _ = reply.send(Err(error));
            }
            Completion::Triggered(Ok(_)) => {
                tracing::debug!(conversation_id = %self.reconciler.conversation_id(), "first turn triggered");
            }
            Completion::Triggered(Err(e)) => {
                tracing::warn!(error = %e, "first-turn trigger failed");
                self.reconciler.finish_work();
                self.last_error = Some(ViewError::Trigger(e));
            }
        }
    }

    fn snapshot(&self, mounted: bool) -> ViewState {
        let r = &self.reconciler;
        ViewState {
            conversation_id: r.conversation_id().to_owned(),
            conversation: r.conversation().cloned(),
            entries: r.rendered(),
            activity: r.activity().clone(),
            turn_open: mounted && r.turn_open(),
            connection: if mounted { self.policy.state() } else { ConnectionState::Disconnected },
            message_count: r.message_count(),
            total_cost: r.total_cost(),
            last_error: self.last_error.clone(),
            last_agent_error: r.last_agent_error().map(str::to_owned),
            channel_error: self.channel_error.clone(),
            mounted,
        }
    }

    fn publish(&self, mounted: bool) {
        if let Some(state) = &self.state {
            state.send_replace(self.snapshot(mounted));
        }
    }
}

async fn recv_optional<T>(rx: &mut Option<mpsc::UnboundedReceiver<T>>) -> Option<T> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn sleep_optional(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
