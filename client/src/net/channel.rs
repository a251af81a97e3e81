//! Live event channel for one conversation.
//!
//! DESIGN
//! ======
//! [`EventChannel::open`] spawns one task that makes exactly one connection
//! attempt and then pumps frames until the socket ends or the handle is
//! closed. Everything the task observes is emitted as a [`ChannelEvent`] on an
//! unbounded queue; reconnecting is the owner's decision (see
//! [`super::reconnect`]), which keeps this task free of policy.
//!
//! Once [`EventChannel::close`] returns, nothing more is emitted. The task
//! checks a shared closed flag before every emission, so a connect that
//! resolves after close cannot leak events into a torn-down view.
//!
//! ERROR HANDLING
//! ==============
//! Undecodable frames are forwarded as `Opaque` and the loop keeps reading;
//! only socket-level failures end the connection. A handshake rejected with
//! 401/403 or a credential provider error is reported as
//! [`DisconnectReason::Auth`] so the owner can stop retrying.

#[cfg(test)]
#[path = "channel_test.rs"]
mod channel_test;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use wire::{Envelope, Inbound, decode_inbound, decode_inbound_bytes, encode_outbound};

use super::credentials::CredentialProvider;
use crate::config::{ClientConfig, WsAuthMethod};

/// Why a connection ended (or never started).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Credential rejected or unavailable.
    Auth(String),
    /// Network, handshake, or protocol failure.
    Transport(String),
    /// The server closed the socket.
    Closed,
}

impl DisconnectReason {
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(detail) => write!(f, "auth failure: {detail}"),
            Self::Transport(detail) => write!(f, "transport failure: {detail}"),
            Self::Closed => f.write_str("closed by server"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Envelope(Envelope),
    /// A frame that was not a JSON object.
    Opaque(String),
    Disconnected(DisconnectReason),
}

/// Connection parameters resolved from [`ClientConfig`].
#[derive(Debug, Clone)]
struct Target {
    url: String,
    auth: WsAuthMethod,
    token_param: String,
}

/// Emits onto the event queue unless the handle has been closed.
#[derive(Clone)]
struct Emitter {
    tx: mpsc::UnboundedSender<ChannelEvent>,
    closed: Arc<AtomicBool>,
}

impl Emitter {
    fn emit(&self, event: ChannelEvent) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        self.tx.send(event).is_ok()
    }
}

/// Handle to one connection attempt. Dropping it closes the channel.
pub struct EventChannel {
    closed: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    outbound: mpsc::UnboundedSender<String>,
}

impl EventChannel {
    /// Start connecting. Must be called inside a tokio runtime.
    pub fn open(
        config: &ClientConfig,
        conversation_id: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> (Self, mpsc::UnboundedReceiver<ChannelEvent>) {
        let target = Target {
            url: config.ws_url(conversation_id),
            auth: config.ws_auth,
            token_param: config.ws_token_param.clone(),
        };
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let closed = Arc::new(AtomicBool::new(false));
        let connected = Arc::new(AtomicBool::new(false));

        let emitter = Emitter { tx: events_tx, closed: Arc::clone(&closed) };
        let link = Link { emitter, connected: Arc::clone(&connected) };
        tokio::spawn(run(target, credentials, link, shutdown_rx, outbound_rx));

        let handle = Self { closed, connected, shutdown: shutdown_tx, outbound: outbound_tx };
        (handle, events_rx)
    }

    /// Queue a JSON frame for sending. Returns `false` unless the socket is
    /// currently open.
    pub fn send(&self, payload: &Value) -> bool {
        self.is_connected() && self.outbound.send(encode_outbound(payload)).is_ok()
    }

    /// Stop the connection. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown.send(true);
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.is_closed() && self.connected.load(Ordering::Acquire)
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.close();
    }
}

/// The task's side of a handle: the event emitter plus the open-socket flag.
struct Link {
    emitter: Emitter,
    connected: Arc<AtomicBool>,
}

impl Drop for Link {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::Release);
    }
}

async fn run(
    target: Target,
    credentials: Arc<dyn CredentialProvider>,
    link: Link,
    mut shutdown: watch::Receiver<bool>,
    mut outbound: mpsc::UnboundedReceiver<String>,
) {
    let emitter = &link.emitter;
    let token = match credentials.token().await {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!(error = %e, "channel credential unavailable");
            emitter.emit(ChannelEvent::Disconnected(DisconnectReason::Auth(e.to_string())));
            return;
        }
    };
    let request = match build_request(&target, &token) {
        Ok(request) => request,
        Err(reason) => {
            emitter.emit(ChannelEvent::Disconnected(reason));
            return;
        }
    };

    let stream = tokio::select! {
        _ = shutdown.changed() => return,
        result = tokio_tungstenite::connect_async(request) => match result {
            Ok((stream, _)) => stream,
            Err(e) => {
                let reason = classify_connect_error(e);
                tracing::warn!(url = %target.url, reason = %reason, "channel connect failed");
                emitter.emit(ChannelEvent::Disconnected(reason));
                return;
            }
        },
    };

    link.connected.store(true, Ordering::Release);
    if !emitter.emit(ChannelEvent::Connected) {
        return;
    }
    tracing::info!(url = %target.url, "channel connected");

    let (mut write, mut read) = stream.split();
    let reason = loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = write.send(WsMessage::Close(None)).await;
                return;
            }
            Some(text) = outbound.recv() => {
                if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                    break DisconnectReason::Transport(e.to_string());
                }
            }
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => {
                    emitter.emit(inbound_event(decode_inbound(text.as_str())));
                }
                Some(Ok(WsMessage::Binary(bytes))) => {
                    emitter.emit(inbound_event(decode_inbound_bytes(&bytes)));
                }
                Some(Ok(WsMessage::Close(_))) | None => break DisconnectReason::Closed,
                Some(Ok(_)) => {}
                Some(Err(e)) => break DisconnectReason::Transport(e.to_string()),
            },
        }
    };

    link.connected.store(false, Ordering::Release);
    tracing::info!(url = %target.url, reason = %reason, "channel disconnected");
    emitter.emit(ChannelEvent::Disconnected(reason));
}

fn inbound_event(inbound: Inbound) -> ChannelEvent {
    match inbound {
        Inbound::Envelope(envelope) => ChannelEvent::Envelope(envelope),
        Inbound::Opaque(text) => ChannelEvent::Opaque(text),
    }
}

fn build_request(target: &Target, token: &str) -> Result<Request, DisconnectReason> {
    let transport = |e: &dyn std::fmt::Display| DisconnectReason::Transport(e.to_string());
    match target.auth {
        WsAuthMethod::QueryParam => {
            let mut url = reqwest::Url::parse(&target.url).map_err(|e| transport(&e))?;
            url.query_pairs_mut().append_pair(&target.token_param, token);
            url.as_str().into_client_request().map_err(|e| transport(&e))
        }
        WsAuthMethod::Header => {
            let mut request = target.url.as_str().into_client_request().map_err(|e| transport(&e))?;
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| DisconnectReason::Auth(e.to_string()))?;
            request.headers_mut().insert(AUTHORIZATION, value);
            Ok(request)
        }
    }
}

fn classify_connect_error(error: tungstenite::Error) -> DisconnectReason {
    match error {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            if status.as_u16() == 401 || status.as_u16() == 403 {
                DisconnectReason::Auth(format!("handshake rejected with HTTP {}", status.as_u16()))
            } else {
                DisconnectReason::Transport(format!("handshake rejected with HTTP {}", status.as_u16()))
            }
        }
        other => DisconnectReason::Transport(other.to_string()),
    }
}
