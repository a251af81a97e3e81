//! Networking modules for the conversation backend.
//!
//! SYSTEM CONTEXT
//! ==============
//! `api` handles REST calls, `channel` manages one websocket connection,
//! `extract` finds messages inside envelope payloads, `reconnect` decides
//! when to reopen the channel, and `credentials` supplies bearer tokens to
//! both transports.

pub mod api;
pub mod channel;
pub mod credentials;
pub mod extract;
pub mod reconnect;
