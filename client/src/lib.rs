//! # client
//!
//! Keeps a chat transcript consistent while it is assembled from a REST
//! snapshot, a live websocket event stream, and messages the user submits
//! locally.
//!
//! The reconciliation core (`state`, `reconciler`) is synchronous and free of
//! I/O. `net` holds the REST and websocket collaborators, and `view` ties
//! them together into a mountable conversation view that publishes its state
//! on a watch channel.

pub mod config;
pub mod net;
pub mod reconciler;
pub mod state;
pub mod view;

pub use config::{ClientConfig, ConfigError, EventClass, EventTable, ReconnectSettings, WsAuthMethod};
pub use net::api::{ApiError, ConversationApi, HttpApi};
pub use net::credentials::{CredentialError, CredentialProvider, EnvCredential, StaticCredential};
pub use net::reconnect::ConnectionState;
pub use reconciler::{Reconciler, RenderedEntry, RenderedToolCall};
pub use state::activity::Activity;
pub use view::{ConversationView, ViewError, ViewHandle, ViewState};
