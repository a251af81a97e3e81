//! Client configuration parsed from environment variables.
//!
//! Every knob has a `DEFAULT_*` constant; [`ClientConfig::from_env`] only
//! overrides what is set. Numbers that fail to parse fall back to their
//! default, enum-like values that fail to parse are a [`ConfigError`].

use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_API_PREFIX: &str = "/api/v1/chat";
pub const DEFAULT_WS_PATH: &str = "/ws/conversations/{id}/";
pub const DEFAULT_WS_TOKEN_PARAM: &str = "token";
pub const DEFAULT_RECONNECT_INITIAL_MS: u64 = 1000;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 10_000;
pub const DEFAULT_MAX_AUTH_FAILURES: u32 = 3;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MESSAGE_FIELDS: &[&str] = &["message"];

pub const DEFAULT_MESSAGE_EVENTS: &[&str] = &["message.created"];
pub const DEFAULT_WORK_STARTED_EVENTS: &[&str] =
    &["agent.step", "agent.thoughts", "agent.tools_selected", "agent.no_tool", "agent.stuck"];
pub const DEFAULT_TOOL_PREPARED_EVENTS: &[&str] = &["agent.tools_prepared", "agent.tool_args"];
pub const DEFAULT_TOOL_RESULT_EVENTS: &[&str] = &["agent.tool_result", "agent.tool_error"];
pub const DEFAULT_WORK_FINISHED_EVENTS: &[&str] = &["agent.finished", "agent.error", "agent.cleanup_done"];

/// Errors produced while building a [`ClientConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value could not be parsed.
    #[error("config parse failed: {0}")]
    Parse(String),

    /// The base URL is not an `http://` or `https://` origin.
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),
}

/// How the channel credential travels during the websocket handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WsAuthMethod {
    /// `?{param}={token}` on the connect URL.
    QueryParam,
    /// `Authorization: Bearer {token}` header.
    Header,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectSettings {
    pub initial_ms: u64,
    pub max_ms: u64,
    /// Consecutive auth failures tolerated before the view stops reconnecting.
    pub max_auth_failures: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_ms: DEFAULT_RECONNECT_INITIAL_MS,
            max_ms: DEFAULT_RECONNECT_MAX_MS,
            max_auth_failures: DEFAULT_MAX_AUTH_FAILURES,
        }
    }
}

/// Classes of channel events the reconciler reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    Message,
    WorkStarted,
    ToolPrepared,
    ToolResult,
    WorkFinished,
    /// Anything not listed in the table.
    Other,
}

/// Event-name table. Spellings live here, not in reconciliation logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTable {
    pub message: Vec<String>,
    pub work_started: Vec<String>,
    pub tool_prepared: Vec<String>,
    pub tool_result: Vec<String>,
    pub work_finished: Vec<String>,
}

impl Default for EventTable {
    fn default() -> Self {
        Self {
            message: owned(DEFAULT_MESSAGE_EVENTS),
            work_started: owned(DEFAULT_WORK_STARTED_EVENTS),
            tool_prepared: owned(DEFAULT_TOOL_PREPARED_EVENTS),
            tool_result: owned(DEFAULT_TOOL_RESULT_EVENTS),
            work_finished: owned(DEFAULT_WORK_FINISHED_EVENTS),
        }
    }
}

impl EventTable {
    /// Classify an event name. The first matching class in declaration order
    /// wins if a name is listed twice.
    #[must_use]
    pub fn classify(&self, event: &str) -> EventClass {
        let listed = |names: &[String]| names.iter().any(|name| name == event);
        if listed(&self.message) {
            EventClass::Message
        } else if listed(&self.work_started) {
            EventClass::WorkStarted
        } else if listed(&self.tool_prepared) {
            EventClass::ToolPrepared
        } else if listed(&self.tool_result) {
            EventClass::ToolResult
        } else if listed(&self.work_finished) {
            EventClass::WorkFinished
        } else {
            EventClass::Other
        }
    }
}

/// Typed client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// REST and websocket origin, without trailing slash.
    pub base_url: String,
    pub api_prefix: String,
    /// Channel path; `{id}` is replaced by the conversation id.
    pub ws_path: String,
    pub ws_auth: WsAuthMethod,
    pub ws_token_param: String,
    pub reconnect: ReconnectSettings,
    pub request_timeout: Duration,
    /// Call the first-turn trigger when a snapshot reports `first_initiate`.
    pub auto_trigger_first: bool,
    pub events: EventTable,
    /// Payload fields a channel message may be nested under. A bare message
    /// payload is always accepted after these.
    pub message_fields: Vec<String>,
}

impl ClientConfig {
    /// Defaults for everything except the origin.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBaseUrl`] unless `base_url` starts with
    /// `http://` or `https://`.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            api_prefix: DEFAULT_API_PREFIX.to_owned(),
            ws_path: DEFAULT_WS_PATH.to_owned(),
            ws_auth: WsAuthMethod::QueryParam,
            ws_token_param: DEFAULT_WS_TOKEN_PARAM.to_owned(),
            reconnect: ReconnectSettings::default(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            auto_trigger_first: true,
            events: EventTable::default(),
            message_fields: owned(DEFAULT_MESSAGE_FIELDS),
        })
    }

    /// Build typed config from environment variables.
    ///
    /// Optional:
    /// - `CONVO_BASE_URL`: default `http://127.0.0.1:8000`
    /// - `CONVO_API_PREFIX`: default `/api/v1/chat`
    /// - `CONVO_WS_PATH`: default `/ws/conversations/{id}/`
    /// - `CONVO_WS_AUTH`: `query` (default) or `header`
    /// - `CONVO_WS_TOKEN_PARAM`: default `token`
    /// - `CONVO_RECONNECT_INITIAL_MS`, `CONVO_RECONNECT_MAX_MS`: default 1000 / 10000;
    ///   the initial delay is at least 1ms and the cap at least the initial delay
    /// - `CONVO_MAX_AUTH_FAILURES`: default 3
    /// - `CONVO_REQUEST_TIMEOUT_SECS`: default 30
    /// - `CONVO_AUTO_TRIGGER_FIRST`: `true` (default) or `false`
    /// - `CONVO_EVENTS_{MESSAGE,WORK_STARTED,TOOL_PREPARED,TOOL_RESULT,WORK_FINISHED}`:
    ///   comma-separated event names replacing the defaults
    /// - `CONVO_MESSAGE_FIELDS`: comma-separated payload fields a message may
    ///   be nested under, default `message`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an invalid base URL, auth method, or boolean.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] with an injectable variable source.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let base_url = lookup("CONVO_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_owned());
        let mut config = Self::new(&base_url)?;

        if let Some(prefix) = lookup("CONVO_API_PREFIX") {
            config.api_prefix = normalize_path(&prefix);
        }
        if let Some(path) = lookup("CONVO_WS_PATH") {
            config.ws_path = normalize_path(&path);
        }
        config.ws_auth = parse_ws_auth(lookup("CONVO_WS_AUTH").as_deref())?;
        if let Some(param) = lookup("CONVO_WS_TOKEN_PARAM").filter(|p| !p.trim().is_empty()) {
            config.ws_token_param = param.trim().to_owned();
        }

        // A zero delay would spin the reconnect loop.
        let initial_ms = parse_or(lookup("CONVO_RECONNECT_INITIAL_MS"), DEFAULT_RECONNECT_INITIAL_MS).max(1);
        config.reconnect = ReconnectSettings {
            initial_ms,
            max_ms: parse_or(lookup("CONVO_RECONNECT_MAX_MS"), DEFAULT_RECONNECT_MAX_MS).max(initial_ms),
            max_auth_failures: parse_or(lookup("CONVO_MAX_AUTH_FAILURES"), DEFAULT_MAX_AUTH_FAILURES),
        };
        config.request_timeout =
            Duration::from_secs(parse_or(lookup("CONVO_REQUEST_TIMEOUT_SECS"), DEFAULT_REQUEST_TIMEOUT_SECS));
        config.auto_trigger_first = parse_bool(lookup("CONVO_AUTO_TRIGGER_FIRST").as_deref(), true)?;

        let events = &mut config.events;
        override_names(&mut events.message, lookup("CONVO_EVENTS_MESSAGE"));
        override_names(&mut events.work_started, lookup("CONVO_EVENTS_WORK_STARTED"));
        override_names(&mut events.tool_prepared, lookup("CONVO_EVENTS_TOOL_PREPARED"));
        override_names(&mut events.tool_result, lookup("CONVO_EVENTS_TOOL_RESULT"));
        override_names(&mut events.work_finished, lookup("CONVO_EVENTS_WORK_FINISHED"));
        override_names(&mut config.message_fields, lookup("CONVO_MESSAGE_FIELDS"));

        Ok(config)
    }

    /// Absolute REST URL for a path below the API prefix.
    #[must_use]
    pub fn api_url(&self, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.api_prefix, path)
    }

    /// Websocket URL for one conversation, without credentials.
    #[must_use]
    pub fn ws_url(&self, conversation_id: &str) -> String {
        let origin = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{origin}{}", self.ws_path.replace("{id}", conversation_id))
    }
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| (*name).to_owned()).collect()
}

fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Ok(trimmed.to_owned())
    } else {
        Err(ConfigError::InvalidBaseUrl(raw.to_owned()))
    }
}

fn normalize_path(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, default: T) -> T {
    raw.and_then(|v| v.trim().parse::<T>().ok()).unwrap_or(default)
}

fn parse_ws_auth(raw: Option<&str>) -> Result<WsAuthMethod, ConfigError> {
    match raw.map(str::trim).unwrap_or("query") {
        "query" => Ok(WsAuthMethod::QueryParam),
        "header" => Ok(WsAuthMethod::Header),
        other => Err(ConfigError::Parse(format!(
            "unknown CONVO_WS_AUTH '{other}' (expected 'query' or 'header')"
        ))),
    }
}

fn parse_bool(raw: Option<&str>, default: bool) -> Result<bool, ConfigError> {
    match raw.map(str::trim) {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ConfigError::Parse(format!("invalid boolean '{other}'"))),
    }
}

fn override_names(target: &mut Vec<String>, raw: Option<String>) {
    let Some(raw) = raw else {
        return;
    };
    *target = raw
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect();
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
