//! Database command lifecycle events
//!
//! The driver integration emits one Started notification per command and at
//! most one matching completion (Succeeded or Failed), each carrying the
//! driver's per-command request id. Completion callbacks run on their own
//! threads and may never arrive for commands the driver loses track of.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Logical server endpoint a command was issued against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    /// Host name or address
    pub host: String,

    /// Port
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Why a command failed, as reported by the driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFailure {
    /// Driver-reported error message
    pub message: String,

    /// Server error code, when one was returned
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
}

impl CommandFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
        }
    }

    /// Attach the server error code
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{} (code {})", self.message, code),
            None => write!(f, "{}", self.message),
        }
    }
}

/// A command started executing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandStartedEvent {
    /// Correlation identifier, unique per in-flight command
    pub request_id: i64,

    /// Database the command runs against
    pub database: String,

    /// Server endpoint
    pub endpoint: Endpoint,

    /// Command name (e.g. "find", "insert")
    pub command_name: String,

    /// Raw command payload, when the driver exposes it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<serde_json::Value>,
}

/// A command completed successfully
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSucceededEvent {
    /// Correlation identifier matching the Started notification
    pub request_id: i64,

    /// Command name
    pub command_name: String,

    /// How long the command ran
    pub duration: Duration,
}

/// A command completed with an error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandFailedEvent {
    /// Correlation identifier matching the Started notification
    pub request_id: i64,

    /// Command name
    pub command_name: String,

    /// How long the command ran before failing
    pub duration: Duration,

    /// The failure cause
    pub failure: CommandFailure,
}

/// All command lifecycle notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "data")]
pub enum CommandEvent {
    #[serde(rename = "command.started")]
    Started(CommandStartedEvent),

    #[serde(rename = "command.succeeded")]
    Succeeded(CommandSucceededEvent),

    #[serde(rename = "command.failed")]
    Failed(CommandFailedEvent),
}

impl CommandEvent {
    /// Correlation identifier carried by any event kind
    pub fn request_id(&self) -> i64 {
        match self {
            CommandEvent::Started(e) => e.request_id,
            CommandEvent::Succeeded(e) => e.request_id,
            CommandEvent::Failed(e) => e.request_id,
        }
    }

    /// Command name carried by any event kind
    pub fn command_name(&self) -> &str {
        match self {
            CommandEvent::Started(e) => &e.command_name,
            CommandEvent::Succeeded(e) => &e.command_name,
            CommandEvent::Failed(e) => &e.command_name,
        }
    }
}
