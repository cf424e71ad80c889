// src/error.rs
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors raised by the polling agent
///
/// Every variant maps to one containment level: configuration errors stop
/// the process at startup, registry errors skip a cycle, connect errors skip
/// a device, command and timeout errors skip a command, sink write errors
/// skip a point and flush errors are logged at the end of a cycle.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Connect error for {host}: {reason}")]
    Connect { host: String, reason: String },

    #[error("Command {command} failed: {reason}")]
    Command { command: String, reason: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Sink write error: {0}")]
    SinkWrite(String),

    #[error("Sink flush error: {0}")]
    SinkFlush(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl AgentError {
    /// Build a connect error for a device
    pub fn connect(host: impl Into<String>, reason: impl ToString) -> Self {
        AgentError::Connect {
            host: host.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a command error
    pub fn command(command: impl Into<String>, reason: impl ToString) -> Self {
        AgentError::Command {
            command: command.into(),
            reason: reason.to_string(),
        }
    }

    /// Build a timeout error
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        AgentError::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Whether this error is a deadline expiry
    pub fn is_timeout(&self) -> bool {
        matches!(self, AgentError::Timeout { .. })
    }
}
