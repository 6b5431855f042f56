//! Error types for the onion identity and control-session layers
//!
//! The CLI glue works in `anyhow`; everything below it returns one of these
//! so callers can tell a bad key file from a rejected command.

use crate::tor::SessionState;
use std::fmt;
use std::path::PathBuf;

/// Key generation, parsing and persistence failures
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// Entropy source or key generator failed
    #[error("key generation failed: {0}")]
    Generation(String),

    /// Key file exists but its contents are unusable
    #[error("malformed key file {path:?}: {reason}")]
    MalformedKeyFile { path: PathBuf, reason: String },

    /// Key file does not exist
    #[error("key file not found: {0:?}")]
    FileNotFound(PathBuf),

    /// Reading or writing the key file failed
    #[error("key file I/O error on {path:?}: {source}")]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A `TYPE:base64` key blob could not be decoded
    #[error("malformed key: {0}")]
    MalformedKey(String),
}

impl KeyError {
    pub(crate) fn malformed<S: Into<String>>(reason: S) -> Self {
        Self::MalformedKey(reason.into())
    }
}

/// Control-port failures
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    /// Daemon unreachable, connection dropped, or a deadline expired
    #[error("connection error: {0}")]
    Connection(String),

    /// Every applicable authentication method was refused
    #[error("authentication failed: {0}")]
    AuthenticationFailure(String),

    /// Reply could not be parsed or did not carry what the command promises
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Daemon answered with a non-success status
    #[error("command rejected ({code}): {message}")]
    CommandRejected { code: u16, message: String },

    /// Command text would break line framing
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Illegal session state transition
    #[error("invalid session transition {from:?} -> {to:?}")]
    InvalidState { from: SessionState, to: SessionState },

    /// A previous command was abandoned before its reply arrived
    #[error("a command is already awaiting its reply; the session is no longer usable")]
    CommandInFlight,

    /// Session already closed
    #[error("control session is closed")]
    Closed,
}

impl ControlError {
    pub(crate) fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    pub(crate) fn protocol<S: Into<String>>(msg: S) -> Self {
        Self::Protocol(msg.into())
    }

    /// Status code carried by a rejection, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::CommandRejected { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Step of [`crate::service::ServicePublisher::publish`] that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishStep {
    Connect,
    Authenticate,
    ResolveLocalPort,
    AddOnion,
}

impl fmt::Display for PublishStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Authenticate => "authenticate",
            Self::ResolveLocalPort => "resolve local port",
            Self::AddOnion => "add onion service",
        };
        f.write_str(name)
    }
}

/// Publication failure annotated with the step that failed
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("{step} failed: {source}")]
    Step {
        step: PublishStep,
        #[source]
        source: ControlError,
    },

    /// The local listener went away before reporting its bound port
    #[error("resolve local port failed: listener never reported a bound port")]
    ListenerUnavailable,

    /// Port 0 was given with no listener to report the assigned port
    #[error("resolve local port failed: port 0 needs a listener to report the bound port")]
    UnresolvedPort,
}

impl PublishError {
    pub(crate) fn at(step: PublishStep) -> impl FnOnce(ControlError) -> Self {
        move |source| Self::Step { step, source }
    }

    /// Which step failed
    pub fn step(&self) -> PublishStep {
        match self {
            Self::Step { step, .. } => *step,
            Self::ListenerUnavailable | Self::UnresolvedPort => PublishStep::ResolveLocalPort,
        }
    }

    /// Underlying control error, when the failure came from the daemon side
    pub fn control_error(&self) -> Option<&ControlError> {
        match self {
            Self::Step { source, .. } => Some(source),
            Self::ListenerUnavailable | Self::UnresolvedPort => None,
        }
    }
}
