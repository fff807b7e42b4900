//! Error types for the protocol engine.
//!
//! Two layers live here:
//!
//! - [`Error`] is the crate-internal error returned by transports, framing and
//!   configuration. Every variant classifies into one [`ErrorKind`].
//! - [`ErrorEnvelope`] is the typed failure handed to callers of
//!   [`Dispatcher::execute`](crate::Dispatcher::execute): a kind, a message
//!   and the raw peer payload when there was one.
//!
//! # Usage
//!
//! ```ignore
//! use driver_wire::{Command, ErrorKind};
//!
//! match dispatcher.execute(command).await {
//!     Ok(value) => println!("{value}"),
//!     Err(envelope) if envelope.kind == ErrorKind::ElementNotFound => {}
//!     Err(envelope) => return Err(envelope.into()),
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`], [`Error::UnknownCommand`], [`Error::Unsupported`] |
//! | Session | [`Error::InvalidSession`] |
//! | Connection | [`Error::TransportClosed`], [`Error::TooManyPending`] |
//! | Protocol | [`Error::ProtocolViolation`], [`Error::Remote`] |
//! | Execution | [`Error::Timeout`], [`Error::RequestTimeout`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::Http`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::io::{Error as IoError, ErrorKind as IoErrorKind};
use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::CorrelationId;

// ============================================================================
// Result Aliases
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

/// Result of executing one command through the dispatcher.
pub type CommandResult<T> = StdResult<T, ErrorEnvelope>;

// ============================================================================
// ErrorKind
// ============================================================================

/// Failure taxonomy shared by every transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Element lookup matched nothing.
    ElementNotFound,
    /// Element reference no longer attached to the document.
    StaleElement,
    /// A user prompt blocked the command.
    UnexpectedAlertOpen,
    /// Session missing, unknown to the peer, or already deleted.
    InvalidSession,
    /// Target window is gone.
    NoSuchWindow,
    /// Target frame is gone.
    NoSuchFrame,
    /// Deadline expired before a reply arrived.
    Timeout,
    /// The physical connection is closed; the session is unusable.
    TransportClosed,
    /// Malformed framing or an unparseable message.
    ProtocolViolation,
    /// The command could not be encoded or routed locally.
    InvalidArgument,
    /// Peer-reported failure with no more specific mapping.
    RemoteError,
}

impl ErrorKind {
    /// Returns the stable lowercase name of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ElementNotFound => "element not found",
            Self::StaleElement => "stale element",
            Self::UnexpectedAlertOpen => "unexpected alert open",
            Self::InvalidSession => "invalid session",
            Self::NoSuchWindow => "no such window",
            Self::NoSuchFrame => "no such frame",
            Self::Timeout => "timeout",
            Self::TransportClosed => "transport closed",
            Self::ProtocolViolation => "protocol violation",
            Self::InvalidArgument => "invalid argument",
            Self::RemoteError => "remote error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ErrorEnvelope
// ============================================================================

/// Typed failure of one command.
///
/// Produced by the [`ErrorTranslator`](crate::ErrorTranslator) for peer
/// failures and by [`Error::into_envelope`] for local ones.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct ErrorEnvelope {
    /// Taxonomy entry.
    pub kind: ErrorKind,
    /// Human-readable message, usually the peer's own text.
    pub message: String,
    /// Payload the failure was decoded from, if any.
    pub raw_payload: Option<Value>,
}

impl ErrorEnvelope {
    /// Creates an envelope without a raw payload.
    #[inline]
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            raw_payload: None,
        }
    }

    /// Attaches the raw payload.
    #[inline]
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.raw_payload = Some(payload);
        self
    }

    /// Returns `true` if the kind invalidates the whole session.
    #[inline]
    #[must_use]
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::TransportClosed | ErrorKind::InvalidSession
        )
    }
}

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when dispatcher or transport configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument in a command.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    /// Command has no route on the active transport.
    #[error("Unknown command: {command}")]
    UnknownCommand {
        /// The unroutable command name.
        command: String,
    },

    /// Operation not offered by the active transport.
    #[error("Unsupported by {transport} transport: {operation}")]
    Unsupported {
        /// Transport name.
        transport: &'static str,
        /// Requested operation.
        operation: String,
    },

    // ========================================================================
    // Session Errors
    // ========================================================================
    /// Command issued without (or against the wrong) session.
    #[error("Invalid session: {message}")]
    InvalidSession {
        /// Why the session is unusable.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Connection closed; the transport cannot carry further commands.
    #[error("Transport closed: {message}")]
    TransportClosed {
        /// What closed the transport.
        message: String,
    },

    /// Too many requests awaiting a reply.
    #[error("Too many pending requests: {pending}/{max}")]
    TooManyPending {
        /// Requests currently outstanding.
        pending: usize,
        /// Configured ceiling.
        max: usize,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Malformed framing or message.
    #[error("Protocol violation: {message}")]
    ProtocolViolation {
        /// Description of the violation.
        message: String,
    },

    /// Failure reported by the remote end, already translated.
    #[error("Remote failure: {0}")]
    Remote(ErrorEnvelope),

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Correlated request timeout.
    #[error("Request {request_id} timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The request ID that timed out.
        request_id: CorrelationId,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// HTTP client error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an unknown command error.
    #[inline]
    pub fn unknown_command(command: impl Into<String>) -> Self {
        Self::UnknownCommand {
            command: command.into(),
        }
    }

    /// Creates an unsupported operation error.
    #[inline]
    pub fn unsupported(transport: &'static str, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            transport,
            operation: operation.into(),
        }
    }

    /// Creates an invalid session error.
    #[inline]
    pub fn invalid_session(message: impl Into<String>) -> Self {
        Self::InvalidSession {
            message: message.into(),
        }
    }

    /// Creates a transport closed error.
    #[inline]
    pub fn transport_closed(message: impl Into<String>) -> Self {
        Self::TransportClosed {
            message: message.into(),
        }
    }

    /// Creates a protocol violation error.
    #[inline]
    pub fn protocol_violation(message: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(request_id: CorrelationId, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            request_id,
            timeout_ms,
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

impl Error {
    /// Classifies this error into the failure taxonomy.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. }
            | Self::InvalidArgument { .. }
            | Self::UnknownCommand { .. }
            | Self::Unsupported { .. } => ErrorKind::InvalidArgument,
            Self::InvalidSession { .. } => ErrorKind::InvalidSession,
            Self::TransportClosed { .. } | Self::ChannelClosed(_) => ErrorKind::TransportClosed,
            Self::TooManyPending { .. } | Self::ProtocolViolation { .. } | Self::Json(_) => {
                ErrorKind::ProtocolViolation
            }
            Self::Remote(envelope) => envelope.kind,
            Self::Timeout { .. } | Self::RequestTimeout { .. } => ErrorKind::Timeout,
            Self::Io(err) => match err.kind() {
                IoErrorKind::TimedOut => ErrorKind::Timeout,
                IoErrorKind::InvalidData => ErrorKind::ProtocolViolation,
                _ => ErrorKind::TransportClosed,
            },
            Self::WebSocket(err) => match err {
                WsError::Protocol(_) | WsError::Capacity(_) => ErrorKind::ProtocolViolation,
                _ => ErrorKind::TransportClosed,
            },
            Self::Http(err) => {
                if err.is_timeout() {
                    ErrorKind::Timeout
                } else if err.is_decode() || err.is_redirect() {
                    ErrorKind::ProtocolViolation
                } else if err.is_builder() {
                    ErrorKind::InvalidArgument
                } else {
                    ErrorKind::TransportClosed
                }
            }
        }
    }

    /// Converts into the caller-facing envelope.
    #[must_use]
    pub fn into_envelope(self) -> ErrorEnvelope {
        match self {
            Self::Remote(envelope) => envelope,
            other => ErrorEnvelope::new(other.kind(), other.to_string()),
        }
    }
}

impl From<Error> for ErrorEnvelope {
    #[inline]
    fn from(err: Error) -> Self {
        err.into_envelope()
    }
}

impl From<ErrorEnvelope> for Error {
    #[inline]
    fn from(envelope: ErrorEnvelope) -> Self {
        Self::Remote(envelope)
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// Returns `true` if the connection is unusable.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        self.kind() == ErrorKind::TransportClosed
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Timeout | ErrorKind::StaleElement | ErrorKind::ElementNotFound
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
