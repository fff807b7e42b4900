//! Error translation.
//!
//! Maps a failed [`RawReply`] to one [`ErrorKind`]. The mapping is an ordered
//! list of predicate → kind rules evaluated first-match-wins, so new peer
//! vocabularies are added without touching transport code.
//!
//! # Default Rules
//!
//! | Order | Source | Example |
//! |-------|--------|---------|
//! | 1 | W3C / BiDi error code | `"no such element"` |
//! | 2 | Legacy JSON-wire numeric status | `7` |
//! | 3 | Message text pattern | `"Unable to locate element"` |
//! | (none) | Fallback | [`ErrorKind::RemoteError`] |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use regex::Regex;
use serde_json::Value;

use crate::error::{Error, ErrorEnvelope, ErrorKind, Result};
use crate::protocol::{RawReply, TransportKind};

// ============================================================================
// RemoteFailure
// ============================================================================

/// Fields pulled out of a failed payload, whatever the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFailure<'a> {
    /// Transport that produced the payload.
    pub transport: TransportKind,
    /// HTTP status, if any.
    pub http_status: Option<u16>,
    /// Symbolic error code (`"no such element"`, JSON-RPC code as text, ...).
    pub code: Option<String>,
    /// Legacy numeric status.
    pub legacy_status: Option<i64>,
    /// Human-readable message.
    pub message: String,
    /// Whole payload.
    pub payload: &'a Value,
}

impl<'a> RemoteFailure<'a> {
    /// Extracts failure fields following each transport's conventions.
    #[must_use]
    pub fn extract(transport: TransportKind, http_status: Option<u16>, payload: &'a Value) -> Self {
        let (code, legacy_status, message) = match transport {
            TransportKind::Http | TransportKind::Socket => {
                let value = payload.get("value");
                let code = value
                    .and_then(|v| v.get("error"))
                    .or_else(|| payload.get("error"))
                    .and_then(Value::as_str)
                    .map(str::to_string);
                let legacy_status = payload
                    .get("status")
                    .and_then(Value::as_i64)
                    .filter(|s| *s != 0);
                let message = value
                    .and_then(|v| v.get("message"))
                    .or_else(|| payload.get("message"))
                    .and_then(Value::as_str)
                    .or_else(|| value.and_then(Value::as_str))
                    .or_else(|| payload.as_str())
                    .map(str::to_string);
                (code, legacy_status, message)
            }
            TransportKind::WebSocket => match payload.get("error") {
                // JSON-RPC style: {"error": {"code": -32000, "message": "..."}}
                Some(Value::Object(err)) => {
                    let code = err.get("code").map(|c| match c {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    });
                    let message = err
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    (code, None, message)
                }
                // BiDi style: {"error": "no such frame", "message": "..."}
                Some(Value::String(code)) => {
                    let message = payload
                        .get("message")
                        .and_then(Value::as_str)
                        .map(str::to_string);
                    (Some(code.clone()), None, message)
                }
                _ => (None, None, None),
            },
        };

        let message = message
            .or_else(|| code.clone())
            .or_else(|| http_status.map(|s| format!("HTTP status {s}")))
            .unwrap_or_else(|| "unknown error".to_string());

        Self {
            transport,
            http_status,
            code,
            legacy_status,
            message,
            payload,
        }
    }
}

// ============================================================================
// Rule
// ============================================================================

type Predicate = Box<dyn Fn(&RemoteFailure<'_>) -> bool + Send + Sync>;

/// One predicate → kind pair.
pub struct Rule {
    name: String,
    kind: ErrorKind,
    predicate: Predicate,
}

impl Rule {
    /// Creates a rule from an arbitrary predicate.
    pub fn new(
        name: impl Into<String>,
        kind: ErrorKind,
        predicate: impl Fn(&RemoteFailure<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            predicate: Box::new(predicate),
        }
    }

    /// Matches a symbolic error code, case-insensitively.
    #[must_use]
    pub fn code(code: &str, kind: ErrorKind) -> Self {
        let expected = code.to_ascii_lowercase();
        Self::new(format!("code:{code}"), kind, move |failure| {
            failure
                .code
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(&expected))
        })
    }

    /// Matches a legacy numeric status.
    #[must_use]
    pub fn status(status: i64, kind: ErrorKind) -> Self {
        Self::new(format!("status:{status}"), kind, move |failure| {
            failure.legacy_status == Some(status)
        })
    }

    /// Matches the message text against a regular expression.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the pattern does not compile.
    pub fn pattern(pattern: &str, kind: ErrorKind) -> Result<Self> {
        let regex = Regex::new(pattern)
            .map_err(|e| Error::config(format!("invalid error pattern {pattern:?}: {e}")))?;
        Ok(Self::new(format!("pattern:{pattern}"), kind, move |failure| {
            regex.is_match(&failure.message)
        }))
    }

    /// Returns the rule's name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the kind this rule produces.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// ErrorTranslator
// ============================================================================

const ERROR_CODES: &[(&str, ErrorKind)] = &[
    ("no such element", ErrorKind::ElementNotFound),
    ("no such node", ErrorKind::ElementNotFound),
    ("stale element reference", ErrorKind::StaleElement),
    ("unexpected alert open", ErrorKind::UnexpectedAlertOpen),
    ("invalid session id", ErrorKind::InvalidSession),
    ("session not created", ErrorKind::InvalidSession),
    ("no such window", ErrorKind::NoSuchWindow),
    ("no such frame", ErrorKind::NoSuchFrame),
    ("timeout", ErrorKind::Timeout),
    ("script timeout", ErrorKind::Timeout),
];

const LEGACY_STATUSES: &[(i64, ErrorKind)] = &[
    (6, ErrorKind::InvalidSession),
    (7, ErrorKind::ElementNotFound),
    (8, ErrorKind::NoSuchFrame),
    (10, ErrorKind::StaleElement),
    (21, ErrorKind::Timeout),
    (23, ErrorKind::NoSuchWindow),
    (26, ErrorKind::UnexpectedAlertOpen),
    (28, ErrorKind::Timeout),
];

const MESSAGE_PATTERNS: &[(&str, ErrorKind)] = &[
    (
        r"(?i)stale element|no longer attached|not attached to the (page|document|dom)",
        ErrorKind::StaleElement,
    ),
    (
        r"(?i)unable to (locate|find) (an )?element|no such element|element (was )?not found|could not find element",
        ErrorKind::ElementNotFound,
    ),
    (
        r"(?i)unexpected alert|alert (is )?(open|present)|modal dialog (is )?present|user prompt",
        ErrorKind::UnexpectedAlertOpen,
    ),
    (
        r"(?i)invalid session|no active session|session (id )?(is )?(not found|deleted|does not exist|terminated)",
        ErrorKind::InvalidSession,
    ),
    (
        r"(?i)no such window|window (was |is )?(not found|already closed|closed)",
        ErrorKind::NoSuchWindow,
    ),
    (
        r"(?i)no such frame|unable to locate frame|frame (was |is )?(not found|detached)",
        ErrorKind::NoSuchFrame,
    ),
    (r"(?i)\btimed? ?out\b", ErrorKind::Timeout),
];

/// Data-driven mapping from failed replies to [`ErrorEnvelope`]s.
///
/// Pure: holds only its rule list.
#[derive(Debug)]
pub struct ErrorTranslator {
    rules: Vec<Rule>,
}

impl Default for ErrorTranslator {
    fn default() -> Self {
        Self::with_default_rules()
    }
}

impl ErrorTranslator {
    /// Creates a translator with no rules; every failure is a
    /// [`ErrorKind::RemoteError`].
    #[must_use]
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Creates a translator with the built-in vocabulary.
    #[must_use]
    pub fn with_default_rules() -> Self {
        let mut rules = Vec::with_capacity(
            ERROR_CODES.len() + LEGACY_STATUSES.len() + MESSAGE_PATTERNS.len(),
        );
        rules.extend(ERROR_CODES.iter().map(|(code, kind)| Rule::code(code, *kind)));
        rules.extend(
            LEGACY_STATUSES
                .iter()
                .map(|(status, kind)| Rule::status(*status, *kind)),
        );
        for (pattern, kind) in MESSAGE_PATTERNS {
            if let Ok(rule) = Rule::pattern(pattern, *kind) {
                rules.push(rule);
            }
        }
        Self { rules }
    }

    /// Adds a rule after the existing ones.
    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    /// Adds a rule ahead of the existing ones.
    pub fn prepend(&mut self, rule: Rule) {
        self.rules.insert(0, rule);
    }

    /// Returns the rules in evaluation order.
    #[inline]
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Translates a failed reply.
    #[must_use]
    pub fn translate(&self, reply: &RawReply) -> ErrorEnvelope {
        self.translate_payload(reply.transport, reply.status, &reply.payload)
    }

    /// Translates a failed payload.
    #[must_use]
    pub fn translate_payload(
        &self,
        transport: TransportKind,
        http_status: Option<u16>,
        payload: &Value,
    ) -> ErrorEnvelope {
        let failure = RemoteFailure::extract(transport, http_status, payload);
        let kind = self.classify(&failure);
        ErrorEnvelope::new(kind, failure.message).with_payload(payload.clone())
    }

    /// Returns the first matching rule's kind, or [`ErrorKind::RemoteError`].
    #[must_use]
    pub fn classify(&self, failure: &RemoteFailure<'_>) -> ErrorKind {
        self.rules
            .iter()
            .find(|rule| (rule.predicate)(failure))
            .map_or(ErrorKind::RemoteError, |rule| rule.kind)
    }
}

// ============================================================================
// Tests
// ============================================================================
