//! Transport configuration.
//!
//! Type-safe knobs shared by all three transports. The struct deserializes
//! from any serde format, so an embedding application can keep it in its own
//! config file; absent fields take their defaults.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use driver_wire::TransportOptions;
//!
//! let options = TransportOptions::new()
//!     .with_command_timeout(Duration::from_secs(10))
//!     .with_redirect_limit(5)
//!     .with_max_retries(0);
//!
//! assert_eq!(options.redirect_limit, 5);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol::TransportKind;
use crate::transport::correlator::DEFAULT_MAX_PENDING;

// ============================================================================
// Constants
// ============================================================================

/// Default redirect limit for the HTTP transport.
pub const DEFAULT_REDIRECT_LIMIT: usize = 20;

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default retry count for provably safe HTTP retries.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

// ============================================================================
// TransportOptions
// ============================================================================

/// Connection and execution options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Deadline per command in milliseconds; `None` uses the transport's
    /// default (120 s HTTP and socket, 30 s WebSocket).
    pub command_timeout_ms: Option<u64>,

    /// Deadline for establishing a connection, in milliseconds.
    pub connect_timeout_ms: u64,

    /// Maximum redirects followed by the HTTP transport.
    pub redirect_limit: usize,

    /// Retries after a connect failure or a reset on an idempotent route.
    pub max_retries: u32,

    /// Maximum outstanding WebSocket requests.
    pub max_pending: usize,

    /// PEM bundle (certificate chain plus private key) for client TLS auth.
    pub client_identity_pem: Option<String>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl TransportOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            command_timeout_ms: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT.as_millis() as u64,
            redirect_limit: DEFAULT_REDIRECT_LIMIT,
            max_retries: DEFAULT_MAX_RETRIES,
            max_pending: DEFAULT_MAX_PENDING,
            client_identity_pem: None,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl TransportOptions {
    /// Sets the per-command deadline.
    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout_ms = Some(crate::transport::millis(timeout));
        self
    }

    /// Sets the connect deadline.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = crate::transport::millis(timeout);
        self
    }

    /// Sets the HTTP redirect limit.
    #[inline]
    #[must_use]
    pub fn with_redirect_limit(mut self, limit: usize) -> Self {
        self.redirect_limit = limit;
        self
    }

    /// Sets the HTTP retry count.
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the outstanding-request ceiling.
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Sets the client identity.
    #[inline]
    #[must_use]
    pub fn with_client_identity_pem(mut self, pem: impl Into<String>) -> Self {
        self.client_identity_pem = Some(pem.into());
        self
    }
}

// ============================================================================
// Accessors
// ============================================================================

impl TransportOptions {
    /// Effective command deadline for a transport.
    #[must_use]
    pub fn command_timeout(&self, kind: TransportKind) -> Duration {
        self.command_timeout_ms
            .map_or_else(|| kind.default_command_timeout(), Duration::from_millis)
    }

    /// Connect deadline.
    #[inline]
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validates the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for zero deadlines or a zero pending ceiling.
    pub fn validate(&self) -> Result<()> {
        if self.command_timeout_ms == Some(0) {
            return Err(Error::config("command timeout must be greater than zero"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::config("connect timeout must be greater than zero"));
        }
        if self.max_pending == 0 {
            return Err(Error::config("max_pending must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = TransportOptions::new();
        assert_eq!(options, TransportOptions::default());
        assert_eq!(options.redirect_limit, 20);
        assert_eq!(options.max_retries, 1);
        assert_eq!(options.max_pending, 100);
        assert_eq!(options.connect_timeout(), Duration::from_secs(30));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_command_timeout_per_transport() {
        let options = TransportOptions::new();
        assert_eq!(
            options.command_timeout(TransportKind::Http),
            Duration::from_secs(120)
        );
        assert_eq!(
            options.command_timeout(TransportKind::WebSocket),
            Duration::from_secs(30)
        );

        let fixed = options.with_command_timeout(Duration::from_millis(1500));
        assert_eq!(
            fixed.command_timeout(TransportKind::Socket),
            Duration::from_millis(1500)
        );
    }

    #[test]
    fn test_deserialize_partial() {
        let options: TransportOptions =
            serde_json::from_str(r#"{"redirect_limit": 3, "command_timeout_ms": 500}"#)
                .expect("deserialize");
        assert_eq!(options.redirect_limit, 3);
        assert_eq!(options.command_timeout_ms, Some(500));
        assert_eq!(options.max_pending, 100);
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert!(TransportOptions::new().with_max_pending(0).validate().is_err());
        assert!(
            TransportOptions::new()
                .with_command_timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
