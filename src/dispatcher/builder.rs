//! Builder pattern for dispatcher configuration.
//!
//! Provides a fluent API for choosing a transport and creating a
//! [`Dispatcher`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use driver_wire::Dispatcher;
//!
//! # async fn example() -> driver_wire::Result<()> {
//! let dispatcher = Dispatcher::builder()
//!     .websocket("ws://127.0.0.1:9222/session")
//!     .command_timeout(Duration::from_secs(10))
//!     .build()
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::protocol::{CommandRoutes, Route};
use crate::transport::{HttpTransport, SocketTransport, Transport, WebSocketTransport};
use crate::translate::{ErrorTranslator, Rule};

use super::core::Dispatcher;
use super::options::TransportOptions;

// ============================================================================
// Endpoint
// ============================================================================

/// Where the dispatcher connects.
enum Endpoint {
    Http(String),
    Socket(String),
    WebSocket(String),
    Connected(Box<dyn Transport>),
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(url) => f.debug_tuple("Http").field(url).finish(),
            Self::Socket(addr) => f.debug_tuple("Socket").field(addr).finish(),
            Self::WebSocket(url) => f.debug_tuple("WebSocket").field(url).finish(),
            Self::Connected(transport) => f.debug_tuple("Connected").field(&transport.kind()).finish(),
        }
    }
}

// ============================================================================
// DispatcherBuilder
// ============================================================================

/// Builder for configuring a [`Dispatcher`].
///
/// Use [`Dispatcher::builder()`] to create a new builder.
#[derive(Default)]
pub struct DispatcherBuilder {
    endpoint: Option<Endpoint>,
    options: TransportOptions,
    routes: Option<CommandRoutes>,
    extra_routes: Vec<(String, Route)>,
    translator: Option<ErrorTranslator>,
    extra_rules: Vec<Rule>,
}

impl fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .field("extra_routes", &self.extra_routes.len())
            .field("extra_rules", &self.extra_rules.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// DispatcherBuilder Implementation
// ============================================================================

impl DispatcherBuilder {
    /// Creates a builder with default options and no endpoint.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses the HTTP transport against `base_url`.
    #[inline]
    #[must_use]
    pub fn http(mut self, base_url: impl Into<String>) -> Self {
        self.endpoint = Some(Endpoint::Http(base_url.into()));
        self
    }

    /// Uses the legacy framed socket transport against `host:port`.
    #[inline]
    #[must_use]
    pub fn socket(mut self, addr: impl Into<String>) -> Self {
        self.endpoint = Some(Endpoint::Socket(addr.into()));
        self
    }

    /// Uses the WebSocket transport against `url`.
    #[inline]
    #[must_use]
    pub fn websocket(mut self, url: impl Into<String>) -> Self {
        self.endpoint = Some(Endpoint::WebSocket(url.into()));
        self
    }

    /// Uses an already-connected transport, such as one accepted by a
    /// [`PendingServer`](crate::transport::PendingServer).
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.endpoint = Some(Endpoint::Connected(Box::new(transport)));
        self
    }

    /// Replaces all options.
    #[inline]
    #[must_use]
    pub fn options(mut self, options: TransportOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the default per-command deadline.
    #[inline]
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_command_timeout(timeout);
        self
    }

    /// Sets the connect deadline.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.options = self.options.with_connect_timeout(timeout);
        self
    }

    /// Sets the HTTP redirect limit.
    #[inline]
    #[must_use]
    pub fn redirect_limit(mut self, limit: usize) -> Self {
        self.options = self.options.with_redirect_limit(limit);
        self
    }

    /// Sets the HTTP retry count.
    #[inline]
    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.options = self.options.with_max_retries(retries);
        self
    }

    /// Sets the WebSocket pending-request ceiling.
    #[inline]
    #[must_use]
    pub fn max_pending(mut self, max_pending: usize) -> Self {
        self.options = self.options.with_max_pending(max_pending);
        self
    }

    /// Sets a PEM client identity for HTTPS endpoints.
    #[inline]
    #[must_use]
    pub fn client_identity_pem(mut self, pem: impl Into<String>) -> Self {
        self.options = self.options.with_client_identity_pem(pem);
        self
    }

    /// Replaces the HTTP route table (default: [`CommandRoutes::w3c`]).
    #[inline]
    #[must_use]
    pub fn routes(mut self, routes: CommandRoutes) -> Self {
        self.routes = Some(routes);
        self
    }

    /// Adds one HTTP route on top of the table.
    #[inline]
    #[must_use]
    pub fn route(mut self, name: impl Into<String>, route: Route) -> Self {
        self.extra_routes.push((name.into(), route));
        self
    }

    /// Replaces the error translator.
    #[inline]
    #[must_use]
    pub fn translator(mut self, translator: ErrorTranslator) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Adds a translation rule evaluated before the existing ones.
    #[inline]
    #[must_use]
    pub fn rule(mut self, rule: Rule) -> Self {
        self.extra_rules.push(rule);
        self
    }

    /// Connects the transport and builds the dispatcher.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if no endpoint is set or the options are invalid
    /// - [`Error::Timeout`] if the connection is not established in time
    /// - connection errors from the chosen transport
    pub async fn build(self) -> Result<Dispatcher> {
        self.options.validate()?;

        let endpoint = self.endpoint.ok_or_else(|| {
            Error::config(
                "No endpoint configured. Use .http(), .socket(), .websocket() or .transport().\n\
                 Example: Dispatcher::builder().http(\"http://127.0.0.1:4444\")",
            )
        })?;

        let connect_timeout = self.options.connect_timeout();
        let transport: Box<dyn Transport> = match endpoint {
            Endpoint::Http(url) => {
                let mut routes = self.routes.unwrap_or_else(CommandRoutes::w3c);
                for (name, route) in self.extra_routes {
                    routes.insert(name, route);
                }
                Box::new(HttpTransport::new(&url, &self.options, routes)?)
            }
            Endpoint::Socket(addr) => {
                Box::new(SocketTransport::connect(addr.as_str(), connect_timeout).await?)
            }
            Endpoint::WebSocket(url) => Box::new(
                WebSocketTransport::connect(&url, connect_timeout, self.options.max_pending).await?,
            ),
            Endpoint::Connected(transport) => transport,
        };

        let mut translator = self.translator.unwrap_or_default();
        // Prepend in reverse so the first registered rule is checked first.
        for rule in self.extra_rules.into_iter().rev() {
            translator.prepend(rule);
        }

        let command_timeout = self.options.command_timeout(transport.kind());
        Ok(Dispatcher::new(transport, translator, command_timeout))
    }
}

// ============================================================================
// Tests
// ============================================================================
