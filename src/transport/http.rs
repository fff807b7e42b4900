//! HTTP+JSON transport.
//!
//! Commands are routed through a [`CommandRoutes`] table to a method and
//! path under the endpoint's base URL. One exchange is outstanding at a
//! time; the keep-alive pool holds a single idle connection.
//!
//! The transport is `Connecting` until the first response arrives. A failed
//! request leaves it where it was: the pool reconnects on the next command,
//! so only [`close`](Transport::close) ends it.
//!
//! # Retries
//!
//! | Failure | Route | Retried |
//! |---------|-------|---------|
//! | Connect failed (request never sent) | any | yes |
//! | Connection reset | idempotent (`GET`, `HEAD`, or marked) | yes |
//! | Connection reset | other | no |
//! | Timeout | any | no |

// ============================================================================
// Imports
// ============================================================================

use std::error::Error as StdError;
use std::fmt;
use std::io::ErrorKind as IoErrorKind;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Identity, Method, redirect};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};
use url::Url;

use crate::dispatcher::TransportOptions;
use crate::error::{Error, Result};
use crate::protocol::{CommandRoutes, RawReply, TransportKind};

use super::state::{StateCell, TransportState};
use super::{Outbound, Transport, millis};

// ============================================================================
// HttpTransport
// ============================================================================

/// Request/response transport over HTTP.
pub struct HttpTransport {
    client: Client,
    base_url: String,
    routes: CommandRoutes,
    /// Held for a whole exchange.
    exchange: Mutex<()>,
    state: StateCell,
    max_retries: u32,
}

impl fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .field("routes", &self.routes.len())
            .field("state", &self.state.get())
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Creates a transport for `base_url` (e.g. `http://127.0.0.1:4444`).
    ///
    /// No connection is opened until the first command.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is not an absolute `http(s)` URL
    /// - [`Error::Http`] if the client identity or TLS setup is rejected
    pub fn new(base_url: &str, options: &TransportOptions, routes: CommandRoutes) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| Error::config(format!("invalid endpoint URL {base_url}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::config(format!(
                "endpoint URL must be http or https, got {}",
                parsed.scheme()
            )));
        }

        let mut builder = Client::builder()
            .redirect(redirect::Policy::limited(options.redirect_limit))
            .connect_timeout(options.connect_timeout())
            .pool_max_idle_per_host(1)
            .tcp_nodelay(true);

        if let Some(pem) = &options.client_identity_pem {
            builder = builder.identity(Identity::from_pem(pem.as_bytes())?);
        }

        let base_url = parsed.as_str().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, routes = routes.len(), "HTTP transport created");

        Ok(Self {
            client: builder.build()?,
            base_url,
            routes,
            exchange: Mutex::new(()),
            state: StateCell::new(TransportState::Connecting),
            max_retries: options.max_retries,
        })
    }

    /// Returns the base URL without a trailing slash.
    #[inline]
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the route table.
    #[inline]
    #[must_use]
    pub fn routes(&self) -> &CommandRoutes {
        &self.routes
    }

    /// Sends one request and returns the status with the decoded body.
    ///
    /// Bodies that are not JSON come back as a JSON string on error statuses
    /// so the translator still sees the peer's text.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if the deadline expires
    /// - [`Error::ProtocolViolation`] if a success body is not JSON
    /// - [`Error::Http`] for connection failures that cannot be retried
    pub async fn send_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        deadline: Duration,
        idempotent: bool,
    ) -> Result<(u16, Value)> {
        let url = format!("{}{path}", self.base_url);
        let mut attempt = 0u32;

        loop {
            let mut request = self.client.request(method.clone(), &url).timeout(deadline);
            if let Some(body) = body {
                request = request.json(body);
            }

            trace!(%method, url = %url, attempt, "HTTP request");

            let outcome = match request.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    response.bytes().await.map(|bytes| (status, bytes))
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok((status, bytes)) => {
                    trace!(status, bytes = bytes.len(), "HTTP response");
                    return decode_body(status, &bytes).map(|value| (status, value));
                }
                Err(e) if e.is_timeout() => {
                    warn!(%method, path, "HTTP request timed out");
                    return Err(Error::timeout(format!("{method} {path}"), millis(deadline)));
                }
                Err(e) if attempt < self.max_retries && is_retryable(&e, idempotent) => {
                    attempt += 1;
                    warn!(%method, path, attempt, error = %e, "Retrying HTTP request");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

// ============================================================================
// Transport Implementation
// ============================================================================

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    fn state(&self) -> TransportState {
        self.state.get()
    }

    async fn send(&self, outbound: Outbound<'_>, deadline: Duration) -> Result<RawReply> {
        let _exchange = self.exchange.lock().await;

        let idle = self.state.get();
        if !matches!(idle, TransportState::Connecting | TransportState::Ready) {
            return Err(Error::transport_closed("HTTP transport closed"));
        }
        self.state.set(TransportState::Busy);

        let result = async {
            let route = self.routes.resolve(outbound.command)?;
            let (status, payload) = self
                .send_raw(
                    route.method,
                    &route.path,
                    route.body.as_ref(),
                    deadline,
                    route.idempotent,
                )
                .await?;
            Ok::<_, Error>(RawReply::new(TransportKind::Http, Some(status), payload))
        }
        .await;

        let next = if result.is_ok() { TransportState::Ready } else { idle };
        self.state.transition(TransportState::Busy, next);
        result
    }

    async fn close(&self) -> Result<()> {
        let _exchange = self.exchange.lock().await;
        self.state.set(TransportState::Closing);
        self.state.set(TransportState::Disconnected);
        debug!(base_url = %self.base_url, "HTTP transport closed");
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn decode_body(status: u16, bytes: &[u8]) -> Result<Value> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    match serde_json::from_slice(bytes) {
        Ok(value) => Ok(value),
        Err(_) if !(200..300).contains(&status) => Ok(Value::String(
            String::from_utf8_lossy(bytes).trim().to_string(),
        )),
        Err(e) => Err(Error::protocol_violation(format!(
            "HTTP {status} body is not JSON: {e}"
        ))),
    }
}

/// A request may be resent only if it provably did not reach the server, or
/// if resending it cannot change server state.
fn is_retryable(err: &reqwest::Error, idempotent: bool) -> bool {
    if err.is_connect() {
        return true;
    }
    idempotent && is_connection_reset(err)
}

fn is_connection_reset(err: &reqwest::Error) -> bool {
    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>()
            && matches!(
                io.kind(),
                IoErrorKind::ConnectionReset | IoErrorKind::BrokenPipe | IoErrorKind::ConnectionAborted
            )
        {
            return true;
        }
        source = cause.source();
    }
    false
}

// ============================================================================
// Tests
// ============================================================================
