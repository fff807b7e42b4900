//! WebSocket server for extension-initiated connections.
//!
//! Some remote ends (an in-browser extension) dial out to the client rather
//! than the other way round.
//!
//! # Connection Flow
//!
//! 1. Bind a WebSocket server to `localhost:0` (random port)
//! 2. Hand [`PendingServer::ws_url`] to whatever launches the browser
//! 3. The extension connects and the connection is upgraded
//! 4. The result is an ordinary [`WebSocketTransport`]

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::error::{Error, Result};

use super::millis;
use super::websocket::WebSocketTransport;

// ============================================================================
// PendingServer
// ============================================================================

/// A WebSocket server that is bound but not yet connected.
///
/// # Example
///
/// ```ignore
/// use std::net::{IpAddr, Ipv4Addr};
/// use std::time::Duration;
/// use driver_wire::transport::PendingServer;
///
/// let server = PendingServer::bind(IpAddr::V4(Ipv4Addr::LOCALHOST), 0).await?;
/// let ws_url = server.ws_url();
///
/// // Launch the browser with ws_url...
///
/// let transport = server.accept(Duration::from_secs(30), 100).await?;
/// ```
#[derive(Debug)]
pub struct PendingServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl PendingServer {
    /// Binds to the given address; port 0 lets the OS choose.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if binding fails.
    pub async fn bind(ip: IpAddr, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(SocketAddr::new(ip, port)).await?;
        let local_addr = listener.local_addr()?;

        debug!(port = local_addr.port(), "WebSocket server bound");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the bound port.
    #[inline]
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Returns the bound address.
    #[inline]
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the URL the extension should dial: `ws://{ip}:{port}`.
    #[must_use]
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Accepts one connection and upgrades it.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if nothing connects in time
    /// - [`Error::WebSocket`] if the upgrade fails
    pub async fn accept(
        self,
        accept_timeout: Duration,
        max_pending: usize,
    ) -> Result<WebSocketTransport> {
        let (stream, addr) = timeout(accept_timeout, self.listener.accept())
            .await
            .map_err(|_| Error::timeout("accept extension connection", millis(accept_timeout)))??;

        debug!(?addr, "TCP connection accepted");

        let ws_stream = timeout(accept_timeout, tokio_tungstenite::accept_async(stream))
            .await
            .map_err(|_| Error::timeout("websocket upgrade", millis(accept_timeout)))??;

        info!(port = self.local_addr.port(), "WebSocket connection established");

        Ok(WebSocketTransport::from_stream(ws_stream, max_pending))
    }
}

// ============================================================================
// Tests
// ============================================================================
