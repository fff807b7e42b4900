//! Shared mock peers for integration tests.
//!
//! Each integration test file compiles common/ as its own module, so not
//! every helper is used in every file.
#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use driver_wire::transport::framing::{FrameDecoder, encode_frame};
use driver_wire::transport::{SocketTransport, WebSocketTransport};
use driver_wire::{Dispatcher, TransportOptions};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, DuplexStream, duplex};
use tokio::net::TcpListener;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::Role;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Logging
// ============================================================================

/// Installs a test-friendly subscriber once per process.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("driver_wire=debug")),
        )
        .with_target(false)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// Socket Peer
// ============================================================================

/// Remote end of an in-memory framed socket.
pub struct SocketPeer {
    stream: DuplexStream,
    decoder: FrameDecoder,
}

impl SocketPeer {
    /// Reads one request frame.
    pub async fn read_request(&mut self) -> Result<Value> {
        let mut chunk = [0u8; 1024];
        loop {
            if let Some(body) = self.decoder.decode()? {
                return Ok(serde_json::from_slice(&body)?);
            }
            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                bail!("client closed the socket");
            }
            self.decoder.push(&chunk[..n]);
        }
    }

    /// Writes one reply frame.
    pub async fn reply(&mut self, payload: &Value) -> Result<()> {
        let body = serde_json::to_vec(payload)?;
        self.stream.write_all(&encode_frame(&body)).await?;
        Ok(())
    }

    /// Fails if another request arrives within `wait`.
    pub async fn expect_quiet(&mut self, wait: Duration) -> Result<()> {
        match tokio::time::timeout(wait, self.read_request()).await {
            Err(_) => Ok(()),
            Ok(request) => bail!("second request while one is outstanding: {request:?}"),
        }
    }

    /// Writes raw bytes.
    pub async fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await?;
        Ok(())
    }
}

/// Dispatcher over an in-memory framed socket.
pub async fn socket_pair() -> Result<(Dispatcher, SocketPeer)> {
    init_logging();
    let (client, server) = duplex(64 * 1024);
    let dispatcher = Dispatcher::builder()
        .transport(SocketTransport::from_stream(client))
        .build()
        .await?;
    Ok((
        dispatcher,
        SocketPeer {
            stream: server,
            decoder: FrameDecoder::new(),
        },
    ))
}

// ============================================================================
// WebSocket Peer
// ============================================================================

/// Remote end of an in-memory WebSocket.
pub struct WsPeer {
    stream: WebSocketStream<DuplexStream>,
}

impl WsPeer {
    /// Reads the next text frame as JSON.
    pub async fn read_request(&mut self) -> Result<Value> {
        loop {
            match self.stream.next().await.context("socket ended")?? {
                Message::Text(text) => return Ok(serde_json::from_str(&text)?),
                Message::Close(_) => bail!("client closed the socket"),
                _ => {}
            }
        }
    }

    /// Sends one JSON text frame.
    pub async fn send(&mut self, payload: &Value) -> Result<()> {
        self.stream
            .send(Message::Text(payload.to_string().into()))
            .await?;
        Ok(())
    }

    /// Sends a close frame.
    pub async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}

/// Multiplexed transport over an in-memory WebSocket.
pub async fn ws_transport(max_pending: usize) -> (WebSocketTransport, WsPeer) {
    init_logging();
    let (client, server) = duplex(256 * 1024);
    let client = WebSocketStream::from_raw_socket(client, Role::Client, None).await;
    let server = WebSocketStream::from_raw_socket(server, Role::Server, None).await;
    (
        WebSocketTransport::from_stream(client, max_pending),
        WsPeer { stream: server },
    )
}

/// Dispatcher over an in-memory WebSocket.
pub async fn ws_pair(options: TransportOptions) -> Result<(Dispatcher, WsPeer)> {
    let (transport, peer) = ws_transport(options.max_pending).await;
    let dispatcher = Dispatcher::builder()
        .options(options)
        .transport(transport)
        .build()
        .await?;
    Ok((dispatcher, peer))
}

// ============================================================================
// HTTP Responder
// ============================================================================

/// One request seen by the responder.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub body: Option<Value>,
}

/// Canned response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
    pub delay: Option<Duration>,
    /// Close the connection instead of answering.
    pub drop_connection: bool,
}

impl HttpResponse {
    /// JSON response with the given status.
    pub fn json(status: u16, body: &Value) -> Self {
        Self {
            status,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: body.to_string(),
            delay: None,
            drop_connection: false,
        }
    }

    /// Redirect to `location`.
    pub fn redirect(location: &str) -> Self {
        Self {
            status: 302,
            headers: vec![("Location".into(), location.into())],
            body: String::new(),
            delay: None,
            drop_connection: false,
        }
    }

    /// Closes the connection without a response.
    pub fn dropped() -> Self {
        Self {
            status: 0,
            headers: Vec::new(),
            body: String::new(),
            delay: None,
            drop_connection: true,
        }
    }

    /// Delays the response.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

/// Requests currently being served, and the most ever served at once.
#[derive(Debug, Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    /// Highest number of overlapping requests seen.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Starts a minimal HTTP/1.1 server; returns its base URL.
pub async fn spawn_http<F>(handler: F) -> Result<String>
where
    F: Fn(HttpRequest) -> HttpResponse + Send + Sync + 'static,
{
    let (base_url, _) = spawn_http_tracked(handler).await?;
    Ok(base_url)
}

/// Like [`spawn_http`], also counting overlapping requests.
pub async fn spawn_http_tracked<F>(handler: F) -> Result<(String, Arc<InFlight>)>
where
    F: Fn(HttpRequest) -> HttpResponse + Send + Sync + 'static,
{
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let handler = Arc::new(handler);
    let in_flight = Arc::new(InFlight::default());

    let stats = Arc::clone(&in_flight);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let handler = Arc::clone(&handler);
            let stats = Arc::clone(&stats);
            tokio::spawn(async move {
                let _ = serve_connection(stream, handler.as_ref(), &stats).await;
            });
        }
    });

    Ok((format!("http://{addr}"), in_flight))
}

async fn serve_connection<F>(
    stream: tokio::net::TcpStream,
    handler: &F,
    in_flight: &InFlight,
) -> Result<()>
where
    F: Fn(HttpRequest) -> HttpResponse,
{
    let mut reader = BufReader::new(stream);

    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await? == 0 {
            return Ok(());
        }
        let mut parts = request_line.split_whitespace();
        let method = parts.next().context("method")?.to_string();
        let path = parts.next().context("path")?.to_string();

        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).await?;
            let line = line.trim_end();
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':')
                && name.eq_ignore_ascii_case("content-length")
            {
                content_length = value.trim().parse()?;
            }
        }

        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).await?;
        let body = if body.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&body)?)
        };

        in_flight.enter();
        let response = handler(HttpRequest { method, path, body });
        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        // Counted out before the client can see the response.
        in_flight.leave();

        if response.drop_connection {
            return Ok(());
        }

        let mut head = format!("HTTP/1.1 {} Mock\r\n", response.status);
        for (name, value) in &response.headers {
            head.push_str(&format!("{name}: {value}\r\n"));
        }
        head.push_str(&format!("Content-Length: {}\r\n\r\n", response.body.len()));

        let stream = reader.get_mut();
        stream.write_all(head.as_bytes()).await?;
        stream.write_all(response.body.as_bytes()).await?;
        stream.flush().await?;
    }
}
