//! Driver Wire - protocol engine for remote browser automation.
//!
//! This library sends structured commands to a remote automation endpoint
//! (an out-of-process driver or an in-browser extension) and matches each
//! command to its eventual response.
//!
//! # Architecture
//!
//! ```text
//! caller ─► Dispatcher ─► Transport ─► network ─► Transport ─► Correlator ─► ErrorTranslator ─► caller
//! ```
//!
//! Key design principles:
//!
//! - One contract over three transports: `execute(command) -> result`
//! - The dispatcher owns the session; the transport owns the connection
//! - Peer failures come back as a typed [`ErrorEnvelope`], never a panic
//! - Events are delivered to explicit subscribers keyed by event name
//!
//! # Transports
//!
//! | Transport | Wire | Concurrency |
//! |-----------|------|-------------|
//! | HTTP | JSON bodies on routed paths | one request at a time |
//! | Socket | `Length: N\n\n{json}\n` frames | one request at a time |
//! | WebSocket | `{"id", "method", "params"}` | multiplexed by id |
//!
//! # Quick Start
//!
//! ```no_run
//! use driver_wire::{Dispatcher, Result};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let dispatcher = Dispatcher::builder()
//!         .http("http://127.0.0.1:4444")
//!         .build()
//!         .await?;
//!
//!     dispatcher
//!         .execute(dispatcher.command("newSession").with_param("capabilities", json!({})))
//!         .await?;
//!
//!     let url = dispatcher
//!         .execute(dispatcher.command("navigateTo").with_param("url", json!("https://example.com")))
//!         .await;
//!
//!     match url {
//!         Ok(_) => println!("navigated"),
//!         Err(envelope) => println!("failed: {} ({})", envelope.message, envelope.kind),
//!     }
//!
//!     dispatcher.execute(dispatcher.command("deleteSession")).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`dispatcher`] | [`Dispatcher`], builder and options |
//! | [`error`] | Error types, [`ErrorKind`] taxonomy and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Commands, events, wire messages and HTTP routes |
//! | [`session`] | Session and context tracking |
//! | [`translate`] | Wire error to [`ErrorKind`] mapping |
//! | [`transport`] | HTTP, socket and WebSocket transports |

// ============================================================================
// Modules
// ============================================================================

/// Command dispatcher and configuration.
///
/// Use [`Dispatcher::builder()`] to create a configured dispatcher.
pub mod dispatcher;

/// Error types and result aliases.
///
/// Transport-level operations return [`Result<T>`]; command execution
/// returns [`CommandResult<T>`].
pub mod error;

/// Type-safe identifiers.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Protocol message types.
pub mod protocol;

/// Session context.
pub mod session;

/// Error translation rules.
pub mod translate;

/// Transport layer.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Dispatcher types
pub use dispatcher::{Dispatcher, DispatcherBuilder, TransportOptions};

// Error types
pub use error::{CommandResult, Error, ErrorEnvelope, ErrorKind, Result};

// Identifier types
pub use identifiers::{BrowsingContextId, CorrelationId, ElementId, SessionId, SubscriptionId};

// Protocol types
pub use protocol::{Command, CommandContext, CommandRoutes, Event, EventHandler, Route, TransportKind};

// Session types
pub use session::Session;

// Translation types
pub use translate::{ErrorTranslator, Rule};

// Transport types
pub use transport::{Transport, TransportState};
