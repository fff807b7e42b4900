//! Protocol message types.
//!
//! This module defines what travels between local end (Rust) and remote end
//! (driver or extension), independent of how a transport frames it.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | `Command` | Local → Remote | Command request (transport-neutral) |
//! | `BidiRequest` / `LegacyRequest` | Local → Remote | Transport-specific encodings |
//! | `RawReply` | Remote → Local | Command response, before error translation |
//! | `Event` | Remote → Local | Unsolicited notification (WebSocket only) |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Command model and well-known names |
//! | `event` | Event type and handler alias |
//! | `message` | Wire messages and reply normalization |
//! | `route` | HTTP routing table |

// ============================================================================
// Submodules
// ============================================================================

/// Command model.
pub mod command;

/// Event message types.
pub mod event;

/// Wire messages per transport.
pub mod message;

/// HTTP routing table.
pub mod route;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{Command, CommandContext, names};
pub use event::{Event, EventHandler};
pub use message::{BidiRequest, IncomingMessage, LegacyRequest, RawReply, TransportKind};
pub use route::{CommandRoutes, ResolvedRoute, Route};
