//! Command dispatcher module.
//!
//! The single entry point for executing commands over any transport.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Dispatcher`] | Executes commands and owns the session |
//! | [`DispatcherBuilder`] | Fluent configuration builder |
//! | [`TransportOptions`] | Deadlines, limits and TLS identity |
//!
//! # Example
//!
//! ```no_run
//! use driver_wire::{Dispatcher, Result};
//!
//! # async fn example() -> Result<()> {
//! let dispatcher = Dispatcher::builder()
//!     .socket("127.0.0.1:2828")
//!     .build()
//!     .await?;
//!
//! dispatcher.execute(dispatcher.command("newSession")).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for dispatcher configuration.
pub mod builder;

/// Core dispatcher implementation.
pub mod core;

/// Transport options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::DispatcherBuilder;
pub use core::Dispatcher;
pub use options::TransportOptions;
