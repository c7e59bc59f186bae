//! Simulation client module.
//!
//! This module provides the main entry point for talking to the server.
//!
//! # Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Client`] | Connection state, request correlation, subscriptions |
//! | [`ClientBuilder`] | Fluent configuration builder |
//! | [`ClientConfig`] | Timeouts, limits and match policy |
//! | [`SendOptions`] | Per-request overrides |
//! | [`PendingReply`] | Future resolving to a request's reply |
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use simlink::{Action, Client, Result};
//!
//! # async fn example() -> Result<()> {
//! let client = Client::builder()
//!     .url("ws://127.0.0.1:8000/ws")
//!     .build()?;
//!
//! client.connect()?;
//! client.wait_connected(Duration::from_secs(5)).await?;
//!
//! let started = client.send_action(Action::start(60, 1.0))?.checked().await?;
//! println!("{}", started.name());
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Fluent builder pattern for client configuration.
pub mod builder;

/// Core client implementation.
pub mod core;

/// Client and per-request settings.
pub mod options;

/// Pending request table.
mod pending;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::{Client, ConnectionState, DecodeFailure};
pub use options::{
    ClientConfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_PENDING, DEFAULT_REQUEST_TIMEOUT,
    SendOptions,
};
pub use pending::PendingReply;
