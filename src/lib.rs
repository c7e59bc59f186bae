//! simlink - WebSocket protocol client for the logistics simulation HUD.
//!
//! This library speaks the simulation server's JSON protocol: it encodes and
//! validates actions, decodes and validates signals, correlates replies with
//! the requests that caused them, and fans signals out to subscribers.
//!
//! # Architecture
//!
//! The client follows a request/reply-plus-push model:
//!
//! - **Actions (client → server)**: `{"action", "params", "request_id"}`
//! - **Signals (server → client)**: `{"signal", "data", "request_id"?}`
//!
//! Key design principles:
//!
//! - Every action and signal name has exactly one schema, checked on both
//!   directions before anything reaches the wire or a subscriber
//! - Each sent action waits on its own pending entry, settled at most once by
//!   a reply, a timeout or a disconnect
//! - The [`Client`] never touches sockets; a [`Transport`] does
//! - Event-driven architecture (no polling)
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use simlink::{Action, Client, Result, SignalName};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder()
//!         .url("ws://127.0.0.1:8000/ws")
//!         .build()?;
//!
//!     let _ticks = client.on(SignalName::TickEnd, |signal| {
//!         println!("{:?}", signal.signal);
//!     });
//!
//!     client.connect()?;
//!     client.wait_connected(Duration::from_secs(5)).await?;
//!
//!     let started = client.send_action(Action::start(60, 1.0))?.checked().await?;
//!     println!("Started: {}", started.name());
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapter`] | Decoded signals to domain events |
//! | [`client`] | [`Client`], [`ClientBuilder`] and request correlation |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`listeners`] | Ordered callback lists with panic isolation |
//! | [`protocol`] | Action and signal schemas |
//! | [`telemetry`] | Network telemetry bus |
//! | [`transport`] | Transport trait and implementations |

// ============================================================================
// Modules
// ============================================================================

/// Net adapter.
///
/// Maps decoded signals to the events a simulation store applies.
pub mod adapter;

/// Simulation client and configuration.
///
/// Use [`Client::builder()`] to create a configured client instance.
pub mod client;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Subscriber lists and subscription handles.
pub mod listeners;

/// Wire protocol schemas, codecs and the action → signal mapping.
pub mod protocol;

/// Network telemetry.
pub mod telemetry;

/// Transport layer.
///
/// WebSocket transport for production, manual transport for tests.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Adapter types
pub use adapter::{DomainEvent, map_signal};

// Client types
pub use client::{
    Client, ClientBuilder, ClientConfig, ConnectionState, DecodeFailure, PendingReply,
    SendOptions,
};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::RequestId;

// Listener types
pub use listeners::Subscription;

// Protocol types
pub use protocol::{
    Action, ActionEnvelope, ActionName, MatchPolicy, Matcher, Signal, SignalEnvelope, SignalName,
    ValidationError, decode_action, decode_signal, encode_action, expected_signal_for,
    matcher_for,
};

// Telemetry types
pub use telemetry::{Direction, TelemetryBus, TelemetryEvent, TelemetryKind};

// Transport types
pub use transport::{
    CloseInfo, InstrumentedTransport, ManualTransport, ReadyState, Transport, WebSocketTransport,
};
