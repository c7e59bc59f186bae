//! Transport layer.
//!
//! A [`Transport`] moves text frames between the client and the simulation
//! server and reports lifecycle events. The client never touches sockets
//! directly, so tests drive it through [`ManualTransport`] and production
//! code through [`WebSocketTransport`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                              ┌─────────────────┐
//! │  Client         │                              │  Simulation     │
//! │  (pending map)  │         WebSocket            │  Server         │
//! │       │         │◄────────────────────────────►│                 │
//! │  Transport      │     text frames (JSON)       │                 │
//! └─────────────────┘                              └─────────────────┘
//! ```
//!
//! # Ready States
//!
//! `Idle → Connecting → Open → Closing → Closed`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | tokio-tungstenite client and event loop |
//! | `manual` | In-memory transport driven by hand |
//! | `instrumented` | Decorator publishing telemetry |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::listeners::{Listeners, Subscription};

// ============================================================================
// Submodules
// ============================================================================

/// Telemetry decorator.
pub mod instrumented;

/// Deterministic in-memory transport.
pub mod manual;

/// WebSocket transport and event loop.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use instrumented::InstrumentedTransport;
pub use manual::ManualTransport;
pub use websocket::WebSocketTransport;

// ============================================================================
// Types
// ============================================================================

/// Called when the connection opens.
pub type OpenHandler = Box<dyn Fn() + Send + Sync>;

/// Called when the connection closes.
pub type CloseHandler = Box<dyn Fn(&CloseInfo) + Send + Sync>;

/// Called when the transport fails.
pub type ErrorHandler = Box<dyn Fn(&Error) + Send + Sync>;

/// Called for each inbound text frame.
pub type MessageHandler = Box<dyn Fn(&str) + Send + Sync>;

// ============================================================================
// ReadyState
// ============================================================================

/// Connection phase of a transport.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ReadyState {
    /// Never connected.
    #[default]
    Idle,
    /// Handshake in progress.
    Connecting,
    /// Frames may be sent.
    Open,
    /// Close requested, not yet complete.
    Closing,
    /// Closed by either side.
    Closed,
}

impl ReadyState {
    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ReadyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// CloseInfo
// ============================================================================

/// Details of a closed connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseInfo {
    /// WebSocket close code, if one was sent.
    pub code: Option<u16>,
    /// Close reason, empty if none.
    pub reason: String,
    /// `true` if the close handshake completed.
    pub was_clean: bool,
}

impl CloseInfo {
    /// Creates a clean close with `code` and `reason`.
    #[must_use]
    pub fn clean(code: Option<u16>, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean: true,
        }
    }

    /// Creates an abnormal close (stream ended or failed).
    #[must_use]
    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: None,
            reason: reason.into(),
            was_clean: false,
        }
    }
}

// ============================================================================
// TransportEvents
// ============================================================================

/// Listener lists every transport implementation exposes.
#[derive(Debug, Clone)]
pub struct TransportEvents {
    open: Listeners<()>,
    close: Listeners<CloseInfo>,
    error: Listeners<Error>,
    message: Listeners<String>,
}

impl Default for TransportEvents {
    fn default() -> Self {
        Self {
            open: Listeners::new("transport.open"),
            close: Listeners::new("transport.close"),
            error: Listeners::new("transport.error"),
            message: Listeners::new("transport.message"),
        }
    }
}

impl TransportEvents {
    /// Notifies open listeners.
    pub fn emit_open(&self) {
        self.open.emit(&());
    }

    /// Notifies close listeners.
    pub fn emit_close(&self, info: &CloseInfo) {
        self.close.emit(info);
    }

    /// Notifies error listeners.
    pub fn emit_error(&self, error: &Error) {
        self.error.emit(error);
    }

    /// Notifies message listeners.
    pub fn emit_message(&self, text: &str) {
        self.message.emit(&text.to_owned());
    }
}

// ============================================================================
// Transport Trait
// ============================================================================

/// Bidirectional text frame channel with lifecycle events.
///
/// Event callbacks may run on a background task (WebSocket) or inline on
/// the caller's thread (manual). Implementations must not hold internal
/// locks while emitting.
pub trait Transport: Send + Sync + 'static {
    /// Starts connecting. Completion is reported through open/close/error
    /// events.
    ///
    /// # Errors
    ///
    /// Returns an error if the attempt cannot even start (bad URL, no
    /// runtime).
    fn connect(&self) -> Result<()>;

    /// Closes the connection with an optional close code and reason.
    fn disconnect(&self, code: Option<u16>, reason: Option<&str>);

    /// Sends one text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] unless the transport is open.
    fn send(&self, text: &str) -> Result<()>;

    /// Returns the current ready state.
    fn ready_state(&self) -> ReadyState;

    /// Returns the listener lists backing the `on_*` methods.
    fn events(&self) -> &TransportEvents;

    /// Subscribes to open events.
    fn on_open(&self, handler: OpenHandler) -> Subscription {
        self.events().open.add(move |_| handler())
    }

    /// Subscribes to close events.
    fn on_close(&self, handler: CloseHandler) -> Subscription {
        self.events().close.add(move |info| handler(info))
    }

    /// Subscribes to error events.
    fn on_error(&self, handler: ErrorHandler) -> Subscription {
        self.events().error.add(move |error| handler(error))
    }

    /// Subscribes to inbound text frames.
    fn on_message(&self, handler: MessageHandler) -> Subscription {
        self.events().message.add(move |text: &String| handler(text))
    }
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn connect(&self) -> Result<()> {
        (**self).connect()
    }

    fn disconnect(&self, code: Option<u16>, reason: Option<&str>) {
        (**self).disconnect(code, reason);
    }

    fn send(&self, text: &str) -> Result<()> {
        (**self).send(text)
    }

    fn ready_state(&self) -> ReadyState {
        (**self).ready_state()
    }

    fn events(&self) -> &TransportEvents {
        (**self).events()
    }
}

// ============================================================================
// Tests
// ============================================================================
