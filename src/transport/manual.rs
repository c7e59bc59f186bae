//! Deterministic in-memory transport.
//!
//! Nothing happens on its own: the owner drives every event with the
//! `emit_*` methods and inspects outbound frames with [`ManualTransport::sent`].
//! All callbacks run inline on the calling thread.
//!
//! # Example
//!
//! ```ignore
//! let transport = Arc::new(ManualTransport::new());
//! let client = Client::new(transport.clone(), ClientConfig::default());
//!
//! client.connect()?;
//! transport.emit_open();
//! ```

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{Error, Result};

use super::{CloseInfo, ReadyState, Transport, TransportEvents};

// ============================================================================
// ManualTransport
// ============================================================================

/// Transport whose events are triggered by hand.
#[derive(Debug, Default)]
pub struct ManualTransport {
    state: Mutex<ReadyState>,
    sent: Mutex<Vec<String>>,
    events: TransportEvents,
}

impl ManualTransport {
    /// Creates an idle transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the transport open and notifies open listeners.
    pub fn emit_open(&self) {
        *self.state.lock() = ReadyState::Open;
        self.events.emit_open();
    }

    /// Delivers an inbound text frame.
    pub fn emit_message(&self, text: &str) {
        self.events.emit_message(text);
    }

    /// Reports a transport failure. The ready state is left unchanged.
    pub fn emit_error(&self, error: &Error) {
        self.events.emit_error(error);
    }

    /// Marks the transport closed and notifies close listeners.
    pub fn emit_close(&self, info: &CloseInfo) {
        *self.state.lock() = ReadyState::Closed;
        self.events.emit_close(info);
    }

    /// Returns every frame sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }

    /// Returns the most recently sent frame.
    #[must_use]
    pub fn last_sent(&self) -> Option<String> {
        self.sent.lock().last().cloned()
    }

    /// Drains and returns every frame sent so far.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl Transport for ManualTransport {
    fn connect(&self) -> Result<()> {
        let mut state = self.state.lock();
        if *state != ReadyState::Open {
            *state = ReadyState::Connecting;
        }
        Ok(())
    }

    fn disconnect(&self, code: Option<u16>, reason: Option<&str>) {
        let previous = {
            let mut state = self.state.lock();
            let previous = *state;
            *state = ReadyState::Closed;
            previous
        };

        if matches!(previous, ReadyState::Connecting | ReadyState::Open) {
            self.events
                .emit_close(&CloseInfo::clean(code, reason.unwrap_or_default()));
        }
    }

    fn send(&self, text: &str) -> Result<()> {
        if *self.state.lock() != ReadyState::Open {
            return Err(Error::NotConnected);
        }
        trace!(len = text.len(), "Frame recorded");
        self.sent.lock().push(text.to_owned());
        Ok(())
    }

    fn ready_state(&self) -> ReadyState {
        *self.state.lock()
    }

    fn events(&self) -> &TransportEvents {
        &self.events
    }
}

// ============================================================================
// Tests
// ============================================================================
