//! Network telemetry bus.
//!
//! [`InstrumentedTransport`](crate::transport::InstrumentedTransport)
//! publishes connection lifecycle and raw frames; [`wire`] adds the
//! client's view (decoded signals and rejected frames). With no subscriber
//! attached, publishing has no effect.
//!
//! # Events
//!
//! | Dir | Kind | Fields |
//! |-----|------|--------|
//! | `conn` | `connecting`, `open`, `closing` | |
//! | `conn` | `close` | `code`, `reason` |
//! | `conn` | `error` | `message` |
//! | `out` | `outgoing` | `text`, `action?`, `request_id?` |
//! | `in` | `incoming` | `text`, `signal?`, `request_id?` |
//! | `in` | `incoming-signal` | `signal` |
//! | `in` | `decode-error` | `text`, `error` |

// ============================================================================
// Imports
// ============================================================================

use std::sync::LazyLock;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::trace;

use crate::client::Client;
use crate::listeners::{Listeners, Subscription};
use crate::protocol::SignalEnvelope;

// ============================================================================
// TelemetryEvent
// ============================================================================

/// Which way an event travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Server → client.
    In,
    /// Client → server.
    Out,
    /// Connection lifecycle.
    Conn,
}

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum TelemetryKind {
    Connecting,
    Open,
    Closing,
    Close {
        code: Option<u16>,
        reason: String,
    },
    Error {
        message: String,
    },
    Outgoing {
        text: String,
        action: Option<String>,
        request_id: Option<String>,
    },
    Incoming {
        text: String,
        signal: Option<String>,
        request_id: Option<String>,
    },
    IncomingSignal {
        signal: SignalEnvelope,
    },
    DecodeError {
        text: String,
        error: String,
    },
}

impl TelemetryKind {
    /// Returns the direction this kind belongs to.
    #[must_use]
    pub const fn direction(&self) -> Direction {
        match self {
            Self::Connecting | Self::Open | Self::Closing | Self::Close { .. } | Self::Error { .. } => {
                Direction::Conn
            }
            Self::Outgoing { .. } => Direction::Out,
            Self::Incoming { .. } | Self::IncomingSignal { .. } | Self::DecodeError { .. } => {
                Direction::In
            }
        }
    }
}

/// One telemetry record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryEvent {
    /// Milliseconds since the Unix epoch.
    pub ts_ms: u64,
    pub dir: Direction,
    #[serde(flatten)]
    pub kind: TelemetryKind,
}

impl TelemetryEvent {
    /// Stamps `kind` with the current time.
    #[must_use]
    pub fn now(kind: TelemetryKind) -> Self {
        let ts_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        Self {
            ts_ms,
            dir: kind.direction(),
            kind,
        }
    }
}

// ============================================================================
// TelemetryBus
// ============================================================================

/// Fan-out point for telemetry events. Clones share subscribers.
#[derive(Debug, Clone)]
pub struct TelemetryBus {
    listeners: Listeners<TelemetryEvent>,
}

impl Default for TelemetryBus {
    fn default() -> Self {
        Self {
            listeners: Listeners::new("telemetry"),
        }
    }
}

impl TelemetryBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to every event.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&TelemetryEvent) + Send + Sync + 'static,
    {
        self.listeners.add(callback)
    }

    /// Returns `true` if at least one subscriber is attached.
    #[inline]
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.listeners.is_empty()
    }

    /// Publishes `kind`, stamped with the current time.
    pub fn publish(&self, kind: TelemetryKind) {
        if !self.is_active() {
            return;
        }
        let event = TelemetryEvent::now(kind);
        trace!(dir = ?event.dir, "Telemetry event");
        self.listeners.emit(&event);
    }
}

// ============================================================================
// Global Bus
// ============================================================================

static GLOBAL: LazyLock<TelemetryBus> = LazyLock::new(TelemetryBus::new);

/// Returns the process-wide bus.
#[must_use]
pub fn global() -> &'static TelemetryBus {
    &GLOBAL
}

// ============================================================================
// Client Wiring
// ============================================================================

/// Publishes the client's decoded signals and rejected frames on `bus`.
///
/// Returns one subscription covering both hooks.
pub fn wire(client: &Client, bus: &TelemetryBus) -> Subscription {
    let signals = {
        let bus = bus.clone();
        client.on_any(move |signal: &SignalEnvelope| {
            bus.publish(TelemetryKind::IncomingSignal {
                signal: signal.clone(),
            });
        })
    };

    let failures = {
        let bus = bus.clone();
        client.on_protocol_error(move |failure| {
            bus.publish(TelemetryKind::DecodeError {
                text: failure.text.clone(),
                error: failure.error.to_string(),
            });
        })
    };

    Subscription::all(vec![signals, failures])
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    fn collect(bus: &TelemetryBus) -> Arc<Mutex<Vec<TelemetryEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let _ = bus.subscribe(move |event| sink.lock().push(event.clone()));
        events
    }

    #[test]
    fn test_inactive_bus_drops_events() {
        let bus = TelemetryBus::new();
        assert!(!bus.is_active());
        bus.publish(TelemetryKind::Open);
    }

    #[test]
    fn test_direction_follows_kind() {
        let bus = TelemetryBus::new();
        let events = collect(&bus);

        bus.publish(TelemetryKind::Connecting);
        bus.publish(TelemetryKind::Outgoing {
            text: "{}".into(),
            action: None,
            request_id: None,
        });
        bus.publish(TelemetryKind::DecodeError {
            text: "x".into(),
            error: "bad".into(),
        });

        let dirs: Vec<Direction> = events.lock().iter().map(|e| e.dir).collect();
        assert_eq!(dirs, vec![Direction::Conn, Direction::Out, Direction::In]);
    }

    #[test]
    fn test_event_serializes_flat() {
        let event = TelemetryEvent {
            ts_ms: 1,
            dir: Direction::Conn,
            kind: TelemetryKind::Close {
                code: Some(1000),
                reason: "Normal".into(),
            },
        };
        assert_eq!(
            serde_json::to_value(&event).expect("serialize"),
            serde_json::json!({
                "ts_ms": 1,
                "dir": "conn",
                "kind": "close",
                "code": 1000,
                "reason": "Normal"
            })
        );
    }

    #[test]
    fn test_global_bus_is_shared() {
        assert!(std::ptr::eq(global(), global()));
    }
}
