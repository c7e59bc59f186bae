//! Transport decorator that publishes telemetry.
//!
//! Every call and event passes through unchanged; the decorator only
//! observes. Outbound and inbound frames are parsed best-effort to pull out
//! the action / signal name and request id, and a frame that is not JSON is
//! still reported with those fields empty.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::Result;
use crate::telemetry::{self, TelemetryBus, TelemetryKind};

use super::{ReadyState, Transport, TransportEvents};

// ============================================================================
// InstrumentedTransport
// ============================================================================

/// Wraps a transport and mirrors its traffic onto a [`TelemetryBus`].
#[derive(Debug)]
pub struct InstrumentedTransport<T: Transport> {
    inner: T,
    bus: TelemetryBus,
}

impl<T: Transport> InstrumentedTransport<T> {
    /// Wraps `inner`, publishing on the process-wide bus.
    pub fn new(inner: T) -> Self {
        Self::with_bus(inner, telemetry::global().clone())
    }

    /// Wraps `inner`, publishing on `bus`.
    pub fn with_bus(inner: T, bus: TelemetryBus) -> Self {
        let open_bus = bus.clone();
        let _ = inner.on_open(Box::new(move || open_bus.publish(TelemetryKind::Open)));

        let close_bus = bus.clone();
        let _ = inner.on_close(Box::new(move |info| {
            close_bus.publish(TelemetryKind::Close {
                code: info.code,
                reason: info.reason.clone(),
            });
        }));

        let error_bus = bus.clone();
        let _ = inner.on_error(Box::new(move |error| {
            error_bus.publish(TelemetryKind::Error {
                message: error.to_string(),
            });
        }));

        let message_bus = bus.clone();
        let _ = inner.on_message(Box::new(move |text| {
            if !message_bus.is_active() {
                return;
            }
            let (signal, request_id) = peek(text, "signal");
            message_bus.publish(TelemetryKind::Incoming {
                text: text.to_owned(),
                signal,
                request_id,
            });
        }));

        Self { inner, bus }
    }

    /// Returns the wrapped transport.
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Returns the bus events are published on.
    #[inline]
    #[must_use]
    pub fn bus(&self) -> &TelemetryBus {
        &self.bus
    }
}

impl<T: Transport> Transport for InstrumentedTransport<T> {
    fn connect(&self) -> Result<()> {
        self.bus.publish(TelemetryKind::Connecting);
        self.inner.connect()
    }

    fn disconnect(&self, code: Option<u16>, reason: Option<&str>) {
        self.bus.publish(TelemetryKind::Closing);
        self.inner.disconnect(code, reason);
    }

    fn send(&self, text: &str) -> Result<()> {
        if self.bus.is_active() {
            let (action, request_id) = peek(text, "action");
            self.bus.publish(TelemetryKind::Outgoing {
                text: text.to_owned(),
                action,
                request_id,
            });
        }
        self.inner.send(text)
    }

    fn ready_state(&self) -> ReadyState {
        self.inner.ready_state()
    }

    fn events(&self) -> &TransportEvents {
        self.inner.events()
    }
}

/// Best-effort read of the discriminant `field` and `request_id` of a frame.
fn peek(text: &str, field: &str) -> (Option<String>, Option<String>) {
    let Ok(Value::Object(object)) = serde_json::from_str::<Value>(text) else {
        return (None, None);
    };
    let read = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_owned);
    (read(field), read("request_id"))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use crate::error::Error;
    use crate::telemetry::{Direction, TelemetryEvent};
    use crate::transport::{CloseInfo, ManualTransport};

    fn setup() -> (
        Arc<InstrumentedTransport<ManualTransport>>,
        Arc<Mutex<Vec<TelemetryEvent>>>,
    ) {
        let bus = TelemetryBus::new();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let _ = bus.subscribe(move |event| sink.lock().push(event.clone()));

        let transport = Arc::new(InstrumentedTransport::with_bus(ManualTransport::new(), bus));
        (transport, events)
    }

    #[test]
    fn test_connection_events() {
        let (transport, events) = setup();

        transport.connect().expect("connect");
        transport.inner().emit_open();
        transport.inner().emit_error(&Error::transport("Test error"));
        transport
            .inner()
            .emit_close(&CloseInfo::clean(Some(1000), "Normal"));

        let kinds: Vec<TelemetryKind> = events.lock().iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                TelemetryKind::Connecting,
                TelemetryKind::Open,
                TelemetryKind::Error {
                    message: "Transport error: Test error".into()
                },
                TelemetryKind::Close {
                    code: Some(1000),
                    reason: "Normal".into()
                },
            ]
        );
        assert!(events.lock().iter().all(|e| e.dir == Direction::Conn));
    }

    #[test]
    fn test_outgoing_frame_is_parsed() {
        let (transport, events) = setup();
        transport.inner().emit_open();

        let payload = r#"{"action":"simulation.start","params":{"tick_rate":60},"request_id":"req-1"}"#;
        transport.send(payload).expect("send");

        let events = events.lock();
        let last = events.last().expect("event");
        assert_eq!(last.dir, Direction::Out);
        assert_eq!(
            last.kind,
            TelemetryKind::Outgoing {
                text: payload.into(),
                action: Some("simulation.start".into()),
                request_id: Some("req-1".into()),
            }
        );
        assert_eq!(transport.inner().sent(), vec![payload]);
    }

    #[test]
    fn test_incoming_non_json_is_still_reported() {
        let (transport, events) = setup();
        transport.inner().emit_message("not json");

        assert_eq!(
            events.lock().last().map(|e| e.kind.clone()),
            Some(TelemetryKind::Incoming {
                text: "not json".into(),
                signal: None,
                request_id: None,
            })
        );
    }

    #[test]
    fn test_events_forwarded_unchanged() {
        let (transport, _events) = setup();
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        let _ = transport.on_message(Box::new(move |text| sink.lock().push(text.to_owned())));

        transport.inner().emit_message(r#"{"signal":"tick.start"}"#);
        assert_eq!(*frames.lock(), vec![r#"{"signal":"tick.start"}"#.to_owned()]);
        assert_eq!(transport.ready_state(), ReadyState::Idle);
    }
}
