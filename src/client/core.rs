//! Client core.
//!
//! [`Client`] owns the connection state machine, the pending request table
//! and the signal subscriptions. It talks to the server only through a
//! [`Transport`].
//!
//! # State Machine
//!
//! `Disconnected → Connecting → Connected → Disconnected`
//!
//! # Inbound Flow
//!
//! 1. Parse the text frame and decode it as a signal
//! 2. On failure: log, notify protocol error subscribers, drop the frame
//! 3. Settle the earliest-registered pending request that matches (at most one)
//! 4. Notify subscribers of that signal name, then catch-all subscribers

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::listeners::{Listeners, Subscription};
use crate::protocol::{
    Action, SignalEnvelope, SignalName, decode_signal_str, encode_action, matcher_for,
};
use crate::transport::{CloseInfo, ReadyState, Transport};

use super::builder::ClientBuilder;
use super::options::{ClientConfig, SendOptions};
use super::pending::{self, PendingReply, PendingTable};

// ============================================================================
// Types
// ============================================================================

/// Connection state as seen by the client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Not connected; actions are rejected.
    #[default]
    Disconnected,
    /// Waiting for the transport to open.
    Connecting,
    /// Actions may be sent.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// An inbound frame that failed to decode.
#[derive(Debug)]
pub struct DecodeFailure {
    /// Raw frame text.
    pub text: String,
    /// Why it was rejected ([`Error::Json`] or [`Error::Validation`]).
    pub error: Error,
}

// ============================================================================
// Inner
// ============================================================================

struct Inner {
    transport: Arc<dyn Transport>,
    config: ClientConfig,
    state: watch::Sender<ConnectionState>,
    pending: Mutex<PendingTable>,
    named: Mutex<FxHashMap<SignalName, Listeners<SignalEnvelope>>>,
    any: Listeners<SignalEnvelope>,
    protocol_errors: Listeners<DecodeFailure>,
    transport_subscriptions: Mutex<Vec<Subscription>>,
}

impl Inner {
    fn handle_open(&self) {
        let connected = self.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Connected;
                true
            } else {
                false
            }
        });
        if connected {
            info!("Connected");
        }
    }

    fn handle_close(&self, info: &CloseInfo) {
        debug!(code = ?info.code, reason = %info.reason, clean = info.was_clean, "Transport closed");
        self.state.send_replace(ConnectionState::Disconnected);
        self.fail_pending();
    }

    fn handle_error(&self, error: &Error) {
        warn!(error = %error, "Transport error");
        self.state.send_replace(ConnectionState::Disconnected);
        self.fail_pending();
    }

    fn handle_message(&self, text: &str) {
        let envelope = match decode_signal_str(text) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(error = %error, "Dropping undecodable frame");
                self.protocol_errors.emit(&DecodeFailure {
                    text: text.to_owned(),
                    error,
                });
                return;
            }
        };

        let name = envelope.name();
        trace!(signal = %name, request_id = ?envelope.request_id, "Signal received");

        let settled = pending::take_match(&self.pending, &envelope);
        if let Some((request_id, entry)) = settled {
            debug!(%request_id, action = %entry.action(), signal = %name, "Request settled");
            entry.settle(Ok(envelope.clone()));
        }

        let named = self.named.lock().get(&name).cloned();
        if let Some(listeners) = named {
            listeners.emit(&envelope);
        }
        self.any.emit(&envelope);
    }

    fn expire(&self, request_id: &RequestId, timeout: Duration) {
        let Some(entry) = self.pending.lock().remove(request_id) else {
            return;
        };
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        warn!(%request_id, action = %entry.action(), timeout_ms, "Request timed out");
        entry.settle(Err(Error::request_timeout(request_id.clone(), timeout_ms)));
    }

    /// Rejects every pending request with [`Error::Disconnected`].
    fn fail_pending(&self) {
        let pending = self.pending.lock().drain();
        let count = pending.len();

        for (_, entry) in pending {
            entry.settle(Err(Error::Disconnected));
        }

        if count > 0 {
            debug!(count, "Failed pending requests on disconnect");
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        for subscription in self.transport_subscriptions.get_mut().drain(..) {
            subscription.unsubscribe();
        }
        for (_, entry) in self.pending.get_mut().drain() {
            entry.settle(Err(Error::Disconnected));
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Protocol client for the simulation server.
///
/// Cheap to clone; clones share the connection, pending table and
/// subscriptions.
///
/// # Example
///
/// ```ignore
/// let client = Client::builder().url("ws://127.0.0.1:8000/ws").build()?;
/// client.connect()?;
/// client.wait_connected(Duration::from_secs(5)).await?;
///
/// let reply = client.send_action(Action::start(60, 1.0))?.await?;
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Construction
// ============================================================================

impl Client {
    /// Returns a builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Creates a client on top of `transport`.
    ///
    /// Transport events are observed from construction on; the connection
    /// is only opened by [`connect`](Self::connect).
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, config: ClientConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let subscriptions = vec![
                {
                    let weak = weak.clone();
                    transport.on_open(Box::new(move || {
                        if let Some(inner) = weak.upgrade() {
                            inner.handle_open();
                        }
                    }))
                },
                {
                    let weak = weak.clone();
                    transport.on_close(Box::new(move |info| {
                        if let Some(inner) = weak.upgrade() {
                            inner.handle_close(info);
                        }
                    }))
                },
                {
                    let weak = weak.clone();
                    transport.on_error(Box::new(move |error| {
                        if let Some(inner) = weak.upgrade() {
                            inner.handle_error(error);
                        }
                    }))
                },
                {
                    let weak = weak.clone();
                    transport.on_message(Box::new(move |text| {
                        if let Some(inner) = weak.upgrade() {
                            inner.handle_message(text);
                        }
                    }))
                },
            ];

            Inner {
                transport: Arc::clone(&transport),
                config,
                state,
                pending: Mutex::new(PendingTable::default()),
                named: Mutex::new(FxHashMap::default()),
                any: Listeners::new("client.any"),
                protocol_errors: Listeners::new("client.protocol_error"),
                transport_subscriptions: Mutex::new(subscriptions),
            }
        });

        Self { inner }
    }
}

// ============================================================================
// Client - Connection
// ============================================================================

impl Client {
    /// Starts connecting. Does nothing unless disconnected.
    ///
    /// # Errors
    ///
    /// Returns the transport's error if the attempt cannot start; the state
    /// falls back to `Disconnected`.
    pub fn connect(&self) -> Result<()> {
        let started = self.inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !started {
            return Ok(());
        }

        if self.inner.transport.ready_state() == ReadyState::Open {
            self.inner.handle_open();
            return Ok(());
        }

        debug!("Connecting");
        if let Err(e) = self.inner.transport.connect() {
            warn!(error = %e, "Connect failed to start");
            self.inner.state.send_replace(ConnectionState::Disconnected);
            return Err(e);
        }
        Ok(())
    }

    /// Waits until the client is connected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionTimeout`] if `timeout` elapses first.
    pub async fn wait_connected(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.inner.state.subscribe();
        let waited = tokio::time::timeout(
            timeout,
            rx.wait_for(|state| *state == ConnectionState::Connected),
        )
        .await;

        match waited {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(_)) => Err(Error::Disconnected),
            Err(_) => Err(Error::connection_timeout(
                u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            )),
        }
    }

    /// Disconnects and rejects every pending request with
    /// [`Error::Disconnected`] before returning.
    pub fn disconnect(&self, code: Option<u16>, reason: Option<&str>) {
        let previous = self.inner.state.send_replace(ConnectionState::Disconnected);
        self.inner.fail_pending();

        if previous != ConnectionState::Disconnected {
            info!(?code, "Disconnecting");
            self.inner.transport.disconnect(code, reason);
        }
    }

    /// Returns the connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Returns `true` if actions may be sent.
    #[inline]
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Returns the number of requests awaiting a reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Returns the client settings.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Returns the underlying transport.
    #[inline]
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.inner.transport
    }
}

// ============================================================================
// Client - Actions
// ============================================================================

impl Client {
    /// Sends `action` with a fresh request id and the default timeout.
    ///
    /// # Errors
    ///
    /// See [`send_action_with`](Self::send_action_with).
    pub fn send_action(&self, action: Action) -> Result<PendingReply> {
        self.send_action_with(action, SendOptions::default())
    }

    /// Sends `action` with per-request overrides.
    ///
    /// Must be called within a tokio runtime (the reply timer is a task).
    ///
    /// # Errors
    ///
    /// - [`Error::NotConnected`] unless connected
    /// - [`Error::Validation`] if the params violate their schema
    /// - [`Error::TooManyPending`] at the pending limit
    /// - [`Error::Config`] if the request id is already pending
    /// - the transport's error if the frame cannot be sent
    pub fn send_action_with(&self, action: Action, options: SendOptions) -> Result<PendingReply> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::transport(format!("no tokio runtime: {e}")))?;

        let request_id = options.request_id.unwrap_or_else(RequestId::generate);
        let envelope = encode_action(action, Some(request_id.clone()))?;
        let text = envelope.to_json()?;
        let name = envelope.name();
        let matcher = options
            .matcher
            .unwrap_or_else(|| matcher_for(&envelope, self.inner.config.match_policy));
        let timeout = options.timeout.unwrap_or(self.inner.config.request_timeout);

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending.lock();
            let max = self.inner.config.max_pending;
            if pending.len() >= max {
                warn!(pending = pending.len(), max, "Too many pending requests");
                return Err(Error::too_many_pending(pending.len(), max));
            }
            if pending.contains(&request_id) {
                return Err(Error::config(format!(
                    "request id {request_id} is already pending"
                )));
            }
            pending.insert(request_id.clone(), name, matcher, tx);
        }

        let weak = Arc::downgrade(&self.inner);
        let timer_id = request_id.clone();
        let timer = runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(&timer_id, timeout);
            }
        });
        if !self
            .inner
            .pending
            .lock()
            .set_timer(&request_id, timer.abort_handle())
        {
            timer.abort();
        }

        if let Err(e) = self.inner.transport.send(&text) {
            warn!(%request_id, action = %name, error = %e, "Failed to send action");
            if let Some(entry) = self.inner.pending.lock().remove(&request_id) {
                // Dropping the receiver below discards this delivery.
                entry.settle(Err(Error::Disconnected));
            }
            return Err(e);
        }

        debug!(%request_id, action = %name, "Action sent");
        Ok(PendingReply::new(request_id, rx))
    }
}

// ============================================================================
// Client - Subscriptions
// ============================================================================

impl Client {
    /// Subscribes to one signal name.
    pub fn on<F>(&self, name: SignalName, handler: F) -> Subscription
    where
        F: Fn(&SignalEnvelope) + Send + Sync + 'static,
    {
        let listeners = self
            .inner
            .named
            .lock()
            .entry(name)
            .or_insert_with(|| Listeners::new(name.as_str()))
            .clone();
        listeners.add(handler)
    }

    /// Subscribes to every decoded signal, after name subscribers.
    pub fn on_any<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SignalEnvelope) + Send + Sync + 'static,
    {
        self.inner.any.add(handler)
    }

    /// Subscribes to frames that failed to decode.
    pub fn on_protocol_error<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&DecodeFailure) + Send + Sync + 'static,
    {
        self.inner.protocol_errors.add(handler)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::{Value, json};

    use crate::protocol::{
        ActionName, AgentSnapshot, Matcher, MatchPolicy, Signal, SimulationParams,
        expected_signal_for,
    };
    use crate::transport::ManualTransport;

    fn setup_with(config: ClientConfig) -> (Client, Arc<ManualTransport>) {
        let transport = Arc::new(ManualTransport::new());
        let client = Client::new(transport.clone(), config);
        client.connect().expect("connect");
        transport.emit_open();
        (client, transport)
    }

    fn setup() -> (Client, Arc<ManualTransport>) {
        setup_with(ClientConfig::default())
    }

    fn last_sent(transport: &ManualTransport) -> Value {
        serde_json::from_str(&transport.last_sent().expect("frame")).expect("json")
    }

    fn reply(signal: &str, data: Value, request_id: &Value) -> String {
        json!({ "signal": signal, "data": data, "request_id": request_id }).to_string()
    }

    fn truck_created() -> String {
        json!({
            "signal": "agent.created",
            "data": {
                "id": "a1", "kind": "truck", "inbox_count": 0, "outbox_count": 0, "tags": {},
                "max_speed_kph": 10, "current_speed_kph": 0, "current_node": null,
                "current_edge": null, "edge_progress_m": 0, "route": [], "destination": null,
                "route_start_node": null, "route_end_node": null, "current_building_id": null
            }
        })
        .to_string()
    }

    fn record<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, Arc<Mutex<Vec<T>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (Arc::clone(&seen), seen)
    }

    #[tokio::test]
    async fn test_connect_lifecycle() {
        let transport = Arc::new(ManualTransport::new());
        let client = Client::new(transport.clone(), ClientConfig::default());
        assert_eq!(client.state(), ConnectionState::Disconnected);

        client.connect().expect("connect");
        assert_eq!(client.state(), ConnectionState::Connecting);
        assert_eq!(transport.ready_state(), ReadyState::Connecting);

        // Idempotent while connecting.
        client.connect().expect("connect");
        assert_eq!(client.state(), ConnectionState::Connecting);

        transport.emit_open();
        assert_eq!(client.state(), ConnectionState::Connected);
        client
            .wait_connected(Duration::from_millis(10))
            .await
            .expect("connected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_connected_times_out() {
        let transport = Arc::new(ManualTransport::new());
        let client = Client::new(transport, ClientConfig::default());
        client.connect().expect("connect");

        let err = client
            .wait_connected(Duration::from_millis(100))
            .await
            .expect_err("never opened");
        assert!(matches!(err, Error::ConnectionTimeout { timeout_ms: 100 }));
    }

    #[tokio::test]
    async fn test_send_before_connect_fails_fast() {
        let transport = Arc::new(ManualTransport::new());
        let client = Client::new(transport.clone(), ClientConfig::default());

        let err = client.send_action(Action::pause()).expect_err("not connected");
        assert!(matches!(err, Error::NotConnected));
        assert_eq!(client.pending_count(), 0);
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_simulation_start_scenario() {
        let (client, transport) = setup();

        let pending = client.send_action(Action::start(60, 1.0)).expect("sent");
        assert_eq!(transport.sent().len(), 1);
        let sent = last_sent(&transport);
        assert_eq!(sent["action"], "simulation.start");
        assert_eq!(sent["params"], json!({ "tick_rate": 60, "speed": 1.0 }));
        assert_eq!(sent["request_id"], pending.request_id().as_str());
        assert_eq!(client.pending_count(), 1);

        transport.emit_message(&reply(
            "simulation.started",
            json!({ "tick_rate": 60, "speed": 1.0 }),
            &sent["request_id"],
        ));

        let envelope = pending.await.expect("reply");
        assert_eq!(envelope.name(), SignalName::SimulationStarted);
        assert_eq!(
            envelope.signal,
            Signal::SimulationStarted(SimulationParams {
                tick_rate: 60,
                speed: 1.0
            })
        );
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_error_reply_settles_request() {
        let (client, transport) = setup();

        let pending = client.send_action(Action::start(60, 1.0)).expect("sent");
        let sent = last_sent(&transport);
        transport.emit_message(&reply(
            "error",
            json!({ "code": "FAIL", "message": "Something wrong" }),
            &sent["request_id"],
        ));

        let err = pending.checked().await.expect_err("server error");
        assert!(matches!(err, Error::Server { ref code, ref message } if code == "FAIL" && message == "Something wrong"));
    }

    #[tokio::test]
    async fn test_disconnect_rejects_pending() {
        let (client, transport) = setup();

        let first = client.send_action(Action::start(60, 1.0)).expect("sent");
        let second = client.send_action(Action::list_agents()).expect("sent");
        assert_eq!(client.pending_count(), 2);

        client.disconnect(None, None);
        assert_eq!(client.pending_count(), 0);
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(transport.ready_state(), ReadyState::Closed);

        assert!(matches!(first.await, Err(Error::Disconnected)));
        assert!(matches!(second.await, Err(Error::Disconnected)));

        let err = client.send_action(Action::pause()).expect_err("disconnected");
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_transport_close_rejects_pending() {
        let (client, transport) = setup();
        let pending = client.send_action(Action::pause()).expect("sent");

        transport.emit_close(&CloseInfo::abnormal("reset"));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(matches!(pending.await, Err(Error::Disconnected)));
    }

    #[tokio::test]
    async fn test_transport_error_rejects_pending() {
        let (client, transport) = setup();
        let pending = client.send_action(Action::pause()).expect("sent");

        transport.emit_error(&Error::transport("socket reset"));
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(matches!(pending.await, Err(Error::Disconnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_isolation() {
        let (client, transport) = setup();

        let short = client
            .send_action_with(
                Action::pause(),
                SendOptions::new().with_timeout(Duration::from_millis(100)),
            )
            .expect("sent");
        let long = client.send_action(Action::list_agents()).expect("sent");
        let long_id = long.request_id().clone();

        let err = short.await.expect_err("timed out");
        assert!(matches!(err, Error::RequestTimeout { timeout_ms: 100, .. }));
        assert!(err.is_timeout());
        assert_eq!(client.pending_count(), 1);

        transport.emit_message(&reply(
            "agent.listed",
            json!({ "total": 0, "agents": [], "tick": 3 }),
            &json!(long_id.as_str()),
        ));
        let envelope = long.await.expect("reply");
        assert_eq!(envelope.name(), SignalName::AgentListed);
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_at_deadline_settles_once() {
        let (client, transport) = setup();
        let (late, seen) = record::<SignalName>();
        let _late = client.on_any(move |signal| late.lock().push(signal.name()));

        let racing = client
            .send_action_with(
                Action::pause(),
                SendOptions::new().with_timeout(Duration::from_millis(100)),
            )
            .expect("sent");
        let sent = last_sent(&transport);

        // Both the timer and the disconnect are due in this tick.
        tokio::time::advance(Duration::from_millis(100)).await;
        client.disconnect(None, None);
        assert_eq!(client.pending_count(), 0);

        let err = racing.await.expect_err("rejected");
        assert!(matches!(
            err,
            Error::Disconnected | Error::RequestTimeout { timeout_ms: 100, .. }
        ));

        // A late timer or reply finds nothing left to settle.
        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        transport.emit_message(&reply("simulation.paused", json!({}), &sent["request_id"]));
        assert_eq!(client.pending_count(), 0);
        assert_eq!(*seen.lock(), vec![SignalName::SimulationPaused]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_timeout_is_five_seconds() {
        let (client, _transport) = setup();
        let started = tokio::time::Instant::now();

        let err = client
            .send_action(Action::pause())
            .expect("sent")
            .await
            .expect_err("timed out");
        assert!(matches!(err, Error::RequestTimeout { timeout_ms: 5000, .. }));
        assert!(started.elapsed() >= Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn test_at_most_one_resolution() {
        let (client, transport) = setup_with(
            ClientConfig::default().with_match_policy(MatchPolicy::Lenient),
        );

        let first = client.send_action(Action::pause()).expect("sent");
        let second = client.send_action(Action::pause()).expect("sent");

        // No request id: both match by name; only the earliest settles.
        transport.emit_message(r#"{"signal":"simulation.paused","data":{}}"#);
        assert_eq!(client.pending_count(), 1);
        first.await.expect("first settled");

        transport.emit_message(r#"{"signal":"simulation.paused","data":{}}"#);
        second.await.expect("second settled");
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_strict_policy_ignores_uncorrelated_reply() {
        let (client, transport) = setup();
        let _pending = client.send_action(Action::pause()).expect("sent");

        transport.emit_message(r#"{"signal":"simulation.paused","data":{}}"#);
        transport.emit_message(
            r#"{"signal":"simulation.paused","data":{},"request_id":"someone-else"}"#,
        );
        assert_eq!(client.pending_count(), 1);
    }

    #[tokio::test]
    async fn test_custom_request_id_and_matcher() {
        let (client, transport) = setup();

        let pending = client
            .send_action_with(
                Action::describe_agent("t1"),
                SendOptions::new()
                    .with_request_id("mine")
                    .with_matcher(Matcher::new(|signal| {
                        signal.name() == expected_signal_for(ActionName::AgentDescribe)
                    })),
            )
            .expect("sent");
        assert_eq!(last_sent(&transport)["request_id"], "mine");

        let duplicate = client.send_action_with(
            Action::describe_agent("t2"),
            SendOptions::new().with_request_id("mine"),
        );
        assert!(matches!(duplicate, Err(Error::Config { .. })));

        let mut data: Value = serde_json::from_str(&truck_created()).expect("json");
        data["signal"] = json!("agent.described");
        transport.emit_message(&data.to_string());

        let envelope = pending.await.expect("custom matcher ignores id");
        assert!(matches!(envelope.signal, Signal::AgentDescribed(AgentSnapshot::Truck(_))));
    }

    #[tokio::test]
    async fn test_pending_limit() {
        let (client, transport) = setup_with(ClientConfig::default().with_max_pending(2));

        let _a = client.send_action(Action::pause()).expect("sent");
        let _b = client.send_action(Action::pause()).expect("sent");
        let err = client.send_action(Action::pause()).expect_err("full");

        assert!(matches!(err, Error::TooManyPending { pending: 2, max: 2 }));
        assert_eq!(transport.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_params_are_not_sent() {
        let (client, transport) = setup();

        let err = client.send_action(Action::start(0, 1.0)).expect_err("tick_rate < 1");
        assert!(matches!(err, Error::Validation(_)));
        assert!(transport.sent().is_empty());
        assert_eq!(client.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_named_handlers_run_in_order() {
        let (client, transport) = setup();
        let (sink, seen) = record::<&'static str>();

        let first = Arc::clone(&sink);
        let _a = client.on(SignalName::AgentCreated, move |_| first.lock().push("first"));
        let second = Arc::clone(&sink);
        let _b = client.on(SignalName::AgentCreated, move |_| second.lock().push("second"));
        let any = Arc::clone(&sink);
        let _c = client.on_any(move |_| any.lock().push("any"));
        let other = Arc::clone(&sink);
        let _d = client.on(SignalName::AgentDeleted, move |_| other.lock().push("other"));

        transport.emit_message(&truck_created());
        assert_eq!(*seen.lock(), vec!["first", "second", "any"]);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let (client, transport) = setup();
        let (sink, seen) = record::<SignalName>();

        let _a = client.on_any(|_| panic!("handler bug"));
        let _b = client.on_any(move |signal| sink.lock().push(signal.name()));

        transport.emit_message(r#"{"signal":"simulation.paused","data":{}}"#);
        assert_eq!(*seen.lock(), vec![SignalName::SimulationPaused]);
    }

    #[tokio::test]
    async fn test_unsubscribed_handler_is_not_called() {
        let (client, transport) = setup();
        let (sink, seen) = record::<SignalName>();

        let subscription = client.on_any(move |signal| sink.lock().push(signal.name()));
        subscription.unsubscribe();

        transport.emit_message(r#"{"signal":"simulation.paused","data":{}}"#);
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_frames_are_dropped_and_reported() {
        let (client, transport) = setup();
        let (sink, failures) = record::<String>();
        let _errors = client.on_protocol_error(move |failure| sink.lock().push(failure.text.clone()));
        let (any_sink, signals) = record::<SignalName>();
        let _any = client.on_any(move |signal| any_sink.lock().push(signal.name()));
        let pending = client.send_action(Action::pause()).expect("sent");
        let request_id = pending.request_id().clone();

        transport.emit_message("not json");
        transport.emit_message(r#"{"signal":"totally.unknown","data":{}}"#);
        transport.emit_message(r#"{"signal":"simulation.started","data":{"wrong_field":123}}"#);

        assert_eq!(failures.lock().len(), 3);
        assert!(signals.lock().is_empty());
        assert_eq!(client.pending_count(), 1);

        // Still healthy afterwards.
        transport.emit_message(&reply("simulation.paused", json!({}), &json!(request_id.as_str())));
        pending.await.expect("reply");
        assert_eq!(*signals.lock(), vec![SignalName::SimulationPaused]);
    }

    #[tokio::test]
    async fn test_protocol_error_carries_cause() {
        let (client, transport) = setup();
        let (sink, causes) = record::<bool>();
        let _errors = client.on_protocol_error(move |failure| {
            sink.lock().push(matches!(failure.error, Error::Validation(_)));
        });

        transport.emit_message("{]");
        transport.emit_message(r#"{"signal":"tick.start","data":{"tick":-1,"time":0,"day":0}}"#);
        assert_eq!(*causes.lock(), vec![false, true]);
    }

    #[tokio::test]
    async fn test_dropping_client_releases_transport_handlers() {
        let transport = Arc::new(ManualTransport::new());
        let client = Client::new(transport.clone(), ClientConfig::default());
        assert_eq!(Arc::strong_count(&transport), 2);

        drop(client);
        assert_eq!(Arc::strong_count(&transport), 1);
        transport.emit_message(r#"{"signal":"simulation.paused","data":{}}"#);
    }

    #[tokio::test]
    async fn test_connect_on_open_transport() {
        let transport = Arc::new(ManualTransport::new());
        transport.emit_open();

        let client = Client::new(transport.clone(), ClientConfig::default());
        client.connect().expect("connect");
        assert!(client.is_connected());
    }
}
