//! WebSocket transport and event loop.
//!
//! [`WebSocketTransport::connect`] spawns a tokio task that dials the
//! server and then handles:
//!
//! - Incoming text frames (forwarded to message listeners)
//! - Outgoing frames queued by [`Transport::send`]
//! - Close requests and remote close / stream end
//!
//! Binary, ping and pong frames are ignored.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::error::{Error, Result};

use super::{CloseInfo, ReadyState, Transport, TransportEvents};

// ============================================================================
// Constants
// ============================================================================

/// Default timeout for the TCP + WebSocket handshake.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Close code sent when no code is given.
const NORMAL_CLOSURE: u16 = 1000;

// ============================================================================
// Types
// ============================================================================

/// Internal commands for the event loop.
enum TransportCommand {
    /// Write a text frame.
    Send(String),
    /// Send a close frame and stop.
    Close { code: Option<u16>, reason: String },
}

/// The current connection attempt.
///
/// `generation` increases on every [`Transport::connect`]; an event loop
/// only touches the link while its own generation is current.
#[derive(Default)]
struct Link {
    state: ReadyState,
    generation: u64,
    command_tx: Option<mpsc::UnboundedSender<TransportCommand>>,
}

/// State shared with the event loop tasks.
#[derive(Default)]
struct Shared {
    link: Mutex<Link>,
    events: TransportEvents,
}

impl Shared {
    fn is_current(&self, generation: u64) -> bool {
        self.link.lock().generation == generation
    }
}

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Client-side WebSocket transport built on tokio-tungstenite.
///
/// # Thread Safety
///
/// `WebSocketTransport` is `Send + Sync`. Events are emitted from the event
/// loop task.
pub struct WebSocketTransport {
    url: Url,
    connect_timeout: Duration,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for WebSocketTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketTransport")
            .field("url", &self.url.as_str())
            .field("state", &self.shared.link.lock().state)
            .finish_non_exhaustive()
    }
}

impl WebSocketTransport {
    /// Creates a transport for a `ws://` or `wss://` URL.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the URL does not parse or uses another
    /// scheme.
    pub fn new(url: &str) -> Result<Self> {
        Ok(Self {
            url: parse_ws_url(url)?,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            shared: Arc::new(Shared::default()),
        })
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    /// Returns the server URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Dials the server, then runs the I/O loop until either side closes.
    async fn run_event_loop(
        url: Url,
        connect_timeout: Duration,
        shared: Arc<Shared>,
        generation: u64,
        mut command_rx: mpsc::UnboundedReceiver<TransportCommand>,
    ) {
        let connected = timeout(connect_timeout, connect_async(url.as_str())).await;

        let ws_stream = match connected {
            Ok(Ok((ws_stream, _response))) => ws_stream,
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, "WebSocket connect failed");
                Self::finish(
                    &shared,
                    generation,
                    Some(Error::WebSocket(e)),
                    CloseInfo::abnormal("connect failed"),
                );
                return;
            }
            Err(_) => {
                let timeout_ms = u64::try_from(connect_timeout.as_millis()).unwrap_or(u64::MAX);
                warn!(url = %url, timeout_ms, "WebSocket connect timed out");
                Self::finish(
                    &shared,
                    generation,
                    Some(Error::connection_timeout(timeout_ms)),
                    CloseInfo::abnormal("connect timed out"),
                );
                return;
            }
        };

        let opened = {
            let mut link = shared.link.lock();
            let opened = link.generation == generation && link.state == ReadyState::Connecting;
            if opened {
                link.state = ReadyState::Open;
            }
            opened
        };
        if opened {
            info!(url = %url, "WebSocket connection established");
            shared.events.emit_open();
        }

        let (mut ws_write, mut ws_read) = ws_stream.split();

        let (failure, close_info) = loop {
            tokio::select! {
                // Incoming frames from the server
                message = ws_read.next() => {
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            trace!(len = text.len(), "Frame received");
                            if shared.is_current(generation) {
                                shared.events.emit_message(text.as_str());
                            }
                        }

                        Some(Ok(Message::Close(frame))) => {
                            debug!("WebSocket closed by remote");
                            let info = match frame {
                                Some(frame) => CloseInfo::clean(
                                    Some(u16::from(frame.code)),
                                    frame.reason.as_str(),
                                ),
                                None => CloseInfo::clean(None, ""),
                            };
                            break (None, info);
                        }

                        Some(Err(e)) => {
                            error!(error = %e, "WebSocket error");
                            let reason = e.to_string();
                            break (Some(Error::WebSocket(e)), CloseInfo::abnormal(reason));
                        }

                        None => {
                            debug!("WebSocket stream ended");
                            break (None, CloseInfo::abnormal("stream ended"));
                        }

                        // Ignore Binary, Ping, Pong
                        _ => {}
                    }
                }

                // Commands from the transport handle
                command = command_rx.recv() => {
                    match command {
                        Some(TransportCommand::Send(text)) => {
                            if let Err(e) = ws_write.send(Message::text(text)).await {
                                error!(error = %e, "Failed to send frame");
                                let reason = e.to_string();
                                break (Some(Error::WebSocket(e)), CloseInfo::abnormal(reason));
                            }
                            trace!("Frame sent");
                        }

                        Some(TransportCommand::Close { code, reason }) => {
                            debug!(?code, "Close requested");
                            let frame = CloseFrame {
                                code: CloseCode::from(code.unwrap_or(NORMAL_CLOSURE)),
                                reason: reason.clone().into(),
                            };
                            if let Err(e) = ws_write.send(Message::Close(Some(frame))).await {
                                debug!(error = %e, "Close frame not delivered");
                            }
                            let _ = ws_write.close().await;
                            break (None, CloseInfo::clean(code, reason));
                        }

                        None => {
                            debug!("Command channel closed");
                            let _ = ws_write.close().await;
                            break (None, CloseInfo::clean(None, ""));
                        }
                    }
                }
            }
        };

        Self::finish(&shared, generation, failure, close_info);
        debug!(generation, "Event loop terminated");
    }

    /// Marks the transport closed and reports the outcome.
    ///
    /// A loop superseded by a newer connection ends silently.
    fn finish(shared: &Shared, generation: u64, failure: Option<Error>, close_info: CloseInfo) {
        {
            let mut link = shared.link.lock();
            if link.generation != generation {
                debug!(generation, current = link.generation, "Superseded connection closed");
                return;
            }
            link.state = ReadyState::Closed;
            link.command_tx = None;
        }

        if let Some(failure) = failure {
            shared.events.emit_error(&failure);
        }
        shared.events.emit_close(&close_info);
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::transport(format!("no tokio runtime: {e}")))?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let generation = {
            let mut link = self.shared.link.lock();
            if matches!(link.state, ReadyState::Connecting | ReadyState::Open) {
                return Ok(());
            }
            link.state = ReadyState::Connecting;
            link.generation += 1;
            link.command_tx = Some(command_tx);
            link.generation
        };

        debug!(url = %self.url, generation, "Connecting");
        runtime.spawn(Self::run_event_loop(
            self.url.clone(),
            self.connect_timeout,
            Arc::clone(&self.shared),
            generation,
            command_rx,
        ));

        Ok(())
    }

    fn disconnect(&self, code: Option<u16>, reason: Option<&str>) {
        let command_tx = {
            let mut link = self.shared.link.lock();
            let Some(command_tx) = link.command_tx.take() else {
                return;
            };
            if matches!(link.state, ReadyState::Connecting | ReadyState::Open) {
                link.state = ReadyState::Closing;
            }
            command_tx
        };

        let _ = command_tx.send(TransportCommand::Close {
            code,
            reason: reason.unwrap_or_default().to_owned(),
        });
    }

    fn send(&self, text: &str) -> Result<()> {
        let link = self.shared.link.lock();
        if link.state != ReadyState::Open {
            return Err(Error::NotConnected);
        }
        let Some(command_tx) = link.command_tx.as_ref() else {
            return Err(Error::NotConnected);
        };

        command_tx
            .send(TransportCommand::Send(text.to_owned()))
            .map_err(|_| Error::NotConnected)
    }

    fn ready_state(&self) -> ReadyState {
        self.shared.link.lock().state
    }

    fn events(&self) -> &TransportEvents {
        &self.shared.events
    }
}

// ============================================================================
// URL Validation
// ============================================================================

/// Parses `url` and checks that it uses a WebSocket scheme.
pub(crate) fn parse_ws_url(url: &str) -> Result<Url> {
    let parsed = Url::parse(url).map_err(|e| Error::config(format!("invalid URL `{url}`: {e}")))?;

    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        other => Err(Error::config(format!(
            "unsupported scheme `{other}`, expected ws or wss"
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================
