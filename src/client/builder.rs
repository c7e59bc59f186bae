//! Builder pattern for client configuration.
//!
//! Provides a fluent API for configuring and creating [`Client`] instances.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use simlink::Client;
//!
//! # fn example() -> simlink::Result<()> {
//! let client = Client::builder()
//!     .url("ws://127.0.0.1:8000/ws")
//!     .request_timeout(Duration::from_secs(2))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::MatchPolicy;
use crate::telemetry::{self, TelemetryBus};
use crate::transport::{InstrumentedTransport, Transport, WebSocketTransport};

use super::core::Client;
use super::options::ClientConfig;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`] instance.
///
/// Use [`Client::builder()`] to create a new builder.
#[derive(Default, Clone)]
pub struct ClientBuilder {
    /// Server URL for the default WebSocket transport.
    url: Option<String>,
    /// Explicit transport; takes precedence over `url`.
    transport: Option<Arc<dyn Transport>>,
    config: ClientConfig,
    /// Bus to instrument the transport with.
    telemetry: Option<TelemetryBus>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("url", &self.url)
            .field("transport", &self.transport.as_ref().map(|_| "dyn Transport"))
            .field("config", &self.config)
            .field("telemetry", &self.telemetry.is_some())
            .finish()
    }
}

// ============================================================================
// ClientBuilder Implementation
// ============================================================================

impl ClientBuilder {
    /// Creates a new builder with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server URL (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Uses `transport` instead of opening a WebSocket.
    #[inline]
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Replaces every client setting at once.
    #[inline]
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the default reply timeout.
    #[inline]
    #[must_use]
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the pending request limit.
    #[inline]
    #[must_use]
    pub fn max_pending(mut self, max_pending: usize) -> Self {
        self.config.max_pending = max_pending;
        self
    }

    /// Sets the reply correlation rule.
    #[inline]
    #[must_use]
    pub fn match_policy(mut self, policy: MatchPolicy) -> Self {
        self.config.match_policy = policy;
        self
    }

    /// Sets the WebSocket handshake timeout.
    #[inline]
    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Publishes transport and client traffic on `bus`.
    ///
    /// Pass [`telemetry::global()`] to use the process-wide bus.
    #[inline]
    #[must_use]
    pub fn telemetry(mut self, bus: TelemetryBus) -> Self {
        self.telemetry = Some(bus);
        self
    }

    /// Builds the client. Does not connect.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the settings are invalid
    /// - [`Error::Config`] if neither a transport nor a URL is set
    /// - [`Error::Config`] if the URL is not `ws://` or `wss://`
    pub fn build(self) -> Result<Client> {
        self.config.validate()?;
        let transport = self.resolve_transport()?;

        let Some(bus) = self.telemetry else {
            return Ok(Client::new(transport, self.config));
        };

        debug!("Instrumenting transport");
        let transport: Arc<dyn Transport> =
            Arc::new(InstrumentedTransport::with_bus(transport, bus.clone()));
        let client = Client::new(transport, self.config);
        // Stays registered for the lifetime of the client.
        let _ = telemetry::wire(&client, &bus);
        Ok(client)
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientBuilder {
    /// Picks the explicit transport or creates a WebSocket one.
    fn resolve_transport(&self) -> Result<Arc<dyn Transport>> {
        if let Some(transport) = &self.transport {
            return Ok(Arc::clone(transport));
        }

        let url = self.url.as_deref().ok_or_else(|| {
            Error::config(
                "A server URL or transport is required. Use .url() to set it.\n\
                 Example: Client::builder().url(\"ws://127.0.0.1:8000/ws\")",
            )
        })?;

        let transport =
            WebSocketTransport::new(url)?.with_connect_timeout(self.config.connect_timeout);
        Ok(Arc::new(transport))
    }
}

// ============================================================================
// Tests
// ============================================================================
