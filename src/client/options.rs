//! Client and per-request configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use simlink::{ClientConfig, MatchPolicy};
//!
//! let config = ClientConfig::new()
//!     .with_request_timeout(Duration::from_secs(2))
//!     .with_max_pending(32)
//!     .with_match_policy(MatchPolicy::Lenient);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{MatchPolicy, Matcher};

// ============================================================================
// Constants
// ============================================================================

/// Default time to wait for a reply.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

/// Default limit on requests awaiting a reply.
pub const DEFAULT_MAX_PENDING: usize = 100;

/// Default WebSocket handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// ClientConfig
// ============================================================================

/// Client-wide settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    /// Time to wait for a reply before failing with `RequestTimeout`.
    pub request_timeout: Duration,

    /// Requests allowed to await a reply at once.
    pub max_pending: usize,

    /// Reply correlation rule for the default matcher.
    pub match_policy: MatchPolicy,

    /// Handshake timeout for transports the builder creates.
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ClientConfig {
    /// Creates a config with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_pending: DEFAULT_MAX_PENDING,
            match_policy: MatchPolicy::Strict,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ClientConfig {
    /// Sets the reply timeout.
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the pending request limit.
    #[inline]
    #[must_use]
    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    /// Sets the reply correlation rule.
    #[inline]
    #[must_use]
    pub fn with_match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = policy;
        self
    }

    /// Sets the handshake timeout.
    #[inline]
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

// ============================================================================
// Validation
// ============================================================================

impl ClientConfig {
    /// Checks that every limit is usable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero timeout or a zero pending limit.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout.is_zero() {
            return Err(Error::config("request timeout must be greater than zero"));
        }
        if self.connect_timeout.is_zero() {
            return Err(Error::config("connect timeout must be greater than zero"));
        }
        if self.max_pending == 0 {
            return Err(Error::config("max pending must be at least 1"));
        }
        Ok(())
    }
}

// ============================================================================
// SendOptions
// ============================================================================

/// Per-request overrides for [`Client::send_action_with`](super::Client::send_action_with).
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    /// Request id to stamp; a fresh UUID when unset.
    pub request_id: Option<RequestId>,

    /// Reply timeout; the client default when unset.
    pub timeout: Option<Duration>,

    /// Reply predicate; the default matcher for the action when unset.
    pub matcher: Option<Matcher>,
}

impl SendOptions {
    /// Creates empty overrides.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `request_id` instead of a generated one.
    #[inline]
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<RequestId>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Overrides the reply timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overrides the reply predicate.
    #[inline]
    #[must_use]
    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matcher = Some(matcher);
        self
    }
}

// ============================================================================
// Tests
// ============================================================================
