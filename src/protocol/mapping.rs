//! Action → reply signal mapping and reply matchers.
//!
//! | Action | Reply |
//! |--------|-------|
//! | `simulation.start` | `simulation.started` |
//! | `simulation.stop` | `simulation.stopped` |
//! | `simulation.resume` | `simulation.resumed` |
//! | `simulation.pause` | `simulation.paused` |
//! | `simulation.update` | `simulation.updated` |
//! | `map.create` | `map.created` |
//! | `map.export` / `map.import` | `map.exported` / `map.imported` |
//! | `agent.create` | `agent.created` |
//! | `agent.update` | `agent.updated` |
//! | `agent.delete` | `agent.deleted` |
//! | `agent.list` | `agent.listed` |
//! | `agent.describe` | `agent.described` |
//! | `simulation.export_state` | `simulation.state_exported` |
//! | `simulation.import_state` | `simulation.state_imported` |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use super::action::{ActionEnvelope, ActionName};
use super::signal::{SignalEnvelope, SignalName};

// ============================================================================
// Expected Reply
// ============================================================================

/// Returns the signal that acknowledges `action`.
#[must_use]
pub const fn expected_signal_for(action: ActionName) -> SignalName {
    match action {
        ActionName::SimulationStart => SignalName::SimulationStarted,
        ActionName::SimulationStop => SignalName::SimulationStopped,
        ActionName::SimulationResume => SignalName::SimulationResumed,
        ActionName::SimulationPause => SignalName::SimulationPaused,
        ActionName::SimulationUpdate => SignalName::SimulationUpdated,
        ActionName::MapCreate => SignalName::MapCreated,
        ActionName::AgentCreate => SignalName::AgentCreated,
        ActionName::AgentUpdate => SignalName::AgentUpdated,
        ActionName::AgentDelete => SignalName::AgentDeleted,
        ActionName::AgentList => SignalName::AgentListed,
        ActionName::AgentDescribe => SignalName::AgentDescribed,
        ActionName::MapExport => SignalName::MapExported,
        ActionName::MapImport => SignalName::MapImported,
        ActionName::SimulationExportState => SignalName::SimulationStateExported,
        ActionName::SimulationImportState => SignalName::SimulationStateImported,
    }
}

// ============================================================================
// MatchPolicy
// ============================================================================

/// How strictly a reply must correlate with its action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchPolicy {
    /// If the action carried a request id, the reply must echo it.
    #[default]
    Strict,
    /// A reply without any request id may match by name alone.
    Lenient,
}

// ============================================================================
// Matcher
// ============================================================================

/// Predicate deciding whether a signal settles a pending request.
#[derive(Clone)]
pub struct Matcher {
    predicate: Arc<dyn Fn(&SignalEnvelope) -> bool + Send + Sync>,
}

impl Matcher {
    /// Wraps a custom predicate.
    ///
    /// The predicate runs on the transport's event thread with no client
    /// lock held.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&SignalEnvelope) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Evaluates the predicate.
    #[inline]
    #[must_use]
    pub fn matches(&self, signal: &SignalEnvelope) -> bool {
        (self.predicate)(signal)
    }
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher").finish_non_exhaustive()
    }
}

/// Builds the default reply matcher for `envelope`.
///
/// An `error` signal echoing the action's request id also matches, so a
/// rejected action settles instead of timing out.
#[must_use]
pub fn matcher_for(envelope: &ActionEnvelope, policy: MatchPolicy) -> Matcher {
    let expected = expected_signal_for(envelope.name());
    let request_id = envelope.request_id.clone();

    Matcher::new(move |signal| {
        let correlated = match (&request_id, &signal.request_id) {
            (None, _) => true,
            (Some(sent), Some(received)) => sent == received,
            (Some(_), None) => policy == MatchPolicy::Lenient,
        };

        if signal.name() == expected {
            return correlated;
        }

        signal.is_error()
            && matches!((&request_id, &signal.request_id), (Some(a), Some(b)) if a == b)
    })
}

// ============================================================================
// Tests
// ============================================================================
