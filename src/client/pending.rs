//! Pending request table and reply future.
//!
//! Each sent action owns one entry until it settles. An entry settles
//! exactly once: by a matching signal, by its timer, or by a disconnect.
//! Whoever removes the entry from the table first wins; the others find
//! nothing to do.

// ============================================================================
// Imports
// ============================================================================

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tokio::task::AbortHandle;

use crate::error::{Error, Result};
use crate::identifiers::RequestId;
use crate::protocol::{ActionName, Matcher, SignalEnvelope};

// ============================================================================
// Types
// ============================================================================

/// Sender half of a reply channel.
pub(crate) type Responder = oneshot::Sender<Result<SignalEnvelope>>;

// ============================================================================
// PendingRequest
// ============================================================================

/// One action awaiting its reply.
pub(crate) struct PendingRequest {
    /// Registration order; the lowest matching `seq` wins.
    seq: u64,
    action: ActionName,
    matcher: Matcher,
    responder: Responder,
    timer: Option<AbortHandle>,
}

impl PendingRequest {
    /// Returns the action this entry waits on.
    #[inline]
    pub(crate) fn action(&self) -> ActionName {
        self.action
    }

    /// Cancels the timer and delivers `result`.
    pub(crate) fn settle(self, result: Result<SignalEnvelope>) {
        if let Some(timer) = self.timer {
            timer.abort();
        }
        // The caller may have dropped the reply future.
        let _ = self.responder.send(result);
    }
}

// ============================================================================
// PendingTable
// ============================================================================

/// Requests awaiting a reply, keyed by request id.
#[derive(Default)]
pub(crate) struct PendingTable {
    next_seq: u64,
    entries: FxHashMap<RequestId, PendingRequest>,
}

impl PendingTable {
    /// Returns the number of pending requests.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if `request_id` is pending.
    #[inline]
    pub(crate) fn contains(&self, request_id: &RequestId) -> bool {
        self.entries.contains_key(request_id)
    }

    /// Registers a new entry without a timer.
    pub(crate) fn insert(
        &mut self,
        request_id: RequestId,
        action: ActionName,
        matcher: Matcher,
        responder: Responder,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(
            request_id,
            PendingRequest {
                seq,
                action,
                matcher,
                responder,
                timer: None,
            },
        );
    }

    /// Attaches a timer. Returns `false` if the entry already settled.
    pub(crate) fn set_timer(&mut self, request_id: &RequestId, timer: AbortHandle) -> bool {
        match self.entries.get_mut(request_id) {
            Some(entry) => {
                entry.timer = Some(timer);
                true
            }
            None => false,
        }
    }

    /// Removes one entry.
    pub(crate) fn remove(&mut self, request_id: &RequestId) -> Option<PendingRequest> {
        self.entries.remove(request_id)
    }

    /// Returns every entry's matcher in registration order.
    fn matchers(&self) -> Vec<(RequestId, Matcher)> {
        let mut matchers: Vec<_> = self
            .entries
            .iter()
            .map(|(request_id, entry)| (entry.seq, request_id.clone(), entry.matcher.clone()))
            .collect();
        matchers.sort_unstable_by_key(|(seq, _, _)| *seq);
        matchers
            .into_iter()
            .map(|(_, request_id, matcher)| (request_id, matcher))
            .collect()
    }

    /// Removes every entry.
    pub(crate) fn drain(&mut self) -> Vec<(RequestId, PendingRequest)> {
        self.entries.drain().collect()
    }
}

/// Removes the earliest-registered entry whose matcher accepts `signal`.
///
/// Matchers run without the table locked, so they may call back into the
/// client. An entry settled meanwhile is skipped.
pub(crate) fn take_match(
    table: &Mutex<PendingTable>,
    signal: &SignalEnvelope,
) -> Option<(RequestId, PendingRequest)> {
    let matchers = table.lock().matchers();

    matchers
        .into_iter()
        .filter(|(_, matcher)| matcher.matches(signal))
        .find_map(|(request_id, _)| {
            let entry = table.lock().remove(&request_id)?;
            Some((request_id, entry))
        })
}

// ============================================================================
// PendingReply
// ============================================================================

/// Future resolving to the reply of one sent action.
///
/// Resolves to the matching [`SignalEnvelope`] (an `error` signal included),
/// or fails with [`Error::RequestTimeout`] or [`Error::Disconnected`].
#[derive(Debug)]
#[must_use = "the reply is lost unless the future is awaited"]
pub struct PendingReply {
    request_id: RequestId,
    rx: oneshot::Receiver<Result<SignalEnvelope>>,
}

impl PendingReply {
    pub(crate) fn new(request_id: RequestId, rx: oneshot::Receiver<Result<SignalEnvelope>>) -> Self {
        Self { request_id, rx }
    }

    /// Returns the request id stamped on the action.
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Awaits the reply and turns an `error` signal into [`Error::Server`].
    ///
    /// # Errors
    ///
    /// Everything the future itself fails with, plus [`Error::Server`].
    pub async fn checked(self) -> Result<SignalEnvelope> {
        self.await?.into_reply()
    }
}

impl Future for PendingReply {
    type Output = Result<SignalEnvelope>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) => Poll::Ready(Err(Error::ChannelClosed(e))),
            Poll::Pending => Poll::Pending,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Empty, Signal};

    fn paused() -> SignalEnvelope {
        SignalEnvelope::new(Signal::SimulationPaused(Empty {}), None)
    }

    fn insert(table: &mut PendingTable, id: &str) -> oneshot::Receiver<Result<SignalEnvelope>> {
        let (tx, rx) = oneshot::channel();
        let matcher = Matcher::new(|signal| signal.name() == crate::protocol::SignalName::SimulationPaused);
        table.insert(RequestId::new(id), ActionName::SimulationPause, matcher, tx);
        rx
    }

    #[test]
    fn test_earliest_match_wins() {
        let table = Mutex::new(PendingTable::default());
        let _first = insert(&mut table.lock(), "b");
        let _second = insert(&mut table.lock(), "a");

        let (request_id, entry) = take_match(&table, &paused()).expect("match");
        assert_eq!(request_id, RequestId::new("b"));
        assert_eq!(entry.action(), ActionName::SimulationPause);
        assert_eq!(table.lock().len(), 1);
    }

    #[test]
    fn test_settle_delivers_once() {
        let table = Mutex::new(PendingTable::default());
        let mut rx = insert(&mut table.lock(), "x");

        let (_, entry) = take_match(&table, &paused()).expect("match");
        entry.settle(Ok(paused()));
        assert!(matches!(rx.try_recv(), Ok(Ok(_))));
        assert!(take_match(&table, &paused()).is_none());
    }

    #[test]
    fn test_matcher_runs_unlocked() {
        let table = std::sync::Arc::new(Mutex::new(PendingTable::default()));
        let (tx, _rx) = oneshot::channel();
        let inner = std::sync::Arc::clone(&table);
        let matcher = Matcher::new(move |_| inner.lock().len() == 1);
        table
            .lock()
            .insert(RequestId::new("x"), ActionName::SimulationPause, matcher, tx);

        let (request_id, _) = take_match(&table, &paused()).expect("match");
        assert_eq!(request_id, RequestId::new("x"));
        assert_eq!(table.lock().len(), 0);
    }

    #[test]
    fn test_set_timer_after_removal() {
        let mut table = PendingTable::default();
        let _rx = insert(&mut table, "x");
        assert!(table.contains(&RequestId::new("x")));
        assert!(table.remove(&RequestId::new("x")).is_some());

        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime");
        let handle = runtime.spawn(async {});
        assert!(!table.set_timer(&RequestId::new("x"), handle.abort_handle()));
    }

    #[tokio::test]
    async fn test_dropped_responder_closes_reply() {
        let (tx, rx) = oneshot::channel();
        drop(tx);
        let reply = PendingReply::new(RequestId::new("x"), rx);
        assert!(matches!(reply.await, Err(Error::ChannelClosed(_))));
    }

    #[test]
    fn test_reply_wakes_on_settle() {
        let (tx, rx) = oneshot::channel();
        let mut task = tokio_test::task::spawn(PendingReply::new(RequestId::new("x"), rx));
        tokio_test::assert_pending!(task.poll());

        let _ = tx.send(Ok(paused()));
        assert!(task.is_woken());
        let reply = tokio_test::assert_ready!(task.poll());
        assert_eq!(reply.expect("reply").name(), crate::protocol::SignalName::SimulationPaused);
    }
}
