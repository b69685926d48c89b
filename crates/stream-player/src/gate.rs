//! Single-fire completion gate unblocking the session caller exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use stream_types::SessionEnd;

/// One-shot synchronization point between a playback session and its caller.
///
/// Any of {normal completion, stream error, explicit stop} may race to fire
/// the gate; only the first outcome is observable. A later fire is a no-op,
/// never a new event.
pub struct CompletionGate {
    fired: AtomicBool,
    tx: Sender<SessionEnd>,
    rx: Receiver<SessionEnd>,
}

impl Default for CompletionGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionGate {
    pub fn new() -> Self {
        let (tx, rx) = bounded(1);
        Self {
            fired: AtomicBool::new(false),
            tx,
            rx,
        }
    }

    /// Record the terminal outcome. The first caller wins; subsequent calls
    /// are silently dropped.
    pub fn fire(&self, end: SessionEnd) {
        if self.fired.swap(true, Ordering::SeqCst) {
            tracing::debug!(?end, "completion gate already fired; dropping");
            return;
        }
        // Capacity 1 and the swap above guarantee this send succeeds.
        let _ = self.tx.try_send(end);
    }

    /// Whether a terminal outcome has been recorded.
    pub fn is_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }

    /// Block up to `timeout` for the terminal outcome.
    ///
    /// Returns `None` when the bound elapses with no signal; the caller is
    /// then responsible for forcing the transport to stop.
    pub fn wait(&self, timeout: Duration) -> Option<SessionEnd> {
        self.rx.recv_timeout(timeout).ok()
    }
}
