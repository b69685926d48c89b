//! Shared transport state for one playback session.
//!
//! Exactly two execution contexts touch this state: the chunk-receive worker
//! and the control listener. Reads are lock-free atomic loads; writes happen
//! under an internal mutex before waking waiters, so a pause wait can never
//! miss the wakeup for the store it is waiting on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

/// Playing/paused flags coordinating the receive and control paths.
///
/// Lifecycle: at rest (`playing=false`) → [`Transport::start`] →
/// [`Transport::toggle_pause`] any number of times → [`Transport::stop`]
/// (terminal for the session). Once `playing` is false no further sink writes
/// are issued and the control loop exits; error and explicit stop both
/// collapse to `playing=false` here, the session records the distinction
/// separately.
#[derive(Debug, Default)]
pub struct Transport {
    playing: AtomicBool,
    paused: AtomicBool,
    lock: Mutex<()>,
    cv: Condvar,
}

impl Transport {
    /// New transport at rest: not playing, not paused.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to playing, not paused. Called once when a session starts.
    pub fn start(&self) {
        let _g = self.lock.lock().unwrap();
        self.paused.store(false, Ordering::Relaxed);
        self.playing.store(true, Ordering::Relaxed);
        self.cv.notify_all();
    }

    /// Flip the paused flag and return the new value.
    pub fn toggle_pause(&self) -> bool {
        let _g = self.lock.lock().unwrap();
        let paused = !self.paused.load(Ordering::Relaxed);
        self.paused.store(paused, Ordering::Relaxed);
        self.cv.notify_all();
        paused
    }

    /// Terminate the session. Idempotent; wakes any pause waiter.
    pub fn stop(&self) {
        let _g = self.lock.lock().unwrap();
        self.playing.store(false, Ordering::Relaxed);
        self.cv.notify_all();
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    /// Block while paused and still playing.
    ///
    /// Returns `true` when playback resumed and the pending write may proceed,
    /// `false` when the session stopped while waiting (the caller must discard
    /// its pending chunk — stop takes priority over completing the write).
    pub fn wait_while_paused(&self) -> bool {
        let mut g = self.lock.lock().unwrap();
        while self.paused.load(Ordering::Relaxed) && self.playing.load(Ordering::Relaxed) {
            g = self.cv.wait(g).unwrap();
        }
        self.playing.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn starts_at_rest() {
        let t = Transport::new();
        assert!(!t.is_playing());
        assert!(!t.is_paused());
    }

    #[test]
    fn start_resets_pause() {
        let t = Transport::new();
        t.toggle_pause();
        t.start();
        assert!(t.is_playing());
        assert!(!t.is_paused());
    }

    #[test]
    fn toggle_pause_pair_is_idempotent() {
        let t = Transport::new();
        t.start();
        let before = t.is_paused();
        assert!(t.toggle_pause());
        assert!(!t.toggle_pause());
        assert_eq!(t.is_paused(), before);
    }

    #[test]
    fn stop_is_terminal() {
        let t = Transport::new();
        t.start();
        t.stop();
        assert!(!t.is_playing());
        t.stop();
        assert!(!t.is_playing());
    }

    #[test]
    fn wait_while_paused_returns_immediately_when_not_paused() {
        let t = Transport::new();
        t.start();
        assert!(t.wait_while_paused());
    }

    #[test]
    fn wait_while_paused_unblocks_on_resume() {
        let t = Arc::new(Transport::new());
        t.start();
        t.toggle_pause();

        let waiter = t.clone();
        let handle = thread::spawn(move || waiter.wait_while_paused());

        thread::sleep(Duration::from_millis(20));
        t.toggle_pause();
        assert!(handle.join().unwrap());
    }

    #[test]
    fn wait_while_paused_reports_stop() {
        let t = Arc::new(Transport::new());
        t.start();
        t.toggle_pause();

        let waiter = t.clone();
        let handle = thread::spawn(move || waiter.wait_while_paused());

        thread::sleep(Duration::from_millis(20));
        t.stop();
        assert!(!handle.join().unwrap());
    }
}
