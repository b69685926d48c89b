//! Bounded thread-safe queue of interleaved `f32` samples.
//!
//! The sink write path pushes converted PCM into the queue, blocking when it
//! is full — that stall is the session's backpressure toward the chunk
//! source. The output callback drains it non-blockingly. A `closed` flag kept
//! under the same mutex makes shutdown deterministic: close + drain, or close
//! + cancel for abandoned sessions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Bounded interleaved-sample queue shared between the write path and the
/// output callback.
///
/// Samples are stored interleaved (`frame0[ch0], frame0[ch1], ...`); the
/// channel count is fixed for the queue's lifetime and pops always return
/// whole frames.
pub struct SampleQueue {
    channels: usize,
    inner: Mutex<Inner>,
    cv: Condvar,
    max_samples: usize,
}

struct Inner {
    buf: VecDeque<f32>,
    closed: bool,
}

/// Queue capacity in samples for roughly `seconds` of buffered audio.
pub fn capacity_samples(sample_rate: u32, channels: usize, seconds: f32) -> usize {
    let seconds = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        2.0
    };
    let frames = (sample_rate as f32 * seconds).ceil() as usize;
    frames.saturating_mul(channels)
}

impl SampleQueue {
    pub fn new(channels: usize, max_samples: usize) -> Self {
        Self {
            channels: channels.max(1),
            inner: Mutex::new(Inner {
                buf: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
            max_samples: max_samples.max(channels.max(1)),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn len_samples(&self) -> usize {
        self.inner.lock().unwrap().buf.len()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Mark the queue closed and wake all waiters. Idempotent.
    ///
    /// A closed queue still hands out buffered samples until drained; pushes
    /// return early and drop their remainder.
    pub fn close(&self) {
        let mut g = self.inner.lock().unwrap();
        g.closed = true;
        drop(g);
        self.cv.notify_all();
    }

    /// Push interleaved samples, blocking while the queue is full.
    ///
    /// Returns early when the queue is closed mid-push; remaining samples are
    /// dropped, which is only observable during shutdown.
    pub fn push_blocking(&self, samples: &[f32]) {
        self.push_blocking_while(samples, || true);
    }

    /// Like [`SampleQueue::push_blocking`], but gives up once `keep_going`
    /// turns false.
    ///
    /// The sink uses this so a blocked write (full queue, paused output)
    /// cannot outlive the session: a stop request unblocks it at the next
    /// wait-loop check.
    pub fn push_blocking_while(&self, samples: &[f32], keep_going: impl Fn() -> bool) {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.inner.lock().unwrap();
            while g.buf.len() >= self.max_samples && !g.closed && keep_going() {
                let (ng, _) = self.cv.wait_timeout(g, Duration::from_millis(50)).unwrap();
                g = ng;
            }
            if g.closed || !keep_going() {
                return;
            }

            while offset < samples.len() && g.buf.len() < self.max_samples {
                g.buf.push_back(samples[offset]);
                offset += 1;
            }
            drop(g);
            self.cv.notify_all();
        }
    }

    /// Pop up to `max_samples` without blocking, rounded down to whole frames.
    ///
    /// Returns `None` when no complete frame is buffered.
    pub fn pop_samples(&self, max_samples: usize) -> Option<Vec<f32>> {
        let mut g = self.inner.lock().unwrap();
        let whole_frames = (g.buf.len() / self.channels).min(max_samples / self.channels);
        let take = whole_frames * self.channels;
        if take == 0 {
            return None;
        }

        let out: Vec<f32> = g.buf.drain(..take).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    /// Block until the queue is closed and fully drained.
    pub fn wait_drained(&self) {
        let mut g = self.inner.lock().unwrap();
        while !(g.closed && g.buf.is_empty()) {
            g = self.cv.wait(g).unwrap();
        }
    }

    /// Block until closed+empty or until `cancel` becomes true.
    ///
    /// Returns `true` when the queue drained normally, `false` on cancel.
    pub fn wait_drained_or_cancel(&self, cancel: &AtomicBool) -> bool {
        let mut g = self.inner.lock().unwrap();
        loop {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            if g.closed && g.buf.is_empty() {
                return true;
            }
            let (ng, _) = self.cv.wait_timeout(g, Duration::from_millis(50)).unwrap();
            g = ng;
        }
    }
}
