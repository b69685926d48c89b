use std::time::Duration;

/// Tuning knobs for one playback session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Target buffered audio in seconds (sink queue sizing).
    pub buffer_seconds: f32,
    /// Max samples pulled per output callback refill.
    pub refill_max_samples: usize,
    /// Control/receive poll interval; bounds how quickly both loops notice
    /// a stop. Must stay well under a second for perceived responsiveness.
    pub poll_interval: Duration,
    /// Session stall bound: with no terminal signal within this window the
    /// caller is released with a timeout outcome.
    pub stall_timeout: Duration,
    /// Output device substring match; `None` selects the default device.
    pub device: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: 2.0,
            refill_max_samples: 8_192,
            poll_interval: Duration::from_millis(100),
            stall_timeout: Duration::from_secs(300),
            device: None,
        }
    }
}
