//! Byte-count progress projection and single-line rendering.
//!
//! Called synchronously from the receive path once per chunk; the render
//! overwrites the prior line in place with `\r` instead of scrolling.

use std::io::Write;

/// Width of the rendered progress bar in cells.
pub const BAR_WIDTH: usize = 50;

/// Monotonic byte counter against an estimated total.
#[derive(Debug)]
pub struct ProgressMeter {
    bytes_received: u64,
    estimated_total: u64,
}

impl ProgressMeter {
    /// `estimated_total` may be 0 or inaccurate (estimation error, VBR); the
    /// derived percentage is clamped either way.
    pub fn new(estimated_total: u64) -> Self {
        Self {
            bytes_received: 0,
            estimated_total,
        }
    }

    /// Add one chunk's length and return the updated percentage.
    pub fn record(&mut self, chunk_len: usize) -> u8 {
        self.bytes_received += chunk_len as u64;
        self.percent()
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Clamped completion percentage in `[0, 100]`.
    pub fn percent(&self) -> u8 {
        if self.estimated_total == 0 {
            return 0;
        }
        (self.bytes_received * 100 / self.estimated_total).min(100) as u8
    }
}

/// Render the progress line: status label, fixed-width bar, percentage.
pub fn render_line(percent: u8, paused: bool) -> String {
    let percent = percent.min(100) as usize;
    let filled = percent * BAR_WIDTH / 100;
    let status = if paused { "paused" } else { "playing" };
    format!(
        "\r{status:>7}: [{}{}] {percent:>3}% (p: pause/resume, q: stop)",
        "=".repeat(filled),
        " ".repeat(BAR_WIDTH - filled),
    )
}

/// Progress reporter bound to a text output sink.
pub struct ProgressReporter {
    meter: ProgressMeter,
    out: Box<dyn Write + Send>,
}

impl ProgressReporter {
    pub fn new(estimated_total: u64, out: Box<dyn Write + Send>) -> Self {
        Self {
            meter: ProgressMeter::new(estimated_total),
            out,
        }
    }

    /// Record one received chunk and refresh the progress line.
    ///
    /// Output errors are ignored; a broken terminal must not end the session.
    pub fn update(&mut self, chunk_len: usize, paused: bool) {
        let percent = self.meter.record(chunk_len);
        let _ = self.out.write_all(render_line(percent, paused).as_bytes());
        let _ = self.out.flush();
    }

    pub fn bytes_received(&self) -> u64 {
        self.meter.bytes_received()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_received_is_sum_of_chunk_lengths() {
        let mut meter = ProgressMeter::new(1_000);
        for len in [100usize, 250, 7, 0, 143] {
            meter.record(len);
        }
        assert_eq!(meter.bytes_received(), 500);
    }

    #[test]
    fn half_track_reports_fifty_percent() {
        // 10 s * 44_100 Hz * 2 ch * 2 bytes
        let mut meter = ProgressMeter::new(1_764_000);
        assert_eq!(meter.record(882_000), 50);
    }

    #[test]
    fn percent_clamps_on_overrun() {
        let mut meter = ProgressMeter::new(100);
        assert_eq!(meter.record(250), 100);
        assert_eq!(meter.bytes_received(), 250);
    }

    #[test]
    fn zero_estimate_reports_zero_percent() {
        let mut meter = ProgressMeter::new(0);
        assert_eq!(meter.record(4096), 0);
    }

    #[test]
    fn render_line_has_fixed_bar_width() {
        for percent in [0u8, 1, 37, 50, 99, 100] {
            let line = render_line(percent, false);
            let bar: String = line
                .chars()
                .skip_while(|c| *c != '[')
                .skip(1)
                .take_while(|c| *c != ']')
                .collect();
            assert_eq!(bar.chars().count(), BAR_WIDTH, "percent {percent}");
        }
    }

    #[test]
    fn render_line_overwrites_in_place() {
        assert!(render_line(10, false).starts_with('\r'));
    }

    #[test]
    fn render_line_shows_pause_state() {
        assert!(render_line(10, true).contains("paused"));
        assert!(render_line(10, false).contains("playing"));
    }

    #[test]
    fn reporter_writes_to_sink() {
        let mut reporter = ProgressReporter::new(200, Box::new(Vec::new()));
        reporter.update(100, false);
        assert_eq!(reporter.bytes_received(), 100);
    }
}
