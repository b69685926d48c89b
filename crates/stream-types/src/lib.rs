use serde::{Deserialize, Serialize};

/// Bytes per sample for the raw PCM stream (16-bit signed).
pub const BYTES_PER_SAMPLE: u64 = 2;

/// Per-track metadata reported by the track service.
///
/// Immutable once fetched; one instance is owned by the playback session for
/// its whole lifetime.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackMetadata {
    /// File name as known by the server.
    pub file_name: String,
    /// Track duration in whole seconds.
    pub duration_seconds: u32,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Source codec name (for example `pcm`, `mp3`).
    pub codec: String,
}

impl TrackMetadata {
    /// Estimated total PCM byte count for the whole track.
    ///
    /// `duration * rate * channels * 2` assuming 16-bit samples. The estimate
    /// can be 0 (missing duration) or inaccurate; progress display must clamp.
    pub fn estimated_pcm_bytes(&self) -> u64 {
        u64::from(self.duration_seconds)
            * u64::from(self.sample_rate)
            * u64::from(self.channels)
            * BYTES_PER_SAMPLE
    }

    /// PCM format implied by this metadata.
    ///
    /// Zero sample rate or channel count falls back to the stream default
    /// rather than producing an unplayable format.
    pub fn pcm_format(&self) -> PcmFormat {
        if self.sample_rate == 0 || self.channels == 0 {
            return PcmFormat::default();
        }
        PcmFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }
}

/// Raw PCM framing for the chunk payload: 16-bit signed little-endian,
/// interleaved channels.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
        }
    }
}

/// Terminal outcome of one playback session.
///
/// Exactly one of these reaches the caller per session. An explicit user stop
/// is `Stopped`, never `StreamError`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEnd {
    /// Natural end of the chunk stream; the sink was drained.
    Completed,
    /// Playback was stopped by a user command.
    Stopped,
    /// The output device could not be opened or started.
    DeviceUnavailable { message: String },
    /// The chunk source signaled an error; the sink was abandoned.
    StreamError { message: String },
    /// No terminal signal arrived within the session stall bound.
    TimedOut,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(duration_seconds: u32, sample_rate: u32, channels: u16) -> TrackMetadata {
        TrackMetadata {
            file_name: "track.pcm".to_string(),
            duration_seconds,
            sample_rate,
            channels,
            codec: "pcm".to_string(),
        }
    }

    #[test]
    fn estimated_pcm_bytes_for_cd_stereo() {
        assert_eq!(meta(10, 44_100, 2).estimated_pcm_bytes(), 1_764_000);
    }

    #[test]
    fn estimated_pcm_bytes_zero_duration() {
        assert_eq!(meta(0, 44_100, 2).estimated_pcm_bytes(), 0);
    }

    #[test]
    fn pcm_format_derived_from_metadata() {
        let format = meta(10, 48_000, 1).pcm_format();
        assert_eq!(format.sample_rate, 48_000);
        assert_eq!(format.channels, 1);
    }

    #[test]
    fn pcm_format_falls_back_on_zero_fields() {
        assert_eq!(meta(10, 0, 2).pcm_format(), PcmFormat::default());
        assert_eq!(meta(10, 44_100, 0).pcm_format(), PcmFormat::default());
    }

    #[test]
    fn metadata_roundtrips_through_json() {
        let m = meta(185, 44_100, 2);
        let json = serde_json::to_string(&m).unwrap();
        let back: TrackMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, m);
    }
}
