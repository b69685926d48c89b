//! CPAL output stream for the playback sink.
//!
//! The real-time callback refills a small local buffer from the shared
//! sample queue without blocking, maps channels (mono↔stereo, best-effort
//! otherwise), and converts `f32` samples to the device sample format.
//! Underruns are filled with silence. While the transport is paused the
//! callback emits silence without draining the queue, so pausing never skips
//! ahead.

use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::queue::SampleQueue;
use crate::transport::Transport;

/// Knobs for the output callback.
pub struct OutputOptions {
    /// Max samples pulled from the queue per refill. Larger values reduce
    /// lock churn but add latency.
    pub refill_max_samples: usize,
    /// When paused, the callback outputs silence and leaves the queue intact.
    pub transport: Arc<Transport>,
}

/// Build a CPAL output stream rendering interleaved `f32` samples from `queue`.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SampleQueue>,
    opts: OutputOptions,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, opts),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, opts),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, opts),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, opts),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

/// Local refill buffer so the callback locks the queue once per burst.
struct CallbackState {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SampleQueue>,
    opts: OutputOptions,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;
    let refill_max_samples = opts.refill_max_samples.max(queue.channels());
    let transport = opts.transport;
    let queue = queue.clone();

    let state = Arc::new(Mutex::new(CallbackState {
        pos: 0,
        src_channels: queue.channels(),
        src: Vec::new(),
    }));

    let err_fn = |err| tracing::warn!("output stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);
            // Pause only gates a live session; after a stop the residual
            // buffer is allowed to flush so drains cannot hang.
            if transport.is_paused() && transport.is_playing() {
                data.fill(silence);
                return;
            }

            let mut st = state.lock().unwrap();
            let frames = data.len() / channels_out;
            for frame in 0..frames {
                if st.pos >= st.src.len() {
                    st.pos = 0;
                    st.src.clear();
                    match queue.pop_samples(refill_max_samples) {
                        Some(v) => st.src = v,
                        None => {
                            // Underrun or end of stream: pad with silence.
                            for slot in &mut data[frame * channels_out..] {
                                *slot = silence;
                            }
                            return;
                        }
                    }
                }
                for ch in 0..channels_out {
                    let sample = next_mapped_sample(&mut st, channels_out, ch);
                    data[frame * channels_out + ch] =
                        <T as cpal::Sample>::from_sample::<f32>(sample);
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Read one output sample for `dst_ch` with basic channel mapping:
/// mono→stereo duplicates, stereo→mono averages, other layouts clamp to the
/// available source channels. `pos` advances once per destination frame.
fn next_mapped_sample(st: &mut CallbackState, dst_channels: usize, dst_ch: usize) -> f32 {
    if st.pos >= st.src.len() {
        return 0.0;
    }

    let frame_start = st.pos;
    let src = |ch: usize, st: &CallbackState| -> f32 {
        if ch < st.src_channels && frame_start + ch < st.src.len() {
            st.src[frame_start + ch]
        } else {
            0.0
        }
    };

    let out = match (st.src_channels, dst_channels) {
        (1, _) => src(0, st),
        (2, 1) => 0.5 * (src(0, st) + src(1, st)),
        (2, 2) => src(dst_ch, st),
        _ => src(dst_ch.min(st.src_channels.saturating_sub(1)), st),
    };

    if dst_ch + 1 == dst_channels {
        st.pos += st.src_channels;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(src_channels: usize, src: Vec<f32>) -> CallbackState {
        CallbackState {
            pos: 0,
            src_channels,
            src,
        }
    }

    #[test]
    fn stereo_passthrough_preserves_interleaving() {
        let mut st = state(2, vec![0.1, 0.2, 0.3, 0.4]);
        assert_eq!(next_mapped_sample(&mut st, 2, 0), 0.1);
        assert_eq!(next_mapped_sample(&mut st, 2, 1), 0.2);
        assert_eq!(next_mapped_sample(&mut st, 2, 0), 0.3);
        assert_eq!(next_mapped_sample(&mut st, 2, 1), 0.4);
    }

    #[test]
    fn mono_duplicates_to_stereo() {
        let mut st = state(1, vec![0.5, -0.5]);
        assert_eq!(next_mapped_sample(&mut st, 2, 0), 0.5);
        assert_eq!(next_mapped_sample(&mut st, 2, 1), 0.5);
        assert_eq!(next_mapped_sample(&mut st, 2, 0), -0.5);
    }

    #[test]
    fn stereo_averages_to_mono() {
        let mut st = state(2, vec![0.2, 0.4]);
        let v = next_mapped_sample(&mut st, 1, 0);
        assert!((v - 0.3).abs() < 1e-6);
    }

    #[test]
    fn exhausted_buffer_yields_silence() {
        let mut st = state(2, vec![]);
        assert_eq!(next_mapped_sample(&mut st, 2, 0), 0.0);
    }
}
