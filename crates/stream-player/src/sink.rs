//! Playback sink: the owner of the platform audio output.
//!
//! [`AudioSink`] is the seam the session orchestrator writes through;
//! [`CpalSink`] is the production implementation. The CPAL stream is not
//! `Send`, so a dedicated render thread owns it for the sink's lifetime and
//! exits once the sample queue is closed and drained (or abandoned).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use cpal::traits::{DeviceTrait, StreamTrait};
use stream_types::PcmFormat;

use crate::device;
use crate::playback::{self, OutputOptions};
use crate::queue::{self, SampleQueue};
use crate::transport::Transport;

/// Ordered PCM output for one playback session.
///
/// `open` is idempotent per session and called lazily on the first chunk;
/// `write` must not be called before `open` succeeds or after `drain`/
/// `abandon`. Exactly one of `drain` (normal completion) or `abandon`
/// (stream error, unreliable state) ends the sink.
pub trait AudioSink {
    /// Construct and start the output line for `format`.
    fn open(&mut self, format: PcmFormat) -> Result<()>;

    /// Enqueue PCM bytes for rendering in arrival order; blocks when the
    /// device is behind (backpressure toward the chunk source).
    fn write(&mut self, pcm: &[u8]) -> Result<()>;

    /// Block until everything written has been rendered, then release the
    /// device.
    fn drain(&mut self) -> Result<()>;

    /// Release the device without draining.
    fn abandon(&mut self);
}

/// Convert little-endian signed 16-bit PCM bytes to `f32` samples.
///
/// A trailing odd byte is left for the caller to carry into the next chunk.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|b| f32::from(i16::from_le_bytes([b[0], b[1]])) / 32_768.0)
        .collect()
}

/// Tuning for the CPAL sink.
#[derive(Clone, Debug)]
pub struct CpalSinkConfig {
    /// Output device substring match; `None` selects the default device.
    pub device: Option<String>,
    /// Target buffered audio in seconds (queue capacity).
    pub buffer_seconds: f32,
    /// Max samples pulled per output callback refill.
    pub refill_max_samples: usize,
}

impl Default for CpalSinkConfig {
    fn default() -> Self {
        Self {
            device: None,
            buffer_seconds: 2.0,
            refill_max_samples: 8_192,
        }
    }
}

/// CPAL-backed [`AudioSink`].
pub struct CpalSink {
    config: CpalSinkConfig,
    transport: Arc<Transport>,
    queue: Option<Arc<SampleQueue>>,
    abandon: Arc<AtomicBool>,
    render: Option<JoinHandle<()>>,
    carry: Option<u8>,
}

impl CpalSink {
    /// The transport is shared with the output callback so that pause means
    /// silence without draining buffered audio.
    pub fn new(config: CpalSinkConfig, transport: Arc<Transport>) -> Self {
        Self {
            config,
            transport,
            queue: None,
            abandon: Arc::new(AtomicBool::new(false)),
            render: None,
            carry: None,
        }
    }

    fn join_render(&mut self) {
        if let Some(handle) = self.render.take() {
            let _ = handle.join();
        }
    }
}

impl AudioSink for CpalSink {
    fn open(&mut self, format: PcmFormat) -> Result<()> {
        if self.queue.is_some() {
            return Ok(());
        }

        let channels = usize::from(format.channels.max(1));
        let queue = Arc::new(SampleQueue::new(
            channels,
            queue::capacity_samples(format.sample_rate, channels, self.config.buffer_seconds),
        ));

        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);
        let render_queue = queue.clone();
        let abandon = self.abandon.clone();
        let transport = self.transport.clone();
        let device_hint = self.config.device.clone();
        let refill_max_samples = self.config.refill_max_samples;

        let render = std::thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let started = start_stream(
                    device_hint.as_deref(),
                    format,
                    &render_queue,
                    refill_max_samples,
                    transport,
                );
                match started {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        let drained = render_queue.wait_drained_or_cancel(&abandon);
                        if drained {
                            // Let the device render the tail of its own buffer.
                            std::thread::sleep(Duration::from_millis(100));
                        }
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("{e:#}")));
                    }
                }
            })
            .context("spawn audio output thread")?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                self.queue = Some(queue);
                self.render = Some(render);
                Ok(())
            }
            Ok(Err(message)) => {
                let _ = render.join();
                Err(anyhow!("audio output unavailable: {message}"))
            }
            Err(_) => {
                let _ = render.join();
                Err(anyhow!("audio output thread exited before starting"))
            }
        }
    }

    fn write(&mut self, pcm: &[u8]) -> Result<()> {
        let Some(queue) = self.queue.as_ref() else {
            bail!("sink not open");
        };

        // Re-align on a sample boundary when a chunk split an i16 in half.
        let samples = if let Some(head) = self.carry.take() {
            let mut joined = Vec::with_capacity(pcm.len() + 1);
            joined.push(head);
            joined.extend_from_slice(pcm);
            if joined.len() % 2 == 1 {
                self.carry = joined.last().copied();
            }
            pcm16_to_f32(&joined)
        } else {
            if pcm.len() % 2 == 1 {
                self.carry = pcm.last().copied();
            }
            pcm16_to_f32(pcm)
        };

        if !samples.is_empty() {
            let transport = self.transport.clone();
            queue.push_blocking_while(&samples, move || transport.is_playing());
        }
        Ok(())
    }

    fn drain(&mut self) -> Result<()> {
        if let Some(queue) = self.queue.take() {
            queue.close();
            self.join_render();
        }
        Ok(())
    }

    fn abandon(&mut self) {
        self.abandon.store(true, Ordering::Relaxed);
        if let Some(queue) = self.queue.take() {
            queue.close();
        }
        self.join_render();
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        // An undrained sink must not leak its render thread.
        if self.queue.is_some() || self.render.is_some() {
            self.abandon();
        }
    }
}

/// Pick a device and output config for `format` and start the stream.
fn start_stream(
    device_hint: Option<&str>,
    format: PcmFormat,
    queue: &Arc<SampleQueue>,
    refill_max_samples: usize,
    transport: Arc<Transport>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = device::pick_device(&host, device_hint)?;
    let config = device::pick_output_config(&device, format.sample_rate)?;
    let mut stream_config: cpal::StreamConfig = config.clone().into();
    if let Some(buf) = device::pick_buffer_size(&config) {
        stream_config.buffer_size = buf;
    }

    if stream_config.sample_rate != format.sample_rate {
        tracing::warn!(
            source_rate_hz = format.sample_rate,
            output_rate_hz = stream_config.sample_rate,
            "device does not support the stream rate; playback speed will drift"
        );
    }
    tracing::info!(
        device = %device.description()?,
        rate_hz = stream_config.sample_rate,
        channels = format.channels,
        buffer_size = ?stream_config.buffer_size,
        "output device opened"
    );

    let stream = playback::build_output_stream(
        &device,
        &stream_config,
        config.sample_format(),
        queue,
        OutputOptions {
            refill_max_samples,
            transport,
        },
    )?;
    stream.play().context("start output stream")?;
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm16_to_f32_decodes_little_endian() {
        // 0x0000 => 0.0, 0x4000 => 0.5, 0x8000 => -1.0
        let samples = pcm16_to_f32(&[0x00, 0x00, 0x00, 0x40, 0x00, 0x80]);
        assert_eq!(samples, vec![0.0, 0.5, -1.0]);
    }

    #[test]
    fn pcm16_to_f32_ignores_trailing_odd_byte() {
        let samples = pcm16_to_f32(&[0x00, 0x40, 0xff]);
        assert_eq!(samples, vec![0.5]);
    }

    #[test]
    fn write_before_open_is_an_error() {
        let mut sink = CpalSink::new(CpalSinkConfig::default(), Arc::new(Transport::new()));
        assert!(sink.write(&[0, 0]).is_err());
    }
}
