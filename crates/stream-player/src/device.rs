//! Output device discovery and selection.
//!
//! Thin CPAL wrappers: pick a device (default or substring match) and an
//! output config targeting the stream's sample rate.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick the first output device whose name contains `needle`
/// (case-insensitive), or the host default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .context("No output devices")?
        .collect();

    if let Some(needle) = needle {
        if let Some(d) = devices.drain(..).find(|d| {
            d.description()
                .ok()
                .map(|n| name_matches(&n.name(), needle))
                .unwrap_or(false)
        }) {
            return Ok(d);
        }
        return Err(anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose the best supported output config for `target_rate`.
///
/// Prefers the rate nearest the target (the higher rate wins a tie), then
/// the preferred sample format. Without an exact match playback runs at the
/// nearest supported rate; the caller logs the mismatch.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: u32,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query output configs")?
        .collect();
    if ranges.is_empty() {
        return Err(anyhow!("No supported output configs"));
    }

    let best = ranges
        .into_iter()
        .map(|range| {
            let rate = clamp_rate(range.min_sample_rate(), range.max_sample_rate(), target_rate);
            let rank = sample_format_rank(range.sample_format());
            (rate_preference(rate, target_rate), std::cmp::Reverse(rank), rate, range)
        })
        .max_by_key(|(pref, rank, _, _)| (*pref, *rank))
        .map(|(_, _, rate, range)| range.with_sample_rate(rate));

    best.ok_or_else(|| anyhow!("No usable output config"))
}

/// Ordering key preferring the rate closest to `target`; a tie goes to the
/// higher rate.
fn rate_preference(rate: u32, target: u32) -> (std::cmp::Reverse<u32>, u32) {
    (std::cmp::Reverse(rate.abs_diff(target)), rate)
}

/// Prefer a fixed buffer size when the device advertises a range; larger
/// buffers resist underruns on push-style sources.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    const MAX_FRAMES: u32 = 16_384;
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            let chosen = if *max > MAX_FRAMES {
                (*min).max(MAX_FRAMES.min(*max))
            } else {
                *max
            };
            Some(cpal::BufferSize::Fixed(chosen))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Log available output devices for `--list-devices`.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

fn clamp_rate(min: u32, max: u32, target: u32) -> u32 {
    if target < min {
        min
    } else if target > max {
        max
    } else {
        target
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn name_matches(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}
