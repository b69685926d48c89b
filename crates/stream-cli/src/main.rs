//! `stream-cli` — interactive client for the PCM track server.
//!
//! Lists the server's tracks, shows metadata for a selection, and plays the
//! chunk stream through the default (or named) output device. During playback
//! `p` pauses/resumes and `q` stops; progress renders on a single overwritten
//! line.

mod server_api;
mod term;

use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use stream_player::config::SessionConfig;
use stream_player::session::{self, SessionIo};
use stream_player::sink::{CpalSink, CpalSinkConfig};
use stream_player::source::TrackService;
use stream_types::{SessionEnd, TrackMetadata};
use tracing_subscriber::EnvFilter;

use server_api::HttpTrackService;
use term::{KeyInput, RawModeGuard};

#[derive(Parser, Debug)]
#[command(name = "stream-cli", version)]
struct Args {
    /// Base URL of the track server, e.g. http://192.168.1.10:8080
    #[arg(long)]
    server: String,

    /// Output device name substring; default device when omitted.
    #[arg(long)]
    device: Option<String>,

    /// Seconds of audio buffered ahead of the output device.
    #[arg(long, default_value_t = 2.0)]
    buffer_seconds: f32,

    /// Give up on a session after this many seconds without a terminal signal.
    #[arg(long, default_value_t = 300)]
    stall_timeout_secs: u64,

    /// List output devices and exit.
    #[arg(long, default_value_t = false)]
    list_devices: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,stream_cli=info")),
        )
        .init();

    if args.list_devices {
        return stream_player::device::list_devices(&cpal::default_host());
    }

    // Raw mode may be active when the signal arrives mid-session.
    let _ = ctrlc::set_handler(|| {
        crossterm::terminal::disable_raw_mode().ok();
        std::process::exit(130);
    });

    tracing::info!(server = %args.server, "connecting to track server");
    let service = HttpTrackService::new(&args.server);
    let config = SessionConfig {
        buffer_seconds: args.buffer_seconds,
        stall_timeout: Duration::from_secs(args.stall_timeout_secs.max(1)),
        device: args.device.clone(),
        ..SessionConfig::default()
    };

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    let mut stdout = std::io::stdout();

    run_menu(&service, &mut lines, &mut stdout, |service, track| {
        let _raw = RawModeGuard::enable()?;
        let sink_config = CpalSinkConfig {
            device: config.device.clone(),
            buffer_seconds: config.buffer_seconds,
            refill_max_samples: config.refill_max_samples,
        };
        let io = SessionIo {
            input: Box::new(KeyInput),
            progress_out: Box::new(std::io::stdout()),
            status_out: Box::new(std::io::stdout()),
        };
        session::play_track(service, track, &config, io, move |transport| {
            CpalSink::new(sink_config, transport)
        })
    })
}

/// Menu loop: list tracks, play selections until the user quits.
///
/// An empty track list ends the program cleanly without starting a session.
/// Playback itself is injected so the flow is testable without a device.
fn run_menu<S, P>(
    service: &S,
    lines: &mut dyn Iterator<Item = std::io::Result<String>>,
    out: &mut dyn Write,
    mut play: P,
) -> Result<()>
where
    S: TrackService,
    P: FnMut(&S, &str) -> Result<SessionEnd>,
{
    loop {
        let tracks = service.list_tracks().context("list tracks")?;
        if tracks.is_empty() {
            writeln!(out, "No tracks available.")?;
            return Ok(());
        }

        writeln!(out, "\nAvailable tracks:")?;
        for (i, name) in tracks.iter().enumerate() {
            writeln!(out, "  {}. {name}", i + 1)?;
        }
        write!(out, "Select a track (1-{}, 0 to quit): ", tracks.len())?;
        out.flush().ok();

        let Some(line) = lines.next().transpose().context("read selection")? else {
            return Ok(());
        };
        let track = match parse_choice(&line, tracks.len()) {
            Some(MenuChoice::Quit) => return Ok(()),
            Some(MenuChoice::Play(i)) => &tracks[i],
            None => {
                writeln!(out, "Invalid selection.")?;
                continue;
            }
        };

        match session::describe_track(service, track)? {
            Some(metadata) => print_metadata(out, &metadata)?,
            None => {
                writeln!(out, "Track is no longer available: {track}")?;
                continue;
            }
        }
        writeln!(out, "Controls: p = pause/resume, q = stop")?;

        let end = play(service, track)?;
        writeln!(out, "\n{}", describe_end(&end))?;
        if let SessionEnd::DeviceUnavailable { message } | SessionEnd::StreamError { message } =
            &end
        {
            tracing::warn!(%message, %track, "session ended abnormally");
        }

        write!(out, "Play another track? (y/n): ")?;
        out.flush().ok();
        let Some(answer) = lines.next().transpose().context("read answer")? else {
            return Ok(());
        };
        if !answer.trim().eq_ignore_ascii_case("y") {
            return Ok(());
        }
    }
}

enum MenuChoice {
    Play(usize),
    Quit,
}

/// Parse a menu line into a zero-based track index; `0` or `q` quits.
fn parse_choice(line: &str, track_count: usize) -> Option<MenuChoice> {
    let line = line.trim();
    if line.eq_ignore_ascii_case("q") {
        return Some(MenuChoice::Quit);
    }
    let n: usize = line.parse().ok()?;
    if n == 0 {
        Some(MenuChoice::Quit)
    } else if n <= track_count {
        Some(MenuChoice::Play(n - 1))
    } else {
        None
    }
}

fn print_metadata(out: &mut dyn Write, m: &TrackMetadata) -> std::io::Result<()> {
    writeln!(out, "\nNow playing: {}", m.file_name)?;
    writeln!(out, "  Duration:    {}", format_duration(m.duration_seconds))?;
    writeln!(out, "  Sample rate: {} Hz", m.sample_rate)?;
    writeln!(out, "  Channels:    {}", m.channels)?;
    writeln!(out, "  Codec:       {}", m.codec)
}

/// Whole seconds as `m:ss`.
fn format_duration(seconds: u32) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

fn describe_end(end: &SessionEnd) -> &'static str {
    match end {
        SessionEnd::Completed => "Playback finished.",
        SessionEnd::Stopped => "Playback stopped.",
        SessionEnd::DeviceUnavailable { .. } => "Playback failed: audio output unavailable.",
        SessionEnd::StreamError { .. } => "Playback failed: stream error.",
        SessionEnd::TimedOut => "Playback gave up: no data from the server.",
    }
}
