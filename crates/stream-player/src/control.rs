//! Control listener: user commands consumed concurrently with playback.
//!
//! A dedicated thread polls a [`CommandInput`] with a bounded timeout so it
//! never blocks shutdown, and exits on its own within one poll interval of
//! the transport stopping. It only ever mutates transport state and fires the
//! stop outcome; it never surfaces errors.

use std::io::Write;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use stream_types::SessionEnd;

use crate::gate::CompletionGate;
use crate::transport::Transport;

/// Single-character user commands, case-insensitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    /// `p` — flip the paused flag.
    PauseResume,
    /// `q` — stop the session.
    Stop,
}

/// Map an input character to a command; anything else is ignored.
pub fn parse_command(c: char) -> Option<ControlCommand> {
    match c.to_ascii_lowercase() {
        'p' => Some(ControlCommand::PauseResume),
        'q' => Some(ControlCommand::Stop),
        _ => None,
    }
}

/// Non-blocking source of user input characters.
///
/// `poll` waits at most `timeout` and returns `None` when nothing is pending.
pub trait CommandInput: Send {
    fn poll(&mut self, timeout: Duration) -> Option<char>;
}

/// Spawn the listener thread for one session.
///
/// Status lines are written to `out` when pause state flips; write failures
/// are ignored.
pub fn spawn_listener(
    transport: Arc<Transport>,
    gate: Arc<CompletionGate>,
    mut input: Box<dyn CommandInput>,
    mut out: Box<dyn Write + Send>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        while transport.is_playing() {
            let Some(c) = input.poll(poll_interval) else {
                continue;
            };
            match parse_command(c) {
                Some(ControlCommand::PauseResume) => {
                    let paused = transport.toggle_pause();
                    let label = if paused { "paused" } else { "resumed" };
                    tracing::debug!(paused, "pause toggled");
                    let _ = write!(out, "\r{label:<76}");
                    let _ = out.flush();
                }
                Some(ControlCommand::Stop) => {
                    tracing::debug!("stop requested");
                    transport.stop();
                    gate.fire(SessionEnd::Stopped);
                    break;
                }
                None => {}
            }
        }
    })
}
