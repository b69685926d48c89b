//! Terminal input for in-session playback commands.
//!
//! Raw mode is scoped to one playback session by [`RawModeGuard`] so the menu
//! keeps normal line editing. Key presses are polled with a bounded timeout,
//! matching the control listener's contract.

use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use stream_player::control::CommandInput;

/// Enables raw mode on construction, restores on drop.
pub struct RawModeGuard {
    _private: (),
}

impl RawModeGuard {
    pub fn enable() -> Result<Self> {
        enable_raw_mode().context("enable raw mode")?;
        Ok(Self { _private: () })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        disable_raw_mode().ok();
    }
}

/// [`CommandInput`] over crossterm key events.
///
/// Ctrl-C maps to the stop command so an interrupt during playback ends the
/// session instead of killing the process mid-stream.
pub struct KeyInput;

impl CommandInput for KeyInput {
    fn poll(&mut self, timeout: Duration) -> Option<char> {
        if !event::poll(timeout).ok()? {
            return None;
        }
        let Event::Key(key) = event::read().ok()? else {
            return None;
        };
        if key.kind != KeyEventKind::Press {
            return None;
        }
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Some('q'),
            KeyCode::Char(c) => Some(c),
            _ => None,
        }
    }
}
