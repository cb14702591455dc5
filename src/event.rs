//! Recorded key transitions and helpers over whole sequences.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform-specific numeric key identifier.
///
/// Windows virtual-key codes, macOS `CGKeyCode`s and Linux evdev key codes
/// all fit in 16 bits.
pub type NativeCode = u16;

/// Name of the platform-specific code field in persisted sequences.
#[cfg(windows)]
pub const NATIVE_CODE_FIELD: &str = "winKeyCode";
#[cfg(target_os = "macos")]
pub const NATIVE_CODE_FIELD: &str = "macKeyCode";
#[cfg(not(any(windows, target_os = "macos")))]
pub const NATIVE_CODE_FIELD: &str = "linuxKeyCode";

/// Direction of a key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyState {
    Down,
    Up,
}

impl KeyState {
    pub fn from_pressed(pressed: bool) -> Self {
        if pressed {
            Self::Down
        } else {
            Self::Up
        }
    }

    pub fn is_down(self) -> bool {
        self == Self::Down
    }
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Down => f.write_str("down"),
            Self::Up => f.write_str("up"),
        }
    }
}

/// One recorded key transition.
///
/// `delay` is the number of milliseconds since the previous recorded event
/// (for the first event, since recording started). `native_code` is the
/// platform code captured at record time; it is absent for sequences loaded
/// from a file written on another platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: String,
    pub state: KeyState,
    pub delay: u64,
    #[cfg_attr(windows, serde(rename = "winKeyCode"))]
    #[cfg_attr(target_os = "macos", serde(rename = "macKeyCode"))]
    #[cfg_attr(not(any(windows, target_os = "macos")), serde(rename = "linuxKeyCode"))]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_code: Option<NativeCode>,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>, state: KeyState, delay: u64) -> Self {
        Self {
            key: key.into(),
            state,
            delay,
            native_code: None,
        }
    }

    pub fn with_native_code(mut self, code: NativeCode) -> Self {
        self.native_code = Some(code);
        self
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key {} {} (wait {}ms)", self.key, self.state, self.delay)
    }
}

/// Sum of all recorded delays in milliseconds.
pub fn total_delay_ms(events: &[KeyEvent]) -> u64 {
    events.iter().map(|e| e.delay).sum()
}

/// Render a human-readable listing of a sequence followed by a summary block.
pub fn summarize(events: &[KeyEvent]) -> String {
    if events.is_empty() {
        return "No sequence recorded.\n".to_string();
    }

    let mut text = String::new();
    for event in events {
        text.push_str(&event.to_string());
        text.push('\n');
    }

    let total = total_delay_ms(events);
    text.push_str("\n--- Summary ---\n");
    text.push_str(&format!("Total events: {}\n", events.len()));
    text.push_str(&format!(
        "Total time: {}ms ({:.2}s)\n",
        total,
        total as f64 / 1000.0
    ));
    text
}

/// Drop the trailing run of key-down events.
///
/// When recording is stopped from the keyboard, the presses of the stop
/// chord are captured but their releases are not. Replaying them would leave
/// those keys logically held in the target application.
pub fn trim_dangling_presses(events: &mut Vec<KeyEvent>) -> usize {
    let keep = events
        .iter()
        .rposition(|e| !e.state.is_down())
        .map_or(0, |i| i + 1);
    let removed = events.len() - keep;
    events.truncate(keep);
    removed
}
