//! Global stop hotkey for the command line.
//!
//! Recording and playback both run until the user presses the configured
//! hotkey (`ctrl+alt+s` by default), even while another window has focus.

use crate::error::{KsrError, Result};
use global_hotkey::hotkey::{Code, HotKey, Modifiers};
use global_hotkey::{GlobalHotKeyEvent, GlobalHotKeyManager, HotKeyState};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct StopHotkey {
    manager: GlobalHotKeyManager,
    hotkey: HotKey,
    label: String,
    running: Arc<AtomicBool>,
}

impl StopHotkey {
    /// Parse and register `hotkey_str` system-wide.
    pub fn register(hotkey_str: &str) -> Result<Self> {
        let hotkey = parse_hotkey(hotkey_str)?;
        let manager = GlobalHotKeyManager::new()
            .map_err(|e| KsrError::hotkey(format!("failed to create hotkey manager: {}", e)))?;

        manager.register(hotkey).map_err(|e| {
            KsrError::hotkey(format!("failed to register hotkey '{}': {}", hotkey_str, e))
        })?;

        info!("Stop hotkey '{}' registered", hotkey_str);
        Ok(Self {
            manager,
            hotkey,
            label: hotkey_str.to_string(),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Start forwarding hotkey presses; one `()` arrives per press.
    ///
    /// The polling task ends when the receiver is dropped or the hotkey is
    /// unregistered. Must be called from within a tokio runtime.
    pub fn presses(&self) -> UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let receiver = GlobalHotKeyEvent::receiver();
        let id = self.hotkey.id();
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::Release);

        tokio::task::spawn_blocking(move || {
            while running.load(Ordering::Acquire) && !tx.is_closed() {
                if let Ok(event) = receiver.try_recv() {
                    if event.id == id && event.state == HotKeyState::Pressed {
                        debug!("Stop hotkey pressed");
                        if tx.send(()).is_err() {
                            break;
                        }
                    }
                }

                std::thread::sleep(POLL_INTERVAL);
            }
        });

        rx
    }
}

impl Drop for StopHotkey {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Err(e) = self.manager.unregister(self.hotkey) {
            warn!("Failed to unregister hotkey '{}': {}", self.label, e);
        }
    }
}

/// Parse a hotkey such as `ctrl+alt+s` or `shift+f9`.
pub fn parse_hotkey(hotkey_str: &str) -> Result<HotKey> {
    let binding = hotkey_str.to_lowercase();
    let parts: Vec<&str> = binding
        .split('+')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();

    if parts.is_empty() {
        return Err(KsrError::hotkey("empty hotkey string"));
    }

    let mut modifiers = Modifiers::empty();
    let mut key_code = None;

    for part in &parts {
        match *part {
            "ctrl" | "control" => modifiers |= Modifiers::CONTROL,
            "alt" | "option" => modifiers |= Modifiers::ALT,
            "shift" => modifiers |= Modifiers::SHIFT,
            "meta" | "cmd" | "super" | "win" => modifiers |= Modifiers::SUPER,
            key => {
                if key_code.is_some() {
                    return Err(KsrError::hotkey(format!(
                        "multiple keys specified in hotkey: {}",
                        hotkey_str
                    )));
                }
                key_code = Some(parse_key_code(key)?);
            }
        }
    }

    let code = key_code
        .ok_or_else(|| KsrError::hotkey(format!("no key specified in hotkey: {}", hotkey_str)))?;

    let modifiers = if modifiers.is_empty() {
        None
    } else {
        Some(modifiers)
    };
    Ok(HotKey::new(modifiers, code))
}

fn parse_key_code(key: &str) -> Result<Code> {
    let code = match key {
        // Letters
        "a" => Code::KeyA,
        "b" => Code::KeyB,
        "c" => Code::KeyC,
        "d" => Code::KeyD,
        "e" => Code::KeyE,
        "f" => Code::KeyF,
        "g" => Code::KeyG,
        "h" => Code::KeyH,
        "i" => Code::KeyI,
        "j" => Code::KeyJ,
        "k" => Code::KeyK,
        "l" => Code::KeyL,
        "m" => Code::KeyM,
        "n" => Code::KeyN,
        "o" => Code::KeyO,
        "p" => Code::KeyP,
        "q" => Code::KeyQ,
        "r" => Code::KeyR,
        "s" => Code::KeyS,
        "t" => Code::KeyT,
        "u" => Code::KeyU,
        "v" => Code::KeyV,
        "w" => Code::KeyW,
        "x" => Code::KeyX,
        "y" => Code::KeyY,
        "z" => Code::KeyZ,

        // Numbers
        "0" => Code::Digit0,
        "1" => Code::Digit1,
        "2" => Code::Digit2,
        "3" => Code::Digit3,
        "4" => Code::Digit4,
        "5" => Code::Digit5,
        "6" => Code::Digit6,
        "7" => Code::Digit7,
        "8" => Code::Digit8,
        "9" => Code::Digit9,

        // Function keys
        "f1" => Code::F1,
        "f2" => Code::F2,
        "f3" => Code::F3,
        "f4" => Code::F4,
        "f5" => Code::F5,
        "f6" => Code::F6,
        "f7" => Code::F7,
        "f8" => Code::F8,
        "f9" => Code::F9,
        "f10" => Code::F10,
        "f11" => Code::F11,
        "f12" => Code::F12,

        "space" => Code::Space,
        "enter" | "return" => Code::Enter,
        "tab" => Code::Tab,
        "escape" | "esc" => Code::Escape,
        "backspace" => Code::Backspace,
        "delete" => Code::Delete,
        "insert" => Code::Insert,
        "home" => Code::Home,
        "end" => Code::End,
        "pageup" => Code::PageUp,
        "pagedown" => Code::PageDown,
        "pause" => Code::Pause,

        "up" | "arrowup" => Code::ArrowUp,
        "down" | "arrowdown" => Code::ArrowDown,
        "left" | "arrowleft" => Code::ArrowLeft,
        "right" | "arrowright" => Code::ArrowRight,

        _ => return Err(KsrError::hotkey(format!("unsupported key: {}", key))),
    };

    Ok(code)
}
