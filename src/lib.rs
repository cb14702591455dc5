//! # Key Sequence Recorder
//!
//! Records system-wide keyboard key presses and releases with their timing,
//! then replays the sequence into whichever application has focus,
//! optionally repeated.
//!
//! ## Features
//!
//! - Global key capture on Windows (low-level hook), macOS (event tap) and
//!   Linux (evdev)
//! - Canonical key names shared by all platforms, so sequences move between
//!   machines
//! - Cancellable playback on a dedicated worker thread
//! - Global stop hotkey
//! - JSON sequence files and JSON configuration
//!
//! ## Example
//!
//! ```no_run
//! use key_sequence_recorder::{Controller, ControllerOptions, NativeBackend};
//!
//! let (mut controller, _notifications) =
//!     Controller::new(NativeBackend::new(), ControllerOptions::default()).unwrap();
//!
//! controller.start_recording().unwrap();
//! // ... type something ...
//! controller.stop_recording();
//!
//! controller.start_playback(3).unwrap();
//! ```
//!
//! ## Sequence files
//!
//! ```json
//! [
//!   {"key": "A", "state": "down", "delay": 0, "winKeyCode": 65},
//!   {"key": "A", "state": "up", "delay": 84, "winKeyCode": 65}
//! ]
//! ```

pub mod config;
pub mod controller;
pub mod error;
pub mod event;
pub mod global_hotkey;
pub mod keymap;
pub mod listener;
pub mod playback;
pub mod platform;
pub mod storage;
pub mod store;

pub use config::Config;
pub use controller::{Controller, ControllerOptions, Notification};
pub use error::{KsrError, Result};
pub use event::{KeyEvent, KeyState, NativeCode};
pub use self::global_hotkey::StopHotkey;
pub use keymap::UNKNOWN_KEY;
pub use listener::{GlobalKeyListener, KeyRecorder};
pub use playback::{
    PlaybackEngine, PlaybackOutcome, PlaybackReport, PlaybackTiming, PlaybackWorker,
    SyntheticEmitter,
};
pub use platform::{InputBackend, KeyTranslator, NativeBackend, SimulatedBackend};
pub use store::SequenceStore;
