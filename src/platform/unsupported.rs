//! Fallback for targets without a keyboard backend. Names and codes are
//! still translated so sequences can be inspected, but capture and playback
//! report `UnsupportedPlatform`.

use super::{HookSlot, InputBackend, KeyHook, KeyTranslator};
use crate::error::{KsrError, Result};
use crate::event::{KeyState, NativeCode};
use crate::keymap::{self, UNKNOWN_KEY};
use crate::listener::KeyRecorder;
use std::borrow::Cow;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct UnsupportedBackend {
    slot: HookSlot,
}

impl UnsupportedBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn unsupported() -> KsrError {
    KsrError::unsupported_platform(std::env::consts::OS)
}

impl KeyTranslator for UnsupportedBackend {
    fn code_to_name(&self, code: NativeCode) -> Cow<'static, str> {
        Cow::Borrowed(keymap::native_table().name_of(code).unwrap_or(UNKNOWN_KEY))
    }

    fn name_to_code(&self, name: &str) -> Option<NativeCode> {
        keymap::native_table().code_of(name)
    }
}

impl InputBackend for UnsupportedBackend {
    fn hook_slot(&self) -> HookSlot {
        self.slot.clone()
    }

    fn check_permissions(&self) -> Result<()> {
        Err(unsupported())
    }

    fn install_hook(&self, _sink: Arc<KeyRecorder>) -> Result<Box<dyn KeyHook>> {
        Err(unsupported())
    }

    fn prepare_output(&self) -> Result<()> {
        Err(unsupported())
    }

    fn post_key(&self, _code: NativeCode, _state: KeyState) -> Result<()> {
        Err(unsupported())
    }
}
