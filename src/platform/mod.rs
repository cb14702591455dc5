//! Native keyboard interception and injection.
//!
//! Every platform implements the same [`InputBackend`] capability set:
//! translate native codes in and out ([`KeyTranslator`]), install a global
//! key hook, and post synthetic key transitions. Exactly one variant is
//! exported as [`NativeBackend`] for the build target. The listener and the
//! playback engine are written against the traits only.

use crate::error::{KsrError, Result};
use crate::event::{KeyState, NativeCode};
use crate::listener::KeyRecorder;
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

mod simulated;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg(not(any(windows, target_os = "macos", target_os = "linux")))]
mod unsupported;
#[cfg(windows)]
mod windows;

#[cfg(target_os = "linux")]
pub use linux::LinuxBackend as NativeBackend;
#[cfg(target_os = "macos")]
pub use macos::MacBackend as NativeBackend;
#[cfg(not(any(windows, target_os = "macos", target_os = "linux")))]
pub use unsupported::UnsupportedBackend as NativeBackend;
#[cfg(windows)]
pub use windows::WindowsBackend as NativeBackend;

pub use simulated::{PostedKey, SimulatedBackend};

/// Bidirectional mapping between native key codes and canonical names.
pub trait KeyTranslator: Send + Sync {
    /// Canonical name for `code`, or [`UNKNOWN_KEY`](crate::keymap::UNKNOWN_KEY).
    fn code_to_name(&self, code: NativeCode) -> Cow<'static, str>;

    /// Native code for a canonical name; `None` when the name is unrecognized.
    fn name_to_code(&self, name: &str) -> Option<NativeCode>;
}

/// An installed system-wide keyboard hook.
///
/// Implementations also uninstall on drop, so the OS resource is released on
/// every exit path.
pub trait KeyHook: Send {
    /// Remove the hook and wait for its callback context to finish.
    /// Calling it twice is harmless.
    fn uninstall(&mut self);
}

/// Platform capabilities needed by the recorder and the playback engine.
pub trait InputBackend: KeyTranslator + 'static {
    /// Slot guarding the single hook this backend may have installed.
    fn hook_slot(&self) -> HookSlot;

    /// Probe whether global key interception is authorized.
    fn check_permissions(&self) -> Result<()>;

    /// Install a global hook delivering every key transition to `sink`.
    ///
    /// Fails synchronously with [`KsrError::PermissionDenied`] when the OS
    /// refuses the interception capability.
    fn install_hook(&self, sink: Arc<KeyRecorder>) -> Result<Box<dyn KeyHook>>;

    /// Acquire whatever synthetic input requires before playback starts.
    fn prepare_output(&self) -> Result<()> {
        Ok(())
    }

    /// Post one synthetic hardware-level key transition.
    fn post_key(&self, code: NativeCode, state: KeyState) -> Result<()>;
}

/// Registration slot for a global keyboard hook.
///
/// Native backends share one process-wide slot, so at most one listener can
/// be running per process; claiming it yields the [`HookToken`] a running
/// listener must hold.
#[derive(Debug, Clone, Default)]
pub struct HookSlot(Arc<AtomicBool>);

impl HookSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self) -> Result<HookToken> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| KsrError::ListenerBusy)?;
        Ok(HookToken(Arc::clone(&self.0)))
    }

    pub fn is_claimed(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Proof of ownership of a [`HookSlot`]; released on drop.
#[derive(Debug)]
pub struct HookToken(Arc<AtomicBool>);

impl Drop for HookToken {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(any(windows, target_os = "macos", target_os = "linux"))]
fn process_hook_slot() -> HookSlot {
    use std::sync::OnceLock;

    static SLOT: OnceLock<HookSlot> = OnceLock::new();
    SLOT.get_or_init(HookSlot::new).clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_slot_single_owner() {
        let slot = HookSlot::new();
        let token = slot.claim().unwrap();
        assert!(slot.is_claimed());
        assert!(matches!(slot.clone().claim(), Err(KsrError::ListenerBusy)));

        drop(token);
        assert!(!slot.is_claimed());
        assert!(slot.claim().is_ok());
    }
}
