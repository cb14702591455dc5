//! In-process backend that never touches the OS.
//!
//! Posted keys are collected instead of injected and key transitions are fed
//! in by hand. Used by `ksr play --dry-run` and throughout the tests.

use super::{HookSlot, InputBackend, KeyHook, KeyTranslator};
use crate::error::{KsrError, Result};
use crate::event::{KeyState, NativeCode};
use crate::keymap::{self, KeyTable, UNKNOWN_KEY};
use crate::listener::KeyRecorder;
use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

type SinkCell = Arc<Mutex<Option<Arc<KeyRecorder>>>>;

/// A key transition captured by [`SimulatedBackend::post_key`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedKey {
    pub code: NativeCode,
    pub state: KeyState,
    pub at: Instant,
}

#[derive(Debug)]
pub struct SimulatedBackend {
    table: &'static KeyTable,
    slot: HookSlot,
    sink: SinkCell,
    posted: Mutex<Vec<PostedKey>>,
    installs: AtomicUsize,
    deny_hook: bool,
    deny_output: bool,
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBackend {
    /// Simulates the native code space of the build target.
    pub fn new() -> Self {
        Self::with_table(keymap::native_table())
    }

    pub fn with_table(table: &'static KeyTable) -> Self {
        Self {
            table,
            slot: HookSlot::new(),
            sink: Arc::new(Mutex::new(None)),
            posted: Mutex::new(Vec::new()),
            installs: AtomicUsize::new(0),
            deny_hook: false,
            deny_output: false,
        }
    }

    /// Refuse hook installation as an OS without the input-monitoring grant would.
    pub fn deny_permissions(mut self) -> Self {
        self.deny_hook = true;
        self
    }

    /// Refuse synthetic input.
    pub fn deny_output(mut self) -> Self {
        self.deny_output = true;
        self
    }

    /// Deliver a native transition to the installed hook, if any.
    ///
    /// Returns whether a hook was installed to receive it.
    pub fn inject(&self, code: NativeCode, pressed: bool) -> bool {
        let sink = lock(&self.sink).clone();
        match sink {
            Some(recorder) => {
                recorder.handle_transition(code, pressed);
                true
            }
            None => false,
        }
    }

    pub fn press(&self, code: NativeCode) -> bool {
        self.inject(code, true)
    }

    pub fn release(&self, code: NativeCode) -> bool {
        self.inject(code, false)
    }

    pub fn is_hooked(&self) -> bool {
        lock(&self.sink).is_some()
    }

    /// Number of successful hook installations so far.
    pub fn hooks_installed(&self) -> usize {
        self.installs.load(Ordering::SeqCst)
    }

    pub fn posted(&self) -> Vec<PostedKey> {
        lock(&self.posted).clone()
    }

    /// Posted transitions rendered as `("A", Down)` pairs.
    pub fn posted_names(&self) -> Vec<(String, KeyState)> {
        self.posted()
            .into_iter()
            .map(|p| (self.code_to_name(p.code).into_owned(), p.state))
            .collect()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl KeyTranslator for SimulatedBackend {
    fn code_to_name(&self, code: NativeCode) -> Cow<'static, str> {
        Cow::Borrowed(self.table.name_of(code).unwrap_or(UNKNOWN_KEY))
    }

    fn name_to_code(&self, name: &str) -> Option<NativeCode> {
        self.table.code_of(name)
    }
}

struct SimulatedHook {
    sink: SinkCell,
}

impl KeyHook for SimulatedHook {
    fn uninstall(&mut self) {
        lock(&self.sink).take();
    }
}

impl Drop for SimulatedHook {
    fn drop(&mut self) {
        self.uninstall();
    }
}

impl InputBackend for SimulatedBackend {
    fn hook_slot(&self) -> HookSlot {
        self.slot.clone()
    }

    fn check_permissions(&self) -> Result<()> {
        if self.deny_hook {
            return Err(KsrError::permission_denied(
                "keyboard monitoring",
                "simulated denial",
            ));
        }
        Ok(())
    }

    fn install_hook(&self, sink: Arc<KeyRecorder>) -> Result<Box<dyn KeyHook>> {
        self.check_permissions()?;
        *lock(&self.sink) = Some(sink);
        self.installs.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SimulatedHook {
            sink: Arc::clone(&self.sink),
        }))
    }

    fn prepare_output(&self) -> Result<()> {
        if self.deny_output {
            return Err(KsrError::permission_denied(
                "synthetic input",
                "simulated denial",
            ));
        }
        Ok(())
    }

    fn post_key(&self, code: NativeCode, state: KeyState) -> Result<()> {
        self.prepare_output()?;
        debug!("simulated post: {} {}", code, state);
        lock(&self.posted).push(PostedKey {
            code,
            state,
            at: Instant::now(),
        });
        Ok(())
    }
}
