//! Quartz backend: a listen-only `CGEventTap` for capture and HID-level
//! `CGEvent` posting for playback.
//!
//! Both need the process to be granted Accessibility and Input Monitoring
//! in System Settings. A tap that cannot be created is the only reliable
//! signal that the grant is missing.

use super::{process_hook_slot, HookSlot, InputBackend, KeyHook, KeyTranslator};
use crate::error::{KsrError, Result};
use crate::event::{KeyState, NativeCode};
use crate::keymap::{self, UNKNOWN_KEY};
use crate::listener::KeyRecorder;
use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventType, CGKeyCode, EventField,
};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info};

const RUN_LOOP_SLICE: Duration = Duration::from_millis(50);

const CAPABILITY: &str = "keyboard monitoring (Accessibility and Input Monitoring)";

#[derive(Debug, Default)]
pub struct MacBackend;

impl MacBackend {
    pub fn new() -> Self {
        Self
    }
}

impl KeyTranslator for MacBackend {
    fn code_to_name(&self, code: NativeCode) -> Cow<'static, str> {
        Cow::Borrowed(keymap::macos::TABLE.name_of(code).unwrap_or(UNKNOWN_KEY))
    }

    fn name_to_code(&self, name: &str) -> Option<NativeCode> {
        keymap::macos::TABLE.code_of(name)
    }
}

/// Decode a tapped event into a key transition.
///
/// Modifiers never produce `KeyDown`/`KeyUp`; their direction is read from
/// the side-specific bit in the flags of the `FlagsChanged` event.
fn transition(event_type: CGEventType, event: &CGEvent) -> Option<(NativeCode, bool)> {
    let code = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
    let code = NativeCode::try_from(code).ok()?;
    match event_type {
        CGEventType::KeyDown => Some((code, true)),
        CGEventType::KeyUp => Some((code, false)),
        CGEventType::FlagsChanged => {
            keymap::macos::modifier_held(code, event.get_flags().bits()).map(|held| (code, held))
        }
        _ => None,
    }
}

struct MacHook {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl KeyHook for MacHook {
    fn uninstall(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        if thread.join().is_err() {
            error!("Event tap thread panicked");
        }
        info!("Event tap removed");
    }
}

impl Drop for MacHook {
    fn drop(&mut self) {
        self.uninstall();
    }
}

/// Create the tap on this thread and spin its run loop until `stop` is set.
fn run_event_tap(
    sink: Arc<KeyRecorder>,
    stop: Arc<AtomicBool>,
    ready: mpsc::Sender<std::result::Result<(), String>>,
) {
    let tap = CGEventTap::new(
        CGEventTapLocation::HID,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![
            CGEventType::KeyDown,
            CGEventType::KeyUp,
            CGEventType::FlagsChanged,
        ],
        move |_proxy, event_type, event| {
            if let Some((code, pressed)) = transition(event_type, event) {
                sink.handle_transition(code, pressed);
            }
            None
        },
    );

    let tap = match tap {
        Ok(tap) => tap,
        Err(()) => {
            let _ = ready.send(Err("event tap creation was refused".to_string()));
            return;
        }
    };

    let source = match tap.mach_port.create_runloop_source(0) {
        Ok(source) => source,
        Err(()) => {
            let _ = ready.send(Err("could not create a run loop source".to_string()));
            return;
        }
    };

    let run_loop = CFRunLoop::get_current();
    unsafe {
        run_loop.add_source(&source, kCFRunLoopCommonModes);
    }
    tap.enable();
    let _ = ready.send(Ok(()));

    while !stop.load(Ordering::Acquire) {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, RUN_LOOP_SLICE, true);
        }
    }

    unsafe {
        run_loop.remove_source(&source, kCFRunLoopCommonModes);
    }
}

impl InputBackend for MacBackend {
    fn hook_slot(&self) -> HookSlot {
        process_hook_slot()
    }

    fn check_permissions(&self) -> Result<()> {
        let probe = CGEventTap::new(
            CGEventTapLocation::HID,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::ListenOnly,
            vec![CGEventType::KeyDown],
            |_proxy, _event_type, _event| None,
        );
        match probe {
            Ok(_) => Ok(()),
            Err(()) => Err(KsrError::permission_denied(
                CAPABILITY,
                "grant access in System Settings > Privacy & Security, then restart",
            )),
        }
    }

    fn install_hook(&self, sink: Arc<KeyRecorder>) -> Result<Box<dyn KeyHook>> {
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_stop = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("ksr-event-tap".to_string())
            .spawn(move || run_event_tap(sink, thread_stop, ready_tx))?;

        let reason = match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("Event tap installed");
                return Ok(Box::new(MacHook {
                    stop,
                    thread: Some(thread),
                }));
            }
            Ok(Err(reason)) => reason,
            Err(_) => "event tap thread exited before reporting".to_string(),
        };

        let _ = thread.join();
        Err(KsrError::permission_denied(CAPABILITY, reason))
    }

    fn post_key(&self, code: NativeCode, state: KeyState) -> Result<()> {
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState).map_err(|_| {
            KsrError::permission_denied("synthetic input", "failed to create event source")
        })?;

        let event = CGEvent::new_keyboard_event(source, code as CGKeyCode, state.is_down())
            .map_err(|_| {
                KsrError::permission_denied("synthetic input", "failed to create keyboard event")
            })?;

        event.post(CGEventTapLocation::HID);
        debug!("Posted key {} {}", code, state);
        Ok(())
    }
}
