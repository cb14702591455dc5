//! evdev backend: reads `/dev/input/event*` keyboards for capture and writes
//! through a uinput virtual keyboard for playback.
//!
//! Works the same under X11 and Wayland. The user needs read access to the
//! input devices (usually membership in the `input` group) and write access
//! to `/dev/uinput`.

use super::{process_hook_slot, HookSlot, InputBackend, KeyHook, KeyTranslator};
use crate::error::{KsrError, Result};
use crate::event::{KeyState, NativeCode};
use crate::keymap::{self, UNKNOWN_KEY};
use crate::listener::KeyRecorder;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, Device, EventType, InputEvent, Key};
use std::borrow::Cow;
use std::fs;
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, warn};

const INPUT_DIR: &str = "/dev/input";
const POLL_INTERVAL: Duration = Duration::from_millis(10);

const KEY_RELEASE: i32 = 0;
const KEY_PRESS: i32 = 1;
const KEY_REPEAT: i32 = 2;

#[derive(Default)]
pub struct LinuxBackend {
    output: Mutex<Option<VirtualDevice>>,
}

impl std::fmt::Debug for LinuxBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ready = self.output.lock().map(|o| o.is_some()).unwrap_or(false);
        f.debug_struct("LinuxBackend")
            .field("output_ready", &ready)
            .finish()
    }
}

impl LinuxBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyTranslator for LinuxBackend {
    fn code_to_name(&self, code: NativeCode) -> Cow<'static, str> {
        Cow::Borrowed(keymap::linux::TABLE.name_of(code).unwrap_or(UNKNOWN_KEY))
    }

    fn name_to_code(&self, name: &str) -> Option<NativeCode> {
        keymap::linux::TABLE.code_of(name)
    }
}

/// Open every keyboard-like event device.
///
/// Fails with `PermissionDenied` when keyboards exist but none could be
/// opened because of missing access rights.
fn open_keyboards() -> Result<Vec<(PathBuf, Device)>> {
    let entries = fs::read_dir(INPUT_DIR).map_err(|e| {
        KsrError::unsupported_platform(format!("cannot list {}: {}", INPUT_DIR, e))
    })?;

    let mut keyboards = Vec::new();
    let mut denied = 0usize;

    for entry in entries.flatten() {
        let path = entry.path();
        let is_event_node = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("event"));
        if !is_event_node {
            continue;
        }

        match Device::open(&path) {
            Ok(device) => {
                let is_keyboard = device
                    .supported_keys()
                    .is_some_and(|keys| keys.contains(Key::KEY_A) && keys.contains(Key::KEY_ENTER));
                if is_keyboard {
                    debug!(
                        "Using keyboard {} ({})",
                        path.display(),
                        device.name().unwrap_or("unnamed")
                    );
                    keyboards.push((path, device));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => denied += 1,
            Err(e) => debug!("Skipping {}: {}", path.display(), e),
        }
    }

    if keyboards.is_empty() {
        if denied > 0 {
            return Err(KsrError::permission_denied(
                "keyboard monitoring",
                format!(
                    "{} input devices are not readable; add the user to the 'input' group",
                    denied
                ),
            ));
        }
        return Err(KsrError::unsupported_platform("no keyboard devices found"));
    }

    Ok(keyboards)
}

fn set_nonblocking(path: &Path, device: &Device) -> Result<()> {
    let fd = device.as_raw_fd();
    let rc = unsafe {
        let flags = libc::fcntl(fd, libc::F_GETFL);
        if flags < 0 {
            flags
        } else {
            libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK)
        }
    };
    if rc < 0 {
        let err = io::Error::last_os_error();
        return Err(KsrError::Io(io::Error::new(
            err.kind(),
            format!("{}: {}", path.display(), err),
        )));
    }
    Ok(())
}

/// Map a kernel event timestamp onto the monotonic clock.
fn event_instant(timestamp: SystemTime) -> Instant {
    let now = Instant::now();
    match SystemTime::now().duration_since(timestamp) {
        Ok(age) => now.checked_sub(age).unwrap_or(now),
        Err(_) => now,
    }
}

fn poll_keyboards(mut devices: Vec<(PathBuf, Device)>, sink: Arc<KeyRecorder>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Acquire) && !devices.is_empty() {
        devices.retain_mut(|(path, device)| match device.fetch_events() {
            Ok(events) => {
                for event in events {
                    if event.event_type() != EventType::KEY {
                        continue;
                    }
                    let pressed = match event.value() {
                        KEY_PRESS | KEY_REPEAT => true,
                        KEY_RELEASE => false,
                        _ => continue,
                    };
                    sink.handle_transition_at(event.code(), pressed, event_instant(event.timestamp()));
                }
                true
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(e) => {
                warn!("Keyboard {} went away: {}", path.display(), e);
                false
            }
        });

        thread::sleep(POLL_INTERVAL);
    }
}

struct EvdevHook {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl KeyHook for EvdevHook {
    fn uninstall(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        if thread.join().is_err() {
            error!("Keyboard polling thread panicked");
        }
        info!("Keyboard devices released");
    }
}

impl Drop for EvdevHook {
    fn drop(&mut self) {
        self.uninstall();
    }
}

fn build_virtual_keyboard() -> Result<VirtualDevice> {
    let mut keys = AttributeSet::<Key>::new();
    for code in keymap::linux::TABLE.codes() {
        keys.insert(Key::new(code));
    }

    let map_err = |e: io::Error| {
        if e.kind() == io::ErrorKind::PermissionDenied {
            KsrError::permission_denied("synthetic input", format!("/dev/uinput: {}", e))
        } else {
            KsrError::Io(e)
        }
    };

    let device = VirtualDeviceBuilder::new()
        .map_err(map_err)?
        .name("key-sequence-recorder")
        .with_keys(&keys)
        .map_err(map_err)?
        .build()
        .map_err(map_err)?;
    Ok(device)
}

impl InputBackend for LinuxBackend {
    fn hook_slot(&self) -> HookSlot {
        process_hook_slot()
    }

    fn check_permissions(&self) -> Result<()> {
        open_keyboards().map(|_| ())
    }

    fn install_hook(&self, sink: Arc<KeyRecorder>) -> Result<Box<dyn KeyHook>> {
        let keyboards = open_keyboards()?;
        for (path, device) in &keyboards {
            set_nonblocking(path, device)?;
        }
        info!("Listening on {} keyboard devices", keyboards.len());

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("ksr-evdev".to_string())
            .spawn(move || poll_keyboards(keyboards, sink, thread_stop))?;

        Ok(Box::new(EvdevHook {
            stop,
            thread: Some(thread),
        }))
    }

    fn prepare_output(&self) -> Result<()> {
        let mut output = self
            .output
            .lock()
            .map_err(|_| KsrError::playback("virtual keyboard lock poisoned"))?;
        if output.is_none() {
            *output = Some(build_virtual_keyboard()?);
            info!("Virtual keyboard created");
            // Give the compositor a moment to pick up the new device.
            thread::sleep(Duration::from_millis(200));
        }
        Ok(())
    }

    fn post_key(&self, code: NativeCode, state: KeyState) -> Result<()> {
        self.prepare_output()?;
        let mut output = self
            .output
            .lock()
            .map_err(|_| KsrError::playback("virtual keyboard lock poisoned"))?;
        let device = output
            .as_mut()
            .ok_or_else(|| KsrError::playback("virtual keyboard is not available"))?;

        let value = if state.is_down() { KEY_PRESS } else { KEY_RELEASE };
        device.emit(&[InputEvent::new(EventType::KEY, code, value)])?;
        Ok(())
    }
}
