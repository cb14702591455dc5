//! Win32 backend: `WH_KEYBOARD_LL` hook for capture, `SendInput` for playback.

use super::{process_hook_slot, HookSlot, InputBackend, KeyHook, KeyTranslator};
use crate::error::{KsrError, Result};
use crate::event::{KeyState, NativeCode};
use crate::keymap::{self, UNKNOWN_KEY};
use crate::listener::KeyRecorder;
use std::borrow::Cow;
use std::mem;
use std::ptr;
use std::sync::mpsc;
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};
use winapi::shared::minwindef::{DWORD, LPARAM, LRESULT, UINT, WPARAM};
use winapi::um::errhandlingapi::GetLastError;
use winapi::um::libloaderapi::GetModuleHandleW;
use winapi::um::processthreadsapi::GetCurrentThreadId;
use winapi::um::winuser::{
    CallNextHookEx, DispatchMessageW, GetKeyNameTextW, GetMessageW, MapVirtualKeyW,
    PostThreadMessageW, SendInput, SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx,
    HC_ACTION, INPUT, INPUT_KEYBOARD, KBDLLHOOKSTRUCT, KEYBDINPUT, KEYEVENTF_EXTENDEDKEY,
    KEYEVENTF_KEYUP, MAPVK_VK_TO_VSC, MSG, WH_KEYBOARD_LL, WM_KEYDOWN, WM_KEYUP, WM_QUIT,
    WM_SYSKEYDOWN, WM_SYSKEYUP,
};

/// Recorder fed by the low-level hook. The hook procedure has no user-data
/// slot, so it lives here while the process-wide hook token is held.
static SINK: RwLock<Option<Arc<KeyRecorder>>> = RwLock::new(None);

#[derive(Debug, Default)]
pub struct WindowsBackend;

impl WindowsBackend {
    pub fn new() -> Self {
        Self
    }
}

impl KeyTranslator for WindowsBackend {
    fn code_to_name(&self, code: NativeCode) -> Cow<'static, str> {
        if let Some(name) = keymap::windows::TABLE.name_of(code) {
            return Cow::Borrowed(name);
        }
        match key_name_text(code) {
            Some(name) => Cow::Owned(name),
            None => {
                debug!("Unmapped virtual-key code: {:#04x}", code);
                Cow::Borrowed(UNKNOWN_KEY)
            }
        }
    }

    fn name_to_code(&self, name: &str) -> Option<NativeCode> {
        keymap::windows::TABLE.code_of(name)
    }
}

/// Ask the keyboard layout for a display name of a key missing from the table.
fn key_name_text(code: NativeCode) -> Option<String> {
    let scan = unsafe { MapVirtualKeyW(UINT::from(code), MAPVK_VK_TO_VSC) };
    if scan == 0 {
        return None;
    }

    let mut lparam = (scan as i32) << 16;
    if keymap::windows::is_extended(code) {
        lparam |= 1 << 24;
    }

    let mut buffer = [0u16; 64];
    let len = unsafe { GetKeyNameTextW(lparam, buffer.as_mut_ptr(), buffer.len() as i32) };
    if len <= 0 {
        return None;
    }
    let name = String::from_utf16_lossy(&buffer[..len as usize]);
    if keymap::windows::is_unambiguous_layout_name(code, &name) {
        Some(name)
    } else {
        debug!("Layout name {:?} for {:#04x} shadows another key", name, code);
        None
    }
}

unsafe extern "system" fn keyboard_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code == HC_ACTION {
        let info = &*(lparam as *const KBDLLHOOKSTRUCT);
        let pressed = match wparam as UINT {
            WM_KEYDOWN | WM_SYSKEYDOWN => Some(true),
            WM_KEYUP | WM_SYSKEYUP => Some(false),
            _ => None,
        };

        if let (Some(pressed), Ok(vk)) = (pressed, NativeCode::try_from(info.vkCode)) {
            if let Ok(sink) = SINK.read() {
                if let Some(recorder) = sink.as_ref() {
                    recorder.handle_transition(vk, pressed);
                }
            }
        }
    }

    CallNextHookEx(ptr::null_mut(), code, wparam, lparam)
}

struct WindowsHook {
    thread_id: DWORD,
    thread: Option<JoinHandle<()>>,
}

impl KeyHook for WindowsHook {
    fn uninstall(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        unsafe {
            PostThreadMessageW(self.thread_id, WM_QUIT, 0, 0);
        }
        if thread.join().is_err() {
            error!("Keyboard hook thread panicked");
        }
        if let Ok(mut sink) = SINK.write() {
            sink.take();
        }
        info!("Keyboard hook removed");
    }
}

impl Drop for WindowsHook {
    fn drop(&mut self) {
        self.uninstall();
    }
}

/// Install the hook on its own thread and pump messages there until `WM_QUIT`.
fn run_hook_thread(ready: mpsc::Sender<std::result::Result<DWORD, DWORD>>) {
    let hook = unsafe {
        SetWindowsHookExW(
            WH_KEYBOARD_LL,
            Some(keyboard_proc),
            GetModuleHandleW(ptr::null()),
            0,
        )
    };

    if hook.is_null() {
        let _ = ready.send(Err(unsafe { GetLastError() }));
        return;
    }

    let _ = ready.send(Ok(unsafe { GetCurrentThreadId() }));

    unsafe {
        let mut msg: MSG = mem::zeroed();
        while GetMessageW(&mut msg, ptr::null_mut(), 0, 0) > 0 {
            TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }
        UnhookWindowsHookEx(hook);
    }
}

impl InputBackend for WindowsBackend {
    fn hook_slot(&self) -> HookSlot {
        process_hook_slot()
    }

    fn check_permissions(&self) -> Result<()> {
        // Low-level hooks need no grant on Windows; elevated windows
        // simply do not report to a non-elevated hook.
        Ok(())
    }

    fn install_hook(&self, sink: Arc<KeyRecorder>) -> Result<Box<dyn KeyHook>> {
        if let Ok(mut slot) = SINK.write() {
            *slot = Some(sink);
        }

        let (ready_tx, ready_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("ksr-keyboard-hook".to_string())
            .spawn(move || run_hook_thread(ready_tx))?;

        let reason = match ready_rx.recv() {
            Ok(Ok(thread_id)) => {
                info!("Keyboard hook installed");
                return Ok(Box::new(WindowsHook {
                    thread_id,
                    thread: Some(thread),
                }));
            }
            Ok(Err(code)) => format!("SetWindowsHookExW failed with error {}", code),
            Err(_) => "hook thread exited before reporting".to_string(),
        };

        let _ = thread.join();
        if let Ok(mut slot) = SINK.write() {
            slot.take();
        }
        Err(KsrError::permission_denied("keyboard hook", reason))
    }

    fn post_key(&self, code: NativeCode, state: KeyState) -> Result<()> {
        let mut flags = 0;
        if state == KeyState::Up {
            flags |= KEYEVENTF_KEYUP;
        }
        if keymap::windows::is_extended(code) {
            flags |= KEYEVENTF_EXTENDEDKEY;
        }

        let sent = unsafe {
            let mut input: INPUT = mem::zeroed();
            input.type_ = INPUT_KEYBOARD;
            *input.u.ki_mut() = KEYBDINPUT {
                wVk: code,
                wScan: MapVirtualKeyW(UINT::from(code), MAPVK_VK_TO_VSC) as u16,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            };
            SendInput(1, &mut input, mem::size_of::<INPUT>() as i32)
        };

        if sent != 1 {
            let code = unsafe { GetLastError() };
            warn!("SendInput was blocked (error {})", code);
            return Err(KsrError::permission_denied(
                "synthetic input",
                format!("SendInput failed with error {}", code),
            ));
        }
        Ok(())
    }
}
