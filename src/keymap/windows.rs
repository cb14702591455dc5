//! Windows virtual-key codes.
//!
//! Letters and digits use their ASCII values as virtual-key codes and are
//! resolved by the table's alphanumeric fast path rather than listed here.

use super::KeyTable;

pub static TABLE: KeyTable = KeyTable::new("windows", ENTRIES, true);

const ENTRIES: &[(u16, &str)] = &[
    (0x08, "Backspace"),
    (0x09, "Tab"),
    (0x0D, "Enter"),
    (0x10, "Shift"),
    (0x11, "Ctrl"),
    (0x12, "Alt"),
    (0x13, "Pause"),
    (0x14, "CapsLock"),
    (0x1B, "Escape"),
    (0x20, "Space"),
    (0x21, "PageUp"),
    (0x22, "PageDown"),
    (0x23, "End"),
    (0x24, "Home"),
    (0x25, "Left"),
    (0x26, "Up"),
    (0x27, "Right"),
    (0x28, "Down"),
    (0x2C, "PrintScreen"),
    (0x2D, "Insert"),
    (0x2E, "Delete"),
    (0x5B, "LMeta"),
    (0x5C, "RMeta"),
    (0x5D, "Apps"),
    (0x60, "Numpad0"),
    (0x61, "Numpad1"),
    (0x62, "Numpad2"),
    (0x63, "Numpad3"),
    (0x64, "Numpad4"),
    (0x65, "Numpad5"),
    (0x66, "Numpad6"),
    (0x67, "Numpad7"),
    (0x68, "Numpad8"),
    (0x69, "Numpad9"),
    (0x6A, "NumpadMultiply"),
    (0x6B, "NumpadAdd"),
    (0x6C, "NumpadSeparator"),
    (0x6D, "NumpadSubtract"),
    (0x6E, "NumpadDecimal"),
    (0x6F, "NumpadDivide"),
    (0x70, "F1"),
    (0x71, "F2"),
    (0x72, "F3"),
    (0x73, "F4"),
    (0x74, "F5"),
    (0x75, "F6"),
    (0x76, "F7"),
    (0x77, "F8"),
    (0x78, "F9"),
    (0x79, "F10"),
    (0x7A, "F11"),
    (0x7B, "F12"),
    (0x90, "NumLock"),
    (0x91, "ScrollLock"),
    (0xA0, "LShift"),
    (0xA1, "RShift"),
    (0xA2, "LCtrl"),
    (0xA3, "RCtrl"),
    (0xA4, "LAlt"),
    (0xA5, "RAlt"),
    (0xBA, ";"),
    (0xBB, "="),
    (0xBC, ","),
    (0xBD, "-"),
    (0xBE, "."),
    (0xBF, "/"),
    (0xC0, "`"),
    (0xDB, "["),
    (0xDC, "\\"),
    (0xDD, "]"),
    (0xDE, "'"),
];

/// Keys that need `KEYEVENTF_EXTENDEDKEY` when injected.
pub fn is_extended(code: u16) -> bool {
    matches!(
        code,
        0x03 // Cancel (Pause/Break)
            | 0x21..=0x28 // PageUp, PageDown, End, Home, arrows
            | 0x2C // PrintScreen
            | 0x2D
            | 0x2E
            | 0x6F // NumpadDivide
            | 0x90 // NumLock
            | 0xA3 // RCtrl
            | 0xA5 // RAlt
    )
}

/// Whether a keyboard-layout display name can stand for `code` in a saved
/// sequence. A name that the table resolves to a different key (the ISO
/// `OEM_102` key is labelled `\` on many layouts) would replay as that key.
pub fn is_unambiguous_layout_name(code: u16, name: &str) -> bool {
    !name.trim().is_empty() && TABLE.code_of(name).is_none_or(|known| known == code)
}
