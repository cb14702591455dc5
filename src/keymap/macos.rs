//! macOS virtual key codes (`kVK_*` from `HIToolbox/Events.h`), US ANSI layout.

use super::KeyTable;

pub static TABLE: KeyTable = KeyTable::new("macos", ENTRIES, false);

const ENTRIES: &[(u16, &str)] = &[
    (0x00, "A"),
    (0x01, "S"),
    (0x02, "D"),
    (0x03, "F"),
    (0x04, "H"),
    (0x05, "G"),
    (0x06, "Z"),
    (0x07, "X"),
    (0x08, "C"),
    (0x09, "V"),
    (0x0B, "B"),
    (0x0C, "Q"),
    (0x0D, "W"),
    (0x0E, "E"),
    (0x0F, "R"),
    (0x10, "Y"),
    (0x11, "T"),
    (0x12, "1"),
    (0x13, "2"),
    (0x14, "3"),
    (0x15, "4"),
    (0x16, "6"),
    (0x17, "5"),
    (0x18, "="),
    (0x19, "9"),
    (0x1A, "7"),
    (0x1B, "-"),
    (0x1C, "8"),
    (0x1D, "0"),
    (0x1E, "]"),
    (0x1F, "O"),
    (0x20, "U"),
    (0x21, "["),
    (0x22, "I"),
    (0x23, "P"),
    (0x24, "Enter"),
    (0x25, "L"),
    (0x26, "J"),
    (0x27, "'"),
    (0x28, "K"),
    (0x29, ";"),
    (0x2A, "\\"),
    (0x2B, ","),
    (0x2C, "/"),
    (0x2D, "N"),
    (0x2E, "M"),
    (0x2F, "."),
    (0x30, "Tab"),
    (0x31, "Space"),
    (0x32, "`"),
    (0x33, "Backspace"),
    (0x35, "Escape"),
    (0x36, "RMeta"),
    (0x37, "LMeta"),
    (0x38, "LShift"),
    (0x39, "CapsLock"),
    (0x3A, "LAlt"),
    (0x3B, "LCtrl"),
    (0x3C, "RShift"),
    (0x3D, "RAlt"),
    (0x3E, "RCtrl"),
    (0x41, "NumpadDecimal"),
    (0x43, "NumpadMultiply"),
    (0x45, "NumpadAdd"),
    (0x4B, "NumpadDivide"),
    (0x4C, "NumpadEnter"),
    (0x4E, "NumpadSubtract"),
    (0x52, "Numpad0"),
    (0x53, "Numpad1"),
    (0x54, "Numpad2"),
    (0x55, "Numpad3"),
    (0x56, "Numpad4"),
    (0x57, "Numpad5"),
    (0x58, "Numpad6"),
    (0x59, "Numpad7"),
    (0x5B, "Numpad8"),
    (0x5C, "Numpad9"),
    (0x60, "F5"),
    (0x61, "F6"),
    (0x62, "F7"),
    (0x63, "F3"),
    (0x64, "F8"),
    (0x65, "F9"),
    (0x67, "F11"),
    (0x6D, "F10"),
    (0x6F, "F12"),
    // kVK_Help sits where Insert is on PC keyboards.
    (0x72, "Insert"),
    (0x73, "Home"),
    (0x74, "PageUp"),
    (0x75, "Delete"),
    (0x76, "F4"),
    (0x77, "End"),
    (0x78, "F2"),
    (0x79, "PageDown"),
    (0x7A, "F1"),
    (0x7B, "Left"),
    (0x7C, "Right"),
    (0x7D, "Down"),
    (0x7E, "Up"),
];

/// Device-dependent modifier bits (`NX_DEVICE*KEYMASK`) in `CGEventFlags`.
/// The generic Shift/Control/Option/Command flags are shared by both sides,
/// so a key's own bit is the only reliable direction for `FlagsChanged`.
const MODIFIER_MASKS: &[(u16, u64)] = &[
    (0x3B, 0x0000_0001), // LCtrl
    (0x38, 0x0000_0002), // LShift
    (0x3C, 0x0000_0004), // RShift
    (0x37, 0x0000_0008), // LMeta
    (0x36, 0x0000_0010), // RMeta
    (0x3A, 0x0000_0020), // LAlt
    (0x3D, 0x0000_0040), // RAlt
    (0x3E, 0x0000_2000), // RCtrl
    (0x39, 0x0001_0000), // CapsLock (alpha shift)
];

/// Whether the modifier `code` is held according to raw event `flags`.
///
/// `None` for codes that are not modifiers.
pub fn modifier_held(code: u16, flags: u64) -> Option<bool> {
    MODIFIER_MASKS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, mask)| flags & mask != 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Generic Shift flag plus the device bits of the held sides.
    const SHIFT: u64 = 0x0002_0000;

    #[test]
    fn test_modifier_direction_per_side() {
        let lshift = TABLE.code_of("LShift").unwrap();
        let rshift = TABLE.code_of("RShift").unwrap();

        // LShift down, then RShift down while LShift is held.
        assert_eq!(modifier_held(lshift, SHIFT | 0x2), Some(true));
        assert_eq!(modifier_held(rshift, SHIFT | 0x2 | 0x4), Some(true));

        // LShift released while RShift is still held.
        assert_eq!(modifier_held(lshift, SHIFT | 0x4), Some(false));
        // RShift released last.
        assert_eq!(modifier_held(rshift, 0), Some(false));
    }

    #[test]
    fn test_every_table_modifier_has_a_mask() {
        for name in ["LCtrl", "RCtrl", "LShift", "RShift", "LAlt", "RAlt", "LMeta", "RMeta"] {
            let code = TABLE.code_of(name).unwrap();
            assert_eq!(modifier_held(code, 0), Some(false), "{}", name);
            assert_eq!(modifier_held(code, u64::MAX), Some(true), "{}", name);
        }
        assert_eq!(modifier_held(TABLE.code_of("A").unwrap(), u64::MAX), None);
    }
}
