//! Key-code translation between native code spaces and canonical key names.
//!
//! A canonical name is a platform-independent string such as `"A"`,
//! `"Enter"` or `"LShift"`. Each supported platform has one fixed
//! [`KeyTable`]; every table is compiled on every target so recordings
//! made on one platform can be inspected (and their tables tested) on any
//! other. [`native_table`] returns the table for the build target.
//!
//! Both lookups are pure. For every code a table knows,
//! `code_of(name_of(code)) == Some(code)`.

pub mod linux;
pub mod macos;
pub mod windows;

use crate::event::NativeCode;

/// Name produced for native codes that no table entry or OS fallback can
/// resolve. Events carrying it are never stored.
pub const UNKNOWN_KEY: &str = "Unknown";

const ALPHANUMERIC: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Alternative spellings accepted when resolving a name to a code.
const ALIASES: &[(&str, &str)] = &[
    ("Esc", "Escape"),
    ("Return", "Enter"),
    ("\n", "Enter"),
    ("\r", "Enter"),
    (" ", "Space"),
    ("Del", "Delete"),
    ("Ins", "Insert"),
    ("PgUp", "PageUp"),
    ("PgDn", "PageDown"),
    ("ArrowUp", "Up"),
    ("ArrowDown", "Down"),
    ("ArrowLeft", "Left"),
    ("ArrowRight", "Right"),
    ("Control", "Ctrl"),
    ("Option", "LAlt"),
    ("ROption", "RAlt"),
    ("Cmd", "LMeta"),
    ("LCmd", "LMeta"),
    ("RCmd", "RMeta"),
    ("Win", "LMeta"),
    ("LWin", "LMeta"),
    ("RWin", "RMeta"),
    ("Super", "LMeta"),
];

/// Side-less modifier names fall back to the left-hand key on tables that
/// only distinguish sides.
const GENERIC_MODIFIERS: &[(&str, &str)] = &[
    ("Shift", "LShift"),
    ("Ctrl", "LCtrl"),
    ("Alt", "LAlt"),
    ("Meta", "LMeta"),
];

/// A fixed bidirectional mapping for one native key code space.
#[derive(Debug)]
pub struct KeyTable {
    platform: &'static str,
    entries: &'static [(NativeCode, &'static str)],
    /// Native codes for `'A'..='Z'` and `'0'..='9'` equal their ASCII values.
    ascii_alphanumeric: bool,
}

impl KeyTable {
    pub const fn new(
        platform: &'static str,
        entries: &'static [(NativeCode, &'static str)],
        ascii_alphanumeric: bool,
    ) -> Self {
        Self {
            platform,
            entries,
            ascii_alphanumeric,
        }
    }

    pub fn platform(&self) -> &'static str {
        self.platform
    }

    /// Canonical name for a native code, or `None` when the table has no entry.
    pub fn name_of(&self, code: NativeCode) -> Option<&'static str> {
        if self.ascii_alphanumeric {
            if let Some(name) = ascii_name(code) {
                return Some(name);
            }
        }
        self.entries
            .iter()
            .find(|(c, _)| *c == code)
            .map(|(_, name)| *name)
    }

    /// Native code for a canonical name (or an accepted alias).
    ///
    /// Matching ignores ASCII case, so lower-case letter names written by
    /// older recordings still resolve.
    pub fn code_of(&self, name: &str) -> Option<NativeCode> {
        let name = ALIASES
            .iter()
            .find(|(alias, _)| alias.eq_ignore_ascii_case(name))
            .map_or(name, |(_, canonical)| *canonical);

        self.lookup(name).or_else(|| {
            GENERIC_MODIFIERS
                .iter()
                .find(|(generic, _)| generic.eq_ignore_ascii_case(name))
                .and_then(|(_, sided)| self.lookup(sided))
        })
    }

    fn lookup(&self, name: &str) -> Option<NativeCode> {
        if self.ascii_alphanumeric {
            if let [byte] = name.as_bytes() {
                if byte.is_ascii_alphanumeric() {
                    return Some(NativeCode::from(byte.to_ascii_uppercase()));
                }
            }
        }
        self.entries
            .iter()
            .find(|(_, n)| n.eq_ignore_ascii_case(name))
            .map(|(code, _)| *code)
    }

    /// Every native code the table can name, letters and digits first.
    pub fn codes(&self) -> Vec<NativeCode> {
        let mut codes: Vec<NativeCode> = if self.ascii_alphanumeric {
            ALPHANUMERIC.bytes().map(NativeCode::from).collect()
        } else {
            Vec::new()
        };
        codes.extend(self.entries.iter().map(|(code, _)| *code));
        codes
    }

    /// Every canonical name the table can produce.
    pub fn names(&self) -> Vec<&'static str> {
        self.codes()
            .into_iter()
            .filter_map(|code| self.name_of(code))
            .collect()
    }
}

fn ascii_name(code: NativeCode) -> Option<&'static str> {
    let byte = u8::try_from(code).ok()?;
    let index = usize::from(match byte {
        b'0'..=b'9' => byte - b'0',
        b'A'..=b'Z' => byte - b'A' + 10,
        _ => return None,
    });
    Some(&ALPHANUMERIC[index..index + 1])
}

/// The key table for the platform this crate was built for.
pub fn native_table() -> &'static KeyTable {
    #[cfg(windows)]
    {
        &windows::TABLE
    }
    #[cfg(target_os = "macos")]
    {
        &macos::TABLE
    }
    #[cfg(not(any(windows, target_os = "macos")))]
    {
        &linux::TABLE
    }
}

/// All tables, for tooling that inspects recordings from any platform.
pub fn all_tables() -> [&'static KeyTable; 3] {
    [&windows::TABLE, &macos::TABLE, &linux::TABLE]
}
