//! The relay's key table: symbolic key names and characters to HID keycodes.
//!
//! The table is static and read-only for the lifetime of the process.  Lookups
//! never allocate.

pub mod hid;

pub use hid::HidKeyCode;

/// Read-only lookup facade over [`HidKeyCode`].
pub struct KeyTable;

impl KeyTable {
    /// Resolves a symbolic key name (`"TAB"`, `"a"`, `"page_down"`) to its key.
    pub fn lookup(name: &str) -> Option<HidKeyCode> {
        HidKeyCode::from_name(name)
    }

    /// Resolves a single text character to the key that types it.
    ///
    /// A space maps to [`HidKeyCode::Space`]; letters map to their letter key
    /// regardless of case; every other character is looked up as a one-character
    /// key name, so digits resolve and punctuation does not.
    pub fn for_char(c: char) -> Option<HidKeyCode> {
        if c == ' ' {
            return Some(HidKeyCode::Space);
        }
        let mut buf = [0u8; 4];
        HidKeyCode::from_name(c.encode_utf8(&mut buf))
    }

    /// Iterates `(name, keycode)` pairs for every key in the table.
    pub fn entries() -> impl Iterator<Item = (&'static str, u8)> {
        HidKeyCode::ALL.iter().map(|key| (key.name(), key.as_u8()))
    }
}
