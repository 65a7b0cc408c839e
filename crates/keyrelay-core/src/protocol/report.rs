//! The 9-byte keyboard report sent to a device's input server.
//!
//! Wire format:
//! ```text
//! [msg_type:1][modifiers:1][reserved:1][keycode:1][reserved:5]
//! ```
//! `msg_type` is always [`UHID_KEYBOARD_MSG_TYPE`].  A report with keycode 0
//! and no modifiers is the *release* report: it tells the device that every
//! key is up again.

use std::fmt;
use std::ops::BitOr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::keymap::{HidKeyCode, KeyTable};

/// Total length of a keyboard report in bytes.
pub const REPORT_LEN: usize = 9;

/// Message-type tag identifying a UHID keyboard report.
pub const UHID_KEYBOARD_MSG_TYPE: u8 = 100;

/// Errors produced by the key event codec.
///
/// None of these is fatal to a surrounding sequence: an unrecognised key skips
/// that one key and is reported to the caller.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The key name is not in the key table.
    #[error("unknown key: '{0}'")]
    UnrecognizedKey(String),

    /// A text character has no key in the table.
    #[error("no key for character {0:?}")]
    UnmappedChar(char),

    /// A byte slice was not exactly [`REPORT_LEN`] bytes long.
    #[error("keyboard report must be {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Byte 0 was not the keyboard report tag.
    #[error("unexpected message type: {0}")]
    UnexpectedMessageType(u8),

    /// One of the reserved bytes was non-zero.
    #[error("reserved byte {index} is non-zero")]
    NonZeroReserved { index: usize },
}

/// Bit values of the modifier byte.
pub struct ModifierFlags;

impl ModifierFlags {
    pub const CTRL: u8 = 0x01;
    pub const SHIFT: u8 = 0x02;
    pub const ALT: u8 = 0x04;
    pub const META: u8 = 0x08;
}

/// The set of modifier keys held during a key press.
///
/// Deserializes from the front-end's `modifiers` object; absent fields are
/// `false`.
///
/// ```rust
/// use keyrelay_core::protocol::Modifiers;
///
/// let mods = Modifiers::NONE.with_ctrl().with_shift();
/// assert_eq!(mods.mask(), 0x03);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Modifiers {
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub meta: bool,
}

impl Modifiers {
    /// No modifiers held.
    pub const NONE: Modifiers = Modifiers {
        ctrl: false,
        shift: false,
        alt: false,
        meta: false,
    };

    pub fn with_ctrl(mut self) -> Self {
        self.ctrl = true;
        self
    }

    pub fn with_shift(mut self) -> Self {
        self.shift = true;
        self
    }

    pub fn with_alt(mut self) -> Self {
        self.alt = true;
        self
    }

    pub fn with_meta(mut self) -> Self {
        self.meta = true;
        self
    }

    /// Returns the bitwise OR of the held modifiers' flag bits.
    pub fn mask(self) -> u8 {
        let mut mask = 0u8;
        if self.ctrl {
            mask |= ModifierFlags::CTRL;
        }
        if self.shift {
            mask |= ModifierFlags::SHIFT;
        }
        if self.alt {
            mask |= ModifierFlags::ALT;
        }
        if self.meta {
            mask |= ModifierFlags::META;
        }
        mask
    }

    /// Rebuilds a modifier set from a mask.  Bits above `META` are ignored.
    pub fn from_mask(mask: u8) -> Self {
        Self {
            ctrl: mask & ModifierFlags::CTRL != 0,
            shift: mask & ModifierFlags::SHIFT != 0,
            alt: mask & ModifierFlags::ALT != 0,
            meta: mask & ModifierFlags::META != 0,
        }
    }

    pub fn is_empty(self) -> bool {
        self == Self::NONE
    }
}

impl BitOr for Modifiers {
    type Output = Modifiers;

    fn bitor(self, rhs: Self) -> Self::Output {
        Modifiers {
            ctrl: self.ctrl || rhs.ctrl,
            shift: self.shift || rhs.shift,
            alt: self.alt || rhs.alt,
            meta: self.meta || rhs.meta,
        }
    }
}

/// One immutable keyboard report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyReport([u8; REPORT_LEN]);

impl KeyReport {
    /// The release report: tag only, every other byte zero.
    pub const RELEASE: KeyReport = KeyReport([UHID_KEYBOARD_MSG_TYPE, 0, 0, 0, 0, 0, 0, 0, 0]);

    /// Builds the press report for `key` with `modifiers` held.
    pub fn press(key: HidKeyCode, modifiers: Modifiers) -> Self {
        let mut bytes = [0u8; REPORT_LEN];
        bytes[0] = UHID_KEYBOARD_MSG_TYPE;
        bytes[1] = modifiers.mask();
        bytes[3] = key.as_u8();
        KeyReport(bytes)
    }

    /// Parses a report received as raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError`] if the slice has the wrong length, the wrong tag,
    /// or a non-zero reserved byte.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let array: [u8; REPORT_LEN] =
            bytes.try_into().map_err(|_| CodecError::InvalidLength {
                expected: REPORT_LEN,
                actual: bytes.len(),
            })?;
        if array[0] != UHID_KEYBOARD_MSG_TYPE {
            return Err(CodecError::UnexpectedMessageType(array[0]));
        }
        if let Some(index) = [2usize, 4, 5, 6, 7, 8].into_iter().find(|&i| array[i] != 0) {
            return Err(CodecError::NonZeroReserved { index });
        }
        Ok(KeyReport(array))
    }

    pub fn as_bytes(&self) -> &[u8; REPORT_LEN] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn message_type(&self) -> u8 {
        self.0[0]
    }

    pub fn modifier_mask(&self) -> u8 {
        self.0[1]
    }

    pub fn keycode(&self) -> u8 {
        self.0[3]
    }

    /// `true` for the all-keys-up report.
    pub fn is_release(&self) -> bool {
        *self == Self::RELEASE
    }

    /// The table key in byte 3, if any.
    pub fn key(&self) -> Option<HidKeyCode> {
        HidKeyCode::from_u8(self.keycode())
    }
}

impl fmt::Display for KeyReport {
    /// Renders `release`, `press A` or `press CTRL+SHIFT+TAB` for logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_release() {
            return f.write_str("release");
        }
        f.write_str("press ")?;
        let mods = Modifiers::from_mask(self.modifier_mask());
        for (held, name) in [
            (mods.ctrl, "CTRL"),
            (mods.shift, "SHIFT"),
            (mods.alt, "ALT"),
            (mods.meta, "META"),
        ] {
            if held {
                write!(f, "{name}+")?;
            }
        }
        match self.key() {
            Some(key) => f.write_str(key.name()),
            None => write!(f, "{:#04x}", self.keycode()),
        }
    }
}

/// A press report paired with the release that must follow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Keystroke {
    pub key: HidKeyCode,
    pub press: KeyReport,
    pub release: KeyReport,
}

impl Keystroke {
    pub fn new(key: HidKeyCode, modifiers: Modifiers) -> Self {
        Self {
            key,
            press: KeyReport::press(key, modifiers),
            release: KeyReport::RELEASE,
        }
    }

    /// Resolves `key_name` through the key table and builds its keystroke.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnrecognizedKey`] if the name is not in the table.
    pub fn from_name(key_name: &str, modifiers: Modifiers) -> Result<Self, CodecError> {
        KeyTable::lookup(key_name)
            .map(|key| Self::new(key, modifiers))
            .ok_or_else(|| CodecError::UnrecognizedKey(key_name.to_string()))
    }
}

/// Encodes the press report for a symbolic key name.
///
/// # Errors
///
/// Returns [`CodecError::UnrecognizedKey`] for names outside the key table.
/// Callers treat this as a no-op plus a diagnostic.
///
/// # Examples
///
/// ```rust
/// use keyrelay_core::protocol::{encode_press, Modifiers};
///
/// let report = encode_press("c", Modifiers::NONE.with_ctrl()).unwrap();
/// assert_eq!(report.as_bytes(), &[100, 0x01, 0, 0x06, 0, 0, 0, 0, 0]);
/// ```
pub fn encode_press(key_name: &str, modifiers: Modifiers) -> Result<KeyReport, CodecError> {
    Keystroke::from_name(key_name, modifiers).map(|stroke| stroke.press)
}

/// Returns the release report.
pub fn encode_release() -> KeyReport {
    KeyReport::RELEASE
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_report_layout() {
        // Arrange / Act
        let report = KeyReport::press(HidKeyCode::Tab, Modifiers::NONE.with_shift());

        // Assert
        assert_eq!(
            report.as_bytes(),
            &[UHID_KEYBOARD_MSG_TYPE, 0x02, 0, 0x2B, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_display_names_key_and_modifiers() {
        let press = encode_press("tab", Modifiers::NONE.with_ctrl().with_shift()).unwrap();
        assert_eq!(press.to_string(), "press CTRL+SHIFT+TAB");
        assert_eq!(press.key(), Some(HidKeyCode::Tab));
        assert_eq!(encode_release().to_string(), "release");

        let raw = KeyReport::decode(&[UHID_KEYBOARD_MSG_TYPE, 0, 0, 0x68, 0, 0, 0, 0, 0]).unwrap();
        assert_eq!(raw.key(), None);
        assert_eq!(raw.to_string(), "press 0x68");
    }

    #[test]
    fn test_release_report_is_tag_then_zeros() {
        let release = encode_release();
        assert_eq!(release.message_type(), UHID_KEYBOARD_MSG_TYPE);
        assert!(release.as_bytes()[1..].iter().all(|&b| b == 0));
        assert!(release.is_release());
    }

    #[test]
    fn test_encode_press_unknown_key_is_unrecognized() {
        let result = encode_press("HYPER", Modifiers::NONE);
        assert_eq!(result, Err(CodecError::UnrecognizedKey("HYPER".to_string())));
    }

    #[test]
    fn test_encode_press_accepts_lowercase_names() {
        let report = encode_press("escape", Modifiers::NONE).unwrap();
        assert_eq!(report.keycode(), 0x29);
    }

    #[test]
    fn test_modifier_mask_bits() {
        assert_eq!(Modifiers::NONE.with_ctrl().mask(), 0x01);
        assert_eq!(Modifiers::NONE.with_shift().mask(), 0x02);
        assert_eq!(Modifiers::NONE.with_alt().mask(), 0x04);
        assert_eq!(Modifiers::NONE.with_meta().mask(), 0x08);
        assert_eq!(Modifiers::NONE.mask(), 0x00);
    }

    #[test]
    fn test_modifier_mask_is_independent_of_order() {
        let a = Modifiers::NONE.with_alt().with_ctrl().with_meta();
        let b = Modifiers::NONE.with_meta().with_ctrl().with_alt();
        assert_eq!(a.mask(), b.mask());
        assert_eq!(a.mask(), 0x0D);
    }

    #[test]
    fn test_every_modifier_subset_masks_to_or_of_bits() {
        for mask in 0u8..16 {
            let mods = Modifiers::from_mask(mask);
            assert_eq!(mods.mask(), mask);
            let combined =
                Modifiers::from_mask(mask & 0b0011) | Modifiers::from_mask(mask & 0b1100);
            assert_eq!(combined, mods);
        }
    }

    #[test]
    fn test_modifiers_deserialize_with_missing_fields() {
        let mods: Modifiers = serde_json::from_str(r#"{"ctrl":true}"#).unwrap();
        assert_eq!(mods, Modifiers::NONE.with_ctrl());
    }

    #[test]
    fn test_decode_accepts_press_and_release() {
        let press = KeyReport::press(HidKeyCode::KeyH, Modifiers::NONE);
        assert_eq!(KeyReport::decode(press.as_bytes()), Ok(press));
        assert_eq!(
            KeyReport::decode(KeyReport::RELEASE.as_bytes()),
            Ok(KeyReport::RELEASE)
        );
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let result = KeyReport::decode(&[UHID_KEYBOARD_MSG_TYPE, 0, 0, 4]);
        assert_eq!(
            result,
            Err(CodecError::InvalidLength {
                expected: REPORT_LEN,
                actual: 4
            })
        );
    }

    #[test]
    fn test_decode_rejects_wrong_tag_and_reserved_bytes() {
        assert_eq!(
            KeyReport::decode(&[102, 0, 0, 4, 0, 0, 0, 0, 0]),
            Err(CodecError::UnexpectedMessageType(102))
        );
        assert_eq!(
            KeyReport::decode(&[UHID_KEYBOARD_MSG_TYPE, 0, 0, 4, 0, 0, 7, 0, 0]),
            Err(CodecError::NonZeroReserved { index: 6 })
        );
    }

    #[test]
    fn test_keystroke_pairs_press_with_release() {
        let stroke = Keystroke::from_name("ENTER", Modifiers::NONE).unwrap();
        assert_eq!(stroke.key, HidKeyCode::Enter);
        assert_eq!(stroke.press.keycode(), 0x28);
        assert!(stroke.release.is_release());
    }
}
