//! USB HID Usage IDs (page 0x07, Keyboard/Keypad page) for the keys a device
//! can be driven with.
//!
//! The remote input server expects raw HID keycodes inside each keyboard
//! report, so this is the only key representation the relay needs.
//!
//! Reference: USB HID Usage Tables 1.3, Section 10 (Keyboard/Keypad page 0x07).
//!
//! # What is a HID Usage ID? (for beginners)
//!
//! The **USB Human Interface Device (HID)** standard assigns a unique number to
//! every key on a keyboard.  These numbers are called *Usage IDs*.  For example:
//!
//! | Key          | HID Usage ID |
//! |--------------|-------------|
//! | Letter A     | 0x04        |
//! | Letter B     | 0x05        |
//! | Enter        | 0x28        |
//! | Space        | 0x2C        |
//!
//! Notice that HID codes for letters start at 0x04 (not at 'A'=0x41 like ASCII).
//! HID codes represent **physical key positions**, not characters: the letter
//! key for `A` types `a` unless Shift is part of the report's modifier mask.
//!
//! # Symbolic names
//!
//! Every variant also has an uppercase symbolic name (`"A"`, `"7"`,
//! `"PAGE_UP"`, `"RIGHT"`).  Front-ends address keys by these names; see
//! [`HidKeyCode::from_name`].

use serde::{Deserialize, Serialize};

/// USB HID Usage ID for the keys in the relay's key table.
///
/// The numeric value of each variant is its HID Usage ID on the keyboard page.
/// Every usage in this table fits in one byte, which is what the keyboard
/// report carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum HidKeyCode {
    // Letters (HID 0x04–0x1D)
    KeyA = 0x04,
    KeyB = 0x05,
    KeyC = 0x06,
    KeyD = 0x07,
    KeyE = 0x08,
    KeyF = 0x09,
    KeyG = 0x0A,
    KeyH = 0x0B,
    KeyI = 0x0C,
    KeyJ = 0x0D,
    KeyK = 0x0E,
    KeyL = 0x0F,
    KeyM = 0x10,
    KeyN = 0x11,
    KeyO = 0x12,
    KeyP = 0x13,
    KeyQ = 0x14,
    KeyR = 0x15,
    KeyS = 0x16,
    KeyT = 0x17,
    KeyU = 0x18,
    KeyV = 0x19,
    KeyW = 0x1A,
    KeyX = 0x1B,
    KeyY = 0x1C,
    KeyZ = 0x1D,

    // Digits (HID 0x1E–0x27)
    Digit1 = 0x1E,
    Digit2 = 0x1F,
    Digit3 = 0x20,
    Digit4 = 0x21,
    Digit5 = 0x22,
    Digit6 = 0x23,
    Digit7 = 0x24,
    Digit8 = 0x25,
    Digit9 = 0x26,
    Digit0 = 0x27,

    // Control keys
    Enter = 0x28,
    Escape = 0x29,
    Backspace = 0x2A,
    Tab = 0x2B,
    Space = 0x2C,

    // Navigation cluster (HID 0x4A–0x52)
    Home = 0x4A,
    PageUp = 0x4B,
    Delete = 0x4C,
    End = 0x4D,
    PageDown = 0x4E,
    ArrowRight = 0x4F,
    ArrowLeft = 0x50,
    ArrowDown = 0x51,
    ArrowUp = 0x52,
}

impl HidKeyCode {
    /// Every key in the table, in HID order.
    pub const ALL: [HidKeyCode; 50] = [
        HidKeyCode::KeyA,
        HidKeyCode::KeyB,
        HidKeyCode::KeyC,
        HidKeyCode::KeyD,
        HidKeyCode::KeyE,
        HidKeyCode::KeyF,
        HidKeyCode::KeyG,
        HidKeyCode::KeyH,
        HidKeyCode::KeyI,
        HidKeyCode::KeyJ,
        HidKeyCode::KeyK,
        HidKeyCode::KeyL,
        HidKeyCode::KeyM,
        HidKeyCode::KeyN,
        HidKeyCode::KeyO,
        HidKeyCode::KeyP,
        HidKeyCode::KeyQ,
        HidKeyCode::KeyR,
        HidKeyCode::KeyS,
        HidKeyCode::KeyT,
        HidKeyCode::KeyU,
        HidKeyCode::KeyV,
        HidKeyCode::KeyW,
        HidKeyCode::KeyX,
        HidKeyCode::KeyY,
        HidKeyCode::KeyZ,
        HidKeyCode::Digit1,
        HidKeyCode::Digit2,
        HidKeyCode::Digit3,
        HidKeyCode::Digit4,
        HidKeyCode::Digit5,
        HidKeyCode::Digit6,
        HidKeyCode::Digit7,
        HidKeyCode::Digit8,
        HidKeyCode::Digit9,
        HidKeyCode::Digit0,
        HidKeyCode::Enter,
        HidKeyCode::Escape,
        HidKeyCode::Backspace,
        HidKeyCode::Tab,
        HidKeyCode::Space,
        HidKeyCode::Home,
        HidKeyCode::PageUp,
        HidKeyCode::Delete,
        HidKeyCode::End,
        HidKeyCode::PageDown,
        HidKeyCode::ArrowRight,
        HidKeyCode::ArrowLeft,
        HidKeyCode::ArrowDown,
        HidKeyCode::ArrowUp,
    ];

    /// Returns the one-byte HID usage carried in byte 3 of a keyboard report.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns the uppercase symbolic name front-ends use for this key.
    pub fn name(self) -> &'static str {
        match self {
            HidKeyCode::KeyA => "A",
            HidKeyCode::KeyB => "B",
            HidKeyCode::KeyC => "C",
            HidKeyCode::KeyD => "D",
            HidKeyCode::KeyE => "E",
            HidKeyCode::KeyF => "F",
            HidKeyCode::KeyG => "G",
            HidKeyCode::KeyH => "H",
            HidKeyCode::KeyI => "I",
            HidKeyCode::KeyJ => "J",
            HidKeyCode::KeyK => "K",
            HidKeyCode::KeyL => "L",
            HidKeyCode::KeyM => "M",
            HidKeyCode::KeyN => "N",
            HidKeyCode::KeyO => "O",
            HidKeyCode::KeyP => "P",
            HidKeyCode::KeyQ => "Q",
            HidKeyCode::KeyR => "R",
            HidKeyCode::KeyS => "S",
            HidKeyCode::KeyT => "T",
            HidKeyCode::KeyU => "U",
            HidKeyCode::KeyV => "V",
            HidKeyCode::KeyW => "W",
            HidKeyCode::KeyX => "X",
            HidKeyCode::KeyY => "Y",
            HidKeyCode::KeyZ => "Z",
            HidKeyCode::Digit1 => "1",
            HidKeyCode::Digit2 => "2",
            HidKeyCode::Digit3 => "3",
            HidKeyCode::Digit4 => "4",
            HidKeyCode::Digit5 => "5",
            HidKeyCode::Digit6 => "6",
            HidKeyCode::Digit7 => "7",
            HidKeyCode::Digit8 => "8",
            HidKeyCode::Digit9 => "9",
            HidKeyCode::Digit0 => "0",
            HidKeyCode::Enter => "ENTER",
            HidKeyCode::Escape => "ESCAPE",
            HidKeyCode::Backspace => "BACKSPACE",
            HidKeyCode::Tab => "TAB",
            HidKeyCode::Space => "SPACE",
            HidKeyCode::Home => "HOME",
            HidKeyCode::PageUp => "PAGE_UP",
            HidKeyCode::Delete => "DELETE",
            HidKeyCode::End => "END",
            HidKeyCode::PageDown => "PAGE_DOWN",
            HidKeyCode::ArrowRight => "RIGHT",
            HidKeyCode::ArrowLeft => "LEFT",
            HidKeyCode::ArrowDown => "DOWN",
            HidKeyCode::ArrowUp => "UP",
        }
    }

    /// Looks up a key by symbolic name, ignoring ASCII case.
    ///
    /// Returns `None` for names outside the table; callers treat that as an
    /// unrecognised key, never as a keycode of zero.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use keyrelay_core::keymap::hid::HidKeyCode;
    ///
    /// assert_eq!(HidKeyCode::from_name("page_up"), Some(HidKeyCode::PageUp));
    /// assert_eq!(HidKeyCode::from_name("F13"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|key| key.name().eq_ignore_ascii_case(name))
    }

    /// Converts a raw HID usage byte back to a table key.
    pub fn from_u8(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.as_u8() == code)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
