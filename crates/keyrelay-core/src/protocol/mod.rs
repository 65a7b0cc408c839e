//! Key event codec: keyboard reports, text sequencing and playback timing.

pub mod report;
pub mod text;
pub mod timing;

pub use report::{
    encode_press, encode_release, CodecError, KeyReport, Keystroke, ModifierFlags, Modifiers,
    REPORT_LEN, UHID_KEYBOARD_MSG_TYPE,
};
pub use text::{encode_text, unmapped_chars, TextKeystrokes};
pub use timing::KeyTiming;
