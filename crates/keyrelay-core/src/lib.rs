//! # keyrelay-core
//!
//! Shared library for keyrelay containing the key event codec, the HID key
//! table, and the device domain types.
//!
//! It has zero dependencies on sockets, async runtimes, or OS APIs.
//!
//! # Architecture overview (for beginners)
//!
//! keyrelay lets one controller drive the keyboards of many remote devices at
//! once.  Each device runs a small input server that accepts 9-byte
//! *keyboard reports* over a WebSocket; the relay builds those reports and
//! fans them out.
//!
//! This crate (`keyrelay-core`) is the pure foundation.  It defines:
//!
//! - **`keymap`** – The static key table: symbolic names such as `"TAB"` or
//!   `"PAGE_UP"` and text characters, resolved to USB HID keycodes.
//!
//! - **`protocol`** – How a key press becomes bytes.  A press report carries
//!   the modifier mask and keycode; the release report is all zeros after the
//!   tag.  Text is turned into a lazy sequence of press/release pairs, and
//!   [`KeyTiming`] holds the hold and inter-character delays that playback
//!   applies.
//!
//! - **`domain`** – Device identity, the connection state machine, and the
//!   device summary shown to front-ends.

pub mod domain;
pub mod keymap;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `keyrelay_core::KeyReport` instead of `keyrelay_core::protocol::report::KeyReport`.
pub use domain::{ConnectionState, DeviceId, DeviceSummary};
pub use keymap::{HidKeyCode, KeyTable};
pub use protocol::{
    encode_press, encode_release, encode_text, CodecError, KeyReport, KeyTiming, Keystroke,
    Modifiers,
};
