//! Text to keystroke sequencing.
//!
//! [`encode_text`] turns a string into the keystrokes that type it.  The
//! sequence is lazy: nothing is encoded until the consumer pulls the next
//! keystroke, so a playback loop can stop early without wasted work, and the
//! iterator is `Clone` so a sequence can be replayed from the start.
//!
//! Text keystrokes never carry modifiers.  Letters are typed with their letter
//! key, which the device renders in lower case.

use std::str::Chars;

use tracing::debug;

use crate::keymap::KeyTable;
use crate::protocol::report::{Keystroke, Modifiers};

/// Lazy sequence of keystrokes for a string.  Created by [`encode_text`].
#[derive(Debug, Clone)]
pub struct TextKeystrokes<'a> {
    chars: Chars<'a>,
    skipped: usize,
}

impl TextKeystrokes<'_> {
    /// Number of characters skipped so far because they have no key.
    pub fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for TextKeystrokes<'_> {
    type Item = Keystroke;

    fn next(&mut self) -> Option<Self::Item> {
        for c in self.chars.by_ref() {
            match KeyTable::for_char(c) {
                Some(key) => return Some(Keystroke::new(key, Modifiers::NONE)),
                None => {
                    self.skipped += 1;
                    debug!("skipping character {c:?}: no key in table");
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.chars.size_hint().1)
    }
}

/// Returns the keystrokes that type `text`, skipping unmapped characters.
///
/// # Examples
///
/// ```rust
/// use keyrelay_core::protocol::encode_text;
///
/// let codes: Vec<u8> = encode_text("H W").map(|s| s.press.keycode()).collect();
/// assert_eq!(codes, vec![0x0B, 0x2C, 0x1A]);
/// ```
pub fn encode_text(text: &str) -> TextKeystrokes<'_> {
    TextKeystrokes {
        chars: text.chars(),
        skipped: 0,
    }
}

/// Returns the characters of `text` that [`encode_text`] would skip.
pub fn unmapped_chars(text: &str) -> Vec<char> {
    text.chars()
        .filter(|&c| KeyTable::for_char(c).is_none())
        .collect()
}
