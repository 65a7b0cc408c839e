//! Playback timing policy for keystrokes.
//!
//! Encoding is instantaneous; timing is applied by whoever transmits the
//! reports.  A press is held for [`KeyTiming::hold`] before its release is
//! sent, and text playback waits [`KeyTiming::char_delay`] after each
//! character.

use std::time::Duration;

/// Default time between a press report and its release.
pub const DEFAULT_HOLD: Duration = Duration::from_millis(50);

/// Default pause after each character during text playback.
pub const DEFAULT_CHAR_DELAY: Duration = Duration::from_millis(100);

/// Hold and inter-character durations for one playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyTiming {
    pub hold: Duration,
    pub char_delay: Duration,
}

impl KeyTiming {
    pub fn from_millis(hold_ms: u64, char_delay_ms: u64) -> Self {
        Self {
            hold: Duration::from_millis(hold_ms),
            char_delay: Duration::from_millis(char_delay_ms),
        }
    }

    pub fn with_hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    pub fn with_char_delay(mut self, char_delay: Duration) -> Self {
        self.char_delay = char_delay;
        self
    }
}

impl Default for KeyTiming {
    fn default() -> Self {
        Self {
            hold: DEFAULT_HOLD,
            char_delay: DEFAULT_CHAR_DELAY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing_is_50ms_hold_100ms_delay() {
        let timing = KeyTiming::default();
        assert_eq!(timing.hold, Duration::from_millis(50));
        assert_eq!(timing.char_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_timing_overrides() {
        let timing = KeyTiming::default()
            .with_hold(Duration::from_millis(5))
            .with_char_delay(Duration::ZERO);
        assert_eq!(timing, KeyTiming::from_millis(5, 0));
    }
}
