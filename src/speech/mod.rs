//! Speech output: background synthesis and playback with preemption.
//!
//! A [`SpeechController`] owns at most one current utterance. Each call to
//! [`SpeechController::speak`] mints a new [`Generation`]; background jobs
//! holding an older generation discard their work instead of playing it.
//! Audio files written along the way are tracked by the [`Janitor`] until
//! they are removed.

pub mod controller;
pub mod janitor;

#[cfg(test)]
pub(crate) mod testing;

use std::fmt;

pub use controller::SpeechController;
pub use janitor::{Asset, Janitor};

/// Identifies one utterance. Strictly increasing per controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub(crate) u64);

impl Generation {
    pub fn get(self) -> u64 {
        self.0
    }

    fn next(self) -> Self {
        Generation(self.0 + 1)
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
