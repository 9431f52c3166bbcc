use std::sync::Mutex;
use std::time::Instant;

use crate::error::PlaybackError;
use crate::playback::Player;
use crate::speech::Asset;

/// Discards audio but stays busy for the asset's duration.
///
/// For headless hosts where the rest of the pipeline should still behave as
/// if speech were playing.
#[derive(Default)]
pub struct NullPlayer {
    until: Mutex<Option<Instant>>,
}

impl Player for NullPlayer {
    fn play(&self, asset: &Asset) -> Result<(), PlaybackError> {
        *self.until.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now() + asset.duration());
        tracing::debug!("Null playback of {} for {:?}", asset.path().display(), asset.duration());
        Ok(())
    }

    fn stop(&self) {
        *self.until.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    fn is_busy(&self) -> bool {
        self.until
            .lock()
            .map(|until| until.is_some_and(|t| Instant::now() < t))
            .unwrap_or(false)
    }
}
