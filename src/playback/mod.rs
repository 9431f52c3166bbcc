//! Audio playback backends.

pub mod command;
pub mod null;
#[cfg(feature = "audio-playback")]
pub mod rodio_player;

use std::sync::Arc;

use crate::config::PlayerKind;
use crate::error::PlaybackError;
use crate::speech::Asset;

pub use command::CommandPlayer;
pub use null::NullPlayer;
#[cfg(feature = "audio-playback")]
pub use rodio_player::RodioPlayer;

/// Plays one asset at a time.
///
/// `play` returns as soon as audio has started; callers poll `is_busy` to
/// learn when it ends. `stop` is a no-op when idle and must be safe to call
/// while another thread is inside `play`.
pub trait Player: Send + Sync {
    fn play(&self, asset: &Asset) -> Result<(), PlaybackError>;
    fn stop(&self);
    fn is_busy(&self) -> bool;
}

/// Build the configured backend.
pub fn create(kind: &PlayerKind) -> Result<Arc<dyn Player>, PlaybackError> {
    match kind {
        #[cfg(feature = "audio-playback")]
        PlayerKind::Rodio => Ok(Arc::new(RodioPlayer::spawn()?)),
        #[cfg(not(feature = "audio-playback"))]
        PlayerKind::Rodio => Err(PlaybackError::Device(
            "built without the audio-playback feature".into(),
        )),
        PlayerKind::Command { program, args } => {
            Ok(Arc::new(CommandPlayer::new(program.clone(), args.clone())))
        }
        PlayerKind::Null => Ok(Arc::new(NullPlayer::default())),
    }
}
