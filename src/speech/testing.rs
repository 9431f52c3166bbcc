//! Scripted collaborators for exercising the controller without audio
//! hardware or voice models.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{PlaybackError, SynthesisError};
use crate::playback::Player;
use crate::speech::Asset;
use crate::tts::piper::samples_to_wav;
use crate::tts::{SynthesizedAudio, Synthesizer};

/// Returns a short burst of silence, optionally after a delay or with a
/// failure for specific texts.
#[derive(Default)]
pub struct ScriptedSynthesizer {
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
    calls: AtomicUsize,
}

impl ScriptedSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delay(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    pub fn fail(mut self, text: &str) -> Self {
        self.failures.insert(text.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Synthesizer for ScriptedSynthesizer {
    fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delays.get(text) {
            std::thread::sleep(*delay);
        }
        if self.failures.contains(text) {
            return Err(SynthesisError::Transient(format!("scripted failure for '{}'", text)));
        }

        SynthesizedAudio::from_wav(samples_to_wav(&[0.0; 160], 16_000)?)
    }
}

#[derive(Default)]
struct PlayerLog {
    busy_until: Option<Instant>,
    played: Vec<u64>,
    overlaps: usize,
    stops: usize,
}

/// Pretends to play every asset for a fixed time and records what it was
/// asked to do.
pub struct MockPlayer {
    play_time: Duration,
    fail: bool,
    log: Mutex<PlayerLog>,
}

impl MockPlayer {
    pub fn new(play_time: Duration) -> Self {
        Self {
            play_time,
            fail: false,
            log: Mutex::new(PlayerLog::default()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Duration::ZERO)
        }
    }

    /// Generations played, in order.
    pub fn played(&self) -> Vec<u64> {
        self.log.lock().unwrap().played.clone()
    }

    /// Times `play` was called while a previous session was still busy.
    pub fn overlaps(&self) -> usize {
        self.log.lock().unwrap().overlaps
    }

    pub fn stop_calls(&self) -> usize {
        self.log.lock().unwrap().stops
    }
}

impl Player for MockPlayer {
    fn play(&self, asset: &Asset) -> Result<(), PlaybackError> {
        if self.fail {
            return Err(PlaybackError::Device("scripted device failure".into()));
        }
        assert!(asset.path().exists(), "asset must be on disk before playback");

        let mut log = self.log.lock().unwrap();
        let now = Instant::now();
        if log.busy_until.is_some_and(|t| now < t) {
            log.overlaps += 1;
        }
        log.busy_until = Some(now + self.play_time);
        log.played.push(asset.generation().get());
        Ok(())
    }

    fn stop(&self) {
        let mut log = self.log.lock().unwrap();
        log.busy_until = None;
        log.stops += 1;
    }

    fn is_busy(&self) -> bool {
        self.log
            .lock()
            .unwrap()
            .busy_until
            .is_some_and(|t| Instant::now() < t)
    }
}
