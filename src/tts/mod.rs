pub mod espeak;
pub mod piper;
pub mod voice;

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use crate::error::{AppError, SynthesisError};
use crate::text;

pub use espeak::EspeakSynthesizer;
pub use piper::PiperEngine;
pub use voice::{Voice, VoiceInfo};

/// Silence inserted between synthesized chunks.
const CHUNK_GAP: Duration = Duration::from_millis(200);

/// A synthesized utterance held in memory as a complete WAV file.
#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub wav: Vec<u8>,
    pub sample_rate: u32,
    pub duration: Duration,
}

impl SynthesizedAudio {
    /// Wrap an encoded WAV buffer, reading rate and length from its header.
    pub fn from_wav(wav: Vec<u8>) -> Result<Self, SynthesisError> {
        let (spec, frames) = {
            let reader = hound::WavReader::new(Cursor::new(&wav))
                .map_err(|e| SynthesisError::Transient(format!("Invalid WAV output: {}", e)))?;
            (reader.spec(), reader.duration())
        };

        Ok(Self {
            sample_rate: spec.sample_rate,
            duration: Duration::from_secs_f64(frames as f64 / spec.sample_rate.max(1) as f64),
            wav,
        })
    }
}

/// Turns text into audio.
///
/// Implementations hold no per-utterance state and may be called from
/// several blocking workers at once.
pub trait Synthesizer: Send + Sync {
    fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError>;
}

/// Piper-backed synthesis over a directory of ONNX voice models.
pub struct TtsService {
    voices_dir: PathBuf,
    default_voice: String,
    engines: RwLock<HashMap<String, Arc<PiperEngine>>>,
}

impl TtsService {
    pub fn new(voices_dir: PathBuf, default_voice: String) -> Self {
        Self {
            voices_dir,
            default_voice,
            engines: RwLock::new(HashMap::new()),
        }
    }

    pub fn has_voice(&self, voice_id: &str) -> bool {
        Voice::exists(&self.voices_dir, voice_id)
    }

    /// Render `text` with a specific voice.
    pub fn render(&self, text: &str, voice_id: &str) -> Result<SynthesizedAudio, SynthesisError> {
        let prepared = text::prepare(text);
        if prepared.is_empty() {
            return Err(SynthesisError::EmptyInput);
        }

        let engine = self.get_engine(voice_id)?;
        let sample_rate = engine.sample_rate();
        let gap = vec![0.0; (sample_rate as f32 * CHUNK_GAP.as_secs_f32()) as usize];

        let mut samples = Vec::new();
        for chunk in text::chunk(&prepared, text::DEFAULT_CHUNK_LEN) {
            let chunk_samples = engine.speak_chunk(&chunk)?;
            if chunk_samples.is_empty() {
                continue;
            }
            if !samples.is_empty() {
                samples.extend_from_slice(&gap);
            }
            samples.extend(chunk_samples);
        }

        if samples.is_empty() {
            return Err(SynthesisError::Unsupported(
                "text contains nothing speakable".into(),
            ));
        }

        tracing::debug!(
            voice = voice_id,
            samples = samples.len(),
            "Rendered utterance"
        );

        let wav = piper::samples_to_wav(&samples, sample_rate)?;
        Ok(SynthesizedAudio {
            wav,
            sample_rate,
            duration: Duration::from_secs_f64(samples.len() as f64 / sample_rate as f64),
        })
    }

    fn get_engine(&self, voice_id: &str) -> Result<Arc<PiperEngine>, SynthesisError> {
        {
            let engines = self.engines.read().unwrap_or_else(|e| e.into_inner());
            if let Some(engine) = engines.get(voice_id) {
                return Ok(Arc::clone(engine));
            }
        }

        let voice = Voice::load(&self.voices_dir, voice_id)?;
        let engine = Arc::new(PiperEngine::new(&voice)?);

        let mut engines = self.engines.write().unwrap_or_else(|e| e.into_inner());
        let engine = engines
            .entry(voice_id.to_string())
            .or_insert(engine);

        Ok(Arc::clone(engine))
    }

    pub fn list_voices(&self) -> Result<Vec<VoiceInfo>, AppError> {
        let mut voices = Vec::new();

        if !self.voices_dir.exists() {
            return Ok(voices);
        }

        for entry in std::fs::read_dir(&self.voices_dir)? {
            let path = entry?.path();

            if path.extension().map(|e| e != "onnx").unwrap_or(true) {
                continue;
            }
            let Some(id) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };

            match Voice::load(&self.voices_dir, &id) {
                Ok(voice) => voices.push(VoiceInfo {
                    name: parse_voice_name(&id),
                    language: voice.espeak_voice().to_string(),
                    default: id == self.default_voice,
                    id,
                }),
                Err(e) => tracing::warn!("Skipping voice {}: {}", id, e),
            }
        }

        voices.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(voices)
    }
}

impl Synthesizer for TtsService {
    fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, SynthesisError> {
        self.render(text, &self.default_voice)
    }
}

/// `en_GB-alba-medium` -> `Alba`
fn parse_voice_name(id: &str) -> String {
    let Some(name) = id.split('-').nth(1) else {
        return id.to_string();
    };
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => id.to_string(),
    }
}
