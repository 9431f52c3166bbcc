use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use hound::{SampleFormat, WavSpec, WavWriter};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;

use crate::error::SynthesisError;
use crate::tts::espeak;
use crate::tts::voice::Voice;

/// Output gain applied when converting model samples to 16-bit PCM.
const OUTPUT_GAIN: f32 = 2.0;

fn engine_error<E: std::fmt::Display>(context: &str) -> impl Fn(E) -> SynthesisError + '_ {
    move |e| SynthesisError::Transient(format!("{}: {}", context, e))
}

/// One loaded Piper voice model.
pub struct PiperEngine {
    session: Mutex<Session>,
    sample_rate: u32,
    scales: [f32; 3],
    phoneme_id_map: HashMap<String, Vec<i64>>,
    espeak_voice: String,
}

impl PiperEngine {
    pub fn new(voice: &Voice) -> Result<Self, SynthesisError> {
        let session = Session::builder()
            .map_err(engine_error("Failed to create session builder"))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(engine_error("Failed to set optimization level"))?
            .with_intra_threads(4)
            .map_err(engine_error("Failed to set threads"))?
            .commit_from_file(&voice.model_path)
            .map_err(engine_error("Failed to load model"))?;

        let inference = voice.config.inference.clone().unwrap_or_default();

        tracing::info!(voice = %voice.id, "Loaded Piper voice model");

        Ok(Self {
            session: Mutex::new(session),
            sample_rate: voice.config.audio.sample_rate,
            scales: [inference.noise_scale, inference.length_scale, inference.noise_w],
            phoneme_id_map: voice.config.phoneme_id_map.clone(),
            espeak_voice: voice.espeak_voice().to_string(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Phonemize and synthesize one chunk of plain text.
    pub fn speak_chunk(&self, text: &str) -> Result<Vec<f32>, SynthesisError> {
        let phonemes = phonemize(text, &self.espeak_voice)?;
        let ids = phonemes_to_ids(&phonemes, &self.phoneme_id_map);
        self.infer(&ids)
    }

    fn infer(&self, phoneme_ids: &[i64]) -> Result<Vec<f32>, SynthesisError> {
        if phoneme_ids.is_empty() {
            return Ok(Vec::new());
        }

        let input_len = phoneme_ids.len();

        // input: [1, phoneme_count], input_lengths: [1], scales: [3]
        let input_value = Value::from_array((vec![1, input_len], phoneme_ids.to_vec()))
            .map_err(engine_error("Failed to create input tensor"))?;
        let lengths_value = Value::from_array((vec![1], vec![input_len as i64]))
            .map_err(engine_error("Failed to create lengths tensor"))?;
        let scales_value = Value::from_array((vec![3], self.scales.to_vec()))
            .map_err(engine_error("Failed to create scales tensor"))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| SynthesisError::Transient("Piper session lock poisoned".into()))?;
        let outputs = session
            .run(ort::inputs![input_value, lengths_value, scales_value])
            .map_err(engine_error("Inference failed"))?;

        let output = outputs
            .get("output")
            .or_else(|| outputs.get("audio"))
            .ok_or_else(|| SynthesisError::Transient("Missing output tensor".to_string()))?;

        let (_, samples) = output
            .try_extract_tensor::<f32>()
            .map_err(engine_error("Failed to extract output tensor"))?;

        Ok(samples.to_vec())
    }
}

/// Convert text to IPA phonemes with espeak-ng.
///
/// Text is fed on stdin so input starting with `-` is never read as a flag.
pub fn phonemize(text: &str, voice: &str) -> Result<String, SynthesisError> {
    if text.trim().is_empty() {
        return Ok(String::new());
    }

    let mut child = Command::new("espeak-ng")
        .args(["--ipa", "-q", "-v", voice, "--stdin"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            SynthesisError::Transient(format!("Failed to run espeak-ng (is it installed?): {}", e))
        })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes())?;
    }

    let output = child.wait_with_output()?;

    if !output.status.success() {
        return Err(espeak::failure(voice, &String::from_utf8_lossy(&output.stderr)));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Map phonemes to model ids: `^` (BOS), each phoneme followed by `_` (pad), `$` (EOS).
///
/// Line breaks between clauses become a single space phoneme.
pub fn phonemes_to_ids(phonemes: &str, id_map: &HashMap<String, Vec<i64>>) -> Vec<i64> {
    let mut ids = Vec::new();
    let pad = id_map.get("_");

    match id_map.get("^") {
        Some(bos) => ids.extend(bos),
        None => ids.push(0),
    }
    if let Some(pad) = pad {
        ids.extend(pad);
    }

    let flattened = phonemes.lines().map(str::trim).collect::<Vec<_>>().join(" ");
    for ch in flattened.chars() {
        let Some(mapped) = id_map.get(&ch.to_string()) else {
            continue;
        };
        ids.extend(mapped);
        if let Some(pad) = pad {
            ids.extend(pad);
        }
    }

    match id_map.get("$") {
        Some(eos) => ids.extend(eos),
        None => ids.push(0),
    }

    ids
}

/// Encode mono f32 samples as a 16-bit PCM WAV buffer.
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, SynthesisError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let wav_error = |e: hound::Error| SynthesisError::Transient(format!("WAV encoding failed: {}", e));

    let mut buffer = Vec::new();
    {
        let mut writer = WavWriter::new(Cursor::new(&mut buffer), spec).map_err(wav_error)?;
        for sample in samples {
            let scaled = (sample * OUTPUT_GAIN * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer.write_sample(scaled).map_err(wav_error)?;
        }
        writer.finalize().map_err(wav_error)?;
    }

    Ok(buffer)
}
