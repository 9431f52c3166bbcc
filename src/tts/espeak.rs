use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::SynthesisError;
use crate::text;
use crate::tts::{SynthesizedAudio, Synthesizer};

/// Local synthesis through the `espeak-ng` executable.
///
/// Used when no Piper voice is configured. Lower quality, but needs no model
/// files.
pub struct EspeakSynthesizer {
    voice: String,
    words_per_minute: u32,
}

impl EspeakSynthesizer {
    pub fn new(voice: impl Into<String>) -> Self {
        Self {
            voice: voice.into(),
            words_per_minute: 165,
        }
    }

    pub fn with_rate(mut self, words_per_minute: u32) -> Self {
        self.words_per_minute = words_per_minute;
        self
    }
}

impl Synthesizer for EspeakSynthesizer {
    fn synthesize(&self, input: &str) -> Result<SynthesizedAudio, SynthesisError> {
        let prepared = text::prepare(input);
        if prepared.is_empty() {
            return Err(SynthesisError::EmptyInput);
        }

        let rate = self.words_per_minute.to_string();
        let mut child = Command::new("espeak-ng")
            .args(["-v", &self.voice, "-s", &rate, "--stdout", "--stdin"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                SynthesisError::Transient(format!("Failed to run espeak-ng (is it installed?): {}", e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(prepared.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(failure(&self.voice, &String::from_utf8_lossy(&output.stderr)));
        }

        let mut wav = output.stdout;
        fix_streamed_header(&mut wav);
        SynthesizedAudio::from_wav(wav)
    }
}

/// Classify a failed espeak-ng run. An unknown voice will never succeed on
/// retry; anything else might.
pub(crate) fn failure(voice: &str, stderr: &str) -> SynthesisError {
    let stderr = stderr.trim();
    if stderr.contains("voice") {
        SynthesisError::Unsupported(format!("espeak-ng has no voice '{}': {}", voice, stderr))
    } else {
        SynthesisError::Transient(format!("espeak-ng failed: {}", stderr))
    }
}

/// espeak-ng cannot seek stdout, so the RIFF and data sizes it writes are
/// placeholders. Rewrite them from the actual buffer length.
fn fix_streamed_header(wav: &mut [u8]) {
    if wav.len() < 44 || &wav[0..4] != b"RIFF" || &wav[36..40] != b"data" {
        return;
    }
    let riff_len = (wav.len() - 8) as u32;
    let data_len = (wav.len() - 44) as u32;
    wav[4..8].copy_from_slice(&riff_len.to_le_bytes());
    wav[40..44].copy_from_slice(&data_len.to_le_bytes());
}
