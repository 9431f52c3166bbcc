use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::error::SynthesisError;

#[derive(Debug, Clone, Deserialize)]
pub struct VoiceConfig {
    pub audio: AudioConfig,
    pub espeak: Option<EspeakConfig>,
    #[serde(default)]
    pub phoneme_id_map: HashMap<String, Vec<i64>>,
    #[serde(default)]
    pub inference: Option<InferenceConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EspeakConfig {
    pub voice: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f32,
    #[serde(default = "default_length_scale")]
    pub length_scale: f32,
    #[serde(default = "default_noise_w")]
    pub noise_w: f32,
}

fn default_noise_scale() -> f32 {
    0.667
}

fn default_length_scale() -> f32 {
    1.0
}

fn default_noise_w() -> f32 {
    0.8
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            noise_scale: default_noise_scale(),
            length_scale: default_length_scale(),
            noise_w: default_noise_w(),
        }
    }
}

#[derive(Debug)]
pub struct Voice {
    pub id: String,
    pub config: VoiceConfig,
    pub model_path: PathBuf,
}

impl Voice {
    pub fn model_path(voices_dir: &Path, voice_id: &str) -> PathBuf {
        voices_dir.join(format!("{}.onnx", voice_id))
    }

    pub fn exists(voices_dir: &Path, voice_id: &str) -> bool {
        Self::model_path(voices_dir, voice_id).exists()
    }

    pub fn load(voices_dir: &Path, voice_id: &str) -> Result<Self, SynthesisError> {
        let model_path = Self::model_path(voices_dir, voice_id);
        let config_path = voices_dir.join(format!("{}.onnx.json", voice_id));

        if !model_path.exists() {
            return Err(SynthesisError::Unsupported(format!(
                "voice '{}' not found",
                voice_id
            )));
        }

        if !config_path.exists() {
            return Err(SynthesisError::Unsupported(format!(
                "voice '{}' is missing its config file",
                voice_id
            )));
        }

        let config: VoiceConfig = serde_json::from_reader(File::open(&config_path)?)
            .map_err(|e| {
                SynthesisError::Unsupported(format!("voice '{}' config is invalid: {}", voice_id, e))
            })?;

        Ok(Self {
            id: voice_id.to_string(),
            config,
            model_path,
        })
    }

    pub fn espeak_voice(&self) -> &str {
        self.config
            .espeak
            .as_ref()
            .map(|e| e.voice.as_str())
            .unwrap_or("en")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceInfo {
    pub id: String,
    pub name: String,
    pub language: String,
    pub default: bool,
}
