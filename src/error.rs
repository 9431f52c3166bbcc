use std::path::PathBuf;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Failures surfaced by a [`Synthesizer`](crate::tts::Synthesizer).
#[derive(thiserror::Error, Debug)]
pub enum SynthesisError {
    #[error("Text cannot be empty")]
    EmptyInput,

    /// Engine, subprocess or I/O failure; retrying may succeed.
    #[error("Synthesis failed: {0}")]
    Transient(String),

    #[error("Unsupported input: {0}")]
    Unsupported(String),
}

impl From<std::io::Error> for SynthesisError {
    fn from(e: std::io::Error) -> Self {
        SynthesisError::Transient(e.to_string())
    }
}

/// Failures surfaced by a [`Player`](crate::playback::Player).
#[derive(thiserror::Error, Debug)]
pub enum PlaybackError {
    #[error("Audio output unavailable: {0}")]
    Device(String),

    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Failed to start player process: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Failures surfaced by the [`Janitor`](crate::speech::Janitor).
#[derive(thiserror::Error, Debug)]
pub enum CleanupError {
    #[error("Could not remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Asset registry is full ({capacity} pending)")]
    Full { capacity: usize },

    #[error("Could not write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{name} must be a number, got '{value}'")]
    NotANumber { name: &'static str, value: String },

    #[error("Unknown player '{0}' (expected rodio, command or null)")]
    UnknownPlayer(String),

    #[error("PLAYER_COMMAND cannot be empty")]
    EmptyPlayerCommand,

    #[error("Invalid address: {0}")]
    Address(String),
}

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Voice not found: {0}")]
    VoiceNotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::VoiceNotFound(v) => (
                StatusCode::NOT_FOUND,
                "VOICE_NOT_FOUND",
                format!("Voice '{}' not found", v),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::Synthesis(SynthesisError::EmptyInput) => {
                (StatusCode::BAD_REQUEST, "EMPTY_INPUT", self.to_string())
            }
            AppError::Synthesis(SynthesisError::Unsupported(msg)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNSUPPORTED_INPUT",
                msg.clone(),
            ),
            AppError::Synthesis(SynthesisError::Transient(msg)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "TTS_ERROR",
                msg.clone(),
            ),
            AppError::IoError(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                e.to_string(),
            ),
        };

        tracing::error!("Request failed: {} - {}", code, message);

        (
            status,
            Json(ErrorResponse {
                error: message,
                code: code.to_string(),
            }),
        )
            .into_response()
    }
}
