use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;

use super::{
    HealthResponse, SpeakRequest, SpeakResponse, SpeakingResponse, StopResponse,
    SynthesizeRequest, VoicesResponse, MAX_TEXT_CHARS,
};
use crate::api::routes::AppState;
use crate::error::{AppError, SynthesisError};

fn validate_text(text: &str) -> Result<(), AppError> {
    if text.trim().is_empty() {
        return Err(AppError::BadRequest("Text cannot be empty".into()));
    }

    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(AppError::BadRequest(format!(
            "Text too long (max {} chars)",
            MAX_TEXT_CHARS
        )));
    }

    Ok(())
}

pub async fn speak(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SpeakRequest>,
) -> Result<(StatusCode, Json<SpeakResponse>), AppError> {
    validate_text(&request.text)?;

    let accepted = state.speech.speak(&request.text);

    Ok((StatusCode::ACCEPTED, Json(SpeakResponse { accepted })))
}

pub async fn stop(State(state): State<Arc<AppState>>) -> Json<StopResponse> {
    Json(StopResponse {
        stopped: state.speech.stop(),
    })
}

pub async fn speaking(State(state): State<Arc<AppState>>) -> Json<SpeakingResponse> {
    Json(SpeakingResponse {
        speaking: state.speech.is_speaking(),
        pending_assets: state.speech.janitor().pending_len(),
    })
}

/// Render text to WAV and return it without playing it.
pub async fn synthesize(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SynthesizeRequest>,
) -> Result<Response, AppError> {
    validate_text(&request.text)?;
    let text = request.text;

    let task = match request.voice {
        Some(voice) => {
            let tts = match &state.voices {
                Some(tts) if tts.has_voice(&voice) => Arc::clone(tts),
                _ => return Err(AppError::VoiceNotFound(voice)),
            };
            tokio::task::spawn_blocking(move || tts.render(&text, &voice))
        }
        None => {
            let synthesizer = Arc::clone(&state.synthesizer);
            tokio::task::spawn_blocking(move || synthesizer.synthesize(&text))
        }
    };

    let audio = task
        .await
        .map_err(|e| SynthesisError::Transient(format!("Synthesis task failed: {}", e)))??;

    Ok((StatusCode::OK, [(header::CONTENT_TYPE, "audio/wav")], audio.wav).into_response())
}

pub async fn list_voices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<VoicesResponse>, AppError> {
    let voices = match &state.voices {
        Some(tts) => tts.list_voices()?,
        None => Vec::new(),
    };
    Ok(Json(VoicesResponse { voices }))
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::api::routes::create_router;
    use crate::speech::testing::{MockPlayer, ScriptedSynthesizer};
    use crate::speech::{Janitor, SpeechController};
    use crate::tts::Synthesizer;

    struct TestApp {
        state: Arc<AppState>,
        _dir: tempfile::TempDir,
    }

    impl TestApp {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let synthesizer: Arc<dyn Synthesizer> = Arc::new(ScriptedSynthesizer::new().fail("bad"));
            let speech = SpeechController::new(
                Arc::clone(&synthesizer),
                Arc::new(MockPlayer::new(Duration::from_secs(30))),
                Janitor::new(dir.path().to_path_buf(), 8),
                Duration::from_millis(10),
            );
            let state = Arc::new(AppState {
                speech,
                synthesizer,
                voices: None,
            });
            Self { state, _dir: dir }
        }

        async fn send(&self, method: &str, uri: &str, body: Option<serde_json::Value>) -> Response {
            let request = Request::builder().method(method).uri(uri);
            let request = match body {
                Some(json) => request
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(json.to_string())),
                None => request.body(Body::empty()),
            };
            create_router(Arc::clone(&self.state))
                .oneshot(request.unwrap())
                .await
                .unwrap()
        }
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_speak_accepts_text() {
        let app = TestApp::new();

        let response = app
            .send("POST", "/api/speak", Some(serde_json::json!({ "text": "Hello" })))
            .await;

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(json_body(response).await, serde_json::json!({ "accepted": true }));

        app.state.speech.shutdown().await;
    }

    #[tokio::test]
    async fn test_speak_rejects_blank_text() {
        let app = TestApp::new();

        let response = app
            .send("POST", "/api/speak", Some(serde_json::json!({ "text": "   " })))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["code"], "BAD_REQUEST");
        assert_eq!(app.state.speech.janitor().pending_len(), 0);
    }

    #[tokio::test]
    async fn test_speak_rejects_long_text() {
        let app = TestApp::new();
        let text = "a".repeat(MAX_TEXT_CHARS + 1);

        let response = app
            .send("POST", "/api/speak", Some(serde_json::json!({ "text": text })))
            .await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_speak_then_stop() {
        let app = TestApp::new();

        app.send("POST", "/api/speak", Some(serde_json::json!({ "text": "Hello" })))
            .await;
        for _ in 0..200 {
            if app.state.speech.is_speaking() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(app.state.speech.is_speaking());

        let response = app.send("POST", "/api/stop", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({ "stopped": true }));

        let response = app.send("GET", "/api/speaking", None).await;
        assert_eq!(json_body(response).await["speaking"], false);

        app.state.speech.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_when_idle() {
        let app = TestApp::new();

        let response = app.send("POST", "/api/stop", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({ "stopped": true }));
    }

    #[tokio::test]
    async fn test_speaking_reports_state() {
        let app = TestApp::new();

        let response = app.send("GET", "/api/speaking", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            json_body(response).await,
            serde_json::json!({ "speaking": false, "pendingAssets": 0 })
        );
    }

    #[tokio::test]
    async fn test_synthesize_returns_wav() {
        let app = TestApp::new();

        let response = app
            .send("POST", "/api/synthesize", Some(serde_json::json!({ "text": "Hi" })))
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/wav");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert!(bytes.starts_with(b"RIFF"));
        assert!(!app.state.speech.is_speaking());
    }

    #[tokio::test]
    async fn test_synthesize_failure_is_unavailable() {
        let app = TestApp::new();

        let response = app
            .send("POST", "/api/synthesize", Some(serde_json::json!({ "text": "bad" })))
            .await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json_body(response).await["code"], "TTS_ERROR");
    }

    #[tokio::test]
    async fn test_synthesize_unknown_voice() {
        let app = TestApp::new();

        let response = app
            .send(
                "POST",
                "/api/synthesize",
                Some(serde_json::json!({ "text": "Hi", "voice": "en_GB-alba-medium" })),
            )
            .await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(json_body(response).await["code"], "VOICE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_voices_empty_without_piper() {
        let app = TestApp::new();

        let response = app.send("GET", "/api/voices", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await, serde_json::json!({ "voices": [] }));
    }

    #[tokio::test]
    async fn test_health() {
        let app = TestApp::new();

        let response = app.send("GET", "/api/health", None).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }
}
