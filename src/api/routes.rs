use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers;
use crate::speech::SpeechController;
use crate::tts::{Synthesizer, TtsService};

pub struct AppState {
    pub speech: SpeechController,
    /// Same synthesizer the controller speaks with.
    pub synthesizer: Arc<dyn Synthesizer>,
    /// Present when Piper voices are available.
    pub voices: Option<Arc<TtsService>>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let api_routes = Router::new()
        .route("/speak", post(handlers::speak))
        .route("/stop", post(handlers::stop))
        .route("/speaking", get(handlers::speaking))
        .route("/synthesize", post(handlers::synthesize))
        .route("/voices", get(handlers::list_voices))
        .route("/health", get(handlers::health));

    Router::new()
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
