use std::sync::Arc;

use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod error;
mod playback;
mod speech;
mod text;
mod tts;

use api::routes::{create_router, AppState};
use config::Config;
use playback::{NullPlayer, Player};
use speech::{Janitor, SpeechController};
use tts::{EspeakSynthesizer, Synthesizer, TtsService};

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run().await {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let addr = config.addr()?;

    tracing::info!("Tutor voice v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Starting server on http://{}", addr);
    tracing::info!("Speech directory: {}", config.speech_dir.display());

    std::fs::create_dir_all(&config.speech_dir)?;

    let voices = match &config.voice {
        Some(voice) if tts::Voice::exists(&config.voices_dir, voice) => {
            tracing::info!("Using Piper voice {} from {}", voice, config.voices_dir.display());
            Some(Arc::new(TtsService::new(config.voices_dir.clone(), voice.clone())))
        }
        Some(voice) => {
            tracing::warn!(
                "Voice {} not found in {}, falling back to espeak-ng",
                voice,
                config.voices_dir.display()
            );
            None
        }
        None => None,
    };

    let synthesizer: Arc<dyn Synthesizer> = match &voices {
        Some(tts) => Arc::clone(tts) as Arc<dyn Synthesizer>,
        None => {
            tracing::info!("Using espeak-ng voice {}", config.espeak_voice);
            Arc::new(
                EspeakSynthesizer::new(config.espeak_voice.clone()).with_rate(config.espeak_rate),
            )
        }
    };

    let player: Arc<dyn Player> = match playback::create(&config.player) {
        Ok(player) => player,
        Err(e) => {
            tracing::warn!("{}; speech will be synthesized but not heard", e);
            Arc::new(NullPlayer::default())
        }
    };

    let speech = SpeechController::new(
        Arc::clone(&synthesizer),
        player,
        Janitor::new(config.speech_dir.clone(), config.max_pending_assets),
        config.poll_interval,
    );

    let state = Arc::new(AppState {
        speech: speech.clone(),
        synthesizer,
        voices,
    });

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    speech.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
