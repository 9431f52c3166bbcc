use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Which playback backend to drive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerKind {
    Rodio,
    Command { program: String, args: Vec<String> },
    Null,
}

/// Service configuration, read from the environment at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub voices_dir: PathBuf,
    /// Piper voice used for speech. `None` falls back to espeak-ng.
    pub voice: Option<String>,
    pub espeak_voice: String,
    /// espeak-ng speaking rate in words per minute.
    pub espeak_rate: u32,
    pub speech_dir: PathBuf,
    pub player: PlayerKind,
    pub poll_interval: Duration,
    pub max_pending_assets: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| get(name).unwrap_or_else(|| default.to_string());

        let player = match var("PLAYER", "rodio").to_lowercase().as_str() {
            "rodio" => PlayerKind::Rodio,
            "null" | "none" => PlayerKind::Null,
            "command" => {
                let line = var("PLAYER_COMMAND", "aplay -q");
                let mut words = line.split_whitespace().map(str::to_string);
                let program = words.next().ok_or(ConfigError::EmptyPlayerCommand)?;
                PlayerKind::Command {
                    program,
                    args: words.collect(),
                }
            }
            other => return Err(ConfigError::UnknownPlayer(other.to_string())),
        };

        Ok(Self {
            host: var("HOST", "0.0.0.0"),
            port: parse_number("PORT", var("PORT", "5500"))?,
            voices_dir: var("VOICES_DIR", "./voices").into(),
            voice: get("VOICE").filter(|v| !v.trim().is_empty()),
            espeak_voice: var("ESPEAK_VOICE", "en"),
            espeak_rate: parse_number("ESPEAK_RATE", var("ESPEAK_RATE", "165"))?,
            speech_dir: get("SPEECH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("tutor-voice")),
            player,
            poll_interval: Duration::from_millis(parse_number(
                "POLL_INTERVAL_MS",
                var("POLL_INTERVAL_MS", "50"),
            )?),
            max_pending_assets: parse_number("MAX_PENDING_ASSETS", var("MAX_PENDING_ASSETS", "64"))?,
        })
    }

    pub fn addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ConfigError::Address(format!("{}:{}", self.host, self.port)))
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::NotANumber { name, value })
}
