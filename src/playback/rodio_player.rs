//! Playback through the default output device.
//!
//! `rodio::OutputStream` is `!Send` on some platforms, so it lives on a
//! dedicated thread and [`RodioPlayer`] talks to it over a channel.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use rodio::{Decoder, OutputStream, Sink};

use crate::error::PlaybackError;
use crate::playback::Player;
use crate::speech::Asset;

enum PlayerCommand {
    Play {
        path: PathBuf,
        reply: mpsc::Sender<Result<(), PlaybackError>>,
    },
    Stop,
    IsBusy {
        reply: mpsc::Sender<bool>,
    },
    Shutdown,
}

pub struct RodioPlayer {
    cmd_tx: mpsc::Sender<PlayerCommand>,
    thread: Option<thread::JoinHandle<()>>,
}

impl RodioPlayer {
    /// Start the audio thread and open the default output device on it.
    pub fn spawn() -> Result<Self, PlaybackError> {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (init_tx, init_rx) = mpsc::channel();

        let thread = thread::Builder::new()
            .name("tutor-voice-audio".into())
            .spawn(move || Self::run(cmd_rx, init_tx))
            .map_err(|e| PlaybackError::Device(format!("failed to spawn audio thread: {}", e)))?;

        init_rx
            .recv()
            .map_err(|_| PlaybackError::Device("audio thread exited during startup".into()))??;

        tracing::info!("Audio playback initialized on default output device");

        Ok(Self {
            cmd_tx,
            thread: Some(thread),
        })
    }

    fn run(cmd_rx: mpsc::Receiver<PlayerCommand>, init_tx: mpsc::Sender<Result<(), PlaybackError>>) {
        let (_stream, handle) = match OutputStream::try_default() {
            Ok(output) => output,
            Err(e) => {
                let _ = init_tx.send(Err(PlaybackError::Device(e.to_string())));
                return;
            }
        };
        if init_tx.send(Ok(())).is_err() {
            return;
        }

        let mut sink: Option<Sink> = None;

        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                PlayerCommand::Play { path, reply } => {
                    if let Some(old) = sink.take() {
                        old.stop();
                    }
                    let result = open_source(&path).and_then(|source| {
                        let new_sink = Sink::try_new(&handle)
                            .map_err(|e| PlaybackError::Device(e.to_string()))?;
                        new_sink.append(source);
                        sink = Some(new_sink);
                        Ok(())
                    });
                    let _ = reply.send(result);
                }
                PlayerCommand::Stop => {
                    if let Some(old) = sink.take() {
                        old.stop();
                    }
                }
                PlayerCommand::IsBusy { reply } => {
                    let _ = reply.send(sink.as_ref().is_some_and(|s| !s.empty()));
                }
                PlayerCommand::Shutdown => break,
            }
        }

        tracing::debug!("Audio thread shutting down");
    }
}

fn open_source(path: &Path) -> Result<Decoder<BufReader<File>>, PlaybackError> {
    let decode_error = |reason: String| PlaybackError::Decode {
        path: path.to_path_buf(),
        reason,
    };
    let file = File::open(path).map_err(|e| decode_error(e.to_string()))?;
    Decoder::new(BufReader::new(file)).map_err(|e| decode_error(e.to_string()))
}

impl Player for RodioPlayer {
    fn play(&self, asset: &Asset) -> Result<(), PlaybackError> {
        let (reply, rx) = mpsc::channel();
        self.cmd_tx
            .send(PlayerCommand::Play {
                path: asset.path().to_path_buf(),
                reply,
            })
            .map_err(|_| PlaybackError::Device("audio thread is gone".into()))?;
        rx.recv()
            .map_err(|_| PlaybackError::Device("audio thread is gone".into()))?
    }

    fn stop(&self) {
        let _ = self.cmd_tx.send(PlayerCommand::Stop);
    }

    fn is_busy(&self) -> bool {
        let (reply, rx) = mpsc::channel();
        if self.cmd_tx.send(PlayerCommand::IsBusy { reply }).is_err() {
            return false;
        }
        rx.recv().unwrap_or(false)
    }
}

impl Drop for RodioPlayer {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(PlayerCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}
