use std::process::{Child, Command, Stdio};
use std::sync::{Mutex, MutexGuard};

use crate::error::PlaybackError;
use crate::playback::Player;
use crate::speech::Asset;

/// Plays assets by running an external program (`aplay`, `afplay`, `ffplay`)
/// with the file path as its last argument.
///
/// `stop` kills the process, so playback halts immediately regardless of
/// what the program is doing.
pub struct CommandPlayer {
    program: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl CommandPlayer {
    pub fn new(program: String, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            child: Mutex::new(None),
        }
    }

    fn child(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn kill(mut child: Child) {
    // Already exited is fine; anything else is worth a log line.
    if let Err(e) = child.kill() {
        if e.kind() != std::io::ErrorKind::InvalidInput {
            tracing::warn!("Failed to kill player process {}: {}", child.id(), e);
        }
    }
    let _ = child.wait();
}

impl Player for CommandPlayer {
    fn play(&self, asset: &Asset) -> Result<(), PlaybackError> {
        let mut slot = self.child();
        if let Some(previous) = slot.take() {
            kill(previous);
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(asset.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        tracing::debug!(pid = child.id(), "Started {}", self.program);
        *slot = Some(child);
        Ok(())
    }

    fn stop(&self) {
        if let Some(child) = self.child().take() {
            kill(child);
        }
    }

    fn is_busy(&self) -> bool {
        let mut slot = self.child();
        let Some(child) = slot.as_mut() else {
            return false;
        };

        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                if !status.success() {
                    tracing::error!("Player {} exited with {}", self.program, status);
                }
                *slot = None;
                false
            }
            Err(e) => {
                tracing::warn!("Could not poll player process: {}", e);
                false
            }
        }
    }
}
