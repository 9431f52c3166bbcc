use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::CleanupError;
use crate::speech::Generation;
use crate::tts::SynthesizedAudio;

/// A synthesized audio file on disk, owned by one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    generation: Generation,
    path: PathBuf,
    duration: Duration,
}

impl Asset {
    pub fn new(generation: Generation, path: PathBuf, duration: Duration) -> Self {
        Self {
            generation,
            path,
            duration,
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    /// Held by a running job; cleanup must not touch it.
    InUse,
    /// Released and waiting for a cleanup pass.
    Idle,
    /// A cleanup pass is removing it right now.
    Removing,
}

#[derive(Debug)]
struct Entry {
    asset: Asset,
    state: EntryState,
    failures: u32,
}

/// Registry of audio files awaiting removal.
///
/// An asset stays in the registry from the moment its path is handed out
/// until the file is gone. Removal failures leave it in place for the next
/// pass. The registry is bounded; see [`Janitor::track`].
pub struct Janitor {
    dir: PathBuf,
    capacity: usize,
    pending: Mutex<HashMap<PathBuf, Entry>>,
}

impl Janitor {
    pub fn new(dir: PathBuf, capacity: usize) -> Self {
        Self {
            dir,
            capacity: capacity.max(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<PathBuf, Entry>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Where the audio for `generation` is written.
    pub fn asset_path(&self, generation: Generation) -> PathBuf {
        self.dir
            .join(format!("speech-{}-{}.wav", std::process::id(), generation.get()))
    }

    /// Start tracking `asset` as in use.
    ///
    /// When the registry is full a cleanup pass runs first; if it is still
    /// full the asset is refused and the caller must not create the file.
    pub fn track(&self, asset: Asset) -> Result<(), CleanupError> {
        if self.pending_len() >= self.capacity {
            self.cleanup();
        }

        let mut pending = self.pending();
        if pending.len() >= self.capacity {
            return Err(CleanupError::Full {
                capacity: self.capacity,
            });
        }

        pending.insert(
            asset.path.clone(),
            Entry {
                asset,
                state: EntryState::InUse,
                failures: 0,
            },
        );
        Ok(())
    }

    /// Track an asset for `generation`, then write `audio` to it.
    ///
    /// On a write failure the partial file stays tracked (released) so the
    /// next cleanup pass removes it.
    pub fn materialize(
        &self,
        generation: Generation,
        audio: &SynthesizedAudio,
    ) -> Result<Asset, CleanupError> {
        let asset = Asset::new(generation, self.asset_path(generation), audio.duration);
        self.track(asset.clone())?;

        if let Err(source) = std::fs::write(&asset.path, &audio.wav) {
            self.release(&asset);
            return Err(CleanupError::Write {
                path: asset.path,
                source,
            });
        }

        Ok(asset)
    }

    /// Mark `asset` as no longer needed by its job.
    pub fn release(&self, asset: &Asset) {
        if let Some(entry) = self.pending().get_mut(&asset.path) {
            if entry.state == EntryState::InUse {
                entry.state = EntryState::Idle;
            }
        }
    }

    /// Release whatever `generation` still holds. Used once its playback has
    /// been stopped, so the job's own `release` may come later.
    pub fn release_generation(&self, generation: Generation) {
        for entry in self.pending().values_mut() {
            if entry.asset.generation == generation && entry.state == EntryState::InUse {
                entry.state = EntryState::Idle;
            }
        }
    }

    /// Remove every released asset. Returns the assets still pending
    /// afterwards: those in use and those whose removal failed.
    ///
    /// Safe to call from several threads at once; each file is claimed by
    /// exactly one pass.
    pub fn cleanup(&self) -> Vec<Asset> {
        let claimed: Vec<PathBuf> = {
            let mut pending = self.pending();
            pending
                .iter_mut()
                .filter(|(_, entry)| entry.state == EntryState::Idle)
                .map(|(path, entry)| {
                    entry.state = EntryState::Removing;
                    path.clone()
                })
                .collect()
        };

        let outcomes: Vec<(PathBuf, Result<(), CleanupError>)> = claimed
            .into_iter()
            .map(|path| {
                let result = match std::fs::remove_file(&path) {
                    Ok(()) => Ok(()),
                    Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                    Err(source) => Err(CleanupError::Remove {
                        path: path.clone(),
                        source,
                    }),
                };
                (path, result)
            })
            .collect();

        let mut pending = self.pending();
        for (path, result) in outcomes {
            match result {
                Ok(()) => {
                    pending.remove(&path);
                    tracing::debug!("Removed {}", path.display());
                }
                Err(e) => {
                    if let Some(entry) = pending.get_mut(&path) {
                        entry.state = EntryState::Idle;
                        entry.failures += 1;
                        tracing::warn!(attempt = entry.failures, "{}; will retry", e);
                    }
                }
            }
        }

        pending.values().map(|entry| entry.asset.clone()).collect()
    }

    pub fn pending_len(&self) -> usize {
        self.pending().len()
    }

    #[cfg(test)]
    pub fn is_tracked(&self, path: &Path) -> bool {
        self.pending().contains_key(path)
    }
}
