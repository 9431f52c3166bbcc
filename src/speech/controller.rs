use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::playback::Player;
use crate::speech::{Asset, Generation, Janitor};
use crate::tts::{SynthesizedAudio, Synthesizer};

/// The utterance allowed to reach the speaker.
struct Utterance {
    generation: Generation,
    cancel: CancellationToken,
}

/// Everything `speak`, `stop` and the jobs race on. Only touched under
/// [`Inner::state`]; Player calls made by the controller happen under the
/// same lock.
struct State {
    last: Generation,
    current: Option<Utterance>,
    /// Generation whose audio the Player is producing.
    playing: Option<Generation>,
}

impl State {
    fn is_current(&self, generation: Generation) -> bool {
        self.current
            .as_ref()
            .is_some_and(|u| u.generation == generation)
    }
}

struct Inner {
    synthesizer: Arc<dyn Synthesizer>,
    player: Arc<dyn Player>,
    janitor: Janitor,
    poll_interval: Duration,
    state: Mutex<State>,
    /// Mirrors `State::playing.is_some()`; written under the state lock.
    speaking: AtomicBool,
    jobs: Mutex<Vec<JoinHandle<()>>>,
}

/// Speaks text in the background, one utterance at a time.
///
/// Cloning is cheap and every clone drives the same speaker.
#[derive(Clone)]
pub struct SpeechController {
    inner: Arc<Inner>,
}

impl SpeechController {
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        player: Arc<dyn Player>,
        janitor: Janitor,
        poll_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                synthesizer,
                player,
                janitor,
                poll_interval,
                state: Mutex::new(State {
                    last: Generation(0),
                    current: None,
                    playing: None,
                }),
                speaking: AtomicBool::new(false),
                jobs: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Start speaking `text`, preempting whatever is currently playing.
    ///
    /// Returns `false` without doing anything when `text` is blank. Never
    /// waits for synthesis or playback. Must be called inside a Tokio runtime.
    pub fn speak(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            tracing::debug!("Ignoring blank speech request");
            return false;
        }

        let (generation, cancel) = {
            let mut state = self.inner.state();
            self.inner.preempt(&mut state);

            let generation = state.last.next();
            let cancel = CancellationToken::new();
            state.last = generation;
            state.current = Some(Utterance {
                generation,
                cancel: cancel.clone(),
            });
            (generation, cancel)
        };

        tracing::info!(%generation, chars = text.chars().count(), "Speech requested");

        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        let job = tokio::spawn(async move { inner.run(generation, text, cancel).await });

        let mut jobs = self.inner.jobs();
        jobs.retain(|job| !job.is_finished());
        jobs.push(job);

        true
    }

    /// Halt the current utterance, if any. Always succeeds.
    pub fn stop(&self) -> bool {
        let halted = {
            let mut state = self.inner.state();
            self.inner.preempt(&mut state)
        };

        // The player is already silent, so the interrupted job's file can go
        // in this pass rather than waiting for the job to wake up.
        if let Some(generation) = halted {
            self.inner.janitor.release_generation(generation);
        }

        let pending = self.inner.janitor.cleanup();
        if halted.is_some() {
            tracing::info!(pending = pending.len(), "Speech stopped");
        } else {
            tracing::debug!("Stop requested while idle");
        }

        true
    }

    /// Whether audio is playing right now. Never waits on a running job.
    pub fn is_speaking(&self) -> bool {
        self.inner.speaking.load(Ordering::SeqCst)
    }

    pub fn janitor(&self) -> &Janitor {
        &self.inner.janitor
    }

    /// Wait until every background job has finished.
    pub async fn wait_idle(&self) {
        loop {
            let jobs = std::mem::take(&mut *self.inner.jobs());
            if jobs.is_empty() {
                return;
            }
            for job in jobs {
                if let Err(e) = job.await {
                    tracing::error!("Speech job panicked: {}", e);
                }
            }
        }
    }

    /// Stop speaking, let running jobs wind down and remove what they left.
    pub async fn shutdown(&self) {
        self.stop();
        self.wait_idle().await;

        let remaining = self.inner.janitor.cleanup();
        if remaining.is_empty() {
            tracing::info!("Speech output shut down cleanly");
        } else {
            for asset in &remaining {
                tracing::warn!("Leaving {} behind", asset.path().display());
            }
        }
    }
}

impl Inner {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn jobs(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_playing(&self, state: &mut State, playing: Option<Generation>) {
        state.playing = playing;
        self.speaking.store(playing.is_some(), Ordering::SeqCst);
    }

    /// Invalidate the current utterance and silence the player. Returns the
    /// generation whose audio was playing, if any.
    fn preempt(&self, state: &mut State) -> Option<Generation> {
        if let Some(utterance) = state.current.take() {
            utterance.cancel.cancel();
        }

        let generation = state.playing?;
        self.set_playing(state, None);
        self.player.stop();
        tracing::debug!(%generation, "Playback preempted");
        Some(generation)
    }

    async fn run(self: Arc<Self>, generation: Generation, text: String, cancel: CancellationToken) {
        let asset = match self.synthesize(generation, text, &cancel).await {
            Some(audio) => self.materialize(generation, &audio),
            None => None,
        };

        if let Some(asset) = &asset {
            self.play(asset, &cancel).await;
        }

        self.finish(generation, asset.as_ref());
    }

    async fn synthesize(
        &self,
        generation: Generation,
        text: String,
        cancel: &CancellationToken,
    ) -> Option<SynthesizedAudio> {
        let synthesizer = Arc::clone(&self.synthesizer);
        let task = tokio::task::spawn_blocking(move || synthesizer.synthesize(&text));

        // A superseded synthesis keeps running on its worker; the audio is
        // dropped there and never reaches disk.
        let result = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(%generation, "Superseded during synthesis");
                return None;
            }
            result = task => result,
        };

        match result {
            Ok(Ok(audio)) if self.state().is_current(generation) => {
                tracing::debug!(%generation, duration_ms = audio.duration.as_millis() as u64, "Synthesized");
                Some(audio)
            }
            Ok(Ok(_)) => {
                tracing::debug!(%generation, "Superseded during synthesis");
                None
            }
            Ok(Err(e)) => {
                tracing::error!(%generation, "Synthesis failed: {}", e);
                None
            }
            Err(e) => {
                tracing::error!(%generation, "Synthesis task failed: {}", e);
                None
            }
        }
    }

    fn materialize(&self, generation: Generation, audio: &SynthesizedAudio) -> Option<Asset> {
        match self.janitor.materialize(generation, audio) {
            Ok(asset) => Some(asset),
            Err(e) => {
                tracing::error!(%generation, "Could not store audio: {}", e);
                None
            }
        }
    }

    async fn play(&self, asset: &Asset, cancel: &CancellationToken) {
        let generation = asset.generation();

        {
            let mut state = self.state();
            if !state.is_current(generation) {
                tracing::debug!(%generation, "Superseded before playback");
                return;
            }
            if let Err(e) = self.player.play(asset) {
                tracing::error!(%generation, "Playback failed: {}", e);
                return;
            }
            self.set_playing(&mut state, Some(generation));
        }

        tracing::info!(%generation, duration_ms = asset.duration().as_millis() as u64, "Playback started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            let state = self.state();
            if state.playing != Some(generation) || !state.is_current(generation) {
                tracing::debug!(%generation, "Playback interrupted");
                return;
            }
            if !self.player.is_busy() {
                tracing::debug!(%generation, "Playback finished");
                return;
            }
        }
    }

    fn finish(&self, generation: Generation, asset: Option<&Asset>) {
        {
            let mut state = self.state();
            if state.playing == Some(generation) {
                self.set_playing(&mut state, None);
                if self.player.is_busy() {
                    self.player.stop();
                }
            }
            if state.is_current(generation) {
                state.current = None;
            }
        }

        if let Some(asset) = asset {
            self.janitor.release(asset);
        }
        let pending = self.janitor.cleanup();

        tracing::debug!(%generation, pending = pending.len(), "Utterance finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::testing::{MockPlayer, ScriptedSynthesizer};
    use std::time::Instant;

    struct Harness {
        controller: SpeechController,
        synthesizer: Arc<ScriptedSynthesizer>,
        player: Arc<MockPlayer>,
        dir: tempfile::TempDir,
    }

    fn harness(synthesizer: ScriptedSynthesizer, player: MockPlayer) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let synthesizer = Arc::new(synthesizer);
        let player = Arc::new(player);
        let controller = SpeechController::new(
            synthesizer.clone(),
            player.clone(),
            Janitor::new(dir.path().to_path_buf(), 16),
            Duration::from_millis(10),
        );
        Harness {
            controller,
            synthesizer,
            player,
            dir,
        }
    }

    fn files_in(dir: &tempfile::TempDir) -> usize {
        std::fs::read_dir(dir.path()).unwrap().count()
    }

    async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition()
    }

    #[tokio::test]
    async fn test_blank_text_rejected_without_side_effects() {
        let h = harness(ScriptedSynthesizer::new(), MockPlayer::new(Duration::from_millis(50)));

        assert!(!h.controller.speak(""));
        assert!(!h.controller.speak("   "));
        assert!(!h.controller.speak("\n\t"));

        h.controller.wait_idle().await;
        assert_eq!(h.synthesizer.calls(), 0);
        assert_eq!(h.controller.janitor().pending_len(), 0);
        assert_eq!(files_in(&h.dir), 0);
        assert!(h.player.played().is_empty());
    }

    #[tokio::test]
    async fn test_stop_while_idle_is_a_no_op() {
        let h = harness(ScriptedSynthesizer::new(), MockPlayer::new(Duration::from_millis(50)));

        assert!(h.controller.stop());
        assert!(h.controller.stop());

        assert!(!h.controller.is_speaking());
        assert_eq!(h.player.stop_calls(), 0);
        assert_eq!(h.controller.janitor().pending_len(), 0);
    }

    #[tokio::test]
    async fn test_speak_plays_to_completion_and_cleans_up() {
        let h = harness(ScriptedSynthesizer::new(), MockPlayer::new(Duration::from_millis(60)));

        assert!(h.controller.speak("The mitochondria is the powerhouse of the cell."));
        assert!(wait_until(Duration::from_secs(2), || h.controller.is_speaking()).await);

        h.controller.wait_idle().await;

        assert!(!h.controller.is_speaking());
        assert_eq!(h.player.played(), vec![1]);
        assert_eq!(h.controller.janitor().pending_len(), 0);
        assert_eq!(files_in(&h.dir), 0);
    }

    #[tokio::test]
    async fn test_stop_mid_playback() {
        let h = harness(ScriptedSynthesizer::new(), MockPlayer::new(Duration::from_secs(30)));

        assert!(h.controller.speak("Hello"));
        assert!(wait_until(Duration::from_secs(2), || h.controller.is_speaking()).await);

        assert!(h.controller.stop());
        assert!(!h.controller.is_speaking());
        assert!(!h.player.is_busy());

        // The stop's own cleanup already covered the interrupted asset.
        assert!(h.controller.janitor().cleanup().is_empty());
        assert_eq!(files_in(&h.dir), 0);

        h.controller.wait_idle().await;
        assert_eq!(h.controller.janitor().pending_len(), 0);
        assert!(!h.controller.is_speaking());
    }

    #[tokio::test]
    async fn test_is_speaking_does_not_wait_for_state_lock() {
        let h = harness(ScriptedSynthesizer::new(), MockPlayer::new(Duration::from_secs(30)));

        assert!(h.controller.speak("Hello"));
        assert!(wait_until(Duration::from_secs(2), || h.controller.is_speaking()).await);

        {
            let _held = h.controller.inner.state();
            assert!(h.controller.is_speaking());
        }

        h.controller.shutdown().await;
        assert!(!h.controller.is_speaking());
    }

    #[tokio::test]
    async fn test_newer_speak_supersedes_slow_synthesis() {
        let synthesizer = ScriptedSynthesizer::new().delay("A", Duration::from_millis(300));
        let h = harness(synthesizer, MockPlayer::new(Duration::from_millis(50)));

        assert!(h.controller.speak("A"));
        // Let A's synthesis get underway before B arrives.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.controller.speak("B"));

        h.controller.wait_idle().await;
        // A's blocking worker may still be sleeping; give it time to return.
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(h.player.played(), vec![2]);
        assert_eq!(h.player.overlaps(), 0);
        assert_eq!(h.controller.janitor().pending_len(), 0);
        assert_eq!(files_in(&h.dir), 0);
    }

    #[tokio::test]
    async fn test_newer_speak_interrupts_playback() {
        let h = harness(ScriptedSynthesizer::new(), MockPlayer::new(Duration::from_secs(30)));

        assert!(h.controller.speak("first"));
        assert!(wait_until(Duration::from_secs(2), || h.controller.is_speaking()).await);

        assert!(h.controller.speak("second"));
        assert!(wait_until(Duration::from_secs(2), || h.player.played().len() == 2).await);

        assert_eq!(h.player.played(), vec![1, 2]);
        assert_eq!(h.player.overlaps(), 0);
        assert!(h.controller.is_speaking());

        h.controller.shutdown().await;
        assert!(!h.controller.is_speaking());
        assert_eq!(h.controller.janitor().pending_len(), 0);
        assert_eq!(files_in(&h.dir), 0);
    }

    #[tokio::test]
    async fn test_burst_of_requests_never_overlaps() {
        let synthesizer = ScriptedSynthesizer::new()
            .delay("0", Duration::from_millis(40))
            .delay("2", Duration::from_millis(80))
            .delay("4", Duration::from_millis(5));
        let h = harness(synthesizer, MockPlayer::new(Duration::from_millis(100)));

        for i in 0..6 {
            assert!(h.controller.speak(&i.to_string()));
            tokio::time::sleep(Duration::from_millis(15)).await;
        }

        h.controller.wait_idle().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(h.player.overlaps(), 0);
        assert_eq!(h.player.played().last(), Some(&6));
        assert_eq!(h.controller.janitor().pending_len(), 0);
        assert_eq!(files_in(&h.dir), 0);
    }

    #[tokio::test]
    async fn test_failed_synthesis_never_speaks() {
        let synthesizer = ScriptedSynthesizer::new().fail("bad");
        let h = harness(synthesizer, MockPlayer::new(Duration::from_millis(50)));

        assert!(h.controller.speak("bad"));

        let spoke = wait_until(Duration::from_millis(200), || h.controller.is_speaking()).await;
        h.controller.wait_idle().await;

        assert!(!spoke);
        assert!(!h.controller.is_speaking());
        assert!(h.player.played().is_empty());
        assert_eq!(h.controller.janitor().pending_len(), 0);
        assert_eq!(files_in(&h.dir), 0);
    }

    #[tokio::test]
    async fn test_failed_playback_cleans_up() {
        let h = harness(ScriptedSynthesizer::new(), MockPlayer::failing());

        assert!(h.controller.speak("Hello"));
        h.controller.wait_idle().await;

        assert!(!h.controller.is_speaking());
        assert_eq!(h.controller.janitor().pending_len(), 0);
        assert_eq!(files_in(&h.dir), 0);
    }

    #[tokio::test]
    async fn test_stop_during_synthesis_discards_result() {
        let synthesizer = ScriptedSynthesizer::new().delay("slow", Duration::from_millis(200));
        let h = harness(synthesizer, MockPlayer::new(Duration::from_millis(50)));

        assert!(h.controller.speak("slow"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.controller.stop());

        h.controller.wait_idle().await;
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert!(h.player.played().is_empty());
        assert!(!h.controller.is_speaking());
        assert_eq!(files_in(&h.dir), 0);
    }

    #[tokio::test]
    async fn test_stop_after_natural_finish_is_a_no_op() {
        let h = harness(ScriptedSynthesizer::new(), MockPlayer::new(Duration::from_millis(20)));

        assert!(h.controller.speak("short"));
        h.controller.wait_idle().await;
        let stops = h.player.stop_calls();

        assert!(h.controller.stop());
        assert_eq!(h.player.stop_calls(), stops);
    }
}
