//! One interaction cycle: record, transcribe, query, synthesize, speak
//!
//! A stage failure never ends the cycle early. The error is logged and
//! reported, the remaining stages are skipped, and the state still walks
//! Processing, Speaking and back to Ready.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, error, info, warn};

use super::{Input, InteractionHandle, Scheduler};
use crate::audio::{AudioError, AudioHandle};
use crate::events::{Stage, StateEvent, StopReason};
use crate::state::InteractionState;

/// Releases the guard however the cycle ends, including when its task is aborted
struct ReleaseOnDrop<'a> {
    scheduler: &'a Scheduler,
    id: u64,
    admitted_at: Instant,
}

impl Drop for ReleaseOnDrop<'_> {
    fn drop(&mut self) {
        self.scheduler.release(self.id, self.admitted_at);
    }
}

impl Scheduler {
    /// Drive an admitted interaction until it is back in Ready
    pub async fn run_interaction(self: Arc<Self>, handle: InteractionHandle) {
        let _release = ReleaseOnDrop {
            scheduler: &*self,
            id: handle.id,
            admitted_at: handle.admitted_at,
        };

        debug!(id = handle.id, source = %handle.source, "interaction running");
        let reply = self.respond(&handle).await;
        self.speak(handle.id, reply).await;
    }

    /// Everything up to the synthesized reply; `None` when there is nothing to say
    async fn respond(&self, handle: &InteractionHandle) -> Option<AudioHandle> {
        let id = handle.id;
        let strategy = &self.collaborators.strategy;

        let prompt = match &handle.input {
            Input::Text(text) => {
                self.enter_processing(id, StopReason::TextInput, Duration::ZERO);
                text.trim().to_string()
            }
            Input::Capture => {
                let (reason, recorded) = self.record().await;
                let duration = recorded.as_ref().map(AudioHandle::duration).unwrap_or_default();
                self.enter_processing(id, reason, duration);

                let audio = match recorded {
                    Ok(audio) => audio,
                    Err(e) => {
                        self.stage_failed(id, Stage::Capture, &e);
                        return None;
                    }
                };
                if audio.is_empty() {
                    info!(id, "nothing was recorded");
                    return None;
                }

                match strategy.transcribe(&audio).await {
                    Ok(text) => text.trim().to_string(),
                    Err(e) => {
                        self.stage_failed(id, Stage::Transcribe, &e);
                        return None;
                    }
                }
            }
        };

        if prompt.is_empty() {
            info!(id, "no speech recognised");
            return None;
        }
        info!(id, prompt = %prompt, "you said");

        let reply = match strategy.query(&prompt, &self.settings.system_prompt).await {
            Ok(reply) => reply,
            Err(e) => {
                self.stage_failed(id, Stage::Query, &e);
                return None;
            }
        };
        info!(id, reply = %reply, "assistant replied");

        if !self.settings.speaker_enabled {
            return None;
        }

        match strategy.synthesize(&reply).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                self.stage_failed(id, Stage::Synthesize, &e);
                None
            }
        }
    }

    /// Record until a cancel request or the maximum duration
    async fn record(&self) -> (StopReason, Result<AudioHandle, AudioError>) {
        let session = match self.collaborators.capture.start().await {
            Ok(session) => session,
            Err(e) => return (StopReason::Failed, Err(e)),
        };

        let reason = self.wait_for_stop().await;
        (reason, session.stop().await)
    }

    async fn wait_for_stop(&self) -> StopReason {
        let deadline = self.settings.max_recording.map(|max| Instant::now() + max);

        loop {
            // Permits left over from an earlier cycle only cause a re-check
            let notified = self.cancel.notified();
            if self.cancel_requested() {
                return StopReason::Cancelled;
            }

            match deadline {
                Some(deadline) => tokio::select! {
                    _ = notified => {}
                    _ = sleep_until(deadline) => return StopReason::Timeout,
                },
                None => notified.await,
            }
        }
    }

    fn enter_processing(&self, id: u64, reason: StopReason, recorded: Duration) {
        let duration_ms = recorded.as_millis() as u64;

        let mut core = self.lock();
        self.transition(&mut core, InteractionState::Processing);
        info!(id, ?reason, duration_ms, "recording stopped");
        self.emit(StateEvent::CaptureStopped {
            id,
            reason,
            duration_ms,
        });
    }

    /// Play the reply if there is one, then wait for the indicator to finish flashing
    async fn speak(&self, id: u64, reply: Option<AudioHandle>) {
        let flashes_before = self.flash_rx.as_ref().map(|rx| *rx.borrow());
        {
            let mut core = self.lock();
            self.transition(&mut core, InteractionState::Speaking);
        }

        if let Some(audio) = reply {
            if let Err(e) = self.collaborators.playback.play(&audio).await {
                warn!(id, error = %e, "playback failed");
                self.emit(StateEvent::StageFailed {
                    id,
                    stage: Stage::Playback,
                    message: e.to_string(),
                });
            }

            if let Err(e) = tokio::fs::remove_file(audio.path()).await {
                debug!(id, path = %audio.path().display(), error = %e, "could not remove reply audio");
            }
        }

        if let Some(before) = flashes_before {
            self.await_flash_sequence(before).await;
        }
    }

    async fn await_flash_sequence(&self, before: u64) {
        let Some(mut flash_rx) = self.flash_rx.clone() else {
            return;
        };

        let wait = self.settings.flash_wait;
        // The borrowed `Ref` must not outlive `flash_rx`
        let outcome = timeout(wait, flash_rx.wait_for(|count| *count > before))
            .await
            .map(|seen| seen.is_ok());
        match outcome {
            Ok(true) => debug!("speaking flash sequence observed"),
            Ok(false) => debug!("indicator driver gone, not waiting for flashes"),
            Err(_) => warn!(?wait, "speaking flash sequence did not finish in time"),
        }
    }

    fn stage_failed(&self, id: u64, stage: Stage, error: &dyn Display) {
        error!(id, %stage, error = %error, "stage failed, moving on");
        self.emit(StateEvent::StageFailed {
            id,
            stage,
            message: error.to_string(),
        });
    }
}
