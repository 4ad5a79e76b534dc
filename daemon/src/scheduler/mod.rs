//! Interaction scheduler
//!
//! Owns the interaction state, the single-flight guard and the
//! cancellation flag, all behind one mutex. Trigger sources call into a
//! shared `Arc<Scheduler>`; the indicator driver and the idle timer
//! observe state through a watch channel that is only written while the
//! mutex is held, so every observer sees transitions in order.

mod idle;
mod pipeline;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch, Notify};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::audio::{AudioCapture, AudioPlayback};
use crate::backend::BackendStrategy;
use crate::config::Config;
use crate::events::{StateEvent, TriggerSource};
use crate::state::InteractionState;

/// Errors returned to trigger sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    #[error("an interaction is already in flight")]
    Busy,

    #[error("no interaction is recording")]
    NoActiveInteraction,
}

/// Tunables for the interaction cycle
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Recording stops on its own after this long
    pub max_recording: Option<Duration>,
    /// Ready falls back to Idle after this long without a trigger
    pub inactivity_timeout: Duration,
    /// Upper bound on waiting for the speaking flash sequence
    pub flash_wait: Duration,
    pub system_prompt: String,
    /// Play synthesized replies; when false they are only logged
    pub speaker_enabled: bool,
}

impl SchedulerSettings {
    pub fn from_config(config: &Config, speaker_enabled: bool) -> Self {
        Self {
            max_recording: config.max_recording(),
            inactivity_timeout: config.inactivity_timeout(),
            flash_wait: config.flash_wait(),
            system_prompt: config.system_prompt.clone(),
            speaker_enabled,
        }
    }
}

/// The external collaborators one interaction runs through
pub struct Collaborators {
    pub capture: Arc<dyn AudioCapture>,
    pub strategy: Arc<dyn BackendStrategy>,
    pub playback: Arc<dyn AudioPlayback>,
}

/// What feeds the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Record from the microphone
    Capture,
    /// Use typed text and skip capture and transcription
    Text(String),
}

/// A trigger event waiting for admission
#[derive(Debug, Clone, Copy)]
struct InteractionRequest {
    id: u64,
    source: TriggerSource,
}

/// An admitted interaction; pass it to [`Scheduler::run_interaction`]
#[derive(Debug)]
pub struct InteractionHandle {
    id: u64,
    source: TriggerSource,
    input: Input,
    admitted_at: Instant,
}

impl InteractionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Result of a press from a trigger source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PressOutcome {
    /// A new interaction was admitted and spawned
    Started(u64),
    /// The recording of this interaction was asked to stop
    CancelRequested(u64),
}

/// Mutable state shared by all tasks
#[derive(Debug)]
struct Core {
    state: InteractionState,
    /// Single-flight guard
    held: bool,
    cancel_requested: bool,
    active: Option<u64>,
    next_id: u64,
    last_activity: Instant,
}

pub struct Scheduler {
    core: Mutex<Core>,
    state_tx: watch::Sender<InteractionState>,
    cancel: Notify,
    event_tx: broadcast::Sender<StateEvent>,
    /// Completed speaking flash sequences, reported by the indicator driver
    flash_rx: Option<watch::Receiver<u64>>,
    collaborators: Collaborators,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(
        settings: SchedulerSettings,
        collaborators: Collaborators,
        event_tx: broadcast::Sender<StateEvent>,
        flash_rx: Option<watch::Receiver<u64>>,
    ) -> Self {
        let (state_tx, _) = watch::channel(InteractionState::Idle);

        Self {
            core: Mutex::new(Core {
                state: InteractionState::Idle,
                held: false,
                cancel_requested: false,
                active: None,
                next_id: 1,
                last_activity: Instant::now(),
            }),
            state_tx,
            cancel: Notify::new(),
            event_tx,
            flash_rx,
            collaborators,
            settings,
        }
    }

    /// Observe state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<InteractionState> {
        self.state_tx.subscribe()
    }

    /// Get the current state
    pub fn state(&self) -> InteractionState {
        self.lock().state
    }

    /// Current state and whether the guard is held, read atomically
    #[cfg(test)]
    pub fn snapshot(&self) -> (InteractionState, bool) {
        let core = self.lock();
        (core.state, core.held)
    }

    /// Leave the startup Idle state once everything is wired up
    pub fn mark_ready(&self) {
        let mut core = self.lock();
        if core.state == InteractionState::Idle {
            core.last_activity = Instant::now();
            self.transition(&mut core, InteractionState::Ready);
        }
    }

    /// Admit a new interaction iff the guard is free
    ///
    /// On success the guard is held, the cancellation flag is cleared and
    /// the state moves to Listening. On `Busy` nothing changes.
    pub fn submit_trigger(&self, source: TriggerSource) -> Result<InteractionHandle, SchedulerError> {
        let mut core = self.lock();
        self.admit(&mut core, source, Input::Capture)
    }

    /// Admit an interaction whose prompt was typed instead of spoken
    pub fn submit_text(&self, text: String) -> Result<InteractionHandle, SchedulerError> {
        let mut core = self.lock();
        self.admit(&mut core, TriggerSource::Keyboard, Input::Text(text))
    }

    /// Ask the in-flight recording to stop
    pub fn request_cancel(&self) -> Result<u64, SchedulerError> {
        let mut core = self.lock();
        self.cancel_recording(&mut core)
    }

    /// Handle a press: stop a running recording, otherwise start a new interaction
    ///
    /// A press that races a fresh admission from another source comes back
    /// `Busy` instead of stopping a recording nobody has spoken into yet.
    pub fn press(self: &Arc<Self>, source: TriggerSource) -> Result<PressOutcome, SchedulerError> {
        match self.request_cancel() {
            Ok(id) => {
                info!(id, %source, "stop requested");
                return Ok(PressOutcome::CancelRequested(id));
            }
            Err(SchedulerError::NoActiveInteraction) => {}
            Err(e) => return Err(e),
        }

        let handle = self.submit_trigger(source)?;
        let id = handle.id();
        self.spawn(handle);
        Ok(PressOutcome::Started(id))
    }

    /// Start an interaction on typed text
    pub fn press_text(self: &Arc<Self>, text: String) -> Result<PressOutcome, SchedulerError> {
        let handle = self.submit_text(text)?;
        let id = handle.id();
        self.spawn(handle);
        Ok(PressOutcome::Started(id))
    }

    fn spawn(self: &Arc<Self>, handle: InteractionHandle) {
        tokio::spawn(Arc::clone(self).run_interaction(handle));
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn admit(
        &self,
        core: &mut Core,
        source: TriggerSource,
        input: Input,
    ) -> Result<InteractionHandle, SchedulerError> {
        let request = InteractionRequest {
            id: core.next_id,
            source,
        };
        core.next_id += 1;

        if core.held || !core.state.accepts_trigger() {
            debug!(?request, state = %core.state, "trigger rejected, interaction in flight");
            self.emit(StateEvent::TriggerRejected { source });
            return Err(SchedulerError::Busy);
        }

        // Ready is published before the guard is taken
        if core.state == InteractionState::Idle {
            self.transition(core, InteractionState::Ready);
        }

        core.held = true;
        core.cancel_requested = false;
        core.active = Some(request.id);
        core.last_activity = Instant::now();
        self.transition(core, InteractionState::Listening);

        info!(id = request.id, source = %request.source, "interaction admitted");
        self.emit(StateEvent::InteractionAdmitted {
            id: request.id,
            source: request.source,
        });

        Ok(InteractionHandle {
            id: request.id,
            source: request.source,
            input,
            admitted_at: Instant::now(),
        })
    }

    fn cancel_recording(&self, core: &mut Core) -> Result<u64, SchedulerError> {
        match (core.state, core.active) {
            (InteractionState::Listening, Some(id)) => {
                core.cancel_requested = true;
                self.cancel.notify_one();
                Ok(id)
            }
            _ => {
                debug!(state = %core.state, "cancel ignored, nothing is recording");
                Err(SchedulerError::NoActiveInteraction)
            }
        }
    }

    fn cancel_requested(&self) -> bool {
        self.lock().cancel_requested
    }

    /// Move to `to`, publishing the change; caller holds the lock
    fn transition(&self, core: &mut Core, to: InteractionState) {
        let from = core.state;
        if from == to {
            return;
        }
        if !from.can_transition_to(to) {
            warn!(%from, %to, "unexpected state transition");
        }

        debug_assert_eq!(
            to.is_active(),
            core.held,
            "{to} published with the guard {}",
            if core.held { "held" } else { "free" }
        );

        core.state = to;
        self.state_tx.send_replace(to);

        info!(from = %from, to = %to, id = ?core.active, "state transition");
        self.emit(StateEvent::StateChanged { from, to });
    }

    /// Return to Ready and release the guard
    fn release(&self, id: u64, admitted_at: Instant) {
        let mut core = self.lock();
        if core.active != Some(id) {
            return;
        }

        if core.state != InteractionState::Speaking {
            // Only reachable when the pipeline was torn down mid-flight
            warn!(id, state = %core.state, "forcing interaction back to Ready");
        }
        core.held = false;
        core.cancel_requested = false;
        self.transition(&mut core, InteractionState::Ready);
        core.active = None;
        core.last_activity = Instant::now();

        let duration_ms = admitted_at.elapsed().as_millis() as u64;
        info!(id, duration_ms, "interaction complete");
        self.emit(StateEvent::InteractionComplete { id, duration_ms });
    }

    fn emit(&self, event: StateEvent) {
        let _ = self.event_tx.send(event);
    }
}
