//! Events module for interaction lifecycle notifications
//!
//! Provides structured event types for state transitions, trigger
//! admission and rejection, and per-stage pipeline outcomes.

use serde::{Deserialize, Serialize};

use crate::state::InteractionState;

/// Where a trigger came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// Physical push button on the GPIO header
    Button,
    /// ENTER on the console
    Keyboard,
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerSource::Button => write!(f, "button"),
            TriggerSource::Keyboard => write!(f, "keyboard"),
        }
    }
}

/// Pipeline stage names used in failure reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Capture,
    Transcribe,
    Query,
    Synthesize,
    Playback,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Capture => "capture",
            Stage::Transcribe => "transcribe",
            Stage::Query => "query",
            Stage::Synthesize => "synthesize",
            Stage::Playback => "playback",
        };
        f.write_str(name)
    }
}

/// Why the recording phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A trigger source asked to stop
    Cancelled,
    /// The maximum recording duration elapsed
    Timeout,
    /// Nothing was recorded because the prompt was typed
    TextInput,
    /// The capture device could not be started
    Failed,
}

/// Events emitted by the scheduler during an interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StateEvent {
    /// The interaction state changed
    StateChanged {
        from: InteractionState,
        to: InteractionState,
    },

    /// A trigger was admitted and an interaction started
    InteractionAdmitted { id: u64, source: TriggerSource },

    /// A trigger arrived while an interaction was in flight
    TriggerRejected { source: TriggerSource },

    /// The recording phase ended
    CaptureStopped {
        id: u64,
        reason: StopReason,
        /// Length of the captured audio in milliseconds
        duration_ms: u64,
    },

    /// A pipeline stage failed and the cycle was forced forward
    StageFailed {
        id: u64,
        stage: Stage,
        message: String,
    },

    /// The interaction finished and the guard was released
    InteractionComplete {
        id: u64,
        /// Wall-clock duration of the whole cycle in milliseconds
        duration_ms: u64,
    },
}

impl std::fmt::Display for StateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateEvent::StateChanged { from, to } => write!(f, "STATE_CHANGED ({from} -> {to})"),
            StateEvent::InteractionAdmitted { id, source } => {
                write!(f, "INTERACTION_ADMITTED (#{id} via {source})")
            }
            StateEvent::TriggerRejected { source } => write!(f, "TRIGGER_REJECTED ({source})"),
            StateEvent::CaptureStopped {
                id,
                reason,
                duration_ms,
            } => write!(f, "CAPTURE_STOPPED (#{id} {reason:?} {duration_ms}ms)"),
            StateEvent::StageFailed { id, stage, message } => {
                write!(f, "STAGE_FAILED (#{id} {stage}: {message})")
            }
            StateEvent::InteractionComplete { id, duration_ms } => {
                write!(f, "INTERACTION_COMPLETE (#{id} {duration_ms}ms)")
            }
        }
    }
}
