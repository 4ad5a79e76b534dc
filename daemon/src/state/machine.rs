//! Interaction state enum and its transition table
//!
//! One interaction cycle moves Ready -> Listening -> Processing -> Speaking
//! -> Ready. Idle is a cosmetic resting state entered from Ready after a
//! period of inactivity; it accepts triggers exactly like Ready.

use serde::{Deserialize, Serialize};

/// The five possible states of the appliance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    /// Nothing happened for a while, waiting for a trigger
    Idle,
    /// Waiting for a trigger
    Ready,
    /// Capturing audio from the microphone
    Listening,
    /// Transcribing, querying and synthesizing
    Processing,
    /// Playing back the reply
    Speaking,
}

impl Default for InteractionState {
    fn default() -> Self {
        Self::Idle
    }
}

impl std::fmt::Display for InteractionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InteractionState::Idle => write!(f, "Idle"),
            InteractionState::Ready => write!(f, "Ready"),
            InteractionState::Listening => write!(f, "Listening"),
            InteractionState::Processing => write!(f, "Processing"),
            InteractionState::Speaking => write!(f, "Speaking"),
        }
    }
}

impl InteractionState {
    /// Whether this state belongs to an in-flight interaction.
    ///
    /// The single-flight guard is held exactly while this returns true.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            InteractionState::Listening | InteractionState::Processing | InteractionState::Speaking
        )
    }

    /// Whether a new interaction may be admitted from this state
    pub fn accepts_trigger(self) -> bool {
        matches!(self, InteractionState::Idle | InteractionState::Ready)
    }

    /// Check a transition against the interaction cycle
    pub fn can_transition_to(self, next: InteractionState) -> bool {
        use InteractionState::*;

        matches!(
            (self, next),
            (Idle, Ready)
                | (Ready, Idle)
                | (Ready, Listening)
                | (Listening, Processing)
                | (Processing, Speaking)
                | (Speaking, Ready)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use InteractionState::*;

    const ALL: [InteractionState; 5] = [Idle, Ready, Listening, Processing, Speaking];

    #[test]
    fn test_initial_state() {
        assert_eq!(InteractionState::default(), Idle);
    }

    #[test]
    fn test_cycle_is_allowed() {
        let cycle = [Ready, Listening, Processing, Speaking, Ready];
        for pair in cycle.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_idle_round_trip() {
        assert!(Ready.can_transition_to(Idle));
        assert!(Idle.can_transition_to(Ready));
        assert!(!Idle.can_transition_to(Listening));
    }

    #[test]
    fn test_no_backwards_or_skipping_transitions() {
        assert!(!Listening.can_transition_to(Ready));
        assert!(!Processing.can_transition_to(Listening));
        assert!(!Speaking.can_transition_to(Processing));
        assert!(!Listening.can_transition_to(Speaking));
        assert!(!Processing.can_transition_to(Ready));
        assert!(!Speaking.can_transition_to(Idle));
    }

    #[test]
    fn test_self_transitions_rejected() {
        for state in ALL {
            assert!(!state.can_transition_to(state));
        }
    }

    #[test]
    fn test_active_and_accepting_are_complementary() {
        for state in ALL {
            assert_ne!(state.is_active(), state.accepts_trigger(), "{state}");
        }
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&Processing).unwrap();
        assert_eq!(json, "\"processing\"");
    }
}
