//! Blink patterns, one per interaction state

use std::time::Duration;

use crate::state::InteractionState;

/// What to do with the LED at the start of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    On,
    Off,
    /// Invert whatever the LED currently shows
    Toggle,
}

/// One LED action followed by a hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub level: Level,
    pub hold: Duration,
}

const fn step(level: Level, hold_ms: u64) -> Step {
    Step {
        level,
        hold: Duration::from_millis(hold_ms),
    }
}

/// Number of quick flashes shown while speaking
pub const SPEAKING_FLASHES: usize = 3;

const IDLE: [Step; 3] = [
    step(Level::Off, 5000),
    step(Level::On, 100),
    step(Level::Off, 0),
];
const READY: [Step; 1] = [step(Level::On, 200)];
const LISTENING: [Step; 1] = [step(Level::Toggle, 100)];
const PROCESSING: [Step; 1] = [step(Level::Toggle, 500)];
const SPEAKING: [Step; SPEAKING_FLASHES * 2] = [
    step(Level::On, 100),
    step(Level::Off, 100),
    step(Level::On, 100),
    step(Level::Off, 100),
    step(Level::On, 100),
    step(Level::Off, 100),
];

/// The pattern rendered for `state`; a pure function of the state
pub fn pattern_for(state: InteractionState) -> &'static [Step] {
    match state {
        InteractionState::Idle => &IDLE,
        InteractionState::Ready => &READY,
        InteractionState::Listening => &LISTENING,
        InteractionState::Processing => &PROCESSING,
        InteractionState::Speaking => &SPEAKING,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_is_long_rest_then_single_flash() {
        let idle = pattern_for(InteractionState::Idle);
        assert_eq!(idle[0].level, Level::Off);
        assert!(idle[0].hold >= Duration::from_secs(1));
        assert_eq!(idle[1].level, Level::On);
        assert!(idle[1].hold < idle[0].hold);
        assert_eq!(idle.iter().filter(|s| s.level == Level::On).count(), 1);
        assert_eq!(idle.last().map(|s| s.level), Some(Level::Off));
    }

    #[test]
    fn test_ready_is_steady_on() {
        assert!(pattern_for(InteractionState::Ready)
            .iter()
            .all(|s| s.level == Level::On));
    }

    #[test]
    fn test_listening_toggles_faster_than_processing() {
        let listening = pattern_for(InteractionState::Listening);
        let processing = pattern_for(InteractionState::Processing);
        assert_eq!(listening[0].level, Level::Toggle);
        assert_eq!(processing[0].level, Level::Toggle);
        assert!(listening[0].hold < processing[0].hold);
    }

    #[test]
    fn test_speaking_flash_count() {
        let speaking = pattern_for(InteractionState::Speaking);
        let flashes = speaking.iter().filter(|s| s.level == Level::On).count();
        assert_eq!(flashes, SPEAKING_FLASHES);
        assert_eq!(speaking.last().map(|s| s.level), Some(Level::Off));
    }

    #[test]
    fn test_every_pattern_takes_time() {
        use InteractionState::*;
        for state in [Idle, Ready, Listening, Processing, Speaking] {
            let total: Duration = pattern_for(state).iter().map(|s| s.hold).sum();
            assert!(total > Duration::ZERO, "{state}");
        }
    }
}
