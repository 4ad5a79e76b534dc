//! Trigger sources
//!
//! The button and the console both feed presses into the shared
//! scheduler. Whether a press starts or stops a recording is decided
//! there, so the two sources can race freely.

mod button;
mod keyboard;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::events::TriggerSource;
use crate::scheduler::{PressOutcome, Scheduler, SchedulerError};

pub use button::{ButtonListener, GpioButton};
pub use keyboard::{KeyboardInput, KeyboardListener};

/// Forward a press to the scheduler and report what happened
pub fn dispatch_press(scheduler: &Arc<Scheduler>, source: TriggerSource) {
    log_outcome(source, scheduler.press(source));
}

/// Forward a console line to the scheduler
pub fn dispatch_keyboard(scheduler: &Arc<Scheduler>, input: KeyboardInput) {
    match input {
        KeyboardInput::Press => dispatch_press(scheduler, TriggerSource::Keyboard),
        KeyboardInput::Text(text) => {
            log_outcome(TriggerSource::Keyboard, scheduler.press_text(text));
        }
    }
}

fn log_outcome(source: TriggerSource, outcome: Result<PressOutcome, SchedulerError>) {
    match outcome {
        Ok(PressOutcome::Started(id)) => debug!(id, %source, "press started interaction"),
        Ok(PressOutcome::CancelRequested(id)) => debug!(id, %source, "press stopped recording"),
        Err(SchedulerError::Busy) => debug!(%source, "still busy with the last question, press ignored"),
        Err(e) => warn!(%source, error = %e, "press not handled"),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::sync::broadcast;
    use tokio::time::sleep;

    use super::*;
    use crate::scheduler::{Collaborators, SchedulerSettings};
    use crate::state::InteractionState;
    use crate::testing::{FakeCapture, FakePlayback, FakeStrategy};

    fn scheduler() -> Arc<Scheduler> {
        let (event_tx, _) = broadcast::channel(16);
        let settings = SchedulerSettings {
            max_recording: None,
            inactivity_timeout: Duration::from_secs(60),
            flash_wait: Duration::from_millis(1500),
            system_prompt: String::new(),
            speaker_enabled: true,
        };
        let collaborators = Collaborators {
            capture: Arc::new(FakeCapture::default()),
            strategy: Arc::new(FakeStrategy::default()),
            playback: Arc::new(FakePlayback::default()),
        };
        let scheduler = Arc::new(Scheduler::new(settings, collaborators, event_tx, None));
        scheduler.mark_ready();
        scheduler
    }

    #[tokio::test(start_paused = true)]
    async fn test_button_starts_and_keyboard_stops() {
        let scheduler = scheduler();

        dispatch_press(&scheduler, TriggerSource::Button);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(scheduler.state(), InteractionState::Listening);

        dispatch_keyboard(&scheduler, KeyboardInput::Press);
        sleep(Duration::from_millis(10)).await;
        assert_eq!(scheduler.snapshot(), (InteractionState::Ready, false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_typed_question_runs_without_recording() {
        let scheduler = scheduler();

        dispatch_keyboard(&scheduler, KeyboardInput::Text("hi".to_string()));
        sleep(Duration::from_millis(10)).await;
        assert_eq!(scheduler.snapshot(), (InteractionState::Ready, false));
    }
}
