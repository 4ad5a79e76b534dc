//! Free-running LED driver
//!
//! Reads the interaction state, renders its pattern step by step and
//! restarts as soon as the state changes. The driver never writes state;
//! it only reports each completed speaking flash sequence on a counter
//! the scheduler waits on before returning to Ready.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::pattern::{pattern_for, Level};
use super::IndicatorOutput;
use crate::state::InteractionState;

/// How a pattern pass ended
enum Render {
    /// Every step was shown
    Completed,
    /// The state changed mid-pattern
    Interrupted,
    /// The scheduler went away
    Closed,
}

/// Drives an indicator output from the published interaction state
pub struct IndicatorDriver {
    output: Arc<dyn IndicatorOutput>,
    state_rx: watch::Receiver<InteractionState>,
    flash_tx: watch::Sender<u64>,
    lit: bool,
    failing: bool,
}

impl IndicatorDriver {
    pub fn new(
        output: Arc<dyn IndicatorOutput>,
        state_rx: watch::Receiver<InteractionState>,
        flash_tx: watch::Sender<u64>,
    ) -> Self {
        Self {
            output,
            state_rx,
            flash_tx,
            lit: false,
            failing: false,
        }
    }

    /// Run until the state publisher is dropped, then switch the LED off
    pub async fn run(mut self) {
        info!("indicator driver started");

        loop {
            let state = *self.state_rx.borrow_and_update();
            match self.render(state).await {
                Render::Completed if state == InteractionState::Speaking => {
                    self.flash_tx.send_modify(|count| *count += 1);
                    debug!("speaking flash sequence complete");
                }
                Render::Completed | Render::Interrupted => {}
                Render::Closed => break,
            }
        }

        self.apply(Level::Off);
        info!("indicator driver stopped");
    }

    /// Show one pass of the pattern for `state`
    async fn render(&mut self, state: InteractionState) -> Render {
        for step in pattern_for(state) {
            self.apply(step.level);

            tokio::select! {
                _ = sleep(step.hold) => {}
                changed = self.state_rx.changed() => {
                    return match changed {
                        Ok(()) => Render::Interrupted,
                        Err(_) => Render::Closed,
                    };
                }
            }
        }
        Render::Completed
    }

    fn apply(&mut self, level: Level) {
        let on = match level {
            Level::On => true,
            Level::Off => false,
            Level::Toggle => !self.lit,
        };
        self.lit = on;

        match self.output.set(on) {
            Ok(()) => self.failing = false,
            Err(e) if !self.failing => {
                warn!(error = %e, "indicator output failed");
                self.failing = true;
            }
            Err(_) => {}
        }
    }
}
