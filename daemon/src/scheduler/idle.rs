use std::sync::Arc;

use tokio::time::sleep_until;
use tracing::{debug, info};

use super::Scheduler;
use crate::state::InteractionState;

impl Scheduler {
    /// Drop from Ready to Idle after the configured stretch without triggers
    pub async fn run_idle_timer(self: Arc<Self>) {
        let mut state_rx = self.subscribe_state();
        debug!(timeout = ?self.settings.inactivity_timeout, "idle timer started");

        loop {
            let state = *state_rx.borrow_and_update();
            if state != InteractionState::Ready {
                if state_rx.changed().await.is_err() {
                    break;
                }
                continue;
            }

            let deadline = self.lock().last_activity + self.settings.inactivity_timeout;
            tokio::select! {
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = sleep_until(deadline) => self.enter_idle_if_inactive(),
            }
        }
    }

    fn enter_idle_if_inactive(&self) {
        let mut core = self.lock();
        if core.state != InteractionState::Ready || core.held {
            return;
        }
        if core.last_activity.elapsed() < self.settings.inactivity_timeout {
            return;
        }

        info!("no activity, going idle");
        self.transition(&mut core, InteractionState::Idle);
    }
}
