//! Push button trigger
//!
//! Polls the button level, debounces it and reports each press edge.
//! After a press the button is ignored for a cooldown so one long or
//! bouncy press cannot start and immediately stop a recording.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rppal::gpio::InputPin;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::gpio::{self, GpioError};

/// Time between two level reads
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Anything that can tell whether the button is held down
pub trait ButtonSource: Send + Sync {
    fn is_pressed(&self) -> Result<bool, GpioError>;
}

/// Button between a GPIO pin and ground
///
/// The internal pull-up holds the pin high while the button is released.
pub struct GpioButton {
    pin: InputPin,
}

impl GpioButton {
    pub fn open(pin: u32) -> Result<Self, GpioError> {
        let input = gpio::input_pullup(pin)?;
        info!(pin, "button ready");
        Ok(Self { pin: input })
    }
}

impl ButtonSource for GpioButton {
    fn is_pressed(&self) -> Result<bool, GpioError> {
        Ok(gpio::is_closed_to_ground(self.pin.read()))
    }
}

/// Accepts a level change only once it has held for the whole window
#[derive(Debug)]
struct Debouncer {
    window: Duration,
    stable: bool,
    pending: Option<(bool, Instant)>,
}

impl Debouncer {
    fn new(window: Duration) -> Self {
        Self {
            window,
            stable: false,
            pending: None,
        }
    }

    /// Feed one sample; returns the new level when the stable level changes
    fn update(&mut self, level: bool, now: Instant) -> Option<bool> {
        if level == self.stable {
            self.pending = None;
            return None;
        }

        let since = match self.pending {
            Some((pending, since)) if pending == level => since,
            _ => {
                self.pending = Some((level, now));
                now
            }
        };
        if now.duration_since(since) < self.window {
            return None;
        }

        self.stable = level;
        self.pending = None;
        Some(level)
    }
}

/// Turns button levels into press events
pub struct ButtonListener {
    source: Box<dyn ButtonSource>,
    debounce: Duration,
    cooldown: Duration,
    running: Arc<AtomicBool>,
}

impl ButtonListener {
    pub fn new(source: Box<dyn ButtonSource>, debounce: Duration, cooldown: Duration) -> Self {
        Self {
            source,
            debounce,
            cooldown,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Poll until [`ButtonListener::stop`] is called, invoking `on_press` per press
    pub async fn run<F>(&self, mut on_press: F)
    where
        F: FnMut(),
    {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("button listener is already running");
            return;
        }
        info!("button listener started");

        let mut ticker = interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut debouncer = Debouncer::new(self.debounce);
        let mut quiet_until: Option<Instant> = None;
        let mut failing = false;

        while self.running.load(Ordering::SeqCst) {
            ticker.tick().await;

            let level = match self.source.is_pressed() {
                Ok(level) => {
                    failing = false;
                    level
                }
                Err(e) => {
                    if !failing {
                        warn!(error = %e, "failed to read button");
                        failing = true;
                    }
                    continue;
                }
            };

            let now = Instant::now();
            if debouncer.update(level, now) != Some(true) {
                continue;
            }
            if quiet_until.is_some_and(|until| now < until) {
                debug!("press ignored during cooldown");
                continue;
            }

            quiet_until = Some(now + self.cooldown);
            on_press();
        }

        info!("button listener stopped");
    }

    /// Stop polling; takes effect on the next tick
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
