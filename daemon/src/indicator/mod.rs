//! Status indicator: outputs and the state-reactive driver loop

mod driver;
mod pattern;

use std::sync::{Mutex, PoisonError};

use rppal::gpio::OutputPin;
use tracing::trace;

use crate::gpio::{self, GpioError};

pub use driver::IndicatorDriver;

/// Single boolean actuation primitive
pub trait IndicatorOutput: Send + Sync {
    fn set(&self, on: bool) -> Result<(), GpioError>;
}

/// LED wired to a GPIO pin, active high, off when opened
pub struct GpioLed {
    pin: Mutex<OutputPin>,
}

impl GpioLed {
    pub fn open(pin: u32) -> Result<Self, GpioError> {
        Ok(Self {
            pin: Mutex::new(gpio::output_low(pin)?),
        })
    }
}

impl IndicatorOutput for GpioLed {
    fn set(&self, on: bool) -> Result<(), GpioError> {
        self.pin
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .write(gpio::level_for(on));
        Ok(())
    }
}

/// Stand-in used when no LED is available; traces level changes
#[derive(Debug, Default)]
pub struct LogIndicator;

impl IndicatorOutput for LogIndicator {
    fn set(&self, on: bool) -> Result<(), GpioError> {
        trace!(on, "indicator");
        Ok(())
    }
}
