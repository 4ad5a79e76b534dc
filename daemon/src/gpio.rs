//! GPIO pins by BCM number
//!
//! Pins are claimed through rppal, which puts them back into their previous
//! mode when dropped, so nothing is left configured after exit.

use rppal::gpio::{Gpio, InputPin, Level, OutputPin, Pin};

/// Errors claiming a GPIO pin
#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("gpio{pin} is not a valid BCM pin number")]
    InvalidPin { pin: u32 },

    #[error("failed to claim gpio{pin}: {source}")]
    Claim {
        pin: u32,
        #[source]
        source: rppal::gpio::Error,
    },
}

fn claim(pin: u32) -> Result<Pin, GpioError> {
    let bcm = u8::try_from(pin).map_err(|_| GpioError::InvalidPin { pin })?;
    Gpio::new()
        .and_then(|gpio| gpio.get(bcm))
        .map_err(|source| GpioError::Claim { pin, source })
}

/// Claim `pin` as an input with the internal pull-up enabled
pub fn input_pullup(pin: u32) -> Result<InputPin, GpioError> {
    Ok(claim(pin)?.into_input_pullup())
}

/// Claim `pin` as an output, driven low before it is handed out
pub fn output_low(pin: u32) -> Result<OutputPin, GpioError> {
    Ok(claim(pin)?.into_output_low())
}

/// A switch to ground on a pulled-up pin reads low while closed
pub fn is_closed_to_ground(level: Level) -> bool {
    level == Level::Low
}

pub fn level_for(high: bool) -> Level {
    if high {
        Level::High
    } else {
        Level::Low
    }
}
