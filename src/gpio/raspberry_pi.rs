//! Raspberry Pi GPIO sampler using rppal.

use super::PinSampler;
use crate::error::{MonitorError, Result};
use crate::pins::PinId;
use rppal::gpio::{Gpio, InputPin};
use std::collections::HashMap;
use tracing::warn;

/// Reads lines configured as inputs with the internal pull-down enabled.
pub struct RaspberryPiSampler {
    inputs: HashMap<PinId, InputPin>,
}

impl RaspberryPiSampler {
    /// Open the GPIO chip and claim every pin in `pins` as an input.
    ///
    /// Pins that cannot be claimed (already in use, reserved) are returned
    /// alongside the sampler instead of failing the whole call.
    pub fn new(pins: &[PinId]) -> Result<(Self, Vec<(PinId, String)>)> {
        let gpio = Gpio::new()
            .map_err(|e| MonitorError::gpio_error(format!("Failed to initialize GPIO: {}", e)))?;

        let mut inputs = HashMap::with_capacity(pins.len());
        let mut unavailable = Vec::new();

        for &pin in pins {
            match gpio.get(pin) {
                Ok(line) => {
                    inputs.insert(pin, line.into_input_pulldown());
                }
                Err(e) => {
                    warn!("Failed to setup GPIO pin {}: {}", pin, e);
                    unavailable.push((pin, e.to_string()));
                }
            }
        }

        Ok((Self { inputs }, unavailable))
    }
}

impl PinSampler for RaspberryPiSampler {
    fn read(&mut self, pin: PinId) -> Result<bool> {
        self.inputs
            .get(&pin)
            .map(InputPin::is_high)
            .ok_or_else(|| MonitorError::gpio_error(format!("Pin {} is not claimed", pin)))
    }

    fn name(&self) -> &'static str {
        "rppal"
    }
}
