//! Simulated input lines for machines without GPIO hardware.

use super::PinSampler;
use crate::error::{MonitorError, Result};
use crate::pins::PinId;
use std::collections::HashMap;

/// Drives each pin with a square wave whose HIGH and LOW phases depend on
/// the pin number, so neighbouring pins do not toggle in lockstep.
#[derive(Debug, Clone)]
pub struct SimulatedSampler {
    reads: HashMap<PinId, u64>,
}

impl SimulatedSampler {
    pub fn new(pins: &[PinId]) -> Self {
        Self {
            reads: pins.iter().map(|&pin| (pin, 0)).collect(),
        }
    }

    /// Level of `pin` on its `n`th read.
    fn level_at(pin: PinId, n: u64) -> bool {
        let high = u64::from(pin % 5) * 4 + 3;
        let low = u64::from(pin % 7) * 6 + 5;
        let phase = (n + u64::from(pin)) % (high + low);
        phase < high
    }
}

impl PinSampler for SimulatedSampler {
    fn read(&mut self, pin: PinId) -> Result<bool> {
        let count = self
            .reads
            .get_mut(&pin)
            .ok_or_else(|| MonitorError::gpio_error(format!("Pin {} is not simulated", pin)))?;
        let level = Self::level_at(pin, *count);
        *count += 1;
        Ok(level)
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_pin_toggles() {
        let mut sampler = SimulatedSampler::new(&[17]);
        let levels: Vec<bool> = (0..100).map(|_| sampler.read(17).unwrap()).collect();
        assert!(levels.contains(&true));
        assert!(levels.contains(&false));
    }

    #[test]
    fn test_unknown_pin_errors() {
        let mut sampler = SimulatedSampler::new(&[17]);
        assert!(sampler.read(4).is_err());
    }
}
