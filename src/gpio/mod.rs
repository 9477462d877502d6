//! Reading digital input lines.
//!
//! The hardware backend uses rppal and is feature-gated so the crate builds
//! on machines without a GPIO chip. Without it (or when the chip cannot be
//! opened) a simulated sampler keeps the dashboard alive.

mod scripted;
mod simulated;

#[cfg(feature = "gpio")]
mod raspberry_pi;

pub use scripted::ScriptedSampler;
pub use simulated::SimulatedSampler;

#[cfg(feature = "gpio")]
pub use raspberry_pi::RaspberryPiSampler;

use crate::error::Result;
use crate::pins::PinId;
use tracing::{info, warn};

/// Reads the current level of a single line.
///
/// Implementations are owned by the monitor task and called once per pin
/// per tick. A read error is treated as transient.
pub trait PinSampler: Send {
    /// Read the level of `pin`; `true` is HIGH.
    fn read(&mut self, pin: PinId) -> Result<bool>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

impl<S: PinSampler + ?Sized> PinSampler for Box<S> {
    fn read(&mut self, pin: PinId) -> Result<bool> {
        (**self).read(pin)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Outcome of opening the sampler for a set of pins.
pub struct OpenedSampler {
    pub sampler: Box<dyn PinSampler>,
    /// Pins that could not be claimed, with the reason
    pub unavailable: Vec<(PinId, String)>,
}

/// Whether this build can talk to real hardware.
pub fn hardware_supported() -> bool {
    cfg!(feature = "gpio")
}

/// Open the best available sampler for `pins`.
///
/// With `simulate` set, or without hardware support, the simulated sampler
/// is returned. If the GPIO chip cannot be opened the simulated sampler is
/// used as a fallback.
pub fn open_sampler(pins: &[PinId], simulate: bool) -> Result<OpenedSampler> {
    if simulate {
        info!("Using simulated GPIO input");
        return Ok(simulated(pins));
    }

    #[cfg(feature = "gpio")]
    {
        match RaspberryPiSampler::new(pins) {
            Ok((sampler, unavailable)) => {
                info!(
                    "GPIO initialised, {} of {} pins claimed as inputs",
                    pins.len() - unavailable.len(),
                    pins.len()
                );
                return Ok(OpenedSampler {
                    sampler: Box::new(sampler),
                    unavailable,
                });
            }
            Err(e) => {
                warn!("Failed to initialize GPIO ({}), falling back to simulation", e);
            }
        }
    }

    #[cfg(not(feature = "gpio"))]
    warn!("GPIO support not compiled in, using simulated input");

    Ok(simulated(pins))
}

fn simulated(pins: &[PinId]) -> OpenedSampler {
    OpenedSampler {
        sampler: Box::new(SimulatedSampler::new(pins)),
        unavailable: Vec::new(),
    }
}
