//! # pinwatch - Raspberry Pi digital input monitor
//!
//! Polls GPIO input lines at a fixed interval, tracks every line's edges,
//! transition counts and HIGH durations, and streams live updates to any
//! number of dashboard viewers.
//!
//! ## Features
//!
//! - **Edge tracking**: per-pin transition counters and HIGH-interval history
//! - **Bounded memory**: time-windowed, capped history per pin
//! - **Non-blocking fan-out**: slow viewers lose their oldest updates instead
//!   of stalling the sampler
//! - **Web dashboard**: REST endpoints and a WebSocket stream
//! - **Simulation**: runs without GPIO hardware (the `gpio` feature enables rppal)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pinwatch::{gpio, monitor, start_web_server, MonitorConfig, WebConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MonitorConfig::load("pinwatch.json")?.resolve()?;
//!     let opened = gpio::open_sampler(&config.pin_ids(), false)?;
//!     let (handle, task) = monitor::spawn(&config, opened.sampler);
//!
//!     start_web_server(WebConfig::default(), handle.clone()).await?;
//!     handle.shutdown();
//!     task.await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod gpio;
pub mod monitor;
pub mod pins;
pub mod web;

// Re-export public API
pub use broadcast::{EventBroadcaster, MonitorEvent, PinHistory, Subscription};
pub use config::{MonitorConfig, PinEntry, ResolvedConfig};
pub use error::{MonitorError, Result};
pub use gpio::{PinSampler, ScriptedSampler, SimulatedSampler};
pub use monitor::{MonitorHandle, MonitorLoop, MonitorStatus};
pub use pins::{
    Edge, HistorySample, HistoryStore, Pin, PinId, PinState, PinStateTracker, PinView, Snapshot,
    TransitionEvent,
};

#[cfg(feature = "gpio")]
pub use gpio::RaspberryPiSampler;

pub use web::{start_web_server, WebConfig};

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 5000;

/// The default configuration file name
pub const DEFAULT_CONFIG_PATH: &str = "pinwatch.json";
