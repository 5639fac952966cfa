#![cfg_attr(not(test), no_std)]

//! Flight-control core for a multi-rotor autopilot.
//!
//! Everything in here is platform-agnostic: a cooperative fixed-rate
//! scheduler, the flight-mode state machine, the navigation engine,
//! altitude fusion and the failsafe supervisor. Hardware (IMU, GPS, radio,
//! ESCs, telemetry link) is reached only through the traits in [`devices`],
//! so the same core runs against real drivers or a simulator feed.
//!
//! The core never blocks and never panics: faults degrade behavior
//! (failure counters, sticky failsafe flags) instead of halting control.

pub mod altitude;
pub mod config;
pub mod core;
pub mod devices;
pub mod failsafe;
pub mod geo;
pub mod gps;
mod logging;
pub mod modes;
pub mod nav;
pub mod scheduler;
pub mod sitl;
pub mod stab;
pub mod state;

pub use crate::config::Config;
pub use crate::core::ControlCore;
pub use crate::devices::Devices;
pub use crate::modes::FlightMode;
pub use crate::state::{CoreEvent, Location};
