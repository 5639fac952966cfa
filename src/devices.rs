//! External collaborator interfaces.
//!
//! The core drives hardware only through these traits; drivers are expected
//! to be non-blocking "latest value" reads backed by interrupt or DMA fed
//! peripherals. A simulator bridge can implement the same traits and the
//! core cannot tell the difference.

use core::cell::Cell;

use crate::modes::FlightMode;
use crate::nav::MissionItem;
use crate::scheduler::PerfCounters;
use crate::state::{ActuatorCommand, Attitude, BodyRates, GpsFix, Location, PilotInput};

/// Attitude estimator (DCM/EKF filter), external. The core calls
/// `update(dt_ms)` once per fast tick with the measured tick interval.
pub trait AttitudeEstimator {
    fn update(&mut self, dt_ms: u32);
    fn attitude(&self) -> Attitude;
    fn rates(&self) -> BodyRates;
}

/// GPS driver. `take_fix` has read-and-clear semantics: the fix parsed
/// since the previous call, or `None` if nothing new arrived.
pub trait GpsDriver {
    fn update(&mut self);
    fn take_fix(&mut self) -> Option<GpsFix>;
}

/// Radio decoder, latest decoded frame.
pub trait RadioInput {
    fn read(&mut self) -> PilotInput;
}

/// Barometer, altitude above the driver's pressure reference in cm.
/// The core subtracts its own ground baseline captured at arm time.
pub trait Barometer {
    fn altitude_cm(&mut self) -> i32;
}

/// Sonar range finder. `None` when the sensor is absent or has no echo.
pub trait SonarRanger {
    fn range_cm(&mut self) -> Option<i32>;
}

pub trait Compass {
    fn heading_cd(&mut self) -> i32;
    /// Persist the current declination/trim offsets (slow-tier hook).
    fn save_trim(&mut self);
}

pub trait BatteryMonitor {
    fn voltage(&mut self) -> f32;
    fn current_a(&mut self) -> f32;
}

/// Motor/servo mixer input. Called exactly once per fast tick.
pub trait ActuatorOutput {
    fn write(&mut self, cmd: ActuatorCommand);
}

/// Telemetry protocol encoder, external. The scheduler dictates the rates;
/// encoding is not this core's concern.
pub trait TelemetrySink {
    fn send_heartbeat(&mut self, mode: FlightMode, armed: bool);
    fn send_attitude(&mut self, att: Attitude);
    fn send_location(&mut self, loc: Location);
    fn send_performance(&mut self, perf: &PerfCounters);
    /// Super-slow current-sensor log line.
    fn log_current(&mut self, voltage: f32, current_a: f32);
}

/// Stored mission, external. The core owns only the cursor into it and the
/// reached-waypoint predicate.
pub trait MissionStore {
    fn get(&self, index: u16) -> Option<MissionItem>;
    fn count(&self) -> u16;
}

/// Everything the core borrows for one poll. Single-writer by construction:
/// the bundle is rebuilt on the control thread's stack each call.
pub struct Devices<'a> {
    pub attitude: &'a mut dyn AttitudeEstimator,
    pub gps: &'a mut dyn GpsDriver,
    pub radio: &'a mut dyn RadioInput,
    pub baro: &'a mut dyn Barometer,
    pub sonar: Option<&'a mut dyn SonarRanger>,
    pub compass: Option<&'a mut dyn Compass>,
    pub battery: &'a mut dyn BatteryMonitor,
    pub actuators: &'a mut dyn ActuatorOutput,
    pub telemetry: &'a mut dyn TelemetrySink,
    pub mission: &'a mut dyn MissionStore,
}

/// Single-writer/single-reader handoff for a fix produced from interrupt
/// context. This is the one point of true concurrency in the system, so the
/// read-and-clear is done with preemption disabled.
pub struct FixLatch {
    slot: critical_section::Mutex<Cell<Option<GpsFix>>>,
}

impl FixLatch {
    pub const fn new() -> Self {
        Self {
            slot: critical_section::Mutex::new(Cell::new(None)),
        }
    }

    /// Called from the driver's interrupt path. A newer fix replaces an
    /// unconsumed older one; the core always wants the latest sample.
    pub fn put(&self, fix: GpsFix) {
        critical_section::with(|cs| self.slot.borrow(cs).set(Some(fix)));
    }

    pub fn take(&self) -> Option<GpsFix> {
        critical_section::with(|cs| self.slot.borrow(cs).take())
    }
}

impl Default for FixLatch {
    fn default() -> Self {
        Self::new()
    }
}
