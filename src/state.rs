//! Shared state types passed between the control-core components.
//!
//! All types are `Copy`; the core owns exactly one instance of each piece of
//! state and mutates it only from the scheduler's call sequence.

// ── Geodetic position ─────────────────────────────────────────────────────────

/// Fixed-point geodetic position. Latitude/longitude are degrees ×1e7,
/// altitude is centimeters relative to home.
///
/// `lat == 0 && lng == 0` is the "no fix" sentinel inherited from the wire
/// format; use [`Location::is_zero`] instead of comparing fields, and prefer
/// `Option<Location>` at the has-fix seams.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Location {
    pub lat: i32,
    pub lng: i32,
    pub alt: i32,
}

impl Location {
    pub const fn new(lat: i32, lng: i32, alt: i32) -> Self {
        Self { lat, lng, alt }
    }

    /// Degenerate coordinate check (equator/prime-meridian sentinel).
    pub fn is_zero(&self) -> bool {
        self.lat == 0 && self.lng == 0
    }
}

// ── Attitude ─────────────────────────────────────────────────────────────────

/// Euler attitude from the external estimator, hundredths of a degree.
/// Yaw is wrapped into [0, 36000).
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Attitude {
    pub roll_cd: i32,
    pub pitch_cd: i32,
    pub yaw_cd: i32,
}

/// Body-frame angular rates from the external estimator, degrees per second.
#[derive(Clone, Copy, Debug, Default)]
pub struct BodyRates {
    pub roll_dps: f32,
    pub pitch_dps: f32,
    pub yaw_dps: f32,
}

// ── Pilot input ──────────────────────────────────────────────────────────────

/// Decoded radio input, latest-value semantics. Roll/pitch/yaw sticks are
/// centidegrees of demanded deflection (−4500..4500, pitch positive =
/// stick forward); throttle is 0..1000.
#[derive(Clone, Copy, Debug, Default)]
pub struct PilotInput {
    pub roll_cd: i32,
    pub pitch_cd: i32,
    pub yaw_cd: i32,
    pub throttle: i32,
    /// Raw throttle channel value, used for the radio-loss floor check.
    pub throttle_raw: u16,
    /// Three-position mode switch reading, 0..=2.
    pub mode_switch: u8,
    /// Trim capture switch (must be held, see the mode state machine).
    pub trim_switch: bool,
}

// ── GPS ──────────────────────────────────────────────────────────────────────

/// One GPS fix as delivered by the external driver.
#[derive(Clone, Copy, Debug, Default)]
pub struct GpsFix {
    /// Degrees ×1e7.
    pub lat: i32,
    /// Degrees ×1e7.
    pub lng: i32,
    /// Centimeters above mean sea level.
    pub alt_cm: i32,
    pub ground_speed_cms: u32,
    pub ground_course_cd: i32,
    pub fix_valid: bool,
    pub sats: u8,
}

// ── Actuator command ─────────────────────────────────────────────────────────

/// Target written to the external mixer each fast tick. Roll/pitch/yaw are
/// stabilizer output in centi-units (−4500..4500), throttle 0..1000.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ActuatorCommand {
    pub roll: i16,
    pub pitch: i16,
    pub yaw: i16,
    pub throttle: i16,
}

impl ActuatorCommand {
    pub const ZERO: Self = Self {
        roll: 0,
        pitch: 0,
        yaw: 0,
        throttle: 0,
    };
}

// ── Events ───────────────────────────────────────────────────────────────────

/// Discrete events raised by the components and drained by the scheduler's
/// slow event-processing phase (logged and/or forwarded to telemetry).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CoreEvent {
    /// Home latched after the ground-start debounce.
    GroundStart(Location),
    /// A zero-coordinate fix interrupted the ground-start countdown.
    BadFixRejected,
    /// GPS failure counter exhausted; position navigation disabled.
    GpsDisabled,
    RadioLost,
    RadioRestored,
    BatteryLow,
    Armed,
    Disarmed,
    /// Loiter finished by accumulated turn or by elapsed time.
    LoiterFinished,
    WaypointReached(u16),
    MissionComplete,
    TrimSaved,
}
