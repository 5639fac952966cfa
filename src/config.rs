//! Externally configured parameters, read-only to the core.
//!
//! Thresholds that were magic numbers in older autopilots are named fields
//! here so the rate and distance contracts stay auditable.

use crate::modes::FlightMode;

#[derive(Clone, Copy, Debug)]
pub struct Config {
    // ── Navigation ───────────────────────────────────────────────────────────
    /// Waypoint acceptance / loiter entry radius.
    pub wp_radius_cm: i32,
    /// Radius of the loiter circle around the hold point.
    pub loiter_radius_cm: i32,
    /// Loiter terminates after this many full turns of accumulated angle.
    pub loiter_total_turns: i32,
    /// Loiter terminates after this much elapsed time, whichever binds first.
    pub loiter_time_max_ms: u32,
    /// Maximum lean angle commanded by the navigation engine.
    pub nav_angle_max_cd: i32,
    /// Crosstrack correction gain (cd of bearing correction per meter of
    /// track deviation) and its clamp.
    pub crosstrack_gain: i32,
    pub crosstrack_max_cd: i32,

    // ── Altitude fusion ──────────────────────────────────────────────────────
    /// Below this barometric altitude the sonar may be preferred.
    pub sonar_baro_cross_cm: i32,
    /// Sonar readings above this are unreliable; also the clamp value.
    pub sonar_max_cm: i32,
    /// Rate limit of the altitude-error smoother, cm per medium tick.
    pub alt_error_rate_cm: i32,

    // ── Throttle / altitude hold ─────────────────────────────────────────────
    /// Minimum target altitude in ALT_HOLD, cm.
    pub alt_hold_min_cm: i32,
    /// Stick-to-altitude span in ALT_HOLD: full stick maps onto this many cm.
    pub alt_hold_span_cm: i32,
    pub throttle_hover: i32,
    /// Throttle per cm of smoothed altitude error, ×0.01.
    pub throttle_alt_p: i32,

    // ── Mode / pilot ─────────────────────────────────────────────────────────
    /// ACRO switches to rate control above this stick deflection.
    pub acro_rate_trigger_cd: i32,
    /// ACRO full-stick rate demand, degrees per second.
    pub acro_rate_max_dps: f32,
    /// Horizontal reach of the SIMPLE/FBW virtual waypoint at full stick.
    pub virtual_wp_reach_cm: i32,
    /// Mode selected by each position of the 3-position switch.
    pub mode_map: [FlightMode; 3],
    /// Gestures (arming, trim capture) must be held this long.
    pub gesture_hold_ms: u32,

    // ── Failsafe ─────────────────────────────────────────────────────────────
    /// Raw throttle channel below this floor means the radio is gone.
    pub throttle_fs_floor: u16,
    pub battery_low_volts: f32,
    /// Consecutive low battery reads before the failsafe latches.
    pub battery_debounce: u8,

    // ── Stabilization gains ──────────────────────────────────────────────────
    pub stab_kp: f32,
    pub stab_ki: f32,
    pub stab_kd: f32,
    pub stab_i_limit: f32,
    pub rate_kp: f32,
    pub yaw_kp: f32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wp_radius_cm: 800,
            loiter_radius_cm: 500,
            loiter_total_turns: 3,
            loiter_time_max_ms: 60_000,
            nav_angle_max_cd: 2_250,
            crosstrack_gain: 40,
            crosstrack_max_cd: 3_000,

            sonar_baro_cross_cm: 550,
            sonar_max_cm: 600,
            alt_error_rate_cm: 250,

            alt_hold_min_cm: 30,
            alt_hold_span_cm: 1_000,
            throttle_hover: 500,
            throttle_alt_p: 35,

            acro_rate_trigger_cd: 4_200,
            acro_rate_max_dps: 180.0,
            virtual_wp_reach_cm: 1_500,
            mode_map: [FlightMode::Stabilize, FlightMode::AltHold, FlightMode::Loiter],
            gesture_hold_ms: 1_000,

            throttle_fs_floor: 975,
            battery_low_volts: 9.6,
            battery_debounce: 3,

            stab_kp: 4.5,
            stab_ki: 0.02,
            stab_kd: 0.12,
            stab_i_limit: 500.0,
            rate_kp: 0.7,
            yaw_kp: 2.5,
        }
    }
}
