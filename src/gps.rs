//! GPS acquisition and health tracking.
//!
//! Owns the debounced "ground start" that latches home, the per-flight
//! failure counter, and the new-data flag the navigation engine consumes.
//! The raw driver lives behind [`crate::devices::GpsDriver`]; this module
//! only judges what the driver produced.

use crate::failsafe::FailsafeState;
use crate::geo::LongitudeScale;
use crate::logging::{log_info, log_warn};
use crate::state::{CoreEvent, GpsFix, Location};

/// Fixes required before home is trusted.
const GROUND_START_FIXES: u8 = 5;
/// Missed updates tolerated before GPS navigation is disabled.
const GPS_FAIL_LIMIT: u8 = 3;

/// Outcome of one GPS phase, consumed by the scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GpsOutcome {
    /// Nothing new and nothing changed.
    Quiet,
    /// A valid fix was accepted.
    FixAccepted,
    /// Home was latched from this fix (acquisition complete).
    HomeLatched(Location),
    /// A degenerate zero-coordinate fix restarted the countdown.
    ZeroRejected,
    /// The failure counter just hit zero; GPS navigation is now disabled.
    Lost,
}

pub struct GpsHealth {
    /// Ground-start countdown, 5→1 on valid fixes, 0 once home is latched.
    ground_start_count: u8,
    home: Option<Location>,
    scale: LongitudeScale,
    /// Last accepted fix position, altitude rewritten relative to home.
    position: Location,
    /// Set when a fix is accepted, cleared by the navigation phase.
    new_data: bool,
    fix_count: u32,
}

impl GpsHealth {
    pub fn new() -> Self {
        Self {
            ground_start_count: GROUND_START_FIXES,
            home: None,
            scale: LongitudeScale::default(),
            position: Location::default(),
            new_data: false,
            fix_count: 0,
        }
    }

    pub fn home(&self) -> Option<Location> {
        self.home
    }

    pub fn scale(&self) -> &LongitudeScale {
        &self.scale
    }

    /// Total accepted fixes (performance metric).
    pub fn fix_count(&self) -> u32 {
        self.fix_count
    }

    /// Last accepted position, or `None` before home / after GPS loss —
    /// downstream must not trust stale data once the counter is exhausted.
    pub fn position(&self, fs: &FailsafeState) -> Option<Location> {
        if fs.gps_disabled || self.home.is_none() {
            None
        } else {
            Some(self.position)
        }
    }

    /// Read-and-clear: did a fix arrive since the last navigation phase?
    pub fn take_new_data(&mut self) -> bool {
        core::mem::take(&mut self.new_data)
    }

    /// One medium-tier GPS phase. `fix` is whatever the driver latched since
    /// the previous phase.
    pub fn on_update(&mut self, fix: Option<GpsFix>, fs: &mut FailsafeState) -> GpsOutcome {
        let Some(fix) = fix.filter(|f| f.fix_valid) else {
            return self.on_missed(fs);
        };

        fs.gps_fail_count = GPS_FAIL_LIMIT;
        self.fix_count = self.fix_count.wrapping_add(1);

        let loc = Location::new(fix.lat, fix.lng, fix.alt_cm);

        if self.ground_start_count > 1 {
            if loc.is_zero() {
                log_warn!("ground start: zero-coordinate fix rejected");
                self.ground_start_count = GROUND_START_FIXES;
                return GpsOutcome::ZeroRejected;
            }
            self.ground_start_count -= 1;
            return GpsOutcome::FixAccepted;
        }

        if self.ground_start_count == 1 {
            if loc.is_zero() {
                log_warn!("ground start: zero-coordinate fix rejected");
                self.ground_start_count = GROUND_START_FIXES;
                return GpsOutcome::ZeroRejected;
            }
            // Acquisition complete: home is immutable until restart.
            self.scale = LongitudeScale::from_lat(loc.lat);
            self.home = Some(loc);
            self.position = Location::new(loc.lat, loc.lng, 0);
            self.ground_start_count = 0;
            self.new_data = true;
            log_info!("ground start complete, home latched");
            return GpsOutcome::HomeLatched(loc);
        }

        // Normal flight update: altitude becomes relative to home.
        let home_alt = self.home.map(|h| h.alt).unwrap_or(0);
        self.position = Location::new(loc.lat, loc.lng, fix.alt_cm - home_alt);
        self.new_data = true;
        GpsOutcome::FixAccepted
    }

    fn on_missed(&mut self, fs: &mut FailsafeState) -> GpsOutcome {
        if fs.gps_fail_count > 0 {
            fs.gps_fail_count -= 1;
            if fs.gps_fail_count == 0 && !fs.gps_disabled {
                fs.gps_disabled = true;
                log_warn!("gps updates stopped, position navigation disabled");
                return GpsOutcome::Lost;
            }
        }
        GpsOutcome::Quiet
    }
}

impl Default for GpsHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl GpsOutcome {
    /// Event representation for the slow event-processing phase.
    pub fn event(self) -> Option<CoreEvent> {
        match self {
            GpsOutcome::HomeLatched(loc) => Some(CoreEvent::GroundStart(loc)),
            GpsOutcome::ZeroRejected => Some(CoreEvent::BadFixRejected),
            GpsOutcome::Lost => Some(CoreEvent::GpsDisabled),
            GpsOutcome::Quiet | GpsOutcome::FixAccepted => None,
        }
    }
}
