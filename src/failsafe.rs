//! Failsafe supervisor: radio loss, low battery, arming gate.
//!
//! Checks run independently of the active flight mode and can only degrade
//! control authority, never block the scheduler. All outcomes are sticky or
//! debounced state consulted synchronously by the output stage.

use crate::config::Config;
use crate::logging::{log_info, log_warn};
use crate::state::{CoreEvent, PilotInput};

/// Cross-cutting degraded-state flags. `gps_fail_count` decrements on each
/// missed fix and resets to 3 on a good one; reaching 0 latches
/// `gps_disabled` for the remainder of the flight.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FailsafeState {
    pub radio_ok: bool,
    pub gps_fail_count: u8,
    pub gps_disabled: bool,
    pub battery_ok: bool,
    pub armed: bool,
}

impl Default for FailsafeState {
    fn default() -> Self {
        Self {
            radio_ok: true,
            gps_fail_count: 3,
            gps_disabled: false,
            battery_ok: true,
            armed: false,
        }
    }
}

impl FailsafeState {
    /// Motor output gate: consulted by the fast loop after stabilization.
    /// Any active failsafe cuts output regardless of the commanded mode.
    pub fn output_enabled(&self) -> bool {
        self.armed && self.radio_ok && self.battery_ok
    }
}

/// Debounce/gesture bookkeeping for the supervisor. Separate from
/// [`FailsafeState`] so the flags stay a plain data snapshot.
#[derive(Debug, Default)]
pub struct FailsafeSupervisor {
    low_batt_reads: u8,
    arm_gesture_since: Option<u32>,
    disarm_gesture_since: Option<u32>,
}

impl FailsafeSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Radio check, fast tier. The throttle channel below the configured
    /// floor means the receiver is in its no-signal state.
    pub fn check_radio(
        &mut self,
        pilot: &PilotInput,
        fs: &mut FailsafeState,
        cfg: &Config,
    ) -> Option<CoreEvent> {
        let ok = pilot.throttle_raw >= cfg.throttle_fs_floor;
        if ok == fs.radio_ok {
            return None;
        }
        fs.radio_ok = ok;
        if ok {
            log_info!("radio restored");
            Some(CoreEvent::RadioRestored)
        } else {
            log_warn!("radio failsafe: throttle channel below floor");
            Some(CoreEvent::RadioLost)
        }
    }

    /// Battery check, slow tier, debounced across reads so a single sagging
    /// sample under load does not latch the failsafe.
    pub fn check_battery(
        &mut self,
        voltage: f32,
        fs: &mut FailsafeState,
        cfg: &Config,
    ) -> Option<CoreEvent> {
        if voltage >= cfg.battery_low_volts {
            self.low_batt_reads = 0;
            return None;
        }
        if !fs.battery_ok {
            return None;
        }
        self.low_batt_reads = self.low_batt_reads.saturating_add(1);
        if self.low_batt_reads >= cfg.battery_debounce {
            fs.battery_ok = false;
            log_warn!("battery failsafe");
            return Some(CoreEvent::BatteryLow);
        }
        None
    }

    /// Arming gesture, fast tier: throttle low with full yaw deflection held
    /// longer than the configured gesture time. Right arms, left disarms;
    /// disarm takes effect on the same tick the hold completes. Arming is
    /// refused while the radio failsafe is active.
    pub fn check_arming(
        &mut self,
        pilot: &PilotInput,
        now_ms: u32,
        fs: &mut FailsafeState,
        cfg: &Config,
    ) -> Option<CoreEvent> {
        let throttle_idle = pilot.throttle <= 0;

        if !fs.armed {
            if throttle_idle && pilot.yaw_cd >= 4_000 && fs.radio_ok {
                let since = *self.arm_gesture_since.get_or_insert(now_ms);
                if now_ms.wrapping_sub(since) >= cfg.gesture_hold_ms {
                    self.arm_gesture_since = None;
                    fs.armed = true;
                    log_info!("armed");
                    return Some(CoreEvent::Armed);
                }
            } else {
                self.arm_gesture_since = None;
            }
            return None;
        }

        if throttle_idle && pilot.yaw_cd <= -4_000 {
            let since = *self.disarm_gesture_since.get_or_insert(now_ms);
            if now_ms.wrapping_sub(since) >= cfg.gesture_hold_ms {
                self.disarm_gesture_since = None;
                fs.armed = false;
                log_info!("disarmed");
                return Some(CoreEvent::Disarmed);
            }
        } else {
            self.disarm_gesture_since = None;
        }
        None
    }
}
