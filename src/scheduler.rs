//! Cooperative fixed-rate scheduler.
//!
//! Every tier is a level-triggered "elapsed ≥ period" check over a caller
//! supplied monotonic millisecond clock, not a timer interrupt: jitter and
//! overrun are tolerated, never retried. A missed deadline simply runs on
//! the next poll, so effective rate degrades gracefully under load.
//!
//! Rate contract:
//! - fast tier: 10 ms (100 Hz) — attitude, mode evaluation, actuator output
//! - medium tier: 20 ms (50 Hz), 5-phase round-robin, full cycle ≈ 100 ms
//! - slow tier: 3 phases inside medium phase 4, ≈ 3.3 Hz each
//! - super-slow: every 50 medium ticks, ≈ 1 Hz

use crate::core::ControlCore;
use crate::devices::Devices;

pub const FAST_PERIOD_MS: u32 = 10;
pub const MEDIUM_PERIOD_MS: u32 = 20;
pub const MEDIUM_PHASE_COUNT: usize = 5;
pub const SLOW_PHASE_COUNT: usize = 3;
/// Medium ticks between super-slow actions: ≈ 1 s at the nominal rate.
pub const SUPERSLOW_MEDIUM_TICKS: u32 = 50;

/// Medium-tier round-robin, one phase per invocation.
pub(crate) const MEDIUM_PHASES: [fn(&mut ControlCore, &mut Devices, u32); MEDIUM_PHASE_COUNT] = [
    ControlCore::phase_gps_compass,
    ControlCore::phase_navigation,
    ControlCore::phase_altitude_mission,
    ControlCore::phase_telemetry,
    ControlCore::phase_slow_dispatch,
];

/// Slow-tier round-robin, dispatched from medium phase 4.
pub(crate) const SLOW_PHASES: [fn(&mut ControlCore, &mut Devices, u32); SLOW_PHASE_COUNT] = [
    ControlCore::slow_compass_trim,
    ControlCore::slow_mode_switch_battery,
    ControlCore::slow_events_heartbeat,
];

/// Performance counters reported over telemetry.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PerfCounters {
    pub fast_ticks: u32,
    /// Worst observed fast-tier period since start, ms.
    pub max_fast_period_ms: u32,
    pub gps_fix_count: u32,
}

pub struct Scheduler {
    last_fast_ms: Option<u32>,
    last_medium_ms: Option<u32>,
    medium_phase: usize,
    slow_phase: usize,
    superslow_ticks: u32,
    perf: PerfCounters,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            last_fast_ms: None,
            last_medium_ms: None,
            medium_phase: 0,
            slow_phase: 0,
            superslow_ticks: 0,
            perf: PerfCounters::default(),
        }
    }

    pub fn perf(&self) -> PerfCounters {
        self.perf
    }

    /// Fast-tier check. Returns the measured period (ms) when the tier is
    /// due; the first call seeds the clock and reports the nominal period.
    pub fn fast_due(&mut self, now_ms: u32) -> Option<u32> {
        let Some(last) = self.last_fast_ms else {
            self.last_fast_ms = Some(now_ms);
            self.perf.fast_ticks += 1;
            return Some(FAST_PERIOD_MS);
        };
        let elapsed = now_ms.wrapping_sub(last);
        if elapsed < FAST_PERIOD_MS {
            return None;
        }
        self.last_fast_ms = Some(now_ms);
        self.perf.fast_ticks += 1;
        if elapsed > self.perf.max_fast_period_ms {
            self.perf.max_fast_period_ms = elapsed;
        }
        Some(elapsed)
    }

    pub fn medium_due(&mut self, now_ms: u32) -> bool {
        let Some(last) = self.last_medium_ms else {
            self.last_medium_ms = Some(now_ms);
            return true;
        };
        if now_ms.wrapping_sub(last) < MEDIUM_PERIOD_MS {
            return false;
        }
        self.last_medium_ms = Some(now_ms);
        true
    }

    /// Current medium phase index, advancing the round-robin.
    pub fn advance_medium(&mut self) -> usize {
        let phase = self.medium_phase;
        self.medium_phase = (phase + 1) % MEDIUM_PHASE_COUNT;
        phase
    }

    pub fn advance_slow(&mut self) -> usize {
        let phase = self.slow_phase;
        self.slow_phase = (phase + 1) % SLOW_PHASE_COUNT;
        phase
    }

    /// Super-slow gate, called once per medium tick. The effective rate
    /// tracks the medium loop's achieved rate, an intentional coupling that
    /// downstream logging assumes.
    pub fn superslow_due(&mut self) -> bool {
        self.superslow_ticks += 1;
        if self.superslow_ticks >= SUPERSLOW_MEDIUM_TICKS {
            self.superslow_ticks = 0;
            true
        } else {
            false
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
