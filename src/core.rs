//! The control-core aggregate.
//!
//! One owned struct holds every piece of mutable state and is threaded
//! explicitly through the scheduler's call sequence; components borrow only
//! the sub-state they need, so single-writer semantics hold without hidden
//! globals. Drive it by calling [`ControlCore::poll`] from a tight loop
//! with a monotonic millisecond clock.

use heapless::Vec;

use crate::altitude::AltitudeFusion;
use crate::config::Config;
use crate::devices::Devices;
use crate::failsafe::{FailsafeState, FailsafeSupervisor};
use crate::gps::GpsHealth;
use crate::logging::log_warn;
use crate::modes::{FlightMode, ModeChangeError, ModeContext, ModeState};
use crate::nav::NavEngine;
use crate::scheduler::{PerfCounters, Scheduler, MEDIUM_PHASES, SLOW_PHASES};
use crate::stab::{Stabilizer, ThrottleSetpoint};
use crate::state::{ActuatorCommand, Attitude, BodyRates, CoreEvent, PilotInput};

pub struct ControlCore {
    cfg: Config,
    sched: Scheduler,
    modes: ModeState,
    stab: Stabilizer,
    nav: NavEngine,
    gps: GpsHealth,
    alt: AltitudeFusion,
    failsafe: FailsafeState,
    supervisor: FailsafeSupervisor,
    events: Vec<CoreEvent, 8>,

    // Latest sensor snapshot, refreshed by the tiers that own each read.
    pilot: PilotInput,
    att: Attitude,
    rates: BodyRates,
    compass_heading_cd: i32,
    battery_volts: f32,

    /// Barometer reading captured at arm time; altitude is relative to it.
    baro_ground_cm: Option<i32>,
    /// Target altitude above home for the throttle loop, cm.
    alt_target_cm: i32,
    /// Trim gesture completed; the slow tier performs the save.
    trim_requested: bool,
    last_mode_switch: u8,
}

impl ControlCore {
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            sched: Scheduler::new(),
            modes: ModeState::new(),
            stab: Stabilizer::new(&cfg),
            nav: NavEngine::new(),
            gps: GpsHealth::new(),
            alt: AltitudeFusion::new(),
            failsafe: FailsafeState::default(),
            supervisor: FailsafeSupervisor::new(),
            events: Vec::new(),
            pilot: PilotInput::default(),
            att: Attitude::default(),
            rates: BodyRates::default(),
            compass_heading_cd: 0,
            battery_volts: 0.0,
            baro_ground_cm: None,
            alt_target_cm: 0,
            trim_requested: false,
            last_mode_switch: 0,
        }
    }

    pub fn mode(&self) -> FlightMode {
        self.modes.mode()
    }

    pub fn armed(&self) -> bool {
        self.failsafe.armed
    }

    pub fn failsafe(&self) -> &FailsafeState {
        &self.failsafe
    }

    pub fn gps(&self) -> &GpsHealth {
        &self.gps
    }

    pub fn nav(&self) -> &NavEngine {
        &self.nav
    }

    pub fn altitude_cm(&self) -> i32 {
        self.alt.altitude_cm()
    }

    /// Latest compass heading read by the medium tier, centidegrees.
    pub fn compass_heading_cd(&self) -> i32 {
        self.compass_heading_cd
    }

    pub fn perf(&self) -> PerfCounters {
        let mut perf = self.sched.perf();
        perf.gps_fix_count = self.gps.fix_count();
        perf
    }

    /// Drain queued events. The slow tier also logs them; embedders that
    /// want them must drain between slow event-processing passes.
    pub fn take_events(&mut self) -> Vec<CoreEvent, 8> {
        core::mem::take(&mut self.events)
    }

    /// One poll of the cooperative loop. Never blocks, never panics; call
    /// as often as possible.
    pub fn poll(&mut self, now_ms: u32, dev: &mut Devices) {
        if let Some(dt_ms) = self.sched.fast_due(now_ms) {
            self.fast_tick(now_ms, dt_ms, dev);
        }
        if self.sched.medium_due(now_ms) {
            let phase = self.sched.advance_medium();
            MEDIUM_PHASES[phase](self, dev, now_ms);
            if self.sched.superslow_due() {
                dev.telemetry
                    .log_current(self.battery_volts, dev.battery.current_a());
            }
        }
    }

    /// Mode change from the ground station or the embedder. The switch on
    /// the radio goes through the same path on the slow tier.
    pub fn request_mode(
        &mut self,
        mode: FlightMode,
        dev: &mut Devices,
        now_ms: u32,
    ) -> Result<(), ModeChangeError> {
        let position = self.gps.position(&self.failsafe);
        self.modes.set_mode(mode, &self.att, position)?;
        let scale = *self.gps.scale();
        match mode {
            FlightMode::Auto | FlightMode::GcsAuto => {
                if let Some(pos) = position {
                    self.nav
                        .begin_mission(&*dev.mission, &pos, now_ms, &self.cfg, &scale);
                }
            }
            FlightMode::Loiter => {
                if let Some(pos) = position {
                    self.nav.hold_at(pos, now_ms, &self.cfg);
                }
            }
            FlightMode::Rtl => {
                if let (Some(home), Some(pos)) = (self.gps.home(), position) {
                    self.nav.return_to_launch(home, &pos, &scale);
                }
            }
            _ => {}
        }
        self.stab.reset();
        self.alt.reset_error();
        Ok(())
    }

    fn push_event(&mut self, event: CoreEvent) {
        // Queue full means the slow tier is starved; drop the newest.
        let _ = self.events.push(event);
    }

    // ── Fast tier ────────────────────────────────────────────────────────────

    /// Attitude read → mode evaluation → output, strictly in that order.
    fn fast_tick(&mut self, now_ms: u32, dt_ms: u32, dev: &mut Devices) {
        dev.attitude.update(dt_ms);
        self.att = dev.attitude.attitude();
        self.rates = dev.attitude.rates();
        self.pilot = dev.radio.read();

        if let Some(ev) = self
            .supervisor
            .check_radio(&self.pilot, &mut self.failsafe, &self.cfg)
        {
            self.push_event(ev);
        }
        if let Some(ev) =
            self.supervisor
                .check_arming(&self.pilot, now_ms, &mut self.failsafe, &self.cfg)
        {
            if ev == CoreEvent::Armed {
                // Ground pressure baseline: altitude is relative from here.
                self.baro_ground_cm = Some(dev.baro.altitude_cm());
                self.alt.reset_error();
                self.stab.reset();
            }
            self.push_event(ev);
        }
        if self.modes.check_trim(&self.pilot, now_ms, &self.cfg) {
            self.trim_requested = true;
        }

        let scale = *self.gps.scale();
        let nav_out = self.nav.output();
        let ctx = ModeContext {
            att: &self.att,
            nav: &nav_out,
            position: self.gps.position(&self.failsafe),
            home: self.gps.home(),
            scale: &scale,
        };
        let sp = self.modes.evaluate(&self.pilot, &ctx, &self.cfg);
        let throttle = self.resolve_throttle(sp.throttle);

        let dt = dt_ms as f32 * 0.001;
        let mut cmd = self.stab.run(dt, &sp, &self.att, &self.rates, throttle);
        if !self.failsafe.output_enabled() {
            cmd = ActuatorCommand::ZERO;
        }
        dev.actuators.write(cmd);
    }

    /// Close the altitude loop on the smoothed error; direct throttle
    /// passes straight through.
    fn resolve_throttle(&mut self, sp: ThrottleSetpoint) -> i32 {
        match sp {
            ThrottleSetpoint::Direct(t) => t,
            ThrottleSetpoint::Altitude(target_cm) => {
                self.alt_target_cm = target_cm;
                let correction = self.alt.smoothed_error_cm() * self.cfg.throttle_alt_p / 100;
                (self.cfg.throttle_hover + correction).clamp(0, 1_000)
            }
        }
    }

    // ── Medium tier phases ───────────────────────────────────────────────────

    /// Phase 0: GPS driver update + compass read.
    pub(crate) fn phase_gps_compass(&mut self, dev: &mut Devices, _now_ms: u32) {
        dev.gps.update();
        let fix = dev.gps.take_fix();
        let outcome = self.gps.on_update(fix, &mut self.failsafe);
        if let Some(ev) = outcome.event() {
            self.push_event(ev);
        }
        if let Some(compass) = dev.compass.as_mut() {
            self.compass_heading_cd = compass.heading_cd();
        }
    }

    /// Phase 1: navigation geometry, recomputed when a fix arrived.
    pub(crate) fn phase_navigation(&mut self, _dev: &mut Devices, now_ms: u32) {
        self.nav.cache_attitude(&self.att);
        if !self.gps.take_new_data() {
            return;
        }
        if !self.modes.mode().nav_driven() {
            return;
        }
        let scale = *self.gps.scale();
        if let Some(pos) = self.gps.position(&self.failsafe) {
            if let Some(ev) = self.nav.update(&pos, now_ms, &self.cfg, &scale) {
                self.push_event(ev);
            }
        }
    }

    /// Phase 2: altitude fusion + mission advancement.
    pub(crate) fn phase_altitude_mission(&mut self, dev: &mut Devices, now_ms: u32) {
        let raw = dev.baro.altitude_cm();
        let base = *self.baro_ground_cm.get_or_insert(raw);
        let sonar = dev.sonar.as_mut().and_then(|s| s.range_cm());
        let fused = self.alt.select(raw - base, sonar, &self.cfg);
        self.alt.smooth_error(self.alt_target_cm - fused, &self.cfg);

        if !matches!(self.modes.mode(), FlightMode::Auto | FlightMode::GcsAuto) {
            return;
        }
        let scale = *self.gps.scale();
        if let Some(pos) = self.gps.position(&self.failsafe) {
            let events = self
                .nav
                .advance(&*dev.mission, &pos, now_ms, &self.cfg, &scale);
            for ev in events {
                self.push_event(ev);
            }
        }
    }

    /// Phase 3: attitude/location telemetry.
    pub(crate) fn phase_telemetry(&mut self, dev: &mut Devices, _now_ms: u32) {
        dev.telemetry.send_attitude(self.att);
        if let Some(pos) = self.gps.position(&self.failsafe) {
            dev.telemetry.send_location(pos);
        }
    }

    /// Phase 4: slow-tier dispatch.
    pub(crate) fn phase_slow_dispatch(&mut self, dev: &mut Devices, now_ms: u32) {
        let phase = self.sched.advance_slow();
        SLOW_PHASES[phase](self, dev, now_ms);
    }

    // ── Slow tier phases ─────────────────────────────────────────────────────

    /// Slow 0: persist compass trim when the gesture completed.
    pub(crate) fn slow_compass_trim(&mut self, dev: &mut Devices, _now_ms: u32) {
        if !self.trim_requested {
            return;
        }
        self.trim_requested = false;
        if let Some(compass) = dev.compass.as_mut() {
            compass.save_trim();
            self.push_event(CoreEvent::TrimSaved);
        }
    }

    /// Slow 1: mode switch + battery read.
    pub(crate) fn slow_mode_switch_battery(&mut self, dev: &mut Devices, now_ms: u32) {
        let sw = self.pilot.mode_switch.min(2);
        if sw != self.last_mode_switch {
            self.last_mode_switch = sw;
            let mode = self.cfg.mode_map[usize::from(sw)];
            if self.request_mode(mode, dev, now_ms).is_err() {
                log_warn!("mode switch refused, no position estimate");
            }
        }

        self.battery_volts = dev.battery.voltage();
        if let Some(ev) =
            self.supervisor
                .check_battery(self.battery_volts, &mut self.failsafe, &self.cfg)
        {
            self.push_event(ev);
        }
    }

    /// Slow 2: event processing + heartbeat/performance telemetry.
    pub(crate) fn slow_events_heartbeat(&mut self, dev: &mut Devices, _now_ms: u32) {
        for _ev in &self.events {
            crate::logging::log_info!("event: {}", _ev);
        }
        self.events.clear();
        dev.telemetry
            .send_heartbeat(self.modes.mode(), self.failsafe.armed);
        let perf = self.perf();
        dev.telemetry.send_performance(&perf);
    }
}
