//! Shared stabilization stage.
//!
//! Every flight mode's setpoint passes through here before reaching the
//! actuators; modes differ only in what they feed it, never in bypassing it.

use crate::config::Config;
use crate::state::{ActuatorCommand, Attitude, BodyRates};

/// Per-axis setpoint produced by the mode state machine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AxisSetpoint {
    /// Attitude hold, target angle in centidegrees.
    Angle(i32),
    /// Direct rate demand, degrees per second.
    Rate(f32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum YawSetpoint {
    /// Hold a heading, centidegrees [0, 36000).
    Hold(i32),
    /// Pilot/nav rate demand, degrees per second.
    Rate(f32),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ThrottleSetpoint {
    /// Pilot throttle, 0..1000, passed straight through.
    Direct(i32),
    /// Hold a target altitude above home, centimeters. The throttle
    /// controller closes this loop on the fused altitude.
    Altitude(i32),
}

/// Tagged mode output consumed by [`Stabilizer::run`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ModeSetpoint {
    pub roll: AxisSetpoint,
    pub pitch: AxisSetpoint,
    pub yaw: YawSetpoint,
    pub throttle: ThrottleSetpoint,
}

impl ModeSetpoint {
    /// Level attitude, heading hold, idle throttle.
    pub fn level(yaw_hold_cd: i32) -> Self {
        Self {
            roll: AxisSetpoint::Angle(0),
            pitch: AxisSetpoint::Angle(0),
            yaw: YawSetpoint::Hold(yaw_hold_cd),
            throttle: ThrottleSetpoint::Direct(0),
        }
    }
}

/// One attitude-hold axis: PID on angle error with rate damping.
pub struct AxisPid {
    kp: f32,
    ki: f32,
    kd: f32,
    integral: f32,
    integral_limit: f32,
    output_limit: f32,
}

impl AxisPid {
    pub fn new(kp: f32, ki: f32, kd: f32, integral_limit: f32, output_limit: f32) -> Self {
        Self {
            kp,
            ki,
            kd,
            integral: 0.0,
            integral_limit: integral_limit.abs(),
            output_limit: output_limit.abs(),
        }
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
    }

    /// `error_cd` in centidegrees, `rate_dps` the measured body rate.
    pub fn update(&mut self, dt: f32, error_cd: f32, rate_dps: f32) -> f32 {
        self.integral += error_cd * dt;
        self.integral = self
            .integral
            .clamp(-self.integral_limit, self.integral_limit);

        let output = self.kp * error_cd + self.ki * self.integral - self.kd * rate_dps * 100.0;
        output.clamp(-self.output_limit, self.output_limit)
    }
}

pub struct Stabilizer {
    roll: AxisPid,
    pitch: AxisPid,
    yaw: AxisPid,
    rate_kp: f32,
}

impl Stabilizer {
    pub fn new(cfg: &Config) -> Self {
        let axis = || {
            AxisPid::new(
                cfg.stab_kp,
                cfg.stab_ki,
                cfg.stab_kd,
                cfg.stab_i_limit,
                4_500.0,
            )
        };
        Self {
            roll: axis(),
            pitch: axis(),
            yaw: AxisPid::new(cfg.yaw_kp, 0.0, 0.0, 0.0, 4_500.0),
            rate_kp: cfg.rate_kp,
        }
    }

    pub fn reset(&mut self) {
        self.roll.reset();
        self.pitch.reset();
        self.yaw.reset();
    }

    /// Run the attitude-hold stage. `throttle` has already been resolved by
    /// the caller (direct or altitude loop); this stage owns roll/pitch/yaw.
    pub fn run(
        &mut self,
        dt: f32,
        sp: &ModeSetpoint,
        att: &Attitude,
        rates: &BodyRates,
        throttle: i32,
    ) -> ActuatorCommand {
        let roll = self.axis_output(dt, Axis::Roll, sp.roll, att.roll_cd, rates.roll_dps);
        let pitch = self.axis_output(dt, Axis::Pitch, sp.pitch, att.pitch_cd, rates.pitch_dps);

        let yaw = match sp.yaw {
            YawSetpoint::Hold(target_cd) => {
                let err = crate::geo::wrap_180_cd(target_cd - att.yaw_cd) as f32;
                self.yaw.update(dt, err, rates.yaw_dps)
            }
            YawSetpoint::Rate(dps) => (dps - rates.yaw_dps) * self.rate_kp * 100.0,
        };

        ActuatorCommand {
            roll: roll.clamp(-4_500.0, 4_500.0) as i16,
            pitch: pitch.clamp(-4_500.0, 4_500.0) as i16,
            yaw: yaw.clamp(-4_500.0, 4_500.0) as i16,
            throttle: throttle.clamp(0, 1_000) as i16,
        }
    }

    fn axis_output(
        &mut self,
        dt: f32,
        axis: Axis,
        sp: AxisSetpoint,
        angle_cd: i32,
        rate_dps: f32,
    ) -> f32 {
        let pid = match axis {
            Axis::Roll => &mut self.roll,
            Axis::Pitch => &mut self.pitch,
        };
        match sp {
            AxisSetpoint::Angle(target_cd) => {
                pid.update(dt, (target_cd - angle_cd) as f32, rate_dps)
            }
            AxisSetpoint::Rate(dps) => (dps - rate_dps) * self.rate_kp * 100.0,
        }
    }
}

enum Axis {
    Roll,
    Pitch,
}
