//! Navigation engine: waypoint seek, loiter circling, crosstrack correction
//! and mission-sequence advancement.
//!
//! All angle math is integer centidegrees. Trigonometric values of the
//! current yaw are cached once per medium tick rather than recomputed per
//! use.

use micromath::F32Ext;

use crate::config::Config;
use crate::devices::MissionStore;
use crate::geo::{self, LongitudeScale};
use crate::logging::log_info;
use crate::state::{Attitude, CoreEvent, Location};

/// Attitude/throttle targets handed to the mode state machine. Pitch is
/// forward-positive; altitude is the target above home in centimeters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NavOutput {
    pub roll_cd: i32,
    pub pitch_cd: i32,
    pub target_bearing_cd: i32,
    pub target_alt_cm: i32,
}

/// Live geometry to the active waypoint, recomputed every navigation tick.
#[derive(Clone, Copy, Debug, Default)]
pub struct NavigationTarget {
    pub next_wp: Location,
    pub prev_wp: Location,
    pub bearing_cd: i32,
    pub distance_cm: i32,
    pub crosstrack_cm: i32,
}

// ── Mission items ────────────────────────────────────────────────────────────

/// Command kinds understood by the cursor. Nav ("must") commands move the
/// vehicle; condition ("may") commands gate advancement past them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ItemKind {
    Waypoint,
    /// Loiter at the target for `p1` full turns.
    LoiterTurns,
    /// Loiter at the target for `p1` seconds.
    LoiterTime,
    ReturnToLaunch,
    /// Condition: wait `p1` seconds after this command loads.
    ConditionDelay,
    /// Condition: wait until within `p1` meters of the next nav target.
    ConditionDistance,
}

impl ItemKind {
    pub fn is_nav(self) -> bool {
        matches!(
            self,
            ItemKind::Waypoint
                | ItemKind::LoiterTurns
                | ItemKind::LoiterTime
                | ItemKind::ReturnToLaunch
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MissionItem {
    pub kind: ItemKind,
    pub target: Location,
    /// Kind-dependent parameter: turns, seconds, or meters.
    pub p1: u16,
}

/// Position in the stored mission. The store owns the command list; the
/// engine owns only this cursor and the reached predicate.
#[derive(Clone, Copy, Debug, Default)]
pub struct MissionCursor {
    pub must_index: u16,
    pub may_index: u16,
    pub must: Option<MissionItem>,
    pub may: Option<MissionItem>,
}

// ── Loiter ───────────────────────────────────────────────────────────────────

/// Bearing sentinel for "no sample yet".
const BEARING_UNSET: i32 = i32::MIN;

#[derive(Clone, Copy, Debug)]
pub struct LoiterState {
    pub center: Location,
    /// Signed accumulated turn around the center, centidegrees.
    accumulated_cd: i32,
    last_bearing_cd: i32,
    start_ms: u32,
    /// Terminate after this much accumulated turn.
    turn_target_cd: i32,
    /// Terminate after this much elapsed time, whichever binds first.
    max_duration_ms: u32,
}

impl LoiterState {
    fn new(center: Location, now_ms: u32, turns: i32, max_duration_ms: u32) -> Self {
        Self {
            center,
            accumulated_cd: 0,
            last_bearing_cd: BEARING_UNSET,
            start_ms: now_ms,
            turn_target_cd: turns.saturating_mul(36_000),
            max_duration_ms,
        }
    }

    fn finished(&self, now_ms: u32) -> bool {
        self.accumulated_cd.abs() >= self.turn_target_cd
            || now_ms.wrapping_sub(self.start_ms) >= self.max_duration_ms
    }
}

// ── Engine ───────────────────────────────────────────────────────────────────

/// Per-medium-tick cache of the yaw trig values.
#[derive(Clone, Copy, Debug)]
struct TrigCache {
    sin_yaw: f32,
    cos_yaw: f32,
}

impl Default for TrigCache {
    fn default() -> Self {
        Self {
            sin_yaw: 0.0,
            cos_yaw: 1.0,
        }
    }
}

pub struct NavEngine {
    target: NavigationTarget,
    /// Fixed bearing prev→next, captured at waypoint change.
    track_bearing_cd: i32,
    loiter: Option<LoiterState>,
    cursor: MissionCursor,
    trig: TrigCache,
    output: NavOutput,
    /// Turn/time budget for the loiter created on next arrival, set by
    /// loiter mission items; config defaults apply when `None`.
    pending_loiter: Option<(i32, u32)>,
    /// When the active ConditionDelay was loaded.
    condition_since_ms: u32,
}

impl NavEngine {
    pub fn new() -> Self {
        Self {
            target: NavigationTarget::default(),
            track_bearing_cd: 0,
            loiter: None,
            cursor: MissionCursor::default(),
            trig: TrigCache::default(),
            output: NavOutput::default(),
            pending_loiter: None,
            condition_since_ms: 0,
        }
    }

    pub fn target(&self) -> &NavigationTarget {
        &self.target
    }

    pub fn cursor(&self) -> &MissionCursor {
        &self.cursor
    }

    pub fn output(&self) -> NavOutput {
        self.output
    }

    pub fn loitering(&self) -> bool {
        self.loiter.is_some()
    }

    /// Cache yaw trig once per medium tick.
    pub fn cache_attitude(&mut self, att: &Attitude) {
        let yaw = geo::cd_to_rad(att.yaw_cd);
        self.trig = TrigCache {
            sin_yaw: yaw.sin(),
            cos_yaw: yaw.cos(),
        };
    }

    /// Aim at `next`, tracking the straight line from `prev`. Resets any
    /// active loiter.
    pub fn set_target(&mut self, prev: Location, next: Location, scale: &LongitudeScale) {
        self.track_bearing_cd = geo::get_bearing_cd(&prev, &next, scale);
        self.target = NavigationTarget {
            next_wp: next,
            prev_wp: prev,
            bearing_cd: self.track_bearing_cd,
            distance_cm: 0,
            crosstrack_cm: 0,
        };
        self.loiter = None;
        self.pending_loiter = None;
    }

    /// Explicit loiter around `center` (LOITER mode entry).
    pub fn hold_at(&mut self, center: Location, now_ms: u32, cfg: &Config) {
        self.target.next_wp = center;
        self.target.prev_wp = center;
        self.loiter = Some(LoiterState::new(
            center,
            now_ms,
            cfg.loiter_total_turns,
            cfg.loiter_time_max_ms,
        ));
    }

    /// One medium-tier navigation phase: recompute geometry and the
    /// attitude targets. Waypoint seek hands over to loiter once inside the
    /// acceptance radius.
    pub fn update(
        &mut self,
        position: &Location,
        now_ms: u32,
        cfg: &Config,
        scale: &LongitudeScale,
    ) -> Option<CoreEvent> {
        self.target.bearing_cd = geo::get_bearing_cd(position, &self.target.next_wp, scale);
        self.target.distance_cm = geo::get_distance_cm(position, &self.target.next_wp, scale);
        self.target.crosstrack_cm = geo::crosstrack_error_cm(
            self.target.bearing_cd,
            self.track_bearing_cd,
            self.target.distance_cm,
        );

        if self.loiter.is_none() && self.target.distance_cm < cfg.wp_radius_cm {
            // Inside the acceptance radius: circle instead of overshooting.
            let (turns, max_ms) = self
                .pending_loiter
                .take()
                .unwrap_or((cfg.loiter_total_turns, cfg.loiter_time_max_ms));
            self.loiter = Some(LoiterState::new(self.target.next_wp, now_ms, turns, max_ms));
        }

        match self.loiter {
            Some(_) => self.update_loiter(position, now_ms, cfg, scale),
            None => {
                self.update_seek(cfg);
                None
            }
        }
    }

    /// Waypoint seek: fly the crosstrack-corrected bearing, lean derated
    /// close to the target to prevent overshoot.
    fn update_seek(&mut self, cfg: &Config) {
        // Crosstrack correction folds the vehicle back onto the track line.
        let correction = (self.target.crosstrack_cm * cfg.crosstrack_gain / 100)
            .clamp(-cfg.crosstrack_max_cd, cfg.crosstrack_max_cd);
        let desired_cd = geo::wrap_360_cd(self.target.bearing_cd + correction);

        // Full authority beyond 4 radii, linear derate inside.
        let full_at = cfg.wp_radius_cm * 4;
        let lean = if self.target.distance_cm >= full_at {
            cfg.nav_angle_max_cd
        } else {
            cfg.nav_angle_max_cd * self.target.distance_cm / full_at
        };

        let (roll, pitch) = self.lean_toward(desired_cd, lean);
        self.output = NavOutput {
            roll_cd: roll,
            pitch_cd: pitch,
            target_bearing_cd: self.target.bearing_cd,
            target_alt_cm: self.target.next_wp.alt,
        };
    }

    /// Loiter circling: regulate distance to the circle radius while
    /// flying the tangent; track accumulated turn for termination.
    fn update_loiter(
        &mut self,
        position: &Location,
        now_ms: u32,
        cfg: &Config,
        scale: &LongitudeScale,
    ) -> Option<CoreEvent> {
        let Some(loiter) = self.loiter.as_mut() else {
            return None;
        };

        let from_center_cd = geo::get_bearing_cd(&loiter.center, position, scale);
        let dist_center_cm = geo::get_distance_cm(&loiter.center, position, scale);

        // Turn accumulation is meaningless while sitting on the center.
        if dist_center_cm > cfg.loiter_radius_cm / 4 {
            if loiter.last_bearing_cd != BEARING_UNSET {
                let delta = geo::wrap_180_cd(from_center_cd - loiter.last_bearing_cd);
                loiter.accumulated_cd = loiter.accumulated_cd.saturating_add(delta);
            }
            loiter.last_bearing_cd = from_center_cd;
        }
        let finished = loiter.finished(now_ms);

        if finished {
            log_info!("loiter finished");
            self.loiter = None;
            self.output = NavOutput {
                roll_cd: 0,
                pitch_cd: 0,
                target_bearing_cd: from_center_cd,
                target_alt_cm: self.target.next_wp.alt,
            };
            return Some(CoreEvent::LoiterFinished);
        }

        // Tangent heading, corrected in/out by the radius error.
        let radius_err_cm = dist_center_cm - cfg.loiter_radius_cm;
        let correction = (radius_err_cm * cfg.crosstrack_gain / 100)
            .clamp(-cfg.crosstrack_max_cd, cfg.crosstrack_max_cd);
        let tangent_cd = geo::wrap_360_cd(from_center_cd + 9_000 + correction);

        let (roll, pitch) = self.lean_toward(tangent_cd, cfg.nav_angle_max_cd / 2);
        self.output = NavOutput {
            roll_cd: roll,
            pitch_cd: pitch,
            target_bearing_cd: tangent_cd,
            target_alt_cm: self.target.next_wp.alt,
        };
        None
    }

    fn lean_toward(&self, bearing_cd: i32, lean_cd: i32) -> (i32, i32) {
        let b = geo::cd_to_rad(bearing_cd);
        let (sin_b, cos_b) = (b.sin(), b.cos());
        // sin/cos of (bearing − yaw) from the cached yaw trig.
        let sin_err = sin_b * self.trig.cos_yaw - cos_b * self.trig.sin_yaw;
        let cos_err = cos_b * self.trig.cos_yaw + sin_b * self.trig.sin_yaw;
        (
            (sin_err * lean_cd as f32) as i32,
            (cos_err * lean_cd as f32) as i32,
        )
    }

    // ── Mission sequencing ───────────────────────────────────────────────────

    /// Start the stored mission from the top (AUTO entry).
    pub fn begin_mission(
        &mut self,
        store: &dyn MissionStore,
        position: &Location,
        now_ms: u32,
        cfg: &Config,
        scale: &LongitudeScale,
    ) {
        self.cursor = MissionCursor::default();
        self.target.next_wp = *position;
        self.load_next_must(store, 0, position, now_ms, cfg, scale);
    }

    /// Aim at home (RTL entry).
    pub fn return_to_launch(
        &mut self,
        home: Location,
        position: &Location,
        scale: &LongitudeScale,
    ) {
        self.cursor = MissionCursor::default();
        self.set_target(*position, home, scale);
    }

    /// Medium-tier mission advancement: evaluate "has the current target
    /// been satisfied" and ask the store for the next one.
    pub fn advance(
        &mut self,
        store: &dyn MissionStore,
        position: &Location,
        now_ms: u32,
        cfg: &Config,
        scale: &LongitudeScale,
    ) -> heapless::Vec<CoreEvent, 2> {
        let mut events = heapless::Vec::new();
        let Some(must) = self.cursor.must else {
            return events;
        };

        if !self.condition_satisfied(now_ms) {
            return events;
        }

        let inside = self.target.distance_cm < cfg.wp_radius_cm;
        let reached = match must.kind {
            ItemKind::Waypoint | ItemKind::ReturnToLaunch => inside,
            // Loiter items complete when their loiter has terminated.
            ItemKind::LoiterTurns | ItemKind::LoiterTime => {
                inside && self.loiter.is_none() && self.pending_loiter.is_none()
            }
            ItemKind::ConditionDelay | ItemKind::ConditionDistance => false,
        };
        if !reached {
            return events;
        }

        let _ = events.push(CoreEvent::WaypointReached(self.cursor.must_index));
        log_info!("waypoint reached");

        let next_index = self.cursor.must_index + 1;
        if !self.load_next_must(store, next_index, position, now_ms, cfg, scale) {
            let _ = events.push(CoreEvent::MissionComplete);
            log_info!("mission complete");
        }
        events
    }

    /// Scan forward from `from`: condition items load into the may slot,
    /// the first nav item becomes the new must target. Returns false when
    /// the mission is exhausted (engine holds position at the last target).
    fn load_next_must(
        &mut self,
        store: &dyn MissionStore,
        from: u16,
        position: &Location,
        now_ms: u32,
        cfg: &Config,
        scale: &LongitudeScale,
    ) -> bool {
        self.cursor.may = None;
        let mut index = from;
        while let Some(item) = store.get(index) {
            if item.kind.is_nav() {
                self.cursor.must_index = index;
                self.cursor.must = Some(item);
                let prev = self.target.next_wp;
                let prev = if prev.is_zero() { *position } else { prev };
                self.set_target(prev, item.target, scale);
                self.pending_loiter = match item.kind {
                    ItemKind::LoiterTurns => Some((i32::from(item.p1), cfg.loiter_time_max_ms)),
                    ItemKind::LoiterTime => {
                        Some((i32::MAX / 36_000, u32::from(item.p1) * 1_000))
                    }
                    _ => None,
                };
                return true;
            }
            // Condition item: remember it and keep scanning.
            self.cursor.may_index = index;
            self.cursor.may = Some(item);
            self.condition_since_ms = now_ms;
            index += 1;
        }
        self.cursor.must = None;
        // Hold at the last target rather than flying on.
        self.hold_at(self.target.next_wp, now_ms, cfg);
        false
    }

    /// Active may-command gate. Delay counts from when the condition was
    /// loaded; distance compares against the live target distance.
    fn condition_satisfied(&self, now_ms: u32) -> bool {
        match self.cursor.may {
            None => true,
            Some(item) => match item.kind {
                ItemKind::ConditionDelay => {
                    now_ms.wrapping_sub(self.condition_since_ms) >= u32::from(item.p1) * 1_000
                }
                ItemKind::ConditionDistance => self.target.distance_cm < i32::from(item.p1) * 100,
                _ => true,
            },
        }
    }
}

impl Default for NavEngine {
    fn default() -> Self {
        Self::new()
    }
}
