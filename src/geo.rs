//! Pure navigation math over fixed-point geodetic coordinates.
//!
//! Angles are integer hundredths of a degree so long missions do not
//! accumulate floating-point drift; floats appear only inside the
//! trigonometric helpers. One latitude/longitude unit (1e-7 deg of
//! latitude) is 1.113195 cm on the ground.

use micromath::F32Ext;

use crate::state::Location;

/// Ground distance of one lat/lng fixed-point unit, in centimeters.
const UNIT_TO_CM: f32 = 1.113195;
const DEG_TO_RAD: f32 = core::f32::consts::PI / 180.0;
/// Radians to centidegrees.
const RAD_TO_CD: f32 = 5729.57795;

/// Normalize an angle in centidegrees into [0, 36000).
pub fn wrap_360_cd(angle_cd: i32) -> i32 {
    let mut r = angle_cd % 36_000;
    if r < 0 {
        r += 36_000;
    }
    r
}

/// Normalize an angle in centidegrees into [-18000, 18000).
pub fn wrap_180_cd(angle_cd: i32) -> i32 {
    let r = wrap_360_cd(angle_cd);
    if r >= 18_000 {
        r - 36_000
    } else {
        r
    }
}

pub fn cd_to_rad(cd: i32) -> f32 {
    cd as f32 * 0.01 * DEG_TO_RAD
}

/// Longitude scaling pair for the equirectangular projection. Longitude
/// degrees shrink by cos(latitude); the pair is recomputed whenever home
/// changes and cached so the per-tick math stays multiplication-only.
#[derive(Clone, Copy, Debug)]
pub struct LongitudeScale {
    pub down: f32,
    pub up: f32,
}

impl Default for LongitudeScale {
    fn default() -> Self {
        Self { down: 1.0, up: 1.0 }
    }
}

impl LongitudeScale {
    /// Build the scale pair from a reference latitude in degrees ×1e7.
    pub fn from_lat(lat_e7: i32) -> Self {
        let down = (lat_e7 as f32 * 1.0e-7 * DEG_TO_RAD).cos();
        // Guard the poles; a multirotor will not fly there but the math
        // must not divide by zero.
        let down = if down.abs() < 0.01 { 0.01 } else { down };
        Self {
            down,
            up: 1.0 / down,
        }
    }
}

/// Bearing from `from` to `to` in centidegrees, [0, 36000).
pub fn get_bearing_cd(from: &Location, to: &Location, scale: &LongitudeScale) -> i32 {
    let off_x = (to.lng - from.lng) as f32;
    let off_y = (to.lat - from.lat) as f32 * scale.up;
    let bearing = 9_000 + ((-off_y).atan2(off_x) * RAD_TO_CD) as i32;
    wrap_360_cd(bearing)
}

/// Planar-approximation ground distance from `from` to `to` in centimeters.
pub fn get_distance_cm(from: &Location, to: &Location, scale: &LongitudeScale) -> i32 {
    let dlat = (to.lat - from.lat) as f32;
    let dlng = (to.lng - from.lng) as f32 * scale.down;
    ((dlat * dlat + dlng * dlng).sqrt() * UNIT_TO_CM) as i32
}

/// Perpendicular deviation from the prev→next track line, in centimeters.
/// Positive when the vehicle sits left of the track (the live bearing
/// deviates right of it), negative when right.
///
/// `target_bearing_cd` is the live bearing vehicle→next, `track_bearing_cd`
/// the fixed bearing prev→next captured at waypoint change.
pub fn crosstrack_error_cm(target_bearing_cd: i32, track_bearing_cd: i32, distance_cm: i32) -> i32 {
    let delta = cd_to_rad(wrap_180_cd(target_bearing_cd - track_bearing_cd));
    (delta.sin() * distance_cm as f32) as i32
}

/// Offset `base` by a north/east displacement in centimeters.
/// Used to build the SIMPLE/FBW virtual waypoints.
pub fn location_offset(
    base: &Location,
    north_cm: i32,
    east_cm: i32,
    scale: &LongitudeScale,
) -> Location {
    Location {
        lat: base.lat + (north_cm as f32 / UNIT_TO_CM) as i32,
        lng: base.lng + (east_cm as f32 / UNIT_TO_CM * scale.up) as i32,
        alt: base.alt,
    }
}

/// Bearing of a north/east ground vector, centidegrees [0, 36000).
pub fn ne_bearing_cd(north: i32, east: i32) -> i32 {
    let bearing = 9_000 + ((-(north as f32)).atan2(east as f32) * RAD_TO_CD) as i32;
    wrap_360_cd(bearing)
}

/// Rotate a forward/right stick vector by `bearing_cd` into north/east.
pub fn rotate_to_ne(forward: i32, right: i32, bearing_cd: i32) -> (i32, i32) {
    let b = cd_to_rad(bearing_cd);
    let (sin_b, cos_b) = (b.sin(), b.cos());
    let north = forward as f32 * cos_b - right as f32 * sin_b;
    let east = forward as f32 * sin_b + right as f32 * cos_b;
    (north as i32, east as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(lat: i32, lng: i32) -> Location {
        Location::new(lat, lng, 0)
    }

    #[test]
    fn wrap_360_stays_in_range_and_is_idempotent() {
        for a in [-720_000, -36_001, -1, 0, 1, 17_999, 36_000, 99_999, 720_000] {
            let w = wrap_360_cd(a);
            assert!((0..36_000).contains(&w), "wrap_360_cd({a}) = {w}");
            assert_eq!(wrap_360_cd(w), w);
        }
    }

    #[test]
    fn wrap_180_symmetry() {
        assert_eq!(wrap_180_cd(18_000), -18_000);
        assert_eq!(wrap_180_cd(-18_001), 17_999);
        assert_eq!(wrap_180_cd(100), 100);
        assert_eq!(wrap_180_cd(-100), -100);
    }

    #[test]
    fn bearing_cardinal_directions() {
        let scale = LongitudeScale::default();
        let origin = loc(0, 0);
        // 1797 units ≈ 20 m
        assert!(get_bearing_cd(&origin, &loc(1_797, 0), &scale).abs() < 100); // north
        let east = get_bearing_cd(&origin, &loc(0, 1_797), &scale);
        assert!((east - 9_000).abs() < 100);
        let south = get_bearing_cd(&origin, &loc(-1_797, 0), &scale);
        assert!((south - 18_000).abs() < 100);
        let west = get_bearing_cd(&origin, &loc(0, -1_797), &scale);
        assert!((west - 27_000).abs() < 100);
    }

    #[test]
    fn bearing_antisymmetric_under_reversal() {
        let scale = LongitudeScale::from_lat(473_977_000); // ~47.4°N
        let a = loc(473_977_000, 85_455_000);
        let b = loc(473_982_000, 85_463_000);
        let ab = get_bearing_cd(&a, &b, &scale);
        let ba = get_bearing_cd(&b, &a, &scale);
        let diff = wrap_180_cd(ab - wrap_360_cd(ba + 18_000));
        assert!(diff.abs() < 100, "ab={ab} ba={ba}");
    }

    #[test]
    fn distance_zero_and_symmetric() {
        let scale = LongitudeScale::from_lat(473_977_000);
        let a = loc(473_977_000, 85_455_000);
        let b = loc(473_978_500, 85_457_000);
        assert_eq!(get_distance_cm(&a, &a, &scale), 0);
        assert_eq!(
            get_distance_cm(&a, &b, &scale),
            get_distance_cm(&b, &a, &scale)
        );
    }

    #[test]
    fn distance_twenty_meters_north() {
        let scale = LongitudeScale::default();
        let origin = loc(0, 0);
        let north_20m = loc(1_797, 0);
        let d = get_distance_cm(&origin, &north_20m, &scale);
        assert!((d - 2_000).abs() < 20, "d = {d}");
    }

    #[test]
    fn longitude_scaling_shrinks_east_west_distance() {
        let equator = LongitudeScale::from_lat(0);
        let high_lat = LongitudeScale::from_lat(600_000_000); // 60°N
        let a = loc(0, 0);
        let b = loc(0, 10_000);
        let d_eq = get_distance_cm(&a, &b, &equator);
        let d_60 = get_distance_cm(&a, &b, &high_lat);
        // cos(60°) = 0.5
        assert!((d_60 * 2 - d_eq).abs() < d_eq / 50, "{d_eq} vs {d_60}");
    }

    #[test]
    fn crosstrack_sign_and_magnitude() {
        // Vehicle right of a northbound track: the live bearing deviates
        // left of the track line, error negative.
        let err = crosstrack_error_cm(35_430, 0, 10_000); // ~-5.7° offset
        assert!(err < 0, "err = {err}");
        let err = crosstrack_error_cm(570, 0, 10_000);
        assert!(err > 900 && err < 1_100, "err = {err}");
    }

    #[test]
    fn offset_round_trips_through_distance() {
        let scale = LongitudeScale::from_lat(473_977_000);
        let base = loc(473_977_000, 85_455_000);
        let moved = location_offset(&base, 2_000, 0, &scale);
        let d = get_distance_cm(&base, &moved, &scale);
        assert!((d - 2_000).abs() < 20, "d = {d}");

        let moved_e = location_offset(&base, 0, 2_000, &scale);
        let d = get_distance_cm(&base, &moved_e, &scale);
        assert!((d - 2_000).abs() < 40, "d = {d}");
    }

    #[test]
    fn rotate_to_ne_east_bearing() {
        // Facing east, "forward" is east.
        let (north, east) = rotate_to_ne(1_000, 0, 9_000);
        assert!(north.abs() < 20);
        assert!((east - 1_000).abs() < 20);
        // Facing east, "right" is south.
        let (north, east) = rotate_to_ne(0, 1_000, 9_000);
        assert!((north + 1_000).abs() < 20);
        assert!(east.abs() < 20);
    }
}
