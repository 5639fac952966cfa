//! Simulator bridge codec (X-Plane style wire format).
//!
//! Pure framing and conversion: decoding the fixed-layout "DATA" stream
//! into sensor values and encoding "DREF" name/value and "DSEL" selection
//! frames for the return path. Transport (UDP sockets) lives outside the
//! core; the control loop is indifferent to whether sensor values came from
//! here or from real drivers.

use heapless::Vec;

use crate::state::{Attitude, BodyRates, GpsFix, PilotInput};

/// 5-byte frame markers: 4 ASCII characters + an index byte.
pub const DATA_MARKER: &[u8; 5] = b"DATA0";
pub const DREF_MARKER: &[u8; 5] = b"DREF0";
pub const DSEL_MARKER: &[u8; 5] = b"DSEL0";
pub const USEL_MARKER: &[u8; 5] = b"USEL0";

/// Record size: u32 code + 8 × f32 values.
pub const RECORD_LEN: usize = 36;
const MARKER_LEN: usize = 5;
/// DREF frames carry a fixed 500-byte name field.
pub const DREF_NAME_LEN: usize = 500;
pub const DREF_FRAME_LEN: usize = MARKER_LEN + 4 + DREF_NAME_LEN;

/// Numeric codes of the data records the bridge consumes.
pub mod codes {
    pub const TIMES: u32 = 1;
    pub const SPEED: u32 = 3;
    pub const GLOAD: u32 = 4;
    pub const JOYSTICK1: u32 = 8;
    pub const TRIM: u32 = 13;
    pub const ANGULAR_VELOCITIES: u32 = 16;
    pub const PITCH_ROLL_HEADING: u32 = 17;
    pub const LAT_LON_ALT: u32 = 20;
    pub const LOC_VEL_DIST: u32 = 21;
    pub const THROTTLE_COMMAND: u32 = 25;
    pub const MIXTURE: u32 = 29;
    pub const ENGINE_RPM: u32 = 37;
    pub const PROP_RPM: u32 = 38;
    pub const GENERATOR: u32 = 58;
}

const KNOTS_TO_CMS: f32 = 51.444;
const FEET_TO_CM: f32 = 30.48;
const RAD_TO_DEG: f32 = 57.295_78;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SitlError {
    /// Frame shorter than its marker or not a whole number of records.
    Truncated,
    BadMarker,
    /// Output buffer too small for the frame being encoded.
    BufferTooSmall,
}

/// One decoded 36-byte record.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DataRecord {
    pub code: u32,
    pub values: [f32; 8],
}

/// Decode a DATA frame into its records. Malformed frames are rejected
/// whole; a partial trailing record is treated as truncation, not ignored.
pub fn decode_data(buf: &[u8]) -> Result<Vec<DataRecord, 16>, SitlError> {
    if buf.len() < MARKER_LEN {
        return Err(SitlError::Truncated);
    }
    // The index byte varies between simulator versions; match on the name.
    if buf[..4] != DATA_MARKER[..4] {
        return Err(SitlError::BadMarker);
    }
    let body = &buf[MARKER_LEN..];
    if body.len() % RECORD_LEN != 0 {
        return Err(SitlError::Truncated);
    }

    let mut records = Vec::new();
    for chunk in body.chunks_exact(RECORD_LEN) {
        let code = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        let mut values = [0.0f32; 8];
        for (i, v) in values.iter_mut().enumerate() {
            let at = 4 + i * 4;
            *v = f32::from_le_bytes([chunk[at], chunk[at + 1], chunk[at + 2], chunk[at + 3]]);
        }
        let _ = records.push(DataRecord { code, values });
    }
    Ok(records)
}

/// Encode a DREF name/value frame: marker + f32 + zero-padded name.
pub fn encode_dref(name: &str, value: f32, out: &mut [u8]) -> Result<usize, SitlError> {
    if out.len() < DREF_FRAME_LEN || name.len() > DREF_NAME_LEN {
        return Err(SitlError::BufferTooSmall);
    }
    out[..MARKER_LEN].copy_from_slice(DREF_MARKER);
    out[MARKER_LEN..MARKER_LEN + 4].copy_from_slice(&value.to_le_bytes());
    let name_at = MARKER_LEN + 4;
    out[name_at..name_at + name.len()].copy_from_slice(name.as_bytes());
    out[name_at + name.len()..DREF_FRAME_LEN].fill(0);
    Ok(DREF_FRAME_LEN)
}

/// Encode a DSEL (subscribe) or USEL (unsubscribe) selection frame:
/// marker + one u32 per record code.
pub fn encode_selection(
    marker: &[u8; 5],
    selection: &[u32],
    out: &mut [u8],
) -> Result<usize, SitlError> {
    let len = MARKER_LEN + selection.len() * 4;
    if out.len() < len {
        return Err(SitlError::BufferTooSmall);
    }
    out[..MARKER_LEN].copy_from_slice(marker);
    for (i, code) in selection.iter().enumerate() {
        let at = MARKER_LEN + i * 4;
        out[at..at + 4].copy_from_slice(&code.to_le_bytes());
    }
    Ok(len)
}

/// Accumulated simulator state, updated record by record. Synthesizes the
/// same values the real drivers would produce.
#[derive(Clone, Copy, Debug, Default)]
pub struct SimState {
    pub time_s: f32,
    pub roll_deg: f32,
    pub pitch_deg: f32,
    pub heading_deg: f32,
    pub lat_deg: f32,
    pub lng_deg: f32,
    pub alt_ft: f32,
    pub roll_dps: f32,
    pub pitch_dps: f32,
    pub yaw_dps: f32,
    pub airspeed_kt: f32,
    /// Joystick deflections, −1..1.
    pub elevator: f32,
    pub aileron: f32,
    pub rudder: f32,
    /// Commanded throttle, 0..1.
    pub throttle: f32,
    /// A position record has arrived since the last `take_fix`.
    has_position: bool,
}

impl SimState {
    pub fn apply(&mut self, record: &DataRecord) {
        let v = &record.values;
        match record.code {
            codes::TIMES => self.time_s = v[2],
            codes::SPEED => self.airspeed_kt = v[1],
            codes::JOYSTICK1 => {
                self.elevator = v[0];
                self.aileron = v[1];
                self.rudder = v[2];
            }
            codes::ANGULAR_VELOCITIES => {
                self.pitch_dps = v[0] * RAD_TO_DEG;
                self.roll_dps = v[1] * RAD_TO_DEG;
                self.yaw_dps = v[2] * RAD_TO_DEG;
            }
            codes::PITCH_ROLL_HEADING => {
                self.pitch_deg = v[0];
                self.roll_deg = v[1];
                self.heading_deg = v[2];
            }
            codes::LAT_LON_ALT => {
                self.lat_deg = v[0];
                self.lng_deg = v[1];
                self.alt_ft = v[2];
                self.has_position = true;
            }
            codes::THROTTLE_COMMAND => self.throttle = v[0],
            // Remaining codes carry values the core has no use for.
            _ => {}
        }
    }

    pub fn apply_frame(&mut self, buf: &[u8]) -> Result<(), SitlError> {
        for record in decode_data(buf)? {
            self.apply(&record);
        }
        Ok(())
    }

    pub fn attitude(&self) -> Attitude {
        Attitude {
            roll_cd: (self.roll_deg * 100.0) as i32,
            pitch_cd: (self.pitch_deg * 100.0) as i32,
            yaw_cd: crate::geo::wrap_360_cd((self.heading_deg * 100.0) as i32),
        }
    }

    pub fn rates(&self) -> BodyRates {
        BodyRates {
            roll_dps: self.roll_dps,
            pitch_dps: self.pitch_dps,
            yaw_dps: self.yaw_dps,
        }
    }

    /// Synthesized GPS fix, read-and-clear like the real driver. The wire
    /// carries f32 coordinates, so precision is simulator-limited.
    pub fn take_fix(&mut self) -> Option<GpsFix> {
        if !self.has_position {
            return None;
        }
        self.has_position = false;
        Some(GpsFix {
            lat: (self.lat_deg * 1.0e7) as i32,
            lng: (self.lng_deg * 1.0e7) as i32,
            alt_cm: (self.alt_ft * FEET_TO_CM) as i32,
            ground_speed_cms: (self.airspeed_kt * KNOTS_TO_CMS) as u32,
            ground_course_cd: crate::geo::wrap_360_cd((self.heading_deg * 100.0) as i32),
            fix_valid: true,
            sats: 10,
        })
    }

    pub fn pilot_input(&self) -> PilotInput {
        let throttle = (self.throttle * 1_000.0) as i32;
        PilotInput {
            roll_cd: (self.aileron * 4_500.0) as i32,
            pitch_cd: (self.elevator * 4_500.0) as i32,
            yaw_cd: (self.rudder * 4_500.0) as i32,
            throttle: throttle.clamp(0, 1_000),
            // Synthesize a healthy raw channel so the radio failsafe sees
            // the link as alive.
            throttle_raw: (1_000 + throttle) as u16,
            mode_switch: 0,
            trim_switch: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_record(frame: &mut std::vec::Vec<u8>, code: u32, values: [f32; 8]) {
        frame.extend_from_slice(&code.to_le_bytes());
        for v in values {
            frame.extend_from_slice(&v.to_le_bytes());
        }
    }

    fn vals(head: &[f32]) -> [f32; 8] {
        let mut out = [0.0; 8];
        out[..head.len()].copy_from_slice(head);
        out
    }

    #[test]
    fn decode_round_trip_of_a_two_record_frame() {
        let mut frame = std::vec::Vec::from(&DATA_MARKER[..]);
        push_record(&mut frame, codes::PITCH_ROLL_HEADING, vals(&[2.5, -10.0, 90.0]));
        push_record(&mut frame, codes::LAT_LON_ALT, vals(&[47.3977, 8.5455, 1640.0]));

        let records = decode_data(&frame).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].code, codes::PITCH_ROLL_HEADING);
        assert_eq!(records[0].values[1], -10.0);
        assert_eq!(records[1].code, codes::LAT_LON_ALT);
    }

    #[test]
    fn malformed_frames_are_rejected_whole() {
        assert_eq!(decode_data(b"DAT"), Err(SitlError::Truncated));
        assert_eq!(decode_data(b"DREF0"), Err(SitlError::BadMarker));

        // A partial trailing record poisons the frame.
        let mut frame = std::vec::Vec::from(&DATA_MARKER[..]);
        push_record(&mut frame, codes::SPEED, vals(&[60.0]));
        frame.extend_from_slice(&[0u8; 7]);
        assert_eq!(decode_data(&frame), Err(SitlError::Truncated));
    }

    #[test]
    fn sim_state_synthesizes_sensor_values() {
        let mut frame = std::vec::Vec::from(&DATA_MARKER[..]);
        push_record(&mut frame, codes::PITCH_ROLL_HEADING, vals(&[2.5, -10.0, 90.0]));
        push_record(&mut frame, codes::LAT_LON_ALT, vals(&[47.3977, 8.5455, 1640.0]));
        push_record(&mut frame, codes::ANGULAR_VELOCITIES, vals(&[0.0, 0.1, 0.0]));
        // Airspeed sits in the second value slot, running time in the third.
        push_record(&mut frame, codes::SPEED, vals(&[0.0, 60.0]));
        push_record(&mut frame, codes::TIMES, vals(&[0.0, 0.0, 12.5]));

        let mut sim = SimState::default();
        sim.apply_frame(&frame).unwrap();
        assert_eq!(sim.time_s, 12.5);
        assert_eq!(sim.airspeed_kt, 60.0);

        let att = sim.attitude();
        assert_eq!(att.pitch_cd, 250);
        assert_eq!(att.roll_cd, -1_000);
        assert_eq!(att.yaw_cd, 9_000);
        assert!((sim.rates().roll_dps - 5.73).abs() < 0.01);

        let fix = sim.take_fix().unwrap();
        assert!((fix.lat - 473_977_000).abs() < 200); // f32 wire precision
        assert!((fix.lng - 85_455_000).abs() < 200);
        assert_eq!(fix.alt_cm, (1640.0 * 30.48) as i32);
        let speed = fix.ground_speed_cms as i32;
        assert!((speed - 3_086).abs() <= 2, "speed = {speed}"); // 60 kt
        assert!(fix.fix_valid);
        // Read-and-clear, like the hardware driver.
        assert!(sim.take_fix().is_none());
    }

    #[test]
    fn joystick_maps_to_pilot_input() {
        let mut sim = SimState::default();
        sim.apply(&DataRecord {
            code: codes::JOYSTICK1,
            values: vals(&[0.5, -1.0, 0.0]),
        });
        sim.apply(&DataRecord {
            code: codes::THROTTLE_COMMAND,
            values: vals(&[0.6]),
        });
        let pilot = sim.pilot_input();
        assert_eq!(pilot.pitch_cd, 2_250);
        assert_eq!(pilot.roll_cd, -4_500);
        assert_eq!(pilot.throttle, 600);
        assert!(pilot.throttle_raw > 1_000);
    }

    #[test]
    fn dref_frame_layout() {
        let mut out = [0u8; DREF_FRAME_LEN];
        let len = encode_dref("sim/joystick/throttle", 0.75, &mut out).unwrap();
        assert_eq!(len, DREF_FRAME_LEN);
        assert_eq!(&out[..5], DREF_MARKER);
        assert_eq!(f32::from_le_bytes([out[5], out[6], out[7], out[8]]), 0.75);
        assert_eq!(&out[9..9 + 21], b"sim/joystick/throttle");
        assert!(out[9 + 21..].iter().all(|&b| b == 0));

        let mut small = [0u8; 64];
        assert_eq!(
            encode_dref("x", 0.0, &mut small),
            Err(SitlError::BufferTooSmall)
        );
    }

    #[test]
    fn selection_frame_layout() {
        let mut out = [0u8; 64];
        let sel = [codes::PITCH_ROLL_HEADING, codes::LAT_LON_ALT];
        let len = encode_selection(DSEL_MARKER, &sel, &mut out).unwrap();
        assert_eq!(len, 13);
        assert_eq!(&out[..5], DSEL_MARKER);
        assert_eq!(
            u32::from_le_bytes([out[5], out[6], out[7], out[8]]),
            codes::PITCH_ROLL_HEADING
        );
        let _ = encode_selection(USEL_MARKER, &sel, &mut out).unwrap();
        assert_eq!(&out[..5], USEL_MARKER);
    }
}
