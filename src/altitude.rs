//! Altitude fusion: barometer vs. sonar source selection with hysteresis,
//! plus the rate-limited error smoother that keeps sensor-source switches
//! from turning into throttle transients.

use crate::config::Config;
use crate::logging::log_info;

/// Altitude source chosen this tick. Recomputed from current readings only;
/// the previous tick's choice is the sole memory, used for hysteresis.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AltSource {
    Baro,
    Sonar,
}

pub struct AltitudeFusion {
    source: AltSource,
    fused_cm: i32,
    /// Rate-limited low-pass state of the altitude error fed to throttle.
    smoothed_error_cm: i32,
}

impl AltitudeFusion {
    pub fn new() -> Self {
        Self {
            source: AltSource::Baro,
            fused_cm: 0,
            smoothed_error_cm: 0,
        }
    }

    pub fn source(&self) -> AltSource {
        self.source
    }

    /// Fused altitude above home from the last `select` call.
    pub fn altitude_cm(&self) -> i32 {
        self.fused_cm
    }

    /// Smoothed altitude error from the last `smooth_error` call, consumed
    /// by the throttle controller.
    pub fn smoothed_error_cm(&self) -> i32 {
        self.smoothed_error_cm
    }

    /// Per-tick source selection. Sonar is preferred only while the baro
    /// says we are low enough for it to be in range AND the sonar reading
    /// itself is below its reliability ceiling; either threshold crossing
    /// hands control back to the barometer.
    pub fn select(&mut self, baro_alt_cm: i32, sonar_cm: Option<i32>, cfg: &Config) -> i32 {
        let next = match sonar_cm {
            Some(sonar) if baro_alt_cm < cfg.sonar_baro_cross_cm && sonar < cfg.sonar_max_cm => {
                AltSource::Sonar
            }
            _ => AltSource::Baro,
        };
        if next != self.source {
            log_info!("altitude source switch");
            self.source = next;
        }

        self.fused_cm = match self.source {
            AltSource::Baro => baro_alt_cm,
            // Clamp before use: the sensor is unreliable near its range limit.
            AltSource::Sonar => sonar_cm.unwrap_or(baro_alt_cm).min(cfg.sonar_max_cm),
        };
        self.fused_cm
    }

    /// Rate-limited low-pass of the altitude error. Steps toward the raw
    /// error by at most `alt_error_rate_cm` per call, then blends, so a
    /// source switch ramps into the throttle controller instead of jumping.
    pub fn smooth_error(&mut self, raw_error_cm: i32, cfg: &Config) -> i32 {
        let delta = raw_error_cm - self.smoothed_error_cm;
        let step = delta.clamp(-cfg.alt_error_rate_cm, cfg.alt_error_rate_cm);
        self.smoothed_error_cm += step - step / 4;
        self.smoothed_error_cm
    }

    pub fn reset_error(&mut self) {
        self.smoothed_error_cm = 0;
    }
}

impl Default for AltitudeFusion {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sonar_sweep_flips_source_exactly_once() {
        let cfg = Config::default();
        let mut fusion = AltitudeFusion::new();
        let baro = 500; // 5.0 m, below the 5.5 m crossover

        // Start in range: sonar wins.
        fusion.select(baro, Some(0), &cfg);
        assert_eq!(fusion.source(), AltSource::Sonar);

        let mut flips = 0;
        let mut prev = fusion.source();
        for sonar in (0..=650).step_by(10) {
            fusion.select(baro, Some(sonar), &cfg);
            if fusion.source() != prev {
                flips += 1;
                prev = fusion.source();
            }
        }
        assert_eq!(flips, 1);
        assert_eq!(fusion.source(), AltSource::Baro);
    }

    #[test]
    fn high_baro_forces_baro_even_with_sonar_echo() {
        let cfg = Config::default();
        let mut fusion = AltitudeFusion::new();
        fusion.select(800, Some(300), &cfg);
        assert_eq!(fusion.source(), AltSource::Baro);
        assert_eq!(fusion.altitude_cm(), 800);
    }

    #[test]
    fn sonar_value_feeds_fused_altitude() {
        let cfg = Config::default();
        let mut fusion = AltitudeFusion::new();
        fusion.select(100, Some(550), &cfg);
        assert_eq!(fusion.source(), AltSource::Sonar);
        assert_eq!(fusion.altitude_cm(), 550);
        // Crossing the ceiling hands back to baro.
        assert_eq!(fusion.select(100, Some(620), &cfg), 100);
        assert_eq!(fusion.source(), AltSource::Baro);
    }

    #[test]
    fn missing_sonar_means_baro() {
        let cfg = Config::default();
        let mut fusion = AltitudeFusion::new();
        assert_eq!(fusion.select(120, None, &cfg), 120);
        assert_eq!(fusion.source(), AltSource::Baro);
    }

    #[test]
    fn error_smoother_is_rate_limited() {
        let cfg = Config::default();
        let mut fusion = AltitudeFusion::new();
        // A 1000 cm step cannot pass through in one tick.
        let first = fusion.smooth_error(1_000, &cfg);
        assert!(first < 1_000 && first > 0);
        // It converges monotonically.
        let mut prev = first;
        for _ in 0..40 {
            let s = fusion.smooth_error(1_000, &cfg);
            assert!(s >= prev);
            prev = s;
        }
        assert!(prev > 900);
    }
}
