//! Alignment settings.
//!
//! Mirrors the layout of a `config/default.toml` deployment file: a flat
//! table of travel limits and search tuning plus a `[blocking]` table for
//! the beam-blocking stage. Every field has a default, so an empty source
//! yields a usable configuration for the reference bench (ILS250CC stages,
//! ±125 mm travel). Values can be layered from a TOML file and
//! `BEAM_ALIGN_*` environment overrides.
//!
//! ```toml
//! power_threshold = 0.003
//! coarse_velocity = 30.0
//! fine_velocity = 5.0
//! scan_steps = [50.0, 25.0, 5.0, 1.0, 0.25, 0.12, 0.05, 0.01]
//! settle_timeout = "30s"
//!
//! [blocking]
//! blocked_position = 0.0
//! unblocked_position = 50.0
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{AlignError, AlignResult};
use crate::geometry::LimitBox;

/// Kinematics and setpoints for the single-axis beam-blocking stage.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct BlockingStageSettings {
    /// Stage position that blocks the free beam (mm).
    pub blocked_position: f64,
    /// Stage position that clears the free beam (mm).
    pub unblocked_position: f64,
    /// Stage velocity while repositioning (mm/s).
    pub velocity: f64,
    /// Stage acceleration while repositioning (mm/s²).
    pub acceleration: f64,
}

impl Default for BlockingStageSettings {
    fn default() -> Self {
        Self {
            blocked_position: 0.0,
            unblocked_position: 50.0,
            velocity: 30.0,
            acceleration: 50.0,
        }
    }
}

/// Travel limits and search tuning for one locator instance.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Lower horizontal travel limit (mm).
    pub lower_limit_x: f64,
    /// Upper horizontal travel limit (mm).
    pub upper_limit_x: f64,
    /// Lower depth travel limit (mm).
    pub lower_limit_z: f64,
    /// Upper depth travel limit (mm).
    pub upper_limit_z: f64,
    /// Sensor power level dividing "beam present" from "beam absent".
    pub power_threshold: f64,
    /// Group velocity for the initial positioning move (mm/s).
    pub coarse_velocity: f64,
    /// Group velocity during search sweeps (mm/s).
    pub fine_velocity: f64,
    /// Refinement ladder step sizes, coarsest first (mm).
    pub scan_steps: Vec<f64>,
    /// Gain relating per-step horizontal displacement (mm) to the expected
    /// centroid advance (µm) in the overshoot rule. Empirically tuned for
    /// the ILS250CC stage + HD-LBP profiler bench; recalibrate for other
    /// hardware.
    pub offset_gain: f64,
    /// Half-width of the "centered within noise" centroid band (µm). Same
    /// calibration caveat as `offset_gain`.
    pub centroid_tolerance: f64,
    /// Delay between status/sensor polls while the group is moving.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Deadline for any single move to report stopped.
    #[serde(with = "humantime_serde")]
    pub settle_timeout: Duration,
    /// Pause after the initial positioning move, before sweeping.
    #[serde(with = "humantime_serde")]
    pub settle_pause: Duration,
    /// Beam-blocking stage setpoints and kinematics.
    pub blocking: BlockingStageSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            lower_limit_x: -125.0,
            upper_limit_x: 125.0,
            lower_limit_z: -125.0,
            upper_limit_z: 125.0,
            power_threshold: 0.003,
            coarse_velocity: 30.0,
            fine_velocity: 5.0,
            scan_steps: vec![50.0, 25.0, 5.0, 1.0, 0.25, 0.12, 0.05, 0.01],
            offset_gain: 500.0,
            centroid_tolerance: 20.0,
            poll_interval: Duration::from_millis(5),
            settle_timeout: Duration::from_secs(30),
            settle_pause: Duration::from_secs(1),
            blocking: BlockingStageSettings::default(),
        }
    }
}

impl Settings {
    /// Load settings from an optional TOML file plus `BEAM_ALIGN_*`
    /// environment overrides, then validate.
    pub fn load(path: Option<&Path>) -> AlignResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        let raw = builder
            .add_source(
                config::Environment::with_prefix("BEAM_ALIGN")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let settings: Settings = raw.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic validation beyond what deserialization enforces.
    pub fn validate(&self) -> AlignResult<()> {
        self.limit_box()?;
        if self.power_threshold <= 0.0 {
            return Err(AlignError::Configuration(format!(
                "power_threshold must be positive: {}",
                self.power_threshold
            )));
        }
        for (name, v) in [
            ("coarse_velocity", self.coarse_velocity),
            ("fine_velocity", self.fine_velocity),
            ("blocking.velocity", self.blocking.velocity),
            ("blocking.acceleration", self.blocking.acceleration),
            ("offset_gain", self.offset_gain),
            ("centroid_tolerance", self.centroid_tolerance),
        ] {
            if v <= 0.0 {
                return Err(AlignError::Configuration(format!(
                    "{name} must be positive: {v}"
                )));
            }
        }
        if self.scan_steps.is_empty() {
            return Err(AlignError::Configuration(
                "scan_steps must name at least one step size".to_string(),
            ));
        }
        if let Some(bad) = self.scan_steps.iter().find(|s| **s <= 0.0) {
            return Err(AlignError::Configuration(format!(
                "scan_steps entries must be positive: {bad}"
            )));
        }
        if self.settle_timeout.is_zero() {
            return Err(AlignError::Configuration(
                "settle_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// The travel rectangle described by the four limits.
    pub fn limit_box(&self) -> AlignResult<LimitBox> {
        LimitBox::new(
            self.lower_limit_x,
            self.upper_limit_x,
            self.lower_limit_z,
            self.upper_limit_z,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.power_threshold, 0.003);
        assert_eq!(settings.scan_steps.len(), 8);
        assert_eq!(settings.limit_box().unwrap().x_span(), 250.0);
    }

    #[test]
    fn test_inverted_limits_fail_validation() {
        let settings = Settings {
            lower_limit_x: 10.0,
            upper_limit_x: -10.0,
            ..Settings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(AlignError::Configuration(_))
        ));
    }

    #[test]
    fn test_empty_ladder_rejected() {
        let settings = Settings {
            scan_steps: vec![],
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        let settings = Settings {
            scan_steps: vec![5.0, 0.0],
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "power_threshold = 0.01\n\
             scan_steps = [10.0, 1.0]\n\
             settle_pause = \"250ms\"\n\
             [blocking]\n\
             unblocked_position = 40.0"
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.power_threshold, 0.01);
        assert_eq!(settings.scan_steps, vec![10.0, 1.0]);
        assert_eq!(settings.settle_pause, Duration::from_millis(250));
        assert_eq!(settings.blocking.unblocked_position, 40.0);
        // Untouched fields keep their defaults.
        assert_eq!(settings.coarse_velocity, 30.0);
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "fine_velocity = -5.0").unwrap();
        assert!(Settings::load(Some(file.path())).is_err());
    }
}
