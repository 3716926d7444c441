//! Custom error types for the alignment engine.
//!
//! `AlignError` consolidates the failure taxonomy of a locate/trajectory/
//! focal operation so callers can branch programmatically:
//!
//! - **`Config` / `Configuration`**: file-level parsing errors from the
//!   `config` crate versus semantic errors caught during validation (an
//!   inverted travel limit, a non-positive step size).
//! - **`Instrument`**: propagated hardware failures from the motion group,
//!   blocking stage, or sensor. Drivers report `anyhow::Error`; the `#[from]`
//!   conversion lets the engine use `?` on every hardware call.
//! - **`BeamNotDetected`**: hard failure. The beam was never observed over a
//!   full sweep; the motion group is powered off before this is raised, and
//!   it aborts the enclosing operation.
//! - **`BeamCenterUnreachable`**: bounded failure. The beam was seen but a
//!   crossing was never confirmed within the travel limits; recoverable in
//!   principle by a caller retry with different bounds.
//! - **`SettleTimeout`**: a collaborator never reported "stopped" within the
//!   configured deadline.
//! - **`FractionOutOfRange` / `TrajectoryNotDerived` / `DegenerateTrajectory`**:
//!   caller usage errors on the trajectory API, distinct from hardware
//!   failures; none of them command any motion.

use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the alignment error type.
pub type AlignResult<T> = std::result::Result<T, AlignError>;

/// Failure taxonomy for locate, trajectory, and focal-point operations.
#[derive(Error, Debug)]
pub enum AlignError {
    /// Configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Configuration parsed but failed semantic validation.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A hardware collaborator reported a failure.
    #[error("Instrument error: {0}")]
    Instrument(#[from] anyhow::Error),

    /// Beam never observed during a full sweep; the group has been powered
    /// off and must be re-enabled before another attempt.
    #[error("beam not detected; motion group powered off")]
    BeamNotDetected,

    /// Beam was seen during the sweep but no crossing was confirmed within
    /// the travel limits.
    #[error("beam center not in reach within travel limits")]
    BeamCenterUnreachable,

    /// The group or blocking stage kept reporting motion past the configured
    /// settle deadline.
    #[error("stage did not settle within {waited:?}")]
    SettleTimeout {
        /// How long the poller waited before giving up.
        waited: Duration,
    },

    /// `position(fraction)` was queried outside [0, 1].
    #[error("trajectory fraction {0} outside [0, 1]")]
    FractionOutOfRange(f64),

    /// The trajectory model was queried before `derive` ran.
    #[error("trajectory has not been derived yet")]
    TrajectoryNotDerived,

    /// Both trajectory endpoints coincide; the sweep direction is undefined.
    #[error("trajectory endpoints coincide; sweep direction undefined")]
    DegenerateTrajectory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AlignError::Configuration("upper_limit_x below lower_limit_x".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration validation error: upper_limit_x below lower_limit_x"
        );
    }

    #[test]
    fn test_fraction_out_of_range_display() {
        let err = AlignError::FractionOutOfRange(1.1);
        assert!(err.to_string().contains("1.1"));
    }

    #[test]
    fn test_instrument_error_wraps_anyhow() {
        let err: AlignError = anyhow::anyhow!("sensor returned empty response").into();
        assert!(err.to_string().contains("sensor returned empty response"));
    }
}
