//! Directed fixed-step sweeps with live beam-crossing detection.
//!
//! One [`ScanEngine::scan`] call is a single pass: clamp the endpoints, bin
//! the displacement into evenly spaced steps, and walk them in order while
//! polling the sensor whenever the group is in flight. Two rules decide that
//! the beam was crossed:
//!
//! - **power drop**: the beam was sighted earlier in the pass and the
//!   settled sample is dark again, so the sweep just stepped over it;
//! - **centroid overshoot**: the settled sample is bright and the centroid
//!   sits at or beyond the per-step advance, so a finer sweep cannot get
//!   closer from this side.
//!
//! All pass state (step list, step vector, sighting flag) lives in the call
//! frame, so every pass is independent and separately testable. The poll
//! loop is bounded by the configured settle deadline; a controller that
//! never reports "stopped" surfaces as [`AlignError::SettleTimeout`] rather
//! than a hang.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::error::{AlignError, AlignResult};
use crate::geometry::{LimitBox, Position};
use crate::hardware::{BeamSensor, MotionGroup};

/// Structured result of one sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanOutcome {
    /// Beam judged crossed at this step position.
    Crossing(Position),
    /// Sweep ended on the beam with the centroid inside the noise band; the
    /// carried position is the group's reported one.
    Centered(Position),
    /// Degenerate request: the clamped endpoints coincide, or lie closer
    /// than one step. No move was commanded.
    NoMovement,
}

impl ScanOutcome {
    /// The position this outcome settled on, if any.
    pub fn position(&self) -> Option<Position> {
        match self {
            ScanOutcome::Crossing(p) | ScanOutcome::Centered(p) => Some(*p),
            ScanOutcome::NoMovement => None,
        }
    }
}

// Refined pass endpoints inherit ulp-scale rounding from earlier passes;
// nudge before flooring so a nominally integral displacement/step ratio
// keeps its last step.
const COUNT_NUDGE: f64 = 1e-9;

/// Bin a clamped displacement into `count` equal steps.
///
/// Returns `None` when no sweep is possible (zero displacement, or shorter
/// than one step).
fn sweep_plan(span: Position, step_size: f64) -> Option<(usize, Position)> {
    let displacement = span.norm();
    if displacement == 0.0 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let count = (displacement / step_size + COUNT_NUDGE).floor() as usize;
    if count == 0 {
        return None;
    }
    Some((count, span / count as f64))
}

/// Executes directed sweeps between two clamped endpoints, watching the
/// sensor for the beam.
///
/// Borrows the hardware handles; owns nothing but tuning values copied from
/// [`Settings`].
#[derive(Clone, Copy)]
pub struct ScanEngine<'a> {
    group: &'a dyn MotionGroup,
    sensor: &'a dyn BeamSensor,
    limits: LimitBox,
    settings: &'a Settings,
}

impl<'a> ScanEngine<'a> {
    /// Build an engine over the given hardware and settings.
    pub fn new(
        group: &'a dyn MotionGroup,
        sensor: &'a dyn BeamSensor,
        settings: &'a Settings,
    ) -> AlignResult<Self> {
        Ok(Self {
            group,
            sensor,
            limits: settings.limit_box()?,
            settings,
        })
    }

    /// The travel rectangle this engine clamps into.
    pub fn limits(&self) -> LimitBox {
        self.limits
    }

    /// Sweep from `start` to `stop` in increments of `step_size`
    /// millimeters, reporting the beam crossing if one is found.
    ///
    /// Both endpoints are clamped into the travel rectangle before use. On a
    /// pass that never observes the beam the group is powered off and
    /// [`AlignError::BeamNotDetected`] is raised; a pass that sighted the
    /// beam without confirming a crossing raises
    /// [`AlignError::BeamCenterUnreachable`].
    pub async fn scan(
        &self,
        start: Position,
        stop: Position,
        step_size: f64,
    ) -> AlignResult<ScanOutcome> {
        if step_size <= 0.0 {
            return Err(AlignError::Configuration(format!(
                "step size must be positive: {step_size}"
            )));
        }
        let start = self.limits.clamp(start);
        let stop = self.limits.clamp(stop);
        let Some((count, step_vec)) = sweep_plan(stop - start, step_size) else {
            debug!(
                x = start.x,
                z = start.z,
                "no displacement after clamping; skipping sweep"
            );
            return Ok(ScanOutcome::NoMovement);
        };
        debug!(
            from_x = start.x,
            from_z = start.z,
            to_x = stop.x,
            to_z = stop.z,
            step = step_size,
            count,
            "sweeping for beam"
        );

        let threshold = self.settings.power_threshold;
        let mut beam_seen = false;
        for index in 0..=count {
            let target = if index == count {
                stop
            } else {
                start + step_vec * index as f64
            };
            self.group.move_line(target).await?;
            beam_seen |= self.watch_flight().await?;

            let settled = self.sensor.sample().await?;
            if settled.power < threshold && beam_seen {
                info!(x = target.x, z = target.z, "beam crossed; power dropped");
                return Ok(ScanOutcome::Crossing(target));
            }
            if settled.power > threshold {
                beam_seen = true;
                let beam_offset = settled.centroid_x - step_vec.x * self.settings.offset_gain;
                let overshot = (step_vec.x > 0.0 && beam_offset >= 0.0)
                    || (step_vec.x < 0.0 && beam_offset <= 0.0);
                if overshot {
                    info!(
                        x = target.x,
                        z = target.z,
                        centroid = settled.centroid_x,
                        "beam crossed; centroid overshoot"
                    );
                    return Ok(ScanOutcome::Crossing(target));
                }
            }
        }

        // The sweep ran out of travel without a confirmed crossing.
        let last = self.sensor.sample().await?;
        if last.power > threshold && last.centroid_x.abs() < self.settings.centroid_tolerance {
            let here = self.group.position().await?;
            info!(
                x = here.x,
                z = here.z,
                centroid = last.centroid_x,
                "on the beam within noise band"
            );
            return Ok(ScanOutcome::Centered(here));
        }
        if beam_seen {
            warn!("beam sighted but center never confirmed within travel limits");
            return Err(AlignError::BeamCenterUnreachable);
        }
        // Beam may be out of range, blocked, or swept past faster than the
        // sensor polling could register. Cut power before surfacing.
        error!("beam not detected over full sweep; powering group off");
        self.group.power_off().await?;
        Err(AlignError::BeamNotDetected)
    }

    /// Poll the sensor while the group is in flight; report whether any
    /// in-flight sample sighted the beam.
    async fn watch_flight(&self) -> AlignResult<bool> {
        let mut beam_seen = false;
        let started = Instant::now();
        while self.group.is_moving().await? {
            if self.sensor.sample().await?.power > self.settings.power_threshold {
                beam_seen = true;
            }
            if started.elapsed() >= self.settings.settle_timeout {
                return Err(AlignError::SettleTimeout {
                    waited: self.settings.settle_timeout,
                });
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
        Ok(beam_seen)
    }
}

/// Poll the group until it reports stopped, bounded by `settle_timeout`.
pub async fn wait_until_stopped(
    group: &dyn MotionGroup,
    poll_interval: Duration,
    settle_timeout: Duration,
) -> AlignResult<()> {
    let started = Instant::now();
    while group.is_moving().await? {
        if started.elapsed() >= settle_timeout {
            return Err(AlignError::SettleTimeout {
                waited: settle_timeout,
            });
        }
        tokio::time::sleep(poll_interval).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_plan_basic() {
        let (count, step) = sweep_plan(Position::new(10.0, 0.0), 1.0).unwrap();
        assert_eq!(count, 10);
        assert_eq!(step, Position::new(1.0, 0.0));
    }

    #[test]
    fn test_sweep_plan_floors_partial_steps() {
        let (count, step) = sweep_plan(Position::new(9.9, 0.0), 2.0).unwrap();
        assert_eq!(count, 4);
        assert!((step.x - 2.475).abs() < 1e-12);
    }

    #[test]
    fn test_sweep_plan_degenerate() {
        assert!(sweep_plan(Position::ZERO, 1.0).is_none());
        // Displacement shorter than one step: nothing to sweep.
        assert!(sweep_plan(Position::new(0.4, 0.0), 1.0).is_none());
    }

    #[test]
    fn test_sweep_plan_survives_endpoint_rounding() {
        // 12.555 - 12.455 lands an ulp off 0.1; the nudge keeps the tenth
        // step either way.
        let displacement = 12.555_f64 - 12.455_f64;
        let (count, _) = sweep_plan(Position::new(displacement, 0.0), 0.01).unwrap();
        assert_eq!(count, 10);
    }

    #[test]
    fn test_sweep_plan_diagonal_uses_euclidean_length() {
        let (count, step) = sweep_plan(Position::new(3.0, 4.0), 1.0).unwrap();
        assert_eq!(count, 5);
        assert!((step.norm() - 1.0).abs() < 1e-12);
    }
}
