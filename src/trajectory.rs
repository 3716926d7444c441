//! The beam's measured path through the travel volume.
//!
//! Two locate passes at the depth extremes give the segment the beam is
//! known to run along; everything in between is linear interpolation.
//! Queries never extrapolate: the group can only be commanded inside the
//! measured segment.

use tracing::info;

use crate::config::Settings;
use crate::error::{AlignError, AlignResult};
use crate::geometry::{LimitBox, Position};
use crate::hardware::{BeamSensor, MotionGroup};
use crate::locate::BeamLocator;

/// An immutable measured beam segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trajectory {
    r_initial: Position,
    r_final: Position,
}

impl Trajectory {
    /// Segment from `r_initial` (entry) to `r_final` (exit).
    pub fn new(r_initial: Position, r_final: Position) -> Self {
        Self { r_initial, r_final }
    }

    /// Measured entry point (lower depth limit).
    pub fn r_initial(&self) -> Position {
        self.r_initial
    }

    /// Measured exit point (upper depth limit).
    pub fn r_final(&self) -> Position {
        self.r_final
    }

    /// Direction vector of the segment, `r_final - r_initial`.
    pub fn slope(&self) -> Position {
        self.r_final - self.r_initial
    }

    /// Interpolated point at `fraction` in [0, 1] along the segment.
    ///
    /// Fractions outside [0, 1] are refused rather than extrapolated. The
    /// lerp is evaluated in the form that is exact at both endpoints.
    pub fn position(&self, fraction: f64) -> AlignResult<Position> {
        if !(0.0..=1.0).contains(&fraction) {
            return Err(AlignError::FractionOutOfRange(fraction));
        }
        Ok(self.r_initial * (1.0 - fraction) + self.r_final * fraction)
    }
}

/// Derives and holds the current [`Trajectory`].
///
/// `derive` runs the beam locator at both depth limits; re-deriving
/// replaces the stored segment (no history is kept).
pub struct TrajectoryModel<'a> {
    group: &'a dyn MotionGroup,
    locator: BeamLocator<'a>,
    limits: LimitBox,
    trajectory: Option<Trajectory>,
}

impl<'a> TrajectoryModel<'a> {
    /// Build a model over the given hardware and validated settings.
    pub fn new(
        group: &'a dyn MotionGroup,
        sensor: &'a dyn BeamSensor,
        settings: &'a Settings,
    ) -> AlignResult<Self> {
        Ok(Self {
            group,
            locator: BeamLocator::new(group, sensor, settings)?,
            limits: settings.limit_box()?,
            trajectory: None,
        })
    }

    /// Locate the beam at the lower then upper depth limit and store the
    /// resulting segment.
    pub async fn derive(&mut self) -> AlignResult<Trajectory> {
        let r_initial = self.locator.locate_beam(self.limits.z_min()).await?;
        let r_final = self.locator.locate_beam(self.limits.z_max()).await?;
        let trajectory = Trajectory::new(r_initial, r_final);
        let slope = trajectory.slope();
        info!(
            slope_x = slope.x,
            slope_z = slope.z,
            "beam trajectory derived"
        );
        self.trajectory = Some(trajectory);
        Ok(trajectory)
    }

    /// The currently stored segment, if `derive` has run.
    pub fn trajectory(&self) -> Option<Trajectory> {
        self.trajectory
    }

    /// The locator this model measures with.
    pub fn locator(&self) -> &BeamLocator<'a> {
        &self.locator
    }

    /// Interpolated point along the stored segment.
    ///
    /// Errors with [`AlignError::TrajectoryNotDerived`] before the first
    /// `derive`, or [`AlignError::FractionOutOfRange`] outside [0, 1];
    /// neither commands any motion.
    pub fn position(&self, fraction: f64) -> AlignResult<Position> {
        self.trajectory
            .ok_or(AlignError::TrajectoryNotDerived)?
            .position(fraction)
    }

    /// Command the group to the interpolated point at `fraction`.
    ///
    /// The range check in [`position`](Self::position) guarantees the group
    /// is never sent beyond the measured segment through this path.
    pub async fn move_to_fraction(&self, fraction: f64) -> AlignResult<Position> {
        let target = self.position(fraction)?;
        self.group.move_line(target).await?;
        Ok(target)
    }
}
