//! Multi-resolution beam search.
//!
//! The locator converges on the beam by running the scan engine repeatedly
//! with geometrically decreasing step sizes and alternating sweep direction:
//! the first pass covers the full travel at the coarsest step, and each
//! subsequent pass sweeps back across a window of twice the previous step
//! size, centered wherever that pass reported the crossing. The ladder of
//! (step, sign, range) values is a plain iterator so the policy can be
//! checked without hardware.

use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::AlignResult;
use crate::geometry::{LimitBox, Position};
use crate::hardware::{BeamSensor, MotionGroup};
use crate::scan::{wait_until_stopped, ScanEngine, ScanOutcome};

/// One pass of the refinement ladder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinementPass {
    /// Step size for this pass (mm).
    pub step_size: f64,
    /// Sweep direction sign, alternating `+1, -1, …`.
    pub sign: f64,
    /// Sweep range for this pass (mm along the sweep direction).
    pub range: f64,
}

/// Iterator over the refinement passes for a given step ladder.
///
/// Pass 0 spans `initial_range`; pass i spans twice the previous pass's
/// step size.
#[derive(Debug, Clone)]
pub struct RefinementLadder<'a> {
    steps: &'a [f64],
    initial_range: f64,
    index: usize,
}

impl<'a> RefinementLadder<'a> {
    /// Ladder over `steps` whose first pass covers `initial_range`.
    pub fn new(steps: &'a [f64], initial_range: f64) -> Self {
        Self {
            steps,
            initial_range,
            index: 0,
        }
    }
}

impl Iterator for RefinementLadder<'_> {
    type Item = RefinementPass;

    fn next(&mut self) -> Option<RefinementPass> {
        let step_size = *self.steps.get(self.index)?;
        let range = if self.index == 0 {
            self.initial_range
        } else {
            2.0 * self.steps[self.index - 1]
        };
        let sign = if self.index % 2 == 0 { 1.0 } else { -1.0 };
        self.index += 1;
        Some(RefinementPass {
            step_size,
            sign,
            range,
        })
    }
}

/// Converges the stage group onto the beam at a given depth.
pub struct BeamLocator<'a> {
    group: &'a dyn MotionGroup,
    engine: ScanEngine<'a>,
    settings: &'a Settings,
    limits: LimitBox,
}

impl<'a> BeamLocator<'a> {
    /// Build a locator over the given hardware and validated settings.
    pub fn new(
        group: &'a dyn MotionGroup,
        sensor: &'a dyn BeamSensor,
        settings: &'a Settings,
    ) -> AlignResult<Self> {
        settings.validate()?;
        Ok(Self {
            group,
            engine: ScanEngine::new(group, sensor, settings)?,
            settings,
            limits: settings.limit_box()?,
        })
    }

    /// The travel rectangle this locator works inside.
    pub fn limits(&self) -> LimitBox {
        self.limits
    }

    /// Center the beam on the sensor at depth `depth` and return the
    /// group's final reported position.
    ///
    /// Drives to the lower horizontal limit at coarse velocity, then runs
    /// the refinement ladder at fine velocity. Any scan failure aborts the
    /// remaining passes and propagates.
    pub async fn locate_beam(&self, depth: f64) -> AlignResult<Position> {
        self.group.set_velocity(self.settings.coarse_velocity).await?;
        let start = self
            .limits
            .clamp(Position::new(self.limits.x_min(), depth));
        self.group.move_line(start).await?;
        wait_until_stopped(
            self.group,
            self.settings.poll_interval,
            self.settings.settle_timeout,
        )
        .await?;
        sleep(self.settings.settle_pause).await;
        self.group.set_velocity(self.settings.fine_velocity).await?;

        self.refine_from(start, Position::new(1.0, 0.0), self.limits.x_span())
            .await?;

        let found = self.group.position().await?;
        info!(x = found.x, z = found.z, depth, "beam located");
        Ok(found)
    }

    /// Run the refinement ladder from `start`, sweeping along the unit
    /// vector `direction` with a first-pass range of `initial_range`
    /// millimeters. Returns the last confirmed crossing position.
    ///
    /// Shared by the horizontal locate (direction `(1, 0)`) and the
    /// focal-point sweep (direction along the trajectory slope); step sizes
    /// and ranges are distances along `direction`.
    pub async fn refine_from(
        &self,
        start: Position,
        direction: Position,
        initial_range: f64,
    ) -> AlignResult<Position> {
        let mut cursor = start;
        for pass in RefinementLadder::new(&self.settings.scan_steps, initial_range) {
            let stop = cursor + direction * (pass.sign * pass.range);
            debug!(
                step = pass.step_size,
                range = pass.range,
                sign = pass.sign,
                "refinement pass"
            );
            match self.engine.scan(cursor, stop, pass.step_size).await? {
                ScanOutcome::Crossing(p) | ScanOutcome::Centered(p) => cursor = p,
                // Clamping ate the whole window; hold position and let the
                // next, tighter pass take over.
                ScanOutcome::NoMovement => {}
            }
        }
        Ok(cursor)
    }
}
