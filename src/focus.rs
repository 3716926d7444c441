//! Focal-point location along the measured trajectory.
//!
//! The free beam is mechanically blocked while the trajectory of the
//! constrained path is measured, then released again; the focal crossing is
//! found by running the same multi-resolution refinement as the horizontal
//! locate, but starting from wherever the group already is and sweeping
//! along the trajectory's slope direction so both axes vary per step.

use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{AlignError, AlignResult};
use crate::geometry::Position;
use crate::hardware::{BeamSensor, BlockingStage, MotionGroup};
use crate::scan::wait_until_stopped;
use crate::trajectory::{Trajectory, TrajectoryModel};

/// Finds the beam's focal crossing, coordinating the beam-blocking stage
/// around a trajectory measurement.
pub struct FocalPointLocator<'a> {
    group: &'a dyn MotionGroup,
    stage: &'a dyn BlockingStage,
    settings: &'a Settings,
    model: TrajectoryModel<'a>,
}

impl<'a> FocalPointLocator<'a> {
    /// Build a locator over the given hardware and validated settings.
    pub fn new(
        group: &'a dyn MotionGroup,
        sensor: &'a dyn BeamSensor,
        stage: &'a dyn BlockingStage,
        settings: &'a Settings,
    ) -> AlignResult<Self> {
        Ok(Self {
            group,
            stage,
            settings,
            model: TrajectoryModel::new(group, sensor, settings)?,
        })
    }

    /// Locate the focal point and return the group's reported position.
    ///
    /// Sequence: block the free beam, measure the constrained trajectory,
    /// unblock, then refine along the slope direction from the group's
    /// current position. Any failure aborts the remaining steps.
    pub async fn find_focal_point(&mut self) -> AlignResult<Position> {
        let blocking = &self.settings.blocking;
        self.stage.power_on().await?;
        self.stage.set_acceleration(blocking.acceleration).await?;
        self.stage.set_velocity(blocking.velocity).await?;

        debug!(position = blocking.blocked_position, "blocking free beam");
        self.stage.move_to(blocking.blocked_position).await?;
        self.wait_for_stage().await?;

        let trajectory = self.model.derive().await?;

        debug!(position = blocking.unblocked_position, "unblocking free beam");
        self.stage.move_to(blocking.unblocked_position).await?;
        self.wait_for_stage().await?;

        self.group.set_velocity(self.settings.fine_velocity).await?;
        wait_until_stopped(
            self.group,
            self.settings.poll_interval,
            self.settings.settle_timeout,
        )
        .await?;
        sleep(self.settings.settle_pause).await;

        let slope = trajectory.slope();
        let direction = slope
            .normalized()
            .ok_or(AlignError::DegenerateTrajectory)?;
        let start = self.group.position().await?;
        self.model
            .locator()
            .refine_from(start, direction, slope.norm())
            .await?;

        let focal = self.group.position().await?;
        info!(x = focal.x, z = focal.z, "focal point located");
        Ok(focal)
    }

    /// The trajectory measured by the last [`find_focal_point`] run, if any.
    ///
    /// [`find_focal_point`]: Self::find_focal_point
    pub fn trajectory(&self) -> Option<Trajectory> {
        self.model.trajectory()
    }

    /// Command the group to a fraction along the measured trajectory.
    pub async fn move_on_beam(&self, fraction: f64) -> AlignResult<Position> {
        self.model.move_to_fraction(fraction).await
    }

    /// Poll the blocking stage until it reports stopped, bounded by the
    /// configured settle deadline.
    async fn wait_for_stage(&self) -> AlignResult<()> {
        let started = Instant::now();
        while self.stage.is_moving().await? {
            if started.elapsed() >= self.settings.settle_timeout {
                return Err(AlignError::SettleTimeout {
                    waited: self.settings.settle_timeout,
                });
            }
            sleep(self.settings.poll_interval).await;
        }
        Ok(())
    }
}
