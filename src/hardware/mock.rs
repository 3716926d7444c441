//! Mock hardware implementations.
//!
//! Provides a simulated optical bench for testing without physical hardware:
//! one motion group, one beam sensor, and one blocking stage, all views onto
//! a shared bench state so the sensor reads whatever the simulated group
//! position puts under it.
//!
//! Motion is interpolated: a commanded move reports "moving" for a
//! configurable number of status polls and advances the group position a
//! fraction of the way on each poll, so code that samples the sensor while
//! motion is in progress sweeps through every intermediate position the way
//! a real stage group would carry the sensor through the beam.
//!
//! # Example
//!
//! ```rust,ignore
//! let bench = MockBench::new(window_profile(12.5, 2.5));
//! let group = bench.group();
//! let sensor = bench.sensor();
//! // drive the engine against `&group` / `&sensor`, then inspect:
//! assert_eq!(bench.power_off_count(), 0);
//! ```

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::geometry::Position;
use crate::hardware::{BeamSensor, BlockingStage, MotionGroup, SensorSample};

/// Centroid reading produced per millimeter of stage offset from the beam
/// center by [`window_profile`] (µm/mm).
pub const CENTROID_GAIN: f64 = 2000.0;

/// Beam profile for the canned fixtures: power `0.01` while the sensor is
/// within `half_width` of `center_x`, zero elsewhere, with the centroid
/// tracking the stage's offset from the beam center.
pub fn window_profile(
    center_x: f64,
    half_width: f64,
) -> impl Fn(Position, f64) -> SensorSample + Send + Sync + 'static {
    move |at, _stage| {
        let offset = at.x - center_x;
        SensorSample {
            power: if offset.abs() <= half_width { 0.01 } else { 0.0 },
            centroid_x: offset * CENTROID_GAIN,
            ..SensorSample::default()
        }
    }
}

struct BenchState {
    group_position: Position,
    move_origin: Position,
    move_target: Position,
    polls_remaining: u32,
    moves: Vec<Position>,
    velocities: Vec<f64>,
    power_off_count: u32,
    samples_taken: u64,
    stage_position: f64,
    stage_polls_remaining: u32,
    stage_setpoints: Vec<f64>,
    stage_powered: bool,
}

struct BenchInner {
    state: Mutex<BenchState>,
    profile: Box<dyn Fn(Position, f64) -> SensorSample + Send + Sync>,
    polls_per_move: u32,
}

/// A simulated bench shared by one group, one sensor, and one blocking
/// stage. Clone handles out with [`group`](MockBench::group) /
/// [`sensor`](MockBench::sensor) / [`blocking_stage`](MockBench::blocking_stage)
/// and inspect the recorded traffic afterwards.
#[derive(Clone)]
pub struct MockBench {
    inner: Arc<BenchInner>,
}

impl MockBench {
    /// Build a bench whose sensor reads `profile(group_position,
    /// blocking_stage_position)`.
    pub fn new(
        profile: impl Fn(Position, f64) -> SensorSample + Send + Sync + 'static,
    ) -> Self {
        Self::with_polls_per_move(profile, 16)
    }

    /// As [`new`](MockBench::new), with a custom number of in-flight status
    /// polls per move (granularity of the simulated sweep).
    pub fn with_polls_per_move(
        profile: impl Fn(Position, f64) -> SensorSample + Send + Sync + 'static,
        polls_per_move: u32,
    ) -> Self {
        Self {
            inner: Arc::new(BenchInner {
                state: Mutex::new(BenchState {
                    group_position: Position::ZERO,
                    move_origin: Position::ZERO,
                    move_target: Position::ZERO,
                    polls_remaining: 0,
                    moves: Vec::new(),
                    velocities: Vec::new(),
                    power_off_count: 0,
                    samples_taken: 0,
                    stage_position: 0.0,
                    stage_polls_remaining: 0,
                    stage_setpoints: Vec::new(),
                    stage_powered: false,
                }),
                profile: Box::new(profile),
                polls_per_move,
            }),
        }
    }

    /// Handle implementing [`MotionGroup`].
    pub fn group(&self) -> MockGroup {
        MockGroup {
            inner: self.inner.clone(),
        }
    }

    /// Handle implementing [`BeamSensor`].
    pub fn sensor(&self) -> MockSensor {
        MockSensor {
            inner: self.inner.clone(),
        }
    }

    /// Handle implementing [`BlockingStage`].
    pub fn blocking_stage(&self) -> MockBlockingStage {
        MockBlockingStage {
            inner: self.inner.clone(),
        }
    }

    /// Every `move_line` target recorded, in order.
    pub fn moves(&self) -> Vec<Position> {
        self.inner.state.lock().moves.clone()
    }

    /// Every group velocity setting recorded, in order.
    pub fn velocities(&self) -> Vec<f64> {
        self.inner.state.lock().velocities.clone()
    }

    /// How many times the group was powered off.
    pub fn power_off_count(&self) -> u32 {
        self.inner.state.lock().power_off_count
    }

    /// Every blocking-stage setpoint recorded, in order.
    pub fn stage_setpoints(&self) -> Vec<f64> {
        self.inner.state.lock().stage_setpoints.clone()
    }

    /// Whether the blocking stage was powered on.
    pub fn stage_powered(&self) -> bool {
        self.inner.state.lock().stage_powered
    }

    /// The group's current simulated position.
    pub fn group_position(&self) -> Position {
        self.inner.state.lock().group_position
    }

    /// Teleport the group (fixture setup only; records nothing).
    pub fn set_group_position(&self, p: Position) {
        let mut state = self.inner.state.lock();
        state.group_position = p;
        state.move_origin = p;
        state.move_target = p;
        state.polls_remaining = 0;
    }
}

/// [`MotionGroup`] view of a [`MockBench`].
pub struct MockGroup {
    inner: Arc<BenchInner>,
}

#[async_trait]
impl MotionGroup for MockGroup {
    async fn move_line(&self, target: Position) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.moves.push(target);
        state.move_origin = state.group_position;
        state.move_target = target;
        state.polls_remaining = self.inner.polls_per_move;
        if self.inner.polls_per_move == 0 {
            state.group_position = target;
        }
        Ok(())
    }

    async fn is_moving(&self) -> Result<bool> {
        let mut state = self.inner.state.lock();
        if state.polls_remaining == 0 {
            state.group_position = state.move_target;
            return Ok(false);
        }
        state.polls_remaining -= 1;
        let done = self.inner.polls_per_move - state.polls_remaining;
        let fraction = f64::from(done) / f64::from(self.inner.polls_per_move);
        let span = state.move_target - state.move_origin;
        state.group_position = state.move_origin + span * fraction;
        Ok(true)
    }

    async fn position(&self) -> Result<Position> {
        Ok(self.inner.state.lock().group_position)
    }

    async fn set_velocity(&self, velocity: f64) -> Result<()> {
        self.inner.state.lock().velocities.push(velocity);
        Ok(())
    }

    async fn power_off(&self) -> Result<()> {
        self.inner.state.lock().power_off_count += 1;
        Ok(())
    }
}

/// [`BeamSensor`] view of a [`MockBench`].
pub struct MockSensor {
    inner: Arc<BenchInner>,
}

#[async_trait]
impl BeamSensor for MockSensor {
    async fn sample(&self) -> Result<SensorSample> {
        let (at, stage, count) = {
            let mut state = self.inner.state.lock();
            state.samples_taken += 1;
            (
                state.group_position,
                state.stage_position,
                state.samples_taken,
            )
        };
        let mut sample = (self.inner.profile)(at, stage);
        sample.time = count as f64 * 1e-2;
        Ok(sample)
    }
}

/// [`BlockingStage`] view of a [`MockBench`].
pub struct MockBlockingStage {
    inner: Arc<BenchInner>,
}

#[async_trait]
impl BlockingStage for MockBlockingStage {
    async fn power_on(&self) -> Result<()> {
        self.inner.state.lock().stage_powered = true;
        Ok(())
    }

    async fn move_to(&self, position: f64) -> Result<()> {
        let mut state = self.inner.state.lock();
        state.stage_setpoints.push(position);
        state.stage_position = position;
        state.stage_polls_remaining = 4;
        Ok(())
    }

    async fn is_moving(&self) -> Result<bool> {
        let mut state = self.inner.state.lock();
        if state.stage_polls_remaining == 0 {
            return Ok(false);
        }
        state.stage_polls_remaining -= 1;
        Ok(true)
    }

    async fn set_velocity(&self, _velocity: f64) -> Result<()> {
        Ok(())
    }

    async fn set_acceleration(&self, _acceleration: f64) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_move_interpolates_across_polls() {
        let bench = MockBench::with_polls_per_move(window_profile(0.0, 1.0), 4);
        let group = bench.group();

        group.move_line(Position::new(8.0, 0.0)).await.unwrap();
        let mut seen = Vec::new();
        while group.is_moving().await.unwrap() {
            seen.push(bench.group_position().x);
        }
        assert_eq!(seen, vec![2.0, 4.0, 6.0, 8.0]);
        assert_eq!(bench.group_position(), Position::new(8.0, 0.0));
        assert_eq!(bench.moves().len(), 1);
    }

    #[tokio::test]
    async fn test_sensor_tracks_group_position() {
        let bench = MockBench::new(window_profile(5.0, 1.0));
        let group = bench.group();
        let sensor = bench.sensor();

        bench.set_group_position(Position::new(5.0, 0.0));
        let on_beam = sensor.sample().await.unwrap();
        assert!(on_beam.power > 0.0);
        assert_eq!(on_beam.centroid_x, 0.0);

        bench.set_group_position(Position::new(7.0, 0.0));
        let off_beam = sensor.sample().await.unwrap();
        assert_eq!(off_beam.power, 0.0);
        assert_eq!(off_beam.centroid_x, 2.0 * CENTROID_GAIN);

        let _ = group; // handles share one bench
    }

    #[tokio::test]
    async fn test_stage_settles_after_polls() {
        let bench = MockBench::new(window_profile(0.0, 1.0));
        let stage = bench.blocking_stage();

        stage.power_on().await.unwrap();
        stage.move_to(50.0).await.unwrap();
        let mut polls = 0;
        while stage.is_moving().await.unwrap() {
            polls += 1;
        }
        assert_eq!(polls, 4);
        assert!(bench.stage_powered());
        assert_eq!(bench.stage_setpoints(), vec![50.0]);
    }
}
