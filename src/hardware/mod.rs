//! Hardware contracts consumed by the alignment engine.
//!
//! The engine borrows these trait objects and never owns a transport;
//! implementations wrap the motion-controller and profiler serial links and
//! carry their own I/O timeouts. Everything here is hardware-agnostic: a
//! grouped pair of stages that can trace straight lines, a single-axis stage
//! that can block the free beam, and a sensor that reports the latest power
//! and centroid reading on demand.

pub mod mock;

use anyhow::Result;
use async_trait::async_trait;

use crate::geometry::Position;

/// One immutable sensor snapshot.
///
/// Quantities follow the beam-profiler conventions: `power` is the deposited
/// power on the detector (requires calibration for absolute accuracy),
/// centroid coordinates are offsets from the detector center in micrometers,
/// and `centroid_r` is the image radius. Only arrival order relates
/// consecutive samples; the engine never retains more than the latest one.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SensorSample {
    /// Seconds since sensor reset at the time of measurement.
    pub time: f64,
    /// Power deposited on the detector.
    pub power: f64,
    /// Horizontal centroid offset from detector center (µm).
    pub centroid_x: f64,
    /// Vertical centroid offset from detector center (µm).
    pub centroid_y: f64,
    /// Image radius (µm).
    pub centroid_r: f64,
}

/// A named group of stages moved as one kinematic unit.
///
/// Commands act on the whole group; the controller interpolates the axes so
/// the carried sensor traces a straight line between positions.
#[async_trait]
pub trait MotionGroup: Send + Sync {
    /// Command a straight-line move to `target`. Returns once the command is
    /// accepted; motion continues asynchronously.
    async fn move_line(&self, target: Position) -> Result<()>;

    /// Whether any axis in the group is still moving.
    async fn is_moving(&self) -> Result<bool>;

    /// The group's current reported position.
    async fn position(&self) -> Result<Position>;

    /// Set the vectorial velocity limit for subsequent moves.
    async fn set_velocity(&self, velocity: f64) -> Result<()>;

    /// Cut power to every axis in the group. Used defensively after a sweep
    /// that never observed the beam; the caller must re-enable power before
    /// another attempt.
    async fn power_off(&self) -> Result<()>;
}

/// The single-axis stage that carries the beam block.
#[async_trait]
pub trait BlockingStage: Send + Sync {
    /// Turn the axis motor on.
    async fn power_on(&self) -> Result<()>;

    /// Command a move to an absolute position (mm).
    async fn move_to(&self, position: f64) -> Result<()>;

    /// Whether the stage is still moving.
    async fn is_moving(&self) -> Result<bool>;

    /// Set the stage velocity (mm/s).
    async fn set_velocity(&self, velocity: f64) -> Result<()>;

    /// Set the stage acceleration (mm/s²).
    async fn set_acceleration(&self, acceleration: f64) -> Result<()>;
}

/// The optical sensor riding on the motion group.
#[async_trait]
pub trait BeamSensor: Send + Sync {
    /// The most recently available reading. Non-blocking in spirit: returns
    /// whatever the sensor last produced rather than waiting for a fresh
    /// exposure.
    async fn sample(&self) -> Result<SensorSample>;
}
