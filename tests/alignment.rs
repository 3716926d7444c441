//! End-to-end locate, trajectory, and focal-point scenarios against the
//! simulated bench.

use std::time::Duration;

use beam_align::hardware::mock::{window_profile, MockBench, CENTROID_GAIN};
use beam_align::hardware::SensorSample;
use beam_align::{
    AlignError, BeamLocator, FocalPointLocator, Position, Settings, TrajectoryModel,
};

fn fast_settings() -> Settings {
    Settings {
        poll_interval: Duration::ZERO,
        settle_pause: Duration::ZERO,
        ..Settings::default()
    }
}

#[tokio::test]
async fn locate_beam_converges_to_window_midpoint() {
    // Beam occupies x in [10, 15] at every depth; the ladder should settle
    // within the finest step (0.01 mm) of the 12.5 mm midpoint.
    let bench = MockBench::new(window_profile(12.5, 2.5));
    let group = bench.group();
    let sensor = bench.sensor();
    let settings = fast_settings();
    let locator = BeamLocator::new(&group, &sensor, &settings).unwrap();

    let found = locator.locate_beam(0.0).await.unwrap();
    assert!(
        (found.x - 12.5).abs() <= 0.01,
        "converged to {} instead of 12.5",
        found.x
    );
    assert_eq!(found.z, 0.0);

    // Coarse approach, then fine sweeps.
    assert_eq!(bench.velocities()[..2], [30.0, 5.0]);
    assert_eq!(bench.power_off_count(), 0);
}

#[tokio::test]
async fn locate_beam_without_beam_is_hard_failure() {
    let bench = MockBench::new(|_, _| SensorSample::default());
    let group = bench.group();
    let sensor = bench.sensor();
    let settings = fast_settings();
    let locator = BeamLocator::new(&group, &sensor, &settings).unwrap();

    let err = locator.locate_beam(0.0).await.unwrap_err();
    assert!(matches!(err, AlignError::BeamNotDetected));
    assert_eq!(bench.power_off_count(), 1);

    // The first full-travel pass fails and aborts the ladder: one approach
    // move plus the six positions of the 50 mm sweep.
    assert_eq!(bench.moves().len(), 7);
}

#[tokio::test]
async fn trajectory_follows_tilted_beam() {
    // Beam center drifts with depth: x = 10 + 0.02 z.
    let bench = MockBench::new(|at: Position, _| {
        let offset = at.x - (10.0 + 0.02 * at.z);
        SensorSample {
            power: if offset.abs() <= 2.5 { 0.01 } else { 0.0 },
            centroid_x: offset * CENTROID_GAIN,
            ..SensorSample::default()
        }
    });
    let group = bench.group();
    let sensor = bench.sensor();
    let settings = fast_settings();
    let mut model = TrajectoryModel::new(&group, &sensor, &settings).unwrap();

    // Querying before deriving is a distinct usage error.
    assert!(matches!(
        model.position(0.5),
        Err(AlignError::TrajectoryNotDerived)
    ));

    let trajectory = model.derive().await.unwrap();
    let r_initial = trajectory.r_initial();
    let r_final = trajectory.r_final();
    assert_eq!(r_initial.z, -125.0);
    assert_eq!(r_final.z, 125.0);
    assert!((r_initial.x - 7.5).abs() <= 0.01);
    assert!((r_final.x - 12.5).abs() <= 0.01);

    let slope = trajectory.slope();
    assert_eq!(slope, r_final - r_initial);
    assert!((slope.x - 5.0).abs() <= 0.02);
    assert_eq!(slope.z, 250.0);

    assert_eq!(model.position(0.0).unwrap(), r_initial);
    assert_eq!(model.position(1.0).unwrap(), r_final);

    // Out-of-range fractions are refused without commanding motion.
    let moves_before = bench.moves().len();
    for bad in [-0.1, 1.1] {
        assert!(matches!(
            model.position(bad),
            Err(AlignError::FractionOutOfRange(_))
        ));
        assert!(matches!(
            model.move_to_fraction(bad).await,
            Err(AlignError::FractionOutOfRange(_))
        ));
    }
    assert_eq!(bench.moves().len(), moves_before);

    // In-range fractions do move the group, to the interpolated point.
    let target = model.move_to_fraction(0.5).await.unwrap();
    assert_eq!(bench.moves().last().copied(), Some(target));
}

#[tokio::test]
async fn rederiving_replaces_the_stored_trajectory() {
    let bench = MockBench::new(window_profile(12.5, 2.5));
    let group = bench.group();
    let sensor = bench.sensor();
    let settings = fast_settings();
    let mut model = TrajectoryModel::new(&group, &sensor, &settings).unwrap();

    let first = model.derive().await.unwrap();
    let second = model.derive().await.unwrap();
    assert_eq!(model.trajectory(), Some(second));
    // A vertical beam: both derivations land on the same line.
    assert!((first.slope().x - second.slope().x).abs() <= 0.02);
}

#[tokio::test]
async fn focal_point_found_along_constrained_trajectory() {
    // With the block in (stage at 0), the sensor sees the constrained path
    // x = 10 + 0.02 z; once cleared (stage at 50) it sees the free beam
    // x = 85 - 0.98 z. The two lines intersect at (11.5, 75).
    let bench = MockBench::new(|at: Position, stage: f64| {
        let center = if stage == 0.0 {
            10.0 + 0.02 * at.z
        } else {
            85.0 - 0.98 * at.z
        };
        let offset = at.x - center;
        SensorSample {
            power: if offset.abs() <= 2.5 { 0.01 } else { 0.0 },
            centroid_x: offset * CENTROID_GAIN,
            ..SensorSample::default()
        }
    });
    let group = bench.group();
    let sensor = bench.sensor();
    let stage = bench.blocking_stage();
    let settings = fast_settings();
    let mut locator = FocalPointLocator::new(&group, &sensor, &stage, &settings).unwrap();

    let focal = locator.find_focal_point().await.unwrap();
    assert!(
        (focal.x - 11.5).abs() <= 0.1 && (focal.z - 75.0).abs() <= 0.1,
        "focal point {:?} not near (11.5, 75)",
        focal
    );

    // Block in for the measurement, out afterwards.
    assert!(bench.stage_powered());
    assert_eq!(bench.stage_setpoints(), vec![0.0, 50.0]);

    // The constrained trajectory is retained for follow-up moves.
    let slope = locator.trajectory().unwrap().slope();
    assert!((slope.x - 5.0).abs() <= 0.02);
    assert_eq!(slope.z, 250.0);
}

#[tokio::test]
async fn focal_failure_aborts_before_unblocking() {
    // No beam at all: the first locate pass raises the hard failure and the
    // blocking stage never gets its unblock command.
    let bench = MockBench::new(|_, _| SensorSample::default());
    let group = bench.group();
    let sensor = bench.sensor();
    let stage = bench.blocking_stage();
    let settings = fast_settings();
    let mut locator = FocalPointLocator::new(&group, &sensor, &stage, &settings).unwrap();

    let err = locator.find_focal_point().await.unwrap_err();
    assert!(matches!(err, AlignError::BeamNotDetected));
    assert_eq!(bench.power_off_count(), 1);
    assert_eq!(bench.stage_setpoints(), vec![0.0]);
    assert!(locator.trajectory().is_none());
}
