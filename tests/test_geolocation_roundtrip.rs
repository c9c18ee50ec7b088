use chrono::{DateTime, TimeZone, Utc};
use nalgebra::Vector3;
use sargeo::core::{geolocation_grid, shift_time, AzimuthTiming, OrbitStore, RangeModel};
use sargeo::{
    BurstRecord, ConstantElevation, CoordinateConversionRecord, GeoError, GridRegion, LookSide,
    ProductType, SensorModel, StateVector,
};

/// Synthetic equatorial scene: straight-line orbit at 7000 km radius,
/// 2048-line constant-PRF SLC image, right-looking.
fn build_model() -> SensorModel {
    let tc = Utc.with_ymd_and_hms(2020, 1, 3, 17, 8, 40).unwrap();
    let orbit = straight_orbit(tc);

    let first_line_time = shift_time(tc, -2.048);
    let timing = AzimuthTiming::constant_prf(first_line_time, 2.0e-3, 2048).expect("timing");

    let range =
        RangeModel::new(ProductType::Slc, 0.005, 1.9e7, 0.0, vec![], vec![]).expect("range");

    SensorModel::new(orbit, timing, range, LookSide::Right, false)
}

#[test]
fn test_image_world_image_roundtrip() {
    let _ = env_logger::builder().is_test(true).try_init();
    let model = build_model();

    println!("=== Image -> World -> Image Roundtrip ===");
    let probes = [
        (0.0, 0.0, 0.0),
        (512.0, 256.0, 0.0),
        (1024.0, 1024.0, 150.0),
        (2047.0, 2047.0, 0.0),
        (1500.25, 777.5, 420.0),
    ];

    for &(line, sample, height) in &probes {
        let world = model
            .line_sample_height_to_world(line, sample, height)
            .expect("image to ground");
        let image = model.world_to_line_sample(&world).expect("ground to image");
        println!(
            "  ({:8.2}, {:8.2}) h={:6.1} m -> ({:10.6}, {:10.6}) -> ({:8.3}, {:8.3})",
            line, sample, height, world.lat, world.lon, image.line, image.sample
        );
        assert!(
            (image.line - line).abs() < 0.1,
            "line residual {:.4} px at ({}, {})",
            (image.line - line).abs(),
            line,
            sample
        );
        assert!(
            (image.sample - sample).abs() < 0.1,
            "sample residual {:.4} px at ({}, {})",
            (image.sample - sample).abs(),
            line,
            sample
        );
        assert!((world.height - height).abs() < 0.05);
    }
}

#[test]
fn test_roundtrip_with_bias_applied() {
    let mut model = build_model();
    model.set_adjustment(sargeo::Adjustment {
        azimuth_time_bias: 3.0e-4,
        range_time_bias: 1.0e-8,
    });

    // The two conversions share the bias, so the roundtrip must still close
    let world = model
        .line_sample_height_to_world(800.0, 600.0, 50.0)
        .expect("image to ground");
    let image = model.world_to_line_sample(&world).expect("ground to image");
    assert!((image.line - 800.0).abs() < 0.1);
    assert!((image.sample - 600.0).abs() < 0.1);
}

#[test]
fn test_point_outside_scene_rejected() {
    let model = build_model();
    // Ten degrees of longitude ahead of the track is far outside the
    // orbit coverage
    let far = sargeo::GeodeticPoint::new(-3.7, 10.0, 0.0);
    match model.world_to_line_sample(&far) {
        Err(GeoError::PointNotImaged { .. }) => {}
        other => panic!("expected PointNotImaged, got {:?}", other),
    }
}

fn straight_orbit(center: DateTime<Utc>) -> OrbitStore {
    let velocity = Vector3::new(0.0, 7_500.0, 0.0);
    let records: Vec<StateVector> = (0..9)
        .map(|i| {
            let dt = (i as f64 - 4.0) * 10.0;
            StateVector {
                time: shift_time(center, dt),
                position: Vector3::new(7_000_000.0, 7_500.0 * dt, 0.0),
                velocity,
            }
        })
        .collect();
    OrbitStore::new(records).expect("orbit store")
}

/// Ground-projected scene: pixels are 10 m of ground range, converted to
/// slant range through a gently nonlinear ground-to-slant polynomial.
fn build_grd_model() -> SensorModel {
    let tc = Utc.with_ymd_and_hms(2020, 1, 3, 17, 8, 40).unwrap();
    let orbit = straight_orbit(tc);

    let first_line_time = shift_time(tc, -2.048);
    let timing = AzimuthTiming::constant_prf(first_line_time, 2.0e-3, 2048).expect("timing");

    let gr_to_sr = |at: DateTime<Utc>, c1: f64| CoordinateConversionRecord {
        azimuth_time: at,
        reference_range: 0.0,
        coefficients: vec![740_000.0, c1, 5.0e-7],
    };
    let range = RangeModel::new(
        ProductType::Grd,
        0.005,
        1.9e7,
        10.0,
        vec![],
        vec![
            gr_to_sr(shift_time(tc, -2.0), 0.550),
            gr_to_sr(shift_time(tc, 2.0), 0.552),
        ],
    )
    .expect("range");

    SensorModel::new(orbit, timing, range, LookSide::Right, false)
}

#[test]
fn test_grd_image_world_roundtrip() {
    let model = build_grd_model();

    println!("=== Ground-Projected Roundtrip ===");
    for &(line, sample) in &[
        (0.0, 0.0),
        (512.0, 256.0),
        (1024.0, 1024.5),
        (1700.0, 2000.0),
    ] {
        let world = model
            .line_sample_height_to_world(line, sample, 0.0)
            .expect("image to ground");
        let image = model.world_to_line_sample(&world).expect("ground to image");
        println!(
            "  ({:8.2}, {:8.2}) -> ({:10.6}, {:10.6}) -> ({:8.3}, {:8.3})",
            line, sample, world.lat, world.lon, image.line, image.sample
        );
        assert!((image.line - line).abs() < 0.1);
        assert!((image.sample - sample).abs() < 0.1);
    }

    // Ground range zero maps to the polynomial's constant term
    let tc = Utc.with_ymd_and_hms(2020, 1, 3, 17, 8, 40).unwrap();
    let s0 = model
        .range()
        .ground_to_slant_range(0.0, tc)
        .expect("near slant");
    assert!((s0 - 740_000.0).abs() < 50.0);
}

/// Two 1000-line bursts separated by a 0.2 s azimuth gap, as scan-mode
/// products annotate them.
fn build_burst_model() -> SensorModel {
    let tc = Utc.with_ymd_and_hms(2020, 1, 3, 17, 8, 40).unwrap();
    let orbit = straight_orbit(tc);

    let bursts = vec![
        BurstRecord {
            start_line: 0,
            end_line: 999,
            azimuth_start_time: shift_time(tc, -2.1),
            azimuth_stop_time: shift_time(tc, -0.1),
        },
        BurstRecord {
            start_line: 1000,
            end_line: 1999,
            azimuth_start_time: shift_time(tc, 0.1),
            azimuth_stop_time: shift_time(tc, 2.1),
        },
    ];
    let timing = AzimuthTiming::new(bursts, 2.0e-3).expect("timing");

    let range =
        RangeModel::new(ProductType::Slc, 0.005, 1.9e7, 0.0, vec![], vec![]).expect("range");

    SensorModel::new(orbit, timing, range, LookSide::Right, false)
}

#[test]
fn test_burst_scene_roundtrip() {
    let model = build_burst_model();

    println!("=== Burst Scene Roundtrip ===");
    // Both sides of the burst boundary at lines 999/1000, plus interior
    // lines of each burst
    for &(line, sample) in &[
        (0.0, 100.0),
        (500.5, 700.0),
        (999.0, 256.0),
        (1000.0, 256.0),
        (1500.0, 1800.0),
        (1999.0, 40.0),
    ] {
        let world = model
            .line_sample_height_to_world(line, sample, 0.0)
            .expect("image to ground");
        let image = model.world_to_line_sample(&world).expect("ground to image");
        println!(
            "  ({:8.2}, {:8.2}) -> ({:10.6}, {:10.6}) -> ({:8.3}, {:8.3})",
            line, sample, world.lat, world.lon, image.line, image.sample
        );
        assert!((image.line - line).abs() < 0.1);
        assert!((image.sample - sample).abs() < 0.1);
    }

    // The 0.2 s azimuth gap shows up as an along-track jump between the
    // last line of burst 0 and the first line of burst 1
    let before_gap = model
        .line_sample_height_to_world(999.0, 256.0, 0.0)
        .expect("before gap");
    let after_gap = model
        .line_sample_height_to_world(1000.0, 256.0, 0.0)
        .expect("after gap");
    let along_track_m = (after_gap.lon - before_gap.lon).to_radians()
        * 6_378_137.0
        * before_gap.lat.to_radians().cos();
    println!("  along-track jump across the gap: {:.1} m", along_track_m);
    // 0.202 s of azimuth at ~7.5 km/s ground speed
    assert!((1_400.0..1_650.0).contains(&along_track_m));
}

#[test]
fn test_geolocation_grid_parallel_consistency() {
    let model = build_model();
    let region = GridRegion {
        first_line: 0.0,
        first_sample: 0.0,
        line_step: 255.875, // 9 rows covering lines 0..=2047
        sample_step: 255.875,
        rows: 9,
        cols: 9,
    };
    let grid = geolocation_grid(&model, &ConstantElevation(0.0), &region).expect("grid");

    println!("=== Geolocation Grid ===");
    println!(
        "  {} x {} nodes, {:.1}% valid",
        region.rows,
        region.cols,
        100.0 * grid.valid_fraction()
    );
    assert_eq!(grid.lat.dim(), (9, 9));
    assert!((grid.valid_fraction() - 1.0).abs() < 1e-12);

    // Every grid node must agree with the single-point solver
    for (i, j) in [(0, 0), (4, 4), (8, 8), (2, 7)] {
        let line = region.first_line + i as f64 * region.line_step;
        let sample = region.first_sample + j as f64 * region.sample_step;
        let single = model
            .line_sample_height_to_world(line, sample, 0.0)
            .expect("single point");
        assert!((grid.lat[[i, j]] - single.lat).abs() < 1e-10);
        assert!((grid.lon[[i, j]] - single.lon).abs() < 1e-10);
    }

    // Latitude decreases monotonically away from the near edge for a
    // right-looking equatorial pass
    for i in 0..9 {
        for j in 1..9 {
            assert!(grid.lat[[i, j]] < grid.lat[[i, j - 1]]);
        }
    }
}
