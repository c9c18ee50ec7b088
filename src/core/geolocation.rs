//! Geolocation solver: the iterative core converting between image
//! coordinates and geodetic ground coordinates by solving the coupled
//! range and zero-Doppler equations against the WGS84 ellipsoid.

use crate::core::ellipsoid::{ecef_to_geodetic, geodetic_to_ecef};
use crate::core::orbit::OrbitStore;
use crate::core::range::RangeModel;
use crate::core::timing::{seconds_between, shift_time, AzimuthTiming};
use crate::types::{
    Adjustment, GeoError, GeoResult, GeodeticPoint, ImagePoint, LookSide, SPEED_OF_LIGHT,
};
use chrono::{DateTime, Utc};
use nalgebra::{Matrix3, Vector3};

/// Newton iteration cap for the image-to-ground solver
const MAX_ITERATIONS: usize = 50;
/// Image residual tolerance (pixels, squared in the loop)
const IMAGE_TOLERANCE_PX: f64 = 0.01;
/// Height residual tolerance (meters)
const HEIGHT_TOLERANCE_M: f64 = 0.01;
/// ECEF perturbation for finite-difference partials (meters)
const PARTIAL_STEP_M: f64 = 10.0;

/// External elevation collaborator: terrain height above the ellipsoid,
/// `None` where the source has no data.
pub trait ElevationModel: Sync {
    fn height_at(&self, lat: f64, lon: f64) -> Option<f64>;
}

/// Constant-height elevation source (flat reference surface).
#[derive(Debug, Clone, Copy)]
pub struct ConstantElevation(pub f64);

impl ElevationModel for ConstantElevation {
    fn height_at(&self, _lat: f64, _lon: f64) -> Option<f64> {
        Some(self.0)
    }
}

/// Height reference for the ground solution: a fixed height above the
/// ellipsoid, or a terrain surface queried per iteration.
enum HeightRef<'a> {
    Fixed(f64),
    Terrain(&'a dyn ElevationModel),
}

impl HeightRef<'_> {
    fn height_at(&self, pt: &GeodeticPoint) -> f64 {
        match self {
            HeightRef::Fixed(h) => *h,
            // A no-data answer falls back to the ellipsoid surface
            HeightRef::Terrain(dem) => dem.height_at(pt.lat, pt.lon).unwrap_or(0.0),
        }
    }
}

/// The aggregate sensor geometric model: orbit, timing, range geometry
/// and the adjustable bias parameters.
///
/// Everything except [`Adjustment`] is immutable after construction, so a
/// shared `&SensorModel` is safe to query from many threads at once.
#[derive(Debug, Clone)]
pub struct SensorModel {
    orbit: OrbitStore,
    timing: AzimuthTiming,
    range: RangeModel,
    look_side: LookSide,
    /// Apply the one-way travel-time azimuth correction for bistatic
    /// processors that annotate transmit time rather than zero-Doppler time
    bistatic_correction: bool,
    adjustment: Adjustment,
}

impl SensorModel {
    pub fn new(
        orbit: OrbitStore,
        timing: AzimuthTiming,
        range: RangeModel,
        look_side: LookSide,
        bistatic_correction: bool,
    ) -> Self {
        log::info!(
            "sensor model: {} product, {} orbit records, {} burst(s), {:?}-looking",
            range.product(),
            orbit.records().len(),
            timing.bursts().len(),
            look_side
        );
        Self {
            orbit,
            timing,
            range,
            look_side,
            bistatic_correction,
            adjustment: Adjustment::default(),
        }
    }

    pub fn orbit(&self) -> &OrbitStore {
        &self.orbit
    }

    pub fn timing(&self) -> &AzimuthTiming {
        &self.timing
    }

    pub fn range(&self) -> &RangeModel {
        &self.range
    }

    pub fn look_side(&self) -> LookSide {
        self.look_side
    }

    pub fn bistatic_correction(&self) -> bool {
        self.bistatic_correction
    }

    pub fn adjustment(&self) -> Adjustment {
        self.adjustment
    }

    /// The one mutation path after construction; the model refiner is the
    /// intended caller.
    pub fn set_adjustment(&mut self, adjustment: Adjustment) {
        self.adjustment = adjustment;
    }

    /// Azimuth time of an image line, bias applied.
    pub fn azimuth_time_at_line(&self, line: f64) -> DateTime<Utc> {
        shift_time(
            self.timing.time_at_line(line),
            self.adjustment.azimuth_time_bias,
        )
    }

    /// Zero-Doppler azimuth time, two-way range time, and the platform
    /// state for a world point.
    ///
    /// The zero-Doppler instant is found by scanning the orbit records for
    /// the sign change of the Doppler dot product and interpolating
    /// between the two bracketing records on Doppler magnitude.
    pub fn world_to_azimuth_range_time(
        &self,
        world: &GeodeticPoint,
    ) -> GeoResult<(DateTime<Utc>, f64, Vector3<f64>, Vector3<f64>)> {
        let target = geodetic_to_ecef(world);
        let records = self.orbit.records();

        let doppler = |i: usize| -> f64 { (target - records[i].position).dot(&records[i].velocity) };

        let mut zero_doppler = None;
        let mut d_prev = doppler(0);
        for i in 1..records.len() {
            let d_cur = doppler(i);
            if (d_prev < 0.0) != (d_cur < 0.0) {
                let f = d_prev.abs() / (d_prev.abs() + d_cur.abs());
                let dt = seconds_between(records[i - 1].time, records[i].time);
                zero_doppler = Some(shift_time(records[i - 1].time, f * dt));
                break;
            }
            d_prev = d_cur;
        }

        // No sign change inside the record span: extrapolate linearly from
        // the endpoints, then let the coverage check reject far misses
        let mut time = match zero_doppler {
            Some(t) => t,
            None => {
                let d_first = doppler(0);
                let d_last = doppler(records.len() - 1);
                let span = seconds_between(records[0].time, records[records.len() - 1].time);
                let f = -d_first / (d_last - d_first);
                shift_time(records[0].time, f * span)
            }
        };

        if !self.orbit.covers(time) {
            return Err(GeoError::PointNotImaged {
                lat: world.lat,
                lon: world.lon,
            });
        }

        if self.bistatic_correction {
            let (pos, _) = self.orbit.state_at(time)?;
            let half_travel = (pos - target).norm() / SPEED_OF_LIGHT;
            time = shift_time(time, half_travel);
        }

        let azimuth_time = shift_time(time, self.adjustment.azimuth_time_bias);
        let (position, velocity) = self.orbit.state_at(azimuth_time)?;

        let range_time =
            self.adjustment.range_time_bias + 2.0 * (position - target).norm() / SPEED_OF_LIGHT;

        Ok((azimuth_time, range_time, position, velocity))
    }

    /// World -> Image: zero-Doppler time to line, range time to sample.
    pub fn world_to_line_sample(&self, world: &GeodeticPoint) -> GeoResult<ImagePoint> {
        let (azimuth_time, range_time, _, _) = self.world_to_azimuth_range_time(world)?;
        let line = self.timing.line_at_time(azimuth_time);
        let sample = self.range.pixel_at_range_time(range_time, azimuth_time)?;
        Ok(ImagePoint::new(line, sample))
    }

    /// Image -> World at a fixed height above the ellipsoid.
    pub fn line_sample_height_to_world(
        &self,
        line: f64,
        sample: f64,
        height: f64,
    ) -> GeoResult<GeodeticPoint> {
        self.solve_ground_point(line, sample, &HeightRef::Fixed(height))
    }

    /// Image -> World on a terrain surface supplied by the injected
    /// elevation collaborator.
    pub fn line_sample_to_world(
        &self,
        line: f64,
        sample: f64,
        elevation: &dyn ElevationModel,
    ) -> GeoResult<GeodeticPoint> {
        self.solve_ground_point(line, sample, &HeightRef::Terrain(elevation))
    }

    /// Initial ground estimate: the sub-satellite point displaced
    /// cross-track toward the look side by the triangulated ground range.
    fn initial_ground_estimate(
        &self,
        position: &Vector3<f64>,
        velocity: &Vector3<f64>,
        slant_range: f64,
        height: f64,
    ) -> Vector3<f64> {
        let sat_geo = ecef_to_geodetic(position);
        let nadir = geodetic_to_ecef(&GeodeticPoint::new(sat_geo.lat, sat_geo.lon, height));

        let altitude = (position - nadir).norm();
        let ground_range = (slant_range * slant_range - altitude * altitude)
            .max(0.0)
            .sqrt();

        let up = position.normalize();
        let forward = velocity.normalize();
        let right = forward.cross(&up);
        let look = match self.look_side {
            LookSide::Right => right,
            LookSide::Left => -right,
        };

        let guess = nadir + ground_range * look;
        // Re-project onto the reference height surface
        let mut geo = ecef_to_geodetic(&guess);
        geo.height = height;
        geodetic_to_ecef(&geo)
    }

    /// Newton-Raphson inversion of `world_to_line_sample` constrained to
    /// the height reference surface. Residuals are (sample, line, height);
    /// partials come from 10 m ECEF perturbations.
    fn solve_ground_point(
        &self,
        line: f64,
        sample: f64,
        height_ref: &HeightRef<'_>,
    ) -> GeoResult<GeodeticPoint> {
        let azimuth_time = self.azimuth_time_at_line(line);
        let (position, velocity) = self.orbit.state_at(azimuth_time)?;

        let range_time = self.range.range_time_at_pixel(sample, azimuth_time)?;
        let slant_range = range_time * SPEED_OF_LIGHT / 2.0;

        let seed_height = height_ref.height_at(&ecef_to_geodetic(&position));
        let mut estimate =
            self.initial_ground_estimate(&position, &velocity, slant_range, seed_height);

        let target = ImagePoint::new(line, sample);
        let mut current_world = ecef_to_geodetic(&estimate);
        let mut current_image = self.world_to_line_sample(&current_world)?;
        let mut image_residual2 = square_image_distance(&target, &current_image);
        let mut height_residual = height_ref.height_at(&current_world) - current_world.height;

        for iteration in 0..MAX_ITERATIONS {
            if image_residual2 <= IMAGE_TOLERANCE_PX * IMAGE_TOLERANCE_PX
                && height_residual.abs() <= HEIGHT_TOLERANCE_M
            {
                return Ok(current_world);
            }

            let residual = Vector3::new(
                target.sample - current_image.sample,
                target.line - current_image.line,
                height_residual,
            );

            // Finite-difference partials of (sample, line, height) with
            // respect to the ECEF coordinates
            let mut jacobian = Matrix3::zeros();
            for axis in 0..3 {
                let mut step = Vector3::zeros();
                step[axis] = PARTIAL_STEP_M;
                let perturbed_world = ecef_to_geodetic(&(estimate + step));
                let perturbed_image = self.world_to_line_sample(&perturbed_world)?;
                jacobian[(0, axis)] =
                    (current_image.sample - perturbed_image.sample) / PARTIAL_STEP_M;
                jacobian[(1, axis)] = (current_image.line - perturbed_image.line) / PARTIAL_STEP_M;
                jacobian[(2, axis)] =
                    (current_world.height - perturbed_world.height) / PARTIAL_STEP_M;
            }

            let update = match jacobian.try_inverse() {
                Some(inv) => inv * residual,
                None => {
                    return Err(GeoError::GeolocationDidNotConverge {
                        iterations: iteration,
                        residual: image_residual2.sqrt(),
                    })
                }
            };

            estimate -= update;

            current_world = ecef_to_geodetic(&estimate);
            current_image = self.world_to_line_sample(&current_world)?;
            image_residual2 = square_image_distance(&target, &current_image);
            height_residual = height_ref.height_at(&current_world) - current_world.height;
        }

        Err(GeoError::GeolocationDidNotConverge {
            iterations: MAX_ITERATIONS,
            residual: image_residual2.sqrt(),
        })
    }
}

fn square_image_distance(a: &ImagePoint, b: &ImagePoint) -> f64 {
    let dl = a.line - b.line;
    let ds = a.sample - b.sample;
    dl * dl + ds * ds
}
