//! Model refinement: least-squares estimation of the timing bias
//! parameters from ground control points, plus accuracy reporting.

use crate::core::ellipsoid::{enu_rotation, geodetic_to_ecef};
use crate::core::geolocation::SensorModel;
use crate::types::{Adjustment, GcpRecord, GeoError, GeoResult, GeodeticPoint, ImagePoint};
use nalgebra::{Matrix2, Vector2, Vector3};
use serde::Serialize;

/// Gauss-Newton iteration cap; the mapping is close to linear in the two
/// bias parameters so convergence takes a few steps
const MAX_ITERATIONS: usize = 20;
/// Convergence thresholds on the parameter update (seconds)
const AZIMUTH_TOLERANCE_S: f64 = 1e-9;
const RANGE_TOLERANCE_S: f64 = 1e-12;
/// Finite-difference perturbations for the Jacobian (seconds). Large
/// enough that the residual change dominates the geolocation solver's
/// own convergence tolerance.
const AZIMUTH_STEP_S: f64 = 1e-4;
const RANGE_STEP_S: f64 = 1e-8;

/// Ground control points accepted for refinement.
#[derive(Debug, Clone, Default)]
pub struct GroundControlSet {
    gcps: Vec<GcpRecord>,
}

impl GroundControlSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gcps(&self) -> &[GcpRecord] {
        &self.gcps
    }

    pub fn len(&self) -> usize {
        self.gcps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gcps.is_empty()
    }

    /// Ingest annotated ground control records, validating that each
    /// record's azimuth time and line number agree through the timing
    /// model to within one line interval.
    pub fn from_records(model: &SensorModel, records: Vec<GcpRecord>) -> GeoResult<Self> {
        for (i, gcp) in records.iter().enumerate() {
            let line = model.timing().line_at_time(gcp.azimuth_time);
            if (line - gcp.image.line).abs() > 1.0 {
                return Err(GeoError::MalformedMetadata(format!(
                    "ground control point {}: azimuth time maps to line {:.2}, record says {:.2}",
                    i, line, gcp.image.line
                )));
            }
        }
        log::debug!("accepted {} ground control records", records.len());
        Ok(Self { gcps: records })
    }

    /// Add a tie point given only image and world coordinates; the
    /// reference times are derived from the unadjusted annotation model.
    pub fn add_tie_point(
        &mut self,
        model: &SensorModel,
        image: ImagePoint,
        world: GeodeticPoint,
    ) -> GeoResult<()> {
        let azimuth_time = model.timing().time_at_line(image.line);
        let slant_range_time = model.range().range_time_at_pixel(image.sample, azimuth_time)?;
        self.gcps.push(GcpRecord {
            image,
            world,
            azimuth_time,
            slant_range_time,
        });
        Ok(())
    }
}

/// Ground error of the model at one control point, in the local
/// east/north/up frame of the reference coordinates (meters).
pub fn residual(model: &SensorModel, gcp: &GcpRecord) -> GeoResult<Vector3<f64>> {
    let predicted =
        model.line_sample_height_to_world(gcp.image.line, gcp.image.sample, gcp.world.height)?;
    let delta = geodetic_to_ecef(&predicted) - geodetic_to_ecef(&gcp.world);
    Ok(enu_rotation(&gcp.world) * delta)
}

/// Per-axis error statistics over a control set (meters).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AxisStats {
    pub rmse: f64,
    pub mean: f64,
    pub stddev: f64,
}

impl AxisStats {
    fn from_values(values: &[f64]) -> Self {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let rmse = (values.iter().map(|v| v * v).sum::<f64>() / n).sqrt();
        let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
        Self {
            rmse,
            mean,
            stddev: var.sqrt(),
        }
    }
}

/// Assessment of a single control point.
#[derive(Debug, Clone, Serialize)]
pub struct TiePointAssessment {
    pub image: ImagePoint,
    pub reference: GeodeticPoint,
    pub predicted: GeodeticPoint,
    /// Error in the local frame of the reference point (meters)
    pub error_east: f64,
    pub error_north: f64,
    pub error_up: f64,
    pub radial: f64,
}

/// Model accuracy against a control set.
#[derive(Debug, Clone, Serialize)]
pub struct AccuracyReport {
    pub entries: Vec<TiePointAssessment>,
    pub east: AxisStats,
    pub north: AxisStats,
    pub up: AxisStats,
    pub radial_rmse: f64,
}

/// Evaluate model accuracy against every point in the set.
///
/// Points whose geolocation fails recoverably are skipped with a warning;
/// an empty result is an error.
pub fn accuracy_report(model: &SensorModel, set: &GroundControlSet) -> GeoResult<AccuracyReport> {
    let mut entries = Vec::with_capacity(set.len());
    for gcp in set.gcps() {
        let predicted = match model.line_sample_height_to_world(
            gcp.image.line,
            gcp.image.sample,
            gcp.world.height,
        ) {
            Ok(p) => p,
            Err(err) => {
                log::warn!(
                    "skipping control point at ({:.1}, {:.1}): {}",
                    gcp.image.line,
                    gcp.image.sample,
                    err
                );
                continue;
            }
        };
        let delta = geodetic_to_ecef(&predicted) - geodetic_to_ecef(&gcp.world);
        let enu = enu_rotation(&gcp.world) * delta;
        entries.push(TiePointAssessment {
            image: gcp.image,
            reference: gcp.world,
            predicted,
            error_east: enu.x,
            error_north: enu.y,
            error_up: enu.z,
            radial: enu.norm(),
        });
    }

    if entries.is_empty() {
        return Err(GeoError::MalformedMetadata(
            "no usable ground control points".to_string(),
        ));
    }

    let east: Vec<f64> = entries.iter().map(|e| e.error_east).collect();
    let north: Vec<f64> = entries.iter().map(|e| e.error_north).collect();
    let up: Vec<f64> = entries.iter().map(|e| e.error_up).collect();
    let radial_rmse = (entries.iter().map(|e| e.radial * e.radial).sum::<f64>()
        / entries.len() as f64)
        .sqrt();

    Ok(AccuracyReport {
        east: AxisStats::from_values(&east),
        north: AxisStats::from_values(&north),
        up: AxisStats::from_values(&up),
        radial_rmse,
        entries,
    })
}

/// Outcome of a refinement run.
#[derive(Debug, Clone, Serialize)]
pub struct RefinementReport {
    pub before: AccuracyReport,
    pub after: AccuracyReport,
    pub adjustment: Adjustment,
    pub iterations: usize,
    pub converged: bool,
}

fn residuals_at(
    model: &mut SensorModel,
    adjustment: Adjustment,
    gcps: &[GcpRecord],
) -> Vec<GeoResult<Vector3<f64>>> {
    model.set_adjustment(adjustment);
    gcps.iter().map(|gcp| residual(model, gcp)).collect()
}

/// Estimate the azimuth and range time biases minimizing the summed
/// squared ground error over the control set.
///
/// Gauss-Newton on the two bias parameters with finite-difference
/// Jacobians; the model's adjustment is reset before the first iteration
/// and left at the estimate on success.
pub fn optimize(model: &mut SensorModel, set: &GroundControlSet) -> GeoResult<RefinementReport> {
    if set.is_empty() {
        return Err(GeoError::MalformedMetadata(
            "cannot refine without ground control points".to_string(),
        ));
    }

    model.set_adjustment(Adjustment::default());
    let before = accuracy_report(model, set)?;

    let gcps = set.gcps();
    let mut params = Adjustment::default();
    let mut iterations = 0;
    let mut converged = false;

    while iterations < MAX_ITERATIONS {
        iterations += 1;

        let base = residuals_at(model, params, gcps);
        let az_step = residuals_at(
            model,
            Adjustment {
                azimuth_time_bias: params.azimuth_time_bias + AZIMUTH_STEP_S,
                ..params
            },
            gcps,
        );
        let rg_step = residuals_at(
            model,
            Adjustment {
                range_time_bias: params.range_time_bias + RANGE_STEP_S,
                ..params
            },
            gcps,
        );

        // Accumulate the 2x2 normal equations over every residual
        // component. A point that fails to geolocate under the current or
        // perturbed parameters drops out of this iteration only.
        let mut normal = Matrix2::zeros();
        let mut rhs = Vector2::zeros();
        let mut used = 0usize;
        let mut rms_accum = 0.0;
        for i in 0..gcps.len() {
            let (b, a, r) = match (&base[i], &az_step[i], &rg_step[i]) {
                (Ok(b), Ok(a), Ok(r)) => (b, a, r),
                _ => {
                    log::warn!(
                        "control point at ({:.1}, {:.1}) skipped in iteration {}",
                        gcps[i].image.line,
                        gcps[i].image.sample,
                        iterations
                    );
                    continue;
                }
            };
            for k in 0..3 {
                let grad = Vector2::new(
                    (a[k] - b[k]) / AZIMUTH_STEP_S,
                    (r[k] - b[k]) / RANGE_STEP_S,
                );
                normal += grad * grad.transpose();
                rhs += grad * b[k];
            }
            rms_accum += b.norm_squared();
            used += 1;
        }

        if used == 0 {
            return Err(GeoError::MalformedMetadata(
                "no usable ground control points".to_string(),
            ));
        }

        let update = match normal.try_inverse() {
            Some(inv) => inv * rhs,
            None => {
                return Err(GeoError::GeolocationDidNotConverge {
                    iterations,
                    residual: (rms_accum / used as f64).sqrt(),
                });
            }
        };

        params.azimuth_time_bias -= update.x;
        params.range_time_bias -= update.y;

        if update.x.abs() < AZIMUTH_TOLERANCE_S && update.y.abs() < RANGE_TOLERANCE_S {
            converged = true;
            break;
        }
    }

    model.set_adjustment(params);
    let after = accuracy_report(model, set)?;

    log::info!(
        "refinement {} after {} iteration(s): radial RMSE {:.3} m -> {:.3} m, \
         azimuth bias {:.3e} s, range bias {:.3e} s",
        if converged { "converged" } else { "stopped" },
        iterations,
        before.radial_rmse,
        after.radial_rmse,
        params.azimuth_time_bias,
        params.range_time_bias
    );

    Ok(RefinementReport {
        before,
        after,
        adjustment: params,
        iterations,
        converged,
    })
}
