//! Dense geolocation grids: batch image-to-ground conversion with
//! row-parallel execution.

use crate::core::geolocation::{ElevationModel, SensorModel};
use crate::types::GeoResult;
use ndarray::Array2;
use rayon::prelude::*;

/// Rectangular image-space sampling for a geolocation grid.
#[derive(Debug, Clone, Copy)]
pub struct GridRegion {
    /// Image coordinates of the first grid node
    pub first_line: f64,
    pub first_sample: f64,
    /// Node spacing in image coordinates
    pub line_step: f64,
    pub sample_step: f64,
    /// Grid shape (rows, cols)
    pub rows: usize,
    pub cols: usize,
}

/// Per-node geodetic coordinates; nodes whose solver failed recoverably
/// hold NaN in all three layers.
#[derive(Debug)]
pub struct GeolocationGrid {
    pub lat: Array2<f64>,
    pub lon: Array2<f64>,
    pub height: Array2<f64>,
}

impl GeolocationGrid {
    /// Fraction of grid nodes with a valid solution.
    pub fn valid_fraction(&self) -> f64 {
        let valid = self.lat.iter().filter(|v| v.is_finite()).count();
        valid as f64 / self.lat.len().max(1) as f64
    }
}

/// Compute a geolocation grid over `region`, one solver call per node,
/// parallelized over grid rows.
///
/// Individual node failures (no convergence, point outside coverage) are
/// recoverable and produce NaN nodes; only an empty region is an error.
pub fn geolocation_grid(
    model: &SensorModel,
    elevation: &dyn ElevationModel,
    region: &GridRegion,
) -> GeoResult<GeolocationGrid> {
    if region.rows == 0 || region.cols == 0 {
        return Err(crate::types::GeoError::MalformedMetadata(format!(
            "empty geolocation grid region {}x{}",
            region.rows, region.cols
        )));
    }

    log::info!(
        "computing {}x{} geolocation grid from line {:.1}, sample {:.1}",
        region.rows,
        region.cols,
        region.first_line,
        region.first_sample
    );

    let rows: Vec<Vec<(f64, f64, f64)>> = (0..region.rows)
        .into_par_iter()
        .map(|i| {
            let line = region.first_line + i as f64 * region.line_step;
            (0..region.cols)
                .map(|j| {
                    let sample = region.first_sample + j as f64 * region.sample_step;
                    match model.line_sample_to_world(line, sample, elevation) {
                        Ok(world) => (world.lat, world.lon, world.height),
                        Err(err) => {
                            log::debug!(
                                "grid node ({:.1}, {:.1}) unsolved: {}",
                                line,
                                sample,
                                err
                            );
                            (f64::NAN, f64::NAN, f64::NAN)
                        }
                    }
                })
                .collect()
        })
        .collect();

    let shape = (region.rows, region.cols);
    let mut lat = Array2::zeros(shape);
    let mut lon = Array2::zeros(shape);
    let mut height = Array2::zeros(shape);
    for (i, row) in rows.into_iter().enumerate() {
        for (j, (la, lo, h)) in row.into_iter().enumerate() {
            lat[[i, j]] = la;
            lon[[i, j]] = lo;
            height[[i, j]] = h;
        }
    }

    let grid = GeolocationGrid { lat, lon, height };
    log::info!(
        "geolocation grid done, {:.1}% of nodes valid",
        100.0 * grid.valid_fraction()
    );
    Ok(grid)
}
