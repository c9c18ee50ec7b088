//! Range model: pixel/slant-range conversion and the polynomial
//! slant-range/ground-range mapping of ground-projected products.

use crate::core::timing::seconds_between;
use crate::types::{
    CoordinateConversionRecord, GeoError, GeoResult, ProductType, SPEED_OF_LIGHT,
};
use chrono::{DateTime, Utc};

/// Newton iteration cap for polynomial inversion
const INVERT_MAX_ITER: usize = 16;
/// Convergence tolerance for polynomial inversion (meters)
const INVERT_TOLERANCE: f64 = 1e-3;

/// Range geometry of a product: near-range time, sampling rate, ground
/// spacing, and the optional slant/ground conversion polynomial sets.
#[derive(Debug, Clone)]
pub struct RangeModel {
    product: ProductType,
    /// Two-way time to the first range sample (seconds)
    near_range_time: f64,
    /// Range sampling rate (Hz)
    range_sampling_rate: f64,
    /// Ground spacing of one sample for GRD products (meters)
    range_spacing: f64,
    slant_to_ground: Vec<CoordinateConversionRecord>,
    ground_to_slant: Vec<CoordinateConversionRecord>,
}

impl RangeModel {
    pub fn new(
        product: ProductType,
        near_range_time: f64,
        range_sampling_rate: f64,
        range_spacing: f64,
        slant_to_ground: Vec<CoordinateConversionRecord>,
        ground_to_slant: Vec<CoordinateConversionRecord>,
    ) -> GeoResult<Self> {
        if !(near_range_time.is_finite() && near_range_time >= 0.0) {
            return Err(GeoError::MalformedMetadata(format!(
                "invalid near range time {}",
                near_range_time
            )));
        }
        if !(range_sampling_rate.is_finite() && range_sampling_rate > 0.0) {
            return Err(GeoError::MalformedMetadata(format!(
                "invalid range sampling rate {}",
                range_sampling_rate
            )));
        }
        if product == ProductType::Grd {
            if range_spacing <= 0.0 {
                return Err(GeoError::MalformedMetadata(format!(
                    "invalid range spacing {} for ground-projected product",
                    range_spacing
                )));
            }
            if slant_to_ground.is_empty() && ground_to_slant.is_empty() {
                return Err(GeoError::NoValidConversionRecord(
                    "ground-projected product".to_string(),
                ));
            }
        }
        for (name, records) in [
            ("slant-to-ground", &slant_to_ground),
            ("ground-to-slant", &ground_to_slant),
        ] {
            if records.iter().any(|r| r.coefficients.is_empty()) {
                return Err(GeoError::MalformedMetadata(format!(
                    "{} record with empty coefficient list",
                    name
                )));
            }
            // Record selection divides by the time between neighbors
            if records
                .windows(2)
                .any(|w| w[1].azimuth_time <= w[0].azimuth_time)
            {
                return Err(GeoError::MalformedMetadata(format!(
                    "{} record times not strictly increasing",
                    name
                )));
            }
        }

        Ok(Self {
            product,
            near_range_time,
            range_sampling_rate,
            range_spacing,
            slant_to_ground,
            ground_to_slant,
        })
    }

    pub fn product(&self) -> ProductType {
        self.product
    }

    pub fn near_range_time(&self) -> f64 {
        self.near_range_time
    }

    pub fn range_sampling_rate(&self) -> f64 {
        self.range_sampling_rate
    }

    pub fn range_spacing(&self) -> f64 {
        self.range_spacing
    }

    pub fn slant_to_ground_records(&self) -> &[CoordinateConversionRecord] {
        &self.slant_to_ground
    }

    pub fn ground_to_slant_records(&self) -> &[CoordinateConversionRecord] {
        &self.ground_to_slant
    }

    /// One-way slant range (meters) of a range sample index.
    pub fn slant_range_at_pixel(&self, pixel: f64) -> f64 {
        (self.near_range_time + pixel / self.range_sampling_rate) * SPEED_OF_LIGHT / 2.0
    }

    /// Two-way range time (seconds) of a range sample index, resolving
    /// the ground projection for GRD products.
    pub fn range_time_at_pixel(&self, pixel: f64, azimuth_time: DateTime<Utc>) -> GeoResult<f64> {
        match self.product {
            ProductType::Slc => Ok(self.near_range_time + pixel / self.range_sampling_rate),
            ProductType::Grd => {
                let slant = self.ground_to_slant_range(pixel * self.range_spacing, azimuth_time)?;
                Ok(2.0 * slant / SPEED_OF_LIGHT)
            }
        }
    }

    /// Range sample index for a two-way range time.
    pub fn pixel_at_range_time(&self, range_time: f64, azimuth_time: DateTime<Utc>) -> GeoResult<f64> {
        match self.product {
            ProductType::Slc => {
                Ok((range_time - self.near_range_time) * self.range_sampling_rate)
            }
            ProductType::Grd => {
                let ground = self
                    .slant_to_ground_range(range_time * SPEED_OF_LIGHT / 2.0, azimuth_time)?;
                Ok(ground / self.range_spacing)
            }
        }
    }

    /// Ground range (meters) for a slant range at an azimuth time.
    pub fn slant_to_ground_range(
        &self,
        slant_range: f64,
        azimuth_time: DateTime<Utc>,
    ) -> GeoResult<f64> {
        if !self.slant_to_ground.is_empty() {
            let record = interpolate_record(&self.slant_to_ground, azimuth_time);
            Ok(evaluate(&record, slant_range))
        } else if !self.ground_to_slant.is_empty() {
            let record = interpolate_record(&self.ground_to_slant, azimuth_time);
            invert(&record, slant_range)
        } else {
            Err(GeoError::NoValidConversionRecord(
                "slant-to-ground".to_string(),
            ))
        }
    }

    /// Slant range (meters) for a ground range at an azimuth time.
    pub fn ground_to_slant_range(
        &self,
        ground_range: f64,
        azimuth_time: DateTime<Utc>,
    ) -> GeoResult<f64> {
        if !self.ground_to_slant.is_empty() {
            let record = interpolate_record(&self.ground_to_slant, azimuth_time);
            Ok(evaluate(&record, ground_range))
        } else if !self.slant_to_ground.is_empty() {
            let record = interpolate_record(&self.slant_to_ground, azimuth_time);
            invert(&record, ground_range)
        } else {
            Err(GeoError::NoValidConversionRecord(
                "ground-to-slant".to_string(),
            ))
        }
    }
}

/// Pick the conversion record for an azimuth time. Times between two
/// records blend both (reference range and coefficients interpolated
/// linearly by time fraction); times outside the record span clamp to the
/// closest record.
fn interpolate_record(
    records: &[CoordinateConversionRecord],
    azimuth_time: DateTime<Utc>,
) -> CoordinateConversionRecord {
    debug_assert!(!records.is_empty());

    if azimuth_time <= records.first().unwrap().azimuth_time {
        return records.first().unwrap().clone();
    }
    if azimuth_time >= records.last().unwrap().azimuth_time {
        return records.last().unwrap().clone();
    }

    let next_idx = records
        .iter()
        .position(|r| r.azimuth_time > azimuth_time)
        .unwrap();
    let prev = &records[next_idx - 1];
    let next = &records[next_idx];

    let f = seconds_between(prev.azimuth_time, azimuth_time)
        / seconds_between(prev.azimuth_time, next.azimuth_time);

    let n = prev.coefficients.len().min(next.coefficients.len());
    let coefficients = (0..n)
        .map(|i| (1.0 - f) * prev.coefficients[i] + f * next.coefficients[i])
        .collect();

    CoordinateConversionRecord {
        azimuth_time,
        reference_range: (1.0 - f) * prev.reference_range + f * next.reference_range,
        coefficients,
    }
}

/// Horner evaluation of the record's polynomial about its reference range.
fn evaluate(record: &CoordinateConversionRecord, input: f64) -> f64 {
    let x = input - record.reference_range;
    record
        .coefficients
        .iter()
        .rev()
        .fold(0.0, |acc, &c| acc * x + c)
}

/// Derivative of the record's polynomial at `input`.
fn derivative(record: &CoordinateConversionRecord, input: f64) -> f64 {
    let x = input - record.reference_range;
    record
        .coefficients
        .iter()
        .enumerate()
        .skip(1)
        .rev()
        .fold(0.0, |acc, (i, &c)| acc * x + i as f64 * c)
}

/// Newton inversion of the record's polynomial: find `x` such that
/// `evaluate(record, x) == target`. Physically valid ranges converge in a
/// few iterations because the polynomial is close to affine there.
fn invert(record: &CoordinateConversionRecord, target: f64) -> GeoResult<f64> {
    // Seed from the affine part of the polynomial
    let c0 = record.coefficients[0];
    let c1 = record.coefficients.get(1).copied().unwrap_or(0.0);
    let mut x = if c1.abs() > f64::EPSILON {
        record.reference_range + (target - c0) / c1
    } else {
        record.reference_range
    };

    for iteration in 0..INVERT_MAX_ITER {
        let f = evaluate(record, x) - target;
        if f.abs() < INVERT_TOLERANCE {
            return Ok(x);
        }
        let df = derivative(record, x);
        if df.abs() < f64::EPSILON {
            return Err(GeoError::GeolocationDidNotConverge {
                iterations: iteration,
                residual: f.abs(),
            });
        }
        x -= f / df;
    }

    let residual = (evaluate(record, x) - target).abs();
    if residual < INVERT_TOLERANCE {
        Ok(x)
    } else {
        Err(GeoError::GeolocationDidNotConverge {
            iterations: INVERT_MAX_ITER,
            residual,
        })
    }
}
