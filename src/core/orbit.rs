//! Orbit store: ordered state vectors with Lagrange interpolation of
//! platform position and velocity at arbitrary azimuth times.

use crate::core::timing::seconds_between;
use crate::types::{GeoError, GeoResult, StateVector};
use chrono::{DateTime, Utc};
use nalgebra::Vector3;

/// Number of state vectors used per interpolation window
const INTERP_WINDOW: usize = 8;

/// Minimum record count for a usable polynomial fit
const MIN_RECORDS: usize = 4;

/// Immutable sequence of orbit state vectors in strictly increasing time
/// order, interpolated locally with Lagrange polynomials.
#[derive(Debug, Clone)]
pub struct OrbitStore {
    records: Vec<StateVector>,
    /// Mean spacing between consecutive records (seconds); also the guard
    /// band allowed beyond either end before a query is rejected.
    mean_spacing: f64,
}

impl OrbitStore {
    pub fn new(records: Vec<StateVector>) -> GeoResult<Self> {
        if records.len() < MIN_RECORDS {
            return Err(GeoError::MalformedMetadata(format!(
                "{} orbit state vectors, at least {} required",
                records.len(),
                MIN_RECORDS
            )));
        }
        for w in records.windows(2) {
            if w[1].time <= w[0].time {
                return Err(GeoError::MalformedMetadata(format!(
                    "orbit state vectors not strictly increasing at {}",
                    w[1].time
                )));
            }
        }
        let span = seconds_between(records.first().unwrap().time, records.last().unwrap().time);
        let mean_spacing = span / (records.len() - 1) as f64;

        log::debug!(
            "orbit store: {} state vectors spanning {:.1} s (mean spacing {:.2} s)",
            records.len(),
            span,
            mean_spacing
        );

        Ok(Self {
            records,
            mean_spacing,
        })
    }

    pub fn records(&self) -> &[StateVector] {
        &self.records
    }

    /// Time of the first and last state vector.
    pub fn time_span(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.records.first().unwrap().time,
            self.records.last().unwrap().time,
        )
    }

    /// Whether `time` lies within the covered span plus the guard band of
    /// one mean record spacing at each end.
    pub fn covers(&self, time: DateTime<Utc>) -> bool {
        let (first, last) = self.time_span();
        seconds_between(first, time) > -self.mean_spacing
            && seconds_between(time, last) > -self.mean_spacing
    }

    /// Interpolated platform position and velocity at `time`.
    ///
    /// Uses the [`INTERP_WINDOW`] records nearest to the query, sliding
    /// the window inward at the sequence boundaries. Interpolating exactly
    /// at a record's time reproduces that record.
    pub fn state_at(&self, time: DateTime<Utc>) -> GeoResult<(Vector3<f64>, Vector3<f64>)> {
        if !self.covers(time) {
            return Err(GeoError::OutOfOrbitRange(time));
        }

        // Seconds relative to the first record, so the Lagrange weights
        // work on plain floats
        let t0 = self.records[0].time;
        let t = seconds_between(t0, time);
        let times: Vec<f64> = self
            .records
            .iter()
            .map(|r| seconds_between(t0, r.time))
            .collect();

        // Nearest record index
        let nearest = times
            .iter()
            .enumerate()
            .min_by(|a, b| {
                let da = (a.1 - t).abs();
                let db = (b.1 - t).abs();
                da.partial_cmp(&db).unwrap()
            })
            .map(|(i, _)| i)
            .unwrap();

        let window = INTERP_WINDOW.min(self.records.len());
        let begin = nearest
            .saturating_sub(window / 2 - 1)
            .min(self.records.len() - window);
        let end = begin + window;

        let mut position = Vector3::zeros();
        let mut velocity = Vector3::zeros();

        for i in begin..end {
            let mut w = 1.0;
            for j in begin..end {
                if j != i {
                    w *= (t - times[j]) / (times[i] - times[j]);
                }
            }
            position += w * self.records[i].position;
            velocity += w * self.records[i].velocity;
        }

        Ok((position, velocity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::timing::shift_time;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 3, 17, 8, 0).unwrap()
    }

    /// Straight-line motion: Lagrange interpolation of any degree >= 1
    /// must reproduce it exactly.
    fn linear_orbit(n: usize, spacing: f64) -> OrbitStore {
        let p0 = Vector3::new(7_000_000.0, 0.0, 0.0);
        let v = Vector3::new(0.0, 7_500.0, 0.0);
        let records = (0..n)
            .map(|i| {
                let dt = i as f64 * spacing;
                StateVector {
                    time: shift_time(t0(), dt),
                    position: p0 + v * dt,
                    velocity: v,
                }
            })
            .collect();
        OrbitStore::new(records).unwrap()
    }

    #[test]
    fn test_exact_at_record_times() {
        let orbit = linear_orbit(5, 10.0);
        for rec in orbit.records().to_vec() {
            let (pos, vel) = orbit.state_at(rec.time).unwrap();
            assert_abs_diff_eq!(pos.x, rec.position.x, epsilon = 1e-6);
            assert_abs_diff_eq!(pos.y, rec.position.y, epsilon = 1e-6);
            assert_abs_diff_eq!(pos.z, rec.position.z, epsilon = 1e-6);
            assert_abs_diff_eq!(vel.y, rec.velocity.y, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_linear_motion_between_records() {
        let orbit = linear_orbit(9, 10.0);
        let query = shift_time(t0(), 23.7);
        let (pos, vel) = orbit.state_at(query).unwrap();
        assert_abs_diff_eq!(pos.x, 7_000_000.0, epsilon = 1e-5);
        assert_abs_diff_eq!(pos.y, 7_500.0 * 23.7, epsilon = 1e-4);
        assert_abs_diff_eq!(vel.y, 7_500.0, epsilon = 1e-6);
    }

    #[test]
    fn test_guard_band() {
        let orbit = linear_orbit(5, 10.0);
        // Within one mean spacing past the last record: allowed
        assert!(orbit.state_at(shift_time(t0(), 45.0)).is_ok());
        // Beyond the guard band: rejected
        assert!(matches!(
            orbit.state_at(shift_time(t0(), 55.0)),
            Err(GeoError::OutOfOrbitRange(_))
        ));
        assert!(matches!(
            orbit.state_at(shift_time(t0(), -15.0)),
            Err(GeoError::OutOfOrbitRange(_))
        ));
    }

    #[test]
    fn test_too_few_records_rejected() {
        let orbit = linear_orbit(5, 10.0);
        let few: Vec<StateVector> = orbit.records()[..3].to_vec();
        assert!(OrbitStore::new(few).is_err());
    }
}
