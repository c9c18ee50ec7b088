//! Azimuth time model: conversion between image lines and acquisition
//! instants, including the burst-segmented case for scan-mode products.

use crate::types::{BurstRecord, GeoError, GeoResult};
use chrono::{DateTime, Duration, Utc};

/// Signed fractional seconds from `t0` to `t1`.
pub fn seconds_between(t0: DateTime<Utc>, t1: DateTime<Utc>) -> f64 {
    let d = t1 - t0;
    match d.num_nanoseconds() {
        Some(ns) => ns as f64 * 1e-9,
        // Spans beyond ~292 years lose sub-ms precision, which is fine
        None => d.num_milliseconds() as f64 * 1e-3,
    }
}

/// `t` shifted by fractional `seconds` (nanosecond resolution).
pub fn shift_time(t: DateTime<Utc>, seconds: f64) -> DateTime<Utc> {
    t + Duration::nanoseconds((seconds * 1e9).round() as i64)
}

/// Line/time mapping over an ordered burst table.
///
/// Non-scan products are modeled with a single implicit burst covering
/// `[0, lines-1]`, so the affine constant-PRF model is just the one-burst
/// special case.
#[derive(Debug, Clone)]
pub struct AzimuthTiming {
    bursts: Vec<BurstRecord>,
    /// Constant line time interval (seconds per line)
    line_interval: f64,
}

impl AzimuthTiming {
    /// Build from an explicit burst table.
    ///
    /// Bursts must be ordered, non-overlapping and contiguous in line
    /// numbers; anything else is rejected as malformed metadata.
    pub fn new(bursts: Vec<BurstRecord>, line_interval: f64) -> GeoResult<Self> {
        if bursts.is_empty() {
            return Err(GeoError::MalformedMetadata(
                "burst table is empty".to_string(),
            ));
        }
        if !(line_interval.is_finite() && line_interval > 0.0) {
            return Err(GeoError::MalformedMetadata(format!(
                "invalid line time interval {}",
                line_interval
            )));
        }
        for (i, b) in bursts.iter().enumerate() {
            if b.end_line < b.start_line {
                return Err(GeoError::MalformedMetadata(format!(
                    "burst {} has inverted line range {}-{}",
                    i, b.start_line, b.end_line
                )));
            }
            if b.azimuth_stop_time <= b.azimuth_start_time {
                return Err(GeoError::MalformedMetadata(format!(
                    "burst {} has inverted azimuth interval",
                    i
                )));
            }
        }
        for w in bursts.windows(2) {
            if w[1].start_line != w[0].end_line + 1 {
                return Err(GeoError::MalformedMetadata(format!(
                    "burst line ranges not contiguous: {}..={} followed by {}..={}",
                    w[0].start_line, w[0].end_line, w[1].start_line, w[1].end_line
                )));
            }
            if w[1].azimuth_start_time < w[0].azimuth_start_time {
                return Err(GeoError::MalformedMetadata(
                    "burst azimuth times not ordered".to_string(),
                ));
            }
        }

        log::debug!(
            "azimuth timing: {} burst(s), line interval {:.6e} s",
            bursts.len(),
            line_interval
        );

        Ok(Self {
            bursts,
            line_interval,
        })
    }

    /// Single implicit burst spanning `[0, lines-1]` at a constant PRF.
    pub fn constant_prf(
        first_line_time: DateTime<Utc>,
        line_interval: f64,
        lines: usize,
    ) -> GeoResult<Self> {
        if lines == 0 {
            return Err(GeoError::MalformedMetadata(
                "image has zero lines".to_string(),
            ));
        }
        let burst = BurstRecord {
            start_line: 0,
            end_line: lines - 1,
            azimuth_start_time: first_line_time,
            azimuth_stop_time: shift_time(first_line_time, line_interval * lines as f64),
        };
        Self::new(vec![burst], line_interval)
    }

    pub fn bursts(&self) -> &[BurstRecord] {
        &self.bursts
    }

    pub fn line_interval(&self) -> f64 {
        self.line_interval
    }

    /// First and last azimuth instants covered by the burst table.
    pub fn time_span(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            self.bursts.first().unwrap().azimuth_start_time,
            self.bursts.last().unwrap().azimuth_stop_time,
        )
    }

    /// Total line extent `[first, last]` covered by the burst table.
    pub fn line_span(&self) -> (usize, usize) {
        (
            self.bursts.first().unwrap().start_line,
            self.bursts.last().unwrap().end_line,
        )
    }

    fn burst_for_line(&self, line: f64) -> &BurstRecord {
        for b in &self.bursts {
            if line >= b.start_line as f64 && line < (b.end_line + 1) as f64 {
                return b;
            }
        }
        // Out-of-range lines clamp to the nearest end of the table rather
        // than extrapolating past scene limits.
        if line < self.bursts.first().unwrap().start_line as f64 {
            self.bursts.first().unwrap()
        } else {
            self.bursts.last().unwrap()
        }
    }

    /// Azimuth acquisition time of an image line.
    pub fn time_at_line(&self, line: f64) -> DateTime<Utc> {
        let burst = self.burst_for_line(line);
        let dt = (line - burst.start_line as f64) * self.line_interval;
        shift_time(burst.azimuth_start_time, dt)
    }

    /// Inverse of [`time_at_line`]: image line for an azimuth time.
    ///
    /// A time falling in a gap between bursts is assigned to the nearest
    /// burst by time distance, matching the accommodation production
    /// metadata requires. Use [`line_at_time_strict`] to reject gap times
    /// instead.
    ///
    /// [`time_at_line`]: Self::time_at_line
    /// [`line_at_time_strict`]: Self::line_at_time_strict
    pub fn line_at_time(&self, time: DateTime<Utc>) -> f64 {
        let burst = match self.enclosing_burst(time) {
            Some(b) => b,
            None => self.nearest_burst(time),
        };
        self.line_in_burst(burst, time)
    }

    /// Like [`line_at_time`] but fails with `AmbiguousBurst` when the time
    /// falls between two bursts with no enclosing one.
    ///
    /// [`line_at_time`]: Self::line_at_time
    pub fn line_at_time_strict(&self, time: DateTime<Utc>) -> GeoResult<f64> {
        match self.enclosing_burst(time) {
            Some(b) => Ok(self.line_in_burst(b, time)),
            None => Err(GeoError::AmbiguousBurst(time)),
        }
    }

    fn line_in_burst(&self, burst: &BurstRecord, time: DateTime<Utc>) -> f64 {
        let dt = seconds_between(burst.azimuth_start_time, time);
        burst.start_line as f64 + dt / self.line_interval
    }

    fn enclosing_burst(&self, time: DateTime<Utc>) -> Option<&BurstRecord> {
        self.bursts
            .iter()
            .find(|b| time >= b.azimuth_start_time && time < b.azimuth_stop_time)
    }

    /// Nearest burst by time distance to the burst interval. Times before
    /// the first burst or after the last clamp to those bursts.
    fn nearest_burst(&self, time: DateTime<Utc>) -> &BurstRecord {
        self.bursts
            .iter()
            .min_by(|a, b| {
                let da = Self::gap_distance(a, time);
                let db = Self::gap_distance(b, time);
                da.partial_cmp(&db).unwrap()
            })
            .unwrap()
    }

    fn gap_distance(burst: &BurstRecord, time: DateTime<Utc>) -> f64 {
        if time < burst.azimuth_start_time {
            seconds_between(time, burst.azimuth_start_time)
        } else if time >= burst.azimuth_stop_time {
            seconds_between(burst.azimuth_stop_time, time)
        } else {
            0.0
        }
    }

    /// Check that the burst line ranges partition `[0, image_lines-1]`.
    pub fn validate_partition(&self, image_lines: usize) -> GeoResult<()> {
        let (first, last) = self.line_span();
        if first != 0 || last != image_lines - 1 {
            return Err(GeoError::MalformedMetadata(format!(
                "burst table covers lines {}..={}, image has {} lines",
                first, last, image_lines
            )));
        }
        Ok(())
    }
}
