//! Deburst support: collapsing a multi-burst line axis into a single
//! seamless one, and extracting one burst as a standalone scene.
//!
//! Scan-mode bursts overlap in azimuth time; merging them keeps each
//! burst's lines up to half the overlap and renumbers what remains so
//! consecutive kept ranges become adjacent.

use crate::core::timing::{seconds_between, shift_time, AzimuthTiming};
use crate::types::{BurstRecord, GeoError, GeoResult, ImagePoint};

/// Mapping between the original burst-segmented line axis and the merged
/// deburst line axis, plus the merged single-burst timing.
#[derive(Debug, Clone)]
pub struct DeburstMap {
    /// Kept `[start, end]` (inclusive) image-line ranges, ascending
    ranges: Vec<(usize, usize)>,
    merged: AzimuthTiming,
}

impl DeburstMap {
    /// Build the deburst mapping for a burst table.
    ///
    /// Half of each inter-burst overlap is trimmed from the earlier
    /// burst's tail and half from the later burst's head. A single-burst
    /// table maps to itself.
    pub fn from_timing(timing: &AzimuthTiming) -> GeoResult<Self> {
        let bursts = timing.bursts();
        let interval = timing.line_interval();

        let mut ranges = Vec::with_capacity(bursts.len());
        let mut current_start = bursts[0].start_line;
        let mut kept_lines = 0usize;

        for pair in bursts.windows(2) {
            let (current, next) = (&pair[0], &pair[1]);

            let overlap_seconds =
                seconds_between(next.azimuth_start_time, current.azimuth_stop_time);
            let overlap_lines = (overlap_seconds / interval).floor().max(0.0) as usize;

            let (half_end, half_begin) = if overlap_lines == 0 {
                // Gap or exact adjacency: nothing to trim
                (0, 0)
            } else {
                let half_end = overlap_lines / 2;
                let end_time_in_next = shift_time(
                    current.azimuth_stop_time,
                    -((half_end as f64 - 1.0) * interval),
                );
                let half_begin = (0.5
                    + seconds_between(next.azimuth_start_time, end_time_in_next) / interval)
                    .floor()
                    .max(0.0) as usize;
                (half_end, half_begin)
            };

            let current_stop = current.end_line.checked_sub(half_end).ok_or_else(|| {
                GeoError::MalformedMetadata(format!(
                    "burst overlap of {} line(s) exceeds burst extent {}..={}",
                    overlap_lines, current.start_line, current.end_line
                ))
            })?;
            if current_stop < current_start {
                return Err(GeoError::MalformedMetadata(format!(
                    "burst overlap trims away lines {}..={} entirely",
                    current.start_line, current.end_line
                )));
            }

            kept_lines += current_stop - current_start + 1;
            ranges.push((current_start, current_stop));
            current_start = next.start_line + half_begin;
        }

        let last = bursts.last().unwrap();
        if last.end_line < current_start {
            return Err(GeoError::MalformedMetadata(
                "burst overlap trims away the last burst entirely".to_string(),
            ));
        }
        kept_lines += last.end_line - current_start + 1;
        ranges.push((current_start, last.end_line));

        let merged = AzimuthTiming::new(
            vec![BurstRecord {
                start_line: 0,
                end_line: kept_lines - 1,
                azimuth_start_time: bursts[0].azimuth_start_time,
                azimuth_stop_time: last.azimuth_stop_time,
            }],
            interval,
        )?;

        log::debug!(
            "deburst: {} burst(s) -> {} kept range(s), {} line(s)",
            bursts.len(),
            ranges.len(),
            kept_lines
        );

        Ok(Self { ranges, merged })
    }

    /// Kept image-line ranges, in ascending order.
    pub fn kept_ranges(&self) -> &[(usize, usize)] {
        &self.ranges
    }

    /// Timing of the merged single-burst scene.
    pub fn merged_timing(&self) -> &AzimuthTiming {
        &self.merged
    }

    /// Deburst line for an original image line, `None` if the line falls
    /// in a trimmed overlap region.
    pub fn deburst_line(&self, image_line: f64) -> Option<f64> {
        let mut offset = self.ranges[0].0 as f64;
        for (i, &(start, end)) in self.ranges.iter().enumerate() {
            if image_line >= start as f64 && image_line <= end as f64 {
                return Some(image_line - offset);
            }
            if i + 1 < self.ranges.len() {
                offset += self.ranges[i + 1].0 as f64 - end as f64 - 1.0;
            }
        }
        None
    }

    /// Original image line for a deburst line.
    pub fn image_line(&self, deburst_line: f64) -> f64 {
        let mut offset = self.ranges[0].0 as f64;
        for (i, &(start, end)) in self.ranges.iter().enumerate() {
            let candidate = deburst_line + offset;
            if candidate >= start as f64 && candidate <= end as f64 {
                break;
            }
            if i + 1 < self.ranges.len() {
                offset += self.ranges[i + 1].0 as f64 - end as f64 - 1.0;
            }
        }
        deburst_line + offset
    }

    /// Renumber an image point onto the deburst axis, dropping points in
    /// trimmed overlap regions. Samples are unchanged.
    pub fn migrate_image_point(&self, point: ImagePoint) -> Option<ImagePoint> {
        self.deburst_line(point.line)
            .map(|line| ImagePoint::new(line, point.sample))
    }
}

/// Extract one burst as a standalone single-burst timing with lines
/// renumbered from zero. Returns the extracted timing and the burst's
/// original `[first, last]` line range.
pub fn burst_extraction(
    timing: &AzimuthTiming,
    burst_index: usize,
) -> GeoResult<(AzimuthTiming, (usize, usize))> {
    let bursts = timing.bursts();
    let burst = bursts.get(burst_index).ok_or_else(|| {
        GeoError::MalformedMetadata(format!(
            "burst index {} out of range, table has {} burst(s)",
            burst_index,
            bursts.len()
        ))
    })?;

    let extracted = AzimuthTiming::new(
        vec![BurstRecord {
            start_line: 0,
            end_line: burst.end_line - burst.start_line,
            azimuth_start_time: burst.azimuth_start_time,
            azimuth_stop_time: burst.azimuth_stop_time,
        }],
        timing.line_interval(),
    )?;

    Ok((extracted, (burst.start_line, burst.end_line)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::{DateTime, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 3, 17, 8, 15).unwrap()
    }

    /// Two 1000-line bursts overlapping by 0.1 s (50 lines at 2 ms).
    fn overlapping_timing() -> AzimuthTiming {
        let li = 2.0e-3;
        let bursts = vec![
            BurstRecord {
                start_line: 0,
                end_line: 999,
                azimuth_start_time: t0(),
                azimuth_stop_time: shift_time(t0(), 2.0),
            },
            BurstRecord {
                start_line: 1000,
                end_line: 1999,
                azimuth_start_time: shift_time(t0(), 1.9),
                azimuth_stop_time: shift_time(t0(), 3.9),
            },
        ];
        AzimuthTiming::new(bursts, li).unwrap()
    }

    #[test]
    fn test_overlap_split_between_bursts() {
        let map = DeburstMap::from_timing(&overlapping_timing()).unwrap();
        // 50 overlap lines: 25 trimmed from the first burst's tail, 26
        // from the second burst's head
        assert_eq!(map.kept_ranges(), &[(0, 974), (1026, 1999)]);

        let merged = map.merged_timing();
        assert_eq!(merged.bursts().len(), 1);
        assert_eq!(merged.line_span(), (0, 1948));
        assert_eq!(merged.bursts()[0].azimuth_start_time, t0());
        assert_eq!(merged.bursts()[0].azimuth_stop_time, shift_time(t0(), 3.9));
    }

    #[test]
    fn test_line_mapping_roundtrip() {
        let map = DeburstMap::from_timing(&overlapping_timing()).unwrap();
        for line in [0.0, 500.25, 974.0, 1026.0, 1500.5, 1999.0] {
            let deburst = map.deburst_line(line).unwrap();
            assert_abs_diff_eq!(map.image_line(deburst), line, epsilon = 1e-12);
        }
        // The two ranges become adjacent on the deburst axis
        assert_abs_diff_eq!(map.deburst_line(974.0).unwrap(), 974.0, epsilon = 1e-12);
        assert_abs_diff_eq!(map.deburst_line(1026.0).unwrap(), 975.0, epsilon = 1e-12);
    }

    #[test]
    fn test_trimmed_lines_dropped() {
        let map = DeburstMap::from_timing(&overlapping_timing()).unwrap();
        assert!(map.deburst_line(975.0).is_none());
        assert!(map.deburst_line(1025.0).is_none());
        assert!(map
            .migrate_image_point(ImagePoint::new(1000.0, 42.0))
            .is_none());

        let moved = map
            .migrate_image_point(ImagePoint::new(1500.0, 42.0))
            .unwrap();
        assert_abs_diff_eq!(moved.line, 1449.0, epsilon = 1e-12);
        assert_abs_diff_eq!(moved.sample, 42.0, epsilon = 1e-12);
    }

    #[test]
    fn test_single_burst_is_identity() {
        let timing = AzimuthTiming::constant_prf(t0(), 2.0e-3, 1024).unwrap();
        let map = DeburstMap::from_timing(&timing).unwrap();
        assert_eq!(map.kept_ranges(), &[(0, 1023)]);
        assert_abs_diff_eq!(map.deburst_line(512.5).unwrap(), 512.5, epsilon = 1e-12);
        assert_eq!(map.merged_timing().line_span(), (0, 1023));
    }

    #[test]
    fn test_gap_bursts_keep_all_lines() {
        // Bursts separated by a time gap have nothing to trim
        let li = 2.0e-3;
        let bursts = vec![
            BurstRecord {
                start_line: 0,
                end_line: 499,
                azimuth_start_time: t0(),
                azimuth_stop_time: shift_time(t0(), 1.0),
            },
            BurstRecord {
                start_line: 500,
                end_line: 999,
                azimuth_start_time: shift_time(t0(), 1.2),
                azimuth_stop_time: shift_time(t0(), 2.2),
            },
        ];
        let timing = AzimuthTiming::new(bursts, li).unwrap();
        let map = DeburstMap::from_timing(&timing).unwrap();
        assert_eq!(map.kept_ranges(), &[(0, 499), (500, 999)]);
        assert_abs_diff_eq!(map.deburst_line(750.0).unwrap(), 750.0, epsilon = 1e-12);
    }

    #[test]
    fn test_burst_extraction_renumbers_from_zero() {
        let timing = overlapping_timing();
        let (extracted, lines) = burst_extraction(&timing, 1).unwrap();

        assert_eq!(lines, (1000, 1999));
        assert_eq!(extracted.line_span(), (0, 999));
        assert_eq!(extracted.bursts()[0].azimuth_start_time, shift_time(t0(), 1.9));
        // Line 0 of the extracted scene is line 1000 of the full scene
        assert_eq!(extracted.time_at_line(0.0), timing.time_at_line(1000.0));

        assert!(burst_extraction(&timing, 2).is_err());
    }
}
