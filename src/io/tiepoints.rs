//! Tie-point text files: one observation per line as
//! `row col lon lat [height]`, `#` comments and blank lines ignored.

use crate::types::{GeoError, GeoResult, GeodeticPoint, ImagePoint};
use std::path::Path;

/// One tie-point observation: an image coordinate matched to a surveyed
/// ground coordinate. Height defaults to the ellipsoid surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiePointObservation {
    pub image: ImagePoint,
    pub world: GeodeticPoint,
}

/// Parse tie-point observations from text.
pub fn parse_tie_points(text: &str) -> GeoResult<Vec<TiePointObservation>> {
    let mut observations = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 4 && fields.len() != 5 {
            return Err(GeoError::MalformedMetadata(format!(
                "tie point line {}: expected 'row col lon lat [height]', got {} fields",
                number + 1,
                fields.len()
            )));
        }
        let mut values = [0.0_f64; 5];
        for (i, field) in fields.iter().enumerate() {
            values[i] = field.parse().map_err(|_| {
                GeoError::MalformedMetadata(format!(
                    "tie point line {}: '{}' is not a number",
                    number + 1,
                    field
                ))
            })?;
        }
        let [row, col, lon, lat, height] = values;
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(GeoError::MalformedMetadata(format!(
                "tie point line {}: ({}, {}) outside geodetic bounds",
                number + 1,
                lat,
                lon
            )));
        }
        observations.push(TiePointObservation {
            image: ImagePoint::new(row, col),
            world: GeodeticPoint::new(lat, lon, height),
        });
    }
    Ok(observations)
}

/// Read tie-point observations from a file.
pub fn read_tie_points(path: impl AsRef<Path>) -> GeoResult<Vec<TiePointObservation>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let observations = parse_tie_points(&text)?;
    log::info!(
        "read {} tie point(s) from {}",
        observations.len(),
        path.display()
    );
    Ok(observations)
}
