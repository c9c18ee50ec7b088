//! Keyword-list metadata: a flat ordered key/value store and the
//! construction of a full sensor model from it (and back).
//!
//! Keys follow the `support_data.` / `orbitList.` / `burstList.` /
//! `srToGr.` / `grToSr.` naming used by product annotation exports. All
//! times are RFC 3339 with nanosecond precision.

use crate::core::geolocation::SensorModel;
use crate::core::orbit::OrbitStore;
use crate::core::range::RangeModel;
use crate::core::refine::GroundControlSet;
use crate::core::timing::AzimuthTiming;
use crate::types::{
    Adjustment, BurstRecord, CoordinateConversionRecord, GcpRecord, GeoError, GeoResult,
    GeodeticPoint, ImagePoint, LookSide, ProductType, StateVector,
};
use chrono::{DateTime, SecondsFormat, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;

/// Flat keyword list: string keys to string values, ordered by key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    entries: BTreeMap<String, String>,
}

impl ParameterSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Display) {
        self.entries.insert(key.into(), value.to_string());
    }

    pub fn set_time(&mut self, key: impl Into<String>, time: DateTime<Utc>) {
        self.entries.insert(
            key.into(),
            time.to_rfc3339_opts(SecondsFormat::Nanos, true),
        );
    }

    pub fn get(&self, key: &str) -> GeoResult<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| GeoError::MalformedMetadata(format!("missing key '{}'", key)))
    }

    pub fn get_opt(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn get_f64(&self, key: &str) -> GeoResult<f64> {
        self.get(key)?.trim().parse().map_err(|_| {
            GeoError::MalformedMetadata(format!("key '{}' is not a number", key))
        })
    }

    pub fn get_usize(&self, key: &str) -> GeoResult<usize> {
        self.get(key)?.trim().parse().map_err(|_| {
            GeoError::MalformedMetadata(format!("key '{}' is not a count", key))
        })
    }

    pub fn get_bool(&self, key: &str) -> GeoResult<bool> {
        match self.get(key)?.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(GeoError::MalformedMetadata(format!(
                "key '{}' is not a boolean",
                key
            ))),
        }
    }

    pub fn get_time(&self, key: &str) -> GeoResult<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(self.get(key)?.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| {
                GeoError::MalformedMetadata(format!("key '{}' is not an RFC 3339 time", key))
            })
    }

    /// Render as `key: value` lines in key order.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push_str(": ");
            out.push_str(value);
            out.push('\n');
        }
        out
    }

    /// Parse `key: value` lines; blank lines and `#` comments are skipped.
    pub fn from_text(text: &str) -> GeoResult<Self> {
        let mut set = Self::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once(':').ok_or_else(|| {
                GeoError::MalformedMetadata(format!("line {}: no 'key: value' pair", number + 1))
            })?;
            set.set(key.trim(), value.trim());
        }
        Ok(set)
    }
}

fn parsed<T: FromStr<Err = GeoError>>(params: &ParameterSet, key: &str) -> GeoResult<T> {
    params.get(key)?.trim().parse()
}

fn read_orbit(params: &ParameterSet) -> GeoResult<OrbitStore> {
    let count = params.get_usize("orbitList.nb_orbits")?;
    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        let prefix = format!("orbitList.orbit[{}]", i);
        records.push(StateVector {
            time: params.get_time(&format!("{}.time", prefix))?,
            position: Vector3::new(
                params.get_f64(&format!("{}.x_pos", prefix))?,
                params.get_f64(&format!("{}.y_pos", prefix))?,
                params.get_f64(&format!("{}.z_pos", prefix))?,
            ),
            velocity: Vector3::new(
                params.get_f64(&format!("{}.x_vel", prefix))?,
                params.get_f64(&format!("{}.y_vel", prefix))?,
                params.get_f64(&format!("{}.z_vel", prefix))?,
            ),
        });
    }
    OrbitStore::new(records)
}

fn read_timing(params: &ParameterSet, lines: usize) -> GeoResult<AzimuthTiming> {
    let line_interval = params.get_f64("support_data.line_time_interval")?;
    let count = match params.get_opt("burstList.nb_bursts") {
        Some(s) => s.trim().parse().map_err(|_| {
            GeoError::MalformedMetadata("key 'burstList.nb_bursts' is not a count".to_string())
        })?,
        None => 0,
    };

    if count == 0 {
        // No burst table: constant PRF over the whole image
        let first = params.get_time("support_data.first_line_time")?;
        return AzimuthTiming::constant_prf(first, line_interval, lines);
    }

    let mut bursts = Vec::with_capacity(count);
    for i in 0..count {
        let prefix = format!("burstList.burst[{}]", i);
        bursts.push(BurstRecord {
            start_line: params.get_usize(&format!("{}.start_line", prefix))?,
            end_line: params.get_usize(&format!("{}.end_line", prefix))?,
            azimuth_start_time: params.get_time(&format!("{}.azimuth_start_time", prefix))?,
            azimuth_stop_time: params.get_time(&format!("{}.azimuth_stop_time", prefix))?,
        });
    }
    let timing = AzimuthTiming::new(bursts, line_interval)?;
    timing.validate_partition(lines)?;
    Ok(timing)
}

fn read_conversion_records(
    params: &ParameterSet,
    group: &str,
) -> GeoResult<Vec<CoordinateConversionRecord>> {
    let count = match params.get_opt(&format!("{}.nb_records", group)) {
        Some(s) => s.trim().parse().map_err(|_| {
            GeoError::MalformedMetadata(format!("key '{}.nb_records' is not a count", group))
        })?,
        None => 0,
    };
    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        let prefix = format!("{}[{}]", group, i);
        let coefficients = params
            .get(&format!("{}.coefficients", prefix))?
            .split_whitespace()
            .map(|c| {
                c.parse().map_err(|_| {
                    GeoError::MalformedMetadata(format!(
                        "bad coefficient '{}' in {}",
                        c, prefix
                    ))
                })
            })
            .collect::<GeoResult<Vec<f64>>>()?;
        records.push(CoordinateConversionRecord {
            azimuth_time: params.get_time(&format!("{}.azimuth_time", prefix))?,
            reference_range: params.get_f64(&format!("{}.reference_range", prefix))?,
            coefficients,
        });
    }
    Ok(records)
}

/// Read the ground control list carried alongside the model, validated
/// against the model's timing. Absent keys yield an empty set.
pub fn read_ground_control(
    params: &ParameterSet,
    model: &SensorModel,
) -> GeoResult<GroundControlSet> {
    let count = match params.get_opt("gcpList.nb_gcps") {
        Some(s) => s.trim().parse().map_err(|_| {
            GeoError::MalformedMetadata("key 'gcpList.nb_gcps' is not a count".to_string())
        })?,
        None => 0,
    };
    let mut records = Vec::with_capacity(count);
    for i in 0..count {
        let prefix = format!("gcpList.gcp[{}]", i);
        records.push(GcpRecord {
            image: ImagePoint::new(
                params.get_f64(&format!("{}.line", prefix))?,
                params.get_f64(&format!("{}.sample", prefix))?,
            ),
            world: GeodeticPoint::new(
                params.get_f64(&format!("{}.lat", prefix))?,
                params.get_f64(&format!("{}.lon", prefix))?,
                params.get_f64(&format!("{}.height", prefix))?,
            ),
            azimuth_time: params.get_time(&format!("{}.azimuth_time", prefix))?,
            slant_range_time: params.get_f64(&format!("{}.slant_range_time", prefix))?,
        });
    }
    GroundControlSet::from_records(model, records)
}

/// Persist a ground control list next to the model's own keys.
pub fn write_ground_control(params: &mut ParameterSet, set: &GroundControlSet) {
    params.set("gcpList.nb_gcps", set.len());
    for (i, gcp) in set.gcps().iter().enumerate() {
        let prefix = format!("gcpList.gcp[{}]", i);
        params.set(format!("{}.line", prefix), gcp.image.line);
        params.set(format!("{}.sample", prefix), gcp.image.sample);
        params.set(format!("{}.lat", prefix), gcp.world.lat);
        params.set(format!("{}.lon", prefix), gcp.world.lon);
        params.set(format!("{}.height", prefix), gcp.world.height);
        params.set_time(format!("{}.azimuth_time", prefix), gcp.azimuth_time);
        params.set(
            format!("{}.slant_range_time", prefix),
            gcp.slant_range_time,
        );
    }
}

/// Build a sensor model from a keyword list.
///
/// Any missing or unparsable key is fatal; no partial model is returned.
pub fn from_parameters(params: &ParameterSet) -> GeoResult<SensorModel> {
    let product: ProductType = parsed(params, "support_data.product_type")?;
    let look_side: LookSide = parsed(params, "support_data.look_side")?;
    let lines = params.get_usize("support_data.number_lines")?;

    let orbit = read_orbit(params)?;
    let timing = read_timing(params, lines)?;

    let range_spacing = match params.get_opt("support_data.range_spacing") {
        Some(s) => s.trim().parse().map_err(|_| {
            GeoError::MalformedMetadata("key 'support_data.range_spacing' is not a number".to_string())
        })?,
        None => 0.0,
    };
    let range = RangeModel::new(
        product,
        params.get_f64("support_data.slant_range_to_first_pixel")?,
        params.get_f64("support_data.range_sampling_rate")?,
        range_spacing,
        read_conversion_records(params, "srToGr")?,
        read_conversion_records(params, "grToSr")?,
    )?;

    let bistatic = match params.get_opt("support_data.bistatic_correction_needed") {
        Some(_) => params.get_bool("support_data.bistatic_correction_needed")?,
        None => false,
    };

    let mut model = SensorModel::new(orbit, timing, range, look_side, bistatic);

    // Biases persist across save/load so a refined model stays refined
    let adjustment = Adjustment {
        azimuth_time_bias: match params.get_opt("support_data.azimuth_time_bias") {
            Some(_) => params.get_f64("support_data.azimuth_time_bias")?,
            None => 0.0,
        },
        range_time_bias: match params.get_opt("support_data.range_time_bias") {
            Some(_) => params.get_f64("support_data.range_time_bias")?,
            None => 0.0,
        },
    };
    model.set_adjustment(adjustment);

    log::debug!("sensor model restored from {} keys", params.entries.len());
    Ok(model)
}

fn write_conversion_records(
    params: &mut ParameterSet,
    group: &str,
    records: &[CoordinateConversionRecord],
) {
    if records.is_empty() {
        return;
    }
    params.set(format!("{}.nb_records", group), records.len());
    for (i, record) in records.iter().enumerate() {
        let prefix = format!("{}[{}]", group, i);
        params.set_time(format!("{}.azimuth_time", prefix), record.azimuth_time);
        params.set(
            format!("{}.reference_range", prefix),
            record.reference_range,
        );
        let coefficients = record
            .coefficients
            .iter()
            .map(|c| format!("{:e}", c))
            .collect::<Vec<_>>()
            .join(" ");
        params.set(format!("{}.coefficients", prefix), coefficients);
    }
}

/// Export a sensor model as a keyword list; `from_parameters` on the
/// result reproduces the model.
pub fn to_parameters(model: &SensorModel) -> ParameterSet {
    let mut params = ParameterSet::new();
    let range = model.range();

    params.set("support_data.product_type", range.product());
    params.set("support_data.look_side", model.look_side());
    params.set(
        "support_data.slant_range_to_first_pixel",
        range.near_range_time(),
    );
    params.set("support_data.range_sampling_rate", range.range_sampling_rate());
    if range.product() == ProductType::Grd {
        params.set("support_data.range_spacing", range.range_spacing());
    }
    params.set(
        "support_data.line_time_interval",
        model.timing().line_interval(),
    );
    let (_, last_line) = model.timing().line_span();
    params.set("support_data.number_lines", last_line + 1);
    params.set(
        "support_data.bistatic_correction_needed",
        model.bistatic_correction(),
    );
    params.set(
        "support_data.azimuth_time_bias",
        model.adjustment().azimuth_time_bias,
    );
    params.set(
        "support_data.range_time_bias",
        model.adjustment().range_time_bias,
    );

    let records = model.orbit().records();
    params.set("orbitList.nb_orbits", records.len());
    for (i, sv) in records.iter().enumerate() {
        let prefix = format!("orbitList.orbit[{}]", i);
        params.set_time(format!("{}.time", prefix), sv.time);
        params.set(format!("{}.x_pos", prefix), sv.position.x);
        params.set(format!("{}.y_pos", prefix), sv.position.y);
        params.set(format!("{}.z_pos", prefix), sv.position.z);
        params.set(format!("{}.x_vel", prefix), sv.velocity.x);
        params.set(format!("{}.y_vel", prefix), sv.velocity.y);
        params.set(format!("{}.z_vel", prefix), sv.velocity.z);
    }

    let bursts = model.timing().bursts();
    params.set("burstList.nb_bursts", bursts.len());
    for (i, burst) in bursts.iter().enumerate() {
        let prefix = format!("burstList.burst[{}]", i);
        params.set(format!("{}.start_line", prefix), burst.start_line);
        params.set(format!("{}.end_line", prefix), burst.end_line);
        params.set_time(
            format!("{}.azimuth_start_time", prefix),
            burst.azimuth_start_time,
        );
        params.set_time(
            format!("{}.azimuth_stop_time", prefix),
            burst.azimuth_stop_time,
        );
    }

    write_conversion_records(&mut params, "srToGr", range.slant_to_ground_records());
    write_conversion_records(&mut params, "grToSr", range.ground_to_slant_records());

    params
}
