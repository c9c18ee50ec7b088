use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// Speed of light in vacuum (m/s)
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Orbit state vector in an Earth-fixed frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateVector {
    pub time: DateTime<Utc>,
    pub position: Vector3<f64>, // meters, ECEF
    pub velocity: Vector3<f64>, // m/s, ECEF
}

/// One contiguous block of image lines acquired under a single
/// antenna-pointing interval (TOPSAR-style scan products). Non-scan
/// products carry a single implicit burst spanning the whole image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurstRecord {
    pub start_line: usize,
    pub end_line: usize, // inclusive
    pub azimuth_start_time: DateTime<Utc>,
    pub azimuth_stop_time: DateTime<Utc>,
}

/// Slant-range/ground-range polynomial set, anchored at an azimuth time
/// and a reference range. Coefficients are ordered lowest degree first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinateConversionRecord {
    pub azimuth_time: DateTime<Utc>,
    pub reference_range: f64, // meters
    pub coefficients: Vec<f64>,
}

/// Sub-pixel image coordinate (line = azimuth, sample = range)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImagePoint {
    pub line: f64,
    pub sample: f64,
}

impl ImagePoint {
    pub fn new(line: f64, sample: f64) -> Self {
        Self { line, sample }
    }
}

/// Geodetic coordinate on the WGS84 ellipsoid
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeodeticPoint {
    pub lat: f64,    // degrees
    pub lon: f64,    // degrees
    pub height: f64, // meters above ellipsoid
}

impl GeodeticPoint {
    pub fn new(lat: f64, lon: f64, height: f64) -> Self {
        Self { lat, lon, height }
    }
}

/// Ground control point: a matched image/world coordinate pair with the
/// acquisition times recorded by the processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpRecord {
    pub image: ImagePoint,
    pub world: GeodeticPoint,
    pub azimuth_time: DateTime<Utc>,
    pub slant_range_time: f64, // two-way, seconds
}

/// Product geometry: slant-range (SLC) or ground-projected (GRD)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductType {
    Slc,
    Grd,
}

impl std::fmt::Display for ProductType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProductType::Slc => write!(f, "SLC"),
            ProductType::Grd => write!(f, "GRD"),
        }
    }
}

impl std::str::FromStr for ProductType {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SLC" => Ok(ProductType::Slc),
            // MGD/GEC/EEC are all ground projected as far as the
            // geometry is concerned
            "GRD" | "MGD" | "GEC" | "EEC" => Ok(ProductType::Grd),
            other => Err(GeoError::MalformedMetadata(format!(
                "unknown product type '{}'",
                other
            ))),
        }
    }
}

/// Side of the velocity vector the antenna looks toward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LookSide {
    Right,
    Left,
}

impl std::fmt::Display for LookSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LookSide::Right => write!(f, "RIGHT"),
            LookSide::Left => write!(f, "LEFT"),
        }
    }
}

impl std::str::FromStr for LookSide {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RIGHT" => Ok(LookSide::Right),
            "LEFT" => Ok(LookSide::Left),
            other => Err(GeoError::MalformedMetadata(format!(
                "unknown look side '{}'",
                other
            ))),
        }
    }
}

/// Adjustable bias parameters, the only mutable state of a sensor model.
/// Both default to zero; `optimize` in the refinement module is the one
/// writer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Adjustment {
    /// Added to every line-to-time conversion (seconds)
    pub azimuth_time_bias: f64,
    /// Added to every computed two-way range time (seconds)
    pub range_time_bias: f64,
}

/// Error types for the geometric model
#[derive(Debug, thiserror::Error)]
pub enum GeoError {
    #[error("Malformed metadata: {0}")]
    MalformedMetadata(String),

    #[error("Query time {0} outside usable orbit coverage")]
    OutOfOrbitRange(DateTime<Utc>),

    #[error("Azimuth time {0} falls in a gap between bursts")]
    AmbiguousBurst(DateTime<Utc>),

    #[error("Point ({lat:.6}, {lon:.6}) not imaged by this acquisition")]
    PointNotImaged { lat: f64, lon: f64 },

    #[error("Geolocation did not converge after {iterations} iterations (residual {residual:.3e})")]
    GeolocationDidNotConverge { iterations: usize, residual: f64 },

    #[error("No valid slant/ground conversion record for {0}")]
    NoValidConversionRecord(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for geometric model operations
pub type GeoResult<T> = Result<T, GeoError>;
