//! SARGeo: A SAR Sensor Geometric Model
//!
//! This library maps between image coordinates (line, sample) and geodetic
//! ground coordinates for slant-range and ground-projected radar products,
//! using annotated orbit state vectors, burst timing and slant/ground range
//! polynomials, and refines the model's timing biases against ground
//! control points.

pub mod core;
pub mod io;
pub mod types;

// Re-export main types and functions for easier access
pub use types::{
    Adjustment, BurstRecord, CoordinateConversionRecord, GcpRecord, GeoError, GeoResult,
    GeodeticPoint, ImagePoint, LookSide, ProductType, StateVector, SPEED_OF_LIGHT,
};

pub use crate::core::{
    accuracy_report, burst_extraction, geolocation_grid, optimize, AccuracyReport,
    AzimuthTiming, ConstantElevation, DeburstMap, ElevationModel, GeolocationGrid, GridRegion,
    GroundControlSet, OrbitStore, RangeModel, RefinementReport, SensorModel,
};

pub use io::{from_parameters, read_tie_points, to_parameters, ParameterSet};
