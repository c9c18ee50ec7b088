//! Core geometric model modules

pub mod deburst;
pub mod ellipsoid;
pub mod geolocation;
pub mod grid;
pub mod orbit;
pub mod range;
pub mod refine;
pub mod timing;

// Re-export main types
pub use deburst::{burst_extraction, DeburstMap};
pub use ellipsoid::{ecef_to_geodetic, enu_rotation, geodetic_to_ecef, WGS84_A, WGS84_E2};
pub use geolocation::{ConstantElevation, ElevationModel, SensorModel};
pub use grid::{geolocation_grid, GeolocationGrid, GridRegion};
pub use orbit::OrbitStore;
pub use range::RangeModel;
pub use refine::{
    accuracy_report, optimize, AccuracyReport, AxisStats, GroundControlSet, RefinementReport,
    TiePointAssessment,
};
pub use timing::{seconds_between, shift_time, AzimuthTiming};
