//! Metadata and tie-point exchange formats

pub mod metadata;
pub mod tiepoints;

// Re-export main types
pub use metadata::{
    from_parameters, read_ground_control, to_parameters, write_ground_control, ParameterSet,
};
pub use tiepoints::{parse_tie_points, read_tie_points, TiePointObservation};
