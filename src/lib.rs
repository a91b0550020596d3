//! Polarimetric quality control for weather radar polar scans
//!
//! Removes ground clutter and residual clutter from reflectivity, filters
//! differential phase into KDP and corrects attenuation using either a
//! linear PDP method or the Z-PHI method. Every stage is parameterized per
//! radar through [`RadarOptions`] profiles loaded into an
//! [`OptionsRepository`].

pub mod types;
pub mod io;
pub mod core;

#[cfg(feature = "python")]
mod python;

// Re-export main types and functions for easier access
pub use types::{
    PpcError, PpcResult, ProcessedScan, QUALITY_ATTENUATION, QUALITY_ATTENUATION_MASK,
    QUALITY_RESIDUAL_CLUTTER_MASK,
};

pub use core::{
    Grid, Window, PdpProcessor, PolarScan, PolarVolume, ScanParameter, RadarOptions,
    RequestedFields, Band,
};

pub use io::{MeltingLayerHistory, MeltingLayerProvider, OptionsRepository};
