//! Polarimetric processing stages

pub mod grid;
pub mod fuzzy;
pub mod texture;
pub mod clutter;
pub mod despeckle;
pub mod residual_clutter;
pub mod phase;
pub mod attenuation;
pub mod zphi;
pub mod options;
pub mod scan;
pub mod processor;

// Re-export main types
pub use grid::{Grid, Window};
pub use fuzzy::{trap, trap_value, MembershipParams};
pub use texture::texture;
pub use clutter::{ClutterClassifier, ClutterCorrection, ClutterCorrector, ClutterInputs, ClutterParams};
pub use despeckle::Despeckler;
pub use residual_clutter::{ResidualClutterDetector, ResidualClutterParams};
pub use phase::{PhaseParams, PhaseProcessor, PhaseResult};
pub use attenuation::{AttenuationCorrector, AttenuationInputs, AttenuationResult};
pub use zphi::{ZphiCorrector, ZphiResult};
pub use options::{Band, RadarOptions, RequestedFields};
pub use scan::{beam_height, PolarScan, PolarVolume, ScanParameter};
pub use processor::PdpProcessor;
