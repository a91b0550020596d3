//! Configuration and external data sources

pub mod melting_layer;
pub mod options_loader;

pub use melting_layer::{apply_melting_layer, MeltingLayerHistory, MeltingLayerObservation, MeltingLayerProvider};
pub use options_loader::{OptionsRepository, DEFAULT_PROFILE};
