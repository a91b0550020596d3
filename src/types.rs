use crate::core::grid::Grid;
use std::collections::BTreeMap;

/// Quality field tag of the residual clutter mask
pub const QUALITY_RESIDUAL_CLUTTER_MASK: &str = "se.baltrad.ppc.residual_clutter_mask";

/// Quality field tag of the attenuation eligibility mask
pub const QUALITY_ATTENUATION_MASK: &str = "se.baltrad.ppc.attenuation_mask";

/// Quality field tag of the path integrated attenuation
pub const QUALITY_ATTENUATION: &str = "se.baltrad.ppc.attenuation";

/// Input quantity names read from a scan
pub mod quantity {
    pub const TH: &str = "TH";
    pub const DBZH: &str = "DBZH";
    pub const VRADH: &str = "VRADH";
    pub const PHIDP: &str = "PHIDP";
    pub const RHOHV: &str = "RHOHV";
    pub const ZDR: &str = "ZDR";
    pub const CLUTTER_MAP: &str = "CLUTTER_MAP";

    pub const CORR_TH: &str = "CORR_TH";
    pub const CORR_ATT_TH: &str = "CORR_ATT_TH";
    pub const CORR_DBZH: &str = "CORR_DBZH";
    pub const CORR_ATT_DBZH: &str = "CORR_ATT_DBZH";
    pub const CORR_KDP: &str = "CORR_KDP";
    pub const CORR_RHOHV: &str = "CORR_RHOHV";
    pub const CORR_PHIDP: &str = "CORR_PHIDP";
    pub const CORR_ZDR: &str = "CORR_ZDR";
    pub const CORR_ZPHI: &str = "CORR_ZPHI";
}

/// Result of processing one scan: corrected parameters and quality fields,
/// all in physical units
#[derive(Debug, Clone, Default)]
pub struct ProcessedScan {
    /// Corrected parameters keyed by quantity (CORR_TH, CORR_KDP, ...)
    pub parameters: BTreeMap<String, Grid>,
    /// Quality fields keyed by how/task
    pub quality_fields: BTreeMap<String, Grid>,
}

impl ProcessedScan {
    pub fn parameter(&self, quantity: &str) -> Option<&Grid> {
        self.parameters.get(quantity)
    }

    pub fn quality_field(&self, how_task: &str) -> Option<&Grid> {
        self.quality_fields.get(how_task)
    }

    pub fn has_parameter(&self, quantity: &str) -> bool {
        self.parameters.contains_key(quantity)
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty() && self.quality_fields.is_empty()
    }
}

/// Error types for polarimetric processing
#[derive(Debug, thiserror::Error)]
pub enum PpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Dimension mismatch in {context}: expected {expected:?}, found {found:?}")]
    DimensionMismatch {
        context: String,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Nodata must be enabled: {0}")]
    NodataRequired(String),

    #[error("XML parsing error: {0}")]
    XmlParsing(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Profile '{profile}' uses missing base profile '{base}'")]
    MissingBase { profile: String, base: String },

    #[error("Cyclic profile inheritance: {0}")]
    CyclicInheritance(String),

    #[error("Unknown options profile: {0}")]
    UnknownProfile(String),

    #[error("Melting layer lookup failed: {0}")]
    MeltingLayer(String),
}

impl PpcError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

/// Result type for polarimetric processing
pub type PpcResult<T> = Result<T, PpcError>;
