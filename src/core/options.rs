use crate::core::fuzzy::MembershipParams;
use crate::types::{PpcError, PpcResult};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;

/// Set of outputs the processor should produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RequestedFields(u32);

impl RequestedFields {
    pub const TH_CORR: Self = Self(1);
    pub const ATT_TH_CORR: Self = Self(1 << 1);
    pub const DBZH_CORR: Self = Self(1 << 2);
    pub const ATT_DBZH_CORR: Self = Self(1 << 3);
    pub const KDP_CORR: Self = Self(1 << 4);
    pub const RHOHV_CORR: Self = Self(1 << 5);
    pub const PHIDP_CORR: Self = Self(1 << 6);
    pub const ZDR_CORR: Self = Self(1 << 7);
    pub const ZPHI_CORR: Self = Self(1 << 8);
    pub const QUALITY_RESIDUAL_CLUTTER_MASK: Self = Self(1 << 9);
    pub const QUALITY_ATTENUATION_MASK: Self = Self(1 << 10);
    pub const QUALITY_ATTENUATION: Self = Self(1 << 11);

    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self((1 << 12) - 1);

    const NAMES: [(&'static str, RequestedFields); 12] = [
        ("TH_CORR", Self::TH_CORR),
        ("ATT_TH_CORR", Self::ATT_TH_CORR),
        ("DBZH_CORR", Self::DBZH_CORR),
        ("ATT_DBZH_CORR", Self::ATT_DBZH_CORR),
        ("KDP_CORR", Self::KDP_CORR),
        ("RHOHV_CORR", Self::RHOHV_CORR),
        ("PHIDP_CORR", Self::PHIDP_CORR),
        ("ZDR_CORR", Self::ZDR_CORR),
        ("ZPHI_CORR", Self::ZPHI_CORR),
        ("Q_RESIDUAL_CLUTTER_MASK", Self::QUALITY_RESIDUAL_CLUTTER_MASK),
        ("Q_ATTENUATION_MASK", Self::QUALITY_ATTENUATION_MASK),
        ("Q_ATTENUATION", Self::QUALITY_ATTENUATION),
    ];

    /// Build from raw bits; bits outside the known flags are dropped
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & Self::ALL.0)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True if every flag of `other` is set
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if any flag of `other` is set
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Names of the set flags in bit order
    pub fn names(self) -> Vec<&'static str> {
        Self::NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl BitOr for RequestedFields {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for RequestedFields {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl fmt::Display for RequestedFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.names().join("|"))
    }
}

/// Accepts a decimal bitmask or flag names joined by `|`
impl FromStr for RequestedFields {
    type Err = PpcError;

    fn from_str(s: &str) -> PpcResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::NONE);
        }
        if let Ok(bits) = s.parse::<u32>() {
            return Ok(Self::from_bits(bits));
        }
        s.split('|').try_fold(Self::NONE, |acc, token| {
            let token = token.trim();
            Self::NAMES
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(token))
                .map(|(_, flag)| acc | *flag)
                .ok_or_else(|| {
                    PpcError::invalid_argument(format!("unknown requested field '{}'", token))
                })
        })
    }
}

/// Radar frequency band with its KDP limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Band {
    S,
    C,
    X,
}

impl Band {
    /// (kdpUp, kdpDown, kdpStdThreshold)
    pub fn kdp_limits(self) -> (f64, f64, f64) {
        match self {
            Band::S => (14.0, -2.0, 5.0),
            Band::C => (20.0, -2.0, 5.0),
            Band::X => (40.0, -2.0, 5.0),
        }
    }
}

impl TryFrom<char> for Band {
    type Error = PpcError;

    fn try_from(code: char) -> PpcResult<Self> {
        match code.to_ascii_lowercase() {
            's' => Ok(Band::S),
            'c' => Ok(Band::C),
            'x' => Ok(Band::X),
            _ => Err(PpcError::invalid_argument(format!(
                "unknown band '{}', expected one of s, c, x",
                code
            ))),
        }
    }
}

impl FromStr for Band {
    type Err = PpcError;

    fn from_str(s: &str) -> PpcResult<Self> {
        let mut chars = s.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(code), None) => Band::try_from(code),
            _ => Err(PpcError::invalid_argument(format!(
                "band must be a single letter, got '{}'",
                s
            ))),
        }
    }
}

/// Complete parameter set for one radar
#[derive(Debug, Clone, PartialEq)]
pub struct RadarOptions {
    /// Profile name
    pub name: String,

    // Fuzzy membership tuning for the clutter classifier
    pub parameters_uz: MembershipParams,
    pub parameters_vel: MembershipParams,
    pub parameters_text_phidp: MembershipParams,
    pub parameters_rhv: MembershipParams,
    pub parameters_text_uz: MembershipParams,
    pub parameters_clutter_map: MembershipParams,

    /// Smallest PDP processing window in bins
    pub min_window: usize,
    /// Nodata used for all physical fields
    pub nodata: f64,
    /// Reflectivity below this is never treated as clutter (dBZ)
    pub min_dbz: f64,
    /// Clutter quality below this removes the cell
    pub quality_threshold: f64,
    /// Reflectivity below this is discarded before processing (dBZ)
    pub preprocess_z_threshold: f64,

    pub residual_min_z_clutter_threshold: f64,
    pub residual_clutter_nodata: f64,
    pub residual_clutter_mask_nodata: f64,
    pub residual_threshold_z: f64,
    pub residual_threshold_texture: f64,
    pub residual_filter_bin_size: usize,
    pub residual_filter_ray_size: usize,
    pub residual_clutter_texture_filtering_max_z: f64,
    pub min_z_medfilter_threshold: f64,

    /// PDP texture above this is dropped before unfolding
    pub processing_texture_threshold: f64,
    /// Primary PDP range window (km)
    pub pdp_r_win1: f64,
    /// Fallback PDP range window (km) used when the filtered PDP exceeds `threshold_phidp`
    pub pdp_r_win2: f64,
    pub pdp_nr_iterations: usize,
    pub kdp_up: f64,
    pub kdp_down: f64,
    pub kdp_std_threshold: f64,
    /// Z-PHI exponent
    pub bb: f64,
    pub threshold_phidp: f64,

    pub min_attenuation_mask_rhohv: f64,
    pub min_attenuation_mask_kdp: f64,
    pub min_attenuation_mask_th: f64,
    pub attenuation_gamma_h: f64,
    pub attenuation_alpha: f64,
    pub attenuation_pia_min_z: f64,

    /// Melting layer bottom height (km)
    pub melting_layer_bottom_height: f64,
    /// Maximum age of an observed melting layer height (hours)
    pub melting_layer_hour_threshold: i64,

    /// Negate PHIDP before processing
    pub invert_phidp: bool,

    pub requested_fields: RequestedFields,
}

impl Default for RadarOptions {
    fn default() -> Self {
        Self {
            name: String::new(),
            parameters_uz: MembershipParams::new(0.0, 30.0, 90.0, 62.0, 20.0),
            parameters_vel: MembershipParams::new(0.3, -0.9, 0.9, 0.15, 0.15),
            parameters_text_phidp: MembershipParams::new(0.8, 15.0, 40.0, 5.0, 40.0),
            parameters_rhv: MembershipParams::new(0.2, 0.0, 0.6, 0.0, 0.1),
            parameters_text_uz: MembershipParams::new(0.3, 20.0, 60.0, 5.0, 10.0),
            parameters_clutter_map: MembershipParams::new(0.9, 5.0, 70.0, 20.0, 60.0),
            min_window: 11,
            nodata: -999.0,
            min_dbz: -32.0,
            quality_threshold: 0.75,
            preprocess_z_threshold: -20.0,
            residual_min_z_clutter_threshold: -31.5,
            residual_clutter_nodata: -999.0,
            residual_clutter_mask_nodata: -1.0,
            residual_threshold_z: -20.0,
            residual_threshold_texture: 20.0,
            residual_filter_bin_size: 1,
            residual_filter_ray_size: 1,
            residual_clutter_texture_filtering_max_z: 70.0,
            min_z_medfilter_threshold: -30.0,
            processing_texture_threshold: 10.0,
            pdp_r_win1: 3.5,
            pdp_r_win2: 1.5,
            pdp_nr_iterations: 2,
            kdp_up: 20.0,
            kdp_down: -2.0,
            kdp_std_threshold: 5.0,
            bb: 0.7987,
            threshold_phidp: 40.0,
            min_attenuation_mask_rhohv: 0.8,
            min_attenuation_mask_kdp: 0.001,
            min_attenuation_mask_th: -20.0,
            attenuation_gamma_h: 0.08,
            attenuation_alpha: 0.2,
            attenuation_pia_min_z: -30.0,
            melting_layer_bottom_height: 2.463,
            melting_layer_hour_threshold: 6,
            invert_phidp: true,
            requested_fields: RequestedFields::DBZH_CORR
                | RequestedFields::ATT_DBZH_CORR
                | RequestedFields::PHIDP_CORR
                | RequestedFields::QUALITY_RESIDUAL_CLUTTER_MASK,
        }
    }
}

impl RadarOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Apply the KDP limits of a band
    pub fn apply_band(&mut self, band: Band) {
        let (up, down, std) = band.kdp_limits();
        self.kdp_up = up;
        self.kdp_down = down;
        self.kdp_std_threshold = std;
    }

    /// Apply the KDP limits of a band given by its letter code (s, c or x)
    pub fn set_band(&mut self, code: char) -> PpcResult<()> {
        let band = Band::try_from(code)?;
        self.apply_band(band);
        Ok(())
    }

    pub fn set_min_window(&mut self, window: i64) -> PpcResult<()> {
        if window <= 0 {
            return Err(PpcError::invalid_argument(format!(
                "minWindow must be positive, got {}",
                window
            )));
        }
        self.min_window = window as usize;
        Ok(())
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> PpcResult<()> {
        if self.min_window == 0 {
            return Err(PpcError::invalid_argument("minWindow must be positive"));
        }
        if self.residual_filter_bin_size == 0 || self.residual_filter_ray_size == 0 {
            return Err(PpcError::invalid_argument(
                "residual filter window sizes must be positive",
            ));
        }
        if self.pdp_r_win1 <= 0.0 || self.pdp_r_win2 <= 0.0 {
            return Err(PpcError::invalid_argument("PDP range windows must be positive"));
        }
        let weight_sum: f64 = self.membership_params().iter().map(|p| p.weight).sum();
        if weight_sum == 0.0 {
            return Err(PpcError::invalid_argument(
                "clutter membership weights sum to zero",
            ));
        }
        Ok(())
    }

    /// Membership tuning in classifier input order: Z, VRADH, PHIDP texture,
    /// RHOHV, Z texture, clutter map
    pub fn membership_params(&self) -> [MembershipParams; 6] {
        [
            self.parameters_uz,
            self.parameters_vel,
            self.parameters_text_phidp,
            self.parameters_rhv,
            self.parameters_text_uz,
            self.parameters_clutter_map,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RadarOptions::default();
        assert_eq!(options.min_window, 11);
        assert_eq!(options.parameters_uz.to_array(), [0.0, 30.0, 90.0, 62.0, 20.0]);
        assert_eq!(options.parameters_clutter_map.weight, 0.9);
        assert_eq!(options.melting_layer_hour_threshold, 6);
        assert!(options.requested_fields.contains(RequestedFields::PHIDP_CORR));
        assert!(!options.requested_fields.contains(RequestedFields::TH_CORR));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_set_band() {
        let mut options = RadarOptions::default();
        options.set_band('s').unwrap();
        assert_eq!((options.kdp_up, options.kdp_down, options.kdp_std_threshold), (14.0, -2.0, 5.0));
        options.set_band('x').unwrap();
        assert_eq!(options.kdp_up, 40.0);
        options.set_band('c').unwrap();
        assert_eq!(options.kdp_up, 20.0);
    }

    #[test]
    fn test_set_band_rejects_unknown() {
        let mut options = RadarOptions::default();
        let result = options.set_band('k');
        assert!(matches!(result, Err(PpcError::InvalidArgument(_))));
        assert_eq!(options.kdp_up, 20.0);
    }

    #[test]
    fn test_min_window_must_be_positive() {
        let mut options = RadarOptions::default();
        assert!(options.set_min_window(0).is_err());
        assert!(options.set_min_window(-3).is_err());
        options.set_min_window(5).unwrap();
        assert_eq!(options.min_window, 5);
    }

    #[test]
    fn test_requested_fields_union() {
        let mut fields = RequestedFields::KDP_CORR;
        fields |= RequestedFields::ZPHI_CORR;
        assert!(fields.contains(RequestedFields::KDP_CORR | RequestedFields::ZPHI_CORR));
        assert!(!fields.intersects(RequestedFields::TH_CORR));
        assert_eq!(fields.bits(), (1 << 4) | (1 << 8));
    }

    #[test]
    fn test_requested_fields_parse() {
        let fields: RequestedFields = "TH_CORR | q_attenuation".parse().unwrap();
        assert_eq!(fields, RequestedFields::TH_CORR | RequestedFields::QUALITY_ATTENUATION);
        let numeric: RequestedFields = "513".parse().unwrap();
        assert_eq!(
            numeric,
            RequestedFields::TH_CORR | RequestedFields::QUALITY_RESIDUAL_CLUTTER_MASK
        );
        assert!("NOT_A_FIELD".parse::<RequestedFields>().is_err());
        assert_eq!(fields.to_string(), "TH_CORR|Q_ATTENUATION");
    }
}
