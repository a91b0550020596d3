use crate::core::fuzzy::MembershipParams;
use crate::core::options::{Band, RadarOptions};
use crate::types::{PpcError, PpcResult};
use quick_xml::de::from_str;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

/// Name of the profile used when a radar has no profile of its own
pub const DEFAULT_PROFILE: &str = "default";

/// Root of an options document. All `<radaroptions>` elements must be
/// adjacent.
#[derive(Debug, Deserialize)]
struct OptionsDocument {
    #[serde(rename = "radaroptions", default)]
    profiles: Vec<ProfileXml>,
}

/// `<field value="..."/>`
#[derive(Debug, Clone, Deserialize)]
struct ValueXml {
    #[serde(rename = "@value")]
    value: String,
}

/// One `<radaroptions>` element. Every field is optional; present fields
/// override the base profile.
#[derive(Debug, Clone, Deserialize)]
struct ProfileXml {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "@uses", default)]
    uses: Option<String>,

    band: Option<ValueXml>,

    #[serde(rename = "parametersUZ")]
    parameters_uz: Option<ValueXml>,
    #[serde(rename = "parametersVEL")]
    parameters_vel: Option<ValueXml>,
    #[serde(rename = "parametersTEXT_PHIDP")]
    parameters_text_phidp: Option<ValueXml>,
    #[serde(rename = "parametersRHV")]
    parameters_rhv: Option<ValueXml>,
    #[serde(rename = "parametersTEXT_UZ")]
    parameters_text_uz: Option<ValueXml>,
    #[serde(rename = "parametersCLUTTER_MAP")]
    parameters_clutter_map: Option<ValueXml>,

    #[serde(rename = "minWindow")]
    min_window: Option<ValueXml>,
    nodata: Option<ValueXml>,
    #[serde(rename = "minDBZ")]
    min_dbz: Option<ValueXml>,
    #[serde(rename = "qualityThreshold")]
    quality_threshold: Option<ValueXml>,
    #[serde(rename = "preprocessZThreshold")]
    preprocess_z_threshold: Option<ValueXml>,

    #[serde(rename = "residualMinZClutterThreshold")]
    residual_min_z_clutter_threshold: Option<ValueXml>,
    #[serde(rename = "residualClutterNodata")]
    residual_clutter_nodata: Option<ValueXml>,
    #[serde(rename = "residualClutterMaskNodata")]
    residual_clutter_mask_nodata: Option<ValueXml>,
    #[serde(rename = "residualThresholdZ")]
    residual_threshold_z: Option<ValueXml>,
    #[serde(rename = "residualThresholdTexture")]
    residual_threshold_texture: Option<ValueXml>,
    #[serde(rename = "residualFilterBinSize")]
    residual_filter_bin_size: Option<ValueXml>,
    #[serde(rename = "residualFilterRaySize")]
    residual_filter_ray_size: Option<ValueXml>,
    #[serde(rename = "residualClutterTextureFilteringMaxZ")]
    residual_clutter_texture_filtering_max_z: Option<ValueXml>,
    #[serde(rename = "minZMedfilterThreshold")]
    min_z_medfilter_threshold: Option<ValueXml>,

    #[serde(rename = "processingTextureThreshold")]
    processing_texture_threshold: Option<ValueXml>,
    #[serde(rename = "pdpRWin1")]
    pdp_r_win1: Option<ValueXml>,
    #[serde(rename = "pdpRWin2")]
    pdp_r_win2: Option<ValueXml>,
    #[serde(rename = "pdpNrIterations")]
    pdp_nr_iterations: Option<ValueXml>,
    #[serde(rename = "kdpUp")]
    kdp_up: Option<ValueXml>,
    #[serde(rename = "kdpDown")]
    kdp_down: Option<ValueXml>,
    #[serde(rename = "kdpStdThreshold")]
    kdp_std_threshold: Option<ValueXml>,
    #[serde(rename = "BB")]
    bb: Option<ValueXml>,
    #[serde(rename = "thresholdPhidp")]
    threshold_phidp: Option<ValueXml>,

    #[serde(rename = "minAttenuationMaskRHOHV")]
    min_attenuation_mask_rhohv: Option<ValueXml>,
    #[serde(rename = "minAttenuationMaskKDP")]
    min_attenuation_mask_kdp: Option<ValueXml>,
    #[serde(rename = "minAttenuationMaskTH")]
    min_attenuation_mask_th: Option<ValueXml>,
    #[serde(rename = "attenuationGammaH")]
    attenuation_gamma_h: Option<ValueXml>,
    #[serde(rename = "attenuationAlpha")]
    attenuation_alpha: Option<ValueXml>,
    #[serde(rename = "attenuationPIAminZ")]
    attenuation_pia_min_z: Option<ValueXml>,

    #[serde(rename = "meltingLayerBottomHeight")]
    melting_layer_bottom_height: Option<ValueXml>,
    #[serde(rename = "meltingLayerHourThreshold")]
    melting_layer_hour_threshold: Option<ValueXml>,

    #[serde(rename = "invertPhidp")]
    invert_phidp: Option<ValueXml>,
    #[serde(rename = "requestedFields")]
    requested_fields: Option<ValueXml>,
}

impl ProfileXml {
    /// Overlay the fields present in this profile on `base`
    fn apply(&self, base: RadarOptions) -> PpcResult<RadarOptions> {
        let mut o = base;
        o.name = self.name.clone();
        let profile = self.name.as_str();

        // band first so explicit KDP limits below win
        if let Some(band) = &self.band {
            let band: Band = band.value.parse().map_err(|e| {
                PpcError::config(format!("profile '{}': band: {}", profile, e))
            })?;
            o.apply_band(band);
        }

        assign_params(&mut o.parameters_uz, &self.parameters_uz, "parametersUZ", profile)?;
        assign_params(&mut o.parameters_vel, &self.parameters_vel, "parametersVEL", profile)?;
        assign_params(&mut o.parameters_text_phidp, &self.parameters_text_phidp, "parametersTEXT_PHIDP", profile)?;
        assign_params(&mut o.parameters_rhv, &self.parameters_rhv, "parametersRHV", profile)?;
        assign_params(&mut o.parameters_text_uz, &self.parameters_text_uz, "parametersTEXT_UZ", profile)?;
        assign_params(&mut o.parameters_clutter_map, &self.parameters_clutter_map, "parametersCLUTTER_MAP", profile)?;

        assign(&mut o.min_window, &self.min_window, "minWindow", profile)?;
        assign(&mut o.nodata, &self.nodata, "nodata", profile)?;
        assign(&mut o.min_dbz, &self.min_dbz, "minDBZ", profile)?;
        assign(&mut o.quality_threshold, &self.quality_threshold, "qualityThreshold", profile)?;
        assign(&mut o.preprocess_z_threshold, &self.preprocess_z_threshold, "preprocessZThreshold", profile)?;

        assign(&mut o.residual_min_z_clutter_threshold, &self.residual_min_z_clutter_threshold, "residualMinZClutterThreshold", profile)?;
        assign(&mut o.residual_clutter_nodata, &self.residual_clutter_nodata, "residualClutterNodata", profile)?;
        assign(&mut o.residual_clutter_mask_nodata, &self.residual_clutter_mask_nodata, "residualClutterMaskNodata", profile)?;
        assign(&mut o.residual_threshold_z, &self.residual_threshold_z, "residualThresholdZ", profile)?;
        assign(&mut o.residual_threshold_texture, &self.residual_threshold_texture, "residualThresholdTexture", profile)?;
        assign(&mut o.residual_filter_bin_size, &self.residual_filter_bin_size, "residualFilterBinSize", profile)?;
        assign(&mut o.residual_filter_ray_size, &self.residual_filter_ray_size, "residualFilterRaySize", profile)?;
        assign(&mut o.residual_clutter_texture_filtering_max_z, &self.residual_clutter_texture_filtering_max_z, "residualClutterTextureFilteringMaxZ", profile)?;
        assign(&mut o.min_z_medfilter_threshold, &self.min_z_medfilter_threshold, "minZMedfilterThreshold", profile)?;

        assign(&mut o.processing_texture_threshold, &self.processing_texture_threshold, "processingTextureThreshold", profile)?;
        assign(&mut o.pdp_r_win1, &self.pdp_r_win1, "pdpRWin1", profile)?;
        assign(&mut o.pdp_r_win2, &self.pdp_r_win2, "pdpRWin2", profile)?;
        assign(&mut o.pdp_nr_iterations, &self.pdp_nr_iterations, "pdpNrIterations", profile)?;
        assign(&mut o.kdp_up, &self.kdp_up, "kdpUp", profile)?;
        assign(&mut o.kdp_down, &self.kdp_down, "kdpDown", profile)?;
        assign(&mut o.kdp_std_threshold, &self.kdp_std_threshold, "kdpStdThreshold", profile)?;
        assign(&mut o.bb, &self.bb, "BB", profile)?;
        assign(&mut o.threshold_phidp, &self.threshold_phidp, "thresholdPhidp", profile)?;

        assign(&mut o.min_attenuation_mask_rhohv, &self.min_attenuation_mask_rhohv, "minAttenuationMaskRHOHV", profile)?;
        assign(&mut o.min_attenuation_mask_kdp, &self.min_attenuation_mask_kdp, "minAttenuationMaskKDP", profile)?;
        assign(&mut o.min_attenuation_mask_th, &self.min_attenuation_mask_th, "minAttenuationMaskTH", profile)?;
        assign(&mut o.attenuation_gamma_h, &self.attenuation_gamma_h, "attenuationGammaH", profile)?;
        assign(&mut o.attenuation_alpha, &self.attenuation_alpha, "attenuationAlpha", profile)?;
        assign(&mut o.attenuation_pia_min_z, &self.attenuation_pia_min_z, "attenuationPIAminZ", profile)?;

        assign(&mut o.melting_layer_bottom_height, &self.melting_layer_bottom_height, "meltingLayerBottomHeight", profile)?;
        assign(&mut o.melting_layer_hour_threshold, &self.melting_layer_hour_threshold, "meltingLayerHourThreshold", profile)?;

        assign(&mut o.invert_phidp, &self.invert_phidp, "invertPhidp", profile)?;
        assign(&mut o.requested_fields, &self.requested_fields, "requestedFields", profile)?;

        o.validate()
            .map_err(|e| PpcError::config(format!("profile '{}': {}", profile, e)))?;
        Ok(o)
    }
}

fn assign<T>(target: &mut T, field: &Option<ValueXml>, name: &str, profile: &str) -> PpcResult<()>
where
    T: FromStr,
    T::Err: Display,
{
    if let Some(field) = field {
        *target = field.value.trim().parse().map_err(|e| {
            PpcError::config(format!(
                "profile '{}': invalid {} '{}': {}",
                profile, name, field.value, e
            ))
        })?;
    }
    Ok(())
}

fn assign_params(
    target: &mut MembershipParams,
    field: &Option<ValueXml>,
    name: &str,
    profile: &str,
) -> PpcResult<()> {
    if let Some(field) = field {
        let values = field
            .value
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|e| {
                PpcError::config(format!(
                    "profile '{}': invalid {} '{}': {}",
                    profile, name, field.value, e
                ))
            })?;
        *target = MembershipParams::from_slice(&values).map_err(|e| {
            PpcError::config(format!("profile '{}': {}: {}", profile, name, e))
        })?;
    }
    Ok(())
}

/// Named radar option profiles with their inheritance resolved
#[derive(Debug, Clone, Default)]
pub struct OptionsRepository {
    profiles: HashMap<String, RadarOptions>,
}

impl OptionsRepository {
    /// An empty repository; every lookup falls back to backup defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and resolve an options document from disk
    pub fn load<P: AsRef<Path>>(path: P) -> PpcResult<Self> {
        let path = path.as_ref();
        log::info!("Loading radar options from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_xml_str(&text)
    }

    /// Load options, falling back to an empty repository if the document
    /// cannot be loaded
    pub fn load_or_backup<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(repository) => repository,
            Err(e) => {
                log::error!(
                    "Failed to load radar options from {}: {}; using backup defaults",
                    path.display(),
                    e
                );
                Self::new()
            }
        }
    }

    pub fn from_xml_str(xml: &str) -> PpcResult<Self> {
        let document = from_str::<OptionsDocument>(xml)
            .map_err(|e| PpcError::XmlParsing(format!("Failed to parse options XML: {}", e)))?;
        let profiles = resolve_profiles(document.profiles)?;
        log::info!("Loaded {} radar option profiles", profiles.len());
        Ok(Self { profiles })
    }

    pub fn exists(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn get_radar_options(&self, name: &str) -> PpcResult<RadarOptions> {
        self.profiles
            .get(name)
            .cloned()
            .ok_or_else(|| PpcError::UnknownProfile(name.to_string()))
    }

    /// Options for a radar node: its own profile, else the default profile,
    /// else the backup defaults
    pub fn options_for_radar(&self, node: &str) -> RadarOptions {
        if let Some(options) = self.profiles.get(node) {
            return options.clone();
        }
        if let Some(options) = self.profiles.get(DEFAULT_PROFILE) {
            log::debug!("No profile for {}, using '{}'", node, DEFAULT_PROFILE);
            return options.clone();
        }
        log::debug!("No profile for {} and no default profile, using backup defaults", node);
        RadarOptions::default()
    }

    /// Profile names in sorted order
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.profiles.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

/// Index all profiles, then resolve each against its base. Profiles without
/// `uses` start from the backup defaults.
fn resolve_profiles(profiles: Vec<ProfileXml>) -> PpcResult<HashMap<String, RadarOptions>> {
    let mut declared: HashMap<String, ProfileXml> = HashMap::new();
    for profile in profiles {
        if declared.contains_key(&profile.name) {
            return Err(PpcError::config(format!(
                "duplicate profile '{}'",
                profile.name
            )));
        }
        declared.insert(profile.name.clone(), profile);
    }

    let mut resolved = HashMap::new();
    let mut names: Vec<&String> = declared.keys().collect();
    names.sort();
    for name in names {
        let mut chain = Vec::new();
        resolve_profile(name, &declared, &mut resolved, &mut chain)?;
    }
    Ok(resolved)
}

fn resolve_profile(
    name: &str,
    declared: &HashMap<String, ProfileXml>,
    resolved: &mut HashMap<String, RadarOptions>,
    chain: &mut Vec<String>,
) -> PpcResult<RadarOptions> {
    if let Some(options) = resolved.get(name) {
        return Ok(options.clone());
    }
    if chain.iter().any(|n| n == name) {
        let mut cycle = chain.clone();
        cycle.push(name.to_string());
        return Err(PpcError::CyclicInheritance(cycle.join(" -> ")));
    }
    let profile = declared
        .get(name)
        .ok_or_else(|| PpcError::UnknownProfile(name.to_string()))?;

    chain.push(name.to_string());
    let base = match &profile.uses {
        Some(base) => {
            if !declared.contains_key(base) {
                return Err(PpcError::MissingBase {
                    profile: name.to_string(),
                    base: base.clone(),
                });
            }
            resolve_profile(base, declared, resolved, chain)?
        }
        None => RadarOptions::default(),
    };
    chain.pop();

    let options = profile.apply(base)?;
    log::debug!(
        "Resolved profile '{}'{}",
        name,
        profile
            .uses
            .as_ref()
            .map(|b| format!(" from '{}'", b))
            .unwrap_or_default()
    );
    resolved.insert(name.to_string(), options.clone());
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::options::RequestedFields;

    const DOCUMENT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ppc-options>
  <radaroptions name="default">
    <minWindow value="5"/>
    <kdpUp value="30"/>
    <parametersUZ value="0.1, 31.0, 91.0, 63.0, 21.0"/>
  </radaroptions>
  <radaroptions name="sekrn" uses="default">
    <kdpUp value="40"/>
    <requestedFields value="TH_CORR|Q_RESIDUAL_CLUTTER_MASK"/>
  </radaroptions>
  <radaroptions name="sella" uses="sekrn">
    <band value="s"/>
  </radaroptions>
  <radaroptions name="standalone">
    <nodata value="-1000"/>
  </radaroptions>
</ppc-options>
"#;

    #[test]
    fn test_inheritance() {
        let repository = OptionsRepository::from_xml_str(DOCUMENT).unwrap();
        assert_eq!(repository.len(), 4);

        let default = repository.get_radar_options("default").unwrap();
        assert_eq!(default.min_window, 5);
        assert_eq!(default.kdp_up, 30.0);
        assert_eq!(default.parameters_uz.to_array(), [0.1, 31.0, 91.0, 63.0, 21.0]);

        let sekrn = repository.get_radar_options("sekrn").unwrap();
        assert_eq!(sekrn.name, "sekrn");
        assert_eq!(sekrn.min_window, 5);
        assert_eq!(sekrn.kdp_up, 40.0);
        assert_eq!(
            sekrn.requested_fields,
            RequestedFields::TH_CORR | RequestedFields::QUALITY_RESIDUAL_CLUTTER_MASK
        );

        let sella = repository.get_radar_options("sella").unwrap();
        assert_eq!(sella.kdp_up, 14.0);
        assert_eq!(sella.min_window, 5);
        assert_eq!(sella.requested_fields, sekrn.requested_fields);
    }

    #[test]
    fn test_profile_without_uses_starts_from_backup_defaults() {
        let repository = OptionsRepository::from_xml_str(DOCUMENT).unwrap();
        let standalone = repository.get_radar_options("standalone").unwrap();
        assert_eq!(standalone.nodata, -1000.0);
        assert_eq!(standalone.min_window, 11);
        assert_eq!(standalone.kdp_up, 20.0);
    }

    #[test]
    fn test_missing_base_fails_load() {
        let xml = r#"<ppc-options>
  <radaroptions name="orphan" uses="nosuch"><kdpUp value="1"/></radaroptions>
</ppc-options>"#;
        let result = OptionsRepository::from_xml_str(xml);
        assert!(matches!(result, Err(PpcError::MissingBase { .. })));
    }

    #[test]
    fn test_cycle_fails_load() {
        let xml = r#"<ppc-options>
  <radaroptions name="a" uses="b"/>
  <radaroptions name="b" uses="a"/>
</ppc-options>"#;
        let result = OptionsRepository::from_xml_str(xml);
        assert!(matches!(result, Err(PpcError::CyclicInheritance(_))));
    }

    #[test]
    fn test_invalid_values_fail_load() {
        let bad_number = r#"<ppc-options>
  <radaroptions name="default"><kdpUp value="fast"/></radaroptions>
</ppc-options>"#;
        assert!(matches!(
            OptionsRepository::from_xml_str(bad_number),
            Err(PpcError::Config(_))
        ));

        let short_vector = r#"<ppc-options>
  <radaroptions name="default"><parametersVEL value="1,2,3"/></radaroptions>
</ppc-options>"#;
        assert!(OptionsRepository::from_xml_str(short_vector).is_err());

        let zero_window = r#"<ppc-options>
  <radaroptions name="default"><minWindow value="0"/></radaroptions>
</ppc-options>"#;
        assert!(OptionsRepository::from_xml_str(zero_window).is_err());

        let bad_band = r#"<ppc-options>
  <radaroptions name="default"><band value="k"/></radaroptions>
</ppc-options>"#;
        assert!(OptionsRepository::from_xml_str(bad_band).is_err());
    }

    #[test]
    fn test_lookup() {
        let repository = OptionsRepository::from_xml_str(DOCUMENT).unwrap();
        assert!(repository.exists("sekrn"));
        assert!(!repository.exists("nosuch"));
        assert!(matches!(
            repository.get_radar_options("nosuch"),
            Err(PpcError::UnknownProfile(_))
        ));
        assert_eq!(repository.options_for_radar("sekrn").kdp_up, 40.0);
        assert_eq!(repository.options_for_radar("seosu").name, "default");
        assert_eq!(OptionsRepository::new().options_for_radar("seosu"), RadarOptions::default());
    }
}
