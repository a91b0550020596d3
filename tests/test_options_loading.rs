use approx::assert_relative_eq;
use ppc::core::{Band, RadarOptions, RequestedFields};
use ppc::io::OptionsRepository;
use ppc::types::PpcError;
use std::io::Write;
use tempfile::NamedTempFile;

const OPTIONS_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ppc-options>
  <radaroptions name="default">
    <parametersUZ value="0.1,30.0,90.0,62.0,20.0"/>
    <parametersVEL value="0.3,-0.9,0.9,0.15,0.15"/>
    <minWindow value="11"/>
    <qualityThreshold value="0.8"/>
    <requestedFields value="TH_CORR|KDP_CORR|Q_ATTENUATION"/>
  </radaroptions>
  <radaroptions name="sehem" uses="default">
    <band value="x"/>
    <kdpStdThreshold value="4.0"/>
    <invertPhidp value="false"/>
  </radaroptions>
  <radaroptions name="sella" uses="sehem">
    <requestedFields value="273"/>
  </radaroptions>
</ppc-options>
"#;

fn write_options(xml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(xml.as_bytes()).expect("write options");
    file
}

#[test]
fn test_load_from_file() {
    let _ = env_logger::builder().is_test(true).try_init();
    let file = write_options(OPTIONS_XML);

    let repository = OptionsRepository::load(file.path()).expect("Failed to load options");
    assert_eq!(repository.names(), vec!["default", "sehem", "sella"]);

    let default = repository.get_radar_options("default").expect("default");
    assert_relative_eq!(default.parameters_uz.weight, 0.1);
    assert_relative_eq!(default.parameters_vel.lower, -0.9);
    assert_relative_eq!(default.quality_threshold, 0.8);
    assert_eq!(
        default.requested_fields,
        RequestedFields::TH_CORR | RequestedFields::KDP_CORR | RequestedFields::QUALITY_ATTENUATION
    );

    // Band preset first, explicit fields override it
    let sehem = repository.get_radar_options("sehem").expect("sehem");
    let (up, down, _) = Band::X.kdp_limits();
    assert_eq!(sehem.kdp_up, up);
    assert_eq!(sehem.kdp_down, down);
    assert_relative_eq!(sehem.kdp_std_threshold, 4.0);
    assert!(!sehem.invert_phidp);
    assert_eq!(sehem.quality_threshold, 0.8);

    let sella = repository.get_radar_options("sella").expect("sella");
    assert_eq!(
        sella.requested_fields,
        RequestedFields::TH_CORR | RequestedFields::KDP_CORR | RequestedFields::ZPHI_CORR
    );
    assert!(!sella.invert_phidp);
}

#[test]
fn test_load_or_backup_with_missing_file() {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("ppc_options.xml");

    assert!(matches!(OptionsRepository::load(&path), Err(PpcError::Io(_))));

    let repository = OptionsRepository::load_or_backup(&path);
    assert!(repository.is_empty());
    assert_eq!(repository.options_for_radar("sekrn"), RadarOptions::default());
}

#[test]
fn test_load_or_backup_with_broken_document() {
    let _ = env_logger::builder().is_test(true).try_init();
    let file = write_options(
        r#"<ppc-options>
  <radaroptions name="sekrn" uses="nosuch"/>
</ppc-options>"#,
    );

    assert!(OptionsRepository::load(file.path()).is_err());
    let repository = OptionsRepository::load_or_backup(file.path());
    assert!(repository.is_empty());
}

#[test]
fn test_requested_fields_text_forms() {
    let fields: RequestedFields = "TH_CORR|ZPHI_CORR".parse().expect("names");
    assert_eq!(fields.to_string(), "TH_CORR|ZPHI_CORR");
    assert_eq!(fields, "257".parse().expect("bits"));
    assert!("TH_CORR|BOGUS".parse::<RequestedFields>().is_err());
}
