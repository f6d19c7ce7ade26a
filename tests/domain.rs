use assert_matches::assert_matches;

use mebold_curate::domain::BidsName;
use mebold_curate::error::CurateError;

#[test]
fn renders_back_unchanged() {
    let raw = "sub-01_ses-1_task-rest_acq-MBME_run-1_echo-3_bold.nii.gz";
    let name: BidsName = raw.parse().unwrap();
    assert_eq!(name.to_string(), raw);
    assert_eq!(name.entities().len(), 6);
}

#[test]
fn phase_becomes_part_phase_bold() {
    let name: BidsName = "sub-01_ses-1_task-rest_acq-MBME_echo-1_phase.json"
        .parse()
        .unwrap();
    let renamed = name.with_entity("part", "phase").with_suffix("bold");
    assert_eq!(
        renamed.to_string(),
        "sub-01_ses-1_task-rest_acq-MBME_echo-1_part-phase_bold.json"
    );
}

#[test]
fn fieldmap_copy_drops_echo() {
    let name: BidsName = "sub-01_ses-1_acq-MESE_dir-AP_run-1_echo-1_sbref.nii.gz"
        .parse()
        .unwrap();
    let target = name.without_entity("echo").with_suffix("epi");
    assert_eq!(
        target.to_string(),
        "sub-01_ses-1_acq-MESE_dir-AP_run-1_epi.nii.gz"
    );
    assert!(name.acq_starts_with("ME"));
    assert!(!name.acq_starts_with("MBME"));
}

#[test]
fn existing_entity_keeps_position() {
    let name: BidsName = "sub-01_part-phase_echo-2_bold.nii".parse().unwrap();
    assert_eq!(
        name.with_entity("part", "mag").to_string(),
        "sub-01_part-mag_echo-2_bold.nii"
    );
}

#[test]
fn scans_file_name_parses() {
    let name: BidsName = "sub-01_ses-1_scans.tsv".parse().unwrap();
    assert_eq!(name.suffix(), "scans");
    assert!(!name.is_image());
}

#[test]
fn rejects_non_bids_names() {
    for raw in ["dataset_description.json", "README", "sub-01_ses-1_.nii.gz", "bold.nii.gz"] {
        let err = raw.parse::<BidsName>().unwrap_err();
        assert_matches!(err, CurateError::InvalidFilename(_));
    }
}
