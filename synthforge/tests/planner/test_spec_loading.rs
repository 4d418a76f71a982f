//! Tests for loading YAML project specs

use super::common::*;
use synthforge::error::PreconditionError;
use synthforge::spec::{Language, ProjectSpec, StageKind};

#[test]
fn test_demo_spec_loads() {
    let spec = ProjectSpec::load(&demo_spec_path()).unwrap();

    assert_eq!(spec.name, "mmm-marketing-analytics");
    assert!(spec.description.starts_with("Complete Marketing Mix Modeling"));
    assert_eq!(spec.language(), Language::Python);
    assert_eq!(spec.tech_stack.get("testing").map(String::as_str), Some("Pytest"));
    assert_eq!(spec.features.len(), 78);
    assert!(spec.validate().is_ok());

    let data = spec.data_source.as_ref().unwrap();
    assert_eq!(data.dataset, "subhagatoadak/mmm-weekly-data-geoindia");
}

#[test]
fn test_demo_output_is_relative_to_spec_file() {
    let spec = ProjectSpec::load(&demo_spec_path()).unwrap();
    let demos_dir = demo_spec_path().parent().unwrap().to_path_buf();

    assert!(spec.output_path.starts_with(&demos_dir));
    assert!(spec.output_path.ends_with("output/mmm-marketing-analytics"));
}

#[test]
fn test_sections_declare_stages() {
    let spec = ProjectSpec::load(&demo_spec_path()).unwrap();

    let first = &spec.features[0];
    assert_eq!(first.stage, Some(StageKind::DataPipeline));
    assert_eq!(first.exports, vec!["download_dataset".to_string()]);

    let docs = spec.features.last().unwrap();
    assert_eq!(docs.stage, Some(StageKind::TestsDocs));
    assert!(docs.description.starts_with("Configuration guide"));

    let report = spec
        .features
        .iter()
        .find(|f| f.description.starts_with("Interactive HTML report"))
        .unwrap();
    assert!(report.optional);
    assert_eq!(report.stage, Some(StageKind::Exploration));

    // Orders follow file position
    let orders: Vec<usize> = spec.features.iter().map(|f| f.order).collect();
    assert_eq!(orders, (0..spec.features.len()).collect::<Vec<_>>());
}

#[test]
fn test_missing_spec_file_has_context() {
    let err = ProjectSpec::load(std::path::Path::new("/nonexistent/spec.yaml")).unwrap_err();
    assert!(format!("{:#}", err).contains("/nonexistent/spec.yaml"));
}

#[test]
fn test_unknown_section_stage() {
    let err = ProjectSpec::from_yaml_str(
        r#"
name: demo
output_path: out
features:
  - stage: deployment
    features:
      - Ship it
"#,
    )
    .unwrap_err();
    assert!(matches!(err, PreconditionError::UnknownStage(stage) if stage == "deployment"));
}
