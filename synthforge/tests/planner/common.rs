//! Common test utilities for planner tests

use std::path::{Path, PathBuf};
use synthforge::planner::{plan, PlannerConfig, TaskGraph};
use synthforge::spec::ProjectSpec;

/// The bundled MMM analytics spec
pub fn demo_spec_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../demos/mmm-analytics.yaml")
}

/// The demo spec, writing into `output` instead of its own output path
pub fn demo_spec(output: &Path) -> ProjectSpec {
    let mut spec = ProjectSpec::load(&demo_spec_path()).unwrap();
    spec.output_path = output.to_path_buf();
    spec
}

pub fn demo_graph(output: &Path) -> TaskGraph {
    plan(&demo_spec(output), &PlannerConfig::default()).unwrap()
}
