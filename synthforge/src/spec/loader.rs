//! YAML project spec files.
//!
//! Features may be plain strings, detailed maps, or stage sections:
//!
//! ```yaml
//! name: mmm-marketing-analytics
//! tech_stack:
//!   language: Python 3.13
//! features:
//!   - stage: data pipeline
//!     features:
//!       - Kaggle API integration for automatic dataset download
//!       - description: "Custom Keras layer: AdstockLayer"
//!         exports: [AdstockLayer]
//!   - Comprehensive test coverage
//! output_path: output/mmm-marketing-analytics
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::PreconditionError;
use crate::spec::stage::StageKind;
use crate::spec::types::{DataSource, FeatureRequest, ProjectSpec};

#[derive(Debug, Deserialize)]
struct SpecFile {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    tech_stack: BTreeMap<String, String>,
    #[serde(default)]
    features: Vec<FeatureEntry>,
    #[serde(default)]
    data_source: Option<DataSource>,
    output_path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureEntry {
    Section {
        stage: String,
        features: Vec<FeatureItem>,
    },
    Item(FeatureItem),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureItem {
    Text(String),
    Detailed(DetailedFeature),
}

#[derive(Debug, Deserialize)]
struct DetailedFeature {
    description: String,
    #[serde(default)]
    stage: Option<String>,
    #[serde(default)]
    path: Option<PathBuf>,
    #[serde(default)]
    exports: Vec<String>,
    #[serde(default)]
    consumes: Vec<String>,
    #[serde(default)]
    checks: Vec<String>,
    #[serde(default)]
    optional: bool,
}

impl FeatureItem {
    fn into_request(
        self,
        order: usize,
        section: Option<StageKind>,
    ) -> Result<FeatureRequest, PreconditionError> {
        let mut request = match self {
            FeatureItem::Text(description) => FeatureRequest::new(description, order),
            FeatureItem::Detailed(detail) => {
                let stage = detail.stage.as_deref().map(str::parse).transpose()?;
                FeatureRequest {
                    description: detail.description,
                    stage,
                    order,
                    path: detail.path,
                    exports: detail.exports,
                    consumes: detail.consumes,
                    checks: detail.checks,
                    optional: detail.optional,
                }
            }
        };
        // A per-feature stage overrides the section it sits in
        if request.stage.is_none() {
            request.stage = section;
        }
        Ok(request)
    }
}

impl ProjectSpec {
    /// Parse a spec from YAML text. Relative paths are kept as written.
    pub fn from_yaml_str(yaml: &str) -> Result<ProjectSpec, PreconditionError> {
        let file: SpecFile = serde_yaml::from_str(yaml)
            .map_err(|e| PreconditionError::InvalidSpec(format!("YAML parsing error: {}", e)))?;

        let mut features = Vec::new();
        for entry in file.features {
            match entry {
                FeatureEntry::Section { stage, features: items } => {
                    let stage: StageKind = stage.parse()?;
                    for item in items {
                        let order = features.len();
                        features.push(item.into_request(order, Some(stage))?);
                    }
                }
                FeatureEntry::Item(item) => {
                    let order = features.len();
                    features.push(item.into_request(order, None)?);
                }
            }
        }

        Ok(ProjectSpec {
            name: file.name,
            description: file.description.trim().to_string(),
            tech_stack: file.tech_stack,
            features,
            data_source: file.data_source,
            output_path: file.output_path,
        })
    }

    /// Load a spec file; a relative `output_path` resolves against the file's directory.
    pub fn load(path: &Path) -> Result<ProjectSpec> {
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read project spec: {}", path.display()))?;
        let mut spec = Self::from_yaml_str(&yaml)
            .with_context(|| format!("Invalid project spec: {}", path.display()))?;

        if spec.output_path.is_relative() {
            if let Some(dir) = path.parent() {
                spec.output_path = dir.join(&spec.output_path);
            }
        }
        Ok(spec)
    }
}
