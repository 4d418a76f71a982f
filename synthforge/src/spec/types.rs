//! Project specification types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use crate::error::PreconditionError;
use crate::spec::stage::StageKind;

/// Immutable description of the project to build
#[derive(Debug, Clone)]
pub struct ProjectSpec {
    /// Project name, also a directory component
    pub name: String,

    /// Free-text description passed to every synthesis call
    pub description: String,

    /// Role -> tool declarations (e.g. `language: Python 3.13`)
    pub tech_stack: BTreeMap<String, String>,

    /// Features in insertion order
    pub features: Vec<FeatureRequest>,

    /// External dataset the data pipeline should ingest
    pub data_source: Option<DataSource>,

    /// Root of the generated project
    pub output_path: PathBuf,
}

/// One natural-language feature request
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRequest {
    pub description: String,

    /// Stage declared by the spec's section structure
    pub stage: Option<StageKind>,

    /// Position in the spec, used as a tie-break
    pub order: usize,

    /// Explicit output path, relative to the project root
    pub path: Option<PathBuf>,

    /// Identifiers the artifact must define
    pub exports: Vec<String>,

    /// Identifiers this feature needs from the previous stage
    pub consumes: Vec<String>,

    /// Self-contained test snippets appended to the artifact for behavior checks
    pub checks: Vec<String>,

    /// Non-critical: dependents proceed even if this feature fails
    pub optional: bool,
}

impl FeatureRequest {
    pub fn new(description: impl Into<String>, order: usize) -> Self {
        Self {
            description: description.into(),
            stage: None,
            order,
            path: None,
            exports: Vec::new(),
            consumes: Vec::new(),
            checks: Vec::new(),
            optional: false,
        }
    }

    pub fn in_stage(mut self, stage: StageKind) -> Self {
        self.stage = Some(stage);
        self
    }

    pub fn at_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Reference to the dataset a build ingests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    /// Dataset identifier, e.g. `owner/dataset-name`
    pub dataset: String,

    /// Credentials file the generated code should read at runtime
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<PathBuf>,
}

/// Target language of the generated project
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    TypeScript,
    JavaScript,
    Rust,
    Go,
}

impl Language {
    pub fn extension(self) -> &'static str {
        match self {
            Language::Python => "py",
            Language::TypeScript => "ts",
            Language::JavaScript => "js",
            Language::Rust => "rs",
            Language::Go => "go",
        }
    }

    /// Name used in prompts and code fences
    pub fn name(self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::TypeScript => "typescript",
            Language::JavaScript => "javascript",
            Language::Rust => "rust",
            Language::Go => "go",
        }
    }

    fn detect(text: &str) -> Option<Language> {
        let text = text.to_lowercase();
        if text.contains("python") {
            Some(Language::Python)
        } else if text.contains("typescript") {
            Some(Language::TypeScript)
        } else if text.contains("javascript") || text.contains("node") {
            Some(Language::JavaScript)
        } else if text.contains("rust") {
            Some(Language::Rust)
        } else if text.contains("golang") || text.split_whitespace().any(|w| w == "go") {
            Some(Language::Go)
        } else {
            None
        }
    }
}

impl ProjectSpec {
    pub fn new(name: impl Into<String>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tech_stack: BTreeMap::new(),
            features: Vec::new(),
            data_source: None,
            output_path: output_path.into(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tech(mut self, role: impl Into<String>, tool: impl Into<String>) -> Self {
        self.tech_stack.insert(role.into(), tool.into());
        self
    }

    /// Append a feature, assigning the next insertion order
    pub fn with_feature(mut self, mut feature: FeatureRequest) -> Self {
        feature.order = self.features.len();
        self.features.push(feature);
        self
    }

    pub fn with_data_source(mut self, data_source: DataSource) -> Self {
        self.data_source = Some(data_source);
        self
    }

    /// Target language: the `language` role first, then any tech-stack entry.
    pub fn language(&self) -> Language {
        let declared = self
            .tech_stack
            .iter()
            .find(|(role, _)| role.eq_ignore_ascii_case("language"))
            .and_then(|(_, tool)| Language::detect(tool));

        declared
            .or_else(|| self.tech_stack.values().find_map(|tool| Language::detect(tool)))
            .unwrap_or(Language::Python)
    }

    /// Check the invariants a build relies on before planning
    pub fn validate(&self) -> Result<(), PreconditionError> {
        let name = self.name.trim();
        if name.is_empty() {
            return Err(PreconditionError::InvalidSpec(
                "project name is empty".to_string(),
            ));
        }
        if name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(PreconditionError::InvalidSpec(format!(
                "project name '{}' is not a valid directory name",
                self.name
            )));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(PreconditionError::InvalidSpec(
                "output path is empty".to_string(),
            ));
        }
        if let Some(feature) = self.features.iter().find(|f| f.description.trim().is_empty()) {
            return Err(PreconditionError::InvalidSpec(format!(
                "feature #{} has an empty description",
                feature.order + 1
            )));
        }
        if let Some(feature) = self
            .features
            .iter()
            .find(|f| f.path.as_deref().is_some_and(escapes_root))
        {
            return Err(PreconditionError::InvalidSpec(format!(
                "feature #{} has an output path outside the project root",
                feature.order + 1
            )));
        }
        Ok(())
    }
}

fn escapes_root(path: &Path) -> bool {
    path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
}
