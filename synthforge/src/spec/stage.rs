//! Pipeline stages and their total order.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PreconditionError;

/// A pipeline phase. Declaration order is the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    DataPipeline,
    Exploration,
    FeatureEngineering,
    ModelArchitecture,
    Training,
    Evaluation,
    RoiExtraction,
    Simulation,
    TestsDocs,
}

impl StageKind {
    pub const ALL: [StageKind; 9] = [
        StageKind::DataPipeline,
        StageKind::Exploration,
        StageKind::FeatureEngineering,
        StageKind::ModelArchitecture,
        StageKind::Training,
        StageKind::Evaluation,
        StageKind::RoiExtraction,
        StageKind::Simulation,
        StageKind::TestsDocs,
    ];

    /// Snake-case name, also used as the task id prefix
    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::DataPipeline => "data_pipeline",
            StageKind::Exploration => "exploration",
            StageKind::FeatureEngineering => "feature_engineering",
            StageKind::ModelArchitecture => "model_architecture",
            StageKind::Training => "training",
            StageKind::Evaluation => "evaluation",
            StageKind::RoiExtraction => "roi_extraction",
            StageKind::Simulation => "simulation",
            StageKind::TestsDocs => "tests_docs",
        }
    }

    /// Directory in the output tree holding this stage's source artifacts
    pub fn source_dir(self) -> &'static str {
        match self {
            StageKind::DataPipeline => "src/data",
            StageKind::Exploration => "src/eda",
            StageKind::FeatureEngineering => "src/features",
            StageKind::ModelArchitecture => "src/models",
            StageKind::Training => "src/training",
            StageKind::Evaluation => "src/evaluation",
            StageKind::RoiExtraction => "src/roi",
            StageKind::Simulation => "src/simulation",
            StageKind::TestsDocs => "tests",
        }
    }

    /// Earlier stages that must have at least one feature whenever this one does.
    pub fn requires(self) -> &'static [StageKind] {
        match self {
            StageKind::Exploration | StageKind::FeatureEngineering => &[StageKind::DataPipeline],
            StageKind::Training => &[StageKind::ModelArchitecture],
            StageKind::Evaluation | StageKind::RoiExtraction => &[StageKind::Training],
            StageKind::Simulation => &[StageKind::RoiExtraction],
            StageKind::DataPipeline | StageKind::ModelArchitecture | StageKind::TestsDocs => &[],
        }
    }

    /// Whether a failure in this stage blocks the stages after it.
    pub fn critical_by_default(self) -> bool {
        self != StageKind::TestsDocs
    }

    /// Lexical stage classification of a feature description.
    ///
    /// Stages are probed from the most specific vocabulary to the most
    /// generic; `None` means the text carries no stage signal.
    pub fn classify(text: &str) -> Option<StageKind> {
        let text = text.to_lowercase();
        CLASSIFIERS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
            .map(|(stage, _)| *stage)
    }
}

const CLASSIFIERS: &[(StageKind, &[&str])] = &[
    (
        StageKind::TestsDocs,
        &[
            "unit test", "integration test", "tests ", "pytest", "coverage", "docstring",
            "readme", "documentation", "user guide", "api reference", "citation", "pep8",
            "type hints",
        ],
    ),
    (
        StageKind::Simulation,
        &["simulat", "what-if", "scenario", "budget allocation", "sensitivity", "reallocation"],
    ),
    (
        StageKind::RoiExtraction,
        &[" roi", "marginal", "efficiency frontier", "saturation effect", "confidence interval"],
    ),
    (
        StageKind::Evaluation,
        &["evaluat", "residual", "prediction vs actual", "contribution", "feature importance"],
    ),
    (
        StageKind::Training,
        &[
            "training", "early stopping", "checkpoint", "learning rate", "loss", "epoch",
            "regularization",
        ],
    ),
    (
        StageKind::ModelArchitecture,
        &["layer", "architecture", "model subclass", "embedding", "network", "keras.model"],
    ),
    (
        StageKind::FeatureEngineering,
        &[
            "adstock", "saturation", "encoding", "lag feature", "rolling", "normalization",
            "elasticity", "feature engineering",
        ],
    ),
    (
        StageKind::Exploration,
        &["visualiz", "plot", "heatmap", "exploratory", "summary table", "decomposition"],
    ),
    (
        StageKind::DataPipeline,
        &["dataset", "download", "ingest", "preprocess", "cleaning", "parquet", "data validation", "split"],
    ),
];

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageKind::DataPipeline => "data pipeline",
            StageKind::Exploration => "exploration",
            StageKind::FeatureEngineering => "feature engineering",
            StageKind::ModelArchitecture => "model architecture",
            StageKind::Training => "training",
            StageKind::Evaluation => "evaluation",
            StageKind::RoiExtraction => "ROI extraction",
            StageKind::Simulation => "simulation",
            StageKind::TestsDocs => "tests & docs",
        };
        f.write_str(s)
    }
}

impl FromStr for StageKind {
    type Err = PreconditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .trim()
            .to_lowercase()
            .replace(['-', '_', '&', '/'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let stage = match normalized.as_str() {
            "data" | "data pipeline" | "data ingestion" | "ingestion" => StageKind::DataPipeline,
            "exploration" | "eda" | "exploratory data analysis" | "exploratory analysis" => {
                StageKind::Exploration
            }
            "features" | "feature engineering" => StageKind::FeatureEngineering,
            "model" | "model architecture" | "architecture" => StageKind::ModelArchitecture,
            "training" | "training optimization" | "training and optimization" => {
                StageKind::Training
            }
            "evaluation" | "model evaluation" => StageKind::Evaluation,
            "roi" | "roi extraction" | "roi curve estimation" | "roi curves" => {
                StageKind::RoiExtraction
            }
            "simulation" | "simulator" | "simulator optimization" | "simulator and optimization" => {
                StageKind::Simulation
            }
            "tests" | "docs" | "tests docs" | "testing" | "documentation"
            | "code quality testing" | "code quality and testing" => StageKind::TestsDocs,
            _ => return Err(PreconditionError::UnknownStage(s.to_string())),
        };
        Ok(stage)
    }
}
