//! Project specification model.
//!
//! - `types` - ProjectSpec, FeatureRequest, DataSource, Language
//! - `stage` - pipeline stages, their order and lexical classification
//! - `loader` - YAML spec files

pub mod loader;
pub mod stage;
pub mod types;

pub use stage::StageKind;
pub use types::{DataSource, FeatureRequest, Language, ProjectSpec};
