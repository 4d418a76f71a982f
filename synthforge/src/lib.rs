// Command-line interface
pub mod cli;

// Build configuration
pub mod config;

// Build coordinator
pub mod coordinator;

// Error types
pub mod error;

// Task planner
pub mod planner;

// Progress reporting
pub mod progress;

// Project spec model
pub mod spec;

// Synthesis client and backends
pub mod synthesis;

// Artifact validation
pub mod validate;

pub use config::BuildConfig;
pub use coordinator::{BuildResult, Coordinator};
pub use error::{BuildError, PlanningError, PreconditionError, TaskError};
pub use spec::ProjectSpec;
