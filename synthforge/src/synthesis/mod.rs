//! Synthesis client: one generative call per task attempt.
//!
//! The coordinator only sees the [`Synthesizer`] trait. [`SynthesisClient`]
//! is the production implementation over a [`GenerativeBackend`]; tests
//! swap in deterministic stubs at either seam.

pub mod anthropic;
pub mod backend;
pub mod prompt;
pub mod response;

pub use anthropic::AnthropicBackend;
pub use backend::{BackendError, CompletionRequest, CompletionResponse, GenerativeBackend, StopReason};

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::TaskError;
use crate::planner::{TaskId, TaskNode};
use crate::spec::{DataSource, Language, ProjectSpec};
use response::Extraction;

/// Project-level context shared by every synthesis call of a build
#[derive(Debug, Clone)]
pub struct ProjectBrief {
    pub name: String,
    pub description: String,
    pub tech_stack: BTreeMap<String, String>,
    pub data_source: Option<DataSource>,
    pub language: Language,
}

impl ProjectBrief {
    pub fn from_spec(spec: &ProjectSpec) -> Self {
        Self {
            name: spec.name.clone(),
            description: spec.description.clone(),
            tech_stack: spec.tech_stack.clone(),
            data_source: spec.data_source.clone(),
            language: spec.language(),
        }
    }
}

/// A committed predecessor artifact, by reference
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactRef {
    pub task_id: TaskId,
    pub path: PathBuf,
    pub exports: Vec<String>,
}

/// A non-critical predecessor that failed
#[derive(Debug, Clone, PartialEq)]
pub struct DegradedRef {
    pub task_id: TaskId,
    pub path: PathBuf,
}

/// Everything one synthesis attempt may see besides the task itself
#[derive(Debug, Clone)]
pub struct SynthesisContext {
    pub project: Arc<ProjectBrief>,
    pub target_path: PathBuf,
    pub predecessors: Vec<ArtifactRef>,
    pub degraded: Vec<DegradedRef>,

    /// Rejection reasons from earlier attempts, oldest first
    pub feedback: Vec<String>,

    /// 1-based attempt number
    pub attempt: u32,
}

impl SynthesisContext {
    pub fn new(project: Arc<ProjectBrief>, task: &TaskNode) -> Self {
        Self {
            project,
            target_path: task.output_path.clone(),
            predecessors: Vec::new(),
            degraded: Vec::new(),
            feedback: Vec::new(),
            attempt: 1,
        }
    }

    pub fn for_task(spec: &ProjectSpec, task: &TaskNode) -> Self {
        Self::new(Arc::new(ProjectBrief::from_spec(spec)), task)
    }

    /// Extension of the target file, lowercased
    pub fn extension(&self) -> String {
        self.target_path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default()
    }
}

/// Classification of one synthesis call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisOutcome {
    /// Artifact body ready for validation
    Usable(String),
    /// The call succeeded but produced nothing acceptable
    Unusable(String),
    BackendUnavailable(String),
    BackendRejected(String),
}

impl SynthesisOutcome {
    pub fn into_result(self) -> Result<String, TaskError> {
        match self {
            SynthesisOutcome::Usable(body) => Ok(body),
            SynthesisOutcome::Unusable(reason) => Err(TaskError::Unusable(reason)),
            SynthesisOutcome::BackendUnavailable(reason) => {
                Err(TaskError::BackendUnavailable(reason))
            }
            SynthesisOutcome::BackendRejected(reason) => Err(TaskError::BackendRejected(reason)),
        }
    }
}

impl From<BackendError> for SynthesisOutcome {
    fn from(err: BackendError) -> Self {
        if err.is_rejection() {
            SynthesisOutcome::BackendRejected(err.to_string())
        } else {
            SynthesisOutcome::BackendUnavailable(err.to_string())
        }
    }
}

/// Produces one artifact candidate per call
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&self, task: &TaskNode, context: &SynthesisContext) -> SynthesisOutcome;
}

/// Size limits applied to every call
#[derive(Debug, Clone)]
pub struct SynthesisLimits {
    pub model: String,
    pub max_output_tokens: u32,
    pub max_response_bytes: usize,
}

impl Default for SynthesisLimits {
    fn default() -> Self {
        Self {
            model: anthropic::DEFAULT_MODEL.to_string(),
            max_output_tokens: 8192,
            max_response_bytes: 256 * 1024,
        }
    }
}

/// [`Synthesizer`] over a generative backend
pub struct SynthesisClient<B> {
    backend: B,
    limits: SynthesisLimits,
}

impl<B: GenerativeBackend> SynthesisClient<B> {
    pub fn new(backend: B, limits: SynthesisLimits) -> Self {
        Self { backend, limits }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Turn a raw completion into an outcome.
    pub fn classify(&self, response: CompletionResponse, extension: &str) -> SynthesisOutcome {
        match response.stop_reason {
            StopReason::MaxTokens => {
                return SynthesisOutcome::Unusable(format!(
                    "response truncated at {} output tokens",
                    self.limits.max_output_tokens
                ))
            }
            StopReason::Refusal => {
                return SynthesisOutcome::Unusable("backend refused the request".to_string())
            }
            _ => {}
        }

        if response.text.len() > self.limits.max_response_bytes {
            return SynthesisOutcome::Unusable(format!(
                "response of {} bytes exceeds the {} byte limit",
                response.text.len(),
                self.limits.max_response_bytes
            ));
        }
        if response::looks_like_refusal(&response.text) {
            return SynthesisOutcome::Unusable("response declines the task".to_string());
        }

        match response::extract_artifact(&response.text, extension) {
            Extraction::Body(body) => SynthesisOutcome::Usable(body),
            Extraction::Empty => SynthesisOutcome::Unusable("empty response".to_string()),
            Extraction::Unterminated => {
                SynthesisOutcome::Unusable("unterminated code block".to_string())
            }
            Extraction::Prose => {
                SynthesisOutcome::Unusable("no code block in response".to_string())
            }
        }
    }
}

#[async_trait]
impl<B: GenerativeBackend> Synthesizer for SynthesisClient<B> {
    async fn synthesize(&self, task: &TaskNode, context: &SynthesisContext) -> SynthesisOutcome {
        let request = CompletionRequest {
            model: self.limits.model.clone(),
            system: prompt::system_prompt(context),
            prompt: prompt::task_prompt(task, context),
            max_output_tokens: self.limits.max_output_tokens,
        };

        debug!(
            task = %task.id,
            attempt = context.attempt,
            prompt_bytes = request.prompt.len(),
            "Requesting synthesis"
        );

        match self.backend.complete(request).await {
            Ok(response) => {
                let outcome = self.classify(response, &context.extension());
                if let SynthesisOutcome::Unusable(reason) = &outcome {
                    warn!(task = %task.id, attempt = context.attempt, "Unusable response: {}", reason);
                }
                outcome
            }
            Err(err) => {
                warn!(task = %task.id, attempt = context.attempt, "Backend error: {}", err);
                err.into()
            }
        }
    }
}
