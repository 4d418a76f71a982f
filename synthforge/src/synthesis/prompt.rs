//! Prompt construction for task synthesis.

use std::fmt::Write as _;

use crate::planner::{ExportKind, TaskNode};
use crate::synthesis::SynthesisContext;

/// System prompt shared by every synthesis call
pub fn system_prompt(context: &SynthesisContext) -> String {
    format!(
        r#"You are a senior engineer generating one file of a multi-file {language} project.

Key instructions:
- Produce the complete contents of exactly one file: {path}
- Output a single fenced code block and nothing else
- Import from sibling modules by their project paths; do not redefine them
- Define every required identifier with exactly the given name
- No placeholders, no "rest of implementation" comments"#,
        language = context.project.language.name(),
        path = context.target_path.display(),
    )
}

/// User prompt for one attempt at `task`
pub fn task_prompt(task: &TaskNode, context: &SynthesisContext) -> String {
    let project = &context.project;
    let mut prompt = String::new();

    let _ = writeln!(prompt, "# Project: {}", project.name);
    if !project.description.is_empty() {
        let _ = writeln!(prompt, "\n{}", project.description);
    }

    if !project.tech_stack.is_empty() {
        let _ = writeln!(prompt, "\n## Tech stack");
        for (role, tool) in &project.tech_stack {
            let _ = writeln!(prompt, "- {}: {}", role, tool);
        }
    }

    if let Some(source) = &project.data_source {
        let _ = writeln!(prompt, "\n## Data source");
        let _ = writeln!(prompt, "- dataset: {}", source.dataset);
        if let Some(credentials) = &source.credentials {
            let _ = writeln!(prompt, "- credentials file: {}", credentials.display());
        }
    }

    let _ = writeln!(prompt, "\n## Task {} ({} stage)", task.id, task.stage);
    let _ = writeln!(prompt, "Target file: {}", context.target_path.display());
    let _ = writeln!(prompt, "\nImplement:\n{}", task.description);

    let defined: Vec<&str> = task.defined_exports().collect();
    if !defined.is_empty() {
        let _ = writeln!(prompt, "\nThe file must define: {}", defined.join(", "));
    }
    let referenced: Vec<&str> = task
        .exports
        .iter()
        .filter(|e| e.kind == ExportKind::Referenced)
        .map(|e| e.name.as_str())
        .collect();
    if !referenced.is_empty() {
        let _ = writeln!(prompt, "The file must use: {}", referenced.join(", "));
    }

    if !context.predecessors.is_empty() {
        let _ = writeln!(prompt, "\n## Available modules from earlier stages");
        for artifact in &context.predecessors {
            let _ = write!(prompt, "- {} ({})", artifact.path.display(), artifact.task_id);
            if !artifact.exports.is_empty() {
                let _ = write!(prompt, " provides {}", artifact.exports.join(", "));
            }
            prompt.push('\n');
        }
    }

    if !context.degraded.is_empty() {
        let _ = writeln!(prompt, "\n## Unavailable modules");
        let _ = writeln!(
            prompt,
            "These optional modules failed to generate; do not import them:"
        );
        for missing in &context.degraded {
            let _ = writeln!(prompt, "- {} ({})", missing.path.display(), missing.task_id);
        }
    }

    if !task.checks.is_empty() {
        let _ = writeln!(prompt, "\n## The file must pass these checks");
        for check in &task.checks {
            let _ = writeln!(prompt, "```\n{}\n```", check.trim_end());
        }
    }

    if !context.feedback.is_empty() {
        let _ = writeln!(
            prompt,
            "\n## Previous attempts were rejected (attempt {})",
            context.attempt
        );
        for reason in &context.feedback {
            let _ = writeln!(prompt, "- {}", reason);
        }
        let _ = writeln!(prompt, "Fix these problems in this attempt.");
    }

    prompt
}
