//! Declared-interface conformance.

use regex::Regex;

use crate::planner::{Export, ExportKind};

/// Whether `content` contains a definition of `name`.
pub fn defines(content: &str, name: &str) -> bool {
    let name = regex::escape(name);
    let patterns = [
        // def/class/fn/struct/... NAME
        format!(
            r"(?m)^\s*(?:export\s+)?(?:default\s+)?(?:pub(?:\([^)]*\))?\s+)?(?:async\s+)?(?:def|class|fn|struct|enum|trait|type|interface|function|const|let|var|func|static|mod)\s+{}\b",
            name
        ),
        // NAME = ... / NAME: Type = ...
        format!(r"(?m)^\s*{}\s*(?::[^=\n]*)?=[^=]", name),
        // Go methods: func (r *T) NAME(
        format!(r"(?m)^func\s*\([^)]*\)\s*{}\s*\(", name),
    ];

    patterns.iter().any(|p| match Regex::new(p) {
        Ok(re) => re.is_match(content),
        Err(_) => false,
    })
}

/// Whether `content` mentions `name`, ignoring case.
pub fn references(content: &str, name: &str) -> bool {
    content.to_lowercase().contains(&name.to_lowercase())
}

/// Check every export requirement, collecting all misses.
pub fn check_interface(content: &str, exports: &[Export]) -> Result<(), String> {
    let mut missing_definitions = Vec::new();
    let mut missing_references = Vec::new();

    for export in exports {
        match export.kind {
            ExportKind::Defined if !defines(content, &export.name) => {
                missing_definitions.push(export.name.as_str())
            }
            ExportKind::Referenced if !references(content, &export.name) => {
                missing_references.push(export.name.as_str())
            }
            _ => {}
        }
    }

    let mut problems = Vec::new();
    if !missing_definitions.is_empty() {
        problems.push(format!("missing definition of {}", missing_definitions.join(", ")));
    }
    if !missing_references.is_empty() {
        problems.push(format!("missing reference to {}", missing_references.join(", ")));
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems.join("; "))
    }
}
