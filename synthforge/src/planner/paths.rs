//! Output path derivation for planned tasks.

use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::spec::{Language, StageKind};

/// Words dropped from slugs
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "the", "for", "with", "of", "to", "in", "on", "all", "via", "by", "from",
];

const MAX_SLUG_WORDS: usize = 4;

/// Split `"Label: value"` features; the label must be short and the value non-empty.
pub fn split_label(description: &str) -> Option<(&str, &str)> {
    let (label, value) = description.split_once(':')?;
    let label = label.trim();
    let value = value.trim();
    if label.is_empty() || value.is_empty() || label.split_whitespace().count() > 6 {
        return None;
    }
    // URLs are not labels
    if value.starts_with("//") {
        return None;
    }
    Some((label, value))
}

/// File-name stem derived from a feature description.
///
/// The labelled part wins for `"Label: value"` features; parentheticals are
/// dropped and CamelCase identifiers split into snake case.
pub fn slugify(description: &str) -> String {
    let text = match split_label(description) {
        Some((_, value)) => value,
        None => description,
    };
    let text = strip_parentheticals(text);
    let text = camel_to_snake(&text);

    let words: Vec<String> = text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .map(str::to_ascii_lowercase)
        .filter(|w| !w.is_empty() && !STOPWORDS.contains(&w.as_str()))
        .take(MAX_SLUG_WORDS)
        .collect();

    if words.is_empty() {
        "module".to_string()
    } else {
        words.join("_")
    }
}

/// Default path for a task whose first feature is `lead`.
pub fn default_path(stage: StageKind, lead: &str, language: Language) -> PathBuf {
    let slug = slugify(lead);

    if stage == StageKind::TestsDocs {
        let lower = lead.to_lowercase();
        if lower.contains("readme") {
            return PathBuf::from("README.md");
        }
        if is_documentation(&lower) {
            return PathBuf::from("docs").join(format!("{}.md", slug));
        }
        let stem = slug.strip_prefix("test_").unwrap_or(&slug);
        return PathBuf::from(stage.source_dir())
            .join(format!("test_{}.{}", stem, language.extension()));
    }

    PathBuf::from(stage.source_dir()).join(format!("{}.{}", slug, language.extension()))
}

/// Append `_2`, `_3`, ... to the file stem until `taken` rejects nothing.
pub fn disambiguate(path: PathBuf, taken: impl Fn(&PathBuf) -> bool) -> PathBuf {
    if !taken(&path) {
        return path;
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = path.extension().map(|e| e.to_string_lossy().into_owned());

    let mut n = 2;
    loop {
        let name = match &ext {
            Some(ext) => format!("{}_{}.{}", stem, n, ext),
            None => format!("{}_{}", stem, n),
        };
        let candidate = path.with_file_name(name);
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// CamelCase identifiers mentioned in free text (`AdstockLayer`, `HillSaturationLayer`).
pub fn camel_case_identifiers(text: &str) -> Vec<String> {
    static CAMEL: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = CAMEL
        .get_or_init(|| Regex::new(r"\b[A-Z][A-Za-z0-9]*[a-z][A-Za-z0-9]*[A-Z][A-Za-z0-9]*\b").ok())
        .as_ref()
    else {
        return Vec::new();
    };

    let mut found: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        let ident = m.as_str().to_string();
        if !found.contains(&ident) {
            found.push(ident);
        }
    }
    found
}

/// Component names a feature asks for by name.
///
/// Only the value of a `"Label: value"` description names components; prose
/// mentions are too often library or product names. Identifiers naming a
/// declared tool (`tools`, lowercased) are skipped.
pub fn component_identifiers(description: &str, tools: &[String]) -> Vec<String> {
    let Some((_, value)) = split_label(description) else {
        return Vec::new();
    };
    camel_case_identifiers(value)
        .into_iter()
        .filter(|ident| {
            let lower = ident.to_lowercase();
            !tools.iter().any(|tool| tool.contains(&lower))
        })
        .collect()
}

fn is_documentation(lower: &str) -> bool {
    ["documentation", "docs", "guide", "docstring", "reference", "citation", "tutorial"]
        .iter()
        .any(|k| lower.contains(k))
}

fn strip_parentheticals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut depth = 0usize;
    for c in text.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    out
}

fn camel_to_snake(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 8);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            if prev.is_ascii_lowercase() || (prev.is_ascii_uppercase() && next_lower) {
                out.push('_');
            }
        }
        out.push(c);
    }
    out
}
