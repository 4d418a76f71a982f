//! Extracting an artifact body from a model response.

/// A fenced block: info-string tag plus body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fence<'a> {
    pub tag: &'a str,
    pub body: String,
}

/// Why a response yields no artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    Body(String),
    Unterminated,
    Prose,
    Empty,
}

/// Scan markdown code fences. An unclosed trailing fence is reported as `Err`.
pub fn fences(text: &str) -> Result<Vec<Fence<'_>>, Fence<'_>> {
    let mut found = Vec::new();
    let mut open: Option<(&str, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        match open.take() {
            None => {
                if let Some(tag) = trimmed.strip_prefix("```") {
                    open = Some((tag.trim(), Vec::new()));
                }
            }
            Some((tag, mut body)) => {
                if trimmed.trim_end() == "```" {
                    found.push(Fence {
                        tag,
                        body: body.join("\n"),
                    });
                } else {
                    body.push(line);
                    open = Some((tag, body));
                }
            }
        }
    }

    match open {
        Some((tag, body)) => Err(Fence {
            tag,
            body: body.join("\n"),
        }),
        None => Ok(found),
    }
}

/// Pull the artifact for a file with extension `ext` out of `text`.
///
/// Code targets take the first block tagged with the target language, else
/// the first block. Markdown and text targets only unwrap an explicit
/// `markdown` fence, since their content may contain fences of its own.
pub fn extract_artifact(text: &str, ext: &str) -> Extraction {
    let text = text.trim();
    if text.is_empty() {
        return Extraction::Empty;
    }

    let prose_target = matches!(ext, "md" | "markdown" | "txt" | "rst");
    let blocks = match fences(text) {
        Ok(blocks) => blocks,
        Err(_) if prose_target => return Extraction::Body(text.to_string()),
        Err(_) => return Extraction::Unterminated,
    };

    if prose_target {
        let wrapped = blocks
            .into_iter()
            .find(|f| matches!(f.tag, "markdown" | "md") && text.starts_with("```"));
        return Extraction::Body(match wrapped {
            Some(fence) => fence.body.trim().to_string(),
            None => text.to_string(),
        });
    }

    let aliases = tag_aliases(ext);
    let chosen = blocks
        .iter()
        .find(|f| aliases.contains(&f.tag.to_ascii_lowercase().as_str()))
        .or_else(|| blocks.first());

    match chosen {
        Some(fence) if fence.body.trim().is_empty() => Extraction::Empty,
        Some(fence) => Extraction::Body(format!("{}\n", fence.body.trim_end())),
        None if is_conversational(text) => Extraction::Prose,
        None => Extraction::Body(format!("{}\n", text)),
    }
}

/// Responses that decline the task instead of producing it.
pub fn looks_like_refusal(text: &str) -> bool {
    let head: String = text.trim_start().chars().take(80).collect::<String>().to_lowercase();
    [
        "i can't",
        "i cannot",
        "i can not",
        "i'm sorry",
        "i am sorry",
        "i'm unable",
        "i am unable",
        "i won't",
    ]
    .iter()
    .any(|opener| head.starts_with(opener))
}

fn is_conversational(text: &str) -> bool {
    let first = text.lines().next().unwrap_or_default().trim_start();
    ["Here ", "Here's", "Sure", "Certainly", "Below ", "I "]
        .iter()
        .any(|opener| first.starts_with(opener))
}

fn tag_aliases(ext: &str) -> &'static [&'static str] {
    match ext {
        "py" => &["python", "py", "python3"],
        "ts" => &["typescript", "ts"],
        "js" => &["javascript", "js"],
        "rs" => &["rust", "rs"],
        "go" => &["go", "golang"],
        "json" => &["json"],
        "yaml" | "yml" => &["yaml", "yml"],
        "toml" => &["toml"],
        "sh" => &["sh", "bash", "shell"],
        _ => &[],
    }
}
