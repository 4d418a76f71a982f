//! Built-in syntax checks.
//!
//! Data formats are parsed with their serde parsers. Source files go through
//! a structural scanner: delimiters must balance outside strings and
//! comments, no markdown fences may be left over, and Python block headers
//! must be followed by an indented body.

use regex::Regex;
use std::sync::OnceLock;

/// Comment and string conventions of a language family
#[derive(Debug, Clone, Copy)]
struct Lexicon {
    line_comments: &'static [&'static str],
    block_comment: Option<(&'static str, &'static str)>,
    nested_blocks: bool,
    quotes: &'static [char],
    /// Quotes that may span lines
    multiline_quotes: &'static [char],
    triple_quotes: bool,
    rust_literals: bool,
}

const PYTHON: Lexicon = Lexicon {
    line_comments: &["#"],
    block_comment: None,
    nested_blocks: false,
    quotes: &['"', '\''],
    multiline_quotes: &[],
    triple_quotes: true,
    rust_literals: false,
};

const C_LIKE: Lexicon = Lexicon {
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    nested_blocks: false,
    quotes: &['"', '\'', '`'],
    multiline_quotes: &['`'],
    triple_quotes: false,
    rust_literals: false,
};

const RUST: Lexicon = Lexicon {
    line_comments: &["//"],
    block_comment: Some(("/*", "*/")),
    nested_blocks: true,
    quotes: &['"'],
    multiline_quotes: &['"'],
    triple_quotes: false,
    rust_literals: true,
};

const SHELL: Lexicon = Lexicon {
    line_comments: &["#"],
    block_comment: None,
    nested_blocks: false,
    quotes: &['"', '\''],
    multiline_quotes: &['"', '\''],
    triple_quotes: false,
    rust_literals: false,
};

/// Check `content` as a file with extension `ext`.
pub fn check_syntax(content: &str, ext: &str) -> Result<(), String> {
    match ext {
        "json" => serde_json::from_str::<serde_json::Value>(content)
            .map(|_| ())
            .map_err(|e| format!("invalid JSON: {}", e)),
        "yaml" | "yml" => serde_yaml::from_str::<serde_yaml::Value>(content)
            .map(|_| ())
            .map_err(|e| format!("invalid YAML: {}", e)),
        "md" | "markdown" | "txt" | "rst" => {
            if content.trim().is_empty() {
                Err("document is empty".to_string())
            } else {
                Ok(())
            }
        }
        "py" => {
            check_source(content, PYTHON)?;
            check_python_blocks(content)
        }
        "rs" => check_source(content, RUST),
        "sh" | "bash" => check_source(content, SHELL),
        _ => check_source(content, C_LIKE),
    }
}

fn check_source(content: &str, lexicon: Lexicon) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("file is empty".to_string());
    }
    if let Some(n) = content
        .lines()
        .position(|l| l.trim_start().starts_with("```"))
    {
        return Err(format!("leftover markdown fence on line {}", n + 1));
    }
    Scanner::new(content, lexicon).run()
}

enum State {
    Code,
    LineComment,
    BlockComment { depth: usize, line: usize },
    Str { quote: char, triple: bool, line: usize },
    RawStr { hashes: usize, line: usize },
}

struct Scanner {
    chars: Vec<char>,
    lexicon: Lexicon,
}

impl Scanner {
    fn new(content: &str, lexicon: Lexicon) -> Self {
        Self {
            chars: content.chars().collect(),
            lexicon,
        }
    }

    fn at(&self, i: usize, pat: &str) -> bool {
        pat.chars()
            .enumerate()
            .all(|(k, c)| self.chars.get(i + k) == Some(&c))
    }

    fn run(&self) -> Result<(), String> {
        let lx = self.lexicon;
        let mut stack: Vec<(char, usize)> = Vec::new();
        let mut state = State::Code;
        let mut line = 1usize;
        let mut i = 0usize;

        while i < self.chars.len() {
            let c = self.chars[i];
            if c == '\n' {
                line += 1;
            }

            match state {
                State::LineComment => {
                    if c == '\n' {
                        state = State::Code;
                    }
                    i += 1;
                }
                State::BlockComment { depth, line: start } => {
                    let (open, close) = lx.block_comment.unwrap_or(("/*", "*/"));
                    if self.at(i, close) {
                        i += close.len();
                        state = if depth > 1 {
                            State::BlockComment { depth: depth - 1, line: start }
                        } else {
                            State::Code
                        };
                    } else if lx.nested_blocks && self.at(i, open) {
                        i += open.len();
                        state = State::BlockComment { depth: depth + 1, line: start };
                    } else {
                        i += 1;
                    }
                }
                State::Str { quote, triple, line: start } => {
                    if c == '\\' {
                        if self.chars.get(i + 1) == Some(&'\n') {
                            line += 1;
                        }
                        i += 2;
                    } else if triple && self.at(i, &quote.to_string().repeat(3)) {
                        i += 3;
                        state = State::Code;
                    } else if !triple && c == quote {
                        i += 1;
                        state = State::Code;
                    } else if c == '\n' && !triple && !lx.multiline_quotes.contains(&quote) {
                        return Err(format!("unterminated string on line {}", start));
                    } else {
                        i += 1;
                    }
                }
                State::RawStr { hashes, line: start } => {
                    let close = format!("\"{}", "#".repeat(hashes));
                    if self.at(i, &close) {
                        i += close.len();
                        state = State::Code;
                    } else {
                        i += 1;
                        state = State::RawStr { hashes, line: start };
                    }
                }
                State::Code => {
                    if let Some(comment) = lx.line_comments.iter().find(|p| self.at(i, p)) {
                        state = State::LineComment;
                        i += comment.len();
                        continue;
                    }
                    if let Some((open, _)) = lx.block_comment {
                        if self.at(i, open) {
                            state = State::BlockComment { depth: 1, line };
                            i += open.len();
                            continue;
                        }
                    }
                    if lx.rust_literals {
                        if let Some(hashes) = self.raw_string_start(i) {
                            // r, hashes, opening quote
                            i += 2 + hashes;
                            state = State::RawStr { hashes, line };
                            continue;
                        }
                        if c == '\'' {
                            i += self.rust_char_len(i);
                            continue;
                        }
                    }
                    if lx.quotes.contains(&c) {
                        let triple = lx.triple_quotes && self.at(i, &c.to_string().repeat(3));
                        i += if triple { 3 } else { 1 };
                        state = State::Str { quote: c, triple, line };
                        continue;
                    }

                    match c {
                        '(' | '[' | '{' => stack.push((c, line)),
                        ')' | ']' | '}' => {
                            let expected = match c {
                                ')' => '(',
                                ']' => '[',
                                _ => '{',
                            };
                            match stack.pop() {
                                Some((open, _)) if open == expected => {}
                                Some((open, opened)) => {
                                    return Err(format!(
                                        "mismatched '{}' on line {} (opened '{}' on line {})",
                                        c, line, open, opened
                                    ))
                                }
                                None => return Err(format!("unmatched '{}' on line {}", c, line)),
                            }
                        }
                        _ => {}
                    }
                    i += 1;
                }
            }
        }

        match state {
            State::Str { line, .. } | State::RawStr { line, .. } => {
                return Err(format!("unterminated string starting on line {}", line))
            }
            State::BlockComment { line, .. } => {
                return Err(format!("unterminated block comment starting on line {}", line))
            }
            State::Code | State::LineComment => {}
        }

        match stack.last() {
            Some((open, opened)) => Err(format!("unclosed '{}' from line {}", open, opened)),
            None => Ok(()),
        }
    }

    /// `r"`, `r#"`, `br##"` ...: number of hashes when a raw string starts at `i`.
    fn raw_string_start(&self, i: usize) -> Option<usize> {
        if self.chars.get(i) != Some(&'r') {
            return None;
        }
        let prev = i.checked_sub(1).and_then(|p| self.chars.get(p));
        if prev.is_some_and(|p| (p.is_alphanumeric() || *p == '_') && *p != 'b') {
            return None;
        }
        let hashes = self.chars[i + 1..].iter().take_while(|c| **c == '#').count();
        (self.chars.get(i + 1 + hashes) == Some(&'"')).then_some(hashes)
    }

    /// Length of a char literal at `i`, or 1 for a lifetime tick.
    fn rust_char_len(&self, i: usize) -> usize {
        match (self.chars.get(i + 1), self.chars.get(i + 2)) {
            (Some('\\'), _) => self
                .chars
                .get(i + 3..)
                .and_then(|rest| rest.iter().position(|c| *c == '\''))
                .map(|p| p + 4)
                .unwrap_or(1),
            (Some(_), Some('\'')) => 3,
            _ => 1,
        }
    }
}

/// Block headers must be followed by a more indented line.
fn check_python_blocks(content: &str) -> Result<(), String> {
    static HEADER: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(header) = HEADER
        .get_or_init(|| {
            Regex::new(
                r"^(async\s+def|def|class|if|elif|else|for|async\s+for|while|try|except|finally|with|async\s+with)\b.*:$",
            )
            .ok()
        })
        .as_ref()
    else {
        return Ok(());
    };

    let lines: Vec<&str> = content.lines().collect();
    let mut in_triple: Option<&str> = None;

    for (n, raw) in lines.iter().enumerate() {
        // Skip docstring bodies
        if let Some(delim) = in_triple {
            if raw.matches(delim).count() % 2 == 1 {
                in_triple = None;
            }
            continue;
        }
        for delim in ["\"\"\"", "'''"] {
            if raw.matches(delim).count() % 2 == 1 {
                in_triple = Some(delim);
            }
        }
        if in_triple.is_some() {
            continue;
        }

        let stripped = raw.trim_start();
        if !header.is_match(strip_python_comment(stripped).trim_end()) {
            continue;
        }
        let indent = raw.len() - stripped.len();
        let body = lines[n + 1..]
            .iter()
            .find(|l| !l.trim().is_empty() && !l.trim_start().starts_with('#'));

        match body {
            Some(next) if next.len() - next.trim_start().len() > indent => {}
            _ => {
                return Err(format!(
                    "expected an indented block after line {}",
                    n + 1
                ))
            }
        }
    }
    Ok(())
}

/// `line` up to its `#` comment, ignoring `#` inside string literals.
fn strip_python_comment(line: &str) -> &str {
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match quote {
            Some(_) if escaped => escaped = false,
            Some(_) if c == '\\' => escaped = true,
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '"' || c == '\'' => quote = Some(c),
            None if c == '#' => return &line[..i],
            None => {}
        }
    }
    line
}
