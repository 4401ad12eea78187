pub mod external;

use std::path::Path;

use regex::Regex;

use crate::config::Ruleset;
use crate::graph::NodeKind;

pub const EXTERNAL_CONFIDENCE: f32 = 0.9;
pub const PATTERN_CONFIDENCE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub kind: NodeKind,
    pub start_line: u32,
    pub end_line: u32,
    pub confidence: f32,
}

/// Symbol extraction capability, selected once per run by `probe` and used
/// for every deep-analyzed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    ExternalTool,
    Patterns,
}

impl Extractor {
    pub fn probe() -> Self {
        if external::probe() {
            Self::ExternalTool
        } else {
            Self::Patterns
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ExternalTool => "ctags",
            Self::Patterns => "pattern fallback",
        }
    }

    pub fn confidence(self) -> f32 {
        match self {
            Self::ExternalTool => EXTERNAL_CONFIDENCE,
            Self::Patterns => PATTERN_CONFIDENCE,
        }
    }

    /// A failed external call yields no symbols for that file; the
    /// capability choice itself is never revisited mid-run.
    pub fn extract(self, path: &Path, lines: &[String], lang: &str, rules: &Ruleset) -> Vec<Symbol> {
        match self {
            Self::ExternalTool => external::extract_symbols(path),
            Self::Patterns => pattern_symbols(lines, lang, rules),
        }
    }
}

/// Import references with their line numbers. Block-style import syntax is
/// tracked with explicit enter/exit state; lines inside a block match the
/// block's inner pattern only.
pub fn extract_imports(lines: &[String], lang: &str, rules: &Ruleset) -> Vec<(String, u32)> {
    let patterns = rules.import_patterns(lang);
    let block = rules.block_import(lang);
    if patterns.is_empty() && block.is_none() {
        return Vec::new();
    }

    let mut results = Vec::new();
    let mut in_block = false;
    for (idx, line) in lines.iter().enumerate() {
        let lineno = (idx + 1) as u32;
        let stripped = line.trim();
        if let Some(block) = block {
            if !in_block && stripped == block.open {
                in_block = true;
                continue;
            }
            if in_block {
                if stripped == block.close {
                    in_block = false;
                } else if let Some(captures) = block.inner.captures(stripped)
                    && let Some(target) = captures.get(1)
                {
                    results.push((target.as_str().to_string(), lineno));
                }
                continue;
            }
        }
        for pattern in patterns {
            if let Some(captures) = pattern.captures(stripped)
                && let Some(target) = captures.get(1)
            {
                results.push((target.as_str().to_string(), lineno));
                break;
            }
        }
    }
    results
}

/// In-process fallback: per-language line patterns, first match per line,
/// deduped by (kind, name).
pub fn pattern_symbols(lines: &[String], lang: &str, rules: &Ruleset) -> Vec<Symbol> {
    let patterns = rules.symbol_patterns(lang);
    if patterns.is_empty() {
        return Vec::new();
    }

    let mut symbols = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for (idx, line) in lines.iter().enumerate() {
        let lineno = (idx + 1) as u32;
        for entry in patterns {
            if let Some(captures) = entry.pattern.captures(line)
                && let Some(name) = captures.get(1)
            {
                let key = (entry.kind, name.as_str().to_string());
                if seen.insert(key) {
                    symbols.push(Symbol {
                        name: name.as_str().to_string(),
                        kind: entry.kind,
                        start_line: lineno,
                        end_line: lineno,
                        confidence: PATTERN_CONFIDENCE,
                    });
                }
                break;
            }
        }
    }
    symbols
}

/// Line numbers containing a whole-word occurrence of `name`.
pub fn reference_lines(lines: &[String], name: &str) -> Vec<u32> {
    let Ok(pattern) = Regex::new(&format!(r"\b{}\b", regex::escape(name))) else {
        return Vec::new();
    };
    lines
        .iter()
        .enumerate()
        .filter(|(_, line)| pattern.is_match(line))
        .map(|(idx, _)| (idx + 1) as u32)
        .collect()
}
