use std::path::{Path, PathBuf};
use std::process::Command;

use walkdir::WalkDir;

use crate::config::Ruleset;

/// Tracked files via `git ls-files -z`. `None` signals the collaborator is
/// unavailable (no git, not a repository) and the caller should fall back
/// to a filesystem walk.
pub fn list_tracked(root: &Path) -> Option<Vec<PathBuf>> {
    let output = Command::new("git")
        .args(["ls-files", "-z"])
        .current_dir(root)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Some(
        stdout
            .split('\0')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| root.join(entry))
            .collect(),
    )
}

/// Files changed since a git reference, via `git diff --name-only REF`.
/// `None` signals failure; the caller falls back to a full scan.
pub fn changed_since(root: &Path, reference: &str) -> Option<Vec<PathBuf>> {
    let output = Command::new("git")
        .args(["diff", "--name-only", reference])
        .current_dir(root)
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Some(
        stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| root.join(line))
            .collect(),
    )
}

/// Filesystem enumeration fallback, pruning the skip-list directories.
pub fn walk_files(root: &Path, rules: &Ruleset) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            entry
                .file_name()
                .to_str()
                .map(|name| !rules.should_skip_dir(name))
                .unwrap_or(true)
        })
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect()
}

/// Candidate set for one indexing run: changed-since scoping when asked
/// (with full-scan fallback on failure), tracked listing otherwise, config
/// excludes applied uniformly. Warnings are returned for the caller to log.
pub fn candidate_files(
    root: &Path,
    rules: &Ruleset,
    since_ref: Option<&str>,
) -> (Vec<PathBuf>, Vec<String>) {
    let mut warnings = Vec::new();
    let mut files = match since_ref {
        Some(reference) => match changed_since(root, reference) {
            Some(changed) => changed,
            None => {
                warnings.push(format!(
                    "git diff failed for ref `{reference}`, falling back to full scan"
                ));
                full_scan(root, rules)
            }
        },
        None => full_scan(root, rules),
    };

    files.retain(|path| {
        if !path.is_file() {
            return false;
        }
        match path.strip_prefix(root) {
            Ok(rel) => !rules.is_excluded(rel),
            Err(_) => false,
        }
    });
    (files, warnings)
}

fn full_scan(root: &Path, rules: &Ruleset) -> Vec<PathBuf> {
    list_tracked(root).unwrap_or_else(|| walk_files(root, rules))
}
