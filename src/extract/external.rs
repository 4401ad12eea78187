use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::graph::NodeKind;

use super::{EXTERNAL_CONFIDENCE, Symbol};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const EXTRACT_TIMEOUT: Duration = Duration::from_secs(15);
const WAIT_POLL: Duration = Duration::from_millis(10);

/// Capability probe: `ctags --version` must run and exit zero.
pub fn probe() -> bool {
    let Ok(child) = Command::new("ctags")
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    else {
        return false;
    };
    matches!(wait_with_timeout(child, PROBE_TIMEOUT), Some(true))
}

/// Structural symbols via ctags JSON output. Any failure (missing binary,
/// timeout, non-zero exit, unparseable line) degrades to an empty result
/// for this file; it never aborts the run.
pub fn extract_symbols(path: &Path) -> Vec<Symbol> {
    let Ok(child) = Command::new("ctags")
        .args(["--output-format=json", "--fields=+lKSn", "-f", "-"])
        .arg(path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    else {
        return Vec::new();
    };

    let Some(raw) = capture_with_timeout(child, EXTRACT_TIMEOUT) else {
        return Vec::new();
    };

    raw.lines()
        .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .filter_map(|entry| parse_entry(&entry))
        .collect()
}

/// Drains stdout on a reader thread while polling for exit, so output
/// larger than the OS pipe buffer cannot stall the child into the
/// timeout. `None` means timeout, spawn trouble, or non-zero exit.
fn capture_with_timeout(mut child: Child, timeout: Duration) -> Option<String> {
    let mut stdout = child.stdout.take()?;
    let reader = std::thread::spawn(move || {
        let mut raw = String::new();
        let _ = stdout.read_to_string(&mut raw);
        raw
    });

    let exited_ok = wait_with_timeout(child, timeout);
    // Kill-on-timeout closes the pipe, so the reader always finishes.
    let raw = reader.join().ok();
    if exited_ok != Some(true) {
        return None;
    }
    raw
}

fn wait_with_timeout(mut child: Child, timeout: Duration) -> Option<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status.success()),
            Ok(None) => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return None;
                }
                std::thread::sleep(WAIT_POLL);
            }
            Err(_) => return None,
        }
    }
}

fn parse_entry(entry: &Value) -> Option<Symbol> {
    let name = entry.get("name")?.as_str()?;
    if name.is_empty() {
        return None;
    }
    let kind = map_kind(entry.get("kind")?.as_str()?)?;
    let start_line = entry.get("line").and_then(Value::as_u64).unwrap_or(0) as u32;
    let end_line = entry
        .get("end")
        .and_then(Value::as_u64)
        .map(|end| end as u32)
        .unwrap_or(start_line);
    Some(Symbol {
        name: name.to_string(),
        kind,
        start_line,
        end_line,
        confidence: EXTERNAL_CONFIDENCE,
    })
}

fn map_kind(raw: &str) -> Option<NodeKind> {
    match raw.to_ascii_lowercase().as_str() {
        "class" | "struct" => Some(NodeKind::Class),
        "interface" | "trait" | "enum" | "type" | "typedef" => Some(NodeKind::Type),
        "method" => Some(NodeKind::Method),
        "module" | "namespace" | "package" => Some(NodeKind::Module),
        "function" | "func" | "subroutine" | "def" => Some(NodeKind::Function),
        _ => None,
    }
}
