//! Runtime-error triage over captured run logs.
//!
//! Benchmark harness logs that mention an exception get their first
//! exception block extracted: the `java.*Exception: message` line plus
//! the indented `at ...` stack frames that follow it. The result is a
//! map from benchmark id to excerpt, persisted for manual triage of
//! generated benchmarks that crash at runtime.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use benchmix_error::{BenchmixError, Result};
use benchmix_types::artifact;
use regex::Regex;
use tracing::{debug, info};

const EXCEPTION_BLOCK: &str =
    r"(?m)^(java\.[\w.$]+(?:Exception|Error)):[ \t]+(.*)\n((?:[ \t]+at .+\n?)+)";

pub struct LogScanner {
    pattern: Regex,
}

impl LogScanner {
    /// # Errors
    ///
    /// Returns [`BenchmixError::Internal`] if the exception pattern
    /// fails to compile.
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(EXCEPTION_BLOCK).map_err(|error| {
            BenchmixError::internal(format!("exception pattern: {error}"))
        })?;
        Ok(Self { pattern })
    }

    /// Scans every `*.log` under `log_dir` (recursively) and maps each
    /// benchmark id to its first exception block.
    ///
    /// Logs that mention an exception but match no block are reported
    /// at debug level and left out of the map.
    ///
    /// # Errors
    ///
    /// Returns [`BenchmixError::Io`] when the directory walk fails.
    pub fn scan_dir(&self, log_dir: &Path) -> Result<BTreeMap<String, String>> {
        let mut logs = Vec::new();
        collect_logs(log_dir, &mut logs)?;
        logs.sort();

        let mut errors = BTreeMap::new();
        for log in &logs {
            let content = match std::fs::read_to_string(log) {
                Ok(content) => content,
                Err(source) => return Err(BenchmixError::io(log, source)),
            };
            if !content.to_lowercase().contains("exception") {
                continue;
            }
            let benchmark = log
                .strip_prefix(log_dir)
                .unwrap_or(log)
                .with_extension("")
                .to_string_lossy()
                .into_owned();
            match self.pattern.captures(&content) {
                Some(captures) => {
                    let exception_type = captures.get(1).map_or("", |m| m.as_str());
                    let stack_trace = captures.get(3).map_or("", |m| m.as_str());
                    errors.insert(
                        benchmark,
                        format!("Exception Type: {exception_type}\nStack Trace:\n{stack_trace}"),
                    );
                }
                None => {
                    debug!(log = %log.display(), "exception mentioned but no block matched");
                }
            }
        }
        info!(logs = logs.len(), with_errors = errors.len(), "log scan finished");
        Ok(errors)
    }
}

fn collect_logs(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|source| BenchmixError::io(dir, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| BenchmixError::io(dir, source))?;
        let path = entry.path();
        if path.is_dir() {
            collect_logs(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "log") {
            out.push(path);
        }
    }
    Ok(())
}

/// Persists a scan result as a pretty JSON map.
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn write_runtime_errors(path: &Path, errors: &BTreeMap<String, String>) -> Result<()> {
    artifact::write_json_atomic(path, errors)
}
