//! Interval-width convergence batch over whole branches.
//!
//! For every branch, the driver walks its benchmark result directory,
//! computes the prefix RCIW sequence of each record's last fork, and
//! rewrites the per-kind report after the branch completes. Files that
//! fail to parse are skipped with a warning; a branch whose directory
//! is missing is skipped whole.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use benchmix_error::{BenchmixError, Result};
use benchmix_types::{artifact, load_measurement_records, BugKind, ResultsLayout};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::bootstrap::{rciw_sequence, BootstrapConfig};
use crate::seed::derive_series_seed;

/// Schema identifier for the persisted RCIW report.
pub const RCIW_SCHEMA_VERSION: &str = "benchmix.rciw.v1";

/// RCIW sequences per branch, gathered for one fault kind's study.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RciwReport {
    pub schema_version: String,
    pub kind: BugKind,
    /// Branch → one sequence per measured record, in file scan order.
    pub branches: BTreeMap<String, Vec<Vec<f64>>>,
}

impl RciwReport {
    #[must_use]
    pub fn new(kind: BugKind) -> Self {
        Self {
            schema_version: RCIW_SCHEMA_VERSION.to_owned(),
            kind,
            branches: BTreeMap::new(),
        }
    }

    /// # Errors
    ///
    /// Returns an error when the report cannot be written.
    pub fn write(&self, path: &Path) -> Result<()> {
        artifact::write_json_atomic(path, self)
    }
}

/// Runs the RCIW batch over every given branch.
///
/// The report is rewritten after each branch, so an interrupted run
/// leaves the completed branches on disk.
///
/// # Errors
///
/// Returns I/O errors from report writes. Per-branch and per-file
/// failures are logged and skipped.
pub fn run_rciw_batch(
    layout: &ResultsLayout,
    kind: BugKind,
    branches: &[String],
    config: &BootstrapConfig,
    root_seed: u64,
) -> Result<RciwReport> {
    let save_path = layout.rciw_path(kind);
    let mut report = RciwReport::new(kind);

    for branch in branches {
        let dir = layout.benchmark_dir(branch);
        let sequences = match branch_rciw_sequences(&dir, branch, config, root_seed) {
            Ok(sequences) => sequences,
            Err(error) => {
                warn!(branch, %error, "branch scan failed, branch skipped");
                continue;
            }
        };
        report.branches.insert(branch.clone(), sequences);
        report.write(&save_path)?;
    }
    info!(kind = %kind, branches = report.branches.len(), path = %save_path.display(),
        "rciw batch finished");
    Ok(report)
}

fn branch_rciw_sequences(
    dir: &Path,
    branch: &str,
    config: &BootstrapConfig,
    root_seed: u64,
) -> Result<Vec<Vec<f64>>> {
    let mut files = Vec::new();
    collect_result_files(dir, &mut files)?;
    files.sort();

    let mut sequences = Vec::new();
    for file in &files {
        let records = match load_measurement_records(file) {
            Ok(records) => records,
            Err(error) => {
                warn!(file = %file.display(), %error, "unreadable result file skipped");
                continue;
            }
        };
        let benchmark = file
            .file_stem()
            .map_or_else(String::new, |stem| stem.to_string_lossy().into_owned());
        for (index, record) in records.iter().enumerate() {
            let Some(fork) = record.last_fork() else {
                warn!(benchmark, record = index, "record has no fork data, skipped");
                continue;
            };
            let seed = derive_series_seed(root_seed, branch, &benchmark, index);
            match rciw_sequence(fork, config, seed) {
                Ok(sequence) => sequences.push(sequence),
                Err(error) => warn!(benchmark, record = index, %error, "record skipped"),
            }
        }
    }
    info!(branch, files = files.len(), sequences = sequences.len(),
        "branch rciw sequences computed");
    Ok(sequences)
}

/// Collects `*.json` result files recursively, leaving out the method
/// manifest the measurement batch writes alongside them.
fn collect_result_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries = std::fs::read_dir(dir).map_err(|source| BenchmixError::io(dir, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| BenchmixError::io(dir, source))?;
        let path = entry.path();
        if path.is_dir() {
            collect_result_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "json")
            && path.file_name().is_none_or(|name| name != "00-benchmark-methods.json")
        {
            out.push(path);
        }
    }
    Ok(())
}
