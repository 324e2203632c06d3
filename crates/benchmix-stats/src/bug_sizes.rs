//! Bug-size estimation batch over injected methods.
//!
//! For every injected method and every suite branch, the driver takes
//! the benchmarks that cover the method (per the common-methods table),
//! pairs each benchmark's clean result file with its mutated
//! counterpart, and computes one bug size per valid record pair. The
//! report is checkpointed after every (method, branch) cell, so a crash
//! loses at most one cell and a re-run skips everything already
//! computed.

use std::collections::BTreeMap;
use std::path::Path;

use benchmix_coverage::CommonMethodsTable;
use benchmix_error::{BenchmixError, Result};
use benchmix_types::{
    artifact, load_measurement_records, BranchSpec, BugKind, ResultsLayout, SourceMethodKey,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::bootstrap::{bug_size, BootstrapConfig};
use crate::pairing::pair_records;
use crate::seed::derive_series_seed;

/// Schema identifier for the persisted bug-size report.
pub const BUG_SIZES_SCHEMA_VERSION: &str = "benchmix.bug-sizes.v1";

/// Bug sizes per injected method and branch, for one fault kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BugSizeReport {
    pub schema_version: String,
    pub kind: BugKind,
    /// Encoded `{method}_{line}` token → branch → one size per pair.
    pub methods: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
}

impl BugSizeReport {
    #[must_use]
    pub fn new(kind: BugKind) -> Self {
        Self {
            schema_version: BUG_SIZES_SCHEMA_VERSION.to_owned(),
            kind,
            methods: BTreeMap::new(),
        }
    }

    /// Loads an existing checkpoint, or starts fresh when none exists.
    ///
    /// # Errors
    ///
    /// Returns [`BenchmixError::MalformedArtifact`] when a present file
    /// does not decode, carries a different schema version, or was
    /// written for another fault kind.
    pub fn load_or_new(path: &Path, kind: BugKind) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new(kind));
        }
        let report: Self = artifact::read_json(path)?;
        if report.schema_version != BUG_SIZES_SCHEMA_VERSION {
            return Err(BenchmixError::malformed(
                path,
                format!(
                    "schema version `{}` does not match `{BUG_SIZES_SCHEMA_VERSION}`",
                    report.schema_version
                ),
            ));
        }
        if report.kind != kind {
            return Err(BenchmixError::malformed(
                path,
                format!("checkpoint holds kind {} but the batch runs {kind}", report.kind),
            ));
        }
        Ok(report)
    }

    /// # Errors
    ///
    /// Returns an error when the checkpoint cannot be written.
    pub fn write(&self, path: &Path) -> Result<()> {
        artifact::write_json_atomic(path, self)
    }

    /// Whether this (method, branch) cell was already computed.
    #[must_use]
    pub fn has_cell(&self, method_token: &str, branch: &str) -> bool {
        self.methods.get(method_token).is_some_and(|cells| cells.contains_key(branch))
    }
}

/// Runs the bug-size batch for `kind` over every target method.
///
/// Targets are looked up in the common-methods table; a target with no
/// row is a caller error and aborts the run. Everything below that —
/// missing mutated files, unparseable results, mismatched record counts
/// or series lengths — is logged and skipped.
///
/// # Errors
///
/// Returns [`BenchmixError::MethodNotFound`] for an unmatched target
/// and I/O errors from checkpoint writes.
pub fn run_bug_size_batch(
    layout: &ResultsLayout,
    table: &CommonMethodsTable,
    kind: BugKind,
    targets: &[SourceMethodKey],
    config: &BootstrapConfig,
    root_seed: u64,
) -> Result<BugSizeReport> {
    let save_path = layout.bug_sizes_path(kind);
    let mut report = BugSizeReport::load_or_new(&save_path, kind)?;

    for target in targets {
        let token = target.encoded_token();
        for branch in &table.branches {
            if report.has_cell(&token, branch) {
                debug!(method = %token, branch, "cell already checkpointed, skipping");
                continue;
            }
            let covering = table.benchmarks_for(target, branch)?;
            let sizes = branch_bug_sizes(layout, target, branch, kind, covering, config, root_seed);
            report
                .methods
                .entry(token.clone())
                .or_default()
                .insert(branch.clone(), sizes);
            report.write(&save_path)?;
        }
    }
    info!(kind = %kind, methods = report.methods.len(), path = %save_path.display(),
        "bug-size batch finished");
    Ok(report)
}

fn branch_bug_sizes(
    layout: &ResultsLayout,
    target: &SourceMethodKey,
    branch: &str,
    kind: BugKind,
    covering: &[String],
    config: &BootstrapConfig,
    root_seed: u64,
) -> Vec<f64> {
    let baseline_dir = layout.benchmark_dir(branch);
    let mutated_branch = BranchSpec::buggy(branch, kind, target.clone());
    let mutated_dir = layout.benchmark_dir(&mutated_branch.dir_name());

    let mut sizes = Vec::new();
    let mut excluded = 0_usize;
    for benchmark in covering {
        let mutated_path = mutated_dir.join(format!("{benchmark}.json"));
        if !mutated_path.is_file() {
            // The mutated batch only runs benchmarks covering the fault
            // in its own base suite; absent files are expected here.
            debug!(benchmark, branch, "no mutated result, benchmark skipped");
            continue;
        }
        let baseline_path = baseline_dir.join(format!("{benchmark}.json"));
        let baseline_records = match load_measurement_records(&baseline_path) {
            Ok(records) => records,
            Err(error) => {
                warn!(benchmark, %error, "baseline result unreadable, file excluded");
                excluded += 1;
                continue;
            }
        };
        let mutated_records = match load_measurement_records(&mutated_path) {
            Ok(records) => records,
            Err(error) => {
                warn!(benchmark, %error, "mutated result unreadable, file excluded");
                excluded += 1;
                continue;
            }
        };
        if baseline_records.len() != mutated_records.len() {
            warn!(
                benchmark,
                baseline = baseline_records.len(),
                mutated = mutated_records.len(),
                "record counts differ, file excluded"
            );
            excluded += 1;
            continue;
        }

        for pair in pair_records(&baseline_records, &mutated_records, benchmark) {
            let (Some(baseline_fork), Some(mutated_fork)) =
                (pair.baseline.last_fork(), pair.mutated.last_fork())
            else {
                warn!(benchmark, record = pair.index, "record has no fork data, pair excluded");
                continue;
            };
            if baseline_fork.is_empty() || baseline_fork.len() != mutated_fork.len() {
                warn!(
                    benchmark,
                    record = pair.index,
                    baseline = baseline_fork.len(),
                    mutated = mutated_fork.len(),
                    "series lengths differ, pair excluded"
                );
                continue;
            }
            let seed = derive_series_seed(root_seed, branch, benchmark, pair.index);
            match bug_size(baseline_fork, mutated_fork, config, seed) {
                Ok(size) => sizes.push(size),
                Err(error) => warn!(benchmark, record = pair.index, %error, "pair excluded"),
            }
        }
    }
    info!(
        method = %target,
        branch,
        covering = covering.len(),
        pairs = sizes.len(),
        excluded,
        "branch bug sizes computed"
    );
    sizes
}
