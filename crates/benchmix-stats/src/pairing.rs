//! Matching baseline and mutated measurement records.
//!
//! A parameterized benchmark's result file holds one record per
//! parameter binding, and nothing guarantees the two files list those
//! bindings in the same order. Records with parameters therefore pair
//! by their canonical parameter key, not by position; a parameter set
//! that appears on only one side is dropped with a warning rather than
//! mispaired. Parameterless files pair positionally.

use std::collections::BTreeMap;

use benchmix_types::MeasurementRecord;
use tracing::warn;

/// One matched baseline/mutated record pair.
#[derive(Debug, Clone, Copy)]
pub struct RecordPair<'a> {
    /// Baseline record ordinal, stable across re-runs for seed derivation.
    pub index: usize,
    pub baseline: &'a MeasurementRecord,
    pub mutated: &'a MeasurementRecord,
}

/// Pairs the records of a baseline and a mutated result file.
///
/// `benchmark` only labels the warnings. The caller has already checked
/// that both files hold the same number of records.
#[must_use]
pub fn pair_records<'a>(
    baseline: &'a [MeasurementRecord],
    mutated: &'a [MeasurementRecord],
    benchmark: &str,
) -> Vec<RecordPair<'a>> {
    let parameterized =
        baseline.iter().chain(mutated).any(|record| record.params.is_some());
    if !parameterized {
        return baseline
            .iter()
            .zip(mutated)
            .enumerate()
            .map(|(index, (baseline, mutated))| RecordPair { index, baseline, mutated })
            .collect();
    }

    let mut mutated_by_key: BTreeMap<String, &MeasurementRecord> = BTreeMap::new();
    for record in mutated {
        match record.param_key() {
            Some(key) => {
                if mutated_by_key.contains_key(&key) {
                    warn!(benchmark, key, "duplicate parameter set on mutated side, keeping the first");
                } else {
                    mutated_by_key.insert(key, record);
                }
            }
            None => warn!(benchmark, "parameterless record in a parameterized file, dropped"),
        }
    }

    let mut pairs = Vec::new();
    let mut matched: Vec<String> = Vec::new();
    for (index, record) in baseline.iter().enumerate() {
        let Some(key) = record.param_key() else {
            warn!(benchmark, "parameterless record in a parameterized file, dropped");
            continue;
        };
        match mutated_by_key.get(key.as_str()) {
            Some(&mutated) => {
                pairs.push(RecordPair { index, baseline: record, mutated });
                matched.push(key);
            }
            None => {
                warn!(benchmark, key, "parameter set present only on the baseline side, dropped");
            }
        }
    }
    for key in mutated_by_key.keys() {
        if !matched.contains(key) {
            warn!(benchmark, key, "parameter set present only on the mutated side, dropped");
        }
    }
    pairs
}
