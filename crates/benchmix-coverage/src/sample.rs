//! Stratified sampling of fault-injection candidates.
//!
//! Candidates are the rows of a common-methods table. Each row is
//! binned by how many benchmarks cover it in the designated key branch,
//! and one row is drawn uniformly from every non-empty bin. The spread
//! across bins keeps the sample coverage-diverse: heavily exercised
//! methods cannot crowd out rarely exercised ones.

use std::path::Path;

use benchmix_error::{BenchmixError, Result};
use benchmix_types::{artifact, SourceMethodKey};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::{json, Value};
use tracing::info;

use crate::correlate::CommonMethodsTable;

pub const DEFAULT_BIN_COUNT: usize = 50;
pub const DEFAULT_SAMPLER_SEED: u64 = 41;

#[derive(Debug, Clone)]
pub struct SamplerConfig {
    pub bin_count: usize,
    pub seed: u64,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self { bin_count: DEFAULT_BIN_COUNT, seed: DEFAULT_SAMPLER_SEED }
    }
}

/// One sampled fault-injection candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedMethod {
    pub key: SourceMethodKey,
    /// Covering-benchmark counts in the table's branch order.
    pub counts: Vec<usize>,
}

/// Draws one candidate per non-empty bin, deterministically for a seed.
///
/// Bin width is `max_count / bin_count + 1` (integer division) over the
/// key branch's counts; a candidate's bin index is `count / width`,
/// clamped into the top bin. Output preserves ascending bin order.
///
/// # Errors
///
/// Returns [`BenchmixError::Config`] for a zero `bin_count` and
/// [`BenchmixError::UnknownBranch`] when `key_branch` is not one of the
/// table's branches.
pub fn select_sample(
    table: &CommonMethodsTable,
    key_branch: &str,
    config: &SamplerConfig,
) -> Result<Vec<SelectedMethod>> {
    if config.bin_count == 0 {
        return Err(BenchmixError::config("bin_count must be positive"));
    }
    if !table.branches.iter().any(|branch| branch == key_branch) {
        return Err(BenchmixError::UnknownBranch(format!(
            "sampling key branch `{key_branch}` is not in the table (built over {:?})",
            table.branches
        )));
    }
    if table.rows.is_empty() {
        return Ok(Vec::new());
    }

    let max_count =
        table.rows.iter().map(|row| row.count(key_branch)).max().unwrap_or(0);
    let step = max_count / config.bin_count + 1;

    let mut bins: Vec<Vec<&crate::correlate::CommonMethodsRow>> =
        vec![Vec::new(); config.bin_count];
    for row in &table.rows {
        let index = (row.count(key_branch) / step).min(config.bin_count - 1);
        bins[index].push(row);
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut selected = Vec::new();
    for bin in &bins {
        if bin.is_empty() {
            continue;
        }
        let row = bin[rng.gen_range(0..bin.len())];
        selected.push(SelectedMethod {
            key: row.key(),
            counts: table.branches.iter().map(|branch| row.count(branch)).collect(),
        });
    }
    info!(
        candidates = table.rows.len(),
        bins = config.bin_count,
        selected = selected.len(),
        "stratified sample drawn"
    );
    Ok(selected)
}

/// Writes a sample as a JSON array of `[method, line, counts...]` rows.
///
/// # Errors
///
/// Returns an error when the file cannot be written.
pub fn write_selected_methods(path: &Path, selected: &[SelectedMethod]) -> Result<()> {
    let rows: Vec<Value> = selected
        .iter()
        .map(|entry| {
            let mut row = vec![json!(entry.key.method()), json!(entry.key.line())];
            row.extend(entry.counts.iter().map(|&count| json!(count)));
            Value::Array(row)
        })
        .collect();
    artifact::write_json_atomic(path, &rows)
}

/// Reads a sample back from its tuple-array form.
///
/// # Errors
///
/// Returns [`BenchmixError::MalformedArtifact`] when a row is not a
/// `[method, line, counts...]` array.
pub fn load_selected_methods(path: &Path) -> Result<Vec<SelectedMethod>> {
    let rows: Vec<Value> = artifact::read_json(path)?;
    let mut selected = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let malformed = |what: &str| {
            BenchmixError::malformed(path, format!("row {index}: {what}"))
        };
        let fields = row.as_array().ok_or_else(|| malformed("not an array"))?;
        if fields.len() < 2 {
            return Err(malformed("expected at least [method, line]"));
        }
        let method = fields[0].as_str().ok_or_else(|| malformed("method is not a string"))?;
        let line = fields[1]
            .as_u64()
            .and_then(|line| u32::try_from(line).ok())
            .ok_or_else(|| malformed("line is not a line number"))?;
        let mut counts = Vec::with_capacity(fields.len() - 2);
        for field in &fields[2..] {
            let count = field
                .as_u64()
                .and_then(|count| usize::try_from(count).ok())
                .ok_or_else(|| malformed("count is not an integer"))?;
            counts.push(count);
        }
        selected.push(SelectedMethod { key: SourceMethodKey::new(method, line), counts });
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::{CommonMethodsRow, COMMON_METHODS_SCHEMA_VERSION};
    use std::collections::BTreeMap;

    fn table_with_counts(counts: &[usize]) -> CommonMethodsTable {
        let rows = counts
            .iter()
            .enumerate()
            .map(|(index, &count)| {
                let benchmarks: Vec<String> =
                    (0..count).map(|b| format!("bench_{b}")).collect();
                CommonMethodsRow {
                    method: format!("pkg.Cls.m{index:03}"),
                    line: 10,
                    benchmarks: BTreeMap::from([("llm2jmh".to_owned(), benchmarks)]),
                }
            })
            .collect();
        CommonMethodsTable {
            schema_version: COMMON_METHODS_SCHEMA_VERSION.to_owned(),
            branches: vec!["llm2jmh".to_owned()],
            rows,
        }
    }

    #[test]
    fn identical_input_and_seed_reproduce_the_same_sample() {
        let table = table_with_counts(&[1, 2, 3, 5, 8, 13, 21, 34, 55, 89]);
        let config = SamplerConfig::default();
        let first = select_sample(&table, "llm2jmh", &config).expect("sample");
        let second = select_sample(&table, "llm2jmh", &config).expect("sample");
        assert_eq!(first, second);
        assert!(!first.is_empty());
        assert!(first.len() <= config.bin_count);
    }

    #[test]
    fn each_non_empty_bin_contributes_exactly_one_candidate() {
        // max = 99, width = 99 / 4 + 1 = 25: bins [0,25) [25,50) [50,75) [75,99].
        let table = table_with_counts(&[1, 2, 30, 40, 60, 99]);
        let config = SamplerConfig { bin_count: 4, seed: 41 };
        let selected = select_sample(&table, "llm2jmh", &config).expect("sample");
        assert_eq!(selected.len(), 4);
        let counts: Vec<usize> = selected.iter().map(|s| s.counts[0]).collect();
        assert!(counts[0] == 1 || counts[0] == 2);
        assert!(counts[1] == 30 || counts[1] == 40);
        assert_eq!(counts[2], 60);
        assert_eq!(counts[3], 99);
    }

    #[test]
    fn the_maximum_count_lands_in_the_top_bin() {
        // max = 100, width = 100 / 50 + 1 = 3, 100 / 3 = 33 < 50: no clamp
        // needed, but the index must stay in range.
        let table = table_with_counts(&[100]);
        let selected =
            select_sample(&table, "llm2jmh", &SamplerConfig::default()).expect("sample");
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].counts[0], 100);
    }

    #[test]
    fn unknown_key_branch_is_rejected() {
        let table = table_with_counts(&[1, 2]);
        assert!(select_sample(&table, "ju2jmh", &SamplerConfig::default()).is_err());
    }

    #[test]
    fn an_empty_table_yields_an_empty_sample() {
        let table = table_with_counts(&[]);
        let selected =
            select_sample(&table, "llm2jmh", &SamplerConfig::default()).expect("sample");
        assert!(selected.is_empty());
    }

    #[test]
    fn selected_methods_round_trip_through_the_tuple_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("selected_methods.json");
        let selected = vec![
            SelectedMethod {
                key: SourceMethodKey::new("pkg.Outer$Inner.call", 42),
                counts: vec![3, 1, 7],
            },
            SelectedMethod { key: SourceMethodKey::new("pkg.Cls.m", 7), counts: vec![1, 1, 1] },
        ];
        write_selected_methods(&path, &selected).expect("write");
        let loaded = load_selected_methods(&path).expect("load");
        assert_eq!(loaded, selected);
    }

    #[test]
    fn malformed_sample_rows_are_rejected_with_the_row_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("selected_methods.json");
        std::fs::write(&path, r#"[["ok.Method", 5], ["missing line"]]"#).expect("write");
        let error = load_selected_methods(&path).expect_err("load must fail");
        assert!(error.to_string().contains("row 1"));
    }

    mod binning_properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn every_candidate_lands_in_exactly_one_valid_bin(
                counts in proptest::collection::vec(0usize..5000, 1..200),
                bin_count in 1usize..100,
            ) {
                let max_count = counts.iter().copied().max().unwrap_or(0);
                let step = max_count / bin_count + 1;
                let mut binned = vec![0usize; bin_count];
                for &count in &counts {
                    let index = (count / step).min(bin_count - 1);
                    prop_assert!(index < bin_count);
                    binned[index] += 1;
                }
                prop_assert_eq!(binned.iter().sum::<usize>(), counts.len());
            }

            #[test]
            fn sample_size_never_exceeds_bin_count(
                counts in proptest::collection::vec(1usize..200, 1..80),
                bin_count in 1usize..20,
                seed in 0u64..1000,
            ) {
                let table = table_with_counts(&counts);
                let config = SamplerConfig { bin_count, seed };
                let selected = select_sample(&table, "llm2jmh", &config)
                    .expect("sample should succeed");
                prop_assert!(selected.len() <= bin_count);
                prop_assert!(!selected.is_empty());
            }
        }
    }
}
