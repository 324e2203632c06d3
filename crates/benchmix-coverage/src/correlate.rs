//! Cross-branch coverage correlation.
//!
//! Each branch's coverage directory holds one JSON file per benchmark,
//! mapping covered source methods to the line where coverage first
//! landed. This module inverts those maps into "source method → which
//! benchmarks cover it", intersects the method sets across every branch
//! being compared, and persists the result as the common-methods table
//! every downstream stage reads.

use std::collections::BTreeMap;
use std::path::Path;

use benchmix_error::{BenchmixError, Result};
use benchmix_types::{artifact, BranchSpec, SourceMethodKey};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Schema identifier for the persisted common-methods table.
pub const COMMON_METHODS_SCHEMA_VERSION: &str = "benchmix.common-methods.v1";

/// One branch's inverted coverage: method key to covering benchmarks.
#[derive(Debug, Clone)]
pub struct BranchCoverage {
    branch: String,
    methods: BTreeMap<SourceMethodKey, Vec<String>>,
}

impl BranchCoverage {
    #[must_use]
    pub fn branch(&self) -> &str {
        &self.branch
    }

    #[must_use]
    pub fn method_count(&self) -> usize {
        self.methods.len()
    }
}

/// Scans a branch coverage directory and inverts its per-benchmark maps.
///
/// Files are visited in sorted name order so every rebuild lists
/// covering benchmarks identically. `*.detailed.json` companions carry
/// raw instrumentation counters and are excluded. A file that fails to
/// parse is skipped with a warning; the scan itself failing is an error.
///
/// # Errors
///
/// Returns [`BenchmixError::Io`] when the directory cannot be read.
pub fn load_branch_coverage(dir: &Path, branch: &str) -> Result<BranchCoverage> {
    let entries = std::fs::read_dir(dir).map_err(|source| BenchmixError::io(dir, source))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| BenchmixError::io(dir, source))?;
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            continue;
        };
        if name.ends_with(".json") && !name.ends_with(".detailed.json") {
            files.push(path);
        }
    }
    files.sort();

    let mut methods: BTreeMap<SourceMethodKey, Vec<String>> = BTreeMap::new();
    for file in files {
        let map: BTreeMap<String, u32> = match artifact::read_json(&file) {
            Ok(map) => map,
            Err(error) => {
                warn!(file = %file.display(), %error, "skipping unreadable coverage file");
                continue;
            }
        };
        let benchmark = file
            .file_stem()
            .map_or_else(String::new, |stem| stem.to_string_lossy().into_owned());
        for (method, line) in map {
            let key = SourceMethodKey::new(method, line);
            let covering = methods.entry(key).or_default();
            if !covering.contains(&benchmark) {
                covering.push(benchmark.clone());
            }
        }
    }
    info!(branch, methods = methods.len(), "branch coverage loaded");
    Ok(BranchCoverage { branch: branch.to_owned(), methods })
}

/// One retained method with its per-branch covering benchmarks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonMethodsRow {
    /// Raw method name, `$` separators intact.
    pub method: String,
    pub line: u32,
    /// Branch name to ordered, duplicate-free covering benchmark ids.
    pub benchmarks: BTreeMap<String, Vec<String>>,
}

impl CommonMethodsRow {
    #[must_use]
    pub fn key(&self) -> SourceMethodKey {
        SourceMethodKey::new(self.method.clone(), self.line)
    }

    /// Number of benchmarks covering this method in `branch`.
    #[must_use]
    pub fn count(&self, branch: &str) -> usize {
        self.benchmarks.get(branch).map_or(0, Vec::len)
    }
}

/// Methods covered in every compared branch, with per-branch detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonMethodsTable {
    pub schema_version: String,
    /// Branches the intersection was computed over, in comparison order.
    pub branches: Vec<String>,
    /// Rows in canonical key order (method name, then line).
    pub rows: Vec<CommonMethodsRow>,
}

impl CommonMethodsTable {
    /// Intersects per-branch coverage into a common-methods table.
    ///
    /// The first branch seeds the key set; each further branch narrows
    /// it. Keys are (method, line) pairs, so the same method reported
    /// at different lines stays distinct.
    ///
    /// # Errors
    ///
    /// Returns [`BenchmixError::Config`] when fewer than two branches
    /// are given.
    pub fn build(coverage: &[BranchCoverage]) -> Result<Self> {
        if coverage.len() < 2 {
            return Err(BenchmixError::config(
                "cross-branch correlation needs at least 2 branches",
            ));
        }
        let mut common: Vec<&SourceMethodKey> = coverage[0].methods.keys().collect();
        for branch in &coverage[1..] {
            common.retain(|key| branch.methods.contains_key(key));
            info!(
                branch = branch.branch,
                common = common.len(),
                "narrowed common method set"
            );
        }

        let mut rows = Vec::with_capacity(common.len());
        for key in common {
            let mut benchmarks = BTreeMap::new();
            for branch in coverage {
                if let Some(covering) = branch.methods.get(key) {
                    benchmarks.insert(branch.branch.clone(), covering.clone());
                }
            }
            rows.push(CommonMethodsRow {
                method: key.method().to_owned(),
                line: key.line(),
                benchmarks,
            });
        }
        Ok(Self {
            schema_version: COMMON_METHODS_SCHEMA_VERSION.to_owned(),
            branches: coverage.iter().map(|branch| branch.branch.clone()).collect(),
            rows,
        })
    }

    /// # Errors
    ///
    /// Returns an error when the file cannot be written.
    pub fn write(&self, path: &Path) -> Result<()> {
        artifact::write_json_atomic(path, self)
    }

    /// Loads a table and validates its schema and invariants.
    ///
    /// # Errors
    ///
    /// Returns [`BenchmixError::MalformedArtifact`] when the schema
    /// version differs or a row is missing a branch's benchmark list.
    pub fn load(path: &Path) -> Result<Self> {
        let table: Self = artifact::read_json(path)?;
        if table.schema_version != COMMON_METHODS_SCHEMA_VERSION {
            return Err(BenchmixError::malformed(
                path,
                format!(
                    "schema version `{}` does not match `{COMMON_METHODS_SCHEMA_VERSION}`",
                    table.schema_version
                ),
            ));
        }
        for row in &table.rows {
            for branch in &table.branches {
                if row.count(branch) == 0 {
                    return Err(BenchmixError::malformed(
                        path,
                        format!(
                            "method {}_{} has no covering benchmarks in branch `{branch}`",
                            row.method, row.line
                        ),
                    ));
                }
            }
        }
        Ok(table)
    }

    #[must_use]
    pub fn find(&self, key: &SourceMethodKey) -> Option<&CommonMethodsRow> {
        self.rows.iter().find(|row| row.method == key.method() && row.line == key.line())
    }

    /// Covering benchmarks of `key` in `branch`.
    ///
    /// # Errors
    ///
    /// Returns [`BenchmixError::MethodNotFound`] when the key has no
    /// row and [`BenchmixError::UnknownBranch`] when the table was not
    /// built over `branch`.
    pub fn benchmarks_for(&self, key: &SourceMethodKey, branch: &str) -> Result<&[String]> {
        let row = self.find(key).ok_or_else(|| BenchmixError::MethodNotFound {
            method: key.method().to_owned(),
            line: key.line(),
        })?;
        row.benchmarks.get(branch).map(Vec::as_slice).ok_or_else(|| {
            BenchmixError::UnknownBranch(format!(
                "`{branch}` is not in the common-methods table (built over {:?})",
                self.branches
            ))
        })
    }

    /// Benchmark ids a measurement batch should run for `branch`.
    ///
    /// A clean branch runs every listed benchmark. A mutated branch
    /// runs only the benchmarks that cover the injected method in the
    /// branch's base suite, since the rest cannot observe the fault.
    ///
    /// # Errors
    ///
    /// Returns [`BenchmixError::MethodNotFound`] when a mutated
    /// branch's fault site has no table row.
    pub fn methods_to_run(
        &self,
        branch: &BranchSpec,
        all_methods: &[String],
    ) -> Result<Vec<String>> {
        match branch.bug() {
            None => Ok(all_methods.to_vec()),
            Some(bug) => {
                let covering = self.benchmarks_for(&bug.site, branch.base())?;
                Ok(covering.to_vec())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_coverage(dir: &Path, benchmark: &str, methods: &[(&str, u32)]) {
        let map: BTreeMap<&str, u32> = methods.iter().copied().collect();
        let payload = serde_json::to_vec_pretty(&map).expect("serialize");
        fs::write(dir.join(format!("{benchmark}.json")), payload).expect("write");
    }

    fn branch_from(entries: &[(&str, u32, &[&str])], branch: &str) -> BranchCoverage {
        let mut methods = BTreeMap::new();
        for (method, line, benchmarks) in entries {
            methods.insert(
                SourceMethodKey::new(*method, *line),
                benchmarks.iter().map(|&b| b.to_owned()).collect(),
            );
        }
        BranchCoverage { branch: branch.to_owned(), methods }
    }

    #[test]
    fn inversion_collects_benchmarks_in_sorted_file_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_coverage(dir.path(), "bench_b", &[("pkg.Cls.m", 42)]);
        write_coverage(dir.path(), "bench_a", &[("pkg.Cls.m", 42), ("pkg.Cls.n", 7)]);

        let coverage = load_branch_coverage(dir.path(), "llm2jmh").expect("load");
        assert_eq!(coverage.method_count(), 2);
        let key = SourceMethodKey::new("pkg.Cls.m", 42);
        assert_eq!(
            coverage.methods.get(&key).expect("key present"),
            &vec!["bench_a".to_owned(), "bench_b".to_owned()]
        );
    }

    #[test]
    fn detailed_companions_and_unparseable_files_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_coverage(dir.path(), "bench_a", &[("pkg.Cls.m", 42)]);
        fs::write(dir.path().join("bench_a.detailed.json"), "{\"x\": {}}").expect("write");
        fs::write(dir.path().join("broken.json"), "not json").expect("write");

        let coverage = load_branch_coverage(dir.path(), "jmh").expect("load");
        assert_eq!(coverage.method_count(), 1);
        let key = SourceMethodKey::new("pkg.Cls.m", 42);
        assert_eq!(coverage.methods.get(&key).expect("key present"), &vec!["bench_a".to_owned()]);
    }

    #[test]
    fn intersection_retains_keys_covered_in_every_branch() {
        // Branches A, B, C cover `pkg.Cls.m:42` via b1, b2+b3, b1+b4.
        let a = branch_from(&[("pkg.Cls.m", 42, &["b1"]), ("pkg.Only.a", 1, &["b9"])], "A");
        let b = branch_from(&[("pkg.Cls.m", 42, &["b2", "b3"])], "B");
        let c = branch_from(&[("pkg.Cls.m", 42, &["b1", "b4"]), ("pkg.Only.c", 3, &["b8"])], "C");

        let table = CommonMethodsTable::build(&[a, b, c]).expect("build");
        assert_eq!(table.branches, vec!["A", "B", "C"]);
        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row.method, "pkg.Cls.m");
        assert_eq!(row.line, 42);
        assert_eq!(row.benchmarks["A"], vec!["b1"]);
        assert_eq!(row.benchmarks["B"], vec!["b2", "b3"]);
        assert_eq!(row.benchmarks["C"], vec!["b1", "b4"]);
    }

    #[test]
    fn same_method_at_different_lines_stays_distinct() {
        let a = branch_from(&[("pkg.Cls.m", 42, &["b1"]), ("pkg.Cls.m", 50, &["b2"])], "A");
        let b = branch_from(&[("pkg.Cls.m", 42, &["b3"])], "B");
        let table = CommonMethodsTable::build(&[a, b]).expect("build");
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].line, 42);
    }

    #[test]
    fn fewer_than_two_branches_is_a_configuration_error() {
        let a = branch_from(&[("pkg.Cls.m", 42, &["b1"])], "A");
        let error = CommonMethodsTable::build(&[a]).expect_err("one branch must fail");
        assert!(error.is_fatal());
    }

    #[test]
    fn table_round_trips_and_load_checks_the_schema() {
        let a = branch_from(&[("pkg.Cls.m", 42, &["b1"])], "A");
        let b = branch_from(&[("pkg.Cls.m", 42, &["b2"])], "B");
        let table = CommonMethodsTable::build(&[a, b]).expect("build");

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("common_methods_A_B.json");
        table.write(&path).expect("write");
        let loaded = CommonMethodsTable::load(&path).expect("load");
        assert_eq!(loaded, table);

        let mut wrong = table;
        wrong.schema_version = "benchmix.common-methods.v0".to_owned();
        artifact::write_json_atomic(&path, &wrong).expect("write");
        assert!(CommonMethodsTable::load(&path).is_err());
    }

    #[test]
    fn methods_to_run_filters_mutated_branches_by_fault_coverage() {
        let a = branch_from(&[("pkg.Cls$Inner.m", 42, &["b1", "b2"])], "jmh");
        let b = branch_from(&[("pkg.Cls$Inner.m", 42, &["b3"])], "llm2jmh");
        let table = CommonMethodsTable::build(&[a, b]).expect("build");
        let all = vec!["b1".to_owned(), "b2".to_owned(), "b3".to_owned(), "b4".to_owned()];

        let clean = BranchSpec::parse("llm2jmh").expect("parse");
        assert_eq!(table.methods_to_run(&clean, &all).expect("clean"), all);

        let buggy = BranchSpec::parse("jmh_HWO_pkg.Cls-Inner.m_42").expect("parse");
        assert_eq!(table.methods_to_run(&buggy, &all).expect("buggy"), vec!["b1", "b2"]);

        let missing = BranchSpec::parse("jmh_HWO_pkg.Cls-Inner.m_99").expect("parse");
        let error = table.methods_to_run(&missing, &all).expect_err("unmatched site");
        assert!(matches!(error, BenchmixError::MethodNotFound { .. }));
        assert!(error.is_fatal());
    }
}
