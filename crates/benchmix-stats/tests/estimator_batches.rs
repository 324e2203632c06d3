//! Batch drivers against an on-disk results layout.

use std::collections::BTreeMap;
use std::path::Path;

use benchmix_coverage::{CommonMethodsRow, CommonMethodsTable, COMMON_METHODS_SCHEMA_VERSION};
use benchmix_stats::{
    run_bug_size_batch, run_rciw_batch, BootstrapConfig, BugSizeReport, RciwReport,
    BUG_SIZES_SCHEMA_VERSION,
};
use benchmix_types::{artifact, BranchSpec, BugKind, ResultsLayout, SourceMethodKey};

const BRANCHES: [&str; 2] = ["jmh", "llm2jmh"];

fn quick_config() -> BootstrapConfig {
    BootstrapConfig { iters: 300, confidence: 0.99 }
}

fn table_for(site: &SourceMethodKey, benchmark: &str) -> CommonMethodsTable {
    let benchmarks: BTreeMap<String, Vec<String>> = BRANCHES
        .iter()
        .map(|&branch| (branch.to_owned(), vec![benchmark.to_owned()]))
        .collect();
    CommonMethodsTable {
        schema_version: COMMON_METHODS_SCHEMA_VERSION.to_owned(),
        branches: BRANCHES.iter().map(|&branch| branch.to_owned()).collect(),
        rows: vec![CommonMethodsRow {
            method: site.method().to_owned(),
            line: site.line(),
            benchmarks,
        }],
    }
}

fn write_result(dir: &Path, benchmark: &str, forks: &[&[f64]]) {
    std::fs::create_dir_all(dir).expect("mkdir");
    let raw_data: Vec<Vec<f64>> = forks.iter().map(|fork| fork.to_vec()).collect();
    let record = serde_json::json!([{ "primaryMetric": { "rawData": raw_data } }]);
    let payload = serde_json::to_vec_pretty(&record).expect("serialize");
    std::fs::write(dir.join(format!("{benchmark}.json")), payload).expect("write");
}

fn layout_with_results(
    root: &Path,
    site: &SourceMethodKey,
    kind: BugKind,
    baseline: &[f64],
    mutated: &[f64],
) -> ResultsLayout {
    let layout = ResultsLayout::new(root, "zipkin");
    for branch in BRANCHES {
        write_result(&layout.benchmark_dir(branch), "pkg.Bench.run", &[baseline]);
        let buggy = BranchSpec::buggy(branch, kind, site.clone());
        write_result(&layout.benchmark_dir(&buggy.dir_name()), "pkg.Bench.run", &[mutated]);
    }
    layout
}

#[test]
fn bug_size_batch_fills_every_branch_cell_and_checkpoints() {
    let dir = tempfile::tempdir().expect("tempdir");
    let site = SourceMethodKey::new("zipkin2.Endpoint$Builder.ip", 227);
    let layout = layout_with_results(
        dir.path(),
        &site,
        BugKind::Hwo,
        &[10.0, 10.0, 10.0, 10.0],
        &[1.0, 1.0, 1.0, 1.0],
    );
    let table = table_for(&site, "pkg.Bench.run");

    let report = run_bug_size_batch(
        &layout,
        &table,
        BugKind::Hwo,
        std::slice::from_ref(&site),
        &quick_config(),
        41,
    )
    .expect("batch");

    let token = site.encoded_token();
    assert_eq!(token, "zipkin2.Endpoint-Builder.ip_227");
    for branch in BRANCHES {
        let sizes = &report.methods[&token][branch];
        assert_eq!(sizes.len(), 1);
        assert!((sizes[0] - 0.9).abs() < 1e-12, "collapsed throughput: {sizes:?}");
    }

    let checkpoint: BugSizeReport =
        artifact::read_json(&layout.bug_sizes_path(BugKind::Hwo)).expect("checkpoint");
    assert_eq!(checkpoint, report);
    assert_eq!(checkpoint.schema_version, BUG_SIZES_SCHEMA_VERSION);
}

#[test]
fn a_resumed_batch_skips_checkpointed_cells() {
    let dir = tempfile::tempdir().expect("tempdir");
    let site = SourceMethodKey::new("pkg.Cls.m", 42);
    let layout = layout_with_results(
        dir.path(),
        &site,
        BugKind::Ptw,
        &[10.0, 10.0, 10.0],
        &[1.0, 1.0, 1.0],
    );
    let table = table_for(&site, "pkg.Bench.run");
    let targets = [site.clone()];

    let first =
        run_bug_size_batch(&layout, &table, BugKind::Ptw, &targets, &quick_config(), 41)
            .expect("first run");

    // Corrupt every result file: a resumed run must not read them.
    for branch in BRANCHES {
        let buggy = BranchSpec::buggy(branch, BugKind::Ptw, site.clone());
        for dir in [layout.benchmark_dir(branch), layout.benchmark_dir(&buggy.dir_name())] {
            std::fs::write(dir.join("pkg.Bench.run.json"), "garbage").expect("corrupt");
        }
    }

    let resumed =
        run_bug_size_batch(&layout, &table, BugKind::Ptw, &targets, &quick_config(), 41)
            .expect("resumed run");
    assert_eq!(resumed, first, "checkpointed cells must survive a resume untouched");
}

#[test]
fn an_unmatched_target_aborts_the_batch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let site = SourceMethodKey::new("pkg.Cls.m", 42);
    let layout = layout_with_results(dir.path(), &site, BugKind::Hwo, &[10.0], &[1.0]);
    let table = table_for(&site, "pkg.Bench.run");

    let stranger = [SourceMethodKey::new("pkg.Cls.m", 99)];
    let error =
        run_bug_size_batch(&layout, &table, BugKind::Hwo, &stranger, &quick_config(), 41)
            .expect_err("unmatched site must be fatal");
    assert!(error.is_fatal());
}

#[test]
fn mismatched_record_counts_exclude_the_file_not_the_batch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let site = SourceMethodKey::new("pkg.Cls.m", 42);
    let layout = ResultsLayout::new(dir.path(), "zipkin");
    let table = table_for(&site, "pkg.Bench.run");

    for branch in BRANCHES {
        write_result(&layout.benchmark_dir(branch), "pkg.Bench.run", &[&[10.0, 10.0]]);
        let buggy = BranchSpec::buggy(branch, BugKind::Sts, site.clone());
        let mutated_dir = layout.benchmark_dir(&buggy.dir_name());
        std::fs::create_dir_all(&mutated_dir).expect("mkdir");
        // Two records against the baseline's one.
        let records = serde_json::json!([
            { "primaryMetric": { "rawData": [[1.0, 1.0]] } },
            { "primaryMetric": { "rawData": [[1.0, 1.0]] } }
        ]);
        std::fs::write(
            mutated_dir.join("pkg.Bench.run.json"),
            serde_json::to_vec(&records).expect("serialize"),
        )
        .expect("write");
    }

    let report = run_bug_size_batch(
        &layout,
        &table,
        BugKind::Sts,
        std::slice::from_ref(&site),
        &quick_config(),
        41,
    )
    .expect("batch");
    for branch in BRANCHES {
        assert!(
            report.methods[&site.encoded_token()][branch].is_empty(),
            "mismatched files must contribute nothing"
        );
    }
}

#[test]
fn rciw_batch_walks_branches_and_rewrites_per_branch() {
    let dir = tempfile::tempdir().expect("tempdir");
    let layout = ResultsLayout::new(dir.path(), "zipkin");

    // Branch `jmh`: one constant series of 4 and one too-short series.
    let jmh_dir = layout.benchmark_dir("jmh");
    write_result(&jmh_dir, "pkg.Bench.steady", &[&[5.0, 5.0, 5.0, 5.0]]);
    write_result(&jmh_dir, "pkg.Bench.short", &[&[5.0]]);
    // The manifest and a broken file must both be left out.
    std::fs::write(
        jmh_dir.join("00-benchmark-methods.json"),
        r#"["pkg.Bench.steady", "pkg.Bench.short"]"#,
    )
    .expect("manifest");
    std::fs::write(jmh_dir.join("broken.json"), "not json").expect("broken");
    // Branch `llm2jmh` has no directory at all and is skipped whole.

    let branches = vec!["jmh".to_owned(), "llm2jmh".to_owned()];
    let report =
        run_rciw_batch(&layout, BugKind::Hwo, &branches, &quick_config(), 41).expect("batch");

    assert_eq!(report.branches.len(), 1, "the missing branch is skipped");
    let sequences = &report.branches["jmh"];
    assert_eq!(sequences.len(), 2);
    // Scan order is sorted by file name: `short` before `steady`.
    assert!(sequences[0].is_empty(), "a length-1 series yields an empty sequence");
    assert_eq!(sequences[1], vec![0.0, 0.0, 0.0], "a constant series has zero width");

    let written: RciwReport =
        artifact::read_json(&layout.rciw_path(BugKind::Hwo)).expect("report file");
    assert_eq!(written, report);
}
