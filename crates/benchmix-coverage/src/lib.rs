//! Cross-branch coverage correlation and stratified sampling.
//!
//! [`correlate`] turns per-branch coverage directories into the
//! common-methods table: the set of source methods exercised by
//! benchmarks in every compared branch, with each branch's covering
//! benchmark list. [`sample`] draws a coverage-stratified subset of
//! those methods as fault-injection candidates.

pub mod correlate;
pub mod sample;

pub use correlate::{
    load_branch_coverage, BranchCoverage, CommonMethodsRow, CommonMethodsTable,
    COMMON_METHODS_SCHEMA_VERSION,
};
pub use sample::{
    load_selected_methods, select_sample, write_selected_methods, SamplerConfig,
    SelectedMethod, DEFAULT_BIN_COUNT, DEFAULT_SAMPLER_SEED,
};
