//! Core domain types shared across the benchmix pipeline.
//!
//! Everything downstream of the raw benchmark harness speaks in these
//! types: branch identities ([`BranchSpec`]), fault-site keys
//! ([`SourceMethodKey`]), parsed harness result records
//! ([`MeasurementRecord`]), and the per-subject results layout
//! ([`ResultsLayout`]). Artifact files written by one stage and read by
//! the next go through [`artifact`] so every producer gets the same
//! atomic write discipline.

pub mod artifact;
pub mod branch;
pub mod measurement;
pub mod method;
pub mod project;

pub use branch::{BranchSpec, BugInjection, BugKind};
pub use measurement::{load_measurement_records, MeasurementRecord, PrimaryMetric};
pub use method::SourceMethodKey;
pub use project::{ProjectConfig, ProjectRegistry, ResultsLayout};
