//! JMH result-file records.
//!
//! A harness invocation with `-rf json` writes an array of records,
//! one per benchmark method, or one per parameter binding for
//! parameterized benchmarks. Only the fields the pipeline reads are
//! modeled here; everything else in the file is ignored on load.

use std::collections::BTreeMap;
use std::path::Path;

use benchmix_error::{BenchmixError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Fully qualified benchmark method name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub benchmark: Option<String>,
    /// `@Param` bindings for this record, absent for parameterless benchmarks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, String>>,
    #[serde(rename = "primaryMetric")]
    pub primary_metric: PrimaryMetric,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrimaryMetric {
    /// Headline score reported by the harness.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Per-fork arrays of raw iteration samples.
    #[serde(rename = "rawData", default)]
    pub raw_data: Vec<Vec<f64>>,
}

impl MeasurementRecord {
    /// Samples from the last fork, the one the estimator consumes.
    #[must_use]
    pub fn last_fork(&self) -> Option<&[f64]> {
        self.primary_metric.raw_data.last().map(Vec::as_slice)
    }

    /// Canonical pairing key for matching records across branches.
    ///
    /// `None` for parameterless benchmarks, which pair positionally.
    /// Parameterized records pair on their bindings rendered in sorted
    /// key order, so two files that list the same parameter sets in a
    /// different order still pair correctly.
    #[must_use]
    pub fn param_key(&self) -> Option<String> {
        self.params.as_ref().map(|params| {
            params
                .iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect::<Vec<_>>()
                .join(",")
        })
    }
}

/// Loads every record from a JMH JSON result file.
///
/// # Errors
///
/// Returns [`BenchmixError::Io`] when the file cannot be read and
/// [`BenchmixError::MalformedArtifact`] when it is not a JMH result
/// array.
pub fn load_measurement_records(path: &Path) -> Result<Vec<MeasurementRecord>> {
    let bytes = std::fs::read(path).map_err(|source| BenchmixError::io(path, source))?;
    serde_json::from_slice(&bytes)
        .map_err(|error| BenchmixError::malformed(path, format!("not a JMH result file: {error}")))
}
