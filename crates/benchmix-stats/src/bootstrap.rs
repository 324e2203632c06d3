//! Percentile-bootstrap estimators.
//!
//! Both estimators resample a raw series with replacement to its own
//! length and read confidence bounds off the sorted resample statistics
//! with linear-interpolation percentiles. All randomness comes from a
//! caller-supplied seed, so a batch re-run reproduces its numbers
//! exactly.

use benchmix_error::{BenchmixError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub const DEFAULT_BOOTSTRAP_ITERS: usize = 10_000;
pub const DEFAULT_CONFIDENCE: f64 = 0.99;

/// Resample count and confidence level for one estimation.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapConfig {
    pub iters: usize,
    /// Two-sided confidence level, strictly between 0 and 1.
    pub confidence: f64,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self { iters: DEFAULT_BOOTSTRAP_ITERS, confidence: DEFAULT_CONFIDENCE }
    }
}

impl BootstrapConfig {
    fn validate(&self) -> Result<()> {
        if self.iters == 0 {
            return Err(BenchmixError::config("bootstrap iteration count must be positive"));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(BenchmixError::config(format!(
                "confidence level {} is not strictly between 0 and 1",
                self.confidence
            )));
        }
        Ok(())
    }

    /// Percentile ranks of the interval ends. 0.99 gives (0.5, 99.5).
    fn percentile_bounds(&self) -> (f64, f64) {
        let tail = (1.0 - self.confidence) / 2.0 * 100.0;
        (tail, 100.0 - tail)
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Mean of one resample-with-replacement of `values` to its own length.
fn resample_mean(values: &[f64], rng: &mut StdRng) -> f64 {
    let mut sum = 0.0;
    for _ in 0..values.len() {
        sum += values[rng.gen_range(0..values.len())];
    }
    sum / values.len() as f64
}

/// Linear-interpolation percentile over an already sorted sample.
fn percentile_sorted(sorted: &[f64], q: f64) -> f64 {
    let rank = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Bootstrap confidence interval of `mean(mutated) / mean(baseline)`.
///
/// Each iteration resamples both series independently and records the
/// ratio of the resample means; the interval is read off the sorted
/// ratio distribution at the config's percentile bounds.
///
/// # Errors
///
/// Returns [`BenchmixError::Config`] for an invalid config or an empty
/// series.
pub fn ratio_of_means_ci(
    baseline: &[f64],
    mutated: &[f64],
    config: &BootstrapConfig,
    seed: u64,
) -> Result<(f64, f64)> {
    config.validate()?;
    if baseline.is_empty() || mutated.is_empty() {
        return Err(BenchmixError::config("bootstrap series must be non-empty"));
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut ratios = Vec::with_capacity(config.iters);
    for _ in 0..config.iters {
        let baseline_mean = resample_mean(baseline, &mut rng);
        let mutated_mean = resample_mean(mutated, &mut rng);
        ratios.push(mutated_mean / baseline_mean);
    }
    ratios.sort_by(f64::total_cmp);
    let (low_q, high_q) = config.percentile_bounds();
    Ok((percentile_sorted(&ratios, low_q), percentile_sorted(&ratios, high_q)))
}

/// Bug size of a baseline/mutated throughput pair: `1 - upper` bound of
/// the ratio-of-means interval.
///
/// Positive values mean the interval sits below a ratio of 1, i.e. the
/// mutated code is slower at the configured confidence; values near or
/// below zero mean no detectable regression.
///
/// # Errors
///
/// Returns [`BenchmixError::Config`] for an invalid config or an empty
/// series.
pub fn bug_size(
    baseline: &[f64],
    mutated: &[f64],
    config: &BootstrapConfig,
    seed: u64,
) -> Result<f64> {
    let (_, upper) = ratio_of_means_ci(baseline, mutated, config, seed)?;
    Ok(1.0 - upper)
}

/// Relative confidence-interval width of the mean over every prefix of
/// `raw`, from length 2 to the full series.
///
/// Each entry is `(upper - lower) / mean(prefix)` for a bootstrap
/// interval of the prefix mean. The sequence shows how precision
/// improves as trials accumulate; a series shorter than 2 yields an
/// empty sequence.
///
/// # Errors
///
/// Returns [`BenchmixError::Config`] for an invalid config.
pub fn rciw_sequence(raw: &[f64], config: &BootstrapConfig, seed: u64) -> Result<Vec<f64>> {
    config.validate()?;
    let mut sequence = Vec::new();
    if raw.len() < 2 {
        return Ok(sequence);
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let (low_q, high_q) = config.percentile_bounds();
    let mut means = Vec::with_capacity(config.iters);
    for k in 2..=raw.len() {
        let prefix = &raw[..k];
        means.clear();
        for _ in 0..config.iters {
            means.push(resample_mean(prefix, &mut rng));
        }
        means.sort_by(f64::total_cmp);
        let lower = percentile_sorted(&means, low_q);
        let upper = percentile_sorted(&means, high_q);
        sequence.push((upper - lower) / mean(prefix));
    }
    Ok(sequence)
}
