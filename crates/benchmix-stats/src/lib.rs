//! Bootstrap effect-size and precision estimation.
//!
//! Two questions drive this crate. Did an injected fault measurably slow
//! a benchmark down? [`bug_size`] answers with a percentile-bootstrap
//! confidence interval over the ratio of mean throughputs. And how many
//! repeated trials does a benchmark need before its mean stabilizes?
//! [`rciw_sequence`] traces the relative confidence-interval width over
//! growing prefixes of one raw series.
//!
//! [`bug_sizes`] and [`rciw`] wrap the estimators in batch drivers that
//! walk the on-disk results layout, skip malformed inputs with a
//! warning, and checkpoint partial output after every branch so an
//! interrupted run resumes instead of restarting.

pub mod bootstrap;
pub mod bug_sizes;
pub mod pairing;
pub mod rciw;
pub mod seed;

pub use bootstrap::{
    bug_size, ratio_of_means_ci, rciw_sequence, BootstrapConfig, DEFAULT_BOOTSTRAP_ITERS,
    DEFAULT_CONFIDENCE,
};
pub use bug_sizes::{run_bug_size_batch, BugSizeReport, BUG_SIZES_SCHEMA_VERSION};
pub use pairing::{pair_records, RecordPair};
pub use rciw::{run_rciw_batch, RciwReport, RCIW_SCHEMA_VERSION};
pub use seed::{derive_series_seed, DEFAULT_ROOT_SEED};
