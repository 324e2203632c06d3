//! Benchmark batch execution.
//!
//! ```text
//!   HarnessSession ── builds ──▶ BenchmarkJob, ...
//!        │                           │
//!        │ validates project,        │ run_all(jobs, pool, config)
//!        │ branch, archive           ▼
//!        │                   ┌──────────────────┐
//!        └──────────────────▶│  worker threads  │──▶ BatchReport
//!                            │  (pool-bounded)  │
//!                            └──────────────────┘
//! ```
//!
//! [`session`] opens a validated per-batch handle and turns benchmark
//! id lists into jobs; [`command`] renders the harness invocations;
//! [`batch`] executes them pinned, time-bounded, and idempotently;
//! [`logscan`] triages the captured logs afterwards.

pub mod batch;
pub mod command;
pub mod logscan;
pub mod session;

pub use batch::{
    run_all, BatchConfig, BatchReport, BenchmarkJob, COVERAGE_TIMEOUT, MEASUREMENT_TIMEOUT,
};
pub use command::{CoverageAgent, HarnessCommand};
pub use logscan::{write_runtime_errors, LogScanner};
pub use session::HarnessSession;
