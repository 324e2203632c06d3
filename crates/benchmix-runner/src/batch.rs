//! Batch execution of benchmark processes.
//!
//! Each job launches one child process pinned to a leased CPU group,
//! waits up to the job's timeout, and on timeout kills the child's
//! whole process group so no stray forked JVMs survive. A job whose
//! result file already exists with non-zero size is skipped, which
//! makes a batch safely restartable after a crash: re-running issues
//! no process invocation for work already done.
//!
//! One job's failure never aborts the batch. Failures and timeouts are
//! logged and counted in the returned [`BatchReport`].

use std::fs::{self, File};
use std::path::PathBuf;
use std::process::Child;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use benchmix_cpupool::CpuPool;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::command::HarnessCommand;

/// Wall-clock bound for a full measurement run.
pub const MEASUREMENT_TIMEOUT: Duration = Duration::from_secs(86_400);
/// Wall-clock bound for a coverage probe run.
pub const COVERAGE_TIMEOUT: Duration = Duration::from_secs(10);

/// One benchmark invocation with its result and log destinations.
#[derive(Debug, Clone)]
pub struct BenchmarkJob {
    pub benchmark: String,
    pub command: HarnessCommand,
    pub result_path: PathBuf,
    /// When set, the child's stdout and stderr are captured here.
    pub log_path: Option<PathBuf>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Fan out over as many workers as the pool has groups.
    pub parallel: bool,
    /// Prefix each command with the platform pinning invocation.
    pub pin: bool,
    pub poll_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self { parallel: false, pin: true, poll_interval: Duration::from_millis(250) }
    }
}

/// End-of-batch accounting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl BatchReport {
    /// Jobs that actually launched a process.
    #[must_use]
    pub fn attempted(&self) -> usize {
        self.completed + self.failed + self.timed_out
    }
}

enum JobOutcome {
    Completed,
    Skipped,
    Failed,
    TimedOut,
}

/// Runs every job, sequentially or fanned out to one worker per pool
/// group, and reports the batch totals.
pub fn run_all(jobs: &[BenchmarkJob], pool: &CpuPool, config: &BatchConfig) -> BatchReport {
    let completed = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let timed_out = AtomicUsize::new(0);
    let cursor = AtomicUsize::new(0);

    let workers = if config.parallel {
        pool.snapshot().groups.len().min(jobs.len()).max(1)
    } else {
        1
    };

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let index = cursor.fetch_add(1, Ordering::SeqCst);
                let Some(job) = jobs.get(index) else { break };
                let counter = match run_one(job, pool, config) {
                    JobOutcome::Completed => &completed,
                    JobOutcome::Skipped => &skipped,
                    JobOutcome::Failed => &failed,
                    JobOutcome::TimedOut => &timed_out,
                };
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
    });

    let report = BatchReport {
        completed: completed.load(Ordering::SeqCst),
        skipped: skipped.load(Ordering::SeqCst),
        failed: failed.load(Ordering::SeqCst),
        timed_out: timed_out.load(Ordering::SeqCst),
    };
    info!(
        total = jobs.len(),
        completed = report.completed,
        skipped = report.skipped,
        failed = report.failed,
        timed_out = report.timed_out,
        "batch finished"
    );
    report
}

fn run_one(job: &BenchmarkJob, pool: &CpuPool, config: &BatchConfig) -> JobOutcome {
    if fs::metadata(&job.result_path).is_ok_and(|meta| meta.len() > 0) {
        info!(benchmark = %job.benchmark, "skipping existing result");
        return JobOutcome::Skipped;
    }

    let lease = pool.acquire();
    let command = if config.pin {
        job.command.pinned(&lease.cpu_list())
    } else {
        job.command.clone()
    };
    info!(
        benchmark = %job.benchmark,
        cpus = %lease.cpu_list(),
        command = %command.rendered(),
        "launching benchmark"
    );

    let mut invocation = command.to_command();
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        invocation.process_group(0);
    }
    if let Some(log_path) = &job.log_path {
        let log_file = match File::create(log_path) {
            Ok(file) => file,
            Err(error) => {
                error!(benchmark = %job.benchmark, log = %log_path.display(), %error,
                    "cannot create log file");
                return JobOutcome::Failed;
            }
        };
        let stderr_file = match log_file.try_clone() {
            Ok(file) => file,
            Err(error) => {
                error!(benchmark = %job.benchmark, %error, "cannot share log file");
                return JobOutcome::Failed;
            }
        };
        invocation.stdout(log_file).stderr(stderr_file);
    }

    let mut child = match invocation.spawn() {
        Ok(child) => child,
        Err(error) => {
            error!(benchmark = %job.benchmark, %error, "failed to spawn benchmark process");
            return JobOutcome::Failed;
        }
    };

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => {
                if status.success() {
                    info!(benchmark = %job.benchmark, "benchmark finished");
                    return JobOutcome::Completed;
                }
                error!(benchmark = %job.benchmark, code = ?status.code(),
                    "benchmark exited non-zero");
                return JobOutcome::Failed;
            }
            Ok(None) => {
                if started.elapsed() >= job.timeout {
                    error!(benchmark = %job.benchmark,
                        timeout_secs = job.timeout.as_secs(),
                        "benchmark timed out, killing its process group");
                    kill_process_group(&mut child);
                    let _ = child.wait();
                    return JobOutcome::TimedOut;
                }
                std::thread::sleep(config.poll_interval);
            }
            Err(error) => {
                error!(benchmark = %job.benchmark, %error, "cannot poll benchmark process");
                let _ = child.kill();
                let _ = child.wait();
                return JobOutcome::Failed;
            }
        }
    }
}

#[cfg(unix)]
fn kill_process_group(child: &mut Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    // The child was started with process_group(0), so its pid is the
    // group id of every process it forked.
    if let Ok(pid) = i32::try_from(child.id()) {
        if let Err(error) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
            tracing::warn!(pid, %error, "killpg failed, killing direct child only");
        }
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) {
    let _ = child.kill();
}
