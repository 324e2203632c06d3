//! Scoped harness session for one project/branch batch.
//!
//! A session validates its inputs once, at open: the project must be
//! registered, the branch's base suite must belong to it, and the
//! benchmark archive must exist. Jobs are then constructed against the
//! session by reference, and the session logs its close when dropped.
//! Nothing about a batch lives in process-global state.

use std::path::{Path, PathBuf};

use benchmix_error::{BenchmixError, Result};
use benchmix_types::{artifact, BranchSpec, ProjectConfig, ProjectRegistry, ResultsLayout};
use tracing::{debug, info};

use crate::batch::{BenchmarkJob, COVERAGE_TIMEOUT, MEASUREMENT_TIMEOUT};
use crate::command::{CoverageAgent, HarnessCommand};

#[derive(Debug)]
pub struct HarnessSession {
    project: ProjectConfig,
    branch: BranchSpec,
    layout: ResultsLayout,
    jar: PathBuf,
}

impl HarnessSession {
    /// Opens a session, validating project, branch, and archive.
    ///
    /// Creates the branch's coverage, benchmark, and log directories.
    ///
    /// # Errors
    ///
    /// Returns a fatal error for an unknown project, a base suite
    /// outside the project, or a missing archive.
    pub fn open(
        registry: &ProjectRegistry,
        workspace_root: &Path,
        project_id: &str,
        branch: BranchSpec,
        jar: PathBuf,
    ) -> Result<Self> {
        let project = registry.get(project_id)?.clone();
        project.require_branch(branch.base())?;
        if !jar.is_file() {
            return Err(BenchmixError::config(format!(
                "benchmark archive {} does not exist",
                jar.display()
            )));
        }
        let layout = ResultsLayout::new(workspace_root, &project.id);
        layout.ensure_branch_dirs(&branch.dir_name())?;
        info!(project = %project.id, branch = %branch, jar = %jar.display(),
            "harness session open");
        Ok(Self { project, branch, layout, jar })
    }

    #[must_use]
    pub fn project(&self) -> &ProjectConfig {
        &self.project
    }

    #[must_use]
    pub fn branch(&self) -> &BranchSpec {
        &self.branch
    }

    #[must_use]
    pub fn layout(&self) -> &ResultsLayout {
        &self.layout
    }

    fn result_path(&self, benchmark: &str) -> PathBuf {
        self.layout.benchmark_dir(&self.branch.dir_name()).join(format!("{benchmark}.json"))
    }

    fn log_path(&self, benchmark: &str) -> PathBuf {
        self.layout.log_dir(&self.branch.dir_name()).join(format!("{benchmark}.log"))
    }

    /// Persists the branch's full benchmark id list before dispatch.
    ///
    /// # Errors
    ///
    /// Returns an error when the manifest cannot be written.
    pub fn write_method_manifest(&self, methods: &[String]) -> Result<()> {
        let path = self.layout.benchmark_methods_manifest(&self.branch.dir_name());
        artifact::write_json_atomic(&path, &methods)
    }

    /// Full measurement jobs for the given benchmark ids.
    #[must_use]
    pub fn measurement_jobs(&self, methods: &[String], capture_logs: bool) -> Vec<BenchmarkJob> {
        methods
            .iter()
            .map(|benchmark| {
                let result_path = self.result_path(benchmark);
                BenchmarkJob {
                    command: HarnessCommand::measurement(&self.jar, &result_path, benchmark),
                    benchmark: benchmark.clone(),
                    result_path,
                    log_path: capture_logs.then(|| self.log_path(benchmark)),
                    timeout: MEASUREMENT_TIMEOUT,
                }
            })
            .collect()
    }

    /// Coverage probe jobs. Probe logs are always captured.
    ///
    /// Probe harness output and agent execution data land in the
    /// `benchmark/` and `destfile/` subdirectories of the branch
    /// coverage directory, leaving the directory's top level to the
    /// final per-benchmark method maps the report generator produces.
    ///
    /// # Errors
    ///
    /// Returns [`BenchmixError::Io`] when a subdirectory cannot be
    /// created.
    pub fn coverage_jobs(
        &self,
        methods: &[String],
        agent_jar: &Path,
        includes: &str,
    ) -> Result<Vec<BenchmarkJob>> {
        let coverage_dir = self.layout.coverage_dir(&self.branch.dir_name());
        let probe_dir = coverage_dir.join("benchmark");
        let destfile_dir = coverage_dir.join("destfile");
        for dir in [&probe_dir, &destfile_dir] {
            std::fs::create_dir_all(dir).map_err(|source| BenchmixError::io(dir, source))?;
        }
        Ok(methods
            .iter()
            .map(|benchmark| {
                let result_path = probe_dir.join(format!("{benchmark}.json"));
                let agent = CoverageAgent {
                    agent_jar: agent_jar.to_path_buf(),
                    destfile: destfile_dir.join(format!("{benchmark}.exec")),
                    includes: includes.to_owned(),
                };
                BenchmarkJob {
                    command: HarnessCommand::coverage_probe(
                        &self.jar,
                        &result_path,
                        benchmark,
                        &agent,
                    ),
                    benchmark: benchmark.clone(),
                    result_path,
                    log_path: Some(self.log_path(benchmark)),
                    timeout: COVERAGE_TIMEOUT,
                }
            })
            .collect())
    }
}

impl Drop for HarnessSession {
    fn drop(&mut self) {
        debug!(project = %self.project.id, branch = %self.branch, "harness session closed");
    }
}
