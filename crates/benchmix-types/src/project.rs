//! Experiment subjects and their on-disk results layout.
//!
//! Every stage of the pipeline reads and writes under two roots:
//!
//! ```text
//! results/projects/{project}/coverage/{branch}/...   per-method coverage maps
//! results/projects/{project}/coverage/common_methods_{...}.json
//! results/projects/{project}/coverage/selected_methods.json
//! results/projects/{project}/benchmark/{branch}/...  JMH result files
//! results/projects/{project}/benchmark/bug-{KIND}.json
//! results/projects/{project}/benchmark/rciw-{KIND}.json
//! logs/projects/{project}/{branch}/...               harness stdout/stderr
//! ```
//!
//! [`ResultsLayout`] is the single source of truth for those paths so
//! producers and consumers can never drift apart.

use std::fs;
use std::path::{Path, PathBuf};

use benchmix_error::{BenchmixError, Result};
use serde::{Deserialize, Serialize};

use crate::artifact;
use crate::branch::BugKind;

/// Schema identifier for serialized project registries.
pub const PROJECT_REGISTRY_SCHEMA_VERSION: &str = "benchmix.projects.v1";

/// One experiment subject: a project with several benchmark suite branches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Subject identifier, also the directory name under `results/projects/`.
    pub id: String,
    /// Benchmark suite branches, baseline suite first.
    pub branches: Vec<String>,
    /// Branch whose benchmark counts drive stratified sampling.
    pub key_branch: String,
}

impl ProjectConfig {
    /// Baseline suite branch (the first entry).
    #[must_use]
    pub fn base_branch(&self) -> &str {
        self.branches.first().map_or("", String::as_str)
    }

    /// # Errors
    ///
    /// Returns [`BenchmixError::UnknownBranch`] when `branch` is not a
    /// suite branch of this project.
    pub fn require_branch(&self, branch: &str) -> Result<()> {
        if self.branches.iter().any(|known| known == branch) {
            Ok(())
        } else {
            Err(BenchmixError::UnknownBranch(format!(
                "`{branch}` is not a suite branch of project `{}`",
                self.id
            )))
        }
    }

    fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(BenchmixError::config("project id must not be empty"));
        }
        if self.branches.is_empty() {
            return Err(BenchmixError::config(format!(
                "project `{}` has no suite branches",
                self.id
            )));
        }
        self.require_branch(&self.key_branch).map_err(|_| {
            BenchmixError::config(format!(
                "key branch `{}` of project `{}` is not in its branch list",
                self.key_branch, self.id
            ))
        })
    }
}

/// The set of subjects the pipeline knows how to drive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRegistry {
    pub schema_version: String,
    pub projects: Vec<ProjectConfig>,
}

impl ProjectRegistry {
    /// The registry of study subjects, used unless a registry file is given.
    #[must_use]
    pub fn builtin() -> Self {
        let project = |id: &str, branches: &[&str]| ProjectConfig {
            id: id.to_owned(),
            branches: branches.iter().map(|&b| b.to_owned()).collect(),
            key_branch: "llm2jmh".to_owned(),
        };
        Self {
            schema_version: PROJECT_REGISTRY_SCHEMA_VERSION.to_owned(),
            projects: vec![
                project("rxjava", &["jmh", "ju2jmh", "llm2jmh"]),
                project("eclipse-collections", &["jmh-tests", "ju2jmh", "llm2jmh"]),
                project("zipkin", &["benchmarks", "ju2jmh", "llm2jmh"]),
                project("flink-17799", &["flink-benchmarks", "ju2jmh", "llm2jmh"]),
                project("flink-16536", &["flink-benchmarks", "ju2jmh", "llm2jmh"]),
            ],
        }
    }

    /// Loads a registry file, validating schema version and entries.
    ///
    /// # Errors
    ///
    /// Returns an error when the file is unreadable, not a registry,
    /// carries a different schema version, or contains an invalid
    /// project entry.
    pub fn load(path: &Path) -> Result<Self> {
        let registry: Self = artifact::read_json(path)?;
        if registry.schema_version != PROJECT_REGISTRY_SCHEMA_VERSION {
            return Err(BenchmixError::malformed(
                path,
                format!(
                    "schema version `{}` does not match `{PROJECT_REGISTRY_SCHEMA_VERSION}`",
                    registry.schema_version
                ),
            ));
        }
        for project in &registry.projects {
            project.validate()?;
        }
        Ok(registry)
    }

    /// # Errors
    ///
    /// Returns [`BenchmixError::UnknownProject`] when `id` names no
    /// registered subject.
    pub fn get(&self, id: &str) -> Result<&ProjectConfig> {
        self.projects
            .iter()
            .find(|project| project.id == id)
            .ok_or_else(|| BenchmixError::UnknownProject(id.to_owned()))
    }
}

/// Resolved per-subject paths under a workspace root.
#[derive(Debug, Clone)]
pub struct ResultsLayout {
    results_root: PathBuf,
    logs_root: PathBuf,
}

impl ResultsLayout {
    #[must_use]
    pub fn new(workspace_root: &Path, project: &str) -> Self {
        Self {
            results_root: workspace_root.join("results").join("projects").join(project),
            logs_root: workspace_root.join("logs").join("projects").join(project),
        }
    }

    /// Per-branch directory of coverage maps.
    #[must_use]
    pub fn coverage_dir(&self, branch_dir: &str) -> PathBuf {
        self.results_root.join("coverage").join(branch_dir)
    }

    /// Per-branch directory of JMH result files.
    #[must_use]
    pub fn benchmark_dir(&self, branch_dir: &str) -> PathBuf {
        self.results_root.join("benchmark").join(branch_dir)
    }

    /// Per-branch directory of captured harness logs.
    #[must_use]
    pub fn log_dir(&self, branch_dir: &str) -> PathBuf {
        self.logs_root.join(branch_dir)
    }

    /// Cross-branch method table for the given suite branches.
    #[must_use]
    pub fn common_methods_path(&self, branches: &[String]) -> PathBuf {
        self.results_root
            .join("coverage")
            .join(format!("common_methods_{}.json", branches.join("_")))
    }

    /// Stratified sample drawn from the common-methods table.
    #[must_use]
    pub fn selected_methods_path(&self) -> PathBuf {
        self.results_root.join("coverage").join("selected_methods.json")
    }

    /// Bug-size report for one fault kind.
    #[must_use]
    pub fn bug_sizes_path(&self, kind: BugKind) -> PathBuf {
        self.results_root.join("benchmark").join(format!("bug-{kind}.json"))
    }

    /// Interval-width report for one fault kind.
    #[must_use]
    pub fn rciw_path(&self, kind: BugKind) -> PathBuf {
        self.results_root.join("benchmark").join(format!("rciw-{kind}.json"))
    }

    /// Manifest of benchmark methods executed in one branch directory.
    #[must_use]
    pub fn benchmark_methods_manifest(&self, branch_dir: &str) -> PathBuf {
        self.benchmark_dir(branch_dir).join("00-benchmark-methods.json")
    }

    /// Scan of harness logs for runtime exceptions in one branch.
    #[must_use]
    pub fn runtime_errors_path(&self, branch_dir: &str) -> PathBuf {
        self.results_root
            .join("benchmark")
            .join(format!("runtime-errors-{branch_dir}.json"))
    }

    /// Creates the coverage, benchmark, and log directories for a branch.
    ///
    /// # Errors
    ///
    /// Returns [`BenchmixError::Io`] when a directory cannot be created.
    pub fn ensure_branch_dirs(&self, branch_dir: &str) -> Result<()> {
        for dir in [
            self.coverage_dir(branch_dir),
            self.benchmark_dir(branch_dir),
            self.log_dir(branch_dir),
        ] {
            fs::create_dir_all(&dir).map_err(|source| BenchmixError::io(&dir, source))?;
        }
        Ok(())
    }
}
