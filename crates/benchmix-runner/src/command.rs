//! Harness invocation construction.
//!
//! Commands are built as argv vectors, never shell strings, so
//! benchmark ids and paths need no quoting. The measurement form
//! mirrors the full harness run (single fork, 5 warmups of 500 ms,
//! 30 iterations of 1 s, JSON results, throughput in ops/s, GC
//! profiling on); the coverage form is the short probe (1 iteration,
//! no warmup, no fork, 100 ms) with the instrumentation agent attached
//! both to the forked JVM and the host JVM.

use std::path::{Path, PathBuf};
use std::process::Command;

use benchmix_error::{BenchmixError, Result};

const JVM_OPTS: [&str; 3] = ["-Djmh.ignoreLock=true", "-Xms1g", "-Xmx8g"];

/// Coverage instrumentation agent attachment for probe runs.
#[derive(Debug, Clone)]
pub struct CoverageAgent {
    pub agent_jar: PathBuf,
    /// Per-benchmark execution-data file the agent writes.
    pub destfile: PathBuf,
    /// Package prefix to instrument, without the trailing `.*`.
    pub includes: String,
}

impl CoverageAgent {
    fn jvm_arg(&self) -> String {
        format!(
            "-javaagent:{}=destfile={},includes={}.*",
            self.agent_jar.display(),
            self.destfile.display(),
            self.includes
        )
    }
}

/// One ready-to-launch child process invocation.
#[derive(Debug, Clone)]
pub struct HarnessCommand {
    argv: Vec<String>,
}

impl HarnessCommand {
    /// Wraps an externally supplied argv.
    ///
    /// # Errors
    ///
    /// Returns [`BenchmixError::Config`] when `argv` is empty.
    pub fn from_argv(argv: Vec<String>) -> Result<Self> {
        if argv.is_empty() {
            return Err(BenchmixError::config("command argv must not be empty"));
        }
        Ok(Self { argv })
    }

    /// Full measurement invocation for one benchmark.
    #[must_use]
    pub fn measurement(jar: &Path, result: &Path, benchmark: &str) -> Self {
        let mut argv = vec!["java".to_owned()];
        argv.extend(JVM_OPTS.iter().map(|&opt| opt.to_owned()));
        argv.extend(["-jar".to_owned(), jar.display().to_string()]);
        argv.extend(
            [
                "-f", "1", "-wi", "5", "-w", "500ms", "-i", "30", "-r", "1000ms", "-rf",
                "json", "-tu", "s", "-bm", "thrpt", "-gc", "true",
            ]
            .iter()
            .map(|&opt| opt.to_owned()),
        );
        argv.extend(["-rff".to_owned(), result.display().to_string(), benchmark.to_owned()]);
        Self { argv }
    }

    /// Short coverage probe invocation for one benchmark.
    #[must_use]
    pub fn coverage_probe(
        jar: &Path,
        result: &Path,
        benchmark: &str,
        agent: &CoverageAgent,
    ) -> Self {
        let agent_arg = agent.jvm_arg();
        let mut argv = vec!["java".to_owned(), "-Djmh.ignoreLock=true".to_owned()];
        argv.push(agent_arg.clone());
        argv.extend(["-jar".to_owned(), jar.display().to_string()]);
        argv.extend(["-jvmArgsAppend".to_owned(), agent_arg]);
        argv.extend(
            ["-i", "1", "-wi", "0", "-f", "0", "-r", "100ms", "-rf", "json"]
                .iter()
                .map(|&opt| opt.to_owned()),
        );
        argv.extend(["-rff".to_owned(), result.display().to_string(), benchmark.to_owned()]);
        Self { argv }
    }

    /// Core-pinned variant of this command.
    ///
    /// Prefixes `taskset -c {cpu_list}` on Linux; on other platforms
    /// the command is returned unchanged.
    #[must_use]
    pub fn pinned(&self, cpu_list: &str) -> Self {
        if cfg!(target_os = "linux") {
            let mut argv =
                vec!["taskset".to_owned(), "-c".to_owned(), cpu_list.to_owned()];
            argv.extend(self.argv.iter().cloned());
            Self { argv }
        } else {
            self.clone()
        }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        self.argv.first().map_or("", String::as_str)
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        self.argv.get(1..).unwrap_or(&[])
    }

    /// Space-joined rendering for log lines.
    #[must_use]
    pub fn rendered(&self) -> String {
        self.argv.join(" ")
    }

    #[must_use]
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(self.program());
        command.args(self.args());
        command
    }
}
