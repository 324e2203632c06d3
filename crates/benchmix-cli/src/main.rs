//! `benchmix` — driver for the cross-branch microbenchmark experiment.
//!
//! Each subcommand wires one pipeline stage to the on-disk results
//! layout: batch execution, coverage correlation, stratified sampling,
//! bootstrap estimation, and log triage. Flag errors and configuration
//! errors exit non-zero; per-item failures inside a batch are logged by
//! the stage itself and never fail the process.

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use benchmix_coverage::{
    load_branch_coverage, select_sample, write_selected_methods, CommonMethodsTable,
    SamplerConfig,
};
use benchmix_cpupool::{CpuPool, PoolConfig};
use benchmix_error::{BenchmixError, Result};
use benchmix_runner::{
    run_all, write_runtime_errors, BatchConfig, HarnessSession, LogScanner,
};
use benchmix_stats::{
    run_bug_size_batch, run_rciw_batch, BootstrapConfig, DEFAULT_ROOT_SEED,
};
use benchmix_types::{
    artifact, BranchSpec, BugKind, ProjectRegistry, ResultsLayout, SourceMethodKey,
};

fn print_help() {
    let help = "\
benchmix — cross-branch microbenchmark coverage, sampling, and bootstrap estimation

USAGE:
    benchmix <COMMAND> [OPTIONS]

COMMANDS:
    run         Execute a measurement or coverage batch for one branch
    correlate   Build the cross-branch common-methods table
    sample      Draw the stratified fault-injection sample
    bug-sizes   Bootstrap bug-size estimation for injected methods
    rciw        Bootstrap interval-width convergence per branch
    scan-logs   Extract exception blocks from captured run logs
    pool-info   Print the host's CPU pinning groups

COMMON OPTIONS:
    --root <DIR>        Workspace root holding results/ and logs/ (default .)
    --projects <PATH>   Project registry JSON (default: built-in registry)
    --project <ID>      Experiment subject (required by most commands)

RUN OPTIONS:
    --branch <TOKEN>    Branch token, clean or {base}_{KIND}_{method}_{line} (required)
    --jar <PATH>        Benchmark archive to invoke (required)
    --benchmark <ID>    Run only this benchmark id (repeatable)
    --methods <PATH>    JSON array of benchmark ids to run
    --coverage          Run short coverage probes instead of measurements
    --agent-jar <PATH>  Instrumentation agent (required with --coverage)
    --includes <PKG>    Package prefix to instrument (required with --coverage)
    --parallel          Fan out one worker per CPU pinning group
    --no-pin            Launch children without a taskset prefix
    --capture-logs      Capture measurement stdout/stderr (probes always do)

SAMPLE OPTIONS:
    --bins <N>          Bin count (default 50)
    --seed <N>          Sampler seed (default 41)

BUG-SIZES / RCIW OPTIONS:
    --bug <KIND>        Fault kind: HWO, PTW, STS, EFL, SOC (required)
    --method <TOKEN>    Injected {method}_{line} target (repeatable; default:
                        the selected_methods.json sample)
    --iters <N>         Bootstrap resamples (default 10000)
    --seed <N>          Root seed for per-series RNG streams (default 41)

SCAN-LOGS OPTIONS:
    --branch <TOKEN>    Branch whose captured logs to scan (required)

POOL-INFO OPTIONS:
    --cpus-per-task <N>     Logical CPUs per pinning group (default 4)
    --cpu-budget <N>        Logical CPUs the host may commit (default 72)
    --mem-budget-gib <N>    Memory the host may commit (default 400)
    --mem-per-task-gib <N>  Memory per benchmark process (default 8)
";
    println!("{help}");
}

/// Flags shared by every project-scoped subcommand.
#[derive(Debug, Default)]
struct CommonArgs {
    root: Option<PathBuf>,
    projects: Option<PathBuf>,
    project: Option<String>,
}

impl CommonArgs {
    /// Consumes a shared flag at `index`, advancing it past the value.
    fn consume(&mut self, args: &[String], index: &mut usize) -> std::result::Result<bool, String> {
        match args[*index].as_str() {
            "--root" => self.root = Some(PathBuf::from(flag_value(args, index)?)),
            "--projects" => self.projects = Some(PathBuf::from(flag_value(args, index)?)),
            "--project" => self.project = Some(flag_value(args, index)?),
            _ => return Ok(false),
        }
        Ok(true)
    }

    fn root(&self) -> PathBuf {
        self.root.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    fn registry(&self) -> Result<ProjectRegistry> {
        match &self.projects {
            Some(path) => ProjectRegistry::load(path),
            None => Ok(ProjectRegistry::builtin()),
        }
    }

    fn project(&self) -> std::result::Result<&str, String> {
        self.project.as_deref().ok_or_else(|| "--project is required".to_owned())
    }
}

fn flag_value(args: &[String], index: &mut usize) -> std::result::Result<String, String> {
    let flag = args[*index].clone();
    *index += 1;
    args.get(*index).cloned().ok_or_else(|| format!("{flag} requires a value"))
}

fn parse_number<T: std::str::FromStr>(
    flag: &str,
    value: &str,
) -> std::result::Result<T, String> {
    value.parse().map_err(|_| format!("invalid {flag} value: {value}"))
}

#[derive(Debug)]
struct RunArgs {
    common: CommonArgs,
    branch: String,
    jar: PathBuf,
    benchmarks: Vec<String>,
    methods_file: Option<PathBuf>,
    coverage: bool,
    agent_jar: Option<PathBuf>,
    includes: Option<String>,
    parallel: bool,
    pin: bool,
    capture_logs: bool,
}

fn parse_run_args(args: &[String]) -> std::result::Result<RunArgs, String> {
    let mut common = CommonArgs::default();
    let mut branch = None;
    let mut jar = None;
    let mut benchmarks = Vec::new();
    let mut methods_file = None;
    let mut coverage = false;
    let mut agent_jar = None;
    let mut includes = None;
    let mut parallel = false;
    let mut pin = true;
    let mut capture_logs = false;

    let mut index = 0;
    while index < args.len() {
        if common.consume(args, &mut index)? {
            index += 1;
            continue;
        }
        match args[index].as_str() {
            "--branch" => branch = Some(flag_value(args, &mut index)?),
            "--jar" => jar = Some(PathBuf::from(flag_value(args, &mut index)?)),
            "--benchmark" => benchmarks.push(flag_value(args, &mut index)?),
            "--methods" => methods_file = Some(PathBuf::from(flag_value(args, &mut index)?)),
            "--coverage" => coverage = true,
            "--agent-jar" => agent_jar = Some(PathBuf::from(flag_value(args, &mut index)?)),
            "--includes" => includes = Some(flag_value(args, &mut index)?),
            "--parallel" => parallel = true,
            "--no-pin" => pin = false,
            "--capture-logs" => capture_logs = true,
            "-h" | "--help" => {
                print_help();
                return Err(String::new());
            }
            unknown => return Err(format!("unknown option: {unknown}")),
        }
        index += 1;
    }

    if coverage && (agent_jar.is_none() || includes.is_none()) {
        return Err("--coverage requires --agent-jar and --includes".to_owned());
    }
    Ok(RunArgs {
        common,
        branch: branch.ok_or_else(|| "--branch is required".to_owned())?,
        jar: jar.ok_or_else(|| "--jar is required".to_owned())?,
        benchmarks,
        methods_file,
        coverage,
        agent_jar,
        includes,
        parallel,
        pin,
        capture_logs,
    })
}

fn cmd_run(args: &RunArgs) -> Result<()> {
    let registry = args.common.registry()?;
    let branch = BranchSpec::parse(&args.branch)?;
    let session = HarnessSession::open(
        &registry,
        &args.common.root(),
        args.common.project().map_err(BenchmixError::config)?,
        branch,
        args.jar.clone(),
    )?;

    let mut methods = if args.benchmarks.is_empty() {
        match &args.methods_file {
            Some(path) => artifact::read_json::<Vec<String>>(path)?,
            None => {
                return Err(BenchmixError::config(
                    "provide --methods or at least one --benchmark",
                ))
            }
        }
    } else {
        args.benchmarks.clone()
    };
    if session.branch().is_buggy() {
        let table = CommonMethodsTable::load(
            &session.layout().common_methods_path(&session.project().branches),
        )?;
        methods = table.methods_to_run(session.branch(), &methods)?;
    }
    session.write_method_manifest(&methods)?;

    let pool = CpuPool::for_host(&PoolConfig::default());
    let jobs = if args.coverage {
        let agent_jar = args.agent_jar.as_deref().unwrap_or_else(|| Path::new(""));
        let includes = args.includes.as_deref().unwrap_or("");
        session.coverage_jobs(&methods, agent_jar, includes)?
    } else {
        session.measurement_jobs(&methods, args.capture_logs)
    };
    let config = BatchConfig { parallel: args.parallel, pin: args.pin, ..BatchConfig::default() };
    let report = run_all(&jobs, &pool, &config);
    println!("{}", render_json(&report)?);
    Ok(())
}

fn parse_common_only(args: &[String]) -> std::result::Result<CommonArgs, String> {
    let mut common = CommonArgs::default();
    let mut index = 0;
    while index < args.len() {
        if common.consume(args, &mut index)? {
            index += 1;
            continue;
        }
        match args[index].as_str() {
            "-h" | "--help" => {
                print_help();
                return Err(String::new());
            }
            unknown => return Err(format!("unknown option: {unknown}")),
        }
    }
    Ok(common)
}

fn cmd_correlate(common: &CommonArgs) -> Result<()> {
    let registry = common.registry()?;
    let project = registry
        .get(common.project().map_err(BenchmixError::config)?)?;
    let layout = ResultsLayout::new(&common.root(), &project.id);

    let mut coverage = Vec::with_capacity(project.branches.len());
    for branch in &project.branches {
        coverage.push(load_branch_coverage(&layout.coverage_dir(branch), branch)?);
    }
    let table = CommonMethodsTable::build(&coverage)?;
    let path = layout.common_methods_path(&project.branches);
    table.write(&path)?;
    println!("{} common methods -> {}", table.rows.len(), path.display());
    Ok(())
}

fn parse_sample_args(
    args: &[String],
) -> std::result::Result<(CommonArgs, SamplerConfig), String> {
    let mut common = CommonArgs::default();
    let mut config = SamplerConfig::default();
    let mut index = 0;
    while index < args.len() {
        if common.consume(args, &mut index)? {
            index += 1;
            continue;
        }
        match args[index].as_str() {
            "--bins" => {
                let value = flag_value(args, &mut index)?;
                config.bin_count = parse_number("--bins", &value)?;
            }
            "--seed" => {
                let value = flag_value(args, &mut index)?;
                config.seed = parse_number("--seed", &value)?;
            }
            "-h" | "--help" => {
                print_help();
                return Err(String::new());
            }
            unknown => return Err(format!("unknown option: {unknown}")),
        }
        index += 1;
    }
    Ok((common, config))
}

fn cmd_sample(common: &CommonArgs, config: &SamplerConfig) -> Result<()> {
    let registry = common.registry()?;
    let project = registry
        .get(common.project().map_err(BenchmixError::config)?)?;
    let layout = ResultsLayout::new(&common.root(), &project.id);

    let table = CommonMethodsTable::load(&layout.common_methods_path(&project.branches))?;
    let selected = select_sample(&table, &project.key_branch, config)?;
    let path = layout.selected_methods_path();
    write_selected_methods(&path, &selected)?;
    println!("{} methods sampled -> {}", selected.len(), path.display());
    Ok(())
}

#[derive(Debug)]
struct EstimatorArgs {
    common: CommonArgs,
    bug: BugKind,
    methods: Vec<String>,
    bootstrap: BootstrapConfig,
    root_seed: u64,
}

fn parse_estimator_args(args: &[String]) -> std::result::Result<EstimatorArgs, String> {
    let mut common = CommonArgs::default();
    let mut bug = None;
    let mut methods = Vec::new();
    let mut bootstrap = BootstrapConfig::default();
    let mut root_seed = DEFAULT_ROOT_SEED;

    let mut index = 0;
    while index < args.len() {
        if common.consume(args, &mut index)? {
            index += 1;
            continue;
        }
        match args[index].as_str() {
            "--bug" => {
                let value = flag_value(args, &mut index)?;
                bug = Some(value.parse::<BugKind>().map_err(|error| error.to_string())?);
            }
            "--method" => methods.push(flag_value(args, &mut index)?),
            "--iters" | "--resamples" => {
                let flag = args[index].clone();
                let value = flag_value(args, &mut index)?;
                bootstrap.iters = parse_number(&flag, &value)?;
            }
            "--seed" => {
                let value = flag_value(args, &mut index)?;
                root_seed = parse_number("--seed", &value)?;
            }
            "-h" | "--help" => {
                print_help();
                return Err(String::new());
            }
            unknown => return Err(format!("unknown option: {unknown}")),
        }
        index += 1;
    }
    Ok(EstimatorArgs {
        common,
        bug: bug.ok_or_else(|| "--bug is required".to_owned())?,
        methods,
        bootstrap,
        root_seed,
    })
}

fn estimator_targets(args: &EstimatorArgs, layout: &ResultsLayout) -> Result<Vec<SourceMethodKey>> {
    if args.methods.is_empty() {
        let selected = benchmix_coverage::load_selected_methods(&layout.selected_methods_path())?;
        return Ok(selected.into_iter().map(|entry| entry.key).collect());
    }
    args.methods.iter().map(|token| SourceMethodKey::parse_encoded(token)).collect()
}

fn cmd_bug_sizes(args: &EstimatorArgs) -> Result<()> {
    let registry = args.common.registry()?;
    let project = registry
        .get(args.common.project().map_err(BenchmixError::config)?)?;
    let layout = ResultsLayout::new(&args.common.root(), &project.id);

    let table = CommonMethodsTable::load(&layout.common_methods_path(&project.branches))?;
    let targets = estimator_targets(args, &layout)?;
    let report = run_bug_size_batch(
        &layout,
        &table,
        args.bug,
        &targets,
        &args.bootstrap,
        args.root_seed,
    )?;
    println!(
        "{} methods estimated -> {}",
        report.methods.len(),
        layout.bug_sizes_path(args.bug).display()
    );
    Ok(())
}

fn cmd_rciw(args: &EstimatorArgs) -> Result<()> {
    let registry = args.common.registry()?;
    let project = registry
        .get(args.common.project().map_err(BenchmixError::config)?)?;
    let layout = ResultsLayout::new(&args.common.root(), &project.id);

    let report = run_rciw_batch(
        &layout,
        args.bug,
        &project.branches,
        &args.bootstrap,
        args.root_seed,
    )?;
    println!(
        "{} branches traced -> {}",
        report.branches.len(),
        layout.rciw_path(args.bug).display()
    );
    Ok(())
}

fn parse_scan_args(args: &[String]) -> std::result::Result<(CommonArgs, String), String> {
    let mut common = CommonArgs::default();
    let mut branch = None;
    let mut index = 0;
    while index < args.len() {
        if common.consume(args, &mut index)? {
            index += 1;
            continue;
        }
        match args[index].as_str() {
            "--branch" => branch = Some(flag_value(args, &mut index)?),
            "-h" | "--help" => {
                print_help();
                return Err(String::new());
            }
            unknown => return Err(format!("unknown option: {unknown}")),
        }
        index += 1;
    }
    Ok((common, branch.ok_or_else(|| "--branch is required".to_owned())?))
}

fn cmd_scan_logs(common: &CommonArgs, branch_token: &str) -> Result<()> {
    let registry = common.registry()?;
    let project = registry
        .get(common.project().map_err(BenchmixError::config)?)?;
    let branch = BranchSpec::parse(branch_token)?;
    let layout = ResultsLayout::new(&common.root(), &project.id);

    let scanner = LogScanner::new()?;
    let errors = scanner.scan_dir(&layout.log_dir(&branch.dir_name()))?;
    let path = layout.runtime_errors_path(&branch.dir_name());
    write_runtime_errors(&path, &errors)?;
    println!("{} crashing benchmarks -> {}", errors.len(), path.display());
    Ok(())
}

fn parse_pool_args(args: &[String]) -> std::result::Result<PoolConfig, String> {
    let mut config = PoolConfig::default();
    let mut index = 0;
    while index < args.len() {
        let flag = args[index].clone();
        match flag.as_str() {
            "--cpus-per-task" => {
                let value = flag_value(args, &mut index)?;
                config.cpus_per_task = parse_number(&flag, &value)?;
            }
            "--cpu-budget" => {
                let value = flag_value(args, &mut index)?;
                config.cpu_budget = parse_number(&flag, &value)?;
            }
            "--mem-budget-gib" => {
                let value = flag_value(args, &mut index)?;
                config.mem_budget_gib = parse_number(&flag, &value)?;
            }
            "--mem-per-task-gib" => {
                let value = flag_value(args, &mut index)?;
                config.mem_per_task_gib = parse_number(&flag, &value)?;
            }
            "-h" | "--help" => {
                print_help();
                return Err(String::new());
            }
            unknown => return Err(format!("unknown option: {unknown}")),
        }
        index += 1;
    }
    Ok(config)
}

fn cmd_pool_info(config: &PoolConfig) -> Result<()> {
    let pool = CpuPool::for_host(config);
    println!("{}", render_json(pool.snapshot())?);
    Ok(())
}

fn render_json<T: serde::Serialize>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|error| BenchmixError::internal(error.to_string()))
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn dispatch(command: &str, rest: &[String]) -> std::result::Result<Result<()>, String> {
    match command {
        "run" => Ok(cmd_run(&parse_run_args(rest)?)),
        "correlate" => Ok(cmd_correlate(&parse_common_only(rest)?)),
        "sample" => {
            let (common, config) = parse_sample_args(rest)?;
            Ok(cmd_sample(&common, &config))
        }
        "bug-sizes" => Ok(cmd_bug_sizes(&parse_estimator_args(rest)?)),
        "rciw" => Ok(cmd_rciw(&parse_estimator_args(rest)?)),
        "scan-logs" => {
            let (common, branch) = parse_scan_args(rest)?;
            Ok(cmd_scan_logs(&common, &branch))
        }
        "pool-info" => Ok(cmd_pool_info(&parse_pool_args(rest)?)),
        "-h" | "--help" => {
            print_help();
            Err(String::new())
        }
        unknown => Err(format!("unknown command: {unknown}")),
    }
}

fn main() -> ExitCode {
    init_tracing();
    let args: Vec<String> = env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        print_help();
        return ExitCode::from(2);
    };
    match dispatch(command, rest) {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(error)) => {
            eprintln!("ERROR benchmix {command} failed: {error}");
            ExitCode::from(1)
        }
        Err(error) if error.is_empty() => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("ERROR {error}\n(try `benchmix --help`)");
            ExitCode::from(2)
        }
    }
}
