use advectrix::analysis::{advection, SimulationResult};
use advectrix::config::{DerivativeStrategy, ProblemConfig};
use advectrix::error::{AdvectrixError, Result};
use advectrix::output;
use advectrix::solver::comm::{CommunicationBackend, COORDINATOR};
use advectrix::solver::comm_thread::run_on_threads;
use advectrix::stats::Stats;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// Distributed finite-difference solver for 1-D advection
#[derive(Parser)]
#[command(name = "advectrix", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Advect a Gaussian pulse and write the space-time history as CSV
    Run(RunArgs),
    /// Report every rank's place in the process topology
    Hello(TopologyArgs),
}

#[derive(Args)]
struct TopologyArgs {
    /// Number of in-process ranks (ignored with --mpi)
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Use the MPI world communicator (requires the `distributed` feature)
    #[arg(long)]
    mpi: bool,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    topology: TopologyArgs,

    /// Number of grid points (must divide evenly by the rank count)
    #[arg(long, default_value_t = 200)]
    grid_points: usize,

    /// Length of the spatial domain
    #[arg(long, default_value_t = 300.0)]
    domain_length: f64,

    /// Advection velocity
    #[arg(long, default_value_t = 330.0, allow_negative_numbers = true)]
    velocity: f64,

    /// CFL number
    #[arg(long, default_value_t = 0.5)]
    cfl: f64,

    /// Simulated time
    #[arg(long, default_value_t = 1.0)]
    duration: f64,

    /// Width of the initial Gaussian pulse
    #[arg(long, default_value_t = 10.0)]
    sigma: f64,

    /// Center of the initial Gaussian pulse
    #[arg(long, default_value_t = 300.0, allow_negative_numbers = true)]
    center: f64,

    /// How the spatial derivative is distributed
    #[arg(long, value_enum, default_value_t = StrategyArg::GhostCell)]
    strategy: StrategyArg,

    /// Write the history CSV here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Reverse the spatial axis of the CSV output
    #[arg(long)]
    reverse_space: bool,

    /// Print performance stats to stderr
    #[arg(long)]
    stats: bool,

    /// Warn instead of failing when the CFL number exceeds 1
    #[arg(long)]
    allow_unstable: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum StrategyArg {
    GhostCell,
    UpwindMatrix,
    CenteredMatrix,
}

impl From<StrategyArg> for DerivativeStrategy {
    fn from(arg: StrategyArg) -> Self {
        match arg {
            StrategyArg::GhostCell => DerivativeStrategy::GhostCell,
            StrategyArg::UpwindMatrix => DerivativeStrategy::UpwindMatrix,
            StrategyArg::CenteredMatrix => DerivativeStrategy::CenteredMatrix,
        }
    }
}

impl RunArgs {
    fn problem_config(&self) -> ProblemConfig {
        ProblemConfig {
            grid_point_count: self.grid_points,
            domain_length: self.domain_length,
            velocity: self.velocity,
            cfl_number: self.cfl,
            sim_duration: self.duration,
            gaussian_sigma: self.sigma,
            gaussian_center: self.center,
            strategy: self.strategy.into(),
            allow_unstable: self.allow_unstable,
        }
    }
}

type RankOutcome = Option<(SimulationResult, Option<Stats>)>;

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let outcome = match &cli.command {
        Command::Run(args) => run(args),
        Command::Hello(args) => hello(args),
    };
    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &RunArgs) -> Result<()> {
    let config = args.problem_config();
    let outcome = if args.topology.mpi {
        run_mpi(&config, args.stats)?
    } else {
        run_threads(&config, args.topology.workers, args.stats)?
    };

    // Only the coordinator has anything to report.
    let Some((result, stats)) = outcome else {
        return Ok(());
    };

    match &args.output {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(path)?);
            output::write_history_csv(&result, &mut writer, args.reverse_space)?;
            writer.flush()?;
        }
        None => {
            let mut stdout = io::stdout().lock();
            output::write_history_csv(&result, &mut stdout, args.reverse_space)?;
        }
    }
    output::write_summary(&result, &mut io::stderr())?;
    eprintln!("Elapsed wall time: {:.6} s", result.elapsed_seconds);

    if let Some(ref stats) = stats {
        stats.display(COORDINATOR);
    }
    Ok(())
}

fn run_rank(
    config: &ProblemConfig,
    comm: &dyn CommunicationBackend,
    collect_stats: bool,
) -> Result<RankOutcome> {
    let mut stats = collect_stats.then(Stats::new);
    let result = advection::run(config, comm, stats.as_mut())?;
    Ok(result.map(|r| (r, stats)))
}

fn run_threads(config: &ProblemConfig, workers: usize, collect_stats: bool) -> Result<RankOutcome> {
    let per_rank = run_on_threads(workers, None, |comm| run_rank(config, &comm, collect_stats))?;
    Ok(per_rank.into_iter().nth(COORDINATOR).flatten())
}

#[cfg(feature = "distributed")]
fn run_mpi(config: &ProblemConfig, collect_stats: bool) -> Result<RankOutcome> {
    let _universe = mpi::initialize()
        .ok_or_else(|| AdvectrixError::Communication("MPI was already initialized".into()))?;
    let comm = advectrix::solver::comm_mpi::MpiComm::new();
    run_rank(config, &comm, collect_stats)
}

#[cfg(not(feature = "distributed"))]
fn run_mpi(_config: &ProblemConfig, _collect_stats: bool) -> Result<RankOutcome> {
    Err(mpi_unavailable())
}

fn hello(args: &TopologyArgs) -> Result<()> {
    if args.mpi {
        return hello_mpi();
    }
    let lines = run_on_threads(args.workers, None, |comm| {
        Ok(output::hello_line(
            comm.rank(),
            comm.num_ranks(),
            &comm.processor_name(),
        ))
    })?;
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

#[cfg(feature = "distributed")]
fn hello_mpi() -> Result<()> {
    let _universe = mpi::initialize()
        .ok_or_else(|| AdvectrixError::Communication("MPI was already initialized".into()))?;
    let comm = advectrix::solver::comm_mpi::MpiComm::new();
    println!(
        "{}",
        output::hello_line(comm.rank(), comm.num_ranks(), &comm.processor_name())
    );
    Ok(())
}

#[cfg(not(feature = "distributed"))]
fn hello_mpi() -> Result<()> {
    Err(mpi_unavailable())
}

#[cfg(not(feature = "distributed"))]
fn mpi_unavailable() -> AdvectrixError {
    AdvectrixError::Configuration(
        "--mpi requires a build with `--features distributed`".into(),
    )
}
