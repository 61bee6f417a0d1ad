use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Local;
use clap::Parser;
use env_logger::Builder;
use log::{error, info, warn, LevelFilter};

use vrptwms::config::{Config, Metaheuristic, OutputFormat};
use vrptwms::instance::read_instance;
use vrptwms::report::{print_results, save_solution_details, InstanceResult};
use vrptwms::search::Solver;

/// Solver for vehicle routing problems with time windows and multiple
/// service workers, reading instances in Solomon's format.
#[derive(Parser, Debug)]
#[command(name = "vrptwms", version, about)]
struct Args {
    /// JSON configuration file
    #[arg(long, default_value = "vrptwms.json")]
    config: PathBuf,
    /// Number of ants (0 for one per customer)
    #[arg(long)]
    ants: Option<usize>,
    /// Use the deterministic algorithm (for debugging); implies no
    /// metaheuristic
    #[arg(short, long)]
    deterministic: bool,
    /// Use the given metaheuristic
    #[arg(short, long)]
    metaheuristic: Option<String>,
    /// Optimize output for being run in parallel; implies CSV output
    #[arg(long)]
    parallel: bool,
    /// ACO: pheromone persistence (1 - evaporation)
    #[arg(long)]
    rho: Option<f64>,
    /// Runtime per instance in seconds (0 to disable the limit)
    #[arg(short, long)]
    runtime: Option<u64>,
    /// Seed for the pseudo random number generator (for debugging)
    #[arg(long)]
    seed: Option<u64>,
    /// Increase the verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Instance files in Solomon's format
    instances: Vec<PathBuf>,
}

fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%dT%H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .init();
}

/// Fold the command line overrides into the configuration.
fn apply_overrides(cfg: &mut Config, args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(name) = &args.metaheuristic {
        cfg.metaheuristic = Metaheuristic::try_from(name.as_str())?;
    }
    if args.deterministic {
        cfg.deterministic = true;
        cfg.metaheuristic = Metaheuristic::None;
    }
    if args.parallel {
        cfg.parallel = true;
        cfg.format = OutputFormat::Csv;
    }
    if let Some(ants) = args.ants {
        cfg.ants = ants;
    }
    if let Some(rho) = args.rho {
        cfg.rho = rho;
    }
    if let Some(runtime) = args.runtime {
        cfg.runtime = runtime;
    }
    if let Some(seed) = args.seed {
        cfg.seed = seed;
    }
    if cfg.seed == 0 {
        cfg.seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("the clock is past the epoch")
            .as_secs();
    }
    Ok(())
}

fn solve_instance(path: &Path, cfg: &Config) -> Option<InstanceResult> {
    let problem = match read_instance(path, cfg) {
        Ok(problem) => Arc::new(problem),
        Err(e) => {
            warn!("input file {:?} is ignored: {}", path, e);
            return None;
        }
    };
    let mut solver = Solver::new(problem);
    solver.solve();
    if let Err(e) = solver.best.validate() {
        error!("solution for {} is not feasible: {}", solver.problem.name, e);
        std::process::exit(1);
    }
    if let Err(e) = save_solution_details(&solver, Path::new(&cfg.details_path)) {
        warn!("could not write {}: {}", cfg.details_path, e);
    }
    if cfg.trace_moves {
        if let Err(e) = solver.stats.write(Path::new(&cfg.stats_path)) {
            warn!("could not write {}: {}", cfg.stats_path, e);
        }
    }
    Some(InstanceResult::of(&mut solver))
}

fn main() {
    let args = Args::parse();
    init_logger(args.verbose);

    let mut cfg = match Config::load(&args.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = apply_overrides(&mut cfg, &args) {
        error!("{}", e);
        std::process::exit(1);
    }
    if let Err(e) = cfg.validate() {
        error!("{}", e);
        std::process::exit(1);
    }
    info!(
        "{} with the {} start heuristic, seed {}",
        cfg.metaheuristic, cfg.start_heuristic, cfg.seed
    );

    if args.instances.is_empty() {
        eprintln!("No input files given.");
        std::process::exit(1);
    }

    let results: Vec<InstanceResult> = args
        .instances
        .iter()
        .filter_map(|path| solve_instance(path, &cfg))
        .collect();
    print_results(&results, &cfg);
    if results.is_empty() {
        std::process::exit(1);
    }
}
