use std::path::Path;

use derive_more::Display;
use log::warn;
use serde::{Deserialize, Serialize};

/// The metaheuristic wrapped around construction and local search.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metaheuristic {
    #[display(fmt = "none")]
    None,
    #[display(fmt = "aco")]
    Aco,
    #[display(fmt = "cached_aco")]
    CachedAco,
    #[display(fmt = "cached_grasp")]
    CachedGrasp,
    #[display(fmt = "gaco")]
    Gaco,
    #[display(fmt = "grasp")]
    Grasp,
    #[display(fmt = "ts")]
    Ts,
    #[display(fmt = "vns")]
    Vns,
}

impl<'s> TryFrom<&'s str> for Metaheuristic {
    type Error = ConfigError;

    fn try_from(value: &'s str) -> Result<Self, Self::Error> {
        use Metaheuristic::*;
        match value {
            "none" => Ok(None),
            "aco" => Ok(Aco),
            "cached_aco" => Ok(CachedAco),
            "cached_grasp" => Ok(CachedGrasp),
            "gaco" => Ok(Gaco),
            "grasp" => Ok(Grasp),
            "ts" => Ok(Ts),
            "vns" => Ok(Vns),
            other => Err(ConfigError::UnknownMetaheuristic {
                name: other.to_string(),
            }),
        }
    }
}

/// The route construction heuristic used by the drivers.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StartHeuristic {
    #[display(fmt = "solomon")]
    Solomon,
    /// Marc Reimann's formulation of the stochastic Solomon heuristic.
    #[display(fmt = "solomon-mr")]
    SolomonMr,
    #[display(fmt = "parallel")]
    Parallel,
}

impl<'s> TryFrom<&'s str> for StartHeuristic {
    type Error = ConfigError;

    fn try_from(value: &'s str) -> Result<Self, Self::Error> {
        match value {
            "solomon" => Ok(StartHeuristic::Solomon),
            "solomon-mr" => Ok(StartHeuristic::SolomonMr),
            "parallel" => Ok(StartHeuristic::Parallel),
            other => Err(ConfigError::UnknownStartHeuristic {
                name: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[display(fmt = "human")]
    Human,
    #[display(fmt = "csv")]
    Csv,
}

impl<'s> TryFrom<&'s str> for OutputFormat {
    type Error = ConfigError;

    fn try_from(value: &'s str) -> Result<Self, Self::Error> {
        match value {
            "human" => Ok(OutputFormat::Human),
            "csv" => Ok(OutputFormat::Csv),
            other => Err(ConfigError::UnknownOutputFormat {
                name: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Display)]
pub enum ConfigError {
    #[display(fmt = "metaheuristic '{}' not recognized", name)]
    UnknownMetaheuristic { name: String },
    #[display(fmt = "start heuristic '{}' not recognized", name)]
    UnknownStartHeuristic { name: String },
    #[display(fmt = "output format '{}' not recognized", name)]
    UnknownOutputFormat { name: String },
    #[display(fmt = "either runtime or max_iterations must be finite (> 0)")]
    NoBudget,
    #[display(fmt = "max_move must be 0, 1 or 2 (got {})", value)]
    InvalidMaxMove { value: usize },
    #[display(fmt = "max_swap must be 0 or 1 (got {})", value)]
    InvalidMaxSwap { value: usize },
    #[display(fmt = "max_workers must be at least 1 (got {})", value)]
    InvalidMaxWorkers { value: usize },
    #[display(fmt = "alpha must lie in [0, 1] (got {})", value)]
    InvalidAlpha { value: f64 },
    #[display(
        fmt = "start heuristic '{}' is not available for metaheuristic '{}'",
        start_heuristic,
        metaheuristic
    )]
    UnsupportedStartHeuristic {
        metaheuristic: Metaheuristic,
        start_heuristic: StartHeuristic,
    },
    #[display(fmt = "could not parse configuration: {}", _0)]
    Parse(serde_json::Error),
}

impl std::error::Error for ConfigError {}

/// All knobs of the solver. Loaded from an optional JSON file and
/// selectively overridden on the command line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Adapt service times to demands (Reimann et al. 2011).
    pub adapt_service_times: bool,
    /// Weight of the distance term in Solomon's I1 insertion cost; the
    /// time term gets `1 - alpha`.
    pub alpha: f64,
    /// Number of ants per ACO batch; 0 means one ant per customer.
    pub ants: usize,
    /// Apply the single best move per local search pass instead of the
    /// first improving one.
    pub best_moves: bool,
    pub cost_truck: f64,
    pub cost_worker: f64,
    pub cost_distance: f64,
    /// Deterministic seed picking and insertion; implies no metaheuristic.
    pub deterministic: bool,
    /// Run the full local search. When disabled only superfluous workers
    /// are removed.
    pub do_ls: bool,
    pub format: OutputFormat,
    pub initial_pheromone: f64,
    /// Weight of a customer's depot distance in the insertion cost.
    pub lambda: f64,
    /// Failed parallel constructions tolerated before the search stops
    /// trying to reduce trucks.
    pub max_failed_attempts: u64,
    /// Iteration budget; 0 for unlimited.
    pub max_iterations: u64,
    /// Longest run of consecutive nodes considered by the move operator.
    pub max_move: usize,
    pub max_swap: usize,
    /// Upper bound on the number of workers per truck.
    pub max_workers: usize,
    pub metaheuristic: Metaheuristic,
    pub min_pheromone: f64,
    /// Savings weight of the removed edge in the insertion cost.
    pub mu: f64,
    /// Suppress repetitive output; implied by the `--parallel` flag when
    /// many instances are run side by side.
    pub parallel: bool,
    /// Size of the restricted candidate list (GRASP); 0 for unbounded.
    pub rcl_size: usize,
    /// Pheromone persistence (1 - evaporation).
    pub rho: f64,
    /// Runtime budget per instance in seconds; 0 for unlimited.
    pub runtime: u64,
    /// PRNG seed; 0 derives a seed from the clock.
    pub seed: u64,
    pub service_rate: f64,
    /// File that per-instance solution details are appended to.
    pub details_path: String,
    pub start_heuristic: StartHeuristic,
    /// File the move trace is written to when `trace_moves` is set.
    pub stats_path: String,
    /// Record every performed move for later inspection.
    pub trace_moves: bool,
    /// Number of iterations a reversal of a performed move stays tabu.
    pub tabutime: u64,
    pub truck_velocity: f64,
    /// Use a weighted roulette wheel when drawing from the RCL.
    pub use_weights: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            adapt_service_times: true,
            alpha: 1.0,
            ants: 0,
            best_moves: true,
            cost_truck: 1.0,
            cost_worker: 0.1,
            cost_distance: 0.0001,
            deterministic: false,
            do_ls: true,
            format: OutputFormat::Human,
            initial_pheromone: 1.0,
            lambda: 2.0,
            max_failed_attempts: 500,
            max_iterations: 0,
            max_move: 2,
            max_swap: 1,
            max_workers: 3,
            metaheuristic: Metaheuristic::Aco,
            min_pheromone: 1e-13,
            mu: 1.0,
            parallel: false,
            rcl_size: 2,
            rho: 0.985,
            runtime: 10,
            seed: 0,
            service_rate: 2.0,
            details_path: "details.txt".to_string(),
            start_heuristic: StartHeuristic::Solomon,
            stats_path: "stats.txt".to_string(),
            trace_moves: false,
            tabutime: 50,
            truck_velocity: 1.0,
            use_weights: true,
        }
    }
}

impl Config {
    /// Load the configuration from a JSON file. A missing or unreadable
    /// file yields the defaults with a warning, matching the behaviour
    /// users expect from an optional config file; a file that exists but
    /// does not parse is a hard error.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    "configuration file {:?} could not be read: {}; continuing with defaults",
                    path, e
                );
                return Ok(Config::default());
            }
        };
        serde_json::from_str(&text).map_err(ConfigError::Parse)
    }

    /// Check the value ranges and combinations the solver relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        use ConfigError::*;
        if self.runtime == 0 && self.max_iterations == 0 {
            return Err(NoBudget);
        }
        if self.max_move > 2 {
            return Err(InvalidMaxMove {
                value: self.max_move,
            });
        }
        if self.max_swap > 1 {
            return Err(InvalidMaxSwap {
                value: self.max_swap,
            });
        }
        if self.max_workers < 1 {
            return Err(InvalidMaxWorkers {
                value: self.max_workers,
            });
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(InvalidAlpha { value: self.alpha });
        }
        // Only the ACO family knows how to construct with pheromone or in
        // parallel.
        let solomon_only = matches!(
            self.metaheuristic,
            Metaheuristic::Grasp | Metaheuristic::CachedGrasp | Metaheuristic::Ts | Metaheuristic::Vns
        );
        if solomon_only && self.start_heuristic != StartHeuristic::Solomon {
            return Err(UnsupportedStartHeuristic {
                metaheuristic: self.metaheuristic,
                start_heuristic: self.start_heuristic,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metaheuristic_names_round_trip() {
        for name in ["none", "aco", "cached_aco", "cached_grasp", "gaco", "grasp", "ts", "vns"] {
            let m = Metaheuristic::try_from(name).unwrap();
            assert_eq!(m.to_string(), name);
        }
        assert!(Metaheuristic::try_from("annealing").is_err());
    }

    #[test]
    fn start_heuristic_names_round_trip() {
        for name in ["solomon", "solomon-mr", "parallel"] {
            let h = StartHeuristic::try_from(name).unwrap();
            assert_eq!(h.to_string(), name);
        }
        assert!(StartHeuristic::try_from("sweep").is_err());
    }

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn budget_is_required() {
        let mut cfg = Config::default();
        cfg.runtime = 0;
        cfg.max_iterations = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::NoBudget)));
        cfg.max_iterations = 100;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn grasp_requires_solomon_construction() {
        let mut cfg = Config::default();
        cfg.metaheuristic = Metaheuristic::Grasp;
        cfg.start_heuristic = StartHeuristic::Parallel;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UnsupportedStartHeuristic { .. })
        ));
    }

    #[test]
    fn config_parses_from_json() {
        let cfg: Config = serde_json::from_str(
            r#"{"metaheuristic": "cached_aco", "start_heuristic": "solomon-mr", "ants": 25}"#,
        )
        .unwrap();
        assert_eq!(cfg.metaheuristic, Metaheuristic::CachedAco);
        assert_eq!(cfg.start_heuristic, StartHeuristic::SolomonMr);
        assert_eq!(cfg.ants, 25);
        // untouched keys keep their defaults
        assert_eq!(cfg.rcl_size, 2);
    }
}
