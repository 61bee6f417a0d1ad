pub mod aco;
pub mod cache;
pub mod cached;
pub mod grasp;
pub mod local;
pub mod pheromone;
pub mod ts;
pub mod vns;

use std::sync::Arc;
use std::time::Instant;

use float_ord::FloatOrd;
use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::config::Metaheuristic;
use crate::problem::Problem;
use crate::search::pheromone::Pheromone;
use crate::search::ts::Tabulist;
use crate::solution::insertion::{pick_by_cost, spin_wheel, Insertion};
use crate::solution::{SlotRef, Solution};
use crate::stats::Stats;
use crate::DEPOT;

/// What the search is currently trying to reduce. The phases follow the
/// hierarchical objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    ReduceTrucks,
    ReduceWorkers,
    ReduceDistance,
}

/// Owns everything mutable about a solve: the incumbent, the pheromone
/// and tabu state, the phase, the counters and the RNG. The problem
/// itself stays immutable behind the `Arc`.
pub struct Solver {
    pub problem: Arc<Problem>,
    /// The best solution found so far.
    pub best: Solution,
    pub pheromone: Pheromone,
    pub tabu: Tabulist,
    pub stats: Stats,
    pub phase: Phase,
    /// Failed parallel construction attempts since the last success.
    pub attempts: u64,
    /// Total number of constructed solutions.
    pub num_solutions: u64,
    pub start: Instant,
    pub rng: StdRng,
}

impl Solver {
    pub fn new(problem: Arc<Problem>) -> Self {
        let cfg = &problem.cfg;
        debug!(
            "solving {} ({} customers) with {}",
            problem.name,
            problem.num_customers(),
            cfg.metaheuristic
        );
        Solver {
            best: Solution::new(problem.clone()),
            pheromone: Pheromone::new(problem.num_nodes, cfg.initial_pheromone),
            tabu: Tabulist::new(
                problem.num_nodes,
                cfg.tabutime,
                cfg.metaheuristic == Metaheuristic::Ts,
            ),
            stats: Stats::new(problem.num_nodes, cfg.trace_moves),
            phase: Phase::ReduceTrucks,
            attempts: 0,
            num_solutions: 0,
            start: Instant::now(),
            rng: StdRng::seed_from_u64(cfg.seed),
            problem,
        }
    }

    pub fn elapsed_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }

    /// Whether the solver should keep running: neither the runtime nor
    /// the iteration budget may be exhausted.
    pub fn proceed(&self, iteration: u64) -> bool {
        let cfg = &self.problem.cfg;
        let timeout = cfg.runtime != 0 && self.elapsed_secs() >= cfg.runtime;
        let runs_out = cfg.max_iterations != 0 && iteration >= cfg.max_iterations;
        !(timeout || runs_out)
    }

    /// Run the configured metaheuristic until the budget is exhausted.
    /// The incumbent ends up in `self.best`.
    pub fn solve(&mut self) {
        let workers = self.problem.cfg.max_workers;
        match self.problem.cfg.metaheuristic {
            Metaheuristic::None => {
                let problem = self.problem.clone();
                let mut sol = Solution::new(problem.clone());
                self.solve_solomon(&mut sol, workers, problem.num_customers());
                local::do_ls(&mut sol, &mut self.tabu, &mut self.stats);
                sol.calc_costs();
                self.best = sol;
            }
            Metaheuristic::Aco => aco::solve_aco(self, workers),
            Metaheuristic::Gaco => aco::solve_gaco(self, workers),
            Metaheuristic::CachedAco => cached::solve_cached_aco(self, workers),
            Metaheuristic::Grasp => grasp::solve_grasp(self, workers),
            Metaheuristic::CachedGrasp => cached::solve_cached_grasp(self, workers),
            Metaheuristic::Ts => ts::solve_ts(self, workers),
            Metaheuristic::Vns => vns::solve_vns(self, workers),
        }
    }

    /// The deterministic seed for a new route: the unrouted customer
    /// furthest from the depot.
    pub(crate) fn best_seed(sol: &Solution) -> Option<SlotRef> {
        let d = &sol.problem.c_m[0][DEPOT];
        sol.iter_unrouted()
            .min_by_key(|&n| FloatOrd(-d[sol.slots[n].node]))
    }

    /// A stochastic seed for the route about to be opened: a roulette
    /// pick weighted by depot distance times the trail between the
    /// route's virtual depot and the candidate. For non-pheromone
    /// heuristics all trails are equal and only the distance matters.
    pub(crate) fn get_seed(&mut self, sol: &Solution) -> SlotRef {
        let pb = &self.problem;
        let d = &pb.c_m[0][DEPOT];
        let dvr = pb.num_nodes + sol.trucks();
        let candidates: Vec<SlotRef> = sol.iter_unrouted().collect();
        let weights: Vec<f64> = candidates
            .iter()
            .map(|&n| {
                let id = sol.slots[n].node;
                d[id] * (self.pheromone.get(dvr, id) + self.pheromone.get(id, dvr))
            })
            .collect();
        let pick = spin_wheel(&mut self.rng, &weights).expect("no seed selected");
        candidates[pick]
    }

    /// Construct routes with Solomon's I1 heuristic, deterministic or
    /// roulette-randomized depending on the configuration. Stops early
    /// when `fleetsize` routes are open; returns the number of customers
    /// left unrouted.
    pub fn solve_solomon(&mut self, sol: &mut Solution, workers: usize, fleetsize: usize) -> usize {
        let deterministic = self.problem.cfg.deterministic;
        while sol.first_unrouted().is_some() {
            if sol.trucks() == fleetsize {
                return sol.num_unrouted;
            }
            let seed = if deterministic {
                Self::best_seed(sol).expect("an unrouted seed exists")
            } else {
                self.get_seed(sol)
            };
            trace!("new route's seed: {}", sol.slots[seed].node);
            sol.remove_unrouted(seed);
            let route = sol.new_route(seed, workers);
            while sol.first_unrouted().is_some() {
                // fill the current route
                if deterministic {
                    let mut ins = Insertion::unset();
                    for n in sol.iter_unrouted() {
                        sol.update_best_insertion(route, n, &mut ins);
                    }
                    if !ins.cost.is_finite() {
                        break;
                    }
                    trace!("adding node {}", sol.slots[ins.node].node);
                    sol.remove_unrouted(ins.node);
                    sol.add_nodes(ins.target, ins.node, ins.node, ins.after);
                } else {
                    let mut insertions = Vec::with_capacity(sol.num_unrouted);
                    let mut min_cost = f64::INFINITY;
                    for n in sol.iter_unrouted() {
                        let mut ins = Insertion::unset();
                        sol.update_best_insertion(route, n, &mut ins);
                        min_cost = f64::min(min_cost, ins.cost);
                        insertions.push(ins);
                    }
                    if min_cost.is_infinite() {
                        break;
                    }
                    let ins = pick_by_cost(&mut self.rng, &insertions, min_cost)
                        .expect("some insertion is placeable");
                    trace!("adding node {}", sol.slots[ins.node].node);
                    sol.remove_unrouted(ins.node);
                    sol.add_nodes(ins.target, ins.node, ins.node, ins.after);
                }
            }
        }
        0
    }

    /// Log a new incumbent. The cost caches must be up to date.
    pub(crate) fn log_progress(sol: &Solution) {
        info!(
            "{} {} {:.2} -> {:.6} ({} seconds)",
            sol.trucks(),
            sol.workers_cache,
            sol.dist_cache,
            sol.cost_cache,
            sol.time
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::testing;

    fn deterministic_config() -> Config {
        let mut cfg = Config::default();
        cfg.metaheuristic = Metaheuristic::None;
        cfg.deterministic = true;
        cfg.seed = 42;
        cfg
    }

    #[test]
    fn deterministic_solomon_is_reproducible_and_feasible() {
        let cfg = deterministic_config();
        let pb = testing::line_problem(cfg);
        let mut solver = Solver::new(pb.clone());
        solver.solve();
        assert!(solver.best.validate().is_ok());
        assert_eq!(solver.best.num_unrouted, 0);

        let routes = testing::route_ids(&solver.best);
        let mut again = Solver::new(pb);
        again.solve();
        assert_eq!(testing::route_ids(&again.best), routes);
    }

    #[test]
    fn deterministic_seed_is_the_furthest_customer() {
        let cfg = deterministic_config();
        let pb = testing::line_problem(cfg);
        let sol = Solution::new(pb);
        // nodes 3 at (30, 0) and 6 at (30, 10): 6 is further out
        assert_eq!(Solver::best_seed(&sol), Some(6));
    }

    #[test]
    fn deterministic_solomon_without_ls_builds_capacity_bound_routes() {
        let mut cfg = deterministic_config();
        cfg.do_ls = false;
        cfg.max_workers = 1;
        let pb = testing::line_problem(cfg);
        let mut solver = Solver::new(pb);
        solver.solve();

        // 6 customers of demand 10 with capacity 30: two full routes
        assert_eq!(solver.best.trucks(), 2);
        assert_eq!(solver.best.calc_workers(), 2);
        assert!(solver.best.validate().is_ok());
    }

    #[test]
    fn the_budget_gates_progress() {
        let mut cfg = Config::default();
        cfg.runtime = 0;
        cfg.max_iterations = 10;
        let pb = testing::line_problem(cfg);
        let solver = Solver::new(pb);
        assert!(solver.proceed(9));
        assert!(!solver.proceed(10));
        assert!(!solver.proceed(11));
    }

    #[test]
    fn unlimited_iterations_keep_running() {
        let mut cfg = Config::default();
        cfg.runtime = 3600;
        cfg.max_iterations = 0;
        let pb = testing::line_problem(cfg);
        let solver = Solver::new(pb);
        assert!(solver.proceed(u64::MAX - 1));
    }
}
