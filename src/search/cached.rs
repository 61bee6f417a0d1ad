use log::debug;

use crate::search::cache::SolutionCache;
use crate::search::{aco, grasp, local, Solver};
use crate::solution::Solution;

/// A single cache entry hit more often than this marks the search as
/// saturated: constructions keep reproducing the same solutions.
const MAX_HITS: u64 = 5;

/// ACO with a solution cache in front of the local search: freshly
/// constructed solutions that were already seen skip the expensive
/// descent entirely. The time at which the cache saturates is recorded
/// as a convergence diagnostic.
pub fn solve_cached_aco(solver: &mut Solver, workers: usize) {
    let problem = solver.problem.clone();
    let cfg = &problem.cfg;
    let mut cache = SolutionCache::new(&problem);
    let mut best_cost = f64::INFINITY;
    let mut saturated = false;
    let mut sol = Solution::new(problem.clone());
    while solver.proceed(solver.num_solutions) {
        for _ in 0..cfg.ants {
            sol.reset();
            aco::aco_construct_routes(solver, &mut sol, workers);
            // the cache hashes the objective value
            sol.calc_costs();
            let hits = cache.contains(&sol);
            if hits > 0 {
                if hits > MAX_HITS && !saturated {
                    saturated = true;
                    solver.best.saturation_time = solver.elapsed_secs();
                    debug!(
                        "solution cache saturated after {} seconds",
                        solver.best.saturation_time
                    );
                }
                continue;
            }
            cache.add(&sol);

            local::do_ls(&mut sol, &mut solver.tabu, &mut solver.stats);
            let cost = sol.calc_costs();
            if cost < best_cost {
                best_cost = cost;
                sol.time = solver.elapsed_secs();
                sol.saturation_time = solver.best.saturation_time;
                Solver::log_progress(&sol);
                std::mem::swap(&mut solver.best, &mut sol);
            }
        }
        solver.num_solutions += cfg.ants as u64;
        solver
            .pheromone
            .update(&solver.best, cfg.rho, cfg.min_pheromone);
    }
    debug!(
        "cache: {} entries, {} queries, {:.1}% hits",
        cache.len(),
        cache.queries(),
        100.0 * cache.hit_rate()
    );
}

/// GRASP with the same cache in front of the local search.
pub fn solve_cached_grasp(solver: &mut Solver, workers: usize) {
    let problem = solver.problem.clone();
    let cfg = &problem.cfg;
    let mut cache = SolutionCache::new(&problem);
    let mut best_cost = f64::INFINITY;
    let mut saturated = false;
    let mut sol = Solution::new(problem.clone());
    while solver.proceed(solver.num_solutions) {
        sol.reset();
        solver.num_solutions += 1;
        grasp::grasp_construct_routes(solver, &mut sol, workers);
        sol.calc_costs();
        let hits = cache.contains(&sol);
        if hits > 0 {
            if hits > MAX_HITS && !saturated {
                saturated = true;
                solver.best.saturation_time = solver.elapsed_secs();
                debug!(
                    "solution cache saturated after {} seconds",
                    solver.best.saturation_time
                );
            }
            continue;
        }
        cache.add(&sol);

        local::do_ls(&mut sol, &mut solver.tabu, &mut solver.stats);
        let cost = sol.calc_costs();
        if cost < best_cost {
            best_cost = cost;
            sol.time = solver.elapsed_secs();
            sol.saturation_time = solver.best.saturation_time;
            Solver::log_progress(&sol);
            std::mem::swap(&mut solver.best, &mut sol);
        }
    }
    debug!(
        "cache: {} entries, {} queries, {:.1}% hits",
        cache.len(),
        cache.queries(),
        100.0 * cache.hit_rate()
    );
}

#[cfg(test)]
mod tests {
    use crate::config::{Config, Metaheuristic};
    use crate::search::Solver;
    use crate::testing;

    fn cached_config(metaheuristic: Metaheuristic) -> Config {
        let mut cfg = Config::default();
        cfg.metaheuristic = metaheuristic;
        cfg.ants = 5;
        cfg.runtime = 0;
        cfg.max_iterations = 40;
        cfg.seed = 29;
        cfg
    }

    #[test]
    fn cached_aco_matches_plain_aco_feasibility() {
        let pb = testing::line_problem(cached_config(Metaheuristic::CachedAco));
        let mut solver = Solver::new(pb);
        solver.solve();
        assert!(solver.best.validate().is_ok());
        assert_eq!(solver.best.trucks(), 2);
    }

    #[test]
    fn cached_grasp_matches_plain_grasp_feasibility() {
        let pb = testing::line_problem(cached_config(Metaheuristic::CachedGrasp));
        let mut solver = Solver::new(pb);
        solver.solve();
        assert!(solver.best.validate().is_ok());
    }
}
