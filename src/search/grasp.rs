use crate::search::{local, Solver};
use crate::solution::insertion::InsertionList;
use crate::solution::Solution;

/// Solomon construction with a restricted candidate list: per unrouted
/// node the best position on the current route enters the RCL, and one
/// entry is drawn at random (uniformly or weighted by attractiveness).
pub(crate) fn grasp_construct_routes(solver: &mut Solver, sol: &mut Solution, workers: usize) {
    let problem = solver.problem.clone();
    let cfg = &problem.cfg;
    let mut rcl = InsertionList::new(cfg.rcl_size);
    while sol.first_unrouted().is_some() {
        let seed = solver.get_seed(sol);
        sol.remove_unrouted(seed);
        let route = sol.new_route(seed, workers);
        while sol.first_unrouted().is_some() {
            // fill the current route
            for n in sol.iter_unrouted() {
                if let Some(ins) = sol.best_insertion(route, n) {
                    rcl.update(ins);
                }
            }
            let ins = match rcl.pick(&mut solver.rng, cfg.use_weights) {
                Some(ins) => ins,
                None => break,
            };
            sol.remove_unrouted(ins.node);
            sol.add_nodes(ins.target, ins.node, ins.node, ins.after);
            rcl.clear();
        }
    }
}

/// Solve with GRASP: one randomized construction per iteration, improved
/// by local search and compared to the incumbent.
pub fn solve_grasp(solver: &mut Solver, workers: usize) {
    let problem = solver.problem.clone();
    let mut best_cost = f64::INFINITY;
    let mut sol = Solution::new(problem);
    while solver.proceed(solver.num_solutions) {
        grasp_construct_routes(solver, &mut sol, workers);
        local::do_ls(&mut sol, &mut solver.tabu, &mut solver.stats);
        let cost = sol.calc_costs();
        if cost < best_cost {
            best_cost = cost;
            sol.time = solver.elapsed_secs();
            Solver::log_progress(&sol);
            std::mem::swap(&mut solver.best, &mut sol);
        }
        sol.reset();
        solver.num_solutions += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Metaheuristic};
    use crate::testing;

    fn grasp_config() -> Config {
        let mut cfg = Config::default();
        cfg.metaheuristic = Metaheuristic::Grasp;
        cfg.runtime = 0;
        cfg.max_iterations = 30;
        cfg.seed = 5;
        cfg
    }

    #[test]
    fn bounded_rcl_produces_a_feasible_best() {
        let mut cfg = grasp_config();
        cfg.rcl_size = 3;
        cfg.use_weights = false;
        let pb = testing::line_problem(cfg);
        let mut solver = Solver::new(pb);
        solver.solve();
        assert!(solver.best.validate().is_ok());
        assert_eq!(solver.best.trucks(), 2);
    }

    #[test]
    fn weighted_unbounded_rcl_produces_a_feasible_best() {
        let mut cfg = grasp_config();
        cfg.rcl_size = 0;
        cfg.use_weights = true;
        let pb = testing::line_problem(cfg);
        let mut solver = Solver::new(pb);
        solver.solve();
        assert!(solver.best.validate().is_ok());
    }
}
