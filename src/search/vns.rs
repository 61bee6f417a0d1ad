use log::{debug, warn};
use rand::Rng;

use crate::search::{local, Phase, Solver};
use crate::solution::Solution;
use crate::stats::Stats;
use crate::search::ts::Tabulist;

/// Shake the solution away from its local optimum: reset every route to
/// the full crew (to give the subsequent search room) and redistribute
/// the nodes of one randomly picked route over the others.
fn shake_solution(solver: &mut Solver, sol: &mut Solution) {
    let max_workers = solver.problem.cfg.max_workers;
    for route in sol.routes.iter_mut() {
        route.workers = max_workers;
    }
    // routes that cannot shed a single node are re-rolled a bounded
    // number of times, otherwise a fully stuck solution would spin here
    let mut tries = 0;
    loop {
        let route = solver.rng.gen_range(0..sol.routes.len());
        if local::distribute_nodes(sol, route) > 0 {
            return;
        }
        tries += 1;
        if tries >= 4 * sol.routes.len() {
            debug!("shake found no movable node; continuing unshaken");
            return;
        }
    }
}

/// The deterministic improvement step of the VNS loop: move and swap
/// until stable, strip workers, move and swap again.
fn improve_solution(sol: &mut Solution, tl: &mut Tabulist, stats: &mut Stats) {
    loop {
        let mut improved = local::move_all(sol, tl, stats, Phase::ReduceTrucks);
        improved |= local::swap_all(sol);
        if !improved {
            break;
        }
    }
    for r in 0..sol.routes.len() {
        sol.reduce_service_workers(r);
    }
    loop {
        let mut improved = local::move_all(sol, tl, stats, Phase::ReduceWorkers);
        improved |= local::swap_all(sol);
        if !improved {
            break;
        }
    }
}

/// Solve with a variable neighbourhood search: construct once, then keep
/// shaking a clone and re-descending, adopting whatever beats the
/// incumbent.
pub fn solve_vns(solver: &mut Solver, workers: usize) {
    warn!("the VNS driver is a plain shake-and-descend loop without neighbourhood schedules");
    let problem = solver.problem.clone();

    let mut initial = Solution::new(problem.clone());
    let fleetsize = initial.num_unrouted;
    solver.solve_solomon(&mut initial, workers, fleetsize);
    local::do_ls(&mut initial, &mut solver.tabu, &mut solver.stats);
    let mut best_cost = initial.calc_costs();
    solver.best = initial;

    let mut sol = solver.best.clone();
    while solver.proceed(solver.num_solutions) {
        shake_solution(solver, &mut sol);
        improve_solution(&mut sol, &mut solver.tabu, &mut solver.stats);
        let cost = sol.calc_costs();
        if cost < best_cost {
            best_cost = cost;
            sol.time = solver.elapsed_secs();
            Solver::log_progress(&sol);
            solver.best = sol.clone();
        }
        solver.num_solutions += 1;
    }
}
