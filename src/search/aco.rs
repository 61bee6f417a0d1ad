use log::debug;

use crate::config::StartHeuristic;
use crate::search::pheromone::Pheromone;
use crate::search::{local, Phase, Solver};
use crate::solution::insertion::{pick_by_attractiveness, pick_by_cost, spin_wheel, Insertion};
use crate::solution::{SlotRef, Solution};
use crate::MIN_DELTA;

/// Insertion costs below this are clamped before dividing a trail by
/// them.
const MIN_COST: f64 = 0.001;

/// Select and run a route construction heuristic for the ACO family.
pub(crate) fn aco_construct_routes(solver: &mut Solver, sol: &mut Solution, workers: usize) {
    match solver.problem.cfg.start_heuristic {
        StartHeuristic::Solomon => solve_solomon_aco(solver, sol, workers),
        StartHeuristic::SolomonMr => solve_solomon_mr(solver, sol, workers),
        StartHeuristic::Parallel => solve_parallel_aco(solver, sol, workers),
    }
}

/// The cheapest insertion position of `node` on route `r`, with the cost
/// skewed by the pheromone trail: attractive trails shrink the cost,
/// repulsive ones inflate it, preserving sign and ordering.
fn calc_aco_insertion(
    sol: &Solution,
    ph: &Pheromone,
    r: usize,
    node: SlotRef,
    ins: &mut Insertion,
) -> bool {
    let pb = &sol.problem;
    let route = &sol.routes[r];
    let n = &pb.nodes[sol.slots[node].node];
    if pb.capacity < route.load + n.demand {
        return false;
    }
    let d = &pb.c_m[0];
    let c_m = &pb.c_m[route.workers];
    let cfg = &pb.cfg;
    let (alpha, alpha2) = (cfg.alpha, 1.0 - cfg.alpha);
    let mut updated = false;
    let mut after = route.head;
    while after != route.tail {
        let succ = sol.slots[after].next.expect("route keeps its closing depot");
        if !sol.can_insert_one(r, node, after) {
            after = succ;
            continue;
        }
        let a = sol.slots[after].node;
        let s = sol.slots[succ].node;
        let mut cost = alpha * (d[a][n.id] + d[n.id][s] - cfg.mu * d[a][s]);
        if alpha2 != 0.0 {
            let est_node = f64::max(n.est, sol.slots[after].aest + c_m[a][n.id]);
            let est_succ = f64::max(sol.slots[succ].aest, est_node + c_m[n.id][s]);
            cost += alpha2 * (est_succ - sol.slots[succ].aest);
        }
        let cost = cost - cfg.lambda * d[crate::DEPOT][n.id];
        let trail = ph.trail(route.depot_id, a, s, n.id);
        let cost = if cost >= 0.0 { cost / trail } else { cost * trail };
        if cost < ins.cost {
            *ins = Insertion {
                target: r,
                node,
                after,
                cost,
                attractiveness: 0.0,
            };
            updated = true;
        }
        after = succ;
    }
    updated
}

/// Like [`calc_aco_insertion`], but maximizing a trail-scaled
/// attractiveness directly instead of minimizing a trail-skewed cost
/// (Reimann's formulation). Neither variant has shown a measurable edge
/// over the other.
fn calc_mr_insertion(
    sol: &Solution,
    ph: &Pheromone,
    r: usize,
    node: SlotRef,
    ins: &mut Insertion,
) -> bool {
    let pb = &sol.problem;
    let route = &sol.routes[r];
    let n = &pb.nodes[sol.slots[node].node];
    if pb.capacity < route.load + n.demand {
        return false;
    }
    let d = &pb.c_m[0];
    let c_m = &pb.c_m[route.workers];
    let cfg = &pb.cfg;
    let (alpha, alpha2) = (cfg.alpha, 1.0 - cfg.alpha);
    let mut updated = false;
    let mut after = route.head;
    while after != route.tail {
        let succ = sol.slots[after].next.expect("route keeps its closing depot");
        if !sol.can_insert_one(r, node, after) {
            after = succ;
            continue;
        }
        let a = sol.slots[after].node;
        let s = sol.slots[succ].node;
        let mut cost = alpha * (d[a][n.id] + d[n.id][s] - cfg.mu * d[a][s]);
        if alpha2 != 0.0 {
            let est_node = f64::max(n.est, sol.slots[after].aest + c_m[a][n.id]);
            let est_succ = f64::max(sol.slots[succ].aest, est_node + c_m[n.id][s]);
            cost += alpha2 * (est_succ - sol.slots[succ].aest);
        }
        let mut attractiveness = cfg.lambda * d[crate::DEPOT][n.id] - cost;
        if attractiveness < 0.0 {
            attractiveness = MIN_DELTA;
        }
        attractiveness *= ph.trail(route.depot_id, a, s, n.id);
        if attractiveness > ins.attractiveness {
            *ins = Insertion {
                target: r,
                node,
                after,
                cost,
                attractiveness,
            };
            updated = true;
        }
        after = succ;
    }
    updated
}

/// Sequential Solomon construction for ACO: per unrouted node the best
/// trail-skewed position on the current route, then a roulette pick over
/// the normalized costs.
pub(crate) fn solve_solomon_aco(solver: &mut Solver, sol: &mut Solution, workers: usize) {
    while sol.first_unrouted().is_some() {
        let seed = solver.get_seed(sol);
        sol.remove_unrouted(seed);
        let route = sol.new_route(seed, workers);
        while sol.first_unrouted().is_some() {
            // fill the current route
            let mut insertions = Vec::with_capacity(sol.num_unrouted);
            let mut min_cost = f64::INFINITY;
            for n in sol.iter_unrouted() {
                let mut ins = Insertion::unset();
                calc_aco_insertion(sol, &solver.pheromone, route, n, &mut ins);
                min_cost = f64::min(min_cost, ins.cost);
                insertions.push(ins);
            }
            if min_cost.is_infinite() {
                break;
            }
            let ins = pick_by_cost(&mut solver.rng, &insertions, min_cost)
                .expect("some insertion is placeable");
            sol.remove_unrouted(ins.node);
            sol.add_nodes(ins.target, ins.node, ins.node, ins.after);
        }
    }
}

/// Sequential Solomon construction in Reimann's formulation: roulette
/// over trail-scaled attractivenesses.
pub(crate) fn solve_solomon_mr(solver: &mut Solver, sol: &mut Solution, workers: usize) {
    while sol.first_unrouted().is_some() {
        let seed = solver.get_seed(sol);
        sol.remove_unrouted(seed);
        let route = sol.new_route(seed, workers);
        while sol.first_unrouted().is_some() {
            let mut insertions = Vec::with_capacity(sol.num_unrouted);
            let mut max_attractiveness = f64::NEG_INFINITY;
            for n in sol.iter_unrouted() {
                let mut ins = Insertion::unset();
                ins.attractiveness = f64::NEG_INFINITY;
                calc_mr_insertion(sol, &solver.pheromone, route, n, &mut ins);
                max_attractiveness = f64::max(max_attractiveness, ins.attractiveness);
                insertions.push(ins);
            }
            if max_attractiveness.is_infinite() {
                break;
            }
            let ins = pick_by_attractiveness(&mut solver.rng, &insertions)
                .expect("some insertion is placeable");
            sol.remove_unrouted(ins.node);
            sol.add_nodes(ins.target, ins.node, ins.node, ins.after);
        }
    }
}

/// All feasible positions of `node` on route `r`, each weighted by
/// `trail / cost`. The depot distance plays no role here: with a fixed
/// route count the node will not get a truck of its own anyway.
fn parallel_positions(
    sol: &Solution,
    ph: &Pheromone,
    r: usize,
    node: SlotRef,
) -> Vec<Insertion> {
    let pb = &sol.problem;
    let route = &sol.routes[r];
    let n = &pb.nodes[sol.slots[node].node];
    let mut out = Vec::new();
    if pb.capacity < route.load + n.demand {
        return out;
    }
    let d = &pb.c_m[0];
    let c_m = &pb.c_m[route.workers];
    let cfg = &pb.cfg;
    let (alpha, alpha2) = (cfg.alpha, 1.0 - cfg.alpha);
    let mut after = route.head;
    while after != route.tail {
        let succ = sol.slots[after].next.expect("route keeps its closing depot");
        if sol.can_insert_one(r, node, after) {
            let a = sol.slots[after].node;
            let s = sol.slots[succ].node;
            let mut cost = alpha * (d[a][n.id] + d[n.id][s] - cfg.mu * d[a][s]);
            if alpha2 != 0.0 {
                let est_node = f64::max(n.est, sol.slots[after].aest + c_m[a][n.id]);
                let est_succ = f64::max(sol.slots[succ].aest, est_node + c_m[n.id][s]);
                cost += alpha2 * (est_succ - sol.slots[succ].aest);
            }
            let trail = ph.trail(route.depot_id, a, s, n.id);
            out.push(Insertion {
                target: r,
                node,
                after,
                cost: -1.0,
                attractiveness: trail / f64::max(cost, MIN_COST),
            });
        }
        after = succ;
    }
    out
}

/// A seed for parallel construction: a roulette pick over the trail
/// between the next virtual depot and the candidates. Two nodes that sat
/// next to the starting depot were automatically on different routes.
fn get_parallel_seed(solver: &mut Solver, sol: &Solution) -> SlotRef {
    let num_nodes = solver.problem.num_nodes;
    let dvr = num_nodes + sol.trucks();
    let candidates: Vec<SlotRef> = sol.iter_unrouted().collect();
    let weights: Vec<f64> = candidates
        .iter()
        .map(|&n| {
            let id = sol.slots[n].node;
            solver.pheromone.get(dvr, id) + solver.pheromone.get(id, dvr)
        })
        .collect();
    let pick = spin_wheel(&mut solver.rng, &weights).expect("no parallel seed selected");
    candidates[pick]
}

/// Open the initial routes for parallel construction: one fewer than the
/// best known truck count while the search still tries to shed trucks.
fn init_parallel_routes(solver: &mut Solver, sol: &mut Solution, workers: usize) {
    let problem = solver.problem.clone();
    let mut max_trucks = solver.best.trucks();
    if max_trucks == 0 {
        // no past solution yet: bootstrap the truck count sequentially
        let mut init = Solution::new(problem.clone());
        solver.solve_solomon(&mut init, workers, problem.num_nodes);
        init.calc_costs();
        solver.best = init;
        max_trucks = solver.best.trucks();
    }
    if solver.phase == Phase::ReduceTrucks {
        max_trucks = (max_trucks - 1).max(1);
    }
    for _ in 0..max_trucks {
        let seed = get_parallel_seed(solver, sol);
        sol.remove_unrouted(seed);
        sol.new_route(seed, workers);
    }
}

/// Construct all routes in parallel: keep one global list of feasible
/// insertions across the open routes and repeatedly pick from it by
/// roulette. Leftover customers that fit nowhere are routed sequentially
/// afterwards; repeated leftovers eventually move the search on to
/// worker reduction.
pub(crate) fn solve_parallel_aco(solver: &mut Solver, sol: &mut Solution, workers: usize) {
    init_parallel_routes(solver, sol, workers);
    let mut insertions: Vec<Insertion> = Vec::new();
    for n in sol.iter_unrouted() {
        for r in 0..sol.routes.len() {
            insertions.extend(parallel_positions(sol, &solver.pheromone, r, n));
        }
    }
    while !insertions.is_empty() {
        let weights: Vec<f64> = insertions.iter().map(|i| i.attractiveness).collect();
        let pick = spin_wheel(&mut solver.rng, &weights).expect("no insertion picked");
        let ins = insertions[pick];
        sol.remove_unrouted(ins.node);
        sol.add_nodes(ins.target, ins.node, ins.node, ins.after);
        // entries naming the inserted node or the grown route are stale
        insertions.retain(|e| e.node != ins.node && e.target != ins.target);
        let mut fresh = Vec::new();
        for n in sol.iter_unrouted() {
            fresh.extend(parallel_positions(sol, &solver.pheromone, ins.target, n));
        }
        insertions.extend(fresh);
    }
    if sol.first_unrouted().is_none() {
        solver.attempts = 0;
    } else {
        solver.attempts += 1;
        if solver.attempts >= solver.problem.cfg.max_failed_attempts
            && solver.phase == Phase::ReduceTrucks
        {
            debug!("parallel construction keeps leaving nodes unrouted; reducing workers instead");
            solver.phase = Phase::ReduceWorkers;
            solver.attempts = 0;
        }
    }
    solve_solomon_aco(solver, sol, workers);
}

/// Solve with the ACO metaheuristic: a batch of ants constructs and
/// locally improves solutions, then the incumbent reinforces the
/// pheromone. The per-route virtual depots are what keeps this
/// convergent.
pub fn solve_aco(solver: &mut Solver, workers: usize) {
    let problem = solver.problem.clone();
    let cfg = &problem.cfg;
    let mut best_cost = f64::INFINITY;
    let mut sol = Solution::new(problem.clone());
    while solver.proceed(solver.num_solutions) {
        for _ in 0..cfg.ants {
            // solve once for each ant
            sol.reset();
            aco_construct_routes(solver, &mut sol, workers);
            local::do_ls(&mut sol, &mut solver.tabu, &mut solver.stats);
            let cost = sol.calc_costs();
            if cost < best_cost {
                best_cost = cost;
                sol.time = solver.elapsed_secs();
                Solver::log_progress(&sol);
                std::mem::swap(&mut solver.best, &mut sol);
            }
        }
        solver.num_solutions += cfg.ants as u64;
        solver
            .pheromone
            .update(&solver.best, cfg.rho, cfg.min_pheromone);
    }
}

/// ACO variant that watches for stagnation: when constructions keep
/// landing on the same cost, the pheromone matrix is reset to escape the
/// attractor.
pub fn solve_gaco(solver: &mut Solver, workers: usize) {
    let problem = solver.problem.clone();
    let cfg = &problem.cfg;
    let mut best_cost = f64::INFINITY;
    let mut local_best_cost = f64::INFINITY;
    let mut count = 0;
    let mut sol = Solution::new(problem.clone());
    while solver.proceed(solver.num_solutions) {
        for _ in 0..cfg.ants {
            aco_construct_routes(solver, &mut sol, workers);
            local::do_ls(&mut sol, &mut solver.tabu, &mut solver.stats);
            let cost = sol.calc_costs();
            if (local_best_cost - cost).abs() < 0.001 {
                count += 1;
                if count >= 2 {
                    count = 0;
                    debug!("search stagnated around {:.6}; resetting pheromone", cost);
                    solver.pheromone.reset(cfg.initial_pheromone);
                    local_best_cost = f64::INFINITY;
                }
            } else if cost < local_best_cost {
                local_best_cost = cost;
                count = 0;
            }
            if cost < best_cost {
                count = 0;
                best_cost = cost;
                sol.time = solver.elapsed_secs();
                Solver::log_progress(&sol);
                std::mem::swap(&mut solver.best, &mut sol);
            }
            sol.reset();
        }
        solver.num_solutions += cfg.ants as u64;
        solver
            .pheromone
            .update(&solver.best, cfg.rho, cfg.min_pheromone);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, Metaheuristic};
    use crate::testing;

    fn aco_config(start: StartHeuristic) -> Config {
        let mut cfg = Config::default();
        cfg.metaheuristic = Metaheuristic::Aco;
        cfg.start_heuristic = start;
        cfg.ants = 5;
        cfg.runtime = 0;
        cfg.max_iterations = 40;
        cfg.seed = 17;
        cfg
    }

    #[test]
    fn aco_terminates_within_budget_with_a_feasible_best() {
        let pb = testing::line_problem(aco_config(StartHeuristic::Solomon));
        let mut solver = Solver::new(pb);
        solver.solve();
        assert!(solver.num_solutions >= 40);
        assert!(solver.best.validate().is_ok());
        // capacity admits no fewer than two trucks; local search finds two
        assert_eq!(solver.best.trucks(), 2);
    }

    #[test]
    fn reimann_construction_also_covers_every_customer() {
        let pb = testing::line_problem(aco_config(StartHeuristic::SolomonMr));
        let mut solver = Solver::new(pb);
        solver.solve();
        assert!(solver.best.validate().is_ok());
    }

    #[test]
    fn parallel_construction_also_covers_every_customer() {
        let pb = testing::line_problem(aco_config(StartHeuristic::Parallel));
        let mut solver = Solver::new(pb);
        solver.solve();
        assert!(solver.best.validate().is_ok());
        assert_eq!(solver.best.trucks(), 2);
    }

    #[test]
    fn gaco_matches_aco_feasibility() {
        let mut cfg = aco_config(StartHeuristic::Solomon);
        cfg.metaheuristic = Metaheuristic::Gaco;
        let pb = testing::line_problem(cfg);
        let mut solver = Solver::new(pb);
        solver.solve();
        assert!(solver.best.validate().is_ok());
    }
}
