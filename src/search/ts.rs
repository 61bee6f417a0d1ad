use log::{info, warn};

use crate::search::local::{perform_move, update_move_pairs, Move};
use crate::search::{Phase, Solver};
use crate::solution::{calc_cost, Slot, SlotRef, Solution};

/// Tabu criteria, mainly for the tabu search driver.
///
/// `tags[node][route]` holds the iteration until which moving `node`
/// onto the route with that id is forbidden. One row is allocated per
/// node (row 0, the depot, stays unused so node ids index directly) and
/// one column per possible route id; at worst every customer rides its
/// own route, so `num_nodes - 1` columns suffice.
#[derive(Debug)]
pub struct Tabulist {
    /// Inactive lists accept every move; only tabu search activates it.
    pub active: bool,
    pub iteration: u64,
    tabutime: u64,
    tags: Vec<Vec<u64>>,
}

impl Tabulist {
    pub fn new(num_nodes: usize, tabutime: u64, active: bool) -> Self {
        Tabulist {
            active,
            iteration: 0,
            tabutime,
            tags: vec![vec![0; num_nodes.saturating_sub(1)]; num_nodes],
        }
    }

    /// Whether moving the chain `[first..=last]` onto the route with id
    /// `target_route_id` violates a tabu criterion.
    pub fn is_move_tabu(
        &self,
        slots: &[Slot],
        first: SlotRef,
        last: SlotRef,
        target_route_id: usize,
    ) -> bool {
        if !self.active {
            return false;
        }
        let mut n = first;
        loop {
            if self.tags[slots[n].node][target_route_id] > self.iteration {
                return true;
            }
            if n == last {
                return false;
            }
            n = slots[n].next.expect("run ends before `last`");
        }
    }

    /// Advance the iteration counter and block each moved node from
    /// returning to its source route for the next `tabutime` iterations.
    pub fn update_move(
        &mut self,
        slots: &[Slot],
        first: SlotRef,
        last: SlotRef,
        source_route_id: usize,
    ) {
        if !self.active {
            return;
        }
        self.iteration += 1;
        let mut n = first;
        loop {
            self.tags[slots[n].node][source_route_id] = self.iteration + self.tabutime;
            if n == last {
                break;
            }
            n = slots[n].next.expect("run ends before `last`");
        }
    }
}

/// Solve with tabu search: construct once, then repeatedly apply the
/// single best (possibly worsening) move while the tabu list keeps the
/// search from cycling.
///
/// The switch from truck to worker reduction at the halfway point of the
/// budget is a crude placeholder for a proper strategic oscillation.
pub fn solve_ts(solver: &mut Solver, workers: usize) {
    warn!("tabu search has known gaps: moves never increase trucks or workers");
    let problem = solver.problem.clone();
    let cfg = &problem.cfg;
    let fleetsize = problem.num_customers();

    let mut initial = Solution::new(problem.clone());
    solver.solve_solomon(&mut initial, workers, fleetsize);
    let mut best_cost = initial.calc_costs();
    solver.best = initial;

    let mut sol = solver.best.clone();
    let mut phase = Phase::ReduceTrucks;
    let mut m = Move::new(false);
    loop {
        if cfg.max_iterations != 0 && solver.tabu.iteration * 2 > cfg.max_iterations {
            phase = Phase::ReduceWorkers;
        }
        if cfg.runtime != 0 && solver.elapsed_secs() * 2 > cfg.runtime {
            phase = Phase::ReduceWorkers;
        }
        let updated = update_move_pairs(&mut sol, &solver.tabu, &mut m, phase);
        if m.relocation.is_some() {
            sol.workers_cache -= m.delta_workers;
            sol.dist_cache -= m.delta_dist;
        }
        perform_move(&mut sol, &mut solver.tabu, &mut solver.stats, &mut m);
        sol.cost_cache = calc_cost(cfg, sol.trucks(), sol.workers_cache, sol.dist_cache);
        if sol.cost_cache < best_cost {
            best_cost = sol.cost_cache;
            sol.time = solver.elapsed_secs();
            info!(
                "{} {} {:.2} -> {:.6} ({} seconds)",
                sol.trucks(),
                sol.workers_cache,
                sol.dist_cache,
                sol.cost_cache,
                sol.time
            );
            solver.best = sol.clone();
        }
        if !(updated && solver.proceed(solver.tabu.iteration)) {
            break;
        }
    }
}
