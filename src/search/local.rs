use std::sync::Arc;

use log::trace;

use crate::search::ts::Tabulist;
use crate::search::Phase;
use crate::solution::insertion::Insertion;
use crate::solution::{SlotRef, Solution, EMPTY};
use crate::stats::Stats;
use crate::MIN_DELTA;

/// A pending relocation of the chain `[first..=last]` from `source` to
/// the position after `after` on `target`.
#[derive(Debug, Clone, Copy)]
pub struct Relocation {
    pub source: usize,
    pub target: usize,
    pub first: SlotRef,
    pub last: SlotRef,
    pub after: SlotRef,
}

/// The best move candidate found so far, with its savings under the
/// hierarchical objective.
#[derive(Debug)]
pub struct Move {
    pub relocation: Option<Relocation>,
    /// Whether the move empties (and thereby saves) the source route.
    pub delta_trucks: bool,
    /// Workers saved on the source route. Positive implies savings.
    pub delta_workers: usize,
    /// Distance saved. Positive implies savings.
    pub delta_dist: f64,
    /// Whether only improving moves are accepted. Tabu search also
    /// accepts the least-worsening move.
    pub improving: bool,
}

impl Move {
    pub fn new(improving: bool) -> Self {
        Move {
            relocation: None,
            delta_trucks: false,
            delta_workers: 0,
            delta_dist: if improving { 0.0 } else { -f64::MAX },
            improving,
        }
    }

    pub fn reset(&mut self) {
        *self = Move::new(self.improving);
    }

    /// Whether the passed deltas beat this move under the hierarchical
    /// objective: trucks before workers before distance.
    fn improved_by(&self, delta_trucks: bool, delta_workers: usize, delta_dist: f64) -> bool {
        if delta_trucks && !self.delta_trucks {
            return true;
        }
        if delta_trucks == self.delta_trucks {
            if delta_workers > self.delta_workers {
                return true;
            }
            if delta_workers == self.delta_workers && delta_dist - MIN_DELTA > self.delta_dist {
                return true;
            }
        }
        false
    }
}

/// The distance saved by moving `[first..=last]` behind `after`: three
/// edges disappear, three appear.
fn delta_dist_move(sol: &Solution, first: SlotRef, last: SlotRef, after: SlotRef) -> f64 {
    let d = &sol.problem.c_m[0];
    let fp = sol.slots[sol.slots[first].prev.expect("first has a predecessor")].node;
    let f = sol.slots[first].node;
    let l = sol.slots[last].node;
    let ls = sol.slots[sol.slots[last].next.expect("last has a successor")].node;
    let a = sol.slots[after].node;
    let an = sol.slots[sol.slots[after].next.expect("after has a successor")].node;
    d[fp][f] + d[l][ls] - d[fp][ls] + d[a][an] - d[a][f] - d[l][an]
}

/// How many workers the source route can shed once `[first..=last]` is
/// gone. The chain is spliced out temporarily; only reductions beyond
/// `min_reduction` are probed.
fn move_reduces_workers(
    sol: &mut Solution,
    source: usize,
    first: SlotRef,
    last: SlotRef,
    min_reduction: usize,
) -> usize {
    let max_reduction = sol.routes[source].workers - 1;
    let mut probe = min_reduction.max(1);
    let mut reduction = 0;
    let prev = sol.slots[first].prev.expect("first has a predecessor");
    let succ = sol.slots[last].next.expect("last has a successor");
    sol.slots[prev].next = Some(succ);
    sol.slots[succ].prev = Some(prev);
    while probe <= max_reduction {
        let workers = sol.routes[source].workers - probe;
        if !sol.is_feasible_with(source, workers) {
            break;
        }
        reduction = probe;
        probe += 1;
    }
    sol.slots[prev].next = Some(first);
    sol.slots[succ].prev = Some(last);
    reduction
}

/// Update `m` if moving some chain of `len` nodes from `source` to
/// `target` beats it. Feasibility is checked after the savings test,
/// which is cheaper on average; tabu moves are rejected.
///
/// In first-improvement mode the scan stops at the first acceptable
/// candidate.
fn update_move(
    sol: &mut Solution,
    tl: &Tabulist,
    m: &mut Move,
    source: usize,
    target: usize,
    phase: Phase,
    len: usize,
) -> bool {
    let best_moves = sol.problem.cfg.best_moves;
    if sol.problem.cfg.max_move < len {
        return false;
    }
    if sol.routes[source].len < EMPTY + len {
        return false;
    }
    let delta_trucks = sol.routes[source].len == EMPTY + len;
    let mut delta_workers = if delta_trucks {
        sol.routes[source].workers
    } else {
        0
    };
    if m.delta_trucks && !delta_trucks {
        // a truck saving is already on the table
        return false;
    }
    let mut updated = false;
    let target_tail = sol.routes[target].tail;
    let mut after = sol.routes[target].head;
    let mut first = sol.slots[sol.routes[source].head].next.expect("route head is linked");
    let mut last = first;
    for _ in 1..len {
        last = sol.slots[last].next.expect("route holds at least `len` customers");
    }
    while sol.slots[last].next.is_some() {
        if sol.problem.capacity < sol.routes[target].load + sol.sum_demands(first, last) {
            first = sol.slots[first].next.expect("chain continues");
            last = sol.slots[last].next.expect("chain continues");
            continue;
        }
        if phase >= Phase::ReduceWorkers && !delta_trucks {
            delta_workers = move_reduces_workers(sol, source, first, last, m.delta_workers);
        }
        while after != target_tail {
            let delta_dist = delta_dist_move(sol, first, last, after);
            if m.improved_by(delta_trucks, delta_workers, delta_dist)
                && sol.can_insert_run(target, first, last, after)
            {
                let target_id = sol.routes[target].id;
                if !tl.is_move_tabu(&sol.slots, first, last, target_id) {
                    m.relocation = Some(Relocation {
                        source,
                        target,
                        first,
                        last,
                        after,
                    });
                    m.delta_trucks = delta_trucks;
                    m.delta_workers = delta_workers;
                    m.delta_dist = delta_dist;
                    if !best_moves {
                        return true;
                    }
                    updated = true;
                }
            }
            after = sol.slots[after].next.expect("chain continues");
        }
        after = sol.routes[target].head;
        first = sol.slots[first].next.expect("chain continues");
        last = sol.slots[last].next.expect("chain continues");
    }
    updated
}

/// Apply `m` and reset it. A truck-saving move drops the emptied source
/// route, a worker-saving move shrinks the source crew, any other move
/// just relinks and repropagates.
pub(crate) fn perform_move(sol: &mut Solution, tl: &mut Tabulist, stats: &mut Stats, m: &mut Move) {
    let rel = match m.relocation {
        Some(rel) => rel,
        None => return,
    };
    let source_id = sol.routes[rel.source].id;
    let target_id = sol.routes[rel.target].id;
    tl.update_move(&sol.slots, rel.first, rel.last, source_id);
    document_run(sol, stats, &rel, m);
    if m.delta_trucks {
        sol.remove_nodes_noupdate(rel.source, rel.first, rel.last);
        sol.remove_route(rel.source);
    } else if m.delta_workers > 0 {
        sol.remove_nodes_noupdate(rel.source, rel.first, rel.last);
        sol.routes[rel.source].workers -= m.delta_workers;
        let route = sol.routes[rel.source];
        sol.propagate_ests(rel.source, route.head, route.workers);
        sol.propagate_lsts(rel.source, route.tail, route.workers);
    } else {
        sol.remove_nodes(rel.source, rel.first, rel.last);
    }
    // the source index may have shifted if its route was dropped
    let target = sol.route_index(target_id);
    sol.add_nodes(target, rel.first, rel.last, rel.after);
    m.reset();
}

fn document_run(sol: &Solution, stats: &mut Stats, rel: &Relocation, m: &Move) {
    if !stats.active() {
        return;
    }
    let source_id = sol.routes[rel.source].id;
    let target_id = sol.routes[rel.target].id;
    let mut n = rel.first;
    loop {
        stats.record_move(
            sol.slots[n].node,
            source_id,
            sol.slots[sol.slots[n].prev.expect("moved node is linked")].node,
            sol.slots[sol.slots[n].next.expect("moved node is linked")].node,
            target_id,
            sol.slots[rel.after].node,
            sol.slots[sol.slots[rel.after].next.expect("after has a successor")].node,
            m.delta_trucks,
            m.delta_workers,
            m.delta_dist,
        );
        if n == rel.last {
            break;
        }
        n = sol.slots[n].next.expect("run ends before `last`");
    }
}

/// Perform all useful move operations, first-improvement style: longer
/// chains first, rescanning after every applied move.
pub fn move_all(sol: &mut Solution, tl: &mut Tabulist, stats: &mut Stats, phase: Phase) -> bool {
    if sol.problem.cfg.best_moves {
        return move_all_best(sol, tl, stats, phase);
    }
    let mut success = false;
    let mut m = Move::new(true);
    let mut len = sol.problem.cfg.max_move;
    while len > 0 {
        loop {
            let mut updated = false;
            let mut i = sol.routes.len().saturating_sub(1);
            while i >= 1 {
                let mut j = i - 1;
                loop {
                    updated |= update_move(sol, tl, &mut m, j, i, phase, len);
                    let saved_truck = m.delta_trucks;
                    perform_move(sol, tl, stats, &mut m);
                    if saved_truck {
                        break; // route j is gone
                    }
                    updated |= update_move(sol, tl, &mut m, i, j, phase, len);
                    let saved_truck = m.delta_trucks;
                    perform_move(sol, tl, stats, &mut m);
                    if saved_truck {
                        break; // route i is gone
                    }
                    if j == 0 {
                        break;
                    }
                    j -= 1;
                }
                if i == 1 {
                    break;
                }
                i -= 1;
            }
            success |= updated;
            if !updated {
                break;
            }
        }
        len -= 1;
    }
    success
}

/// One scan over all route pairs in both directions and with both chain
/// lengths, accumulating the best candidate in `m`.
pub(crate) fn update_move_pairs(
    sol: &mut Solution,
    tl: &Tabulist,
    m: &mut Move,
    phase: Phase,
) -> bool {
    let mut updated = false;
    let mut i = sol.routes.len().saturating_sub(1);
    while i >= 1 {
        for j in (0..i).rev() {
            updated |= update_move(sol, tl, m, j, i, phase, 2);
            updated |= update_move(sol, tl, m, i, j, phase, 2);
            updated |= update_move(sol, tl, m, j, i, phase, 1);
            updated |= update_move(sol, tl, m, i, j, phase, 1);
        }
        if i == 1 {
            break;
        }
        i -= 1;
    }
    updated
}

/// Perform all useful move operations, applying only the single best
/// move per pass over all route pairs and both chain lengths.
pub fn move_all_best(sol: &mut Solution, tl: &mut Tabulist, stats: &mut Stats, phase: Phase) -> bool {
    let mut success = false;
    let mut m = Move::new(true);
    loop {
        let updated = update_move_pairs(sol, tl, &mut m, phase);
        perform_move(sol, tl, stats, &mut m);
        success |= updated;
        if !updated {
            break;
        }
    }
    success
}

/// Perform the first feasible swap between `r1` and `r2` that shortens
/// the total distance.
fn swap_node(sol: &mut Solution, r1: usize, r2: usize) -> bool {
    let pb = Arc::clone(&sol.problem);
    let capacity = pb.capacity;
    let d = &pb.c_m[0];
    let c_m1 = &pb.c_m[sol.routes[r1].workers];
    let c_m2 = &pb.c_m[sol.routes[r2].workers];
    let mut n1 = sol.slots[sol.routes[r1].head].next.expect("route head is linked");
    while sol.slots[n1].next.is_some() {
        let mut n2 = sol.slots[sol.routes[r2].head].next.expect("route head is linked");
        while sol.slots[n2].next.is_some() {
            let (id1, id2) = (sol.slots[n1].node, sol.slots[n2].node);
            let (dm1, dm2) = (pb.nodes[id1].demand, pb.nodes[id2].demand);
            if capacity < sol.routes[r1].load - dm1 + dm2
                || capacity < sol.routes[r2].load - dm2 + dm1
            {
                n2 = sol.slots[n2].next.expect("chain continues");
                continue;
            }
            let p1 = sol.slots[n1].prev.expect("interior node has a predecessor");
            let p2 = sol.slots[n2].prev.expect("interior node has a predecessor");
            let s1 = sol.slots[n1].next.expect("interior node has a successor");
            let s2 = sol.slots[n2].next.expect("interior node has a successor");
            // when do we get to n1 on r2, and to n2 on r1?
            let c1 = f64::max(
                sol.slots[p2].aest + c_m2[sol.slots[p2].node][id1],
                pb.nodes[id1].est,
            );
            let c2 = f64::max(
                sol.slots[p1].aest + c_m1[sol.slots[p1].node][id2],
                pb.nodes[id2].est,
            );
            sol.slots[n1].aest_cache = c1;
            sol.slots[n2].aest_cache = c2;
            if c1 <= pb.nodes[id1].lst && c2 <= pb.nodes[id2].lst {
                let (s1id, s2id) = (sol.slots[s1].node, sol.slots[s2].node);
                let cs1 = f64::max(c2 + c_m1[id2][s1id], pb.nodes[s1id].est);
                let cs2 = f64::max(c1 + c_m2[id1][s2id], pb.nodes[s2id].est);
                sol.slots[s1].aest_cache = cs1;
                sol.slots[s2].aest_cache = cs2;
                if cs1 <= sol.slots[s1].alst && cs2 <= sol.slots[s2].alst {
                    let (p1id, p2id) = (sol.slots[p1].node, sol.slots[p2].node);
                    let savings = d[p1id][id1] + d[id1][s1id] + d[p2id][id2] + d[id2][s2id]
                        - d[p1id][id2]
                        - d[id2][s1id]
                        - d[p2id][id1]
                        - d[id1][s2id];
                    if savings > MIN_DELTA {
                        trace!("swapping nodes {} and {}", id1, id2);
                        sol.swap_nodes(r1, r2, n1, n2);
                        return true;
                    }
                }
            }
            n2 = sol.slots[n2].next.expect("chain continues");
        }
        n1 = sol.slots[n1].next.expect("chain continues");
    }
    false
}

/// Perform all feasible swaps that shorten the total distance; repeat
/// until a full pass over the route pairs finds none.
pub fn swap_all(sol: &mut Solution) -> bool {
    let max_swap = sol.problem.cfg.max_swap;
    let mut success = false;
    loop {
        let mut improved = false;
        if max_swap >= 1 {
            let mut i = sol.routes.len().saturating_sub(1);
            while i >= 1 {
                for j in (0..i).rev() {
                    improved |= swap_node(sol, i, j);
                }
                if i == 1 {
                    break;
                }
                i -= 1;
            }
        }
        success |= improved;
        if !improved {
            break;
        }
    }
    success
}

/// Try to empty a route by best-insertion of each of its customers onto
/// the other routes; stops at the first customer that fits nowhere.
/// Potentially worsens the solution, so callers work on clones.
fn empty_route(sol: &mut Solution, route_idx: usize) -> bool {
    if sol.routes[route_idx].len == EMPTY {
        return true;
    }
    let tail = sol.routes[route_idx].tail;
    let mut n = sol.slots[sol.routes[route_idx].head].next.expect("route head is linked");
    while n != tail {
        let mut ins = Insertion::unset();
        for j in 0..sol.routes.len() {
            if j == route_idx {
                continue; // don't move nodes from a route to itself
            }
            sol.update_best_insertion(j, n, &mut ins);
        }
        n = sol.slots[n].next.expect("chain continues");
        if !ins.cost.is_finite() {
            break;
        }
        sol.remove_nodes(route_idx, ins.node, ins.node);
        sol.add_nodes(ins.target, ins.node, ins.node, ins.after);
        if sol.routes[route_idx].len == EMPTY {
            return true;
        }
    }
    false
}

/// Move all nodes off a route that can be moved, skipping stuck ones.
/// Returns the number of nodes moved; drops the route if it empties.
/// Usually worsens the solution; this is the VNS shake primitive.
pub(crate) fn distribute_nodes(sol: &mut Solution, route_idx: usize) -> usize {
    if sol.routes[route_idx].len == EMPTY {
        return 0;
    }
    let old_len = sol.routes[route_idx].len;
    let tail = sol.routes[route_idx].tail;
    let mut n = sol.slots[sol.routes[route_idx].head].next.expect("route head is linked");
    while n != tail {
        let mut ins = Insertion::unset();
        for j in 0..sol.routes.len() {
            if j == route_idx {
                continue;
            }
            sol.update_best_insertion(j, n, &mut ins);
        }
        n = sol.slots[n].next.expect("chain continues");
        if !ins.cost.is_finite() {
            continue;
        }
        sol.remove_nodes(route_idx, ins.node, ins.node);
        sol.add_nodes(ins.target, ins.node, ins.node, ins.after);
        if sol.routes[route_idx].len == EMPTY {
            sol.remove_route(route_idx);
            return old_len - EMPTY;
        }
    }
    old_len - sol.routes[route_idx].len
}

/// Try to drop whole routes: attempt to empty each route in turn on a
/// clone, committing the clone only when the route empties completely.
pub fn brute_reduce_trucks(sol: &mut Solution) -> bool {
    let mut improved = false;
    loop {
        let mut reduced = false;
        for i in 0..sol.routes.len() {
            let mut clone = sol.clone();
            if empty_route(&mut clone, i) {
                clone.remove_route(i);
                *sol = clone;
                improved = true;
                reduced = true;
                break;
            }
        }
        if !reduced {
            break;
        }
    }
    improved
}

/// Reduce the number of trucks until no operator makes progress.
/// Emptying routes up front performs slightly better than doing it last,
/// at the occasional cost of extra workers and distance.
pub fn reduce_trucks(sol: &mut Solution, tl: &mut Tabulist, stats: &mut Stats) {
    loop {
        let mut improved = false;
        improved |= brute_reduce_trucks(sol);
        improved |= move_all(sol, tl, stats, Phase::ReduceTrucks);
        improved |= swap_all(sol);
        if !improved {
            break;
        }
    }
}

/// Strip superfluous workers everywhere, then keep moving and swapping
/// until no operator makes progress.
pub fn reduce_workers(sol: &mut Solution, tl: &mut Tabulist, stats: &mut Stats) {
    for r in 0..sol.routes.len() {
        sol.reduce_service_workers(r);
    }
    loop {
        let mut improved = false;
        improved |= move_all(sol, tl, stats, Phase::ReduceWorkers);
        improved |= swap_all(sol);
        if !improved {
            break;
        }
    }
}

/// The full local search: reduce trucks, then workers. With local search
/// disabled only unused workers are removed.
pub fn do_ls(sol: &mut Solution, tl: &mut Tabulist, stats: &mut Stats) {
    if sol.problem.cfg.do_ls {
        reduce_trucks(sol, tl, stats);
        if sol.problem.cfg.max_workers > 1 {
            reduce_workers(sol, tl, stats);
        }
    } else {
        for r in 0..sol.routes.len() {
            sol.reduce_service_workers(r);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::solution::Solution;
    use crate::testing;

    fn no_tabu() -> Tabulist {
        Tabulist::new(7, 50, false)
    }

    fn three_routes(cfg: Config) -> Solution {
        let pb = testing::line_problem(cfg);
        let mut sol = Solution::new(pb);
        for group in [vec![1, 2], vec![3], vec![4, 5, 6]] {
            sol.remove_unrouted(group[0]);
            let r = sol.new_route(group[0], 1);
            let mut prev = group[0];
            for &n in &group[1..] {
                sol.remove_unrouted(n);
                sol.add_nodes(r, n, n, prev);
                prev = n;
            }
        }
        sol
    }

    #[test]
    fn comparator_ranks_trucks_over_workers_over_distance() {
        let m = Move::new(true);
        assert!(m.improved_by(true, 0, -50.0));
        assert!(m.improved_by(false, 1, -50.0));
        assert!(m.improved_by(false, 0, 1.0));
        // no gain at all is not an improvement
        assert!(!m.improved_by(false, 0, 0.0));
        // within the tolerance is not an improvement either
        assert!(!m.improved_by(false, 0, MIN_DELTA / 2.0));

        let mut best = Move::new(true);
        best.delta_trucks = true;
        best.delta_workers = 1;
        assert!(!best.improved_by(false, 5, 100.0));
        assert!(best.improved_by(true, 2, -10.0));
    }

    #[test]
    fn non_improving_moves_accept_any_candidate() {
        let m = Move::new(false);
        assert!(m.improved_by(false, 0, -1000.0));
    }

    #[test]
    fn move_all_merges_a_single_customer_route() {
        let mut sol = three_routes(Config::default());
        let mut tl = no_tabu();
        let mut stats = Stats::new(7, false);
        assert_eq!(sol.trucks(), 3);

        assert!(move_all(&mut sol, &mut tl, &mut stats, Phase::ReduceTrucks));
        assert_eq!(sol.trucks(), 2);
        assert!(sol.validate().is_ok());
    }

    #[test]
    fn first_improvement_mode_merges_too() {
        let mut cfg = Config::default();
        cfg.best_moves = false;
        let mut sol = three_routes(cfg);
        let mut tl = no_tabu();
        let mut stats = Stats::new(7, false);

        assert!(move_all(&mut sol, &mut tl, &mut stats, Phase::ReduceTrucks));
        assert_eq!(sol.trucks(), 2);
        assert!(sol.validate().is_ok());
    }

    #[test]
    fn brute_reduce_commits_only_complete_evictions() {
        let mut sol = three_routes(Config::default());
        assert!(brute_reduce_trucks(&mut sol));
        assert_eq!(sol.trucks(), 2);
        assert!(sol.validate().is_ok());
        // both remaining routes are at capacity; no further reduction
        assert!(!brute_reduce_trucks(&mut sol));
    }

    #[test]
    fn swap_all_untangles_crossed_routes() {
        let pb = testing::line_problem(Config::default());
        let mut sol = Solution::new(pb);
        // crossed assignment: [1, 5] and [4, 2]
        for group in [[1, 5], [4, 2]] {
            sol.remove_unrouted(group[0]);
            let r = sol.new_route(group[0], 1);
            sol.remove_unrouted(group[1]);
            sol.add_nodes(r, group[1], group[1], group[0]);
        }
        let before = sol.calc_dist();
        assert!(swap_all(&mut sol));
        assert!(sol.calc_dist() < before - MIN_DELTA);
        // loads are preserved by the exchange
        assert_eq!(sol.routes[0].load, 20.0);
        assert_eq!(sol.routes[1].load, 20.0);
    }

    #[test]
    fn local_search_never_worsens_the_objective() {
        let mut cfg = Config::default();
        cfg.max_workers = 3;
        let pb = testing::line_problem(cfg);
        let mut sol = Solution::new(pb);
        for group in [vec![1, 2], vec![3], vec![4, 5, 6]] {
            sol.remove_unrouted(group[0]);
            let r = sol.new_route(group[0], 3);
            let mut prev = group[0];
            for &n in &group[1..] {
                sol.remove_unrouted(n);
                sol.add_nodes(r, n, n, prev);
                prev = n;
            }
        }
        let before = (sol.trucks(), sol.calc_workers(), sol.calc_dist());

        let mut tl = no_tabu();
        let mut stats = Stats::new(7, false);
        do_ls(&mut sol, &mut tl, &mut stats);

        let after = (sol.trucks(), sol.calc_workers(), sol.calc_dist());
        assert!(after <= before);
        // the wide windows admit single-worker routes
        assert!(sol.routes.iter().all(|r| r.workers == 1));
        assert!(sol.validate().is_ok());
    }

    #[test]
    fn disabled_local_search_still_trims_workers() {
        let mut cfg = Config::default();
        cfg.do_ls = false;
        cfg.max_workers = 3;
        let pb = testing::line_problem(cfg);
        let mut sol = Solution::new(pb);
        sol.remove_unrouted(1);
        let r = sol.new_route(1, 3);
        sol.remove_unrouted(2);
        sol.add_nodes(r, 2, 2, 1);

        let mut tl = no_tabu();
        let mut stats = Stats::new(7, false);
        do_ls(&mut sol, &mut tl, &mut stats);
        assert_eq!(sol.trucks(), 1);
        assert_eq!(sol.routes[0].workers, 1);
    }
}
