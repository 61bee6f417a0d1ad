use std::sync::Arc;

use itertools::Itertools;

use crate::solution::insertion::Insertion;
use crate::solution::{SlotRef, Solution};
use crate::{DEPOT, MIN_DELTA};

/// Length of a route that serves no customers: just the opening and the
/// closing depot.
pub const EMPTY: usize = 2;

/// A single route, corresponding to a single truck.
///
/// The nodes live in the owning solution's arena; the route only holds
/// the chain ends. `len` counts both depot sentinels.
#[derive(Debug, Clone, Copy)]
pub struct Route {
    /// Stable id, assigned at creation. Used for tabu bookkeeping.
    pub id: usize,
    /// Virtual depot id (`num_nodes + id` at creation), used only for
    /// pheromone indexing.
    pub depot_id: usize,
    /// The opening depot sentinel.
    pub head: SlotRef,
    /// The closing depot sentinel.
    pub tail: SlotRef,
    /// Number of nodes including both depot sentinels.
    pub len: usize,
    /// The truck's current load.
    pub load: f64,
    /// The number of service workers currently assigned.
    pub workers: usize,
}

impl Solution {
    /// Open a new route around a seed customer. The seed must already be
    /// removed from the unrouted list.
    pub fn new_route(&mut self, seed: SlotRef, workers: usize) -> usize {
        let id = self.routes.len();
        let depot_id = self.problem.num_nodes + id;
        let head = self.alloc_depot();
        let tail = self.alloc_depot();
        self.slots[head].next = Some(seed);
        self.slots[seed].prev = Some(head);
        self.slots[seed].next = Some(tail);
        self.slots[tail].prev = Some(seed);
        let load = self.problem.nodes[self.slots[seed].node].demand;
        self.routes.push(Route {
            id,
            depot_id,
            head,
            tail,
            len: EMPTY + 1,
            load,
            workers,
        });
        let r = self.routes.len() - 1;
        self.propagate_ests(r, head, workers);
        self.propagate_lsts(r, tail, workers);
        r
    }

    /// Splice the chain `[first..=last]` in after `after` and update the
    /// start times. The nodes must already be unlinked from any other
    /// route or the unrouted list. Feasibility is not checked.
    pub fn add_nodes(&mut self, r: usize, first: SlotRef, last: SlotRef, after: SlotRef) {
        self.add_nodes_noupdate(r, first, last, after);
        let workers = self.routes[r].workers;
        self.propagate_ests(r, first, workers);
        self.propagate_lsts(r, last, workers);
    }

    pub(crate) fn add_nodes_noupdate(
        &mut self,
        r: usize,
        first: SlotRef,
        last: SlotRef,
        after: SlotRef,
    ) {
        let mut n = first;
        loop {
            self.routes[r].load += self.problem.nodes[self.slots[n].node].demand;
            self.routes[r].len += 1;
            if n == last {
                break;
            }
            n = self.slots[n].next.expect("run ends before `last`");
        }
        let succ = self.slots[after].next.expect("cannot insert after the closing depot");
        self.slots[first].prev = Some(after);
        self.slots[last].next = Some(succ);
        self.slots[succ].prev = Some(last);
        self.slots[after].next = Some(first);
    }

    /// Unlink the chain `[first..=last]` and update the start times of
    /// the remaining nodes.
    pub fn remove_nodes(&mut self, r: usize, first: SlotRef, last: SlotRef) {
        let prev = self.slots[first].prev.expect("first has a predecessor");
        self.remove_nodes_noupdate(r, first, last);
        let workers = self.routes[r].workers;
        let succ = self.slots[prev].next.expect("route keeps its closing depot");
        self.propagate_ests(r, succ, workers);
        self.propagate_lsts(r, prev, workers);
    }

    pub(crate) fn remove_nodes_noupdate(&mut self, r: usize, first: SlotRef, last: SlotRef) {
        let mut n = first;
        loop {
            self.routes[r].load -= self.problem.nodes[self.slots[n].node].demand;
            self.routes[r].len -= 1;
            if n == last {
                break;
            }
            n = self.slots[n].next.expect("run ends before `last`");
        }
        let prev = self.slots[first].prev.expect("first has a predecessor");
        let succ = self.slots[last].next.expect("last has a successor");
        self.slots[prev].next = Some(succ);
        self.slots[succ].prev = Some(prev);
        self.slots[last].next = None;
        self.slots[first].prev = None;
    }

    /// Recompute the actual earliest start times forward from `from`.
    ///
    /// With the route's own worker count the committed `aest` values are
    /// written (the closing depot is skipped; its `aest` is never read).
    /// With any other worker count the scratch `aest_cache` is filled
    /// instead, including the closing depot, which
    /// [`Solution::is_feasible_with`] checks.
    pub(crate) fn propagate_ests(&mut self, r: usize, from: SlotRef, workers: usize) {
        debug_assert!(workers >= 1, "propagate_ests needs at least one worker");
        let pb = Arc::clone(&self.problem);
        let c_m = &pb.c_m[workers];
        let head = self.routes[r].head;
        let mut n = from;
        if self.routes[r].workers == workers {
            if n == head {
                self.slots[n].aest = pb.nodes[DEPOT].est;
                n = match self.slots[n].next {
                    Some(next) => next,
                    None => return,
                };
            }
            while let Some(next) = self.slots[n].next {
                let p = self.slots[n].prev.expect("interior node has a predecessor");
                let id = self.slots[n].node;
                let arrival = self.slots[p].aest + c_m[self.slots[p].node][id];
                self.slots[n].aest = f64::max(pb.nodes[id].est, arrival);
                n = next;
            }
        } else {
            if n == head {
                self.slots[n].aest_cache = pb.nodes[DEPOT].est;
                n = match self.slots[n].next {
                    Some(next) => next,
                    None => return,
                };
            }
            loop {
                let p = self.slots[n].prev.expect("interior node has a predecessor");
                let id = self.slots[n].node;
                let arrival = self.slots[p].aest_cache + c_m[self.slots[p].node][id];
                self.slots[n].aest_cache = f64::max(pb.nodes[id].est, arrival);
                match self.slots[n].next {
                    Some(next) => n = next,
                    None => break,
                }
            }
        }
    }

    /// Recompute the actual latest start times backward from `from`,
    /// mirroring [`Solution::propagate_ests`]: the route's own worker
    /// count writes `alst`, any other fills `alst_cache`.
    pub(crate) fn propagate_lsts(&mut self, r: usize, from: SlotRef, workers: usize) {
        let pb = Arc::clone(&self.problem);
        let c_m = &pb.c_m[workers];
        let tail = self.routes[r].tail;
        let mut n = from;
        if self.routes[r].workers == workers {
            if n == tail {
                self.slots[n].alst = pb.nodes[DEPOT].lst;
                n = match self.slots[n].prev {
                    Some(prev) => prev,
                    None => return,
                };
            }
            while let Some(prev) = self.slots[n].prev {
                let s = self.slots[n].next.expect("interior node has a successor");
                let id = self.slots[n].node;
                let departure = self.slots[s].alst - c_m[id][self.slots[s].node];
                self.slots[n].alst = f64::min(pb.nodes[id].lst, departure);
                n = prev;
            }
        } else {
            if n == tail {
                self.slots[n].alst_cache = pb.nodes[DEPOT].lst;
                n = match self.slots[n].prev {
                    Some(prev) => prev,
                    None => return,
                };
            }
            loop {
                let s = self.slots[n].next.expect("interior node has a successor");
                let id = self.slots[n].node;
                let departure = self.slots[s].alst_cache - c_m[id][self.slots[s].node];
                self.slots[n].alst_cache = f64::min(pb.nodes[id].lst, departure);
                match self.slots[n].prev {
                    Some(prev) => n = prev,
                    None => break,
                }
            }
        }
    }

    /// The total distance of the route.
    pub fn route_length(&self, r: usize) -> f64 {
        let d = &self.problem.c_m[0];
        self.route_slots(r)
            .map(|s| self.slots[s].node)
            .tuple_windows()
            .map(|(a, b)| d[a][b])
            .sum()
    }

    /// Whether `node` fits between `pred` and its successor without
    /// violating any time window. Works off the cached start times, which
    /// is faster than recomputing `max(est, aest + travel)` along the
    /// route. The load is not checked here.
    pub fn can_insert_one(&self, r: usize, node: SlotRef, pred: SlotRef) -> bool {
        let route = &self.routes[r];
        debug_assert!(pred != route.tail, "cannot insert after the closing depot");
        let c_m = &self.problem.c_m[route.workers];
        let n = &self.problem.nodes[self.slots[node].node];
        let pred_id = self.slots[pred].node;
        let succ = self.slots[pred].next.expect("pred has a successor");
        let succ_id = self.slots[succ].node;
        let earliest_arrival = self.slots[pred].aest + c_m[pred_id][n.id];
        let latest_arrival = self.slots[succ].alst - c_m[n.id][succ_id];
        earliest_arrival <= n.lst && latest_arrival >= n.est && earliest_arrival <= latest_arrival
    }

    /// Whether the chain `[first..=last]` fits after `after`, simulated
    /// forward through `aest_cache` without touching the committed start
    /// times. The chain may still be linked into its source route.
    pub fn can_insert_run(
        &mut self,
        r: usize,
        first: SlotRef,
        last: SlotRef,
        after: SlotRef,
    ) -> bool {
        let pb = Arc::clone(&self.problem);
        let c_m = &pb.c_m[self.routes[r].workers];
        let first_id = self.slots[first].node;
        let after_id = self.slots[after].node;
        let arrival = self.slots[after].aest + c_m[after_id][first_id];
        let cache = f64::max(arrival, pb.nodes[first_id].est);
        self.slots[first].aest_cache = cache;
        if cache > pb.nodes[first_id].lst {
            return false;
        }
        let mut cur = first;
        while cur != last {
            let next = self.slots[cur].next.expect("run ends before `last`");
            let (cid, nid) = (self.slots[cur].node, self.slots[next].node);
            let cache = f64::max(self.slots[cur].aest_cache + c_m[cid][nid], pb.nodes[nid].est);
            self.slots[next].aest_cache = cache;
            if cache > pb.nodes[nid].lst {
                return false;
            }
            cur = next;
        }
        let succ = self.slots[after].next.expect("cannot insert after the closing depot");
        let last_id = self.slots[last].node;
        self.slots[last].aest_cache + c_m[last_id][self.slots[succ].node] <= self.slots[succ].alst
    }

    /// Whether the whole route stays time-window feasible when crewed
    /// with `workers` workers instead of its current crew.
    pub fn is_feasible_with(&mut self, r: usize, workers: usize) -> bool {
        if self.routes[r].workers == workers {
            return true;
        }
        let head = self.routes[r].head;
        self.propagate_ests(r, head, workers);
        let pb = Arc::clone(&self.problem);
        let mut n = self.slots[head].next;
        while let Some(cur) = n {
            if self.slots[cur].aest_cache > pb.nodes[self.slots[cur].node].lst {
                return false;
            }
            n = self.slots[cur].next;
        }
        true
    }

    /// Strip workers off the route while it stays feasible with fewer.
    /// Returns whether at least one worker was removed.
    pub fn reduce_service_workers(&mut self, r: usize) -> bool {
        let mut reduced = false;
        let mut workers = self.routes[r].workers - 1;
        while workers >= 1 && self.is_feasible_with(r, workers) {
            self.routes[r].workers = workers;
            let mut n = Some(self.routes[r].head);
            while let Some(cur) = n {
                self.slots[cur].aest = self.slots[cur].aest_cache;
                n = self.slots[cur].next;
            }
            workers -= 1;
            reduced = true;
        }
        if reduced {
            let tail = self.routes[r].tail;
            let workers = self.routes[r].workers;
            self.propagate_lsts(r, tail, workers);
        }
        reduced
    }

    /// Exchange `n1` (on `r1`) with `n2` (on `r2`) and repair both
    /// routes' start times. The caller must have verified feasibility and
    /// left the simulated arrival times in the four affected
    /// `aest_cache`s, as [`crate::search::local::swap_all`] does.
    pub(crate) fn swap_nodes(&mut self, r1: usize, r2: usize, n1: SlotRef, n2: SlotRef) {
        let d1 = self.problem.nodes[self.slots[n1].node].demand;
        let d2 = self.problem.nodes[self.slots[n2].node].demand;
        self.routes[r1].load += d2 - d1;
        self.routes[r2].load += d1 - d2;

        let tmp = self.slots[n1].prev;
        self.slots[n1].prev = self.slots[n2].prev;
        self.slots[n2].prev = tmp;
        let tmp = self.slots[n1].next;
        self.slots[n1].next = self.slots[n2].next;
        self.slots[n2].next = tmp;
        let p1 = self.slots[n1].prev.expect("swapped node has a predecessor");
        let s1 = self.slots[n1].next.expect("swapped node has a successor");
        let p2 = self.slots[n2].prev.expect("swapped node has a predecessor");
        let s2 = self.slots[n2].next.expect("swapped node has a successor");
        self.slots[p1].next = Some(n1);
        self.slots[s1].prev = Some(n1);
        self.slots[p2].next = Some(n2);
        self.slots[s2].prev = Some(n2);

        // n1 now sits on r2 and n2 on r1; their successors were already
        // simulated during the feasibility scan.
        self.slots[n1].aest = self.slots[n1].aest_cache;
        self.slots[s1].aest = self.slots[s1].aest_cache;
        self.slots[n2].aest = self.slots[n2].aest_cache;
        self.slots[s2].aest = self.slots[s2].aest_cache;
        if let Some(ss) = self.slots[s1].next {
            if self.slots[ss].next.is_some() {
                let workers = self.routes[r2].workers;
                self.propagate_ests(r2, ss, workers);
            }
        }
        if let Some(ss) = self.slots[s2].next {
            if self.slots[ss].next.is_some() {
                let workers = self.routes[r1].workers;
                self.propagate_ests(r1, ss, workers);
            }
        }
        let w2 = self.routes[r2].workers;
        self.propagate_lsts(r2, n1, w2);
        let w1 = self.routes[r1].workers;
        self.propagate_lsts(r1, n2, w1);
    }

    /// Update `ins` if this route offers a cheaper insertion position for
    /// `node` under Solomon's I1 cost
    /// `alpha * c_dist + (1 - alpha) * c_time - lambda * d(depot, node)`.
    /// Returns whether `ins` was improved. Cost ties keep the position
    /// tested first.
    pub fn update_best_insertion(&self, r: usize, node: SlotRef, ins: &mut Insertion) -> bool {
        let pb = &self.problem;
        let route = &self.routes[r];
        let n = &pb.nodes[self.slots[node].node];
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
            let succ = self.slots[after].next.expect("route keeps its closing depot");
            if !self.can_insert_one(r, node, after) {
                after = succ;
                continue;
            }
            let a = self.slots[after].node;
            let s = self.slots[succ].node;
            let mut cost = alpha * (d[a][n.id] + d[n.id][s] - cfg.mu * d[a][s]);
            if alpha2 != 0.0 {
                let est_node = f64::max(n.est, self.slots[after].aest + c_m[a][n.id]);
                let est_succ = f64::max(self.slots[succ].aest, est_node + c_m[n.id][s]);
                cost += alpha2 * (est_succ - self.slots[succ].aest);
            }
            // deviation from Solomon: minimize the cost instead of
            // maximizing the attractiveness
            let cost = cost - cfg.lambda * d[DEPOT][n.id];
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

    /// The most attractive insertion position of `node` on this route, or
    /// `None` if no position is feasible. The attractiveness is
    /// `lambda * d(depot, node) - cost`, floored at a tiny positive value
    /// to keep roulette weights positive.
    pub fn best_insertion(&self, r: usize, node: SlotRef) -> Option<Insertion> {
        let pb = &self.problem;
        let route = &self.routes[r];
        let n = &pb.nodes[self.slots[node].node];
        if pb.capacity < route.load + n.demand {
            return None;
        }
        let d = &pb.c_m[0];
        let c_m = &pb.c_m[route.workers];
        let cfg = &pb.cfg;
        let (alpha, alpha2) = (cfg.alpha, 1.0 - cfg.alpha);
        let mut best: Option<Insertion> = None;
        let mut after = route.head;
        while after != route.tail {
            let succ = self.slots[after].next.expect("route keeps its closing depot");
            if !self.can_insert_one(r, node, after) {
                after = succ;
                continue;
            }
            let a = self.slots[after].node;
            let s = self.slots[succ].node;
            let mut cost = alpha * (d[a][n.id] + d[n.id][s] - cfg.mu * d[a][s]);
            if alpha2 != 0.0 {
                let est_node = f64::max(n.est, self.slots[after].aest + c_m[a][n.id]);
                let est_succ = f64::max(self.slots[succ].aest, est_node + c_m[n.id][s]);
                cost += alpha2 * (est_succ - self.slots[succ].aest);
            }
            let mut attractiveness = cfg.lambda * d[DEPOT][n.id] - cost;
            if attractiveness < 0.0 {
                attractiveness = MIN_DELTA;
            }
            if best.map_or(true, |b| attractiveness > b.attractiveness) {
                best = Some(Insertion {
                    target: r,
                    node,
                    after,
                    cost,
                    attractiveness,
                });
            }
            after = succ;
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::solution::Solution;
    use crate::testing::{self, node};
    use crate::problem::Problem;

    #[test]
    fn new_route_holds_the_seed_between_two_depots() {
        let pb = testing::line_problem(Config::default());
        let mut sol = Solution::new(pb);
        sol.remove_unrouted(1);
        let r = sol.new_route(1, 1);

        let route = &sol.routes[r];
        assert_eq!(route.len, 3);
        assert_eq!(route.load, 10.0);
        assert_eq!(route.depot_id, 7);
        assert_eq!(testing::route_ids(&sol), vec![vec![1]]);
        // arrival at the seed is the drive from the depot
        assert_eq!(sol.slots[1].aest, 10.0);
        // latest start leaves room for the trip back: travel 10 + service 10
        assert_eq!(sol.slots[1].alst, 980.0);
        assert_eq!(sol.num_unrouted, 5);
    }

    #[test]
    fn adding_nodes_updates_start_times_and_load() {
        let pb = testing::line_problem(Config::default());
        let mut sol = Solution::new(pb);
        sol.remove_unrouted(1);
        let r = sol.new_route(1, 1);
        sol.remove_unrouted(2);
        sol.add_nodes(r, 2, 2, 1);

        assert_eq!(sol.routes[r].len, 4);
        assert_eq!(sol.routes[r].load, 20.0);
        // depot -> 1 takes 10, service 10, drive 10
        assert_eq!(sol.slots[2].aest, 30.0);
        // node 2 must leave in time for the trip back: travel 20 + service 10
        assert_eq!(sol.slots[2].alst, 970.0);
        // node 1 must leave in time for node 2's latest start
        assert_eq!(sol.slots[1].alst, 950.0);
    }

    #[test]
    fn removing_nodes_restores_the_old_propagation() {
        let pb = testing::line_problem(Config::default());
        let mut sol = Solution::new(pb);
        sol.remove_unrouted(1);
        let r = sol.new_route(1, 1);
        sol.remove_unrouted(2);
        sol.add_nodes(r, 2, 2, 1);
        sol.remove_nodes(r, 2, 2);

        assert_eq!(sol.routes[r].len, 3);
        assert_eq!(sol.routes[r].load, 10.0);
        assert_eq!(sol.slots[1].aest, 10.0);
        assert_eq!(sol.slots[1].alst, 980.0);
        // the removed node is fully unlinked
        assert_eq!(sol.slots[2].prev, None);
        assert_eq!(sol.slots[2].next, None);
    }

    #[test]
    fn can_insert_one_respects_time_windows() {
        let mut cfg = Config::default();
        cfg.adapt_service_times = false;
        let nodes = vec![
            node(0, 0.0, 0.0, 0.0, 0.0, 100.0, 0.0),
            node(1, 10.0, 0.0, 5.0, 0.0, 100.0, 10.0),
            // too late to be reached after serving node 1
            node(2, 20.0, 0.0, 5.0, 0.0, 25.0, 10.0),
            // comfortably wide window
            node(3, 20.0, 0.0, 5.0, 0.0, 90.0, 10.0),
        ];
        let pb = Problem::new("tw".to_string(), nodes, 100.0, cfg).unwrap();
        let mut sol = Solution::new(Arc::new(pb));
        sol.remove_unrouted(1);
        let r = sol.new_route(1, 1);

        // arrival at node 2 after node 1 would be 10 + 10 + 10 = 30 > 25
        assert!(!sol.can_insert_one(r, 2, 1));
        assert!(sol.can_insert_one(r, 3, 1));
        // before node 1 both fit: arrival straight from the depot
        assert!(sol.can_insert_one(r, 2, sol.routes[r].head));
    }

    #[test]
    fn run_insertion_simulates_without_committing() {
        let pb = testing::line_problem(Config::default());
        let mut sol = Solution::new(pb);
        sol.remove_unrouted(4);
        let r0 = sol.new_route(4, 1);
        sol.remove_unrouted(1);
        let r1 = sol.new_route(1, 1);
        sol.remove_unrouted(2);
        sol.add_nodes(r1, 2, 2, 1);

        // moving the pair [1, 2] after node 4 fits the wide windows
        let aest_before = sol.slots[4].aest;
        assert!(sol.can_insert_run(r0, 1, 2, 4));
        // nothing committed: the target route is untouched
        assert_eq!(sol.slots[4].aest, aest_before);
        assert_eq!(testing::route_ids(&sol), vec![vec![4], vec![1, 2]]);
    }

    #[test]
    fn worker_reduction_stops_at_the_tightest_window() {
        let mut cfg = Config::default();
        cfg.adapt_service_times = false;
        cfg.max_workers = 3;
        // Serving 1 with one worker delays 2 beyond its window; two
        // workers just make it.
        let nodes = vec![
            node(0, 0.0, 0.0, 0.0, 0.0, 1000.0, 0.0),
            node(1, 10.0, 0.0, 5.0, 0.0, 1000.0, 10.0),
            node(2, 20.0, 0.0, 5.0, 0.0, 25.0, 10.0),
        ];
        let pb = Arc::new(Problem::new("tight".to_string(), nodes, 100.0, cfg).unwrap());
        let mut sol = Solution::new(pb);
        sol.remove_unrouted(1);
        let r = sol.new_route(1, 3);
        sol.remove_unrouted(2);
        sol.add_nodes(r, 2, 2, 1);

        assert!(sol.is_feasible_with(r, 2));
        assert!(!sol.is_feasible_with(r, 1));

        assert!(sol.reduce_service_workers(r));
        assert_eq!(sol.routes[r].workers, 2);
        // start times were committed for the reduced crew
        assert_eq!(sol.slots[2].aest, 25.0);

        // a second immediate call finds nothing left to strip
        assert!(!sol.reduce_service_workers(r));
        assert_eq!(sol.routes[r].workers, 2);
    }

    #[test]
    fn best_insertion_prefers_the_cheapest_position() {
        let pb = testing::line_problem(Config::default());
        let mut sol = Solution::new(pb);
        sol.remove_unrouted(1);
        let r = sol.new_route(1, 1);
        sol.remove_unrouted(3);
        sol.add_nodes(r, 3, 3, 1);

        // node 2 belongs between 1 and 3: zero detour
        let mut ins = Insertion::unset();
        assert!(sol.update_best_insertion(r, 2, &mut ins));
        assert_eq!(ins.node, 2);
        assert_eq!(ins.after, 1);

        let best = sol.best_insertion(r, 2).unwrap();
        assert_eq!(best.after, 1);
        assert!(best.attractiveness > 0.0);
    }

    #[test]
    fn full_routes_reject_further_insertions() {
        let pb = testing::line_problem(Config::default());
        let mut sol = testing::solved(pb);
        // both routes carry 30/30 already
        let mut ins = Insertion::unset();
        sol.remove_nodes(1, 4, 4);
        assert!(!sol.update_best_insertion(0, 4, &mut ins));
        assert!(sol.best_insertion(0, 4).is_none());
    }
}
