pub mod insertion;
pub mod route;

use std::sync::Arc;

use derive_more::Display;
use log::warn;

use crate::config::Config;
use crate::problem::{Cost, Problem};

pub use route::{Route, EMPTY};

/// Index of a node record in a solution's arena.
///
/// Customer slots occupy the indices `1..num_nodes` and coincide with the
/// customer's node id; depot sentinel slots are allocated past that range
/// and recycled through a free list.
pub type SlotRef = usize;

/// One record of the node arena: a customer or a per-route depot clone.
///
/// `prev`/`next` thread the record either into a route's node chain or
/// into the solution's list of unrouted customers. A record is in at most
/// one chain at a time.
#[derive(Debug, Clone)]
pub struct Slot {
    /// The problem node this record stands for (0 for depot sentinels).
    pub node: usize,
    /// Actual earliest service start as currently positioned.
    pub aest: f64,
    /// Actual latest service start as currently positioned.
    pub alst: f64,
    /// Scratch value for probing alternative worker counts without
    /// touching the committed `aest`.
    pub aest_cache: f64,
    pub alst_cache: f64,
    pub prev: Option<SlotRef>,
    pub next: Option<SlotRef>,
}

impl Slot {
    fn new(node: usize) -> Self {
        Slot {
            node,
            aest: -1.0,
            alst: -1.0,
            aest_cache: -1.0,
            alst_cache: -1.0,
            prev: None,
            next: None,
        }
    }
}

/// A (possibly partial) solution: a set of routes plus the customers not
/// yet assigned to any route.
///
/// The cached totals (`workers_cache`, `dist_cache`, `cost_cache`) are
/// only refreshed by [`Solution::calc_costs`] and may be stale in
/// between. Cloning yields a fully independent copy; only the problem
/// behind the `Arc` is shared.
#[derive(Debug, Clone)]
pub struct Solution {
    pub problem: Arc<Problem>,
    pub slots: Vec<Slot>,
    /// Recycled depot sentinel slots.
    free: Vec<SlotRef>,
    pub routes: Vec<Route>,
    /// Head of the doubly linked list of unrouted customers.
    unrouted: Option<SlotRef>,
    pub num_unrouted: usize,
    /// Seconds into the solve at which this solution was found.
    pub time: u64,
    /// Seconds until the solution cache saturated, or 0.
    pub saturation_time: u64,
    pub workers_cache: usize,
    pub dist_cache: f64,
    pub cost_cache: Cost,
}

#[derive(Debug, Display, PartialEq)]
pub enum SolutionError {
    #[display(fmt = "the solution contains no routes")]
    NoRoutes,
    #[display(fmt = "time window collision at node {} on route {}", node, route)]
    TimeWindowViolation { node: usize, route: usize },
    #[display(fmt = "route {} exceeds the capacity ({:.2}/{:.2})", route, load, capacity)]
    CapacityExceeded { route: usize, load: f64, capacity: f64 },
    #[display(fmt = "node {} was served more than once", node)]
    ServedMoreThanOnce { node: usize },
    #[display(fmt = "node {} was not served at all", node)]
    NotServed { node: usize },
}

impl std::error::Error for SolutionError {}

impl Solution {
    /// An unsolved solution: no routes, every customer unrouted.
    pub fn new(problem: Arc<Problem>) -> Self {
        let n = problem.num_nodes;
        let mut slots: Vec<Slot> = (0..n).map(Slot::new).collect();
        for i in 1..n {
            slots[i].prev = (i > 1).then(|| i - 1);
            slots[i].next = (i + 1 < n).then(|| i + 1);
        }
        Solution {
            problem,
            slots,
            free: Vec::new(),
            routes: Vec::new(),
            unrouted: (n > 1).then_some(1),
            num_unrouted: n - 1,
            time: 0,
            saturation_time: 0,
            workers_cache: 0,
            dist_cache: 0.0,
            cost_cache: 0.0,
        }
    }

    /// The number of trucks (routes) in use.
    pub fn trucks(&self) -> usize {
        self.routes.len()
    }

    pub fn iter_unrouted(&self) -> ChainIter<'_> {
        ChainIter {
            slots: &self.slots,
            cur: self.unrouted,
        }
    }

    /// All slots of a route, from the opening to the closing depot.
    pub fn route_slots(&self, r: usize) -> ChainIter<'_> {
        ChainIter {
            slots: &self.slots,
            cur: Some(self.routes[r].head),
        }
    }

    pub(crate) fn first_unrouted(&self) -> Option<SlotRef> {
        self.unrouted
    }

    /// Unlink an unrouted customer. Must happen before the node is added
    /// to a route; the chain links are reused for the route.
    pub fn remove_unrouted(&mut self, n: SlotRef) {
        match self.slots[n].prev {
            Some(p) => self.slots[p].next = self.slots[n].next,
            None => self.unrouted = self.slots[n].next,
        }
        if let Some(s) = self.slots[n].next {
            self.slots[s].prev = self.slots[n].prev;
        }
        self.num_unrouted -= 1;
    }

    pub(crate) fn alloc_depot(&mut self) -> SlotRef {
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Slot::new(crate::DEPOT);
                idx
            }
            None => {
                self.slots.push(Slot::new(crate::DEPOT));
                self.slots.len() - 1
            }
        }
    }

    fn free_depot(&mut self, idx: SlotRef) {
        self.free.push(idx);
    }

    /// Sum of the demands of the chain `[first..=last]`.
    pub fn sum_demands(&self, first: SlotRef, last: SlotRef) -> f64 {
        let mut n = first;
        let mut demand = self.problem.nodes[self.slots[n].node].demand;
        while n != last {
            n = self.slots[n].next.expect("chain ends before `last`");
            demand += self.problem.nodes[self.slots[n].node].demand;
        }
        demand
    }

    /// Recompute and cache the totals; returns the objective value
    /// `trucks * cost_truck + workers * cost_worker + dist * cost_distance`.
    pub fn calc_costs(&mut self) -> Cost {
        let workers = self.routes.iter().map(|r| r.workers).sum();
        let dist = (0..self.routes.len()).map(|r| self.route_length(r)).sum();
        self.workers_cache = workers;
        self.dist_cache = dist;
        self.cost_cache = calc_cost(&self.problem.cfg, self.trucks(), workers, dist);
        self.cost_cache
    }

    /// The total distance travelled, without touching the caches.
    pub fn calc_dist(&self) -> f64 {
        (0..self.routes.len()).map(|r| self.route_length(r)).sum()
    }

    /// The total number of workers, without touching the caches.
    pub fn calc_workers(&self) -> usize {
        self.routes.iter().map(|r| r.workers).sum()
    }

    /// Index of the route with the given id.
    pub fn route_index(&self, route_id: usize) -> usize {
        self.routes
            .iter()
            .position(|r| r.id == route_id)
            .expect("route id not found in solution")
    }

    /// Drop an empty route. Removing a route that still serves customers
    /// is a bug in the caller.
    pub fn remove_route(&mut self, route_idx: usize) {
        let route = &self.routes[route_idx];
        assert!(
            route.len == EMPTY,
            "remove_route called on non-empty route {}",
            route.id
        );
        let (head, tail) = (route.head, route.tail);
        self.free_depot(head);
        self.free_depot(tail);
        self.routes.remove(route_idx);
    }

    /// Return the solution to its freshly initialized state: all routes
    /// dissolved, every customer unrouted again.
    pub fn reset(&mut self) {
        let routes = std::mem::take(&mut self.routes);
        for route in routes {
            if route.len > EMPTY {
                let first = self.slots[route.head].next.expect("route head is linked");
                let last = self.slots[route.tail].prev.expect("route tail is linked");
                self.slots[last].next = self.unrouted;
                if let Some(u) = self.unrouted {
                    self.slots[u].prev = Some(last);
                }
                self.unrouted = Some(first);
                self.slots[first].prev = None;
            }
            self.free_depot(route.head);
            self.free_depot(route.tail);
        }
        self.num_unrouted = self.problem.num_nodes - 1;
        self.workers_cache = 0;
        self.dist_cache = 0.0;
        self.time = 0;
        self.saturation_time = 0;
    }

    /// Re-validate the finished solution from scratch, ignoring all
    /// cached start times: every route must be time-window and capacity
    /// feasible, and every customer served exactly once.
    pub fn validate(&self) -> Result<(), SolutionError> {
        use SolutionError::*;
        let pb = &self.problem;
        if self.routes.is_empty() && pb.num_customers() > 0 {
            return Err(NoRoutes);
        }
        let mut served = vec![0u32; pb.num_nodes];
        for (idx, route) in self.routes.iter().enumerate() {
            let c_m = &pb.c_m[route.workers];
            let mut load = 0.0;
            let mut est = pb.nodes[crate::DEPOT].est;
            let mut prev = crate::DEPOT;
            for slot in self.route_slots(idx).skip(1) {
                let id = self.slots[slot].node;
                load += pb.nodes[id].demand;
                est = f64::max(pb.nodes[id].est, est + c_m[prev][id]);
                if est > pb.nodes[id].lst {
                    warn!("time window collision at node {} on route {}", id, route.id);
                    return Err(TimeWindowViolation { node: id, route: idx });
                }
                if slot != route.tail {
                    served[id] += 1;
                }
                prev = id;
            }
            if load > pb.capacity {
                warn!("route {} exceeds its capacity ({}/{})", route.id, load, pb.capacity);
                return Err(CapacityExceeded {
                    route: idx,
                    load,
                    capacity: pb.capacity,
                });
            }
        }
        for (id, &count) in served.iter().enumerate().skip(1) {
            if count > 1 {
                return Err(ServedMoreThanOnce { node: id });
            }
            if count < 1 {
                return Err(NotServed { node: id });
            }
        }
        Ok(())
    }
}

/// The objective value for the given totals.
pub fn calc_cost(cfg: &Config, trucks: usize, workers: usize, distance: f64) -> Cost {
    distance * cfg.cost_distance + workers as f64 * cfg.cost_worker + trucks as f64 * cfg.cost_truck
}

/// Iterator over a `prev`/`next` chain in a solution's arena.
pub struct ChainIter<'a> {
    slots: &'a [Slot],
    cur: Option<SlotRef>,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = SlotRef;

    fn next(&mut self) -> Option<Self::Item> {
        let cur = self.cur?;
        self.cur = self.slots[cur].next;
        Some(cur)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn new_solution_has_all_customers_unrouted() {
        let pb = testing::line_problem(Config::default());
        let sol = Solution::new(pb);
        assert_eq!(sol.num_unrouted, 6);
        assert_eq!(sol.trucks(), 0);
        let unrouted: Vec<_> = sol.iter_unrouted().collect();
        assert_eq!(unrouted, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn clone_round_trip_preserves_cost_and_structure() {
        let pb = testing::line_problem(Config::default());
        let mut sol = testing::solved(pb);
        let cost = sol.calc_costs();

        let mut clone = sol.clone();
        assert_eq!(clone.calc_costs(), cost);
        assert_eq!(testing::route_ids(&clone), testing::route_ids(&sol));

        // mutating the clone leaves the original untouched
        let seeds: Vec<_> = clone.iter_unrouted().collect();
        assert!(seeds.is_empty());
        clone.reset();
        assert_eq!(clone.num_unrouted, 6);
        assert_eq!(sol.num_unrouted, 0);
        assert!(sol.validate().is_ok());
    }

    #[test]
    fn reset_restores_the_initial_state() {
        let pb = testing::line_problem(Config::default());
        let mut sol = testing::solved(pb.clone());
        assert!(sol.trucks() > 0);

        sol.reset();
        assert_eq!(sol.num_unrouted, pb.num_customers());
        assert_eq!(sol.trucks(), 0);
        assert_eq!(sol.workers_cache, 0);
        assert_eq!(sol.dist_cache, 0.0);
        // every customer is unrouted exactly once
        let mut seen: Vec<_> = sol.iter_unrouted().collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn validation_spots_unserved_customers() {
        let pb = testing::line_problem(Config::default());
        let mut sol = Solution::new(pb);
        // a single route serving only customer 1
        sol.remove_unrouted(1);
        sol.new_route(1, 1);
        assert_eq!(sol.validate(), Err(SolutionError::NotServed { node: 2 }));
    }

    #[test]
    #[should_panic(expected = "non-empty route")]
    fn removing_a_non_empty_route_panics() {
        let pb = testing::line_problem(Config::default());
        let mut sol = Solution::new(pb);
        sol.remove_unrouted(1);
        sol.new_route(1, 1);
        sol.remove_route(0);
    }

    #[test]
    fn cost_weights_follow_the_hierarchy() {
        let cfg = Config::default();
        // one truck outweighs any realistic worker count, one worker any
        // realistic distance
        assert!(calc_cost(&cfg, 1, 0, 0.0) > calc_cost(&cfg, 0, 9, 0.0));
        assert!(calc_cost(&cfg, 0, 1, 0.0) > calc_cost(&cfg, 0, 0, 900.0));
    }
}
