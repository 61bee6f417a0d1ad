//! Shared fixtures for unit tests: small hand-built instances with
//! predictable geometry.

use std::sync::Arc;

use crate::config::Config;
use crate::problem::{Node, Problem};
use crate::solution::Solution;

pub fn node(id: usize, x: f64, y: f64, demand: f64, est: f64, lst: f64, st: f64) -> Node {
    Node {
        id,
        x,
        y,
        demand,
        est,
        lst,
        service_time: st,
    }
}

/// Six customers in two horizontal lines right of the depot, all with
/// wide time windows. Capacity 30 forces at least two routes of three
/// customers each.
pub fn line_problem(mut cfg: Config) -> Arc<Problem> {
    cfg.adapt_service_times = false;
    let nodes = vec![
        node(0, 0.0, 0.0, 0.0, 0.0, 1000.0, 0.0),
        node(1, 10.0, 0.0, 10.0, 0.0, 1000.0, 10.0),
        node(2, 20.0, 0.0, 10.0, 0.0, 1000.0, 10.0),
        node(3, 30.0, 0.0, 10.0, 0.0, 1000.0, 10.0),
        node(4, 10.0, 10.0, 10.0, 0.0, 1000.0, 10.0),
        node(5, 20.0, 10.0, 10.0, 0.0, 1000.0, 10.0),
        node(6, 30.0, 10.0, 10.0, 0.0, 1000.0, 10.0),
    ];
    Arc::new(Problem::new("line".to_string(), nodes, 30.0, cfg).unwrap())
}

/// A deterministic two-route solution for [`line_problem`]: customers
/// 1-2-3 on the first route, 4-5-6 on the second, one worker each.
pub fn solved(problem: Arc<Problem>) -> Solution {
    let mut sol = Solution::new(problem);
    for group in [[1, 2, 3], [4, 5, 6]] {
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

/// The interior node ids of each route, in route order.
pub fn route_ids(sol: &Solution) -> Vec<Vec<usize>> {
    (0..sol.routes.len())
        .map(|r| {
            sol.route_slots(r)
                .skip(1)
                .take_while(|&s| s != sol.routes[r].tail)
                .map(|s| sol.slots[s].node)
                .collect()
        })
        .collect()
}
