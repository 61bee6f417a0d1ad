use derive_more::Display;

use crate::config::Config;
use crate::DEPOT;

/// The type used for distance.
pub type Distance = f64;
/// The type used for cost.
pub type Cost = f64;
/// Index of a node in the problem (the depot is node 0).
pub type NodeIndex = usize;

/// A customer or the depot, as read from the instance file.
#[derive(Debug, Clone)]
pub struct Node {
    /// The id of the node. The depot has id 0.
    pub id: NodeIndex,
    pub x: f64,
    pub y: f64,
    /// The customer's demand (0 for the depot).
    pub demand: f64,
    /// Earliest service start time.
    pub est: f64,
    /// Latest service start time. For the depot this is the end of the
    /// planning horizon.
    pub lst: f64,
    /// Base service time; divided by the number of workers on a truck.
    pub service_time: f64,
}

/// A single VRPTWMS instance. Immutable once constructed; all mutable
/// search state lives in [`crate::search::Solver`].
#[derive(Debug)]
pub struct Problem {
    /// The instance's name (the input file name without its extension).
    pub name: String,
    /// The truck capacity shared by the entire fleet.
    pub capacity: f64,
    /// All nodes including the depot at index 0.
    pub nodes: Vec<Node>,
    /// The number of nodes including the depot.
    pub num_nodes: usize,
    /// Cost matrices. `c_m[0]` holds plain Euclidean distances; `c_m[w]`
    /// for `w >= 1` holds distance plus the origin's service time divided
    /// by `w` workers.
    pub c_m: Vec<Vec<Vec<Distance>>>,
    /// The configuration this instance was loaded under, with `ants == 0`
    /// resolved to the number of customers.
    pub cfg: Config,
}

#[derive(Debug, Display)]
pub enum ProblemConstructionError {
    #[display(fmt = "the instance contains no nodes")]
    NoNodes,
    #[display(fmt = "the first node has id {} instead of the depot id 0", id)]
    FirstNodeNotDepot { id: usize },
    #[display(fmt = "node {} has negative demand {}", node, demand)]
    NegativeDemand { node: usize, demand: f64 },
    #[display(fmt = "the truck capacity must be positive (got {})", capacity)]
    NonPositiveCapacity { capacity: f64 },
}

impl std::error::Error for ProblemConstructionError {}

impl Problem {
    /// Build a problem from raw node data.
    ///
    /// Applies the Reimann service-time adaptation when configured and
    /// precomputes the per-worker cost matrices. `cfg.ants == 0` is
    /// resolved to the number of customers.
    pub fn new(
        name: String,
        mut nodes: Vec<Node>,
        capacity: f64,
        mut cfg: Config,
    ) -> Result<Problem, ProblemConstructionError> {
        use ProblemConstructionError::*;

        if nodes.is_empty() {
            return Err(NoNodes);
        }
        if nodes[0].id != DEPOT {
            return Err(FirstNodeNotDepot { id: nodes[0].id });
        }
        if capacity <= 0.0 {
            return Err(NonPositiveCapacity { capacity });
        }
        for node in &nodes {
            if node.demand < 0.0 {
                return Err(NegativeDemand {
                    node: node.id,
                    demand: node.demand,
                });
            }
        }

        let num_nodes = nodes.len();
        if cfg.ants == 0 {
            cfg.ants = num_nodes - 1;
        }

        let distances = distance_matrix(&nodes);
        if cfg.adapt_service_times {
            adapt_service_times(&mut nodes, &distances, &cfg);
        }

        let mut c_m = Vec::with_capacity(cfg.max_workers + 1);
        c_m.push(distances);
        for workers in 1..=cfg.max_workers {
            let mut m = c_m[0].clone();
            for (i, row) in m.iter_mut().enumerate() {
                for (j, cell) in row.iter_mut().enumerate() {
                    if i != j {
                        *cell += nodes[i].service_time / workers as f64;
                    }
                }
            }
            c_m.push(m);
        }

        Ok(Problem {
            name,
            capacity,
            num_nodes,
            nodes,
            c_m,
            cfg,
        })
    }

    /// The Euclidean distance between two nodes.
    pub fn distance(&self, from: NodeIndex, to: NodeIndex) -> Distance {
        self.c_m[0][from][to]
    }

    /// Driving time from `from` to `to` plus the service time spent at
    /// `from` by a truck crewed with `workers` workers.
    pub fn travel_time(&self, from: NodeIndex, to: NodeIndex, workers: usize) -> f64 {
        self.c_m[workers][from][to]
    }

    /// The number of customers (nodes excluding the depot).
    pub fn num_customers(&self) -> usize {
        self.num_nodes - 1
    }
}

fn distance_matrix(nodes: &[Node]) -> Vec<Vec<Distance>> {
    let n = nodes.len();
    let mut d = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            let dx = nodes[i].x - nodes[j].x;
            let dy = nodes[i].y - nodes[j].y;
            d[i][j] = (dx * dx + dy * dy).sqrt();
        }
    }
    d
}

/// Adapt the service times according to Reimann et al. 2011.
///
/// A customer's service time grows with its demand but is capped so that
/// a single-worker truck can still return to the depot within the
/// depot's time window.
fn adapt_service_times(nodes: &mut [Node], d: &[Vec<Distance>], cfg: &Config) {
    let depot_lst = nodes[0].lst;
    let v = cfg.truck_velocity;
    for node in nodes.iter_mut().skip(1) {
        let latest_return = depot_lst
            - f64::max(node.est, d[DEPOT][node.id] / v)
            - d[node.id][DEPOT] / v;
        node.service_time = f64::min(cfg.service_rate * node.demand, latest_return);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_nodes() -> Vec<Node> {
        vec![
            Node {
                id: 0,
                x: 0.0,
                y: 0.0,
                demand: 0.0,
                est: 0.0,
                lst: 1000.0,
                service_time: 0.0,
            },
            Node {
                id: 1,
                x: 3.0,
                y: 4.0,
                demand: 10.0,
                est: 0.0,
                lst: 500.0,
                service_time: 12.0,
            },
            Node {
                id: 2,
                x: 6.0,
                y: 8.0,
                demand: 20.0,
                est: 50.0,
                lst: 600.0,
                service_time: 12.0,
            },
        ]
    }

    #[test]
    fn cost_matrices_include_service_time_per_worker() {
        let mut cfg = Config::default();
        cfg.adapt_service_times = false;
        cfg.max_workers = 3;
        let pb = Problem::new("t".to_string(), raw_nodes(), 100.0, cfg).unwrap();

        assert_eq!(pb.distance(0, 1), 5.0);
        assert_eq!(pb.distance(1, 2), 5.0);
        assert_eq!(pb.distance(1, 1), 0.0);
        // one worker: full service time at the origin
        assert_eq!(pb.travel_time(1, 2, 1), 5.0 + 12.0);
        // three workers: a third of it
        assert_eq!(pb.travel_time(1, 2, 3), 5.0 + 4.0);
        // the diagonal carries no service time
        assert_eq!(pb.travel_time(1, 1, 2), 0.0);
    }

    #[test]
    fn service_times_adapt_to_demand_and_depot_window() {
        let mut cfg = Config::default();
        cfg.adapt_service_times = true;
        cfg.service_rate = 2.0;
        cfg.truck_velocity = 1.0;
        let pb = Problem::new("t".to_string(), raw_nodes(), 100.0, cfg).unwrap();

        // service_rate * demand is the binding term for both customers
        assert_eq!(pb.nodes[1].service_time, 20.0);
        assert_eq!(pb.nodes[2].service_time, 40.0);
        // the depot keeps its zero service time
        assert_eq!(pb.nodes[0].service_time, 0.0);
    }

    #[test]
    fn dynamic_ants_resolve_to_customer_count() {
        let mut cfg = Config::default();
        cfg.ants = 0;
        let pb = Problem::new("t".to_string(), raw_nodes(), 100.0, cfg).unwrap();
        assert_eq!(pb.cfg.ants, 2);
    }

    #[test]
    fn rejects_missing_depot() {
        let mut nodes = raw_nodes();
        nodes.remove(0);
        let err = Problem::new("t".to_string(), nodes, 100.0, Config::default());
        assert!(matches!(
            err,
            Err(ProblemConstructionError::FirstNodeNotDepot { id: 1 })
        ));
    }
}
