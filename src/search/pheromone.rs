use itertools::Itertools;
use rand::rngs::StdRng;
use rand::Rng;

use crate::solution::Solution;
use crate::DEPOT;

/// The pheromone matrix.
///
/// The side is `2n - 1` where `n` is the number of nodes: row/column 0 is
/// reserved (the physical depot is never indexed directly) and the upper
/// half `n..2n-1` holds one virtual depot per route. Without per-route
/// virtual depots all routes would share the depot's row and column and
/// the reinforcement of route starts and ends would average out.
#[derive(Debug, Clone)]
pub struct Pheromone {
    num_nodes: usize,
    dim: usize,
    m: Vec<Vec<f64>>,
}

impl Pheromone {
    pub fn new(num_nodes: usize, initial: f64) -> Self {
        let dim = 2 * num_nodes - 1;
        Pheromone {
            num_nodes,
            dim,
            m: vec![vec![initial; dim]; dim],
        }
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.m[i][j]
    }

    /// The trail of inserting `node` between `after` and `succ` on the
    /// route with virtual depot `depot_id`. Physical depot ids are
    /// replaced by the virtual depot so every route sees its own trails.
    pub fn trail(&self, depot_id: usize, after_id: usize, succ_id: usize, node_id: usize) -> f64 {
        let a = if after_id == DEPOT { depot_id } else { after_id };
        let s = if succ_id == DEPOT { depot_id } else { succ_id };
        (self.m[a][node_id] + self.m[node_id][s]) / (2.0 * self.m[a][s])
    }

    /// Evaporate every trail down to at most `min_pheromone` and
    /// reinforce the edges of `sol` with `1 - rho`. Route starts and ends
    /// deposit on the route's virtual depot.
    pub fn update(&mut self, sol: &Solution, rho: f64, min_pheromone: f64) {
        for (i, j) in (1..self.dim).cartesian_product(1..self.dim) {
            self.m[i][j] = f64::max(self.m[i][j] * rho, min_pheromone);
        }
        let deposit = 1.0 - rho;
        for (r, route) in sol.routes.iter().enumerate() {
            if route.len == crate::solution::EMPTY {
                continue;
            }
            let dvr = self.num_nodes + r;
            let first = sol.slots[route.head].next.expect("route head is linked");
            let last = sol.slots[route.tail].prev.expect("route tail is linked");
            self.m[dvr][sol.slots[first].node] += deposit;
            self.m[sol.slots[last].node][dvr] += deposit;
            let mut n = sol.slots[first].next.expect("route keeps its closing depot");
            while let Some(next) = sol.slots[n].next {
                let p = sol.slots[n].prev.expect("interior node has a predecessor");
                self.m[sol.slots[p].node][sol.slots[n].node] += deposit;
                n = next;
            }
        }
    }

    /// Restore every non-reserved cell to the configured initial value.
    pub fn reset(&mut self, initial: f64) {
        for (i, j) in (1..self.dim).cartesian_product(1..self.dim) {
            self.m[i][j] = initial;
        }
    }

    /// Randomize every non-reserved cell to `[min_pheromone, 1.0)`.
    pub fn shake(&mut self, rng: &mut StdRng, min_pheromone: f64) {
        for (i, j) in (1..self.dim).cartesian_product(1..self.dim) {
            self.m[i][j] = f64::max(rng.gen_range(0.0..1.0), min_pheromone);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::testing;
    use rand::SeedableRng;

    #[test]
    fn decay_never_drops_below_the_floor() {
        let pb = testing::line_problem(Config::default());
        let sol = testing::solved(pb);
        let mut ph = Pheromone::new(7, 1.0);
        for _ in 0..2000 {
            ph.update(&sol, 0.5, 1e-3);
        }
        for i in 1..13 {
            for j in 1..13 {
                assert!(ph.get(i, j) >= 1e-3);
            }
        }
    }

    #[test]
    fn update_reinforces_the_incumbent_edges() {
        let pb = testing::line_problem(Config::default());
        let sol = testing::solved(pb);
        let mut ph = Pheromone::new(7, 1.0);
        ph.update(&sol, 0.985, 1e-13);

        let deposit = 1.0 - 0.985;
        // route 0 is [1, 2, 3] with virtual depot 7
        assert_eq!(ph.get(7, 1), 1.0 * 0.985 + deposit);
        assert_eq!(ph.get(1, 2), 1.0 * 0.985 + deposit);
        assert_eq!(ph.get(3, 7), 1.0 * 0.985 + deposit);
        // an edge not in the solution only evaporates
        assert_eq!(ph.get(1, 3), 0.985);
    }

    #[test]
    fn trail_substitutes_the_virtual_depot() {
        let mut ph = Pheromone::new(7, 1.0);
        ph.m[8][4] = 3.0;
        // inserting 4 after the physical depot on the route with virtual
        // depot 8 reads row 8, not row 0
        let trail = ph.trail(8, DEPOT, 5, 4);
        assert_eq!(trail, (3.0 + ph.get(4, 5)) / (2.0 * ph.get(8, 5)));
    }

    #[test]
    fn shake_stays_within_bounds() {
        let mut ph = Pheromone::new(7, 1.0);
        let mut rng = StdRng::seed_from_u64(11);
        ph.shake(&mut rng, 0.2);
        for i in 1..13 {
            for j in 1..13 {
                assert!(ph.get(i, j) >= 0.2 && ph.get(i, j) < 1.0);
            }
        }
    }
}
