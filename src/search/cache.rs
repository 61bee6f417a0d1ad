use std::collections::HashMap;

use crate::problem::Problem;
use crate::solution::Solution;

/// A cache of past solutions, used to skip the local search for
/// solutions that were already searched.
///
/// The cache maps a 64-bit hash of a solution to the number of times it
/// was encountered. The hash is derived from the objective value alone,
/// so distinct solutions with equal cost collide on purpose; this is a
/// deliberately simple scheme. Stronger alternatives (summing per-node
/// slack, hashing routes separately and summing the route hashes, or
/// combinations thereof) slot in by replacing [`SolutionCache::hash`].
#[derive(Debug)]
pub struct SolutionCache {
    entries: HashMap<u64, u64>,
    factor: u64,
}

impl SolutionCache {
    pub fn new(problem: &Problem) -> Self {
        SolutionCache {
            entries: HashMap::new(),
            factor: u64::MAX / problem.num_nodes as u64,
        }
    }

    /// A rounded integer image of the solution's objective value. The
    /// cost cache must be up to date.
    fn hash(&self, sol: &Solution) -> u64 {
        (sol.cost_cache * self.factor as f64) as u64
    }

    /// Put the solution in with an encounter count of 1. Meant for
    /// solutions that [`SolutionCache::contains`] just reported absent;
    /// a prior count is overwritten.
    pub fn add(&mut self, sol: &Solution) {
        self.entries.insert(self.hash(sol), 1);
    }

    /// The number of encounters including this query, or 0 if the
    /// solution was never seen. Counting is a side effect of the query.
    pub fn contains(&mut self, sol: &Solution) -> u64 {
        match self.entries.get_mut(&self.hash(sol)) {
            Some(count) => {
                *count += 1;
                *count
            }
            None => 0,
        }
    }

    /// The number of unique solutions in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of queries over all entries, counting repeats.
    pub fn queries(&self) -> u64 {
        self.entries.values().sum()
    }

    /// Share of queries answered from the cache, for diagnostics.
    pub fn hit_rate(&self) -> f64 {
        let queries = self.queries();
        if queries == 0 {
            return 0.0;
        }
        (queries - self.entries.len() as u64) as f64 / queries as f64
    }
}
