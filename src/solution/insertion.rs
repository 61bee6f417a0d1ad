use rand::rngs::StdRng;
use rand::Rng;

use crate::solution::SlotRef;

/// A candidate insertion of a node after a given position on a route.
///
/// `cost` is the Solomon I1 insertion cost, `attractiveness` the weight
/// used by the stochastic variants. Depending on the consumer only one of
/// the two is meaningful.
#[derive(Debug, Clone, Copy)]
pub struct Insertion {
    /// Index of the receiving route.
    pub target: usize,
    /// The node to be inserted.
    pub node: SlotRef,
    /// Insert after this slot.
    pub after: SlotRef,
    pub cost: f64,
    pub attractiveness: f64,
}

impl Insertion {
    /// An accumulator that any feasible insertion beats.
    pub fn unset() -> Self {
        Insertion {
            target: usize::MAX,
            node: usize::MAX,
            after: usize::MAX,
            cost: f64::INFINITY,
            attractiveness: 0.0,
        }
    }
}

/// Restricted candidate list: the most attractive insertions seen so far,
/// ordered by descending attractiveness and truncated to a bound.
#[derive(Debug)]
pub struct InsertionList {
    entries: Vec<Insertion>,
    max_size: usize,
}

impl InsertionList {
    /// `max_size == 0` means unbounded.
    pub fn new(max_size: usize) -> Self {
        InsertionList {
            entries: Vec::new(),
            max_size: if max_size == 0 { usize::MAX } else { max_size },
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[Insertion] {
        &self.entries
    }

    /// Add `ins` at its sorted position, dropping the worst entry when the
    /// bound is exceeded. Returns whether `ins` made it into the list.
    /// Ties keep the earlier entry in front.
    pub fn update(&mut self, ins: Insertion) -> bool {
        if self.entries.len() >= self.max_size {
            if let Some(worst) = self.entries.last() {
                if worst.attractiveness > ins.attractiveness {
                    return false;
                }
            }
        }
        let pos = self
            .entries
            .iter()
            .position(|e| e.attractiveness < ins.attractiveness)
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, ins);
        self.entries.truncate(self.max_size);
        true
    }

    /// Draw an entry, either uniformly or by a roulette wheel weighted by
    /// attractiveness. All attractivenesses must be positive for the
    /// weighted draw to make sense.
    pub fn pick(&self, rng: &mut StdRng, use_weights: bool) -> Option<Insertion> {
        if self.entries.is_empty() {
            return None;
        }
        if use_weights {
            let weights: Vec<f64> = self.entries.iter().map(|e| e.attractiveness).collect();
            spin_wheel(rng, &weights).map(|i| self.entries[i])
        } else {
            Some(self.entries[rng.gen_range(0..self.entries.len())])
        }
    }
}

/// Weighted roulette wheel: return an index with probability proportional
/// to its weight. Entries with non-finite weight cannot be picked.
pub fn spin_wheel(rng: &mut StdRng, weights: &[f64]) -> Option<usize> {
    let total: f64 = weights.iter().filter(|w| w.is_finite()).sum();
    let threshold = rng.gen_range(0.0..1.0) * total;
    let mut remaining = total;
    for (i, &w) in weights.iter().enumerate() {
        if !w.is_finite() {
            continue;
        }
        remaining -= w;
        if threshold >= remaining {
            return Some(i);
        }
    }
    None
}

/// Roulette pick over insertion costs, normalized so the cheapest entry
/// gets weight 1 and every weight stays positive. Entries with infinite
/// cost (no feasible position) cannot be picked.
pub fn pick_by_cost(rng: &mut StdRng, insertions: &[Insertion], min_cost: f64) -> Option<Insertion> {
    let base = min_cost - 1.0;
    let weights: Vec<f64> = insertions
        .iter()
        .map(|i| if i.cost.is_finite() { 1.0 / (i.cost - base) } else { 0.0 })
        .collect();
    spin_wheel(rng, &weights).map(|i| insertions[i])
}

/// Roulette pick over precomputed attractivenesses. Entries left at
/// negative infinity (no feasible position) cannot be picked.
pub fn pick_by_attractiveness(rng: &mut StdRng, insertions: &[Insertion]) -> Option<Insertion> {
    let weights: Vec<f64> = insertions.iter().map(|i| i.attractiveness).collect();
    spin_wheel(rng, &weights).map(|i| insertions[i])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn ins(attractiveness: f64) -> Insertion {
        Insertion {
            target: 0,
            node: 1,
            after: 0,
            cost: 0.0,
            attractiveness,
        }
    }

    #[test]
    fn list_stays_sorted_and_bounded() {
        let mut il = InsertionList::new(3);
        assert!(il.update(ins(1.0)));
        assert!(il.update(ins(5.0)));
        assert!(il.update(ins(3.0)));
        // full; a better entry evicts the tail
        assert!(il.update(ins(4.0)));
        let attrs: Vec<f64> = il.entries().iter().map(|e| e.attractiveness).collect();
        assert_eq!(attrs, vec![5.0, 4.0, 3.0]);
        // a worse entry is rejected outright
        assert!(!il.update(ins(0.5)));
        assert_eq!(il.len(), 3);
    }

    #[test]
    fn zero_means_unbounded() {
        let mut il = InsertionList::new(0);
        for i in 0..100 {
            assert!(il.update(ins(i as f64)));
        }
        assert_eq!(il.len(), 100);
    }

    #[test]
    fn wheel_never_picks_weightless_entries() {
        let mut rng = StdRng::seed_from_u64(7);
        let weights = [0.0, 2.0, f64::INFINITY, 3.0];
        for _ in 0..200 {
            let picked = spin_wheel(&mut rng, &weights).unwrap();
            assert!(picked == 1 || picked == 3);
        }
    }

    #[test]
    fn wheel_is_empty_handed_without_finite_weights() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(spin_wheel(&mut rng, &[]), None);
        assert_eq!(spin_wheel(&mut rng, &[f64::NEG_INFINITY]), None);
    }

    #[test]
    fn cost_pick_skips_unplaceable_nodes() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut a = ins(0.0);
        a.cost = 10.0;
        let mut b = ins(0.0);
        b.cost = f64::INFINITY;
        let mut c = ins(0.0);
        c.cost = 12.0;
        for _ in 0..100 {
            let picked = pick_by_cost(&mut rng, &[a, b, c], 10.0).unwrap();
            assert!(picked.cost.is_finite());
        }
    }
}
