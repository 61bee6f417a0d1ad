use std::io::Write;
use std::path::Path;

/// A performed relocation, recorded for offline analysis of the search.
#[derive(Debug, Clone)]
pub struct PastMove {
    pub node: usize,
    pub old_route: usize,
    pub old_pred: usize,
    pub old_succ: usize,
    pub new_route: usize,
    pub new_pred: usize,
    pub new_succ: usize,
    pub delta_trucks: bool,
    pub delta_workers: usize,
    pub delta_dist: f64,
}

/// Chronological trace of all performed moves plus per-node counters.
/// Recording is off by default; it costs memory proportional to the
/// number of moves.
#[derive(Debug)]
pub struct Stats {
    active: bool,
    performed: Vec<u32>,
    moves: Vec<PastMove>,
}

impl Stats {
    pub fn new(num_nodes: usize, active: bool) -> Self {
        Stats {
            active,
            performed: vec![0; num_nodes],
            moves: Vec::new(),
        }
    }

    pub fn active(&self) -> bool {
        self.active
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_move(
        &mut self,
        node: usize,
        old_route: usize,
        old_pred: usize,
        old_succ: usize,
        new_route: usize,
        new_pred: usize,
        new_succ: usize,
        delta_trucks: bool,
        delta_workers: usize,
        delta_dist: f64,
    ) {
        if !self.active {
            return;
        }
        self.performed[node] += 1;
        self.moves.push(PastMove {
            node,
            old_route,
            old_pred,
            old_succ,
            new_route,
            new_pred,
            new_succ,
            delta_trucks,
            delta_workers,
            delta_dist,
        });
    }

    pub fn moves(&self) -> &[PastMove] {
        &self.moves
    }

    /// Write the trace to a file: the chronological list first, then the
    /// per-node totals.
    pub fn write(&self, path: &Path) -> std::io::Result<()> {
        let mut f = std::fs::File::create(path)?;
        writeln!(f, "moves (detailed)\n================")?;
        for (cnt, m) in self.moves.iter().enumerate() {
            writeln!(
                f,
                "{:3} | {}:{:3}->{:3}->{:3} => {}:{:3}--{:3} | {} {:2} {:9.3}",
                cnt + 1,
                m.old_route,
                m.old_pred,
                m.node,
                m.old_succ,
                m.new_route,
                m.new_pred,
                m.new_succ,
                m.delta_trucks as u8,
                m.delta_workers,
                m.delta_dist,
            )?;
        }
        writeln!(f, "\nmoves per node\n==============")?;
        for (node, &count) in self.performed.iter().enumerate() {
            if count > 0 {
                writeln!(f, "{}: {}", node, count)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inactive_stats_record_nothing() {
        let mut stats = Stats::new(5, false);
        stats.record_move(1, 0, 0, 2, 1, 3, 0, false, 0, 1.5);
        assert!(stats.moves().is_empty());
    }

    #[test]
    fn active_stats_keep_the_chronology() {
        let mut stats = Stats::new(5, true);
        stats.record_move(1, 0, 0, 2, 1, 3, 0, false, 0, 1.5);
        stats.record_move(1, 1, 3, 0, 0, 0, 2, true, 1, -2.0);
        assert_eq!(stats.moves().len(), 2);
        assert_eq!(stats.performed[1], 2);
        assert!(stats.moves()[1].delta_trucks);
    }
}
