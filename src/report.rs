use std::io::Write;
use std::path::Path;

use itertools::Itertools;

use crate::config::{Config, Metaheuristic, OutputFormat};
use crate::search::Solver;
use crate::solution::Solution;

/// The summary of one solved instance.
#[derive(Debug)]
pub struct InstanceResult {
    pub name: String,
    pub trucks: usize,
    pub workers: usize,
    pub distance: f64,
    pub cost: f64,
    pub time: u64,
    pub saturation_time: u64,
}

impl InstanceResult {
    pub fn of(solver: &mut Solver) -> InstanceResult {
        let cost = solver.best.calc_costs();
        InstanceResult {
            name: solver.problem.name.clone(),
            trucks: solver.best.trucks(),
            workers: solver.best.workers_cache,
            distance: solver.best.dist_cache,
            cost,
            time: solver.best.time,
            saturation_time: solver.best.saturation_time,
        }
    }
}

/// Print the aggregated output of all processed instances, as a human
/// readable table or as CSV.
pub fn print_results(results: &[InstanceResult], cfg: &Config) {
    if results.is_empty() {
        return;
    }
    match cfg.format {
        OutputFormat::Csv => print_csv(results, cfg),
        OutputFormat::Human => print_table(results, cfg),
    }
}

fn print_csv(results: &[InstanceResult], cfg: &Config) {
    if !cfg.parallel {
        println!("name, trucks, workers, distance, cost, time [s]");
    }
    for r in results {
        let time = match cfg.metaheuristic {
            Metaheuristic::None => "n/a".to_string(),
            _ => r.time.to_string(),
        };
        print!(
            "{},{},{},{:.2},{:.6},{}",
            r.name, r.trucks, r.workers, r.distance, r.cost, time
        );
        if r.saturation_time != 0 {
            print!(",{}", r.saturation_time);
        }
        println!();
    }
}

fn print_table(results: &[InstanceResult], cfg: &Config) {
    let rule = "|------------+--------+---------+----------+------------+----------|";
    println!("{}", rule);
    println!("| name       | trucks | workers | distance |  cost      | time [s] |");
    println!("{}", rule);
    for r in results {
        let time = match cfg.metaheuristic {
            Metaheuristic::None => format!("{:>8}", "n/a"),
            _ => format!("{:>8}", r.time),
        };
        println!(
            "| {:10} | {:6} | {:7} | {:8.2} | {:10.6} | {} |",
            r.name, r.trucks, r.workers, r.distance, r.cost, time
        );
    }
    println!("{}", rule);
    if results.len() > 1 {
        let n = results.len() as f64;
        let trucks: usize = results.iter().map(|r| r.trucks).sum();
        let workers: usize = results.iter().map(|r| r.workers).sum();
        let distance: f64 = results.iter().map(|r| r.distance).sum();
        let cost: f64 = results.iter().map(|r| r.cost).sum();
        let time: u64 = results.iter().map(|r| r.time).sum();
        println!(
            "| {:10} | {:6} | {:7} | {:8.2} | {:10.6} | {:8} |",
            "sum", trucks, workers, distance, cost, time
        );
        println!(
            "| {:10} | {:6.2} | {:7.2} | {:8.2} | {:10.6} | {:8.2} |",
            "avg",
            trucks as f64 / n,
            workers as f64 / n,
            distance / n,
            cost / n,
            time as f64 / n
        );
        println!("{}", rule);
    }
}

/// Write one route as `[0, 5, 3, 0]: workers=.., load=.., length=..`.
fn write_route<W: Write>(w: &mut W, sol: &Solution, r: usize) -> std::io::Result<()> {
    let ids = sol
        .route_slots(r)
        .map(|s| sol.slots[s].node.to_string())
        .join(", ");
    writeln!(
        w,
        "[{}]: workers={}, load={:6.2}, length={:.2}",
        ids,
        sol.routes[r].workers,
        sol.routes[r].load,
        sol.route_length(r)
    )
}

/// Write a representation of the incumbent. The cost caches must be up
/// to date (see [`Solution::calc_costs`]).
pub fn write_solution<W: Write>(w: &mut W, solver: &Solver, verbose: bool) -> std::io::Result<()> {
    let sol = &solver.best;
    let cfg = &solver.problem.cfg;
    if verbose {
        writeln!(w, "{}", solver.problem.name)?;
        writeln!(w, "seed: {}", cfg.seed)?;
        if cfg.metaheuristic != Metaheuristic::None {
            let iterations = if solver.tabu.active {
                solver.tabu.iteration
            } else {
                solver.num_solutions
            };
            let duration = solver.elapsed_secs().max(1);
            writeln!(w, "calculated {} iterations/s", iterations / duration)?;
        }
        writeln!(w, "found best solution after {} seconds", sol.time)?;
        for r in 0..sol.routes.len() {
            write_route(w, sol, r)?;
        }
    }
    writeln!(
        w,
        "trucks: {}, workers: {}, distance: {:.2}, cost: {:.6}",
        sol.trucks(),
        sol.workers_cache,
        sol.dist_cache,
        sol.cost_cache
    )
}

/// Append the details of a solved instance to the configured details
/// file.
pub fn save_solution_details(solver: &Solver, path: &Path) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    write_solution(&mut file, solver, true)?;
    writeln!(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::testing;

    #[test]
    fn solution_details_list_every_route() {
        let pb = testing::line_problem(Config::default());
        let mut solver = Solver::new(pb.clone());
        solver.best = testing::solved(pb);
        solver.best.calc_costs();

        let mut out = Vec::new();
        write_solution(&mut out, &solver, true).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[0, 1, 2, 3, 0]: workers=1"));
        assert!(text.contains("[0, 4, 5, 6, 0]: workers=1"));
        assert!(text.contains("trucks: 2, workers: 2"));
    }

    #[test]
    fn summary_line_reflects_the_caches() {
        let pb = testing::line_problem(Config::default());
        let mut solver = Solver::new(pb.clone());
        solver.best = testing::solved(pb);
        solver.best.calc_costs();

        let mut out = Vec::new();
        write_solution(&mut out, &solver, false).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("trucks: 2, workers: 2, distance:"));
    }
}
