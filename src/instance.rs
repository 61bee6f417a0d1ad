use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use derive_more::Display;

use crate::config::Config;
use crate::problem::{Node, Problem, ProblemConstructionError};

/// Number of header lines before the customer table starts.
const SKIP_ROWS: usize = 9;
/// 1-based line carrying the vehicle count and capacity.
const CAPACITY_LINE: usize = 5;

#[derive(Debug, Display)]
pub enum InstanceError {
    #[display(fmt = "could not read instance: {}", _0)]
    Io(std::io::Error),
    #[display(fmt = "missing or malformed capacity in the header")]
    MissingCapacity,
    #[display(fmt = "malformed customer row on line {}: {:?}", line, text)]
    BadNodeRow { line: usize, text: String },
    #[display(fmt = "{}", _0)]
    Construction(ProblemConstructionError),
}

impl std::error::Error for InstanceError {}

impl From<std::io::Error> for InstanceError {
    fn from(e: std::io::Error) -> Self {
        InstanceError::Io(e)
    }
}

impl From<ProblemConstructionError> for InstanceError {
    fn from(e: ProblemConstructionError) -> Self {
        InstanceError::Construction(e)
    }
}

/// Read a problem instance in Solomon's VRPTW format.
///
/// The first nine lines form a header; the truck capacity is the second
/// integer on line five (the vehicle count next to it is ignored). Every
/// following non-empty line is a whitespace-separated customer row
/// `id x y demand est lst service_time`, the first of which (id 0) is
/// the depot.
pub fn read_instance(path: &Path, cfg: &Config) -> Result<Problem, InstanceError> {
    let file = std::fs::File::open(path)?;
    let name = instance_name(path);
    let problem = parse_instance(BufReader::new(file), name, cfg.clone())?;
    Ok(problem)
}

/// The instance's name: the file name without its extension.
pub fn instance_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

pub fn parse_instance<R: Read>(
    reader: BufReader<R>,
    name: String,
    cfg: Config,
) -> Result<Problem, InstanceError> {
    let mut capacity = None;
    let mut nodes = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if index + 1 == CAPACITY_LINE {
            capacity = parse_capacity(&line);
        }
        if index < SKIP_ROWS {
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }
        let node = parse_node(&line).ok_or_else(|| InstanceError::BadNodeRow {
            line: index + 1,
            text: line.clone(),
        })?;
        nodes.push(node);
    }

    let capacity = capacity.ok_or(InstanceError::MissingCapacity)?;
    Ok(Problem::new(name, nodes, capacity, cfg)?)
}

fn parse_capacity(line: &str) -> Option<f64> {
    let mut fields = line.split_whitespace();
    fields.next()?;
    fields.next()?.parse().ok()
}

fn parse_node(line: &str) -> Option<Node> {
    let mut fields = line.split_whitespace();
    let node = Node {
        id: fields.next()?.parse().ok()?,
        x: fields.next()?.parse().ok()?,
        y: fields.next()?.parse().ok()?,
        demand: fields.next()?.parse().ok()?,
        est: fields.next()?.parse().ok()?,
        lst: fields.next()?.parse().ok()?,
        service_time: fields.next()?.parse().ok()?,
    };
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufReader;

    const MINI: &str = "\
MINI5

VEHICLE
NUMBER     CAPACITY
  25         200

CUSTOMER
CUST NO.  XCOORD.   YCOORD.   DEMAND    READY TIME  DUE DATE   SERVICE TIME

    0      35         35          0          0       230          0
    1      41         49         10        161       171         10
    2      35         17          7         50        60         10
    3      55         45         13        116       126         10
    4      55         20         19        149       159         10
";

    fn parse(cfg: Config) -> Problem {
        parse_instance(
            BufReader::new(MINI.as_bytes()),
            "MINI5".to_string(),
            cfg,
        )
        .unwrap()
    }

    #[test]
    fn reads_header_and_customer_rows() {
        let mut cfg = Config::default();
        cfg.adapt_service_times = false;
        let pb = parse(cfg);

        assert_eq!(pb.name, "MINI5");
        assert_eq!(pb.capacity, 200.0);
        assert_eq!(pb.num_nodes, 5);
        // the depot comes first
        assert_eq!(pb.nodes[0].id, 0);
        assert_eq!(pb.nodes[0].demand, 0.0);
        // a regular customer keeps its demand and time window
        assert_eq!(pb.nodes[1].demand, 10.0);
        assert_eq!(pb.nodes[1].est, 161.0);
        assert_eq!(pb.nodes[1].lst, 171.0);
        assert_eq!(pb.nodes[1].service_time, 10.0);
    }

    #[test]
    fn missing_capacity_is_an_error() {
        let text = "a\nb\nc\n";
        let err = parse_instance(
            BufReader::new(text.as_bytes()),
            "broken".to_string(),
            Config::default(),
        );
        assert!(matches!(err, Err(InstanceError::MissingCapacity)));
    }

    #[test]
    fn malformed_rows_are_rejected() {
        let mut text = MINI.to_string();
        text.push_str("    5      55         xx         19        149       159         10\n");
        let err = parse_instance(
            BufReader::new(text.as_bytes()),
            "broken".to_string(),
            Config::default(),
        );
        assert!(matches!(err, Err(InstanceError::BadNodeRow { line: 15, .. })));
    }

    #[test]
    fn instance_name_strips_the_extension() {
        assert_eq!(instance_name(Path::new("data/R101_25.txt")), "R101_25");
    }
}
