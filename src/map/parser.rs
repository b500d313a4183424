//! Parser for the dispatch map text format
//!
//! ```text
//! <hq_idx> <hq_x> <hq_y> <hq_z>
//! <num_nodes>
//! <graph_idx> <x> <y> <z>                 node header
//! <nidx_0> <dist_0> <nidx_1> <dist_1> ...  node neighbors
//! ...
//! ```
//!
//! Parsing runs in two passes. The first builds every node from its header
//! line and indexes it by graph index; the second resolves neighbor lines
//! against that index, so neighbors may refer forward.

use super::graph::{HqNode, Map, Node, Position};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, warn};

/// Grammar violations; every one of them is fatal to registration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("line {line}: missing {what}")]
    MissingLine { line: usize, what: &'static str },
    #[error("line {line}: expected {expected} values, found {found}")]
    WrongTokenCount {
        line: usize,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: '{token}' is not a valid {expected}")]
    InvalidNumber {
        line: usize,
        token: String,
        expected: &'static str,
    },
    #[error("line {line}: neighbor {neighbor} has no distance")]
    UnpairedNeighbor { line: usize, neighbor: String },
    #[error("line {line}: distance {distance} to neighbor {neighbor} must be positive")]
    NonPositiveDistance {
        line: usize,
        neighbor: u32,
        distance: f64,
    },
    #[error("line {line}: node {graph_index} is declared more than once")]
    DuplicateNode { line: usize, graph_index: u32 },
    #[error("line {line}: node {node} refers to unknown neighbor {neighbor}")]
    DanglingReference { line: usize, node: u32, neighbor: u32 },
}

/// Inconsistencies that do not prevent using the map
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseWarning {
    NodeCountMismatch { declared: usize, parsed: usize },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::NodeCountMismatch { declared, parsed } => write!(
                f,
                "map declares {declared} nodes but {parsed} were read"
            ),
        }
    }
}

/// A parsed map together with any recoverable warnings
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMap {
    pub map: Map,
    pub warnings: Vec<ParseWarning>,
}

/// Parse a map text blob
pub fn parse_map(text: &str) -> Result<ParsedMap, ParseError> {
    let mut lines: Vec<&str> = text.lines().map(str::trim).collect();
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    let hq_line = lines.first().ok_or(ParseError::MissingLine {
        line: 1,
        what: "HQ line",
    })?;
    let (hq_index, hq_position) = parse_node_header(hq_line, 1)?;
    let hq = HqNode {
        graph_index: hq_index,
        position: hq_position,
    };

    let count_line = lines.get(1).ok_or(ParseError::MissingLine {
        line: 2,
        what: "node count",
    })?;
    let count_tokens: Vec<&str> = count_line.split_whitespace().collect();
    if count_tokens.len() != 1 {
        return Err(ParseError::WrongTokenCount {
            line: 2,
            expected: 1,
            found: count_tokens.len(),
        });
    }
    let declared: usize = parse_number(count_tokens[0], 2, "node count")?;

    let node_lines = &lines[2..];

    // Pass 1: every node exists before any neighbor is resolved
    let mut nodes = Vec::with_capacity(declared.min(node_lines.len() / 2 + 1));
    let mut index: HashMap<u32, usize> = HashMap::with_capacity(nodes.capacity());
    for (k, header) in node_lines.iter().step_by(2).enumerate() {
        let line = header_line_number(k);
        let (graph_index, position) = parse_node_header(header, line)?;
        if index.insert(graph_index, nodes.len()).is_some() {
            return Err(ParseError::DuplicateNode { line, graph_index });
        }
        nodes.push(Node::new(graph_index, position));
    }

    // Pass 2: neighbor lines, resolved through the index
    for (k, node) in nodes.iter_mut().enumerate() {
        let line = header_line_number(k) + 1;
        let neighbor_line = node_lines.get(2 * k + 1).copied().unwrap_or("");
        let tokens: Vec<&str> = neighbor_line.split_whitespace().collect();

        for pair in tokens.chunks(2) {
            let neighbor: u32 = parse_number(pair[0], line, "neighbor index")?;
            let distance_token = pair.get(1).ok_or_else(|| ParseError::UnpairedNeighbor {
                line,
                neighbor: pair[0].to_string(),
            })?;
            let distance: f64 = parse_number(distance_token, line, "distance")?;

            if !index.contains_key(&neighbor) {
                return Err(ParseError::DanglingReference {
                    line,
                    node: node.graph_index,
                    neighbor,
                });
            }
            if !(distance.is_finite() && distance > 0.0) {
                return Err(ParseError::NonPositiveDistance {
                    line,
                    neighbor,
                    distance,
                });
            }
            node.connect(neighbor, distance);
        }
    }

    let mut warnings = Vec::new();
    if declared != nodes.len() {
        let warning = ParseWarning::NodeCountMismatch {
            declared,
            parsed: nodes.len(),
        };
        warn!(%warning, "Map node count mismatch");
        warnings.push(warning);
    }

    debug!(
        nodes = nodes.len(),
        hq = hq.graph_index,
        "Parsed map"
    );

    Ok(ParsedMap {
        map: Map::from_parts(nodes, index, hq),
        warnings,
    })
}

/// 1-based line number of the k-th node header
fn header_line_number(k: usize) -> usize {
    3 + 2 * k
}

fn parse_node_header(text: &str, line: usize) -> Result<(u32, Position), ParseError> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() != 4 {
        return Err(ParseError::WrongTokenCount {
            line,
            expected: 4,
            found: tokens.len(),
        });
    }
    let graph_index = parse_number(tokens[0], line, "graph index")?;
    let x = parse_number(tokens[1], line, "coordinate")?;
    let y = parse_number(tokens[2], line, "coordinate")?;
    let z = parse_number(tokens[3], line, "coordinate")?;
    Ok((graph_index, Position::new(x, y, z)))
}

fn parse_number<T: FromStr>(token: &str, line: usize, expected: &'static str) -> Result<T, ParseError> {
    token.parse().map_err(|_| ParseError::InvalidNumber {
        line,
        token: token.to_string(),
        expected,
    })
}
