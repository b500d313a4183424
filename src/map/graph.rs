//! In-memory navigation graph
//!
//! Nodes are identified by the server-assigned graph index. Neighbor links are
//! stored as graph indices and resolved through the map's index, so the whole
//! graph is plain owned data and can be shared read-only after parsing.

use std::collections::HashMap;
use std::fmt::Write as _;

/// A point in 3D space
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Straight-line distance
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Point `fraction` of the way from `self` to `other`
    pub fn lerp(&self, other: &Position, fraction: f64) -> Position {
        Position::new(
            self.x + (other.x - self.x) * fraction,
            self.y + (other.y - self.y) * fraction,
            self.z + (other.z - self.z) * fraction,
        )
    }
}

/// A navigable point on the map
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub graph_index: u32,
    pub position: Position,
    /// Neighbor graph indices in declaration order
    pub neighbors: Vec<u32>,
    pub neighbor_distances: HashMap<u32, f64>,
}

impl Node {
    pub fn new(graph_index: u32, position: Position) -> Self {
        Self {
            graph_index,
            position,
            neighbors: Vec::new(),
            neighbor_distances: HashMap::new(),
        }
    }

    /// Record a directed edge to `neighbor`. A repeated neighbor keeps its
    /// first position in the list and takes the latest distance.
    pub fn connect(&mut self, neighbor: u32, distance: f64) {
        if self.neighbor_distances.insert(neighbor, distance).is_none() {
            self.neighbors.push(neighbor);
        }
    }

    pub fn distance_to_neighbor(&self, neighbor: u32) -> Option<f64> {
        self.neighbor_distances.get(&neighbor).copied()
    }

    pub fn is_neighbor(&self, graph_index: u32) -> bool {
        self.neighbor_distances.contains_key(&graph_index)
    }
}

/// The depot agents start from and return to between tasks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HqNode {
    pub graph_index: u32,
    pub position: Position,
}

/// Parsed navigation map
#[derive(Debug, Clone, PartialEq)]
pub struct Map {
    nodes: Vec<Node>,
    index: HashMap<u32, usize>,
    hq: HqNode,
}

impl Map {
    /// Build a map from nodes whose graph indices are already known unique
    pub(crate) fn from_parts(nodes: Vec<Node>, index: HashMap<u32, usize>, hq: HqNode) -> Self {
        Self { nodes, index, hq }
    }

    pub fn hq(&self) -> &HqNode {
        &self.hq
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, graph_index: u32) -> Option<&Node> {
        self.index.get(&graph_index).map(|&slot| &self.nodes[slot])
    }

    pub fn contains(&self, graph_index: u32) -> bool {
        self.index.contains_key(&graph_index)
    }

    /// Position of a node, falling back to HQ when the index names it
    pub fn position_of(&self, graph_index: u32) -> Option<Position> {
        self.node(graph_index).map(|n| n.position).or_else(|| {
            (graph_index == self.hq.graph_index).then_some(self.hq.position)
        })
    }

    /// Weight of the directed edge `from -> to`, if declared
    pub fn edge_weight(&self, from: u32, to: u32) -> Option<f64> {
        self.node(from).and_then(|n| n.distance_to_neighbor(to))
    }

    /// Render the map in the dispatch text format
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let hq = &self.hq;
        let _ = writeln!(
            out,
            "{} {} {} {}",
            hq.graph_index, hq.position.x, hq.position.y, hq.position.z
        );
        let _ = writeln!(out, "{}", self.nodes.len());
        for node in &self.nodes {
            let p = node.position;
            let _ = writeln!(out, "{} {} {} {}", node.graph_index, p.x, p.y, p.z);
            let neighbors: Vec<String> = node
                .neighbors
                .iter()
                .map(|n| format!("{} {}", n, node.neighbor_distances[n]))
                .collect();
            let _ = writeln!(out, "{}", neighbors.join(" "));
        }
        out
    }

    /// Fully connected 4-neighbour grid, row-major indices, HQ at node 0
    ///
    /// Nodes lie on the y = 0 plane, `spacing` apart; every edge is declared
    /// in both directions with weight equal to `spacing`.
    pub fn grid(width: u32, height: u32, spacing: f64) -> Self {
        let mut nodes = Vec::with_capacity((width * height) as usize);
        for row in 0..height {
            for col in 0..width {
                let graph_index = row * width + col;
                let position = Position::new(col as f64 * spacing, 0.0, row as f64 * spacing);
                let mut node = Node::new(graph_index, position);
                if col > 0 {
                    node.connect(graph_index - 1, spacing);
                }
                if col + 1 < width {
                    node.connect(graph_index + 1, spacing);
                }
                if row > 0 {
                    node.connect(graph_index - width, spacing);
                }
                if row + 1 < height {
                    node.connect(graph_index + width, spacing);
                }
                nodes.push(node);
            }
        }

        let index = nodes
            .iter()
            .enumerate()
            .map(|(slot, n)| (n.graph_index, slot))
            .collect();
        let hq = HqNode {
            graph_index: 0,
            position: Position::default(),
        };
        Self::from_parts(nodes, index, hq)
    }
}
