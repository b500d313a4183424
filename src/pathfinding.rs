//! A* route planning over the navigation map
//!
//! The heuristic is straight-line distance between node positions, which
//! stays admissible as long as no edge weight is shorter than the distance
//! between its endpoints. Ties on `f` go to the entry pushed first, so the
//! same map and endpoints always produce the same route.

use crate::map::Map;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use thiserror::Error;
use tracing::trace;

/// Pathfinding errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    #[error("no path from node {from} to node {to}")]
    NoPathFound { from: u32, to: u32 },
    #[error("node {0} is not on the map")]
    UnknownNode(u32),
    #[error("node {from} lists neighbor {to} without a distance")]
    MissingEdgeWeight { from: u32, to: u32 },
}

/// Ordered node sequence from source to destination, both inclusive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    nodes: Vec<u32>,
}

impl Route {
    /// Route consisting of a single node
    pub fn single(node: u32) -> Self {
        Self { nodes: vec![node] }
    }

    /// Route over an explicit node list; `None` when the list is empty
    pub fn from_nodes(nodes: Vec<u32>) -> Option<Self> {
        (!nodes.is_empty()).then_some(Self { nodes })
    }

    pub fn nodes(&self) -> &[u32] {
        &self.nodes
    }

    pub fn source(&self) -> u32 {
        self.nodes[0]
    }

    pub fn destination(&self) -> u32 {
        self.nodes[self.nodes.len() - 1]
    }

    /// Number of edges, zero for a single-node route
    pub fn edge_count(&self) -> usize {
        self.nodes.len() - 1
    }

    /// Consecutive `(start, end)` pairs
    pub fn edges(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.nodes.windows(2).map(|w| (w[0], w[1]))
    }

    /// Sum of edge weights along the route
    pub fn total_distance(&self, map: &Map) -> Option<f64> {
        self.edges().map(|(a, b)| map.edge_weight(a, b)).sum()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.nodes.iter().map(u32::to_string).collect();
        f.write_str(&parts.join(" -> "))
    }
}

#[derive(Debug)]
struct OpenEntry {
    f_score: f64,
    seq: u64,
    node: u32,
}

impl PartialEq for OpenEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for OpenEntry {}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OpenEntry {
    // Reversed so the max-heap pops the lowest f, then the oldest entry
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .f_score
            .total_cmp(&self.f_score)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Find the cheapest route from `from` to `to`
pub fn find_path(map: &Map, from: u32, to: u32) -> Result<Route, PathError> {
    map.node(from).ok_or(PathError::UnknownNode(from))?;
    let goal = map.node(to).ok_or(PathError::UnknownNode(to))?;
    let goal_position = goal.position;

    if from == to {
        return Ok(Route::single(from));
    }

    let heuristic = |graph_index: u32| -> f64 {
        map.node(graph_index)
            .map(|n| n.position.distance_to(&goal_position))
            .unwrap_or(0.0)
    };

    let mut open = BinaryHeap::new();
    let mut seq = 0u64;
    let mut g_score: HashMap<u32, f64> = HashMap::new();
    let mut came_from: HashMap<u32, u32> = HashMap::new();
    let mut closed: HashSet<u32> = HashSet::new();

    g_score.insert(from, 0.0);
    open.push(OpenEntry {
        f_score: heuristic(from),
        seq,
        node: from,
    });

    while let Some(OpenEntry { node: current, .. }) = open.pop() {
        if current == to {
            let route = reconstruct(&came_from, current);
            trace!(%route, "Route found");
            return Ok(route);
        }
        if !closed.insert(current) {
            continue;
        }

        let current_node = map.node(current).ok_or(PathError::UnknownNode(current))?;
        let current_g = g_score[&current];

        for &neighbor in &current_node.neighbors {
            if closed.contains(&neighbor) {
                continue;
            }
            let weight =
                current_node
                    .distance_to_neighbor(neighbor)
                    .ok_or(PathError::MissingEdgeWeight {
                        from: current,
                        to: neighbor,
                    })?;
            let tentative = current_g + weight;
            let improves = g_score
                .get(&neighbor)
                .map_or(true, |&known| tentative < known);
            if improves {
                g_score.insert(neighbor, tentative);
                came_from.insert(neighbor, current);
                seq += 1;
                open.push(OpenEntry {
                    f_score: tentative + heuristic(neighbor),
                    seq,
                    node: neighbor,
                });
            }
        }
    }

    Err(PathError::NoPathFound { from, to })
}

fn reconstruct(came_from: &HashMap<u32, u32>, end: u32) -> Route {
    let mut nodes = vec![end];
    let mut cursor = end;
    while let Some(&previous) = came_from.get(&cursor) {
        nodes.push(previous);
        cursor = previous;
    }
    nodes.reverse();
    Route { nodes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::parse_map;

    fn chain() -> Map {
        // 0 - 1 - 2 along the x axis
        parse_map("0 0 0 0\n3\n0 0 0 0\n1 1\n1 1 0 0\n0 1 2 1\n2 2 0 0\n1 1\n")
            .unwrap()
            .map
    }

    #[test]
    fn test_chain_path() {
        let route = find_path(&chain(), 0, 2).unwrap();
        assert_eq!(route.nodes(), &[0, 1, 2]);
        assert_eq!(route.source(), 0);
        assert_eq!(route.destination(), 2);
        assert_eq!(route.edge_count(), 2);
        assert_eq!(route.edges().collect::<Vec<_>>(), vec![(0, 1), (1, 2)]);
        assert_eq!(route.total_distance(&chain()), Some(2.0));
    }

    #[test]
    fn test_same_node_route() {
        let route = find_path(&chain(), 1, 1).unwrap();
        assert_eq!(route.nodes(), &[1]);
        assert_eq!(route.edge_count(), 0);
    }

    #[test]
    fn test_no_path() {
        let map = parse_map("0 0 0 0\n2\n0 0 0 0\n\n1 1 0 0\n").unwrap().map;
        assert_eq!(
            find_path(&map, 0, 1).unwrap_err(),
            PathError::NoPathFound { from: 0, to: 1 }
        );
    }

    #[test]
    fn test_one_way_edge() {
        let map = parse_map("0 0 0 0\n2\n0 0 0 0\n1 1\n1 1 0 0\n").unwrap().map;
        assert!(find_path(&map, 0, 1).is_ok());
        assert!(matches!(
            find_path(&map, 1, 0),
            Err(PathError::NoPathFound { .. })
        ));
    }

    #[test]
    fn test_unknown_endpoints() {
        assert_eq!(
            find_path(&chain(), 0, 9).unwrap_err(),
            PathError::UnknownNode(9)
        );
        assert_eq!(
            find_path(&chain(), 9, 0).unwrap_err(),
            PathError::UnknownNode(9)
        );
    }

    #[test]
    fn test_prefers_cheaper_detour() {
        // Direct edge 0-3 costs 10, the detour 0-1-2-3 costs 3.3
        let text = "0 0 0 0\n4\n\
                    0 0 0 0\n3 10 1 1.1\n\
                    1 1 0 0\n0 1.1 2 1.1\n\
                    2 2 0 0\n1 1.1 3 1.1\n\
                    3 3 0 0\n2 1.1 0 10\n";
        let map = parse_map(text).unwrap().map;
        let route = find_path(&map, 0, 3).unwrap();
        assert_eq!(route.nodes(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_ties_are_deterministic() {
        // Two equal-cost routes around a square; the first declared wins
        let text = "0 0 0 0\n4\n\
                    0 0 0 0\n1 1 2 1\n\
                    1 1 0 0\n3 1\n\
                    2 0 0 1\n3 1\n\
                    3 1 0 1\n\n";
        let map = parse_map(text).unwrap().map;
        let first = find_path(&map, 0, 3).unwrap();
        for _ in 0..10 {
            assert_eq!(find_path(&map, 0, 3).unwrap(), first);
        }
        assert_eq!(first.nodes(), &[0, 1, 3]);
    }

    #[test]
    fn test_grid_route_is_shortest() {
        let map = Map::grid(5, 5, 1.0);
        let route = find_path(&map, 0, 24).unwrap();
        assert_eq!(route.edge_count(), 8);
        assert_eq!(route.total_distance(&map), Some(8.0));
        for (a, b) in route.edges() {
            assert!(map.node(a).unwrap().is_neighbor(b));
        }
    }

    #[test]
    fn test_route_display() {
        let route = find_path(&chain(), 2, 0).unwrap();
        assert_eq!(route.to_string(), "2 -> 1 -> 0");
    }
}
