//! Map parsing and route planning, end to end from map text

use courier_agent::map::{parse_map, Map, ParseError, ParseWarning, Position};
use courier_agent::pathfinding::{find_path, PathError};
use proptest::prelude::*;

#[test]
fn test_two_node_example() {
    let parsed = parse_map("0 0 0 0\n2\n0 0 0 0\n1 5\n1 1 1 1\n0 5").unwrap();
    let map = parsed.map;

    assert!(parsed.warnings.is_empty());
    assert_eq!(map.len(), 2);
    assert_eq!(map.hq().graph_index, 0);
    assert_eq!(map.hq().position, Position::new(0.0, 0.0, 0.0));

    let first = map.node(0).unwrap();
    let second = map.node(1).unwrap();
    assert_eq!(first.neighbors, vec![1]);
    assert_eq!(second.neighbors, vec![0]);
    assert_eq!(first.distance_to_neighbor(1), Some(5.0));
    assert_eq!(second.distance_to_neighbor(0), Some(5.0));
    assert_eq!(second.position, Position::new(1.0, 1.0, 1.0));
}

#[test]
fn test_chain_path_and_no_path() {
    let chain = parse_map("0 0 0 0\n3\n0 0 0 0\n1 1\n1 1 0 0\n0 1 2 1\n2 2 0 0\n1 1\n")
        .unwrap()
        .map;
    assert_eq!(find_path(&chain, 0, 2).unwrap().nodes(), &[0, 1, 2]);

    let islands = parse_map("0 0 0 0\n3\n0 0 0 0\n1 1\n1 1 0 0\n0 1\n2 5 0 0\n\n")
        .unwrap()
        .map;
    assert_eq!(
        find_path(&islands, 0, 2),
        Err(PathError::NoPathFound { from: 0, to: 2 })
    );
}

#[test]
fn test_hq_outside_node_collection() {
    let parsed = parse_map("9 0 0 0\n1\n0 3 0 4\n\n").unwrap();
    let map = parsed.map;

    assert_eq!(map.hq().graph_index, 9);
    assert!(!map.contains(9));
    assert_eq!(find_path(&map, 0, 9), Err(PathError::UnknownNode(9)));
}

#[test]
fn test_count_mismatch_is_a_warning() {
    let parsed = parse_map("0 0 0 0\n5\n0 0 0 0\n\n").unwrap();
    assert_eq!(parsed.map.len(), 1);
    assert_eq!(
        parsed.warnings,
        vec![ParseWarning::NodeCountMismatch {
            declared: 5,
            parsed: 1
        }]
    );
}

#[test]
fn test_dangling_reference_is_an_error() {
    let err = parse_map("0 0 0 0\n1\n0 0 0 0\n7 2\n").unwrap_err();
    assert!(matches!(
        err,
        ParseError::DanglingReference {
            node: 0,
            neighbor: 7,
            ..
        }
    ));
}

#[test]
fn test_grid_routes_use_manhattan_length() {
    let map = Map::grid(6, 4, 2.0);
    let route = find_path(&map, 0, 23).unwrap();

    assert_eq!(route.source(), 0);
    assert_eq!(route.destination(), 23);
    assert_eq!(route.edge_count(), 5 + 3);
    assert_eq!(route.total_distance(&map), Some(16.0));
    for (a, b) in route.edges() {
        assert!(map.edge_weight(a, b).is_some(), "{a} -> {b} is not an edge");
    }
}

proptest! {
    #[test]
    fn prop_grid_text_round_trip(width in 1u32..6, height in 1u32..6) {
        let map = Map::grid(width, height, 1.5);
        let parsed = parse_map(&map.to_text()).unwrap();
        prop_assert!(parsed.warnings.is_empty());
        prop_assert_eq!(parsed.map, map);
    }

    #[test]
    fn prop_grid_paths_are_shortest(
        width in 1u32..7,
        height in 1u32..7,
        a in any::<u32>(),
        b in any::<u32>(),
    ) {
        let map = Map::grid(width, height, 1.0);
        let count = width * height;
        let (from, to) = (a % count, b % count);

        let route = find_path(&map, from, to).unwrap();
        let manhattan = (from % width).abs_diff(to % width) + (from / width).abs_diff(to / width);

        prop_assert_eq!(route.edge_count() as u32, manhattan);
        prop_assert_eq!(route.source(), from);
        prop_assert_eq!(route.destination(), to);
    }
}
