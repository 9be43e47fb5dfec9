//! Integration tests for cross-map route search
//!
//! These build tiny synthetic worlds and check that:
//! - candidate routes whose hop cannot be walked are pruned, not fatal
//! - warps with out-of-range pair indices never appear in a route
//! - connection routes end with the intra-map approach to the target

use pokebot::actors::{ActorOccupancy, Overworld};
use pokebot::config::{MetafinderConfig, PathfinderConfig};
use pokebot::game::NoGameData;
use pokebot::metafinder::{Edge, Key, LocalValidator, Metafinder, Navigator};
use pokebot::world::{Connection, ConnectionKind, Map, WarpEvent, World};
use std::collections::HashMap;
use test_log::test;

fn warp(x: u16, y: u16, dest_bank: u8, dest_map: u8, dest_warp: u8) -> WarpEvent {
    WarpEvent {
        x,
        y,
        level: 0,
        dest_warp,
        dest_map,
        dest_bank,
    }
}

fn room(bank: u8, id: u8, warps: Vec<WarpEvent>) -> Map {
    let mut map = Map::from_ascii(bank, id, &["...", "...", "..."]);
    map.warps = warps;
    map
}

/// Rejects warps by index and counts every call
#[derive(Default)]
struct MockValidator {
    rejected: Vec<usize>,
    calls: HashMap<(Key, Edge), usize>,
    generation: u64,
}

impl LocalValidator for MockValidator {
    fn validate(&mut self, from: Key, edge: &Edge) -> bool {
        *self.calls.entry((from, *edge)).or_default() += 1;
        match edge {
            Edge::Warp { index, .. } => !self.rejected.contains(index),
            _ => true,
        }
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}

#[test]
fn test_unwalkable_candidate_is_pruned() {
    let world = World::from_maps(vec![
        room(0, 0, vec![warp(0, 0, 0, 1, 0), warp(2, 2, 0, 1, 1)]),
        room(0, 1, vec![warp(0, 0, 0, 0, 0), warp(2, 2, 0, 0, 1)]),
    ]);
    let mut finder = Metafinder::new(&world, MetafinderConfig::default());
    let mut validator = MockValidator {
        rejected: vec![0],
        ..MockValidator::default()
    };
    let start = Key::new(1, 1, 0, 0);

    let path = finder.search_map(start, 0, 1, &mut validator).unwrap();
    assert_eq!(path.len(), 1);
    match path[0].edge {
        Edge::Warp { index, .. } => assert_eq!(index, 1),
        other => panic!("unexpected edge {:?}", other),
    }
    assert_eq!(path[0].to, Key::new(2, 2, 0, 1));

    let first = Edge::Warp {
        index: 0,
        warp: warp(0, 0, 0, 1, 0),
    };
    assert_eq!(finder.subpath(start, &first), Some(false));
    assert!(validator.calls.values().all(|&n| n == 1));
}

#[test]
fn test_all_candidates_unwalkable() {
    let world = World::from_maps(vec![
        room(0, 0, vec![warp(0, 0, 0, 1, 0)]),
        room(0, 1, vec![warp(0, 0, 0, 0, 0)]),
    ]);
    let mut finder = Metafinder::new(&world, MetafinderConfig::default());
    let mut validator = MockValidator {
        rejected: vec![0],
        ..MockValidator::default()
    };
    assert_eq!(finder.search_map(Key::new(1, 1, 0, 0), 0, 1, &mut validator), None);
}

#[test]
fn test_new_generation_revalidates() {
    let world = World::from_maps(vec![
        room(0, 0, vec![warp(0, 0, 0, 1, 0)]),
        room(0, 1, vec![warp(0, 0, 0, 0, 0)]),
    ]);
    let mut finder = Metafinder::new(&world, MetafinderConfig::default());
    let mut validator = MockValidator {
        rejected: vec![0],
        ..MockValidator::default()
    };
    let start = Key::new(1, 1, 0, 0);
    assert_eq!(finder.search_map(start, 0, 1, &mut validator), None);

    // the blocker left but nobody said so: the old verdict stands
    validator.rejected.clear();
    assert_eq!(finder.search_map(start, 0, 1, &mut validator), None);
    assert!(validator.calls.values().all(|&n| n == 1));

    validator.generation += 1;
    let path = finder.search_map(start, 0, 1, &mut validator).unwrap();
    assert_eq!(path.len(), 1);
    assert!(validator.calls.values().any(|&n| n == 2));
}

#[test]
fn test_bad_back_reference_is_skipped() {
    let world = World::from_maps(vec![
        // warp 0 pairs with a warp pointing back at a nonexistent index,
        // warp 2 targets a warp the destination does not have
        room(
            0,
            0,
            vec![warp(0, 0, 0, 1, 0), warp(2, 2, 0, 1, 1), warp(2, 0, 0, 1, 9)],
        ),
        room(0, 1, vec![warp(0, 0, 0, 0, 7), warp(2, 2, 0, 0, 1)]),
    ]);
    let mut finder = Metafinder::new(&world, MetafinderConfig::default());
    let mut validator = MockValidator::default();

    let path = finder
        .search_map(Key::new(1, 1, 0, 0), 0, 1, &mut validator)
        .unwrap();
    assert_eq!(path.len(), 1);
    assert!(matches!(path[0].edge, Edge::Warp { index: 1, .. }));
    assert_ne!(path[0].to, Key::new(0, 0, 0, 1));
    assert!(validator
        .calls
        .keys()
        .all(|(_, edge)| !matches!(edge, Edge::Warp { index: 0 | 2, .. })));
}

#[test]
fn test_only_bad_warps_means_no_route() {
    let world = World::from_maps(vec![
        room(0, 0, vec![warp(0, 0, 0, 1, 0)]),
        room(0, 1, vec![warp(0, 0, 0, 0, 4)]),
    ]);
    let mut finder = Metafinder::new(&world, MetafinderConfig::default());
    let mut validator = MockValidator::default();
    assert_eq!(finder.search_map(Key::new(1, 1, 0, 0), 0, 1, &mut validator), None);
    assert!(validator.calls.is_empty());
}

#[test]
fn test_connection_then_position() {
    let mut west = Map::from_ascii(0, 0, &["...", "...", "..."]);
    west.connections.push(Connection {
        kind: ConnectionKind::Right,
        offset: 0,
        bank: 0,
        map: 1,
    });
    let mut east = Map::from_ascii(0, 1, &["...", "...", "..."]);
    east.connections.push(Connection {
        kind: ConnectionKind::Left,
        offset: 0,
        bank: 0,
        map: 0,
    });
    let world = World::from_maps(vec![west, east]);
    let mut finder = Metafinder::new(&world, MetafinderConfig::default());
    let mut navigator = Navigator::new(&world, PathfinderConfig::default());

    let target = Key::new(2, 1, 0, 1);
    let path = finder
        .search(Key::new(0, 1, 0, 0), target, &mut navigator)
        .unwrap();
    assert_eq!(path.len(), 2);
    match path[0].edge {
        Edge::Connection { exit, .. } => assert_eq!(exit, (2, 0)),
        other => panic!("unexpected edge {:?}", other),
    }
    assert_eq!(path[0].to, Key::new(0, 0, 0, 1));
    assert_eq!(path[1].edge, Edge::Position { x: 2, y: 1 });
    assert_eq!(path[1].to, target);

    let hop = navigator.path_for(path[0].from, &path[0].edge).unwrap();
    assert_eq!(hop.last(), Some(&(2, 0)));
}

#[test]
fn test_connection_to_missing_map_is_skipped() {
    let mut lonely = Map::from_ascii(0, 0, &["..."]);
    lonely.connections.push(Connection {
        kind: ConnectionKind::Down,
        offset: 0,
        bank: 3,
        map: 3,
    });
    let world = World::from_maps(vec![lonely]);
    let mut finder = Metafinder::new(&world, MetafinderConfig::default());
    let mut validator = MockValidator::default();
    assert_eq!(finder.search_map(Key::new(0, 0, 0, 0), 3, 3, &mut validator), None);
}

#[test]
fn test_refreshed_actors_reopen_route() {
    let mut west = Map::from_ascii(0, 0, &["..."]);
    west.connections.push(Connection {
        kind: ConnectionKind::Right,
        offset: 0,
        bank: 0,
        map: 1,
    });
    let east = Map::from_ascii(0, 1, &["..."]);
    let blocked = ActorOccupancy::build(&west, &Overworld::new(), &NoGameData, &[(1, 0)]);
    let clear = ActorOccupancy::build(&west, &Overworld::new(), &NoGameData, &[]);
    let world = World::from_maps(vec![west, east]);
    let mut finder = Metafinder::new(&world, MetafinderConfig::default());
    let mut navigator = Navigator::new(&world, PathfinderConfig::default());
    let start = Key::new(0, 0, 0, 0);

    navigator.set_occupancy(0, 0, blocked);
    assert_eq!(finder.search_map(start, 0, 1, &mut navigator), None);

    navigator.set_occupancy(0, 0, clear);
    let path = finder.search_map(start, 0, 1, &mut navigator).unwrap();
    assert_eq!(path.len(), 1);
    assert_eq!(path[0].to, Key::new(0, 0, 0, 1));
}
