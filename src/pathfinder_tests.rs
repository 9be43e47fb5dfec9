use crate::actors::NoOccupancy;
use crate::config::PathfinderConfig;
use crate::pathfinder::{Cell, Pathfinder};
use crate::world::{Map, WarpEvent};
use test_log::test;

fn pathfinder(rows: &[&str]) -> Pathfinder {
    Map::from_ascii(0, 0, rows).pathfinder(&PathfinderConfig::default())
}

fn manhattan(goal: Cell) -> impl Fn(i32, i32) -> i32 {
    move |x, y| (x - goal.0).abs() + (y - goal.1).abs()
}

fn adjacent(a: Cell, b: Cell) -> bool {
    (a.0 - b.0).abs() + (a.1 - b.1).abs() == 1
}

#[test]
fn test_open_grid_is_manhattan_optimal() {
    let mut pf = pathfinder(&["...", "...", "..."]);
    let path = pf.search((0, 0), manhattan((2, 2)), 0, &NoOccupancy).unwrap();
    assert_eq!(path.len(), 4);
    assert_eq!(path.last(), Some(&(2, 2)));
    assert!(!path.contains(&(0, 0)));
    assert!(adjacent((0, 0), path[0]));
    for pair in path.windows(2) {
        assert!(adjacent(pair[0], pair[1]));
    }
}

#[test]
fn test_occupant_blocks_only_connector() {
    let blocked = |x: i32, y: i32| (x, y) == (1, 0);

    let mut pf = pathfinder(&["..."]);
    assert_eq!(pf.search((0, 0), manhattan((2, 0)), 0, &blocked), None);

    let mut pf = pathfinder(&["...", "..."]);
    let path = pf.search((0, 0), manhattan((2, 0)), 0, &blocked).unwrap();
    assert!(!path.contains(&(1, 0)));
    assert_eq!(path.last(), Some(&(2, 0)));
    assert_eq!(path.len(), 4);
}

#[test]
fn test_occupancy_is_reevaluated_per_search() {
    let mut pf = pathfinder(&["..."]);
    let blocked = |x: i32, y: i32| (x, y) == (1, 0);
    assert_eq!(pf.search((0, 0), manhattan((2, 0)), 0, &blocked), None);
    let path = pf.search((0, 0), manhattan((2, 0)), 0, &NoOccupancy).unwrap();
    assert_eq!(path, vec![(1, 0), (2, 0)]);
}

#[test]
fn test_ledge_is_one_way() {
    let mut pf = pathfinder(&[".>."]);
    assert!(!pf.is_walkable(1, 0));
    assert_eq!(pf.neighbors(0, 0), vec![(2, 0)]);
    assert!(pf.neighbors(2, 0).is_empty());

    let path = pf.search((0, 0), manhattan((2, 0)), 0, &NoOccupancy).unwrap();
    assert_eq!(path, vec![(2, 0)]);
    assert_eq!(pf.search((2, 0), manhattan((0, 0)), 0, &NoOccupancy), None);
}

#[test]
fn test_downward_ledge() {
    let mut pf = pathfinder(&[".", "v", "."]);
    assert_eq!(
        pf.search((0, 0), manhattan((0, 2)), 0, &NoOccupancy),
        Some(vec![(0, 2)])
    );
    assert_eq!(pf.search((0, 2), manhattan((0, 0)), 0, &NoOccupancy), None);
}

#[test]
fn test_grass_is_avoided_when_possible() {
    let mut pf = pathfinder(&[".g.", "..."]);
    let path = pf.search((0, 0), manhattan((2, 0)), 0, &NoOccupancy).unwrap();
    assert!(!path.contains(&(1, 0)));
    assert_eq!(path.len(), 4);

    let mut pf = pathfinder(&[".g."]);
    let path = pf.search((0, 0), manhattan((2, 0)), 0, &NoOccupancy).unwrap();
    assert_eq!(path, vec![(1, 0), (2, 0)]);
}

#[test]
fn test_within_distance() {
    let mut pf = pathfinder(&["....."]);
    let path = pf.search_to((0, 0), (4, 0), 2, &NoOccupancy).unwrap();
    assert_eq!(path, vec![(1, 0), (2, 0)]);
    assert_eq!(pf.search_to((0, 0), (0, 0), 0, &NoOccupancy), Some(vec![]));
}

#[test]
fn test_shopkeeper_behind_counter() {
    let mut pf = pathfinder(&["...", "#c#", "..."]);
    let path = pf.search_to_actor((0, 0), (1, 2), &NoOccupancy).unwrap();
    assert_eq!(path, vec![(1, 0)]);
}

#[test]
fn test_start_on_door_steps_out() {
    let mut pf = pathfinder(&["d..", "..."]);
    let path = pf.search_to((0, 0), (2, 1), 0, &NoOccupancy).unwrap();
    assert_eq!(path, vec![(0, 1), (1, 1), (2, 1)]);
}

#[test]
fn test_door_exit_blocked_by_npc() {
    let mut pf = pathfinder(&["d..", "..."]);
    let npc = |x: i32, y: i32| (x, y) == (0, 1);
    let path = pf.search_to((0, 0), (2, 1), 0, &npc).unwrap();
    assert_eq!(path.len(), 3);
    assert_eq!(path[0], (1, 0));
    assert!(!path.contains(&(0, 1)));
    assert_eq!(path.last(), Some(&(2, 1)));
}

#[test]
fn test_nearest_of_many() {
    let mut pf = pathfinder(&["....."]);
    let path = pf.search_to_any((2, 0), &[(0, 0), (4, 0)], &NoOccupancy).unwrap();
    assert_eq!(path.len(), 2);
    assert!(pf.search_to_any((2, 0), &[], &NoOccupancy).is_none());
}

#[test]
fn test_warp_on_wall_is_approached() {
    let mut pf = pathfinder(&["...#"]);
    let warp = WarpEvent {
        x: 3,
        y: 0,
        level: 0,
        dest_warp: 0,
        dest_map: 0,
        dest_bank: 0,
    };
    let path = pf.search_to_warp((0, 0), &warp, &NoOccupancy).unwrap();
    assert_eq!(path.last(), Some(&(2, 0)));
}
