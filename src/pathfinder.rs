//! Best-first search over one map's walkability graph.
//!
//! Nodes live in an arena indexed by `y * width + x`. Static links are
//! computed once; per-search weights are reset lazily on the next search.

use crate::actors::{Direction, Occupancy};
use crate::config::PathfinderConfig;
use crate::world::{behavior, Map, Tile, WarpEvent};
use log::{debug, trace, warn};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

pub type Cell = (i32, i32);

const UP: usize = 0;
const DOWN: usize = 1;
const LEFT: usize = 2;
const RIGHT: usize = 3;

#[derive(Debug, Clone)]
struct Node {
    x: i32,
    y: i32,
    cost: f32,
    /// Up, down, left, right; one-way across ledges
    links: [Option<usize>; 4],
    weight: f32,
    heuristic: f32,
    came_from: Option<usize>,
    seen: bool,
    closed: bool,
    /// Occupancy, evaluated at most once per search
    occupied: Option<bool>,
}

impl Node {
    fn clear(&mut self) {
        self.weight = 0.0;
        self.heuristic = 0.0;
        self.came_from = None;
        self.seen = false;
        self.closed = false;
        self.occupied = None;
    }
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    heuristic: f32,
    seq: u64,
    index: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // Min-heap on heuristic, FIFO among ties
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .heuristic
            .total_cmp(&self.heuristic)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Local pathfinder for one map
#[derive(Debug, Clone)]
pub struct Pathfinder {
    pub bank: u8,
    pub map: u8,
    width: usize,
    height: usize,
    tiles: Vec<Tile>,
    nodes: Vec<Option<Node>>,
    config: PathfinderConfig,
    dirty: bool,
}

fn standable(tile: Option<Tile>) -> bool {
    tile.map(|t| t.is_walkable() && !behavior::is_jump(t.behavior))
        .unwrap_or(false)
}

impl Pathfinder {
    pub fn new(map: &Map, config: PathfinderConfig) -> Self {
        let (width, height) = (map.width, map.height);
        let mut tiles = Vec::with_capacity(width * height);
        let mut nodes = Vec::with_capacity(width * height);
        for y in 0..height as i32 {
            for x in 0..width as i32 {
                let tile = map.tile(x, y).unwrap_or_else(Tile::wall);
                tiles.push(tile);
                nodes.push(standable(Some(tile)).then(|| Node {
                    x,
                    y,
                    cost: if tile.behavior == behavior::TALL_GRASS {
                        config.grass_cost
                    } else {
                        config.walk_cost
                    },
                    links: [None; 4],
                    weight: 0.0,
                    heuristic: 0.0,
                    came_from: None,
                    seen: false,
                    closed: false,
                    occupied: None,
                }));
            }
        }
        let mut pathfinder = Pathfinder {
            bank: map.bank,
            map: map.id,
            width,
            height,
            tiles,
            nodes,
            config,
            dirty: false,
        };
        pathfinder.link();
        pathfinder
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x as usize >= self.width || y as usize >= self.height {
            None
        } else {
            Some(y as usize * self.width + x as usize)
        }
    }

    fn tile(&self, x: i32, y: i32) -> Option<Tile> {
        self.index(x, y).map(|i| self.tiles[i])
    }

    /// Arena index of a standable cell
    fn node_at(&self, x: i32, y: i32) -> Option<usize> {
        self.index(x, y).filter(|&i| self.nodes[i].is_some())
    }

    fn set_link(&mut self, from: usize, dir: usize, to: usize) {
        if let Some(node) = self.nodes[from].as_mut() {
            node.links[dir] = Some(to);
        }
    }

    /// Right and down edges from every node, with ledge hops
    fn link(&mut self) {
        for y in 0..self.height as i32 {
            for x in 0..self.width as i32 {
                let here = match self.node_at(x, y) {
                    Some(i) => i,
                    None => continue,
                };

                if let Some(right) = self.tile(x + 1, y) {
                    match right.behavior {
                        behavior::JUMP_RIGHT => {
                            if let Some(land) = self.node_at(x + 2, y) {
                                self.set_link(here, RIGHT, land);
                            }
                        }
                        behavior::JUMP_LEFT => {
                            if let Some(land) = self.node_at(x + 2, y) {
                                self.set_link(land, LEFT, here);
                            }
                        }
                        _ => {
                            if let Some(next) = self.node_at(x + 1, y) {
                                self.set_link(here, RIGHT, next);
                                self.set_link(next, LEFT, here);
                            }
                        }
                    }
                }

                if let Some(down) = self.tile(x, y + 1) {
                    match down.behavior {
                        behavior::JUMP_DOWN => {
                            if let Some(land) = self.node_at(x, y + 2) {
                                self.set_link(here, DOWN, land);
                            }
                        }
                        behavior::JUMP_UP => {
                            if let Some(land) = self.node_at(x, y + 2) {
                                self.set_link(land, UP, here);
                            }
                        }
                        _ => {
                            if let Some(next) = self.node_at(x, y + 1) {
                                self.set_link(here, DOWN, next);
                                self.set_link(next, UP, here);
                            }
                        }
                    }
                }
            }
        }
    }

    pub fn is_walkable(&self, x: i32, y: i32) -> bool {
        self.node_at(x, y).is_some()
    }

    /// Static neighbours reachable in one move from (x, y)
    pub fn neighbors(&self, x: i32, y: i32) -> Vec<Cell> {
        self.node_at(x, y)
            .and_then(|i| self.nodes[i].as_ref())
            .map(|n| {
                n.links
                    .iter()
                    .flatten()
                    .filter_map(|&j| self.nodes[j].as_ref().map(|m| (m.x, m.y)))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn clear(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            node.clear();
        }
        self.dirty = false;
    }

    /// Tile a player standing on a warp tile is pushed onto
    fn exit_direction(&self, x: i32, y: i32) -> Option<Direction> {
        match self.tile(x, y)?.behavior {
            behavior::DOOR | behavior::WARP_DOOR_INDOOR | behavior::ARROW_WARP_DOWN => Some(Direction::Down),
            behavior::ARROW_WARP_LEFT => Some(Direction::Left),
            behavior::ARROW_WARP_RIGHT => Some(Direction::Right),
            behavior::ARROW_WARP_UP => Some(Direction::Up),
            _ => None,
        }
    }

    fn at_counter<D: Fn(i32, i32) -> i32>(&self, x: i32, y: i32, distance: &D, target: i32) -> bool {
        if distance(x, y) != target + 1 {
            return false;
        }
        [(0, -1), (0, 1), (-1, 0), (1, 0)].iter().any(|&(dx, dy)| {
            self.tile(x + dx, y + dy)
                .map(|t| t.behavior == behavior::COUNTER)
                .unwrap_or(false)
                && distance(x + dx, y + dy) == target
        })
    }

    /// Path from `start` to the first cell where `distance == target`,
    /// excluding `start`. `None` when unreachable or over budget.
    pub fn search<D, O>(&mut self, start: Cell, distance: D, target: i32, occupancy: &O) -> Option<Vec<Cell>>
    where
        D: Fn(i32, i32) -> i32,
        O: Occupancy + ?Sized,
    {
        if self.dirty {
            self.clear();
        }
        self.dirty = true;

        let mut prefix = Vec::new();
        let mut start = start;
        if let Some(dir) = self.exit_direction(start.0, start.1) {
            let (dx, dy) = dir.delta();
            let stepped = (start.0 + dx, start.1 + dy);
            if self.node_at(stepped.0, stepped.1).is_some() && !occupancy.is_occupied(stepped.0, stepped.1) {
                trace!("start {:?} is a warp tile, stepping {:?}", start, dir);
                prefix.push(stepped);
                start = stepped;
            }
        }

        let start_index = match self.node_at(start.0, start.1) {
            Some(i) => i,
            None => {
                debug!("map ({}, {}): start {:?} is not walkable", self.bank, self.map, start);
                return None;
            }
        };

        let mut open = BinaryHeap::new();
        let mut seq = 0u64;
        if let Some(node) = self.nodes[start_index].as_mut() {
            node.seen = true;
            node.heuristic = (distance(start.0, start.1) - target).abs() as f32;
        }
        open.push(Candidate {
            heuristic: 0.0,
            seq,
            index: start_index,
        });

        let mut expansions = 0usize;
        while let Some(Candidate { index, .. }) = open.pop() {
            let (x, y, weight, links) = match self.nodes[index].as_ref() {
                Some(n) if !n.closed => (n.x, n.y, n.weight, n.links),
                _ => continue,
            };

            if distance(x, y) == target || self.at_counter(x, y, &distance, target) {
                let mut path = self.rebuild(index);
                prefix.append(&mut path);
                return Some(prefix);
            }

            expansions += 1;
            if expansions > self.config.max_expansions {
                warn!(
                    "map ({}, {}): search from {:?} exceeded {} expansions",
                    self.bank, self.map, start, self.config.max_expansions
                );
                return None;
            }
            if let Some(n) = self.nodes[index].as_mut() {
                n.closed = true;
            }

            for next in links.iter().flatten().copied() {
                let node = match self.nodes[next].as_mut() {
                    Some(n) => n,
                    None => continue,
                };
                let (nx, ny) = (node.x, node.y);
                let occupied = *node
                    .occupied
                    .get_or_insert_with(|| occupancy.is_occupied(nx, ny));
                if occupied {
                    continue;
                }
                let cost = weight + node.cost;
                if node.seen && cost >= node.weight {
                    continue;
                }
                node.came_from = Some(index);
                node.weight = cost;
                node.heuristic = cost + (distance(nx, ny) - target).abs() as f32;
                node.seen = true;
                node.closed = false;
                seq += 1;
                open.push(Candidate {
                    heuristic: node.heuristic,
                    seq,
                    index: next,
                });
            }
        }
        debug!(
            "map ({}, {}): no path from {:?} to distance {}",
            self.bank, self.map, start, target
        );
        None
    }

    fn rebuild(&self, goal: usize) -> Vec<Cell> {
        let mut path = Vec::new();
        let mut cursor = Some(goal);
        while let Some(i) = cursor {
            let node = match self.nodes[i].as_ref() {
                Some(n) => n,
                None => break,
            };
            if node.came_from.is_none() {
                break;
            }
            path.push((node.x, node.y));
            cursor = node.came_from;
        }
        path.reverse();
        path
    }

    /// Path onto `goal` (or to within `within` steps of it)
    pub fn search_to<O: Occupancy + ?Sized>(&mut self, start: Cell, goal: Cell, within: i32, occupancy: &O) -> Option<Vec<Cell>> {
        self.search(
            start,
            move |x, y| (x - goal.0).abs() + (y - goal.1).abs(),
            within,
            occupancy,
        )
    }

    /// Path to the nearest of `cells`
    pub fn search_to_any<O: Occupancy + ?Sized>(&mut self, start: Cell, cells: &[Cell], occupancy: &O) -> Option<Vec<Cell>> {
        if cells.is_empty() {
            return None;
        }
        self.search(
            start,
            |x, y| {
                cells
                    .iter()
                    .map(|&(cx, cy)| (x - cx).abs() + (y - cy).abs())
                    .min()
                    .unwrap_or(i32::MAX)
            },
            0,
            occupancy,
        )
    }

    /// Path next to an actor at its rendered position
    pub fn search_to_actor<O: Occupancy + ?Sized>(&mut self, start: Cell, actor: Cell, occupancy: &O) -> Option<Vec<Cell>> {
        self.search_to(start, actor, 1, occupancy)
    }

    /// Path onto one of a connection's exit cells
    pub fn search_to_connection<O: Occupancy + ?Sized>(
        &mut self,
        start: Cell,
        exits: &[Cell],
        occupancy: &O,
    ) -> Option<Vec<Cell>> {
        self.search_to_any(start, exits, occupancy)
    }

    /// Path onto a warp tile, or next to it when the tile itself blocks
    pub fn search_to_warp<O: Occupancy + ?Sized>(&mut self, start: Cell, warp: &WarpEvent, occupancy: &O) -> Option<Vec<Cell>> {
        let cell = (warp.x as i32, warp.y as i32);
        let within = if self.is_walkable(cell.0, cell.1) { 0 } else { 1 };
        self.search_to(start, cell, within, occupancy)
    }
}
