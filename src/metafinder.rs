//! Cross-map route search over connections and warps.
//!
//! Routes are found breadth-first on the meta graph, then validated hop by
//! hop with the local pathfinder. Validation results are memoized per
//! (position, edge) so shared prefixes are only checked once.

use crate::actors::{ActorOccupancy, NoOccupancy, Occupancy, Overworld};
use crate::config::{MetafinderConfig, PathfinderConfig};
use crate::pathfinder::{Cell, Pathfinder};
use crate::world::{Connection, ConnectionKind, Map, PersonEvent, WarpEvent, World};
use log::{debug, trace, warn};
use std::collections::{HashMap, HashSet, VecDeque};

/// A position in the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Key {
    pub x: i32,
    pub y: i32,
    pub bank: u8,
    pub map: u8,
}

impl Key {
    pub fn new(x: i32, y: i32, bank: u8, map: u8) -> Self {
        Key { x, y, bank, map }
    }

    pub fn cell(&self) -> Cell {
        (self.x, self.y)
    }

    fn on_map(&self, bank: u8, map: u8) -> bool {
        self.bank == bank && self.map == map
    }
}

/// One hop of a route, taken from the hop's starting position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Edge {
    /// Walk onto `exit` and cross the border
    Connection { exit: Cell, connection: Connection },
    /// Walk onto warp `index` of the current map
    Warp { index: usize, warp: WarpEvent },
    /// Walk next to a person
    Person { person: PersonEvent },
    /// Walk onto a cell
    Position { x: i32, y: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub from: Key,
    pub edge: Edge,
    /// Where the hop leaves the player
    pub to: Key,
}

/// Goal test result for the map a candidate stands on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Goal {
    NotYet,
    /// Standing here already satisfies the goal
    Reached,
    /// One more intra-map hop finishes the route
    Approach(Edge),
}

/// Checks that a hop can actually be walked
pub trait LocalValidator {
    fn validate(&mut self, from: Key, edge: &Edge) -> bool;

    /// Changes whenever earlier verdicts may no longer hold
    fn generation(&self) -> u64 {
        0
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    key: Key,
    path: Vec<Step>,
    visited: HashSet<Key>,
    complete: bool,
}

impl Candidate {
    fn uses(&self, from: Key, edge: &Edge) -> bool {
        self.path.iter().any(|s| s.from == from && s.edge == *edge)
    }
}

/// Border cells walkable on both sides, one per contiguous run
pub fn connection_exits(map: &Map, dest: &Map, connection: &Connection) -> Vec<Cell> {
    let (w, h) = (map.width as i32, map.height as i32);
    let border: Vec<Cell> = match connection.kind {
        ConnectionKind::Down => (0..w).map(|x| (x, h - 1)).collect(),
        ConnectionKind::Up => (0..w).map(|x| (x, 0)).collect(),
        ConnectionKind::Left => (0..h).map(|y| (0, y)).collect(),
        ConnectionKind::Right => (0..h).map(|y| (w - 1, y)).collect(),
        _ => Vec::new(),
    };

    let mut exits = Vec::new();
    let mut in_run = false;
    for cell in border {
        let open = map.is_walkable(cell.0, cell.1)
            && matching_entry(map, dest, connection, cell)
                .map(|(x, y)| dest.is_walkable(x, y))
                .unwrap_or(false);
        if open && !in_run {
            exits.push(cell);
        }
        in_run = open;
    }
    exits
}

/// Cell of `dest` the player lands on when crossing at `exit`
pub fn matching_entry(map: &Map, dest: &Map, connection: &Connection, exit: Cell) -> Option<Cell> {
    let (x, y) = exit;
    let offset = connection.offset;
    match connection.kind {
        ConnectionKind::Down => Some((x - offset, 0)),
        ConnectionKind::Up => Some((x - offset, dest.height as i32 - 1)),
        ConnectionKind::Left => Some((dest.width as i32 - 1, y - offset)),
        ConnectionKind::Right => Some((0, y - offset)),
        _ => {
            trace!("connection {:?} from ({}, {}) has no border", connection.kind, map.bank, map.id);
            None
        }
    }
}

/// Meta-graph search with memoized local validation
pub struct Metafinder<'w> {
    world: &'w World,
    config: MetafinderConfig,
    subpaths: HashMap<(Key, Edge), bool>,
    /// Validator generation the memoized verdicts belong to
    generation: Option<u64>,
    exits: HashMap<(u8, u8, usize), Vec<Cell>>,
}

impl<'w> Metafinder<'w> {
    pub fn new(world: &'w World, config: MetafinderConfig) -> Self {
        Metafinder {
            world,
            config,
            subpaths: HashMap::new(),
            generation: None,
            exits: HashMap::new(),
        }
    }

    /// Memoized validation verdict for a hop, if already computed
    pub fn subpath(&self, from: Key, edge: &Edge) -> Option<bool> {
        self.subpaths.get(&(from, *edge)).copied()
    }

    /// Forget validation results. Searches do this on their own when the
    /// validator reports a new generation.
    pub fn clear_subpaths(&mut self) {
        self.subpaths.clear();
    }

    /// Outgoing meta edges of the map `key` stands on
    fn edges(&mut self, map: &Map, key: Key) -> Vec<(Edge, Key)> {
        let mut edges = Vec::new();

        for (i, connection) in map.connections.iter().enumerate() {
            let dest = match self.world.map(connection.bank, connection.map) {
                Some(dest) => dest,
                None => {
                    debug!(
                        "map ({}, {}): connection to missing map ({}, {})",
                        map.bank, map.id, connection.bank, connection.map
                    );
                    continue;
                }
            };
            let exits = self
                .exits
                .entry((map.bank, map.id, i))
                .or_insert_with(|| connection_exits(map, dest, connection))
                .clone();
            if exits.is_empty() {
                debug!(
                    "map ({}, {}): connection to ({}, {}) has no exits",
                    map.bank, map.id, connection.bank, connection.map
                );
                continue;
            }
            for exit in exits {
                if let Some((x, y)) = matching_entry(map, dest, connection, exit) {
                    edges.push((
                        Edge::Connection {
                            exit,
                            connection: *connection,
                        },
                        Key::new(x, y, connection.bank, connection.map),
                    ));
                }
            }
        }

        for (index, warp) in map.warps.iter().enumerate() {
            let dest = match self.world.map(warp.dest_bank, warp.dest_map) {
                Some(dest) => dest,
                None => {
                    debug!(
                        "map ({}, {}): warp {} leads to missing map ({}, {})",
                        map.bank, map.id, index, warp.dest_bank, warp.dest_map
                    );
                    continue;
                }
            };
            let arrival = match dest.warps.get(warp.dest_warp as usize) {
                Some(arrival) => arrival,
                None => {
                    debug!(
                        "map ({}, {}): warp {} targets warp {} of ({}, {}), out of range",
                        map.bank, map.id, index, warp.dest_warp, warp.dest_bank, warp.dest_map
                    );
                    continue;
                }
            };
            if map.warps.get(arrival.dest_warp as usize).is_none() {
                debug!(
                    "map ({}, {}): warp {} has a back-reference {} out of range",
                    map.bank, map.id, index, arrival.dest_warp
                );
                continue;
            }
            edges.push((
                Edge::Warp { index, warp: *warp },
                Key::new(arrival.x as i32, arrival.y as i32, warp.dest_bank, warp.dest_map),
            ));
        }

        trace!("({}, {}) at {:?}: {} edges", map.bank, map.id, key.cell(), edges.len());
        edges
    }

    fn validate_path(&mut self, path: &[Step], validator: &mut dyn LocalValidator) -> Result<(), (Key, Edge)> {
        for step in path {
            let verdict = match self.subpaths.get(&(step.from, step.edge)) {
                Some(v) => *v,
                None => {
                    let v = validator.validate(step.from, &step.edge);
                    self.subpaths.insert((step.from, step.edge), v);
                    v
                }
            };
            if !verdict {
                return Err((step.from, step.edge));
            }
        }
        Ok(())
    }

    /// Breadth-first search; `checker` decides when a map satisfies the goal
    pub fn search_with<C>(&mut self, start: Key, mut checker: C, validator: &mut dyn LocalValidator) -> Option<Vec<Step>>
    where
        C: FnMut(&Map, Key) -> Goal,
    {
        let generation = validator.generation();
        if self.generation != Some(generation) {
            if self.generation.is_some() {
                debug!("validator generation {}: dropping {} verdicts", generation, self.subpaths.len());
            }
            self.subpaths.clear();
            self.generation = Some(generation);
        }

        let mut queue = VecDeque::new();
        queue.push_back(Candidate {
            key: start,
            path: Vec::new(),
            visited: HashSet::from([start]),
            complete: false,
        });
        let mut popped = 0usize;

        while let Some(candidate) = queue.pop_front() {
            popped += 1;
            if popped > self.config.max_candidates {
                warn!("meta search from {:?} exceeded {} candidates", start, self.config.max_candidates);
                return None;
            }

            if candidate.complete {
                match self.validate_path(&candidate.path, validator) {
                    Ok(()) => {
                        debug!("meta search from {:?}: {} hops", start, candidate.path.len());
                        return Some(candidate.path);
                    }
                    Err((from, edge)) => {
                        debug!("hop {:?} from {:?} is not walkable, pruning", edge, from);
                        queue.retain(|c| !c.uses(from, &edge));
                        continue;
                    }
                }
            }

            let world = self.world;
            let map = match world.map(candidate.key.bank, candidate.key.map) {
                Some(map) => map,
                None => continue,
            };

            match checker(map, candidate.key) {
                Goal::NotYet => {}
                Goal::Reached => {
                    let mut done = candidate.clone();
                    done.complete = true;
                    queue.push_back(done);
                }
                Goal::Approach(edge) => {
                    let to = match edge {
                        Edge::Position { x, y } => Key::new(x, y, map.bank, map.id),
                        Edge::Person { person } => Key::new(person.x as i32, person.y as i32, map.bank, map.id),
                        _ => candidate.key,
                    };
                    let mut done = candidate.clone();
                    done.path.push(Step {
                        from: candidate.key,
                        edge,
                        to,
                    });
                    done.complete = true;
                    queue.push_back(done);
                }
            }

            for (edge, dest) in self.edges(map, candidate.key) {
                if candidate.visited.contains(&dest) {
                    continue;
                }
                let mut next = candidate.clone();
                next.visited.insert(dest);
                next.path.push(Step {
                    from: candidate.key,
                    edge,
                    to: dest,
                });
                next.key = dest;
                queue.push_back(next);
            }
        }
        debug!("meta search from {:?}: no route", start);
        None
    }

    /// Route to an exact position
    pub fn search(&mut self, start: Key, target: Key, validator: &mut dyn LocalValidator) -> Option<Vec<Step>> {
        self.search_with(
            start,
            |map, key| {
                if !key.on_map(target.bank, target.map) {
                    Goal::NotYet
                } else if map.tile(target.x, target.y).is_none() {
                    debug!("target {:?} lies outside its map", target);
                    Goal::NotYet
                } else if key == target {
                    Goal::Reached
                } else {
                    Goal::Approach(Edge::Position {
                        x: target.x,
                        y: target.y,
                    })
                }
            },
            validator,
        )
    }

    /// Route to any cell of a map
    pub fn search_map(&mut self, start: Key, bank: u8, map: u8, validator: &mut dyn LocalValidator) -> Option<Vec<Step>> {
        self.search_with(
            start,
            |_, key| {
                if key.on_map(bank, map) {
                    Goal::Reached
                } else {
                    Goal::NotYet
                }
            },
            validator,
        )
    }

    /// Route to the nearest person for which `is_healer` holds
    pub fn search_healer<H>(&mut self, start: Key, mut is_healer: H, validator: &mut dyn LocalValidator) -> Option<Vec<Step>>
    where
        H: FnMut(&Map, usize) -> bool,
    {
        self.search_with(
            start,
            |map, _| {
                (0..map.persons.len())
                    .find(|&i| is_healer(map, i))
                    .map(|i| Goal::Approach(Edge::Person { person: map.persons[i] }))
                    .unwrap_or(Goal::NotYet)
            },
            validator,
        )
    }
}

/// Caches one local pathfinder per map and turns meta hops into paths
pub struct Navigator<'w> {
    world: &'w World,
    config: PathfinderConfig,
    pathfinders: HashMap<(u8, u8), Pathfinder>,
    occupancy: HashMap<(u8, u8), ActorOccupancy>,
    overworld: Option<Overworld>,
    /// Bumped on every actor update
    generation: u64,
}

impl<'w> Navigator<'w> {
    pub fn new(world: &'w World, config: PathfinderConfig) -> Self {
        Navigator {
            world,
            config,
            pathfinders: HashMap::new(),
            occupancy: HashMap::new(),
            overworld: None,
            generation: 0,
        }
    }

    /// Actors blocking cells of map (bank, map) for later searches
    pub fn set_occupancy(&mut self, bank: u8, map: u8, occupancy: ActorOccupancy) {
        self.occupancy.insert((bank, map), occupancy);
        self.generation += 1;
    }

    /// Live snapshot used for rendered NPC positions
    pub fn set_overworld(&mut self, overworld: Overworld) {
        self.overworld = Some(overworld);
        self.generation += 1;
    }

    /// Pathfinder for a map, built on first use
    pub fn pathfinder(&mut self, bank: u8, map: u8) -> Option<&mut Pathfinder> {
        if !self.pathfinders.contains_key(&(bank, map)) {
            let built = self.world.map(bank, map)?.pathfinder(&self.config);
            self.pathfinders.insert((bank, map), built);
        }
        self.pathfinders.get_mut(&(bank, map))
    }

    /// Concrete cells for one hop, excluding the starting cell
    pub fn path_for(&mut self, from: Key, edge: &Edge) -> Option<Vec<Cell>> {
        let actor = match edge {
            Edge::Person { person } => Some(
                self.overworld
                    .as_ref()
                    .and_then(|ow| ow.position_of(from.bank, from.map, person.local_id))
                    .unwrap_or((person.x as i32, person.y as i32)),
            ),
            _ => None,
        };
        let occupancy = self.occupancy.get(&(from.bank, from.map)).cloned();
        let blocked: &dyn Occupancy = match &occupancy {
            Some(occ) => occ,
            None => &NoOccupancy,
        };
        let pathfinder = self.pathfinder(from.bank, from.map)?;
        let start = from.cell();
        match edge {
            Edge::Connection { exit, .. } => pathfinder.search_to_connection(start, &[*exit], blocked),
            Edge::Warp { warp, .. } => pathfinder.search_to_warp(start, warp, blocked),
            Edge::Person { .. } => pathfinder.search_to_actor(start, actor.unwrap_or(start), blocked),
            Edge::Position { x, y } => pathfinder.search_to(start, (*x, *y), 0, blocked),
        }
    }
}

impl<'w> LocalValidator for Navigator<'w> {
    fn validate(&mut self, from: Key, edge: &Edge) -> bool {
        self.path_for(from, edge).is_some()
    }

    fn generation(&self) -> u64 {
        self.generation
    }
}
