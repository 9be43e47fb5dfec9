//! Cached, pre-explored scripts attached to map entities.

use crate::disassembler::Disassembler;
use crate::error::ScriptError;
use crate::instruction::Instruction;
use crate::interpreter::Interpreter;
use crate::vm::{Access, Context, VAR_LAST_TALKED};
use crate::world::World;
use indexmap::IndexSet;
use log::{debug, warn};
use std::collections::{BTreeSet, HashMap};

/// `special` id of the party heal routine
pub const HEAL_SPECIAL: u16 = 0x0000;

/// Which table of a map a script hangs off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptKind {
    Person,
    Sign,
    /// Coordinate-triggered script
    GenericScript,
    MapScript,
    /// Standard script shared by every map; bank and map are ignored
    StdFunction,
}

/// One script, explored once on creation
#[derive(Debug, Clone)]
pub struct ScriptEntity {
    pub address: u32,
    pub kind: ScriptKind,
    pub index: usize,
    pub bank: u8,
    pub map: u8,
    /// Every closed context of the exploration
    pub explored: Vec<Context>,
    pub input_flags: IndexSet<u16>,
    pub output_flags: IndexSet<u16>,
    addresses: BTreeSet<u32>,
}

impl ScriptEntity {
    fn initial_context(address: u32, kind: ScriptKind, index: usize, bank: u8, map: u8, local_id: Option<u8>) -> Context {
        let mut ctx = Context::blank(address);
        if kind != ScriptKind::StdFunction {
            ctx = ctx.with_location(bank, map);
        }
        if let Some(id) = local_id {
            ctx.set_var(VAR_LAST_TALKED, id as u16);
        }
        debug!("exploring {:?} script #{} of ({}, {}) at {:#010x}", kind, index, bank, map, address);
        ctx
    }

    /// Explore the script at `address` and collect its flag accesses
    pub fn explore(
        interp: &Interpreter,
        address: u32,
        kind: ScriptKind,
        index: usize,
        bank: u8,
        map: u8,
        local_id: Option<u8>,
    ) -> Result<Self, ScriptError> {
        let explored = interp.explore(Self::initial_context(address, kind, index, bank, map, local_id))?;

        let mut input_flags = IndexSet::new();
        let mut output_flags = IndexSet::new();
        let mut addresses = BTreeSet::new();
        for ctx in &explored {
            for access in &ctx.inputs {
                if let Access::Flag(id) = access {
                    input_flags.insert(*id);
                }
            }
            for access in &ctx.outputs {
                if let Access::Flag(id) = access {
                    output_flags.insert(*id);
                }
            }
            addresses.extend(ctx.trace.iter().copied());
        }

        Ok(ScriptEntity {
            address,
            kind,
            index,
            bank,
            map,
            explored,
            input_flags,
            output_flags,
            addresses,
        })
    }

    /// Replay against real state; a fresh context is used when none is given
    pub fn execute(&self, interp: &Interpreter, ctx: Option<Context>) -> Result<Vec<Context>, ScriptError> {
        let mut ctx = ctx.unwrap_or_else(|| Context::blank(self.address));
        ctx.pc = self.address;
        if ctx.location.is_none() && self.kind != ScriptKind::StdFunction {
            ctx.location = Some((self.bank, self.map));
        }
        interp.execute(ctx)
    }

    /// Flood disassembly listing
    pub fn print(&self, interp: &Interpreter) -> String {
        Disassembler::new(interp.memory())
            .with_move_names(interp.game().move_names())
            .print(self.address)
    }

    /// Whether some explored path executes `pc`
    pub fn contains(&self, pc: u32) -> bool {
        self.addresses.contains(&pc)
    }

    /// Explored instruction that ends right before `next_address`
    pub fn instruction_before(&self, interp: &Interpreter, next_address: u32) -> Option<Instruction> {
        self.addresses
            .range(..next_address)
            .rev()
            .filter_map(|&addr| Instruction::decode(interp.memory(), addr).ok())
            .find(|instr| instr.next_address == next_address)
    }

    /// Answers leading to the first explored outcome that produces `access`
    pub fn choices_for(&self, access: Access) -> Option<&[u8]> {
        self.explored
            .iter()
            .find(|ctx| ctx.outputs.contains(&access))
            .map(|ctx| ctx.choices.as_slice())
    }

    /// Whether some explored outcome produces `access`
    pub fn produces(&self, access: Access) -> bool {
        self.explored.iter().any(|ctx| ctx.outputs.contains(&access))
    }
}

type CacheKey = (ScriptKind, usize, u8, u8);

/// Memoized script entities; each script is explored at most once
#[derive(Debug, Default)]
pub struct ScriptCache {
    entities: HashMap<CacheKey, ScriptEntity>,
}

impl ScriptCache {
    pub fn new() -> Self {
        ScriptCache::default()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entity for script `index` of `kind` on (bank, map), explored on
    /// first request
    pub fn get(
        &mut self,
        world: &World,
        interp: &Interpreter,
        kind: ScriptKind,
        index: usize,
        bank: u8,
        map: u8,
    ) -> Result<&ScriptEntity, ScriptError> {
        let key = match kind {
            ScriptKind::StdFunction => (kind, index, 0, 0),
            _ => (kind, index, bank, map),
        };
        if !self.entities.contains_key(&key) {
            let missing = ScriptError::NoSuchScript { kind, bank, map, index };
            let (address, local_id) = Self::locate(world, interp, kind, index, bank, map).ok_or(missing)?;
            let entity = ScriptEntity::explore(interp, address, kind, index, bank, map, local_id)?;
            self.entities.insert(key, entity);
        }
        self.entities.get(&key).ok_or(ScriptError::NoSuchScript { kind, bank, map, index })
    }

    fn locate(world: &World, interp: &Interpreter, kind: ScriptKind, index: usize, bank: u8, map: u8) -> Option<(u32, Option<u8>)> {
        if kind == ScriptKind::StdFunction {
            let index = u8::try_from(index).ok()?;
            return interp.game().std_script(index).map(|addr| (addr, None));
        }
        let m = world.map(bank, map)?;
        let found = match kind {
            ScriptKind::Person => m.persons.get(index).map(|p| (p.script, Some(p.local_id))),
            ScriptKind::Sign => m.signs.get(index).map(|s| (s.script, None)),
            ScriptKind::GenericScript => m.coord_events.get(index).map(|c| (c.script, None)),
            ScriptKind::MapScript => m.map_scripts.get(index).map(|s| (s.script, None)),
            ScriptKind::StdFunction => None,
        };
        match found {
            Some((0, _)) => {
                warn!("{:?} #{} of ({}, {}) has no script", kind, index, bank, map);
                None
            }
            other => other,
        }
    }

    /// Whether talking to person `index` of (bank, map) can heal the party
    pub fn is_healer(&mut self, world: &World, interp: &Interpreter, bank: u8, map: u8, index: usize) -> bool {
        match self.get(world, interp, ScriptKind::Person, index, bank, map) {
            Ok(entity) => entity.produces(Access::Special(HEAL_SPECIAL)),
            Err(err) => {
                debug!("person #{} of ({}, {}) skipped: {}", index, bank, map, err);
                false
            }
        }
    }

    /// Cached entity whose explored paths execute `pc`
    pub fn find_containing(&self, pc: u32) -> Option<&ScriptEntity> {
        self.entities.values().find(|e| e.contains(pc))
    }

    pub fn entities(&self) -> impl Iterator<Item = &ScriptEntity> {
        self.entities.values()
    }

    pub fn clear(&mut self) {
        self.entities.clear();
    }
}
