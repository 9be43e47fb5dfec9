use crate::config::Layout;
use crate::error::MemoryError;
use crate::memory::MemoryAccess;
use bitvec::prelude::*;
use indexmap::IndexSet;
use log::{debug, trace};
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// Number of global flags tracked
pub const FLAG_COUNT: usize = 0x900;

/// Persistent variables, addressed from `VAR_OFFSET`
pub const VAR_COUNT: usize = 0x100;
pub const VAR_OFFSET: u16 = 0x4000;

/// Script-local temporaries, addressed from `TEMP_OFFSET`
pub const TEMP_COUNT: usize = 0x1F;
pub const TEMP_OFFSET: u16 = 0x8000;

pub const BANK_COUNT: usize = 4;

/// Trainer "beaten" flags start here
pub const TRAINER_FLAG_BASE: u16 = 0x500;

/// Special temporaries
pub const VAR_FACING: u16 = 0x800C;
pub const VAR_RESULT: u16 = 0x800D;
pub const VAR_ITEM_ID: u16 = 0x800E;
pub const VAR_LAST_TALKED: u16 = 0x800F;

/// Choice index meaning "backed out with B"
pub const CHOICE_BACK_OUT: u8 = 0x7F;

pub fn is_flag(id: u16) -> bool {
    (id as usize) < FLAG_COUNT
}

pub fn is_var(id: u16) -> bool {
    id >= VAR_OFFSET && ((id - VAR_OFFSET) as usize) < VAR_COUNT
}

pub fn is_temp(id: u16) -> bool {
    id >= TEMP_OFFSET && ((id - TEMP_OFFSET) as usize) < TEMP_COUNT
}

pub fn is_bank(id: u8) -> bool {
    (id as usize) < BANK_COUNT
}

/// One piece of state a script reads or writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Access {
    Flag(u16),
    Var(u16),
    Bank(u8),
    /// Native routine invoked through `special`
    Special(u16),
    Item(u16),
    Money,
    /// Species handed to the player
    Pokemon(u16),
    /// Destination (bank, map) of a warp opcode
    Warp(u8, u8),
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Access::Flag(id) => write!(f, "flag {:#x}", id),
            Access::Var(id) => write!(f, "var {:#x}", id),
            Access::Bank(id) => write!(f, "bank {}", id),
            Access::Special(id) => write!(f, "special {:#x}", id),
            Access::Item(id) => write!(f, "item {:#x}", id),
            Access::Money => write!(f, "money"),
            Access::Pokemon(id) => write!(f, "pokemon {:#x}", id),
            Access::Warp(bank, map) => write!(f, "warp ({}, {})", bank, map),
        }
    }
}

/// Why a context stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitReason {
    /// Reached `end`
    End,
    /// `return` with an empty call stack
    StackUnderflow,
    /// `killscript`, `jumpram` and friends
    Killed,
    /// Loop guard: this (stack, pc) was already explored here
    Revisit,
}

/// Mutable script state. Cloning yields a fully independent copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    pub pc: u32,
    flags: BitVec<u8, Lsb0>,
    vars: [u16; VAR_COUNT],
    temps: [u16; TEMP_COUNT],
    banks: [u32; BANK_COUNT],
    pub cmp1: u32,
    pub cmp2: u32,
    /// Whether both compared values were produced by this script
    pub cmp_known: bool,
    pub stack: Vec<u32>,
    pub inputs: IndexSet<Access>,
    pub outputs: IndexSet<Access>,
    /// Values this context has itself determined
    determined: HashSet<Access>,
    /// Dialogue answers taken, in order
    pub choices: Vec<u8>,
    /// Answers to give at upcoming dialogue prompts
    pub pending: VecDeque<u8>,
    /// Map the script runs on, for `hidesprite`
    pub location: Option<(u8, u8)>,
    visited: HashSet<(Vec<u32>, u32)>,
    /// Address of every instruction interpreted
    pub trace: Vec<u32>,
    pub exit: Option<ExitReason>,
}

impl Context {
    /// Zeroed state starting at `pc`
    pub fn blank(pc: u32) -> Self {
        Context {
            pc,
            flags: bitvec![u8, Lsb0; 0; FLAG_COUNT],
            vars: [0; VAR_COUNT],
            temps: [0; TEMP_COUNT],
            banks: [0; BANK_COUNT],
            cmp1: 0,
            cmp2: 0,
            cmp_known: false,
            stack: Vec::new(),
            inputs: IndexSet::new(),
            outputs: IndexSet::new(),
            determined: HashSet::new(),
            choices: Vec::new(),
            pending: VecDeque::new(),
            location: None,
            visited: HashSet::new(),
            trace: Vec::new(),
            exit: None,
        }
    }

    /// Snapshot flags and variables from the save block
    pub fn from_memory<M: MemoryAccess + ?Sized>(
        memory: &M,
        layout: &Layout,
        pc: u32,
    ) -> Result<Self, MemoryError> {
        let mut ctx = Context::blank(pc);
        let save = memory.read_u32(layout.save_block1_ptr)?;
        if save == 0 {
            debug!("save block not loaded, using blank context");
            return Ok(ctx);
        }
        let raw = memory.read_bytes(save.wrapping_add(layout.flags_offset), FLAG_COUNT / 8)?;
        ctx.flags = BitVec::from_slice(raw);
        let vars = save.wrapping_add(layout.vars_offset);
        for (i, var) in ctx.vars.iter_mut().enumerate() {
            *var = memory.read_u16(vars.wrapping_add(2 * i as u32))?;
        }
        Ok(ctx)
    }

    pub fn with_location(mut self, bank: u8, map: u8) -> Self {
        self.location = Some((bank, map));
        self
    }

    pub fn with_pending(mut self, answers: &[u8]) -> Self {
        self.pending.extend(answers);
        self
    }

    /// Independent copy for a new branch
    pub fn fork(&self) -> Self {
        self.clone()
    }

    pub fn is_done(&self) -> bool {
        self.exit.is_some()
    }

    pub fn close(&mut self, reason: ExitReason) {
        trace!("context closed at {:#010x}: {:?}", self.pc, reason);
        self.exit = Some(reason);
    }

    pub fn flag(&mut self, id: u16) -> bool {
        self.inputs.insert(Access::Flag(id));
        self.peek_flag(id)
    }

    /// Read a flag without recording the access
    pub fn peek_flag(&self, id: u16) -> bool {
        self.flags.get(id as usize).map(|b| *b).unwrap_or(false)
    }

    pub fn set_flag(&mut self, id: u16, value: bool) {
        if !is_flag(id) {
            debug!("flag {:#x} does not exist", id);
            return;
        }
        self.flags.set(id as usize, value);
        self.outputs.insert(Access::Flag(id));
        self.determined.insert(Access::Flag(id));
    }

    pub fn var(&mut self, id: u16) -> u16 {
        self.inputs.insert(Access::Var(id));
        self.peek_var(id)
    }

    pub fn peek_var(&self, id: u16) -> u16 {
        if is_var(id) {
            self.vars[(id - VAR_OFFSET) as usize]
        } else if is_temp(id) {
            self.temps[(id - TEMP_OFFSET) as usize]
        } else {
            debug!("variable {:#x} does not exist", id);
            0
        }
    }

    pub fn set_var(&mut self, id: u16, value: u16) {
        if self.store_var(id, value) {
            self.determined.insert(Access::Var(id));
        }
    }

    /// Write a placeholder the script could not compute
    pub fn set_var_opaque(&mut self, id: u16, value: u16) {
        if self.store_var(id, value) {
            self.determined.remove(&Access::Var(id));
        }
    }

    fn store_var(&mut self, id: u16, value: u16) -> bool {
        if is_var(id) {
            self.vars[(id - VAR_OFFSET) as usize] = value;
        } else if is_temp(id) {
            self.temps[(id - TEMP_OFFSET) as usize] = value;
        } else {
            debug!("variable {:#x} does not exist", id);
            return false;
        }
        self.outputs.insert(Access::Var(id));
        true
    }

    pub fn bank(&mut self, id: u8) -> u32 {
        self.inputs.insert(Access::Bank(id));
        self.banks.get(id as usize).copied().unwrap_or(0)
    }

    pub fn set_bank(&mut self, id: u8, value: u32) {
        if !is_bank(id) {
            debug!("bank {} does not exist", id);
            return;
        }
        self.banks[id as usize] = value;
        self.outputs.insert(Access::Bank(id));
        self.determined.insert(Access::Bank(id));
    }

    /// Whether this context itself produced the current value
    pub fn is_determined(&self, access: Access) -> bool {
        self.determined.contains(&access)
    }

    /// Operand that may name a variable: dereference it if so
    pub fn resolve(&mut self, value: u32) -> u32 {
        let id = value as u16;
        if is_var(id) || is_temp(id) {
            self.var(id) as u32
        } else {
            value
        }
    }

    /// Mark (stack, pc) visited; false if it already was
    pub fn visit(&mut self, pc: u32) -> bool {
        self.visited.insert((self.stack.clone(), pc))
    }
}
