use thiserror::Error;

use crate::script::ScriptKind;

/// Failures of the memory collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("address {address:#010x} is not backed by any region")]
    Unmapped { address: u32 },

    #[error("read of {len} bytes at {address:#010x} runs past the end of its region")]
    OutOfBounds { address: u32, len: usize },
}

/// Failures while decoding one script instruction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unknown opcode {opcode:#04x} at {address:#010x}")]
    UnknownOpcode { opcode: u8, address: u32 },

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

impl DecodeError {
    /// Address of the faulting instruction, when known
    pub fn address(&self) -> u32 {
        match self {
            DecodeError::UnknownOpcode { address, .. } => *address,
            DecodeError::Memory(MemoryError::Unmapped { address })
            | DecodeError::Memory(MemoryError::OutOfBounds { address, .. }) => *address,
        }
    }
}

/// Failures surfaced by explore/execute
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("instruction budget of {steps} steps exhausted")]
    BudgetExhausted { steps: usize },

    #[error("more than {contexts} open contexts")]
    ContextCapExceeded { contexts: usize },

    #[error("no {kind:?} script #{index} on map ({bank}, {map})")]
    NoSuchScript {
        kind: ScriptKind,
        bank: u8,
        map: u8,
        index: usize,
    },

    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Failures while decoding world tables
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error("map bank table at {address:#010x} is malformed")]
    BadMapTable { address: u32 },
}

/// Failures while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),
}
