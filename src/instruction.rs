use crate::error::DecodeError;
use crate::game::MoveNames;
use crate::memory::{MemoryAccess, Reader};
use crate::opcode_tables::{self, Arg, BattleKind, Command, Op};
use log::warn;
use std::fmt::{self, Display, Formatter, Write};

/// A decoded script instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Address of the opcode byte
    pub address: u32,
    /// The raw opcode value
    pub opcode: u8,
    pub op: Op,
    /// Operand formats, in encoding order
    pub args: &'static [Arg],
    /// Operand values, zero-extended
    pub operands: Vec<u32>,
    /// Total size of instruction in bytes
    pub size: u32,
    pub next_address: u32,
}

impl Instruction {
    /// Decode an instruction from memory at the given address
    pub fn decode<M: MemoryAccess + ?Sized>(memory: &M, address: u32) -> Result<Self, DecodeError> {
        let opcode = memory.read_u8(address)?;
        let command = match opcode_tables::command(opcode) {
            Some(command) => command,
            None => {
                warn!("unknown opcode {:#04x} at {:#010x}", opcode, address);
                return Err(DecodeError::UnknownOpcode { opcode, address });
            }
        };

        // trainerbattle payload depends on the battle kind byte
        let args = if command.op == Op::TrainerBattle {
            BattleKind::from_byte(memory.read_u8(address.wrapping_add(1))?).args()
        } else {
            command.args
        };

        let mut reader = Reader::new(memory, address.wrapping_add(1));
        let mut operands = Vec::with_capacity(args.len());
        for arg in args {
            let value = match arg.size() {
                1 => reader.u8()? as u32,
                2 => reader.u16()? as u32,
                _ => reader.u32()?,
            };
            operands.push(value);
        }

        let next_address = reader.position();
        Ok(Instruction {
            address,
            opcode,
            op: command.op,
            args,
            operands,
            size: next_address.wrapping_sub(address),
            next_address,
        })
    }

    /// Static descriptor for this opcode
    pub fn command(&self) -> &'static Command {
        // decode only produces registered opcodes
        opcode_tables::command(self.opcode).unwrap_or_else(|| unreachable!())
    }

    pub fn name(&self) -> &'static str {
        self.command().name()
    }

    /// Operand `index`, or 0 when absent
    pub fn operand(&self, index: usize) -> u32 {
        self.operands.get(index).copied().unwrap_or(0)
    }

    /// Control-flow target for goto/call/if1/if2
    pub fn jump_target(&self) -> Option<u32> {
        match self.op {
            Op::Call | Op::Goto | Op::If1 | Op::If2 => self.operands.last().copied(),
            _ => None,
        }
    }

    /// Battle variant, for trainerbattle only
    pub fn battle_kind(&self) -> Option<BattleKind> {
        if self.op == Op::TrainerBattle {
            Some(BattleKind::from_byte(self.operand(0) as u8))
        } else {
            None
        }
    }

    /// Listing text with string operands and move names resolved
    pub fn render<M: MemoryAccess + ?Sized>(&self, memory: &M, moves: Option<&dyn MoveNames>) -> String {
        let unrolled = |address: u32| {
            memory
                .read_string(address, crate::text::TERMINATOR, None)
                .map(|s| s.replace('\n', " "))
                .unwrap_or_else(|_| format!("<{:#010x}>", address))
        };
        match self.op {
            Op::LoadPointer => format!("loadpointer {} \"{}\"", self.operand(0), unrolled(self.operand(1))),
            Op::BufferString => format!("bufferstring {} \"{}\"", self.operand(0), unrolled(self.operand(1))),
            Op::PrepareMsg if self.operand(0) != 0 => format!("preparemsg \"{}\"", unrolled(self.operand(0))),
            Op::CheckAttack => match moves.and_then(|m| m.move_name(self.operand(0) as u16)) {
                Some(name) => format!("checkattack \"{}\"", name),
                None => self.to_string(),
            },
            _ => self.to_string(),
        }
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.op {
            Op::If1 | Op::If2 => {
                let cmd = if self.op == Op::If1 { "goto" } else { "call" };
                write!(
                    f,
                    "if {} {} 0x{:08x}",
                    opcode_tables::operator_symbol(self.operand(0) as u8),
                    cmd,
                    self.operand(1)
                )
            }
            Op::TrainerBattle => {
                write!(f, "trainerbattle")?;
                for (arg, value) in self.args.iter().zip(&self.operands) {
                    match arg {
                        Arg::Ptr => write!(f, " 0x{:08x}", value)?,
                        _ => write!(f, " {:#x}", value)?,
                    }
                }
                Ok(())
            }
            _ => f.write_str(&format_template(self.command().format, &self.operands)),
        }
    }
}

/// Expand `%#x`, `%d` and `%0Nx` placeholders in order
pub fn format_template(template: &str, values: &[u32]) -> String {
    let mut out = String::with_capacity(template.len() + 8 * values.len());
    let mut values = values.iter();
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut directive = String::new();
        while let Some(&n) = chars.peek() {
            chars.next();
            if n == 'x' || n == 'd' {
                directive.push(n);
                break;
            }
            directive.push(n);
        }
        let value = match values.next() {
            Some(v) => *v,
            None => {
                out.push('?');
                continue;
            }
        };
        let _ = match directive.as_str() {
            "#x" => write!(out, "{:#x}", value),
            "d" => write!(out, "{}", value),
            "08x" => write!(out, "{:08x}", value),
            "02x" => write!(out, "{:02x}", value),
            _ => write!(out, "{:x}", value),
        };
    }
    out
}
