use crate::error::DecodeError;
use crate::game::MoveNames;
use crate::instruction::Instruction;
use crate::memory::MemoryAccess;
use crate::opcode_tables::Op;
use std::collections::VecDeque;
use std::fmt::Write;

/// A straight run of instructions ending at `end`, `return` or a bad opcode
#[derive(Debug, Clone)]
pub struct Block {
    pub start: u32,
    pub instructions: Vec<Instruction>,
    pub error: Option<DecodeError>,
}

impl Block {
    /// One past the last decoded byte
    pub fn end(&self) -> u32 {
        self.instructions
            .last()
            .map(|i| i.next_address)
            .unwrap_or(self.start)
    }

    pub fn contains(&self, addr: u32) -> bool {
        self.start <= addr && addr < self.end()
    }
}

/// Stateless flood traversal for listings
pub struct Disassembler<'a> {
    memory: &'a dyn MemoryAccess,
    moves: Option<&'a dyn MoveNames>,
}

impl<'a> Disassembler<'a> {
    pub fn new(memory: &'a dyn MemoryAccess) -> Self {
        Disassembler { memory, moves: None }
    }

    pub fn with_move_names(mut self, moves: Option<&'a dyn MoveNames>) -> Self {
        self.moves = moves;
        self
    }

    /// Every block reachable from `start` through goto/call/if targets,
    /// in discovery order
    pub fn blocks(&self, start: u32) -> Vec<Block> {
        let mut blocks: Vec<Block> = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);

        while let Some(addr) = queue.pop_front() {
            if blocks.iter().any(|b| b.contains(addr) || b.start == addr) {
                continue;
            }
            let block = self.block(addr);
            for instr in &block.instructions {
                if let Some(target) = instr.jump_target() {
                    let seen = blocks.iter().any(|b| b.contains(target))
                        || block.contains(target)
                        || queue.contains(&target);
                    if !seen {
                        queue.push_back(target);
                    }
                }
            }
            blocks.push(block);
        }
        blocks
    }

    fn block(&self, start: u32) -> Block {
        let mut instructions = Vec::new();
        let mut addr = start;
        loop {
            match Instruction::decode(self.memory, addr) {
                Ok(instr) => {
                    let stop = matches!(instr.op, Op::End | Op::Return);
                    addr = instr.next_address;
                    instructions.push(instr);
                    if stop {
                        return Block {
                            start,
                            instructions,
                            error: None,
                        };
                    }
                }
                Err(err) => {
                    return Block {
                        start,
                        instructions,
                        error: Some(err),
                    }
                }
            }
        }
    }

    /// Human-readable listing; blocks separated by a blank line
    pub fn print(&self, start: u32) -> String {
        let mut out = String::new();
        for (i, block) in self.blocks(start).iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            for instr in &block.instructions {
                if instr.address == block.start {
                    let _ = write!(out, "0x{:08x}: ", instr.address);
                } else {
                    let _ = write!(out, "        {:02x}: ", instr.address & 0xFF);
                }
                let _ = writeln!(out, "{}", instr.render(self.memory, self.moves));
            }
            if let Some(err) = &block.error {
                let _ = writeln!(out, "Error: {}", err);
            }
        }
        out
    }
}
