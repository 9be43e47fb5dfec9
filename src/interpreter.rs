use crate::config::ExploreConfig;
use crate::error::ScriptError;
use crate::game::GameData;
use crate::instruction::Instruction;
use crate::memory::MemoryAccess;
use crate::opcode_tables::{self, Op};
use crate::vm::{
    is_temp, is_var, Access, Context, ExitReason, CHOICE_BACK_OUT, TEMP_OFFSET, TRAINER_FLAG_BASE,
    VAR_RESULT,
};
use log::{debug, trace, warn};
use rand::Rng;
use std::collections::VecDeque;

/// How branching opcodes are treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Conditionals follow the live state; only dialogue forks
    Execute,
    /// Every undetermined conditional and every prompt forks
    Explore,
}

/// Script interpreter over one memory image and game-data view
pub struct Interpreter<'a> {
    memory: &'a dyn MemoryAccess,
    game: &'a dyn GameData,
    config: ExploreConfig,
}

impl<'a> Interpreter<'a> {
    pub fn new(memory: &'a dyn MemoryAccess, game: &'a dyn GameData, config: ExploreConfig) -> Self {
        Interpreter { memory, game, config }
    }

    pub fn memory(&self) -> &'a dyn MemoryAccess {
        self.memory
    }

    pub fn game(&self) -> &'a dyn GameData {
        self.game
    }

    /// Advance `ctx` by one instruction. Dialogue prompts without a
    /// pending answer take the first option inline; the other answers are
    /// returned as new contexts.
    pub fn step(&self, ctx: &mut Context) -> Result<Vec<Context>, ScriptError> {
        let mut forks = Vec::new();
        if !ctx.is_done() {
            self.interpret(ctx, Mode::Execute, &mut forks)?;
        }
        Ok(forks)
    }

    /// Real-state run; returns every closed context
    pub fn execute(&self, ctx: Context) -> Result<Vec<Context>, ScriptError> {
        self.run(ctx, Mode::Execute)
    }

    /// Symbolic run enumerating all reachable outcomes
    pub fn explore(&self, ctx: Context) -> Result<Vec<Context>, ScriptError> {
        self.run(ctx, Mode::Explore)
    }

    fn run(&self, ctx: Context, mode: Mode) -> Result<Vec<Context>, ScriptError> {
        let start = ctx.pc;
        let mut open = VecDeque::new();
        open.push_back(ctx);
        let mut closed = Vec::new();
        let mut steps = 0;

        while let Some(mut ctx) = open.pop_front() {
            while !ctx.is_done() {
                if steps >= self.config.max_steps {
                    warn!("script at {:#010x}: budget of {} steps exhausted", start, steps);
                    return Err(ScriptError::BudgetExhausted { steps });
                }
                steps += 1;
                let mut forks = Vec::new();
                self.interpret(&mut ctx, mode, &mut forks)?;
                for fork in forks {
                    if open.len() >= self.config.max_contexts {
                        warn!(
                            "script at {:#010x}: more than {} open contexts",
                            start, self.config.max_contexts
                        );
                        return Err(ScriptError::ContextCapExceeded {
                            contexts: self.config.max_contexts,
                        });
                    }
                    open.push_back(fork);
                }
            }
            closed.push(ctx);
        }

        debug!(
            "script at {:#010x}: {:?} produced {} contexts in {} steps",
            start,
            mode,
            closed.len(),
            steps
        );
        Ok(closed)
    }

    /// Decode and apply the instruction at `ctx.pc`
    fn interpret(&self, ctx: &mut Context, mode: Mode, forks: &mut Vec<Context>) -> Result<(), ScriptError> {
        let instr = Instruction::decode(self.memory, ctx.pc)?;
        trace!("{:#010x}: {}", instr.address, instr);
        ctx.trace.push(instr.address);
        let next = instr.next_address;
        let op = |i: usize| instr.operand(i);

        match instr.op {
            Op::End => ctx.close(ExitReason::End),
            Op::Return => match ctx.stack.pop() {
                Some(addr) => ctx.pc = addr,
                None => ctx.close(ExitReason::StackUnderflow),
            },
            Op::Call => {
                if self.guard(ctx, &instr, mode) {
                    ctx.stack.push(next);
                    ctx.pc = op(0);
                }
            }
            Op::Goto => {
                if self.guard(ctx, &instr, mode) {
                    ctx.pc = op(0);
                }
            }
            Op::If1 | Op::If2 => {
                let call = instr.op == Op::If2;
                self.conditional(ctx, &instr, mode, op(0) as u8, Some(op(1)), call, forks);
            }
            Op::GotoStd | Op::CallStd => {
                let call = instr.op == Op::CallStd;
                match self.game.std_script(op(0) as u8) {
                    Some(target) => {
                        if self.guard(ctx, &instr, mode) {
                            if call {
                                ctx.stack.push(next);
                            }
                            ctx.pc = target;
                        }
                    }
                    None => {
                        debug!("standard script {:#x} unknown, skipped", op(0));
                        ctx.pc = next;
                    }
                }
            }
            Op::GotoStdIf | Op::CallStdIf => {
                let call = instr.op == Op::CallStdIf;
                let target = self.game.std_script(op(1) as u8);
                if target.is_none() {
                    debug!("standard script {:#x} unknown, condition ignored", op(1));
                }
                self.conditional(ctx, &instr, mode, op(0) as u8, target, call, forks);
            }
            Op::JumpRam | Op::KillScript | Op::ExecuteRam => ctx.close(ExitReason::Killed),

            Op::LoadPointer | Op::SetByte2 => {
                ctx.set_bank(op(0) as u8, op(1));
                ctx.pc = next;
            }
            Op::LoadByteFromPointer => {
                let byte = self.memory.read_u8(op(1))?;
                ctx.set_bank(op(0) as u8, byte as u32);
                ctx.pc = next;
            }
            Op::SetFarByte => {
                ctx.bank(op(0) as u8);
                ctx.pc = next;
            }
            Op::CopyScriptBanks => {
                let value = ctx.bank(op(1) as u8);
                ctx.set_bank(op(0) as u8, value);
                ctx.pc = next;
            }

            Op::SetVar => {
                ctx.set_var(op(0) as u16, op(1) as u16);
                ctx.pc = next;
            }
            Op::AddVar => {
                let value = ctx.var(op(0) as u16).wrapping_add(op(1) as u16);
                ctx.set_var(op(0) as u16, value);
                ctx.pc = next;
            }
            Op::SubVar => {
                let rhs = ctx.resolve(op(1)) as u16;
                let value = ctx.var(op(0) as u16).wrapping_sub(rhs);
                ctx.set_var(op(0) as u16, value);
                ctx.pc = next;
            }
            Op::CopyVar => {
                let value = ctx.var(op(1) as u16);
                self.copy_var(ctx, op(0) as u16, op(1) as u16, value);
                ctx.pc = next;
            }
            Op::CopyVarIfNotZero => {
                let value = ctx.resolve(op(1)) as u16;
                self.copy_var(ctx, op(0) as u16, op(1) as u16, value);
                ctx.pc = next;
            }

            Op::CompareBanks => {
                let (a, b) = (op(0) as u8, op(1) as u8);
                ctx.cmp1 = ctx.bank(a);
                ctx.cmp2 = ctx.bank(b);
                ctx.cmp_known = ctx.is_determined(Access::Bank(a)) && ctx.is_determined(Access::Bank(b));
                ctx.pc = next;
            }
            Op::CompareBankToByte => {
                let a = op(0) as u8;
                ctx.cmp1 = ctx.bank(a) & 0xFF;
                ctx.cmp2 = op(1);
                ctx.cmp_known = ctx.is_determined(Access::Bank(a));
                ctx.pc = next;
            }
            Op::CompareBankToFarByte => {
                ctx.cmp1 = ctx.bank(op(0) as u8) & 0xFF;
                ctx.cmp2 = self.memory.read_u8(op(1))? as u32;
                ctx.cmp_known = false;
                ctx.pc = next;
            }
            Op::CompareFarByteToBank => {
                ctx.cmp1 = self.memory.read_u8(op(0))? as u32;
                ctx.cmp2 = ctx.bank(op(1) as u8) & 0xFF;
                ctx.cmp_known = false;
                ctx.pc = next;
            }
            Op::CompareFarByteToByte => {
                ctx.cmp1 = self.memory.read_u8(op(0))? as u32;
                ctx.cmp2 = op(1);
                ctx.cmp_known = false;
                ctx.pc = next;
            }
            Op::CompareFarBytes => {
                ctx.cmp1 = self.memory.read_u8(op(0))? as u32;
                ctx.cmp2 = self.memory.read_u8(op(1))? as u32;
                ctx.cmp_known = false;
                ctx.pc = next;
            }
            Op::Compare => {
                let var = op(0) as u16;
                ctx.cmp1 = ctx.var(var) as u32;
                ctx.cmp2 = op(1);
                ctx.cmp_known = ctx.is_determined(Access::Var(var));
                ctx.pc = next;
            }
            Op::CompareVars => {
                let (a, b) = (op(0) as u16, op(1) as u16);
                ctx.cmp1 = ctx.var(a) as u32;
                ctx.cmp2 = ctx.var(b) as u32;
                ctx.cmp_known = ctx.is_determined(Access::Var(a)) && ctx.is_determined(Access::Var(b));
                ctx.pc = next;
            }
            Op::CompareHiddenVar => {
                ctx.cmp1 = 0;
                ctx.cmp2 = op(1);
                ctx.cmp_known = false;
                ctx.pc = next;
            }

            Op::Special => {
                ctx.outputs.insert(Access::Special(op(0) as u16));
                ctx.pc = next;
            }
            Op::Special2 => {
                ctx.outputs.insert(Access::Special(op(1) as u16));
                ctx.set_var_opaque(op(0) as u16, 0);
                ctx.pc = next;
            }

            Op::SetFlag | Op::ClearFlag | Op::SetWorldMapFlag => {
                let flag = ctx.resolve(op(0)) as u16;
                ctx.set_flag(flag, instr.op != Op::ClearFlag);
                ctx.pc = next;
            }
            Op::CheckFlag => {
                let flag = ctx.resolve(op(0)) as u16;
                self.check_flag(ctx, flag);
                ctx.pc = next;
            }
            Op::CheckTrainerFlag => {
                let flag = TRAINER_FLAG_BASE.wrapping_add(ctx.resolve(op(0)) as u16);
                self.check_flag(ctx, flag);
                ctx.pc = next;
            }
            Op::SetTrainerFlag | Op::ClearTrainerFlag => {
                let flag = TRAINER_FLAG_BASE.wrapping_add(ctx.resolve(op(0)) as u16);
                ctx.set_flag(flag, instr.op == Op::SetTrainerFlag);
                ctx.pc = next;
            }
            Op::ResetVars => {
                for id in TEMP_OFFSET..TEMP_OFFSET + 3 {
                    ctx.set_var(id, 0);
                }
                ctx.pc = next;
            }

            Op::Warp
            | Op::WarpMuted
            | Op::WarpWalk
            | Op::WarpHole
            | Op::WarpTeleport
            | Op::Warp3
            | Op::Warp4
            | Op::Warp5 => {
                ctx.outputs.insert(Access::Warp(op(0) as u8, op(1) as u8));
                ctx.pc = next;
            }
            Op::GetPlayerPos => {
                let (x, y) = self.game.player_position().unwrap_or((0, 0));
                ctx.set_var_opaque(op(0) as u16, x);
                ctx.set_var_opaque(op(1) as u16, y);
                ctx.pc = next;
            }

            Op::CountPokemon => {
                ctx.set_var(VAR_RESULT, self.game.party_size() as u16);
                ctx.pc = next;
            }
            Op::AddItem | Op::RemoveItem => {
                let item = ctx.resolve(op(0)) as u16;
                ctx.resolve(op(1));
                ctx.outputs.insert(Access::Item(item));
                ctx.set_var(VAR_RESULT, 1);
                ctx.pc = next;
            }
            Op::CheckItem => {
                let item = ctx.resolve(op(0)) as u16;
                let quantity = ctx.resolve(op(1)) as u16;
                ctx.inputs.insert(Access::Item(item));
                let owned = self.game.item_count(item) >= quantity.max(1);
                ctx.set_var(VAR_RESULT, owned as u16);
                ctx.pc = next;
            }
            Op::CheckItemRoom | Op::CheckItemType | Op::AddPcItem => {
                ctx.resolve(op(0));
                ctx.set_var(VAR_RESULT, 1);
                ctx.pc = next;
            }
            Op::AddDecoration | Op::RemoveDecoration | Op::TestDecoration => {
                ctx.resolve(op(0));
                ctx.set_var(VAR_RESULT, 1);
                ctx.pc = next;
            }
            Op::CheckPcItem | Op::CheckDecoration => {
                ctx.resolve(op(0));
                ctx.set_var(VAR_RESULT, 0);
                ctx.pc = next;
            }
            Op::GivePokemon => {
                let species = ctx.resolve(op(0)) as u16;
                ctx.outputs.insert(Access::Pokemon(species));
                // 0: joined the party, 1: sent to a box
                let boxed = self.game.party_size() >= 6;
                ctx.set_var(VAR_RESULT, boxed as u16);
                ctx.pc = next;
            }
            Op::CheckAttack => {
                let slot = self.game.party_move_slot(op(0) as u16).unwrap_or(6);
                ctx.set_var(VAR_RESULT, slot as u16);
                ctx.pc = next;
            }
            Op::CheckGender => {
                ctx.set_var(VAR_RESULT, self.game.player_gender() as u16);
                ctx.pc = next;
            }
            Op::CheckObedience => {
                ctx.resolve(op(0));
                ctx.set_var(VAR_RESULT, 0);
                ctx.pc = next;
            }
            Op::Random => {
                let max = ctx.resolve(op(0)) as u16;
                match mode {
                    Mode::Explore => ctx.set_var_opaque(VAR_RESULT, 0),
                    Mode::Execute => {
                        let value = if max == 0 {
                            0
                        } else {
                            rand::thread_rng().gen_range(0..max)
                        };
                        ctx.set_var(VAR_RESULT, value);
                    }
                }
                ctx.pc = next;
            }
            Op::GiveMoney | Op::PayMoney => {
                ctx.outputs.insert(Access::Money);
                ctx.pc = next;
            }
            Op::CheckMoney => {
                ctx.inputs.insert(Access::Money);
                let enough = self.game.money() >= op(0);
                ctx.set_var(VAR_RESULT, enough as u16);
                ctx.pc = next;
            }

            Op::HideSprite => {
                let local_id = ctx.resolve(op(0)) as u8;
                if let Some((bank, map)) = ctx.location {
                    self.hide_person(ctx, bank, map, local_id);
                }
                ctx.pc = next;
            }
            Op::HideSpritePos => {
                let local_id = ctx.resolve(op(0)) as u8;
                self.hide_person(ctx, op(1) as u8, op(2) as u8, local_id);
                ctx.pc = next;
            }

            Op::YesNoBox => {
                // yes is choice 0 and leaves 1 in the result variable
                self.prompt(ctx, &instr, mode, &[(0, 1), (1, 0)], forks);
            }
            Op::Multichoice | Op::Multichoice2 | Op::Multichoice3 => {
                let list = op(2) as u8;
                let ignore_b = instr.operands.last().copied().unwrap_or(0);
                let count = match self.game.multichoice_len(list) {
                    Some(n) => n,
                    None => {
                        debug!("multichoice list {:#x} unknown, assuming two options", list);
                        2
                    }
                };
                let mut options: Vec<(u8, u16)> = (0..count.min(CHOICE_BACK_OUT as usize))
                    .map(|i| (i as u8, i as u16))
                    .collect();
                if ignore_b == 0 {
                    options.push((CHOICE_BACK_OUT, CHOICE_BACK_OUT as u16));
                }
                self.prompt(ctx, &instr, mode, &options, forks);
            }
            Op::TrainerBattle => self.trainer_battle(ctx, &instr, mode, forks),

            _ => ctx.pc = next,
        }
        Ok(())
    }

    /// Loop guard for control flow; closes `ctx` on a revisit
    fn guard(&self, ctx: &mut Context, instr: &Instruction, mode: Mode) -> bool {
        if mode == Mode::Execute {
            return true;
        }
        self.visit_once(ctx, instr)
    }

    fn visit_once(&self, ctx: &mut Context, instr: &Instruction) -> bool {
        if ctx.visit(instr.address) {
            true
        } else {
            trace!("revisit of {:#010x}, closing branch", instr.address);
            ctx.close(ExitReason::Revisit);
            false
        }
    }

    fn copy_var(&self, ctx: &mut Context, dst: u16, src: u16, value: u16) {
        let literal = !is_var(src) && !is_temp(src);
        if literal || ctx.is_determined(Access::Var(src)) {
            ctx.set_var(dst, value);
        } else {
            ctx.set_var_opaque(dst, value);
        }
    }

    fn check_flag(&self, ctx: &mut Context, flag: u16) {
        ctx.cmp1 = ctx.flag(flag) as u32;
        ctx.cmp2 = 1;
        ctx.cmp_known = ctx.is_determined(Access::Flag(flag));
    }

    fn hide_person(&self, ctx: &mut Context, bank: u8, map: u8, local_id: u8) {
        match self.game.person_flag(bank, map, local_id) {
            Some(flag) if flag != 0 => ctx.set_flag(flag, true),
            _ => debug!("person {} on ({}, {}) has no visibility flag", local_id, bank, map),
        }
    }

    /// Shared handling of if1/if2/gotostdif/callstdif
    #[allow(clippy::too_many_arguments)]
    fn conditional(
        &self,
        ctx: &mut Context,
        instr: &Instruction,
        mode: Mode,
        operator: u8,
        target: Option<u32>,
        call: bool,
        forks: &mut Vec<Context>,
    ) {
        let next = instr.next_address;
        let outcome = opcode_tables::compare(operator, ctx.cmp1, ctx.cmp2);
        let (target, outcome) = match (target, outcome) {
            (Some(target), Some(outcome)) => (target, outcome),
            (_, None) => {
                warn!("{:#010x}: no comparison operator {}", instr.address, operator);
                ctx.pc = next;
                return;
            }
            (None, _) => {
                ctx.pc = next;
                return;
            }
        };

        let take = |ctx: &mut Context| {
            if call {
                ctx.stack.push(next);
            }
            ctx.pc = target;
        };

        if mode == Mode::Execute {
            if outcome {
                take(ctx);
            } else {
                ctx.pc = next;
            }
            return;
        }

        if !self.visit_once(ctx, instr) {
            return;
        }
        if ctx.cmp_known {
            if outcome {
                take(ctx);
            } else {
                ctx.pc = next;
            }
            return;
        }
        let mut skipped = ctx.fork();
        skipped.pc = next;
        forks.push(skipped);
        take(ctx);
    }

    /// Dialogue fork: one branch per (choice, result) pair
    fn prompt(&self, ctx: &mut Context, instr: &Instruction, mode: Mode, options: &[(u8, u16)], forks: &mut Vec<Context>) {
        let next = instr.next_address;
        if !self.guard(ctx, instr, mode) {
            return;
        }

        let answer = |ctx: &mut Context, choice: u8, result: u16| {
            ctx.choices.push(choice);
            ctx.set_var(VAR_RESULT, result);
            ctx.pc = next;
        };

        if let Some(choice) = ctx.pending.pop_front() {
            let result = options
                .iter()
                .find(|(c, _)| *c == choice)
                .map(|(_, r)| *r)
                .unwrap_or(choice as u16);
            answer(ctx, choice, result);
            return;
        }

        let Some((&(first, first_result), rest)) = options.split_first() else {
            ctx.pc = next;
            return;
        };
        for &(choice, result) in rest {
            let mut branch = ctx.fork();
            answer(&mut branch, choice, result);
            forks.push(branch);
        }
        answer(ctx, first, first_result);
    }

    fn trainer_battle(&self, ctx: &mut Context, instr: &Instruction, mode: Mode, forks: &mut Vec<Context>) {
        let next = instr.next_address;
        let kind = match instr.battle_kind() {
            Some(kind) => kind,
            None => {
                ctx.pc = next;
                return;
            }
        };
        let flag = TRAINER_FLAG_BASE.wrapping_add(instr.operand(1) as u16);
        let beaten = ctx.flag(flag);
        let continue_at = kind.continue_operand().map(|i| instr.operand(i));
        let not_enough_at = kind.not_enough_operand().map(|i| instr.operand(i));

        let won = move |ctx: &mut Context| {
            ctx.set_flag(flag, true);
            match continue_at {
                Some(addr) => ctx.pc = addr,
                None => ctx.close(ExitReason::End),
            }
        };

        if mode == Mode::Execute || ctx.is_determined(Access::Flag(flag)) {
            if beaten {
                ctx.pc = next;
            } else if let (Some(addr), true) = (not_enough_at, self.game.party_size() < 2) {
                ctx.pc = addr;
            } else {
                won(ctx);
            }
            return;
        }

        if !self.visit_once(ctx, instr) {
            return;
        }
        if let Some(addr) = not_enough_at {
            let mut short = ctx.fork();
            short.pc = addr;
            forks.push(short);
        }
        let mut fought = ctx.fork();
        won(&mut fought);
        forks.push(fought);
        ctx.pc = next;
    }
}
