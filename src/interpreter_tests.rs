use crate::config::ExploreConfig;
use crate::error::{DecodeError, ScriptError};
use crate::game::{NoGameData, StaticGameData};
use crate::interpreter::Interpreter;
use crate::memory::MemoryImage;
use crate::vm::{Access, Context, ExitReason, CHOICE_BACK_OUT, VAR_RESULT};
use test_log::test;

const BASE: u32 = MemoryImage::ROM;

fn rom(bytes: &[u8]) -> MemoryImage {
    let mut data = bytes.to_vec();
    data.resize(0x100, 0x02);
    MemoryImage::new().with_region(BASE, data)
}

fn ptr(offset: u32) -> [u8; 4] {
    (BASE + offset).to_le_bytes()
}

#[test]
fn test_self_loop_terminates() {
    // if1 == goto self; end
    let mut code = vec![0x06, 0x01];
    code.extend_from_slice(&ptr(0));
    code.push(0x02);
    let mem = rom(&code);
    let game = NoGameData;
    let interp = Interpreter::new(&mem, &game, ExploreConfig::default());

    let closed = interp.explore(Context::blank(BASE)).unwrap();
    assert_eq!(closed.len(), 2);
    assert!(closed.iter().any(|c| c.exit == Some(ExitReason::Revisit)));
    assert!(closed.iter().any(|c| c.exit == Some(ExitReason::End)));
}

#[test]
fn test_yes_no_forks_twice() {
    let mem = rom(&[0x6E, 0x00, 0x00, 0x02]);
    let game = NoGameData;
    let interp = Interpreter::new(&mem, &game, ExploreConfig::default());

    let closed = interp.explore(Context::blank(BASE)).unwrap();
    assert_eq!(closed.len(), 2);
    let yes = closed.iter().find(|c| c.choices == [0]).unwrap();
    let no = closed.iter().find(|c| c.choices == [1]).unwrap();
    assert_eq!(yes.peek_var(VAR_RESULT), 1);
    assert_eq!(no.peek_var(VAR_RESULT), 0);
}

#[test]
fn test_multichoice_back_out() {
    let game = StaticGameData {
        multichoice_lens: vec![2, 3],
        ..StaticGameData::default()
    };

    let mem = rom(&[0x6F, 0x00, 0x00, 0x01, 0x00, 0x02]);
    let interp = Interpreter::new(&mem, &game, ExploreConfig::default());
    let closed = interp.explore(Context::blank(BASE)).unwrap();
    assert_eq!(closed.len(), 4);
    let back = closed.iter().find(|c| c.choices == [CHOICE_BACK_OUT]).unwrap();
    assert_eq!(back.peek_var(VAR_RESULT), CHOICE_BACK_OUT as u16);

    let mem = rom(&[0x6F, 0x00, 0x00, 0x01, 0x01, 0x02]);
    let interp = Interpreter::new(&mem, &game, ExploreConfig::default());
    let closed = interp.explore(Context::blank(BASE)).unwrap();
    assert_eq!(closed.len(), 3);
    assert!(closed.iter().all(|c| c.choices != [CHOICE_BACK_OUT]));
}

#[test]
fn test_determined_comparison_does_not_fork() {
    // setvar 0x4001 5; compare 0x4001 5; if1 == goto 0x11; end
    // 0x11: special 0; end
    let mut code = vec![0x16, 0x01, 0x40, 0x05, 0x00, 0x21, 0x01, 0x40, 0x05, 0x00, 0x06, 0x01];
    code.extend_from_slice(&ptr(0x11));
    code.push(0x02);
    code.extend_from_slice(&[0x25, 0x00, 0x00, 0x02]);
    let mem = rom(&code);
    let game = NoGameData;
    let interp = Interpreter::new(&mem, &game, ExploreConfig::default());

    let closed = interp.explore(Context::blank(BASE)).unwrap();
    assert_eq!(closed.len(), 1);
    assert!(closed[0].outputs.contains(&Access::Special(0)));
}

#[test]
fn test_unknown_flag_forks() {
    // checkflag 0x200; if1 == goto 0x0A; end
    // 0x0A: setflag 0x201; end
    let mut code = vec![0x2B, 0x00, 0x02, 0x06, 0x01];
    code.extend_from_slice(&ptr(0x0A));
    code.push(0x02);
    code.extend_from_slice(&[0x29, 0x01, 0x02, 0x02]);
    let mem = rom(&code);
    let game = NoGameData;
    let interp = Interpreter::new(&mem, &game, ExploreConfig::default());

    let closed = interp.explore(Context::blank(BASE)).unwrap();
    assert_eq!(closed.len(), 2);
    assert!(closed.iter().all(|c| c.inputs.contains(&Access::Flag(0x200))));
    assert_eq!(
        closed
            .iter()
            .filter(|c| c.outputs.contains(&Access::Flag(0x201)))
            .count(),
        1
    );

    // live state picks exactly one branch
    let mut ctx = Context::blank(BASE);
    ctx.set_flag(0x200, false);
    let closed = interp.execute(ctx).unwrap();
    assert_eq!(closed.len(), 1);
    assert!(!closed[0].peek_flag(0x201));
}

#[test]
fn test_return_on_empty_stack_closes_context() {
    let mem = rom(&[0x03]);
    let game = NoGameData;
    let interp = Interpreter::new(&mem, &game, ExploreConfig::default());
    let closed = interp.explore(Context::blank(BASE)).unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].exit, Some(ExitReason::StackUnderflow));
}

#[test]
fn test_unknown_opcode_is_fatal() {
    let mem = rom(&[0x57]);
    let game = NoGameData;
    let interp = Interpreter::new(&mem, &game, ExploreConfig::default());
    let err = interp.explore(Context::blank(BASE)).unwrap_err();
    assert_eq!(
        err,
        ScriptError::Decode(DecodeError::UnknownOpcode {
            opcode: 0x57,
            address: BASE
        })
    );
}

#[test]
fn test_execute_consumes_pending_answer() {
    let mem = rom(&[0x6E, 0x00, 0x00, 0x02]);
    let game = NoGameData;
    let interp = Interpreter::new(&mem, &game, ExploreConfig::default());
    let closed = interp
        .execute(Context::blank(BASE).with_pending(&[1]))
        .unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].choices, vec![1]);
    assert_eq!(closed[0].peek_var(VAR_RESULT), 0);
}

#[test]
fn test_execute_budget() {
    let mut code = vec![0x05];
    code.extend_from_slice(&ptr(0));
    let mem = rom(&code);
    let game = NoGameData;
    let config = ExploreConfig {
        max_steps: 100,
        ..ExploreConfig::default()
    };
    let interp = Interpreter::new(&mem, &game, config);
    assert_eq!(
        interp.execute(Context::blank(BASE)).unwrap_err(),
        ScriptError::BudgetExhausted { steps: 100 }
    );
}

#[test]
fn test_step_single_instruction() {
    let mem = rom(&[0x16, 0x02, 0x80, 0x07, 0x00, 0x02]);
    let game = NoGameData;
    let interp = Interpreter::new(&mem, &game, ExploreConfig::default());
    let mut ctx = Context::blank(BASE);
    let forks = interp.step(&mut ctx).unwrap();
    assert!(forks.is_empty());
    assert_eq!(ctx.pc, BASE + 5);
    assert_eq!(ctx.peek_var(0x8002), 7);
    assert!(!ctx.is_done());
    interp.step(&mut ctx).unwrap();
    assert_eq!(ctx.exit, Some(ExitReason::End));
}

#[test]
fn test_callstd_returns() {
    // callstd 0; end
    // 0x10: setflag 0x10; return
    let mut code = vec![0x09, 0x00, 0x02];
    code.resize(0x10, 0x00);
    code.extend_from_slice(&[0x29, 0x10, 0x00, 0x03]);
    let mem = rom(&code);
    let game = StaticGameData {
        std_scripts: vec![BASE + 0x10],
        ..StaticGameData::default()
    };
    let interp = Interpreter::new(&mem, &game, ExploreConfig::default());
    let closed = interp.execute(Context::blank(BASE)).unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].exit, Some(ExitReason::End));
    assert!(closed[0].peek_flag(0x10));
    assert_eq!(closed[0].trace, vec![BASE, BASE + 0x10, BASE + 0x13, BASE + 2]);
}

#[test]
fn test_trainer_battle_forks_on_outcome() {
    // trainerbattle 0 3 0 intro defeat; end
    let mut code = vec![0x5C, 0x00, 0x03, 0x00, 0x00, 0x00];
    code.extend_from_slice(&ptr(0x20));
    code.extend_from_slice(&ptr(0x20));
    code.push(0x02);
    let mem = rom(&code);
    let game = NoGameData;
    let interp = Interpreter::new(&mem, &game, ExploreConfig::default());

    let closed = interp.explore(Context::blank(BASE)).unwrap();
    assert_eq!(closed.len(), 2);
    let won: Vec<_> = closed
        .iter()
        .filter(|c| c.outputs.contains(&Access::Flag(0x503)))
        .collect();
    assert_eq!(won.len(), 1);
    assert!(won[0].peek_flag(0x503));
}

#[test]
fn test_execute_asks_repeated_question_again() {
    // yesnobox; compare RESULT 0; if1 == goto start; special 0; end
    let mut code = vec![0x6E, 0x00, 0x00, 0x21, 0x0D, 0x80, 0x00, 0x00, 0x06, 0x01];
    code.extend_from_slice(&ptr(0));
    code.extend_from_slice(&[0x25, 0x00, 0x00, 0x02]);
    let mem = rom(&code);
    let game = NoGameData;
    let interp = Interpreter::new(&mem, &game, ExploreConfig::default());

    let closed = interp
        .execute(Context::blank(BASE).with_pending(&[1, 0]))
        .unwrap();
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].choices, vec![1, 0]);
    assert_eq!(closed[0].exit, Some(ExitReason::End));
    assert!(closed[0].outputs.contains(&Access::Special(0)));
}

#[test]
fn test_explore_prompt_in_loop_closes_on_revisit() {
    // yesnobox; compare RESULT 0; if1 == goto start; end
    let mut code = vec![0x6E, 0x00, 0x00, 0x21, 0x0D, 0x80, 0x00, 0x00, 0x06, 0x01];
    code.extend_from_slice(&ptr(0));
    code.push(0x02);
    let mem = rom(&code);
    let game = NoGameData;
    let interp = Interpreter::new(&mem, &game, ExploreConfig::default());

    let closed = interp.explore(Context::blank(BASE)).unwrap();
    assert_eq!(closed.len(), 2);
    let yes = closed.iter().find(|c| c.choices == [0]).unwrap();
    let no = closed.iter().find(|c| c.choices == [1]).unwrap();
    assert_eq!(yes.exit, Some(ExitReason::End));
    assert_eq!(no.exit, Some(ExitReason::Revisit));
}

#[test]
fn test_context_cap_is_an_error() {
    let mem = rom(&[0x6E, 0x00, 0x00, 0x6E, 0x00, 0x00, 0x02]);
    let game = NoGameData;
    let config = ExploreConfig {
        max_contexts: 1,
        ..ExploreConfig::default()
    };
    let interp = Interpreter::new(&mem, &game, config);
    assert_eq!(
        interp.explore(Context::blank(BASE)).unwrap_err(),
        ScriptError::ContextCapExceeded { contexts: 1 }
    );
}

#[test]
fn test_copy_of_literal_is_determined() {
    // copyvarifnotzero 0x8001 5; compare 0x8001 5; if1 == goto 0x11; end
    // 0x11: special 0; end
    let mut code = vec![0x1A, 0x01, 0x80, 0x05, 0x00, 0x21, 0x01, 0x80, 0x05, 0x00, 0x06, 0x01];
    code.extend_from_slice(&ptr(0x11));
    code.push(0x02);
    code.extend_from_slice(&[0x25, 0x00, 0x00, 0x02]);
    let mem = rom(&code);
    let game = NoGameData;
    let interp = Interpreter::new(&mem, &game, ExploreConfig::default());

    let closed = interp.explore(Context::blank(BASE)).unwrap();
    assert_eq!(closed.len(), 1);
    assert!(closed[0].outputs.contains(&Access::Special(0)));
}
