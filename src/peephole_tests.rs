use crate::bfir::{parse, Op, Program};
use crate::config::Config;
use crate::diagnostics::Position;
use crate::peephole::{add_mod, OptimisationFlags};
use pretty_assertions::assert_eq;

fn ops_with(source: &str, config: &Config) -> Vec<(Op, usize)> {
    parse(source, config)
        .unwrap()
        .instructions()
        .iter()
        .map(|instr| (instr.op, instr.count))
        .collect()
}

fn ops(source: &str) -> Vec<(Op, usize)> {
    ops_with(source, &Config::default())
}

fn program(source: &str) -> Program {
    parse(source, &Config::default()).unwrap()
}

#[test]
fn add_mod_wraps() {
    assert_eq!(add_mod(250, 10, 256), 4);
    assert_eq!(add_mod(255, 1, 256), 0);
    assert_eq!(add_mod(3, 4, 256), 7);
    assert_eq!(add_mod(0, 0, 1), 0);
    assert_eq!(add_mod(29999, 29999, 30000), 29998);
}

#[test]
fn combine_increments() {
    assert_eq!(ops("+++++"), [(Op::Add, 5)]);
    assert_eq!(ops("+-+-+-+"), [(Op::Add, 1)]);
}

#[test]
fn combine_increments_wrap() {
    assert_eq!(ops(&"+".repeat(300)), [(Op::Add, 44)]);
    assert!(ops(&"-".repeat(256)).is_empty());
}

#[test]
fn combine_ptr_increments() {
    assert_eq!(ops(">>>"), [(Op::Move, 3)]);
    assert_eq!(ops(">><"), [(Op::Move, 1)]);
    assert_eq!(ops("<<>"), [(Op::Move, 29999)]);
}

#[test]
fn combine_ptr_increments_wrap() {
    let config = Config::new(4, 256).unwrap();
    assert_eq!(ops_with(">>>>>", &config), [(Op::Move, 1)]);
    assert!(ops_with(">>>>", &config).is_empty());
    assert_eq!(ops_with("<<<<<<", &config), [(Op::Move, 2)]);
}

#[test]
fn zero_sum_run_stays_until_another_op() {
    // A cancelled run soaks up more of the same operation...
    assert_eq!(ops("++-+"), [(Op::Add, 2)]);
    assert_eq!(ops("+-+-+-+"), [(Op::Add, 1)]);
    // ...but once something else arrives it is removed, and what follows
    // does not fuse with the instruction before it.
    assert_eq!(
        ops("+>+-<+"),
        [(Op::Add, 1), (Op::Move, 1), (Op::Move, 29999), (Op::Add, 1)]
    );
    assert_eq!(ops("+><+"), [(Op::Add, 1), (Op::Add, 1)]);
    assert_eq!(ops("[+-]"), [(Op::LoopStart, 1), (Op::LoopEnd, 1)]);
}

#[test]
fn zero_sum_run_at_end_is_removed() {
    assert_eq!(ops(".+-"), [(Op::Write, 1)]);
    assert_eq!(ops(",><"), [(Op::Read, 1)]);
}

#[test]
fn different_ops_do_not_combine() {
    assert_eq!(ops("+>+"), [(Op::Add, 1), (Op::Move, 1), (Op::Add, 1)]);
    assert_eq!(ops(",,"), [(Op::Read, 1), (Op::Read, 1)]);
    assert_eq!(ops(".."), [(Op::Write, 1), (Op::Write, 1)]);
}

#[test]
fn comments_do_not_break_runs() {
    assert_eq!(ops("+ this is\n+ fine +"), [(Op::Add, 3)]);
}

#[test]
fn zero_loop_becomes_reset() {
    assert_eq!(ops("[-]"), [(Op::Reset, 1)]);
    assert_eq!(ops("[+]"), [(Op::Reset, 1)]);
    assert_eq!(ops(">[-]<"), [(Op::Move, 1), (Op::Reset, 1), (Op::Move, 29999)]);
}

#[test]
fn zero_loop_after_body_fusion() {
    // The body fuses down to a single `+` before the `]` is seen.
    assert_eq!(ops("[+-+]"), [(Op::Reset, 1)]);
}

#[test]
fn cancelled_runs_do_not_reach_the_zero_loop_rule() {
    assert_eq!(
        ops("[>+-<-]"),
        [
            (Op::LoopStart, 1),
            (Op::Move, 1),
            (Op::Move, 29999),
            (Op::Add, 255),
            (Op::LoopEnd, 1)
        ]
    );
    assert_eq!(
        ops("[-><]"),
        [(Op::LoopStart, 1), (Op::Add, 255), (Op::LoopEnd, 1)]
    );
}

#[test]
fn zero_loop_trigger_is_narrow() {
    // Any other body is left alone, even if it also always zeroes.
    assert_eq!(
        ops("[--]"),
        [(Op::LoopStart, 1), (Op::Add, 254), (Op::LoopEnd, 1)]
    );
    assert_eq!(
        ops("[-.]"),
        [
            (Op::LoopStart, 1),
            (Op::Add, 255),
            (Op::Write, 1),
            (Op::LoopEnd, 1)
        ]
    );
    assert_eq!(ops("[]"), [(Op::LoopStart, 1), (Op::LoopEnd, 1)]);
}

#[test]
fn nested_zero_loops() {
    assert_eq!(
        ops("[[-]]"),
        [(Op::LoopStart, 1), (Op::Reset, 1), (Op::LoopEnd, 1)]
    );
    assert_eq!(ops("+[-][-]"), [(Op::Add, 1), (Op::Reset, 1), (Op::Reset, 1)]);
}

#[test]
fn reset_does_not_fuse_with_adds() {
    assert_eq!(
        ops("+[-]+"),
        [(Op::Add, 1), (Op::Reset, 1), (Op::Add, 1)]
    );
}

#[test]
fn fused_positions_span_their_source() {
    let program = program("++ +.[-]");
    assert_eq!(
        program.position_of(0),
        Some(Position { start: 0, end: 3 })
    );
    assert_eq!(program.position_of(1), Some(Position::at(4)));
    assert_eq!(
        program.position_of(2),
        Some(Position { start: 5, end: 7 })
    );
}

#[test]
fn run_length_only() {
    let config = Config::default().with_optimisations(OptimisationFlags::RUN_LENGTH);
    assert_eq!(
        ops_with("++[-]", &config),
        [
            (Op::Add, 2),
            (Op::LoopStart, 1),
            (Op::Add, 255),
            (Op::LoopEnd, 1)
        ]
    );
}

#[test]
fn zero_loop_only() {
    let config = Config::default().with_optimisations(OptimisationFlags::ZERO_LOOP);
    assert_eq!(ops_with("++[-]", &config), [(Op::Add, 1), (Op::Add, 1), (Op::Reset, 1)]);
    // Without run-length fusion the body never shrinks to one instruction.
    assert_eq!(
        ops_with("[+-+]", &config),
        [
            (Op::LoopStart, 1),
            (Op::Add, 1),
            (Op::Add, 255),
            (Op::Add, 1),
            (Op::LoopEnd, 1)
        ]
    );
}
