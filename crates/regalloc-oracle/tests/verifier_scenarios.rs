//! Structural checks on hand-built functions.

use regalloc_oracle::asm::Register::{Ax, Bp, Bx, Cx, Di, Si, Sp};
use regalloc_oracle::asm::{AsmReader, AttReader, Platform};
use regalloc_oracle::test_harness::*;
use regalloc_oracle::verify::{
    SpillMetrics, Violation, check_coalescing, check_no_spills, check_spills, is_mov_between_regs,
};
use regalloc_oracle::{Check, FailureKind, verify};

#[test]
fn single_register_move_fails_zero_move_budget() {
    let func = function("target", vec![mov(reg(Ax), reg(Bx))]);
    let failure = check_coalescing(&func, 0).expect_err("one move over budget");

    assert_eq!(failure.kind(), FailureKind::CoalesceBudget);
    assert_eq!(failure.violations.len(), 1);
    let offending = failure.violations[0].offending();
    assert_eq!(offending.len(), 1);
    assert_eq!(offending[0].to_string(), "movq %rax, %rbx");
}

#[test]
fn frame_load_fails_no_spill() {
    let func = function(
        "target",
        vec![
            mov(stack(8), reg(Ax)),
            instr("addq", vec![reg(Ax), reg(Bx)]),
        ],
    );
    let failure = check_no_spills(&func).expect_err("stack access");

    assert_eq!(failure.kind(), FailureKind::NoSpill);
    let offending = failure.violations[0].offending();
    assert_eq!(offending.len(), 1);
    assert_eq!(offending[0].to_string(), "movq 8(%rbp), %rax");
}

fn three_spill_movs() -> Vec<regalloc_oracle::asm::AsmItem> {
    vec![
        mov(reg(Ax), stack(-8)),
        instr("addl", vec![imm(1), reg(Cx)]),
        mov(stack(-8), reg(Bx)),
        mov(reg(Cx), stack(-16)),
        instr("ret", vec![]),
    ]
}

#[test]
fn spills_within_both_budgets_pass() {
    let func = function("target", three_spill_movs());
    let metrics = SpillMetrics::measure(&func);
    assert_eq!(metrics.instruction_count(), 3);
    assert_eq!(metrics.slot_count(), 2);
    assert!(check_spills(&func, 3, 2).is_ok());
}

#[test]
fn slot_budget_fails_independently() {
    let func = function("target", three_spill_movs());
    let failure = check_spills(&func, 3, 1).expect_err("two slots, budget one");

    assert_eq!(failure.violations.len(), 1);
    assert!(matches!(
        failure.violations[0],
        Violation::SpilledPseudos { max: 1, found: 2, .. }
    ));
    assert_eq!(failure.kind(), FailureKind::SpillBudget);
}

#[test]
fn both_spill_budgets_are_reported() {
    let func = function("target", three_spill_movs());
    let failure = check_spills(&func, 2, 1).expect_err("both exceeded");
    assert!(matches!(
        failure.violations.as_slice(),
        [
            Violation::SpilledInstructions { max: 2, found: 3, .. },
            Violation::SpilledPseudos { max: 1, found: 2, .. },
        ]
    ));

    let text = failure.to_string();
    assert!(text.contains("Should only need 2 instructions involving spilled pseudo but found 3"));
    assert!(text.contains("At most 1 pseudoregs should have been spilled, looks like 2 were"));
    assert!(text.contains("Complete assembly function:"));
}

#[test]
fn non_mov_stack_accesses_are_not_spill_traffic() {
    let func = function(
        "target",
        vec![
            instr("addl", vec![imm(1), stack(-4)]),
            instr("cmpl", vec![stack(-4), reg(Ax)]),
            instr("pushq", vec![reg(Bp)]),
        ],
    );
    let metrics = SpillMetrics::measure(&func);
    assert_eq!(metrics.instruction_count(), 0);
    assert!(check_spills(&func, 0, 0).is_ok());
    assert!(check_no_spills(&func).is_err());
}

#[test]
fn coalescing_requires_no_spills_first() {
    let func = function(
        "target",
        vec![mov(reg(Di), reg(Ax)), mov(reg(Ax), stack(-8))],
    );
    let failure = check_coalescing(&func, 10).expect_err("spills");
    assert_eq!(failure.kind(), FailureKind::NoSpill);
    assert!(matches!(
        failure.violations.as_slice(),
        [Violation::StackAccess { .. }]
    ));
}

#[test]
fn frame_register_moves_are_not_counted() {
    let func = function(
        "target",
        vec![
            instr("pushq", vec![reg(Bp)]),
            mov(reg(Sp), reg(Bp)),
            mov(reg(Bp), reg(Sp)),
            mov(reg(Ax), reg(Ax)),
            instr("popq", vec![reg(Bp)]),
        ],
    );
    assert!(!is_mov_between_regs(&func.items[1]));
    assert!(is_mov_between_regs(&func.items[3]));
    assert!(check_coalescing(&func, 1).is_ok());
    assert!(check_coalescing(&func, 0).is_err());
}

#[test]
fn stack_pointer_memory_is_not_a_spill() {
    let func = function(
        "target",
        vec![mov(reg(Si), mem(8, Sp)), mov(mem(0, Ax), reg(Cx))],
    );
    assert!(check_no_spills(&func).is_ok());
}

#[test]
fn verify_dispatches_on_check() {
    let func = function("target", three_spill_movs());
    assert!(verify(Check::NoSpill, &func).is_err());
    assert!(
        verify(
            Check::Spill {
                max_spilled_instructions: 3,
                max_spilled_pseudos: 2
            },
            &func
        )
        .is_ok()
    );
    assert!(verify(Check::Coalesce { max_moves: 100 }, &func).is_err());
}

#[test]
fn frame_relative_array_access_is_a_spill() {
    let text = "target:\n    movl -16(%rbp,%rax,4), %ecx\n    ret\n";
    let mut program = AttReader {
        platform: Platform::Linux,
    }
    .read(text)
    .expect("parse");
    let func = program.take_function("target").expect("target");

    let failure = check_no_spills(&func).expect_err("indexed frame access");
    assert_eq!(failure.kind(), FailureKind::NoSpill);
    assert_eq!(
        failure.violations[0].offending()[0].to_string(),
        "movl -16(%rbp,%rax,4), %ecx"
    );
    assert_eq!(SpillMetrics::measure(&func).slot_count(), 1);
    assert!(check_coalescing(&func, 10).is_err());
}
