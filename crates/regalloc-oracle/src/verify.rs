//! Structural checks on the register allocator's output.
//!
//! Every check works on one already-parsed function and never looks at operand
//! values, only at operand kinds and, for registers, whether they are the frame
//! base or stack pointer. Three checks are provided:
//!
//! * no spills: no instruction touches a frame-relative memory operand;
//! * bounded spills: the number of `mov`s touching the stack, and the number of
//!   distinct stack slots they touch, stay within a budget;
//! * coalescing: no spills at all, and few enough register-to-register `mov`s.

use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;

use crate::asm::{AsmItem, AssemblyFunction, Instruction, Opcode, Operand};
use crate::error::FailureKind;

/// A structural property to check, with its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    NoSpill,
    Spill {
        /// Upper bound on `mov` instructions that access the stack.
        max_spilled_instructions: usize,
        /// Upper bound on distinct stack slots those instructions access.
        max_spilled_pseudos: usize,
    },
    Coalesce {
        /// Upper bound on `mov`s between general registers.
        max_moves: usize,
    },
}

/// Does this item access a value on the stack?
pub fn uses_stack(item: &AsmItem) -> bool {
    match item {
        AsmItem::Label(_) => false,
        AsmItem::Instruction(i) => i.operands.iter().any(Operand::is_stack_slot),
    }
}

/// A `mov` whose source and destination are both registers other than the
/// frame base and stack pointer. `mov %eax, %eax` counts too.
pub fn is_mov_between_regs(item: &AsmItem) -> bool {
    let AsmItem::Instruction(i) = item else {
        return false;
    };
    if i.opcode != Opcode::Mov {
        return false;
    }
    match i.operands.as_slice() {
        [Operand::Reg(src), Operand::Reg(dst)] => {
            !src.is_frame_register() && !dst.is_frame_register()
        }
        _ => false,
    }
}

/// Spill traffic in one function.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpillMetrics {
    /// `mov` instructions that access the stack.
    pub instructions: Vec<Instruction>,
    /// Distinct memory operands those instructions reference, rendered as text.
    pub slots: BTreeSet<String>,
}

impl SpillMetrics {
    pub fn measure(func: &AssemblyFunction) -> Self {
        let instructions: Vec<Instruction> = func
            .items
            .iter()
            .filter(|item| uses_stack(item))
            .filter_map(AsmItem::as_instruction)
            .filter(|i| i.opcode == Opcode::Mov)
            .cloned()
            .collect();
        let slots = instructions
            .iter()
            .flat_map(|i| &i.operands)
            .filter(|op| op.is_memory())
            .map(ToString::to_string)
            .collect();
        Self {
            instructions,
            slots,
        }
    }

    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

/// Instructions that touch a stack slot, in order.
pub fn stack_accesses(func: &AssemblyFunction) -> Vec<Instruction> {
    func.items
        .iter()
        .filter(|item| uses_stack(item))
        .filter_map(AsmItem::as_instruction)
        .cloned()
        .collect()
}

/// Register-to-register moves the allocator failed to coalesce, in order.
pub fn register_moves(func: &AssemblyFunction) -> Vec<Instruction> {
    func.items
        .iter()
        .filter(|item| is_mov_between_regs(item))
        .filter_map(AsmItem::as_instruction)
        .cloned()
        .collect()
}

/// One broken guarantee, with the instructions responsible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    StackAccess {
        offending: Vec<Instruction>,
    },
    SpilledInstructions {
        max: usize,
        found: usize,
        offending: Vec<Instruction>,
    },
    SpilledPseudos {
        max: usize,
        found: usize,
        offending: Vec<Instruction>,
    },
    RegisterMoves {
        max: usize,
        found: usize,
        offending: Vec<Instruction>,
    },
}

impl Violation {
    pub fn offending(&self) -> &[Instruction] {
        match self {
            Violation::StackAccess { offending }
            | Violation::SpilledInstructions { offending, .. }
            | Violation::SpilledPseudos { offending, .. }
            | Violation::RegisterMoves { offending, .. } => offending,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Violation::StackAccess { .. } => FailureKind::NoSpill,
            Violation::SpilledInstructions { .. } | Violation::SpilledPseudos { .. } => {
                FailureKind::SpillBudget
            }
            Violation::RegisterMoves { .. } => FailureKind::CoalesceBudget,
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::StackAccess { .. } => {
                f.write_str("Found instructions that use operands on the stack")
            }
            Violation::SpilledInstructions { max, found, .. } => write!(
                f,
                "Should only need {max} instructions involving spilled pseudo but found {found}"
            ),
            Violation::SpilledPseudos { max, found, .. } => write!(
                f,
                "At most {max} pseudoregs should have been spilled, looks like {found} were"
            ),
            Violation::RegisterMoves { max, found, .. } => write!(
                f,
                "Expected at most {max} move instructions but found {found}"
            ),
        }
    }
}

/// Failed structural check: every violation, plus the whole function so the
/// offending instructions can be read in context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuralFailure {
    pub function: AssemblyFunction,
    pub violations: Vec<Violation>,
}

impl StructuralFailure {
    pub fn kind(&self) -> FailureKind {
        self.violations
            .first()
            .map_or(FailureKind::NoSpill, Violation::kind)
    }
}

impl fmt::Display for StructuralFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for v in &self.violations {
            writeln!(f, "{v}")?;
            writeln!(f, "Bad instructions:")?;
            for i in v.offending() {
                writeln!(f, "    {i}")?;
            }
        }
        write!(f, "Complete assembly function:\n{}", self.function)
    }
}

impl std::error::Error for StructuralFailure {}

fn finish(func: &AssemblyFunction, violations: Vec<Violation>) -> Result<(), StructuralFailure> {
    if violations.is_empty() {
        Ok(())
    } else {
        Err(StructuralFailure {
            function: func.clone(),
            violations,
        })
    }
}

fn no_spill_violation(func: &AssemblyFunction) -> Option<Violation> {
    let offending = stack_accesses(func);
    (!offending.is_empty()).then_some(Violation::StackAccess { offending })
}

/// Every value lives in a register: nothing touches the stack.
pub fn check_no_spills(func: &AssemblyFunction) -> Result<(), StructuralFailure> {
    finish(func, no_spill_violation(func).into_iter().collect())
}

/// Spilling is allowed, within both budgets. Both bounds are checked and both
/// are reported when both are exceeded.
pub fn check_spills(
    func: &AssemblyFunction,
    max_spilled_instructions: usize,
    max_spilled_pseudos: usize,
) -> Result<(), StructuralFailure> {
    let metrics = SpillMetrics::measure(func);
    debug!(
        function = %func.name,
        instructions = metrics.instruction_count(),
        slots = metrics.slot_count(),
        "spill metrics"
    );

    let mut violations = Vec::new();
    if metrics.instruction_count() > max_spilled_instructions {
        violations.push(Violation::SpilledInstructions {
            max: max_spilled_instructions,
            found: metrics.instruction_count(),
            offending: metrics.instructions.clone(),
        });
    }
    if metrics.slot_count() > max_spilled_pseudos {
        violations.push(Violation::SpilledPseudos {
            max: max_spilled_pseudos,
            found: metrics.slot_count(),
            offending: metrics.instructions,
        });
    }
    finish(func, violations)
}

/// No spills, and at most `max_moves` register-to-register moves. A function
/// that spills fails on the stack access alone; moves are not counted.
pub fn check_coalescing(func: &AssemblyFunction, max_moves: usize) -> Result<(), StructuralFailure> {
    if let Some(v) = no_spill_violation(func) {
        return finish(func, vec![v]);
    }
    let moves = register_moves(func);
    debug!(function = %func.name, moves = moves.len(), "register moves");
    if moves.len() > max_moves {
        return finish(
            func,
            vec![Violation::RegisterMoves {
                max: max_moves,
                found: moves.len(),
                offending: moves,
            }],
        );
    }
    Ok(())
}

pub fn verify(check: Check, func: &AssemblyFunction) -> Result<(), StructuralFailure> {
    match check {
        Check::NoSpill => check_no_spills(func),
        Check::Spill {
            max_spilled_instructions,
            max_spilled_pseudos,
        } => check_spills(func, max_spilled_instructions, max_spilled_pseudos),
        Check::Coalesce { max_moves } => check_coalescing(func, max_moves),
    }
}
