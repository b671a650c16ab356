use std::collections::BTreeMap;
use std::fmt;

use super::{Opcode, Register};

/// One operand of an AT&T instruction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Reg(Register),
    Imm(i64),
    /// `disp(%base)`
    Memory { disp: i64, base: Register },
    /// `disp(%base,%index,scale)`, base may be omitted.
    Indexed {
        disp: i64,
        base: Option<Register>,
        index: Register,
        scale: u8,
    },
    /// rip-relative `symbol+disp(%rip)`
    Data { symbol: String, disp: i64 },
    /// Jump or call target.
    Target(String),
}

impl Operand {
    /// A memory operand addressed off the frame base, i.e. a stack slot.
    /// Indexed forms such as `-16(%rbp,%rax,4)` count too.
    pub fn is_stack_slot(&self) -> bool {
        match self {
            Operand::Memory { base, .. } => *base == Register::Bp,
            Operand::Indexed { base, .. } => *base == Some(Register::Bp),
            _ => false,
        }
    }

    /// Register-addressed memory, with or without an index. Rip-relative data
    /// is not included.
    pub fn is_memory(&self) -> bool {
        matches!(self, Operand::Memory { .. } | Operand::Indexed { .. })
    }

    pub fn as_register(&self) -> Option<Register> {
        match self {
            Operand::Reg(r) => Some(*r),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Reg(r) => write!(f, "{r}"),
            Operand::Imm(v) => write!(f, "${v}"),
            Operand::Memory { disp: 0, base } => write!(f, "({base})"),
            Operand::Memory { disp, base } => write!(f, "{disp}({base})"),
            Operand::Indexed {
                disp,
                base,
                index,
                scale,
            } => {
                if *disp != 0 {
                    write!(f, "{disp}")?;
                }
                match base {
                    Some(base) => write!(f, "({base},{index},{scale})"),
                    None => write!(f, "(,{index},{scale})"),
                }
            }
            Operand::Data { symbol, disp: 0 } => write!(f, "{symbol}(%rip)"),
            Operand::Data { symbol, disp } => write!(f, "{symbol}{disp:+}(%rip)"),
            Operand::Target(name) => f.write_str(name),
        }
    }
}

/// A machine instruction: normalized opcode, the mnemonic as written, and the
/// operands in AT&T order (sources first, destination last).
///
/// Operands lose their register width when parsed; `written` keeps the text
/// the compiler emitted and `Display` prefers it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub mnemonic: String,
    pub operands: Vec<Operand>,
    pub written: Option<String>,
}

impl Instruction {
    pub fn new(mnemonic: impl Into<String>, operands: Vec<Operand>) -> Self {
        let mnemonic = mnemonic.into();
        Self {
            opcode: Opcode::from_mnemonic(&mnemonic),
            mnemonic,
            operands,
            written: None,
        }
    }

    /// Keep `text` as the display form of this instruction.
    #[must_use]
    pub fn with_written(mut self, text: impl Into<String>) -> Self {
        self.written = Some(text.into());
        self
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(text) = &self.written {
            return f.write_str(text);
        }
        f.write_str(&self.mnemonic)?;
        for (i, op) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{op}")?;
        }
        Ok(())
    }
}

/// An entry in a function body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsmItem {
    Label(String),
    Instruction(Instruction),
}

impl AsmItem {
    pub fn as_instruction(&self) -> Option<&Instruction> {
        match self {
            AsmItem::Instruction(i) => Some(i),
            AsmItem::Label(_) => None,
        }
    }
}

impl fmt::Display for AsmItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmItem::Label(name) => write!(f, "{name}:"),
            AsmItem::Instruction(i) => write!(f, "    {i}"),
        }
    }
}

/// The body of one function, in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyFunction {
    pub name: String,
    pub items: Vec<AsmItem>,
}

impl AssemblyFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Vec::new(),
        }
    }

    pub fn with_items(name: impl Into<String>, items: Vec<AsmItem>) -> Self {
        Self {
            name: name.into(),
            items,
        }
    }

    /// Instructions only, skipping labels.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.items.iter().filter_map(AsmItem::as_instruction)
    }
}

impl fmt::Display for AssemblyFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.name)?;
        for item in &self.items {
            writeln!(f, "{item}")?;
        }
        Ok(())
    }
}

/// Every function defined in one assembly file, keyed by symbol name.
#[derive(Debug, Clone, Default)]
pub struct AssemblyProgram {
    functions: BTreeMap<String, AssemblyFunction>,
}

impl AssemblyProgram {
    pub fn insert(&mut self, function: AssemblyFunction) {
        self.functions.insert(function.name.clone(), function);
    }

    pub fn function(&self, name: &str) -> Option<&AssemblyFunction> {
        self.functions.get(name)
    }

    pub fn take_function(&mut self, name: &str) -> Option<AssemblyFunction> {
        self.functions.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_operands_render_canonically() {
        let slot = Operand::Memory {
            disp: -8,
            base: Register::Bp,
        };
        assert_eq!(slot.to_string(), "-8(%rbp)");
        assert!(slot.is_stack_slot());

        let indexed = Operand::Indexed {
            disp: 0,
            base: None,
            index: Register::Cx,
            scale: 8,
        };
        assert_eq!(indexed.to_string(), "(,%rcx,8)");
        assert!(!indexed.is_stack_slot());
        assert!(indexed.is_memory());

        let frame_array = Operand::Indexed {
            disp: -16,
            base: Some(Register::Bp),
            index: Register::Ax,
            scale: 4,
        };
        assert_eq!(frame_array.to_string(), "-16(%rbp,%rax,4)");
        assert!(frame_array.is_stack_slot());

        let data = Operand::Data {
            symbol: "x".into(),
            disp: 4,
        };
        assert_eq!(data.to_string(), "x+4(%rip)");
        assert!(!data.is_memory());
    }

    #[test]
    fn written_text_wins_over_rendering() {
        let ops = vec![
            Operand::Reg(Register::Si),
            Operand::Memory {
                disp: -8,
                base: Register::Bp,
            },
        ];
        let plain = Instruction::new("movq", ops.clone());
        assert_eq!(plain.to_string(), "movq %rsi, -8(%rbp)");
        let written = Instruction::new("movl", ops).with_written("movl %esi, -8(%rbp)");
        assert_eq!(written.to_string(), "movl %esi, -8(%rbp)");
    }

    #[test]
    fn sp_relative_memory_is_not_a_stack_slot() {
        let op = Operand::Memory {
            disp: 16,
            base: Register::Sp,
        };
        assert!(!op.is_stack_slot());
        assert!(op.is_memory());
    }

    #[test]
    fn function_display_lists_labels_and_instructions() {
        let f = AssemblyFunction::with_items(
            "target",
            vec![
                AsmItem::Instruction(Instruction::new(
                    "movq",
                    vec![Operand::Imm(1), Operand::Reg(Register::Ax)],
                )),
                AsmItem::Label(".Lend".into()),
                AsmItem::Instruction(Instruction::new("ret", vec![])),
            ],
        );
        assert_eq!(
            f.to_string(),
            "target:\n    movq $1, %rax\n.Lend:\n    ret\n"
        );
        assert_eq!(f.instructions().count(), 2);
    }
}
