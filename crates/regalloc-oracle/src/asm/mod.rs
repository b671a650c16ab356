//! In-memory model of compiled x86-64 functions, and the reader that builds it
//! from AT&T assembly text.

mod instruction;
mod opcode;
pub mod parse;
mod register;

pub use instruction::{AsmItem, AssemblyFunction, AssemblyProgram, Instruction, Operand};
pub use opcode::Opcode;
pub use parse::{AsmReader, AttReader};
pub use register::Register;

/// Symbol and label conventions of the target object format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    MacOs,
}

impl Platform {
    pub const fn host() -> Self {
        if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// Labels that are local to a function rather than starting a new one.
    pub fn is_local_label(self, label: &str) -> bool {
        match self {
            Self::Linux => label.starts_with(".L"),
            Self::MacOs => label.starts_with('L'),
        }
    }

    /// Source-level name of a global symbol.
    pub fn function_name(self, symbol: &str) -> &str {
        match self {
            Self::Linux => symbol,
            Self::MacOs => symbol.strip_prefix('_').unwrap_or(symbol),
        }
    }

    /// File stem of the hand-written entry stub that defines `main` and
    /// checks callee-saved registers around the call into the program.
    pub const fn wrapper_stem(self) -> &'static str {
        match self {
            Self::Linux => "wrapper_linux",
            Self::MacOs => "wrapper_osx",
        }
    }
}
