use std::fmt;

/// An x86-64 hardware register, independent of operand width.
///
/// `%eax`, `%ax` and `%al` all name [`Register::Ax`]; the verifier only cares
/// about register identity, never about the width an instruction used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Register {
    Ax,
    Bx,
    Cx,
    Dx,
    Di,
    Si,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
    /// Stack pointer.
    Sp,
    /// Frame base. Memory relative to this register is a stack slot.
    Bp,
    /// Instruction pointer; only appears as the base of rip-relative operands.
    Ip,
    Xmm0,
    Xmm1,
    Xmm2,
    Xmm3,
    Xmm4,
    Xmm5,
    Xmm6,
    Xmm7,
    Xmm8,
    Xmm9,
    Xmm10,
    Xmm11,
    Xmm12,
    Xmm13,
    Xmm14,
    Xmm15,
}

const NUMBERED: [Register; 8] = [
    Register::R8,
    Register::R9,
    Register::R10,
    Register::R11,
    Register::R12,
    Register::R13,
    Register::R14,
    Register::R15,
];

const XMM: [Register; 16] = [
    Register::Xmm0,
    Register::Xmm1,
    Register::Xmm2,
    Register::Xmm3,
    Register::Xmm4,
    Register::Xmm5,
    Register::Xmm6,
    Register::Xmm7,
    Register::Xmm8,
    Register::Xmm9,
    Register::Xmm10,
    Register::Xmm11,
    Register::Xmm12,
    Register::Xmm13,
    Register::Xmm14,
    Register::Xmm15,
];

impl Register {
    /// Look up a register by its AT&T name, without the leading `%`.
    pub fn from_name(name: &str) -> Option<Self> {
        let reg = match name {
            "rax" | "eax" | "ax" | "al" | "ah" => Self::Ax,
            "rbx" | "ebx" | "bx" | "bl" | "bh" => Self::Bx,
            "rcx" | "ecx" | "cx" | "cl" | "ch" => Self::Cx,
            "rdx" | "edx" | "dx" | "dl" | "dh" => Self::Dx,
            "rdi" | "edi" | "di" | "dil" => Self::Di,
            "rsi" | "esi" | "si" | "sil" => Self::Si,
            "rsp" | "esp" | "sp" | "spl" => Self::Sp,
            "rbp" | "ebp" | "bp" | "bpl" => Self::Bp,
            "rip" | "eip" => Self::Ip,
            _ => {
                if let Some(n) = name.strip_prefix("xmm") {
                    return n.parse::<usize>().ok().and_then(|i| XMM.get(i).copied());
                }
                // r8 .. r15 with optional d/w/b width suffix
                let digits = name
                    .strip_prefix('r')?
                    .trim_end_matches(['d', 'w', 'b']);
                let n = digits.parse::<usize>().ok()?;
                return n.checked_sub(8).and_then(|i| NUMBERED.get(i).copied());
            }
        };
        Some(reg)
    }

    /// The 64-bit (or `xmm`) name of this register.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ax => "rax",
            Self::Bx => "rbx",
            Self::Cx => "rcx",
            Self::Dx => "rdx",
            Self::Di => "rdi",
            Self::Si => "rsi",
            Self::R8 => "r8",
            Self::R9 => "r9",
            Self::R10 => "r10",
            Self::R11 => "r11",
            Self::R12 => "r12",
            Self::R13 => "r13",
            Self::R14 => "r14",
            Self::R15 => "r15",
            Self::Sp => "rsp",
            Self::Bp => "rbp",
            Self::Ip => "rip",
            Self::Xmm0 => "xmm0",
            Self::Xmm1 => "xmm1",
            Self::Xmm2 => "xmm2",
            Self::Xmm3 => "xmm3",
            Self::Xmm4 => "xmm4",
            Self::Xmm5 => "xmm5",
            Self::Xmm6 => "xmm6",
            Self::Xmm7 => "xmm7",
            Self::Xmm8 => "xmm8",
            Self::Xmm9 => "xmm9",
            Self::Xmm10 => "xmm10",
            Self::Xmm11 => "xmm11",
            Self::Xmm12 => "xmm12",
            Self::Xmm13 => "xmm13",
            Self::Xmm14 => "xmm14",
            Self::Xmm15 => "xmm15",
        }
    }

    /// Frame base or stack pointer. Moves involving these are frame
    /// management, not allocator output.
    pub const fn is_frame_register(self) -> bool {
        matches!(self, Self::Bp | Self::Sp)
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_aliases_name_the_same_register() {
        for name in ["rax", "eax", "ax", "al"] {
            assert_eq!(Register::from_name(name), Some(Register::Ax), "{name}");
        }
        for name in ["r10", "r10d", "r10w", "r10b"] {
            assert_eq!(Register::from_name(name), Some(Register::R10), "{name}");
        }
        assert_eq!(Register::from_name("ebp"), Some(Register::Bp));
        assert_eq!(Register::from_name("xmm14"), Some(Register::Xmm14));
    }

    #[test]
    fn rejects_unknown_names() {
        assert_eq!(Register::from_name("r16"), None);
        assert_eq!(Register::from_name("r7"), None);
        assert_eq!(Register::from_name("xmm16"), None);
        assert_eq!(Register::from_name("foo"), None);
    }

    #[test]
    fn displays_64_bit_name() {
        assert_eq!(Register::from_name("r9d").map(|r| r.to_string()).as_deref(), Some("%r9"));
        assert_eq!(Register::Bp.to_string(), "%rbp");
    }
}
