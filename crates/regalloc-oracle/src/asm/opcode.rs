/// Normalized mnemonic family.
///
/// Operand-size suffixes are stripped, so `movl`, `movq`, `movb` and the SSE
/// `movsd`/`movapd` all become [`Opcode::Mov`]. Sign- and zero-extending moves
/// keep their own families because they are never spill code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Mov,
    Movsx,
    Movzx,
    Lea,
    Push,
    Pop,
    Add,
    Sub,
    Mult,
    Div,
    Idiv,
    Neg,
    Not,
    Inc,
    Dec,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Sar,
    Cmp,
    Test,
    Cdq,
    Cvttsd2si,
    Cvtsi2sd,
    Jmp,
    JmpCC,
    SetCC,
    Cmov,
    Call,
    Ret,
    Leave,
    Other,
}

impl Opcode {
    /// Classify an AT&T mnemonic.
    pub fn from_mnemonic(mnemonic: &str) -> Self {
        let m = mnemonic.to_ascii_lowercase();
        match m.as_str() {
            "movsd" | "movss" | "movapd" | "movaps" | "movupd" | "movups" | "movd" | "movq" => {
                return Self::Mov;
            }
            "cltd" | "cqto" | "cdq" | "cqo" => return Self::Cdq,
            "cltq" | "cdqe" => return Self::Movsx,
            "call" | "callq" => return Self::Call,
            "ret" | "retq" => return Self::Ret,
            "leave" | "leaveq" => return Self::Leave,
            "jmp" | "jmpq" => return Self::Jmp,
            "comisd" | "ucomisd" => return Self::Cmp,
            _ => {}
        }
        if m.starts_with("cvttsd2si") {
            return Self::Cvttsd2si;
        }
        if m.starts_with("cvtsi2sd") {
            return Self::Cvtsi2sd;
        }
        if m.starts_with("movs") {
            return Self::Movsx;
        }
        if m.starts_with("movz") {
            return Self::Movzx;
        }
        if m.starts_with("cmov") {
            return Self::Cmov;
        }
        if m.starts_with("set") {
            return Self::SetCC;
        }
        if m.starts_with('j') {
            return Self::JmpCC;
        }

        if let Some(op) = Self::from_base(&m) {
            return op;
        }
        // SSE packed/scalar double forms: addsd, xorpd, mulsd ...
        for suffix in ["sd", "pd", "ss", "ps"] {
            if let Some(op) = m.strip_suffix(suffix).and_then(Self::from_base) {
                return op;
            }
        }
        // Integer size suffix: movl, addq, shlb ...
        m.strip_suffix(['b', 'w', 'l', 'q'])
            .and_then(Self::from_base)
            .unwrap_or(Self::Other)
    }

    fn from_base(base: &str) -> Option<Self> {
        let op = match base {
            "mov" => Self::Mov,
            "lea" => Self::Lea,
            "push" => Self::Push,
            "pop" => Self::Pop,
            "add" => Self::Add,
            "sub" => Self::Sub,
            "imul" | "mul" => Self::Mult,
            "div" => Self::Div,
            "idiv" => Self::Idiv,
            "neg" => Self::Neg,
            "not" => Self::Not,
            "inc" => Self::Inc,
            "dec" => Self::Dec,
            "and" => Self::And,
            "or" => Self::Or,
            "xor" => Self::Xor,
            "shl" | "sal" => Self::Shl,
            "shr" => Self::Shr,
            "sar" => Self::Sar,
            "cmp" => Self::Cmp,
            "test" => Self::Test,
            _ => return None,
        };
        Some(op)
    }
}
