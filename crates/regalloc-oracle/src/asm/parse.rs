// AT&T-syntax reader for the assembly the compiler under test emits.
//
// Only what the verifier needs is modelled: function boundaries, local labels,
// and instructions with typed operands. Directives and data sections are
// skipped.

use super::{AsmItem, AssemblyFunction, AssemblyProgram, Instruction, Operand, Platform, Register};
use crate::{Error, Result};

/// Turns assembly text into per-function instruction lists.
pub trait AsmReader {
    fn read(&self, text: &str) -> Result<AssemblyProgram>;
}

/// Reader for GNU/Apple `as` AT&T syntax.
#[derive(Debug, Clone, Copy)]
pub struct AttReader {
    pub platform: Platform,
}

impl Default for AttReader {
    fn default() -> Self {
        Self {
            platform: Platform::host(),
        }
    }
}

impl AsmReader for AttReader {
    fn read(&self, text: &str) -> Result<AssemblyProgram> {
        let mut program = AssemblyProgram::default();
        let mut current: Option<AssemblyFunction> = None;
        let mut in_text = true;

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let mut line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }

            if let Some((label, rest)) = split_label(line) {
                if in_text {
                    if self.platform.is_local_label(label) {
                        if let Some(func) = current.as_mut() {
                            func.items.push(AsmItem::Label(label.to_string()));
                        }
                    } else {
                        if let Some(done) = current.take() {
                            program.insert(done);
                        }
                        let name = self.platform.function_name(label);
                        current = Some(AssemblyFunction::new(name));
                    }
                }
                line = rest;
                if line.is_empty() {
                    continue;
                }
            }

            if line.starts_with('.') {
                in_text = section_after(line, in_text);
                continue;
            }
            if !in_text {
                continue;
            }

            let Some(func) = current.as_mut() else {
                return Err(Error::AsmParse {
                    line: line_no,
                    message: format!("instruction outside of any function: {line}"),
                });
            };
            let instr = parse_instruction(line).map_err(|message| Error::AsmParse {
                line: line_no,
                message,
            })?;
            func.items.push(AsmItem::Instruction(instr));
        }

        if let Some(done) = current.take() {
            program.insert(done);
        }
        Ok(program)
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

/// `name:` at the start of a line, plus whatever follows it.
fn split_label(line: &str) -> Option<(&str, &str)> {
    let (head, rest) = line.split_once(':')?;
    let is_label_char = |c: char| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '$');
    if head.is_empty() || !head.chars().all(is_label_char) {
        return None;
    }
    Some((head, rest.trim()))
}

/// Track whether subsequent lines belong to a code section.
fn section_after(directive: &str, in_text: bool) -> bool {
    let mut words = directive.split_whitespace();
    match words.next() {
        Some(".text") => true,
        Some(".data" | ".bss" | ".rodata" | ".literal4" | ".literal8" | ".literal16" | ".cstring") => {
            false
        }
        Some(".section") => {
            let name = words.next().unwrap_or_default();
            name.starts_with(".text") || name.starts_with("__TEXT,__text")
        }
        _ => in_text,
    }
}

pub(crate) fn parse_instruction(line: &str) -> std::result::Result<Instruction, String> {
    let (mnemonic, rest) = match line.split_once(char::is_whitespace) {
        Some((m, rest)) => (m, rest.trim()),
        None => (line, ""),
    };
    let texts = split_operands(rest);
    let operands = texts
        .iter()
        .copied()
        .map(parse_operand)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let written = if texts.is_empty() {
        mnemonic.to_string()
    } else {
        format!("{mnemonic} {}", texts.join(", "))
    };
    Ok(Instruction::new(mnemonic, operands).with_written(written))
}

/// Split on commas that are not inside parentheses.
fn split_operands(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

pub(crate) fn parse_operand(text: &str) -> std::result::Result<Operand, String> {
    if let Some(name) = text.strip_prefix('%') {
        return register(name).map(Operand::Reg);
    }
    if let Some(inner) = text.strip_prefix('*') {
        return parse_operand(inner);
    }
    if let Some(imm) = text.strip_prefix('$') {
        return parse_int(imm)
            .map(Operand::Imm)
            .ok_or_else(|| format!("bad immediate `{text}`"));
    }
    if let Some(open) = text.find('(') {
        return parse_memory(&text[..open], &text[open..]);
    }
    Ok(parse_int(text).map_or_else(|| Operand::Target(text.to_string()), Operand::Imm))
}

fn parse_memory(disp: &str, addr: &str) -> std::result::Result<Operand, String> {
    let inner = addr
        .strip_prefix('(')
        .and_then(|a| a.strip_suffix(')'))
        .ok_or_else(|| format!("unterminated memory operand `{disp}{addr}`"))?;
    let parts: Vec<&str> = inner.split(',').map(str::trim).collect();

    if let [base] = parts.as_slice() {
        let base = register(base.trim_start_matches('%'))?;
        if base == Register::Ip {
            let (symbol, disp) = split_symbol(disp)?;
            return Ok(Operand::Data { symbol, disp });
        }
        return Ok(Operand::Memory {
            disp: displacement(disp)?,
            base,
        });
    }

    let (base, index, scale) = match parts.as_slice() {
        [base, index] => (*base, *index, "1"),
        [base, index, scale] => (*base, *index, *scale),
        _ => return Err(format!("bad memory operand `{disp}{addr}`")),
    };
    let base = if base.is_empty() {
        None
    } else {
        Some(register(base.trim_start_matches('%'))?)
    };
    let index = register(index.trim_start_matches('%'))?;
    let scale = scale
        .parse::<u8>()
        .ok()
        .filter(|s| matches!(s, 1 | 2 | 4 | 8))
        .ok_or_else(|| format!("bad scale `{scale}`"))?;
    Ok(Operand::Indexed {
        disp: displacement(disp)?,
        base,
        index,
        scale,
    })
}

fn register(name: &str) -> std::result::Result<Register, String> {
    Register::from_name(name).ok_or_else(|| format!("unknown register `%{name}`"))
}

fn displacement(text: &str) -> std::result::Result<i64, String> {
    if text.is_empty() {
        return Ok(0);
    }
    parse_int(text).ok_or_else(|| format!("unsupported displacement `{text}`"))
}

/// `sym`, `sym+8` or `sym-8`.
fn split_symbol(text: &str) -> std::result::Result<(String, i64), String> {
    match text.rfind(['+', '-']) {
        Some(pos) if pos > 0 => {
            let offset = parse_int(&text[pos..])
                .ok_or_else(|| format!("bad symbol offset `{text}`"))?;
            Ok((text[..pos].to_string(), offset))
        }
        _ => Ok((text.to_string(), 0)),
    }
}

fn parse_int(text: &str) -> Option<i64> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let value = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        u64::from_str_radix(hex, 16).ok()?
    } else {
        digits.parse::<u64>().ok()?
    };
    // two's complement wrap for 64-bit immediates written as unsigned hex
    #[allow(clippy::cast_possible_wrap)]
    let value = value as i64;
    Some(if negative { value.wrapping_neg() } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asm::Opcode;

    const LINUX_SAMPLE: &str = r#"
        .globl target
        .text
target:
        pushq   %rbp
        movq    %rsp, %rbp
        subq    $16, %rsp
        movl    %edi, %eax      # copy arg
        movl    -8(%rbp), %ecx
        cmpl    $0, %eax
        je      .Lend.3
        addl    x(%rip), %eax
.Lend.3:
        movq    %rbp, %rsp
        popq    %rbp
        ret
        .data
x:
        .long 4
        .section .text
helper:
        movsd   .Ldbl.1(%rip), %xmm0
        ret
        .section .rodata
.Ldbl.1:
        .quad 4607182418800017408
        .section .note.GNU-stack,"",@progbits
"#;

    #[test]
    fn splits_functions_and_skips_data() {
        let program = AttReader {
            platform: Platform::Linux,
        }
        .read(LINUX_SAMPLE)
        .expect("parse");
        assert_eq!(program.names().collect::<Vec<_>>(), ["helper", "target"]);

        let target = program.function("target").expect("target");
        assert_eq!(target.instructions().count(), 11);
        assert!(
            target
                .items
                .contains(&AsmItem::Label(".Lend.3".to_string()))
        );

        let helper = program.function("helper").expect("helper");
        let movsd = helper.instructions().next().expect("movsd");
        assert_eq!(movsd.opcode, Opcode::Mov);
        assert_eq!(
            movsd.operands[0],
            Operand::Data {
                symbol: ".Ldbl.1".into(),
                disp: 0
            }
        );
    }

    #[test]
    fn parses_frame_relative_operand() {
        let instr = parse_instruction("movl -8(%rbp), %ecx").expect("parse");
        assert_eq!(instr.opcode, Opcode::Mov);
        assert_eq!(
            instr.operands,
            vec![
                Operand::Memory {
                    disp: -8,
                    base: Register::Bp
                },
                Operand::Reg(Register::Cx)
            ]
        );
    }

    #[test]
    fn keeps_register_spelling_for_display() {
        let instr = parse_instruction("movl\t%esi,   -8(%rbp)").expect("parse");
        assert_eq!(instr.operands[0], Operand::Reg(Register::Si));
        assert_eq!(instr.to_string(), "movl %esi, -8(%rbp)");
        assert_eq!(parse_instruction("ret").expect("parse").to_string(), "ret");
    }

    #[test]
    fn frame_relative_indexed_operand_is_a_stack_slot() {
        let instr = parse_instruction("movl -16(%rbp,%rax,4), %ecx").expect("parse");
        assert!(instr.operands[0].is_stack_slot());
        assert_eq!(instr.operands[0].to_string(), "-16(%rbp,%rax,4)");
    }

    #[test]
    fn parses_indexed_and_immediates() {
        assert_eq!(
            parse_operand("16(%rax,%rcx,8)"),
            Ok(Operand::Indexed {
                disp: 16,
                base: Some(Register::Ax),
                index: Register::Cx,
                scale: 8
            })
        );
        assert_eq!(parse_operand("$-1"), Ok(Operand::Imm(-1)));
        assert_eq!(parse_operand("$0x10"), Ok(Operand::Imm(16)));
        assert_eq!(
            parse_operand("foo@PLT"),
            Ok(Operand::Target("foo@PLT".into()))
        );
        assert_eq!(parse_operand("*%rax"), Ok(Operand::Reg(Register::Ax)));
        assert!(parse_operand("%bogus").is_err());
        assert!(parse_operand("8(%rax,%rcx,3)").is_err());
    }

    #[test]
    fn macos_symbols_drop_underscore() {
        let text = "\t.globl _target\n_target:\n\tmovl %edi, %eax\nLtmp:\n\tret\n";
        let program = AttReader {
            platform: Platform::MacOs,
        }
        .read(text)
        .expect("parse");
        let target = program.function("target").expect("target");
        assert_eq!(target.items.len(), 3);
        assert_eq!(target.items[1], AsmItem::Label("Ltmp".into()));
    }

    #[test]
    fn instruction_before_any_label_is_an_error() {
        let err = AttReader {
            platform: Platform::Linux,
        }
        .read("  .text\n  ret\n")
        .expect_err("should fail");
        assert!(matches!(err, Error::AsmParse { line: 2, .. }), "{err}");
    }
}
