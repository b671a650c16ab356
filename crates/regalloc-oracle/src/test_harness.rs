//! Test harness for regalloc-oracle unit and integration tests
//!
//! Builders for assembly functions, and a scripted [`Toolchain`] that plays
//! the compiler under test and the host C compiler without spawning anything.
//!
//! # Example
//!
//! ```rust
//! use regalloc_oracle::asm::Register::*;
//! use regalloc_oracle::test_harness::*;
//! use regalloc_oracle::verify::check_no_spills;
//!
//! let func = function("target", vec![
//!     mov(reg(Di), reg(Ax)),
//!     instr("addl", vec![imm(1), reg(Ax)]),
//!     instr("ret", vec![]),
//! ]);
//! assert!(check_no_spills(&func).is_ok());
//! ```

#![allow(
    clippy::must_use_candidate,
    clippy::missing_panics_doc,
    clippy::needless_pass_by_value
)]

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use crate::asm::{AsmItem, AssemblyFunction, Instruction, Operand, Register};
use crate::error::Step;
use crate::toolchain::{CompilerOutput, RunOutput, Toolchain, executable_for};
use crate::{Error, Result};

pub fn reg(r: Register) -> Operand {
    Operand::Reg(r)
}

pub fn imm(value: i64) -> Operand {
    Operand::Imm(value)
}

/// Frame slot `disp(%rbp)`.
pub fn stack(disp: i64) -> Operand {
    Operand::Memory {
        disp,
        base: Register::Bp,
    }
}

/// Memory through a register other than the frame base.
pub fn mem(disp: i64, base: Register) -> Operand {
    Operand::Memory { disp, base }
}

pub fn instr(mnemonic: &str, operands: Vec<Operand>) -> AsmItem {
    AsmItem::Instruction(Instruction::new(mnemonic, operands))
}

pub fn mov(src: Operand, dst: Operand) -> AsmItem {
    instr("movq", vec![src, dst])
}

pub fn label(name: &str) -> AsmItem {
    AsmItem::Label(name.to_string())
}

pub fn function(name: &str, items: Vec<AsmItem>) -> AssemblyFunction {
    AssemblyFunction::with_items(name, items)
}

/// Toolchain double driven by canned results.
///
/// Successful compiles and links write placeholder files where the real
/// tools would, so artifact cleanup can be observed. Every call is logged in
/// `calls` as `"<tool> <flag> <file name>"`.
#[derive(Debug, Default)]
pub struct ScriptedToolchain {
    /// Text written as the `.s` output of `-s` compiles.
    pub assembly: String,
    /// Exit code of the compiler under test.
    pub compile_code: i32,
    pub compile_stderr: String,
    /// Extension of a file every compile leaves next to the source, the way
    /// a compiler keeping its preprocessed `.i` would.
    pub intermediate: Option<String>,
    /// Fail host compiles and links with this message.
    pub host_failure: Option<String>,
    /// Exit code, stdout and stderr of every executed program.
    pub run_code: Option<i32>,
    pub run_stdout: String,
    pub run_stderr: String,
    pub calls: RefCell<Vec<String>>,
}

impl ScriptedToolchain {
    /// Compiles succeed, programs exit 0 silently.
    pub fn new() -> Self {
        Self {
            run_code: Some(0),
            ..Self::default()
        }
    }

    pub fn with_assembly(mut self, text: &str) -> Self {
        self.assembly = text.to_string();
        self
    }

    pub fn with_compile_failure(mut self, code: i32, stderr: &str) -> Self {
        self.compile_code = code;
        self.compile_stderr = stderr.to_string();
        self
    }

    pub fn with_intermediate(mut self, extension: &str) -> Self {
        self.intermediate = Some(extension.to_string());
        self
    }

    pub fn with_run(mut self, code: Option<i32>, stdout: &str, stderr: &str) -> Self {
        self.run_code = code;
        self.run_stdout = stdout.to_string();
        self.run_stderr = stderr.to_string();
        self
    }

    pub fn with_host_failure(mut self, stderr: &str) -> Self {
        self.host_failure = Some(stderr.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn log(&self, tool: &str, flag: &str, path: &Path) {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.calls.borrow_mut().push(format!("{tool} {flag} {name}"));
    }

    fn host(&self, step: Step, subject: &Path) -> Result<()> {
        match &self.host_failure {
            Some(stderr) => Err(Error::Toolchain {
                step,
                program: subject.to_path_buf(),
                stderr: stderr.clone(),
            }),
            None => Ok(()),
        }
    }
}

fn write(path: &Path, contents: &str) -> Result<()> {
    fs::write(path, contents).map_err(|e| Error::io(path, e))
}

impl Toolchain for ScriptedToolchain {
    fn invoke_compiler(&self, source: &Path, flag: Option<&str>) -> Result<CompilerOutput> {
        self.log("cc", flag.unwrap_or("-"), source);
        if let Some(ext) = &self.intermediate {
            write(&source.with_extension(ext), "intermediate")?;
        }
        if self.compile_code == 0 {
            match flag {
                Some("-s") => write(&source.with_extension("s"), &self.assembly)?,
                Some("-c") => write(&source.with_extension("o"), "object")?,
                None | Some("-lm") => write(&source.with_extension(""), "executable")?,
                Some(_) => {}
            }
        }
        Ok(CompilerOutput {
            code: Some(self.compile_code),
            stderr: self.compile_stderr.clone(),
        })
    }

    fn build_object(&self, source: &Path) -> Result<PathBuf> {
        self.log("host", "-c", source);
        self.host(Step::HostCompile, source)?;
        let object = source.with_extension("o");
        write(&object, "object")?;
        Ok(object)
    }

    fn link_and_run(&self, inputs: &[PathBuf]) -> Result<RunOutput> {
        let exe = executable_for(inputs)
            .ok_or_else(|| Error::Internal("link requested with no inputs".into()))?;
        self.log("host", "link", &inputs[0]);
        self.host(Step::Link, &inputs[0])?;
        write(&exe, "executable")?;
        self.run(&exe)
    }

    fn run(&self, executable: &Path) -> Result<RunOutput> {
        self.log("run", "-", executable);
        Ok(RunOutput {
            executable: executable.to_path_buf(),
            code: self.run_code,
            stdout: self.run_stdout.clone(),
            stderr: self.run_stderr.clone(),
        })
    }
}
