//! External processes: the compiler under test and the host C toolchain.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use crate::error::Step;
use crate::{Error, Result};

/// Suppresses warnings about test programs that declare libc functions themselves.
const NO_REDECLARATION_WARNING: &str = "-Wno-incompatible-library-redeclaration";

/// Exit status and diagnostics of one compiler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CompilerOutput {
    pub code: Option<i32>,
    pub stderr: String,
}

impl CompilerOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Observed behaviour of one executed program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunOutput {
    pub executable: PathBuf,
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

pub trait Toolchain {
    /// Run the compiler under test on `source`, with one optional mode flag
    /// (`-s`, `-c`, `-lm`, or a stage flag such as `--parse`).
    fn invoke_compiler(&self, source: &Path, flag: Option<&str>) -> Result<CompilerOutput>;

    /// Compile `source` to an object file beside it with the host compiler.
    fn build_object(&self, source: &Path) -> Result<PathBuf>;

    /// Link `inputs` in order with the host compiler and run the result.
    /// The executable is written to [`executable_for`]`(inputs)`.
    fn link_and_run(&self, inputs: &[PathBuf]) -> Result<RunOutput>;

    /// Run an executable with no arguments.
    fn run(&self, executable: &Path) -> Result<RunOutput>;
}

/// Executable name for a link of `inputs`: the first input without its extension.
pub fn executable_for(inputs: &[PathBuf]) -> Option<PathBuf> {
    inputs.first().map(|first| first.with_extension(""))
}

/// Real toolchain backed by `std::process::Command`.
#[derive(Debug, Clone)]
pub struct HostToolchain {
    /// Compiler under test.
    pub compiler: PathBuf,
    /// Extra arguments passed to every compiler-under-test invocation.
    pub options: Vec<String>,
    pub host_cc: PathBuf,
}

impl HostToolchain {
    pub fn new(compiler: impl Into<PathBuf>) -> Self {
        Self {
            compiler: compiler.into(),
            options: Vec::new(),
            host_cc: PathBuf::from("gcc"),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: Vec<String>) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_host_cc(mut self, host_cc: impl Into<PathBuf>) -> Self {
        self.host_cc = host_cc.into();
        self
    }

    fn host(&self, step: Step, subject: &Path, cmd: &mut Command) -> Result<()> {
        let out = spawn(cmd, &self.host_cc)?;
        if out.status.success() {
            Ok(())
        } else {
            Err(Error::Toolchain {
                step,
                program: subject.to_path_buf(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            })
        }
    }
}

fn spawn(cmd: &mut Command, program: &Path) -> Result<Output> {
    debug!(?cmd, "spawning");
    cmd.output().map_err(|e| Error::io(program, e))
}

impl Toolchain for HostToolchain {
    fn invoke_compiler(&self, source: &Path, flag: Option<&str>) -> Result<CompilerOutput> {
        let mut cmd = Command::new(&self.compiler);
        cmd.args(&self.options).args(flag).arg(source);
        let out = spawn(&mut cmd, &self.compiler)?;
        Ok(CompilerOutput {
            code: out.status.code(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }

    fn build_object(&self, source: &Path) -> Result<PathBuf> {
        let object = source.with_extension("o");
        let mut cmd = Command::new(&self.host_cc);
        cmd.arg(source)
            .args(["-c", "-fstack-protector-all", NO_REDECLARATION_WARNING, "-o"])
            .arg(&object);
        self.host(Step::HostCompile, source, &mut cmd)?;
        Ok(object)
    }

    fn link_and_run(&self, inputs: &[PathBuf]) -> Result<RunOutput> {
        let exe = executable_for(inputs)
            .ok_or_else(|| Error::Internal("link requested with no inputs".into()))?;
        let mut cmd = Command::new(&self.host_cc);
        cmd.arg(NO_REDECLARATION_WARNING)
            .args(inputs)
            .arg("-o")
            .arg(&exe);
        self.host(Step::Link, &inputs[0], &mut cmd)?;
        self.run(&exe)
    }

    fn run(&self, executable: &Path) -> Result<RunOutput> {
        let out = spawn(&mut Command::new(executable), executable)?;
        Ok(RunOutput {
            executable: executable.to_path_buf(),
            code: out.status.code(),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_is_first_input_without_extension() {
        let inputs = vec![
            PathBuf::from("/t/chapter_20/int_only/loop.s"),
            PathBuf::from("/t/chapter_20/wrapper_linux.s"),
        ];
        assert_eq!(
            executable_for(&inputs),
            Some(PathBuf::from("/t/chapter_20/int_only/loop"))
        );
        assert_eq!(executable_for(&[]), None);
    }

    #[test]
    fn compiler_output_success_requires_zero_exit() {
        assert!(CompilerOutput { code: Some(0), stderr: String::new() }.success());
        assert!(!CompilerOutput { code: Some(1), stderr: String::new() }.success());
        assert!(!CompilerOutput { code: None, stderr: String::new() }.success());
    }

    #[test]
    fn missing_compiler_is_an_io_error() {
        let tc = HostToolchain::new("/nonexistent/regalloc-oracle-cc");
        let err = tc
            .invoke_compiler(Path::new("prog.c"), Some("-s"))
            .expect_err("no such binary");
        assert!(matches!(err, Error::Io { .. }));
    }
}
