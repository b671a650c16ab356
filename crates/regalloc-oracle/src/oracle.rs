//! Execution oracle: run a linked program and compare what it did against the
//! recorded expectation.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::golden::{GoldenRecord, GoldenStore};
use crate::toolchain::{RunOutput, Toolchain};
use crate::{Error, Result};

/// One aspect in which a run differed from its golden record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    ReturnCode { expected: i32, actual: Option<i32> },
    Stdout { expected: String, actual: String },
    Stderr(String),
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mismatch::ReturnCode {
                expected,
                actual: Some(actual),
            } => write!(f, "Expected return code {expected}, found {actual}"),
            Mismatch::ReturnCode {
                expected,
                actual: None,
            } => write!(f, "Expected return code {expected}, but process was killed by a signal"),
            Mismatch::Stdout { expected, actual } => {
                write!(f, "Expected output {expected:?}, found {actual:?}")
            }
            Mismatch::Stderr(stderr) => write!(f, "Unexpected error output: {stderr}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BehaviorMismatch {
    pub executable: PathBuf,
    pub inputs: Vec<PathBuf>,
    pub mismatches: Vec<Mismatch>,
}

impl fmt::Display for BehaviorMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Incorrect behavior in {}", self.executable.display())?;
        for m in &self.mismatches {
            writeln!(f, "  {m}")?;
        }
        if !self.inputs.is_empty() {
            let inputs: Vec<_> = self.inputs.iter().map(|p| p.display().to_string()).collect();
            write!(f, "Built from: {}", inputs.join(", "))?;
        }
        Ok(())
    }
}

impl std::error::Error for BehaviorMismatch {}

/// Every way in which `actual` departs from `expected`. Empty means the run passed.
pub fn mismatches(expected: &GoldenRecord, actual: &RunOutput) -> Vec<Mismatch> {
    let mut found = Vec::new();
    if actual.code != Some(expected.return_code) {
        found.push(Mismatch::ReturnCode {
            expected: expected.return_code,
            actual: actual.code,
        });
    }
    if actual.stdout != expected.stdout {
        found.push(Mismatch::Stdout {
            expected: expected.stdout.clone(),
            actual: actual.stdout.clone(),
        });
    }
    if !actual.stderr.is_empty() {
        found.push(Mismatch::Stderr(actual.stderr.clone()));
    }
    found
}

/// Compare one run against its golden record.
pub fn compare(
    expected: &GoldenRecord,
    actual: &RunOutput,
) -> std::result::Result<(), BehaviorMismatch> {
    let mismatches = mismatches(expected, actual);
    if mismatches.is_empty() {
        return Ok(());
    }
    Err(BehaviorMismatch {
        executable: actual.executable.clone(),
        inputs: Vec::new(),
        mismatches,
    })
}

/// Link `inputs`, run the result, and check it against the golden record of
/// `program`.
pub fn run_and_compare(
    toolchain: &dyn Toolchain,
    golden: &GoldenStore,
    program: &Path,
    inputs: &[PathBuf],
) -> Result<()> {
    let expected = golden.get(program)?;
    let actual = toolchain.link_and_run(inputs)?;
    debug!(exe = %actual.executable.display(), code = ?actual.code, "ran");
    compare(expected, &actual).map_err(|mut m| {
        m.inputs = inputs.to_vec();
        Error::from(m)
    })
}

/// Run an executable built from `program` alone and check it against the
/// golden record of `program`.
pub fn run_executable(
    toolchain: &dyn Toolchain,
    golden: &GoldenStore,
    program: &Path,
    executable: &Path,
) -> Result<()> {
    let expected = golden.get(program)?;
    let actual = toolchain.run(executable)?;
    debug!(exe = %executable.display(), code = ?actual.code, "ran");
    compare(expected, &actual).map_err(|mut m| {
        m.inputs = vec![program.to_path_buf()];
        Error::from(m)
    })
}
