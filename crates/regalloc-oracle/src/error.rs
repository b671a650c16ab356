use std::fmt;
use std::path::PathBuf;

use crate::oracle::BehaviorMismatch;
use crate::verify::StructuralFailure;

/// External process step that is expected to succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Full compile by the compiler under test.
    Compile,
    /// Compiler under test with `-s`.
    CompileToAssembly,
    /// Compiler under test with `-c`.
    CompileToObject,
    /// Host compiler building a library object.
    HostCompile,
    /// Host compiler linking the final executable.
    Link,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Compile => "compilation",
            Step::CompileToAssembly => "compilation to assembly",
            Step::CompileToObject => "compilation to object file",
            Step::HostCompile => "host compilation",
            Step::Link => "linking",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{step} of {} failed with error:\n{stderr}", .program.display())]
    Toolchain {
        step: Step,
        program: PathBuf,
        stderr: String,
    },

    #[error("Didn't catch error in {}", .0.display())]
    UnexpectedSuccess(PathBuf),

    #[error("Found {} for invalid or partially compiled program", .0.display())]
    UnexpectedOutput(PathBuf),

    #[error(transparent)]
    Behavior(Box<BehaviorMismatch>),

    #[error(transparent)]
    Structural(Box<StructuralFailure>),

    #[error("Function `{function}` not found in {}", .assembly.display())]
    FunctionNotFound { function: String, assembly: PathBuf },

    #[error("No expected result recorded for {0}")]
    MissingGolden(String),

    #[error("Test suite configuration error: {0}")]
    Config(String),

    #[error("Assembly parse error at line {line}: {message}")]
    AsmParse { line: usize, message: String },

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// What a failed check says about the compiler under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Toolchain,
    Rejection,
    Behavior,
    NoSpill,
    SpillBudget,
    CoalesceBudget,
    MissingFunction,
    /// The corpus or its reference data is broken, not the compiler.
    Suite,
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Toolchain { .. } => FailureKind::Toolchain,
            Error::UnexpectedSuccess(_) | Error::UnexpectedOutput(_) => FailureKind::Rejection,
            Error::Behavior(_) => FailureKind::Behavior,
            Error::Structural(failure) => failure.kind(),
            Error::FunctionNotFound { .. } => FailureKind::MissingFunction,
            Error::AsmParse { .. } => FailureKind::Toolchain,
            Error::MissingGolden(_)
            | Error::Config(_)
            | Error::Io { .. }
            | Error::Json(_)
            | Error::Internal(_) => FailureKind::Suite,
        }
    }

    /// True when the failure points at the test corpus rather than the compiler.
    pub fn is_suite_error(&self) -> bool {
        self.kind() == FailureKind::Suite
    }
}

impl From<BehaviorMismatch> for Error {
    fn from(m: BehaviorMismatch) -> Self {
        Self::Behavior(Box::new(m))
    }
}

impl From<StructuralFailure> for Error {
    fn from(f: StructuralFailure) -> Self {
        Self::Structural(Box::new(f))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
