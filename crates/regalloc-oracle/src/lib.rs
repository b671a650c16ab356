#![allow(
    clippy::missing_errors_doc, // every fallible operation returns crate::Error
    clippy::module_name_repetitions
)]

pub mod asm;
pub mod catalog;
pub mod driver;
pub mod error;
pub mod features;
pub mod golden;
pub mod oracle;
pub mod stage;
pub mod suite;
pub mod toolchain;
pub mod verify;

/// Test harness module for writing unit and integration tests.
///
/// This module is only available when running tests or when the
/// `test-harness` feature is enabled.
#[cfg(any(test, feature = "test-harness"))]
pub mod test_harness;

pub use error::{Error, FailureKind, Result};
pub use golden::{Corpus, GoldenRecord};
pub use verify::{Check, StructuralFailure, Violation, verify};
