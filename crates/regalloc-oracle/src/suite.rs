//! Test-suite assembly: discover the programs of a chapter, decide which
//! check each one gets, run them, and collect the outcome.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::catalog::{self, TestPolicy};
use crate::driver::{self, Artifacts, Driver};
use crate::features::ExtraCredit;
use crate::golden::{Corpus, TestProperties};
use crate::stage::Stage;
use crate::{Error, Result};

pub const REGALLOC_CHAPTER: u32 = 20;
const OPTIMIZATION_CHAPTER: u32 = 19;

/// Register-allocation program sets; `all_types` is skipped for int-only runs.
const INT_ONLY: &str = "int_only";
const ALL_TYPES: &str = "all_types";

/// Optional allocator features the compiler under test implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    pub coalescing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuiteOptions {
    pub stage: Stage,
    pub extra_credit: ExtraCredit,
    pub int_only: bool,
    pub skip_invalid: bool,
    pub capabilities: Capabilities,
}

impl Default for SuiteOptions {
    fn default() -> Self {
        Self {
            stage: Stage::Run,
            extra_credit: ExtraCredit::NONE,
            int_only: false,
            skip_invalid: false,
            capabilities: Capabilities::default(),
        }
    }
}

/// What is checked for one program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckKind {
    CompileFailure,
    CompileSuccess,
    CompileAndRun,
    ClientAndRun,
    LibAndRun,
    /// Behaviour only, linked with the wrapper stub.
    Behavior { extra_lib: Option<&'static str> },
    Structural(&'static TestPolicy),
    /// The corpus data for this program is inconsistent; running the check
    /// reports the reason as a configuration error.
    Misconfigured(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCheck {
    pub name: String,
    pub program: PathBuf,
    pub kind: CheckKind,
}

/// `test_<path relative to dir, without extension>`.
pub fn test_name(dir: &Path, program: &Path) -> String {
    let rel = program.strip_prefix(dir).unwrap_or(program).with_extension("");
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    format!("test_{}", parts.join("/"))
}

/// C programs under `dir`, in a stable order. A missing directory has none.
pub fn discover(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut programs = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            Error::io(path, e.into())
        })?;
        let path = entry.path();
        if entry.file_type().is_file() && path.extension().is_some_and(|e| e == "c") {
            programs.push(path.to_path_buf());
        }
    }
    Ok(programs)
}

/// A program under an `extra_credit` directory runs only when every feature
/// it needs is enabled.
///
/// # Errors
/// `Error::Config` when the program has no entry in the properties file or
/// names an unknown feature.
pub fn excluded_extra_credit(
    properties: &TestProperties,
    program: &Path,
    enabled: ExtraCredit,
) -> Result<bool> {
    if !program.components().any(|c| c.as_os_str() == "extra_credit") {
        return Ok(false);
    }
    Ok(!enabled.contains(properties.required_features(program)?))
}

/// Check for one register-allocation program.
///
/// Catalogued programs get their structural check, except coalescing
/// programs when the compiler does not coalesce: those are checked for
/// behaviour only, still linked against their library.
pub fn plan_regalloc_program(program: &Path, capabilities: Capabilities) -> CheckKind {
    match catalog::lookup_path(program) {
        Some(policy) if catalog::is_coalescing_program(program) && !capabilities.coalescing => {
            CheckKind::Behavior {
                extra_lib: policy.extra_lib,
            }
        }
        Some(policy) => CheckKind::Structural(policy),
        None => CheckKind::CompileAndRun,
    }
}

/// Plan `program` with `kind`, unless it is an extra-credit program whose
/// features are not enabled. A program whose features cannot be determined
/// is planned as [`CheckKind::Misconfigured`] so the rest of the chapter
/// still runs.
fn plan_program(
    properties: &TestProperties,
    chapter_dir: &Path,
    program: PathBuf,
    enabled: ExtraCredit,
    kind: impl FnOnce(&Path) -> CheckKind,
) -> Option<PlannedCheck> {
    let kind = match excluded_extra_credit(properties, &program, enabled) {
        Ok(true) => {
            debug!(program = %program.display(), "excluded extra-credit program");
            return None;
        }
        Ok(false) => kind(&program),
        Err(Error::Config(reason)) => CheckKind::Misconfigured(reason),
        Err(e) => CheckKind::Misconfigured(e.to_string()),
    };
    Some(PlannedCheck {
        name: test_name(chapter_dir, &program),
        program,
        kind,
    })
}

fn plan_regalloc(corpus: &Corpus, options: &SuiteOptions) -> Result<Vec<PlannedCheck>> {
    if options.stage != Stage::Run {
        warn!(stage = %options.stage, "register allocation tests always run to completion");
    }
    let chapter_dir = corpus.chapter_dir(REGALLOC_CHAPTER);
    let subdirs: &[&str] = if options.int_only {
        &[INT_ONLY]
    } else {
        &[INT_ONLY, ALL_TYPES]
    };

    let mut checks = Vec::new();
    for subdir in subdirs {
        for program in discover(&chapter_dir.join(subdir))? {
            checks.extend(plan_program(
                &corpus.properties,
                &chapter_dir,
                program,
                options.extra_credit,
                |p| plan_regalloc_program(p, options.capabilities),
            ));
        }
    }
    Ok(checks)
}

fn valid_kind(program: &Path, stage: Stage) -> CheckKind {
    if stage != Stage::Run {
        return CheckKind::CompileSuccess;
    }
    if !program.components().any(|c| c.as_os_str() == "libraries") {
        CheckKind::CompileAndRun
    } else if driver::is_client(program) {
        CheckKind::ClientAndRun
    } else {
        CheckKind::LibAndRun
    }
}

/// Every check of one chapter.
pub fn plan_chapter(
    corpus: &Corpus,
    chapter: u32,
    options: &SuiteOptions,
) -> Result<Vec<PlannedCheck>> {
    if chapter == REGALLOC_CHAPTER {
        return plan_regalloc(corpus, options);
    }
    if chapter == 0 || chapter == OPTIMIZATION_CHAPTER || chapter > REGALLOC_CHAPTER {
        return Err(Error::Config(format!("chapter {chapter} has no supported test suite")));
    }

    let chapter_dir = corpus.chapter_dir(chapter);
    let mut checks = Vec::new();
    let mut add = |dir: &str, kind: fn(&Path, Stage) -> CheckKind| -> Result<()> {
        for program in discover(&chapter_dir.join(dir))? {
            checks.extend(plan_program(
                &corpus.properties,
                &chapter_dir,
                program,
                options.extra_credit,
                |p| kind(p, options.stage),
            ));
        }
        Ok(())
    };

    if !options.skip_invalid {
        for dir in options.stage.invalid_dirs() {
            add(dir, |_, _| CheckKind::CompileFailure)?;
        }
    }
    for dir in options.stage.valid_dirs() {
        add(dir, valid_kind)?;
    }
    Ok(checks)
}

/// Outcome of one check.
#[derive(Debug)]
pub struct CheckReport {
    pub name: String,
    pub program: PathBuf,
    pub outcome: Result<()>,
}

impl CheckReport {
    pub fn passed(&self) -> bool {
        self.outcome.is_ok()
    }
}

pub fn run_check(driver: &Driver<'_>, check: &PlannedCheck) -> CheckReport {
    let mut artifacts = Artifacts::new();
    let program = check.program.as_path();
    let outcome = match &check.kind {
        CheckKind::CompileFailure => driver.compile_failure(program, &mut artifacts),
        CheckKind::CompileSuccess => driver.compile_success(program, &mut artifacts),
        CheckKind::CompileAndRun => driver.compile_and_run(program, &mut artifacts),
        CheckKind::ClientAndRun => driver.client_and_run(program, &mut artifacts),
        CheckKind::LibAndRun => driver.lib_and_run(program, &mut artifacts),
        CheckKind::Behavior { extra_lib } => driver.basic_test(program, *extra_lib, &mut artifacts),
        CheckKind::Structural(policy) => driver.check_policy(program, policy, &mut artifacts),
        CheckKind::Misconfigured(reason) => Err(Error::Config(reason.clone())),
    };
    drop(artifacts);
    // whatever the compiler left beside the files the driver asked for
    if let Err(e) = sweep_derived(driver.chapter_dir()) {
        warn!(test = %check.name, error = %e, "could not sweep derived files");
    }

    match &outcome {
        Ok(()) => info!(test = %check.name, "ok"),
        Err(e) => warn!(test = %check.name, kind = ?e.kind(), "FAIL"),
    }
    CheckReport {
        name: check.name.clone(),
        program: check.program.clone(),
        outcome,
    }
}

/// Run `checks` one after another.
pub fn run_suite(driver: &Driver<'_>, checks: &[PlannedCheck]) -> SuiteReport {
    SuiteReport {
        reports: checks.iter().map(|c| run_check(driver, c)).collect(),
    }
}

#[derive(Debug, Default)]
pub struct SuiteReport {
    pub reports: Vec<CheckReport>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.reports.iter().all(CheckReport::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CheckReport> {
        self.reports.iter().filter(|r| !r.passed())
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn merge(&mut self, other: SuiteReport) {
        self.reports.extend(other.reports);
    }
}

impl fmt::Display for SuiteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for report in self.failures() {
            if let Err(e) = &report.outcome {
                writeln!(f, "FAIL: {} ({})", report.name, report.program.display())?;
                writeln!(f, "{e}\n")?;
            }
        }
        writeln!(f, "Ran {} tests", self.len())?;
        let failed = self.failures().count();
        if failed == 0 {
            write!(f, "OK")
        } else {
            write!(f, "FAILED (failures={failed})")
        }
    }
}

/// Delete every file under `dir` that is not a C source, a header, or an
/// assembly wrapper stub. Returns how many were removed.
pub fn sweep_derived(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            Error::io(path, e.into())
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || driver::is_source(path) {
            continue;
        }
        let stem = path.file_stem().and_then(|s| s.to_str());
        if matches!(stem, Some("wrapper_linux" | "wrapper_osx")) {
            continue;
        }
        fs::remove_file(path).map_err(|e| Error::io(path, e))?;
        removed += 1;
    }
    debug!(dir = %dir.display(), removed, "swept derived files");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::Check;

    #[test]
    fn names_are_relative_without_extension() {
        let dir = Path::new("/t/tests/chapter_20");
        assert_eq!(
            test_name(dir, &dir.join("int_only/no_coalescing/loop.c")),
            "test_int_only/no_coalescing/loop"
        );
    }

    #[test]
    fn catalogued_programs_get_their_policy() {
        let caps = Capabilities::default();
        let kind = plan_regalloc_program(
            Path::new("/t/chapter_20/int_only/no_coalescing/force_spill.c"),
            caps,
        );
        match kind {
            CheckKind::Structural(policy) => {
                assert!(matches!(policy.check, Check::Spill { .. }));
                assert_eq!(policy.extra_lib, Some("force_spill_lib.c"));
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn coalescing_programs_degrade_without_capability() {
        let program = Path::new("/t/chapter_20/int_only/with_coalescing/george_coalesce.c");
        assert_eq!(
            plan_regalloc_program(program, Capabilities { coalescing: false }),
            CheckKind::Behavior {
                extra_lib: Some("george_lib.c")
            }
        );
        assert!(matches!(
            plan_regalloc_program(program, Capabilities { coalescing: true }),
            CheckKind::Structural(p) if p.check == (Check::Coalesce { max_moves: 0 })
        ));
    }

    #[test]
    fn uncatalogued_programs_only_run() {
        assert_eq!(
            plan_regalloc_program(
                Path::new("/t/chapter_20/all_types/no_coalescing/return_double.c"),
                Capabilities { coalescing: true },
            ),
            CheckKind::CompileAndRun
        );
    }

    #[test]
    fn valid_programs_by_stage_and_directory() {
        let plain = Path::new("/t/chapter_10/valid/static.c");
        let client = Path::new("/t/chapter_10/valid/libraries/linkage_client.c");
        let lib = Path::new("/t/chapter_10/valid/libraries/linkage.c");
        assert_eq!(valid_kind(plain, Stage::Run), CheckKind::CompileAndRun);
        assert_eq!(valid_kind(client, Stage::Run), CheckKind::ClientAndRun);
        assert_eq!(valid_kind(lib, Stage::Run), CheckKind::LibAndRun);
        assert_eq!(valid_kind(lib, Stage::Parse), CheckKind::CompileSuccess);
    }

    #[test]
    fn unsupported_chapters_are_config_errors() {
        let corpus = Corpus::default();
        for chapter in [0, 19, 21] {
            let err = plan_chapter(&corpus, chapter, &SuiteOptions::default())
                .expect_err("unsupported");
            assert!(err.is_suite_error());
        }
    }
}
