//! Differential compilation driver.
//!
//! Compiles a test program with the compiler under test, links and runs the
//! result against its golden record, and hands back the assembly of the
//! function a structural check should inspect.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::asm::{AsmReader, AssemblyFunction, Platform};
use crate::catalog::TestPolicy;
use crate::error::Step;
use crate::golden::Corpus;
use crate::oracle;
use crate::stage::Stage;
use crate::toolchain::{Toolchain, executable_for};
use crate::verify;
use crate::{Error, Result};

/// Files derived from test programs during one check, removed when dropped.
///
/// C sources and headers are never tracked, so a check can not delete the
/// corpus it runs on.
#[derive(Debug, Default)]
pub struct Artifacts {
    paths: Vec<PathBuf>,
}

pub(crate) fn is_source(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("c" | "h")
    )
}

impl Artifacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember `path` for removal. Returns it for convenience.
    pub fn track(&mut self, path: PathBuf) -> PathBuf {
        if is_source(&path) {
            warn!(path = %path.display(), "refusing to track a source file as an artifact");
        } else if !self.paths.contains(&path) {
            self.paths.push(path.clone());
        }
        path
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

impl Drop for Artifacts {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed artifact"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "could not remove artifact"),
            }
        }
    }
}

pub struct Driver<'a> {
    toolchain: &'a dyn Toolchain,
    reader: &'a dyn AsmReader,
    corpus: &'a Corpus,
    exit_stage: Stage,
    chapter_dir: PathBuf,
    wrapper: PathBuf,
    lib_dir: PathBuf,
    link_math: bool,
}

impl<'a> Driver<'a> {
    /// Driver for programs under `chapter_dir`. The assembly wrapper stub and
    /// `libraries/` directory are looked up there.
    pub fn new(
        toolchain: &'a dyn Toolchain,
        reader: &'a dyn AsmReader,
        corpus: &'a Corpus,
        chapter_dir: &Path,
        platform: Platform,
    ) -> Self {
        Self {
            toolchain,
            reader,
            corpus,
            exit_stage: Stage::Run,
            chapter_dir: chapter_dir.to_path_buf(),
            wrapper: chapter_dir.join(format!("{}.s", platform.wrapper_stem())),
            lib_dir: chapter_dir.join("libraries"),
            link_math: false,
        }
    }

    #[must_use]
    pub fn with_exit_stage(mut self, stage: Stage) -> Self {
        self.exit_stage = stage;
        self
    }

    /// Pass `-lm` to the compiler under test for programs that need libm.
    #[must_use]
    pub fn with_math_library(mut self, link_math: bool) -> Self {
        self.link_math = link_math;
        self
    }

    pub fn corpus(&self) -> &Corpus {
        self.corpus
    }

    pub fn chapter_dir(&self) -> &Path {
        &self.chapter_dir
    }

    fn compile(&self, program: &Path, flag: Option<&str>, step: Step) -> Result<()> {
        let out = self.toolchain.invoke_compiler(program, flag)?;
        if out.success() {
            Ok(())
        } else {
            Err(Error::Toolchain {
                step,
                program: program.to_path_buf(),
                stderr: out.stderr,
            })
        }
    }

    /// Link `main` (the compiled program) with the wrapper stub and, if
    /// given, the named library, then run and compare against `program`'s
    /// golden record.
    fn link_with_wrapper(
        &self,
        program: &Path,
        main: PathBuf,
        extra_lib: Option<&str>,
        artifacts: &mut Artifacts,
    ) -> Result<()> {
        let mut inputs = vec![main, self.wrapper.clone()];
        if let Some(lib) = extra_lib {
            let object = self.toolchain.build_object(&self.lib_dir.join(lib))?;
            inputs.push(artifacts.track(object));
        }
        if let Some(exe) = executable_for(&inputs) {
            artifacts.track(exe);
        }
        oracle::run_and_compare(self.toolchain, &self.corpus.golden, program, &inputs)
    }

    /// Compile `program` to assembly, check that it behaves correctly when
    /// linked with the wrapper stub, and return the `target` function.
    pub fn compile_and_extract(
        &self,
        program: &Path,
        extra_lib: Option<&str>,
        target: &str,
        artifacts: &mut Artifacts,
    ) -> Result<AssemblyFunction> {
        let asm_path = artifacts.track(program.with_extension("s"));
        self.compile(program, Some("-s"), Step::CompileToAssembly)?;
        self.link_with_wrapper(program, asm_path.clone(), extra_lib, artifacts)?;

        let text = fs::read_to_string(&asm_path).map_err(|e| Error::io(&asm_path, e))?;
        let mut parsed = self.reader.read(&text)?;
        debug!(functions = parsed.len(), path = %asm_path.display(), "parsed assembly");
        parsed
            .take_function(target)
            .ok_or_else(|| Error::FunctionNotFound {
                function: target.to_string(),
                assembly: asm_path,
            })
    }

    /// Structural check for one catalogued program.
    pub fn check_policy(
        &self,
        program: &Path,
        policy: &TestPolicy,
        artifacts: &mut Artifacts,
    ) -> Result<()> {
        let func = self.compile_and_extract(program, policy.extra_lib, policy.target, artifacts)?;
        verify::verify(policy.check, &func)?;
        Ok(())
    }

    /// Behaviour only: compile to an object file, link with the wrapper stub
    /// and optional library, run, compare.
    pub fn basic_test(
        &self,
        program: &Path,
        extra_lib: Option<&str>,
        artifacts: &mut Artifacts,
    ) -> Result<()> {
        let object = artifacts.track(program.with_extension("o"));
        self.compile(program, Some("-c"), Step::CompileToObject)?;
        self.link_with_wrapper(program, object, extra_lib, artifacts)
    }

    /// Behaviour only: full compile by the compiler under test, run, compare.
    pub fn compile_and_run(&self, program: &Path, artifacts: &mut Artifacts) -> Result<()> {
        let exe = artifacts.track(program.with_extension(""));
        let flag = (self.link_math && self.corpus.properties.requires_mathlib(program))
            .then_some("-lm");
        self.compile(program, flag, Step::Compile)?;
        oracle::run_executable(self.toolchain, &self.corpus.golden, program, &exe)
    }

    /// No file may be left behind by a compile that stopped early or failed.
    fn expect_no_output(&self, program: &Path) -> Result<()> {
        for derived in [program.with_extension("s"), program.with_extension("")] {
            if derived.exists() {
                return Err(Error::UnexpectedOutput(derived));
            }
        }
        Ok(())
    }

    /// The compiler must reject `program` at or before the exit stage.
    pub fn compile_failure(&self, program: &Path, artifacts: &mut Artifacts) -> Result<()> {
        artifacts.track(program.with_extension("s"));
        artifacts.track(program.with_extension(""));
        let flag = self.exit_stage.flag();
        let out = self.toolchain.invoke_compiler(program, flag.as_deref())?;
        if out.success() {
            return Err(Error::UnexpectedSuccess(program.to_path_buf()));
        }
        self.expect_no_output(program)
    }

    /// The compiler must get through the exit stage, which is not `run`.
    pub fn compile_success(&self, program: &Path, artifacts: &mut Artifacts) -> Result<()> {
        artifacts.track(program.with_extension("s"));
        artifacts.track(program.with_extension(""));
        let flag = self.exit_stage.flag();
        self.compile(program, flag.as_deref(), Step::Compile)?;
        self.expect_no_output(program)
    }

    /// Compile `under_test` to an object with the compiler under test, build
    /// `other` with the host compiler, link both and compare against the
    /// golden record of `results_key`.
    fn library_test(
        &self,
        under_test: &Path,
        other: &Path,
        results_key: &Path,
        artifacts: &mut Artifacts,
    ) -> Result<()> {
        let object = artifacts.track(under_test.with_extension("o"));
        self.compile(under_test, Some("-c"), Step::CompileToObject)?;
        let other_object = artifacts.track(self.toolchain.build_object(other)?);
        let inputs = vec![object, other_object];
        if let Some(exe) = executable_for(&inputs) {
            artifacts.track(exe);
        }
        oracle::run_and_compare(self.toolchain, &self.corpus.golden, results_key, &inputs)
    }

    /// Compile the client `<name>_client.c` under test, link it with the
    /// host-built library `<name>.c`.
    pub fn client_and_run(&self, client: &Path, artifacts: &mut Artifacts) -> Result<()> {
        let lib = library_for_client(client)?;
        self.library_test(client, &lib, &lib, artifacts)
    }

    /// Compile the library `<name>.c` under test, link it with the
    /// host-built client `<name>_client.c`.
    pub fn lib_and_run(&self, lib: &Path, artifacts: &mut Artifacts) -> Result<()> {
        let client = client_for_library(lib)?;
        self.library_test(lib, &client, lib, artifacts)
    }
}

fn stem(path: &Path) -> Result<&str> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Config(format!("bad program name {}", path.display())))
}

pub(crate) fn is_client(program: &Path) -> bool {
    stem(program).is_ok_and(|s| s.ends_with("_client"))
}

fn library_for_client(client: &Path) -> Result<PathBuf> {
    let stem = stem(client)?;
    let lib = stem.strip_suffix("_client").ok_or_else(|| {
        Error::Config(format!("{} is not a library client", client.display()))
    })?;
    Ok(client.with_file_name(format!("{lib}.c")))
}

fn client_for_library(lib: &Path) -> Result<PathBuf> {
    Ok(lib.with_file_name(format!("{}_client.c", stem(lib)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sources_are_never_tracked() {
        let mut artifacts = Artifacts::new();
        artifacts.track(PathBuf::from("/nonexistent/prog.c"));
        artifacts.track(PathBuf::from("/nonexistent/prog.h"));
        artifacts.track(PathBuf::from("/nonexistent/prog.s"));
        artifacts.track(PathBuf::from("/nonexistent/prog.s"));
        assert_eq!(artifacts.paths(), [PathBuf::from("/nonexistent/prog.s")]);
    }

    #[test]
    fn library_pairs() {
        let client = Path::new("/t/chapter_10/valid/libraries/linkage_client.c");
        assert!(is_client(client));
        assert_eq!(
            library_for_client(client).expect("client"),
            PathBuf::from("/t/chapter_10/valid/libraries/linkage.c")
        );
        let lib = Path::new("/t/chapter_10/valid/libraries/linkage.c");
        assert!(!is_client(lib));
        assert_eq!(client_for_library(lib).expect("lib"), client);
        assert!(library_for_client(lib).is_err());
    }
}
