//! Reference data shipped with the test corpus: expected results for every
//! runnable program and per-program properties.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::features::ExtraCredit;
use crate::{Error, Result};

pub const EXPECTED_RESULTS: &str = "expected_results.json";
pub const TEST_PROPERTIES: &str = "test_properties.json";

/// Expected exit code and standard output of a program.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GoldenRecord {
    pub return_code: i32,
    #[serde(default)]
    pub stdout: String,
}

impl GoldenRecord {
    pub fn new(return_code: i32, stdout: impl Into<String>) -> Self {
        Self {
            return_code,
            stdout: stdout.into(),
        }
    }
}

/// Lookup key of `program`: its path relative to `root`, `/`-separated.
pub fn relative_key(root: &Path, program: &Path) -> Result<String> {
    let rel = program.strip_prefix(root).map_err(|_| {
        Error::Config(format!(
            "{} is outside the test root {}",
            program.display(),
            root.display()
        ))
    })?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect();
    Ok(parts.join("/"))
}

fn read_json(root: &Path, file: &str) -> Result<String> {
    let path = root.join(file);
    fs::read_to_string(&path).map_err(|e| Error::io(path, e))
}

#[derive(Debug, Clone, Default)]
pub struct GoldenStore {
    root: PathBuf,
    records: HashMap<String, GoldenRecord>,
}

impl GoldenStore {
    pub fn load(root: &Path) -> Result<Self> {
        let text = read_json(root, EXPECTED_RESULTS)?;
        Self::from_json(root, &text)
    }

    pub fn from_json(root: &Path, text: &str) -> Result<Self> {
        let records = serde_json::from_str(text)?;
        Ok(Self::from_records(root, records))
    }

    pub fn from_records(root: &Path, records: HashMap<String, GoldenRecord>) -> Self {
        Self {
            root: root.to_path_buf(),
            records,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Expected result for the program at `program` (a source path).
    pub fn get(&self, program: &Path) -> Result<&GoldenRecord> {
        let key = relative_key(&self.root, program)?;
        match self.records.get(&key) {
            Some(record) => Ok(record),
            None => Err(Error::MissingGolden(key)),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TestProperties {
    #[serde(skip)]
    root: PathBuf,
    #[serde(default)]
    extra_credit_tests: HashMap<String, Vec<String>>,
    #[serde(default)]
    requires_mathlib: HashSet<String>,
}

impl TestProperties {
    pub fn load(root: &Path) -> Result<Self> {
        let text = read_json(root, TEST_PROPERTIES)?;
        Self::from_json(root, &text)
    }

    pub fn from_json(root: &Path, text: &str) -> Result<Self> {
        let mut props: Self = serde_json::from_str(text)?;
        props.root = root.to_path_buf();
        Ok(props)
    }

    pub fn requires_mathlib(&self, program: &Path) -> bool {
        relative_key(&self.root, program).is_ok_and(|key| self.requires_mathlib.contains(&key))
    }

    /// Extra-credit features `program` depends on. Every program under an
    /// `extra_credit` directory must be listed.
    pub fn required_features(&self, program: &Path) -> Result<ExtraCredit> {
        let key = relative_key(&self.root, program)?;
        let tags = self
            .extra_credit_tests
            .get(&key)
            .ok_or_else(|| Error::Config(format!("no extra-credit features recorded for {key}")))?;
        ExtraCredit::from_names(tags.iter().map(String::as_str))
    }
}

/// A test corpus on disk: `tests/chapter_N/...` under `root`, with its
/// reference data beside it.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    pub golden: GoldenStore,
    pub properties: TestProperties,
}

impl Corpus {
    pub fn load(root: &Path) -> Result<Self> {
        Ok(Self {
            golden: GoldenStore::load(root)?,
            properties: TestProperties::load(root)?,
        })
    }

    pub fn root(&self) -> &Path {
        self.golden.root()
    }

    pub fn chapter_dir(&self, chapter: u32) -> PathBuf {
        self.root().join("tests").join(format!("chapter_{chapter}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS: &str = r#"{
        "tests/chapter_1/valid/return_2.c": { "return_code": 2 },
        "tests/chapter_9/valid/hello.c": { "return_code": 0, "stdout": "hello\n" }
    }"#;

    #[test]
    fn golden_lookup_is_relative_to_root() {
        let root = Path::new("/corpus");
        let store = GoldenStore::from_json(root, RESULTS).expect("valid json");
        assert_eq!(store.len(), 2);

        let ret = store
            .get(&root.join("tests/chapter_1/valid/return_2.c"))
            .expect("recorded");
        assert_eq!(ret, &GoldenRecord::new(2, ""));

        let hello = store
            .get(&root.join("tests/chapter_9/valid/hello.c"))
            .expect("recorded");
        assert_eq!(hello.stdout, "hello\n");
    }

    #[test]
    fn missing_golden_names_the_key() {
        let root = Path::new("/corpus");
        let store = GoldenStore::from_json(root, RESULTS).expect("valid json");
        let err = store
            .get(&root.join("tests/chapter_2/valid/neg.c"))
            .expect_err("not recorded");
        assert!(matches!(&err, Error::MissingGolden(k) if k == "tests/chapter_2/valid/neg.c"));
        assert!(err.is_suite_error());

        assert!(store.get(Path::new("/elsewhere/x.c")).is_err());
    }

    #[test]
    fn properties_resolve_features_and_mathlib() {
        let root = Path::new("/corpus");
        let props = TestProperties::from_json(
            root,
            r#"{
                "extra_credit_tests": {
                    "tests/chapter_6/valid/extra_credit/goto.c": ["goto"],
                    "tests/chapter_6/valid/extra_credit/bad.c": ["labels"]
                },
                "requires_mathlib": ["tests/chapter_13/valid/sqrt.c"]
            }"#,
        )
        .expect("valid json");

        let goto = root.join("tests/chapter_6/valid/extra_credit/goto.c");
        assert_eq!(props.required_features(&goto).expect("known"), ExtraCredit::GOTO);
        assert!(props
            .required_features(&root.join("tests/chapter_6/valid/extra_credit/bad.c"))
            .is_err());
        assert!(props
            .required_features(&root.join("tests/chapter_6/valid/extra_credit/none.c"))
            .is_err());

        assert!(props.requires_mathlib(&root.join("tests/chapter_13/valid/sqrt.c")));
        assert!(!props.requires_mathlib(&goto));
    }
}
