use std::fmt;
use std::str::FromStr;

/// Last compiler phase exercised by a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Lex,
    Parse,
    Validate,
    Tacky,
    Codegen,
    Run,
}

pub const INVALID_LEX: &str = "invalid_lex";
pub const INVALID_PARSE: &str = "invalid_parse";
pub const INVALID_SEMANTICS: &str = "invalid_semantics";
pub const INVALID_DECLARATIONS: &str = "invalid_declarations";
pub const INVALID_TYPES: &str = "invalid_types";
pub const INVALID_STRUCT_TAGS: &str = "invalid_struct_tags";
pub const VALID: &str = "valid";

const ALL_INVALID: &[&str] = &[
    INVALID_LEX,
    INVALID_PARSE,
    INVALID_SEMANTICS,
    INVALID_DECLARATIONS,
    INVALID_TYPES,
    INVALID_STRUCT_TAGS,
];

impl Stage {
    /// Compiler flag that stops after this stage; `None` for a full run.
    pub fn flag(self) -> Option<String> {
        (self != Stage::Run).then(|| format!("--{self}"))
    }

    /// Directories whose programs must be rejected at or before this stage.
    pub fn invalid_dirs(self) -> &'static [&'static str] {
        match self {
            Stage::Lex => &[INVALID_LEX],
            Stage::Parse => &[INVALID_LEX, INVALID_PARSE],
            Stage::Validate | Stage::Tacky | Stage::Codegen | Stage::Run => ALL_INVALID,
        }
    }

    /// Directories whose programs must get through this stage.
    pub fn valid_dirs(self) -> &'static [&'static str] {
        match self {
            Stage::Lex => &[
                INVALID_PARSE,
                INVALID_SEMANTICS,
                INVALID_DECLARATIONS,
                INVALID_TYPES,
                INVALID_STRUCT_TAGS,
                VALID,
            ],
            Stage::Parse => &[
                INVALID_SEMANTICS,
                INVALID_DECLARATIONS,
                INVALID_TYPES,
                INVALID_STRUCT_TAGS,
                VALID,
            ],
            Stage::Validate | Stage::Tacky | Stage::Codegen | Stage::Run => &[VALID],
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Lex => "lex",
            Stage::Parse => "parse",
            Stage::Validate => "validate",
            Stage::Tacky => "tacky",
            Stage::Codegen => "codegen",
            Stage::Run => "run",
        })
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "lex" => Ok(Stage::Lex),
            "parse" => Ok(Stage::Parse),
            "validate" => Ok(Stage::Validate),
            "tacky" => Ok(Stage::Tacky),
            "codegen" => Ok(Stage::Codegen),
            "run" => Ok(Stage::Run),
            other => Err(format!(
                "unknown stage `{other}`, expected lex, parse, validate, tacky, codegen or run"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_directory_is_classified_once() {
        for stage in [
            Stage::Lex,
            Stage::Parse,
            Stage::Validate,
            Stage::Tacky,
            Stage::Codegen,
            Stage::Run,
        ] {
            let mut all: Vec<_> = stage
                .invalid_dirs()
                .iter()
                .chain(stage.valid_dirs())
                .copied()
                .collect();
            all.sort_unstable();
            all.dedup();
            assert_eq!(all.len(), 7, "{stage}");
        }
    }

    #[test]
    fn flags_round_trip_names() {
        assert_eq!(Stage::Parse.flag().as_deref(), Some("--parse"));
        assert_eq!(Stage::Run.flag(), None);
        assert_eq!("codegen".parse::<Stage>(), Ok(Stage::Codegen));
        assert!("link".parse::<Stage>().is_err());
    }
}
