use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::{Error, Result};

/// Set of optional ("extra credit") language features.
///
/// A test program declares the features it needs; a run declares the ones
/// it enables. A program is excluded unless every feature it needs is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ExtraCredit(u8);

const NAMES: [(&str, ExtraCredit); 7] = [
    ("bitwise", ExtraCredit::BITWISE),
    ("compound", ExtraCredit::COMPOUND),
    ("increment", ExtraCredit::INCREMENT),
    ("goto", ExtraCredit::GOTO),
    ("switch", ExtraCredit::SWITCH),
    ("nan", ExtraCredit::NAN),
    ("union", ExtraCredit::UNION),
];

impl ExtraCredit {
    pub const NONE: Self = Self(0);
    pub const BITWISE: Self = Self(1);
    pub const COMPOUND: Self = Self(1 << 1);
    pub const INCREMENT: Self = Self(1 << 2);
    pub const GOTO: Self = Self(1 << 3);
    pub const SWITCH: Self = Self(1 << 4);
    pub const NAN: Self = Self(1 << 5);
    pub const UNION: Self = Self(1 << 6);
    pub const ALL: Self = Self(0x7f);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Feature by tag name, case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, f)| *f)
    }

    pub fn from_names<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        names.into_iter().try_fold(Self::NONE, |acc, name| {
            Self::from_name(name)
                .map(|f| acc | f)
                .ok_or_else(|| Error::Config(format!("unknown extra-credit feature `{name}`")))
        })
    }
}

impl BitOr for ExtraCredit {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ExtraCredit {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for ExtraCredit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(n, _)| *n)
            .collect();
        f.write_str(&names.join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_contains_every_feature() {
        for (_, flag) in NAMES {
            assert!(ExtraCredit::ALL.contains(flag));
            assert!(!ExtraCredit::NONE.contains(flag));
        }
        assert_eq!(
            NAMES.iter().fold(ExtraCredit::NONE, |acc, (_, f)| acc | *f),
            ExtraCredit::ALL
        );
    }

    #[test]
    fn parses_tag_lists() {
        let flags = ExtraCredit::from_names(["BITWISE", "goto"]).expect("known tags");
        assert!(flags.contains(ExtraCredit::BITWISE | ExtraCredit::GOTO));
        assert!(!flags.contains(ExtraCredit::SWITCH));
        assert_eq!(flags.to_string(), "bitwise|goto");

        let err = ExtraCredit::from_names(["labels"]).expect_err("unknown tag");
        assert!(err.is_suite_error());
    }

    #[test]
    fn empty_requirement_is_always_satisfied() {
        assert!(ExtraCredit::NONE.contains(ExtraCredit::NONE));
    }
}
