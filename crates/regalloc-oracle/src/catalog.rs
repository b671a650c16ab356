//! Which structural check applies to each register-allocation test program.
//!
//! Keyed by the program's file name. Programs without an entry are only
//! checked for correct behaviour.

use std::path::Path;

use crate::verify::Check;

/// The structural check for one program, the function it inspects, and the
/// library (under `libraries/`) it must be linked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestPolicy {
    pub target: &'static str,
    pub extra_lib: Option<&'static str>,
    pub check: Check,
}

impl TestPolicy {
    const fn new(check: Check) -> Self {
        Self {
            target: "target",
            extra_lib: None,
            check,
        }
    }

    const fn lib(mut self, lib: &'static str) -> Self {
        self.extra_lib = Some(lib);
        self
    }

    const fn target(mut self, target: &'static str) -> Self {
        self.target = target;
        self
    }
}

const fn no_spill() -> TestPolicy {
    TestPolicy::new(Check::NoSpill)
}

const fn spill(max_spilled_instructions: usize, max_spilled_pseudos: usize) -> TestPolicy {
    TestPolicy::new(Check::Spill {
        max_spilled_instructions,
        max_spilled_pseudos,
    })
}

const fn coalesce(max_moves: usize) -> TestPolicy {
    TestPolicy::new(Check::Coalesce { max_moves })
}

pub static REGALLOC_TESTS: &[(&str, TestPolicy)] = &[
    ("trivially_colorable.c", no_spill()),
    ("use_all_hardregs.c", no_spill()),
    ("spill_callee_saved.c", no_spill()),
    ("preserve_across_fun_call.c", no_spill()),
    (
        "track_arg_registers.c",
        no_spill().lib("track_arg_registers_lib.c"),
    ),
    (
        "many_pseudos_fewer_conflicts.c",
        no_spill()
            .lib("many_pseudos_fewer_conflicts_lib.c")
            .target("no_spills"),
    ),
    ("cmp_liveness.c", no_spill()),
    ("copy_no_interference.c", no_spill()),
    ("same_instr_no_interference.c", no_spill()),
    ("loop.c", no_spill()),
    ("dbl_trivially_colorable.c", no_spill()),
    ("fourteen_pseudos_interfere.c", no_spill()),
    ("push_xmm.c", no_spill()),
    (
        "track_dbl_arg_registers.c",
        no_spill().lib("track_dbl_arg_registers_lib.c"),
    ),
    ("store_pointer_in_register.c", no_spill()),
    (
        "callee_saved_live_at_exit.c",
        no_spill()
            .lib("callee_saved_live_at_exit_lib.c")
            .target("cant_coalesce_fully"),
    ),
    (
        "funcall_generates_args.c",
        no_spill().lib("funcall_generates_args_lib.c"),
    ),
    ("force_spill.c", spill(3, 1).lib("force_spill_lib.c")),
    // rewrite-rule coverage more than allocation quality
    ("spills_and_rewrites.c", spill(10, 3).lib("force_spill_lib.c")),
    ("spills_rewrites_compare.c", spill(3, 1).lib("force_spill_lib.c")),
    ("rewrite_large_multiply.c", spill(4, 1).lib("force_spill_lib.c")),
    ("spill_movz_dst.c", spill(6, 3).lib("force_spill_lib.c")),
    ("test_spill_metric.c", spill(3, 1).lib("test_spill_metric_lib.c")),
    (
        "test_spill_metric_2.c",
        spill(3, 1).lib("test_spill_metric_2_lib.c"),
    ),
    ("copy_and_separate_interference.c", spill(3, 1)),
    ("optimistic_coloring.c", spill(20, 5).target("five_spills")),
    ("test_spilling_dbls.c", spill(4, 1).lib("force_spill_dbl_lib.c")),
    ("mixed_ints.c", spill(2, 1).lib("force_spill_mixed_int_lib.c")),
    ("briggs_coalesce.c", coalesce(0)),
    ("briggs_coalesce_tmps.c", coalesce(0).target("briggs")),
    ("george_coalesce.c", coalesce(0).lib("george_lib.c")),
    (
        "coalesce_prevents_spill.c",
        coalesce(11).lib("coalesce_prevents_spill_lib.c"),
    ),
];

/// Policy for a program, by exact file name.
pub fn lookup(file_name: &str) -> Option<&'static TestPolicy> {
    REGALLOC_TESTS
        .iter()
        .find(|(name, _)| *name == file_name)
        .map(|(_, policy)| policy)
}

/// Policy for a program path, by its file name.
pub fn lookup_path(program: &Path) -> Option<&'static TestPolicy> {
    program.file_name().and_then(|n| n.to_str()).and_then(lookup)
}

/// Programs under a `with_coalescing` directory measure coalescing, a feature
/// a compiler may not implement yet.
pub fn is_coalescing_program(program: &Path) -> bool {
    program
        .components()
        .any(|c| c.as_os_str() == "with_coalescing")
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn names_are_unique() {
        let names: HashSet<_> = REGALLOC_TESTS.iter().map(|(n, _)| *n).collect();
        assert_eq!(names.len(), REGALLOC_TESTS.len());
    }

    #[test]
    fn catalog_shape() {
        let count = |pred: fn(&Check) -> bool| {
            REGALLOC_TESTS
                .iter()
                .filter(|(_, p)| pred(&p.check))
                .count()
        };
        assert_eq!(count(|c| matches!(c, Check::NoSpill)), 17);
        assert_eq!(count(|c| matches!(c, Check::Spill { .. })), 11);
        assert_eq!(count(|c| matches!(c, Check::Coalesce { .. })), 4);
    }

    #[test]
    fn lookup_is_exact_by_file_name() {
        let policy = lookup("optimistic_coloring.c").expect("entry");
        assert_eq!(policy.target, "five_spills");
        assert_eq!(
            policy.check,
            Check::Spill {
                max_spilled_instructions: 20,
                max_spilled_pseudos: 5
            }
        );
        assert!(lookup("optimistic_coloring").is_none());
        assert!(lookup("not_in_catalog.c").is_none());

        let path = Path::new("chapter_20/int_only/with_coalescing/george_coalesce.c");
        let george = lookup_path(path).expect("entry");
        assert_eq!(george.extra_lib, Some("george_lib.c"));
        assert_eq!(george.target, "target");
        assert!(is_coalescing_program(path));
        assert!(!is_coalescing_program(Path::new("chapter_20/int_only/no_coalescing/loop.c")));
    }
}
