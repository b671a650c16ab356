use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};

use regalloc_oracle::asm::{AsmReader, AttReader, Platform};
use regalloc_oracle::driver::Driver;
use regalloc_oracle::features::ExtraCredit;
use regalloc_oracle::stage::Stage;
use regalloc_oracle::suite::{
    self, Capabilities, CheckReport, REGALLOC_CHAPTER, SuiteOptions, SuiteReport, plan_chapter,
    run_suite,
};
use regalloc_oracle::toolchain::HostToolchain;
use regalloc_oracle::{Check, Corpus, catalog, verify};

#[derive(Parser)]
#[command(name = "regalloc-oracle")]
#[command(about = "Conformance and register-allocation checks for a C compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the test suite of one or more chapters against a compiler.
    Test {
        #[arg(help = "Compiler under test")]
        compiler: PathBuf,

        #[arg(long, default_value = ".", help = "Root of the test corpus")]
        root: PathBuf,

        #[arg(long, help = "Highest chapter to test")]
        chapter: u32,

        #[arg(long, default_value = "run", help = "Stop the compiler after this stage")]
        stage: Stage,

        #[arg(long, help = "Only test the given chapter, not the ones before it")]
        latest_only: bool,

        #[arg(long, help = "Skip programs the compiler should reject")]
        skip_invalid: bool,

        #[arg(long, help = "Skip register allocation tests that use non-int types")]
        int_only: bool,

        #[arg(long, help = "The compiler does not coalesce registers yet")]
        no_coalescing: bool,

        #[arg(long, value_delimiter = ',', help = "Extra-credit features to include (e.g. bitwise,goto)")]
        extra_credit: Vec<String>,

        #[arg(long, help = "Include every extra-credit feature")]
        all_extra_credit: bool,

        #[arg(long, default_value = "gcc", help = "Host C compiler used to build libraries and link")]
        host_cc: PathBuf,

        #[arg(last = true, help = "Arguments passed through to the compiler under test")]
        options: Vec<String>,
    },

    /// Check one function of an assembly file without compiling anything.
    CheckAsm {
        #[arg(help = "AT&T assembly file")]
        input: PathBuf,

        #[arg(short, long, help = "Function to check (defaults to the policy's target)")]
        function: Option<String>,

        #[arg(long, conflicts_with = "policy", help = "Apply the catalogued policy of this test program")]
        program: Option<String>,

        #[arg(long, help = "no-spill | spill:<instructions>:<pseudos> | coalesce:<moves>")]
        policy: Option<String>,
    },

    /// Delete files derived from test programs under a chapter directory.
    Clean {
        #[arg(long, default_value = ".", help = "Root of the test corpus")]
        root: PathBuf,

        #[arg(long, default_value_t = REGALLOC_CHAPTER)]
        chapter: u32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Test {
            compiler,
            root,
            chapter,
            stage,
            latest_only,
            skip_invalid,
            int_only,
            no_coalescing,
            extra_credit,
            all_extra_credit,
            host_cc,
            options,
        } => {
            let extra_credit = if all_extra_credit {
                ExtraCredit::ALL
            } else {
                ExtraCredit::from_names(extra_credit.iter().map(String::as_str))
                    .context("Invalid --extra-credit")?
            };
            let suite_options = SuiteOptions {
                stage,
                extra_credit,
                int_only,
                skip_invalid,
                capabilities: Capabilities {
                    coalescing: !no_coalescing,
                },
            };
            let compiler = fs::canonicalize(&compiler)
                .with_context(|| format!("Compiler not found: {}", compiler.display()))?;
            let toolchain = HostToolchain::new(compiler)
                .with_options(options)
                .with_host_cc(host_cc);
            let corpus = Corpus::load(&root)
                .with_context(|| format!("Failed to load test corpus at {}", root.display()))?;

            let chapters: Vec<u32> = if latest_only {
                vec![chapter]
            } else {
                (1..=chapter).filter(|&c| c != 19).collect()
            };
            let report = run_chapters(&toolchain, &corpus, &chapters, &suite_options);
            println!("{report}");
            if !report.passed() {
                bail!("{} of {} tests failed", report.failures().count(), report.len());
            }
        }
        Commands::CheckAsm {
            input,
            function,
            program,
            policy,
        } => {
            let (check, default_target) = match (program, policy) {
                (Some(name), _) => {
                    let policy = catalog::lookup(&name)
                        .with_context(|| format!("No register allocation policy for {name}"))?;
                    (policy.check, policy.target)
                }
                (None, Some(text)) => (parse_check(&text)?, "target"),
                (None, None) => bail!("Either --program or --policy is required"),
            };
            let function = function.unwrap_or_else(|| default_target.to_string());
            check_asm(&input, &function, check)?;
        }
        Commands::Clean { root, chapter } => {
            let dir = root.join("tests").join(format!("chapter_{chapter}"));
            let removed = suite::sweep_derived(&dir)
                .with_context(|| format!("Failed to clean {}", dir.display()))?;
            println!("Removed {removed} files from {}", dir.display());
        }
    }

    Ok(())
}

fn run_chapters(
    toolchain: &HostToolchain,
    corpus: &Corpus,
    chapters: &[u32],
    options: &SuiteOptions,
) -> SuiteReport {
    let platform = Platform::host();
    let reader = AttReader { platform };
    let mut report = SuiteReport::default();
    for &chapter in chapters {
        let checks = match plan_chapter(corpus, chapter, options) {
            Ok(checks) => checks,
            Err(e) => {
                tracing::warn!(chapter, error = %e, "could not collect tests");
                report.reports.push(CheckReport {
                    name: format!("chapter_{chapter}"),
                    program: corpus.chapter_dir(chapter),
                    outcome: Err(e),
                });
                continue;
            }
        };
        tracing::info!(chapter, tests = checks.len(), "running chapter");
        let stage = if chapter == REGALLOC_CHAPTER {
            Stage::Run
        } else {
            options.stage
        };
        let driver = Driver::new(
            toolchain,
            &reader,
            corpus,
            &corpus.chapter_dir(chapter),
            platform,
        )
        .with_exit_stage(stage)
        .with_math_library(platform == Platform::Linux);
        report.merge(run_suite(&driver, &checks));
    }
    report
}

/// Parse `no-spill`, `spill:<instructions>:<pseudos>` or `coalesce:<moves>`.
fn parse_check(text: &str) -> Result<Check> {
    let mut parts = text.split(':');
    let check = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("no-spill"), None, None, None) => Check::NoSpill,
        (Some("spill"), Some(instructions), Some(pseudos), None) => Check::Spill {
            max_spilled_instructions: instructions
                .parse()
                .with_context(|| format!("Invalid instruction budget in {text}"))?,
            max_spilled_pseudos: pseudos
                .parse()
                .with_context(|| format!("Invalid pseudo budget in {text}"))?,
        },
        (Some("coalesce"), Some(moves), None, None) => Check::Coalesce {
            max_moves: moves
                .parse()
                .with_context(|| format!("Invalid move budget in {text}"))?,
        },
        _ => bail!("Invalid policy '{text}', expected no-spill, spill:N:M or coalesce:N"),
    };
    Ok(check)
}

fn check_asm(input: &Path, function: &str, check: Check) -> Result<()> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let mut program = AttReader::default()
        .read(&text)
        .with_context(|| format!("Failed to parse {}", input.display()))?;
    let func = program.take_function(function).with_context(|| {
        format!("Function {function} not found in {}", input.display())
    })?;

    match verify(check, &func) {
        Ok(()) => {
            println!("{function}: ok ({check:?})");
            Ok(())
        }
        Err(failure) => {
            println!("{failure}");
            bail!("{function} failed {check:?}")
        }
    }
}
