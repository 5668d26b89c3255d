//! Conformance harness
//!
//! One run checks one fixture against one grammar:
//!
//! 1. [`loader`] reads the grammar and any embedded grammars it needs
//! 2. [`driver`] tokenizes the fixture line by line and records scopes
//! 3. [`report`] prints the per-line dump (always)
//! 4. [`expectations`] reads the checks and [`evaluator`] asserts on them
//!
//! Setup problems abort the run with a [`HarnessError`]. Failed checks are
//! collected and reported together.

pub mod driver;
pub mod evaluator;
pub mod expectations;
pub mod loader;
pub mod report;

use crate::config::TmCheckConfig;
use crate::error::HarnessError;
use driver::tokenize_fixture;
use evaluator::{Evaluator, Failure};
use loader::GrammarFiles;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// The three inputs of a run
#[derive(Debug, Clone)]
pub struct Invocation {
    pub grammar: PathBuf,
    pub fixture: PathBuf,
    pub expectations: PathBuf,
}

/// Result of a run that got as far as evaluating checks
#[derive(Debug)]
pub enum Outcome {
    Pass,
    Fail(Vec<Failure>),
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            Outcome::Pass => 0,
            Outcome::Fail(_) => 1,
        }
    }
}

/// Run the harness, writing the dump and `PASS` to `stdout` and the failure
/// list to `stderr`.
pub fn run<O: Write, E: Write>(
    invocation: &Invocation,
    config: &TmCheckConfig,
    grammars_dir: Option<&Path>,
    stdout: &mut O,
    stderr: &mut E,
) -> Result<Outcome, HarnessError> {
    let files = GrammarFiles::open(
        &invocation.grammar,
        grammars_dir.map(Path::to_path_buf),
        config.grammars.suffix.as_str(),
    )?;
    info!(scope = files.scope_name(), "loading grammar");
    let grammar = files.compile()?;

    let bytes = fs::read(&invocation.fixture).map_err(|e| HarnessError::io(&invocation.fixture, e))?;
    let text = String::from_utf8_lossy(&bytes);
    let records = tokenize_fixture(&grammar, &text)?;
    debug!(lines = records.len(), "tokenized fixture");

    report::write_dump(stdout, &invocation.fixture, &records, &config.dump)
        .map_err(HarnessError::Output)?;

    let checks = expectations::load_checks(&invocation.expectations)?;
    let failures = Evaluator::new(&invocation.fixture, &records, config.report.scope_sample)
        .evaluate(&checks);
    info!(checks = checks.len(), failures = failures.len(), "evaluated checks");

    if failures.is_empty() {
        writeln!(stdout, "PASS").map_err(HarnessError::Output)?;
        Ok(Outcome::Pass)
    } else {
        stdout.flush().map_err(HarnessError::Output)?;
        report::write_failures(stderr, &failures).map_err(HarnessError::Output)?;
        Ok(Outcome::Fail(failures))
    }
}
