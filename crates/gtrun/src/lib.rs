use std::ffi::OsString;
use std::io::{self, BufWriter, Write};
use std::process::{ExitCode, Termination};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use colored::Colorize;

use gtrun_cli::{Args, Command, ListCommand, TestCommand};
use gtrun_logging::{set_colored_override, setup_tracing};
use gtrun_metadata::{Options, ProjectMetadata, ProjectOptionsOverrides, ProjectSettings};
use gtrun_results::ResultReporter;
use gtrun_runner::{TestRunConfig, discover, run_tests};
use gtrun_system::absolute;

use crate::console::ConsoleSink;

mod console;

pub fn gtrun_main(f: impl FnOnce(Vec<OsString>) -> Vec<OsString>) -> ExitStatus {
    run(f).unwrap_or_else(|error| {
        let mut stderr = std::io::stderr().lock();

        writeln!(stderr, "{}", "gtrun failed".red().bold()).ok();
        for cause in error.chain() {
            if let Some(ioerr) = cause.downcast_ref::<io::Error>() {
                if ioerr.kind() == io::ErrorKind::BrokenPipe {
                    return ExitStatus::Success;
                }
            }

            writeln!(stderr, "  {} {cause}", "Cause:".bold()).ok();
        }

        ExitStatus::Error
    })
}

fn run(f: impl FnOnce(Vec<OsString>) -> Vec<OsString>) -> Result<ExitStatus> {
    let args = wild::args_os();

    let args = f(
        argfile::expand_args_from(args, argfile::parse_fromfile, argfile::PREFIX)
            .context("Failed to read CLI arguments from file")?,
    );

    let args = Args::parse_from(args);

    match args.command {
        Command::Test(test_args) => test(test_args),
        Command::List(list_args) => list(list_args),
        Command::Version => version().map(|()| ExitStatus::Success),
    }
}

pub(crate) fn version() -> Result<()> {
    let mut stdout = BufWriter::new(io::stdout().lock());
    writeln!(stdout, "gtrun {}", env!("CARGO_PKG_VERSION"))?;
    Ok(())
}

fn current_dir() -> Result<Utf8PathBuf> {
    let cwd = std::env::current_dir().context("Failed to get the current working directory")?;
    Utf8PathBuf::from_path_buf(cwd).map_err(|path| {
        anyhow::anyhow!(
            "The current working directory `{}` contains non-Unicode characters. gtrun only supports Unicode paths.",
            path.display()
        )
    })
}

/// Loads the project configuration and layers the command line options on top.
fn project_settings(
    cwd: &Utf8Path,
    config_file: Option<&Utf8Path>,
    options: Options,
) -> Result<ProjectSettings> {
    let config_file = config_file.map(|path| absolute(path, cwd));

    let mut project_metadata = if let Some(config_file) = &config_file {
        ProjectMetadata::from_config_file(config_file.clone(), cwd.to_path_buf())?
    } else {
        ProjectMetadata::discover(cwd)?
    };

    tracing::debug!(root = %project_metadata.root(), "Project root");

    project_metadata.apply_overrides(&ProjectOptionsOverrides::new(config_file, options));

    let settings = project_metadata
        .to_settings()
        .context("Invalid gtrun configuration")?;
    Ok(settings)
}

fn absolute_executables(executables: &[Utf8PathBuf], cwd: &Utf8Path) -> Vec<Utf8PathBuf> {
    executables
        .iter()
        .map(|executable| absolute(executable, cwd))
        .collect()
}

pub(crate) fn test(args: TestCommand) -> Result<ExitStatus> {
    let verbosity = args.verbosity.level();
    set_colored_override(args.color);
    setup_tracing(verbosity);

    let cwd = current_dir()?;
    tracing::debug!(cwd = %cwd, "Working directory");

    let executables = absolute_executables(&args.executables, &cwd);
    let config_file = args.config_file.clone();
    let settings = Arc::new(project_settings(
        &cwd,
        config_file.as_deref(),
        args.into_options(),
    )?);

    let start = Instant::now();
    let tests = discover(&executables, &settings)?;

    let reporter = ResultReporter::new(
        ConsoleSink::new(io::stdout(), verbosity.is_quiet()),
        settings.reporting().throttle,
    );
    let stats = run_tests(
        Arc::clone(&settings),
        &tests,
        &reporter,
        &TestRunConfig::default(),
    )?;
    reporter.all_tests_finished();

    let mut stdout = BufWriter::new(io::stdout().lock());
    writeln!(stdout)?;
    write!(stdout, "{}", stats.display(start))?;
    stdout.flush()?;

    Ok(if stats.is_success() {
        ExitStatus::Success
    } else {
        ExitStatus::Failure
    })
}

pub(crate) fn list(args: ListCommand) -> Result<ExitStatus> {
    set_colored_override(args.color);
    setup_tracing(args.verbosity.level());

    let cwd = current_dir()?;
    let executables = absolute_executables(&args.executables, &cwd);
    let config_file = args.config_file.clone();
    let settings = project_settings(&cwd, config_file.as_deref(), args.into_options())?;

    let tests = discover(&executables, &settings)?;

    let mut stdout = BufWriter::new(io::stdout().lock());
    for test_case in &tests.test_cases_to_run {
        writeln!(stdout, "{test_case}")?;
    }
    stdout.flush()?;

    Ok(ExitStatus::Success)
}

#[derive(Copy, Clone)]
pub enum ExitStatus {
    /// All selected tests passed.
    Success = 0,

    /// The run completed but some tests failed.
    Failure = 1,

    /// The run itself failed.
    Error = 2,
}

impl Termination for ExitStatus {
    fn report(self) -> ExitCode {
        ExitCode::from(self as u8)
    }
}

impl ExitStatus {
    #[must_use]
    pub const fn to_i32(self) -> i32 {
        self as i32
    }
}
