// Copyright (c) The zerorun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::{
    errors::{ExpectedError, Result},
    output::{OutputContext, OutputOpts, OutputWriter, clap_styles},
};
use camino::Utf8PathBuf;
use clap::{Args, Parser};
use itertools::Itertools;
use zerorun_runner::{
    echo::{NoEcho, OkEcho},
    errors::StructuralError,
    exit_codes::ZerorunExitCode,
    policy::{ExitPolicy, RunMode},
    profile::{HarnessProfile, HarnessRun, RunSpec},
    reconcile::CheckSpec,
    run::RunConfig,
    source::derive_source_path,
};

/// Run a test program and check its output against the tests declared in its source.
///
/// The test program is expected to print a `passed: <test>` line for each test that passes.
/// Every test declared in the source file must have run and passed, and every test that ran must
/// be declared in the source file.
#[derive(Debug, Parser)]
#[command(version, styles = clap_styles())]
pub struct ZerorunApp {
    /// The test program to run
    #[arg(
        value_name = "TEST_COMMAND",
        required_unless_present = "profile",
        conflicts_with = "profile"
    )]
    test_command: Option<String>,

    /// Source file declaring the tests [default: TEST_COMMAND with `-test` replaced by `.c`]
    #[arg(value_name = "SOURCE_FILE", requires = "test_command")]
    source_file: Option<Utf8PathBuf>,

    /// Run every test program listed in a harness profile
    #[arg(long, value_name = "FILE")]
    profile: Option<Utf8PathBuf>,

    #[command(flatten)]
    run_opts: RunOpts,

    #[command(flatten)]
    output: OutputOpts,
}

#[derive(Debug, Args)]
#[command(next_help_heading = "Run options")]
struct RunOpts {
    /// How the test program is expected to terminate
    #[arg(long, value_name = "MODE", default_value_t, conflicts_with = "profile")]
    mode: RunMode,

    /// Exit code expected in the failure modes [default: ENOMEM, or 255 with expect-abort]
    #[arg(long, value_name = "CODE", allow_negative_numbers = true, conflicts_with = "profile")]
    expected_code: Option<i32>,

    /// Extra argument to pass to the test program (may be repeated)
    #[arg(
        long = "arg",
        value_name = "ARG",
        allow_hyphen_values = true,
        conflicts_with = "profile"
    )]
    args: Vec<String>,

    /// Test that is expected to run without passing (may be repeated)
    #[arg(long, value_name = "NAME", conflicts_with = "profile")]
    not_passing: Vec<String>,

    /// Report unmatched and duplicate output lines as warnings instead of failing
    #[arg(long)]
    lenient: bool,

    /// Do not echo matched lines to stdout
    #[arg(long)]
    no_echo: bool,
}

impl RunOpts {
    fn single_run(&self, test_command: String, source_file: Option<Utf8PathBuf>) -> Result<RunSpec> {
        if self.mode == RunMode::Plain && self.expected_code.is_some() {
            tracing::warn!("--expected-code is ignored in plain mode");
        }

        let source = match source_file {
            Some(source) => source,
            None => derive_source_path(&test_command)?,
        };
        let policy = ExitPolicy::for_mode(self.mode, self.expected_code);
        let config = RunConfig::new(
            std::iter::once(test_command).chain(self.args.iter().cloned()),
            policy,
        );
        let not_passing = self.not_passing.iter().cloned().collect();

        Ok(RunSpec::new(config.command_line(), config, source)
            .with_checks(CheckSpec::defaults(&not_passing)))
    }
}

impl ZerorunApp {
    /// Initializes the output context.
    pub fn init_output(&self) -> OutputContext {
        self.output.init()
    }

    /// Executes the app, returning the exit code for the process.
    pub fn exec(self, output: OutputContext, output_writer: &mut OutputWriter) -> Result<i32> {
        let profile = match (self.profile, self.test_command) {
            (Some(profile_file), _) => HarnessProfile::from_path(&profile_file)?,
            (None, Some(test_command)) => {
                let run = self.run_opts.single_run(test_command, self.source_file)?;
                HarnessProfile::new(true, vec![run])
            }
            // clap requires one of the two.
            (None, None) => unreachable!("either a test command or a profile is required"),
        };

        let harness = Harness {
            strict: profile.strict() && !self.run_opts.lenient,
            show_headings: output.verbose || profile.runs().len() > 1,
            echo: !self.run_opts.no_echo,
            colorize: output.color.should_colorize(supports_color::Stream::Stdout),
        };
        harness.run_all(&profile, output_writer)
    }
}

#[derive(Copy, Clone, Debug)]
struct Harness {
    strict: bool,
    show_headings: bool,
    echo: bool,
    colorize: bool,
}

impl Harness {
    /// Runs every run in order. The exit code is the first nonzero run status.
    fn run_all(&self, profile: &HarnessProfile, output_writer: &mut OutputWriter) -> Result<i32> {
        let mut exit_code = ZerorunExitCode::OK;

        for spec in profile.runs() {
            if self.show_headings {
                tracing::info!("{} ...", spec.name());
            }

            let run = self.execute(spec, output_writer)?;
            let status = self.check(spec.name(), &run)?;
            if exit_code == ZerorunExitCode::OK {
                exit_code = status;
            }
        }

        Ok(exit_code)
    }

    fn execute(&self, spec: &RunSpec, output_writer: &mut OutputWriter) -> Result<HarnessRun> {
        let result = if self.echo {
            let mut echo = OkEcho::new(output_writer.stdout_writer());
            if self.colorize {
                echo.colorize();
            }
            spec.run(&mut echo)
        } else {
            spec.run(&mut NoEcho)
        };
        result.map_err(|err| ExpectedError::harness_run_error(spec.name(), err))
    }

    /// Reports structural errors, then reconciles the run. Returns the run's status.
    fn check(&self, name: &str, run: &HarnessRun) -> Result<i32> {
        let (violations, scan_errors): (Vec<_>, Vec<_>) = run
            .results()
            .structural_errors()
            .into_iter()
            .partition_map(|error| match error {
                StructuralError::Policy(violation) => itertools::Either::Left(violation),
                other => itertools::Either::Right(other),
            });

        for error in &scan_errors {
            tracing::warn!("{error}");
        }

        // A policy violation is always fatal. Any further violations are reported alongside it.
        let mut violations = violations.into_iter();
        if let Some(first) = violations.next() {
            for other in violations {
                tracing::warn!("{other}");
            }
            return Err(ExpectedError::policy_violation(name, first));
        }

        if self.strict && !scan_errors.is_empty() {
            return Err(ExpectedError::scan_failed(name, scan_errors.len()));
        }

        let results = run.reconcile();
        tracing::debug!(
            "`{name}`: {} tests in source, {} ran, status {}",
            results.source().len(),
            results.ran().len(),
            results.status(),
        );
        Ok(results.status())
    }
}
