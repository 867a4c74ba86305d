// Copyright (c) The zerorun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Running a test program once and classifying what it printed.
//!
//! A run moves through the states described by [`RunState`]. Each stage is a separate type, so
//! a run cannot be classified before its exit code has been checked:
//!
//! ```text
//! RunConfig::start -> PendingRun::execute -> CapturedRun::check -> CheckedRun::classify
//!   (NotStarted)        (Running)             (Captured)           (Checked -> Ok | PolicyViolation)
//! ```
//!
//! The program runs to completion with its output buffered in full. There is no timeout: if the
//! program hangs, so does the run.

use crate::{
    classify::{ClassifiedRun, OutputStream, scan_output},
    echo::OutputEcho,
    errors::{PolicyViolation, RunExecError, StructuralError},
    matcher::MatcherSet,
    policy::ExitPolicy,
};
use bstr::ByteSlice;
use std::{collections::BTreeSet, process::ExitStatus};

/// The states a run goes through.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunState {
    /// The program has not been launched yet.
    NotStarted,

    /// The program is running and its output is being captured.
    Running,

    /// The program exited and its output was captured.
    Captured,

    /// The exit code was evaluated against the exit policy.
    Checked,

    /// The exit policy was satisfied.
    Ok,

    /// The exit policy was violated.
    PolicyViolation,
}

/// Everything needed to run a test program once and classify its output.
#[derive(Clone, Debug)]
pub struct RunConfig {
    command: Vec<String>,
    policy: ExitPolicy,
    stdout_matchers: MatcherSet,
    stderr_matchers: Option<MatcherSet>,
}

impl RunConfig {
    /// Creates a new configuration for `command` (the program followed by its arguments).
    ///
    /// The defaults for `policy` are applied: plain mode matches `passed` lines on stdout;
    /// the failure modes also match `FAILED` lines, and scan stderr with
    /// [`MatcherSet::failure_diagnostics`].
    pub fn new(command: impl IntoIterator<Item = impl Into<String>>, policy: ExitPolicy) -> Self {
        let (stdout_matchers, stderr_matchers) = if policy.scans_stderr() {
            (
                MatcherSet::passed_or_failed(),
                Some(MatcherSet::failure_diagnostics()),
            )
        } else {
            (MatcherSet::passed(), None)
        };
        Self {
            command: command.into_iter().map(Into::into).collect(),
            policy,
            stdout_matchers,
            stderr_matchers,
        }
    }

    /// Replaces the matchers used for stdout.
    pub fn with_stdout_matchers(mut self, matchers: MatcherSet) -> Self {
        self.stdout_matchers = matchers;
        self
    }

    /// Scans stderr with `matchers`. In plain mode, stderr output is still a policy violation.
    pub fn with_stderr_matchers(mut self, matchers: MatcherSet) -> Self {
        self.stderr_matchers = Some(matchers);
        self
    }

    /// Returns the program and its arguments.
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Returns the command as a single shell-quoted string.
    pub fn command_line(&self) -> String {
        shell_words::join(&self.command)
    }

    /// Returns the exit policy.
    pub fn policy(&self) -> &ExitPolicy {
        &self.policy
    }

    /// Returns the stdout matchers.
    pub fn stdout_matchers(&self) -> &MatcherSet {
        &self.stdout_matchers
    }

    /// Returns the stderr matchers, if stderr is scanned.
    pub fn stderr_matchers(&self) -> Option<&MatcherSet> {
        self.stderr_matchers.as_ref()
    }

    /// Begins a run.
    pub fn start(&self) -> PendingRun<'_> {
        PendingRun { config: self }
    }

    /// Runs the program, checks its exit code and classifies its output.
    pub fn run(&self, echo: &mut dyn OutputEcho) -> Result<RunResults, RunExecError> {
        Ok(self.start().execute()?.check().classify(echo))
    }
}

/// A run that has not been started. Returned by [`RunConfig::start`].
#[derive(Debug)]
pub struct PendingRun<'cfg> {
    config: &'cfg RunConfig,
}

impl<'cfg> PendingRun<'cfg> {
    /// Returns [`RunState::NotStarted`].
    pub fn state(&self) -> RunState {
        RunState::NotStarted
    }

    /// Launches the program and waits for it to exit, capturing stdout and stderr in full.
    pub fn execute(self) -> Result<CapturedRun<'cfg>, RunExecError> {
        let command_line = self.config.command_line();
        let Some((program, args)) = self.config.command.split_first() else {
            return Err(RunExecError::new(
                command_line,
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
            ));
        };

        tracing::debug!(state = ?RunState::Running, "running `{command_line}`");
        let output = duct::cmd(program.as_str(), args)
            .stdout_capture()
            .stderr_capture()
            .unchecked()
            .run()
            .map_err(|error| RunExecError::new(&command_line, error))?;

        let exit_code = exit_code(output.status);
        tracing::debug!("`{command_line}` exited with {exit_code}");

        Ok(CapturedRun {
            config: self.config,
            outcome: RunOutcome {
                command: command_line,
                exit_code,
                stdout: output.stdout,
                stderr: output.stderr,
            },
        })
    }
}

/// The captured result of one execution of a test program.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunOutcome {
    command: String,
    exit_code: i32,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl RunOutcome {
    /// Creates an outcome from output captured elsewhere.
    pub fn new(
        command: impl Into<String>,
        exit_code: i32,
        stdout: impl Into<Vec<u8>>,
        stderr: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            command: command.into(),
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// Returns the command line that was run.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns the exit code. On Unix, termination by a signal is reported as `-signal`.
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Returns the captured stdout.
    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    /// Returns the captured stderr.
    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }
}

/// A run whose output has been captured, but whose exit code has not been checked.
#[derive(Debug)]
pub struct CapturedRun<'cfg> {
    config: &'cfg RunConfig,
    outcome: RunOutcome,
}

impl<'cfg> CapturedRun<'cfg> {
    /// Wraps an outcome captured elsewhere, e.g. in tests.
    pub fn from_outcome(config: &'cfg RunConfig, outcome: RunOutcome) -> Self {
        Self { config, outcome }
    }

    /// Returns [`RunState::Captured`].
    pub fn state(&self) -> RunState {
        RunState::Captured
    }

    /// Returns the captured outcome.
    pub fn outcome(&self) -> &RunOutcome {
        &self.outcome
    }

    /// Evaluates the exit code and stderr against the exit policy.
    pub fn check(self) -> CheckedRun<'cfg> {
        let violations: Vec<_> = self
            .config
            .policy
            .evaluate(self.outcome.exit_code, &self.outcome.stderr)
            .into_iter()
            .map(|kind| PolicyViolation::new(&self.outcome.command, self.outcome.exit_code, kind))
            .collect();
        tracing::debug!(
            state = ?RunState::Checked,
            mode = %self.config.policy.mode(),
            "`{}`: {} policy violations",
            self.outcome.command,
            violations.len(),
        );
        CheckedRun {
            config: self.config,
            outcome: self.outcome,
            violations,
        }
    }
}

/// A run whose exit code has been checked.
#[derive(Debug)]
pub struct CheckedRun<'cfg> {
    config: &'cfg RunConfig,
    outcome: RunOutcome,
    violations: Vec<PolicyViolation>,
}

impl CheckedRun<'_> {
    /// Returns [`RunState::Ok`] or [`RunState::PolicyViolation`].
    pub fn state(&self) -> RunState {
        if self.violations.is_empty() {
            RunState::Ok
        } else {
            RunState::PolicyViolation
        }
    }

    /// Returns the captured outcome.
    pub fn outcome(&self) -> &RunOutcome {
        &self.outcome
    }

    /// Returns the policy violations, in the order they were found.
    pub fn violations(&self) -> &[PolicyViolation] {
        &self.violations
    }

    /// Classifies stdout (and stderr, if configured) and folds the policy violations into the
    /// structural errors.
    pub fn classify(self, echo: &mut dyn OutputEcho) -> RunResults {
        let stdout = scan_output(
            self.outcome.stdout.lines_with_terminator(),
            &self.config.stdout_matchers,
            OutputStream::Stdout,
            echo,
        );
        let stderr = self.config.stderr_matchers.as_ref().map(|matchers| {
            scan_output(
                self.outcome.stderr.lines_with_terminator(),
                matchers,
                OutputStream::Stderr,
                echo,
            )
        });

        RunResults {
            command: self.outcome.command,
            exit_code: self.outcome.exit_code,
            stdout,
            stderr,
            violations: self.violations,
        }
    }
}

/// The classified output of one run, together with every structural error found.
///
/// Names may appear once on each stream without being duplicates: a test that passes on stdout
/// may also log a diagnostic on stderr.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunResults {
    command: String,
    exit_code: i32,
    stdout: ClassifiedRun,
    stderr: Option<ClassifiedRun>,
    violations: Vec<PolicyViolation>,
}

impl RunResults {
    /// Returns the command line that was run.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns the exit code of the program.
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Returns the classified stdout.
    pub fn stdout(&self) -> &ClassifiedRun {
        &self.stdout
    }

    /// Returns the classified stderr, if stderr was scanned.
    pub fn stderr(&self) -> Option<&ClassifiedRun> {
        self.stderr.as_ref()
    }

    /// Iterates over the classified streams.
    pub fn streams(&self) -> impl Iterator<Item = &ClassifiedRun> + '_ {
        std::iter::once(&self.stdout).chain(self.stderr.as_ref())
    }

    /// Returns the policy violations for this run.
    pub fn policy_violations(&self) -> &[PolicyViolation] {
        &self.violations
    }

    /// Returns every structural error: policy violations first, then scan errors per stream.
    pub fn structural_errors(&self) -> Vec<StructuralError> {
        self.violations
            .iter()
            .cloned()
            .map(StructuralError::Policy)
            .chain(self.streams().flat_map(|s| s.errors().iter().cloned()))
            .collect()
    }

    /// Returns true if there were no structural errors.
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.streams().all(|s| s.errors().is_empty())
    }

    /// Returns the names observed on any stream.
    pub fn ran(&self) -> BTreeSet<String> {
        self.streams()
            .flat_map(|s| s.names())
            .map(str::to_owned)
            .collect()
    }

    /// Returns the names classified under `label` on any stream.
    pub fn matched(&self, label: &str) -> BTreeSet<String> {
        self.streams()
            .flat_map(|s| s.names_with_label(label))
            .map(str::to_owned)
            .collect()
    }
}

#[cfg(unix)]
fn exit_code(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    status
        .code()
        .or_else(|| status.signal().map(|signal| -signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
