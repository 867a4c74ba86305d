// Copyright (c) The zerorun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by zerorun.

use crate::{classify::OutputStream, exit_codes::ZerorunExitCode};
use bstr::ByteSlice;
use camino::Utf8PathBuf;
use config::ConfigError;
use std::{fmt, io};
use thiserror::Error;

/// An error that occurred while compiling a matcher or a source pattern.
///
/// These are configuration errors: they are raised when a [`MatcherSet`](crate::matcher::MatcherSet)
/// is built, never while lines are being matched.
#[derive(Clone, Debug, Error)]
#[error("invalid matcher `{label}` with pattern `{pattern}`")]
#[non_exhaustive]
pub struct MatcherBuildError {
    /// The label of the matcher that failed to build.
    pub label: String,

    /// The pattern that failed to build.
    pub pattern: String,

    /// The kind of error that occurred.
    #[source]
    pub kind: MatcherBuildErrorKind,
}

impl MatcherBuildError {
    pub(crate) fn new(
        label: impl Into<String>,
        pattern: impl Into<String>,
        kind: MatcherBuildErrorKind,
    ) -> Self {
        Self {
            label: label.into(),
            pattern: pattern.into(),
            kind,
        }
    }
}

/// The kind of error in a [`MatcherBuildError`].
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum MatcherBuildErrorKind {
    /// The matcher label was empty.
    #[error("matcher label must not be empty")]
    EmptyLabel,

    /// The pattern is not a valid regular expression.
    #[error("pattern is not a valid regular expression")]
    InvalidRegex(#[source] regex::Error),

    /// The pattern must capture the test name with exactly one named group.
    #[error("pattern must define exactly one named capture group (found {count})")]
    NamedGroupCount {
        /// The number of named groups found.
        count: usize,
    },
}

/// An error that occurred while reading a source file.
#[derive(Debug, Error)]
#[error("error reading source file `{path}`")]
pub struct SourceReadError {
    path: Utf8PathBuf,
    #[source]
    error: io::Error,
}

impl SourceReadError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, error: io::Error) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }

    /// Returns the path that could not be read.
    pub fn path(&self) -> &Utf8PathBuf {
        &self.path
    }

    /// Returns the exit code the process should terminate with.
    pub fn process_exit_code(&self) -> i32 {
        ZerorunExitCode::from_io_error(&self.error)
    }
}

/// No source file was given, and one could not be derived from the test command.
#[derive(Clone, Debug, Error)]
#[error(
    "no source file was given and the test command `{command}` does not end in `{suffix}`",
    suffix = crate::source::TEST_COMMAND_SUFFIX
)]
pub struct SourcePathError {
    command: String,
}

impl SourcePathError {
    pub(crate) fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

/// An error that occurred while launching a test program or collecting its output.
#[derive(Debug, Error)]
#[error("error running test program `{command}`")]
pub struct RunExecError {
    command: String,
    #[source]
    error: io::Error,
}

impl RunExecError {
    pub(crate) fn new(command: impl Into<String>, error: io::Error) -> Self {
        Self {
            command: command.into(),
            error,
        }
    }

    /// Returns the command line that failed to run.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns the exit code the process should terminate with.
    pub fn process_exit_code(&self) -> i32 {
        ZerorunExitCode::from_io_error(&self.error)
    }
}

/// A fatal error that occurred while executing one run of a harness profile.
#[derive(Debug, Error)]
pub enum HarnessRunError {
    /// The source file could not be read.
    #[error(transparent)]
    SourceRead(#[from] SourceReadError),

    /// The test program could not be launched.
    #[error(transparent)]
    Exec(#[from] RunExecError),
}

impl HarnessRunError {
    /// Returns the exit code the process should terminate with.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::SourceRead(err) => err.process_exit_code(),
            Self::Exec(err) => err.process_exit_code(),
        }
    }
}

/// An error that occurred while parsing a harness profile.
#[derive(Debug, Error)]
#[error("failed to parse harness profile at `{profile_file}`")]
#[non_exhaustive]
pub struct ProfileParseError {
    profile_file: Utf8PathBuf,
    #[source]
    kind: ProfileParseErrorKind,
}

impl ProfileParseError {
    pub(crate) fn new(profile_file: impl Into<Utf8PathBuf>, kind: ProfileParseErrorKind) -> Self {
        Self {
            profile_file: profile_file.into(),
            kind,
        }
    }

    /// Returns the profile file that failed to parse.
    pub fn profile_file(&self) -> &Utf8PathBuf {
        &self.profile_file
    }

    /// Returns the kind of error that occurred.
    pub fn kind(&self) -> &ProfileParseErrorKind {
        &self.kind
    }
}

/// The kind of error in a [`ProfileParseError`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProfileParseErrorKind {
    /// The profile could not be read or converted into a configuration tree.
    #[error(transparent)]
    BuildError(Box<ConfigError>),

    /// The profile did not match the expected schema.
    #[error(transparent)]
    DeserializeError(Box<ConfigError>),

    /// The profile defines no runs.
    #[error("profile does not define any `[[run]]` tables")]
    NoRuns,

    /// A run has an empty command.
    #[error("run {index} has an empty command")]
    EmptyCommand {
        /// The zero-based index of the run.
        index: usize,
    },

    /// A `matched` check did not specify a label.
    #[error("run {index}: `matched` check requires a `label`")]
    MissingCheckLabel {
        /// The zero-based index of the run.
        index: usize,
    },

    /// A `matched` check names a label that none of the run's matchers record.
    #[error("run {index}: `matched` check uses unknown label `{label}`")]
    UnknownCheckLabel {
        /// The zero-based index of the run.
        index: usize,

        /// The unknown label.
        label: String,
    },

    /// A matcher failed to compile.
    #[error("run {index}: matcher error")]
    MatcherError {
        /// The zero-based index of the run.
        index: usize,

        /// The underlying error.
        #[source]
        err: MatcherBuildError,
    },

    /// A run has no source file, and one could not be derived.
    #[error("run {index}: source file error")]
    SourcePathError {
        /// The zero-based index of the run.
        index: usize,

        /// The underlying error.
        #[source]
        err: SourcePathError,
    },
}

/// An anomaly found while scanning a test program's output.
///
/// Structural errors are collected rather than raised; callers decide whether they are fatal.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum StructuralError {
    /// An output line matched none of the matchers.
    UnmatchedLine {
        /// The stream the line was read from.
        stream: OutputStream,

        /// The normalized line.
        line: Vec<u8>,
    },

    /// A test name was classified more than once in the same stream.
    DuplicateTest {
        /// The stream the duplicate was found in.
        stream: OutputStream,

        /// The test name.
        name: String,

        /// The label that was recorded first, and kept.
        first_label: String,

        /// The label of the duplicate match.
        label: String,
    },

    /// The exit code or stderr output did not satisfy the run's exit policy.
    Policy(PolicyViolation),
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnmatchedLine { stream, line } => {
                write!(f, "unmatched {stream} line: {:?}", line.as_bstr())
            }
            Self::DuplicateTest {
                stream,
                name,
                first_label,
                label,
            } => {
                write!(f, "test `{name}` found twice on {stream} ")?;
                if first_label == label {
                    write!(f, "(both `{label}`)")
                } else {
                    write!(f, "(first `{first_label}`, then `{label}`)")
                }
            }
            Self::Policy(violation) => write!(f, "{violation}"),
        }
    }
}

impl std::error::Error for StructuralError {}

/// A mismatch between a test program's exit status and what its run mode expects.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind} (command `{command}`, exit code {observed})")]
pub struct PolicyViolation {
    command: String,
    observed: i32,
    kind: PolicyViolationKind,
}

impl PolicyViolation {
    pub(crate) fn new(command: impl Into<String>, observed: i32, kind: PolicyViolationKind) -> Self {
        Self {
            command: command.into(),
            observed,
            kind,
        }
    }

    /// Returns the command line that was run.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Returns the exit code the test program terminated with.
    pub fn observed(&self) -> i32 {
        self.observed
    }

    /// Returns the kind of violation.
    pub fn kind(&self) -> &PolicyViolationKind {
        &self.kind
    }

    /// Returns the exit code that should be surfaced for this violation.
    ///
    /// A program that should have failed but succeeded surfaces the expected sentinel, not 0.
    pub fn exit_code(&self) -> i32 {
        match self.kind {
            PolicyViolationKind::WroteToStderr => ZerorunExitCode::STDERR_WRITTEN,
            PolicyViolationKind::Failed => self.observed,
            PolicyViolationKind::DidNotFail { expected } => expected,
            PolicyViolationKind::WrongCode { .. } => self.observed,
        }
    }
}

/// The kind of a [`PolicyViolation`].
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum PolicyViolationKind {
    /// The test program wrote to stderr in plain mode.
    #[error("test program wrote to stderr")]
    WroteToStderr,

    /// The test program exited with a nonzero code in plain mode.
    #[error("test program failed")]
    Failed,

    /// The test program was expected to fail, but exited successfully.
    #[error("test program should have failed but did not")]
    DidNotFail {
        /// The expected exit code.
        expected: i32,
    },

    /// The test program failed, but not with the expected exit code.
    #[error("test program failed but not with exit code {expected}")]
    WrongCode {
        /// The expected exit code.
        expected: i32,
    },
}
