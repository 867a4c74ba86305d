// Copyright (c) The zerorun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exit-code policies for the supported run modes.

use crate::errors::PolicyViolationKind;
use serde::Deserialize;
use std::{fmt, str::FromStr};

/// The exit code a program uses to report that it ran out of memory.
#[cfg(unix)]
pub const NOMEM_EXIT_CODE: i32 = libc::ENOMEM;

/// The exit code a program uses to report that it ran out of memory.
#[cfg(not(unix))]
pub const NOMEM_EXIT_CODE: i32 = 12;

/// The exit code of a program that aborted with `exit(-1)`.
pub const ABORT_EXIT_CODE: i32 = 255;

/// How a test program is expected to terminate.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// The program must exit with 0 and write nothing to stderr.
    #[default]
    Plain,

    /// The program must fail with a specific exit code (by default, out-of-memory).
    ExpectFailure,

    /// The program must terminate abnormally with a specific exit code (by default, 255).
    ExpectAbort,
}

impl RunMode {
    /// Returns the string values this mode can be parsed from.
    pub fn variants() -> &'static [&'static str] {
        &["plain", "expect-failure", "expect-abort"]
    }

    /// Returns the sentinel exit code this mode expects by default, if any.
    pub fn default_expected_code(self) -> Option<i32> {
        match self {
            Self::Plain => None,
            Self::ExpectFailure => Some(NOMEM_EXIT_CODE),
            Self::ExpectAbort => Some(ABORT_EXIT_CODE),
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => f.write_str("plain"),
            Self::ExpectFailure => f.write_str("expect-failure"),
            Self::ExpectAbort => f.write_str("expect-abort"),
        }
    }
}

impl FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "plain" => Ok(Self::Plain),
            "expect-failure" => Ok(Self::ExpectFailure),
            "expect-abort" => Ok(Self::ExpectAbort),
            other => Err(format!(
                "unrecognized run mode: {other}\n(known values: {})",
                Self::variants().join(", ")
            )),
        }
    }
}

/// An exit-code policy: a run mode plus the exit code it expects.
///
/// Evaluating a policy is a pure function of the exit code and the captured stderr bytes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ExitPolicy {
    mode: RunMode,
    expected_code: i32,
}

impl ExitPolicy {
    /// Plain mode: any nonzero exit code and any stderr output are violations.
    pub fn plain() -> Self {
        Self {
            mode: RunMode::Plain,
            expected_code: 0,
        }
    }

    /// Expected-failure mode, failing with `expected_code`.
    pub fn expect_failure(expected_code: i32) -> Self {
        Self {
            mode: RunMode::ExpectFailure,
            expected_code,
        }
    }

    /// Expected-abnormal-termination mode, terminating with `expected_code`.
    pub fn expect_abort(expected_code: i32) -> Self {
        Self {
            mode: RunMode::ExpectAbort,
            expected_code,
        }
    }

    /// Creates a policy for `mode`, using the mode's default sentinel unless `expected_code` is
    /// given. The expected code is ignored in plain mode.
    pub fn for_mode(mode: RunMode, expected_code: Option<i32>) -> Self {
        match mode {
            RunMode::Plain => Self::plain(),
            RunMode::ExpectFailure => {
                Self::expect_failure(expected_code.unwrap_or(NOMEM_EXIT_CODE))
            }
            RunMode::ExpectAbort => Self::expect_abort(expected_code.unwrap_or(ABORT_EXIT_CODE)),
        }
    }

    /// Returns the run mode.
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Returns the exit code this policy expects.
    pub fn expected_code(&self) -> i32 {
        self.expected_code
    }

    /// Returns true if stderr is expected to carry diagnostics that should be classified.
    ///
    /// In plain mode, stderr output is a violation in itself.
    pub fn scans_stderr(&self) -> bool {
        self.mode != RunMode::Plain
    }

    /// Evaluates an exit code and the captured stderr against this policy.
    pub fn evaluate(&self, exit_code: i32, stderr: &[u8]) -> Vec<PolicyViolationKind> {
        let mut violations = Vec::new();
        match self.mode {
            RunMode::Plain => {
                if !stderr.is_empty() {
                    violations.push(PolicyViolationKind::WroteToStderr);
                }
                if exit_code != 0 {
                    violations.push(PolicyViolationKind::Failed);
                }
            }
            RunMode::ExpectFailure | RunMode::ExpectAbort => {
                if exit_code == 0 {
                    violations.push(PolicyViolationKind::DidNotFail {
                        expected: self.expected_code,
                    });
                } else if exit_code != self.expected_code {
                    violations.push(PolicyViolationKind::WrongCode {
                        expected: self.expected_code,
                    });
                }
            }
        }
        violations
    }
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self::plain()
    }
}
