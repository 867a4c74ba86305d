// Copyright (c) The zerorun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use crate::output::{NO_HEADING_TARGET, StderrStyles};
use owo_colors::OwoColorize;
use std::error::Error;
use thiserror::Error;
use zerorun_runner::{
    errors::{HarnessRunError, PolicyViolation, ProfileParseError, SourcePathError},
    exit_codes::ZerorunExitCode,
};

pub(crate) type Result<T, E = ExpectedError> = std::result::Result<T, E>;

// Note that the #[error()] strings are mostly placeholder messages -- the expected way to print out
// errors is with the display_to_stderr method, which colorizes errors.

/// An error that ends a zerorun invocation early.
#[derive(Debug, Error)]
#[doc(hidden)]
pub enum ExpectedError {
    #[error("profile parse error")]
    ProfileParseError {
        #[from]
        err: ProfileParseError,
    },
    #[error("source path error")]
    SourcePathError {
        #[from]
        err: SourcePathError,
    },
    #[error("harness run error")]
    HarnessRunError {
        run: String,
        #[source]
        err: HarnessRunError,
    },
    #[error("policy violation")]
    PolicyViolation {
        run: String,
        #[source]
        err: PolicyViolation,
    },
    #[error("output scan failed")]
    ScanFailed { run: String, error_count: usize },
}

impl ExpectedError {
    pub(crate) fn harness_run_error(run: impl Into<String>, err: HarnessRunError) -> Self {
        Self::HarnessRunError {
            run: run.into(),
            err,
        }
    }

    pub(crate) fn policy_violation(run: impl Into<String>, err: PolicyViolation) -> Self {
        Self::PolicyViolation {
            run: run.into(),
            err,
        }
    }

    pub(crate) fn scan_failed(run: impl Into<String>, error_count: usize) -> Self {
        Self::ScanFailed {
            run: run.into(),
            error_count,
        }
    }

    /// Returns the exit code for the process.
    pub fn process_exit_code(&self) -> i32 {
        match self {
            Self::ProfileParseError { .. } | Self::SourcePathError { .. } => {
                ZerorunExitCode::SETUP_ERROR
            }
            Self::HarnessRunError { err, .. } => err.process_exit_code(),
            Self::PolicyViolation { err, .. } => err.exit_code(),
            Self::ScanFailed { .. } => ZerorunExitCode::SCAN_FAILED,
        }
    }

    /// Displays this error to stderr.
    pub fn display_to_stderr(&self, styles: &StderrStyles) {
        let mut next_error = match &self {
            Self::ProfileParseError { err } => {
                tracing::error!(
                    "failed to parse harness profile at `{}`",
                    err.profile_file().style(styles.bold)
                );
                err.source()
            }
            Self::SourcePathError { err } => {
                tracing::error!("{err}");
                None
            }
            Self::HarnessRunError { run, err } => {
                tracing::error!("[{}] {err}", run.style(styles.bold));
                err.source()
            }
            Self::PolicyViolation { run, err } => {
                tracing::error!("[{}] {err}", run.style(styles.bold));
                None
            }
            Self::ScanFailed { run, error_count } => {
                let errors = if *error_count == 1 { "error" } else { "errors" };
                tracing::error!(
                    "[{}] {error_count} {errors} found scanning output",
                    run.style(styles.bold),
                );
                None
            }
        };

        while let Some(err) = next_error {
            tracing::error!(target: NO_HEADING_TARGET, "\nCaused by:\n  {}", err);
            next_error = err.source();
        }
    }
}
