// Copyright (c) The zerorun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cross-checking the tests a program ran against the tests its source declares.
//!
//! Every check reports its violations and carries on. [`Results::status`] holds the code of the
//! most recent failing check: codes are replaced, never summed.

use crate::{
    exit_codes::ZerorunExitCode, matcher::PASSED_LABEL, run::RunResults, source::SourceSet,
};
use itertools::Itertools;
use std::{collections::BTreeSet, fmt};

/// Which cross-check to perform.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CheckKind {
    /// Every expected test must be declared in the source.
    Found,

    /// Every expected test must have run.
    Run,

    /// Every expected test must have been classified under `label`.
    Matched {
        /// The outcome label.
        label: String,
    },
}

impl fmt::Display for CheckKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found => f.write_str("found"),
            Self::Run => f.write_str("run"),
            Self::Matched { label } => write!(f, "matched `{label}`"),
        }
    }
}

/// The set of tests a configured check expects.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Expected {
    /// Every test that ran, except the listed ones.
    RanExcept(BTreeSet<String>),

    /// Every test declared in the source, except the listed ones.
    SourceExcept(BTreeSet<String>),

    /// Exactly the listed tests.
    Tests(BTreeSet<String>),
}

/// A configured check: what to check, and against which tests.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CheckSpec {
    /// The check to perform.
    pub kind: CheckKind,

    /// The tests the check expects.
    pub expected: Expected,
}

impl CheckSpec {
    /// Returns the checks used when none are configured:
    ///
    /// * every test that ran is declared in the source
    /// * every test declared in the source ran
    /// * every test that ran passed, except `not_passing`
    pub fn defaults(not_passing: &BTreeSet<String>) -> Vec<Self> {
        vec![
            Self {
                kind: CheckKind::Found,
                expected: Expected::RanExcept(BTreeSet::new()),
            },
            Self {
                kind: CheckKind::Run,
                expected: Expected::SourceExcept(BTreeSet::new()),
            },
            Self {
                kind: CheckKind::Matched {
                    label: PASSED_LABEL.to_owned(),
                },
                expected: Expected::RanExcept(not_passing.clone()),
            },
        ]
    }
}

/// A failed check and the tests that failed it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CheckViolation {
    kind: CheckKind,
    missing: BTreeSet<String>,
}

impl CheckViolation {
    /// Returns the check that failed.
    pub fn kind(&self) -> &CheckKind {
        &self.kind
    }

    /// Returns the tests that failed the check.
    pub fn missing(&self) -> &BTreeSet<String> {
        &self.missing
    }
}

impl fmt::Display for CheckViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tests = self.missing.iter().map(|name| format!("`{name}`")).join(", ");
        match &self.kind {
            CheckKind::Found => write!(f, "tests {tests} were not found in the source"),
            CheckKind::Run => write!(f, "tests {tests} did not run"),
            CheckKind::Matched { label } => write!(f, "tests {tests} did not match `{label}`"),
        }
    }
}

/// The reconciled view of one run: the source's tests, the classified output, and a status.
#[derive(Debug)]
pub struct Results<'a> {
    source: &'a SourceSet,
    run: &'a RunResults,
    ran: BTreeSet<String>,
    status: i32,
    violations: Vec<CheckViolation>,
}

impl<'a> Results<'a> {
    /// Creates a new set of results with a zero status.
    pub fn new(source: &'a SourceSet, run: &'a RunResults) -> Self {
        Self {
            source,
            run,
            ran: run.ran(),
            status: ZerorunExitCode::OK,
            violations: Vec::new(),
        }
    }

    /// Returns the tests declared in the source.
    pub fn source(&self) -> &BTreeSet<String> {
        self.source.as_set()
    }

    /// Returns the tests observed on any output stream.
    pub fn ran(&self) -> &BTreeSet<String> {
        &self.ran
    }

    /// Returns the tests classified under `label`.
    pub fn matched(&self, label: &str) -> BTreeSet<String> {
        self.run.matched(label)
    }

    /// Returns the code of the most recent failing check, or 0.
    pub fn status(&self) -> i32 {
        self.status
    }

    /// Returns every violation reported so far, in order.
    pub fn violations(&self) -> &[CheckViolation] {
        &self.violations
    }

    /// Reports tests in `expected` that are not declared in the source.
    pub fn check_found(&mut self, expected: &BTreeSet<String>) -> BTreeSet<String> {
        let missing = expected.difference(self.source.as_set()).cloned().collect();
        self.report(CheckKind::Found, missing)
    }

    /// Reports tests in `expected` that did not run.
    pub fn check_run(&mut self, expected: &BTreeSet<String>) -> BTreeSet<String> {
        let missing = expected.difference(&self.ran).cloned().collect();
        self.report(CheckKind::Run, missing)
    }

    /// Reports tests in `expected` that were not classified under `label`.
    pub fn check_matched(&mut self, label: &str, expected: &BTreeSet<String>) -> BTreeSet<String> {
        let matched = self.matched(label);
        let missing = expected.difference(&matched).cloned().collect();
        self.report(
            CheckKind::Matched {
                label: label.to_owned(),
            },
            missing,
        )
    }

    /// Runs a configured check.
    pub fn apply(&mut self, check: &CheckSpec) -> BTreeSet<String> {
        let expected = match &check.expected {
            Expected::RanExcept(exclude) => self.ran.difference(exclude).cloned().collect(),
            Expected::SourceExcept(exclude) => {
                self.source.as_set().difference(exclude).cloned().collect()
            }
            Expected::Tests(tests) => tests.clone(),
        };
        match &check.kind {
            CheckKind::Found => self.check_found(&expected),
            CheckKind::Run => self.check_run(&expected),
            CheckKind::Matched { label } => self.check_matched(label, &expected),
        }
    }

    /// Runs every check in order. A failing check never stops the ones after it.
    pub fn apply_all<'c>(&mut self, checks: impl IntoIterator<Item = &'c CheckSpec>) -> i32 {
        for check in checks {
            self.apply(check);
        }
        self.status
    }

    fn report(&mut self, kind: CheckKind, missing: BTreeSet<String>) -> BTreeSet<String> {
        if !missing.is_empty() {
            let violation = CheckViolation {
                kind,
                missing: missing.clone(),
            };
            tracing::warn!("{violation}");
            self.violations.push(violation);
            self.status = ZerorunExitCode::CHECK_FAILED;
        }
        missing
    }
}
