// Copyright (c) The zerorun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Harness profiles: one or more runs, each with its own command, exit policy, matchers and
//! checks.
//!
//! A profile is a TOML file:
//!
//! ```toml
//! strict = true
//!
//! [[run]]
//! name = "elm-fail with panic"
//! command = ["./elm-fail", "--panic"]
//! source = "elm.c"
//! mode = "expect-abort"
//! stderr-matchers = [
//!     { label = "LOGFAILED", pattern = '^LOGFAILED \(in test_elm.c:(?P<n>\w+)\)' },
//! ]
//!
//! [[run.check]]
//! kind = "matched"
//! label = "LOGFAILED"
//! tests = ["test_logging", "main"]
//! ```

use crate::{
    echo::OutputEcho,
    errors::{HarnessRunError, ProfileParseError, ProfileParseErrorKind},
    matcher::{MatchEffect, MatcherSet, MatcherSpec},
    policy::{ExitPolicy, RunMode},
    reconcile::{CheckKind, CheckSpec, Expected, Results},
    run::{RunConfig, RunResults},
    source::{SourceSet, default_source_pattern, derive_source_path, read_source},
};
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, File, FileFormat};
use serde::Deserialize;
use std::collections::BTreeSet;

/// A parsed harness profile.
#[derive(Clone, Debug)]
pub struct HarnessProfile {
    strict: bool,
    runs: Vec<RunSpec>,
    unknown_keys: BTreeSet<String>,
}

impl HarnessProfile {
    /// Creates a profile out of runs built in code.
    pub fn new(strict: bool, runs: Vec<RunSpec>) -> Self {
        Self {
            strict,
            runs,
            unknown_keys: BTreeSet::new(),
        }
    }

    /// Reads and parses a profile from `profile_file`.
    ///
    /// Unknown keys are not errors: they are reported through `tracing` and made available via
    /// [`Self::unknown_keys`].
    pub fn from_path(profile_file: &Utf8Path) -> Result<Self, ProfileParseError> {
        let (deserialized, unknown_keys) = Self::build_and_deserialize(profile_file)
            .map_err(|kind| ProfileParseError::new(profile_file, kind))?;

        if !unknown_keys.is_empty() {
            tracing::warn!(
                "ignoring unknown keys in harness profile `{profile_file}`: {}",
                unknown_keys
                    .iter()
                    .map(|key| format!("`{key}`"))
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }

        let mut profile = Self::compile(deserialized)
            .map_err(|kind| ProfileParseError::new(profile_file, kind))?;
        profile.unknown_keys = unknown_keys;
        tracing::debug!(
            "loaded {} runs from harness profile `{profile_file}`",
            profile.runs.len()
        );
        Ok(profile)
    }

    /// Returns true if structural errors fail the runs they occur in.
    pub fn strict(&self) -> bool {
        self.strict
    }

    /// Returns the runs, in the order they are executed.
    pub fn runs(&self) -> &[RunSpec] {
        &self.runs
    }

    /// Returns the keys in the profile that were not recognized.
    pub fn unknown_keys(&self) -> &BTreeSet<String> {
        &self.unknown_keys
    }

    fn build_and_deserialize(
        profile_file: &Utf8Path,
    ) -> Result<(ProfileDeserialize, BTreeSet<String>), ProfileParseErrorKind> {
        let config = Config::builder()
            .add_source(File::new(profile_file.as_str(), FileFormat::Toml))
            .build()
            .map_err(|error| ProfileParseErrorKind::BuildError(Box::new(error)))?;

        let mut unknown_keys = BTreeSet::new();
        let deserialized: ProfileDeserialize =
            serde_ignored::deserialize(config, |path: serde_ignored::Path| {
                unknown_keys.insert(path.to_string());
            })
            .map_err(|error| ProfileParseErrorKind::DeserializeError(Box::new(error)))?;

        Ok((deserialized, unknown_keys))
    }

    fn compile(deserialized: ProfileDeserialize) -> Result<Self, ProfileParseErrorKind> {
        if deserialized.run.is_empty() {
            return Err(ProfileParseErrorKind::NoRuns);
        }

        let runs = deserialized
            .run
            .into_iter()
            .enumerate()
            .map(|(index, run)| run.compile(index))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            strict: deserialized.strict,
            runs,
            unknown_keys: BTreeSet::new(),
        })
    }
}

/// One run in a harness profile.
#[derive(Clone, Debug)]
pub struct RunSpec {
    name: String,
    config: RunConfig,
    source: Utf8PathBuf,
    checks: Vec<CheckSpec>,
}

impl RunSpec {
    /// Creates a run that applies the default checks.
    pub fn new(name: impl Into<String>, config: RunConfig, source: impl Into<Utf8PathBuf>) -> Self {
        Self {
            name: name.into(),
            config,
            source: source.into(),
            checks: CheckSpec::defaults(&BTreeSet::new()),
        }
    }

    /// Replaces the checks applied after the run.
    pub fn with_checks(mut self, checks: Vec<CheckSpec>) -> Self {
        self.checks = checks;
        self
    }

    /// Returns the heading for this run.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the run configuration.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Returns the source file the test names are read from.
    pub fn source(&self) -> &Utf8Path {
        &self.source
    }

    /// Returns the checks applied after the run.
    pub fn checks(&self) -> &[CheckSpec] {
        &self.checks
    }

    /// Scans the source file, then runs the test program and classifies its output.
    pub fn run(&self, echo: &mut dyn OutputEcho) -> Result<HarnessRun, HarnessRunError> {
        let source = read_source(&self.source, &default_source_pattern())?;
        let results = self.config.run(echo)?;
        Ok(HarnessRun {
            source,
            results,
            checks: self.checks.clone(),
        })
    }
}

/// The outcome of executing a [`RunSpec`], ready to be reconciled.
#[derive(Clone, Debug)]
pub struct HarnessRun {
    source: SourceSet,
    results: RunResults,
    checks: Vec<CheckSpec>,
}

impl HarnessRun {
    /// Creates a harness run out of parts obtained elsewhere.
    pub fn new(source: SourceSet, results: RunResults, checks: Vec<CheckSpec>) -> Self {
        Self {
            source,
            results,
            checks,
        }
    }

    /// Returns the tests declared in the source.
    pub fn source(&self) -> &SourceSet {
        &self.source
    }

    /// Returns the classified output of the run.
    pub fn results(&self) -> &RunResults {
        &self.results
    }

    /// Applies the run's checks, in order.
    pub fn reconcile(&self) -> Results<'_> {
        let mut results = Results::new(&self.source, &self.results);
        results.apply_all(&self.checks);
        results
    }
}

fn default_strict() -> bool {
    true
}

fn default_echo() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ProfileDeserialize {
    #[serde(default = "default_strict")]
    strict: bool,
    #[serde(default)]
    run: Vec<RunDeserialize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RunDeserialize {
    #[serde(default)]
    name: Option<String>,
    command: Vec<String>,
    #[serde(default)]
    source: Option<Utf8PathBuf>,
    #[serde(default)]
    mode: RunMode,
    #[serde(default)]
    expected_code: Option<i32>,
    #[serde(default)]
    stdout_matchers: Vec<MatcherDeserialize>,
    #[serde(default)]
    stderr_matchers: Vec<MatcherDeserialize>,
    #[serde(default)]
    not_passing: BTreeSet<String>,
    #[serde(default)]
    check: Vec<CheckDeserialize>,
}

impl RunDeserialize {
    fn compile(self, index: usize) -> Result<RunSpec, ProfileParseErrorKind> {
        let Some(program) = self.command.first() else {
            return Err(ProfileParseErrorKind::EmptyCommand { index });
        };

        let source = match self.source {
            Some(source) => source,
            None => derive_source_path(program)
                .map_err(|err| ProfileParseErrorKind::SourcePathError { index, err })?,
        };

        let mut config = RunConfig::new(
            self.command.iter().cloned(),
            ExitPolicy::for_mode(self.mode, self.expected_code),
        );
        if !self.stdout_matchers.is_empty() {
            config = config.with_stdout_matchers(compile_matchers(self.stdout_matchers, index)?);
        }
        if !self.stderr_matchers.is_empty() {
            config = config.with_stderr_matchers(compile_matchers(self.stderr_matchers, index)?);
        }

        let checks = if self.check.is_empty() {
            CheckSpec::defaults(&self.not_passing)
        } else {
            self.check
                .into_iter()
                .map(|check| check.compile(index))
                .collect::<Result<Vec<_>, _>>()?
        };
        for check in &checks {
            if let CheckKind::Matched { label } = &check.kind
                && !config.stdout_matchers().has_label(label)
                && !config
                    .stderr_matchers()
                    .is_some_and(|matchers| matchers.has_label(label))
            {
                return Err(ProfileParseErrorKind::UnknownCheckLabel {
                    index,
                    label: label.clone(),
                });
            }
        }

        let name = self.name.unwrap_or_else(|| config.command_line());
        Ok(RunSpec {
            name,
            config,
            source,
            checks,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct MatcherDeserialize {
    label: String,
    pattern: String,
    #[serde(default = "default_echo")]
    echo: bool,
}

fn compile_matchers(
    matchers: Vec<MatcherDeserialize>,
    index: usize,
) -> Result<MatcherSet, ProfileParseErrorKind> {
    MatcherSet::new(matchers.into_iter().map(|m| {
        let spec = MatcherSpec::new(m.label, m.pattern);
        if m.echo {
            spec
        } else {
            spec.with_effect(MatchEffect::Silent)
        }
    }))
    .map_err(|err| ProfileParseErrorKind::MatcherError { index, err })
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum CheckKindDeserialize {
    Found,
    Run,
    Matched,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct CheckDeserialize {
    kind: CheckKindDeserialize,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    exclude: BTreeSet<String>,
    #[serde(default)]
    tests: Option<BTreeSet<String>>,
}

impl CheckDeserialize {
    fn compile(self, index: usize) -> Result<CheckSpec, ProfileParseErrorKind> {
        let kind = match (self.kind, self.label) {
            (CheckKindDeserialize::Found, _) => CheckKind::Found,
            (CheckKindDeserialize::Run, _) => CheckKind::Run,
            (CheckKindDeserialize::Matched, Some(label)) => CheckKind::Matched { label },
            (CheckKindDeserialize::Matched, None) => {
                return Err(ProfileParseErrorKind::MissingCheckLabel { index });
            }
        };

        // Without an explicit list, `run` checks the source and the others check what ran.
        let expected = match (self.tests, &kind) {
            (Some(tests), _) => Expected::Tests(&tests - &self.exclude),
            (None, CheckKind::Run) => Expected::SourceExcept(self.exclude),
            (None, CheckKind::Found | CheckKind::Matched { .. }) => {
                Expected::RanExcept(self.exclude)
            }
        };

        Ok(CheckSpec { kind, expected })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{ABORT_EXIT_CODE, NOMEM_EXIT_CODE};
    use camino_tempfile::Utf8TempDir;
    use color_eyre::eyre::Result;
    use indoc::indoc;
    use maplit::btreeset;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn write_profile(dir: &Utf8TempDir, contents: &str) -> Result<Utf8PathBuf> {
        let path = dir.path().join("zerorun.toml");
        std::fs::write(&path, contents)?;
        Ok(path)
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn elm_profile() -> Result<()> {
        let dir = Utf8TempDir::new()?;
        let path = write_profile(
            &dir,
            indoc! {r#"
                [[run]]
                name = "elm-test with panic"
                command = ["./elm-test", "--panic"]
                mode = "expect-abort"
                stderr-matchers = [
                    { label = "NOMEM", pattern = '^NOMEM \(in test_elm.c:(?P<n>test_malloc+)' },
                    { label = "PANIC", pattern = '^PANIC! \(test_elm.c:[0-9]+ in (?P<n>main)\)', echo = false },
                ]

                [[run.check]]
                kind = "found"
                exclude = ["main"]

                [[run.check]]
                kind = "run"
                exclude = ["test_malloc"]

                [[run.check]]
                kind = "matched"
                label = "PANIC"
                tests = ["main"]

                [[run]]
                command = ["./elm-fail"]
                source = "elm.c"
                mode = "expect-failure"
                not-passing = ["test_logging"]
            "#},
        )?;

        let profile = HarnessProfile::from_path(&path)?;
        assert!(profile.strict(), "strict by default");
        assert!(profile.unknown_keys().is_empty());
        assert_eq!(profile.runs().len(), 2);

        let panic_run = &profile.runs()[0];
        assert_eq!(panic_run.name(), "elm-test with panic");
        assert_eq!(panic_run.source(), "./elm.c");
        assert_eq!(panic_run.config().command(), &["./elm-test", "--panic"]);
        assert_eq!(panic_run.config().policy().mode(), RunMode::ExpectAbort);
        assert_eq!(panic_run.config().policy().expected_code(), ABORT_EXIT_CODE);
        let stderr_matchers = panic_run.config().stderr_matchers().unwrap();
        assert!(stderr_matchers.has_label("NOMEM"));
        assert!(matches!(
            stderr_matchers.matchers()[1].effect(),
            MatchEffect::Silent
        ));
        assert!(
            panic_run.config().stdout_matchers().has_label("FAILED"),
            "failure modes match FAILED lines by default"
        );
        assert_eq!(
            panic_run.checks(),
            &[
                CheckSpec {
                    kind: CheckKind::Found,
                    expected: Expected::RanExcept(set(&["main"])),
                },
                CheckSpec {
                    kind: CheckKind::Run,
                    expected: Expected::SourceExcept(set(&["test_malloc"])),
                },
                CheckSpec {
                    kind: CheckKind::Matched {
                        label: "PANIC".to_owned()
                    },
                    expected: Expected::Tests(set(&["main"])),
                },
            ]
        );

        let fail_run = &profile.runs()[1];
        assert_eq!(fail_run.name(), "./elm-fail", "name defaults to the command line");
        assert_eq!(fail_run.source(), "elm.c");
        assert_eq!(fail_run.config().policy().expected_code(), NOMEM_EXIT_CODE);
        assert_eq!(fail_run.checks(), CheckSpec::defaults(&set(&["test_logging"])));

        Ok(())
    }

    #[test]
    fn lenient_profile_with_unknown_keys() -> Result<()> {
        let dir = Utf8TempDir::new()?;
        let path = write_profile(
            &dir,
            indoc! {r#"
                strict = false
                colour = "always"

                [[run]]
                command = ["./alpha-test"]
                timeout = 30
            "#},
        )?;

        let profile = HarnessProfile::from_path(&path)?;
        assert!(!profile.strict());
        assert_eq!(
            profile.unknown_keys(),
            &btreeset! {"colour".to_owned(), "run.0.timeout".to_owned()}
        );
        Ok(())
    }

    #[test_case(
        "strict = true\n",
        |kind| matches!(kind, ProfileParseErrorKind::NoRuns);
        "no runs"
    )]
    #[test_case(
        "[[run]]\ncommand = []\n",
        |kind| matches!(kind, ProfileParseErrorKind::EmptyCommand { index: 0 });
        "empty command"
    )]
    #[test_case(
        "[[run]]\ncommand = [\"./alpha\"]\n",
        |kind| matches!(kind, ProfileParseErrorKind::SourcePathError { index: 0, .. });
        "underivable source"
    )]
    #[test_case(
        "[[run]]\ncommand = [\"./a-test\"]\n[[run]]\ncommand = [\"./b-test\"]\n\
         stdout-matchers = [{ label = \"passed\", pattern = 'passed: (test\\S*)' }]\n",
        |kind| matches!(kind, ProfileParseErrorKind::MatcherError { index: 1, .. });
        "matcher without named group"
    )]
    #[test_case(
        "[[run]]\ncommand = [\"./a-test\"]\n[[run.check]]\nkind = \"matched\"\n",
        |kind| matches!(kind, ProfileParseErrorKind::MissingCheckLabel { index: 0 });
        "matched check without label"
    )]
    #[test_case(
        "[[run]]\ncommand = [\"./a-test\"]\n[[run.check]]\nkind = \"matched\"\nlabel = \"NOMEM\"\n",
        |kind| matches!(
            kind,
            ProfileParseErrorKind::UnknownCheckLabel { index: 0, label } if label == "NOMEM"
        );
        "matched check with unknown label"
    )]
    #[test_case(
        "[[run]]\ncommand = [\"./a-test\"]\nmode = \"panic\"\n",
        |kind| matches!(kind, ProfileParseErrorKind::DeserializeError(_));
        "unknown mode"
    )]
    #[test_case(
        "[[run]\n",
        |kind| matches!(kind, ProfileParseErrorKind::BuildError(_));
        "invalid toml"
    )]
    fn invalid_profiles(contents: &str, check: fn(&ProfileParseErrorKind) -> bool) {
        let dir = Utf8TempDir::new().unwrap();
        let path = write_profile(&dir, contents).unwrap();
        let err = HarnessProfile::from_path(&path).unwrap_err();
        assert_eq!(err.profile_file(), &path);
        assert!(check(err.kind()), "unexpected error kind: {:?}", err.kind());
    }

    #[test]
    fn explicit_tests_minus_exclusions() {
        let check = CheckDeserialize {
            kind: CheckKindDeserialize::Matched,
            label: Some("LOGFAILED".to_owned()),
            exclude: set(&["main"]),
            tests: Some(set(&["main", "test_logging"])),
        };
        assert_eq!(
            check.compile(0).unwrap().expected,
            Expected::Tests(set(&["test_logging"]))
        );
    }
}
