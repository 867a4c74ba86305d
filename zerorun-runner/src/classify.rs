// Copyright (c) The zerorun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Classification of a test program's output into test outcomes.

use crate::{
    echo::OutputEcho, errors::StructuralError, matcher::MatcherSet, normalize::normalize_line,
};
use indexmap::{IndexMap, map::Entry};
use std::fmt;

/// The output stream a line was read from.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OutputStream {
    /// Standard output.
    Stdout,

    /// Standard error.
    Stderr,
}

impl fmt::Display for OutputStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// The outcome of scanning one output stream: a mapping from test name to outcome label, and
/// the structural errors found along the way.
///
/// Each name carries exactly one label: the label of the first line it was matched on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClassifiedRun {
    stream: OutputStream,
    // Ordered by first observation.
    outcomes: IndexMap<String, String>,
    errors: Vec<StructuralError>,
}

impl ClassifiedRun {
    /// Creates an empty classification for `stream`.
    pub fn new(stream: OutputStream) -> Self {
        Self {
            stream,
            outcomes: IndexMap::new(),
            errors: Vec::new(),
        }
    }

    /// Returns the stream that was scanned.
    pub fn stream(&self) -> OutputStream {
        self.stream
    }

    /// Returns the label recorded for `name`, if it was observed.
    pub fn label_for(&self, name: &str) -> Option<&str> {
        self.outcomes.get(name).map(String::as_str)
    }

    /// Iterates over `(name, label)` pairs in the order the names were first observed.
    pub fn outcomes(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.outcomes
            .iter()
            .map(|(name, label)| (name.as_str(), label.as_str()))
    }

    /// Iterates over every observed test name.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.outcomes.keys().map(String::as_str)
    }

    /// Iterates over the names classified under `label`.
    pub fn names_with_label<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.outcomes
            .iter()
            .filter(move |(_, l)| *l == label)
            .map(|(name, _)| name.as_str())
    }

    /// Returns the number of distinct test names observed.
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Returns true if no test names were observed.
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Returns the structural errors found while scanning, in the order they were found.
    pub fn errors(&self) -> &[StructuralError] {
        &self.errors
    }

    fn record(&mut self, name: String, label: &str) {
        match self.outcomes.entry(name) {
            Entry::Vacant(entry) => {
                entry.insert(label.to_owned());
            }
            Entry::Occupied(entry) => {
                self.errors.push(StructuralError::DuplicateTest {
                    stream: self.stream,
                    name: entry.key().clone(),
                    first_label: entry.get().clone(),
                    label: label.to_owned(),
                });
            }
        }
    }
}

/// Scans output lines through `matchers`.
///
/// Each line is normalized first, and blank lines are skipped. The scan never stops early:
/// unmatched lines and duplicate names are recorded as errors and scanning continues, so that a
/// single bad line cannot hide problems further down. A duplicate keeps the first label, but the
/// matcher's effect still fires.
pub fn scan_output<L: AsRef<[u8]>>(
    lines: impl IntoIterator<Item = L>,
    matchers: &MatcherSet,
    stream: OutputStream,
    echo: &mut dyn OutputEcho,
) -> ClassifiedRun {
    let mut run = ClassifiedRun::new(stream);

    for line in lines {
        let line = normalize_line(line.as_ref());
        if line.trim_ascii().is_empty() {
            continue;
        }

        let Some(line_match) = matchers.classify(&line) else {
            tracing::debug!(%stream, "unmatched line: {:?}", String::from_utf8_lossy(&line));
            run.errors.push(StructuralError::UnmatchedLine {
                stream,
                line: line.into_owned(),
            });
            continue;
        };

        let matcher = line_match.matcher;
        matcher.fire(&line_match.name, &line, echo);
        run.record(line_match.name, matcher.label());
    }

    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        echo::{NoEcho, OkEcho},
        matcher::{MatchEffect, MatcherSpec},
    };
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};
    use test_strategy::proptest;

    fn scan(output: &str, matchers: &MatcherSet) -> ClassifiedRun {
        scan_output(
            output.lines(),
            matchers,
            OutputStream::Stdout,
            &mut NoEcho,
        )
    }

    #[test]
    fn all_passed() {
        let run = scan("passed: test_alpha\npassed: test_beta\n", &MatcherSet::passed());
        assert_eq!(
            run.outcomes().collect::<Vec<_>>(),
            vec![("test_alpha", "passed"), ("test_beta", "passed")]
        );
        assert!(run.errors().is_empty());
        assert_eq!(run.len(), 2);
    }

    #[test]
    fn duplicate_keeps_first_label() {
        let matchers = MatcherSet::passed_or_failed();
        let run = scan(
            indoc! {"
                passed: test_alpha
                passed: test_alpha
                FAILED: test_alpha
            "},
            &matchers,
        );
        assert_eq!(run.label_for("test_alpha"), Some("passed"));
        assert_eq!(run.len(), 1);
        assert_eq!(
            run.errors(),
            &[
                StructuralError::DuplicateTest {
                    stream: OutputStream::Stdout,
                    name: "test_alpha".to_owned(),
                    first_label: "passed".to_owned(),
                    label: "passed".to_owned(),
                },
                StructuralError::DuplicateTest {
                    stream: OutputStream::Stdout,
                    name: "test_alpha".to_owned(),
                    first_label: "passed".to_owned(),
                    label: "FAILED".to_owned(),
                },
            ]
        );
    }

    #[test]
    fn unmatched_lines_do_not_stop_the_scan() {
        let run = scan(
            indoc! {"
                garbage line

                passed: test_alpha
                more garbage
                passed: test_beta
            "},
            &MatcherSet::passed(),
        );
        assert_eq!(run.names().collect::<Vec<_>>(), vec!["test_alpha", "test_beta"]);
        assert_eq!(
            run.errors(),
            &[
                StructuralError::UnmatchedLine {
                    stream: OutputStream::Stdout,
                    line: b"garbage line".to_vec(),
                },
                StructuralError::UnmatchedLine {
                    stream: OutputStream::Stdout,
                    line: b"more garbage".to_vec(),
                },
            ]
        );
    }

    #[test]
    fn garbage_only() {
        let run = scan("garbage line\n", &MatcherSet::passed());
        assert!(run.is_empty());
        assert_eq!(run.errors().len(), 1);
    }

    #[test]
    fn colorized_and_blank_lines() {
        let raw: &[&[u8]] = &[
            b"\x1b[32m\x1b[1mpassed:\x1b[0m test_alpha\r\n",
            b"   \n",
            b"\x1b[0m\n",
        ];
        let run = scan_output(
            raw.iter(),
            &MatcherSet::passed(),
            OutputStream::Stdout,
            &mut NoEcho,
        );
        assert_eq!(run.outcomes().collect::<Vec<_>>(), vec![("test_alpha", "passed")]);
        assert!(
            run.errors().is_empty(),
            "blank lines after normalization are skipped"
        );
    }

    #[test]
    fn names_with_label() {
        let run = scan(
            indoc! {"
                passed: test_a
                FAILED: test_b
                passed: test_c
            "},
            &MatcherSet::passed_or_failed(),
        );
        assert_eq!(
            run.names_with_label("passed").collect::<Vec<_>>(),
            vec!["test_a", "test_c"]
        );
        assert_eq!(run.names_with_label("FAILED").collect::<Vec<_>>(), vec!["test_b"]);
        assert_eq!(run.names_with_label("NOMEM").count(), 0);
    }

    #[test]
    fn effects_fire_in_order_including_duplicates() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = seen.clone();
        let matchers = MatcherSet::new([MatcherSpec::new("passed", r"passed: (?P<n>test\S*)")
            .with_effect(MatchEffect::custom(move |name, _line| {
                seen2.lock().unwrap().push(name.to_owned());
            }))])
        .unwrap();

        scan("passed: test_a\npassed: test_b\npassed: test_a\n", &matchers);
        assert_eq!(*seen.lock().unwrap(), vec!["test_a", "test_b", "test_a"]);
    }

    #[test]
    fn echo_does_not_affect_classification() {
        let output = "passed: test_a\nnoise\n";
        let mut echo = OkEcho::new(Vec::new());
        let echoed = scan_output(
            output.lines(),
            &MatcherSet::passed(),
            OutputStream::Stdout,
            &mut echo,
        );
        assert_eq!(echoed, scan(output, &MatcherSet::passed()));
        assert_eq!(
            String::from_utf8(echo.into_inner()).unwrap(),
            "OK: passed: test_a\n"
        );

        let silent = MatcherSet::new([
            MatcherSpec::new("passed", r"passed: (?P<n>test\S*)").with_effect(MatchEffect::Silent)
        ])
        .unwrap();
        let mut echo = OkEcho::new(Vec::new());
        scan_output(output.lines(), &silent, OutputStream::Stdout, &mut echo);
        assert!(echo.into_inner().is_empty(), "silent matchers are not echoed");
    }

    #[proptest(cases = 128)]
    fn every_line_is_accounted_for(
        #[strategy(proptest::collection::vec("(passed|FAILED|noise): test_[a-d]|", 0..12))]
        lines: Vec<String>,
    ) {
        let matchers = MatcherSet::passed_or_failed();
        let run = scan_output(lines.iter(), &matchers, OutputStream::Stdout, &mut NoEcho);
        assert_eq!(
            run,
            scan_output(lines.iter(), &matchers, OutputStream::Stdout, &mut NoEcho),
            "scanning is deterministic"
        );

        let non_blank = lines.iter().filter(|line| !line.is_empty()).count();
        assert_eq!(run.len() + run.errors().len(), non_blank);
        for (name, label) in run.outcomes() {
            let first = lines
                .iter()
                .find(|line| line.ends_with(name) && !line.starts_with("noise"))
                .unwrap();
            assert!(first.starts_with(label), "first match wins for {name}");
        }
    }
}
