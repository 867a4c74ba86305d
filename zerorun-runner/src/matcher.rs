// Copyright (c) The zerorun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Labeled patterns that classify lines of test output.
//!
//! A [`MatcherSet`] is an ordered list of matchers. The first matcher whose pattern matches a
//! line wins, and later matchers are never consulted for that line. When patterns overlap (for
//! example a generic `passed` pattern and a more specific diagnostic pattern), callers must order
//! them most-specific-first: the set cannot detect a wrong order.

use crate::{
    echo::OutputEcho,
    errors::{MatcherBuildError, MatcherBuildErrorKind},
};
use regex::bytes::Regex;
use std::{fmt, sync::Arc};

/// The label used by the default matcher for passing tests.
pub const PASSED_LABEL: &str = "passed";

/// The label used by the default matcher for failing tests.
pub const FAILED_LABEL: &str = "FAILED";

/// The label used for out-of-memory diagnostics on stderr.
pub const NOMEM_LABEL: &str = "NOMEM";

/// The label used for diagnostics reporting that a log message could not be written.
pub const LOGFAILED_LABEL: &str = "LOGFAILED";

/// The label used for debug diagnostics on stderr.
pub const DBG_LABEL: &str = "DBG";

/// The label used for panic diagnostics on stderr.
pub const PANIC_LABEL: &str = "PANIC";

// Names are matched bytewise so that invalid UTF-8 is captured whole and then rejected.
const PASSED_PATTERN: &str = r"^passed: (?P<n>test(?-u:\S)*)";
const FAILED_PATTERN: &str = r"^FAILED: (?P<n>test(?-u:\S)*)";

// Each diagnostic ends its location with `)`, so a name cut short by an invalid byte never
// matches.
const NOMEM_PATTERN: &str = r"^NOMEM \(in ?[^:()]+:(?P<n>\w+)\)";
const LOGFAILED_PATTERN: &str = r"^LOGFAILED \(in ?[^:()]+:(?P<n>\w+)\)";
const DBG_PATTERN: &str = r"^DBG \([^:()]+:[0-9]+ in (?P<n>\w+)\)";
const PANIC_PATTERN: &str = r"^PANIC! \([^:()]+:[0-9]+ in (?P<n>\w+)\)";

/// A regular expression that extracts a test name from a line.
///
/// The pattern must define exactly one named capture group, which yields the test name. Like
/// the patterns it is modelled on, it is anchored at the start of the line but not at the end.
#[derive(Clone, Debug)]
pub struct TestNamePattern {
    source: String,
    regex: Regex,
    group: String,
}

impl TestNamePattern {
    /// Compiles a new pattern. `label` is only used for error reporting.
    pub fn new(label: &str, pattern: &str) -> Result<Self, MatcherBuildError> {
        let regex = Regex::new(&format!("^(?:{pattern})")).map_err(|err| {
            MatcherBuildError::new(label, pattern, MatcherBuildErrorKind::InvalidRegex(err))
        })?;

        let mut names = regex.capture_names().flatten();
        let group = match (names.next(), names.next()) {
            (Some(group), None) => group.to_owned(),
            _ => {
                let count = regex.capture_names().flatten().count();
                return Err(MatcherBuildError::new(
                    label,
                    pattern,
                    MatcherBuildErrorKind::NamedGroupCount { count },
                ));
            }
        };

        Ok(Self {
            source: pattern.to_owned(),
            regex,
            group,
        })
    }

    /// Returns the pattern as it was written.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Returns the trimmed test name captured from `line`.
    ///
    /// Returns `None` if the pattern does not match, if the name group did not participate in the
    /// match, or if the captured name is not valid UTF-8.
    pub fn test_name(&self, line: &[u8]) -> Option<String> {
        let captures = self.regex.captures(line)?;
        let name = captures.name(&self.group)?;
        let name = std::str::from_utf8(name.as_bytes()).ok()?;
        Some(name.trim().to_owned())
    }
}

/// What happens when a matcher classifies a line.
#[derive(Clone, Default)]
pub enum MatchEffect {
    /// Echo the line to the [`OutputEcho`] passed in while scanning.
    #[default]
    Echo,

    /// Do nothing.
    Silent,

    /// Call a function with the test name and the normalized line.
    Custom(Arc<dyn Fn(&str, &[u8]) + Send + Sync>),
}

impl MatchEffect {
    /// Creates a custom effect from a function.
    pub fn custom(f: impl Fn(&str, &[u8]) + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }
}

impl fmt::Debug for MatchEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Echo => f.write_str("Echo"),
            Self::Silent => f.write_str("Silent"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// An uncompiled matcher: a label, a pattern, and an effect.
#[derive(Clone, Debug)]
pub struct MatcherSpec {
    /// The outcome label recorded for names matched by this matcher.
    pub label: String,

    /// The pattern, with a single named group capturing the test name.
    pub pattern: String,

    /// The effect to invoke on each match.
    pub effect: MatchEffect,
}

impl MatcherSpec {
    /// Creates a new spec that echoes matched lines.
    pub fn new(label: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            pattern: pattern.into(),
            effect: MatchEffect::Echo,
        }
    }

    /// Sets the effect for this spec.
    pub fn with_effect(mut self, effect: MatchEffect) -> Self {
        self.effect = effect;
        self
    }
}

/// A compiled matcher.
#[derive(Clone, Debug)]
pub struct Matcher {
    label: String,
    pattern: TestNamePattern,
    effect: MatchEffect,
}

impl Matcher {
    /// Compiles a matcher from its spec.
    pub fn new(spec: MatcherSpec) -> Result<Self, MatcherBuildError> {
        let MatcherSpec {
            label,
            pattern,
            effect,
        } = spec;
        if label.is_empty() {
            return Err(MatcherBuildError::new(
                label,
                pattern,
                MatcherBuildErrorKind::EmptyLabel,
            ));
        }
        let pattern = TestNamePattern::new(&label, &pattern)?;
        Ok(Self {
            label,
            pattern,
            effect,
        })
    }

    /// Returns the label for this matcher.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the pattern for this matcher.
    pub fn pattern(&self) -> &TestNamePattern {
        &self.pattern
    }

    /// Returns the effect invoked on each match.
    pub fn effect(&self) -> &MatchEffect {
        &self.effect
    }

    /// Invokes this matcher's effect.
    pub fn fire(&self, name: &str, line: &[u8], echo: &mut dyn OutputEcho) {
        match &self.effect {
            MatchEffect::Echo => echo.matched(&self.label, name, line),
            MatchEffect::Silent => {}
            MatchEffect::Custom(f) => f(name, line),
        }
    }
}

/// The result of a successful [`MatcherSet::classify`] call.
#[derive(Clone, Debug)]
pub struct LineMatch<'set> {
    /// The matcher that classified the line.
    pub matcher: &'set Matcher,

    /// The captured test name.
    pub name: String,
}

impl LineMatch<'_> {
    /// Returns the label of the matcher that classified the line.
    pub fn label(&self) -> &str {
        self.matcher.label()
    }
}

/// An ordered list of matchers. See the [module documentation](self).
#[derive(Clone, Debug, Default)]
pub struct MatcherSet {
    matchers: Vec<Matcher>,
}

impl MatcherSet {
    /// Compiles a matcher set. Order is preserved.
    pub fn new(specs: impl IntoIterator<Item = MatcherSpec>) -> Result<Self, MatcherBuildError> {
        let matchers = specs
            .into_iter()
            .map(Matcher::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { matchers })
    }

    /// A set matching `passed: <name>` lines.
    pub fn passed() -> Self {
        Self::builtin(&[(PASSED_LABEL, PASSED_PATTERN)])
    }

    /// A set matching `FAILED: <name>` lines.
    pub fn failed() -> Self {
        Self::builtin(&[(FAILED_LABEL, FAILED_PATTERN)])
    }

    /// A set matching `passed: <name>` lines, then `FAILED: <name>` lines.
    pub fn passed_or_failed() -> Self {
        Self::passed().chain(Self::failed())
    }

    /// A set matching the diagnostics a failing test program writes to stderr: out-of-memory
    /// reports, failures to log, debug lines and panics.
    pub fn failure_diagnostics() -> Self {
        Self::builtin(&[
            (NOMEM_LABEL, NOMEM_PATTERN),
            (LOGFAILED_LABEL, LOGFAILED_PATTERN),
            (DBG_LABEL, DBG_PATTERN),
            (PANIC_LABEL, PANIC_PATTERN),
        ])
    }

    fn builtin(specs: &[(&str, &str)]) -> Self {
        let matchers = specs
            .iter()
            .map(|(label, pattern)| {
                Matcher::new(MatcherSpec::new(*label, *pattern))
                    .expect("built-in matchers are valid")
            })
            .collect();
        Self { matchers }
    }

    /// Appends the matchers in `other` after the matchers in `self`.
    pub fn chain(mut self, other: MatcherSet) -> Self {
        self.matchers.extend(other.matchers);
        self
    }

    /// Returns the matchers in order.
    pub fn matchers(&self) -> &[Matcher] {
        &self.matchers
    }

    /// Returns true if the set contains no matchers.
    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    /// Returns true if some matcher records `label`.
    pub fn has_label(&self, label: &str) -> bool {
        self.matchers.iter().any(|m| m.label == label)
    }

    /// Classifies a normalized line, returning the first matcher that captures a test name.
    pub fn classify(&self, line: &[u8]) -> Option<LineMatch<'_>> {
        self.matchers.iter().find_map(|matcher| {
            matcher
                .pattern
                .test_name(line)
                .map(|name| LineMatch { matcher, name })
        })
    }
}
