// Copyright (c) The zerorun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scanning of source files for the tests they declare.

use crate::{
    errors::{SourcePathError, SourceReadError},
    matcher::TestNamePattern,
};
use bstr::ByteSlice;
use camino::{Utf8Path, Utf8PathBuf};
use std::collections::BTreeSet;

/// The suffix a test command must carry for its source file to be derived from it.
pub const TEST_COMMAND_SUFFIX: &str = "-test";

/// The extension substituted for [`TEST_COMMAND_SUFFIX`] when deriving a source file.
pub const SOURCE_EXTENSION: &str = ".c";

const DEFAULT_PATTERN: &str = r"\s*(?:static\s+)?int\s+(?P<n>test_[_a-zA-Z0-9]*)\s*\(.*\)";

/// The set of test names declared in a source file.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SourceSet {
    tests: BTreeSet<String>,
}

impl SourceSet {
    /// Returns true if `name` is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.tests.contains(name)
    }

    /// Iterates over the declared names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.tests.iter().map(String::as_str)
    }

    /// Returns the declared names as a set.
    pub fn as_set(&self) -> &BTreeSet<String> {
        &self.tests
    }

    /// Returns the number of declared names.
    pub fn len(&self) -> usize {
        self.tests.len()
    }

    /// Returns true if no tests were declared.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }
}

impl FromIterator<String> for SourceSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            tests: iter.into_iter().collect(),
        }
    }
}

/// Returns the default pattern for test declarations.
///
/// It recognizes lines of the form `[static] int test_<name>(<args>)`, with arbitrary leading
/// whitespace.
pub fn default_source_pattern() -> TestNamePattern {
    TestNamePattern::new("source", DEFAULT_PATTERN).expect("default source pattern is valid")
}

/// Scans source text for test declarations.
///
/// Names declared more than once are merged.
pub fn scan_source(text: &[u8], pattern: &TestNamePattern) -> SourceSet {
    scan_source_with(text, pattern, |_, _| {})
}

/// Like [`scan_source`], but calls `callback` with each matching line and the name it declares.
pub fn scan_source_with(
    text: &[u8],
    pattern: &TestNamePattern,
    mut callback: impl FnMut(&[u8], &str),
) -> SourceSet {
    text.lines()
        .filter_map(|line| {
            let name = pattern.test_name(line)?;
            callback(line, &name);
            Some(name)
        })
        .collect()
}

/// Reads and scans a source file.
pub fn read_source(
    path: &Utf8Path,
    pattern: &TestNamePattern,
) -> Result<SourceSet, SourceReadError> {
    let text = std::fs::read(path).map_err(|error| SourceReadError::new(path, error))?;
    let tests = scan_source(&text, pattern);
    tracing::debug!("found {} tests in `{path}`", tests.len());
    Ok(tests)
}

/// Derives a source file from a test command of the form `<stem>-test`, giving `<stem>.c`.
pub fn derive_source_path(command: &str) -> Result<Utf8PathBuf, SourcePathError> {
    command
        .strip_suffix(TEST_COMMAND_SUFFIX)
        .map(|stem| Utf8PathBuf::from(format!("{stem}{SOURCE_EXTENSION}")))
        .ok_or_else(|| SourcePathError::new(command))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use maplit::btreeset;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    fn names(set: &SourceSet) -> BTreeSet<&str> {
        set.iter().collect()
    }

    #[test]
    fn default_pattern() {
        let source = indoc! {"
            #include \"0unit.h\"

            int test_alpha(void)
            {
                    PASS();
            }

            static int test_beta(void)
            {
                    PASS();
            }

                static   int test_indented ( int x, char *y )
            int helper(void);
            int testing_not_a_test(void);
            extern int test_extern(void);
            int test_no_parens;
            // int test_commented(void)
        "};

        let tests = scan_source(source.as_bytes(), &default_source_pattern());
        assert_eq!(
            names(&tests),
            btreeset! {"test_alpha", "test_beta", "test_indented"}
        );
    }

    #[test]
    fn duplicates_are_merged() {
        let source = "int test_alpha(void)\nint test_alpha(void)\n";
        let tests = scan_source(source.as_bytes(), &default_source_pattern());
        assert_eq!(tests.len(), 1);
    }

    #[test]
    fn custom_pattern_and_callback() {
        let pattern = TestNamePattern::new("source", r"fn (?P<name>check_\w+)\(\)").unwrap();
        let source = indoc! {"
            fn check_one() {}
            fn helper() {}
            fn check_two() {}
        "};

        let mut seen = Vec::new();
        let tests = scan_source_with(source.as_bytes(), &pattern, |line, name| {
            seen.push((line.to_str_lossy().into_owned(), name.to_owned()));
        });
        assert_eq!(names(&tests), btreeset! {"check_one", "check_two"});
        assert_eq!(
            seen,
            vec![
                ("fn check_one() {}".to_owned(), "check_one".to_owned()),
                ("fn check_two() {}".to_owned(), "check_two".to_owned()),
            ]
        );
    }

    #[test]
    fn rescanning_is_idempotent() {
        let source = b"int test_a(void)\nstatic int test_b(int)\n";
        let pattern = default_source_pattern();
        assert_eq!(scan_source(source, &pattern), scan_source(source, &pattern));
    }

    #[test]
    fn read_missing_file() {
        let err = read_source(
            Utf8Path::new("/nonexistent/zerorun/source.c"),
            &default_source_pattern(),
        )
        .unwrap_err();
        assert_eq!(err.path(), "/nonexistent/zerorun/source.c");
        assert!(err.process_exit_code() < 0, "I/O errors map to negative codes");
    }

    #[test_case("./elm-test", Some("./elm.c"); "relative")]
    #[test_case("build/test_foo-test", Some("build/test_foo.c"); "nested")]
    #[test_case("./elm-fail", None; "missing suffix")]
    #[test_case("-test", Some(".c"); "bare suffix")]
    fn derive_source(command: &str, expected: Option<&str>) {
        let actual = derive_source_path(command).ok();
        assert_eq!(actual.as_deref().map(Utf8Path::as_str), expected);
    }
}
