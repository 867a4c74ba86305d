// Copyright (c) The zerorun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns raw process output into clean text lines.
//!
//! Test programs usually colorize their output. Before lines are matched, terminal escape
//! sequences and line terminators are removed. An escape sequence is `ESC`, an optional `[`, and
//! any characters up to and including the first byte in the range `@`..=`~`. Malformed sequences
//! that never terminate are left in place.

use bstr::ByteSlice;
use regex::bytes::Regex;
use std::{borrow::Cow, sync::LazyLock};

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    // (?-u) so that `.` matches arbitrary bytes, not just UTF-8 encoded code points.
    Regex::new(r"(?-u)\x1b\[?.*?[@-~]").expect("ANSI escape regex is valid")
});

/// Removes terminal escape sequences and a trailing `\n` or `\r\n` from a single raw line.
///
/// Returns a borrowed slice if nothing needed to be removed.
pub fn normalize_line(line: &[u8]) -> Cow<'_, [u8]> {
    let line = strip_terminator(line);
    ANSI_ESCAPE.replace_all(line, &b""[..])
}

/// Splits a captured output buffer into lines and normalizes each one.
///
/// The returned iterator is lazy and finite. It can only be restarted by calling this function
/// again on the same buffer.
pub fn normalized_lines(raw: &[u8]) -> NormalizedLines<'_> {
    NormalizedLines {
        inner: raw.lines_with_terminator(),
    }
}

/// An iterator over the normalized lines of a buffer.
///
/// Returned by [`normalized_lines`].
#[derive(Clone, Debug)]
pub struct NormalizedLines<'a> {
    inner: bstr::LinesWithTerminator<'a>,
}

impl<'a> Iterator for NormalizedLines<'a> {
    type Item = Cow<'a, [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(normalize_line)
    }
}

fn strip_terminator(line: &[u8]) -> &[u8] {
    match line.strip_suffix(b"\n") {
        Some(line) => line.strip_suffix(b"\r").unwrap_or(line),
        None => line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;
    use test_strategy::proptest;

    #[test_case(b"passed: test_alpha", b"passed: test_alpha"; "plain line")]
    #[test_case(b"passed: test_alpha\n", b"passed: test_alpha"; "newline")]
    #[test_case(b"passed: test_alpha\r\n", b"passed: test_alpha"; "crlf")]
    #[test_case(
        b"\x1b[32m\x1b[1mpassed:\x1b[0m test_alpha\n",
        b"passed: test_alpha";
        "colorized"
    )]
    #[test_case(b"\x1b(Bpassed", b"passed"; "escape without bracket")]
    #[test_case(b"a\rb\n", b"a\rb"; "embedded carriage return is kept")]
    fn normalize(input: &[u8], expected: &[u8]) {
        assert_eq!(normalize_line(input).as_bstr(), expected.as_bstr());
    }

    #[test]
    fn unterminated_escape_passes_through() {
        // No byte in @..=~ follows the ESC, so nothing is stripped.
        let input = b"\x1b123;456";
        assert_eq!(normalize_line(input).as_bstr(), input.as_bstr());
    }

    #[test]
    fn clean_lines_are_borrowed() {
        assert!(matches!(normalize_line(b"ok\n"), Cow::Borrowed(_)));
    }

    #[test]
    fn split_buffer() {
        let raw = b"\x1b[32mpassed:\x1b[0m test_a\r\npassed: test_b\n\nlast";
        let lines: Vec<_> = normalized_lines(raw).map(|l| l.into_owned()).collect();
        assert_eq!(
            lines,
            vec![
                b"passed: test_a".to_vec(),
                b"passed: test_b".to_vec(),
                b"".to_vec(),
                b"last".to_vec(),
            ]
        );
    }

    #[proptest(cases = 256)]
    fn printable_lines_are_unchanged(#[strategy("[ -~]*")] line: String, crlf: bool) {
        let terminated = format!("{line}{}", if crlf { "\r\n" } else { "\n" });
        assert_eq!(normalize_line(line.as_bytes()).as_bstr(), line.as_bytes().as_bstr());
        assert_eq!(
            normalize_line(terminated.as_bytes()).as_bstr(),
            line.as_bytes().as_bstr()
        );
    }

    #[proptest(cases = 256)]
    fn one_item_per_line(#[strategy("[a-z\\x1b\\[;0-9\r\n]*")] raw: String) {
        let expected = raw.as_bytes().lines_with_terminator().count();
        assert_eq!(normalized_lines(raw.as_bytes()).count(), expected);
        assert!(
            normalized_lines(raw.as_bytes()).all(|line| !line.ends_with(b"\n")),
            "terminators are stripped"
        );
    }
}
