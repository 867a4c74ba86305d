// Copyright (c) The zerorun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Echoing of matched output lines.
//!
//! Echoing is observable output only. Nothing written here affects how lines are classified.

use owo_colors::{OwoColorize, Style};
use std::io::Write;

/// A sink for lines that matched a matcher with [`MatchEffect::Echo`](crate::matcher::MatchEffect::Echo).
pub trait OutputEcho {
    /// Called once for every echoed line, in classification order.
    fn matched(&mut self, label: &str, name: &str, line: &[u8]);
}

/// Discards every line.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoEcho;

impl OutputEcho for NoEcho {
    fn matched(&mut self, _label: &str, _name: &str, _line: &[u8]) {}
}

/// Writes `OK: <line>` for every matched line.
#[derive(Debug)]
pub struct OkEcho<W> {
    writer: W,
    styles: EchoStyles,
}

impl<W: Write> OkEcho<W> {
    /// Creates a new echo writing uncolored lines to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            styles: EchoStyles::default(),
        }
    }

    /// Colorizes the `OK:` prefix.
    pub fn colorize(&mut self) {
        self.styles.colorize();
    }

    /// Consumes the echo, returning the writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> OutputEcho for OkEcho<W> {
    fn matched(&mut self, _label: &str, _name: &str, line: &[u8]) {
        // Echo failures (e.g. a closed pipe) must not interrupt classification.
        let _ = write!(self.writer, "{} ", "OK:".style(self.styles.ok));
        let _ = self.writer.write_all(line);
        let _ = self.writer.write_all(b"\n");
    }
}

#[derive(Debug, Default)]
struct EchoStyles {
    ok: Style,
}

impl EchoStyles {
    fn colorize(&mut self) {
        self.ok = Style::new().green().bold();
    }
}
