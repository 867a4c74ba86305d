// Copyright (c) The zerorun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Exit codes used by zerorun.

use std::io;

/// Documented exit codes for `zerorun` failures.
///
/// Policy violations that are promoted to failures surface the test program's own exit code (or
/// the sentinel it was expected to exit with), and I/O failures surface the negated OS error
/// number. Everything else uses one of the codes below.
pub enum ZerorunExitCode {}

impl ZerorunExitCode {
    /// All runs and checks succeeded.
    pub const OK: i32 = 0;

    /// One or more reconciliation checks reported a violation.
    pub const CHECK_FAILED: i32 = 1;

    /// Scanning the test program's output produced structural errors.
    pub const SCAN_FAILED: i32 = 2;

    /// The test program wrote to stderr in plain mode.
    pub const STDERR_WRITTEN: i32 = 3;

    /// A configuration error occurred: a bad matcher, a bad profile, or a malformed invocation.
    pub const SETUP_ERROR: i32 = 96;

    /// Maps an I/O error to the exit code reported for it.
    ///
    /// This is the negated OS error number, or `-1` if the error did not come from the OS.
    pub fn from_io_error(error: &io::Error) -> i32 {
        error.raw_os_error().map_or(-1, |errno| -errno)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_codes() {
        assert_eq!(
            ZerorunExitCode::from_io_error(&io::Error::from_raw_os_error(2)),
            -2,
            "OS errors are negated"
        );
        assert_eq!(
            ZerorunExitCode::from_io_error(&io::Error::other("synthetic")),
            -1,
            "non-OS errors map to -1"
        );
    }
}
