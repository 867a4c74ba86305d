// Copyright (c) The zerorun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs a test program and checks its output against the tests declared in its source file.
//!
//! ```text
//! zerorun ./elm-test
//! zerorun --mode expect-failure ./elm-fail elm.c
//! zerorun --profile zerorun.toml
//! ```

#![warn(missing_docs)]

mod dispatch;
mod errors;
mod output;

#[doc(hidden)]
pub use dispatch::*;
#[doc(hidden)]
pub use errors::*;
#[doc(hidden)]
pub use output::OutputWriter;
