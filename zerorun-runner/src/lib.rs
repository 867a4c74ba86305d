// Copyright (c) The zerorun Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for [zerorun](https://crates.io/crates/zerorun), a harness that checks
//! the output of a test program against the tests its source file declares.
//!
//! The basic flow is:
//!
//! 1. [`source::read_source`] scans a source file for declared tests.
//! 2. [`run::RunConfig::run`] runs the test program, checks its exit code against an
//!    [`policy::ExitPolicy`], and classifies each output line with a [`matcher::MatcherSet`].
//! 3. [`reconcile::Results`] cross-checks what ran against what was declared.
//!
//! [`profile::HarnessProfile`] bundles one or more of these runs in a TOML file.

pub mod classify;
pub mod echo;
pub mod errors;
pub mod exit_codes;
pub mod matcher;
pub mod normalize;
pub mod policy;
pub mod profile;
pub mod reconcile;
pub mod run;
pub mod source;
