// Copyright (c) The arbor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

#![warn(missing_docs)]

//! Core functionality for the arbor test-execution engine.
//!
//! Arbor executes a hierarchical collection of tests under a configurable
//! concurrency policy: the tree is flattened into a run list, each test gets
//! an effective time budget (optionally derived from historic run data), and
//! a worker pool runs the list while a single dispatcher task serializes
//! result collection, fail-fast handling and reporting.
//!
//! The typical flow:
//!
//! 1. build a [`list::TestList`] from a forest of [`list::TestTree`]s,
//! 2. load [`history::TestHistory`] and build a [`config::RunConfig`],
//! 3. run with [`runner::TestRunnerBuilder`], observing
//!    [`reporter::events::TestEvent`]s through the callback,
//! 4. derive the exit code from the returned
//!    [`RunReport`](reporter::events::RunReport), feed it to
//!    [`history::TestHistory::record_run`] and persist the history with
//!    [`history::TestHistory::save`].

pub mod config;
pub mod errors;
pub mod history;
pub mod list;
pub mod reporter;
pub mod runner;
pub mod schedule;
pub mod signal;
mod time;
