// Copyright (c) The arbor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The flat list of tests produced by flattening, ready for scheduling.

use super::{SourceLocation, TestFn, TestKind, TestOptions, TestTree, flatten_forest};
use debug_ignore::DebugIgnore;
use futures::future::BoxFuture;
use std::fmt;

/// The path segment contributed by an anonymous group.
pub const UNNAMED_GROUP: &str = "<unnamed>";

/// The position of a test within its tree: the group segments from the root
/// down, terminating in the leaf id.
///
/// Two leaves may share an id, but never a full path. The dotted rendering of
/// the path is the test's *history key*, which stays stable across runs and
/// across unrelated edits elsewhere in the tree.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TestPath {
    /// Group segments, outermost first; `None` for anonymous groups.
    pub groups: Vec<Option<String>>,
    /// The leaf id.
    pub id: String,
}

impl fmt::Display for TestPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for group in &self.groups {
            write!(f, "{}.", group.as_deref().unwrap_or(UNNAMED_GROUP))?;
        }
        write!(f, "{}", self.id)
    }
}

/// Whether a test matches the active-test predicate.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FilterMatch {
    /// The test is active and will be scheduled.
    Match,
    /// The test is excluded from the run but still enumerable.
    Mismatch {
        /// Why the test was excluded.
        reason: MismatchReason,
    },
}

impl FilterMatch {
    /// Returns true if the test is active.
    pub fn is_match(&self) -> bool {
        matches!(self, FilterMatch::Match)
    }
}

/// The reason a test was excluded from a run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MismatchReason {
    /// The test did not match the active-test predicate.
    Filtered,
}

impl fmt::Display for MismatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filtered => write!(f, "excluded by the test filter"),
        }
    }
}

/// A leaf test annotated with its full path, ready for scheduling.
#[derive(Debug)]
pub struct FlatTest {
    kind: TestKind,
    path: TestPath,
    history_key: String,
    location: Option<SourceLocation>,
    options: TestOptions,
    action: DebugIgnore<TestFn>,
    filter_match: FilterMatch,
}

impl FlatTest {
    pub(crate) fn new(
        kind: TestKind,
        path: TestPath,
        location: Option<SourceLocation>,
        options: TestOptions,
        action: DebugIgnore<TestFn>,
    ) -> Self {
        let history_key = path.to_string();
        Self {
            kind,
            path,
            history_key,
            location,
            options,
            action,
            filter_match: FilterMatch::Match,
        }
    }

    /// The kind of this test.
    pub fn kind(&self) -> TestKind {
        self.kind
    }

    /// The test's full path.
    pub fn path(&self) -> &TestPath {
        &self.path
    }

    /// The stable key correlating this test with its historic runs.
    pub fn history_key(&self) -> &str {
        &self.history_key
    }

    /// The declaration-site source location, if one was attached.
    pub fn location(&self) -> Option<&SourceLocation> {
        self.location.as_ref()
    }

    /// The test's options.
    pub fn options(&self) -> &TestOptions {
        &self.options
    }

    /// Whether the test matches the active-test predicate.
    pub fn filter_match(&self) -> FilterMatch {
        self.filter_match
    }

    /// Produces a fresh future for one execution of this test.
    pub(crate) fn make_future(&self) -> BoxFuture<'static, ()> {
        (self.action.0)()
    }
}

/// List of tests to run, in declaration order, with active/filtered marking.
#[derive(Debug)]
pub struct TestList {
    tests: Vec<FlatTest>,
}

impl TestList {
    /// Flattens a forest of trees and marks each test against the
    /// active-test predicate.
    pub fn new(trees: Vec<TestTree>, filter: impl Fn(&FlatTest) -> bool) -> Self {
        let mut tests = flatten_forest(trees);
        for test in &mut tests {
            if !filter(test) {
                test.filter_match = FilterMatch::Mismatch {
                    reason: MismatchReason::Filtered,
                };
            }
        }
        Self { tests }
    }

    /// Flattens a forest of trees with every test active.
    pub fn all(trees: Vec<TestTree>) -> Self {
        Self::new(trees, |_| true)
    }

    /// The total number of tests, active or not.
    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    /// The number of tests that will be scheduled.
    pub fn run_count(&self) -> usize {
        self.iter_tests().count()
    }

    /// The number of tests excluded from the run.
    pub fn skip_count(&self) -> usize {
        self.iter_skipped().count()
    }

    /// Iterates over every test in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &FlatTest> + '_ {
        self.tests.iter()
    }

    /// Iterates over the active tests in declaration order.
    pub fn iter_tests(&self) -> impl Iterator<Item = &FlatTest> + '_ {
        self.tests.iter().filter(|test| test.filter_match.is_match())
    }

    /// Iterates over the filtered-out tests in declaration order.
    pub fn iter_skipped(&self) -> impl Iterator<Item = &FlatTest> + '_ {
        self.tests
            .iter()
            .filter(|test| !test.filter_match.is_match())
    }
}
