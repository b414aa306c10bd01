// Copyright (c) The arbor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The hierarchical test model.
//!
//! Tests are declared as a tree: a single [`TestCase`], or a named or
//! anonymous group of child trees, nested to arbitrary depth. The tree is
//! never executed directly; [`TestTree::flatten`] turns it into the ordered
//! list of [`FlatTest`]s that the runner schedules.

use super::{FlatTest, TestPath};
use debug_ignore::DebugIgnore;
use futures::{FutureExt, future::BoxFuture};
use std::fmt;

/// The opaque action run for a single test.
///
/// Calling the function produces a fresh future for one execution of the
/// test. The future must be `'static` so it can run as an independent task
/// and be cancelled without affecting its siblings.
pub type TestFn = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// The kind of a test case.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum TestKind {
    /// A plain unit test.
    Unit,
    /// A property-based test.
    Property,
    /// A black-box test.
    BlackBox,
}

/// Per-test options, set at declaration time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TestOptions {
    /// Whether this test may run on the parallel worker pool. Tests with
    /// `parallel = false` always run sequentially, after the parallel batch.
    pub parallel: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self { parallel: true }
    }
}

/// A source location attached to a test or to a failure.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct SourceLocation {
    /// The source file.
    pub file: String,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number.
    pub column: u32,
}

impl SourceLocation {
    /// Creates a new source location.
    pub fn new(file: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A single runnable test case: the leaf of a [`TestTree`].
#[derive(Debug)]
pub struct TestCase {
    pub(crate) id: String,
    pub(crate) kind: TestKind,
    pub(crate) location: Option<SourceLocation>,
    pub(crate) options: TestOptions,
    pub(crate) action: DebugIgnore<TestFn>,
}

impl TestCase {
    /// Creates a new test case with default options.
    pub fn new<F, Fut>(id: impl Into<String>, kind: TestKind, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            id: id.into(),
            kind,
            location: None,
            options: TestOptions::default(),
            action: DebugIgnore(boxed_action(action)),
        }
    }

    /// Attaches a declaration-site source location.
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Replaces the options record.
    pub fn with_options(mut self, options: TestOptions) -> Self {
        self.options = options;
        self
    }

    /// Opts this test out of the parallel worker pool.
    pub fn serial(mut self) -> Self {
        self.options.parallel = false;
        self
    }

    /// The test's id (the last segment of its path).
    pub fn id(&self) -> &str {
        &self.id
    }
}

fn boxed_action<F, Fut>(action: F) -> TestFn
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Box::new(move || action().boxed())
}

/// A hierarchical collection of tests.
///
/// The variants are deliberately a closed sum: everything the runner accepts
/// converges on this type through the explicit adapters below.
#[derive(Debug)]
pub enum TestTree {
    /// A single test.
    Test(TestCase),
    /// A group of child trees, named or anonymous. Child order is preserved
    /// through flattening.
    Group {
        /// The group name; `None` for an anonymous group.
        name: Option<String>,
        /// The children, in declaration order.
        children: Vec<TestTree>,
    },
}

impl TestTree {
    /// Adapter: a plain unit test from an id and an action.
    pub fn test<F, Fut>(id: impl Into<String>, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::Test(TestCase::new(id, TestKind::Unit, action))
    }

    /// Adapter: a property-based test from an id and an action.
    pub fn property<F, Fut>(id: impl Into<String>, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::Test(TestCase::new(id, TestKind::Property, action))
    }

    /// Adapter: a black-box test from an id and an action.
    pub fn black_box<F, Fut>(id: impl Into<String>, action: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self::Test(TestCase::new(id, TestKind::BlackBox, action))
    }

    /// Adapter: a single, already-built test case.
    pub fn case(case: TestCase) -> Self {
        Self::Test(case)
    }

    /// Adapter: a named group of child trees.
    pub fn group(name: impl Into<String>, children: Vec<TestTree>) -> Self {
        Self::Group {
            name: Some(name.into()),
            children,
        }
    }

    /// Adapter: an anonymous group of child trees. Its children get an
    /// anonymous path segment.
    pub fn anonymous_group(children: Vec<TestTree>) -> Self {
        Self::Group {
            name: None,
            children,
        }
    }

    /// Flattens the tree into the ordered list of tests it contains.
    ///
    /// Flattening is pure and deterministic: a leaf yields one entry with an
    /// empty path prefix, and a group prefixes every child path with its own
    /// segment. Flattening a group built from `a ++ b` equals
    /// `flatten(a) ++ flatten(b)` under the same group segment.
    pub fn flatten(self) -> Vec<FlatTest> {
        let mut out = Vec::new();
        let mut prefix = Vec::new();
        flatten_into(self, &mut prefix, &mut out);
        out
    }
}

/// Flattens a forest of trees, preserving declaration order.
pub fn flatten_forest(trees: Vec<TestTree>) -> Vec<FlatTest> {
    let mut out = Vec::new();
    let mut prefix = Vec::new();
    for tree in trees {
        flatten_into(tree, &mut prefix, &mut out);
    }
    out
}

fn flatten_into(tree: TestTree, prefix: &mut Vec<Option<String>>, out: &mut Vec<FlatTest>) {
    match tree {
        TestTree::Test(case) => {
            let path = TestPath {
                groups: prefix.clone(),
                id: case.id,
            };
            out.push(FlatTest::new(
                case.kind,
                path,
                case.location,
                case.options,
                case.action,
            ));
        }
        TestTree::Group { name, children } => {
            prefix.push(name);
            for child in children {
                flatten_into(child, prefix, out);
            }
            prefix.pop();
        }
    }
}
