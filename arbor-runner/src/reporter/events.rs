// Copyright (c) The arbor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events and result types emitted by the runner.
//!
//! These types cross the boundary between the engine and its observers: the
//! per-test [`ExecuteStatus`], the running [`RunStats`], the [`TestEvent`]
//! stream passed to the run callback, and the final [`RunReport`].

use crate::list::{FlatTest, MismatchReason, SourceLocation, TestList};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::{panic::panic_any, time::Duration};

/// The resolved outcome of a single test.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TestOutcome {
    /// The test ran to completion without raising anything.
    Pass,
    /// The test deliberately signalled that it is not yet decided.
    Pending,
    /// The test raised a deliberate failure signal.
    Fail,
    /// The test faulted in some other way.
    Error,
}

impl TestOutcome {
    /// Returns true for the outcomes that stop a fail-fast run. Pass and
    /// Pending never stop.
    pub fn is_failure(self) -> bool {
        matches!(self, TestOutcome::Fail | TestOutcome::Error)
    }
}

/// The payload a test action panics with to signal a deliberate,
/// framework-level failure rather than an arbitrary fault.
///
/// Anything else a test panics with classifies as [`TestOutcome::Error`].
#[derive(Clone, Debug)]
pub struct FailureSignal {
    /// The outcome this signal resolves to; [`TestOutcome::Fail`] from a
    /// failed assertion, [`TestOutcome::Pending`] from a pending marker.
    pub outcome: TestOutcome,
    /// Human-readable message.
    pub message: String,
    /// The failing location, if known.
    pub location: Option<SourceLocation>,
    /// Locations of enclosing assertion contexts, innermost first.
    pub calling_locations: Vec<SourceLocation>,
}

impl FailureSignal {
    /// A failure signal with the given message.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            outcome: TestOutcome::Fail,
            message: message.into(),
            location: None,
            calling_locations: Vec::new(),
        }
    }

    /// A pending signal with the given message.
    pub fn pending(message: impl Into<String>) -> Self {
        Self {
            outcome: TestOutcome::Pending,
            message: message.into(),
            location: None,
            calling_locations: Vec::new(),
        }
    }

    /// Attaches the failing location.
    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Appends an enclosing assertion context.
    pub fn with_calling_location(mut self, location: SourceLocation) -> Self {
        self.calling_locations.push(location);
        self
    }

    /// Raises the signal out of the current test.
    pub fn raise(self) -> ! {
        panic_any(self)
    }
}

/// Information about a single finished test.
#[derive(Clone, Debug)]
pub struct ExecuteStatus {
    /// The resolved outcome.
    pub outcome: TestOutcome,
    /// The message carried by the failure signal, the fault's description,
    /// or `"timeout"`.
    pub message: Option<String>,
    /// The failing location, if the failure signal carried one.
    pub location: Option<SourceLocation>,
    /// Locations of enclosing assertion contexts, innermost first.
    pub calling_locations: Vec<SourceLocation>,
    /// When the test started.
    pub start_time: DateTime<FixedOffset>,
    /// Measured wall-clock time. For a timed-out test this is the enforced
    /// ceiling, not however long the action would have taken.
    pub time_taken: Duration,
    /// Whether the test hit its deadline. Independent of the resolved
    /// outcome: a timed-out test may still resolve to Pass.
    pub timed_out: bool,
    /// Display-ordering index, assigned in the order results were recorded.
    pub output_index: usize,
}

/// Statistics for a test run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct RunStats {
    /// The number of tests that were expected to be run at the beginning.
    pub initial_run_count: usize,
    /// The number of tests that finished with a result.
    pub finished_count: usize,
    /// Tests that passed.
    pub passed: usize,
    /// Tests that signalled Pending.
    pub pending: usize,
    /// Tests that failed.
    pub failed: usize,
    /// Tests that errored.
    pub errored: usize,
    /// Tests that hit their deadline; a qualifier, every such test is also
    /// counted in one of the outcome buckets.
    pub timed_out: usize,
    /// Tests excluded from the run by the filter.
    pub skipped: usize,
}

impl RunStats {
    /// Returns true if the run was successful: no failures and no errors.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errored == 0
    }

    /// The process exit code this run maps to.
    pub fn exit_code(&self) -> i32 {
        if self.errored > 0 {
            RunExitCode::TEST_ERRORS
        } else if self.failed > 0 {
            RunExitCode::TEST_FAILURES
        } else {
            RunExitCode::SUCCESS
        }
    }

    pub(crate) fn on_test_finished(&mut self, status: &ExecuteStatus) {
        self.finished_count += 1;
        match status.outcome {
            TestOutcome::Pass => self.passed += 1,
            TestOutcome::Pending => self.pending += 1,
            TestOutcome::Fail => self.failed += 1,
            TestOutcome::Error => self.errored += 1,
        }
        if status.timed_out {
            self.timed_out += 1;
        }
    }
}

/// Process exit codes for the surface around a test run.
pub struct RunExitCode;

impl RunExitCode {
    /// Every active test passed or was pending.
    pub const SUCCESS: i32 = 0;
    /// Some tests failed; none errored.
    pub const TEST_FAILURES: i32 = 1;
    /// Some tests errored.
    pub const TEST_ERRORS: i32 = 2;
    /// The test set was listed without being executed.
    pub const LIST_ONLY: i32 = 1;
    /// The run configuration did not validate.
    pub const INVALID_CONFIG: i32 = 1;
}

/// The reason a run started cancelling before all tests finished.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub enum CancelReason {
    /// A test failed or errored and fail-fast is enabled.
    TestFailure,
    /// A shutdown signal was received.
    Signal,
}

/// A test event.
///
/// Events are passed to the callback given to
/// [`TestRunner::execute`](crate::runner::TestRunner::execute) as the run
/// progresses. They are purely observational: the engine never waits on the
/// observer and the observer cannot alter scheduling.
#[derive(Clone, Debug)]
pub struct TestEvent<'a> {
    /// The time at which this event was generated.
    pub timestamp: DateTime<FixedOffset>,
    /// The amount of time elapsed since the start of the run.
    pub elapsed: Duration,
    /// The kind of event.
    pub kind: TestEventKind<'a>,
}

/// The kind of a test event.
#[derive(Clone, Debug)]
pub enum TestEventKind<'a> {
    /// The run is about to begin.
    RunStarted {
        /// The list of tests that will be run, including filtered-out tests.
        test_list: &'a TestList,
    },

    /// A test is about to run.
    TestStarted {
        /// The test.
        test: &'a FlatTest,
        /// Statistics so far.
        current_stats: RunStats,
        /// The number of tests currently in flight, including this one.
        running: usize,
        /// Whether the run is cancelling.
        cancel_state: Option<CancelReason>,
    },

    /// A test finished and its result was recorded.
    TestFinished {
        /// The test.
        test: &'a FlatTest,
        /// The result.
        status: ExecuteStatus,
        /// Statistics, including this test.
        current_stats: RunStats,
        /// The number of tests still in flight.
        running: usize,
        /// Whether the run is cancelling.
        cancel_state: Option<CancelReason>,
    },

    /// A test was excluded from the run.
    TestSkipped {
        /// The test.
        test: &'a FlatTest,
        /// Why it was excluded.
        reason: MismatchReason,
    },

    /// The run began cancelling: no new tests will start.
    RunBeginCancel {
        /// The number of tests still in flight.
        running: usize,
        /// Why the run is cancelling.
        reason: CancelReason,
    },

    /// The run finished.
    RunFinished {
        /// When the run started.
        start_time: DateTime<FixedOffset>,
        /// Total wall-clock time.
        elapsed: Duration,
        /// Final statistics.
        run_stats: RunStats,
    },
}

/// A single test's contribution to a [`RunReport`].
#[derive(Clone, Debug)]
pub struct FinishedTest {
    /// The test's history key.
    pub history_key: String,
    /// The recorded result.
    pub status: ExecuteStatus,
}

/// Everything known about a completed run: the seed for history updates and
/// for the process exit status.
#[derive(Clone, Debug)]
pub struct RunReport {
    /// When the run started.
    pub start_time: DateTime<FixedOffset>,
    /// Total wall-clock time for the run.
    pub total_time: Duration,
    /// Bucketed statistics.
    pub stats: RunStats,
    /// Set if the run stopped before all active tests ran.
    pub cancel_reason: Option<CancelReason>,
    /// Per-test results, in completion order.
    pub results: Vec<FinishedTest>,
}

impl RunReport {
    /// The process exit code this run maps to.
    pub fn exit_code(&self) -> i32 {
        self.stats.exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(failed: usize, errored: usize) -> RunStats {
        RunStats {
            failed,
            errored,
            ..RunStats::default()
        }
    }

    #[test]
    fn exit_code_mapping() {
        assert_eq!(stats(0, 0).exit_code(), RunExitCode::SUCCESS);
        assert_eq!(stats(3, 0).exit_code(), RunExitCode::TEST_FAILURES);
        assert_eq!(stats(0, 1).exit_code(), RunExitCode::TEST_ERRORS);
        assert_eq!(stats(2, 2).exit_code(), RunExitCode::TEST_ERRORS);
    }

    #[test]
    fn pending_never_fails_a_run() {
        let mut run_stats = RunStats::default();
        run_stats.pending = 5;
        assert!(run_stats.is_success());
        assert_eq!(run_stats.exit_code(), RunExitCode::SUCCESS);
    }
}
