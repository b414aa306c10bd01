// Copyright (c) The arbor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Internal events used between the runner components.
//!
//! These events mirror those in [`crate::reporter::events`], but are used
//! within the runner: they carry pre-resolution results that only the
//! dispatcher may turn into external statuses.

use crate::{
    list::{FlatTest, MismatchReason, SourceLocation},
    reporter::events::{ExecuteStatus, TestOutcome},
    time::StopwatchSnapshot,
};
use tokio::sync::oneshot;

/// An internal event.
///
/// These events are sent by the executor futures (the part that actually
/// runs test actions) to the dispatcher (the part of the runner that owns
/// shared run state and coordinates with the external world).
#[derive(Debug)]
pub(super) enum ExecutorEvent<'a> {
    Started {
        test: &'a FlatTest,
    },
    Finished {
        test: &'a FlatTest,
        status: InternalExecuteStatus,
        // The executor waits on this before freeing its worker slot, so the
        // dispatcher's post-processing (including the fail-fast stop signal)
        // always lands before the next entry can start.
        ack: oneshot::Sender<()>,
    },
    Skipped {
        test: &'a FlatTest,
        reason: MismatchReason,
    },
}

/// A test result as the executor sees it: the timeout case is still
/// unresolved and carries no outcome yet.
#[derive(Debug)]
pub(super) struct InternalExecuteStatus {
    /// `None` exactly when the test timed out without any other signal;
    /// resolution happens in the dispatcher, from configuration.
    pub(super) outcome: Option<TestOutcome>,
    pub(super) message: Option<String>,
    pub(super) location: Option<SourceLocation>,
    pub(super) calling_locations: Vec<SourceLocation>,
    pub(super) stopwatch_end: StopwatchSnapshot,
    pub(super) timed_out: bool,
}

impl InternalExecuteStatus {
    pub(super) fn into_external(
        self,
        timeout_is_success: bool,
        output_index: usize,
    ) -> ExecuteStatus {
        let outcome = self.outcome.unwrap_or(if timeout_is_success {
            TestOutcome::Pass
        } else {
            TestOutcome::Error
        });
        ExecuteStatus {
            outcome,
            message: self.message,
            location: self.location,
            calling_locations: self.calling_locations,
            start_time: self.stopwatch_end.start_time.fixed_offset(),
            time_taken: self.stopwatch_end.duration,
            timed_out: self.timed_out,
            output_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::stopwatch;

    fn unresolved_timeout() -> InternalExecuteStatus {
        InternalExecuteStatus {
            outcome: None,
            message: Some("timeout".to_owned()),
            location: None,
            calling_locations: Vec::new(),
            stopwatch_end: stopwatch().snapshot(),
            timed_out: true,
        }
    }

    #[test]
    fn timeout_resolves_from_configuration() {
        let as_error = unresolved_timeout().into_external(false, 0);
        assert_eq!(as_error.outcome, TestOutcome::Error);
        assert!(as_error.timed_out);

        let as_pass = unresolved_timeout().into_external(true, 0);
        assert_eq!(as_pass.outcome, TestOutcome::Pass);
        assert!(as_pass.timed_out);
    }

    #[test]
    fn concrete_outcomes_are_unaffected_by_timeout_configuration() {
        let status = InternalExecuteStatus {
            outcome: Some(TestOutcome::Fail),
            message: Some("expected 1, got 2".to_owned()),
            location: None,
            calling_locations: Vec::new(),
            stopwatch_end: stopwatch().snapshot(),
            timed_out: false,
        };
        let external = status.into_external(true, 3);
        assert_eq!(external.outcome, TestOutcome::Fail);
        assert_eq!(external.output_index, 3);
    }
}
