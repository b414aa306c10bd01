// Copyright (c) The arbor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Executes a single test under its deadline and classifies the raw result.

use super::internal_events::InternalExecuteStatus;
use crate::{
    list::FlatTest,
    reporter::events::{FailureSignal, TestOutcome},
    schedule::Deadline,
    time::{DeadlineResult, StopwatchSnapshot, run_with_deadline, stopwatch},
};
use std::any::Any;
use tokio::sync::broadcast;

/// Runs one test's action under `deadline`.
///
/// Returns `None` when an external interrupt cancelled the test: an
/// interrupted test terminates without a result.
pub(super) async fn run_test(
    test: &FlatTest,
    deadline: Deadline,
    cancel_rx: broadcast::Receiver<()>,
) -> Option<InternalExecuteStatus> {
    let stopwatch = stopwatch();

    match run_with_deadline(deadline, wait_for_interrupt(cancel_rx), || {
        test.make_future()
    })
    .await
    {
        DeadlineResult::Completed => Some(InternalExecuteStatus {
            outcome: Some(TestOutcome::Pass),
            message: None,
            location: None,
            calling_locations: Vec::new(),
            stopwatch_end: stopwatch.snapshot(),
            timed_out: false,
        }),
        DeadlineResult::Panicked(payload) => Some(classify_panic(payload, stopwatch.snapshot())),
        // The snapshot is taken when the deadline fires, so the measured
        // time is the enforced ceiling rather than the action's length.
        DeadlineResult::TimedOut => Some(InternalExecuteStatus {
            outcome: None,
            message: Some("timeout".to_owned()),
            location: None,
            calling_locations: Vec::new(),
            stopwatch_end: stopwatch.snapshot(),
            timed_out: true,
        }),
        DeadlineResult::Interrupted => None,
    }
}

/// Resolves when the dispatcher broadcasts a forced shutdown. If the sender
/// is gone no interrupt can arrive any more, so the future never resolves.
async fn wait_for_interrupt(mut cancel_rx: broadcast::Receiver<()>) {
    loop {
        match cancel_rx.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => break,
            Err(broadcast::error::RecvError::Closed) => std::future::pending::<()>().await,
        }
    }
}

/// Maps a caught panic to an outcome: the framework's own failure signal
/// carries its outcome, message and locations; any other payload is an
/// arbitrary fault and classifies as Error.
fn classify_panic(
    payload: Box<dyn Any + Send>,
    stopwatch_end: StopwatchSnapshot,
) -> InternalExecuteStatus {
    match payload.downcast::<FailureSignal>() {
        Ok(signal) => {
            let signal = *signal;
            InternalExecuteStatus {
                outcome: Some(signal.outcome),
                message: Some(signal.message),
                location: signal.location,
                calling_locations: signal.calling_locations,
                stopwatch_end,
                timed_out: false,
            }
        }
        Err(payload) => InternalExecuteStatus {
            outcome: Some(TestOutcome::Error),
            message: Some(panic_message(&*payload)),
            location: None,
            calling_locations: Vec::new(),
            stopwatch_end,
            timed_out: false,
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "test panicked with a non-string payload".to_owned()
    }
}
