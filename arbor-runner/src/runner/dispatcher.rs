// Copyright (c) The arbor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The controller for the test runner.
//!
//! This module interfaces with the external world and the executor futures.
//! It receives events from the executors and from signal handling, and sends
//! events to the run callback. It is the exclusive owner of the shared run
//! state: the completion-ordered result list and the reporting index are
//! only ever touched while the dispatcher handles a single event, which is
//! what serializes concurrent post-hooks.

use super::internal_events::ExecutorEvent;
use crate::{
    list::TestList,
    reporter::events::{
        CancelReason, FinishedTest, RunReport, RunStats, TestEvent, TestEventKind,
    },
    signal::SignalHandler,
    time::StopwatchStart,
};
use debug_ignore::DebugIgnore;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc::UnboundedReceiver};
use tracing::debug;

/// Context for the dispatcher.
#[derive(Debug)]
pub(super) struct DispatcherContext<'a, F> {
    callback: DebugIgnore<F>,
    test_list: &'a TestList,
    stopwatch: StopwatchStart,
    run_stats: RunStats,
    fail_fast: bool,
    timeout_is_success: bool,
    output_index: usize,
    results: Vec<FinishedTest>,
    running: usize,
    cancel_state: Option<CancelReason>,
}

impl<'a, F> DispatcherContext<'a, F>
where
    F: FnMut(TestEvent<'a>) + Send,
{
    pub(super) fn new(
        callback: F,
        test_list: &'a TestList,
        fail_fast: bool,
        timeout_is_success: bool,
    ) -> Self {
        Self {
            callback: DebugIgnore(callback),
            test_list,
            stopwatch: crate::time::stopwatch(),
            run_stats: RunStats {
                initial_run_count: test_list.run_count(),
                ..RunStats::default()
            },
            fail_fast,
            timeout_is_success,
            output_index: 0,
            results: Vec::new(),
            running: 0,
            cancel_state: None,
        }
    }

    pub(super) fn run_started(&mut self) {
        self.basic_callback(TestEventKind::RunStarted {
            test_list: self.test_list,
        });
    }

    /// Runs the dispatcher to completion, until `executor_rx` is closed.
    ///
    /// This is expected to be spawned as a task via [`async_scoped`].
    pub(super) async fn run(
        &mut self,
        mut executor_rx: UnboundedReceiver<ExecutorEvent<'a>>,
        signal_handler: &mut SignalHandler,
        cancelled_ref: &AtomicBool,
        cancel_tx: broadcast::Sender<()>,
    ) {
        let mut signals_done = false;
        loop {
            tokio::select! {
                event = executor_rx.recv() => {
                    match event {
                        Some(event) => self.handle_executor_event(event, cancelled_ref),
                        // All executors have finished.
                        None => break,
                    }
                }
                event = signal_handler.recv(), if !signals_done => {
                    match event {
                        Some(event) => {
                            debug!(?event, "shutdown signal received");
                            self.begin_cancel(CancelReason::Signal, cancelled_ref);
                            // In-flight tests get a forced, externally-originated
                            // cancellation and produce no results.
                            let _ = cancel_tx.send(());
                        }
                        None => signals_done = true,
                    }
                }
            }
        }
    }

    fn handle_executor_event(&mut self, event: ExecutorEvent<'a>, cancelled_ref: &AtomicBool) {
        match event {
            ExecutorEvent::Started { test } => {
                self.running += 1;
                self.basic_callback(TestEventKind::TestStarted {
                    test,
                    current_stats: self.run_stats,
                    running: self.running,
                    cancel_state: self.cancel_state,
                });
            }
            ExecutorEvent::Finished { test, status, ack } => {
                self.running -= 1;
                let status = status.into_external(self.timeout_is_success, self.output_index);
                self.output_index += 1;
                self.run_stats.on_test_finished(&status);
                self.results.push(FinishedTest {
                    history_key: test.history_key().to_owned(),
                    status: status.clone(),
                });

                let stops_the_run = status.outcome.is_failure();
                self.basic_callback(TestEventKind::TestFinished {
                    test,
                    status,
                    current_stats: self.run_stats,
                    running: self.running,
                    cancel_state: self.cancel_state,
                });
                if stops_the_run && self.fail_fast {
                    self.begin_cancel(CancelReason::TestFailure, cancelled_ref);
                }

                // Only acknowledge once the stop signal is settled: the
                // executor side waits on this before starting anything new.
                let _ = ack.send(());
            }
            ExecutorEvent::Skipped { test, reason } => {
                self.run_stats.skipped += 1;
                self.basic_callback(TestEventKind::TestSkipped { test, reason });
            }
        }
    }

    fn begin_cancel(&mut self, reason: CancelReason, cancelled_ref: &AtomicBool) {
        // A Signal cancellation may override a TestFailure one, never the
        // other way around.
        if self.cancel_state < Some(reason) {
            self.cancel_state = Some(reason);
            debug!(?reason, "cancelling test run");
            cancelled_ref.store(true, Ordering::Release);
            self.basic_callback(TestEventKind::RunBeginCancel {
                running: self.running,
                reason,
            });
        }
    }

    pub(super) fn run_finished(&mut self) {
        let snapshot = self.stopwatch.snapshot();
        self.basic_callback(TestEventKind::RunFinished {
            start_time: snapshot.start_time.fixed_offset(),
            elapsed: snapshot.duration,
            run_stats: self.run_stats,
        });
    }

    fn basic_callback(&mut self, kind: TestEventKind<'a>) {
        let snapshot = self.stopwatch.snapshot();
        let event = TestEvent {
            timestamp: snapshot.end_time().fixed_offset(),
            elapsed: snapshot.duration,
            kind,
        };
        (self.callback.0)(event);
    }

    pub(super) fn into_report(self) -> RunReport {
        let snapshot = self.stopwatch.snapshot();
        RunReport {
            start_time: snapshot.start_time.fixed_offset(),
            total_time: snapshot.duration,
            stats: self.run_stats,
            cancel_reason: self.cancel_state,
            results: self.results,
        }
    }
}
