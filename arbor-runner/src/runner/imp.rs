// Copyright (c) The arbor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use super::{dispatcher::DispatcherContext, executor, internal_events::ExecutorEvent};
use crate::{
    config::{RunConfig, TestThreads},
    errors::{TestRunnerBuildError, TestRunnerExecuteErrors},
    history::TestHistory,
    list::{FlatTest, MismatchReason, TestList},
    reporter::events::{RunReport, TestEvent},
    schedule,
    signal::{SignalHandler, SignalHandlerKind},
};
use async_scoped::TokioScope;
use futures::{prelude::*, stream};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::{
    runtime::Runtime,
    sync::{
        broadcast,
        mpsc::{UnboundedSender, unbounded_channel},
        oneshot,
    },
    task::JoinError,
};
use tracing::debug;

/// Test runner options.
#[derive(Debug, Default)]
pub struct TestRunnerBuilder {
    test_threads: Option<TestThreads>,
}

impl TestRunnerBuilder {
    /// Overrides the configured number of tests to run simultaneously.
    pub fn set_test_threads(&mut self, test_threads: TestThreads) -> &mut Self {
        self.test_threads = Some(test_threads);
        self
    }

    /// Creates a new test runner.
    pub fn build<'a>(
        self,
        test_list: &'a TestList,
        config: &'a RunConfig,
        history: &'a TestHistory,
        signal_handler: SignalHandlerKind,
    ) -> Result<TestRunner<'a>, TestRunnerBuildError> {
        let test_threads = self
            .test_threads
            .unwrap_or_else(|| config.test_threads())
            .compute();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("arbor-runner-worker")
            .build()
            .map_err(TestRunnerBuildError::TokioRuntimeCreate)?;
        let _guard = runtime.enter();

        // signal_handler.build() must be called from within the guard.
        let signal_handler = signal_handler.build()?;

        Ok(TestRunner {
            inner: TestRunnerInner {
                config,
                test_threads,
                test_list,
                history,
                runtime,
            },
            signal_handler,
        })
    }
}

/// Context for running tests.
///
/// Created using [`TestRunnerBuilder::build`].
#[derive(Debug)]
pub struct TestRunner<'a> {
    inner: TestRunnerInner<'a>,
    signal_handler: SignalHandler,
}

impl<'a> TestRunner<'a> {
    /// Executes the active tests in the list.
    ///
    /// The callback is called with the events of the run as they happen.
    /// Returns the run report, from which the exit code is derived and with
    /// which the history store is updated.
    ///
    /// Returns an error if any of the runner's own tasks panicked; per-test
    /// panics become Error results instead.
    pub fn execute<F>(mut self, callback: F) -> Result<RunReport, TestRunnerExecuteErrors>
    where
        F: FnMut(TestEvent<'a>) + Send,
    {
        let (report, join_errors) = self.inner.execute(&mut self.signal_handler, callback);

        // Cancelled actions may be stuck in blocking code; shut the runtime
        // down without waiting for them.
        self.inner.runtime.shutdown_background();

        if join_errors.is_empty() {
            Ok(report)
        } else {
            Err(TestRunnerExecuteErrors { join_errors })
        }
    }
}

#[derive(Debug)]
struct TestRunnerInner<'a> {
    config: &'a RunConfig,
    test_threads: usize,
    test_list: &'a TestList,
    history: &'a TestHistory,
    runtime: Runtime,
}

impl<'a> TestRunnerInner<'a> {
    fn execute<F>(
        &self,
        signal_handler: &mut SignalHandler,
        callback: F,
    ) -> (RunReport, Vec<JoinError>)
    where
        F: FnMut(TestEvent<'a>) + Send,
    {
        let cancelled = AtomicBool::new(false);
        let cancelled_ref = &cancelled;

        let mut dispatcher_cx = DispatcherContext::new(
            callback,
            self.test_list,
            self.config.fail_fast(),
            self.config.timeout_is_success(),
        );

        // Send the initial event before anything can run.
        dispatcher_cx.run_started();

        let dispatcher_cx_mut = &mut dispatcher_cx;

        let _guard = self.runtime.enter();

        let ((), results) = TokioScope::scope_and_block(move |scope| {
            let (resp_tx, resp_rx) = unbounded_channel::<ExecutorEvent<'a>>();
            let (cancel_tx, _cancel_rx) = broadcast::channel::<()>(1);

            // Run the dispatcher to completion in a task.
            let dispatcher_fut =
                dispatcher_cx_mut.run(resp_rx, signal_handler, cancelled_ref, cancel_tx.clone());
            scope.spawn_cancellable(dispatcher_fut, || ());

            let mut active: Vec<&'a FlatTest> = self.test_list.iter_tests().collect();
            if self.config.sort_by_history() {
                schedule::sort_by_historic_duration(&mut active, self.history);
            }

            let driver_fut = async move {
                for test in self.test_list.iter_skipped() {
                    let _ = resp_tx.send(ExecutorEvent::Skipped {
                        test,
                        reason: MismatchReason::Filtered,
                    });
                }

                if self.test_threads > 1 {
                    let (mut parallel, serial): (Vec<_>, Vec<_>) = active
                        .into_iter()
                        .partition(|test| test.options().parallel);
                    // Shuffling is scoped to the parallel batch; the active
                    // list as a whole was already ordered above.
                    if self.config.shuffle() {
                        schedule::shuffle_tests(&mut parallel);
                    }

                    debug!(
                        parallel = parallel.len(),
                        serial = serial.len(),
                        test_threads = self.test_threads,
                        "dispatching tests"
                    );

                    // Entries start in order as worker slots free up and
                    // finish in any order.
                    stream::iter(parallel)
                        .for_each_concurrent(self.test_threads, |test| {
                            self.run_one(test, &resp_tx, &cancel_tx, cancelled_ref)
                        })
                        .await;

                    // Tests that opted out of parallelism run strictly one
                    // after another, once the parallel batch has drained.
                    for test in serial {
                        self.run_one(test, &resp_tx, &cancel_tx, cancelled_ref).await;
                    }
                } else {
                    for test in active {
                        self.run_one(test, &resp_tx, &cancel_tx, cancelled_ref).await;
                    }
                }
            };
            scope.spawn_cancellable(driver_fut, || ());
        });

        dispatcher_cx.run_finished();

        let join_errors = results
            .into_iter()
            .filter_map(|result| result.err())
            .collect();
        (dispatcher_cx.into_report(), join_errors)
    }

    /// Runs a single entry: the pre-report, the action under its deadline,
    /// and the post-report, in that order.
    async fn run_one(
        &self,
        test: &'a FlatTest,
        resp_tx: &UnboundedSender<ExecutorEvent<'a>>,
        cancel_tx: &broadcast::Sender<()>,
        cancelled_ref: &AtomicBool,
    ) {
        if cancelled_ref.load(Ordering::Acquire) {
            // The stop signal was raised before this entry started: it never
            // runs and produces no result.
            return;
        }

        let deadline = schedule::effective_timeout(self.config, self.history, test.history_key());
        debug!(test = %test.path(), ?deadline, "running test");

        let _ = resp_tx.send(ExecutorEvent::Started { test });

        match executor::run_test(test, deadline, cancel_tx.subscribe()).await {
            Some(status) => {
                let (ack_tx, ack_rx) = oneshot::channel();
                let _ = resp_tx.send(ExecutorEvent::Finished {
                    test,
                    status,
                    ack: ack_tx,
                });
                // Hold this worker slot until the dispatcher has applied the
                // result and possibly raised the stop signal.
                let _ = ack_rx.await;
            }
            None => {
                // Interrupted by shutdown: terminates without a result.
            }
        }
    }
}
