// Copyright (c) The arbor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Basic tests for the test runner.

use arbor_runner::{
    config::{RunConfig, TestThreads},
    history::TestHistory,
    list::{TestCase, TestKind, TestList, TestTree},
    reporter::events::{
        CancelReason, FailureSignal, RunExitCode, RunReport, TestEvent, TestEventKind, TestOutcome,
    },
    runner::TestRunnerBuilder,
    signal::SignalHandlerKind,
};
use maplit::btreemap;
use pretty_assertions::assert_eq;
use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

/// Runs a list and returns the report plus a flat textual log of the events,
/// in the order they were observed.
fn execute_list(
    test_list: &TestList,
    config: &RunConfig,
    history: &TestHistory,
) -> (RunReport, Vec<String>) {
    let runner = TestRunnerBuilder::default()
        .build(test_list, config, history, SignalHandlerKind::Noop)
        .expect("building the test runner should succeed");

    let events = Mutex::new(Vec::new());
    let report = runner
        .execute(|event| events.lock().unwrap().push(label(&event)))
        .expect("no runner task should panic");
    (report, events.into_inner().unwrap())
}

fn execute(trees: Vec<TestTree>, config: &RunConfig) -> (RunReport, Vec<String>) {
    let test_list = TestList::all(trees);
    execute_list(&test_list, config, &TestHistory::default())
}

fn label(event: &TestEvent<'_>) -> String {
    match &event.kind {
        TestEventKind::RunStarted { .. } => "run-started".to_owned(),
        TestEventKind::TestStarted { test, .. } => format!("started {}", test.history_key()),
        TestEventKind::TestFinished { test, status, .. } => {
            format!("finished {} {:?}", test.history_key(), status.outcome)
        }
        TestEventKind::TestSkipped { test, .. } => format!("skipped {}", test.history_key()),
        TestEventKind::RunBeginCancel { reason, .. } => format!("begin-cancel {reason:?}"),
        TestEventKind::RunFinished { .. } => "run-finished".to_owned(),
    }
}

fn buckets(report: &RunReport) -> BTreeMap<&'static str, Vec<String>> {
    let mut map: BTreeMap<&'static str, Vec<String>> = BTreeMap::new();
    for test in &report.results {
        let bucket = match test.status.outcome {
            TestOutcome::Pass => "passed",
            TestOutcome::Pending => "pending",
            TestOutcome::Fail => "failed",
            TestOutcome::Error => "errored",
        };
        map.entry(bucket).or_default().push(test.history_key.clone());
    }
    map
}

/// A group with one passing, one failing and one faulting test.
fn abc_suite() -> Vec<TestTree> {
    vec![TestTree::group(
        "suite",
        vec![
            TestTree::test("a", || async {}),
            TestTree::test("b", || async {
                FailureSignal::fail("expected 1, got 2").raise()
            }),
            TestTree::test("c", || async { panic!("unrelated fault") }),
        ],
    )]
}

#[test]
fn sequential_run_buckets_and_exit_status() {
    let config = RunConfig::builder().build().unwrap();
    let (report, events) = execute(abc_suite(), &config);

    assert_eq!(
        buckets(&report),
        btreemap! {
            "passed" => vec!["suite.a".to_owned()],
            "failed" => vec!["suite.b".to_owned()],
            "errored" => vec!["suite.c".to_owned()],
        }
    );
    assert_eq!(report.exit_code(), RunExitCode::TEST_ERRORS);
    assert_eq!(report.stats.finished_count, 3);
    assert_eq!(report.stats.timed_out, 0);
    assert_eq!(report.cancel_reason, None);

    let failed = &report.results[1];
    assert_eq!(failed.status.message.as_deref(), Some("expected 1, got 2"));
    let errored = &report.results[2];
    assert_eq!(errored.status.message.as_deref(), Some("unrelated fault"));

    // A sequential run reports in declaration order, pre before post.
    assert_eq!(
        events,
        [
            "run-started",
            "started suite.a",
            "finished suite.a Pass",
            "started suite.b",
            "finished suite.b Fail",
            "started suite.c",
            "finished suite.c Error",
            "run-finished",
        ]
    );
}

#[test]
fn identical_runs_produce_identical_buckets() {
    let config = RunConfig::builder().build().unwrap();
    let (first, _) = execute(abc_suite(), &config);
    let (second, _) = execute(abc_suite(), &config);
    assert_eq!(first.stats, second.stats);
    assert_eq!(buckets(&first), buckets(&second));
}

#[test]
fn fail_fast_stops_before_later_tests_start() {
    let started = Arc::new(AtomicBool::new(false));
    let started_ref = started.clone();

    let trees = vec![
        TestTree::test("a", || async {}),
        TestTree::test("b", || async { FailureSignal::fail("nope").raise() }),
        TestTree::test("c", move || {
            let started = started_ref.clone();
            async move {
                started.store(true, Ordering::SeqCst);
            }
        }),
    ];

    let mut builder = RunConfig::builder();
    builder.set_fail_fast(true);
    let config = builder.build().unwrap();

    let (report, events) = execute(trees, &config);

    let keys: Vec<_> = report
        .results
        .iter()
        .map(|test| test.history_key.clone())
        .collect();
    assert_eq!(keys, ["a", "b"]);
    assert!(
        !started.load(Ordering::SeqCst),
        "the third test must never start"
    );
    assert_eq!(report.cancel_reason, Some(CancelReason::TestFailure));
    assert_eq!(report.exit_code(), RunExitCode::TEST_FAILURES);
    assert!(events.contains(&"begin-cancel TestFailure".to_owned()));
}

#[test]
fn pending_and_pass_never_stop_a_fail_fast_run() {
    let trees = vec![
        TestTree::test("undecided", || async {
            FailureSignal::pending("needs a decision").raise()
        }),
        TestTree::test("fine", || async {}),
    ];

    let mut builder = RunConfig::builder();
    builder.set_fail_fast(true);
    let config = builder.build().unwrap();

    let (report, _) = execute(trees, &config);
    assert_eq!(report.stats.finished_count, 2);
    assert_eq!(report.stats.pending, 1);
    assert_eq!(report.stats.passed, 1);
    assert_eq!(report.cancel_reason, None);
    assert_eq!(report.exit_code(), RunExitCode::SUCCESS);
}

#[test]
fn timeout_resolves_by_configuration() {
    for (timeout_is_success, expected_outcome, expected_code) in [
        (false, TestOutcome::Error, RunExitCode::TEST_ERRORS),
        (true, TestOutcome::Pass, RunExitCode::SUCCESS),
    ] {
        let trees = vec![TestTree::test("sleepy", || async {
            tokio::time::sleep(Duration::from_millis(500)).await;
        })];

        let mut builder = RunConfig::builder();
        builder
            .set_global_timeout(Duration::from_millis(50))
            .set_timeout_is_success(timeout_is_success);
        let config = builder.build().unwrap();

        let (report, _) = execute(trees, &config);
        let status = &report.results[0].status;

        assert_eq!(status.outcome, expected_outcome);
        assert_eq!(status.message.as_deref(), Some("timeout"));
        assert!(status.timed_out);
        assert_eq!(report.stats.timed_out, 1);
        assert_eq!(report.exit_code(), expected_code);

        // The measured time is the enforced ceiling, not the 500ms sleep.
        assert!(
            status.time_taken >= Duration::from_millis(45),
            "time_taken {:?} should be at least the ceiling",
            status.time_taken
        );
        assert!(
            status.time_taken < Duration::from_millis(400),
            "time_taken {:?} should not include the full sleep",
            status.time_taken
        );
    }
}

#[test]
fn filtered_tests_are_enumerated_but_not_run() {
    let trees = vec![TestTree::group(
        "suite",
        vec![
            TestTree::test("keep", || async {}),
            TestTree::test("skip_me", || async { panic!("must not run") }),
        ],
    )];
    let test_list = TestList::new(trees, |test| test.path().id != "skip_me");
    assert_eq!(test_list.run_count(), 1);
    assert_eq!(test_list.skip_count(), 1);

    let config = RunConfig::builder().build().unwrap();
    let (report, events) = execute_list(&test_list, &config, &TestHistory::default());

    assert_eq!(report.stats.skipped, 1);
    assert_eq!(report.stats.finished_count, 1);
    assert_eq!(report.exit_code(), RunExitCode::SUCCESS);
    assert!(events.contains(&"skipped suite.skip_me".to_owned()));
}

fn ordered_test(id: &str, order: &Arc<Mutex<Vec<String>>>, delay: Duration) -> TestCase {
    let order = order.clone();
    let recorded = id.to_owned();
    TestCase::new(id, TestKind::Unit, move || {
        let order = order.clone();
        let recorded = recorded.clone();
        async move {
            tokio::time::sleep(delay).await;
            order.lock().unwrap().push(recorded);
        }
    })
}

#[test]
fn parallel_batch_drains_before_the_serial_tail() {
    let order = Arc::new(Mutex::new(Vec::new()));

    let mut children = Vec::new();
    for index in 0..4 {
        children.push(TestTree::case(ordered_test(
            &format!("p{index}"),
            &order,
            Duration::from_millis(30),
        )));
    }
    for index in 0..2 {
        children.push(TestTree::case(
            ordered_test(&format!("s{index}"), &order, Duration::ZERO).serial(),
        ));
    }

    let mut builder = RunConfig::builder();
    builder.set_test_threads(TestThreads::Count(4));
    let config = builder.build().unwrap();

    let (report, _) = execute(vec![TestTree::group("g", children)], &config);

    assert_eq!(report.stats.finished_count, 6);
    assert_eq!(report.stats.passed, 6);

    let order = order.lock().unwrap();
    assert_eq!(order.len(), 6);
    let first_serial = order.iter().position(|id| id.starts_with('s')).unwrap();
    assert!(
        order[first_serial..].iter().all(|id| id.starts_with('s')),
        "serial tests must run after the parallel batch: {order:?}"
    );
    assert_eq!(order[first_serial..], ["s0", "s1"]);

    // Post-hooks are serialized: display indexes are unique and dense.
    let mut indexes: Vec<_> = report
        .results
        .iter()
        .map(|test| test.status.output_index)
        .collect();
    indexes.sort_unstable();
    assert_eq!(indexes, (0..6usize).collect::<Vec<_>>());
}

#[test]
fn history_derived_budget_times_out_a_regressed_test() {
    // First run: fast and passing, with no budget in play.
    let trees = vec![TestTree::test("hot_path", || async {
        tokio::time::sleep(Duration::from_millis(10)).await;
    })];
    let config = RunConfig::builder().build().unwrap();
    let (report, _) = execute(trees, &config);
    assert_eq!(report.exit_code(), RunExitCode::SUCCESS);

    let mut history = TestHistory::default();
    history.record_run(&report);
    assert!(history.known_duration("hot_path").is_some());

    // Second run: the test regressed well past factor x its history.
    let trees = vec![TestTree::test("hot_path", || async {
        tokio::time::sleep(Duration::from_millis(500)).await;
    })];
    let mut builder = RunConfig::builder();
    builder.set_historic_timeout_factor(2.0);
    let config = builder.build().unwrap();

    let test_list = TestList::all(trees);
    let (report, _) = execute_list(&test_list, &config, &history);

    let status = &report.results[0].status;
    assert!(status.timed_out, "the regressed run must hit its budget");
    assert_eq!(status.outcome, TestOutcome::Error);
    assert!(status.time_taken < Duration::from_millis(400));
}

#[test]
fn run_report_seeds_history_for_every_executed_test() {
    let config = RunConfig::builder().build().unwrap();
    let (report, _) = execute(abc_suite(), &config);

    let mut history = TestHistory::default();
    history.record_run(&report);

    for key in ["suite.a", "suite.b", "suite.c"] {
        assert_eq!(history.records(key).len(), 1, "one record for {key}");
        assert_eq!(history.records(key)[0].started_at, report.start_time);
    }
}
