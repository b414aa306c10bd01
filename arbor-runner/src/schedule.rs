// Copyright (c) The arbor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adaptive scheduling: per-test time budgets and run ordering.

use crate::{config::RunConfig, history::TestHistory, list::FlatTest};
use rand::seq::SliceRandom;
use std::{cmp::Ordering, time::Duration};

/// The time budget enforced for one test.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Deadline {
    /// No deadline: the action runs untimed.
    Unbounded,
    /// The action must finish within this duration. A zero duration times
    /// out immediately, without the action ever starting.
    After(Duration),
}

impl Deadline {
    /// Builds a deadline from signed milliseconds: negative values mean
    /// unbounded.
    pub fn from_millis(millis: i64) -> Self {
        if millis < 0 {
            Self::Unbounded
        } else {
            Self::After(Duration::from_millis(millis as u64))
        }
    }

    /// Returns true if no deadline is enforced.
    pub fn is_unbounded(self) -> bool {
        matches!(self, Self::Unbounded)
    }
}

/// Computes the effective timeout for one test.
///
/// The configured global ceiling and the history-derived ceiling (`factor ×`
/// the test's known duration, rounded up to whole milliseconds) are combined
/// by taking the minimum of whichever are present; with neither present the
/// test runs unbounded.
pub fn effective_timeout(config: &RunConfig, history: &TestHistory, history_key: &str) -> Deadline {
    let configured = config.global_timeout();
    let historic = config.historic_timeout_factor().and_then(|factor| {
        history
            .known_duration(history_key)
            .map(|duration| scale_duration(duration, factor))
    });

    match (configured, historic) {
        (Some(configured), Some(historic)) => Deadline::After(configured.min(historic)),
        (Some(configured), None) => Deadline::After(configured),
        (None, Some(historic)) => Deadline::After(historic),
        (None, None) => Deadline::Unbounded,
    }
}

/// Ceiling to whole milliseconds: a sub-millisecond historic run still gets
/// a nonzero budget.
fn scale_duration(duration: Duration, factor: f64) -> Duration {
    let millis = duration.as_micros() as f64 / 1000.0 * factor;
    Duration::from_millis(millis.ceil() as u64)
}

/// Orders tests by descending known historic duration; tests with no known
/// duration run last. The sort is stable, so ties keep declaration order.
pub fn sort_by_historic_duration(tests: &mut [&FlatTest], history: &TestHistory) {
    tests.sort_by(|a, b| {
        let a = history.known_duration(a.history_key());
        let b = history.known_duration(b.history_key());
        match (a, b) {
            (Some(a), Some(b)) => b.cmp(&a),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    });
}

/// Randomizes the order of a batch of tests.
pub fn shuffle_tests(tests: &mut [&FlatTest]) {
    tests.shuffle(&mut rand::rng());
}
