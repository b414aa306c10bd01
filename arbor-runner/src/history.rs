// Copyright (c) The arbor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Historic run data, persisted across process invocations.
//!
//! The history maps a test's stable key to its most recent runs. The engine
//! reads it at scheduling time (per-test time budgets, ordering) and writes
//! it exactly once, after a run completes. Persistence problems degrade to
//! "no historic data"; they never fail a run.

use crate::{
    errors::HistoryWriteError,
    reporter::events::{RunReport, TestOutcome},
};
use atomicwrites::{AtomicFile, OverwriteBehavior};
use camino::Utf8Path;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, io, time::Duration};
use tracing::warn;

/// How many records are retained per test, most recent first.
pub const MAX_RECORDS_PER_TEST: usize = 16;

/// One historic observation of a test.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// The start timestamp of the run this record came from.
    pub started_at: DateTime<FixedOffset>,
    /// Measured wall-clock time.
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    /// The resolved outcome.
    pub outcome: TestOutcome,
    /// Whether the test hit its deadline.
    pub timed_out: bool,
}

/// Historic run data for a set of tests.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestHistory {
    tests: BTreeMap<String, Vec<HistoryRecord>>,
}

impl TestHistory {
    /// Loads history from `path`.
    ///
    /// A missing or unparseable file yields empty history: stale or corrupt
    /// historic data must never prevent a run.
    pub fn load(path: &Utf8Path) -> Self {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(error) => {
                if error.kind() != io::ErrorKind::NotFound {
                    warn!(%path, %error, "failed to read history file, starting empty");
                }
                return Self::default();
            }
        };
        match serde_json::from_str(&data) {
            Ok(history) => history,
            Err(error) => {
                warn!(%path, %error, "failed to parse history file, starting empty");
                Self::default()
            }
        }
    }

    /// Persists the history to `path`, atomically.
    pub fn save(&self, path: &Utf8Path) -> Result<(), HistoryWriteError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|error| HistoryWriteError::new(path, error))?;
        }
        AtomicFile::new(path, OverwriteBehavior::AllowOverwrite)
            .write(|file| serde_json::to_writer_pretty(file, self))
            .map_err(|error| {
                HistoryWriteError::new(
                    path,
                    match error {
                        atomicwrites::Error::Internal(error) => error,
                        atomicwrites::Error::User(error) => io::Error::other(error),
                    },
                )
            })
    }

    /// The records for a test, most recent first.
    pub fn records(&self, history_key: &str) -> &[HistoryRecord] {
        self.tests.get(history_key).map_or(&[], Vec::as_slice)
    }

    /// The duration of the most recent run, whatever its outcome.
    pub fn last_duration(&self, history_key: &str) -> Option<Duration> {
        self.records(history_key).first().map(|record| record.duration)
    }

    /// The duration of the most recent passing run.
    pub fn last_successful_duration(&self, history_key: &str) -> Option<Duration> {
        self.records(history_key)
            .iter()
            .find(|record| record.outcome == TestOutcome::Pass)
            .map(|record| record.duration)
    }

    /// The duration the scheduler treats as this test's known runtime: the
    /// maximum of the last successful and the last overall duration, so a
    /// single fast failing run cannot tighten the budget below a slower
    /// passing one.
    pub fn known_duration(&self, history_key: &str) -> Option<Duration> {
        match (
            self.last_successful_duration(history_key),
            self.last_duration(history_key),
        ) {
            (Some(successful), Some(any)) => Some(successful.max(any)),
            (successful, any) => successful.or(any),
        }
    }

    /// Returns true if no test has any records.
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Records one entry per executed test from a completed run, tagged with
    /// the run's start timestamp. The single update step of a run.
    pub fn record_run(&mut self, report: &RunReport) {
        for test in &report.results {
            let records = self.tests.entry(test.history_key.clone()).or_default();
            records.insert(
                0,
                HistoryRecord {
                    started_at: report.start_time,
                    duration: test.status.time_taken,
                    outcome: test.status.outcome,
                    timed_out: test.status.timed_out,
                },
            );
            records.truncate(MAX_RECORDS_PER_TEST);
        }
    }
}
