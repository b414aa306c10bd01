// Copyright (c) The arbor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Run configuration for the test runner.

use crate::errors::ConfigBuildError;
use std::time::Duration;

/// The concurrency degree for a test run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TestThreads {
    /// A fixed number of worker slots. `Count(1)` runs the whole list
    /// sequentially.
    Count(usize),
    /// As many worker slots as there are logical CPUs.
    NumCpus,
}

impl TestThreads {
    /// Computes the actual degree, never less than 1.
    pub fn compute(self) -> usize {
        match self {
            Self::Count(count) => count.max(1),
            Self::NumCpus => std::thread::available_parallelism().map_or(1, usize::from),
        }
    }
}

/// A validated run configuration.
///
/// Built with [`RunConfig::builder`]; passed to the runner as a read-only
/// context, never mutated during a run.
#[derive(Clone, Debug)]
pub struct RunConfig {
    test_threads: TestThreads,
    global_timeout: Option<Duration>,
    historic_timeout_factor: Option<f64>,
    fail_fast: bool,
    shuffle: bool,
    sort_by_history: bool,
    timeout_is_success: bool,
}

impl RunConfig {
    /// Returns a builder with sequential execution and no timeouts.
    pub fn builder() -> RunConfigBuilder {
        RunConfigBuilder::default()
    }

    /// The configured concurrency degree.
    pub fn test_threads(&self) -> TestThreads {
        self.test_threads
    }

    /// The global per-test timeout ceiling, if any.
    pub fn global_timeout(&self) -> Option<Duration> {
        self.global_timeout
    }

    /// The multiplier applied to historic durations to derive a per-test
    /// ceiling, if any.
    pub fn historic_timeout_factor(&self) -> Option<f64> {
        self.historic_timeout_factor
    }

    /// Whether a Fail or Error outcome stops scheduling of further tests.
    pub fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Whether the parallel batch runs in randomized order.
    pub fn shuffle(&self) -> bool {
        self.shuffle
    }

    /// Whether the active list is ordered by descending historic duration.
    pub fn sort_by_history(&self) -> bool {
        self.sort_by_history
    }

    /// Whether a timed-out test resolves to Pass instead of Error.
    pub fn timeout_is_success(&self) -> bool {
        self.timeout_is_success
    }
}

/// Builder for [`RunConfig`].
#[derive(Clone, Debug)]
pub struct RunConfigBuilder {
    test_threads: TestThreads,
    global_timeout: Option<Duration>,
    historic_timeout_factor: Option<f64>,
    fail_fast: bool,
    shuffle: bool,
    sort_by_history: bool,
    timeout_is_success: bool,
}

impl Default for RunConfigBuilder {
    fn default() -> Self {
        Self {
            test_threads: TestThreads::Count(1),
            global_timeout: None,
            historic_timeout_factor: None,
            fail_fast: false,
            shuffle: false,
            sort_by_history: false,
            timeout_is_success: false,
        }
    }
}

impl RunConfigBuilder {
    /// Sets the concurrency degree.
    pub fn set_test_threads(&mut self, test_threads: TestThreads) -> &mut Self {
        self.test_threads = test_threads;
        self
    }

    /// Sets the global per-test timeout ceiling.
    pub fn set_global_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.global_timeout = Some(timeout);
        self
    }

    /// Enables history-derived timeouts with the given multiplier.
    pub fn set_historic_timeout_factor(&mut self, factor: f64) -> &mut Self {
        self.historic_timeout_factor = Some(factor);
        self
    }

    /// Stops scheduling further tests after the first Fail or Error.
    pub fn set_fail_fast(&mut self, fail_fast: bool) -> &mut Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Randomizes the order of the parallel batch.
    pub fn set_shuffle(&mut self, shuffle: bool) -> &mut Self {
        self.shuffle = shuffle;
        self
    }

    /// Orders the active list by descending historic duration.
    pub fn set_sort_by_history(&mut self, sort_by_history: bool) -> &mut Self {
        self.sort_by_history = sort_by_history;
        self
    }

    /// Treats timing out as a success rather than an error.
    pub fn set_timeout_is_success(&mut self, timeout_is_success: bool) -> &mut Self {
        self.timeout_is_success = timeout_is_success;
        self
    }

    /// Validates and builds the configuration.
    pub fn build(&self) -> Result<RunConfig, ConfigBuildError> {
        if self.shuffle && self.sort_by_history {
            return Err(ConfigBuildError::ShuffleSortConflict);
        }
        if let Some(factor) = self.historic_timeout_factor {
            if !factor.is_finite() || factor <= 0.0 {
                return Err(ConfigBuildError::InvalidHistoricFactor { factor });
            }
        }
        Ok(RunConfig {
            test_threads: self.test_threads,
            global_timeout: self.global_timeout,
            historic_timeout_factor: self.historic_timeout_factor,
            fail_fast: self.fail_fast,
            shuffle: self.shuffle,
            sort_by_history: self.sort_by_history,
            timeout_is_success: self.timeout_is_success,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffle_and_sort_by_history_conflict() {
        let mut builder = RunConfig::builder();
        builder.set_shuffle(true).set_sort_by_history(true);
        assert!(matches!(
            builder.build(),
            Err(ConfigBuildError::ShuffleSortConflict)
        ));
    }

    #[test]
    fn historic_factor_must_be_positive_and_finite() {
        for factor in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            let mut builder = RunConfig::builder();
            builder.set_historic_timeout_factor(factor);
            assert!(
                matches!(
                    builder.build(),
                    Err(ConfigBuildError::InvalidHistoricFactor { .. })
                ),
                "factor {factor} should be rejected"
            );
        }
    }

    #[test]
    fn test_threads_compute_is_at_least_one() {
        assert_eq!(TestThreads::Count(0).compute(), 1);
        assert_eq!(TestThreads::Count(8).compute(), 8);
        assert!(TestThreads::NumCpus.compute() >= 1);
    }
}
