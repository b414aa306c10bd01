// Copyright (c) The arbor Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Errors produced by arbor.

use camino::Utf8PathBuf;
use thiserror::Error;
use tokio::task::JoinError;

/// An error that occurred while building a [`RunConfig`](crate::config::RunConfig).
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum ConfigBuildError {
    /// Shuffling and sorting by history both reorder the run list; only one
    /// may be enabled.
    #[error("shuffle and sort-by-history cannot both be enabled")]
    ShuffleSortConflict,

    /// The historic timeout factor cannot be used as a multiplier.
    #[error("historic timeout factor must be finite and positive, got {factor}")]
    InvalidHistoricFactor {
        /// The rejected factor.
        factor: f64,
    },
}

/// An error that occurred while persisting the history file.
#[derive(Debug, Error)]
#[error("error writing history file to `{path}`")]
pub struct HistoryWriteError {
    path: Utf8PathBuf,
    #[source]
    error: std::io::Error,
}

impl HistoryWriteError {
    pub(crate) fn new(path: impl Into<Utf8PathBuf>, error: std::io::Error) -> Self {
        Self {
            path: path.into(),
            error,
        }
    }
}

/// An error that occurred while setting up a signal handler.
#[derive(Debug, Error)]
#[error("error setting up signal handler")]
pub struct SignalHandlerSetupError(#[from] std::io::Error);

/// An error that occurred while building a test runner.
#[derive(Debug, Error)]
pub enum TestRunnerBuildError {
    /// An error occurred while creating the Tokio runtime.
    #[error("error creating Tokio runtime")]
    TokioRuntimeCreate(#[source] std::io::Error),

    /// An error occurred while setting up signal handling.
    #[error(transparent)]
    SignalHandlerSetup(#[from] SignalHandlerSetupError),
}

/// One or more runner tasks panicked while executing a test run.
///
/// Per-test panics are converted into Error results; this only surfaces
/// faults in the runner itself.
#[derive(Debug, Error)]
#[error("runner tasks panicked during the test run ({} tasks)", .join_errors.len())]
pub struct TestRunnerExecuteErrors {
    /// The join errors for the panicked tasks.
    pub join_errors: Vec<JoinError>,
}
